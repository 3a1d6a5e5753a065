//! Center CLI - administration console for the learning center API
//!
//! Manages courses, lesson packages, lessons, teachers, groups and students
//! from the terminal.

mod api;
mod auth;
mod config;
mod models;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::client::CenterClient;
use api::EntityKind;
use auth::SessionEvent;

#[derive(Parser)]
#[command(name = "center-cli")]
#[command(about = "Administration console for the learning center API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL, including the version prefix
    #[arg(long, global = true, env = "CENTER_API_URL")]
    api_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store credentials
    Login {
        /// Staff login
        #[arg(short, long)]
        login: String,

        /// Password
        #[arg(short, long, env = "CENTER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show current authentication status
    Status,

    /// List entities
    List {
        kind: EntityKind,

        /// Only entities under this parent (course for groups, package for
        /// lessons, group for students and student-groups)
        #[arg(long)]
        parent_id: Option<i64>,
    },

    /// Create an entity from a JSON object
    Create {
        kind: EntityKind,

        /// Fields in camelCase, e.g. '{"name":"Python","programLang":"python","packageId":1}'
        #[arg(short, long)]
        data: String,
    },

    /// Update fields of an entity
    Update {
        kind: EntityKind,
        id: i64,

        /// Changed fields as a JSON object
        #[arg(short, long)]
        data: String,
    },

    /// Delete an entity
    Delete { kind: EntityKind, id: i64 },

    /// Assign a student to a group
    Assign {
        #[arg(long)]
        student_id: i64,

        #[arg(long)]
        group_id: i64,

        /// Membership end date (YYYY-MM-DD)
        #[arg(long)]
        expires_at: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let connection = api::connect(cli.api_url.as_deref())?;
    let client = connection.client;
    let mut events = client.session().subscribe();

    let result = run(cli.command, &client, &connection.api_url).await;

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Terminated(reason) = event {
            eprintln!("Session ended: {}.", reason);
            eprintln!("Run 'center-cli login' to sign in again.");
        }
    }

    result
}

async fn run(command: Commands, client: &CenterClient, api_url: &str) -> Result<()> {
    match command {
        Commands::Login { login, password } => {
            auth::login(client, &login, &password).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout(client)?;
        }
        Commands::Status => {
            auth::status(client, api_url)?;
        }
        Commands::List { kind, parent_id } => {
            tracing::info!("Fetching {:?}...", kind);
            api::list(client, kind, parent_id).await?;
        }
        Commands::Create { kind, data } => {
            api::create(client, kind, &data).await?;
        }
        Commands::Update { kind, id, data } => {
            api::update(client, kind, id, &data).await?;
        }
        Commands::Delete { kind, id } => {
            api::delete(client, kind, id).await?;
        }
        Commands::Assign {
            student_id,
            group_id,
            expires_at,
        } => {
            api::assign(client, student_id, group_id, &expires_at).await?;
        }
    }

    Ok(())
}
