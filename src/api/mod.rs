//! API client module for the center backend

pub mod client;
pub mod entities;
pub mod error;
pub mod transport;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::auth::{CredentialStore, MemoryStore, Session};
use crate::config::{Config, FileStore};
use crate::models::{
    Course, Group, Lesson, LessonPackage, Student, StudentGroup, StudentGroupDraft, Teacher,
};
use client::CenterClient;
use entities::{Entities, Entity};
use transport::HttpTransport;

/// Resource kinds addressable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EntityKind {
    Courses,
    LessonPackages,
    Lessons,
    Teachers,
    Groups,
    Students,
    StudentGroups,
}

/// Run `$func::<E>(args..)` for the model type behind `$kind`.
macro_rules! for_kind {
    ($kind:expr, $func:ident($($arg:expr),*)) => {
        match $kind {
            EntityKind::Courses => $func::<Course>($($arg),*).await,
            EntityKind::LessonPackages => $func::<LessonPackage>($($arg),*).await,
            EntityKind::Lessons => $func::<Lesson>($($arg),*).await,
            EntityKind::Teachers => $func::<Teacher>($($arg),*).await,
            EntityKind::Groups => $func::<Group>($($arg),*).await,
            EntityKind::Students => $func::<Student>($($arg),*).await,
            EntityKind::StudentGroups => $func::<StudentGroup>($($arg),*).await,
        }
    };
}

/// Client wired to the configured API and credential store.
pub struct Connection {
    pub client: CenterClient,
    pub api_url: String,
}

/// Build the client from config. Credentials live in the config file; if no
/// config directory exists they are kept in memory for this run only.
pub fn connect(api_url: Option<&str>) -> Result<Connection> {
    let (config, store): (Config, Arc<dyn CredentialStore>) = match Config::default_path() {
        Ok(path) => {
            let config = Config::load_from(&path)?;
            (config, Arc::new(FileStore::new(path)) as Arc<dyn CredentialStore>)
        }
        Err(e) => {
            tracing::warn!("{:#}; credentials will not be saved", e);
            (Config::default(), Arc::new(MemoryStore::new()) as Arc<dyn CredentialStore>)
        }
    };

    let api_url = config.resolve_api_url(api_url)?;
    tracing::debug!("Using API at {}", api_url);

    let transport = Arc::new(HttpTransport::new(&api_url)?);
    let session = Arc::new(Session::new(store));
    Ok(Connection {
        client: CenterClient::new(transport, session),
        api_url,
    })
}

/// List entities of one kind (prints to stdout).
pub async fn list(client: &CenterClient, kind: EntityKind, parent_id: Option<i64>) -> Result<()> {
    for_kind!(kind, print_list(client, parent_id))
}

/// Create an entity from a JSON draft.
pub async fn create(client: &CenterClient, kind: EntityKind, data: &str) -> Result<()> {
    for_kind!(kind, create_from_json(client, data))
}

/// Apply a partial JSON update to an entity.
pub async fn update(client: &CenterClient, kind: EntityKind, id: i64, data: &str) -> Result<()> {
    for_kind!(kind, update_from_json(client, id, data))
}

/// Delete an entity by id.
pub async fn delete(client: &CenterClient, kind: EntityKind, id: i64) -> Result<()> {
    for_kind!(kind, delete_by_id(client, id))
}

/// Add a student to a group until `expires_at`.
pub async fn assign(
    client: &CenterClient,
    student_id: i64,
    group_id: i64,
    expires_at: &str,
) -> Result<()> {
    let draft = StudentGroupDraft {
        group_id,
        student_id,
        expired_at: expires_at.to_string(),
        user_id: None,
        creator_id: None,
    };
    let link = Entities::<StudentGroup>::new(client).create(&draft).await?;
    println!(
        "Student {} assigned to group {} until {} (link {}).",
        link.student_id, link.group_id, link.expired_at, link.id
    );
    Ok(())
}

async fn print_list<E: Entity>(client: &CenterClient, parent_id: Option<i64>) -> Result<()> {
    let items = Entities::<E>::new(client).list(parent_id).await?;

    println!("\n{}:", E::TITLE);
    println!("{:-<60}", "");

    if items.is_empty() {
        println!("  (none found)");
        return Ok(());
    }

    for item in &items {
        println!("  {:>6}  {}", item.id(), item.summary());
    }

    Ok(())
}

async fn create_from_json<E: Entity>(client: &CenterClient, data: &str) -> Result<()> {
    let draft: E::Draft =
        serde_json::from_str(data).with_context(|| format!("Invalid {} data", E::NAME))?;
    let created = Entities::<E>::new(client).create(&draft).await?;
    println!("Created {} {}: {}", E::NAME, created.id(), created.summary());
    Ok(())
}

async fn update_from_json<E: Entity>(client: &CenterClient, id: i64, data: &str) -> Result<()> {
    let changes: serde_json::Value =
        serde_json::from_str(data).with_context(|| format!("Invalid {} update", E::NAME))?;
    let updated = Entities::<E>::new(client).update(id, changes).await?;
    println!("Updated {} {}: {}", E::NAME, updated.id(), updated.summary());
    Ok(())
}

async fn delete_by_id<E: Entity>(client: &CenterClient, id: i64) -> Result<()> {
    Entities::<E>::new(client).delete(id).await?;
    println!("Deleted {} {}.", E::NAME, id);
    Ok(())
}
