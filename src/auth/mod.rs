//! Session and credential handling for the center API
//!
//! The access/refresh pair is issued by `/center/auth/sign-in`, renewed by
//! `/center/auth/refresh-token`, and kept in a `CredentialStore`.

pub mod refresh;
pub mod session;
pub mod tokens;

use anyhow::{bail, Result};

pub use refresh::{RefreshError, RefreshGate, RefreshResult, Ticket};
pub use session::{Session, SessionEvent, TerminationReason};
pub use tokens::{
    CredentialPair, CredentialStore, MemoryStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};

use crate::api::client::CenterClient;

/// Sign in with login and password
pub async fn login(client: &CenterClient, login: &str, password: &str) -> Result<()> {
    let missing = missing_credentials(login, password);
    if !missing.is_empty() {
        bail!("Missing {}", missing.join(" and "));
    }

    tracing::info!("Signing in...");
    client.sign_in(login.trim(), password).await?;
    println!("Login successful.");
    Ok(())
}

/// Clear stored credentials
pub fn logout(client: &CenterClient) -> Result<()> {
    client.sign_out()?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub fn status(client: &CenterClient, api_url: &str) -> Result<()> {
    println!("API URL:     {}", api_url);

    // Tokens are stored in pairs, so one flag covers both.
    if client.session().is_authenticated() {
        println!("Access tok:  present");
        println!("Refresh tok: present");
    } else {
        println!("Access tok:  none");
        println!("Refresh tok: none");
        println!("\nRun 'center-cli login' to authenticate.");
    }

    Ok(())
}

fn missing_credentials(login: &str, password: &str) -> Vec<&'static str> {
    [
        login.trim().is_empty().then_some("login"),
        password.is_empty().then_some("password"),
    ]
    .into_iter()
    .flatten()
    .collect()
}
