//! Single-flight coordination for credential refresh
//!
//! At most one refresh runs at a time. Callers that hit an expired
//! credential while a refresh is running join it instead of starting their
//! own, and all of them observe the same outcome.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

use super::tokens::CredentialPair;

/// Failure of the refresh call. Cloned to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingToken,
    #[error("refresh endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("malformed refresh response: {0}")]
    Malformed(String),
    #[error("failed to persist refreshed credentials: {0}")]
    Persist(String),
}

pub type RefreshResult = Result<CredentialPair, RefreshError>;

pub type RefreshFlight = Shared<BoxFuture<'static, RefreshResult>>;

type Slot = Arc<Mutex<Option<RefreshFlight>>>;

/// What a caller should do after an authorization failure.
pub enum Ticket {
    /// This caller started the refresh.
    Leader(RefreshFlight),
    /// A refresh was already running; wait for it.
    Waiter(RefreshFlight),
    /// A refresh finished after the caller's request was sent. Retry with
    /// this token, no refresh needed.
    Renewed(String),
}

/// Clears the in-flight slot when the refresh future finishes or unwinds.
struct ClearOnDrop(Slot);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

#[derive(Default)]
pub struct RefreshGate {
    in_flight: Slot,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Join the running refresh, or start one with `start`.
    ///
    /// `sent_token` is the access token the failed request carried and
    /// `current_token` reads the token stored right now. Both checks happen
    /// under the slot lock; the refresh future persists its result before it
    /// releases the slot, so an empty slot with a changed token means a
    /// refresh already completed.
    pub fn acquire<C, S>(&self, sent_token: Option<&str>, current_token: C, start: S) -> Ticket
    where
        C: FnOnce() -> Option<String>,
        S: FnOnce() -> BoxFuture<'static, RefreshResult>,
    {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(flight) = slot.as_ref() {
            tracing::debug!("Refresh already in flight, waiting");
            return Ticket::Waiter(flight.clone());
        }

        if let Some(current) = current_token() {
            if sent_token != Some(current.as_str()) {
                tracing::debug!("Credential was renewed meanwhile, replaying");
                return Ticket::Renewed(current);
            }
        }

        let guard = ClearOnDrop(Arc::clone(&self.in_flight));
        let refresh = start();
        let flight = async move {
            let _guard = guard;
            refresh.await
        }
        .boxed()
        .shared();

        *slot = Some(flight.clone());
        Ticket::Leader(flight)
    }
}
