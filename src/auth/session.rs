//! Session state: the stored credential pair, its in-memory mirror, and
//! the event channel the rest of the application listens on.

use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tokio::sync::broadcast;

use super::tokens::{CredentialPair, CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

const EVENT_CAPACITY: usize = 16;

/// Why a session was ended without the user asking for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The refresh endpoint rejected the refresh token, or the call failed.
    RefreshFailed,
    /// The backend still answered 401 after a renewed token was used.
    RetryRejected,
    /// A request was rejected and there was no refresh token to renew with.
    NoRefreshToken,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::RefreshFailed => "credential refresh failed",
            Self::RetryRejected => "request rejected after credential refresh",
            Self::NoRefreshToken => "no refresh token available",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    Refreshed,
    SignedOut,
    Terminated(TerminationReason),
}

/// Owner of the credential pair.
///
/// Writes go to the durable store first and to the in-memory mirror second,
/// so the mirror never shows a pair that was not persisted. Both tokens are
/// always written and removed together.
pub struct Session {
    store: Arc<dyn CredentialStore>,
    current: RwLock<Option<CredentialPair>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Load the session from `store`.
    ///
    /// A store holding only one of the two tokens is cleaned up and treated
    /// as signed out.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let access = store.get(ACCESS_TOKEN_KEY);
        let refresh = store.get(REFRESH_TOKEN_KEY);

        let current = match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => Some(CredentialPair {
                access_token,
                refresh_token,
            }),
            (None, None) => None,
            _ => {
                tracing::warn!("Stored credentials are incomplete, discarding them");
                if let Err(e) = remove_pair(store.as_ref()) {
                    tracing::warn!("Failed to discard incomplete credentials: {:#}", e);
                }
                None
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            current: RwLock::new(current),
            events,
        }
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.credentials().map(|pair| pair.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.credentials().map(|pair| pair.refresh_token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Persist a freshly issued pair and make it current.
    ///
    /// If the second write fails the first one is rolled back, leaving the
    /// session signed out rather than half-written.
    pub fn set_tokens(&self, pair: CredentialPair) -> Result<()> {
        let written = self
            .store
            .set(ACCESS_TOKEN_KEY, &pair.access_token)
            .and_then(|()| self.store.set(REFRESH_TOKEN_KEY, &pair.refresh_token));

        if let Err(e) = written {
            if let Err(cleanup) = self.clear() {
                tracing::warn!("Failed to roll back partial credentials: {:#}", cleanup);
            }
            return Err(e.context("Failed to persist credentials"));
        }

        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(pair);
        Ok(())
    }

    /// Remove both tokens from the store and from memory.
    ///
    /// The in-memory mirror is cleared even when the store fails, so no
    /// caller keeps using a token that is being discarded.
    pub fn clear(&self) -> Result<()> {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
        remove_pair(self.store.as_ref())
    }

    /// Explicit user logout.
    pub fn sign_out(&self) -> Result<()> {
        self.clear()?;
        self.notify(SessionEvent::SignedOut);
        Ok(())
    }

    /// End the session after an unrecoverable authorization failure.
    pub fn terminate(&self, reason: TerminationReason) {
        tracing::warn!("Session terminated: {}", reason);
        if let Err(e) = self.clear() {
            tracing::error!("Failed to clear credentials: {:#}", e);
        }
        self.notify(SessionEvent::Terminated(reason));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn notify(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn remove_pair(store: &dyn CredentialStore) -> Result<()> {
    let access = store.remove(ACCESS_TOKEN_KEY);
    let refresh = store.remove(REFRESH_TOKEN_KEY);
    access.and(refresh)
}
