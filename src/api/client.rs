//! Authenticated HTTP client for the center API
//!
//! Every call carries the current access token. A 401 is recovered by one
//! credential refresh shared by all concurrent callers, followed by a single
//! replay of the failed request. When recovery is impossible the session is
//! terminated and the 401 is returned to the caller.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::transport::{ApiRequest, RawResponse, Transport};
use crate::auth::{
    CredentialPair, RefreshError, RefreshGate, RefreshResult, Session, SessionEvent,
    TerminationReason, Ticket,
};

const AUTH_BASE: &str = "/center/auth";

/// `{ "data": ... }` wrapper used by every backend response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Request gateway. Cheap to clone; clones share the session and the
/// refresh gate.
#[derive(Clone)]
pub struct CenterClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    gate: RefreshGate,
}

impl CenterClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<Session>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                session,
                gate: RefreshGate::new(),
            }),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    #[cfg(test)]
    pub fn is_refreshing(&self) -> bool {
        self.inner.gate.is_refreshing()
    }

    /// Exchange login/password for a credential pair and store it.
    ///
    /// Goes straight to the transport: a 401 here means wrong credentials,
    /// not an expired session.
    pub async fn sign_in(&self, login: &str, password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(
            format!("{}/sign-in", AUTH_BASE),
            json!({ "login": login, "password": password }),
        );
        let response = self.dispatch(&request, None).await?;
        let response = check_response(response, &request)?;
        let envelope: Envelope<CredentialPair> = decode(&response, &request)?;

        self.inner
            .session
            .set_tokens(envelope.data)
            .map_err(ApiError::Storage)?;
        self.inner.session.notify(SessionEvent::SignedIn);
        tracing::info!("Signed in as {}", login);
        Ok(())
    }

    /// Forget the stored credentials. Navigation is up to the caller.
    pub fn sign_out(&self) -> anyhow::Result<()> {
        self.inner.session.sign_out()
    }

    /// Send `request` with the current access token, recovering once from
    /// an expired credential.
    pub async fn send(&self, mut request: ApiRequest) -> Result<RawResponse, ApiError> {
        let session = &self.inner.session;
        let mut bearer = session.access_token();

        loop {
            let response = self.dispatch(&request, bearer.as_deref()).await?;
            if response.status != StatusCode::UNAUTHORIZED {
                return check_response(response, &request);
            }

            if request.is_retried() {
                tracing::warn!("{} rejected again after renewal", request.target());
                session.terminate(TerminationReason::RetryRejected);
                return Err(unauthorized(&request, &response));
            }
            if session.refresh_token().is_none() {
                session.terminate(TerminationReason::NoRefreshToken);
                return Err(unauthorized(&request, &response));
            }

            request.mark_retried();
            let renewed = self.renew(bearer.as_deref()).await;
            bearer = match renewed {
                Ok(token) => Some(token),
                Err(Renewal::Led(e)) => {
                    tracing::warn!("Refresh for {} failed: {}", request.target(), e);
                    return Err(unauthorized(&request, &response));
                }
                Err(Renewal::Joined(e)) => return Err(ApiError::Refresh(e)),
            };
            tracing::debug!("Replaying {} with renewed credential", request.target());
        }
    }

    /// `send` and decode the `{ "data": ... }` envelope.
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.send(request.clone()).await?;
        let envelope: Envelope<T> = decode(&response, &request)?;
        Ok(envelope.data)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<RawResponse, ApiError> {
        self.inner
            .transport
            .execute(request, bearer)
            .await
            .map_err(ApiError::Transport)
    }

    /// Obtain a token newer than `stale`, refreshing if nobody else is.
    async fn renew(&self, stale: Option<&str>) -> Result<String, Renewal> {
        let session = &self.inner.session;
        let ticket = self.inner.gate.acquire(
            stale,
            || session.access_token(),
            || refresh_flight(Arc::clone(&self.inner.transport), Arc::clone(session)),
        );

        match ticket {
            Ticket::Renewed(token) => Ok(token),
            Ticket::Leader(flight) => flight
                .await
                .map(|pair| pair.access_token)
                .map_err(Renewal::Led),
            Ticket::Waiter(flight) => flight
                .await
                .map(|pair| pair.access_token)
                .map_err(Renewal::Joined),
        }
    }
}

/// Refresh failure as seen by the caller that started it vs one that
/// joined it. The starter reports its own 401; joiners report the refresh
/// error.
enum Renewal {
    Led(RefreshError),
    Joined(RefreshError),
}

/// The shared refresh future. Persists the new pair on success and ends the
/// session on failure, in both cases before any waiter is released.
///
/// Takes the transport and session rather than the client so the in-flight
/// future never keeps the client alive.
fn refresh_flight(
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
) -> BoxFuture<'static, RefreshResult> {
    async move {
        let outcome = request_refresh(transport.as_ref(), &session).await;
        match &outcome {
            Ok(_) => {
                tracing::info!("Credentials refreshed");
                session.notify(SessionEvent::Refreshed);
            }
            Err(e) => {
                tracing::warn!("Credential refresh failed: {}", e);
                session.terminate(TerminationReason::RefreshFailed);
            }
        }
        outcome
    }
    .boxed()
}

async fn request_refresh(transport: &dyn Transport, session: &Session) -> RefreshResult {
    let token = session.refresh_token().ok_or(RefreshError::MissingToken)?;
    let request = ApiRequest::post(
        format!("{}/refresh-token", AUTH_BASE),
        json!({ "token": token }),
    );

    let response = transport
        .execute(&request, None)
        .await
        .map_err(|e| RefreshError::Transport(format!("{:#}", e)))?;
    if !response.status.is_success() {
        return Err(RefreshError::Rejected {
            status: response.status.as_u16(),
            body: response.text(),
        });
    }

    let envelope: Envelope<CredentialPair> = response
        .json()
        .map_err(|e| RefreshError::Malformed(e.to_string()))?;
    session
        .set_tokens(envelope.data.clone())
        .map_err(|e| RefreshError::Persist(format!("{:#}", e)))?;
    Ok(envelope.data)
}

fn check_response(response: RawResponse, request: &ApiRequest) -> Result<RawResponse, ApiError> {
    if response.status.is_success() {
        return Ok(response);
    }
    Err(ApiError::Status {
        status: response.status,
        target: request.target(),
        body: response.text(),
    })
}

fn unauthorized(request: &ApiRequest, response: &RawResponse) -> ApiError {
    ApiError::Unauthorized {
        target: request.target(),
        body: response.text(),
    }
}

fn decode<T: DeserializeOwned>(response: &RawResponse, request: &ApiRequest) -> Result<T, ApiError> {
    response.json().map_err(|source| ApiError::Decode {
        target: request.target(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, MemoryStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
    use async_trait::async_trait;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// In-process backend: entity paths accept only `valid_token`, the
    /// refresh endpoint issues `T2`/`R2` once released.
    struct ScriptedBackend {
        valid_token: Mutex<String>,
        refresh_ok: bool,
        reject_everything: bool,
        hold_refresh: bool,
        release: Notify,
        refresh_calls: AtomicUsize,
        rejections: AtomicUsize,
        refresh_seen_bearer: AtomicBool,
        log: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedBackend {
        fn new(valid_token: &str) -> Self {
            Self {
                valid_token: Mutex::new(valid_token.to_string()),
                refresh_ok: true,
                reject_everything: false,
                hold_refresh: false,
                release: Notify::new(),
                refresh_calls: AtomicUsize::new(0),
                rejections: AtomicUsize::new(0),
                refresh_seen_bearer: AtomicBool::new(false),
                log: Mutex::new(Vec::new()),
            }
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        fn rejections(&self) -> usize {
            self.rejections.load(Ordering::SeqCst)
        }

        fn calls_to(&self, path: &str) -> Vec<Option<String>> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == path)
                .map(|(_, bearer)| bearer.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedBackend {
        async fn execute(
            &self,
            request: &ApiRequest,
            bearer: Option<&str>,
        ) -> anyhow::Result<RawResponse> {
            self.log
                .lock()
                .unwrap()
                .push((request.path.clone(), bearer.map(String::from)));

            match request.path.as_str() {
                "/center/auth/refresh-token" => {
                    self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                    if bearer.is_some() {
                        self.refresh_seen_bearer.store(true, Ordering::SeqCst);
                    }
                    if self.hold_refresh {
                        self.release.notified().await;
                    }
                    if !self.refresh_ok {
                        return Ok(RawResponse::new(StatusCode::UNAUTHORIZED, "expired"));
                    }
                    assert_eq!(request.body, Some(json!({ "token": "R1" })));
                    *self.valid_token.lock().unwrap() = "T2".to_string();
                    Ok(RawResponse::new(
                        StatusCode::OK,
                        r#"{"data":{"accessToken":"T2","refreshToken":"R2"}}"#,
                    ))
                }
                "/center/auth/sign-in" => {
                    if request.body == Some(json!({ "login": "admin", "password": "secret" })) {
                        Ok(RawResponse::new(
                            StatusCode::OK,
                            r#"{"data":{"accessToken":"S1","refreshToken":"SR1"}}"#,
                        ))
                    } else {
                        Ok(RawResponse::new(StatusCode::UNAUTHORIZED, "bad login"))
                    }
                }
                "/bad" => Ok(RawResponse::new(StatusCode::BAD_REQUEST, "name is required")),
                _ => {
                    let valid = self.valid_token.lock().unwrap().clone();
                    if self.reject_everything || bearer != Some(valid.as_str()) {
                        self.rejections.fetch_add(1, Ordering::SeqCst);
                        Ok(RawResponse::new(StatusCode::UNAUTHORIZED, "token expired"))
                    } else {
                        Ok(RawResponse::new(StatusCode::OK, r#"{"data":[]}"#))
                    }
                }
            }
        }
    }

    fn client_with(
        backend: &Arc<ScriptedBackend>,
        pair: Option<(&str, &str)>,
    ) -> (CenterClient, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        if let Some((access, refresh)) = pair {
            store.set(ACCESS_TOKEN_KEY, access).unwrap();
            store.set(REFRESH_TOKEN_KEY, refresh).unwrap();
        }
        let session = Arc::new(Session::new(Arc::clone(&store) as Arc<dyn CredentialStore>));
        let transport = Arc::clone(backend) as Arc<dyn Transport>;
        (CenterClient::new(transport, session), store)
    }

    fn drain(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    #[tokio::test]
    async fn test_valid_token_passes_through() {
        let backend = Arc::new(ScriptedBackend::new("T1"));
        let (client, _) = client_with(&backend, Some(("T1", "R1")));

        let resp = client.send(ApiRequest::get("/courses")).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(backend.calls_to("/courses"), vec![Some("T1".to_string())]);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let mut backend = ScriptedBackend::new("never-issued");
        backend.hold_refresh = true;
        let backend = Arc::new(backend);
        let (client, store) = client_with(&backend, Some(("T1", "R1")));
        let mut events = client.session().subscribe();

        const N: usize = 5;
        let paths: Vec<String> = (0..N).map(|i| format!("/students/{}", i)).collect();
        let requests = join_all(paths.iter().map(|p| client.send(ApiRequest::get(p.as_str()))));
        let release = async {
            while backend.rejections() < N || backend.refresh_calls() == 0 {
                tokio::task::yield_now().await;
            }
            assert!(client.is_refreshing());
            backend.release.notify_one();
        };

        let (results, ()) = tokio::join!(requests, release);

        for result in results {
            assert_eq!(result.unwrap().status, StatusCode::OK);
        }
        assert_eq!(backend.refresh_calls(), 1);
        assert!(!backend.refresh_seen_bearer.load(Ordering::SeqCst));
        for path in &paths {
            assert_eq!(
                backend.calls_to(path),
                vec![Some("T1".to_string()), Some("T2".to_string())]
            );
        }
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("T2"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("R2"));
        assert!(!client.is_refreshing());
        assert_eq!(drain(&mut events), vec![SessionEvent::Refreshed]);
    }

    #[tokio::test]
    async fn test_two_requests_replayed_with_new_token() {
        let backend = Arc::new(ScriptedBackend::new("T2"));
        let (client, store) = client_with(&backend, Some(("T1", "R1")));

        let (a, b) = tokio::join!(
            client.send(ApiRequest::get("/groups")),
            client.send(ApiRequest::get("/teachers")),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(backend.calls_to("/groups").last(), Some(&Some("T2".to_string())));
        assert_eq!(backend.calls_to("/teachers").last(), Some(&Some("T2".to_string())));
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("T2"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_refresh_failure_rejects_all_and_clears_store() {
        let mut backend = ScriptedBackend::new("never-issued");
        backend.refresh_ok = false;
        backend.hold_refresh = true;
        let backend = Arc::new(backend);
        let (client, store) = client_with(&backend, Some(("T1", "R1")));
        let mut events = client.session().subscribe();

        const N: usize = 3;
        let requests = join_all((0..N).map(|_| client.send(ApiRequest::get("/lessons"))));
        let release = async {
            while backend.rejections() < N || backend.refresh_calls() == 0 {
                tokio::task::yield_now().await;
            }
            backend.release.notify_one();
        };
        let (results, ()) = tokio::join!(requests, release);

        let mut unauthorized = 0;
        let mut refresh_errors = 0;
        for result in results {
            match result {
                Err(ApiError::Unauthorized { .. }) => unauthorized += 1,
                Err(ApiError::Refresh(RefreshError::Rejected { status: 401, .. })) => {
                    refresh_errors += 1
                }
                other => panic!("unexpected result: {:?}", other.map(|r| r.status)),
            }
        }
        assert_eq!(unauthorized, 1, "only the request that led the refresh");
        assert_eq!(refresh_errors, N - 1);
        assert_eq!(backend.refresh_calls(), 1);
        assert!(store.get(ACCESS_TOKEN_KEY).is_none());
        assert!(store.get(REFRESH_TOKEN_KEY).is_none());
        assert!(!client.session().is_authenticated());
        assert!(!client.is_refreshing());
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Terminated(TerminationReason::RefreshFailed)]
        );
    }

    #[tokio::test]
    async fn test_second_401_after_retry_terminates_without_refresh() {
        let mut backend = ScriptedBackend::new("T2");
        backend.reject_everything = true;
        let backend = Arc::new(backend);
        let (client, store) = client_with(&backend, Some(("T1", "R1")));
        let mut events = client.session().subscribe();

        let err = client.send(ApiRequest::get("/courses")).await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(backend.calls_to("/courses").len(), 2);
        assert!(store.get(ACCESS_TOKEN_KEY).is_none());
        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::Refreshed,
                SessionEvent::Terminated(TerminationReason::RetryRejected)
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_refresh_token_terminates_immediately() {
        let backend = Arc::new(ScriptedBackend::new("T1"));
        let (client, _) = client_with(&backend, None);
        let mut events = client.session().subscribe();

        let err = client.send(ApiRequest::get("/courses")).await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(backend.calls_to("/courses"), vec![None]);
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(
            drain(&mut events),
            vec![SessionEvent::Terminated(TerminationReason::NoRefreshToken)]
        );
    }

    #[tokio::test]
    async fn test_non_auth_error_passes_through() {
        let backend = Arc::new(ScriptedBackend::new("T1"));
        let (client, store) = client_with(&backend, Some(("T1", "R1")));
        let mut events = client.session().subscribe();

        let err = client
            .send(ApiRequest::post("/bad", json!({})))
            .await
            .unwrap_err();

        match err {
            ApiError::Status { status, body, .. } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "name is required");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("T1"));
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_stores_pair() {
        let backend = Arc::new(ScriptedBackend::new("S1"));
        let (client, store) = client_with(&backend, None);
        let mut events = client.session().subscribe();

        client.sign_in("admin", "secret").await.unwrap();

        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("S1"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("SR1"));
        assert_eq!(drain(&mut events), vec![SessionEvent::SignedIn]);

        let items: Vec<serde_json::Value> =
            client.fetch(ApiRequest::get("/courses")).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_password_never_refreshes() {
        let backend = Arc::new(ScriptedBackend::new("T1"));
        let (client, _) = client_with(&backend, Some(("T1", "R1")));

        let err = client.sign_in("admin", "nope").await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::Status { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
        assert_eq!(backend.refresh_calls(), 0);
        assert!(client.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_out_clears_credentials() {
        let backend = Arc::new(ScriptedBackend::new("T1"));
        let (client, store) = client_with(&backend, Some(("T1", "R1")));

        client.sign_out().unwrap();

        assert!(store.get(ACCESS_TOKEN_KEY).is_none());
        assert!(store.get(REFRESH_TOKEN_KEY).is_none());
    }
}
