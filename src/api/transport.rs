//! Wire-level request/response types and the HTTP transport

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One logical API call. Replays reuse the same value, so the retried
/// marker travels with the request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// "METHOD /path" for logs and error messages.
    pub fn target(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Response status and body, read in full.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends a request and hands back whatever the server answered.
///
/// Implementations do not interpret status codes; only I/O failures are
/// errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse>;
}

/// `reqwest`-backed transport rooted at the API base URL.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse> {
        let url = self.url(&request.path);
        tracing::debug!("{} {}", request.method, url);

        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", request.method, url))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        Ok(RawResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_http_transport_sends_bearer_query_and_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/groups")
            .match_header("authorization", "Bearer tok")
            .match_query(Matcher::UrlEncoded("courseId".into(), "4".into()))
            .match_body(Matcher::Json(json!({ "name": "G1" })))
            .with_status(201)
            .with_body(r#"{"data":{"id":1}}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(&format!("{}/v1/", server.url())).unwrap();
        let request = ApiRequest::post("/groups", json!({ "name": "G1" })).with_query("courseId", 4);
        let resp = transport.execute(&request, Some("tok")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(resp.status, StatusCode::CREATED);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["data"]["id"], 1);
    }

    #[tokio::test]
    async fn test_http_transport_omits_authorization_without_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/teachers")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .create_async()
            .await;

        let transport = HttpTransport::new(&format!("{}/v1", server.url())).unwrap();
        let resp = transport
            .execute(&ApiRequest::get("/teachers"), None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_request_target_and_retry_marker() {
        let mut request = ApiRequest::delete("/courses/3");
        assert_eq!(request.target(), "DELETE /courses/3");
        assert!(!request.is_retried());
        request.mark_retried();
        assert!(request.clone().is_retried());
    }
}
