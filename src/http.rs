//! Transport shared by the content and persistence clients: URL joining,
//! bearer header, idempotency key and status-to-error mapping.
use futures::StreamExt;
use reqwest::{Client, Request, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::Credential;
use crate::error::{Error, Result};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Idempotency key for one logical write. Retries of the same write reuse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey(Uuid);

impl RequestKey {
    pub fn new() -> Self {
        RequestKey(Uuid::new_v4())
    }
}

impl Default for RequestKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone)]
pub struct HttpApi {
    http: Client,
    base_url: Url,
    credential: Credential,
}

impl fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl HttpApi {
    pub fn new(
        base_url: &str,
        credential: Credential,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        // Url::join drops the last path segment unless it ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::validation(format!("invalid API base URL '{base_url}': {e}")))?;
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::remote(None, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            credential,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::validation(format!("invalid endpoint '{path}': {e}")))
    }

    pub fn build_post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        key: Option<RequestKey>,
    ) -> Result<Request> {
        let bearer = self.credential.bearer()?;
        let mut builder = self
            .http
            .post(self.endpoint(path)?)
            .header("Authorization", bearer)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = key {
            builder = builder.header(IDEMPOTENCY_HEADER, key.to_string());
        }
        builder
            .build()
            .map_err(|e| Error::validation(format!("failed to build request for {path}: {e}")))
    }

    /// `path` with `id` appended as one percent-encoded segment.
    pub fn item_endpoint(&self, path: &str, id: &str) -> Result<Url> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| Error::validation(format!("invalid endpoint '{path}'")))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    pub fn build_get(&self, path: &str) -> Result<Request> {
        self.get_request(path, self.endpoint(path)?)
    }

    pub fn build_get_item(&self, path: &str, id: &str) -> Result<Request> {
        self.get_request(path, self.item_endpoint(path, id)?)
    }

    fn get_request(&self, path: &str, url: Url) -> Result<Request> {
        let bearer = self.credential.bearer()?;
        self.http
            .get(url)
            .header("Authorization", bearer)
            .build()
            .map_err(|e| Error::validation(format!("failed to build request for {path}: {e}")))
    }

    /// Sends the request; any non-2xx status becomes an error.
    pub async fn send(&self, request: Request) -> Result<Response> {
        debug!(method=%request.method(), url=%request.url(), "sending request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| transport_error(&e))?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        warn!(%status, "request failed");
        Err(status_error(status, &body))
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let res = self.send(request).await?;
        res.json::<T>()
            .await
            .map_err(|e| Error::remote(None, format!("invalid response body: {e}")))
    }

    /// Reads the whole body; a broken stream yields an error, never a partial buffer.
    pub async fn send_bytes(&self, request: Request) -> Result<(Vec<u8>, Option<String>)> {
        let res = self.send(request).await?;
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut bytes = Vec::new();
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&e))?;
            bytes.extend_from_slice(&chunk);
        }
        Ok((bytes, content_type))
    }
}

fn transport_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::remote(None, "no response from the service (timed out)")
    } else {
        Error::remote(None, format!("failed to reach the service: {err}"))
    }
}

/// Maps a non-success status. 401/403 mean the credential is the problem.
pub fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = detail_from_body(status, body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Error::Auth(format!(
            "credential rejected ({}): {detail}; sign in again",
            status.as_u16()
        ));
    }
    Error::remote(Some(status.as_u16()), detail)
}

/// The server's `detail` message when present, otherwise the raw body or status text.
pub fn detail_from_body(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        match parsed.detail {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => return s,
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.chars().take(500).collect();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api(token: Option<&str>) -> HttpApi {
        HttpApi::new(
            "http://localhost:8000/api",
            Credential::new(token.map(str::to_string)),
            Duration::from_secs(5),
            "docsmith-test",
        )
        .unwrap()
    }

    #[test]
    fn build_post_sets_headers() {
        let api = api(Some("token"));
        let key = RequestKey::new();
        let request = api
            .build_post("sections/update", &json!({ "sample": true }), Some(key))
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/api/sections/update");
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
        assert_eq!(
            headers
                .get("Content-Type")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "application/json"
        );
        assert_eq!(
            headers
                .get(IDEMPOTENCY_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            key.to_string()
        );
    }

    #[test]
    fn item_ids_stay_in_one_segment() {
        let api = api(Some("token"));
        let request = api.build_get_item("projects", "a/b?c#d").unwrap();
        assert_eq!(request.url().path(), "/api/projects/a%2Fb%3Fc%23d");
        assert_eq!(request.url().query(), None);
        assert_eq!(request.url().fragment(), None);

        let request = api.build_get_item("projects", "p1").unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8000/api/projects/p1");
    }

    #[test]
    fn missing_credential_fails_before_sending() {
        let api = api(None);
        assert!(matches!(api.build_get("projects"), Err(Error::Auth(_))));
        assert!(matches!(
            api.build_post("feedback", &json!({}), None),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn status_mapping() {
        let err = status_error(StatusCode::UNAUTHORIZED, r#"{"detail":"Invalid or expired token"}"#);
        assert!(err.requires_reauth());
        assert!(err.to_string().contains("Invalid or expired token"));

        let err = status_error(StatusCode::NOT_FOUND, r#"{"detail":"Project not found"}"#);
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("Project not found"));

        let err = status_error(StatusCode::BAD_GATEWAY, "");
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn detail_falls_back_to_raw_body() {
        assert_eq!(
            detail_from_body(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded"),
            "upstream exploded"
        );
        assert_eq!(
            detail_from_body(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail":[{"msg":"field required"}]}"#),
            r#"[{"msg":"field required"}]"#
        );
    }
}
