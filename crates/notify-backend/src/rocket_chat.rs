//! Rocket.Chat REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use notify_models::{Session, SubscriptionRecord};

use crate::backend::ChatBackend;
use crate::error::{BackendError, Result};
use crate::retry::RetryPolicy;

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const LOGIN_PATH: &str = "/api/v1/login";
const SUBSCRIPTIONS_PATH: &str = "/api/v1/subscriptions.get";

/// Where a login response may carry a value.
#[derive(Debug, Clone, Copy)]
enum Source {
    /// Response header (lower-case name).
    Header(&'static str),
    /// JSON body path.
    Body(&'static [&'static str]),
}

/// Extraction tables, tried in order. Headers win over the body.
const AUTH_TOKEN_SOURCES: &[Source] = &[
    Source::Header("x-auth-token"),
    Source::Body(&["data", "authToken"]),
    Source::Body(&["authToken"]),
    Source::Body(&["data", "X-Auth-Token"]),
    Source::Body(&["X-Auth-Token"]),
];

const USER_ID_SOURCES: &[Source] = &[
    Source::Header("x-user-id"),
    Source::Body(&["data", "userId"]),
    Source::Body(&["userId"]),
    Source::Body(&["data", "X-User-Id"]),
    Source::Body(&["X-User-Id"]),
];

const INSTANCE_ID_SOURCES: &[Source] = &[
    Source::Header("x-instance-id"),
    Source::Body(&["data", "instanceId"]),
    Source::Body(&["instanceId"]),
];

/// Envelope fields holding the subscription list, in precedence order.
const SUBSCRIPTION_ENVELOPE_FIELDS: &[&str] = &["subscriptions", "update"];

fn extract(sources: &[Source], headers: &HeaderMap, body: &Value) -> Option<String> {
    sources.iter().find_map(|source| match source {
        Source::Header(name) => headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        Source::Body(path) => {
            let value = path.iter().try_fold(body, |node, key| node.get(key))?;
            match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        }
    })
}

/// Pulls the subscription list out of a `subscriptions.get` body.
fn unwrap_envelope(body: Value) -> Vec<SubscriptionRecord> {
    let list = SUBSCRIPTION_ENVELOPE_FIELDS
        .iter()
        .find_map(|field| body.get(*field).filter(|v| !v.is_null()));

    match list {
        Some(Value::Array(items)) => items.iter().cloned().map(SubscriptionRecord::from).collect(),
        _ => Vec::new(),
    }
}

/// Client for the Rocket.Chat REST API.
///
/// Stateless with respect to users: server URL and session are passed on
/// every call, so one client serves all subscribers.
#[derive(Debug, Clone)]
pub struct RocketChatClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl RocketChatClient {
    /// Create a client with the default timeout and retry policy.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(server: &str, path: &str) -> String {
        format!("{}{}", server.trim_end_matches('/'), path)
    }

    async fn login_once(&self, url: &str, user: &str, password: &str) -> Result<Session> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&json!({ "user": user, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Auth(format!("login rejected with HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let headers = response.headers().clone();
        let body = read_json(response).await?;

        let auth_token = extract(AUTH_TOKEN_SOURCES, &headers, &body);
        let user_id = extract(USER_ID_SOURCES, &headers, &body);
        match (auth_token, user_id) {
            (Some(token), Some(user_id)) => {
                let instance_id = extract(INSTANCE_ID_SOURCES, &headers, &body);
                Ok(Session::new(token, user_id).with_instance_id(instance_id))
            }
            _ => Err(BackendError::Auth("login response carried no auth token or user id".to_string())),
        }
    }

    async fn subscriptions_once(&self, url: &str, session: &Session) -> Result<Vec<SubscriptionRecord>> {
        let mut request = self
            .client
            .get(url)
            .header("X-Auth-Token", &session.auth_token)
            .header("X-User-Id", &session.user_id)
            .header("Content-Type", "application/json");
        if let Some(instance_id) = &session.instance_id {
            request = request.header("X-Instance-Id", instance_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(user = session.user_label(), "rocket.chat session expired");
            return Err(BackendError::AuthExpired);
        }
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        Ok(unwrap_envelope(read_json(response).await?))
    }
}

async fn read_json(response: Response) -> Result<Value> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl ChatBackend for RocketChatClient {
    async fn login(&self, server: &str, user: &str, password: &str) -> Result<Session> {
        let url = Self::url(server, LOGIN_PATH);
        let session = self
            .retry
            .run("rocket.chat login", || self.login_once(&url, user, password))
            .await?;
        info!(user = session.user_label(), "logged in to rocket.chat");
        Ok(session)
    }

    async fn fetch_subscriptions(&self, server: &str, session: &Session) -> Result<Vec<SubscriptionRecord>> {
        let url = Self::url(server, SUBSCRIPTIONS_PATH);
        let records = self
            .retry
            .run("rocket.chat subscriptions.get", || self.subscriptions_once(&url, session))
            .await?;
        debug!(user = session.user_label(), count = records.len(), "fetched subscriptions");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> RocketChatClient {
        RocketChatClient::new()
            .unwrap()
            .with_retry_policy(RetryPolicy::default().with_base_delay(Duration::from_millis(1)))
    }

    #[test]
    fn test_extract_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-auth-token", "from-header".parse().unwrap());
        let body = json!({"data": {"authToken": "from-body"}});
        assert_eq!(
            extract(AUTH_TOKEN_SOURCES, &headers, &body).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn test_extract_body_order() {
        let headers = HeaderMap::new();
        let body = json!({"authToken": "flat", "data": {"X-Auth-Token": "nested-alt"}});
        assert_eq!(extract(AUTH_TOKEN_SOURCES, &headers, &body).as_deref(), Some("flat"));

        let body = json!({"data": {"X-User-Id": "u1"}});
        assert_eq!(extract(USER_ID_SOURCES, &headers, &body).as_deref(), Some("u1"));

        assert!(extract(INSTANCE_ID_SOURCES, &headers, &Value::Null).is_none());
    }

    #[test]
    fn test_envelope_fallbacks() {
        assert_eq!(unwrap_envelope(json!({"subscriptions": [{"t": "c"}]})).len(), 1);
        assert_eq!(unwrap_envelope(json!({"update": [{"t": "c"}, {"t": "d"}]})).len(), 2);
        assert!(unwrap_envelope(json!({"success": true})).is_empty());
        assert!(unwrap_envelope(json!({"subscriptions": "nope"})).is_empty());
        assert!(unwrap_envelope(Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_login_reads_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({"user": "john", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"authToken": "tok", "userId": "uid-123456", "instanceId": "inst"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/", server.uri());
        let session = client().login(&base, "john", "pw").await.unwrap();
        assert_eq!(session.auth_token, "tok");
        assert_eq!(session.user_id, "uid-123456");
        assert_eq!(session.instance_id.as_deref(), Some("inst"));
    }

    #[tokio::test]
    async fn test_login_reads_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Auth-Token", "hdr-token")
                    .insert_header("X-User-Id", "hdr-user")
                    .set_body_json(json!({"data": {"authToken": "body-token", "userId": "body-user"}})),
            )
            .mount(&server)
            .await;

        let session = client().login(&server.uri(), "john", "pw").await.unwrap();
        assert_eq!(session.auth_token, "hdr-token");
        assert_eq!(session.user_id, "hdr-user");
        assert!(session.instance_id.is_none());
    }

    #[tokio::test]
    async fn test_login_without_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = client().login(&server.uri(), "john", "pw").await;
        assert!(matches!(result, Err(BackendError::Auth(_))));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let result = client().login(&server.uri(), "john", "bad").await;
        assert!(matches!(result, Err(BackendError::Auth(_))));
    }

    #[tokio::test]
    async fn test_subscriptions_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SUBSCRIPTIONS_PATH))
            .and(header("X-Auth-Token", "tok"))
            .and(header("X-User-Id", "uid"))
            .and(header("X-Instance-Id", "inst"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "update": [{"t": "c", "unread": 2}, {"t": "d", "unread": 1}],
                "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::new("tok", "uid").with_instance_id(Some("inst".to_string()));
        let records = client().fetch_subscriptions(&server.uri(), &session).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_subscriptions_401_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SUBSCRIPTIONS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let result = client()
            .fetch_subscriptions(&server.uri(), &Session::new("stale", "uid"))
            .await;
        assert!(matches!(result, Err(BackendError::AuthExpired)));
    }

    #[tokio::test]
    async fn test_subscriptions_retries_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SUBSCRIPTIONS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result = client()
            .fetch_subscriptions(&server.uri(), &Session::new("tok", "uid"))
            .await;
        assert!(matches!(
            result,
            Err(BackendError::Unavailable { attempts: 3, .. })
        ));
    }
}
