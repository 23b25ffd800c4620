//! Pachca REST client.
//!
//! The public API is authenticated with a bearer token. The internal API
//! (`/chats/unread_ids`) needs a browser session cookie and is only used
//! when one is configured.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{BackendError, Result};
use crate::retry::RetryPolicy;

/// Number of recent messages inspected per chat.
pub const DEFAULT_MESSAGE_LIMIT: u32 = 30;

/// Envelope fields that may hold a list, in precedence order.
const LIST_ENVELOPE_FIELDS: &[&str] = &["data", "items"];

const MAX_LOGGED_BODY: usize = 2000;

/// Accepts ids sent either as strings or numbers.
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected id, got {}", other))),
    }
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("expected id, got {}", other))),
    }
}

/// A chat message, reduced to what unread detection needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PachcaMessage {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub author_id: Option<String>,
}

/// A reader of a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PachcaReader {
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,
}

#[derive(Deserialize)]
struct IdItem(#[serde(deserialize_with = "deserialize_id")] String);

/// Operations the Pachca watcher needs.
#[async_trait]
pub trait PachcaApi: Send + Sync {
    /// Most recent messages of a chat.
    async fn get_chat_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<PachcaMessage>>;

    /// Users who have read a message.
    async fn get_message_readers(&self, chat_id: &str, message_id: &str) -> Result<Vec<PachcaReader>>;

    /// Chats with unread messages, via the internal API.
    async fn get_unread_chat_ids(&self) -> Result<Vec<String>>;

    /// Whether [`PachcaApi::get_unread_chat_ids`] is available.
    fn can_use_internal_api(&self) -> bool;
}

/// Client for the Pachca public and internal APIs.
#[derive(Clone)]
pub struct PachcaClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    internal_base_url: String,
    internal_cookie: Option<String>,
    retry: RetryPolicy,
}

impl PachcaClient {
    /// Create a client for `base_url` using a bearer token.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            internal_base_url: String::new(),
            internal_cookie: None,
            retry: RetryPolicy::default(),
        })
    }

    /// Enable the internal API with a session cookie.
    pub fn with_internal_api(mut self, base_url: impl Into<String>, cookie: Option<String>) -> Self {
        self.internal_base_url = base_url.into().trim_end_matches('/').to_string();
        self.internal_cookie = cookie.filter(|c| !c.is_empty());
        self
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)], internal: bool) -> Result<Value> {
        let mut request = self.client.get(url).header("Content-Type", "application/json");
        request = if internal {
            let cookie = self
                .internal_cookie
                .as_deref()
                .ok_or(BackendError::NotConfigured("internal Pachca auth cookie"))?;
            request.header("Cookie", cookie)
        } else {
            request.bearer_auth(&self.access_token)
        };
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::AuthExpired);
        }
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn request_list<T: DeserializeOwned>(
        &self,
        url: String,
        query: Vec<(&str, String)>,
        internal: bool,
    ) -> Result<Vec<T>> {
        let body = self
            .retry
            .run("pachca request", || self.get_json(&url, &query, internal))
            .await?;
        log_body(&url, &body);
        unwrap_list(body)
    }
}

/// Accepts a bare array, or an object holding it under `data` or `items`.
fn unwrap_list<T: DeserializeOwned>(body: Value) -> Result<Vec<T>> {
    let list = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => LIST_ENVELOPE_FIELDS
            .iter()
            .find_map(|field| map.remove(*field).filter(|v| !v.is_null()))
            .unwrap_or(Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    };
    serde_json::from_value(list).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

fn log_body(url: &str, body: &Value) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let mut serialized = body.to_string();
    if serialized.len() > MAX_LOGGED_BODY {
        let mut end = MAX_LOGGED_BODY;
        while !serialized.is_char_boundary(end) {
            end -= 1;
        }
        serialized.truncate(end);
        serialized.push_str("...");
    }
    trace!(url, body = %serialized, "pachca response");
}

#[async_trait]
impl PachcaApi for PachcaClient {
    async fn get_chat_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<PachcaMessage>> {
        let url = format!("{}/chats/{}/messages", self.base_url, chat_id);
        let messages: Vec<PachcaMessage> = self
            .request_list(url, vec![("limit", limit.to_string())], false)
            .await?;
        debug!(chat = chat_id, count = messages.len(), "fetched pachca messages");
        Ok(messages)
    }

    async fn get_message_readers(&self, chat_id: &str, message_id: &str) -> Result<Vec<PachcaReader>> {
        let url = format!("{}/chats/{}/messages/{}/readers", self.base_url, chat_id, message_id);
        self.request_list(url, Vec::new(), false).await
    }

    async fn get_unread_chat_ids(&self) -> Result<Vec<String>> {
        if self.internal_cookie.is_none() {
            return Err(BackendError::NotConfigured("internal Pachca auth cookie"));
        }
        let url = format!("{}/chats/unread_ids", self.internal_base_url);
        let ids: Vec<IdItem> = self.request_list(url, Vec::new(), true).await?;
        Ok(ids.into_iter().map(|IdItem(id)| id).collect())
    }

    fn can_use_internal_api(&self) -> bool {
        self.internal_cookie.is_some()
    }
}

impl fmt::Debug for PachcaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PachcaClient")
            .field("base_url", &self.base_url)
            .field("internal_base_url", &self.internal_base_url)
            .field("internal_api", &self.internal_cookie.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> PachcaClient {
        PachcaClient::new(format!("{}/api/shared/v1/", server.uri()), "secret-token")
            .unwrap()
            .with_retry_policy(RetryPolicy::default().with_base_delay(Duration::from_millis(1)))
    }

    #[test]
    fn test_unwrap_list_shapes() {
        let ids = |v: Value| -> Vec<String> {
            unwrap_list::<IdItem>(v).unwrap().into_iter().map(|IdItem(id)| id).collect()
        };
        assert_eq!(ids(json!([1, "2"])), vec!["1", "2"]);
        assert_eq!(ids(json!({"data": [3]})), vec!["3"]);
        assert_eq!(ids(json!({"items": ["4"]})), vec!["4"]);
        assert!(ids(json!({"meta": {}})).is_empty());
        assert!(ids(json!("oops")).is_empty());
    }

    #[tokio::test]
    async fn test_get_chat_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shared/v1/chats/42/messages"))
            .and(query_param("limit", "30"))
            .and(header("Authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": 1, "author_id": 7, "content": "hi"},
                    {"id": "2", "author_id": null}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let messages = client(&server)
            .get_chat_messages("42", DEFAULT_MESSAGE_LIMIT)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].author_id.as_deref(), Some("7"));
        assert_eq!(messages[1].id, "2");
        assert!(messages[1].author_id.is_none());
    }

    #[tokio::test]
    async fn test_get_message_readers_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shared/v1/chats/42/messages/1/readers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"user_id": 7}])))
            .mount(&server)
            .await;

        let readers = client(&server).get_message_readers("42", "1").await.unwrap();
        assert_eq!(readers, vec![PachcaReader { user_id: "7".to_string() }]);
    }

    #[tokio::test]
    async fn test_unread_ids_uses_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/chats/unread_ids"))
            .and(header("Cookie", "jwt=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [10, 11]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server)
            .with_internal_api(format!("{}/api/v3", server.uri()), Some("jwt=abc".to_string()));
        assert!(client.can_use_internal_api());
        assert_eq!(client.get_unread_chat_ids().await.unwrap(), vec!["10", "11"]);
    }

    #[tokio::test]
    async fn test_unread_ids_without_cookie() {
        let server = MockServer::start().await;
        let client = client(&server);
        assert!(!client.can_use_internal_api());
        assert!(matches!(
            client.get_unread_chat_ids().await,
            Err(BackendError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shared/v1/chats/1/messages"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let result = client(&server).get_chat_messages("1", 30).await;
        assert!(matches!(result, Err(BackendError::Unavailable { .. })));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let client = PachcaClient::new("https://api.example", "secret-token")
            .unwrap()
            .with_internal_api("https://app.example", Some("jwt=abc".to_string()));
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("jwt=abc"));
    }
}
