//! Slack Web API client.
//!
//! The adapter only needs four calls (`auth.test`, `users.info`,
//! `chat.postMessage`, `chat.delete`), which sit behind [`SlackApi`] so the
//! channel can be exercised against in-memory fakes. [`HttpSlackApi`] is the
//! reqwest implementation and also carries the extra queries the diagnostics
//! CLI uses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use slackbridge_core::config::SlackConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to build slack http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("slack api request `{method}` failed: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("slack api `{method}` returned HTTP {status}")]
    Status { method: &'static str, status: u16 },
    #[error("slack api `{method}` rejected the call: {error}")]
    Slack {
        method: &'static str,
        error: String,
        needed: Option<String>,
        provided: Option<String>,
    },
    #[error("slack api `{method}` returned an unexpected body: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// Slack's own error code (`channel_not_found`, `invalid_auth`, ...) when
    /// the platform answered with `ok: false`.
    pub fn slack_error(&self) -> Option<&str> {
        match self {
            Self::Slack { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub user_id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

impl UserProfile {
    /// `real_name`, then `name`; blank values do not count.
    pub fn display_name(&self) -> Option<&str> {
        [self.real_name.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .find(|candidate| !candidate.trim().is_empty())
    }
}

/// Body of a `chat.postMessage` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PostMessageRequest {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PostedMessage {
    pub ts: String,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DirectChannel {
    pub id: String,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantedScopes {
    pub identity: AuthIdentity,
    /// Raw `x-oauth-scopes` header; Slack omits it for some token types.
    pub scopes: Option<String>,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn auth_test(&self) -> Result<AuthIdentity, ApiError>;
    async fn user_info(&self, user_id: &str) -> Result<UserProfile, ApiError>;
    async fn post_message(&self, request: &PostMessageRequest) -> Result<PostedMessage, ApiError>;
    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ApiError>;
}

pub struct HttpSlackApi {
    client: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl HttpSlackApi {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client =
            reqwest::Client::builder().timeout(request_timeout).build().map_err(ApiError::Client)?;
        Ok(Self { client, base_url: base_url.into(), bot_token })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, ApiError> {
        Self::new(
            config.api_base_url.clone(),
            config.bot_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url.trim_end_matches('/'))
    }

    fn bot_request(&self, http_method: reqwest::Method, method: &str) -> RequestBuilder {
        self.client
            .request(http_method, self.endpoint(method))
            .bearer_auth(self.bot_token.expose_secret())
    }

    /// Asks Slack for a fresh Socket Mode WebSocket URL. Uses the app-level
    /// token, not the bot token.
    pub async fn open_socket_connection(&self, app_token: &SecretString) -> Result<String, ApiError> {
        const METHOD: &str = "apps.connections.open";
        let request = self
            .client
            .post(self.endpoint(METHOD))
            .bearer_auth(app_token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded");

        #[derive(Deserialize)]
        struct ConnectionsOpen {
            url: String,
        }

        let (_, body) = send(METHOD, request).await?;
        decode::<ConnectionsOpen>(METHOD, body).map(|open| open.url)
    }

    pub async fn list_direct_messages(&self, limit: u32) -> Result<Vec<DirectChannel>, ApiError> {
        const METHOD: &str = "conversations.list";
        let request = self
            .bot_request(reqwest::Method::GET, METHOD)
            .query(&[("types", "im".to_string()), ("limit", limit.to_string())]);

        #[derive(Deserialize)]
        struct ConversationsList {
            #[serde(default)]
            channels: Vec<DirectChannel>,
        }

        let (_, body) = send(METHOD, request).await?;
        decode::<ConversationsList>(METHOD, body).map(|list| list.channels)
    }

    pub async fn granted_scopes(&self) -> Result<GrantedScopes, ApiError> {
        const METHOD: &str = "auth.test";
        let (headers, body) = send(METHOD, self.bot_request(reqwest::Method::POST, METHOD)).await?;
        let scopes = headers
            .get("x-oauth-scopes")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Ok(GrantedScopes { identity: decode(METHOD, body)?, scopes })
    }
}

#[async_trait]
impl SlackApi for HttpSlackApi {
    async fn auth_test(&self) -> Result<AuthIdentity, ApiError> {
        const METHOD: &str = "auth.test";
        let (_, body) = send(METHOD, self.bot_request(reqwest::Method::POST, METHOD)).await?;
        decode(METHOD, body)
    }

    async fn user_info(&self, user_id: &str) -> Result<UserProfile, ApiError> {
        const METHOD: &str = "users.info";
        let request = self.bot_request(reqwest::Method::GET, METHOD).query(&[("user", user_id)]);

        #[derive(Deserialize)]
        struct UsersInfo {
            user: UserProfile,
        }

        let (_, body) = send(METHOD, request).await?;
        decode::<UsersInfo>(METHOD, body).map(|info| info.user)
    }

    async fn post_message(&self, request: &PostMessageRequest) -> Result<PostedMessage, ApiError> {
        const METHOD: &str = "chat.postMessage";
        let builder = self.bot_request(reqwest::Method::POST, METHOD).json(request);
        let (_, body) = send(METHOD, builder).await?;
        decode(METHOD, body)
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ApiError> {
        const METHOD: &str = "chat.delete";
        let builder = self
            .bot_request(reqwest::Method::POST, METHOD)
            .json(&serde_json::json!({ "channel": channel, "ts": ts }));
        send(METHOD, builder).await.map(|_| ())
    }
}

async fn send(method: &'static str, request: RequestBuilder) -> Result<(HeaderMap, Value), ApiError> {
    let response = request.send().await.map_err(|source| ApiError::Http { method, source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status { method, status: status.as_u16() });
    }

    let headers = response.headers().clone();
    let body: Value = response.json().await.map_err(|source| ApiError::Http { method, source })?;

    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_owned);
        return Err(ApiError::Slack {
            method,
            error: field("error").unwrap_or_else(|| "unknown_error".to_owned()),
            needed: field("needed"),
            provided: field("provided"),
        });
    }

    Ok((headers, body))
}

fn decode<T: DeserializeOwned>(method: &'static str, body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|source| ApiError::Decode { method, source })
}
