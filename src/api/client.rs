use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::api::error::{handle_error, ApiError};
use crate::api::models::Conversation;
use crate::api::ChatApi;
use crate::app::Settings;
use crate::storage::KeyValueStore;

const LOGIN_ROUTE: &str = "authentication/login";
const MESSAGES_ROUTE: &str = "chat/messages";
const CREATE_CONVERSATION_ROUTE: &str = "chat/create_conversation";
const MARK_MESSAGES_AS_READ_ROUTE: &str = "chat/mark_messages_as_read";

pub struct ApiClient {
    http: HttpClient,
    base: Url,
    tokens: KeyValueStore,
}

impl ApiClient {
    pub fn new(settings: &Settings, tokens: KeyValueStore) -> Result<Self, ApiError> {
        Self::with_base_url(&settings.api_base, tokens)
    }

    pub fn with_base_url(base_url: &str, tokens: KeyValueStore) -> Result<Self, ApiError> {
        let base = Url::parse(&crate::utils::normalize_url(base_url))?;
        Ok(Self {
            http: HttpClient::new(),
            base,
            tokens,
        })
    }

    pub fn tokens(&self) -> &KeyValueStore {
        &self.tokens
    }

    fn endpoint(&self, route: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(route)?)
    }

    /// An explicit token wins; otherwise the one persisted at sign-in is used.
    fn bearer(&self, token: Option<&str>) -> Result<String, ApiError> {
        match token {
            Some(t) => Ok(t.to_string()),
            None => self.tokens.access_token()?.ok_or(ApiError::NotAuthenticated),
        }
    }

    fn with_auth(req: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", token))
    }

    async fn read_json(resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let json = match serde_json::from_slice::<Value>(&bytes) {
            _ if bytes.iter().all(u8::is_ascii_whitespace) => Value::Null,
            Ok(json) => json,
            Err(_) if !status.is_success() => Value::Null,
            Err(e) => return Err(e.into()),
        };
        log::debug!("HTTP {} {}", status, json);
        if let Some(err) = handle_error(status, &json) {
            return Err(err);
        }
        if json.is_null() {
            return Err(ApiError::EmptyResponse);
        }
        Ok(json)
    }

    async fn send_decoded<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let resp = req.send().await?;
        let json = Self::read_json(resp).await?;
        Ok(serde_json::from_value(json)?)
    }

    /// Exchanges credentials for a bearer token. Persisting it is up to the
    /// caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let resp = self
            .http
            .post(self.endpoint(LOGIN_ROUTE)?)
            .json(&body)
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::InvalidCredentials);
        }
        let json = Self::read_json(resp).await?;
        json.get("auth_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(ApiError::MissingField("auth_token"))
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn conversations(&self, token: Option<&str>) -> Result<Vec<Conversation>, ApiError> {
        let token = self.bearer(token)?;
        let req = Self::with_auth(self.http.get(self.endpoint(MESSAGES_ROUTE)?), &token);
        Self::send_decoded(req).await
    }

    async fn create_conversation(
        &self,
        other_user_id: &str,
        token: Option<&str>,
    ) -> Result<Conversation, ApiError> {
        let token = self.bearer(token)?;
        let body = serde_json::json!({ "user_id": other_user_id });
        let req = Self::with_auth(
            self.http.post(self.endpoint(CREATE_CONVERSATION_ROUTE)?).json(&body),
            &token,
        );
        Self::send_decoded(req).await
    }

    async fn mark_messages_as_read(
        &self,
        conversation_id: &str,
        token: Option<&str>,
    ) -> Result<Conversation, ApiError> {
        let token = self.bearer(token)?;
        let body = serde_json::json!({ "conversation_id": conversation_id });
        let req = Self::with_auth(
            self.http.post(self.endpoint(MARK_MESSAGES_AS_READ_ROUTE)?).json(&body),
            &token,
        );
        Self::send_decoded(req).await
    }
}
