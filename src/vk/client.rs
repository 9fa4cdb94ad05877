//! VK API client over plain HTTPS.
//!
//! Every method is called as `POST https://api.vk.com/method/<name>` with the
//! access token and API version as form fields. Responses are wrapped in
//! `{"response": ...}` or `{"error": {...}}`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{City, FoundUser, MessageGateway, OutboundMessage, Photo, SearchQuery, VkApi};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{RecoveryConfig, PHOTOS_FETCH_COUNT};
use crate::errors::VkError;
use crate::store::UserName;

pub const API_BASE_URL: &str = "https://api.vk.com/method";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ItemsPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Decode a VK API response body
pub(crate) fn decode_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<T, VkError> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    if let Some(error) = envelope.error {
        return Err(VkError::Api {
            code: error.error_code,
            message: error.error_msg,
        });
    }
    envelope
        .response
        .ok_or_else(|| VkError::EmptyResponse(method.to_string()))
}

/// Client bound to one access token
pub struct VkClient {
    http: reqwest::Client,
    token: String,
    api_version: String,
    base_url: String,
    breaker: CircuitBreaker,
}

impl VkClient {
    pub fn new(token: &str, api_version: &str, recovery: &RecoveryConfig) -> Result<Self, VkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(recovery.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            token: token.to_string(),
            api_version: api_version.to_string(),
            base_url: API_BASE_URL.to_string(),
            breaker: CircuitBreaker::new(recovery.clone()),
        })
    }

    /// Point the client at another API host
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Call an API method and decode its `response` payload
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, VkError> {
        if self.breaker.is_open() {
            warn!(method, "VK API circuit open, request rejected");
            return Err(VkError::CircuitOpen);
        }

        let result = self.send_request(method, params).await;
        match &result {
            Ok(_) | Err(VkError::Api { .. }) => self.breaker.record_success(),
            Err(e) => {
                warn!(method, error = %e, "VK API request failed");
                self.breaker.record_failure();
            }
        }
        result
    }

    async fn send_request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, VkError> {
        let mut form: Vec<(&str, String)> = Vec::with_capacity(params.len() + 2);
        form.extend(params.iter().cloned());
        form.push(("access_token", self.token.clone()));
        form.push(("v", self.api_version.clone()));

        debug!(method, "Calling VK API");
        let body = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        decode_envelope(method, &body)
    }
}

#[async_trait]
impl VkApi for VkClient {
    async fn search_users(&self, query: &SearchQuery) -> Result<Vec<FoundUser>, VkError> {
        let page: ItemsPage<FoundUser> = self.call("users.search", &query.params()).await?;
        Ok(page.items)
    }

    async fn profile_photos(&self, owner_id: i64) -> Result<Vec<Photo>, VkError> {
        let params = [
            ("owner_id", owner_id.to_string()),
            ("album_id", "profile".to_string()),
            ("extended", "1".to_string()),
            ("count", PHOTOS_FETCH_COUNT.to_string()),
        ];
        let page: ItemsPage<Photo> = self.call("photos.get", &params).await?;
        Ok(page.items)
    }

    async fn find_city(&self, name: &str) -> Result<Option<City>, VkError> {
        let params = [
            ("country_id", super::DEFAULT_COUNTRY_ID.to_string()),
            ("count", "1".to_string()),
            ("q", name.to_string()),
        ];
        let page: ItemsPage<City> = self.call("database.getCities", &params).await?;
        Ok(page.items.into_iter().next())
    }

    async fn user_name(&self, user_id: i64) -> Result<UserName, VkError> {
        #[derive(Deserialize)]
        struct NamedUser {
            first_name: String,
            last_name: String,
        }

        let users: Vec<NamedUser> = self
            .call("users.get", &[("user_ids", user_id.to_string())])
            .await?;
        users
            .into_iter()
            .next()
            .map(|user| UserName {
                first_name: user.first_name,
                last_name: user.last_name,
            })
            .ok_or_else(|| VkError::EmptyResponse("users.get".to_string()))
    }
}

#[async_trait]
impl MessageGateway for VkClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), VkError> {
        let mut params = vec![
            ("user_id", message.user_id.to_string()),
            ("random_id", rand::random::<i32>().to_string()),
            ("message", message.text.clone()),
        ];
        if !message.attachments.is_empty() {
            params.push(("attachment", message.attachments.join(",")));
        }
        if let Some(keyboard) = &message.keyboard {
            params.push(("keyboard", keyboard.to_json()?));
        }

        let _message_id: serde_json::Value = self.call("messages.send", &params).await?;
        debug!(user_id = message.user_id, "Message sent");
        Ok(())
    }
}
