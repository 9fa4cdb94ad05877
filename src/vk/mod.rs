//! VK API integration
//!
//! - `client`: HTTP client for API methods, used with both the user and the community token
//! - `longpoll`: Bots Long Poll listener for inbound messages
//! - `keyboard`: reply keyboard payload

pub mod client;
pub mod keyboard;
pub mod longpoll;

use async_trait::async_trait;
use serde::Deserialize;

use crate::dialogue::{AgeRange, Gender};
use crate::errors::VkError;
use crate::store::UserName;

pub use client::VkClient;
pub use keyboard::{Button, ButtonColor, Keyboard};
pub use longpoll::{InboundMessage, LongPoll};

/// `status` filter value for "actively searching"
pub const STATUS_ACTIVELY_SEARCHING: u8 = 6;
/// `country` filter value for Russia
pub const DEFAULT_COUNTRY_ID: u8 = 1;

/// One `users.search` result
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FoundUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Private profile
    #[serde(default)]
    pub is_closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Likes {
    pub count: u32,
}

/// One `photos.get` item with `extended=1`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub likes: Likes,
}

impl Photo {
    /// Attachment reference, `photo<owner_id>_<photo_id>`
    pub fn attachment(&self) -> String {
        format!("photo{}_{}", self.owner_id, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct City {
    pub id: i64,
    pub title: String,
}

/// A single-result page of the people search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchQuery {
    pub offset: i32,
    pub city_id: i64,
    pub gender: Gender,
    pub age_range: AgeRange,
}

impl SearchQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("count", "1".to_string()),
            ("offset", self.offset.to_string()),
            ("city", self.city_id.to_string()),
            ("country", DEFAULT_COUNTRY_ID.to_string()),
            ("sex", self.gender.code().to_string()),
            ("age_from", self.age_range.min.to_string()),
            ("age_to", self.age_range.max.to_string()),
            ("fields", "is_closed".to_string()),
            ("status", STATUS_ACTIVELY_SEARCHING.to_string()),
            ("has_photo", "1".to_string()),
        ]
    }
}

/// Reply to one user: text, optional attachments and keyboard
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub user_id: i64,
    pub text: String,
    pub attachments: Vec<String>,
    pub keyboard: Option<Keyboard>,
}

impl OutboundMessage {
    pub fn text(user_id: i64, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
            attachments: Vec::new(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// People search and profile lookups, performed with the user token
#[async_trait]
pub trait VkApi: Send + Sync {
    async fn search_users(&self, query: &SearchQuery) -> Result<Vec<FoundUser>, VkError>;

    /// Photos of the profile album
    async fn profile_photos(&self, owner_id: i64) -> Result<Vec<Photo>, VkError>;

    /// Best match for a city name, `None` if nothing matches
    async fn find_city(&self, name: &str) -> Result<Option<City>, VkError>;

    async fn user_name(&self, user_id: i64) -> Result<UserName, VkError>;
}

/// Outbound messages, sent with the community token
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), VkError>;
}
