//! Bots Long Poll listener.
//!
//! Requests a server with `groups.getLongPollServer`, then repeatedly waits on
//! `act=a_check`. Only `message_new` events from private chats are surfaced.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::VkClient;
use crate::config::LONG_POLL_WAIT_SECS;
use crate::errors::VkError;

/// Peer ids from this value up are group chats
const CHAT_PEER_ID_OFFSET: i64 = 2_000_000_000;

/// A text message from a user, as delivered by the long poll server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LongPollServer {
    key: String,
    server: String,
    #[serde(deserialize_with = "ts_as_string")]
    ts: String,
}

fn ts_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_ts(&value).unwrap_or_default())
}

fn value_to_ts(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// What one `a_check` answer asks the listener to do
#[derive(Debug, PartialEq)]
pub(crate) enum PollResult {
    Updates { ts: String, messages: Vec<InboundMessage> },
    /// History partially lost, continue from the new `ts`
    OutdatedTs(String),
    /// Key expired or server state lost, request a new server
    Refresh,
}

pub(crate) fn parse_poll_response(body: &Value) -> Result<PollResult, VkError> {
    if let Some(failed) = body.get("failed").and_then(Value::as_i64) {
        return match failed {
            1 => body
                .get("ts")
                .and_then(value_to_ts)
                .map(PollResult::OutdatedTs)
                .ok_or_else(|| VkError::LongPoll("failed=1 without ts".to_string())),
            2 | 3 => Ok(PollResult::Refresh),
            other => Err(VkError::LongPoll(format!("unknown failure code {other}"))),
        };
    }

    let ts = body
        .get("ts")
        .and_then(value_to_ts)
        .ok_or_else(|| VkError::LongPoll("response without ts".to_string()))?;
    let messages = body
        .get("updates")
        .and_then(Value::as_array)
        .map(|updates| updates.iter().filter_map(parse_message_new).collect())
        .unwrap_or_default();

    Ok(PollResult::Updates { ts, messages })
}

fn parse_message_new(update: &Value) -> Option<InboundMessage> {
    if update.get("type").and_then(Value::as_str) != Some("message_new") {
        return None;
    }
    let message = update.get("object")?.get("message")?;
    let peer_id = message.get("peer_id").and_then(Value::as_i64)?;
    let from_id = message.get("from_id").and_then(Value::as_i64)?;
    if peer_id >= CHAT_PEER_ID_OFFSET || from_id <= 0 {
        return None;
    }
    let text = message
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(InboundMessage {
        user_id: from_id,
        text,
    })
}

/// Long poll session for one community
pub struct LongPoll {
    client: Arc<VkClient>,
    group_id: i64,
    server: Option<LongPollServer>,
}

impl LongPoll {
    pub fn new(client: Arc<VkClient>, group_id: i64) -> Self {
        Self {
            client,
            group_id,
            server: None,
        }
    }

    async fn refresh_server(&mut self) -> Result<LongPollServer, VkError> {
        let server: LongPollServer = self
            .client
            .call(
                "groups.getLongPollServer",
                &[("group_id", self.group_id.to_string())],
            )
            .await?;
        info!(group_id = self.group_id, "Long poll server acquired");
        self.server = Some(server.clone());
        Ok(server)
    }

    /// Wait for the next batch of inbound messages.
    ///
    /// May return an empty batch when the wait times out or the server
    /// asks for a new key.
    pub async fn next_batch(&mut self) -> Result<Vec<InboundMessage>, VkError> {
        let server = match self.server.clone() {
            Some(server) => server,
            None => self.refresh_server().await?,
        };

        let params = [
            ("act", "a_check".to_string()),
            ("key", server.key.clone()),
            ("ts", server.ts.clone()),
            ("wait", LONG_POLL_WAIT_SECS.to_string()),
        ];
        let body: Value = self
            .client
            .http()
            .get(&server.server)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match parse_poll_response(&body)? {
            PollResult::Updates { ts, messages } => {
                debug!(count = messages.len(), "Long poll batch received");
                if let Some(current) = self.server.as_mut() {
                    current.ts = ts;
                }
                Ok(messages)
            }
            PollResult::OutdatedTs(ts) => {
                warn!("Long poll history outdated, skipping to latest ts");
                if let Some(current) = self.server.as_mut() {
                    current.ts = ts;
                }
                Ok(Vec::new())
            }
            PollResult::Refresh => {
                warn!("Long poll key expired, requesting a new server");
                self.server = None;
                Ok(Vec::new())
            }
        }
    }
}
