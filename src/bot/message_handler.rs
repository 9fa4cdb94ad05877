//! Message Handler module for routing inbound VK messages to dialogue turns

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::vk::{InboundMessage, LongPoll};

use super::dialogue_manager::DialogueManager;
use super::user_locks::UserLocks;

/// Pause after a failed long poll request before polling again
pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Messages of one user from a single batch, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBatch {
    pub user_id: i64,
    pub texts: Vec<String>,
}

/// Group a long poll batch by sender, keeping first-seen sender order and
/// per-sender message order
pub fn group_by_user(messages: Vec<InboundMessage>) -> Vec<UserBatch> {
    let mut batches: Vec<UserBatch> = Vec::new();
    for message in messages {
        match batches.iter_mut().find(|b| b.user_id == message.user_id) {
            Some(batch) => batch.texts.push(message.text),
            None => batches.push(UserBatch {
                user_id: message.user_id,
                texts: vec![message.text],
            }),
        }
    }
    batches
}

/// Run one user's messages as consecutive turns under that user's lock
pub async fn message_handler(dialogue: Arc<DialogueManager>, locks: Arc<UserLocks>, batch: UserBatch) {
    let _guard = locks.acquire(batch.user_id).await;
    for text in &batch.texts {
        debug!(user_id = batch.user_id, text_length = text.len(), "Handling message");
        dialogue.handle_message(batch.user_id, text).await;
    }
}

/// Poll for messages until Ctrl-C, spawning one task per sender and batch
pub async fn run_long_poll(mut poll: LongPoll, dialogue: Arc<DialogueManager>) -> Result<()> {
    let locks = Arc::new(UserLocks::new());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Listening for messages");
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("Shutdown requested, stopping long poll");
                return Ok(());
            }
            batch = poll.next_batch() => match batch {
                Ok(messages) => {
                    for user_batch in group_by_user(messages) {
                        tokio::spawn(message_handler(
                            Arc::clone(&dialogue),
                            Arc::clone(&locks),
                            user_batch,
                        ));
                    }
                }
                Err(e) => {
                    error!(error = %e, "Long poll request failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }
}
