//! Dialogue Manager module for handling dialogue state transitions
//!
//! One call to [`DialogueManager::handle_message`] is one turn: the stored
//! position decides how the text is read, side effects are applied, a reply
//! is sent and the new position is persisted. Failures never escape a turn;
//! they are turned into a chat reply according to their kind.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::SearchConfig;
use crate::dialogue::{parse_age_range, parse_favorite_id, Gender, Position};
use crate::errors::{DialogError, StoreError};
use crate::localization::{t_args_lang, t_lang};
use crate::search::{CandidateSearch, SearchOutcome};
use crate::store::{CriteriaUpdate, PreferenceStore};
use crate::vk::{Keyboard, MessageGateway, OutboundMessage, VkApi};

use super::commands::{self, Choice};
use super::ui_builder::{
    browse_keyboard, favorites_keyboard, format_favorites_list, format_offer, gender_keyboard,
    start_keyboard,
};

pub struct DialogueManager {
    store: Arc<dyn PreferenceStore>,
    api: Arc<dyn VkApi>,
    gateway: Arc<dyn MessageGateway>,
    search: CandidateSearch,
    language: String,
}

impl DialogueManager {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        api: Arc<dyn VkApi>,
        gateway: Arc<dyn MessageGateway>,
        search_config: SearchConfig,
        language: &str,
    ) -> Self {
        let search = CandidateSearch::new(Arc::clone(&api), Arc::clone(&store), search_config);
        Self {
            store,
            api,
            gateway,
            search,
            language: language.to_string(),
        }
    }

    /// Process one inbound message from `user_id`
    pub async fn handle_message(&self, user_id: i64, raw_text: &str) {
        let text = raw_text.trim().to_lowercase();
        if let Err(e) = self.process(user_id, &text).await {
            self.handle_failure(user_id, e).await;
        }
    }

    async fn process(&self, user_id: i64, text: &str) -> Result<(), DialogError> {
        if commands::is_exit(text) {
            info!(user_id, "User left the dialogue");
            self.store.set_position(user_id, Position::Fresh).await?;
            return self.send(self.reply(user_id, "goodbye")).await;
        }

        let position = self
            .store
            .get_position(user_id)
            .await?
            .map(|row| row.position)
            .unwrap_or_default();
        debug!(user_id, position = ?position, "Dispatching message");

        if commands::is_greeting(text) {
            return self.welcome(user_id).await;
        }
        if position != Position::Fresh && Choice::ChangeCriteria.matches(text) {
            return self.prompt_city(user_id).await;
        }

        match position {
            Position::Fresh => self.welcome(user_id).await,
            Position::AwaitingStart => self.handle_start_confirmation(user_id, text).await,
            Position::AwaitingCity => self.handle_city_input(user_id, text).await,
            Position::AwaitingAgeRange => self.handle_age_range_input(user_id, text).await,
            Position::AwaitingGender => self.handle_gender_input(user_id, text).await,
            Position::Browsing => self.handle_browsing_input(user_id, text).await,
            Position::ViewingFavorites => self.handle_favorites_input(user_id, text).await,
            Position::AwaitingRemovalId => self.handle_removal_id_input(user_id, text).await,
        }
    }

    async fn handle_failure(&self, user_id: i64, err: DialogError) {
        match err {
            DialogError::Api(e) => {
                error!(user_id, error = %e, "VK API failure, restarting dialogue");
                if let Err(e) = self.store.restart(user_id, Position::AwaitingStart).await {
                    error!(user_id, error = %e, "Failed to reset dialogue position");
                }
                self.notify_server_error(user_id).await;
            }
            DialogError::Store(StoreError::InvalidPosition(code)) => {
                error!(user_id, code, "Stored dialogue position is invalid");
                self.notify_server_error(user_id).await;
            }
            DialogError::Store(e) => {
                error!(user_id, error = %e, "Storage failure");
                self.notify_server_error(user_id).await;
            }
            DialogError::Delivery(e) => {
                warn!(user_id, error = %e, "Failed to deliver message");
            }
        }
    }

    async fn notify_server_error(&self, user_id: i64) {
        if let Err(e) = self.gateway.send(&self.reply(user_id, "server-error")).await {
            warn!(user_id, error = %e, "Failed to deliver error notice");
        }
    }

    fn reply(&self, user_id: i64, key: &str) -> OutboundMessage {
        OutboundMessage::text(user_id, t_lang(key, &self.language))
    }

    fn reply_with(&self, user_id: i64, key: &str, keyboard: Keyboard) -> OutboundMessage {
        self.reply(user_id, key).with_keyboard(keyboard)
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), DialogError> {
        self.gateway
            .send(&message)
            .await
            .map_err(DialogError::Delivery)
    }

    /// Greeting or first contact: register the user and offer the Start button
    async fn welcome(&self, user_id: i64) -> Result<(), DialogError> {
        let created = self.store.create_profile(user_id).await?;
        self.store.register_position(user_id).await?;
        info!(user_id, new_user = created, "Welcome sent");

        self.send(self.reply_with(user_id, "welcome", start_keyboard(&self.language)))
            .await
    }

    /// Start (or restart) collecting criteria from the city question
    async fn prompt_city(&self, user_id: i64) -> Result<(), DialogError> {
        self.store.restart(user_id, Position::AwaitingCity).await?;
        self.send(self.reply(user_id, "prompt-city")).await
    }

    async fn handle_start_confirmation(&self, user_id: i64, text: &str) -> Result<(), DialogError> {
        if commands::is_start(text) {
            return self.prompt_city(user_id).await;
        }
        self.send(self.reply_with(user_id, "unknown-command", start_keyboard(&self.language)))
            .await
    }

    async fn handle_city_input(&self, user_id: i64, text: &str) -> Result<(), DialogError> {
        // Attachment-only messages arrive with empty text
        if text.is_empty() {
            return self.send(self.reply(user_id, "city-unknown")).await;
        }

        match self.api.find_city(text).await? {
            Some(city) => {
                info!(user_id, city_id = city.id, city = %city.title, "City resolved");
                self.store
                    .update_criteria(user_id, CriteriaUpdate::City(city.id))
                    .await?;
                self.store
                    .set_position(user_id, Position::AwaitingAgeRange)
                    .await?;
                self.send(self.reply(user_id, "prompt-age-range")).await
            }
            None => {
                debug!(user_id, query = %text, "City not found");
                self.send(self.reply(user_id, "city-unknown")).await
            }
        }
    }

    async fn handle_age_range_input(&self, user_id: i64, text: &str) -> Result<(), DialogError> {
        match parse_age_range(text) {
            Ok(range) => {
                self.store
                    .update_criteria(user_id, CriteriaUpdate::AgeRange(range))
                    .await?;
                self.store
                    .set_position(user_id, Position::AwaitingGender)
                    .await?;
                self.send(self.reply_with(user_id, "prompt-gender", gender_keyboard(&self.language)))
                    .await
            }
            Err(reason) => {
                debug!(user_id, reason, "Age range rejected");
                self.send(self.reply(user_id, "age-range-unknown")).await
            }
        }
    }

    async fn handle_gender_input(&self, user_id: i64, text: &str) -> Result<(), DialogError> {
        let gender = match Choice::parse(text) {
            Some(Choice::Male) => Gender::Male,
            Some(Choice::Female) => Gender::Female,
            _ => {
                return self
                    .send(self.reply_with(user_id, "unknown-command", gender_keyboard(&self.language)))
                    .await;
            }
        };

        let name = self.api.user_name(user_id).await?;
        self.store.set_name(user_id, &name).await?;
        self.store
            .update_criteria(user_id, CriteriaUpdate::Gender(gender))
            .await?;
        self.store.set_position(user_id, Position::Browsing).await?;

        self.offer_next(user_id).await
    }

    async fn handle_browsing_input(&self, user_id: i64, text: &str) -> Result<(), DialogError> {
        match Choice::parse(text) {
            Some(Choice::Next) => self.offer_next(user_id).await,
            Some(Choice::Favorite) => {
                if self.favorite_latest(user_id).await? {
                    self.offer_next(user_id).await
                } else {
                    Ok(())
                }
            }
            Some(Choice::ListFavorites) => {
                self.store
                    .set_position(user_id, Position::ViewingFavorites)
                    .await?;
                self.show_favorites(user_id).await
            }
            _ => {
                self.send(self.reply_with(user_id, "unknown-command", browse_keyboard(&self.language)))
                    .await
            }
        }
    }

    async fn handle_favorites_input(&self, user_id: i64, text: &str) -> Result<(), DialogError> {
        match Choice::parse(text) {
            Some(Choice::ContinueSearch) => {
                self.store.set_position(user_id, Position::Browsing).await?;
                self.offer_next(user_id).await
            }
            Some(Choice::RemovePartner) => {
                self.store
                    .set_position(user_id, Position::AwaitingRemovalId)
                    .await?;
                self.send(self.reply(user_id, "prompt-removal-id")).await
            }
            _ => {
                self.send(self.reply_with(
                    user_id,
                    "unknown-command",
                    favorites_keyboard(&self.language),
                ))
                .await
            }
        }
    }

    async fn handle_removal_id_input(&self, user_id: i64, text: &str) -> Result<(), DialogError> {
        let favorite_ids = self.store.favorite_ids(user_id).await?;
        let candidate_id = parse_favorite_id(text).filter(|id| favorite_ids.contains(id));

        let Some(candidate_id) = candidate_id else {
            debug!(user_id, input = %text, "Removal id not among favorites");
            return self.send(self.reply(user_id, "removal-id-unknown")).await;
        };

        self.store.remove_favorite(user_id, candidate_id).await?;
        self.store.set_position(user_id, Position::Browsing).await?;
        info!(user_id, candidate_id, "Favorite removed");
        self.send(self.reply(user_id, "favorite-removed")).await?;

        self.offer_next(user_id).await
    }

    /// Copy the candidate currently on screen into the favorites.
    ///
    /// Returns `false` when no candidate has been offered yet.
    async fn favorite_latest(&self, user_id: i64) -> Result<bool, DialogError> {
        let Some(candidate) = self.store.latest_candidate(user_id).await? else {
            self.send(self.reply_with(user_id, "favorite-none", browse_keyboard(&self.language)))
                .await?;
            return Ok(false);
        };

        let key = if self.store.add_favorite(user_id, &candidate).await? {
            info!(user_id, candidate_id = candidate.candidate_id, "Favorite added");
            "favorite-added"
        } else {
            "favorite-already"
        };
        self.send(self.reply(user_id, key)).await?;
        Ok(true)
    }

    async fn show_favorites(&self, user_id: i64) -> Result<(), DialogError> {
        let favorites = self.store.favorites(user_id).await?;
        let text = format_favorites_list(&favorites, &self.language);
        self.send(OutboundMessage::text(user_id, text).with_keyboard(favorites_keyboard(&self.language)))
            .await
    }

    /// Run the candidate search and answer with its outcome
    async fn offer_next(&self, user_id: i64) -> Result<(), DialogError> {
        match self.search.find_candidate(user_id).await? {
            SearchOutcome::Offered(offer) => {
                let text = format_offer(&offer.candidate, &self.language);
                self.send(
                    OutboundMessage::text(user_id, text)
                        .with_attachments(offer.attachments)
                        .with_keyboard(browse_keyboard(&self.language)),
                )
                .await
            }
            SearchOutcome::PhotosUnavailable { candidate_id } => {
                debug!(user_id, candidate_id, "No offer sent this turn");
                Ok(())
            }
            SearchOutcome::SkipLimitReached { skipped } => {
                let text = t_args_lang(
                    "search-skip-limit",
                    &[("skipped", skipped.to_string().as_str())],
                    &self.language,
                );
                self.send(OutboundMessage::text(user_id, text).with_keyboard(browse_keyboard(&self.language)))
                    .await
            }
            SearchOutcome::Exhausted => {
                self.store.restart(user_id, Position::AwaitingStart).await?;
                self.send(self.reply_with(user_id, "search-exhausted", start_keyboard(&self.language)))
                    .await
            }
            SearchOutcome::MissingCriteria => self.prompt_city(user_id).await,
        }
    }
}
