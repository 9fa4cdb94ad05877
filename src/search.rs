//! # Candidate Search Module
//!
//! Pages through `users.search` one result at a time, skipping private
//! profiles and candidates the user has already seen, and produces at most one
//! offer per call.
//!
//! Every attempt, accepted or skipped, advances the stored offset by one.
//! The loop is bounded by [`SearchConfig::max_skipped_candidates`].

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::errors::DialogError;
use crate::store::{CandidateRecord, PreferenceStore};
use crate::vk::{Photo, SearchQuery, VkApi};

/// A candidate ready to be shown, with photo attachment references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub candidate: CandidateRecord,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Offered(Offer),
    /// The candidate had no usable photos; nothing is shown this turn
    PhotosUnavailable { candidate_id: i64 },
    /// Too many private or already-shown profiles in a row
    SkipLimitReached { skipped: u32 },
    /// The search returned no more results for the current criteria
    Exhausted,
    /// City, age range or gender has not been answered yet
    MissingCriteria,
}

/// Top-liked photos as attachment references, most liked first
pub fn rank_photos(mut photos: Vec<Photo>, limit: usize) -> Vec<String> {
    photos.sort_by(|a, b| b.likes.count.cmp(&a.likes.count));
    photos.iter().take(limit).map(Photo::attachment).collect()
}

pub struct CandidateSearch {
    api: Arc<dyn VkApi>,
    store: Arc<dyn PreferenceStore>,
    config: SearchConfig,
}

impl CandidateSearch {
    pub fn new(api: Arc<dyn VkApi>, store: Arc<dyn PreferenceStore>, config: SearchConfig) -> Self {
        Self { api, store, config }
    }

    /// Find the next candidate to offer to `user_id`.
    ///
    /// Errors from `users.search` and from the store are returned; a failed
    /// photo lookup only suppresses the offer.
    pub async fn find_candidate(&self, user_id: i64) -> Result<SearchOutcome, DialogError> {
        let criteria = match self.store.get_profile(user_id).await? {
            Some(profile) => profile.criteria(),
            None => None,
        };
        let Some(criteria) = criteria else {
            warn!(user_id, "Search requested without complete criteria");
            return Ok(SearchOutcome::MissingCriteria);
        };

        let mut offset = self
            .store
            .get_position(user_id)
            .await?
            .map(|row| row.offset)
            .unwrap_or(0);
        let avoid: HashSet<i64> = self.store.avoid_list(user_id).await?.into_iter().collect();

        let mut skipped = 0;
        loop {
            let query = SearchQuery {
                offset,
                city_id: criteria.city_id,
                gender: criteria.gender,
                age_range: criteria.age_range,
            };
            let found = self.api.search_users(&query).await?;
            let Some(candidate) = found.into_iter().next() else {
                info!(user_id, offset, "Search exhausted for current criteria");
                return Ok(SearchOutcome::Exhausted);
            };

            offset += 1;
            self.store.set_offset(user_id, offset).await?;

            if candidate.is_closed || avoid.contains(&candidate.id) {
                debug!(
                    user_id,
                    candidate_id = candidate.id,
                    private = candidate.is_closed,
                    "Skipping candidate"
                );
                skipped += 1;
                if skipped >= self.config.max_skipped_candidates {
                    info!(user_id, skipped, offset, "Skip limit reached");
                    return Ok(SearchOutcome::SkipLimitReached { skipped });
                }
                continue;
            }

            let attachments = match self.api.profile_photos(candidate.id).await {
                Ok(photos) => rank_photos(photos, self.config.top_photos),
                Err(e) => {
                    warn!(user_id, candidate_id = candidate.id, error = %e, "Photo lookup failed");
                    Vec::new()
                }
            };
            if attachments.is_empty() {
                warn!(user_id, candidate_id = candidate.id, "Offer suppressed, no photos");
                return Ok(SearchOutcome::PhotosUnavailable {
                    candidate_id: candidate.id,
                });
            }

            let record = CandidateRecord {
                candidate_id: candidate.id,
                first_name: candidate.first_name,
                last_name: candidate.last_name,
            };
            self.store.append_candidate(user_id, &record).await?;
            info!(user_id, candidate_id = record.candidate_id, offset, "Candidate offered");

            return Ok(SearchOutcome::Offered(Offer {
                candidate: record,
                attachments,
            }));
        }
    }
}
