//! Preference store: per-user search criteria, dialogue position, candidate log
//! and favorites.
//!
//! [`PreferenceStore`] is the seam between the dialogue and persistence. The
//! Postgres implementation lives in [`crate::db`]; [`MemoryStore`] keeps the
//! same semantics in process memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::dialogue::{AgeRange, Gender, Position};
use crate::errors::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// A bot user and their search criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age_range: Option<AgeRange>,
    pub gender: Option<Gender>,
    pub city_id: Option<i64>,
}

impl UserProfile {
    /// Complete search criteria, if every question has been answered
    pub fn criteria(&self) -> Option<SearchCriteria> {
        Some(SearchCriteria {
            city_id: self.city_id?,
            gender: self.gender?,
            age_range: self.age_range?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchCriteria {
    pub city_id: i64,
    pub gender: Gender,
    pub age_range: AgeRange,
}

/// Where a user is in the conversation and how far the search has paged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogPosition {
    pub user_id: i64,
    pub position: Position,
    pub offset: i32,
}

/// A surfaced profile, used both for the shown-candidates log and for favorites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub candidate_id: i64,
    pub first_name: String,
    pub last_name: String,
}

/// A single criteria answer; applying it resets the search offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CriteriaUpdate {
    City(i64),
    AgeRange(AgeRange),
    Gender(Gender),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserName {
    pub first_name: String,
    pub last_name: String,
}

/// Persistence operations used by the dialogue and the candidate search.
///
/// Every operation is keyed by the VK user id. Missing data is reported as
/// `Ok(None)` / `Ok(false)`, failures as `Err`.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Create the profile row. A second call for the same user is a no-op
    /// and returns `false`.
    async fn create_profile(&self, user_id: i64) -> StoreResult<bool>;

    async fn get_profile(&self, user_id: i64) -> StoreResult<Option<UserProfile>>;

    async fn set_name(&self, user_id: i64, name: &UserName) -> StoreResult<()>;

    /// Store one criterion and reset the search offset to 0
    async fn update_criteria(&self, user_id: i64, update: CriteriaUpdate) -> StoreResult<()>;

    /// Insert the position row at `AwaitingStart` with offset 0. If the row
    /// already exists only its position is set back to `AwaitingStart`.
    async fn register_position(&self, user_id: i64) -> StoreResult<()>;

    async fn get_position(&self, user_id: i64) -> StoreResult<Option<DialogPosition>>;

    async fn set_position(&self, user_id: i64, position: Position) -> StoreResult<()>;

    async fn set_offset(&self, user_id: i64, offset: i32) -> StoreResult<()>;

    /// Set the position and reset the offset to 0
    async fn restart(&self, user_id: i64, position: Position) -> StoreResult<()>;

    async fn append_candidate(&self, owner_id: i64, candidate: &CandidateRecord) -> StoreResult<()>;

    /// The most recently appended candidate for this owner
    async fn latest_candidate(&self, owner_id: i64) -> StoreResult<Option<CandidateRecord>>;

    /// Ids of every candidate already shown to this owner
    async fn avoid_list(&self, owner_id: i64) -> StoreResult<Vec<i64>>;

    /// Returns `false` if the candidate already is a favorite
    async fn add_favorite(&self, owner_id: i64, candidate: &CandidateRecord) -> StoreResult<bool>;

    /// Returns `false` if no such favorite exists
    async fn remove_favorite(&self, owner_id: i64, candidate_id: i64) -> StoreResult<bool>;

    async fn favorites(&self, owner_id: i64) -> StoreResult<Vec<CandidateRecord>>;

    async fn favorite_ids(&self, owner_id: i64) -> StoreResult<Vec<i64>> {
        Ok(self
            .favorites(owner_id)
            .await?
            .into_iter()
            .map(|favorite| favorite.candidate_id)
            .collect())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    profiles: HashMap<i64, UserProfile>,
    positions: HashMap<i64, DialogPosition>,
    // Position codes that decode to no step, as a corrupted row would
    invalid_codes: HashMap<i64, i16>,
    candidates: HashMap<i64, Vec<CandidateRecord>>,
    favorites: HashMap<i64, Vec<CandidateRecord>>,
}

/// In-process store with the same semantics as the Postgres schema.
///
/// State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw position code without decoding it
    pub async fn set_position_code(&self, user_id: i64, code: i16) {
        let mut state = self.state.lock().await;
        match Position::from_code(code) {
            Some(position) => {
                state.invalid_codes.remove(&user_id);
                if let Some(row) = state.positions.get_mut(&user_id) {
                    row.position = position;
                }
            }
            None => {
                state.invalid_codes.insert(user_id, code);
            }
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn create_profile(&self, user_id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.profiles.contains_key(&user_id) {
            return Ok(false);
        }
        state.profiles.insert(
            user_id,
            UserProfile {
                user_id,
                ..Default::default()
            },
        );
        Ok(true)
    }

    async fn get_profile(&self, user_id: i64) -> StoreResult<Option<UserProfile>> {
        Ok(self.state.lock().await.profiles.get(&user_id).cloned())
    }

    async fn set_name(&self, user_id: i64, name: &UserName) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let profile = state.profiles.get_mut(&user_id).ok_or(StoreError::NotFound {
            entity: "profile",
            user_id,
        })?;
        profile.first_name = Some(name.first_name.clone());
        profile.last_name = Some(name.last_name.clone());
        Ok(())
    }

    async fn update_criteria(&self, user_id: i64, update: CriteriaUpdate) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let profile = state.profiles.get_mut(&user_id).ok_or(StoreError::NotFound {
            entity: "profile",
            user_id,
        })?;
        match update {
            CriteriaUpdate::City(city_id) => profile.city_id = Some(city_id),
            CriteriaUpdate::AgeRange(range) => profile.age_range = Some(range),
            CriteriaUpdate::Gender(gender) => profile.gender = Some(gender),
        }
        if let Some(position) = state.positions.get_mut(&user_id) {
            position.offset = 0;
        }
        Ok(())
    }

    async fn register_position(&self, user_id: i64) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.invalid_codes.remove(&user_id);
        state
            .positions
            .entry(user_id)
            .and_modify(|row| row.position = Position::AwaitingStart)
            .or_insert(DialogPosition {
                user_id,
                position: Position::AwaitingStart,
                offset: 0,
            });
        Ok(())
    }

    async fn get_position(&self, user_id: i64) -> StoreResult<Option<DialogPosition>> {
        let state = self.state.lock().await;
        if let Some(code) = state.invalid_codes.get(&user_id) {
            return Err(StoreError::InvalidPosition(*code));
        }
        Ok(state.positions.get(&user_id).copied())
    }

    async fn set_position(&self, user_id: i64, position: Position) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.invalid_codes.remove(&user_id);
        if let Some(row) = state.positions.get_mut(&user_id) {
            row.position = position;
        }
        Ok(())
    }

    async fn set_offset(&self, user_id: i64, offset: i32) -> StoreResult<()> {
        if let Some(row) = self.state.lock().await.positions.get_mut(&user_id) {
            row.offset = offset;
        }
        Ok(())
    }

    async fn restart(&self, user_id: i64, position: Position) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.invalid_codes.remove(&user_id);
        if let Some(row) = state.positions.get_mut(&user_id) {
            row.position = position;
            row.offset = 0;
        }
        Ok(())
    }

    async fn append_candidate(&self, owner_id: i64, candidate: &CandidateRecord) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .candidates
            .entry(owner_id)
            .or_default()
            .push(candidate.clone());
        Ok(())
    }

    async fn latest_candidate(&self, owner_id: i64) -> StoreResult<Option<CandidateRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .candidates
            .get(&owner_id)
            .and_then(|log| log.last().cloned()))
    }

    async fn avoid_list(&self, owner_id: i64) -> StoreResult<Vec<i64>> {
        Ok(self
            .state
            .lock()
            .await
            .candidates
            .get(&owner_id)
            .map(|log| log.iter().map(|c| c.candidate_id).collect())
            .unwrap_or_default())
    }

    async fn add_favorite(&self, owner_id: i64, candidate: &CandidateRecord) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let favorites = state.favorites.entry(owner_id).or_default();
        if favorites
            .iter()
            .any(|f| f.candidate_id == candidate.candidate_id)
        {
            return Ok(false);
        }
        favorites.push(candidate.clone());
        Ok(true)
    }

    async fn remove_favorite(&self, owner_id: i64, candidate_id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let Some(favorites) = state.favorites.get_mut(&owner_id) else {
            return Ok(false);
        };
        let before = favorites.len();
        favorites.retain(|f| f.candidate_id != candidate_id);
        Ok(favorites.len() < before)
    }

    async fn favorites(&self, owner_id: i64) -> StoreResult<Vec<CandidateRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .favorites
            .get(&owner_id)
            .cloned()
            .unwrap_or_default())
    }
}
