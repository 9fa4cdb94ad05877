//! # Configuration Module
//!
//! This module defines the runtime configuration of the bot: API credentials,
//! storage location, search limits and recovery settings for VK API calls.

use anyhow::{Context, Result};
use std::env;

// Constants for bot configuration
pub const DEFAULT_API_VERSION: &str = "5.131";
pub const DEFAULT_LANGUAGE: &str = "ru";
pub const DEFAULT_MAX_SKIPPED_CANDIDATES: u32 = 50;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const LONG_POLL_WAIT_SECS: u64 = 25;

/// Number of top-liked profile photos attached to an offer
pub const TOP_PHOTOS_LIMIT: usize = 3;
/// Number of profile photos requested for ranking
pub const PHOTOS_FETCH_COUNT: u32 = 255;

/// Recovery configuration for VK API error handling
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Timeout for a single API request in seconds
    pub request_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Tuning for the candidate search loop
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Private or already-shown profiles skipped before giving up for this turn
    pub max_skipped_candidates: u32,
    /// Photos attached to each offer
    pub top_photos: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_skipped_candidates: DEFAULT_MAX_SKIPPED_CANDIDATES,
            top_photos: TOP_PHOTOS_LIMIT,
        }
    }
}

/// Complete bot configuration, usually read from the environment
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Community token: receives events and sends messages
    pub group_token: String,
    /// User token: people search, photos, cities and names
    pub user_token: String,
    /// Community id the long poll server is requested for
    pub group_id: i64,
    /// Postgres connection string; `None` keeps state in memory
    pub database_url: Option<String>,
    /// VK API version sent with every request
    pub api_version: String,
    /// Language of outgoing messages
    pub language: String,
    pub search: SearchConfig,
    pub recovery: RecoveryConfig,
}

impl BotConfig {
    /// Build the configuration from environment variables.
    ///
    /// `VK_GROUP_TOKEN`, `VK_USER_TOKEN` and `VK_GROUP_ID` are required,
    /// everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        let group_token = env::var("VK_GROUP_TOKEN").context("VK_GROUP_TOKEN must be set")?;
        let user_token = env::var("VK_USER_TOKEN").context("VK_USER_TOKEN must be set")?;
        let group_id = env::var("VK_GROUP_ID")
            .context("VK_GROUP_ID must be set")?
            .trim()
            .parse::<i64>()
            .context("VK_GROUP_ID must be an integer")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        let api_version =
            env::var("VK_API_VERSION").unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());
        let language = env::var("BOT_LANGUAGE").unwrap_or_else(|_| DEFAULT_LANGUAGE.to_string());

        let mut search = SearchConfig::default();
        if let Ok(value) = env::var("MAX_SKIPPED_CANDIDATES") {
            search.max_skipped_candidates = value
                .trim()
                .parse()
                .context("MAX_SKIPPED_CANDIDATES must be a non-negative integer")?;
        }

        let mut recovery = RecoveryConfig::default();
        if let Ok(value) = env::var("VK_REQUEST_TIMEOUT_SECS") {
            recovery.request_timeout_secs = value
                .trim()
                .parse()
                .context("VK_REQUEST_TIMEOUT_SECS must be a positive integer")?;
        }

        Ok(Self {
            group_token,
            user_token,
            group_id,
            database_url,
            api_version,
            language,
            search,
            recovery,
        })
    }
}
