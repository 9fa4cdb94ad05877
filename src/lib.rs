//! # VKinder
//!
//! A VK community chat bot that collects a user's partner criteria (city, age
//! range, gender), pages through matching profiles one at a time with their
//! most-liked photos, and keeps a per-user favorites list.

pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod localization;
pub mod search;
pub mod store;
pub mod vk;
