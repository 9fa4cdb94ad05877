//! Dialogue position and input validation for the search-preferences conversation.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MIN_AGE: i32 = 18;
pub const MAX_AGE: i32 = 100;

lazy_static! {
    static ref NUMBER_REGEX: Regex = Regex::new(r"\d+").expect("Number pattern should be valid");
    static ref FAVORITE_ID_REGEX: Regex =
        Regex::new(r"^@?(?:id)?(\d+)$").expect("Favorite id pattern should be valid");
}

/// Step of the conversation a user is currently in
///
/// Stored as a small integer; the numeric codes are part of the persisted layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    /// New user, or the session was closed with an exit keyword
    #[default]
    Fresh,
    AwaitingStart,
    AwaitingCity,
    AwaitingAgeRange,
    AwaitingGender,
    Browsing,
    ViewingFavorites,
    AwaitingRemovalId,
}

impl Position {
    pub fn code(self) -> i16 {
        match self {
            Position::Fresh => 0,
            Position::AwaitingStart => 1,
            Position::AwaitingCity => 2,
            Position::AwaitingAgeRange => 3,
            Position::AwaitingGender => 4,
            Position::Browsing => 5,
            Position::ViewingFavorites => 6,
            Position::AwaitingRemovalId => 7,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            0 => Position::Fresh,
            1 => Position::AwaitingStart,
            2 => Position::AwaitingCity,
            3 => Position::AwaitingAgeRange,
            4 => Position::AwaitingGender,
            5 => Position::Browsing,
            6 => Position::ViewingFavorites,
            7 => Position::AwaitingRemovalId,
            _ => return None,
        })
    }
}

/// Preferred partner gender, with the VK `sex` codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn code(self) -> i16 {
        match self {
            Gender::Female => 1,
            Gender::Male => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Gender::Female),
            2 => Some(Gender::Male),
            _ => None,
        }
    }
}

/// Inclusive preferred age range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: i32,
    pub max: i32,
}

/// Parses an age range answer.
///
/// One number `a` becomes `[a, a]`, two numbers must satisfy `18 <= a < b <= 100`.
/// Anything else (no numbers, three or more, out of bounds) is rejected.
pub fn parse_age_range(text: &str) -> Result<AgeRange, &'static str> {
    let numbers = NUMBER_REGEX
        .find_iter(text)
        .map(|m| m.as_str().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| "out_of_range")?;

    match numbers.as_slice() {
        [] => Err("empty"),
        [age] if (MIN_AGE..=MAX_AGE).contains(age) => Ok(AgeRange { min: *age, max: *age }),
        [min, max] if MIN_AGE <= *min && min < max && *max <= MAX_AGE => Ok(AgeRange {
            min: *min,
            max: *max,
        }),
        [_] | [_, _] => Err("out_of_range"),
        _ => Err("too_many"),
    }
}

/// Parses the id of a favorite to remove: `123`, `id123` or `@id123`
pub fn parse_favorite_id(text: &str) -> Option<i64> {
    FAVORITE_ID_REGEX
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
