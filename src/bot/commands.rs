//! Keyword families and button choices recognized in user input.
//!
//! Input is expected lower-cased. Button labels are accepted in every loaded
//! language, independent of the reply language.

use crate::localization::get_localization_manager;

pub const GREETING_WORDS: &[&str] = &["привет", "прив", "ghbdtn", "hi", "hello", "здравствуйте", "хай"];
pub const START_WORDS: &[&str] = &["старт", "поехали", "начать", "го", "go", "start", "cnfhn"];
pub const EXIT_WORDS: &[&str] = &["пока", "bye", "до свидания", "gjrf", "выход", "exit"];

/// A reply-keyboard button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Start,
    Male,
    Female,
    Next,
    Favorite,
    ListFavorites,
    ContinueSearch,
    RemovePartner,
    ChangeCriteria,
    Exit,
}

impl Choice {
    pub const ALL: [Choice; 10] = [
        Choice::Start,
        Choice::Male,
        Choice::Female,
        Choice::Next,
        Choice::Favorite,
        Choice::ListFavorites,
        Choice::ContinueSearch,
        Choice::RemovePartner,
        Choice::ChangeCriteria,
        Choice::Exit,
    ];

    /// Localization key of the button label
    pub fn label_key(self) -> &'static str {
        match self {
            Choice::Start => "button-start",
            Choice::Male => "button-male",
            Choice::Female => "button-female",
            Choice::Next => "button-next",
            Choice::Favorite => "button-favorite",
            Choice::ListFavorites => "button-list-favorites",
            Choice::ContinueSearch => "button-continue-search",
            Choice::RemovePartner => "button-remove-partner",
            Choice::ChangeCriteria => "button-change-criteria",
            Choice::Exit => "button-exit",
        }
    }

    /// Does the text match this button's label in any language
    pub fn matches(self, text: &str) -> bool {
        let text = keyword_text(text);
        get_localization_manager()
            .all_variants(self.label_key())
            .iter()
            .any(|label| label.to_lowercase() == text)
    }

    pub fn parse(text: &str) -> Option<Choice> {
        Choice::ALL.into_iter().find(|choice| choice.matches(text))
    }
}

/// Strip surrounding whitespace and punctuation, so "Привет!" matches "привет"
fn keyword_text(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '!' | '.' | ',' | '?' | ')' | '('))
}

fn in_family(family: &[&str], text: &str) -> bool {
    family.contains(&keyword_text(text))
}

pub fn is_greeting(text: &str) -> bool {
    in_family(GREETING_WORDS, text)
}

pub fn is_start(text: &str) -> bool {
    in_family(START_WORDS, text) || Choice::Start.matches(text)
}

pub fn is_exit(text: &str) -> bool {
    in_family(EXIT_WORDS, text) || Choice::Exit.matches(text)
}
