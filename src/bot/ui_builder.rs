//! UI Builder module for creating keyboards and formatting messages

use crate::localization::{t_args_lang, t_lang};
use crate::store::CandidateRecord;
use crate::vk::{ButtonColor, Keyboard};

use super::commands::Choice;

fn label(choice: Choice, language: &str) -> String {
    t_lang(choice.label_key(), language)
}

/// Single "Start" button shown with the welcome message
pub fn start_keyboard(language: &str) -> Keyboard {
    Keyboard::one_time().button(label(Choice::Start, language), ButtonColor::Positive)
}

pub fn gender_keyboard(language: &str) -> Keyboard {
    Keyboard::one_time()
        .button(label(Choice::Male, language), ButtonColor::Positive)
        .button(label(Choice::Female, language), ButtonColor::Positive)
}

/// Options under an offered candidate
pub fn browse_keyboard(language: &str) -> Keyboard {
    Keyboard::one_time()
        .button(label(Choice::Next, language), ButtonColor::Secondary)
        .button(label(Choice::Favorite, language), ButtonColor::Positive)
        .button(label(Choice::ListFavorites, language), ButtonColor::Primary)
}

/// Options under the favorites list
pub fn favorites_keyboard(language: &str) -> Keyboard {
    Keyboard::one_time()
        .button(label(Choice::ContinueSearch, language), ButtonColor::Positive)
        .button(label(Choice::RemovePartner, language), ButtonColor::Negative)
        .line()
        .button(label(Choice::ChangeCriteria, language), ButtonColor::Primary)
        .button(label(Choice::Exit, language), ButtonColor::Secondary)
}

/// Name, last name and profile link of an offered candidate
pub fn format_offer(candidate: &CandidateRecord, language: &str) -> String {
    t_args_lang(
        "offer",
        &[
            ("first_name", candidate.first_name.as_str()),
            ("last_name", candidate.last_name.as_str()),
            ("candidate_id", candidate.candidate_id.to_string().as_str()),
        ],
        language,
    )
}

/// Favorites as one `@id` line per partner
pub fn format_favorites_list(favorites: &[CandidateRecord], language: &str) -> String {
    if favorites.is_empty() {
        return t_lang("favorites-empty", language);
    }

    let mut result = t_lang("favorites-title", language);
    for favorite in favorites {
        result.push('\n');
        result.push_str(&t_args_lang(
            "favorite-entry",
            &[
                ("candidate_id", favorite.candidate_id.to_string().as_str()),
                ("first_name", favorite.first_name.as_str()),
                ("last_name", favorite.last_name.as_str()),
            ],
            language,
        ));
    }
    result
}
