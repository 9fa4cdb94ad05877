//! VK bot keyboard payload.
//!
//! Serializes to the JSON expected by the `keyboard` parameter of `messages.send`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonColor {
    Primary,
    Secondary,
    Negative,
    Positive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub action: ButtonAction,
    pub color: ButtonColor,
}

impl Button {
    pub fn text(label: impl Into<String>, color: ButtonColor) -> Self {
        Self {
            action: ButtonAction {
                kind: "text",
                label: label.into(),
            },
            color,
        }
    }
}

/// One-shot keyboard: hidden by the client after the first press
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    pub one_time: bool,
    pub buttons: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn one_time() -> Self {
        Self {
            one_time: true,
            buttons: vec![Vec::new()],
        }
    }

    /// Append a button to the current line
    pub fn button(mut self, label: impl Into<String>, color: ButtonColor) -> Self {
        if let Some(line) = self.buttons.last_mut() {
            line.push(Button::text(label, color));
        }
        self
    }

    /// Start a new line of buttons
    pub fn line(mut self) -> Self {
        self.buttons.push(Vec::new());
        self
    }

    /// Labels in display order
    pub fn labels(&self) -> Vec<&str> {
        self.buttons
            .iter()
            .flatten()
            .map(|button| button.action.label.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
