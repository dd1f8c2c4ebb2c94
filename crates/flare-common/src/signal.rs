//! Application signals exchanged over the direct channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which button group a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Answer,
    Status,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Answer => write!(f, "answer"),
            Category::Status => write!(f, "status"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "answer" | "a" => Ok(Category::Answer),
            "status" | "s" => Ok(Category::Status),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// A short button-press code with its category and send time.
///
/// Older browser clients write the category under `type`; both spellings
/// decode, and encoding always uses `category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub message: String,
    #[serde(alias = "type")]
    pub category: Category,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Signal {
    /// Build a signal stamped with the current wall-clock time.
    pub fn new(message: impl Into<String>, category: Category) -> Self {
        Self {
            message: message.into(),
            category,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
