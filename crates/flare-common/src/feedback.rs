//! Feedback lookup: what a received signal looks and feels like.
//!
//! The table is fixed. Codes not in it get the default color and are never
//! rejected; the vibration pattern depends only on category and on whether
//! the code is `Help`.

use crate::signal::{Category, Signal};

/// How long the flash overlay stays visible.
pub const FLASH_DURATION_MS: u64 = 2000;

/// Flash color for codes outside the table.
pub const DEFAULT_COLOR: &str = "#4a9eff";

const PALETTE: &[(&str, &str)] = &[
    ("A", "#4a9eff"),
    ("B", "#50c878"),
    ("C", "#ffa94d"),
    ("D", "#ff6b9d"),
    ("Help", "#ff4757"),
    ("Repeat", "#a29bfe"),
    ("Wait", "#ffa502"),
    ("OK", "#26de81"),
    ("Clear", "#747d8c"),
    ("Done", "#2ed573"),
];

const CRITICAL_PATTERN: &[u32] = &[100, 50, 100, 50, 100];
const STATUS_PATTERN: &[u32] = &[50, 30, 50];
const ANSWER_PATTERN: &[u32] = &[80];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Normal,
    Elevated,
    Critical,
}

/// Visual and haptic response for one received signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub color: &'static str,
    pub text: String,
    pub vibration: &'static [u32],
    pub urgency: Urgency,
    /// False when the code fell back to the default treatment.
    pub recognized: bool,
}

pub fn feedback_for(signal: &Signal) -> Feedback {
    let entry = PALETTE
        .iter()
        .find(|(code, _)| *code == signal.message);

    let (vibration, urgency) = match signal.category {
        Category::Status if signal.message == "Help" => (CRITICAL_PATTERN, Urgency::Critical),
        Category::Status => (STATUS_PATTERN, Urgency::Elevated),
        Category::Answer => (ANSWER_PATTERN, Urgency::Normal),
    };

    Feedback {
        color: entry.map(|(_, color)| *color).unwrap_or(DEFAULT_COLOR),
        text: signal.message.clone(),
        vibration,
        urgency,
        recognized: entry.is_some(),
    }
}

/// Local cues the sending side plays for its own actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// A signal left over the direct channel.
    Sent,
    /// A send was refused because the channel is not ready.
    Rejected,
    /// The direct channel just opened.
    ChannelOpen,
}

impl Cue {
    pub fn vibration(&self) -> &'static [u32] {
        match self {
            Cue::Sent => &[30],
            Cue::Rejected => &[50, 50, 50],
            Cue::ChannelOpen => &[50],
        }
    }
}
