//! The fixed classification taxonomy and oracle-output normalization.

use std::fmt;

/// Classification assigned to a message.
///
/// Five fixed categories, plus `Other` for oracle text that matches none
/// of them (stored verbatim, not re-validated) and `Error` for a failed
/// classification call. `Error` is a terminal value for the message, not
/// a pipeline failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    JobOpportunity,
    ApplicationUpdate,
    EventInvite,
    SpamOrPromotion,
    GeneralInformation,
    Other(String),
    Error(String),
}

impl Category {
    /// All prompt-visible category names, in prompt order.
    pub const PROMPT_NAMES: [&'static str; 5] = [
        "Job Opportunity",
        "Application Update",
        "Event Invite",
        "Spam / Promotion",
        "General Information",
    ];

    /// Normalize raw oracle output into a category.
    ///
    /// Any response containing the case-sensitive substring "Spam" or
    /// "Promotion" is forced to `SpamOrPromotion`, whatever else it says.
    /// Otherwise the text is matched exactly against the five names; a
    /// non-matching response is kept verbatim as `Other`.
    pub fn from_oracle(text: &str) -> Self {
        let text = text.trim();
        if text.contains("Spam") || text.contains("Promotion") {
            return Category::SpamOrPromotion;
        }
        match text {
            "Job Opportunity" => Category::JobOpportunity,
            "Application Update" => Category::ApplicationUpdate,
            "Event Invite" => Category::EventInvite,
            "General Information" => Category::GeneralInformation,
            other => Category::Other(other.to_string()),
        }
    }

    /// True for the `Error` variant — rows a reviewer can spot by prefix.
    pub fn is_error(&self) -> bool {
        matches!(self, Category::Error(_))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::JobOpportunity => write!(f, "Job Opportunity"),
            Category::ApplicationUpdate => write!(f, "Application Update"),
            Category::EventInvite => write!(f, "Event Invite"),
            Category::SpamOrPromotion => write!(f, "Spam / Promotion"),
            Category::GeneralInformation => write!(f, "General Information"),
            Category::Other(text) => write!(f, "{text}"),
            Category::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}
