//! Semantic intent classification for steps.
//!
//! The intent is the single source of truth for whether a step transition
//! is a durable submit (triggers downstream automations) or an ephemeral
//! draft (visible progress only). It is derived from a static lookup over
//! the step type — pure and total; unknown types classify as `Collect`.

use serde::{Deserialize, Serialize};

use super::StepType;

/// Semantic classification of a step's purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepIntent {
    /// Gather an answer; progress is visible but nothing fires.
    Collect,
    /// Capture visitor identity; the submit is durable and idempotent.
    Capture,
    /// Hand off to the external scheduling widget.
    Schedule,
    /// Terminal acknowledgement.
    Complete,
}

impl StepIntent {
    /// Classify a step type. Total: never errors, defaults to `Collect`.
    pub fn classify(step_type: StepType) -> Self {
        match step_type {
            StepType::EmailCapture | StepType::PhoneCapture | StepType::OptIn => {
                StepIntent::Capture
            }
            StepType::Embed => StepIntent::Schedule,
            StepType::ThankYou => StepIntent::Complete,
            StepType::Welcome
            | StepType::TextQuestion
            | StepType::MultiChoice
            | StepType::Video
            | StepType::Unknown => StepIntent::Collect,
        }
    }
}

impl std::fmt::Display for StepIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepIntent::Collect => write!(f, "collect"),
            StepIntent::Capture => write!(f, "capture"),
            StepIntent::Schedule => write!(f, "schedule"),
            StepIntent::Complete => write!(f, "complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_types() {
        assert_eq!(
            StepIntent::classify(StepType::EmailCapture),
            StepIntent::Capture
        );
        assert_eq!(
            StepIntent::classify(StepType::PhoneCapture),
            StepIntent::Capture
        );
        assert_eq!(StepIntent::classify(StepType::OptIn), StepIntent::Capture);
    }

    #[test]
    fn test_embed_is_schedule() {
        assert_eq!(StepIntent::classify(StepType::Embed), StepIntent::Schedule);
    }

    #[test]
    fn test_thank_you_is_complete() {
        assert_eq!(
            StepIntent::classify(StepType::ThankYou),
            StepIntent::Complete
        );
    }

    #[test]
    fn test_everything_else_collects() {
        assert_eq!(StepIntent::classify(StepType::Welcome), StepIntent::Collect);
        assert_eq!(
            StepIntent::classify(StepType::TextQuestion),
            StepIntent::Collect
        );
        assert_eq!(
            StepIntent::classify(StepType::MultiChoice),
            StepIntent::Collect
        );
        assert_eq!(StepIntent::classify(StepType::Video), StepIntent::Collect);
        assert_eq!(StepIntent::classify(StepType::Unknown), StepIntent::Collect);
    }

    #[test]
    fn test_display_matches_wire_vocabulary() {
        assert_eq!(StepIntent::Capture.to_string(), "capture");
        assert_eq!(StepIntent::Collect.to_string(), "collect");
        assert_eq!(StepIntent::Schedule.to_string(), "schedule");
        assert_eq!(StepIntent::Complete.to_string(), "complete");
    }
}
