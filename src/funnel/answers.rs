//! Answer accumulation across a funnel session.
//!
//! The `AnswerSet` is owned exclusively by the sequencer and grows
//! monotonically: answers are merged in, never removed, even when a later
//! consent check aborts the transition (the visitor should not retype after
//! ticking the box). One special `legal` slot holds the consent record.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{ConsentMode, StepContent, StepType};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap()
});

/// A single step's answer value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(Vec<String>),
    Flag(bool),
}

impl AnswerValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Consent metadata recorded under the `legal` slot at submit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub accepted: bool,
    pub accepted_at: DateTime<Utc>,
    pub privacy_policy_url: String,
    pub consent_mode: ConsentMode,
}

/// One accumulated answer: the value plus a snapshot of the step it came
/// from, so the persistence payload is self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub value: AnswerValue,
    pub step_type: StepType,
    pub content: StepContent,
}

/// Mapping from step id to answer, accumulated across the session.
#[derive(Debug, Clone, Default)]
pub struct AnswerSet {
    entries: BTreeMap<String, AnswerEntry>,
    legal: Option<ConsentRecord>,
}

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an answer under a step id, overwriting any previous value for
    /// that step. Monotonic over step ids.
    pub fn merge(&mut self, step_id: &str, entry: AnswerEntry) {
        self.entries.insert(step_id.to_string(), entry);
    }

    pub fn get(&self, step_id: &str) -> Option<&AnswerEntry> {
        self.entries.get(step_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the consent decision under the `legal` slot.
    pub fn record_consent(&mut self, record: ConsentRecord) {
        self.legal = Some(record);
    }

    pub fn consent(&self) -> Option<&ConsentRecord> {
        self.legal.as_ref()
    }

    /// First captured email across all answers, normalized to lowercase.
    pub fn captured_email(&self) -> Option<String> {
        self.entries.values().find_map(|entry| {
            entry
                .value
                .as_text()
                .map(str::trim)
                .filter(|s| EMAIL_RE.is_match(s))
                .map(|s| s.to_ascii_lowercase())
        })
    }

    /// First captured phone number, reduced to its digits. Requires at
    /// least seven digits to count as a phone number.
    pub fn captured_phone(&self) -> Option<String> {
        self.entries
            .values()
            .filter(|entry| entry.step_type == StepType::PhoneCapture)
            .find_map(|entry| {
                let digits: String = entry
                    .value
                    .as_text()?
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect();
                (digits.len() >= 7).then_some(digits)
            })
    }

    /// Serialize the full answer set (including the `legal` slot) into the
    /// persistence payload shape: `step id → { value, step_type, content }`.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (step_id, entry) in &self.entries {
            map.insert(
                step_id.clone(),
                serde_json::to_value(entry).unwrap_or(serde_json::Value::Null),
            );
        }
        if let Some(legal) = &self.legal {
            map.insert(
                "legal".to_string(),
                serde_json::to_value(legal).unwrap_or(serde_json::Value::Null),
            );
        }
        serde_json::Value::Object(map)
    }
}

/// Whether an answer carries data worth persisting as a draft.
///
/// Identity-capture step types are always meaningful; free text is
/// meaningful when non-blank after trimming; choice selections are always
/// meaningful.
pub fn is_meaningful(value: &AnswerValue, step_type: StepType) -> bool {
    if step_type.is_identity_capture() {
        return true;
    }
    match value {
        AnswerValue::Text(s) => !s.trim().is_empty(),
        AnswerValue::Choices(choices) => !choices.is_empty(),
        AnswerValue::Flag(_) => true,
    }
}

/// Whether a trimmed text answer looks like an email address.
pub fn looks_like_email(text: &str) -> bool {
    EMAIL_RE.is_match(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: AnswerValue, step_type: StepType) -> AnswerEntry {
        AnswerEntry {
            value,
            step_type,
            content: StepContent::default(),
        }
    }

    #[test]
    fn test_merge_overwrites_same_step() {
        let mut answers = AnswerSet::new();
        answers.merge(
            "s1",
            entry(AnswerValue::Text("first".into()), StepType::TextQuestion),
        );
        answers.merge(
            "s1",
            entry(AnswerValue::Text("second".into()), StepType::TextQuestion),
        );
        assert_eq!(answers.len(), 1);
        assert_eq!(
            answers.get("s1").unwrap().value,
            AnswerValue::Text("second".into())
        );
    }

    #[test]
    fn test_captured_email_normalizes_case() {
        let mut answers = AnswerSet::new();
        answers.merge(
            "s1",
            entry(
                AnswerValue::Text("Visitor@Example.COM".into()),
                StepType::EmailCapture,
            ),
        );
        assert_eq!(
            answers.captured_email().as_deref(),
            Some("visitor@example.com")
        );
    }

    #[test]
    fn test_captured_email_ignores_non_email_text() {
        let mut answers = AnswerSet::new();
        answers.merge(
            "s1",
            entry(AnswerValue::Text("not an email".into()), StepType::TextQuestion),
        );
        assert!(answers.captured_email().is_none());
    }

    #[test]
    fn test_captured_phone_strips_formatting() {
        let mut answers = AnswerSet::new();
        answers.merge(
            "s1",
            entry(
                AnswerValue::Text("+1 (555) 010-2345".into()),
                StepType::PhoneCapture,
            ),
        );
        assert_eq!(answers.captured_phone().as_deref(), Some("15550102345"));
    }

    #[test]
    fn test_captured_phone_requires_enough_digits() {
        let mut answers = AnswerSet::new();
        answers.merge(
            "s1",
            entry(AnswerValue::Text("123".into()), StepType::PhoneCapture),
        );
        assert!(answers.captured_phone().is_none());
    }

    #[test]
    fn test_meaningful_predicate() {
        assert!(is_meaningful(
            &AnswerValue::Text(String::new()),
            StepType::EmailCapture
        ));
        assert!(!is_meaningful(
            &AnswerValue::Text("   ".into()),
            StepType::TextQuestion
        ));
        assert!(is_meaningful(
            &AnswerValue::Text("hello".into()),
            StepType::TextQuestion
        ));
        assert!(is_meaningful(
            &AnswerValue::Choices(vec!["a".into()]),
            StepType::MultiChoice
        ));
        assert!(!is_meaningful(
            &AnswerValue::Choices(vec![]),
            StepType::MultiChoice
        ));
        assert!(is_meaningful(&AnswerValue::Flag(true), StepType::OptIn));
    }

    #[test]
    fn test_payload_includes_legal_slot() {
        let mut answers = AnswerSet::new();
        answers.merge(
            "s1",
            entry(AnswerValue::Text("hi".into()), StepType::TextQuestion),
        );
        answers.record_consent(ConsentRecord {
            accepted: true,
            accepted_at: Utc::now(),
            privacy_policy_url: "https://x/privacy".to_string(),
            consent_mode: ConsentMode::Explicit,
        });

        let payload = answers.to_payload();
        assert!(payload.get("s1").is_some());
        assert_eq!(payload["legal"]["accepted"], true);
        assert_eq!(payload["legal"]["privacy_policy_url"], "https://x/privacy");
    }

    #[test]
    fn test_answer_value_untagged_serde() {
        let v: AnswerValue = serde_json::from_str(r#""hello""#).unwrap();
        assert_eq!(v, AnswerValue::Text("hello".into()));
        let v: AnswerValue = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(v, AnswerValue::Choices(vec!["a".into(), "b".into()]));
        let v: AnswerValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, AnswerValue::Flag(true));
    }
}
