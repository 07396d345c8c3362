//! Funnel definition model and JSON loading.
//!
//! This module provides:
//! - `FunnelDefinition` — the immutable, ordered step list plus settings
//! - `Step` / `StepType` / `StepContent` — one screen of the published funnel
//! - Loading and validation for JSON-based funnel definitions
//!
//! The definition is owned by the host that mounts the runtime and is never
//! mutated by the engine. Only a handful of well-known `content` keys are
//! read by control logic; everything else rides along opaquely for
//! presentation.

pub mod answers;
pub mod consent;
pub mod intent;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::EngineError;

/// Closed vocabulary of step types. Unrecognized values deserialize to
/// `Unknown`, which renders nothing and is excluded from visible-step
/// filtering — never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Welcome,
    TextQuestion,
    MultiChoice,
    EmailCapture,
    PhoneCapture,
    OptIn,
    Video,
    Embed,
    ThankYou,
    #[serde(other)]
    Unknown,
}

impl StepType {
    /// Step types that capture visitor identity (and therefore fall under
    /// the consent gate).
    pub fn is_identity_capture(&self) -> bool {
        matches!(
            self,
            StepType::EmailCapture | StepType::PhoneCapture | StepType::OptIn
        )
    }

    /// Step types that ask the visitor a question and carry an answer.
    pub fn is_question(&self) -> bool {
        matches!(
            self,
            StepType::TextQuestion
                | StepType::MultiChoice
                | StepType::EmailCapture
                | StepType::PhoneCapture
                | StepType::OptIn
        )
    }

    /// Step types where "required" means a non-empty answer must be typed
    /// or picked. Opt-in steps are excluded: their affirmative action is
    /// the consent checkbox, not a field value.
    pub fn expects_answer(&self) -> bool {
        matches!(
            self,
            StepType::TextQuestion
                | StepType::MultiChoice
                | StepType::EmailCapture
                | StepType::PhoneCapture
        )
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepType::Welcome => "welcome",
            StepType::TextQuestion => "text_question",
            StepType::MultiChoice => "multi_choice",
            StepType::EmailCapture => "email_capture",
            StepType::PhoneCapture => "phone_capture",
            StepType::OptIn => "opt_in",
            StepType::Video => "video",
            StepType::Embed => "embed",
            StepType::ThankYou => "thank_you",
            StepType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// How consent is collected on an identity-capture step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentMode {
    /// Checkbox shown, must be ticked before submit (default).
    #[default]
    Explicit,
    /// Notice only; consent recorded as implied at submit time.
    Implied,
}

impl std::fmt::Display for ConsentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsentMode::Explicit => write!(f, "explicit"),
            ConsentMode::Implied => write!(f, "implied"),
        }
    }
}

/// Free-form step configuration bag. The engine reads only the well-known
/// keys below; all other keys are retained in `extra` for presentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepContent {
    /// Whether the visitor must answer before advancing.
    #[serde(default)]
    pub is_required: bool,
    /// Step-level privacy policy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_link: Option<String>,
    /// Legacy alias for the policy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_url: Option<String>,
    /// Older legacy alias for the policy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_link: Option<String>,
    /// Consent collection mode for identity-capture steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_mode: Option<ConsentMode>,
    /// Scheduling widget URL for embed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    /// Everything else (headline, options, styling) — presentation only.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StepContent {
    /// Choice options for multi-choice steps, read from the presentation
    /// bag. Missing or malformed options default to an empty list.
    pub fn options(&self) -> Vec<String> {
        self.extra
            .get("options")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Headline text, if the builder configured one.
    pub fn headline(&self) -> Option<&str> {
        self.extra.get("headline").and_then(|v| v.as_str())
    }
}

/// One screen in the published funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step identifier, unique within the funnel
    pub id: String,
    /// Position in the published sequence
    pub order_index: u32,
    /// Step type from the closed vocabulary
    pub step_type: StepType,
    /// Configuration bag
    #[serde(default)]
    pub content: StepContent,
}

/// Tracking provider identifiers configured on the funnel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_pixel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_ads_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok_pixel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_partner_id: Option<String>,
}

/// Funnel-level settings. Display options are retained opaquely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunnelSettings {
    /// Funnel-level privacy policy URL (middle of the resolution chain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
    #[serde(default)]
    pub tracking: TrackingIds,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Immutable definition of a published funnel: ordered steps plus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub settings: FunnelSettings,
}

impl FunnelDefinition {
    /// Load a definition from a JSON file, validate it, and sort steps by
    /// `order_index`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| {
            EngineError::DefinitionReadFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let definition: FunnelDefinition =
            serde_json::from_str(&raw).map_err(|source| EngineError::DefinitionParseFailed {
                path: path.to_path_buf(),
                source,
            })?;
        definition.validated()
    }

    /// Validate invariants and return the definition with steps sorted by
    /// `order_index`. Publish order is authoritative regardless of the
    /// serialization order the builder produced.
    pub fn validated(mut self) -> Result<Self, EngineError> {
        if self.steps.is_empty() {
            return Err(EngineError::EmptyFunnel {
                funnel_id: self.id.clone(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.clone()) {
                return Err(EngineError::DuplicateStepId {
                    funnel_id: self.id.clone(),
                    step_id: step.id.clone(),
                });
            }
        }

        self.steps.sort_by_key(|s| s.order_index);
        Ok(self)
    }

    /// Steps the visitor actually sees. Unknown step types render nothing
    /// and are excluded here; the sequencer still passes over them.
    pub fn visible_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| s.step_type != StepType::Unknown)
    }

    /// Whether any step embeds the external scheduling widget.
    pub fn has_embed_step(&self) -> bool {
        self.steps.iter().any(|s| s.step_type == StepType::Embed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, order: u32, step_type: StepType) -> Step {
        Step {
            id: id.to_string(),
            order_index: order,
            step_type,
            content: StepContent::default(),
        }
    }

    fn definition(steps: Vec<Step>) -> FunnelDefinition {
        FunnelDefinition {
            id: "fn_1".to_string(),
            name: "Demo".to_string(),
            steps,
            settings: FunnelSettings::default(),
        }
    }

    #[test]
    fn test_step_type_deserializes_snake_case() {
        let t: StepType = serde_json::from_str(r#""email_capture""#).unwrap();
        assert_eq!(t, StepType::EmailCapture);
    }

    #[test]
    fn test_unknown_step_type_does_not_error() {
        let t: StepType = serde_json::from_str(r#""countdown_timer""#).unwrap();
        assert_eq!(t, StepType::Unknown);
    }

    #[test]
    fn test_identity_capture_types() {
        assert!(StepType::EmailCapture.is_identity_capture());
        assert!(StepType::PhoneCapture.is_identity_capture());
        assert!(StepType::OptIn.is_identity_capture());
        assert!(!StepType::TextQuestion.is_identity_capture());
        assert!(!StepType::Embed.is_identity_capture());
    }

    #[test]
    fn test_content_reads_well_known_keys_and_keeps_extra() {
        let content: StepContent = serde_json::from_value(serde_json::json!({
            "is_required": true,
            "privacy_link": "https://x/privacy",
            "headline": "Join us",
            "options": ["a", "b"]
        }))
        .unwrap();

        assert!(content.is_required);
        assert_eq!(content.privacy_link.as_deref(), Some("https://x/privacy"));
        assert_eq!(content.headline(), Some("Join us"));
        assert_eq!(content.options(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_content_missing_fields_default_safely() {
        let content: StepContent = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!content.is_required);
        assert!(content.privacy_link.is_none());
        assert!(content.options().is_empty());
    }

    #[test]
    fn test_validated_sorts_by_order_index() {
        let def = definition(vec![
            step("b", 2, StepType::ThankYou),
            step("a", 1, StepType::Welcome),
        ])
        .validated()
        .unwrap();

        assert_eq!(def.steps[0].id, "a");
        assert_eq!(def.steps[1].id, "b");
    }

    #[test]
    fn test_validated_rejects_duplicate_step_ids() {
        let result = definition(vec![
            step("a", 1, StepType::Welcome),
            step("a", 2, StepType::ThankYou),
        ])
        .validated();

        assert!(matches!(
            result,
            Err(EngineError::DuplicateStepId { .. })
        ));
    }

    #[test]
    fn test_validated_rejects_empty_funnel() {
        let result = definition(vec![]).validated();
        assert!(matches!(result, Err(EngineError::EmptyFunnel { .. })));
    }

    #[test]
    fn test_visible_steps_excludes_unknown() {
        let def = definition(vec![
            step("a", 1, StepType::Welcome),
            step("b", 2, StepType::Unknown),
            step("c", 3, StepType::ThankYou),
        ])
        .validated()
        .unwrap();

        let visible: Vec<&str> = def.visible_steps().map(|s| s.id.as_str()).collect();
        assert_eq!(visible, vec!["a", "c"]);
    }

    #[test]
    fn test_load_roundtrip_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funnel.json");
        let json = serde_json::json!({
            "id": "fn_1",
            "name": "Demo",
            "steps": [
                {"id": "s2", "order_index": 2, "step_type": "thank_you"},
                {"id": "s1", "order_index": 1, "step_type": "welcome"}
            ],
            "settings": {"privacy_policy_url": "https://x/privacy"}
        });
        std::fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();

        let def = FunnelDefinition::load(&path).unwrap();
        assert_eq!(def.steps[0].id, "s1");
        assert_eq!(
            def.settings.privacy_policy_url.as_deref(),
            Some("https://x/privacy")
        );
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let result = FunnelDefinition::load("/nonexistent/funnel.json");
        assert!(matches!(
            result,
            Err(EngineError::DefinitionReadFailed { .. })
        ));
    }
}
