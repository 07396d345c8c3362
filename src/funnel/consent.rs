//! Consent gate: policy-URL resolution and checkbox visibility.
//!
//! The policy URL resolves through a step → funnel → team fallback chain.
//! An empty string is the valid "no policy configured" state, not an error;
//! the sequencer turns that state into a blocking configuration error for
//! opt-in steps rather than silently skipping consent.

use super::{ConsentMode, FunnelDefinition, Step};

/// Resolve the privacy policy URL for a step.
///
/// Checks step-level override fields first (`privacy_link`, then the legacy
/// `terms_url` / `terms_link` aliases), then the funnel settings, then the
/// team-level default. Returns an empty string when nothing is configured.
pub fn resolve_policy_url(
    step: &Step,
    funnel: &FunnelDefinition,
    team_default: Option<&str>,
) -> String {
    let step_level = step
        .content
        .privacy_link
        .as_deref()
        .or(step.content.terms_url.as_deref())
        .or(step.content.terms_link.as_deref())
        .filter(|s| !s.trim().is_empty());

    if let Some(url) = step_level {
        return url.to_string();
    }

    if let Some(url) = funnel
        .settings
        .privacy_policy_url
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        return url.to_string();
    }

    team_default
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("")
        .to_string()
}

/// Consent mode for a step, defaulting to explicit.
pub fn consent_mode(step: &Step) -> ConsentMode {
    step.content.consent_mode.unwrap_or_default()
}

/// Whether the step must show a consent checkbox: identity capture with a
/// resolvable policy URL and explicit consent mode.
pub fn requires_consent_checkbox(step: &Step, policy_url: &str) -> bool {
    step.step_type.is_identity_capture()
        && !policy_url.is_empty()
        && consent_mode(step) == ConsentMode::Explicit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::{FunnelSettings, StepContent, StepType};

    fn step_with_content(content: StepContent) -> Step {
        Step {
            id: "s1".to_string(),
            order_index: 1,
            step_type: StepType::OptIn,
            content,
        }
    }

    fn funnel_with_policy(url: Option<&str>) -> FunnelDefinition {
        FunnelDefinition {
            id: "fn_1".to_string(),
            name: String::new(),
            steps: vec![],
            settings: FunnelSettings {
                privacy_policy_url: url.map(|s| s.to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_step_override_wins() {
        let step = step_with_content(StepContent {
            privacy_link: Some("https://step/privacy".to_string()),
            ..Default::default()
        });
        let funnel = funnel_with_policy(Some("https://funnel/privacy"));
        assert_eq!(
            resolve_policy_url(&step, &funnel, Some("https://team/privacy")),
            "https://step/privacy"
        );
    }

    #[test]
    fn test_legacy_aliases_resolve_in_order() {
        let step = step_with_content(StepContent {
            terms_link: Some("https://step/terms-link".to_string()),
            terms_url: Some("https://step/terms-url".to_string()),
            ..Default::default()
        });
        let funnel = funnel_with_policy(None);
        // terms_url outranks terms_link
        assert_eq!(
            resolve_policy_url(&step, &funnel, None),
            "https://step/terms-url"
        );
    }

    #[test]
    fn test_funnel_fallback_then_team() {
        let step = step_with_content(StepContent::default());
        let funnel = funnel_with_policy(Some("https://funnel/privacy"));
        assert_eq!(
            resolve_policy_url(&step, &funnel, Some("https://team/privacy")),
            "https://funnel/privacy"
        );

        let bare_funnel = funnel_with_policy(None);
        assert_eq!(
            resolve_policy_url(&step, &bare_funnel, Some("https://team/privacy")),
            "https://team/privacy"
        );
    }

    #[test]
    fn test_nothing_configured_is_empty_not_error() {
        let step = step_with_content(StepContent::default());
        let funnel = funnel_with_policy(None);
        assert_eq!(resolve_policy_url(&step, &funnel, None), "");
    }

    #[test]
    fn test_blank_values_are_skipped() {
        let step = step_with_content(StepContent {
            privacy_link: Some("   ".to_string()),
            ..Default::default()
        });
        let funnel = funnel_with_policy(Some("https://funnel/privacy"));
        assert_eq!(
            resolve_policy_url(&step, &funnel, None),
            "https://funnel/privacy"
        );
    }

    #[test]
    fn test_checkbox_requires_capture_type_and_url() {
        let opt_in = step_with_content(StepContent::default());
        assert!(requires_consent_checkbox(&opt_in, "https://x/privacy"));
        assert!(!requires_consent_checkbox(&opt_in, ""));

        let mut question = step_with_content(StepContent::default());
        question.step_type = StepType::TextQuestion;
        assert!(!requires_consent_checkbox(&question, "https://x/privacy"));
    }

    #[test]
    fn test_implied_mode_hides_checkbox() {
        let step = step_with_content(StepContent {
            consent_mode: Some(ConsentMode::Implied),
            ..Default::default()
        });
        assert!(!requires_consent_checkbox(&step, "https://x/privacy"));
    }
}
