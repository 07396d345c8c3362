//! Step sequencer: the state machine driving a visitor through a funnel.
//!
//! `FunnelSession` owns all session state — answer set, step index,
//! consent flags, booking slot, completion — and mutates it only from its
//! own methods (single-writer discipline; no module-level state, so two
//! runtime instances never share anything). Collaborators are invoked in a
//! fixed order on each `advance`:
//!
//! 1. merge the answer, 2. classify intent, 3. consent gate (may abort),
//! 4. persistence and analytics per intent, 5. deduplicated internal
//! event, 6. index transition or terminal completion.
//!
//! The sequencer never returns an error and never panics: recoverable
//! visitor states come back as `AdvanceOutcome::Rejected`, backend
//! failures are folded away below the persistence seam.

use chrono::Utc;
use std::sync::Arc;

use crate::analytics::{AnalyticsHub, NormalizedPayload, TrackingEvent};
use crate::booking::BookingPayload;
use crate::events::{EventRecorder, FunnelEventType};
use crate::funnel::answers::{self, AnswerEntry, AnswerSet, AnswerValue, ConsentRecord};
use crate::funnel::consent;
use crate::funnel::intent::StepIntent;
use crate::funnel::{ConsentMode, FunnelDefinition, Step};
use crate::persistence::{LeadSaver, SaveMode, SaveOutcome, SaveRequest, UtmParams};

/// Host-supplied session context: tenant, policy fallback, attribution.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub team_id: String,
    /// Team-level privacy policy URL, the last link in the resolution chain.
    pub team_privacy_policy_url: Option<String>,
    pub utm: UtmParams,
}

/// Why an `advance` call was refused without a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceRejection {
    /// Consent checkbox unticked on a gated step. Visitor-recoverable.
    ConsentRequired,
    /// Capture step with no resolvable policy URL. Operator-recoverable
    /// only; the visitor cannot fix this within the session.
    MissingPolicyUrl,
    /// Required question answered empty. Visitor-recoverable.
    AnswerRequired,
}

/// Result of one `advance` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Moved to the next step.
    Advanced { index: usize },
    /// The last step was processed; the session is terminal.
    Completed,
    /// Refused; state unchanged apart from the retained answer merge.
    Rejected(AdvanceRejection),
    /// Dropped without effect: the session was already complete, or the
    /// submit was suppressed by the in-flight latch.
    Ignored,
}

/// One visitor's pass through a published funnel.
pub struct FunnelSession {
    definition: Arc<FunnelDefinition>,
    ctx: SessionContext,
    saver: LeadSaver,
    recorder: EventRecorder,
    analytics: AnalyticsHub,
    answers: AnswerSet,
    index: usize,
    is_complete: bool,
    consent_checked: bool,
    consent_error: Option<String>,
    booking: Option<BookingPayload>,
    started: bool,
}

impl FunnelSession {
    pub fn new(
        definition: Arc<FunnelDefinition>,
        ctx: SessionContext,
        saver: LeadSaver,
        recorder: EventRecorder,
        analytics: AnalyticsHub,
    ) -> Self {
        Self {
            definition,
            ctx,
            saver,
            recorder,
            analytics,
            answers: AnswerSet::new(),
            index: 0,
            is_complete: false,
            consent_checked: false,
            consent_error: None,
            booking: None,
            started: false,
        }
    }

    /// Mark the session mounted: fires the funnel-view events once and
    /// initializes per-step consent state. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        self.analytics.fire(
            TrackingEvent::ViewContent,
            self.base_payload(),
            Some(&format!("view:{}", self.definition.id)),
        );
        self.recorder.emit(
            FunnelEventType::FunnelView,
            format!("{}:funnel_view", self.definition.id),
            serde_json::json!({}),
        );
        self.enter_step();
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.definition.steps.get(self.index)
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn lead_id(&self) -> Option<String> {
        self.saver.lead_id()
    }

    pub fn consent_checked(&self) -> bool {
        self.consent_checked
    }

    pub fn consent_error(&self) -> Option<&str> {
        self.consent_error.as_deref()
    }

    /// Resolved policy URL for the current step.
    pub fn policy_url(&self) -> String {
        self.current_step()
            .map(|step| self.policy_url_for(step))
            .unwrap_or_default()
    }

    /// Whether the current step shows the consent checkbox.
    pub fn requires_consent(&self) -> bool {
        self.current_step()
            .map(|step| consent::requires_consent_checkbox(step, &self.policy_url_for(step)))
            .unwrap_or(false)
    }

    /// Record the visitor's checkbox state. Ticking clears any pending
    /// consent error.
    pub fn set_consent_checked(&mut self, checked: bool) {
        self.consent_checked = checked;
        if checked {
            self.consent_error = None;
        }
    }

    /// Re-entry rule: call whenever the active step changes, including a
    /// re-render without an index change. Consent must be re-affirmed per
    /// step, never carried over.
    pub fn enter_step(&mut self) {
        let Some(step) = self.definition.steps.get(self.index) else {
            return;
        };
        let policy_url = self.policy_url_for(step);
        if consent::requires_consent_checkbox(step, &policy_url) {
            self.consent_checked = false;
        }
        self.consent_error = None;
    }

    /// Adopt a booking reported by the external scheduling widget. The
    /// slot is overwritten, never queued.
    pub fn record_booking(&mut self, payload: BookingPayload) {
        tracing::debug!(
            event_uri = payload.event_uri.as_deref().unwrap_or(""),
            "Adopting booking payload"
        );
        self.booking = Some(payload);
    }

    pub fn booking(&self) -> Option<&BookingPayload> {
        self.booking.as_ref()
    }

    /// Process the visitor's "next" action on the current step.
    pub async fn advance(&mut self, value: Option<AnswerValue>) -> AdvanceOutcome {
        if self.is_complete {
            return AdvanceOutcome::Ignored;
        }
        let Some(step) = self.current_step().cloned() else {
            return AdvanceOutcome::Ignored;
        };

        // 1. Merge first. The answer is retained even when consent aborts
        // below, so the visitor does not retype after ticking the box.
        if let Some(value) = value {
            self.answers.merge(
                &step.id,
                AnswerEntry {
                    value,
                    step_type: step.step_type,
                    content: step.content.clone(),
                },
            );
        }

        // 2. Classify.
        let intent = StepIntent::classify(step.step_type);
        let policy_url = self.policy_url_for(&step);

        // Required-answer validation.
        if step.content.is_required && step.step_type.expects_answer() {
            let meaningful = self
                .answers
                .get(&step.id)
                .map(|entry| answers::is_meaningful(&entry.value, entry.step_type))
                .unwrap_or(false);
            if !meaningful {
                return AdvanceOutcome::Rejected(AdvanceRejection::AnswerRequired);
            }
        }

        // 3. Consent gate.
        let gate_active = consent::requires_consent_checkbox(&step, &policy_url);
        if gate_active && !self.consent_checked {
            self.consent_error =
                Some("Please accept the privacy policy to continue.".to_string());
            return AdvanceOutcome::Rejected(AdvanceRejection::ConsentRequired);
        }
        if gate_active {
            self.consent_error = None;
            self.answers.record_consent(ConsentRecord {
                accepted: true,
                accepted_at: Utc::now(),
                privacy_policy_url: policy_url.clone(),
                consent_mode: ConsentMode::Explicit,
            });
        } else if intent == StepIntent::Capture
            && !policy_url.is_empty()
            && consent::consent_mode(&step) == ConsentMode::Implied
        {
            self.answers.record_consent(ConsentRecord {
                accepted: true,
                accepted_at: Utc::now(),
                privacy_policy_url: policy_url.clone(),
                consent_mode: ConsentMode::Implied,
            });
        }

        // 4. Branch on intent.
        match intent {
            StepIntent::Capture => {
                if policy_url.is_empty() {
                    self.consent_error = Some(
                        "This step needs a privacy policy link before it can collect contact details."
                            .to_string(),
                    );
                    return AdvanceOutcome::Rejected(AdvanceRejection::MissingPolicyUrl);
                }

                // Awaited: the host shows a blocking spinner and the visitor
                // cannot double-submit through the UI while this resolves.
                let outcome = self
                    .saver
                    .save(self.save_request(SaveMode::Submit, &step, intent))
                    .await;
                match outcome {
                    SaveOutcome::DroppedInFlight => {
                        // Another save still in flight: the whole transition
                        // is dropped, the next user action re-triggers it.
                        return AdvanceOutcome::Ignored;
                    }
                    SaveOutcome::Saved { .. } | SaveOutcome::Deferred { .. } => {
                        // Deferred is deliberate: a backend hiccup never
                        // traps the visitor mid-funnel.
                    }
                }

                let lead_key = self
                    .answers
                    .captured_email()
                    .map(|email| format!("lead:{}", email))
                    .or_else(|| {
                        self.answers
                            .captured_phone()
                            .map(|phone| format!("lead:{}", phone))
                    })
                    .unwrap_or_else(|| format!("lead:{}:{}", self.definition.id, self.index));
                self.analytics
                    .fire(TrackingEvent::Lead, self.base_payload(), Some(&lead_key));

                self.recorder.emit(
                    FunnelEventType::LeadSubmitted,
                    format!(
                        "{}:{}:lead_submitted:{}",
                        self.definition.id,
                        step.id,
                        self.lead_key_part()
                    ),
                    serde_json::json!({ "step_id": step.id }),
                );
            }
            StepIntent::Schedule => {
                if self.current_answer_is_meaningful(&step) || self.booking.is_some() {
                    self.spawn_draft_save(&step, intent);
                }
                self.analytics.fire(
                    TrackingEvent::Schedule,
                    self.base_payload(),
                    Some(&format!("schedule:{}:{}", self.definition.id, step.id)),
                );
                self.recorder.emit(
                    FunnelEventType::Schedule,
                    format!(
                        "{}:{}:schedule:{}",
                        self.definition.id,
                        step.id,
                        self.lead_key_part()
                    ),
                    serde_json::json!({ "step_id": step.id }),
                );
            }
            StepIntent::Collect | StepIntent::Complete => {
                if self.current_answer_is_meaningful(&step) {
                    self.spawn_draft_save(&step, intent);
                }
            }
        }

        // 5. One internal event per transition, deduplicated on the
        // (funnel, step, intent, lead) key.
        self.recorder.emit(
            FunnelEventType::StepCompleted,
            format!(
                "{}:{}:{}:{}",
                self.definition.id,
                step.id,
                intent,
                self.lead_key_part()
            ),
            serde_json::json!({ "step_id": step.id, "intent": intent.to_string() }),
        );

        // 6. Transition.
        if self.index + 1 < self.definition.steps.len() {
            self.index += 1;
            self.enter_step();
            AdvanceOutcome::Advanced { index: self.index }
        } else {
            self.is_complete = true;
            self.analytics.fire(
                TrackingEvent::CompleteRegistration,
                self.base_payload(),
                Some(&format!("complete:{}", self.definition.id)),
            );
            self.recorder.emit(
                FunnelEventType::FunnelCompleted,
                format!("{}:funnel_completed", self.definition.id),
                serde_json::json!({}),
            );
            AdvanceOutcome::Completed
        }
    }

    fn policy_url_for(&self, step: &Step) -> String {
        consent::resolve_policy_url(
            step,
            &self.definition,
            self.ctx.team_privacy_policy_url.as_deref(),
        )
    }

    fn current_answer_is_meaningful(&self, step: &Step) -> bool {
        self.answers
            .get(&step.id)
            .map(|entry| answers::is_meaningful(&entry.value, entry.step_type))
            .unwrap_or(false)
    }

    fn lead_key_part(&self) -> String {
        self.saver.lead_id().unwrap_or_else(|| "no_lead".to_string())
    }

    fn base_payload(&self) -> NormalizedPayload {
        NormalizedPayload {
            currency: Some("USD".to_string()),
            value: None,
            content_name: Some(self.definition.name.clone()),
            content_category: Some("funnel".to_string()),
        }
    }

    fn save_request(&self, mode: SaveMode, step: &Step, intent: StepIntent) -> SaveRequest {
        SaveRequest {
            mode,
            step_id: step.id.clone(),
            step_type: step.step_type,
            intent,
            step_index: self.index,
            answers: self.answers.to_payload(),
            booking: self.booking.clone(),
            utm: self.ctx.utm.clone(),
        }
    }

    fn spawn_draft_save(&self, step: &Step, intent: StepIntent) {
        let saver = self.saver.clone();
        let request = self.save_request(SaveMode::Draft, step, intent);
        tokio::spawn(async move {
            let outcome = saver.save(request).await;
            tracing::debug!(?outcome, "Draft save finished");
        });
    }
}
