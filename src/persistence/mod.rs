//! Progressive lead persistence.
//!
//! All answer mutations funnel through `LeadSaver::save`, which serializes
//! upsert calls against the remote lead endpoint behind a single in-flight
//! latch. A call arriving while another is in flight is dropped entirely
//! (not queued) — the visitor's next action re-triggers it, and dropping
//! prevents unbounded backlog under rapid double-submits.
//!
//! Request identifiers: submit saves reuse one stable identifier per
//! `(funnel, step index)` for the whole session, making the remote upsert
//! idempotent under retries. Draft saves get a fresh random identifier
//! every call.
//!
//! Failures never escape: a transport or endpoint error resolves to
//! `SaveOutcome::Deferred` and is logged. Funnel progression must never be
//! blocked by a backend persistence failure once consent and validation
//! have passed.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::booking::BookingPayload;
use crate::errors::StoreError;
use crate::funnel::StepType;
use crate::funnel::intent::StepIntent;

/// Whether a save is an ephemeral draft or a durable, automation-triggering
/// submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    Draft,
    Submit,
}

impl std::fmt::Display for SaveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveMode::Draft => write!(f, "draft"),
            SaveMode::Submit => write!(f, "submit"),
        }
    }
}

/// Named result of a save attempt. `Deferred` is the explicit "backend
/// failed, visitor proceeds anyway" outcome so tests can assert on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The upsert succeeded; the lead identifier is adopted for the session.
    Saved { lead_id: String },
    /// The upsert failed; logged, progression unaffected.
    Deferred { reason: String },
    /// Another call was in flight; this one was dropped, not queued.
    DroppedInFlight,
}

/// UTM attribution captured at session start; rides along on every upsert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
}

/// Wire request for the remote lead-upsert endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LeadUpsertRequest {
    pub funnel_id: String,
    pub team_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    pub answers: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendly_booking: Option<BookingPayload>,
    pub submit_mode: SaveMode,
    pub client_request_id: String,
    pub step_id: String,
    pub step_type: StepType,
    pub step_intent: StepIntent,
}

/// Caller-side description of one save, assembled by the sequencer.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub mode: SaveMode,
    pub step_id: String,
    pub step_type: StepType,
    pub intent: StepIntent,
    pub step_index: usize,
    pub answers: serde_json::Value,
    pub booking: Option<BookingPayload>,
    pub utm: UtmParams,
}

/// Transport seam for the remote lead-upsert endpoint.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn upsert(&self, request: &LeadUpsertRequest) -> Result<serde_json::Value, StoreError>;
}

/// Extract the lead identifier from an endpoint response.
///
/// The endpoint's contract drifted over time; the canonical shape is a
/// top-level `lead_id`, and the remaining aliases (`lead.id`, `leadId`,
/// `id`) are accepted as a migration compatibility shim.
pub fn extract_lead_id(response: &serde_json::Value) -> Option<String> {
    let candidates = [
        response.get("lead_id"),
        response.get("lead").and_then(|lead| lead.get("id")),
        response.get("leadId"),
        response.get("id"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|value| match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

struct SaverInner {
    store: Arc<dyn LeadStore>,
    funnel_id: String,
    team_id: String,
    /// Per-session nonce folded into submit identifiers so idempotency is
    /// scoped to one page session.
    session_nonce: String,
    in_flight: AtomicBool,
    lead_id: Mutex<Option<String>>,
    submit_keys: Mutex<HashMap<usize, String>>,
}

/// Serialized access to the lead-upsert endpoint. Cheap to clone; clones
/// share the latch, the adopted lead id, and the submit-key cache.
#[derive(Clone)]
pub struct LeadSaver {
    inner: Arc<SaverInner>,
}

/// Releases the in-flight latch when the save completes, on every path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LeadSaver {
    pub fn new(
        store: Arc<dyn LeadStore>,
        funnel_id: impl Into<String>,
        team_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SaverInner {
                store,
                funnel_id: funnel_id.into(),
                team_id: team_id.into(),
                session_nonce: Uuid::new_v4().simple().to_string(),
                in_flight: AtomicBool::new(false),
                lead_id: Mutex::new(None),
                submit_keys: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The lead identifier adopted from the first successful upsert, if any.
    pub fn lead_id(&self) -> Option<String> {
        self.inner
            .lead_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stable submit identifier for a step index: derived once from
    /// `(funnel_id, step_index)` plus the session nonce, then cached so a
    /// retried submit reuses it.
    fn submit_key(&self, step_index: usize) -> String {
        let mut keys = self
            .inner
            .submit_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        keys.entry(step_index)
            .or_insert_with(|| {
                format!(
                    "{}-{}-{}",
                    self.inner.funnel_id, step_index, self.inner.session_nonce
                )
            })
            .clone()
    }

    /// Run one save. Never returns an error: backend failures fold into
    /// `Deferred`, concurrent calls into `DroppedInFlight`.
    pub async fn save(&self, request: SaveRequest) -> SaveOutcome {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(
                step_id = %request.step_id,
                "Dropping save, another persistence call is in flight"
            );
            return SaveOutcome::DroppedInFlight;
        }
        let _guard = InFlightGuard(&self.inner.in_flight);

        let client_request_id = match request.mode {
            SaveMode::Submit => self.submit_key(request.step_index),
            SaveMode::Draft => Uuid::new_v4().to_string(),
        };

        let wire = LeadUpsertRequest {
            funnel_id: self.inner.funnel_id.clone(),
            team_id: self.inner.team_id.clone(),
            lead_id: self.lead_id(),
            answers: request.answers,
            utm_source: request.utm.utm_source,
            utm_medium: request.utm.utm_medium,
            utm_campaign: request.utm.utm_campaign,
            calendly_booking: request.booking,
            submit_mode: request.mode,
            client_request_id,
            step_id: request.step_id,
            step_type: request.step_type,
            step_intent: request.intent,
        };

        match self.inner.store.upsert(&wire).await {
            Ok(response) => match extract_lead_id(&response) {
                Some(id) => {
                    *self
                        .inner
                        .lead_id
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(id.clone());
                    SaveOutcome::Saved { lead_id: id }
                }
                None => match self.lead_id() {
                    // The endpoint answered but without an id under any
                    // accepted alias; keep the one we already adopted.
                    Some(id) => {
                        tracing::warn!("Upsert response carried no lead id, keeping {}", id);
                        SaveOutcome::Saved { lead_id: id }
                    }
                    None => {
                        tracing::warn!("Upsert response carried no lead id under any alias");
                        SaveOutcome::Deferred {
                            reason: "response carried no lead id".to_string(),
                        }
                    }
                },
            },
            Err(e) => {
                tracing::warn!(
                    mode = %wire.submit_mode,
                    step_id = %wire.step_id,
                    "Lead save deferred: {}",
                    e
                );
                SaveOutcome::Deferred {
                    reason: e.to_string(),
                }
            }
        }
    }
}
