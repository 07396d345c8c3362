//! Outbound analytics fan-out.
//!
//! A small internal event vocabulary (`ViewContent`, `Lead`,
//! `CompleteRegistration`, `Schedule`) fans out to up to four independently
//! optional tracking providers. Every fire passes the unbounded pixel
//! registry first — conversion events must reach a provider at most once
//! per semantic occurrence for the whole session — and carries one
//! cross-provider correlation id for provider-side deduplication.
//!
//! An unconfigured provider is a silent no-op for that provider only;
//! providers never affect each other.

pub mod providers;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::dedupe::{PixelRegistry, digest_key};

/// Outbound analytics event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingEvent {
    ViewContent,
    Lead,
    CompleteRegistration,
    Schedule,
}

impl std::fmt::Display for TrackingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrackingEvent::ViewContent => "ViewContent",
            TrackingEvent::Lead => "Lead",
            TrackingEvent::CompleteRegistration => "CompleteRegistration",
            TrackingEvent::Schedule => "Schedule",
        };
        write!(f, "{}", s)
    }
}

/// Provider-agnostic payload shape: currency, value, content metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_category: Option<String>,
}

/// One event as handed to a single provider.
#[derive(Debug, Clone)]
pub struct MappedEvent {
    /// Provider short name
    pub provider: &'static str,
    /// Provider-native event name
    pub event_name: &'static str,
    /// Shared across all providers for one semantic occurrence
    pub correlation_id: String,
    pub payload: NormalizedPayload,
}

/// One configured tracking provider.
pub trait TrackingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    /// Whether the funnel configured this provider (id present).
    fn is_configured(&self) -> bool;
    /// Map the internal vocabulary to this provider's native event name.
    fn event_name(&self, event: TrackingEvent) -> &'static str;
    /// Hand the event to the provider's call surface. Infallible from the
    /// hub's perspective; delivery problems stay inside the provider.
    fn deliver(&self, event: &MappedEvent);
}

/// Fan-out hub over the configured providers.
pub struct AnalyticsHub {
    providers: Vec<Arc<dyn TrackingProvider>>,
    fired: Mutex<PixelRegistry>,
}

impl AnalyticsHub {
    pub fn new(providers: Vec<Arc<dyn TrackingProvider>>) -> Self {
        Self {
            providers,
            fired: Mutex::new(PixelRegistry::new()),
        }
    }

    /// A hub with no providers; fires become registry-only no-ops.
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    /// Fire one event toward every configured provider.
    ///
    /// `dedupe_key` identifies the semantic occurrence (one "Lead" per
    /// captured email); when absent, a digest of the event and payload is
    /// used so identical occurrences still collapse.
    pub fn fire(
        &self,
        event: TrackingEvent,
        payload: NormalizedPayload,
        dedupe_key: Option<&str>,
    ) {
        let key = match dedupe_key {
            Some(k) => k.to_string(),
            None => digest_key(
                &event.to_string(),
                &serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null),
            ),
        };

        {
            let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
            if !fired.register(&key) {
                tracing::debug!(event = %event, dedupe_key = %key, "Suppressing already-fired pixel event");
                return;
            }
        }

        let correlation_id = Uuid::new_v4().to_string();
        for provider in &self.providers {
            if !provider.is_configured() {
                continue;
            }
            let mapped = MappedEvent {
                provider: provider.name(),
                event_name: provider.event_name(event),
                correlation_id: correlation_id.clone(),
                payload: payload.clone(),
            };
            provider.deliver(&mapped);
        }
    }
}
