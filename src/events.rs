//! Internal funnel event recording.
//!
//! Internal events (`funnel_view`, `step_completed`, `lead_submitted`,
//! `schedule`, `funnel_completed`) feed the product's own funnel analytics
//! through the remote event-recording endpoint. Recording is
//! fire-and-forget: the sequencer never waits on it and failures are only
//! logged.
//!
//! Every emission passes through the time-windowed dedupe cache first, so
//! render-loop duplicates inside the window are suppressed while a
//! legitimate re-emission after it (a retried call) still lands.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use crate::dedupe::EventWindow;
use crate::errors::StoreError;

/// Internal funnel event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelEventType {
    FunnelView,
    StepCompleted,
    LeadSubmitted,
    Schedule,
    FunnelCompleted,
}

impl std::fmt::Display for FunnelEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FunnelEventType::FunnelView => "funnel_view",
            FunnelEventType::StepCompleted => "step_completed",
            FunnelEventType::LeadSubmitted => "lead_submitted",
            FunnelEventType::Schedule => "schedule",
            FunnelEventType::FunnelCompleted => "funnel_completed",
        };
        write!(f, "{}", s)
    }
}

/// Wire record for the remote event-recording endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelEventRecord {
    pub team_id: String,
    pub funnel_id: String,
    pub event_type: FunnelEventType,
    pub dedupe_key: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Transport seam for the event-recording endpoint.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, record: FunnelEventRecord) -> Result<(), StoreError>;
}

/// Deduplicating, fire-and-forget recorder. Cheap to clone; clones share
/// the dedupe window.
#[derive(Clone)]
pub struct EventRecorder {
    sink: Arc<dyn EventSink>,
    window: Arc<Mutex<EventWindow>>,
    team_id: String,
    funnel_id: String,
}

impl EventRecorder {
    pub fn new(
        sink: Arc<dyn EventSink>,
        team_id: impl Into<String>,
        funnel_id: impl Into<String>,
    ) -> Self {
        Self::with_window(sink, team_id, funnel_id, EventWindow::default())
    }

    pub fn with_window(
        sink: Arc<dyn EventSink>,
        team_id: impl Into<String>,
        funnel_id: impl Into<String>,
        window: EventWindow,
    ) -> Self {
        Self {
            sink,
            window: Arc::new(Mutex::new(window)),
            team_id: team_id.into(),
            funnel_id: funnel_id.into(),
        }
    }

    /// Emit one internal event. Suppressed when the dedupe key fired within
    /// the window; otherwise recorded asynchronously, failures logged only.
    pub fn emit(
        &self,
        event_type: FunnelEventType,
        dedupe_key: impl Into<String>,
        payload: serde_json::Value,
    ) {
        let dedupe_key = dedupe_key.into();
        {
            let mut window = self
                .window
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !window.check_and_record(&dedupe_key) {
                tracing::debug!(
                    event_type = %event_type,
                    dedupe_key = %dedupe_key,
                    "Suppressing duplicate funnel event inside dedupe window"
                );
                return;
            }
        }

        let record = FunnelEventRecord {
            team_id: self.team_id.clone(),
            funnel_id: self.funnel_id.clone(),
            event_type,
            dedupe_key,
            payload,
            occurred_at: Utc::now(),
        };

        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.record(record).await {
                tracing::warn!("Failed to record funnel event: {}", e);
            }
        });
    }
}
