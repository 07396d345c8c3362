//! External booking completion listener.
//!
//! The embedded scheduling widget reports completion asynchronously through
//! a cross-origin message channel. This module abstracts that channel as a
//! generic completion-notifier seam: any producer (the HTTP webhook in
//! [`webhook`], a webview bridge, a test) pushes `WidgetMessage` values
//! into an mpsc channel, and `BookingListener` consumes them.
//!
//! The listener latches on the first qualifying message: the booking
//! payload is extracted once, held in a single slot, and the registered
//! callback is invoked exactly once after a short confirmation delay (the
//! visitor gets to see the widget's own confirmation screen first). Later
//! completion messages are ignored for the listener's lifetime — the latch
//! is never reset within one mount. Dropping the listener unsubscribes.

pub mod webhook;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Event name that signals scheduling completion.
pub const SCHEDULED_EVENT: &str = "scheduled";

/// Delay between receiving the completion message and invoking the
/// callback.
pub const DEFAULT_CONFIRM_DELAY: Duration = Duration::from_millis(1200);

/// One inbound message from the widget's message channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetMessage {
    /// Origin the message arrived from
    pub origin: String,
    /// Event name (only [`SCHEDULED_EVENT`] qualifies)
    pub event: String,
    /// Raw widget payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Booking fields extracted from a scheduling-completed message. Produced
/// at most once per widget mount; overwritten, never queued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_email: Option<String>,
}

impl BookingPayload {
    /// Extract booking fields from the widget payload shape
    /// `{ event: { uri, start_time, end_time }, invitee: { uri, name, email } }`.
    /// Missing fields default to `None`.
    pub fn from_widget_payload(payload: &serde_json::Value) -> Self {
        let pick = |v: &serde_json::Value, outer: &str, inner: &str| {
            v.get(outer)
                .and_then(|o| o.get(inner))
                .and_then(|s| s.as_str())
                .map(|s| s.to_string())
        };
        Self {
            event_uri: pick(payload, "event", "uri"),
            event_start_time: pick(payload, "event", "start_time"),
            event_end_time: pick(payload, "event", "end_time"),
            invitee_uri: pick(payload, "invitee", "uri"),
            invitee_name: pick(payload, "invitee", "name"),
            invitee_email: pick(payload, "invitee", "email"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_uri.is_none()
            && self.invitee_uri.is_none()
            && self.event_start_time.is_none()
            && self.event_end_time.is_none()
            && self.invitee_name.is_none()
            && self.invitee_email.is_none()
    }
}

/// Whether a message qualifies as a scheduling completion from the
/// expected widget origin.
pub fn qualifies(message: &WidgetMessage, widget_domain: &str) -> bool {
    message.origin.contains(widget_domain) && message.event == SCHEDULED_EVENT
}

/// Single-shot listener over the widget message channel.
///
/// The subscription lives as long as this value; dropping it aborts the
/// consumer task.
pub struct BookingListener {
    handle: JoinHandle<()>,
}

impl BookingListener {
    /// Spawn the listener task. `on_complete` is invoked exactly once, with
    /// the extracted payload, `confirm_delay` after the first qualifying
    /// message.
    pub fn spawn<F>(
        mut rx: mpsc::Receiver<WidgetMessage>,
        widget_domain: String,
        confirm_delay: Duration,
        mut on_complete: F,
    ) -> Self
    where
        F: FnMut(BookingPayload) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut handled = false;
            while let Some(message) = rx.recv().await {
                if !qualifies(&message, &widget_domain) {
                    tracing::debug!(
                        origin = %message.origin,
                        event = %message.event,
                        "Ignoring non-qualifying widget message"
                    );
                    continue;
                }
                if handled {
                    tracing::debug!("Ignoring repeat scheduling-completed message");
                    continue;
                }
                handled = true;

                let payload = BookingPayload::from_widget_payload(&message.payload);
                tracing::info!(
                    event_uri = payload.event_uri.as_deref().unwrap_or(""),
                    "Booking completed, notifying after confirmation delay"
                );
                tokio::time::sleep(confirm_delay).await;
                on_complete(payload);
            }
        });
        Self { handle }
    }
}

impl Drop for BookingListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduled_message(origin: &str) -> WidgetMessage {
        WidgetMessage {
            origin: origin.to_string(),
            event: SCHEDULED_EVENT.to_string(),
            payload: serde_json::json!({
                "event": {
                    "uri": "https://api.calendly.com/scheduled_events/ev_1",
                    "start_time": "2026-08-07T10:00:00Z",
                    "end_time": "2026-08-07T10:30:00Z"
                },
                "invitee": {
                    "uri": "https://api.calendly.com/invitees/inv_1",
                    "name": "Ada",
                    "email": "ada@example.com"
                }
            }),
        }
    }

    #[test]
    fn test_payload_extraction() {
        let message = scheduled_message("https://calendly.com");
        let payload = BookingPayload::from_widget_payload(&message.payload);
        assert_eq!(
            payload.event_uri.as_deref(),
            Some("https://api.calendly.com/scheduled_events/ev_1")
        );
        assert_eq!(payload.invitee_email.as_deref(), Some("ada@example.com"));
        assert_eq!(payload.invitee_name.as_deref(), Some("Ada"));
        assert!(!payload.is_empty());
    }

    #[test]
    fn test_payload_extraction_defaults_missing_fields() {
        let payload = BookingPayload::from_widget_payload(&serde_json::json!({}));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_qualification_checks_origin_and_event() {
        let good = scheduled_message("https://calendly.com");
        assert!(qualifies(&good, "calendly.com"));
        assert!(!qualifies(&good, "other-widget.io"));

        let mut wrong_event = scheduled_message("https://calendly.com");
        wrong_event.event = "height_changed".to_string();
        assert!(!qualifies(&wrong_event, "calendly.com"));
    }

    #[tokio::test]
    async fn test_callback_invoked_exactly_once_for_duplicate_messages() {
        let (tx, rx) = mpsc::channel(8);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let _listener = BookingListener::spawn(
            rx,
            "calendly.com".to_string(),
            Duration::from_millis(10),
            move |_payload| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        tx.send(scheduled_message("https://calendly.com"))
            .await
            .unwrap();
        tx.send(scheduled_message("https://calendly.com"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_qualifying_messages_never_invoke_callback() {
        let (tx, rx) = mpsc::channel(8);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let _listener = BookingListener::spawn(
            rx,
            "calendly.com".to_string(),
            Duration::from_millis(1),
            move |_payload| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        tx.send(scheduled_message("https://evil.example"))
            .await
            .unwrap();
        let mut wrong_event = scheduled_message("https://calendly.com");
        wrong_event.event = "profile_page_viewed".to_string();
        tx.send(wrong_event).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (tx, rx) = mpsc::channel(8);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let listener = BookingListener::spawn(
            rx,
            "calendly.com".to_string(),
            Duration::from_millis(1),
            move |_payload| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
        );
        drop(listener);

        // The consumer task is aborted; the message is never processed.
        let _ = tx.send(scheduled_message("https://calendly.com")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
