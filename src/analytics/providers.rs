//! Per-provider event-name mapping and delivery adapters.
//!
//! Each provider maps the internal vocabulary through its own fixed table
//! and logs the call it would place against the provider's surface — the
//! concrete wire format of any one SDK is out of scope here; the mapping
//! and the at-most-once guarantee are what the engine owns.

use std::sync::Arc;

use super::{MappedEvent, TrackingEvent, TrackingProvider};
use crate::funnel::TrackingIds;

macro_rules! log_delivery {
    ($self:ident, $event:ident) => {
        tracing::info!(
            provider = $self.name(),
            account = $self.id.as_deref().unwrap_or(""),
            event_name = $event.event_name,
            correlation_id = %$event.correlation_id,
            value = $event.payload.value.unwrap_or(0.0),
            "Dispatching analytics event"
        );
    };
}

/// Meta (Facebook) pixel. Uses the standard-event names directly.
pub struct MetaPixel {
    id: Option<String>,
}

impl MetaPixel {
    pub fn new(id: Option<String>) -> Self {
        Self { id }
    }
}

impl TrackingProvider for MetaPixel {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn is_configured(&self) -> bool {
        self.id.is_some()
    }

    fn event_name(&self, event: TrackingEvent) -> &'static str {
        match event {
            TrackingEvent::ViewContent => "ViewContent",
            TrackingEvent::Lead => "Lead",
            TrackingEvent::CompleteRegistration => "CompleteRegistration",
            TrackingEvent::Schedule => "Schedule",
        }
    }

    fn deliver(&self, event: &MappedEvent) {
        log_delivery!(self, event);
    }
}

/// Google Ads (gtag) conversion events.
pub struct GoogleAds {
    id: Option<String>,
}

impl GoogleAds {
    pub fn new(id: Option<String>) -> Self {
        Self { id }
    }
}

impl TrackingProvider for GoogleAds {
    fn name(&self) -> &'static str {
        "google_ads"
    }

    fn is_configured(&self) -> bool {
        self.id.is_some()
    }

    fn event_name(&self, event: TrackingEvent) -> &'static str {
        match event {
            TrackingEvent::ViewContent => "page_view",
            TrackingEvent::Lead => "generate_lead",
            TrackingEvent::CompleteRegistration => "sign_up",
            TrackingEvent::Schedule => "book_appointment",
        }
    }

    fn deliver(&self, event: &MappedEvent) {
        log_delivery!(self, event);
    }
}

/// TikTok pixel standard events.
pub struct TikTokPixel {
    id: Option<String>,
}

impl TikTokPixel {
    pub fn new(id: Option<String>) -> Self {
        Self { id }
    }
}

impl TrackingProvider for TikTokPixel {
    fn name(&self) -> &'static str {
        "tiktok"
    }

    fn is_configured(&self) -> bool {
        self.id.is_some()
    }

    fn event_name(&self, event: TrackingEvent) -> &'static str {
        match event {
            TrackingEvent::ViewContent => "ViewContent",
            TrackingEvent::Lead => "SubmitForm",
            TrackingEvent::CompleteRegistration => "CompleteRegistration",
            TrackingEvent::Schedule => "Contact",
        }
    }

    fn deliver(&self, event: &MappedEvent) {
        log_delivery!(self, event);
    }
}

/// LinkedIn Insight tag conversions.
pub struct LinkedInInsight {
    id: Option<String>,
}

impl LinkedInInsight {
    pub fn new(id: Option<String>) -> Self {
        Self { id }
    }
}

impl TrackingProvider for LinkedInInsight {
    fn name(&self) -> &'static str {
        "linkedin"
    }

    fn is_configured(&self) -> bool {
        self.id.is_some()
    }

    fn event_name(&self, event: TrackingEvent) -> &'static str {
        match event {
            TrackingEvent::ViewContent => "view_content",
            TrackingEvent::Lead => "lead",
            TrackingEvent::CompleteRegistration => "sign_up",
            TrackingEvent::Schedule => "book_appointment",
        }
    }

    fn deliver(&self, event: &MappedEvent) {
        log_delivery!(self, event);
    }
}

/// Build the provider set from the funnel's configured tracking ids.
pub fn providers_from(tracking: &TrackingIds) -> Vec<Arc<dyn TrackingProvider>> {
    vec![
        Arc::new(MetaPixel::new(tracking.meta_pixel_id.clone())),
        Arc::new(GoogleAds::new(tracking.google_ads_id.clone())),
        Arc::new(TikTokPixel::new(tracking.tiktok_pixel_id.clone())),
        Arc::new(LinkedInInsight::new(tracking.linkedin_partner_id.clone())),
    ]
}
