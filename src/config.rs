//! Engine configuration.
//!
//! Reads `engine.toml` with sensible defaults, then layers environment
//! overrides on top (file → environment → CLI flags). The runtime works
//! with no config file at all: endpoints are optional and the demo runner
//! substitutes local stand-ins when they are absent.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! lead_endpoint = "https://api.example.com/funnel/leads"
//! events_endpoint = "https://api.example.com/funnel/events"
//! api_key = "sk_live_..."
//!
//! [booking]
//! widget_domain = "calendly.com"
//! confirm_delay_ms = 1200
//! webhook_bind = "127.0.0.1:0"
//!
//! [team]
//! team_id = "team_1"
//! privacy_policy_url = "https://example.com/privacy"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::EngineError;

/// Remote endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Lead-upsert endpoint URL.
    #[serde(default)]
    pub lead_endpoint: Option<String>,
    /// Event-recording endpoint URL.
    #[serde(default)]
    pub events_endpoint: Option<String>,
    /// Bearer token for both endpoints.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Scheduling-widget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Domain inbound widget messages must originate from.
    #[serde(default = "default_widget_domain")]
    pub widget_domain: String,
    /// Delay between the widget's completion message and the booking
    /// callback, so the visitor sees the widget's own confirmation.
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
    /// Bind address for the booking webhook receiver.
    #[serde(default = "default_webhook_bind")]
    pub webhook_bind: String,
}

fn default_widget_domain() -> String {
    "calendly.com".to_string()
}

fn default_confirm_delay_ms() -> u64 {
    1200
}

fn default_webhook_bind() -> String {
    "127.0.0.1:0".to_string()
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            widget_domain: default_widget_domain(),
            confirm_delay_ms: default_confirm_delay_ms(),
            webhook_bind: default_webhook_bind(),
        }
    }
}

/// Tenant settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default = "default_team_id")]
    pub team_id: String,
    /// Team-level privacy policy URL, the last link in the consent
    /// resolution chain.
    #[serde(default)]
    pub privacy_policy_url: Option<String>,
}

fn default_team_id() -> String {
    "team_local".to_string()
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            team_id: default_team_id(),
            privacy_policy_url: None,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub team: TeamConfig,
}

impl EngineConfig {
    /// Load from a TOML file, or return defaults when the file is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| EngineError::ConfigParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layer process-environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        let vars: HashMap<String, String> = std::env::vars().collect();
        self.apply_env_map(&vars);
    }

    /// Environment layering against an explicit map (testable without
    /// touching process state).
    pub fn apply_env_map(&mut self, vars: &HashMap<String, String>) {
        let non_empty = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        if let Some(v) = non_empty("FUNNEL_LEAD_ENDPOINT") {
            self.api.lead_endpoint = Some(v);
        }
        if let Some(v) = non_empty("FUNNEL_EVENTS_ENDPOINT") {
            self.api.events_endpoint = Some(v);
        }
        if let Some(v) = non_empty("FUNNEL_API_KEY") {
            self.api.api_key = Some(v);
        }
        if let Some(v) = non_empty("FUNNEL_TEAM_ID") {
            self.team.team_id = v;
        }
        if let Some(v) = non_empty("FUNNEL_PRIVACY_POLICY_URL") {
            self.team.privacy_policy_url = Some(v);
        }
        if let Some(v) = non_empty("FUNNEL_WIDGET_DOMAIN") {
            self.booking.widget_domain = v;
        }
    }
}
