//! HTTP implementations of the persistence seams (reqwest).
//!
//! Both clients are thin: POST JSON, check the status, hand the body back.
//! Retry policy is deliberately absent — the lead saver's caller re-triggers
//! on the next user action, and event recording is fire-and-forget.

use async_trait::async_trait;
use reqwest::Client;

use super::{LeadStore, LeadUpsertRequest};
use crate::errors::StoreError;
use crate::events::{EventSink, FunnelEventRecord};

/// Lead-upsert endpoint client.
pub struct HttpLeadStore {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpLeadStore {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LeadStore for HttpLeadStore {
    async fn upsert(&self, request: &LeadUpsertRequest) -> Result<serde_json::Value, StoreError> {
        let mut req = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Endpoint {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

/// Event-recording endpoint client.
pub struct HttpEventSink {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEventSink {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn record(&self, record: FunnelEventRecord) -> Result<(), StoreError> {
        let mut req = self.client.post(&self.endpoint).json(&record);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Endpoint {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
