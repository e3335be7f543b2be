use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::CallError;

const DISCOVERY_TIMEOUT_SECS: u64 = 10;

/// Source of a domain's raw client well-known document.
#[async_trait]
pub trait ClientConfigSource: Send + Sync {
    async fn raw_client_config(&self, domain: &str) -> Result<Value, CallError>;
}

const WELL_KNOWN_PATH: &str = "/.well-known/matrix/client";

/// Fetches `/.well-known/matrix/client` over HTTPS.
pub struct WellKnownClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl WellKnownClient {
    pub fn new() -> Result<Self, CallError> {
        Self::build(None)
    }

    /// Query `base_url` for every domain instead of `https://{domain}`,
    /// e.g. a local homeserver during development.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CallError> {
        Self::build(Some(base_url.into()))
    }

    fn build(base_url: Option<String>) -> Result<Self, CallError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DISCOVERY_TIMEOUT_SECS))
            .build()
            .map_err(|e| CallError::Http(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn well_known_url(&self, domain: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{}{WELL_KNOWN_PATH}", base.trim_end_matches('/')),
            None => format!("https://{}{WELL_KNOWN_PATH}", domain.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ClientConfigSource for WellKnownClient {
    async fn raw_client_config(&self, domain: &str) -> Result<Value, CallError> {
        let url = self.well_known_url(domain);
        tracing::debug!("fetching client well-known from {url}");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CallError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CallError::Discovery(format!(
                "well-known for {domain} returned status {}",
                resp.status()
            )));
        }

        let doc: Value = resp
            .json()
            .await
            .map_err(|e| CallError::Discovery(format!("invalid well-known for {domain}: {e}")))?;
        if !doc.is_object() {
            return Err(CallError::Discovery(format!("well-known for {domain} is not an object")));
        }
        Ok(doc)
    }
}
