//! HTTP enrichment adapter.
//!
//! Issues company and contact lookups against an enrichment API and
//! validates the returned field tuples into the closed [`FieldKind`] set at
//! ingestion.
//!
//! [`FieldKind`]: prospector_types::FieldKind

use async_trait::async_trait;
use std::time::Duration;

use prospector_types::{ProspectorError, Result};

use crate::boundary::{
    classify_status, classify_transport, EnrichmentService, FieldReading, LookupKind,
};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug)]
pub struct HttpEnrichment {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpEnrichment {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.enrich.example.com".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("ENRICHMENT_API_KEY").map_err(|_| ProspectorError::AuthError {
            service: "enrichment".into(),
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Validate a `{"fields": [{field, value, confidence}]}` payload.
    /// Unknown names and mistyped values are dropped with a warning rather
    /// than trusted downstream.
    fn parse_fields(body: &serde_json::Value) -> Vec<FieldReading> {
        body["fields"]
            .as_array()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| {
                        let name = f["field"].as_str()?;
                        let confidence = f["confidence"].as_f64().unwrap_or(0.0);
                        FieldReading::from_wire(name, &f["value"], confidence)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl EnrichmentService for HttpEnrichment {
    async fn lookup(
        &self,
        kind: LookupKind,
        name: &str,
        domain: &str,
    ) -> Result<Vec<FieldReading>> {
        let path = match kind {
            LookupKind::Company => "v1/company",
            LookupKind::Contact => "v1/contact",
        };
        tracing::debug!(?kind, name, domain, "Enrichment lookup");

        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("name", name), ("domain", domain)])
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| classify_transport("enrichment", self.timeout_ms, &e))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status("enrichment", status, &message));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| classify_transport("enrichment", self.timeout_ms, &e))?;

        Ok(Self::parse_fields(&body))
    }

    fn name(&self) -> &str {
        "enrichment"
    }
}
