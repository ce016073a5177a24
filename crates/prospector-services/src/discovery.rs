//! HTTP discovery adapter over a search-API-style endpoint.

use async_trait::async_trait;
use std::time::Duration;

use prospector_types::{ProspectorError, RawCandidate, Result};

use crate::boundary::{classify_status, classify_transport, DiscoveryService};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Queries a search endpoint for candidate companies. The response shape is
/// the common `organic_results` list of `{title, link, snippet}` objects.
#[derive(Debug)]
pub struct HttpDiscovery {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpDiscovery {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://serpapi.com".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("DISCOVERY_API_KEY").map_err(|_| ProspectorError::AuthError {
            service: "discovery".into(),
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

    fn parse_results(&self, body: &serde_json::Value, count: usize) -> Vec<RawCandidate> {
        body["organic_results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .take(count)
                    .map(|r| RawCandidate {
                        name: r["title"].as_str().unwrap_or("").to_string(),
                        domain: r["link"].as_str().unwrap_or("").to_string(),
                        description: r["snippet"].as_str().unwrap_or("").to_string(),
                        location: r["address"].as_str().unwrap_or("").to_string(),
                        website: r["link"].as_str().unwrap_or("").to_string(),
                        ..Default::default()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DiscoveryService for HttpDiscovery {
    async fn discover(&self, topic: &str, count: usize) -> Result<Vec<RawCandidate>> {
        let query = format!("{topic} exhibitors companies");
        tracing::info!(topic, count, "Discovery search");

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("engine", "google"),
                ("q", query.as_str()),
                ("num", &count.to_string()),
                ("api_key", self.api_key.as_str()),
            ])
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| classify_transport("discovery", self.timeout_ms, &e))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status("discovery", status, &message));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| classify_transport("discovery", self.timeout_ms, &e))?;

        let candidates = self.parse_results(&body, count);
        tracing::info!(found = candidates.len(), "Discovery returned candidates");
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "discovery"
    }
}
