//! Run configuration and its validation.

use prospector_services::Persona;
use prospector_types::{ProspectorError, Result};

use crate::retry::RetryConfig;
use crate::segmenter::IcpRubric;

/// Everything a pipeline run needs to know up front. Invalid configuration
/// is a fatal error: the run refuses to start rather than limping along.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Search topic handed to the discovery service.
    pub topic: String,
    /// How many candidate companies to request.
    pub target_count: usize,
    /// Concurrent enrichment lookups across leads.
    pub enrich_concurrency: usize,
    /// Concurrent generation calls across leads.
    pub generate_concurrency: usize,
    pub retry: RetryConfig,
    pub rubric: IcpRubric,
    pub persona: Persona,
}

impl PipelineConfig {
    pub fn new(topic: impl Into<String>, target_count: usize, persona: Persona) -> Self {
        Self {
            topic: topic.into(),
            target_count,
            enrich_concurrency: 4,
            generate_concurrency: 2,
            retry: RetryConfig::default(),
            rubric: IcpRubric::default(),
            persona,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(ProspectorError::ConfigInvalid("topic is empty".into()));
        }
        if self.target_count == 0 {
            return Err(ProspectorError::ConfigInvalid(
                "target_count must be at least 1".into(),
            ));
        }
        if self.target_count > 500 {
            return Err(ProspectorError::ConfigInvalid(format!(
                "target_count {} above the per-run cap of 500",
                self.target_count
            )));
        }
        for (name, value) in [
            ("enrich_concurrency", self.enrich_concurrency),
            ("generate_concurrency", self.generate_concurrency),
        ] {
            if value == 0 || value > 64 {
                return Err(ProspectorError::ConfigInvalid(format!(
                    "{name} must be in 1..=64, got {value}"
                )));
            }
        }
        if self.persona.sender_name.trim().is_empty() || self.persona.org_name.trim().is_empty() {
            return Err(ProspectorError::ConfigInvalid(
                "persona needs a sender and an org name".into(),
            ));
        }
        self.rubric.validate()
    }
}
