//! Backoff policies and per-stage retry limits.

use std::time::Duration;

use prospector_types::Stage;

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let millis = base.as_millis() as u64 * 2u64.saturating_pow(attempt);
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Retry limits for one stage. External services differ in reliability, so
/// each stage gets its own policy.
#[derive(Debug, Clone)]
pub struct StagePolicy {
    /// Total attempts allowed, including the first (default 3).
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Per-stage retry configuration.
#[derive(Debug, Clone, Default)]
pub struct RetryConfig {
    pub source: StagePolicy,
    pub enrich: StagePolicy,
    pub generate: StagePolicy,
}

impl RetryConfig {
    pub fn for_stage(&self, stage: Stage) -> &StagePolicy {
        match stage {
            Stage::Source => &self.source,
            Stage::Enrich => &self.enrich,
            Stage::Generate => &self.generate,
            // Clean, segment, guard, and finalize are local computation and
            // never retried.
            _ => &self.enrich,
        }
    }

    /// Zero-delay variant for tests.
    pub fn immediate() -> Self {
        let policy = StagePolicy {
            max_attempts: 3,
            backoff: BackoffPolicy::None,
        };
        Self {
            source: policy.clone(),
            enrich: policy.clone(),
            generate: policy,
        }
    }
}
