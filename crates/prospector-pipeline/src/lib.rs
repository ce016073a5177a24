//! Pipeline engine: stage components, per-lead retry, and the orchestrator
//! that drives every lead from raw candidate to reviewed draft.
//!
//! The stage ladder is fixed: source, clean, enrich, segment, generate,
//! guard, finalize. Leads move forward only; a failure parks the lead at
//! its current stage with a full error history, and the rest of the run
//! carries on.

pub mod cleaner;
pub mod config;
pub mod enricher;
pub mod events;
pub mod generator;
pub mod guardrail;
pub mod orchestrator;
pub mod retry;
pub mod segmenter;

pub use cleaner::clean;
pub use config::PipelineConfig;
pub use enricher::{EnrichOutcome, Enricher};
pub use events::{EventEmitter, PipelineEvent};
pub use generator::Generator;
pub use guardrail::Guardrail;
pub use orchestrator::{CancelHandle, Orchestrator, RunReport};
pub use retry::{BackoffPolicy, RetryConfig, StagePolicy};
pub use segmenter::{Criterion, IcpRubric, Matcher};
