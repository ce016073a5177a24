//! External service boundaries for the Prospector pipeline.
//!
//! Three collaborator services back the pipeline stages: discovery (candidate
//! sourcing), enrichment (firmographic/contact lookups), and generation
//! (outreach drafting). Each is a trait with an HTTP adapter; errors are
//! classified into transient/permanent at this boundary so the orchestrator
//! can treat retryability as data.

pub mod boundary;
pub mod discovery;
pub mod enrichment;
pub mod fixtures;
pub mod generation;

pub use boundary::{
    classify_status, DiscoveryService, DraftReply, DraftRequest, DynDiscovery, DynEnrichment,
    DynGeneration, EnrichmentService, FieldReading, GenerationService, LookupKind, Persona,
};
pub use discovery::HttpDiscovery;
pub use enrichment::HttpEnrichment;
pub use fixtures::{FixtureDiscovery, FixtureEnrichment, FixtureGenerator};
pub use generation::OpenAiGenerator;
