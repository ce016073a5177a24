//! Shared types for the Prospector lead pipeline.
//!
//! This crate provides the foundational types used across all other
//! Prospector crates:
//! - `ProspectorError` - unified error taxonomy with retryability as data
//! - `Stage` / `LeadStatus` - the per-lead state machine vocabulary
//! - `Lead` - the central entity tracked through the pipeline
//! - `FieldKind` / `FieldValue` - the closed set of enrichment fields

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for all Prospector subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ProspectorError {
    // === External service errors ===
    #[error("Transient error from {service}: {message}")]
    TransientService { service: String, message: String },

    #[error("Permanent error from {service}: {message}")]
    PermanentService { service: String, message: String },

    #[error("Rate limited by {service}, retry after {retry_after_ms}ms")]
    RateLimited {
        service: String,
        retry_after_ms: u64,
    },

    #[error("Request to {service} timed out after {timeout_ms}ms")]
    RequestTimeout { service: String, timeout_ms: u64 },

    #[error("Authentication failed for {service}")]
    AuthError { service: String },

    // === Stage errors ===
    #[error("Record has neither company name nor domain")]
    InsufficientIdentity,

    #[error("Generation service returned empty output")]
    GenerationEmpty,

    #[error("Guardrail rejected draft: {reason}")]
    GuardrailReject { reason: String },

    #[error("Attempts exhausted at stage {stage} after {attempts} attempts")]
    AttemptsExhausted { stage: Stage, attempts: u32 },

    // === Run-level errors ===
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Run cancelled")]
    Cancelled,

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ProspectorError {
    /// Returns `true` if the error is transient and the operation may
    /// succeed on retry. This predicate drives the orchestrator's retry
    /// decision - retryability is data carried by the error, not control
    /// flow.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProspectorError::TransientService { .. }
                | ProspectorError::RateLimited { .. }
                | ProspectorError::RequestTimeout { .. }
                | ProspectorError::GenerationEmpty
        )
    }

    /// Returns `true` if the error makes the entire run unsafe to continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProspectorError::ConfigInvalid(_))
    }

    /// The audit-history classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProspectorError::TransientService { .. }
            | ProspectorError::RateLimited { .. }
            | ProspectorError::RequestTimeout { .. } => ErrorKind::TransientServiceError,
            ProspectorError::PermanentService { .. } | ProspectorError::AuthError { .. } => {
                ErrorKind::PermanentServiceError
            }
            ProspectorError::InsufficientIdentity => ErrorKind::InsufficientIdentity,
            ProspectorError::GenerationEmpty => ErrorKind::GenerationEmpty,
            ProspectorError::GuardrailReject { .. } => ErrorKind::GuardrailReject,
            ProspectorError::AttemptsExhausted { .. } => ErrorKind::AttemptExhausted,
            ProspectorError::ConfigInvalid(_) => ErrorKind::ConfigurationInvalid,
            _ => ErrorKind::Other,
        }
    }
}

/// A convenience alias for `Result<T, ProspectorError>`.
pub type Result<T> = std::result::Result<T, ProspectorError>;

/// Serializable error classification recorded in a lead's audit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientIdentity,
    TransientServiceError,
    PermanentServiceError,
    GenerationEmpty,
    GuardrailReject,
    GuardrailFlag,
    AttemptExhausted,
    ConfigurationInvalid,
    Other,
}

// ---------------------------------------------------------------------------
// Stage / LeadStatus - the state machine vocabulary
// ---------------------------------------------------------------------------

/// One step of the fixed pipeline sequence. The derived ordering **is** the
/// pipeline order; a lead's stage never regresses except for explicit reset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Source,
    Clean,
    Enrich,
    Segment,
    Generate,
    Guard,
    Finalize,
}

impl Stage {
    /// The stage a lead moves to after succeeding at this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Source => Some(Stage::Clean),
            Stage::Clean => Some(Stage::Enrich),
            Stage::Enrich => Some(Stage::Segment),
            Stage::Segment => Some(Stage::Generate),
            Stage::Generate => Some(Stage::Guard),
            Stage::Guard => Some(Stage::Finalize),
            Stage::Finalize => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Source => "source",
            Stage::Clean => "clean",
            Stage::Enrich => "enrich",
            Stage::Segment => "segment",
            Stage::Generate => "generate",
            Stage::Guard => "guard",
            Stage::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// Processing status of a lead. Succeeded, Failed and Skipped are terminal:
/// no further automatic processing occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Skipped,
}

impl LeadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LeadStatus::Succeeded | LeadStatus::Failed | LeadStatus::Skipped
        )
    }
}

// ---------------------------------------------------------------------------
// Enrichment fields - closed tagged set, validated at ingestion
// ---------------------------------------------------------------------------

/// The closed set of enrichment field kinds. External services return
/// free-form field names; anything outside this set is dropped at ingestion
/// rather than trusted downstream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Industry,
    EmployeeCount,
    RevenueUsd,
    FoundedYear,
    Location,
    Website,
    LinkedinUrl,
    ContactName,
    ContactTitle,
    ContactEmail,
}

/// Declared value type for a field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
}

impl FieldKind {
    pub fn value_kind(self) -> ValueKind {
        match self {
            FieldKind::EmployeeCount | FieldKind::RevenueUsd | FieldKind::FoundedYear => {
                ValueKind::Integer
            }
            _ => ValueKind::Text,
        }
    }

    /// Parse an external field name into a known kind.
    pub fn parse(name: &str) -> Option<FieldKind> {
        match name.trim().to_ascii_lowercase().as_str() {
            "industry" => Some(FieldKind::Industry),
            "employee_count" | "employees" => Some(FieldKind::EmployeeCount),
            "revenue_usd" | "revenue" => Some(FieldKind::RevenueUsd),
            "founded_year" | "founded" => Some(FieldKind::FoundedYear),
            "location" => Some(FieldKind::Location),
            "website" => Some(FieldKind::Website),
            "linkedin_url" | "linkedin" => Some(FieldKind::LinkedinUrl),
            "contact_name" => Some(FieldKind::ContactName),
            "contact_title" => Some(FieldKind::ContactTitle),
            "contact_email" => Some(FieldKind::ContactEmail),
            _ => None,
        }
    }

    /// Canonical wire name, the inverse of [`FieldKind::parse`].
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Industry => "industry",
            FieldKind::EmployeeCount => "employee_count",
            FieldKind::RevenueUsd => "revenue_usd",
            FieldKind::FoundedYear => "founded_year",
            FieldKind::Location => "location",
            FieldKind::Website => "website",
            FieldKind::LinkedinUrl => "linkedin_url",
            FieldKind::ContactName => "contact_name",
            FieldKind::ContactTitle => "contact_title",
            FieldKind::ContactEmail => "contact_email",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated enrichment value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
}

impl FieldValue {
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        match (self, kind.value_kind()) {
            (FieldValue::Text(_), ValueKind::Text) => true,
            (FieldValue::Integer(_), ValueKind::Integer) => true,
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(n) => write!(f, "{n}"),
        }
    }
}

/// One stored enrichment field with provenance and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedField {
    pub value: FieldValue,
    /// Which service produced this value.
    pub source: String,
    /// Confidence in 0.0..=1.0 as reported by the service.
    pub confidence: f64,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Raw candidates, segments, drafts, verdicts
// ---------------------------------------------------------------------------

/// A raw candidate record as returned by the discovery service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub booth: String,
    #[serde(default)]
    pub contacts_text: String,
}

/// ICP segment assigned by the segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub score: f64,
    pub tier: Tier,
}

/// Discrete ICP tier, best first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    A,
    B,
    C,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::A => f.write_str("A"),
            Tier::B => f.write_str("B"),
            Tier::C => f.write_str("C"),
        }
    }
}

/// A generated outreach draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub subject: String,
    pub body: String,
    /// Model or service identifier that produced the draft.
    pub model: String,
    pub generated_at: DateTime<Utc>,
    /// Which generation round produced this draft (1-based).
    pub attempt: u32,
}

/// Guardrail verdict for a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "reason")]
pub enum Verdict {
    Pass,
    Flag(String),
    Reject(String),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// One append-only entry in a lead's error history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Lead identity
// ---------------------------------------------------------------------------

/// Stable lead identifier: hex prefix of SHA-256 over the normalized
/// `(company name, domain)` pair. Identical raw inputs always derive the
/// same id, which is what makes re-runs idempotent.
pub type LeadId = String;

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Strip scheme, `www.` prefix, and any path from a domain-ish string.
pub fn normalize_domain(domain: &str) -> String {
    let d = domain.trim().to_lowercase();
    let d = d
        .strip_prefix("https://")
        .or_else(|| d.strip_prefix("http://"))
        .unwrap_or(d.as_str());
    let d = d.strip_prefix("www.").unwrap_or(d);
    d.split('/').next().unwrap_or("").to_string()
}

pub fn lead_id(normalized_name: &str, normalized_domain: &str) -> LeadId {
    let mut hasher = Sha256::new();
    hasher.update(normalized_name.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(normalized_domain.as_bytes());
    let digest = hasher.finalize();
    // 16 hex chars is plenty for uniqueness and keeps ids readable in logs.
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Lead - the central entity
// ---------------------------------------------------------------------------

/// A candidate company/contact record tracked through the pipeline.
///
/// Created by the cleaner from one raw record, mutated in place by each
/// subsequent stage. History is append-only; leads are never deleted by the
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub raw: RawCandidate,
    /// Normalized company name.
    pub name: String,
    /// Normalized domain.
    pub domain: String,
    pub enrichment: BTreeMap<FieldKind, EnrichedField>,
    pub segment: Option<Segment>,
    pub draft: Option<Draft>,
    pub verdict: Option<Verdict>,
    pub stage: Stage,
    pub status: LeadStatus,
    pub skip_reason: Option<String>,
    /// Per-stage attempt counters.
    pub attempts: HashMap<Stage, u32>,
    /// Append-only error history.
    pub history: Vec<ErrorRecord>,
    /// Merge-conflict notes and reviewer annotations. Annotations never
    /// drive state transitions.
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Build a fresh lead shell at the enrich stage.
    pub fn new(raw: RawCandidate) -> Lead {
        let name = normalize_name(&raw.name);
        let domain = normalize_domain(&raw.domain);
        let id = lead_id(&name, &domain);
        let now = Utc::now();
        Lead {
            id,
            raw,
            name,
            domain,
            enrichment: BTreeMap::new(),
            segment: None,
            draft: None,
            verdict: None,
            stage: Stage::Enrich,
            status: LeadStatus::Pending,
            skip_reason: None,
            attempts: HashMap::new(),
            history: Vec::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a skipped shell for a record with insufficient identity.
    pub fn skipped(raw: RawCandidate, reason: &str) -> Lead {
        let mut lead = Lead::new(raw);
        lead.status = LeadStatus::Skipped;
        lead.skip_reason = Some(reason.to_string());
        lead.history.push(ErrorRecord {
            stage: Stage::Clean,
            kind: ErrorKind::InsufficientIdentity,
            message: reason.to_string(),
            attempt: 1,
            at: Utc::now(),
        });
        lead
    }

    /// Merge a fetched field under the monotonic-confidence policy: write
    /// only if the field is absent, the new confidence strictly exceeds the
    /// stored one, or ties it (ties favor the newer value). Returns whether
    /// the field was written.
    pub fn merge_field(&mut self, kind: FieldKind, field: EnrichedField) -> bool {
        match self.enrichment.get(&kind) {
            Some(existing) if field.confidence < existing.confidence => {
                tracing::debug!(
                    lead = %self.id,
                    field = ?kind,
                    stored = existing.confidence,
                    offered = field.confidence,
                    "Keeping higher-confidence value"
                );
                false
            }
            _ => {
                self.enrichment.insert(kind, field);
                true
            }
        }
    }

    /// Append an error record for the given stage and bump its attempt
    /// counter.
    pub fn record_error(&mut self, stage: Stage, err: &ProspectorError) -> u32 {
        let attempt = self.attempts.entry(stage).or_insert(0);
        *attempt += 1;
        let attempt = *attempt;
        self.history.push(ErrorRecord {
            stage,
            kind: err.kind(),
            message: err.to_string(),
            attempt,
            at: Utc::now(),
        });
        self.updated_at = Utc::now();
        attempt
    }

    /// Advance one stage on success. Finalize is the last stage; succeeding
    /// there makes the lead terminal.
    pub fn advance(&mut self) {
        match self.stage.next() {
            Some(next) => {
                self.stage = next;
                self.status = LeadStatus::Pending;
            }
            None => {
                self.status = LeadStatus::Succeeded;
            }
        }
        self.updated_at = Utc::now();
    }

    /// Mark the lead failed at its current stage.
    pub fn fail(&mut self) {
        self.status = LeadStatus::Failed;
        self.updated_at = Utc::now();
    }

    /// Explicit reset: send a failed lead back to pending at its current
    /// stage with a cleared attempt counter. The error history is kept.
    pub fn reset(&mut self) {
        self.status = LeadStatus::Pending;
        self.attempts.remove(&self.stage);
        self.updated_at = Utc::now();
    }

    /// A draft is ready for review only when the guardrail verdict is not
    /// a rejection.
    pub fn review_ready(&self) -> bool {
        matches!(self.verdict, Some(Verdict::Pass) | Some(Verdict::Flag(_)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
