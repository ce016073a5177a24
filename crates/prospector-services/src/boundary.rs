//! Service traits, dyn wrappers, and the wire-adjacent request/reply types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use prospector_types::{FieldKind, FieldValue, ProspectorError, RawCandidate, Result, Tier};

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Candidate sourcing for a given event/topic.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// Return up to `count` raw candidate records for the topic.
    async fn discover(&self, topic: &str, count: usize) -> Result<Vec<RawCandidate>>;

    fn name(&self) -> &str;
}

pub struct DynDiscovery(Box<dyn DiscoveryService>);

impl DynDiscovery {
    pub fn new(service: impl DiscoveryService + 'static) -> Self {
        Self(Box::new(service))
    }

    pub async fn discover(&self, topic: &str, count: usize) -> Result<Vec<RawCandidate>> {
        self.0.discover(topic, count).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Which enrichment lookup to issue. Lookups are independent and may
/// partially fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Company,
    Contact,
}

impl LookupKind {
    pub const ALL: [LookupKind; 2] = [LookupKind::Company, LookupKind::Contact];
}

/// One field returned by an enrichment lookup, already validated against the
/// closed [`FieldKind`] set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldReading {
    pub field: FieldKind,
    pub value: FieldValue,
    pub confidence: f64,
}

impl FieldReading {
    /// Validate an untyped wire tuple into a reading. Unknown field names
    /// and value-type mismatches are rejected here, at ingestion, so nothing
    /// downstream has to trust the payload.
    pub fn from_wire(name: &str, value: &serde_json::Value, confidence: f64) -> Option<Self> {
        let field = match FieldKind::parse(name) {
            Some(f) => f,
            None => {
                tracing::warn!(field = name, "Dropping unknown enrichment field");
                return None;
            }
        };
        let value = match field.value_kind() {
            prospector_types::ValueKind::Integer => value.as_i64().map(FieldValue::Integer),
            prospector_types::ValueKind::Text => value
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| FieldValue::Text(s.to_string())),
        };
        let value = match value {
            Some(v) => v,
            None => {
                tracing::warn!(field = name, "Dropping enrichment field with mismatched value type");
                return None;
            }
        };
        Some(FieldReading {
            field,
            value,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

#[async_trait]
pub trait EnrichmentService: Send + Sync {
    /// Issue one lookup against a partial identity.
    async fn lookup(&self, kind: LookupKind, name: &str, domain: &str)
        -> Result<Vec<FieldReading>>;

    fn name(&self) -> &str;
}

pub struct DynEnrichment(Box<dyn EnrichmentService>);

impl DynEnrichment {
    pub fn new(service: impl EnrichmentService + 'static) -> Self {
        Self(Box::new(service))
    }

    pub async fn lookup(
        &self,
        kind: LookupKind,
        name: &str,
        domain: &str,
    ) -> Result<Vec<FieldReading>> {
        self.0.lookup(kind, name, domain).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Sender persona carried into every draft request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub sender_name: String,
    pub org_name: String,
    /// One-line value proposition woven into the pitch.
    pub value_prop: String,
}

/// Everything the generation service is allowed to know about a lead. Only
/// facts actually present in the enrichment map are included, which is what
/// the guardrail later checks drafts against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    pub company_name: String,
    pub company_description: String,
    /// Known enrichment facts as (field name, rendered value) pairs.
    pub facts: Vec<(String, String)>,
    pub tier: Tier,
    pub persona: Persona,
    /// Guardrail rejection reason from a prior round, when regenerating.
    pub feedback: Option<String>,
}

/// A generated draft, opaque text to this layer. No safety interpretation
/// happens here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftReply {
    pub subject: String,
    pub body: String,
    pub model: String,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn draft(&self, request: &DraftRequest) -> Result<DraftReply>;

    fn name(&self) -> &str;
}

pub struct DynGeneration(Box<dyn GenerationService>);

impl DynGeneration {
    pub fn new(service: impl GenerationService + 'static) -> Self {
        Self(Box::new(service))
    }

    pub async fn draft(&self, request: &DraftRequest) -> Result<DraftReply> {
        self.0.draft(request).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

// ---------------------------------------------------------------------------
// HTTP status classification
// ---------------------------------------------------------------------------

/// Map an HTTP status into the transient/permanent error taxonomy.
/// 408/429/5xx may succeed on retry; everything else 4xx is permanent.
pub fn classify_status(service: &str, status: u16, message: &str) -> ProspectorError {
    match status {
        429 => ProspectorError::RateLimited {
            service: service.to_string(),
            retry_after_ms: 1_000,
        },
        408 => ProspectorError::RequestTimeout {
            service: service.to_string(),
            timeout_ms: 0,
        },
        500..=599 => ProspectorError::TransientService {
            service: service.to_string(),
            message: format!("HTTP {status}: {message}"),
        },
        401 | 403 => ProspectorError::AuthError {
            service: service.to_string(),
        },
        _ => ProspectorError::PermanentService {
            service: service.to_string(),
            message: format!("HTTP {status}: {message}"),
        },
    }
}

/// Map a `reqwest` transport error into the taxonomy.
pub fn classify_transport(service: &str, timeout_ms: u64, err: &reqwest::Error) -> ProspectorError {
    if err.is_timeout() {
        ProspectorError::RequestTimeout {
            service: service.to_string(),
            timeout_ms,
        }
    } else {
        ProspectorError::TransientService {
            service: service.to_string(),
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
