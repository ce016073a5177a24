//! Enrichment stage: fills in contact/company attributes from external
//! lookups, tracking per-field provenance and confidence.

use std::sync::Arc;

use chrono::Utc;

use prospector_services::{DynEnrichment, LookupKind};
use prospector_types::{EnrichedField, Lead, ProspectorError, Result};

/// Outcome of one enrichment pass over a lead.
#[derive(Debug)]
pub struct EnrichOutcome {
    /// Fields written this pass (post merge policy).
    pub fields_written: usize,
    /// Lookup errors that did not sink the stage (partial failure).
    pub partial_errors: Vec<ProspectorError>,
}

pub struct Enricher {
    service: Arc<DynEnrichment>,
}

impl Enricher {
    pub fn new(service: Arc<DynEnrichment>) -> Self {
        Self { service }
    }

    /// Run all lookups for one lead and merge the results.
    ///
    /// Each lookup is independent and may fail without sinking the stage: a
    /// lead with at least one enriched field succeeds even if other lookups
    /// failed (partial enrichment is a valid terminal state for this
    /// stage). A lead with zero enriched fields fails, retryably iff any
    /// lookup error was transient.
    pub async fn enrich(&self, lead: &mut Lead) -> Result<EnrichOutcome> {
        let mut fields_written = 0usize;
        let mut errors: Vec<ProspectorError> = Vec::new();

        for kind in LookupKind::ALL {
            match self.service.lookup(kind, &lead.name, &lead.domain).await {
                Ok(readings) => {
                    for reading in readings {
                        let written = lead.merge_field(
                            reading.field,
                            EnrichedField {
                                value: reading.value,
                                source: format!("{}/{kind:?}", self.service.name()),
                                confidence: reading.confidence,
                                fetched_at: Utc::now(),
                            },
                        );
                        if written {
                            fields_written += 1;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(lead = %lead.id, ?kind, %err, "Enrichment lookup failed");
                    errors.push(err);
                }
            }
        }

        if fields_written == 0 && !lead.enrichment.is_empty() {
            // Re-run over an already-enriched lead: nothing new beat the
            // stored confidences, but the stage still holds data.
            return Ok(EnrichOutcome {
                fields_written,
                partial_errors: errors,
            });
        }

        if fields_written == 0 {
            // Zero enriched fields: surface the most useful error. Any
            // transient lookup error makes the whole stage retryable.
            return Err(match errors.into_iter().reduce(|best, e| {
                if e.is_retryable() && !best.is_retryable() {
                    e
                } else {
                    best
                }
            }) {
                Some(err) => err,
                None => ProspectorError::PermanentService {
                    service: self.service.name().to_string(),
                    message: "no enrichment fields returned".into(),
                },
            });
        }

        Ok(EnrichOutcome {
            fields_written,
            partial_errors: errors,
        })
    }
}
