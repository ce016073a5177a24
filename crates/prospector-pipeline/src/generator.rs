//! Draft generation stage: renders enrichment facts into a request for the
//! generation service and guards against duplicate in-flight calls for the
//! same lead.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use prospector_services::{DraftRequest, DynGeneration, Persona};
use prospector_types::{Draft, Lead, LeadId, ProspectorError, Result, Tier};

pub struct Generator {
    service: Arc<DynGeneration>,
    persona: Persona,
    /// Lead ids with a generation call currently in flight. A second call
    /// for the same lead while one is outstanding is a bug upstream, and
    /// cheaper to reject here than to dedupe drafts after the fact.
    in_flight: Arc<Mutex<HashSet<LeadId>>>,
}

/// Clears the in-flight marker when the call completes, including on error
/// and cancellation paths.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<LeadId>>>,
    id: LeadId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

impl Generator {
    pub fn new(service: Arc<DynGeneration>, persona: Persona) -> Self {
        Self {
            service,
            persona,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Generate a draft for the lead. `feedback` carries the guardrail
    /// rejection reason when this is a regeneration round; `attempt` is the
    /// 1-based generation round recorded on the draft.
    pub async fn generate(
        &self,
        lead: &Lead,
        feedback: Option<String>,
        attempt: u32,
    ) -> Result<Draft> {
        {
            let mut set = self
                .in_flight
                .lock()
                .map_err(|_| ProspectorError::Other("in-flight set poisoned".into()))?;
            if !set.insert(lead.id.clone()) {
                return Err(ProspectorError::Other(format!(
                    "generation already in flight for lead {}",
                    lead.id
                )));
            }
        }
        let _guard = InFlightGuard {
            set: self.in_flight.clone(),
            id: lead.id.clone(),
        };

        let request = self.build_request(lead, feedback);
        let reply = self.service.draft(&request).await?;
        if reply.body.trim().is_empty() {
            return Err(ProspectorError::GenerationEmpty);
        }

        Ok(Draft {
            subject: reply.subject,
            body: reply.body,
            model: reply.model,
            generated_at: Utc::now(),
            attempt,
        })
    }

    /// Only facts the pipeline actually holds go into the request; the
    /// prompt forbids the service from inventing the rest.
    fn build_request(&self, lead: &Lead, feedback: Option<String>) -> DraftRequest {
        let facts = lead
            .enrichment
            .iter()
            .map(|(kind, field)| (kind.to_string(), field.value.to_string()))
            .collect();
        DraftRequest {
            company_name: lead.name.clone(),
            company_description: lead.raw.description.clone(),
            facts,
            tier: lead.segment.as_ref().map(|s| s.tier).unwrap_or(Tier::C),
            persona: self.persona.clone(),
            feedback,
        }
    }
}
