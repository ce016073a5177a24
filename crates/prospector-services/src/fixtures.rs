//! Canned in-process services for offline runs and tests.
//!
//! `prospector run --offline` wires these in instead of the HTTP adapters so
//! the whole pipeline can be exercised without API keys or network access.
//! Outputs are deterministic functions of the inputs, which keeps offline
//! re-runs idempotent end to end.

use async_trait::async_trait;

use prospector_types::{FieldValue, RawCandidate, Result};

use crate::boundary::{
    DiscoveryService, DraftReply, DraftRequest, EnrichmentService, FieldReading, GenerationService,
    LookupKind,
};

// ---------------------------------------------------------------------------
// FixtureDiscovery
// ---------------------------------------------------------------------------

/// Returns a deterministic exhibitor list derived from the topic.
pub struct FixtureDiscovery;

#[async_trait]
impl DiscoveryService for FixtureDiscovery {
    async fn discover(&self, topic: &str, count: usize) -> Result<Vec<RawCandidate>> {
        let roster = [
            ("Acme Signage Co", "acme-signage.com", "Large format signage and banners"),
            ("Globex Graphics", "globexgraphics.com", "Vehicle wraps and fleet graphics"),
            ("Initech Displays", "initechdisplays.io", "Retail digital displays"),
            ("Umbra Print Works", "umbraprint.com", "Architectural graphics"),
            ("Vandelay Visuals", "vandelayvisuals.com", "Trade show booth design"),
            ("Stark Media Group", "starkmedia.example", "Outdoor advertising media"),
            ("Wayne Wide Format", "waynewideformat.com", "Wide format printing services"),
            ("Oscorp Outdoor", "oscorpoutdoor.com", "Billboard installations"),
        ];
        Ok(roster
            .iter()
            .cycle()
            .take(count)
            .map(|(name, domain, desc)| RawCandidate {
                name: name.to_string(),
                domain: domain.to_string(),
                description: format!("{desc} ({topic})"),
                ..Default::default()
            })
            .collect())
    }

    fn name(&self) -> &str {
        "fixture-discovery"
    }
}

// ---------------------------------------------------------------------------
// FixtureEnrichment
// ---------------------------------------------------------------------------

/// Derives stable readings from the company name so the same lead always
/// enriches the same way.
pub struct FixtureEnrichment;

fn name_weight(name: &str) -> u64 {
    name.bytes().map(u64::from).sum()
}

#[async_trait]
impl EnrichmentService for FixtureEnrichment {
    async fn lookup(
        &self,
        kind: LookupKind,
        name: &str,
        _domain: &str,
    ) -> Result<Vec<FieldReading>> {
        let w = name_weight(name);
        let readings = match kind {
            LookupKind::Company => vec![
                FieldReading {
                    field: prospector_types::FieldKind::Industry,
                    value: FieldValue::Text("signage and graphics".into()),
                    confidence: 0.9,
                },
                FieldReading {
                    field: prospector_types::FieldKind::EmployeeCount,
                    value: FieldValue::Integer(50 + (w % 5000) as i64),
                    confidence: 0.7,
                },
                FieldReading {
                    field: prospector_types::FieldKind::FoundedYear,
                    value: FieldValue::Integer(1970 + (w % 50) as i64),
                    confidence: 0.6,
                },
            ],
            LookupKind::Contact => vec![
                FieldReading {
                    field: prospector_types::FieldKind::ContactName,
                    value: FieldValue::Text("Pat Morgan".into()),
                    confidence: 0.5,
                },
                FieldReading {
                    field: prospector_types::FieldKind::ContactTitle,
                    value: FieldValue::Text("Director of Innovation".into()),
                    confidence: 0.5,
                },
            ],
        };
        Ok(readings)
    }

    fn name(&self) -> &str {
        "fixture-enrichment"
    }
}

// ---------------------------------------------------------------------------
// FixtureGenerator
// ---------------------------------------------------------------------------

/// Template-based drafting that only ever mentions facts it was given, so
/// fixture drafts always clear the guardrail's fact-containment check.
pub struct FixtureGenerator;

#[async_trait]
impl GenerationService for FixtureGenerator {
    async fn draft(&self, request: &DraftRequest) -> Result<DraftReply> {
        let mut body = format!(
            "Hi {company} team,\n\n\
             I came across {company} and your work in {desc}. At {org} we focus on {value_prop}, \
             and I think there could be a fit.\n",
            company = request.company_name,
            desc = if request.company_description.is_empty() {
                "your field"
            } else {
                &request.company_description
            },
            org = request.persona.org_name,
            value_prop = request.persona.value_prop,
        );
        if let Some((name, value)) = request.facts.first() {
            body.push_str(&format!("I noticed your {name} is {value}, which stood out.\n"));
        }
        body.push_str("\nWould you be open to a quick 15-minute call next week?\n\n{{signature}}\n");

        Ok(DraftReply {
            subject: format!("Quick question for {}", request.company_name),
            body,
            model: "fixture".into(),
        })
    }

    fn name(&self) -> &str {
        "fixture-generation"
    }
}
