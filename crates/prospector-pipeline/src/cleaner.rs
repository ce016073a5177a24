//! Normalization and deduplication of raw candidate records into Lead
//! shells.

use std::collections::HashMap;

use prospector_types::{lead_id, normalize_domain, normalize_name, Lead, LeadId, RawCandidate};

/// Normalize and deduplicate raw records into Lead shells.
///
/// Records sharing a derived identifier are merged: non-empty fields from
/// later records fill gaps in earlier ones; conflicting non-empty fields
/// keep the first-seen value and log a conflict note on the lead. Records
/// with neither a name nor a domain become `Skipped` shells with reason
/// `insufficient_identity`, never dropped silently. Output preserves
/// first-seen order.
pub fn clean(records: Vec<RawCandidate>) -> Vec<Lead> {
    let mut order: Vec<LeadId> = Vec::new();
    let mut by_id: HashMap<LeadId, Lead> = HashMap::new();
    let mut skipped: Vec<Lead> = Vec::new();

    for raw in records {
        let name = normalize_name(&raw.name);
        let domain = normalize_domain(&raw.domain);
        if name.is_empty() && domain.is_empty() {
            tracing::warn!(?raw, "Skipping record with insufficient identity");
            skipped.push(Lead::skipped(raw, "insufficient_identity"));
            continue;
        }

        let id = lead_id(&name, &domain);
        match by_id.get_mut(&id) {
            None => {
                order.push(id.clone());
                by_id.insert(id, Lead::new(raw));
            }
            Some(existing) => merge_raw(existing, raw),
        }
    }

    let mut leads: Vec<Lead> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();
    leads.extend(skipped);
    leads
}

/// Fill gaps in `lead.raw` from a duplicate record; first-seen wins on
/// conflict, with a note for the audit trail.
fn merge_raw(lead: &mut Lead, dup: RawCandidate) {
    let fields = [
        ("description", &dup.description),
        ("location", &dup.location),
        ("website", &dup.website),
        ("booth", &dup.booth),
        ("contacts_text", &dup.contacts_text),
    ];
    for (field, incoming) in fields {
        if incoming.is_empty() {
            continue;
        }
        let slot = match field {
            "description" => &mut lead.raw.description,
            "location" => &mut lead.raw.location,
            "website" => &mut lead.raw.website,
            "booth" => &mut lead.raw.booth,
            _ => &mut lead.raw.contacts_text,
        };
        if slot.is_empty() {
            *slot = incoming.clone();
        } else if slot != incoming {
            lead.notes.push(format!(
                "duplicate record conflict on {field}: kept {slot:?}, saw {incoming:?}"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_types::{LeadStatus, Stage};

    fn raw(name: &str, domain: &str) -> RawCandidate {
        RawCandidate {
            name: name.into(),
            domain: domain.into(),
            ..Default::default()
        }
    }

    // Case/whitespace variants of the same
    // identity collapse into one lead.
    #[test]
    fn acme_variants_collapse_to_one_lead() {
        let leads = clean(vec![raw("Acme Corp", "acme.com"), raw("ACME CORP", "acme.com")]);
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id, lead_id("acme corp", "acme.com"));
        assert_eq!(leads[0].stage, Stage::Enrich);
    }

    #[test]
    fn later_records_fill_gaps() {
        let mut first = raw("Acme", "acme.com");
        first.location = "Austin, TX".into();
        let mut second = raw("acme", "www.acme.com");
        second.description = "Signage maker".into();

        let leads = clean(vec![first, second]);
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].raw.location, "Austin, TX");
        assert_eq!(leads[0].raw.description, "Signage maker");
        assert!(leads[0].notes.is_empty());
    }

    #[test]
    fn conflicts_keep_first_seen_and_note() {
        let mut first = raw("Acme", "acme.com");
        first.location = "Austin, TX".into();
        let mut second = raw("Acme", "acme.com");
        second.location = "Dallas, TX".into();

        let leads = clean(vec![first, second]);
        assert_eq!(leads[0].raw.location, "Austin, TX");
        assert_eq!(leads[0].notes.len(), 1);
        assert!(leads[0].notes[0].contains("location"));
    }

    #[test]
    fn insufficient_identity_is_skipped_not_dropped() {
        let mut no_identity = RawCandidate::default();
        no_identity.description = "mystery exhibitor".into();

        let leads = clean(vec![raw("Acme", "acme.com"), no_identity]);
        assert_eq!(leads.len(), 2);
        let skipped = &leads[1];
        assert_eq!(skipped.status, LeadStatus::Skipped);
        assert_eq!(skipped.skip_reason.as_deref(), Some("insufficient_identity"));
    }

    #[test]
    fn name_only_or_domain_only_is_enough_identity() {
        let leads = clean(vec![raw("Acme", ""), raw("", "globex.io")]);
        assert_eq!(leads.len(), 2);
        assert!(leads.iter().all(|l| l.status == LeadStatus::Pending));
    }

    #[test]
    fn output_preserves_first_seen_order() {
        let leads = clean(vec![
            raw("Zeta", "zeta.com"),
            raw("Alpha", "alpha.com"),
            raw("zeta", "zeta.com"),
        ]);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].name, "zeta");
        assert_eq!(leads[1].name, "alpha");
    }

    #[test]
    fn clean_is_idempotent_on_identifiers() {
        let records = vec![raw("Acme Corp", "acme.com"), raw("Globex", "globex.io")];
        let first: Vec<LeadId> = clean(records.clone()).into_iter().map(|l| l.id).collect();
        let second: Vec<LeadId> = clean(records).into_iter().map(|l| l.id).collect();
        assert_eq!(first, second);
    }
}
