//! Draft guardrail: deterministic checks that a draft only states facts the
//! pipeline actually holds, plus structural and tone checks.
//!
//! The guardrail is pure local computation. The same draft and the same
//! enrichment always produce the same verdict, so a re-run never flips a
//! decision.

use regex::Regex;

use prospector_types::{Draft, FieldKind, Lead, ProspectorError, Result, Verdict};

const MIN_BODY_WORDS: usize = 15;
const MAX_BODY_WORDS: usize = 250;
const MAX_SUBJECT_CHARS: usize = 120;
const SIGNATURE_PLACEHOLDER: &str = "{{signature}}";

/// Phrases that mark a draft as spam regardless of factual accuracy.
const DISALLOWED_PHRASES: &[&str] = &[
    "100% guaranteed",
    "risk-free",
    "act now",
    "limited time offer",
    "no obligation",
    "once in a lifetime",
];

/// Words that count as an ask. A draft without one reads as a dead end, but
/// that is a judgement call for the operator, not an auto-reject.
const CALL_TO_ACTION_WORDS: &[&str] = &[
    "call", "chat", "connect", "demo", "meet", "meeting", "reply", "schedule", "talk",
];

pub struct Guardrail {
    founded_claim: Regex,
    employee_claim: Regex,
    revenue_claim: Regex,
    location_claim: Regex,
}

impl Guardrail {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ProspectorError::ConfigInvalid(format!("guardrail pattern: {e}")))
        };
        Ok(Self {
            founded_claim: compile(
                r"(?i)\b(?:founded|established|since|around since)\b[^.\n]*?\b(1[89]\d{2}|20\d{2})\b",
            )?,
            employee_claim: compile(
                r"(?i)\b(?:team of\s+)?([\d,]+)\+?\s*(?:employees|staff|people)\b",
            )?,
            revenue_claim: compile(
                r"(?i)\$\s*([\d.,]+)\s*(thousand|million|billion|[kmb])?\b[^.\n]*?\brevenue\b",
            )?,
            // Captures the place name: first word plus up to two following
            // capitalized words ("New York City"). Case sensitivity is
            // scoped so the capitalization cue survives.
            location_claim: compile(
                r"\b(?i:based|located|headquartered)\s+(?i:in)\s+([A-Za-z][\w'-]*(?:\s+[A-Z][\w'-]*){0,2})",
            )?,
        })
    }

    /// Review one draft against the lead it was generated for.
    ///
    /// Rejections come first: a draft that both invents a fact and lacks a
    /// call to action is rejected, not flagged.
    pub fn review(&self, draft: &Draft, lead: &Lead) -> Verdict {
        let text = format!("{}\n{}", draft.subject, draft.body);
        let lowered = text.to_lowercase();

        if !draft.body.contains(SIGNATURE_PLACEHOLDER) {
            return Verdict::Reject("missing {{signature}} placeholder".into());
        }

        let words = draft.body.split_whitespace().count();
        if words < MIN_BODY_WORDS {
            return Verdict::Reject(format!("body too short: {words} words"));
        }
        if words > MAX_BODY_WORDS {
            return Verdict::Reject(format!("body too long: {words} words"));
        }
        if draft.subject.trim().is_empty() {
            return Verdict::Reject("empty subject".into());
        }
        if draft.subject.chars().count() > MAX_SUBJECT_CHARS {
            return Verdict::Reject("subject too long".into());
        }

        for phrase in DISALLOWED_PHRASES {
            if lowered.contains(phrase) {
                return Verdict::Reject(format!("disallowed phrase: {phrase:?}"));
            }
        }

        if let Some(reason) = self.check_numeric_claims(&text, lead) {
            return Verdict::Reject(reason);
        }

        let has_ask = lowered.contains('?')
            || CALL_TO_ACTION_WORDS
                .iter()
                .any(|w| lowered.split(|c: char| !c.is_alphanumeric()).any(|t| t == *w));
        if !has_ask {
            return Verdict::Flag("no call to action".into());
        }

        Verdict::Pass
    }

    /// Every factual claim in the draft must be backed by a held fact with
    /// the same value. A claim about a field the pipeline never enriched is
    /// a hallucination, and one backed claim never excuses an unbacked one.
    fn check_numeric_claims(&self, text: &str, lead: &Lead) -> Option<String> {
        for caps in self.founded_claim.captures_iter(text) {
            let Ok(claimed) = caps[1].parse::<i64>() else {
                continue;
            };
            match self.held_integer(lead, FieldKind::FoundedYear) {
                Some(held) if held == claimed => {}
                Some(held) => {
                    return Some(format!(
                        "founding year claim {claimed} contradicts held fact {held}"
                    ))
                }
                None => return Some(format!("unsupported founding year claim: {claimed}")),
            }
        }

        for caps in self.employee_claim.captures_iter(text) {
            let Ok(claimed) = caps[1].replace(',', "").parse::<i64>() else {
                continue;
            };
            match self.held_integer(lead, FieldKind::EmployeeCount) {
                Some(held) if held == claimed => {}
                Some(held) => {
                    return Some(format!(
                        "employee count claim {claimed} contradicts held fact {held}"
                    ))
                }
                None => return Some(format!("unsupported employee count claim: {claimed}")),
            }
        }

        for caps in self.revenue_claim.captures_iter(text) {
            let Ok(number) = caps[1].replace(',', "").parse::<f64>() else {
                continue;
            };
            let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
                Some(m) if m == "k" || m == "thousand" => 1_000.0,
                Some(m) if m == "m" || m == "million" => 1_000_000.0,
                Some(m) if m == "b" || m == "billion" => 1_000_000_000.0,
                _ => 1.0,
            };
            let claimed = (number * multiplier).round() as i64;
            match self.held_integer(lead, FieldKind::RevenueUsd) {
                Some(held) if held == claimed => {}
                Some(held) => {
                    return Some(format!(
                        "revenue claim {claimed} contradicts held fact {held}"
                    ))
                }
                None => return Some(format!("unsupported revenue claim: {claimed}")),
            }
        }

        for caps in self.location_claim.captures_iter(text) {
            let claimed = caps[1].trim();
            let held = lead
                .enrichment
                .get(&FieldKind::Location)
                .and_then(|f| f.value.as_text());
            match held {
                Some(held) if held.to_lowercase().contains(&claimed.to_lowercase()) => {}
                Some(held) => {
                    return Some(format!(
                        "location claim {claimed:?} contradicts held fact {held:?}"
                    ))
                }
                None => return Some(format!("unsupported location claim: {claimed:?}")),
            }
        }

        None
    }

    fn held_integer(&self, lead: &Lead, kind: FieldKind) -> Option<i64> {
        lead.enrichment.get(&kind).and_then(|f| f.value.as_integer())
    }
}
