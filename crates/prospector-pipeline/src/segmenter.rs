//! ICP scoring: weighted rubric over enriched fields, mapped to a tier.

use serde::{Deserialize, Serialize};

use prospector_types::{
    FieldKind, FieldValue, Lead, ProspectorError, Result, Segment, Tier, ValueKind,
};

/// How one rubric criterion decides whether a field value matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Field present at all.
    Exists,
    /// Text value contains any of the given needles (case-insensitive).
    TextContains(Vec<String>),
    /// Integer value at or above the bound.
    IntAtLeast(i64),
    /// Integer value within the inclusive range.
    IntBetween(i64, i64),
}

impl Matcher {
    fn matches(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Matcher::Exists, _) => true,
            (Matcher::TextContains(needles), FieldValue::Text(text)) => {
                let haystack = text.to_lowercase();
                needles.iter().any(|n| haystack.contains(&n.to_lowercase()))
            }
            (Matcher::IntAtLeast(min), FieldValue::Integer(n)) => n >= min,
            (Matcher::IntBetween(lo, hi), FieldValue::Integer(n)) => n >= lo && n <= hi,
            _ => false,
        }
    }

    /// Value kind this matcher can meaningfully inspect, if it cares.
    fn expected_kind(&self) -> Option<ValueKind> {
        match self {
            Matcher::Exists => None,
            Matcher::TextContains(_) => Some(ValueKind::Text),
            Matcher::IntAtLeast(_) | Matcher::IntBetween(..) => Some(ValueKind::Integer),
        }
    }
}

/// One weighted line in the rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub field: FieldKind,
    pub weight: f64,
    pub matcher: Matcher,
}

/// Ideal-customer-profile rubric. Scores are normalized to 0..=100 so tier
/// thresholds stay meaningful regardless of how many criteria the rubric
/// carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcpRubric {
    pub criteria: Vec<Criterion>,
    /// Credit (0..=1) granted when the criterion's field is absent.
    pub missing_field_score: f64,
    /// Scores strictly above this land in tier A.
    pub tier_a_min: f64,
    /// Scores strictly above this (and not in A) land in tier B.
    pub tier_b_min: f64,
}

impl Default for IcpRubric {
    fn default() -> Self {
        Self {
            criteria: vec![
                Criterion {
                    field: FieldKind::Industry,
                    weight: 2.0,
                    matcher: Matcher::Exists,
                },
                Criterion {
                    field: FieldKind::EmployeeCount,
                    weight: 3.0,
                    matcher: Matcher::IntBetween(50, 5000),
                },
                Criterion {
                    field: FieldKind::ContactName,
                    weight: 2.0,
                    matcher: Matcher::Exists,
                },
                Criterion {
                    field: FieldKind::ContactEmail,
                    weight: 1.0,
                    matcher: Matcher::Exists,
                },
            ],
            missing_field_score: 0.0,
            tier_a_min: 75.0,
            tier_b_min: 45.0,
        }
    }
}

impl IcpRubric {
    /// Reject rubrics that cannot produce a meaningful score.
    pub fn validate(&self) -> Result<()> {
        if self.criteria.is_empty() {
            return Err(ProspectorError::ConfigInvalid(
                "rubric has no criteria".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.missing_field_score) {
            return Err(ProspectorError::ConfigInvalid(format!(
                "missing_field_score {} outside 0..=1",
                self.missing_field_score
            )));
        }
        if self.tier_b_min > self.tier_a_min {
            return Err(ProspectorError::ConfigInvalid(format!(
                "tier_b_min {} above tier_a_min {}",
                self.tier_b_min, self.tier_a_min
            )));
        }
        for criterion in &self.criteria {
            if criterion.weight <= 0.0 || !criterion.weight.is_finite() {
                return Err(ProspectorError::ConfigInvalid(format!(
                    "criterion on {} has non-positive weight {}",
                    criterion.field, criterion.weight
                )));
            }
            if let Matcher::IntBetween(lo, hi) = criterion.matcher {
                if lo > hi {
                    return Err(ProspectorError::ConfigInvalid(format!(
                        "criterion on {} has inverted range {lo}..={hi}",
                        criterion.field
                    )));
                }
            }
            if let Some(expected) = criterion.matcher.expected_kind() {
                if criterion.field.value_kind() != expected {
                    return Err(ProspectorError::ConfigInvalid(format!(
                        "matcher on {} expects {:?} values but the field holds {:?}",
                        criterion.field,
                        expected,
                        criterion.field.value_kind()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Score one lead. Pure computation: same enrichment in, same segment
    /// out.
    pub fn score(&self, lead: &Lead) -> Segment {
        let total_weight: f64 = self.criteria.iter().map(|c| c.weight).sum();
        let mut earned = 0.0;
        for criterion in &self.criteria {
            let credit = match lead.enrichment.get(&criterion.field) {
                Some(field) => {
                    if criterion.matcher.matches(&field.value) {
                        1.0
                    } else {
                        0.0
                    }
                }
                None => self.missing_field_score,
            };
            earned += criterion.weight * credit;
        }
        let score = (earned / total_weight * 100.0).clamp(0.0, 100.0);
        Segment {
            score,
            tier: self.tier_for(score),
        }
    }

    /// A score exactly on a boundary lands in the lower tier.
    fn tier_for(&self, score: f64) -> Tier {
        if score > self.tier_a_min {
            Tier::A
        } else if score > self.tier_b_min {
            Tier::B
        } else {
            Tier::C
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use prospector_types::{EnrichedField, RawCandidate};

    fn lead_with(fields: &[(FieldKind, FieldValue)]) -> Lead {
        let mut lead = Lead::new(RawCandidate {
            name: "Acme".into(),
            domain: "acme.com".into(),
            ..Default::default()
        });
        for (kind, value) in fields {
            lead.merge_field(
                *kind,
                EnrichedField {
                    value: value.clone(),
                    source: "test".into(),
                    confidence: 0.9,
                    fetched_at: Utc::now(),
                },
            );
        }
        lead
    }

    fn rubric(criteria: Vec<Criterion>) -> IcpRubric {
        IcpRubric {
            criteria,
            ..IcpRubric::default()
        }
    }

    // 1. All criteria matched scores 100 and lands in tier A
    #[test]
    fn full_match_is_tier_a() {
        let rubric = rubric(vec![Criterion {
            field: FieldKind::Industry,
            weight: 1.0,
            matcher: Matcher::TextContains(vec!["signage".into()]),
        }]);
        let lead = lead_with(&[(FieldKind::Industry, FieldValue::Text("Signage & print".into()))]);
        let segment = rubric.score(&lead);
        assert_eq!(segment.score, 100.0);
        assert_eq!(segment.tier, Tier::A);
    }

    // 2. Missing fields earn the configured partial credit
    #[test]
    fn missing_field_uses_partial_credit() {
        let mut rubric = rubric(vec![
            Criterion {
                field: FieldKind::Industry,
                weight: 1.0,
                matcher: Matcher::Exists,
            },
            Criterion {
                field: FieldKind::EmployeeCount,
                weight: 1.0,
                matcher: Matcher::IntAtLeast(100),
            },
        ]);
        rubric.missing_field_score = 0.5;
        let lead = lead_with(&[(FieldKind::Industry, FieldValue::Text("signage".into()))]);
        // 1.0 + 0.5 out of 2.0
        assert_eq!(rubric.score(&lead).score, 75.0);
    }

    // 3. A score exactly on the tier boundary falls to the lower tier
    #[test]
    fn boundary_score_lands_in_lower_tier() {
        let mut r = rubric(vec![
            Criterion {
                field: FieldKind::Industry,
                weight: 3.0,
                matcher: Matcher::Exists,
            },
            Criterion {
                field: FieldKind::EmployeeCount,
                weight: 1.0,
                matcher: Matcher::Exists,
            },
        ]);
        r.tier_a_min = 75.0;
        let lead = lead_with(&[(FieldKind::Industry, FieldValue::Text("signage".into()))]);
        let segment = r.score(&lead);
        assert_eq!(segment.score, 75.0);
        assert_eq!(segment.tier, Tier::B);
    }

    // 4. Scoring is deterministic
    #[test]
    fn scoring_is_deterministic() {
        let rubric = IcpRubric::default();
        let lead = lead_with(&[
            (FieldKind::Industry, FieldValue::Text("signage".into())),
            (FieldKind::EmployeeCount, FieldValue::Integer(850)),
        ]);
        let first = rubric.score(&lead);
        let second = rubric.score(&lead);
        assert_eq!(first.score, second.score);
        assert_eq!(first.tier, second.tier);
    }

    // 5. Range and containment matchers
    #[test]
    fn matchers_inspect_values() {
        assert!(Matcher::IntBetween(50, 5000).matches(&FieldValue::Integer(850)));
        assert!(!Matcher::IntBetween(50, 5000).matches(&FieldValue::Integer(40)));
        assert!(Matcher::IntAtLeast(100).matches(&FieldValue::Integer(100)));
        assert!(Matcher::TextContains(vec!["SaaS".into()])
            .matches(&FieldValue::Text("b2b saas platform".into())));
        // Kind mismatch never matches.
        assert!(!Matcher::IntAtLeast(1).matches(&FieldValue::Text("9".into())));
    }

    // 6. Invalid rubrics are rejected up front
    #[test]
    fn validation_rejects_bad_rubrics() {
        let empty = IcpRubric {
            criteria: vec![],
            ..IcpRubric::default()
        };
        assert!(matches!(
            empty.validate(),
            Err(ProspectorError::ConfigInvalid(_))
        ));

        let zero_weight = rubric(vec![Criterion {
            field: FieldKind::Industry,
            weight: 0.0,
            matcher: Matcher::Exists,
        }]);
        assert!(zero_weight.validate().is_err());

        let inverted = rubric(vec![Criterion {
            field: FieldKind::EmployeeCount,
            weight: 1.0,
            matcher: Matcher::IntBetween(100, 50),
        }]);
        assert!(inverted.validate().is_err());

        // Matcher kind must agree with the field's value kind.
        let mismatched = rubric(vec![Criterion {
            field: FieldKind::Industry,
            weight: 1.0,
            matcher: Matcher::IntAtLeast(10),
        }]);
        assert!(mismatched.validate().is_err());

        assert!(IcpRubric::default().validate().is_ok());
    }
}
