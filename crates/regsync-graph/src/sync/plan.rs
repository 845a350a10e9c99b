//! Backfill plan: what a run does beyond the mapped entities.
//!
//! Derived reference nodes, reclassification overlays and the inference
//! battery are data, not code, so the orchestrator walks them generically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use regsync_core::GraphModel;

/// Ordered phases of a run, plus the derived and inferred structure it builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillPlan {
    /// Primary entity labels in sync order. Mapped labels missing here sync last.
    pub entity_order: Vec<String>,
    #[serde(default)]
    pub reference_nodes: Vec<ReferenceNodeSpec>,
    #[serde(default)]
    pub reclassifications: Vec<ReclassificationRule>,
    #[serde(default)]
    pub inference_passes: Vec<InferencePass>,
}

/// A cross-cutting node built from distinct values across several views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceNodeSpec {
    pub label: String,
    pub key_property: String,
    /// `(view, column)` pairs whose distinct values are unioned.
    pub sources: Vec<(String, String)>,
    pub normalization: Normalization,
    /// Extra properties for well-known keys, set on create.
    #[serde(default)]
    pub canonical: BTreeMap<String, BTreeMap<String, Value>>,
}

/// How a raw source value becomes a reference key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Trimmed and uppercased, e.g. agency codes.
    UpperCode,
    /// Trimmed, inner whitespace collapsed, each word capitalized.
    CanonicalName,
}

impl Normalization {
    /// `None` for values that normalize to nothing.
    pub fn apply(&self, raw: &str) -> Option<String> {
        let words: Vec<&str> = raw.split_whitespace().collect();
        if words.is_empty() {
            return None;
        }
        Some(match self {
            Normalization::UpperCode => words.join(" ").to_uppercase(),
            Normalization::CanonicalName => words
                .iter()
                .map(|word| {
                    let lower = word.to_lowercase();
                    let mut chars = lower.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<String>>()
                .join(" "),
        })
    }
}

/// Promote rows of a general view into a more specific overlay label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclassificationRule {
    /// Mapped label whose rows and key strategy are reused.
    pub source_label: String,
    pub target_label: String,
    pub key_property: String,
    pub predicate: FieldPredicate,
    /// Source column to overlay property.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Relationship from the overlay node back to its source node.
    pub link_type: String,
}

/// Case-insensitive membership test on one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPredicate {
    pub column: String,
    pub any_of: Vec<String>,
}

impl FieldPredicate {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(text) = value.and_then(Value::as_str) else {
            return false;
        };
        let text = text.trim();
        self.any_of.iter().any(|v| v.eq_ignore_ascii_case(text))
    }
}

/// One set-based relationship inference statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferencePass {
    pub name: String,
    pub rel_type: String,
    pub from_label: String,
    pub to_label: String,
    pub join: JoinCondition,
}

/// Which endpoint of a pass a property lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    From,
    To,
}

/// How two nodes are paired by an inference pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum JoinCondition {
    /// Property equality, optionally ignoring case.
    KeyMatch {
        from_property: String,
        to_property: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// A URL or host on `from` contains the normalized domain on `to`.
    DomainContainment {
        from_property: String,
        to_property: String,
    },
    /// Free text on one endpoint contains the canonical name on the other.
    NameContainment {
        text_on: Endpoint,
        text_property: String,
        name_property: String,
    },
    /// Two-hop path through an intermediate label created by earlier passes.
    Via {
        via_label: String,
        first_rel: String,
        second_rel: String,
        /// Optional `(property, value)` filter on the intermediate node.
        #[serde(default)]
        via_filter: Option<(String, String)>,
    },
}

impl BackfillPlan {
    /// Every `(label, key property)` pair the run writes, for constraints and
    /// duplicate detection.
    pub fn keyed_labels(&self, model: &GraphModel) -> Vec<(String, String)> {
        let mut keyed: Vec<(String, String)> = model
            .nodes
            .iter()
            .map(|n| (n.label.clone(), n.key_property.clone()))
            .collect();
        let derived = self
            .reference_nodes
            .iter()
            .map(|r| (r.label.clone(), r.key_property.clone()))
            .chain(
                self.reclassifications
                    .iter()
                    .map(|r| (r.target_label.clone(), r.key_property.clone())),
            );
        for pair in derived {
            if !keyed.iter().any(|(label, _)| *label == pair.0) {
                keyed.push(pair);
            }
        }
        keyed
    }

    /// The regulatory-intelligence plan: drugs, decisions, trials, guidance
    /// and news, with agencies and therapeutic areas derived from them.
    pub fn regulatory() -> Self {
        let agency = |name: &str, domain: &str| {
            BTreeMap::from([
                ("name".to_string(), Value::from(name)),
                ("domain".to_string(), Value::from(domain)),
            ])
        };

        // MHRA also publishes under the shared www.gov.uk host; the domain
        // records its own host only.
        let canonical_agencies = BTreeMap::from([
            ("FDA".to_string(), agency("U.S. Food and Drug Administration", "fda.gov")),
            ("EMA".to_string(), agency("European Medicines Agency", "ema.europa.eu")),
            (
                "MHRA".to_string(),
                agency("Medicines and Healthcare products Regulatory Agency", "mhra.gov.uk"),
            ),
            (
                "PMDA".to_string(),
                agency("Pharmaceuticals and Medical Devices Agency", "pmda.go.jp"),
            ),
            ("HC".to_string(), agency("Health Canada", "hc-sc.gc.ca")),
            ("TGA".to_string(), agency("Therapeutic Goods Administration", "tga.gov.au")),
        ]);

        let source = |view: &str, column: &str| (view.to_string(), column.to_string());
        let pass = |name: &str, rel: &str, from: &str, to: &str, join: JoinCondition| InferencePass {
            name: name.to_string(),
            rel_type: rel.to_string(),
            from_label: from.to_string(),
            to_label: to.to_string(),
            join,
        };
        let key_match = |from: &str, to: &str, case_insensitive: bool| JoinCondition::KeyMatch {
            from_property: from.to_string(),
            to_property: to.to_string(),
            case_insensitive,
        };
        let name_in = |text_on: Endpoint, text: &str| JoinCondition::NameContainment {
            text_on,
            text_property: text.to_string(),
            name_property: "name".to_string(),
        };

        Self {
            entity_order: ["Drug", "Decision", "Trial", "Guidance", "News"]
                .map(String::from)
                .to_vec(),
            reference_nodes: vec![
                ReferenceNodeSpec {
                    label: "Agency".to_string(),
                    key_property: "code".to_string(),
                    sources: vec![
                        source("v_approved_decisions", "agency_code"),
                        source("v_approved_guidance", "agency_code"),
                        source("v_approved_news", "agency_code"),
                    ],
                    normalization: Normalization::UpperCode,
                    canonical: canonical_agencies,
                },
                ReferenceNodeSpec {
                    label: "TherapeuticArea".to_string(),
                    key_property: "name".to_string(),
                    sources: vec![
                        source("v_approved_drugs", "therapeutic_area"),
                        source("v_approved_trials", "therapeutic_area"),
                    ],
                    normalization: Normalization::CanonicalName,
                    canonical: BTreeMap::new(),
                },
            ],
            reclassifications: vec![ReclassificationRule {
                source_label: "News".to_string(),
                target_label: "SafetyAlert".to_string(),
                key_property: "alertId".to_string(),
                predicate: FieldPredicate {
                    column: "category".to_string(),
                    any_of: ["safety", "recall", "shortage"].map(String::from).to_vec(),
                },
                properties: BTreeMap::from([
                    ("title".to_string(), "title".to_string()),
                    ("category".to_string(), "category".to_string()),
                    ("agency_code".to_string(), "agencyCode".to_string()),
                    ("published_at".to_string(), "publishedDate".to_string()),
                    ("source_url".to_string(), "sourceUrl".to_string()),
                ]),
                link_type: "RECLASSIFIED_FROM".to_string(),
            }],
            inference_passes: vec![
                pass(
                    "drug_subject_of_decision",
                    "SUBJECT_OF",
                    "Drug",
                    "Decision",
                    name_in(Endpoint::To, "drugName"),
                ),
                pass(
                    "decision_issued_by_agency",
                    "ISSUED_BY",
                    "Decision",
                    "Agency",
                    key_match("agencyCode", "code", false),
                ),
                pass(
                    "guidance_published_by_agency",
                    "PUBLISHED_BY",
                    "Guidance",
                    "Agency",
                    key_match("agencyCode", "code", false),
                ),
                pass(
                    "news_reported_by_agency",
                    "REPORTED_BY",
                    "News",
                    "Agency",
                    JoinCondition::DomainContainment {
                        from_property: "sourceDomain".to_string(),
                        to_property: "domain".to_string(),
                    },
                ),
                pass(
                    "drug_in_therapeutic_area",
                    "IN_THERAPEUTIC_AREA",
                    "Drug",
                    "TherapeuticArea",
                    key_match("therapeuticArea", "name", true),
                ),
                pass(
                    "trial_in_therapeutic_area",
                    "IN_THERAPEUTIC_AREA",
                    "Trial",
                    "TherapeuticArea",
                    key_match("therapeuticArea", "name", true),
                ),
                pass(
                    "trial_investigates_drug",
                    "INVESTIGATES",
                    "Trial",
                    "Drug",
                    name_in(Endpoint::From, "intervention"),
                ),
                pass(
                    "drug_approved_by_agency",
                    "APPROVED_BY",
                    "Drug",
                    "Agency",
                    JoinCondition::Via {
                        via_label: "Decision".to_string(),
                        first_rel: "SUBJECT_OF".to_string(),
                        second_rel: "ISSUED_BY".to_string(),
                        via_filter: Some(("decisionType".to_string(), "APPROVAL".to_string())),
                    },
                ),
                pass(
                    "safety_alert_concerns_drug",
                    "CONCERNS",
                    "SafetyAlert",
                    "Drug",
                    name_in(Endpoint::From, "title"),
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(Normalization::UpperCode.apply(" fda "), Some("FDA".to_string()));
        assert_eq!(
            Normalization::CanonicalName.apply("  NON-small   cell oncology"),
            Some("Non-small Cell Oncology".to_string())
        );
        assert_eq!(Normalization::UpperCode.apply("   "), None);
    }

    #[test]
    fn test_predicate_matches_case_insensitively() {
        let predicate = FieldPredicate {
            column: "category".into(),
            any_of: vec!["recall".into()],
        };
        assert!(predicate.matches(Some(&Value::from(" Recall"))));
        assert!(!predicate.matches(Some(&Value::from("approval"))));
        assert!(!predicate.matches(None));
    }

    #[test]
    fn test_regulatory_battery_order() {
        let plan = BackfillPlan::regulatory();
        let names: Vec<&str> = plan.inference_passes.iter().map(|p| p.rel_type.as_str()).collect();
        assert_eq!(names[0], "SUBJECT_OF");
        // APPROVED_BY walks SUBJECT_OF and ISSUED_BY, so both must run first.
        let approved = names.iter().position(|n| *n == "APPROVED_BY").unwrap();
        let issued = names.iter().position(|n| *n == "ISSUED_BY").unwrap();
        assert!(issued < approved);
        assert_eq!(plan.inference_passes.len(), 9);
    }

    #[test]
    fn test_plan_serde_shape() {
        let json = serde_json::to_value(BackfillPlan::regulatory()).unwrap();
        assert_eq!(json["inferencePasses"][1]["join"]["kind"], "key_match");
        assert_eq!(json["inferencePasses"][1]["join"]["fromProperty"], "agencyCode");
        let back: BackfillPlan = serde_json::from_value(json).unwrap();
        assert_eq!(back, BackfillPlan::regulatory());
    }

    #[test]
    fn test_keyed_labels_include_derived() {
        let plan = BackfillPlan::regulatory();
        let keyed = plan.keyed_labels(&GraphModel::default());
        assert!(keyed.contains(&("Agency".to_string(), "code".to_string())));
        assert!(keyed.contains(&("SafetyAlert".to_string(), "alertId".to_string())));
    }

    #[test]
    fn test_canonical_agencies_carry_domains() {
        let plan = BackfillPlan::regulatory();
        let agencies = &plan.reference_nodes[0];
        assert_eq!(agencies.label, "Agency");
        for (code, attrs) in &agencies.canonical {
            let domain = attrs.get("domain").and_then(Value::as_str);
            assert!(domain.is_some_and(|d| !d.is_empty()), "{code} has no domain");
        }
        assert_eq!(agencies.canonical["MHRA"]["domain"], "mhra.gov.uk");
    }
}
