//! Serializable rule chain definition.
//!
//! Example node:
//!
//! ```json
//! {
//!   "id": "trend",
//!   "label": "trend",
//!   "default": "NEUTRAL",
//!   "cases": [
//!     {
//!       "when": { "all": [
//!         { "compare": { "left": "price", "op": ">", "right": "ma_5" } },
//!         { "compare": { "left": "ma_5", "op": ">", "right": "ma_10" } }
//!       ] },
//!       "label": "UP",
//!       "buy": 20
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::RuleChainError;
use crate::message::FEATURE_DATA;

/// Root of a rule chain file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChainDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Message types the chain will process
    #[serde(default = "default_accepts")]
    pub accepts: Vec<String>,

    #[serde(default)]
    pub nodes: Vec<RuleNode>,

    pub decision: DecisionRule,

    pub risk: RiskRule,

    pub sizing: SizingRule,
}

fn default_accepts() -> Vec<String> {
    vec![FEATURE_DATA.to_string()]
}

/// One scoring step. The first matching case wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleNode {
    pub id: String,

    /// Key under which the chosen label is recorded
    pub label: String,

    /// Label used when no case matches
    #[serde(default = "default_label")]
    pub default: String,

    #[serde(default)]
    pub cases: Vec<RuleCase>,
}

fn default_label() -> String {
    "NEUTRAL".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCase {
    pub when: Condition,
    pub label: String,
    #[serde(default)]
    pub buy: i32,
    #[serde(default)]
    pub sell: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Compare(Comparison),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    LabelIn(LabelIn),
    Always,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub left: Operand,
    pub op: CmpOp,
    pub right: Operand,
}

/// Either a literal number or the name of a numeric feature field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Value(f64),
    Field(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CmpOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
        }
    }
}

/// Matches when an earlier node's label is one of `values`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelIn {
    pub label: String,
    pub values: Vec<String>,
}

/// Turns buy/sell totals into an action label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRule {
    pub buy_threshold: i32,
    pub sell_threshold: i32,
    /// Winning score at or above this yields STRONG_BUY / STRONG_SELL
    #[serde(default)]
    pub strong_threshold: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRule {
    /// Numeric feature the bands are applied to
    pub field: String,
    /// Ordered by descending `above`; first exceeded band wins
    #[serde(default)]
    pub bands: Vec<RiskBand>,
    #[serde(default = "default_risk")]
    pub default: String,
}

fn default_risk() -> String {
    "LOW".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBand {
    pub above: f64,
    pub label: String,
}

/// Suggested position size per action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingRule {
    /// Buy size keyed by risk label
    #[serde(default)]
    pub buy: BTreeMap<String, f64>,
    #[serde(default)]
    pub buy_default: f64,
    #[serde(default = "default_sell_size")]
    pub sell: f64,
    #[serde(default)]
    pub hold: f64,
}

fn default_sell_size() -> f64 {
    1.0
}

impl RuleChainDefinition {
    /// Reject chains that cannot be executed deterministically
    pub fn validate(&self) -> Result<(), RuleChainError> {
        if self.id.trim().is_empty() {
            return Err(RuleChainError::EmptyId);
        }
        if self.accepts.is_empty() {
            return Err(RuleChainError::NoAcceptedTypes);
        }

        let mut node_ids = HashSet::new();
        let mut labels: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(RuleChainError::DuplicateNode(node.id.clone()));
            }
            for case in &node.cases {
                case.when.check_labels(&node.id, &labels)?;
            }
            if !labels.insert(node.label.as_str()) {
                return Err(RuleChainError::DuplicateLabel(node.label.clone()));
            }
        }

        let decision = &self.decision;
        if decision.buy_threshold <= 0 || decision.sell_threshold <= 0 {
            return Err(RuleChainError::InvalidThreshold(
                "buy and sell thresholds must be positive".to_string(),
            ));
        }
        if let Some(strong) = decision.strong_threshold {
            if strong < decision.buy_threshold.max(decision.sell_threshold) {
                return Err(RuleChainError::InvalidThreshold(format!(
                    "strong threshold {} is below the buy/sell thresholds",
                    strong
                )));
            }
        }

        if self.risk.bands.windows(2).any(|w| w[0].above < w[1].above) {
            return Err(RuleChainError::UnsortedRiskBands);
        }

        Ok(())
    }
}

impl Condition {
    fn check_labels(&self, node: &str, known: &HashSet<&str>) -> Result<(), RuleChainError> {
        match self {
            Condition::LabelIn(label_in) if !known.contains(label_in.label.as_str()) => {
                Err(RuleChainError::UnknownLabel {
                    node: node.to_string(),
                    label: label_in.label.clone(),
                })
            }
            Condition::All(conditions) | Condition::Any(conditions) => conditions
                .iter()
                .try_for_each(|c| c.check_labels(node, known)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "id": "test",
            "nodes": [
                {
                    "id": "trend",
                    "label": "trend",
                    "cases": [
                        { "when": { "compare": { "left": "price", "op": ">", "right": "ma_5" } },
                          "label": "UP", "buy": 20 }
                    ]
                },
                {
                    "id": "volume",
                    "label": "volume_signal",
                    "default": "NORMAL",
                    "cases": [
                        { "when": { "all": [
                            { "compare": { "left": "volume_ratio", "op": ">", "right": 1.5 } },
                            { "label_in": { "label": "trend", "values": ["UP"] } }
                          ] },
                          "label": "HIGH_VOLUME", "buy": 15 },
                        { "when": "always", "label": "NORMAL" }
                    ]
                }
            ],
            "decision": { "buy_threshold": 40, "sell_threshold": 40 },
            "risk": { "field": "volatility", "bands": [ { "above": 0.03, "label": "HIGH" } ] },
            "sizing": { "buy": { "LOW": 0.3 }, "sell": 1.0 }
        })
    }

    fn parse(value: serde_json::Value) -> RuleChainDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_minimal_definition() {
        let def = parse(minimal());
        assert_eq!(def.accepts, vec![FEATURE_DATA.to_string()]);
        assert_eq!(def.nodes[0].default, "NEUTRAL");
        assert_eq!(def.risk.default, "LOW");
        assert_eq!(def.nodes[1].cases[1].when, Condition::Always);
        assert_eq!(
            def.nodes[0].cases[0].when,
            Condition::Compare(Comparison {
                left: Operand::Field("price".to_string()),
                op: CmpOp::Gt,
                right: Operand::Field("ma_5".to_string()),
            })
        );
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_label_reference_must_come_from_earlier_node() {
        let mut value = minimal();
        value["nodes"].as_array_mut().unwrap().reverse();
        let def = parse(value);
        assert_eq!(
            def.validate(),
            Err(RuleChainError::UnknownLabel {
                node: "volume".to_string(),
                label: "trend".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut value = minimal();
        value["nodes"][1]["id"] = json!("trend");
        assert_eq!(
            parse(value).validate(),
            Err(RuleChainError::DuplicateNode("trend".to_string()))
        );
    }

    #[test]
    fn test_thresholds_validated() {
        let mut value = minimal();
        value["decision"] = json!({ "buy_threshold": 0, "sell_threshold": 40 });
        assert!(matches!(
            parse(value).validate(),
            Err(RuleChainError::InvalidThreshold(_))
        ));

        let mut value = minimal();
        value["decision"] =
            json!({ "buy_threshold": 40, "sell_threshold": 40, "strong_threshold": 30 });
        assert!(matches!(
            parse(value).validate(),
            Err(RuleChainError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_risk_bands_must_descend() {
        let mut value = minimal();
        value["risk"]["bands"] = json!([
            { "above": 0.02, "label": "MEDIUM" },
            { "above": 0.03, "label": "HIGH" }
        ]);
        assert_eq!(
            parse(value).validate(),
            Err(RuleChainError::UnsortedRiskBands)
        );
    }

    #[test]
    fn test_cmp_ops() {
        assert!(CmpOp::Gt.apply(2.0, 1.0));
        assert!(!CmpOp::Gt.apply(1.0, 1.0));
        assert!(CmpOp::Ge.apply(1.0, 1.0));
        assert!(CmpOp::Lt.apply(0.5, 1.0));
        assert!(CmpOp::Le.apply(1.0, 1.0));
        assert!(CmpOp::Eq.apply(1.0, 1.0));
        assert!(CmpOp::Ne.apply(1.0, 2.0));
    }
}
