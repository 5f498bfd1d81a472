use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::definition::{Comparison, Condition, Operand, RuleChainDefinition};
use crate::error::{RuleChainError, RuleError};
use crate::message::{DataType, EMITTED_AT, RuleMsg, TRADING_SIGNAL};

/// Validated, immutable rule chain.
///
/// Execution takes `&self` only; one chain is shared by every worker.
#[derive(Debug, Clone)]
pub struct RuleChain {
    definition: RuleChainDefinition,
}

/// Load and validate a rule chain from a JSON file
pub fn load_rule_chain<P: AsRef<Path>>(path: P) -> Result<RuleChain, RuleChainError> {
    RuleChain::from_file(path)
}

/// Load the embedded default trading policy
pub fn load_default_rule_chain() -> Result<RuleChain, RuleChainError> {
    RuleChain::from_json(include_str!("default_chain.json"))
}

impl RuleChain {
    pub fn new(definition: RuleChainDefinition) -> Result<Self, RuleChainError> {
        definition.validate()?;
        Ok(Self { definition })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleChainError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| RuleChainError::Io {
                path: path.as_ref().display().to_string(),
                error: e.to_string(),
            })?;

        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, RuleChainError> {
        let definition: RuleChainDefinition =
            serde_json::from_str(json).map_err(|e| RuleChainError::Parse(e.to_string()))?;
        Self::new(definition)
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &RuleChainDefinition {
        &self.definition
    }

    pub fn accepts(&self, msg_type: &str) -> bool {
        self.definition.accepts.iter().any(|t| t == msg_type)
    }

    /// Run the chain against one message and build the signal payload
    pub fn execute(&self, msg: &RuleMsg) -> Result<RuleMsg, RuleError> {
        if !self.accepts(&msg.msg_type) {
            return Err(RuleError::UnsupportedMessageType(msg.msg_type.clone()));
        }
        if msg.data_type != DataType::Json {
            return Err(RuleError::InvalidInput("payload must be JSON".to_string()));
        }

        let input: Map<String, Value> = serde_json::from_str(&msg.data)
            .map_err(|e| RuleError::InvalidInput(e.to_string()))?;
        let fields = Fields::from_object(&input);

        let trading_pair = input
            .get("trading_pair")
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::InvalidInput("missing trading_pair".to_string()))?;
        let price = fields.get("price")?;

        let mut buy_score = 0;
        let mut sell_score = 0;
        let mut labels: BTreeMap<String, String> = BTreeMap::new();

        for node in &self.definition.nodes {
            let mut chosen = None;
            for case in &node.cases {
                if evaluate(&case.when, &fields, &labels)? {
                    chosen = Some(case);
                    break;
                }
            }

            let label = match chosen {
                Some(case) => {
                    buy_score += case.buy;
                    sell_score += case.sell;
                    case.label.clone()
                }
                None => node.default.clone(),
            };
            labels.insert(node.label.clone(), label);
        }

        let action = self.classify(buy_score, sell_score);
        let risk_level = self.risk_level(&fields)?;
        let position_size = self.position_size(&action, &risk_level);

        let timestamp = msg
            .metadata(EMITTED_AT)
            .map(|ts| Value::String(ts.to_string()))
            .or_else(|| input.get("timestamp").cloned())
            .unwrap_or(Value::Null);

        let payload = json!({
            "trading_pair": trading_pair,
            "signal": action,
            "price": price,
            "buy_score": buy_score,
            "sell_score": sell_score,
            "labels": labels,
            "risk_level": risk_level,
            "position_size": position_size,
            "timestamp": timestamp,
            "features": Value::Object(input.clone()),
        });

        let data = serde_json::to_string(&payload)
            .map_err(|e| RuleError::Serialization(e.to_string()))?;
        Ok(msg.reply(TRADING_SIGNAL, data))
    }

    fn classify(&self, buy: i32, sell: i32) -> String {
        let decision = &self.definition.decision;
        let strong = decision.strong_threshold;

        if buy > sell && buy >= decision.buy_threshold {
            if strong.is_some_and(|s| buy >= s) {
                "STRONG_BUY".to_string()
            } else {
                "BUY".to_string()
            }
        } else if sell > buy && sell >= decision.sell_threshold {
            if strong.is_some_and(|s| sell >= s) {
                "STRONG_SELL".to_string()
            } else {
                "SELL".to_string()
            }
        } else {
            "HOLD".to_string()
        }
    }

    fn risk_level(&self, fields: &Fields) -> Result<String, RuleError> {
        let risk = &self.definition.risk;
        let value = fields.get(&risk.field)?;

        Ok(risk
            .bands
            .iter()
            .find(|band| value > band.above)
            .map(|band| band.label.clone())
            .unwrap_or_else(|| risk.default.clone()))
    }

    fn position_size(&self, action: &str, risk_level: &str) -> f64 {
        let sizing = &self.definition.sizing;
        if action.ends_with("BUY") {
            sizing
                .buy
                .get(risk_level)
                .copied()
                .unwrap_or(sizing.buy_default)
        } else if action.ends_with("SELL") {
            sizing.sell
        } else {
            sizing.hold
        }
    }
}

/// Numeric view over the input object
struct Fields(HashMap<String, f64>);

impl Fields {
    fn from_object(object: &Map<String, Value>) -> Self {
        Fields(
            object
                .iter()
                .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect(),
        )
    }

    fn get(&self, name: &str) -> Result<f64, RuleError> {
        self.0
            .get(name)
            .copied()
            .ok_or_else(|| RuleError::MissingField(name.to_string()))
    }

    fn resolve(&self, operand: &Operand) -> Result<f64, RuleError> {
        match operand {
            Operand::Value(v) => Ok(*v),
            Operand::Field(name) => self.get(name),
        }
    }
}

fn evaluate(
    condition: &Condition,
    fields: &Fields,
    labels: &BTreeMap<String, String>,
) -> Result<bool, RuleError> {
    match condition {
        Condition::Always => Ok(true),
        Condition::Compare(Comparison { left, op, right }) => {
            Ok(op.apply(fields.resolve(left)?, fields.resolve(right)?))
        }
        Condition::All(conditions) => {
            for c in conditions {
                if !evaluate(c, fields, labels)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Any(conditions) => {
            for c in conditions {
                if evaluate(c, fields, labels)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::LabelIn(label_in) => Ok(labels
            .get(&label_in.label)
            .is_some_and(|l| label_in.values.iter().any(|v| v == l))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FEATURE_DATA;

    fn features(price: f64, ma_5: f64, ma_10: f64, rsi: f64, vol: f64, vr: f64, mom: f64) -> RuleMsg {
        let data = json!({
            "trading_pair": "BTCUSDT",
            "price": price,
            "ma_5": ma_5,
            "ma_10": ma_10,
            "rsi_14": rsi,
            "volatility": vol,
            "volume_ratio": vr,
            "momentum_5d": mom,
            "timestamp": "2024-01-01T00:00:00Z",
        });
        RuleMsg::json(FEATURE_DATA, data.to_string())
    }

    fn run(msg: &RuleMsg) -> Value {
        let chain = load_default_rule_chain().unwrap();
        let out = chain.execute(msg).unwrap();
        assert_eq!(out.msg_type, TRADING_SIGNAL);
        assert_eq!(out.id, msg.id);
        serde_json::from_str(&out.data).unwrap()
    }

    #[test]
    fn test_default_chain_loads() {
        let chain = load_default_rule_chain().unwrap();
        assert_eq!(chain.id(), "trading_rules");
        assert!(chain.accepts(FEATURE_DATA));
        assert!(!chain.accepts(TRADING_SIGNAL));
    }

    #[test]
    fn test_uptrend_with_volume_buys() {
        // UP trend (20) + BULLISH rsi (10) + HIGH_VOLUME in uptrend (15) + RISING (15) = 60
        let out = run(&features(100.0, 99.0, 98.0, 65.0, 0.01, 1.8, 0.03));
        assert_eq!(out["signal"], "BUY");
        assert_eq!(out["buy_score"], 60);
        assert_eq!(out["sell_score"], 0);
        assert_eq!(out["labels"]["trend"], "UP");
        assert_eq!(out["labels"]["momentum_signal"], "BULLISH");
        assert_eq!(out["labels"]["volume_signal"], "HIGH_VOLUME");
        assert_eq!(out["risk_level"], "LOW");
        assert_eq!(out["position_size"], 0.3);
        assert_eq!(out["features"]["trading_pair"], "BTCUSDT");
    }

    #[test]
    fn test_oversold_uptrend_is_strong_buy() {
        // UP (20) + OVERSOLD (25) + HIGH_VOLUME (15) + RISING (15) = 75
        let out = run(&features(100.0, 99.0, 98.0, 25.0, 0.025, 2.0, 0.05));
        assert_eq!(out["signal"], "STRONG_BUY");
        assert_eq!(out["buy_score"], 75);
        assert_eq!(out["risk_level"], "MEDIUM");
        assert_eq!(out["position_size"], 0.2);
    }

    #[test]
    fn test_downtrend_overbought_sells() {
        // DOWN (20) + OVERBOUGHT (25) = 45 sell
        let out = run(&features(95.0, 97.0, 99.0, 75.0, 0.04, 1.0, 0.0));
        assert_eq!(out["signal"], "SELL");
        assert_eq!(out["sell_score"], 45);
        assert_eq!(out["labels"]["trend"], "DOWN");
        assert_eq!(out["risk_level"], "HIGH");
        assert_eq!(out["position_size"], 1.0);
    }

    #[test]
    fn test_flat_market_holds() {
        let out = run(&features(1000.0, 1000.0, 1000.0, 50.0, 0.01, 1.0, 0.0));
        assert_eq!(out["signal"], "HOLD");
        assert_eq!(out["labels"]["trend"], "NEUTRAL");
        assert_eq!(out["labels"]["volume_signal"], "NORMAL");
        assert_eq!(out["position_size"], 0.0);
    }

    #[test]
    fn test_low_volume_penalises_both_sides() {
        let out = run(&features(1000.0, 1000.0, 1000.0, 50.0, 0.01, 0.3, 0.0));
        assert_eq!(out["labels"]["volume_signal"], "LOW_VOLUME");
        assert_eq!(out["buy_score"], -10);
        assert_eq!(out["sell_score"], -10);
        assert_eq!(out["signal"], "HOLD");
    }

    #[test]
    fn test_emitted_at_metadata_wins_over_input_timestamp() {
        let msg = features(1000.0, 1000.0, 1000.0, 50.0, 0.01, 1.0, 0.0)
            .with_metadata(EMITTED_AT, "2025-06-01T12:00:00Z");
        let out = run(&msg);
        assert_eq!(out["timestamp"], "2025-06-01T12:00:00Z");
    }

    #[test]
    fn test_wrong_message_type_rejected() {
        let chain = load_default_rule_chain().unwrap();
        let msg = RuleMsg::json("ORDER", "{}");
        assert_eq!(
            chain.execute(&msg),
            Err(RuleError::UnsupportedMessageType("ORDER".to_string()))
        );
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let chain = load_default_rule_chain().unwrap();
        let msg = RuleMsg::json(FEATURE_DATA, r#"{"trading_pair":"BTCUSDT","price":1.0}"#);
        assert!(matches!(
            chain.execute(&msg),
            Err(RuleError::MissingField(_))
        ));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let chain = load_default_rule_chain().unwrap();
        let msg = RuleMsg::json(FEATURE_DATA, "not json");
        assert!(matches!(chain.execute(&msg), Err(RuleError::InvalidInput(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_rule_chain("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, RuleChainError::Io { .. }));
    }
}
