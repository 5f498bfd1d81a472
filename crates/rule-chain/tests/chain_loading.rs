//! Integration tests for loading rule chains from disk and running them
//! through the worker pool.

use rule_chain::{
    FEATURE_DATA, RuleChain, RuleChainError, RuleEngine, RuleEngineConfig, RuleError,
    RuleExecutor, RuleMsg, TRADING_SIGNAL, load_default_rule_chain, load_rule_chain,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::mpsc;

fn shipped_rules() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/trading_rules.json")
}

fn features(pair: &str, price: f64, rsi: f64) -> RuleMsg {
    let data = serde_json::json!({
        "trading_pair": pair,
        "price": price,
        "ma_5": price * 0.99,
        "ma_10": price * 0.98,
        "rsi_14": rsi,
        "volatility": 0.01,
        "volume_ratio": 1.0,
        "momentum_5d": 0.0,
        "timestamp": "2024-01-01T00:00:00Z"
    });
    RuleMsg::json(FEATURE_DATA, data.to_string())
}

#[test]
fn test_shipped_rules_match_builtin_chain() {
    let shipped = load_rule_chain(shipped_rules()).unwrap();
    let builtin = load_default_rule_chain().unwrap();

    assert_eq!(shipped.id(), "trading_rules");
    assert_eq!(shipped.definition(), builtin.definition());
}

#[test]
fn test_missing_rules_file() {
    let err = load_rule_chain("/nonexistent/rules.json").unwrap_err();
    assert!(matches!(err, RuleChainError::Io { .. }));
}

#[test]
fn test_invalid_chain_rejected_at_load() {
    let json = r#"{
        "id": "broken",
        "nodes": [
            { "id": "a", "label": "volume_signal", "cases": [
                { "when": { "label_in": { "label": "trend", "values": ["UP"] } }, "label": "X" }
            ] },
            { "id": "b", "label": "trend", "cases": [] }
        ],
        "decision": { "buy_threshold": 40, "sell_threshold": 40 },
        "risk": { "field": "volatility", "bands": [] },
        "sizing": { "buy": {}, "buy_default": 0.1 }
    }"#;

    assert!(matches!(
        RuleChain::from_json(json),
        Err(RuleChainError::UnknownLabel { .. })
    ));
}

#[test]
fn test_engine_classifies_through_callbacks() {
    let engine = RuleEngine::new(
        load_rule_chain(shipped_rules()).unwrap(),
        RuleEngineConfig {
            workers: 4,
            queue_capacity: 128,
        },
    );
    let (tx, rx) = mpsc::channel();

    // rsi 75 is overbought, rsi 25 oversold
    for (pair, rsi) in [("AAA", 75.0), ("BBB", 25.0), ("CCC", 50.0)] {
        let tx = tx.clone();
        engine.on_msg(
            features(pair, 100.0, rsi),
            Box::new(move |result| {
                tx.send(result).unwrap();
            }),
        );
    }
    drop(tx);

    let mut labels = Vec::new();
    for result in rx.iter() {
        let msg = result.unwrap();
        assert_eq!(msg.msg_type, TRADING_SIGNAL);
        let payload: Value = serde_json::from_str(&msg.data).unwrap();
        labels.push((
            payload["trading_pair"].as_str().unwrap().to_string(),
            payload["labels"]["momentum_signal"].as_str().unwrap().to_string(),
        ));
    }
    labels.sort();

    assert_eq!(
        labels,
        vec![
            ("AAA".to_string(), "OVERBOUGHT".to_string()),
            ("BBB".to_string(), "OVERSOLD".to_string()),
            ("CCC".to_string(), "NEUTRAL".to_string()),
        ]
    );
    assert_eq!(engine.processed(), 3);
}

#[test]
fn test_full_queue_reports_busy() {
    let engine = RuleEngine::new(
        load_default_rule_chain().unwrap(),
        RuleEngineConfig {
            workers: 1,
            queue_capacity: 1,
        },
    );
    let (tx, rx) = mpsc::channel();

    for i in 0..200 {
        let tx = tx.clone();
        engine.on_msg(
            features(&format!("P{}", i), 100.0, 50.0),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
    }
    drop(tx);

    let results: Vec<_> = rx.iter().take(200).collect();
    assert_eq!(results.len(), 200);
    assert!(results.iter().any(|r| r.is_ok()));
    assert!(results.iter().any(|r| matches!(r, Err(RuleError::Busy))));
}
