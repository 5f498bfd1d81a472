//! Rule Chain
//!
//! Declarative trading policy loaded once at startup and executed
//! asynchronously by a pool of worker threads.
//!
//! ```text
//!   RuleMsg (FEATURE_DATA)          RuleMsg (TRADING_SIGNAL)
//!          │                                  ▲
//!          ▼                                  │ on_end callback
//!   ┌─────────────┐   job queue   ┌───────────┴──────────┐
//!   │ RuleEngine  │ ────────────▶ │ worker threads        │
//!   │  on_msg()   │               │  RuleChain::execute() │
//!   └─────────────┘               └───────────────────────┘
//! ```
//!
//! A chain is an ordered list of nodes. Each node inspects the feature
//! fields (and labels set by earlier nodes), picks the first matching case,
//! records a label and adds buy/sell points. The totals are then classified
//! into an action, a risk label and a suggested position size.
//!
//! `RuleEngine::on_msg` never returns a value: the result is delivered
//! through the completion callback once a worker has run the chain.

mod chain;
mod definition;
mod engine;
mod error;
mod message;

pub use chain::{RuleChain, load_default_rule_chain, load_rule_chain};
pub use definition::{
    CmpOp, Comparison, Condition, DecisionRule, LabelIn, Operand, RiskBand, RiskRule, RuleCase,
    RuleChainDefinition, RuleNode, SizingRule,
};
pub use engine::{OnEnd, RuleEngine, RuleEngineConfig, RuleExecutor};
pub use error::{RuleChainError, RuleError};
pub use message::{DataType, EMITTED_AT, FEATURE_DATA, RuleMsg, TRADING_SIGNAL};
