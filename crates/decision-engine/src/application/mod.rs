mod decision_loop;
mod evaluator;
mod query;

pub use decision_loop::{
    DEFAULT_UPDATE_INTERVAL, DecisionLoop, DecisionLoopConfig, LifecycleError, TriggerError,
};
pub use evaluator::{DEFAULT_EVALUATION_TIMEOUT, EvaluateError, RuleEvaluator};
pub use query::{DEFAULT_OVER_FETCH_FACTOR, SignalQueryService};
