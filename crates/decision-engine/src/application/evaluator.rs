//! Rule Evaluator
//!
//! Bridges the callback-driven rule executor into "one call, one result".
//! The caller's task waits on a oneshot completion that the executor's
//! callback fulfils; if the callback does not fire within the configured
//! timeout the evaluation fails with `EvaluateError::Timeout`. Only the
//! awaiting task is suspended, never the runtime.

use rule_chain::{EMITTED_AT, FEATURE_DATA, RuleError, RuleExecutor, RuleMsg};
use signal_core::{FeatureSnapshot, Signal, Symbol};
use signal_ports::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Default bound on a single evaluation
pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluateError {
    #[error("{trading_pair}: failed to encode snapshot: {reason}")]
    Encode { trading_pair: Symbol, reason: String },

    #[error("{trading_pair}: rule chain error: {source}")]
    Evaluation {
        trading_pair: Symbol,
        #[source]
        source: RuleError,
    },

    #[error("{trading_pair}: rule chain dropped the completion without a result")]
    Abandoned { trading_pair: Symbol },

    #[error("{trading_pair}: evaluation timed out after {timeout_ms}ms")]
    Timeout { trading_pair: Symbol, timeout_ms: u64 },

    #[error("{trading_pair}: invalid signal payload: {reason}")]
    Decode { trading_pair: Symbol, reason: String },
}

impl EvaluateError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EvaluateError::Timeout { .. })
    }
}

/// Evaluates feature snapshots against the shared rule chain
pub struct RuleEvaluator {
    executor: Arc<dyn RuleExecutor>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl RuleEvaluator {
    pub fn new(executor: Arc<dyn RuleExecutor>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            executor,
            clock,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Classify one snapshot.
    ///
    /// Returns only once the chain has completed, failed, or the timeout
    /// elapsed. Safe to call concurrently for different snapshots.
    pub async fn evaluate(&self, snapshot: &FeatureSnapshot) -> Result<Signal, EvaluateError> {
        let trading_pair = snapshot.trading_pair.clone();

        let data = serde_json::to_string(snapshot).map_err(|e| EvaluateError::Encode {
            trading_pair: trading_pair.clone(),
            reason: e.to_string(),
        })?;
        let msg = RuleMsg::json(FEATURE_DATA, data)
            .with_metadata(EMITTED_AT, self.clock.now().to_rfc3339());
        let msg_id = msg.id;

        let (tx, rx) = oneshot::channel();
        self.executor.on_msg(
            msg,
            Box::new(move |result| {
                // receiver is gone once the evaluation timed out
                let _ = tx.send(result);
            }),
        );

        let completion = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(_)) => return Err(EvaluateError::Abandoned { trading_pair }),
            Err(_) => {
                return Err(EvaluateError::Timeout {
                    trading_pair,
                    timeout_ms: millis(self.timeout),
                });
            }
        };

        let reply = completion.map_err(|source| EvaluateError::Evaluation {
            trading_pair: trading_pair.clone(),
            source,
        })?;

        let signal: Signal =
            serde_json::from_str(&reply.data).map_err(|e| EvaluateError::Decode {
                trading_pair: trading_pair.clone(),
                reason: e.to_string(),
            })?;

        if signal.trading_pair != trading_pair {
            return Err(EvaluateError::Decode {
                reason: format!("signal is for {}", signal.trading_pair),
                trading_pair,
            });
        }

        tracing::debug!(
            %msg_id,
            trading_pair = %signal.trading_pair,
            action = %signal.action,
            buy_score = signal.buy_score,
            sell_score = signal.sell_score,
            "Snapshot evaluated"
        );

        Ok(signal)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::snapshot;
    use parking_lot::Mutex;
    use rule_chain::{OnEnd, RuleEngine, RuleEngineConfig, load_default_rule_chain};
    use signal_core::Action;
    use signal_ports::SystemClock;

    /// Executor that keeps callbacks without ever calling them
    #[derive(Default)]
    struct SilentExecutor {
        pending: Mutex<Vec<OnEnd>>,
    }

    impl RuleExecutor for SilentExecutor {
        fn on_msg(&self, _msg: RuleMsg, on_end: OnEnd) {
            self.pending.lock().push(on_end);
        }
    }

    /// Executor that drops the callback unused
    struct DroppingExecutor;

    impl RuleExecutor for DroppingExecutor {
        fn on_msg(&self, _msg: RuleMsg, _on_end: OnEnd) {}
    }

    /// Executor that fails every message
    struct FailingExecutor;

    impl RuleExecutor for FailingExecutor {
        fn on_msg(&self, _msg: RuleMsg, on_end: OnEnd) {
            on_end(Err(RuleError::MissingField("ma_5".to_string())));
        }
    }

    /// Executor that completes from another thread after a delay
    struct DelayedExecutor {
        inner: RuleEngine,
        delay: std::time::Duration,
    }

    impl RuleExecutor for DelayedExecutor {
        fn on_msg(&self, msg: RuleMsg, on_end: OnEnd) {
            let delay = self.delay;
            self.inner.on_msg(
                msg,
                Box::new(move |result| {
                    std::thread::sleep(delay);
                    on_end(result);
                }),
            );
        }
    }

    fn evaluator(executor: Arc<dyn RuleExecutor>, timeout: Duration) -> RuleEvaluator {
        RuleEvaluator::new(executor, Arc::new(SystemClock::new()), timeout)
    }

    fn engine() -> RuleEngine {
        RuleEngine::new(
            load_default_rule_chain().unwrap(),
            RuleEngineConfig {
                workers: 2,
                queue_capacity: 16,
            },
        )
    }

    #[tokio::test]
    async fn test_evaluate_waits_for_callback() {
        let executor = Arc::new(DelayedExecutor {
            inner: engine(),
            delay: std::time::Duration::from_millis(50),
        });
        let evaluator = evaluator(executor, Duration::from_secs(2));

        let signal = evaluator
            .evaluate(&snapshot("BTCUSDT", 45000.0))
            .await
            .unwrap();

        assert_eq!(signal.trading_pair, "BTCUSDT");
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.price, 45000.0);
        assert_eq!(signal.features.trading_pair, "BTCUSDT");
        assert!(signal.label("trend").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_chain_times_out() {
        let executor = Arc::new(SilentExecutor::default());
        let evaluator = evaluator(executor.clone(), Duration::from_secs(3));

        let err = evaluator
            .evaluate(&snapshot("ETHUSDT", 2500.0))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EvaluateError::Timeout {
                trading_pair: "ETHUSDT".to_string(),
                timeout_ms: 3000,
            }
        );
        assert!(err.is_timeout());
        assert_eq!(executor.pending.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_callback_after_timeout_is_harmless() {
        let executor = Arc::new(SilentExecutor::default());
        let evaluator = evaluator(executor.clone(), Duration::from_millis(100));

        assert!(evaluator
            .evaluate(&snapshot("ETHUSDT", 2500.0))
            .await
            .unwrap_err()
            .is_timeout());

        let on_end = executor.pending.lock().pop().unwrap();
        on_end(Err(RuleError::Busy));
    }

    #[tokio::test]
    async fn test_dropped_callback_is_an_error() {
        let evaluator = evaluator(Arc::new(DroppingExecutor), Duration::from_secs(3));
        let err = evaluator
            .evaluate(&snapshot("BTCUSDT", 1.0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EvaluateError::Abandoned {
                trading_pair: "BTCUSDT".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_chain_error_is_propagated() {
        let evaluator = evaluator(Arc::new(FailingExecutor), Duration::from_secs(3));
        let err = evaluator
            .evaluate(&snapshot("BTCUSDT", 1.0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EvaluateError::Evaluation {
                trading_pair: "BTCUSDT".to_string(),
                source: RuleError::MissingField("ma_5".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_evaluations() {
        let evaluator = Arc::new(evaluator(Arc::new(engine()), Duration::from_secs(2)));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let evaluator = Arc::clone(&evaluator);
                tokio::spawn(async move {
                    evaluator
                        .evaluate(&snapshot(&format!("PAIR{}", i), 100.0 + i as f64))
                        .await
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let signal = handle.await.unwrap().unwrap();
            assert_eq!(signal.trading_pair, format!("PAIR{}", i));
            assert_eq!(signal.price, 100.0 + i as f64);
        }
    }

    #[test]
    fn test_timeout_millis_saturate() {
        assert_eq!(millis(Duration::from_millis(3000)), 3000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
