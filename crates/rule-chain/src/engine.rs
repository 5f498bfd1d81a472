use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crate::chain::RuleChain;
use crate::error::RuleError;
use crate::message::RuleMsg;

/// Completion callback invoked exactly once with the chain's result
pub type OnEnd = Box<dyn FnOnce(Result<RuleMsg, RuleError>) + Send + 'static>;

/// Capability to run a message through a rule chain.
///
/// `on_msg` schedules the work and returns immediately; the outcome is only
/// observable through `on_end`.
pub trait RuleExecutor: Send + Sync {
    fn on_msg(&self, msg: RuleMsg, on_end: OnEnd);
}

/// Configuration for the rule engine worker pool
#[derive(Debug, Clone)]
pub struct RuleEngineConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Pending message capacity before `on_msg` reports `Busy`
    pub queue_capacity: usize,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

struct Job {
    msg: RuleMsg,
    on_end: OnEnd,
}

/// Executes a shared rule chain on a pool of worker threads
pub struct RuleEngine {
    chain: Arc<RuleChain>,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    processed: Arc<AtomicU64>,
}

impl RuleEngine {
    pub fn new(chain: RuleChain, config: RuleEngineConfig) -> Self {
        let chain = Arc::new(chain);
        let (sender, receiver) = bounded::<Job>(config.queue_capacity.max(1));
        let processed = Arc::new(AtomicU64::new(0));

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let chain = Arc::clone(&chain);
                let processed = Arc::clone(&processed);
                thread::Builder::new()
                    .name(format!("rule-worker-{}", id))
                    .spawn(move || run_worker(id, chain, receiver, processed))
                    .expect("Failed to spawn rule worker thread")
            })
            .collect();

        tracing::info!(
            chain = chain.id(),
            workers = config.workers.max(1),
            queue_capacity = config.queue_capacity,
            "Rule engine started"
        );

        Self {
            chain,
            sender: Some(sender),
            workers,
            processed,
        }
    }

    pub fn chain(&self) -> &RuleChain {
        &self.chain
    }

    /// Messages executed so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Messages waiting for a worker
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// Stop accepting messages and wait for queued ones to finish.
    ///
    /// Blocks until every worker thread has exited.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("Rule worker exited with a panic");
            }
        }
        tracing::info!(processed = self.processed(), "Rule engine stopped");
    }
}

impl RuleExecutor for RuleEngine {
    fn on_msg(&self, msg: RuleMsg, on_end: OnEnd) {
        let Some(sender) = &self.sender else {
            on_end(Err(RuleError::EngineShutdown));
            return;
        };

        match sender.try_send(Job { msg, on_end }) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => (job.on_end)(Err(RuleError::Busy)),
            Err(TrySendError::Disconnected(job)) => (job.on_end)(Err(RuleError::EngineShutdown)),
        }
    }
}

impl Drop for RuleEngine {
    /// Closes the queue without joining. Workers finish the queued messages
    /// and exit on their own, so dropping never blocks the caller's thread.
    fn drop(&mut self) {
        if self.sender.take().is_some() {
            tracing::debug!(pending_workers = self.workers.len(), "Rule engine dropped");
        }
    }
}

fn run_worker(id: usize, chain: Arc<RuleChain>, receiver: Receiver<Job>, processed: Arc<AtomicU64>) {
    tracing::debug!(worker = id, "Rule worker started");

    while let Ok(Job { msg, on_end }) = receiver.recv() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| chain.execute(&msg)))
            .unwrap_or_else(|payload| Err(RuleError::Panicked(panic_message(payload.as_ref()))));

        processed.fetch_add(1, Ordering::Relaxed);
        on_end(result);
    }

    tracing::debug!(worker = id, "Rule worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
