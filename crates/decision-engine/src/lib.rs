//! Decision Engine
//!
//! Periodically pulls market features for a configured set of trading
//! pairs, classifies each snapshot with a rule chain and serves the most
//! recent signals over HTTP.
//!
//! # Architecture
//!
//! - **Domain**: the bounded signal buffer and tick bookkeeping
//! - **Application**: rule evaluator, decision loop and query service
//! - **Infrastructure**: configuration, Feast client and mock provider
//! - **Presentation**: REST API
//!
//! ```text
//! timer ─▶ DecisionLoop ─fetch─▶ FeatureProvider
//!              │
//!              ├─evaluate─▶ RuleEvaluator ─on_msg─▶ RuleEngine (worker threads)
//!              │                 ▲                          │
//!              │                 └──── oneshot ◀── on_end ──┘
//!              ▼
//!         SignalBuffer ◀─drain─ SignalQueryService ◀─ REST handlers
//! ```
//!
//! # Example
//!
//! ```ignore
//! use decision_engine::{DecisionEngine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::from_file("config/engine.json")?;
//!     DecisionEngine::from_config(config)?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::{
    DecisionLoop, DecisionLoopConfig, EvaluateError, LifecycleError, RuleEvaluator,
    SignalQueryService, TriggerError,
};
pub use domain::{LoopState, PushOutcome, SignalBuffer, TickReport, TickSource};
pub use infrastructure::{ConfigError, EngineConfig, FeastError, build_provider};
pub use presentation::{ApiError, AppState, create_router};

use axum::Router;
use rule_chain::{
    RuleChain, RuleChainError, RuleEngine, RuleEngineConfig, RuleExecutor,
    load_default_rule_chain, load_rule_chain,
};
use signal_ports::{Clock, FeatureProvider, SystemClock};
use std::future::IntoFuture;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Startup failures. Nothing after startup is fatal.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to load rule chain: {0}")]
    RuleChain(#[from] RuleChainError),

    #[error("Failed to build feature store client: {0}")]
    FeatureStore(#[from] FeastError),

    #[error("Failed to start decision loop: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The wired decision engine
pub struct DecisionEngine {
    pub config: EngineConfig,
    clock: Arc<dyn Clock>,
    decision_loop: Arc<DecisionLoop>,
    query: Arc<SignalQueryService>,
}

impl DecisionEngine {
    /// Build every component from configuration: rule chain, worker pool,
    /// feature provider, buffer and loop.
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        let chain = match &config.trading.rules_file {
            Some(path) => load_rule_chain(path)?,
            None => load_default_rule_chain()?,
        };
        tracing::info!(chain = chain.id(), name = chain.name(), "Rule chain loaded");

        let provider = build_provider(&config.feature_store, Arc::clone(&clock))?;
        let executor = Self::spawn_rule_engine(chain, &config);

        Ok(Self::with_components(config, provider, executor, clock))
    }

    /// Wire the engine around externally built collaborators
    pub fn with_components(
        config: EngineConfig,
        provider: Arc<dyn FeatureProvider>,
        executor: Arc<dyn RuleExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let evaluator = RuleEvaluator::new(
            executor,
            Arc::clone(&clock),
            config.trading.evaluation_timeout(),
        );
        let buffer = Arc::new(SignalBuffer::new(config.trading.buffer_capacity));
        let decision_loop = Arc::new(DecisionLoop::new(
            DecisionLoopConfig {
                trading_pairs: config.feature_store.trading_pairs.clone(),
                interval: config.trading.update_interval(),
            },
            provider,
            evaluator,
            buffer,
        ));
        let query = Arc::new(SignalQueryService::with_over_fetch_factor(
            Arc::clone(&decision_loop),
            config.query.over_fetch_factor,
        ));

        Self {
            config,
            clock,
            decision_loop,
            query,
        }
    }

    fn spawn_rule_engine(chain: RuleChain, config: &EngineConfig) -> Arc<dyn RuleExecutor> {
        Arc::new(RuleEngine::new(
            chain,
            RuleEngineConfig {
                workers: config.trading.evaluator_workers,
                ..Default::default()
            },
        ))
    }

    pub fn decision_loop(&self) -> &Arc<DecisionLoop> {
        &self.decision_loop
    }

    pub fn query(&self) -> &Arc<SignalQueryService> {
        &self.query
    }

    /// Create the REST API router
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState::new(
            Arc::clone(&self.query),
            Arc::clone(&self.clock),
            self.config.query.clone(),
        ));
        create_router(state, self.config.server.read_timeout())
    }

    /// Start the loop and serve HTTP until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<(), EngineError> {
        if let Err(e) = self.decision_loop.provider().health_check().await {
            tracing::warn!(error = %e, "Feature store health check failed, continuing");
        }

        let addr = self.config.server.address();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Decision engine listening on {}", addr);

        self.decision_loop.start()?;

        // Producing stops as soon as shutdown begins, so in-flight requests
        // drain a buffer that no longer grows.
        let (stopping_tx, mut stopping_rx) = tokio::sync::watch::channel(false);
        let decision_loop = Arc::clone(&self.decision_loop);
        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                decision_loop.stop();
                let _ = stopping_tx.send(true);
            })
            .into_future();
        tokio::pin!(server);

        let grace = self.config.server.write_timeout();
        tokio::select! {
            result = &mut server => result?,
            _ = async {
                let _ = stopping_rx.wait_for(|stopping| *stopping).await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed");
            }
        }

        self.decision_loop.stop();
        tracing::info!("Decision engine shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
