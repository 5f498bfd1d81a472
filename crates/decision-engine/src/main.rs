use anyhow::Context;
use decision_engine::{DecisionEngine, EngineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_help() {
    eprintln!(
        r#"Decision Engine - rule-based trading signals from online features

USAGE:
    decision-engine [OPTIONS] [CONFIG]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --help              Print this help message

ENVIRONMENT VARIABLES:
    HOST                Server host (overrides config)
    PORT                Server port (overrides config)
    RUST_LOG            Log level filter

EXAMPLES:
    # Run with defaults (Feast at http://localhost:6566, built-in rules)
    decision-engine

    # Run with config file
    decision-engine --config config/engine.json

    # Run with custom port
    PORT=9000 decision-engine config/engine.json
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "decision_engine=info,rule_chain=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            arg if !arg.starts_with('-') && config_path.is_none() => {
                config_path = Some(arg.to_string());
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            EngineConfig::from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path))?
        }
        None => {
            tracing::info!("Using default configuration");
            EngineConfig::default()
        }
    };
    config.apply_env_overrides()?;
    config.validate()?;

    tracing::info!("Trading pairs: {:?}", config.feature_store.trading_pairs);
    tracing::info!("Update interval: {}s", config.trading.update_interval_secs);
    tracing::info!("Buffer capacity: {}", config.trading.buffer_capacity);

    let engine = DecisionEngine::from_config(config).context("failed to start decision engine")?;

    tracing::info!("Starting Decision Engine");
    tracing::info!(
        "REST API: http://{}:{}/",
        engine.config.server.host,
        engine.config.server.port
    );
    tracing::info!("Available endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /signals?limit=10");
    tracing::info!("  GET  /signals/{{pair}}?limit=5");
    tracing::info!("  POST /trigger");

    engine.run().await?;
    Ok(())
}
