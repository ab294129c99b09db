use anyhow::Result;
use std::sync::Arc;

use kvbench::bench::{AggregationServer, LoadGenerator, Reporter};
use kvbench::config::{Config, Mode};
use kvbench::store::BackendRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Backends are registered here and passed down explicitly
    let registry = BackendRegistry::with_defaults();
    config.validate(&registry)?;

    match config.mode {
        Mode::Serve { endpoint } => {
            let server = AggregationServer::bind(&endpoint).await?;
            tracing::info!("Aggregation server listening on {}", server.local_addr()?);
            server.run(|aggregate| println!("{}", aggregate)).await;
        }
        Mode::Bench(settings) => {
            tracing::info!("Executing bench with {}", settings);
            let settings = Arc::new(settings);

            let generator = match LoadGenerator::start(settings.clone(), &registry).await {
                Ok(generator) => generator,
                Err(e) => {
                    tracing::error!("Initialization error: {:#}", e);
                    return Err(e);
                }
            };

            // Runs until the process is killed
            let reporter = Reporter::connect(&settings, generator.counters()).await;
            reporter.run().await;
        }
    }

    Ok(())
}
