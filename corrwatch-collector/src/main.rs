use corrwatch::{CollectorConfig, FinnhubClient, PollLoop, SqliteSampleStore};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = CollectorConfig::from_env().inspect_err(|error| {
        error!(%error, "invalid configuration");
    })?;
    info!(
        pair = %config.poll.pair,
        database = %config.database_path.display(),
        "Starting corrwatch collector"
    );

    let store = SqliteSampleStore::open(&config.database_path, config.poll.pair.clone())?;
    let source = FinnhubClient::new(config.finnhub)?;
    let poll = PollLoop::new(config.poll, source, store)?;

    let status = poll.run(shutdown_signal()).await;
    if let Some(evaluation) = status.last_evaluation {
        info!(
            correlation = evaluation.latest_correlation,
            z_score = evaluation.verdict.z_score,
            is_anomaly = evaluation.verdict.is_anomaly,
            "final evaluation"
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(error) => {
            // Without a signal handler run until killed
            error!(%error, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
