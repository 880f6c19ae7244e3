use chrono::Local;
use corrwatch::{Dashboard, DashboardConfig, SampleStore, SqliteSampleStore};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = DashboardConfig::from_env().inspect_err(|error| {
        error!(%error, "invalid configuration");
    })?;

    let store = SqliteSampleStore::open(&config.database_path, config.poll.pair.clone())?;
    store.ensure_schema()?;
    let dashboard = Dashboard::new(store, &config.poll);

    let Some(refresh) = config.refresh else {
        println!("{}", dashboard.view()?);
        return Ok(());
    };

    info!(
        database = %config.database_path.display(),
        ?refresh,
        "Starting corrwatch dashboard"
    );

    let mut ticker = tokio::time::interval(refresh);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, exiting");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        match dashboard.view() {
            Ok(view) => {
                println!("[{}]", Local::now().format("%H:%M:%S"));
                println!("{view}\n");
            }
            // Collector may hold the write lock, retry on the next refresh
            Err(error) if error.is_transient() => warn!(%error, "store busy"),
            Err(error) => error!(%error, "failed to read samples"),
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
