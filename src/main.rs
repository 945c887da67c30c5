//! Bancho Server Binary
//!
//! Wires the in-memory collaborators, seeds the session world and runs
//! the HTTP surface next to the pub/sub consumer.

use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bancho::services::Services;
use bancho::{App, Config, PROTOCOL_VERSION, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let default_level = if config.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level.to_string())),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Bancho Server v{}", VERSION);
    info!("Protocol version: {}", PROTOCOL_VERSION);
    info!(domain = %config.server_domain, port = config.server_port, "configuration loaded");

    // In-memory collaborators; a production deployment swaps in the
    // store/bus/geolocation backends pointed at by the configured DSNs.
    let services = Services::in_memory();
    let app = App::new(config, services);

    app.populate().await?;

    let consumer = tokio::spawn(bancho::pubsub::run_consumer(app.clone()));
    app.track_task(consumer).await;

    let serving = bancho::http::serve(app.clone());
    tokio::select! {
        result = serving => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    app.shutdown().await;
    info!("Bancho has stopped!");
    Ok(())
}
