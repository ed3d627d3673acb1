//! keydir-client: interactive public-key lookups against a keydir server.

use keydir::client::{run_driver, Client};
use keydir::config::ClientConfig;
use tokio::io::BufReader;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::load()?;

    // Logs go to stderr, the dialogue to stdout
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = Client::connect(&config.host, config.port, config.overflow).await?;
        info!(host = %config.host, port = config.port, "Connected");

        let summary = run_driver(
            client,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await?;
        debug!(?summary, "Session finished");
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}
