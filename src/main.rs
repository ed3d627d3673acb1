//! keydir-server: answers public-key lookups for identities.
//!
//! Loads the identity table once at startup, then serves clients until
//! the process is stopped.

use keydir::config::Config;
use keydir::server::Server;
use keydir::table::IdentityTable;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        table = %config.table_path.display(),
        host = %config.host,
        port = config.port,
        max_connections = config.max_connections,
        overflow = ?config.overflow,
        "Starting keydir server"
    );

    let table = Arc::new(IdentityTable::load(&config.table_path, config.table_capacity)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let server = Server::new(config, table);
    runtime.block_on(server.run())?;

    Ok(())
}
