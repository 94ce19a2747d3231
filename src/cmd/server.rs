//! Gateway server command: `cmdgate server`.

use anyhow::{Context, Result};
use tracing::warn;

use cmdgate::gateway::registry::CommandRegistry;
use cmdgate::gateway::server::{ServerArgs, start_server};

pub async fn cmd_server(args: &ServerArgs, registry: impl CommandRegistry + 'static) -> Result<()> {
    let dir = std::env::current_dir().context("Failed to get current directory")?;
    let config = args.load_config(&dir)?;

    super::init_tracing(config.logging.format, "info");
    for warning in config.validate() {
        warn!("{}", warning);
    }

    start_server(config, registry).await
}
