//! In-process execution of the command tree, without HTTP.

use std::io::Write;

use anyhow::{Context, Result};

use cmdgate::config::LogFormat;
use cmdgate::errors::ActionError;
use cmdgate::gateway::registry::CommandRegistry;

pub fn cmd_local(mut registry: impl CommandRegistry, args: Vec<String>) -> Result<()> {
    super::init_tracing(LogFormat::Pretty, "warn");

    registry.reset_flags();
    registry.set_args(args);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = registry.execute(&mut out);
    out.flush().context("Failed to flush stdout")?;

    match result {
        Ok(()) => Ok(()),
        Err(ActionError::Usage(_)) => std::process::exit(2),
        Err(ActionError::Failed(_)) => std::process::exit(1),
        Err(ActionError::Output(err)) => Err(err).context("Failed to write command output"),
    }
}
