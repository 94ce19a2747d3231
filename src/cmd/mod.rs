//! CLI command implementations.
//!
//! | Module   | Commands handled                                   |
//! |----------|----------------------------------------------------|
//! | `server` | `server`: serve the command tree over HTTP         |
//! | `local`  | everything else: run the command tree in-process   |

pub mod local;
pub mod server;

pub use local::cmd_local;
pub use server::cmd_server;

use cmdgate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_directive`.
pub fn init_tracing(format: LogFormat, default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
