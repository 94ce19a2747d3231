//! HTTP surface of the gateway.
//!
//! Every path is served by one handler. Only `POST` is accepted; the path
//! selects the command and the optional JSON body supplies its flags. The
//! response body is whatever the command printed, with status 200 whether
//! the command itself succeeded or not.
//!
//! | Condition                          | Status | Body            |
//! |------------------------------------|--------|-----------------|
//! | method other than `POST`           | 405    | empty           |
//! | unreadable or malformed JSON body  | 400    | empty           |
//! | unknown command (opt-in rejection) | 404    | empty           |
//! | capture or runner failure          | 500    | empty           |
//! | otherwise                          | 200    | captured output |

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use clap::{Args, Command, FromArgMatches};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::capture::OutputSink;
use super::registry::CommandRegistry;
use super::runner::InvocationRunner;
use super::translate::Translator;
use crate::config::{CONFIG_FILE_NAME, GatewayConfig};
use crate::errors::{InfrastructureError, TranslationError};

pub const SERVER_COMMAND: &str = "server";

// ── Shared application state ──────────────────────────────────────────

pub struct GatewayState {
    pub runner: InvocationRunner,
    pub translator: Translator,
    pub max_body_bytes: usize,
    pub reject_unknown_commands: bool,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(runner: InvocationRunner, config: &GatewayConfig) -> Self {
        Self {
            runner,
            translator: Translator::from_config(&config.translate),
            max_body_bytes: config.server.max_body_bytes,
            reject_unknown_commands: config.server.reject_unknown_commands,
        }
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    MethodNotAllowed,
    BadRequest,
    NotFound,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.into_response()
    }
}

impl From<TranslationError> for ApiError {
    fn from(err: TranslationError) -> Self {
        warn!(error = %err, "Rejecting request body");
        ApiError::BadRequest
    }
}

impl From<InfrastructureError> for ApiError {
    fn from(err: InfrastructureError) -> Self {
        error!(error = %err, "Invocation failed");
        ApiError::Internal
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .fallback(invoke_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn invoke_handler(
    State(state): State<SharedState>,
    req: Request,
) -> Result<Response, ApiError> {
    if req.method() != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }

    let url_path = req.uri().path().to_string();
    let body = axum::body::to_bytes(req.into_body(), state.max_body_bytes)
        .await
        .map_err(|err| {
            warn!(error = %err, "Failed to read request body");
            ApiError::BadRequest
        })?;

    let tokens = state.translator.translate(&url_path, &body)?;
    info!(command_line = ?tokens.as_slice(), "received command line");

    if state.reject_unknown_commands {
        let path = state.translator.command_path(&url_path);
        if let Some(first) = path.segments().first()
            && state.runner.resolve(vec![first.clone()]).await?.is_none()
        {
            warn!(command = %first, "Unknown command");
            return Err(ApiError::NotFound);
        }
    }

    let output = state.runner.call(tokens).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
        .into_response())
}

// ── Startup ───────────────────────────────────────────────────────────

/// Flags of the `server` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Port of the gateway server [default: 8111]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long)]
    pub host: Option<String>,

    /// Path to a cmdgate.toml (defaults to ./cmdgate.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ServerArgs {
    /// Resolve configuration: file, then `CMDGATE_*` environment, then flags.
    pub fn load_config(&self, dir: &Path) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)?,
            None => GatewayConfig::load_or_default(dir)
                .with_context(|| format!("Failed to load {}", CONFIG_FILE_NAME))?,
        };
        config.apply_env()?;
        self.apply_to(&mut config);
        Ok(config)
    }

    /// Overlay explicitly given flags onto `config`.
    pub fn apply_to(&self, config: &mut GatewayConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
    }
}

/// Add the `server` subcommand to an application's command tree.
pub fn with_server_command(root: Command) -> Command {
    root.subcommand(ServerArgs::augment_args(
        Command::new(SERVER_COMMAND).about("Start the command gateway HTTP server"),
    ))
}

/// Parse `server` subcommand matches back into [`ServerArgs`].
pub fn server_args(matches: &clap::ArgMatches) -> Result<ServerArgs> {
    ServerArgs::from_arg_matches(matches).context("Invalid server arguments")
}

/// Serve `registry` on the configured address until Ctrl-C.
pub async fn start_server(config: GatewayConfig, registry: impl CommandRegistry + 'static) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let runner = InvocationRunner::new(registry, OutputSink::stdout(), config.capture.clone());
    serve(listener, &config, runner, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    config: &GatewayConfig,
    runner: InvocationRunner,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    runner.write_console(format!("Starting server on {}\n", local_addr).as_bytes())?;
    info!(%local_addr, "Command gateway listening");

    let app = build_router(Arc::new(GatewayState::new(runner, config)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
