//! Layered configuration for the command gateway.
//!
//! Settings are read from an optional `cmdgate.toml`, then overridden by
//! environment variables, then by flags on the `server` subcommand.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8111
//! max_body_bytes = 65536
//! reject_unknown_commands = false
//!
//! [capture]
//! max_output_bytes = 4194304
//! initial_capacity = 4096
//! echo_commands = true
//!
//! [translate]
//! api_prefix = "api"
//! false_flags = "emit"
//!
//! [logging]
//! format = "pretty"
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "cmdgate.toml";

pub const DEFAULT_PORT: u16 = 8111;

/// How a JSON `false` flag value is turned into tokens.
///
/// `Emit` keeps the historical wire behavior: the bare flag token is emitted
/// for any boolean, so `false` is indistinguishable from `true`. `Omit` drops
/// `false` flags entirely and lets the registry fall back to the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FalseFlags {
    #[default]
    Emit,
    Omit,
}

impl FromStr for FalseFlags {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "emit" => Ok(Self::Emit),
            "omit" => Ok(Self::Omit),
            other => bail!("Unknown false_flags mode '{}': expected emit or omit", other),
        }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => bail!("Unknown log format '{}': expected pretty or json", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest request body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Answer 404 without running when the first path segment is not a command
    #[serde(default)]
    pub reject_unknown_commands: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            reject_unknown_commands: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSection {
    /// Upper bound on the output captured from one invocation
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Bytes reserved up front for each capture buffer
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
    /// Print `received command line: [...]` to the console before each run
    #[serde(default = "default_echo_commands")]
    pub echo_commands: bool,
}

fn default_max_output_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_initial_capacity() -> usize {
    4096
}

fn default_echo_commands() -> bool {
    true
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            max_output_bytes: default_max_output_bytes(),
            initial_capacity: default_initial_capacity(),
            echo_commands: default_echo_commands(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateSection {
    /// Leading path segment stripped before the command path
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default)]
    pub false_flags: FalseFlags,
}

fn default_api_prefix() -> String {
    "api".to_string()
}

impl Default for TranslateSection {
    fn default() -> Self {
        Self {
            api_prefix: default_api_prefix(),
            false_flags: FalseFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
}

/// The complete cmdgate.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub translate: TranslateSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse cmdgate.toml")
    }

    /// Load `cmdgate.toml` from `dir`, or defaults if the file doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `CMDGATE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply `CMDGATE_*` overrides using `lookup` to read variables.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CMDGATE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CMDGATE_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid CMDGATE_PORT '{}'", port))?;
        }
        if let Some(format) = lookup("CMDGATE_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.max_body_bytes == 0 {
            warnings.push("server.max_body_bytes is 0: every non-empty body will be rejected".into());
        }
        if self.capture.max_output_bytes == 0 {
            warnings.push(
                "capture.max_output_bytes is 0: any command that prints will fail".into(),
            );
        }
        if self.capture.initial_capacity > self.capture.max_output_bytes {
            warnings.push(format!(
                "capture.initial_capacity ({}) exceeds capture.max_output_bytes ({})",
                self.capture.initial_capacity, self.capture.max_output_bytes
            ));
        }
        if self.translate.api_prefix.contains('/') {
            warnings.push(format!(
                "translate.api_prefix '{}' contains '/': it is matched against a single path segment",
                self.translate.api_prefix
            ));
        }

        warnings
    }
}
