//! Logging System
//!
//! Structured logging via the `tracing` crate. Protocol frames are written to stdout,
//! so diagnostics go to stderr (or a file) unless explicitly redirected.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Disable all diagnostics when false
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file, both (file + stderr)
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output includes "file")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Enable colored output (text format, console only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from(".kiln/kiln.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where diagnostics are written once env overrides are folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Stdout,
    Stderr,
    File,
    /// File plus a stderr mirror
    Both,
}

impl Sink {
    fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "stdout" => Ok(Sink::Stdout),
            "stderr" => Ok(Sink::Stderr),
            "file" => Ok(Sink::File),
            "both" => Ok(Sink::Both),
            other => Err(ApiError::ConfigError(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file', or 'both')",
                other
            ))),
        }
    }

    fn writes_file(self) -> bool {
        matches!(self, Sink::File | Sink::Both)
    }
}

/// Effective settings after `KILN_LOG_*` overrides.
struct Plan {
    filter: EnvFilter,
    json: bool,
    sink: Sink,
    color: bool,
    file: PathBuf,
}

impl Plan {
    fn resolve(config: &LoggingConfig) -> Result<Self, ApiError> {
        let format = match std::env::var("KILN_LOG_FORMAT") {
            Ok(env) if env == "json" || env == "text" => env,
            _ => config.format.clone(),
        };
        let json = match format.as_str() {
            "json" => true,
            "text" => false,
            other => {
                return Err(ApiError::ConfigError(format!(
                    "Invalid log format: {} (must be 'json' or 'text')",
                    other
                )))
            }
        };
        let sink = match std::env::var("KILN_LOG_OUTPUT") {
            Ok(env) => Sink::parse(&env)?,
            Err(_) => Sink::parse(&config.output)?,
        };
        Ok(Self {
            filter: filter_for(config)?,
            json,
            sink,
            color: config.color,
            file: config.file.clone(),
        })
    }
}

/// Install the global subscriber.
///
/// CLI flags are folded into `config` by the caller; `KILN_LOG`, `KILN_LOG_FORMAT`,
/// `KILN_LOG_OUTPUT` and `KILN_LOG_MODULES` take precedence over it.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let config = config.cloned().unwrap_or_default();
    if !config.enabled {
        return Ok(());
    }
    let plan = Plan::resolve(&config)?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    match plan.sink {
        Sink::Stdout => layers.push(console_layer(plan.json, plan.color, false)),
        Sink::Stderr | Sink::Both => layers.push(console_layer(plan.json, plan.color, true)),
        Sink::File => {}
    }
    if plan.sink.writes_file() {
        layers.push(file_layer(&plan.file, plan.json)?);
    }

    Registry::default()
        .with(layers)
        .with(plan.filter)
        .try_init()
        .map_err(|e| ApiError::ConfigError(format!("Failed to install log subscriber: {}", e)))
}

fn console_layer(json: bool, color: bool, stderr: bool) -> BoxedLayer {
    let base = fmt::layer::<Registry>()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339());
    match (json, stderr) {
        (true, true) => Box::new(base.json().with_writer(std::io::stderr)),
        (true, false) => Box::new(base.json().with_writer(std::io::stdout)),
        (false, true) => Box::new(base.with_ansi(color).with_writer(std::io::stderr)),
        (false, false) => Box::new(base.with_ansi(color).with_writer(std::io::stdout)),
    }
}

fn file_layer(path: &Path, json: bool) -> Result<BoxedLayer, ApiError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ApiError::ConfigError(format!("Failed to create log directory: {}", e)))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ApiError::ConfigError(format!("Failed to open log file {}: {}", path.display(), e)))?;
    let layer = fmt::layer::<Registry>()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .with_writer(Mutex::new(file));
    Ok(if json {
        Box::new(layer.json())
    } else {
        Box::new(layer)
    })
}

/// `KILN_LOG` replaces everything; otherwise the level plus per-module directives.
fn filter_for(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env("KILN_LOG") {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let from_env = std::env::var("KILN_LOG_MODULES").unwrap_or_default();
    let env_pairs = from_env
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(module, level)| (module.trim().to_string(), level.trim().to_string()));
    let pairs = config
        .modules
        .iter()
        .map(|(module, level)| (module.clone(), level.clone()))
        .chain(env_pairs);

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in pairs {
        let directive = format!("{}={}", module, level)
            .parse()
            .map_err(|e| ApiError::ConfigError(format!("Invalid log directive {}={}: {}", module, level, e)))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}
