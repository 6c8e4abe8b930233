//! Logging
//!
//! Installs the global `tracing` subscriber. The `[logging]` config section
//! sets level, format and destination; `KILN_LOG`, `KILN_LOG_FORMAT`,
//! `KILN_LOG_OUTPUT`, `KILN_LOG_FILE` and `KILN_LOG_MODULES` override it.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Line format of emitted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("invalid log format {:?} (expected text or json)", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

/// Where events are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOutput {
    #[serde(rename = "stdout")]
    Stdout,
    #[default]
    #[serde(rename = "stderr")]
    Stderr,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "file+stderr")]
    FileAndStderr,
    #[serde(rename = "both")]
    Both,
}

impl LogOutput {
    fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::FileAndStderr)
    }
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            "file+stderr" => Ok(LogOutput::FileAndStderr),
            "both" => Ok(LogOutput::Both),
            other => Err(format!(
                "invalid log output {:?} (expected stdout, stderr, file, file+stderr or both)",
                other
            )),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    /// trace, debug, info, warn, error or off
    #[serde(default = "info_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Explicit log file; the platform state directory is used otherwise.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// ANSI colors for text output on terminals
    #[serde(default = "enabled_by_default")]
    pub color: bool,

    /// Per-target levels, e.g. `"kiln::cache" = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn info_level() -> String {
    "info".to_string()
}

fn enabled_by_default() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: info_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file: None,
            color: true,
            modules: HashMap::new(),
        }
    }
}

/// Log file location: CLI flag, then `KILN_LOG_FILE`, then config, then
/// `<state dir>/kiln.log` (scoped by workspace when one is given).
pub fn resolve_log_file_path(
    cli_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
    workspace: Option<&Path>,
) -> Result<PathBuf, ApiError> {
    let env_file = std::env::var("KILN_LOG_FILE").ok().map(PathBuf::from);
    match [cli_file, env_file, config_file]
        .into_iter()
        .flatten()
        .find(|p| !p.as_os_str().is_empty())
    {
        Some(path) => Ok(path),
        None => state_log_file(workspace),
    }
}

fn state_log_file(workspace: Option<&Path>) -> Result<PathBuf, ApiError> {
    let dirs = directories::ProjectDirs::from("", "kiln", "kiln")
        .ok_or_else(|| ApiError::ConfigError("No home directory for the log file".to_string()))?;
    let state = dirs
        .state_dir()
        .ok_or_else(|| ApiError::ConfigError("No platform state directory for the log file".to_string()))?
        .to_path_buf();
    let dir = match workspace {
        Some(ws) => {
            let canonical = dunce::canonicalize(ws).map_err(|e| {
                ApiError::ConfigError(format!("Failed to canonicalize workspace path: {}", e))
            })?;
            xdg::scoped(state, &canonical)
        }
        None => state,
    };
    Ok(dir.join("kiln.log"))
}

/// Install the global subscriber. Environment overrides win over `config`,
/// which wins over the defaults. The CLI exports its flags into `config`.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    if !config.enabled {
        Registry::default()
            .with(EnvFilter::new("off"))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::sink))
            .init();
        return Ok(());
    }

    let filter = env_filter(config)?;
    let format = effective_format(config);
    let output = effective_output(config)?;
    let writer = make_writer(config, output)?;
    let ansi = config.color && !output.to_file();

    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339());
    let registry = Registry::default().with(filter);
    match format {
        LogFormat::Json => registry.with(layer.json().with_writer(writer)).init(),
        LogFormat::Text => registry.with(layer.with_ansi(ansi).with_writer(writer)).init(),
    }

    Ok(())
}

fn make_writer(config: &LoggingConfig, output: LogOutput) -> Result<BoxMakeWriter, ApiError> {
    Ok(match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::Both => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
        LogOutput::File | LogOutput::FileAndStderr => {
            let path = resolve_log_file_path(None, config.file.clone(), None)?;
            let file = Mutex::new(open_log_file(&path)?);
            if output == LogOutput::FileAndStderr {
                BoxMakeWriter::new(file.and(std::io::stderr))
            } else {
                BoxMakeWriter::new(file)
            }
        }
    })
}

fn open_log_file(path: &Path) -> Result<std::fs::File, ApiError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ApiError::ConfigError(format!("Failed to create log directory: {}", e)))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ApiError::ConfigError(format!("Failed to open log file {:?}: {}", path, e)))
}

/// `KILN_LOG` replaces the configured filter entirely; otherwise the level
/// plus per-module directives from config and `KILN_LOG_MODULES`.
fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env("KILN_LOG") {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut directives: Vec<String> = config
        .modules
        .iter()
        .map(|(target, level)| format!("{}={}", target, level))
        .collect();

    // KILN_LOG_MODULES="kiln::cache=debug,kiln::graph=trace"
    if let Ok(modules) = std::env::var("KILN_LOG_MODULES") {
        directives.extend(
            modules
                .split(',')
                .filter_map(|pair| pair.split_once('='))
                .map(|(target, level)| format!("{}={}", target.trim(), level.trim())),
        );
    }

    directives
        .iter()
        .try_fold(EnvFilter::new(&config.level), |filter, directive| {
            directive
                .parse()
                .map(|d| filter.add_directive(d))
                .map_err(|e| ApiError::ConfigError(format!("Invalid log directive {:?}: {}", directive, e)))
        })
}

/// An unparseable `KILN_LOG_FORMAT` is ignored.
fn effective_format(config: &LoggingConfig) -> LogFormat {
    std::env::var("KILN_LOG_FORMAT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(config.format)
}

fn effective_output(config: &LoggingConfig) -> Result<LogOutput, ApiError> {
    match std::env::var("KILN_LOG_OUTPUT") {
        Ok(value) => value.parse().map_err(ApiError::ConfigError),
        Err(_) => Ok(config.output),
    }
}
