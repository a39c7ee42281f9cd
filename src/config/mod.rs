//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::DisplayMode;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "typeset";
const ENV_PREFIX: &str = "TYPESET";
const DEFAULT_CACHE_MAX_ENTRIES: usize = 2048;
const DEFAULT_VERIFICATION_DELAY_MS: u64 = 200;
const DEFAULT_WATCHDOG_MS: u64 = 15_000;

/// Command-line arguments for the `typeset_dump` binary.
#[derive(Debug, Parser)]
#[command(
    name = "typeset_dump",
    version,
    about = "Render the fields of a solution JSON file and print the resulting markup"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TYPESET_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Emit the batch summary as JSON after the markup.
    #[arg(long = "stats")]
    pub stats: bool,

    /// Solution JSON file to render.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub solution: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the number of cached renders kept before a bulk trim.
    #[arg(long = "cache-max-entries", value_name = "COUNT")]
    pub cache_max_entries: Option<usize>,

    /// Override the pause before unrendered markers are retried.
    #[arg(long = "verification-delay-ms", value_name = "MILLIS")]
    pub verification_delay_ms: Option<u64>,

    /// Override the container render watchdog.
    #[arg(long = "watchdog-ms", value_name = "MILLIS")]
    pub watchdog_ms: Option<u64>,

    /// Override the display mode for `smart-content` markers (inline|block).
    #[arg(long = "display-mode", value_name = "MODE")]
    pub display_mode: Option<String>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_entries: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub verification_delay: Duration,
    pub watchdog: Duration,
    pub default_display_mode: DisplayMode,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_render_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            cache: CacheSettings {
                max_entries: NonZeroUsize::new(DEFAULT_CACHE_MAX_ENTRIES)
                    .unwrap_or(NonZeroUsize::MIN),
            },
            render: RenderSettings {
                verification_delay: Duration::from_millis(DEFAULT_VERIFICATION_DELAY_MS),
                watchdog: Duration::from_millis(DEFAULT_WATCHDOG_MS),
                default_display_mode: DisplayMode::Inline,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(entries) = overrides.cache_max_entries {
            self.cache.max_entries = Some(entries);
        }
        if let Some(delay) = overrides.verification_delay_ms {
            self.render.verification_delay_ms = Some(delay);
        }
        if let Some(watchdog) = overrides.watchdog_ms {
            self.render.watchdog_ms = Some(watchdog);
        }
        if let Some(mode) = overrides.display_mode.as_ref() {
            self.render.default_display_mode = Some(mode.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            render,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            logging,
            cache,
            render,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let entries = cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);
    let max_entries = NonZeroUsize::new(entries)
        .ok_or_else(|| LoadError::invalid("cache.max_entries", "must be greater than zero"))?;
    Ok(CacheSettings { max_entries })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let verification_delay = Duration::from_millis(
        render
            .verification_delay_ms
            .unwrap_or(DEFAULT_VERIFICATION_DELAY_MS),
    );

    let watchdog_ms = render.watchdog_ms.unwrap_or(DEFAULT_WATCHDOG_MS);
    if watchdog_ms == 0 {
        return Err(LoadError::invalid(
            "render.watchdog_ms",
            "must be greater than zero",
        ));
    }

    let default_display_mode = match render.default_display_mode {
        Some(mode) => DisplayMode::from_str(mode.trim())
            .map_err(|err| LoadError::invalid("render.default_display_mode", err))?,
        None => DisplayMode::Inline,
    };

    Ok(RenderSettings {
        verification_delay,
        watchdog: Duration::from_millis(watchdog_ms),
        default_display_mode,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    verification_delay_ms: Option<u64>,
    watchdog_ms: Option<u64>,
    default_display_mode: Option<String>,
}

#[cfg(test)]
mod tests;
