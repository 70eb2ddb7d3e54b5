//! Pool sizing and polling knobs for a single `map` invocation.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// How long the orchestrator waits on the output channel per poll.
pub const DEFAULT_OUTPUT_POLL: Duration = Duration::from_millis(100);
/// How long a worker waits to claim an item before treating the queue as drained.
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_millis(50);
/// How long the log consolidator waits on the log channel per poll.
pub const DEFAULT_LOG_POLL: Duration = Duration::from_millis(100);
/// Maximum characters of an item rendered into log lines.
pub const DEFAULT_PREVIEW_LEN: usize = 50;

/// Configuration for one `map` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfig {
    /// Requested worker count. `None` means available parallelism.
    pub pool_size: Option<usize>,
    /// Bounded wait on the output channel.
    pub output_poll: Duration,
    /// Bounded wait when claiming from the work queue.
    pub claim_timeout: Duration,
    /// Bounded wait on the log channel.
    pub log_poll: Duration,
    /// Truncation length for item previews in log lines.
    pub preview_len: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            output_poll: DEFAULT_OUTPUT_POLL,
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
            log_poll: DEFAULT_LOG_POLL,
            preview_len: DEFAULT_PREVIEW_LEN,
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    map: MapSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MapSection {
    mappers: Option<usize>,
    output_poll_ms: Option<u64>,
    claim_timeout_ms: Option<u64>,
    log_poll_ms: Option<u64>,
    preview_len: Option<usize>,
}

impl MapConfig {
    /// Start from defaults with an explicit pool size.
    pub fn with_pool_size(pool_size: Option<usize>) -> Self {
        Self {
            pool_size,
            ..Self::default()
        }
    }

    /// Load from `PARA_*` environment variables. Unset variables keep their
    /// defaults; set-but-invalid variables are an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            pool_size: parse_var::<usize>("PARA_MAPPERS")?,
            output_poll: parse_var::<u64>("PARA_OUTPUT_POLL_MS")?
                .map_or(defaults.output_poll, Duration::from_millis),
            claim_timeout: parse_var::<u64>("PARA_CLAIM_TIMEOUT_MS")?
                .map_or(defaults.claim_timeout, Duration::from_millis),
            log_poll: parse_var::<u64>("PARA_LOG_POLL_MS")?
                .map_or(defaults.log_poll, Duration::from_millis),
            preview_len: parse_var::<usize>("PARA_PREVIEW_LEN")?.unwrap_or(defaults.preview_len),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse the `[map]` table of a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad map config: {e}")))?;
        let section = file.map;
        let defaults = Self::default();
        let config = Self {
            pool_size: section.mappers,
            output_poll: section
                .output_poll_ms
                .map_or(defaults.output_poll, Duration::from_millis),
            claim_timeout: section
                .claim_timeout_ms
                .map_or(defaults.claim_timeout, Duration::from_millis),
            log_poll: section
                .log_poll_ms
                .map_or(defaults.log_poll, Duration::from_millis),
            preview_len: section.preview_len.unwrap_or(defaults.preview_len),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject settings that would make the pool spin or log nothing useful.
    pub fn validate(&self) -> Result<()> {
        for (name, wait) in [
            ("output_poll", self.output_poll),
            ("claim_timeout", self.claim_timeout),
            ("log_poll", self.log_poll),
        ] {
            if wait.is_zero() {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.preview_len == 0 {
            return Err(Error::Config(
                "preview_len must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Number of hardware threads, falling back to 1 when it cannot be queried.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Number of workers to spawn for `item_count` items.
///
/// Never more workers than items, never fewer than one while there is work.
/// An empty input needs no workers at all.
pub fn effective_pool_size(requested: Option<usize>, item_count: usize) -> usize {
    if item_count == 0 {
        return 0;
    }
    requested
        .unwrap_or_else(available_parallelism)
        .clamp(1, item_count)
}
