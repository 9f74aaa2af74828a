use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::Level;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level {0:?}, expected one of trace, debug, info, warn, error")]
    InvalidLevel(String),
    #[error("failed to install the log subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to reload the log filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogOutput {
    Console,
    Json,
}

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Runtime view of the log level, shared with the admin routes
#[derive(Clone)]
pub struct LogControl {
    handle: FilterHandle,
    level: Arc<RwLock<Level>>,
}

impl LogControl {
    pub fn new(handle: FilterHandle, level: Level) -> Self {
        Self {
            handle,
            level: Arc::new(RwLock::new(level)),
        }
    }

    pub fn level(&self) -> Level {
        *self.level.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap the active filter for one at `level`
    pub fn set_level(&self, level: &str) -> Result<Level, LoggingError> {
        let level = parse_level(level)?;
        self.handle.reload(filter_for(level))?;
        *self.level.write().unwrap_or_else(PoisonError::into_inner) = level;
        tracing::info!(level = %level, "log level changed");
        Ok(level)
    }
}

pub fn parse_level(value: &str) -> Result<Level, LoggingError> {
    Level::from_str(value.trim()).map_err(|_| LoggingError::InvalidLevel(value.to_string()))
}

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::new(level.as_str().to_ascii_lowercase())
}

/// Install the global subscriber
pub fn init(level: &str, output: LogOutput) -> Result<LogControl, LoggingError> {
    let level = parse_level(level)?;
    let (filter, handle) = reload::Layer::new(filter_for(level));

    let registry = tracing_subscriber::registry().with(filter);
    match output {
        LogOutput::Console => registry.with(fmt::layer()).try_init()?,
        LogOutput::Json => registry.with(fmt::layer().json()).try_init()?,
    }

    Ok(LogControl::new(handle, level))
}
