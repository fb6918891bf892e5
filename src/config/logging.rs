//! Level-scoped loggers carried by the configuration.
//!
//! Handlers never reach for ambient logging state: they receive the
//! [`Loggers`] bundle through the shared configuration and write through the
//! handle that matches the event severity. Every handle emits a `tracing`
//! event, so the subscriber installed at startup decides where it lands.

use super::error::{ConfigError, Result};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub const ALL: [Self; 4] = [Self::Debug, Self::Info, Self::Warning, Self::Error];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Matching `tracing` level, used as the subscriber's default directive.
    #[must_use]
    pub const fn tracing_level(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warning => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Case-sensitive on purpose: "debug" is rejected.
impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| ConfigError::LogLevel(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    level: LogLevel,
    prefix: String,
    enabled: bool,
}

impl Logger {
    fn new(level: LogLevel, threshold: LogLevel) -> Self {
        Self {
            level,
            prefix: format!("{}: ", level.as_str()),
            enabled: level >= threshold,
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log(&self, message: fmt::Arguments<'_>) {
        if !self.enabled {
            return;
        }

        match self.level {
            LogLevel::Debug => tracing::debug!("{}{}", self.prefix, message),
            LogLevel::Info => tracing::info!("{}{}", self.prefix, message),
            LogLevel::Warning => tracing::warn!("{}{}", self.prefix, message),
            LogLevel::Error => tracing::error!("{}{}", self.prefix, message),
        }
    }
}

/// One logger per level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loggers {
    pub debug: Logger,
    pub info: Logger,
    pub warning: Logger,
    pub error: Logger,
}

impl Loggers {
    /// Enable every logger at or above `threshold`.
    #[must_use]
    pub fn with_threshold(threshold: LogLevel) -> Self {
        Self {
            debug: Logger::new(LogLevel::Debug, threshold),
            info: Logger::new(LogLevel::Info, threshold),
            warning: Logger::new(LogLevel::Warning, threshold),
            error: Logger::new(LogLevel::Error, threshold),
        }
    }
}

impl Default for Loggers {
    fn default() -> Self {
        Self::with_threshold(LogLevel::Info)
    }
}
