//! Logging setup
//!
//! 런타임 이벤트는 `tracing`으로 남기며 target으로 구분한다:
//!
//! - `pool`: checkout, return, overdue reclaim, ping, waits
//! - `cache`: hit ratio, evictions, lock timeouts
//! - `scripting`: trim results
//! - `executor`: rendered statements
//!
//! A subscriber is only installed with the `logging` feature; without it the
//! init functions are no-ops and `tracing` stays zero-cost.

use std::fmt;

/// Per-target log levels turned into an `EnvFilter` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTargets {
    pub default: &'static str,
    pub pool: Option<&'static str>,
    pub cache: Option<&'static str>,
    pub scripting: Option<&'static str>,
    pub executor: Option<&'static str>,
}

impl Default for LogTargets {
    fn default() -> Self {
        Self {
            default: "info",
            pool: None,
            cache: None,
            scripting: None,
            executor: None,
        }
    }
}

impl LogTargets {
    /// Every runtime target at `level`.
    pub fn all(level: &'static str) -> Self {
        Self {
            default: level,
            pool: Some(level),
            cache: Some(level),
            scripting: Some(level),
            executor: Some(level),
        }
    }

    pub fn directive(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default)?;
        let targets = [
            ("pool", self.pool),
            ("cache", self.cache),
            ("scripting", self.scripting),
            ("executor", self.executor),
        ];
        for (target, level) in targets {
            if let Some(level) = level {
                write!(f, ",{target}={level}")?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt as subscriber};

/// Installs a subscriber at `info`; `RUST_LOG` wins when set.
///
/// ```rust
/// batis_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with(&LogTargets::default())
}

/// Installs a subscriber with per-target levels, e.g. pool waits at debug.
#[cfg(feature = "logging")]
pub fn init_with(targets: &LogTargets) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(targets.directive()));

    let _ = subscriber()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

/// Debug output captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = subscriber()
        .with_env_filter(EnvFilter::new(LogTargets::all("debug").directive()))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with(_targets: &LogTargets) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_lists_overridden_targets() {
        let targets = LogTargets {
            pool: Some("debug"),
            cache: Some("trace"),
            ..LogTargets::default()
        };
        assert_eq!(targets.directive(), "info,pool=debug,cache=trace");
        assert_eq!(LogTargets::default().directive(), "info");
    }

    #[test]
    fn init_is_idempotent() {
        init_test();
        init_test();
        init_with(&LogTargets::all("warn"));
    }
}
