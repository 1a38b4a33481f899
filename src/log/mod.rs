//! Diagnostic logging for fits and simulations. This is not to be confused with _reporting_
//! (`crate::report`), which writes fitted results to CSV files.
//!
//! The five `log` macros are re-exported here. The fitter uses `warn!` to surface optimizer
//! non-convergence, `info!` for fitted summaries and `trace!` for per-step progress.
//!
//! Logging is off until a level is set, either with `--log-level` on the command line or from
//! code:
//!
//! ```rust
//! use tsir::log::{set_log_level, set_module_filter, LevelFilter};
//!
//! set_log_level(LevelFilter::Info);
//! // Follow every optimizer iteration.
//! set_module_filter("tsir::optimize", LevelFilter::Trace);
//! ```
//!
//! With the `logging` feature messages go to stderr through `log4rs`. Without it only the
//! global level is kept.

#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

pub use log::{debug, error, info, trace, warn, LevelFilter};

#[cfg(feature = "logging")]
use log4rs::Handle;
use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

/// Module filters installed before anything is configured. The optimizer logs every line
/// search at debug level.
const DEFAULT_MODULE_FILTERS: [(&str, LevelFilter); 1] = [("tsir::optimize", LevelFilter::Info)];

static LOG_SETTINGS: LazyLock<Mutex<LogSettings>> = LazyLock::new(Mutex::default);

/// The process-wide logging state: a global level, per-module overrides keyed by module path
/// (e.g. `"tsir::tsir::fit"`), and the handle of the installed logger.
#[derive(Debug)]
pub(in crate::log) struct LogSettings {
    pub(in crate::log) level: LevelFilter,
    pub(in crate::log) modules: BTreeMap<String, LevelFilter>,
    #[cfg(feature = "logging")]
    handle: Option<Handle>,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: LevelFilter::Off,
            modules: DEFAULT_MODULE_FILTERS
                .iter()
                .map(|(module, level)| ((*module).to_string(), *level))
                .collect(),
            #[cfg(feature = "logging")]
            handle: None,
        }
    }
}

impl LogSettings {
    /// Applies `change` and reinstalls the logger if anything changed.
    fn update(&mut self, change: impl FnOnce(&mut Self) -> bool) {
        if change(self) {
            self.install();
        }
    }
}

fn settings() -> MutexGuard<'static, LogSettings> {
    LOG_SETTINGS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shows every message not filtered per module.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the level for modules without their own filter. `LevelFilter::Off` silences them.
pub fn set_log_level(level: LevelFilter) {
    settings().update(|s| {
        s.level = level;
        true
    });
}

pub fn set_module_filter(module_path: &str, level: LevelFilter) {
    set_module_filters(&[(module_path, level)]);
}

/// Sets several module filters with a single logger reinstall.
pub fn set_module_filters(filters: &[(&str, LevelFilter)]) {
    settings().update(|s| {
        let mut changed = false;
        for (module, level) in filters {
            changed |= s.modules.insert((*module).to_string(), *level) != Some(*level);
        }
        changed
    });
}

/// Drops a module's filter so the global level applies to it again.
pub fn remove_module_filter(module_path: &str) {
    settings().update(|s| s.modules.remove(module_path).is_some());
}
