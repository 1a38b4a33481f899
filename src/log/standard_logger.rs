use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

use crate::log::LogSettings;

/// ISO 8601 timestamp, colored level, module path.
const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

impl LogSettings {
    /// Installs a stderr logger with these settings, or reconfigures the one installed.
    pub(in crate::log) fn install(&mut self) {
        let stderr = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .target(Target::Stderr)
            .build();
        let loggers = self
            .modules
            .iter()
            .map(|(module, level)| Logger::builder().build(module.clone(), *level));
        let config = Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(stderr)))
            .loggers(loggers)
            .build(Root::builder().appender("stderr").build(self.level));
        let Ok(config) = config else {
            // Only duplicate appender or logger names are rejected.
            return;
        };

        match self.handle {
            Some(ref handle) => handle.set_config(config),
            // Another logger may already be installed by the host application.
            None => self.handle = log4rs::init_config(config).ok(),
        }
    }
}
