//! Stand-in used without the `logging` feature: nothing is printed, but the `log` macros still
//! respect the global level.

use crate::log::LogSettings;

impl LogSettings {
    pub(in crate::log) fn install(&mut self) {
        log::set_max_level(self.level);
    }
}
