//! Build timing utilities.

use std::time::Instant;

use crate::ui::Ui;

/// Measures how long a build phase took.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Report the elapsed time through `ui`.
    pub fn finish(self, ui: &Ui) {
        ui.info(format_elapsed(&self.name, self.start.elapsed().as_secs_f64()));
    }
}

fn format_elapsed(name: &str, secs: f64) -> String {
    if secs >= 60.0 {
        format!("{} took {:.1}m", name, secs / 60.0)
    } else {
        format!("{} took {:.1}s", name, secs)
    }
}
