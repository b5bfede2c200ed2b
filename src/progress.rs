//! Progress reporting for role application runs
//!
//! Two modes: the default prints one line per updated path (primary program
//! output, useful for piping), silent mode replaces the stream with an
//! indicatif spinner that counts processed paths.

use crate::acl::{format_roles, RolePathMap};
use crate::stats::RunSummary;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Reporter consuming role updates from the pipeline's final stage.
pub struct Reporter {
    bar: Option<ProgressBar>,
}

impl Reporter {
    /// Create a reporter; `silent` swaps per-path lines for a spinner.
    #[must_use]
    pub fn new(silent: bool) -> Self {
        let bar = silent.then(|| {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(TICK_CHARS);
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Self { bar }
    }

    /// Report one applied path.
    pub fn applied(&self, update: &RolePathMap, count: u64) {
        match &self.bar {
            Some(bar) => bar.set_message(format!("{count} paths updated")),
            None => println!("{}: {}", update.path.display(), format_roles(&update.roles)),
        }
    }

    /// Tear down the display and print the end-of-run summary.
    pub fn finish(&self, summary: &RunSummary) {
        self.clear();
        println!(
            "{} paths found, {} roles applied, {} traverse applied, {} errors",
            summary.paths_found, summary.roles_applied, summary.traverse_applied, summary.errors
        );
    }

    /// Tear down the display without a summary, leaving the terminal clean.
    ///
    /// Used when a run ends early; the caller reports the cause instead.
    pub fn clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::acl::RoleMap;

    #[test]
    fn silent_reporter_holds_a_bar() {
        assert!(Reporter::new(true).bar.is_some());
        assert!(Reporter::new(false).bar.is_none());
    }

    #[test]
    fn clear_finishes_the_spinner() {
        let reporter = Reporter::new(true);
        reporter.applied(
            &RolePathMap {
                path: "/project/1".into(),
                roles: RoleMap::new(),
            },
            1,
        );
        reporter.clear();
        let bar = reporter.bar.as_ref().unwrap();
        assert!(bar.is_finished());
    }

    #[test]
    fn reporting_does_not_panic() {
        let reporter = Reporter::new(true);
        let update = RolePathMap {
            path: "/project/1".into(),
            roles: RoleMap::new(),
        };
        reporter.applied(&update, 1);
        reporter.finish(&RunSummary::default());
    }
}
