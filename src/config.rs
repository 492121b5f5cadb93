// SPDX-License-Identifier: Apache-2.0

//! Configuration for the import loop.

use std::path::PathBuf;
use std::time::Duration;

use crate::bookmark::Bookmarker;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// The EVE log file to follow.
    pub input: PathBuf,
    /// Start at the end of the file when no valid bookmark exists.
    pub end: bool,
    /// Exit on the first end of data instead of following.
    pub oneshot: bool,
    /// Record reader position after each accepted event.
    pub bookmark: bool,
    /// Bookmark file location; `<input>.bookmark` when unset.
    pub bookmark_path: Option<PathBuf>,
    /// Sink target; stdout when unset.
    pub output: Option<PathBuf>,
    /// Sleep between polls after reaching end of data.
    pub backoff: Duration,
    /// Interval between stats lines and sink flushes.
    pub stats_interval: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            end: false,
            oneshot: false,
            bookmark: false,
            bookmark_path: None,
            output: None,
            backoff: Duration::from_millis(100),
            stats_interval: Duration::from_secs(1),
        }
    }
}

impl ImportConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.input.as_os_str().is_empty() {
            return Err("An input file must be specified".to_string());
        }
        if self.bookmark_path.is_some() && !self.bookmark {
            return Err("--bookmark-path requires --bookmark".to_string());
        }
        if self.stats_interval.is_zero() {
            return Err("The stats interval must be non-zero".to_string());
        }
        Ok(())
    }

    /// The effective bookmark file location.
    pub fn bookmark_path(&self) -> PathBuf {
        self.bookmark_path
            .clone()
            .unwrap_or_else(|| Bookmarker::default_path(&self.input))
    }
}
