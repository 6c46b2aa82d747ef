//! Progress bars keyed by download identity

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Manages one progress bar per in-flight download
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    quiet: bool,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            quiet: false,
        }
    }

    /// Tracker that draws nothing, for machine-readable output
    pub fn hidden() -> Self {
        Self {
            quiet: true,
            ..Self::new()
        }
    }

    fn bar(&self, identity: &str) -> ProgressBar {
        let mut bars = self.bars.lock();
        if let Some(pb) = bars.get(identity) {
            return pb.clone();
        }

        let pb = if self.quiet {
            ProgressBar::hidden()
        } else {
            self.multi.add(ProgressBar::new(0))
        };
        if let Ok(template) = ProgressStyle::default_bar().template(
            "{spinner:.green} {msg:20} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        ) {
            pb.set_style(template.progress_chars("█▓▒░  "));
        }
        pb.set_message(identity.to_string());
        bars.insert(identity.to_string(), pb.clone());
        pb
    }

    /// Apply a progress sample
    pub fn update(&self, identity: &str, total: u64, downloaded: u64) {
        let pb = self.bar(identity);
        if total > 0 {
            pb.set_length(total);
        }
        pb.set_position(downloaded);
    }

    pub fn finish(&self, identity: &str) {
        if let Some(pb) = self.bars.lock().remove(identity) {
            pb.finish_with_message(format!("{} {}", style("✓").green().bold(), identity));
        }
    }

    pub fn fail(&self, identity: &str, message: &str) {
        if let Some(pb) = self.bars.lock().remove(identity) {
            pb.abandon_with_message(format!("{} {}: {}", style("✗").red().bold(), identity, message));
        }
    }

    /// Clear all remaining bars
    pub fn clear(&self) {
        for (_, pb) in self.bars.lock().drain() {
            pb.finish_and_clear();
        }
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}
