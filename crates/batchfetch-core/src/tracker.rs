//! Per-transfer progress record

/// Bytes downloaded versus expected for one in-flight transfer.
///
/// `total == 0` means the size is not known yet; the transfer has not
/// reported any progress. Once `total` is set, `downloaded <= total`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    pub identity: String,
    pub url: String,
    pub downloaded: u64,
    pub total: u64,
    /// Destination directory, trailing separator included
    pub dir: String,
    /// Final file name inside `dir`
    pub name: String,
}

impl ProgressTracker {
    pub fn new(url: &str, identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Final destination path; empty for memory transfers
    pub fn destination(&self) -> String {
        format!("{}{}", self.dir, self.name)
    }

    /// Record a progress sample. The expected size is captured once, from
    /// the first sample that reports one. Returns whether `downloaded`
    /// changed.
    pub fn record(&mut self, total: u64, downloaded: u64) -> bool {
        if self.total == 0 {
            self.total = total;
        }
        if self.downloaded == downloaded {
            return false;
        }
        self.downloaded = downloaded;
        true
    }

    /// A unit counts as complete only when a known size was fully received
    pub fn is_complete(&self) -> bool {
        self.total != 0 && self.downloaded >= self.total
    }
}
