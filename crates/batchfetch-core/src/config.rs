//! Settings loading

use crate::error::FetchError;
use batchfetch_types::Settings;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::engine::TransferOptions;

/// Load settings from a JSON file. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings, FetchError> {
    if !path.exists() {
        debug!("No settings file at {:?}, using defaults", path);
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings = serde_json::from_str(&content)?;
    Ok(settings)
}

/// Save settings as pretty-printed JSON, creating parent directories.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), FetchError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

/// Transfer options derived from settings and the live connection timeout
pub(crate) fn transfer_options(settings: &Settings, connection_timeout_secs: u32) -> TransferOptions {
    TransferOptions {
        connect_timeout: Duration::from_secs(u64::from(connection_timeout_secs)),
        stall_timeout: Duration::from_secs(u64::from(settings.stall_timeout_secs.max(1))),
        max_redirects: settings.max_redirects as usize,
        user_agent: settings.user_agent.clone(),
    }
}
