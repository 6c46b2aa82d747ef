//! Destination path helpers
//!
//! Destinations are plain strings that may use either `/` or `\` as the
//! separator, so splitting happens on the string before anything touches
//! the filesystem.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of the working file a transfer writes into
pub const TEMP_EXT: &str = ".temp";

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Split a destination into its directory (separator included) and file name.
///
/// Returns `None` when the path holds no separator at all.
pub fn split_destination(path: &str) -> Option<(String, String)> {
    let found = path.rfind(is_separator)?;
    Some((path[..=found].to_string(), path[found + 1..].to_string()))
}

/// Working-file path for a destination
pub fn temp_path(destination: &str) -> String {
    format!("{}{}", destination, TEMP_EXT)
}

/// File name of a URL: everything after its last separator, without query
/// or fragment, percent-decoded. Empty when the URL has no separator.
pub fn file_name_from_url(url: &str) -> String {
    let Some(found) = url.rfind(is_separator) else {
        return String::new();
    };
    let tail = &url[found + 1..];
    let tail = tail.split(['?', '#']).next().unwrap_or_default();
    match urlencoding::decode(tail) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => tail.to_string(),
    }
}

/// Turn a destination string into a path the OS can open
#[cfg(windows)]
pub fn suitable_open_path(path: &str) -> PathBuf {
    PathBuf::from(path)
}

/// Turn a destination string into a path the OS can open
#[cfg(not(windows))]
pub fn suitable_open_path(path: &str) -> PathBuf {
    PathBuf::from(path.replace('\\', "/"))
}

/// Create `dir` and its parents if missing
pub fn ensure_directory(dir: &str) -> io::Result<()> {
    let path = suitable_open_path(dir);
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    debug!("Creating directory {:?}", path);
    std::fs::create_dir_all(&path)
}

/// Rename `dir/old_name` to `dir/new_name`, replacing any existing file
pub fn rename_in(dir: &str, old_name: &str, new_name: &str) -> io::Result<()> {
    let from = suitable_open_path(&format!("{}{}", dir, old_name));
    let to = suitable_open_path(&format!("{}{}", dir, new_name));
    std::fs::rename(from, to)
}

/// Remove a file, treating an already-missing file as success
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_either_separator() {
        assert_eq!(
            split_destination("cache/packs/a.bin"),
            Some(("cache/packs/".to_string(), "a.bin".to_string()))
        );
        assert_eq!(
            split_destination(r"C:\cache\a.bin"),
            Some((r"C:\cache\".to_string(), "a.bin".to_string()))
        );
        assert_eq!(
            split_destination(r"cache\sub/a.bin"),
            Some((r"cache\sub/".to_string(), "a.bin".to_string()))
        );
    }

    #[test]
    fn test_split_without_separator_fails() {
        assert_eq!(split_destination("a.bin"), None);
        assert_eq!(split_destination(""), None);
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("http://host/dir/file.zip"), "file.zip");
        assert_eq!(file_name_from_url("http://host/dir/my%20file.zip?x=1#top"), "my file.zip");
        assert_eq!(file_name_from_url("http://host/dir/"), "");
        assert_eq!(file_name_from_url("nothing"), "");
    }

    #[test]
    fn test_rename_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let base = format!("{}/", dir.path().display());
        std::fs::write(dir.path().join("a.bin.temp"), b"new").unwrap();
        std::fs::write(dir.path().join("a.bin"), b"old").unwrap();

        rename_in(&base, "a.bin.temp", "a.bin").unwrap();

        assert_eq!(std::fs::read(dir.path().join("a.bin")).unwrap(), b"new");
        assert!(!dir.path().join("a.bin.temp").exists());
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_if_exists(&dir.path().join("ghost")).is_ok());
    }
}
