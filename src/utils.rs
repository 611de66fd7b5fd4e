//! Utility functions shared across modules

use std::path::Path;
use walkdir::WalkDir;

/// Format bytes for human readability (e.g., 1048576 -> "1.00 MB")
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format a duration in seconds with one decimal place (e.g., "12.3s")
pub fn format_secs(duration: std::time::Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

/// Normalize a path string so the same root hashes the same on every
/// platform.
///
/// Separators become forward slashes and a trailing slash is dropped. Case
/// is kept: `/code/App` and `/code/app` are different trees on
/// case-sensitive filesystems.
///
/// ```
/// use zoekt_code_search::utils::normalize_path_separators;
///
/// assert_eq!(normalize_path_separators("C:\\Users\\Dev\\"), "C:/Users/Dev");
/// assert_eq!(normalize_path_separators("/home/dev/"), "/home/dev");
/// ```
pub fn normalize_path_separators(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match normalized.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => normalized,
    }
}

/// Total size in bytes of all regular files below `dir`.
///
/// Unreadable entries are skipped; a missing directory measures as zero.
pub fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}
