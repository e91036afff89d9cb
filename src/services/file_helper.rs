//! Directory-listing helper backing the download list.

use crate::models::file_status::FileStatus;
use chrono::{DateTime, Utc};
use std::{env, io, path::Path};
use tokio::fs;
use tracing::debug;

/// Collect the status of every regular file in `dir`.
///
/// Sizes are humanized with decimal units, timestamps prefer the creation
/// time and fall back to mtime where the filesystem does not track it, and
/// the owner is taken from the `USER` environment variable. Subdirectories
/// are skipped.
pub async fn list_statuses(dir: &Path) -> io::Result<Vec<FileStatus>> {
    let owner = env::var("USER").unwrap_or_else(|_| "unknown".into());
    let mut statuses = Vec::new();

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        let file = entry.file_name().to_string_lossy().into_owned();
        let timestamp = metadata.created().or_else(|_| metadata.modified())?;
        statuses.push(FileStatus {
            file,
            size: humanize_size(metadata.len()),
            last_modified: DateTime::<Utc>::from(timestamp),
            owner: owner.clone(),
        });
    }

    statuses.sort_by(|a, b| a.file.cmp(&b.file));
    debug!(dir = %dir.display(), count = statuses.len(), "listed downloads");
    Ok(statuses)
}

/// Format a byte count with decimal units: `723 B`, `1.5 kB`, `2.31 MB`.
pub fn humanize_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];

    if bytes < 1000 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    let rendered = format!("{:.2}", value);
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_humanized_with_decimal_units() {
        assert_eq!(humanize_size(0), "0 B");
        assert_eq!(humanize_size(723), "723 B");
        assert_eq!(humanize_size(1000), "1 kB");
        assert_eq!(humanize_size(1500), "1.5 kB");
        assert_eq!(humanize_size(2_310_000), "2.31 MB");
    }

    #[tokio::test]
    async fn listing_reports_name_size_and_owner() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("file.png"), vec![0u8; 723])
            .await
            .unwrap();

        let statuses = list_statuses(dir.path()).await.unwrap();

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].file, "file.png");
        assert_eq!(statuses[0].size, "723 B");
        assert!(!statuses[0].owner.is_empty());
    }

    #[tokio::test]
    async fn listing_skips_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"a").await.unwrap();

        let statuses = list_statuses(dir.path()).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].file, "a.txt");
    }

    #[tokio::test]
    async fn listing_an_empty_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_statuses(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_a_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        assert!(list_statuses(&missing).await.is_err());
    }
}
