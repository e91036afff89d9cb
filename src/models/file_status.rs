//! Represents one entry of the download listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status row for a previously uploaded file.
///
/// Mirrors what the front end renders in its downloads table: the file name,
/// a humanized size, the creation timestamp, and the owning OS user.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    /// File name relative to the downloads directory.
    pub file: String,

    /// Humanized size, e.g. `"723 B"` or `"1.5 kB"`.
    pub size: String,

    /// Creation timestamp; falls back to mtime on filesystems without one.
    pub last_modified: DateTime<Utc>,

    /// OS user owning the server process.
    pub owner: String,
}
