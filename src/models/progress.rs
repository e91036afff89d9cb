//! Progress events published while a file upload is in flight.

use serde::{Deserialize, Serialize};

/// Event name used for every upload-progress publication.
pub const ON_UPLOAD_EVENT: &str = "file-upload";

/// A snapshot of one in-flight file transfer.
///
/// Published 0..N times per file, gated by the session's minimum interval.
/// `processed_already` counts bytes already forwarded down the pipeline and
/// is non-decreasing across the events of a single transfer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Running byte total at the moment of publication.
    pub processed_already: u64,

    /// Destination file name, as supplied by the multipart part.
    pub filename: String,
}
