//! Core data models for the file-sharing service.
//!
//! These entities describe what crosses the wire: throttled upload-progress
//! events pushed to subscribers, and the per-file status rows returned by the
//! download listing. Both serialize as camelCase JSON via `serde`.

pub mod file_status;
pub mod progress;
