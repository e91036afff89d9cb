//! UploadService — the streaming upload pipeline. Each multipart file part
//! flows `request body -> progress relay -> disk writer` without ever holding
//! more than one chunk in memory; the relay counts bytes and publishes
//! rate-limited progress events to the subscriber named by the request.

use crate::models::progress::{ON_UPLOAD_EVENT, ProgressEvent};
use crate::services::progress_hub::{ProgressHub, ProgressPublisher};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, info};

/// Minimum milliseconds between progress events unless configured otherwise.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("malformed multipart payload: {0}")]
    Multipart(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Millisecond clock abstraction so the throttle can be driven by synthetic
/// timestamps in tests instead of intercepting process-wide time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock implementation used by the running server.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Decide whether a progress event may be emitted now.
///
/// Pure function of its inputs: eligible when no event was emitted yet, or
/// when at least `interval_ms` elapsed since the last one. The boundary is
/// inclusive, so `now - last == interval_ms` fires.
pub fn can_emit(last_emit_ms: Option<u64>, now_ms: u64, interval_ms: u64) -> bool {
    match last_emit_ms {
        None => true,
        Some(last) => now_ms.saturating_sub(last) >= interval_ms,
    }
}

/// Wrap a byte stream with progress accounting.
///
/// Every Ok chunk is forwarded unchanged after its length is added to the
/// running total; eligible chunk boundaries publish a `file-upload` event for
/// `subscriber_id`. The last-event timestamp is seeded from the clock at
/// construction, so a fresh transfer stays quiet until the first interval
/// elapses. The stage never forces a terminal publish on stream end — callers
/// wanting a guaranteed-final total must publish one themselves.
pub fn progress_relay<S>(
    stream: S,
    filename: String,
    subscriber_id: String,
    publisher: Arc<dyn ProgressPublisher>,
    interval_ms: u64,
    clock: Arc<dyn Clock>,
) -> impl Stream<Item = io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut processed_already: u64 = 0;
    let mut last_emit_ms = Some(clock.now_ms());

    stream.map(move |chunk| {
        if let Ok(bytes) = &chunk {
            processed_already += bytes.len() as u64;
            let now_ms = clock.now_ms();
            if can_emit(last_emit_ms, now_ms, interval_ms) {
                publisher.publish(
                    &subscriber_id,
                    ON_UPLOAD_EVENT,
                    ProgressEvent {
                        processed_already,
                        filename: filename.clone(),
                    },
                );
                last_emit_ms = Some(now_ms);
            }
        }
        chunk
    })
}

/// Consume a byte stream into `path`, create-or-truncate semantics.
///
/// Chunks are written in arrival order and the file is flushed and fsynced
/// before returning the byte count. On error the partially written file is
/// left on disk.
pub async fn write_stream_to_file<S>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut written: u64 = 0;

    pin_mut!(stream);
    while let Some(chunk_res) = stream.next().await {
        let chunk = chunk_res?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok(written)
}

/// UploadService drives one upload session end to end:
/// - composes the per-file pipeline (relay + disk writer) and awaits it,
/// - owns the downloads directory and the progress interval,
/// - carries the hub used both to publish events and to register subscribers.
///
/// Cloned freely as axum router state.
#[derive(Clone)]
pub struct UploadService {
    /// Flat directory where uploaded files land.
    pub downloads_dir: PathBuf,

    /// Minimum milliseconds between progress events per transfer.
    pub progress_interval_ms: u64,

    /// Pub/sub hub for realtime progress delivery.
    pub hub: Arc<ProgressHub>,

    clock: Arc<dyn Clock>,
}

impl UploadService {
    /// Create a service rooted at `downloads_dir` using the system clock.
    pub fn new(downloads_dir: impl Into<PathBuf>, progress_interval_ms: u64) -> Self {
        Self::with_clock(downloads_dir, progress_interval_ms, Arc::new(SystemClock))
    }

    /// Same as [`UploadService::new`] but with an injected clock.
    pub fn with_clock(
        downloads_dir: impl Into<PathBuf>,
        progress_interval_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            progress_interval_ms,
            hub: Arc::new(ProgressHub::new()),
            clock,
        }
    }

    /// Persist one file part from its byte stream.
    ///
    /// The stream is relayed through progress accounting for `subscriber_id`
    /// and written to `downloads_dir/file_name` (the client-supplied name is
    /// used verbatim as the destination basename). Resolves with the bytes
    /// written, or the first pipeline error; a failure aborts only this file.
    pub async fn save_file<S>(
        &self,
        subscriber_id: &str,
        file_name: &str,
        stream: S,
    ) -> UploadResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let destination = self.downloads_dir.join(file_name);
        debug!(
            file = %file_name,
            destination = %destination.display(),
            "starting file pipeline"
        );

        let relayed = progress_relay(
            stream,
            file_name.to_string(),
            subscriber_id.to_string(),
            self.hub.clone() as Arc<dyn ProgressPublisher>,
            self.progress_interval_ms,
            self.clock.clone(),
        );
        let written = write_stream_to_file(&destination, relayed).await?;

        info!(file = %file_name, bytes = written, "file uploaded");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Clock scripted with a fixed sequence of timestamps.
    struct ScriptedClock {
        times: Mutex<VecDeque<u64>>,
    }

    impl ScriptedClock {
        fn new(times: impl IntoIterator<Item = u64>) -> Arc<Self> {
            Arc::new(Self {
                times: Mutex::new(times.into_iter().collect()),
            })
        }
    }

    impl Clock for ScriptedClock {
        fn now_ms(&self) -> u64 {
            let mut times = self.times.lock().unwrap();
            times.pop_front().expect("scripted clock exhausted")
        }
    }

    /// Publisher that records every call instead of delivering anything.
    #[derive(Default)]
    struct RecordingPublisher {
        calls: Mutex<Vec<(String, String, ProgressEvent)>>,
    }

    impl RecordingPublisher {
        fn calls(&self) -> Vec<(String, String, ProgressEvent)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProgressPublisher for RecordingPublisher {
        fn publish(&self, subscriber_id: &str, event: &str, payload: ProgressEvent) {
            self.calls.lock().unwrap().push((
                subscriber_id.to_string(),
                event.to_string(),
                payload,
            ));
        }
    }

    fn ok_chunks(parts: &[&str]) -> Vec<io::Result<Bytes>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    #[test]
    fn gate_fires_when_nothing_was_emitted_yet() {
        assert!(can_emit(None, 0, 5000));
        assert!(can_emit(None, 123_456, 1));
    }

    #[test]
    fn gate_respects_the_minimum_interval() {
        let last = 1_000_000;
        assert!(!can_emit(Some(last), last + 999, 1000));
        assert!(can_emit(Some(last), last + 1000, 1000));
        assert!(can_emit(Some(last), last + 1001, 1000));
    }

    #[test]
    fn gate_tolerates_clock_going_backwards() {
        assert!(!can_emit(Some(2000), 1000, 500));
    }

    #[tokio::test]
    async fn relay_forwards_bytes_unchanged() {
        let publisher = Arc::new(RecordingPublisher::default());
        let clock = ScriptedClock::new([0, 0, 0, 0]);
        let source = stream::iter(ok_chunks(&["chunk", "of", "data"]));

        let relayed = progress_relay(
            source,
            "filename.txt".into(),
            "01".into(),
            publisher.clone(),
            0,
            clock,
        );
        let forwarded: Vec<Bytes> = relayed.map(|c| c.unwrap()).collect().await;

        let joined: Vec<u8> = forwarded.concat();
        assert_eq!(joined, b"chunkofdata");
        // interval 0: one publish per chunk boundary
        assert_eq!(publisher.calls().len(), 3);
    }

    #[tokio::test]
    async fn relay_throttles_to_two_events_across_three_chunks() {
        let day_ms: u64 = 1_631_000_000_000;
        // seed, then one reading per chunk: +2s, +3s, +4s
        let clock = ScriptedClock::new([
            day_ms,
            day_ms + 2_000,
            day_ms + 3_000,
            day_ms + 4_000,
        ]);
        let publisher = Arc::new(RecordingPublisher::default());
        let source = stream::iter(ok_chunks(&["hello", "hello", "world"]));

        let relayed = progress_relay(
            source,
            "filename.avi".into(),
            "01".into(),
            publisher.clone(),
            2000,
            clock,
        );
        relayed.for_each(|_| async {}).await;

        let calls = publisher.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, ON_UPLOAD_EVENT);
        assert_eq!(
            calls[0].2,
            ProgressEvent {
                processed_already: 5,
                filename: "filename.avi".into()
            }
        );
        assert_eq!(
            calls[1].2,
            ProgressEvent {
                processed_already: 15,
                filename: "filename.avi".into()
            }
        );
    }

    #[tokio::test]
    async fn relay_publishes_nothing_for_an_empty_stream() {
        let publisher = Arc::new(RecordingPublisher::default());
        let clock = ScriptedClock::new([0]);
        let source = stream::iter(Vec::<io::Result<Bytes>>::new());

        let relayed = progress_relay(source, "empty.bin".into(), "01".into(), publisher.clone(), 0, clock);
        relayed.for_each(|_| async {}).await;

        assert!(publisher.calls().is_empty());
    }

    #[tokio::test]
    async fn relay_ignores_error_chunks() {
        let publisher = Arc::new(RecordingPublisher::default());
        let clock = ScriptedClock::new([0, 0]);
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionAborted, "gone")),
        ];

        let relayed = progress_relay(
            stream::iter(chunks),
            "partial.bin".into(),
            "01".into(),
            publisher.clone(),
            0,
            clock,
        );
        let results: Vec<io::Result<Bytes>> = relayed.collect().await;

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        // only the Ok chunk produced an event
        let calls = publisher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2.processed_already, 3);
    }

    #[tokio::test]
    async fn writer_preserves_chunk_order_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let written = write_stream_to_file(&path, stream::iter(ok_chunks(&["hey", "dude"])))
            .await
            .unwrap();

        assert_eq!(written, 7);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"heydude");
    }

    #[tokio::test]
    async fn writer_creates_an_empty_file_for_an_empty_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");

        let written = write_stream_to_file(&path, stream::iter(Vec::<io::Result<Bytes>>::new()))
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn writer_overwrites_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("again.txt");

        write_stream_to_file(&path, stream::iter(ok_chunks(&["first version"])))
            .await
            .unwrap();
        write_stream_to_file(&path, stream::iter(ok_chunks(&["second"])))
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn writer_fails_when_the_directory_is_missing() {
        let path = Path::new("/definitely/not/a/real/dir/out.bin");
        let err = write_stream_to_file(path, stream::iter(ok_chunks(&["x"])))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn save_file_rejects_with_io_error_and_stops_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let service = UploadService::new(&missing, 0);
        let mut rx = service.hub.subscribe("01");

        let result = service
            .save_file("01", "file.bin", stream::iter(ok_chunks(&["data"])))
            .await;

        assert!(matches!(result, Err(UploadError::Io(_))));
        // File::create failed before any chunk was pulled through the relay.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn save_file_writes_into_the_downloads_dir() {
        let dir = tempfile::tempdir().unwrap();
        let service = UploadService::new(dir.path(), 0);

        let written = service
            .save_file("01", "mockFile.mov", stream::iter(ok_chunks(&["hey", "dude"])))
            .await
            .unwrap();

        assert_eq!(written, 7);
        let contents = tokio::fs::read(dir.path().join("mockFile.mov")).await.unwrap();
        assert_eq!(contents, b"heydude");
    }
}
