//! HTTP handlers for the upload, listing, download, and progress-feed routes.
//! Request bodies are streamed straight into the upload pipeline so a file is
//! never buffered whole in memory; storage concerns live in `UploadService`.

use crate::{
    errors::AppError,
    services::{
        file_helper,
        upload_service::{UploadError, UploadService},
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde_json::json;
use std::{convert::Infallible, io};
use tokio::{fs::File, sync::broadcast::error::RecvError};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Query params accepted by the upload route.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Subscriber channel that receives this upload's progress events.
    #[serde(rename = "socketId")]
    pub socket_id: String,
}

/// POST `/upload?socketId=<id>` — streaming multipart upload.
///
/// Walks the multipart fields in arrival order; every field carrying a file
/// name is piped through the progress relay into the downloads directory.
/// Fields without a file name are skipped. Any pipeline failure aborts the
/// request with the mapped status instead of being swallowed.
pub async fn upload_files(
    State(service): State<UploadService>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|err| UploadError::Multipart(err.to_string()))?;
        let Some(field) = field else { break };

        let Some(file_name) = field.file_name().map(str::to_owned) else {
            debug!(field = ?field.name(), "skipping non-file multipart field");
            continue;
        };
        info!(
            field = ?field.name(),
            file = %file_name,
            subscriber = %query.socket_id,
            "receiving file part"
        );

        let byte_stream =
            field.map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));
        service
            .save_file(&query.socket_id, &file_name, byte_stream)
            .await?;
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "result": "Files uploaded with success! " })),
    ))
}

/// OPTIONS `/upload` — CORS preflight, empty 204.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET `/files` — list previously uploaded files.
pub async fn list_files(
    State(service): State<UploadService>,
) -> Result<impl IntoResponse, AppError> {
    let statuses = file_helper::list_statuses(&service.downloads_dir)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?;
    Ok(Json(statuses))
}

/// GET `/files/{filename}` — stream one uploaded file back out.
pub async fn download_file(
    State(service): State<UploadService>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    // Uploads keep client-supplied names verbatim, but the read side never
    // serves anything outside the downloads directory.
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(AppError::not_found(format!("file `{}` not found", filename)));
    }

    let path = service.downloads_dir.join(&filename);
    let file = File::open(&path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            AppError::not_found(format!("file `{}` not found", filename))
        } else {
            AppError::internal(err.to_string())
        }
    })?;

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
    {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

/// GET `/events/{socket_id}` — server-sent progress feed for one subscriber.
///
/// Each published progress event becomes one SSE message named after the
/// event (`file-upload`) with the JSON payload as data. Lagged receivers
/// skip ahead; the stream ends only when the hub is dropped.
pub async fn subscribe_events(
    State(service): State<UploadService>,
    Path(socket_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = service.hub.subscribe(&socket_id);
    debug!(subscriber = %socket_id, "progress feed attached");

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(message) => match Event::default()
                    .event(&message.event)
                    .json_data(&message.payload)
                {
                    Ok(event) => return Some((Ok::<_, Infallible>(event), receiver)),
                    Err(err) => {
                        warn!("failed to encode progress event: {}", err);
                        continue;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Fallback for unknown routes, mirroring the front end's expectations: an
/// empty 204 rather than a 404 error page.
pub async fn default_route() -> StatusCode {
    StatusCode::NO_CONTENT
}
