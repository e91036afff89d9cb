//! Defines routes for the file-sharing API.
//!
//! ## Structure
//! - **Upload**
//!   - `POST    /upload?socketId=<id>` — streaming multipart upload
//!   - `OPTIONS /upload` — CORS preflight
//!
//! - **Downloads**
//!   - `GET /files` — list uploaded files
//!   - `GET /files/{filename}` — stream one file back out
//!
//! - **Realtime**
//!   - `GET /events/{socket_id}` — SSE feed of upload-progress events
//!
//! Unknown routes fall back to an empty 204, and every response carries
//! `Access-Control-Allow-Origin: *` for the browser front end.

use crate::{
    handlers::{
        file_handlers::{
            default_route, download_file, list_files, preflight, subscribe_events, upload_files,
        },
        health_handlers::{healthz, readyz},
    },
    services::upload_service::UploadService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    middleware,
    response::Response,
    routing::{get, post},
};

/// Build and return the router for all routes.
///
/// The router carries shared state (`UploadService`) to all handlers. The
/// default request-body limit is disabled: upload size is intentionally
/// unbounded and the pipeline streams instead of buffering.
pub fn routes() -> Router<UploadService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload pipeline
        .route("/upload", post(upload_files).options(preflight))
        // download list + file retrieval
        .route("/files", get(list_files))
        .route("/files/{filename}", get(download_file))
        // realtime progress feed
        .route("/events/{socket_id}", get(subscribe_events))
        .fallback(default_route)
        .layer(DefaultBodyLimit::disable())
        .layer(middleware::map_response(allow_any_origin))
}

/// Mirror the original front end's expectation that every response is
/// callable from any origin.
async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
