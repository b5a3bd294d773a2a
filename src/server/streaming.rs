//! Chunked `text/plain` responses for streamed generation.
//!
//! Each relay chunk becomes one body frame, written as soon as it arrives.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tokio_stream::StreamExt;

use crate::relay::ChunkStream;

/// Wrap a chunk stream in a streaming HTTP response.
pub fn chunked_text_response(chunks: ChunkStream) -> Response {
    let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}
