//! HTTP server.
//!
//! - [`api`]: Request/response types and route handlers
//! - [`streaming`]: Chunked text bodies for streamed generation

pub mod api;
pub mod streaming;
