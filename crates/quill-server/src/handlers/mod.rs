//! HTTP route handlers.

pub mod chat;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}
