//! Request/response DTOs for the chat endpoint.

use quill_core::Message;
use serde::Deserialize;

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub messages: Vec<Message>,
}
