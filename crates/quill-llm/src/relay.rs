//! Completion relay: turns a stream's terminal events into a channel handoff.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use quill_core::{AgentError, CompletionOutcome, Usage};
use tokio::sync::oneshot;

use crate::{ChatStream, StreamChunk};

const DEFAULT_FINISH_REASON: &str = "stop";

/// Passthrough stream that accumulates the completion outcome.
///
/// The transport layer drains this exactly like the underlying stream; the
/// relay watches the chunks go by and, when the stream ends, fires the
/// paired [`oneshot`] channel once with the accumulated text, finish reason
/// and usage. Dropping the relay before the terminal event (client
/// disconnect) drops the sender, so the receiving side observes a closed
/// channel instead of hanging.
pub struct CompletionRelay {
    inner: ChatStream,
    text: String,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    tx: Option<oneshot::Sender<CompletionOutcome>>,
}

impl CompletionRelay {
    /// Wraps a chat stream, returning the passthrough stream and the
    /// receiver for its completion outcome.
    pub fn new(inner: ChatStream) -> (Self, oneshot::Receiver<CompletionOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self { inner, text: String::new(), finish_reason: None, usage: None, tx: Some(tx) },
            rx,
        )
    }

    fn complete(&mut self) {
        if let Some(tx) = self.tx.take() {
            let outcome = CompletionOutcome {
                text: std::mem::take(&mut self.text),
                finish_reason: self
                    .finish_reason
                    .take()
                    .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string()),
                usage: self.usage.take().unwrap_or_default(),
            };
            // The receiver may already be gone; nothing to do then.
            let _ = tx.send(outcome);
        }
    }
}

impl Stream for CompletionRelay {
    type Item = Result<StreamChunk, AgentError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                match &chunk {
                    StreamChunk::Content(text) => this.text.push_str(text),
                    StreamChunk::Finish(reason) => this.finish_reason = Some(reason.clone()),
                    StreamChunk::Usage(usage) => this.usage = Some(*usage),
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
