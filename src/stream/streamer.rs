use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::models::ChatRequest;
use crate::stream::decoder::decode_fragments;
use crate::stream::transport::ChatTransport;

/// Incremental progress of one model call, delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Response headers arrived with a success status.
    Started,
    Delta(String),
    Completed(String),
    Failed(String),
}

/// How a model call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed(String),
    Failed(String),
    Cancelled,
}

impl StreamOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamOutcome::Cancelled)
    }
}

/// Drives one model call end-to-end.
///
/// `on_event` sees `Started`, every fragment as `Delta`, then exactly one of
/// `Completed`/`Failed`. Once `cancel` fires nothing more is reported and the
/// partial text is dropped; the pending request or body read is abandoned at
/// once, which closes the connection. Failures are never retried.
pub async fn stream_response<T, F>(
    transport: &T,
    request: ChatRequest,
    cancel: &CancellationToken,
    mut on_event: F,
) -> StreamOutcome
where
    T: ChatTransport + ?Sized,
    F: FnMut(StreamEvent),
{
    let model = request.model.clone();

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return cancelled(&model),
        opened = transport.open(request) => opened,
    };

    let body = match opened {
        Ok(body) => body,
        Err(e) => return fail(&model, e, &mut on_event),
    };
    if cancel.is_cancelled() {
        return cancelled(&model);
    }
    on_event(StreamEvent::Started);

    let mut fragments = std::pin::pin!(decode_fragments(body));
    let mut accumulated = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(&model),
            next = fragments.next() => next,
        };
        match next {
            Some(Ok(fragment)) => {
                accumulated.push_str(&fragment);
                on_event(StreamEvent::Delta(fragment));
            }
            Some(Err(e)) => return fail(&model, e, &mut on_event),
            None => break,
        }
    }

    info!(model = %model, chars = accumulated.len(), "Stream completed");
    on_event(StreamEvent::Completed(accumulated.clone()));
    StreamOutcome::Completed(accumulated)
}

fn fail<F: FnMut(StreamEvent)>(model: &str, err: AppError, on_event: &mut F) -> StreamOutcome {
    if err.is_transport() {
        warn!(model = %model, "Stream failed: {err}");
    } else {
        error!(model = %model, "Stream could not start: {err}");
    }
    let message = err.to_string();
    on_event(StreamEvent::Failed(message.clone()));
    StreamOutcome::Failed(message)
}

fn cancelled(model: &str) -> StreamOutcome {
    debug!(model = %model, "Stream cancelled");
    StreamOutcome::Cancelled
}
