//! In-memory transport used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::{stream, StreamExt};

use crate::errors::AppError;
use crate::models::ChatRequest;
use crate::stream::transport::{ByteStream, ChatTransport};

pub fn sse_frame(content: &str) -> String {
    let chunk = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {chunk}\n\n")
}

#[derive(Debug, Clone)]
pub enum Reply {
    Body { chunks: Vec<Bytes>, hang: bool },
    Status(u16, String),
    HangBeforeHeaders,
}

impl Reply {
    pub fn fragments<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut chunks: Vec<Bytes> =
            parts.into_iter().map(|p| Bytes::from(sse_frame(p.as_ref()))).collect();
        chunks.push(Bytes::from_static(b"data: [DONE]\n\n"));
        Reply::Body { chunks, hang: false }
    }

    /// Emits `parts`, then never yields again until dropped.
    pub fn fragments_then_hang<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chunks = parts.into_iter().map(|p| Bytes::from(sse_frame(p.as_ref()))).collect();
        Reply::Body { chunks, hang: true }
    }

    pub fn status(code: u16, body: &str) -> Self {
        Reply::Status(code, body.to_string())
    }
}

/// Replays queued replies per model id and records every request.
/// Models without a queued reply answer `"<model> #<call number>"`.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, model: &str, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ChatTransport for ScriptedTransport {
    fn open(&self, request: ChatRequest) -> BoxFuture<'_, Result<ByteStream, AppError>> {
        let call_number = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.model)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Reply::fragments([format!("{} #{call_number}", request.model)]));

        Box::pin(async move {
            match reply {
                Reply::Body { chunks, hang } => {
                    let body = stream::iter(chunks.into_iter().map(Ok::<Bytes, std::io::Error>));
                    if hang {
                        Ok(body.chain(stream::pending()).boxed())
                    } else {
                        Ok(body.boxed())
                    }
                }
                Reply::Status(status, body) => Err(AppError::UpstreamStatus { status, body }),
                Reply::HangBeforeHeaders => future::pending().await,
            }
        })
    }
}
