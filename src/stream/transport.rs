use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::{debug, error, warn};

use crate::errors::AppError;
use crate::models::ChatRequest;

/// Default path of the relay's chat endpoint.
pub const DEFAULT_RELAY_URL: &str = "http://localhost:3001/api/chat";

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Opens one streaming chat-completion call.
///
/// Implementations resolve once response headers arrive: to the live body on
/// a 2xx status, or to [`AppError::UpstreamStatus`] carrying the full error
/// body otherwise. Dropping the returned future or stream aborts the call.
pub trait ChatTransport: Send + Sync + 'static {
    fn open(&self, request: ChatRequest) -> BoxFuture<'_, Result<ByteStream, AppError>>;
}

/// [`ChatTransport`] that posts to the credential-holding relay.
#[derive(Clone)]
pub struct RelayTransport {
    client: Client,
    url: String,
}

impl RelayTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: Client::new(), url: url.into() }
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for RelayTransport {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_URL)
    }
}

impl ChatTransport for RelayTransport {
    fn open(&self, request: ChatRequest) -> BoxFuture<'_, Result<ByteStream, AppError>> {
        Box::pin(async move {
            debug!(model = %request.model, messages = request.messages.len(), "Opening relay stream");

            let response = self.client.post(&self.url).json(&request).send().await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|e| {
                    warn!(model = %request.model, "Could not read relay error body: {e}");
                    String::new()
                });
                error!(model = %request.model, "Relay returned {status}: {body}");
                return Err(AppError::UpstreamStatus { status: status.as_u16(), body });
            }

            let body = response
                .bytes_stream()
                .map_err(std::io::Error::other)
                .boxed();
            Ok(body)
        })
    }
}
