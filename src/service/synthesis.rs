use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::AppError;
use crate::models::{ChatMessage, ChatRequest};
use crate::stream::streamer::{stream_response, StreamEvent, StreamOutcome};
use crate::stream::transport::ChatTransport;

pub const DEFAULT_SYNTHESIS_MODEL: &str = "anthropic/claude-sonnet-4";

const SYNTHESIS_PREAMBLE: &str =
    "Several AI models were asked the same question. Their responses follow.";

const SYNTHESIS_INSTRUCTION: &str = "Synthesize these responses into a single, superior answer. \
Combine the best insights from each response, correct any errors or contradictions you find, \
and make the result as comprehensive and coherent as possible.";

/// A finished panel response offered as synthesis input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelResult {
    pub display_name: String,
    pub text: String,
}

/// Builds the composite prompt: every response labeled with its model's
/// display name, followed by the fixed synthesis instruction.
pub fn build_synthesis_prompt(results: &[PanelResult]) -> Result<String, AppError> {
    let usable: Vec<&PanelResult> = results.iter().filter(|r| !r.text.trim().is_empty()).collect();
    if usable.is_empty() {
        return Err(AppError::NothingToSynthesize);
    }

    let mut prompt = String::from(SYNTHESIS_PREAMBLE);
    prompt.push_str("\n\n");
    for result in usable {
        prompt.push_str(&format!("=== Response from {} ===\n", result.display_name));
        prompt.push_str(&result.text);
        prompt.push_str("\n\n");
    }
    prompt.push_str(SYNTHESIS_INSTRUCTION);
    Ok(prompt)
}

/// Streams one combined answer from a fixed synthesis model.
pub struct SynthesisRequester<T: ChatTransport> {
    transport: Arc<T>,
    model: String,
}

impl<T: ChatTransport> SynthesisRequester<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport, model: DEFAULT_SYNTHESIS_MODEL.to_string() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Fails with a validation error, before any network call, when no
    /// result carries text. Web search is always off for synthesis.
    pub async fn synthesize<F>(
        &self,
        results: &[PanelResult],
        cancel: &CancellationToken,
        on_event: F,
    ) -> Result<StreamOutcome, AppError>
    where
        F: FnMut(StreamEvent),
    {
        let prompt = build_synthesis_prompt(results)?;
        info!(model = %self.model, inputs = results.len(), "Requesting synthesis");

        let request = ChatRequest::new(&self.model, vec![ChatMessage::user(prompt)]).with_web_search(false);
        Ok(stream_response(self.transport.as_ref(), request, cancel, on_event).await)
    }
}
