//! Shared test helpers for provider-backed adapters.

use deepdive_core::error::ProviderError;
use deepdive_core::message::{Message, MessageToolCall};
use deepdive_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    embeddings: Vec<Vec<f32>>,
    fail: bool,
    call_count: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            embeddings: Vec::new(),
            fail: false,
            call_count: Mutex::new(0),
        }
    }

    /// A provider whose embeddings endpoint returns `embeddings`.
    pub fn embeddings(embeddings: Vec<Vec<f32>>) -> Self {
        Self {
            embeddings,
            ..Self::new(vec![])
        }
    }

    /// A provider whose every call fails with a network error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        if self.fail {
            return Err(ProviderError::Network("connection refused".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("ScriptedProvider: no more responses");
        }
        Ok(responses.remove(0))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        if self.fail {
            return Err(ProviderError::Network("connection refused".into()));
        }
        Ok(EmbeddingResponse {
            embeddings: self.embeddings.clone(),
            model: request.model,
            usage: None,
        })
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response carrying tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut response = make_text_response("");
    response.message.tool_calls = tool_calls;
    response
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
