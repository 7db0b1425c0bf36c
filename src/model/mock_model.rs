//! # Mock Completion Model for Testing
//!
//! Provides a `MockCompletionModel` that implements the `CompletionModel` trait
//! for tests. It returns a canned text answer or a provider error and counts how
//! often it was called.

use rig::{
    completion::{
        AssistantContent, CompletionError, CompletionModel, CompletionRequest, CompletionResponse,
    },
    one_or_many::OneOrMany,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum Canned {
    Text(String),
    Error(String),
}

/// A mock completion model for testing purposes.
#[derive(Debug, Clone)]
pub struct MockCompletionModel {
    response: Arc<Mutex<Option<Canned>>>,
    calls: Arc<AtomicUsize>,
}

impl MockCompletionModel {
    /// Creates a new mock model that answers with empty text.
    pub fn new() -> Self {
        Self {
            response: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer every request with `text`.
    pub async fn set_text_response(&self, text: &str) {
        *self.response.lock().await = Some(Canned::Text(text.to_string()));
    }

    /// Fail every request with a provider error.
    pub async fn set_error(&self, message: &str) {
        *self.response.lock().await = Some(Canned::Error(message.to_string()));
    }

    /// Number of completion requests received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockCompletionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionModel for MockCompletionModel {
    type Response = String;

    async fn completion(
        &self,
        _completion_request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = { self.response.lock().await.clone() };
        match response {
            Some(Canned::Error(message)) => Err(CompletionError::ProviderError(message)),
            Some(Canned::Text(text)) => Ok(CompletionResponse {
                choice: OneOrMany::one(AssistantContent::text(text)),
                raw_response: String::new(),
            }),
            None => Ok(CompletionResponse {
                choice: OneOrMany::one(AssistantContent::text("")),
                raw_response: String::new(),
            }),
        }
    }
}
