use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::AssistantMessage;
use crate::providers::base::{CompletionRequest, Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<AssistantMessage>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    usage: Usage,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<AssistantMessage>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
            usage: Usage::default(),
        }
    }

    /// Report the same usage for every turn
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<(AssistantMessage, Usage)> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok((AssistantMessage::new().with_text(""), self.usage.clone()))
        } else {
            Ok((responses.remove(0), self.usage.clone()))
        }
    }
}
