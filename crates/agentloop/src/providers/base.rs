use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::{AssistantMessage, Message};
use crate::models::tool::{ResponseFormat, ToolDefinition};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Add another turn's counts. A count stays `None` only while no turn reported it.
    pub fn accumulate(&mut self, other: &Usage) {
        fn add(total: &mut Option<i32>, other: Option<i32>) {
            if let Some(count) = other {
                *total = Some(total.unwrap_or(0).saturating_add(count));
            }
        }
        add(&mut self.input_tokens, other.input_tokens);
        add(&mut self.output_tokens, other.output_tokens);
        add(&mut self.total_tokens, other.total_tokens);
    }
}

/// Everything a provider needs to produce the next assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    /// The rendered system instruction followed by the conversation history
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Base trait for completion backends (OpenAI, Azure, local models, etc)
///
/// Implementations own transport, authentication and retries. The agent calls
/// `complete` once per turn and treats any error as fatal for the conversation.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next assistant turn for the request
    async fn complete(&self, request: &CompletionRequest) -> Result<(AssistantMessage, Usage)>;
}
