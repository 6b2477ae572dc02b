#![allow(dead_code)]

use agentloop::{AssistantMessage, CompletionRequest, Message, Provider, Usage};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replies with a fixed sequence of turns and records every request.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<AssistantMessage>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<AssistantMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<(AssistantMessage, Usage)> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted reply left"))?;
        Ok((reply, Usage::new(Some(1), Some(1), Some(2))))
    }
}

/// Computes each reply from the last message of the prompt, so many conversations can
/// share one provider.
pub struct LookupProvider<F> {
    reply: F,
}

impl<F> LookupProvider<F>
where
    F: Fn(&Message) -> AssistantMessage + Send + Sync,
{
    pub fn new(reply: F) -> Self {
        Self { reply }
    }
}

#[async_trait]
impl<F> Provider for LookupProvider<F>
where
    F: Fn(&Message) -> AssistantMessage + Send + Sync,
{
    async fn complete(&self, request: &CompletionRequest) -> Result<(AssistantMessage, Usage)> {
        let last = request
            .messages
            .last()
            .ok_or_else(|| anyhow::anyhow!("empty prompt"))?;
        // Yield so concurrent conversations interleave
        tokio::task::yield_now().await;
        Ok(((self.reply)(last), Usage::default()))
    }
}
