use agentloop::{
    Agent, AgentSettings, AssistantMessage, CompletionRequest, Message, Provider, Tool, Usage,
};
use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Add two numbers together.
#[derive(Deserialize, JsonSchema)]
struct AddParams {
    num1: f64,
    num2: f64,
}

/// Multiply two numbers.
#[derive(Deserialize, JsonSchema)]
struct MultiplyParams {
    num1: f64,
    num2: f64,
}

async fn add(params: AddParams) -> Result<f64> {
    Ok(params.num1 + params.num2)
}

fn multiply(params: MultiplyParams) -> Result<f64> {
    Ok(params.num1 * params.num2)
}

/// Stands in for a real model and replays a fixed calculation.
struct ReplayProvider {
    turns: Mutex<Vec<AssistantMessage>>,
}

#[async_trait]
impl Provider for ReplayProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<(AssistantMessage, Usage)> {
        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            "completion requested"
        );
        let mut turns = self.turns.lock().unwrap();
        if turns.is_empty() {
            anyhow::bail!("the replay has no turns left");
        }
        Ok((turns.remove(0), Usage::new(Some(20), Some(10), Some(30))))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let provider = Arc::new(ReplayProvider {
        turns: Mutex::new(vec![
            AssistantMessage::new()
                .with_text("Ok, calculating")
                .with_tool_call("add_1", "add", r#"{"num1": 10, "num2": 20}"#),
            AssistantMessage::new().with_tool_call(
                "multiply_1",
                "multiply",
                r#"{"num1": 30, "num2": 2}"#,
            ),
            AssistantMessage::new().with_text("The answer is 60"),
        ]),
    });

    let agent = Agent::builder(
        "
        You are a calculator.
        Always use the tools to compute results.
        ",
        provider,
    )
    .settings(AgentSettings::from_env()?)
    .tool(Tool::new("add", add))
    .tool(Tool::sync("multiply", multiply).strict())
    .on_message(|message: &String, _: &()| println!("assistant: {message}"))
    .build()?;

    println!("{}", agent.summary());

    let response = agent.speak("What is (10 + 20) * 2?", &[], ()).await?;

    println!("\nHistory:");
    for message in &response.history {
        match message {
            Message::Tool {
                tool_call_id,
                content,
            } => println!("  tool[{tool_call_id}]: {content}"),
            Message::Assistant(turn) => {
                for call in &turn.tool_calls {
                    println!("  call[{}]: {}({})", call.id, call.name, call.arguments);
                }
                if let Some(text) = turn.text() {
                    println!("  assistant: {text}");
                }
            }
            other => println!("  {:?}: {}", other.role(), other.content().unwrap_or_default()),
        }
    }
    println!(
        "\nTokens used: {}",
        response.usage.total_tokens.unwrap_or_default()
    );
    Ok(())
}
