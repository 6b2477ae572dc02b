mod common;

use agentloop::{Agent, AgentError, AssistantMessage, Message, Tool, Usage};
use anyhow::Result;
use common::ScriptedProvider;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

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

fn calculator_turns() -> Vec<AssistantMessage> {
    vec![
        AssistantMessage::new()
            .with_text("Ok, calculating")
            .with_tool_call("add_1", "add", json!({"num1": 10, "num2": 20}).to_string()),
        AssistantMessage::new().with_tool_call(
            "multiply_1",
            "multiply",
            json!({"num1": 30, "num2": 2}).to_string(),
        ),
        AssistantMessage::new().with_text("The answer is 60"),
    ]
}

#[tokio::test]
async fn test_calculator_conversation() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(calculator_turns()));
    let agent = Agent::builder("You are a calculator", provider.clone())
        .tool(Tool::new("add", add))
        .tool(Tool::sync("multiply", multiply).strict())
        .build()?;

    let response = agent.speak("What is (10 + 20) * 2?", &[], ()).await?;

    assert_eq!(
        response.messages,
        vec!["Ok, calculating".to_string(), "The answer is 60".to_string()]
    );

    let turns = calculator_turns();
    assert_eq!(
        response.history,
        vec![
            Message::user("What is (10 + 20) * 2?"),
            turns[0].clone().into(),
            Message::tool("add_1", "30.0"),
            turns[1].clone().into(),
            Message::tool("multiply_1", "60.0"),
            turns[2].clone().into(),
        ]
    );
    assert_eq!(response.usage, Usage::new(Some(3), Some(3), Some(6)));

    // Each request sees the previous tool result as its last entry
    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].messages.last(), Some(&Message::tool("add_1", "30.0")));
    assert_eq!(
        requests[2].messages.last(),
        Some(&Message::tool("multiply_1", "60.0"))
    );
    for request in &requests {
        assert_eq!(request.messages[0], Message::system("You are a calculator"));
    }
    Ok(())
}

#[tokio::test]
async fn test_tool_definitions_sent_to_provider() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(vec![
        AssistantMessage::new().with_text("Hi")
    ]));
    let agent = Agent::builder("You are a calculator", provider.clone())
        .tool(Tool::new("add", add))
        .tool(Tool::sync("multiply", multiply).strict())
        .build()?;

    agent.speak("Hello", &[], ()).await?;

    let tools = serde_json::to_value(&provider.requests()[0].tools)?;
    assert_eq!(
        tools,
        json!([
            {
                "type": "function",
                "function": {
                    "name": "add",
                    "description": "Add two numbers together.",
                    "parameters": {
                        "type": "object",
                        "required": ["num1", "num2"],
                        "properties": {
                            "num1": {"type": "number", "format": "double"},
                            "num2": {"type": "number", "format": "double"}
                        }
                    }
                }
            },
            {
                "type": "function",
                "function": {
                    "name": "multiply",
                    "description": "Multiply two numbers.",
                    "parameters": {
                        "type": "object",
                        "required": ["num1", "num2"],
                        "properties": {
                            "num1": {"type": "number", "format": "double"},
                            "num2": {"type": "number", "format": "double"}
                        },
                        "additionalProperties": false
                    },
                    "strict": true
                }
            }
        ])
    );
    Ok(())
}

#[tokio::test]
async fn test_graceful_mode_lets_the_model_correct_itself() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(vec![
        AssistantMessage::new().with_tool_call("sum_1", "sum", r#"{"num1": 1, "num2": 2}"#),
        AssistantMessage::new().with_tool_call("add_1", "add", r#"{"num1": 1, "num2": 2}"#),
        AssistantMessage::new().with_text("The answer is 3"),
    ]));
    let agent = Agent::builder("You are a calculator", provider.clone())
        .tool(Tool::new("add", add))
        .graceful_errors(true)
        .build()?;

    let response = agent.speak("1 + 2?", &[], ()).await?;
    assert_eq!(response.messages, vec!["The answer is 3".to_string()]);
    assert_eq!(
        response.history[2],
        Message::tool("sum_1", "No tool with the name 'sum' found.")
    );
    assert_eq!(response.history[4], Message::tool("add_1", "3.0"));
    assert_eq!(provider.requests().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_strict_mode_stops_before_next_provider_call() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(vec![
        AssistantMessage::new().with_tool_call("sum_1", "sum", "{}"),
        AssistantMessage::new().with_text("never sent"),
    ]));
    let agent = Agent::builder("You are a calculator", provider.clone())
        .tool(Tool::new("add", add))
        .build()?;

    let result = agent.speak("1 + 2?", &[], ()).await;
    assert!(matches!(result, Err(AgentError::UnknownTool(ref name)) if name == "sum"));
    assert_eq!(provider.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_continuing_a_conversation() -> Result<()> {
    let provider = Arc::new(ScriptedProvider::new(vec![
        AssistantMessage::new().with_text("Hello"),
        AssistantMessage::new().with_text("Still 60"),
    ]));
    let agent = Agent::builder("You are a calculator", provider.clone())
        .tool(Tool::new("add", add))
        .build()?;

    let first = agent.speak("Hi", &[], ()).await?;
    let second = agent.speak("And now?", &first.history, ()).await?;

    assert_eq!(second.messages, vec!["Still 60".to_string()]);
    assert_eq!(second.history.len(), 4);
    assert_eq!(provider.requests()[1].messages.len(), 4);
    Ok(())
}
