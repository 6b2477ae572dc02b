use serde::{Deserialize, Serialize};

/// A request from the model to invoke one tool.
///
/// `arguments` is the raw payload exactly as the provider returned it. It is only parsed
/// when the call is dispatched, so a malformed payload can be reported back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier, unique within one assistant turn
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// Encoded arguments, usually a JSON object
    pub arguments: String,
}

impl ToolCall {
    pub fn new<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One assistant turn: optional visible text and zero or more tool calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    /// Create an empty assistant turn
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the visible text of the turn
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = Some(text.into());
        self
    }

    /// Add a tool call request to the turn
    pub fn with_tool_call<I, N, A>(mut self, id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        self.tool_calls.push(ToolCall::new(id, name, arguments));
        self
    }

    /// The visible text, if the turn carries any non-empty text
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.is_empty())
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant(AssistantMessage),
    Tool { tool_call_id: String, content: String },
}

impl Message {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create a text-only assistant message
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Message::Assistant(AssistantMessage::new().with_text(content))
    }

    /// Create the result message for the tool call with the given id
    pub fn tool<I: Into<String>, S: Into<String>>(tool_call_id: I, content: S) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant(_) => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Text content of the message, if any
    pub fn content(&self) -> Option<&str> {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Tool { content, .. } => Some(content),
            Message::Assistant(assistant) => assistant.content.as_deref(),
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Message::Assistant(assistant) => Some(assistant),
            _ => None,
        }
    }

    /// The originating call id, if this is a tool result
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

impl From<AssistantMessage> for Message {
    fn from(message: AssistantMessage) -> Self {
        Message::Assistant(message)
    }
}
