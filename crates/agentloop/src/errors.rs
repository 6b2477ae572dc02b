use thiserror::Error;

/// Everything that can go wrong while building an agent or running a conversation.
///
/// `UnknownTool` and `InvalidToolArguments` are tool-dispatch failures: in graceful mode
/// their `Display` text is sent back to the model as the tool result so it can correct
/// itself. Every other variant always unwinds the conversation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("No tool with the name '{0}' found.")]
    UnknownTool(String),

    #[error("The argument validation failed for the function call to {tool}: {message}")]
    InvalidToolArguments { tool: String, message: String },

    #[error("Variable '{0}' is not defined.")]
    MissingTemplateVariable(String),

    #[error("Malformed instruction: {0}")]
    MalformedInstruction(String),

    #[error("Structured output could not be parsed: {message}\ncontent: {content}")]
    StructuredOutputParse { content: String, message: String },

    #[error("Invalid schema for '{name}': {message}")]
    InvalidSchema { name: String, message: String },

    #[error("Tool '{tool}' failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Completion provider failed: {0}")]
    Provider(#[source] anyhow::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Whether graceful mode may turn this error into an in-band tool message.
    pub fn is_tool_dispatch_error(&self) -> bool {
        matches!(
            self,
            AgentError::UnknownTool(_) | AgentError::InvalidToolArguments { .. }
        )
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
