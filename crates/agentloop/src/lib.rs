pub mod agent;
pub mod config;
pub mod errors;
pub mod format;
mod hooks;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod schema;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentEvent, AgentResponse, StructuredAgent};
pub use crate::config::{AgentSettings, ErrorMode};
pub use errors::{AgentError, AgentResult};
pub use models::message::{AssistantMessage, Message, ToolCall};
pub use providers::base::{CompletionRequest, Provider, Usage};
pub use tool::Tool;
