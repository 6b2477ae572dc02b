use futures::future::{self, BoxFuture, Either};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{AgentSettings, ErrorMode};
use crate::errors::{AgentError, AgentResult};
use crate::format::{OutputFormat, Structured, Text};
use crate::hooks::{self, Hook, Hooks};
use crate::models::message::{AssistantMessage, Message, ToolCall};
use crate::models::tool::ToolDefinition;
use crate::prompt_template::{Instruction, Variable};
use crate::providers::base::{CompletionRequest, Provider, Usage};
use crate::tool::Tool;

/// The outcome of one [`Agent::speak`] call.
#[derive(Debug, Clone)]
pub struct AgentResponse<O = String> {
    /// Every message produced for the caller, in order
    pub messages: Vec<O>,
    /// The history passed in, followed by everything this call appended
    pub history: Vec<Message>,
    /// Token usage summed over every provider call
    pub usage: Usage,
}

/// An event from [`Agent::iterate`].
#[derive(Debug, Clone)]
pub enum AgentEvent<O> {
    /// A produced message, surfaced before the tool calls of the same turn run
    Message(O),
    /// The conversation reached a turn without tool calls. Always the last event.
    Completed { history: Vec<Message>, usage: Usage },
}

/// Agent integrates a completion provider with the tools it may call.
///
/// An agent is immutable once built. Every conversation works on its own copy of the
/// history, so one agent can serve many conversations concurrently.
pub struct Agent<C = (), F: OutputFormat = Text> {
    instruction: Instruction,
    provider: Arc<dyn Provider>,
    settings: AgentSettings,
    tools: Vec<Tool<C>>,
    definitions: Vec<ToolDefinition>,
    variables: HashMap<String, Variable<C>>,
    hooks: Hooks<C, F::Output>,
    format: F,
}

/// An agent whose produced messages are parsed into `T`.
pub type StructuredAgent<T, C = ()> = Agent<C, Structured<T>>;

impl<C: Send + Sync + 'static> Agent<C, Text> {
    /// Start building a plain-text agent
    pub fn builder<S: Into<String>>(
        instruction: S,
        provider: Arc<dyn Provider>,
    ) -> AgentBuilder<C, Text> {
        AgentBuilder::with_format(instruction, provider, Ok(Text))
    }
}

impl<C, T> Agent<C, Structured<T>>
where
    C: Send + Sync + 'static,
    Structured<T>: OutputFormat,
    T: schemars::JsonSchema,
{
    /// Start building an agent whose messages must parse as `T`
    pub fn structured<S: Into<String>>(
        instruction: S,
        provider: Arc<dyn Provider>,
    ) -> AgentBuilder<C, Structured<T>> {
        AgentBuilder::with_format(instruction, provider, Structured::new())
    }
}

impl<C: Send + Sync + 'static, F: OutputFormat> Agent<C, F> {
    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn tools(&self) -> &[Tool<C>] {
        &self.tools
    }

    /// The tool definitions sent with every completion request
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Look up a tool by name. With duplicate names the first registration wins.
    pub fn tool(&self, name: &str) -> AgentResult<&Tool<C>> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    /// A readable listing of every tool and the definition sent to the model.
    pub fn summary(&self) -> String {
        let mut lines = vec!["Tools:".to_string()];
        for (tool, definition) in self.tools.iter().zip(&self.definitions) {
            lines.push(format!("  - {}", tool.name()));
            lines.push("    Schema:".to_string());
            let pretty = serde_json::to_string_pretty(definition)
                .unwrap_or_else(|_| definition.function.name.clone());
            for line in pretty.lines() {
                lines.push(format!("      {line}"));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Send a user message and drive the conversation until the model stops calling
    /// tools.
    ///
    /// `history` is copied, never modified. The response carries every produced message
    /// and the full resulting history.
    #[instrument(skip_all, fields(model = %self.settings.model))]
    pub async fn speak<S: Into<String>>(
        &self,
        message: S,
        history: &[Message],
        context: C,
    ) -> AgentResult<AgentResponse<F::Output>> {
        let mut events = self.iterate(message, history, context);
        let mut messages = Vec::new();

        while let Some(event) = events.next().await {
            match event? {
                AgentEvent::Message(message) => messages.push(message),
                AgentEvent::Completed { history, usage } => {
                    return Ok(AgentResponse {
                        messages,
                        history,
                        usage,
                    })
                }
            }
        }

        Err(AgentError::Internal(
            "conversation ended without completing".to_string(),
        ))
    }

    /// Like [`Agent::speak`], returning only the resulting history.
    pub async fn run<S: Into<String>>(
        &self,
        message: S,
        history: &[Message],
        context: C,
    ) -> AgentResult<Vec<Message>> {
        Ok(self.speak(message, history, context).await?.history)
    }

    /// Create a stream that yields each produced message as the conversation advances,
    /// followed by a single [`AgentEvent::Completed`].
    pub fn iterate<S: Into<String>>(
        &self,
        message: S,
        history: &[Message],
        context: C,
    ) -> BoxStream<'_, AgentResult<AgentEvent<F::Output>>> {
        let mut history = history.to_vec();
        history.push(Message::user(message));
        let context = Arc::new(context);

        Box::pin(async_stream::try_stream! {
            // Variables are resolved once per conversation and reused for every turn
            let system = Message::system(
                self.instruction.render(&self.variables, &context).await?,
            );
            let mut usage = Usage::default();
            let mut iteration = 0usize;

            loop {
                iteration += 1;
                let mut prompt = Vec::with_capacity(history.len() + 1);
                prompt.push(system.clone());
                prompt.extend(history.iter().cloned());

                debug!(iteration, history_len = history.len(), "requesting completion");
                hooks::run_all(&self.hooks.prompt, prompt.as_slice(), &context).await;

                let request = CompletionRequest {
                    model: self.settings.model.clone(),
                    messages: prompt,
                    tools: self.definitions.clone(),
                    response_format: self.format.response_format().cloned(),
                };
                let (reply, turn_usage) = self
                    .provider
                    .complete(&request)
                    .await
                    .map_err(AgentError::Provider)?;
                usage.accumulate(&turn_usage);

                history.push(Message::Assistant(reply.clone()));
                hooks::run_all(&self.hooks.output, &reply, &context).await;

                if let Some(text) = reply.text() {
                    let output = self.format.parse(text)?;
                    hooks::run_all(&self.hooks.message, &output, &context).await;
                    yield AgentEvent::Message(output);
                }

                if !reply.has_tool_calls() {
                    break;
                }

                let results = self.dispatch(&reply.tool_calls, &context).await?;
                history.extend(results);
            }

            info!(iterations = iteration, history_len = history.len(), "conversation complete");
            yield AgentEvent::Completed { history, usage };
        })
    }

    /// Run every tool call of one assistant turn concurrently.
    ///
    /// Results come back in call order. In strict mode the first unknown tool or invalid
    /// payload is returned before any tool runs.
    async fn dispatch(&self, calls: &[ToolCall], context: &Arc<C>) -> AgentResult<Vec<Message>> {
        let mut pending = Vec::with_capacity(calls.len());

        for call in calls {
            let prepared = self
                .tool(&call.name)
                .and_then(|tool| Ok((tool, tool.parse_args(&call.arguments)?)));

            match prepared {
                Ok((tool, invocation)) => {
                    debug!(tool = %call.name, call_id = %call.id, "dispatching tool call");
                    pending.push(Either::Right(tool.execute(invocation, context.clone())));
                }
                Err(err) if self.settings.error_mode == ErrorMode::Graceful => {
                    warn!(tool = %call.name, call_id = %call.id, error = %err, "tool call rejected");
                    pending.push(Either::Left(future::ready(Ok(err.to_string()))));
                }
                Err(err) => return Err(err),
            }
        }

        let outputs = future::join_all(pending).await;
        calls
            .iter()
            .zip(outputs)
            .map(|(call, output)| Ok(Message::tool(call.id.clone(), output?)))
            .collect()
    }
}

/// Collects the tools, variables and observers of an agent before it is frozen.
pub struct AgentBuilder<C = (), F: OutputFormat = Text> {
    instruction: String,
    provider: Arc<dyn Provider>,
    settings: AgentSettings,
    tools: Vec<Tool<C>>,
    variables: HashMap<String, Variable<C>>,
    hooks: Hooks<C, F::Output>,
    format: AgentResult<F>,
}

impl<C: Send + Sync + 'static, F: OutputFormat> AgentBuilder<C, F> {
    /// Start building an agent with a custom output format
    pub fn with_format<S: Into<String>>(
        instruction: S,
        provider: Arc<dyn Provider>,
        format: AgentResult<F>,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            provider,
            settings: AgentSettings::default(),
            tools: Vec::new(),
            variables: HashMap::new(),
            hooks: Hooks::default(),
            format,
        }
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn model<S: Into<String>>(mut self, model: S) -> Self {
        self.settings.model = model.into();
        self
    }

    /// Report unknown tools and invalid arguments back to the model instead of failing
    pub fn graceful_errors(mut self, graceful: bool) -> Self {
        self.settings.error_mode = if graceful {
            ErrorMode::Graceful
        } else {
            ErrorMode::Strict
        };
        self
    }

    pub fn tool(mut self, tool: Tool<C>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Provide the value of the `{name}` placeholder in the instruction
    pub fn variable<N, V>(mut self, name: N, resolve: V) -> Self
    where
        N: Into<String>,
        V: Fn(&C) -> String + Send + Sync + 'static,
    {
        self.variables
            .insert(name.into(), Variable::Sync(Box::new(resolve)));
        self
    }

    pub fn variable_async<N, V, Fut>(mut self, name: N, resolve: V) -> Self
    where
        N: Into<String>,
        V: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        let resolve = move |context: Arc<C>| -> BoxFuture<'static, String> {
            Box::pin(resolve(context))
        };
        self.variables
            .insert(name.into(), Variable::Async(Box::new(resolve)));
        self
    }

    /// Observe the full prompt (system message and history) before each provider call
    pub fn inspect_prompt<H>(mut self, hook: H) -> Self
    where
        H: Fn(&[Message], &C) + Send + Sync + 'static,
    {
        self.hooks.prompt.push(Hook::Blocking(Box::new(hook)));
        self
    }

    pub fn inspect_prompt_async<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(Vec<Message>, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook = move |prompt: Vec<Message>, context: Arc<C>| -> BoxFuture<'static, ()> {
            Box::pin(hook(prompt, context))
        };
        self.hooks.prompt.push(Hook::Async(Box::new(hook)));
        self
    }

    /// Observe every raw assistant turn, including tool-call-only turns
    pub fn inspect_output<H>(mut self, hook: H) -> Self
    where
        H: Fn(&AssistantMessage, &C) + Send + Sync + 'static,
    {
        self.hooks.output.push(Hook::Blocking(Box::new(hook)));
        self
    }

    pub fn inspect_output_async<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(AssistantMessage, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook = move |output: AssistantMessage, context: Arc<C>| -> BoxFuture<'static, ()> {
            Box::pin(hook(output, context))
        };
        self.hooks.output.push(Hook::Async(Box::new(hook)));
        self
    }

    /// Receive each produced message before it reaches the caller
    pub fn on_message<H>(mut self, hook: H) -> Self
    where
        H: Fn(&F::Output, &C) + Send + Sync + 'static,
    {
        self.hooks.message.push(Hook::Blocking(Box::new(hook)));
        self
    }

    pub fn on_message_async<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(F::Output, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook = move |message: F::Output, context: Arc<C>| -> BoxFuture<'static, ()> {
            Box::pin(hook(message, context))
        };
        self.hooks.message.push(Hook::Async(Box::new(hook)));
        self
    }

    /// Validate the configuration and freeze the agent.
    ///
    /// Fails on a malformed instruction, a placeholder without a variable, or a schema
    /// that cannot be used.
    pub fn build(self) -> AgentResult<Agent<C, F>> {
        let format = self.format?;
        let instruction = Instruction::parse(&self.instruction)?;
        if let Some(missing) = instruction
            .placeholders()
            .into_iter()
            .find(|name| !self.variables.contains_key(*name))
        {
            return Err(AgentError::MissingTemplateVariable(missing.to_string()));
        }

        let mut tools = self.tools;
        for tool in tools.iter_mut() {
            tool.prepare()?;
        }
        let definitions = tools.iter().map(Tool::definition).collect();

        debug!(
            tools = tools.len(),
            error_mode = %self.settings.error_mode,
            "agent built"
        );

        Ok(Agent {
            instruction,
            provider: self.provider,
            settings: self.settings,
            tools,
            definitions,
            variables: self.variables,
            hooks: self.hooks,
            format,
        })
    }
}
