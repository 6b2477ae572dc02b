use futures::future::BoxFuture;
use futures::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{FunctionDefinition, ToolDefinition};
use crate::schema;

type Runner<C> = Box<dyn FnOnce(Arc<C>) -> BoxFuture<'static, anyhow::Result<Value>> + Send>;
type Parser<C> = Arc<dyn Fn(Value) -> Result<ToolInvocation<C>, serde_json::Error> + Send + Sync>;

/// A tool call whose arguments passed validation and are bound to the typed parameters.
pub struct ToolInvocation<C> {
    run: Runner<C>,
}

/// A function exposed to the model, together with its parameter schema.
///
/// The parameter schema is derived once from the parameter type `P` when the tool is
/// created. `C` is the per-conversation context: tools created with [`Tool::new`] or
/// [`Tool::sync`] ignore it, the `*_with_context` constructors receive it. The context
/// never appears in the schema.
pub struct Tool<C = ()> {
    name: String,
    description: String,
    parameters: Value,
    strict: bool,
    schema_error: Option<String>,
    validator: Option<jsonschema::Validator>,
    parser: Parser<C>,
}

impl<C: Send + Sync + 'static> Tool<C> {
    /// Wrap an async function that takes only its parameters.
    pub fn new<N, P, R, F, Fut>(name: N, handler: F) -> Self
    where
        N: Into<String>,
        P: DeserializeOwned + JsonSchema + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Self::with_context(name, move |params: P, _context: Arc<C>| handler(params))
    }

    /// Wrap an async function that also receives the conversation context.
    pub fn with_context<N, P, R, F, Fut>(name: N, handler: F) -> Self
    where
        N: Into<String>,
        P: DeserializeOwned + JsonSchema + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let parser: Parser<C> = Arc::new(move |arguments: Value| {
            let params: P = serde_json::from_value(arguments)?;
            let handler = handler.clone();
            Ok(ToolInvocation {
                run: Box::new(move |context: Arc<C>| {
                    async move {
                        let output = handler(params, context).await?;
                        Ok(serde_json::to_value(output)?)
                    }
                    .boxed()
                }),
            })
        });
        Self::from_parser::<N, P>(name, parser)
    }

    /// Wrap a blocking function that takes only its parameters.
    pub fn sync<N, P, R, F>(name: N, handler: F) -> Self
    where
        N: Into<String>,
        P: DeserializeOwned + JsonSchema + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self::sync_with_context(name, move |params: P, _context: &C| handler(params))
    }

    /// Wrap a blocking function that also receives the conversation context.
    pub fn sync_with_context<N, P, R, F>(name: N, handler: F) -> Self
    where
        N: Into<String>,
        P: DeserializeOwned + JsonSchema + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, &C) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let parser: Parser<C> = Arc::new(move |arguments: Value| {
            let params: P = serde_json::from_value(arguments)?;
            let handler = handler.clone();
            Ok(ToolInvocation {
                run: Box::new(move |context: Arc<C>| {
                    async move {
                        let output = handler(params, &context)?;
                        Ok(serde_json::to_value(output)?)
                    }
                    .boxed()
                }),
            })
        });
        Self::from_parser::<N, P>(name, parser)
    }

    fn from_parser<N: Into<String>, P: JsonSchema>(name: N, parser: Parser<C>) -> Self {
        let (description, parameters, schema_error) = match schema::derive::<P>() {
            Ok(derived) => (
                derived.description.unwrap_or_default(),
                derived.schema,
                None,
            ),
            Err(AgentError::InvalidSchema { message, .. }) => {
                (String::new(), Value::Null, Some(message))
            }
            Err(e) => (String::new(), Value::Null, Some(e.to_string())),
        };

        Self {
            name: name.into(),
            description,
            parameters,
            strict: false,
            schema_error,
            validator: None,
            parser,
        }
    }
}

impl<C> Tool<C> {
    /// Reject arguments the schema does not list and flag the definition as strict.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        schema::forbid_additional_properties(&mut self.parameters);
        self.validator = None;
        self
    }

    /// Replace the description taken from the parameter type's doc comment.
    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// The definition advertised to the completion provider.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(FunctionDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            strict: self.strict.then_some(true),
        })
    }

    /// Surface schema problems and compile the argument validator.
    ///
    /// Called once when the owning agent is built.
    pub fn prepare(&mut self) -> AgentResult<()> {
        if let Some(message) = &self.schema_error {
            return Err(AgentError::InvalidSchema {
                name: self.name.clone(),
                message: message.clone(),
            });
        }
        if self.validator.is_none() {
            self.validator = Some(schema::compile(&self.name, &self.parameters)?);
        }
        Ok(())
    }

    /// Parse and validate a raw argument payload from the model.
    ///
    /// An empty payload is read as an empty object, and whole floats are accepted for
    /// integer fields. Malformed JSON, schema violations and deserialization failures all
    /// surface as [`AgentError::InvalidToolArguments`].
    pub fn parse_args(&self, raw: &str) -> AgentResult<ToolInvocation<C>> {
        let invalid = |message: String| AgentError::InvalidToolArguments {
            tool: self.name.clone(),
            message,
        };

        let raw = raw.trim();
        let mut arguments: Value = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?
        };

        let validator = self.validator.as_ref().ok_or_else(|| {
            AgentError::Internal(format!("tool '{}' was used before being prepared", self.name))
        })?;
        schema::validate(validator, &arguments).map_err(invalid)?;
        schema::coerce_integers(&self.parameters, &mut arguments);

        (self.parser)(arguments).map_err(|e| invalid(e.to_string()))
    }

    /// Run the wrapped function and render its result as the tool message content.
    ///
    /// String results are passed through unquoted; anything else is rendered as JSON.
    pub async fn execute(
        &self,
        invocation: ToolInvocation<C>,
        context: Arc<C>,
    ) -> AgentResult<String> {
        debug!(tool = %self.name, "executing tool");
        let output = (invocation.run)(context)
            .await
            .map_err(|source| AgentError::ToolExecution {
                tool: self.name.clone(),
                source,
            })?;

        Ok(match output {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }
}

impl<C> fmt::Debug for Tool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl<C> fmt::Debug for ToolInvocation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolInvocation").finish_non_exhaustive()
    }
}
