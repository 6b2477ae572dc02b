//! Output formats decide what the caller receives for each produced assistant message.
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{JsonSchemaFormat, ResponseFormat};
use crate::schema;

pub trait OutputFormat: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Constraint advertised to the provider, if any
    fn response_format(&self) -> Option<&ResponseFormat>;

    /// Turn the text of an assistant turn into the produced message.
    fn parse(&self, content: &str) -> AgentResult<Self::Output>;
}

/// Plain text output: produced messages are the assistant's text as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl OutputFormat for Text {
    type Output = String;

    fn response_format(&self) -> Option<&ResponseFormat> {
        None
    }

    fn parse(&self, content: &str) -> AgentResult<String> {
        Ok(content.to_string())
    }
}

/// Structured output: the assistant's text must be JSON matching `T`.
pub struct Structured<T> {
    response_format: ResponseFormat,
    _marker: PhantomData<fn() -> T>,
}

impl<T: JsonSchema> Structured<T> {
    pub fn new() -> AgentResult<Self> {
        let derived = schema::derive::<T>()?;
        let mut schema = derived.schema;
        schema::forbid_additional_properties(&mut schema);

        Ok(Self {
            response_format: ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: derived.name,
                    schema,
                    strict: true,
                },
            },
            _marker: PhantomData,
        })
    }
}

impl<T> fmt::Debug for Structured<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Structured")
            .field("response_format", &self.response_format)
            .finish()
    }
}

impl<T> OutputFormat for Structured<T>
where
    T: DeserializeOwned + JsonSchema + Clone + Send + Sync + 'static,
{
    type Output = T;

    fn response_format(&self) -> Option<&ResponseFormat> {
        Some(&self.response_format)
    }

    fn parse(&self, content: &str) -> AgentResult<T> {
        serde_json::from_str(content).map_err(|e| AgentError::StructuredOutputParse {
            content: content.to_string(),
            message: e.to_string(),
        })
    }
}
