use futures::future::BoxFuture;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};

// `{{` and `}}` are escapes, `{name}` is a placeholder, any other brace is an error.
const TOKEN_PATTERN: &str = r"\{\{|\}\}|\{([^{}]*)\}|[{}]";

type SyncResolver<C> = Box<dyn Fn(&C) -> String + Send + Sync>;
type AsyncResolver<C> = Box<dyn Fn(Arc<C>) -> BoxFuture<'static, String> + Send + Sync>;

/// Supplies the value of one instruction placeholder.
pub enum Variable<C> {
    Sync(SyncResolver<C>),
    Async(AsyncResolver<C>),
}

impl<C> Variable<C> {
    pub async fn resolve(&self, context: &Arc<C>) -> String {
        match self {
            Variable::Sync(resolve) => resolve(context.as_ref()),
            Variable::Async(resolve) => resolve(context.clone()).await,
        }
    }
}

impl<C> fmt::Debug for Variable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Sync(_) => f.write_str("Variable::Sync"),
            Variable::Async(_) => f.write_str("Variable::Async"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed system instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    segments: Vec<Segment>,
}

impl Instruction {
    /// Dedent and trim `text`, then split it into literals and `{name}` placeholders.
    pub fn parse(text: &str) -> AgentResult<Self> {
        let text = dedent(text);
        let text = text.trim();
        let pattern =
            Regex::new(TOKEN_PATTERN).map_err(|e| AgentError::Internal(e.to_string()))?;

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for captures in pattern.captures_iter(text) {
            let Some(token) = captures.get(0) else {
                continue;
            };
            literal.push_str(&text[last..token.start()]);
            last = token.end();

            match (token.as_str(), captures.get(1)) {
                ("{{", _) => literal.push('{'),
                ("}}", _) => literal.push('}'),
                (_, Some(name)) if is_identifier(name.as_str()) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.as_str().to_string()));
                }
                (_, Some(name)) => {
                    return Err(AgentError::MalformedInstruction(format!(
                        "invalid placeholder '{{{}}}' at byte {}",
                        name.as_str(),
                        token.start()
                    )));
                }
                (brace, None) => {
                    return Err(AgentError::MalformedInstruction(format!(
                        "unmatched '{}' at byte {}",
                        brace,
                        token.start()
                    )));
                }
            }
        }
        literal.push_str(&text[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Distinct placeholder names, in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute already-resolved values.
    pub fn render_with(&self, values: &HashMap<String, String>) -> AgentResult<String> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| AgentError::MissingTemplateVariable(name.clone()))?;
                    rendered.push_str(value);
                }
            }
        }
        Ok(rendered)
    }

    /// Resolve every placeholder once, in order, and render the instruction.
    pub async fn render<C>(
        &self,
        variables: &HashMap<String, Variable<C>>,
        context: &Arc<C>,
    ) -> AgentResult<String> {
        let mut values = HashMap::new();
        for name in self.placeholders() {
            let variable = variables
                .get(name)
                .ok_or_else(|| AgentError::MissingTemplateVariable(name.to_string()))?;
            values.insert(name.to_string(), variable.resolve(context).await);
        }
        self.render_with(&values)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Remove the whitespace prefix shared by every non-blank line.
fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.get(indent..).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn variables(pairs: &[(&str, &str)]) -> HashMap<String, Variable<()>> {
        pairs
            .iter()
            .map(|(name, value)| {
                let value = value.to_string();
                let variable: Variable<()> = Variable::Sync(Box::new(move |_: &()| value.clone()));
                (name.to_string(), variable)
            })
            .collect()
    }

    #[test]
    fn test_dedent_and_trim() {
        let instruction = Instruction::parse(
            "
            You are a calculator.

              Show your work.
            ",
        )
        .unwrap();
        assert_eq!(
            instruction.render_with(&HashMap::new()).unwrap(),
            "You are a calculator.\n\n  Show your work."
        );
    }

    #[test]
    fn test_placeholders_and_escapes() {
        let instruction =
            Instruction::parse("Hello {name}, reply as {{\"name\": \"{name}\"}} on {day}.").unwrap();
        assert_eq!(instruction.placeholders(), vec!["name", "day"]);

        let values = HashMap::from([
            ("name".to_string(), "Ada".to_string()),
            ("day".to_string(), "Monday".to_string()),
        ]);
        assert_eq!(
            instruction.render_with(&values).unwrap(),
            "Hello Ada, reply as {\"name\": \"Ada\"} on Monday."
        );
    }

    #[test]
    fn test_malformed_instructions() {
        for text in ["Hello {name", "Hello name}", "Hello {}", "Hello {first name}"] {
            assert!(
                matches!(
                    Instruction::parse(text),
                    Err(AgentError::MalformedInstruction(_))
                ),
                "{text:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_missing_variable() {
        let instruction = Instruction::parse("Talk to {user}").unwrap();
        let err = instruction
            .render(&variables(&[]), &Arc::new(()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Variable 'user' is not defined.");
    }

    #[tokio::test]
    async fn test_each_variable_resolves_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut vars: HashMap<String, Variable<()>> = HashMap::new();
        vars.insert(
            "user".to_string(),
            Variable::Sync(Box::new(move |_: &()| {
                counter.fetch_add(1, Ordering::SeqCst);
                "Ada".to_string()
            })),
        );

        let instruction = Instruction::parse("{user} and {user}").unwrap();
        let rendered = instruction.render(&vars, &Arc::new(())).await.unwrap();
        assert_eq!(rendered, "Ada and Ada");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_variable_with_context() {
        struct Session {
            user: String,
        }

        let mut vars: HashMap<String, Variable<Session>> = HashMap::new();
        vars.insert(
            "user".to_string(),
            Variable::Async(Box::new(|session: Arc<Session>| {
                async move { session.user.to_uppercase() }.boxed()
            })),
        );

        let instruction = Instruction::parse("Greet {user}.").unwrap();
        let context = Arc::new(Session {
            user: "grace".to_string(),
        });
        assert_eq!(
            instruction.render(&vars, &context).await.unwrap(),
            "Greet GRACE."
        );
    }
}
