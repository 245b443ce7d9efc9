//! velvet: a strict template engine compatible with Apache Velocity's
//! reference and `#set` syntax.
//!
//! The subset is deliberately small and unforgiving:
//! - Text, `##` line comments and `#* *#` block comments.
//! - `$name` / `${name}` references, with `.property`, `.method(args)` and
//!   `[index]` steps resolved against each value's capability table.
//! - `#set ($name = expression)`, visible to everything after it.
//! - Expressions with `|| && == != < > <= >= + - * / % ! -` (and the word
//!   forms `or and eq ne lt gt le ge not`) over 32-bit wrapping integers,
//!   booleans and strings.
//!
//! Anything undefined or null is an error rather than being echoed back, and
//! a `#` or `$` that starts nothing is plain text.
//!
//! ```
//! use velvet::{Context, Template};
//!
//! let template = Template::parse("#set ($n = $n * 2)\n$greeting, $n!").unwrap();
//! let ctx = Context::new().with("greeting", "hello").with("n", 21);
//! assert_eq!(template.evaluate(ctx).unwrap(), "hello, 42!");
//! ```

pub mod ast;
mod builtins;
pub mod config;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod value;

pub use config::Config;
pub use error::{EvaluationError, EvaluationErrorKind, SyntaxError, TemplateError};
pub use eval::Context;
pub use object::{Capabilities, HostObject, InvokeError, Origin, Param};
pub use value::{Key, Value};

use ast::Node;
use error::TemplateSource;
use eval::Evaluator;
use parser::Parser;

/// A parsed template, ready to evaluate any number of times.
#[derive(Debug, Clone)]
pub struct Template {
    source: TemplateSource,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        Self::parse_with(text, &Config::default())
    }

    pub fn parse_with(text: &str, config: &Config) -> Result<Self, SyntaxError> {
        let source = TemplateSource::new(config.name.as_str(), text);
        let nodes = Parser::new(&source, config).parse()?;
        Ok(Self { source, nodes })
    }

    /// Render against `context`, which is consumed.
    pub fn evaluate(&self, mut context: Context) -> Result<String, EvaluationError> {
        self.evaluate_in(&mut context)
    }

    /// Render against `context`, leaving any `#set` assignments in it.
    pub fn evaluate_in(&self, context: &mut Context) -> Result<String, EvaluationError> {
        let output = Evaluator::new(&self.source, context).render(&self.nodes)?;
        tracing::debug!(
            name = self.source.name(),
            bytes = output.len(),
            "evaluated template"
        );
        Ok(output)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }
}

/// Parse and evaluate in one go.
pub fn render(text: &str, context: Context) -> Result<String, TemplateError> {
    Ok(Template::parse(text)?.evaluate(context)?)
}
