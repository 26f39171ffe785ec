//! Placeholder expansion for configuration values
//!
//! String values may embed `<%= expression %>` placeholders. Expressions
//! are evaluated against a context object whose top-level keys (`project`,
//! `environment`, `package`, `config`) are bound as variables, so dotted and
//! bracket access, comparisons, `and`/`or`/`not` and `a if cond else b`
//! conditionals are all available. C-style `cond ? a : b`, `&&` and `||`
//! are not part of the grammar and fail as syntax errors.
//!
//! Referencing a variable that is not in the context is an error. A missing
//! member of a bound variable (`environment.user` when the environment has
//! no `user`) is `null`, which interpolates as an empty string.

use crate::error::{ExpansionError, ExpansionResult};
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Opening placeholder delimiter
pub const PLACEHOLDER_OPEN: &str = "<%=";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<%=(.*?)%>").expect("placeholder pattern is valid"))
}

/// Expand placeholders in `value` against `context`, returning a fresh tree.
///
/// A string that is exactly one placeholder yields the raw result of its
/// expression (number, object, ...); placeholders embedded in other text
/// are stringified and concatenated. Any failing expression fails the
/// whole call.
pub fn expand(value: &Value, context: &Value) -> ExpansionResult<Value> {
    Evaluator::new(context).expand_value(value)
}

/// Evaluates the expressions found in one value tree
struct Evaluator<'v> {
    env: Environment<'v>,
    scope: minijinja::Value,
    /// Top-level context keys
    variables: HashSet<String>,
}

impl<'v> Evaluator<'v> {
    fn new(context: &Value) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        let variables = context
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        Evaluator {
            env,
            scope: minijinja::Value::from_serialize(context),
            variables,
        }
    }

    fn expand_value(&self, value: &'v Value) -> ExpansionResult<Value> {
        match value {
            Value::String(s) => self.expand_str(s),
            Value::Array(items) => items
                .iter()
                .map(|item| self.expand_value(item))
                .collect::<ExpansionResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut expanded = Map::with_capacity(map.len());
                for (key, item) in map {
                    expanded.insert(key.clone(), self.expand_value(item)?);
                }
                Ok(Value::Object(expanded))
            }
            other => Ok(other.clone()),
        }
    }

    fn expand_str(&self, s: &'v str) -> ExpansionResult<Value> {
        if !s.contains(PLACEHOLDER_OPEN) {
            return Ok(Value::String(s.to_string()));
        }

        // (whole match, inner expression)
        let placeholders: Vec<_> = placeholder_regex()
            .captures_iter(s)
            .filter_map(|caps| Some((caps.get(0)?, caps.get(1)?.as_str())))
            .collect();

        match placeholders.as_slice() {
            [] => return Ok(Value::String(s.to_string())),
            [(whole, expression)] if whole.start() == 0 && whole.end() == s.len() => {
                return self.evaluate(*expression);
            }
            _ => {}
        }

        let mut result = String::with_capacity(s.len());
        let mut last = 0;
        for &(whole, expression) in &placeholders {
            result.push_str(&s[last..whole.start()]);
            let value = self.evaluate(expression)?;
            result.push_str(&stringify(&value));
            last = whole.end();
        }
        result.push_str(&s[last..]);

        Ok(Value::String(result))
    }

    /// Evaluate a single expression against the scope
    fn evaluate(&self, expression: &'v str) -> ExpansionResult<Value> {
        let expression = expression.trim();

        let compiled = self
            .env
            .compile_expression(expression)
            .map_err(|e| ExpansionError::Syntax {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;

        let evaluation_error = |message: String| ExpansionError::Evaluation {
            expression: expression.to_string(),
            message,
        };

        let mut unbound: Vec<String> = compiled
            .undeclared_variables(false)
            .into_iter()
            .filter(|name| !self.variables.contains(name))
            .collect();
        if !unbound.is_empty() {
            unbound.sort();
            return Err(evaluation_error(format!("undefined variable: {}", unbound.join(", "))));
        }

        let result = compiled.eval(&self.scope).map_err(|e| match e.kind() {
            ErrorKind::SyntaxError => ExpansionError::Syntax {
                expression: expression.to_string(),
                message: e.to_string(),
            },
            _ => evaluation_error(e.to_string()),
        })?;

        if result.is_undefined() {
            return Ok(Value::Null);
        }

        serde_json::to_value(&result).map_err(|e| evaluation_error(e.to_string()))
    }
}

/// Text rendition of an interpolated value
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
