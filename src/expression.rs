//! Expression evaluation seam.
//!
//! The engine never interprets expressions itself; every dynamic value (URL,
//! header values, bodies, predicates, snapshot derivation, auth transforms) is
//! resolved through an [`Evaluator`]. A JSON `null` result stands for
//! "undefined".
//!
//! [`PathEvaluator`] is a deliberately small implementation used by the
//! command-line front end: dotted paths, quoted literals, JSON literals and
//! `&` string concatenation.

use serde_json::Value;
use thiserror::Error;

/// Error raised when an expression cannot be evaluated.
#[derive(Debug, Error)]
#[error("failed to evaluate expression `{expression}`: {message}")]
pub struct EvalError {
    /// The expression that failed.
    pub expression: String,
    /// What went wrong.
    pub message: String,
}

impl EvalError {
    /// Creates an evaluation error for `expression`.
    pub fn new(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// Resolves a declarative expression against a JSON context.
///
/// Implementations must be pure: the same context and expression always
/// produce the same value.
pub trait Evaluator: Send + Sync {
    /// Evaluates `expression` against `context`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] when the expression is malformed.
    fn evaluate(&self, context: &Value, expression: &str) -> Result<Value, EvalError>;
}

impl<F> Evaluator for F
where
    F: Fn(&Value, &str) -> Result<Value, EvalError> + Send + Sync,
{
    fn evaluate(&self, context: &Value, expression: &str) -> Result<Value, EvalError> {
        self(context, expression)
    }
}

/// Returns whether `value` counts as true in a predicate position.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders an evaluated value as text: strings verbatim, `null` as empty,
/// everything else as compact JSON.
#[must_use]
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Minimal evaluator resolving dotted paths against the context.
///
/// Supported forms:
/// - `data.url`, `$.data.url`, `$$.data.items.0.id` (path lookup, missing → `null`)
/// - `$` / `$$` (the whole context)
/// - `'text'` / `"text"` (string literals)
/// - `true`, `false`, `null`, numbers (JSON literals)
/// - `a & 'b' & c` (string concatenation)
#[derive(Debug, Clone, Copy, Default)]
pub struct PathEvaluator;

impl PathEvaluator {
    /// Creates a path evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn evaluate_term(context: &Value, expression: &str, term: &str) -> Result<Value, EvalError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(EvalError::new(expression, "empty term"));
        }

        if let Some(literal) = strip_quotes(term) {
            return Ok(Value::String(literal.to_string()));
        }

        if term == "true" || term == "false" || term == "null" || term.parse::<f64>().is_ok() {
            return serde_json::from_str(term)
                .map_err(|e| EvalError::new(expression, format!("invalid literal `{term}`: {e}")));
        }

        let path = term
            .strip_prefix("$$")
            .or_else(|| term.strip_prefix('$'))
            .unwrap_or(term);
        let path = path.strip_prefix('.').unwrap_or(path);
        if path.is_empty() {
            return Ok(context.clone());
        }

        let mut current = context;
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(EvalError::new(expression, "empty path segment"));
            }
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }
}

impl Evaluator for PathEvaluator {
    fn evaluate(&self, context: &Value, expression: &str) -> Result<Value, EvalError> {
        let terms = split_concatenation(expression)
            .ok_or_else(|| EvalError::new(expression, "unterminated string literal"))?;

        if let [single] = terms.as_slice() {
            return Self::evaluate_term(context, expression, single);
        }

        let mut joined = String::new();
        for term in &terms {
            joined.push_str(&value_to_text(&Self::evaluate_term(context, expression, term)?));
        }
        Ok(Value::String(joined))
    }
}

fn strip_quotes(term: &str) -> Option<&str> {
    let bytes = term.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return Some(&term[1..term.len() - 1]);
        }
    }
    None
}

/// Splits on `&` outside of quoted literals. Returns `None` on an unterminated quote.
fn split_concatenation(expression: &str) -> Option<Vec<&str>> {
    let mut terms = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, ch) in expression.char_indices() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (None, '\'' | '"') => quote = Some(ch),
            (None, '&') => {
                terms.push(&expression[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return None;
    }
    terms.push(&expression[start..]);
    Some(terms)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_path_evaluator_resolves_nested_path() {
        let ctx = json!({"data": {"url": "http://example.com", "items": [{"id": 7}]}});
        let evaluator = PathEvaluator::new();
        assert_eq!(
            evaluator.evaluate(&ctx, "$$.data.url").unwrap(),
            json!("http://example.com")
        );
        assert_eq!(evaluator.evaluate(&ctx, "data.items.0.id").unwrap(), json!(7));
        assert_eq!(evaluator.evaluate(&ctx, "data.missing").unwrap(), Value::Null);
    }

    #[test]
    fn test_path_evaluator_literals_and_concatenation() {
        let ctx = json!({"data": {"url": "http://example.com", "oihsnapshot": {"nextPage": 2}}});
        let evaluator = PathEvaluator::new();
        assert_eq!(evaluator.evaluate(&ctx, "'Bearer x'").unwrap(), json!("Bearer x"));
        assert_eq!(evaluator.evaluate(&ctx, "42").unwrap(), json!(42));
        assert_eq!(evaluator.evaluate(&ctx, "true").unwrap(), json!(true));
        assert_eq!(
            evaluator
                .evaluate(&ctx, "$$.data.url & '?page=' & data.oihsnapshot.nextPage")
                .unwrap(),
            json!("http://example.com?page=2")
        );
    }

    #[test]
    fn test_path_evaluator_ampersand_inside_quotes_is_literal() {
        let evaluator = PathEvaluator::new();
        assert_eq!(
            evaluator.evaluate(&json!({}), "'a&b' & 'c'").unwrap(),
            json!("a&bc")
        );
    }

    #[test]
    fn test_path_evaluator_rejects_unterminated_literal() {
        let err = PathEvaluator::new().evaluate(&json!({}), "'oops").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("undefined")));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!(1)));
    }

    #[test]
    fn test_closure_is_an_evaluator() {
        let evaluator = |_: &Value, expr: &str| -> Result<Value, EvalError> { Ok(json!(expr.len())) };
        assert_eq!(evaluator.evaluate(&json!({}), "abc").unwrap(), json!(3));
    }
}
