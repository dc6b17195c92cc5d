//! Serialized launch arguments.
//!
//! The registry stores a JSON object of flag to value, e.g.
//! `{"--model": "default", "--threads": "4"}`. It is flattened in key order
//! into `["--model", "default", "--threads", "4"]`.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchArgsError {
    #[error("launch arguments are not valid JSON: {0}")]
    Syntax(String),

    #[error("launch arguments must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Flatten a serialized argument object into an ordered argument list.
///
/// Empty input and `{}` give no arguments. String values are passed as-is
/// and `null` emits the flag alone. Every other value is written in its
/// compact JSON spelling: `true`/`false` in lower case, numbers as JSON
/// prints them, arrays and objects as one JSON argument. Workers that need
/// a particular spelling should store the value as a string.
pub fn parse_launch_args(serialized: &str) -> Result<Vec<String>, LaunchArgsError> {
    let trimmed = serialized.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| LaunchArgsError::Syntax(e.to_string()))?;

    match value {
        Value::Object(map) => Ok(flatten(map)),
        other => Err(LaunchArgsError::NotAnObject(json_type(&other))),
    }
}

fn flatten(map: Map<String, Value>) -> Vec<String> {
    let mut args = Vec::with_capacity(map.len() * 2);
    for (flag, value) in map {
        args.push(flag);
        match value {
            Value::Null => {}
            Value::String(s) => args.push(s),
            other => args.push(other.to_string()),
        }
    }
    args
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_keeps_key_order() {
        let args = parse_launch_args(r#"{"--threads": "4", "--model": "default"}"#).unwrap();
        assert_eq!(args, vec!["--threads", "4", "--model", "default"]);
    }

    #[test]
    fn test_empty_forms() {
        assert!(parse_launch_args("").unwrap().is_empty());
        assert!(parse_launch_args("  ").unwrap().is_empty());
        assert!(parse_launch_args("{}").unwrap().is_empty());
    }

    #[test]
    fn test_scalar_values() {
        let args = parse_launch_args(r#"{"--threads": 4, "--verbose": null, "--dry": true}"#).unwrap();
        assert_eq!(args, vec!["--threads", "4", "--verbose", "--dry", "true"]);
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            parse_launch_args("{not json"),
            Err(LaunchArgsError::Syntax(_))
        ));
        assert_eq!(
            parse_launch_args(r#"["--model", "x"]"#),
            Err(LaunchArgsError::NotAnObject("an array"))
        );
    }

    #[test]
    fn test_non_string_values_use_json_spelling() {
        let args = parse_launch_args(
            r#"{"--enabled": false, "--ratio": 0.5, "--offset": -3, "--tags": ["a", "b"], "--opts": {"k": 1}}"#,
        )
        .unwrap();
        assert_eq!(
            args,
            vec![
                "--enabled",
                "false",
                "--ratio",
                "0.5",
                "--offset",
                "-3",
                "--tags",
                r#"["a","b"]"#,
                "--opts",
                r#"{"k":1}"#,
            ]
        );
    }
}
