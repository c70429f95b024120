use crate::error::ActionError;
use serde_json::{Map, Value};

/// Extract tool_call_id from a tool call JSON object
pub(crate) fn extract_tool_call_id(tool_call: &Value) -> &str {
    tool_call
        .get("id")
        .and_then(|value| value.as_str())
        .unwrap_or_default()
}

/// Extract function name from a tool call JSON object
pub(crate) fn extract_function_info(tool_call: &Value) -> Option<(Value, Option<String>)> {
    let function = tool_call.get("function").cloned()?;
    let function_name = function
        .get("name")
        .and_then(|value| value.as_str())
        .map(|s| s.to_string());
    Some((function, function_name))
}

/// Parse function arguments, given either as a JSON string or an inline object
pub(crate) fn parse_function_arguments(
    arguments: Option<&Value>,
    function_name: &str,
) -> Result<Value, ActionError> {
    let parsed = match arguments {
        None | Some(Value::Null) => return Ok(Value::Object(Map::new())),
        Some(Value::String(raw)) if raw.trim().is_empty() => return Ok(Value::Object(Map::new())),
        Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|err| {
            ActionError::InvalidFunctionCall(format!(
                "Failed to parse arguments for function '{}': {}",
                function_name, err
            ))
        })?,
        Some(other) => other.clone(),
    };

    if !parsed.is_object() {
        return Err(ActionError::InvalidFunctionCall(format!(
            "Arguments for function '{}' must be an object, got {}",
            function_name, parsed
        )));
    }
    Ok(parsed)
}

/// Render an argument value the way it is passed on a command line
pub(crate) fn argument_to_cli_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
