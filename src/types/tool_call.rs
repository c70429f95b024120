use crate::{
    error::{ActionError, Result},
    services::tool_call_utils::{
        extract_function_info, extract_tool_call_id, parse_function_arguments,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function selection returned by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the model (may be empty for local models)
    pub id: String,
    /// Name of the function to launch
    pub name: String,
    /// Extracted arguments, always a JSON object
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Parse a tool call from the chat-completion response format.
    ///
    /// Arguments may arrive as a JSON-encoded string (OpenAI) or as an inline
    /// object (Ollama).
    pub fn parse(tool_call: &Value) -> Result<Self> {
        let id = extract_tool_call_id(tool_call).to_string();
        let (function, name) = extract_function_info(tool_call).ok_or_else(|| {
            ActionError::InvalidFunctionCall("Tool call missing function".to_string())
        })?;
        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(ActionError::InvalidFunctionCall(
                    "Tool call missing function name".to_string(),
                ))
            }
        };
        let arguments = parse_function_arguments(function.get("arguments"), &name)?;

        Ok(Self {
            id,
            name,
            arguments,
        })
    }

    /// Lenient variant of [`ToolCall::parse`]
    pub fn from_openai_format(tool_call: &Value) -> Option<Self> {
        Self::parse(tool_call).ok()
    }

    /// Get a human-readable description
    pub fn describe(&self) -> String {
        format!("{}({})", self.name, self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_from_openai() {
        let openai_format = json!({
            "id": "call_456",
            "type": "function",
            "function": {
                "name": "search_foo",
                "arguments": "{\"q\": \"rust\"}"
            }
        });

        let call = ToolCall::from_openai_format(&openai_format).unwrap();
        assert_eq!(call.id, "call_456");
        assert_eq!(call.name, "search_foo");
        assert_eq!(call.arguments["q"], "rust");
    }

    #[test]
    fn test_tool_call_with_inline_arguments() {
        let ollama_format = json!({
            "function": {
                "name": "search_foo",
                "arguments": {"q": "rust"}
            }
        });

        let call = ToolCall::from_openai_format(&ollama_format).unwrap();
        assert_eq!(call.id, "");
        assert_eq!(call.describe(), r#"search_foo({"q":"rust"})"#);
    }

    #[test]
    fn test_tool_call_without_name() {
        assert!(ToolCall::from_openai_format(&json!({"function": {}})).is_none());

        let err = ToolCall::parse(&json!({
            "function": {"name": "x", "arguments": "{not json"}
        }))
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_FUNCTION_CALL");
        assert!(err.to_string().contains("'x'"));
    }
}
