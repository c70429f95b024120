use crate::{
    error::{ActionError, Result},
    types::ParameterSpec,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

fn function_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid name pattern"))
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid variable pattern"))
}

/// Python keywords, plus the names the generated `__main__` block binds itself
const RESERVED_VARIABLES: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield", "args", "parser",
];

/// Deserialize with the failing path included in the error message
pub fn deserialize_with_path<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        ActionError::Validation(format!("Deserialization failed at {}: {}", e.path(), e))
    })
}

/// A function name doubles as a tool name and a filename stem
pub fn validate_function_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ActionError::Validation(
            "Function name must not be empty".to_string(),
        ));
    }
    if !function_name_pattern().is_match(name) {
        return Err(ActionError::Validation(format!(
            "Function name `{}` may only contain letters, digits, `_` and `-` (max 64)",
            name
        )));
    }
    Ok(())
}

/// Every parameter needs a unique identifier and a description
pub fn validate_parameters(params: &[ParameterSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for (idx, param) in params.iter().enumerate() {
        if param.variable.trim().is_empty() {
            return Err(ActionError::Validation(format!(
                "Parameter #{} has an empty variable name",
                idx + 1
            )));
        }
        if param.description.trim().is_empty() {
            return Err(ActionError::Validation(format!(
                "Parameter `{}` has an empty description",
                param.variable
            )));
        }
        if !variable_pattern().is_match(&param.variable) {
            return Err(ActionError::Validation(format!(
                "Parameter `{}` is not a valid identifier",
                param.variable
            )));
        }
        if RESERVED_VARIABLES.contains(&param.variable.as_str()) {
            return Err(ActionError::Validation(format!(
                "Parameter `{}` is a reserved name in the generated script",
                param.variable
            )));
        }
        if !seen.insert(param.variable.as_str()) {
            return Err(ActionError::Validation(format!(
                "Parameter `{}` is declared more than once",
                param.variable
            )));
        }
    }
    Ok(())
}

/// Checks run before anything is recorded or written
pub fn validate_build_request(
    name: &str,
    description: &str,
    params: &[ParameterSpec],
) -> Result<()> {
    validate_function_name(name)?;
    if description.trim().is_empty() {
        return Err(ActionError::Validation(
            "Function description must not be empty".to_string(),
        ));
    }
    validate_parameters(params)
}
