use crate::{
    error::{ActionError, Result},
    types::{FunctionDescriptor, ParamKind},
};
use jsonschema::{Draft, JSONSchema};
use serde_json::{Number, Value};

const MAX_SCHEMA_ERRORS: usize = 3;

/// Validate extracted arguments against a descriptor's parameter schema
pub fn validate_arguments(descriptor: &FunctionDescriptor, arguments: &Value) -> Result<()> {
    let schema = descriptor.parameters_schema();
    let validator = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|err| {
            ActionError::Validation(format!(
                "Failed to prepare `{}` schema for validation: {}",
                descriptor.name, err
            ))
        })?;

    if let Err(errors) = validator.validate(arguments) {
        let mut details = Vec::new();
        let mut truncated = false;

        for (idx, error) in errors.enumerate() {
            if idx < MAX_SCHEMA_ERRORS {
                let mut path = error.instance_path.to_string();
                if path.is_empty() {
                    path = "<root>".to_string();
                }
                details.push(format!("{}: {}", path, error));
            } else {
                truncated = true;
                break;
            }
        }

        let mut detail_str = if details.is_empty() {
            "arguments failed schema validation".to_string()
        } else {
            details.join("; ")
        };

        if truncated {
            detail_str.push_str("; additional errors truncated");
        }

        return Err(ActionError::Validation(format!(
            "Arguments do not match `{}` parameters: {}",
            descriptor.name, detail_str
        )));
    }

    // generated scripts convert number flags with int()
    for param in descriptor
        .parameters
        .iter()
        .filter(|param| param.kind == ParamKind::Number)
    {
        if let Some(Value::Number(number)) = arguments.get(&param.variable) {
            let integral = number.is_i64()
                || number.is_u64()
                || number.as_f64().is_some_and(|f| f.fract() == 0.0);
            if !integral {
                return Err(ActionError::Validation(format!(
                    "Arguments do not match `{}` parameters: /{}: {} is not an integer",
                    descriptor.name, param.variable, number
                )));
            }
        }
    }

    Ok(())
}

/// Local models often quote numbers; turn numeric strings into numbers for
/// `number` parameters and numbers into strings for `string` parameters.
pub fn coerce_arguments(descriptor: &FunctionDescriptor, arguments: &mut Value) {
    let Some(object) = arguments.as_object_mut() else {
        return;
    };

    for param in &descriptor.parameters {
        let Some(value) = object.get_mut(&param.variable) else {
            continue;
        };
        let replacement = match (param.kind, &*value) {
            (ParamKind::Number, Value::String(text)) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .map(Number::from)
                    .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
                    .map(Value::Number)
            }
            (ParamKind::String, Value::Number(number)) => Some(Value::String(number.to_string())),
            _ => None,
        };
        if let Some(replacement) = replacement {
            *value = replacement;
        }
    }
}
