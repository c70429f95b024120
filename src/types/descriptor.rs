use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Value kind of a declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    #[serde(alias = "integer")]
    Number,
}

impl ParamKind {
    /// JSON schema `type` for this kind
    pub fn schema_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
        }
    }

    /// Type annotation used in the generated entry-function signature
    pub fn python_type(&self) -> &'static str {
        match self {
            ParamKind::String => "str",
            ParamKind::Number => "int",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_type())
    }
}

impl FromStr for ParamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Ok(ParamKind::String),
            "number" | "int" | "integer" => Ok(ParamKind::Number),
            other => Err(format!(
                "unknown parameter kind `{}` (expected `string` or `number`)",
                other
            )),
        }
    }
}

/// One declared argument of a saved function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    /// Argument name in the entry function and the `--variable` flag
    pub variable: String,
    pub kind: ParamKind,
    pub description: String,
}

impl ParameterSpec {
    pub fn new(
        variable: impl Into<String>,
        kind: ParamKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            variable: variable.into(),
            kind,
            description: description.into(),
        }
    }

    pub fn string(variable: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(variable, ParamKind::String, description)
    }

    pub fn number(variable: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(variable, ParamKind::Number, description)
    }

    /// The `--variable` flag accepted by the generated script
    pub fn flag(&self) -> String {
        format!("--{}", self.variable)
    }
}

/// Parses `kind:variable:description`; the description may itself contain colons.
impl FromStr for ParameterSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (kind, variable, description) = match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(variable), Some(description)) => (kind, variable, description),
            _ => {
                return Err(format!(
                    "invalid parameter `{}` (expected kind:variable:description)",
                    s
                ))
            }
        };

        Ok(Self::new(
            variable.trim(),
            kind.parse::<ParamKind>()?,
            description.trim(),
        ))
    }
}

/// Registry record for one saved function.
///
/// Serialises as a chat-completion tool definition so the registry file can be
/// handed to the LLM as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ToolDefinition", try_from = "ToolDefinition")]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl FunctionDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParameterSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Look up a declared parameter by variable name
    pub fn parameter(&self, variable: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.variable == variable)
    }

    /// JSON schema of the parameters; every parameter is required
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(
                param.variable.clone(),
                json!({
                    "type": param.kind.schema_type(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self.parameters.iter().map(|p| p.variable.as_str()).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Tool definition for chat-completion function calling
    pub fn to_tool_definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema(),
            }
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ToolDefinition {
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: FunctionDefinition,
}

#[derive(Serialize, Deserialize)]
struct FunctionDefinition {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: ParametersSchema,
}

#[derive(Serialize, Deserialize)]
struct ParametersSchema {
    #[serde(rename = "type", default = "object_type")]
    kind: String,
    #[serde(default)]
    properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    required: Vec<String>,
}

impl Default for ParametersSchema {
    fn default() -> Self {
        Self {
            kind: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PropertySchema {
    #[serde(rename = "type")]
    kind: ParamKind,
    #[serde(default)]
    description: String,
}

fn function_type() -> String {
    "function".to_string()
}

fn object_type() -> String {
    "object".to_string()
}

impl From<FunctionDescriptor> for ToolDefinition {
    fn from(descriptor: FunctionDescriptor) -> Self {
        let required = descriptor
            .parameters
            .iter()
            .map(|p| p.variable.clone())
            .collect();
        let properties = descriptor
            .parameters
            .into_iter()
            .map(|p| {
                (
                    p.variable,
                    PropertySchema {
                        kind: p.kind,
                        description: p.description,
                    },
                )
            })
            .collect();

        ToolDefinition {
            kind: function_type(),
            function: FunctionDefinition {
                name: descriptor.name,
                description: descriptor.description,
                parameters: ParametersSchema {
                    kind: object_type(),
                    properties,
                    required,
                },
            },
        }
    }
}

impl TryFrom<ToolDefinition> for FunctionDescriptor {
    type Error = String;

    fn try_from(definition: ToolDefinition) -> Result<Self, Self::Error> {
        if definition.kind != "function" {
            return Err(format!(
                "unsupported tool type `{}` (expected `function`)",
                definition.kind
            ));
        }

        let FunctionDefinition {
            name,
            description,
            parameters,
        } = definition.function;
        let mut properties = parameters.properties;
        let mut specs = Vec::with_capacity(properties.len());

        // `required` carries declaration order; object keys do not.
        for variable in parameters.required {
            let property = properties.remove(&variable).ok_or_else(|| {
                format!(
                    "function `{}` requires `{}` but declares no such property",
                    name, variable
                )
            })?;
            specs.push(ParameterSpec::new(
                variable,
                property.kind,
                property.description,
            ));
        }
        for (variable, property) in properties {
            specs.push(ParameterSpec::new(
                variable,
                property.kind,
                property.description,
            ));
        }

        Ok(FunctionDescriptor::new(name, description, specs))
    }
}
