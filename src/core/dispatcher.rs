use super::registry::FunctionRegistry;
use crate::{
    config::{Config, LlmConfig},
    error::{ActionError, Result},
    schemas::{coerce_arguments, validate_arguments},
    services::{
        launcher::{RunHandle, ScriptLauncher},
        llm_client::{ChatCompletionRequest, LlmClient, OpenAiCompatClient},
        log_sink::LogSink,
        tool_call_utils::argument_to_cli_text,
    },
    types::{FunctionDescriptor, PlannedCall, Selection, SkippedCall, TokenUsage, ToolCall},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

/// Instruction that keeps the model from answering in prose
pub const DEFAULT_SYSTEM_PROMPT: &str = "You never answer in natural language. \
You MUST call one of the provided functions, filling in its arguments from the user's request.";

/// Routes a natural-language prompt to a saved function via LLM tool calling
#[derive(Debug)]
pub struct Dispatcher {
    client: Arc<dyn LlmClient>,
    registry: FunctionRegistry,
    launcher: ScriptLauncher,
    model: String,
    timeout: Duration,
    system_prompt: String,
}

/// Result of [`Dispatcher::dispatch`]: the selection plus one handle per launched script
#[derive(Debug)]
pub struct DispatchOutcome {
    pub selection: Selection,
    pub runs: Vec<RunHandle>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn LlmClient>,
        registry: FunctionRegistry,
        launcher: ScriptLauncher,
    ) -> Self {
        let defaults = LlmConfig::default();
        let timeout = defaults.timeout();
        Self {
            client,
            registry,
            launcher,
            model: defaults.model,
            timeout,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn from_config(config: &Config, sink: Arc<dyn LogSink>) -> Self {
        Self::new(
            Arc::new(OpenAiCompatClient::from_config(&config.llm)),
            FunctionRegistry::from_config(config),
            ScriptLauncher::new(config.interpreter.clone(), sink),
        )
        .with_model(config.llm.model.clone())
        .with_timeout(config.llm.timeout())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model which saved function(s) fit `prompt`, without launching anything
    pub async fn select(&self, prompt: &str) -> Result<Selection> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ActionError::Validation(
                "Prompt must not be empty".to_string(),
            ));
        }

        let start_time = Instant::now();
        let descriptors = self.registry.load();
        if descriptors.is_empty() {
            warn!(target: "action_gen::dispatcher", "No saved functions to choose from");
            return Ok(Selection {
                duration: start_time.elapsed(),
                ..Selection::default()
            });
        }

        info!(
            target: "action_gen::dispatcher",
            "Selecting among {} functions with model {}",
            descriptors.len(),
            self.model
        );

        let messages = vec![
            json!({"role": "system", "content": self.system_prompt}),
            json!({"role": "user", "content": prompt}),
        ];
        let tools = descriptors
            .iter()
            .map(FunctionDescriptor::to_tool_definition)
            .collect();
        let request_body = ChatCompletionRequest::new(self.model.clone(), messages)
            .with_tools(tools)
            .with_tool_choice(json!("auto"))
            .into_value();

        let response = timeout(self.timeout, self.client.chat_completion(&request_body))
            .await
            .map_err(|_| ActionError::Timeout("LLM call timed out".to_string()))??;

        let assistant_message = response
            .pointer("/choices/0/message")
            .or_else(|| response.get("message"))
            .ok_or_else(|| {
                ActionError::Llm("Completion response missing assistant message".to_string())
            })?;

        let mut selection = Selection {
            tokens: token_usage(&response),
            assistant_text: assistant_message
                .get("content")
                .and_then(|value| value.as_str())
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            ..Selection::default()
        };

        let tool_calls = assistant_message
            .get("tool_calls")
            .and_then(|value| value.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();

        for raw_call in tool_calls {
            match plan_call(raw_call, &descriptors) {
                Ok(planned) => {
                    info!(
                        target: "action_gen::dispatcher",
                        "Selected {}",
                        planned.call.describe()
                    );
                    selection.planned.push(planned);
                }
                Err((name, err)) => {
                    warn!(target: "action_gen::dispatcher", "Skipping tool call: {}", err);
                    selection.skipped.push(SkippedCall {
                        name,
                        code: err.error_code().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        if tool_calls.is_empty() {
            warn!(target: "action_gen::dispatcher", "No function call detected");
        }

        selection.duration = start_time.elapsed();
        Ok(selection)
    }

    /// Select, then launch every valid call's script in the background
    pub async fn dispatch(&self, prompt: &str) -> Result<DispatchOutcome> {
        let mut selection = self.select(prompt).await?;
        let mut runs = Vec::new();
        let mut launched = Vec::new();

        for planned in std::mem::take(&mut selection.planned) {
            let script = self.registry.script_path(&planned.descriptor.name);
            match self.launcher.launch(&script, &planned.cli_args) {
                Ok(handle) => {
                    runs.push(handle);
                    launched.push(planned);
                }
                Err(err) => {
                    warn!(target: "action_gen::dispatcher", "{}", err);
                    selection.skipped.push(SkippedCall {
                        name: Some(planned.descriptor.name.clone()),
                        code: err.error_code().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        selection.planned = launched;
        Ok(DispatchOutcome { selection, runs })
    }
}

/// Resolve one raw tool call to a descriptor with validated, stringified arguments
fn plan_call(
    raw_call: &Value,
    descriptors: &[FunctionDescriptor],
) -> std::result::Result<PlannedCall, (Option<String>, ActionError)> {
    let name_hint = raw_call
        .pointer("/function/name")
        .and_then(|value| value.as_str())
        .map(str::to_string);

    let call = ToolCall::parse(raw_call).map_err(|err| (name_hint, err))?;
    let descriptor = descriptors
        .iter()
        .find(|d| d.name == call.name)
        .cloned()
        .ok_or_else(|| {
            (
                Some(call.name.clone()),
                ActionError::FunctionNotFound(call.name.clone()),
            )
        })?;

    let mut arguments = call.arguments.clone();
    coerce_arguments(&descriptor, &mut arguments);
    validate_arguments(&descriptor, &arguments).map_err(|err| (Some(call.name.clone()), err))?;

    let cli_args = descriptor
        .parameters
        .iter()
        .filter_map(|param| {
            arguments
                .get(&param.variable)
                .map(|value| (param.variable.clone(), argument_to_cli_text(value)))
        })
        .collect();

    Ok(PlannedCall {
        call: ToolCall { arguments, ..call },
        descriptor,
        cli_args,
    })
}

fn token_usage(response: &Value) -> Option<TokenUsage> {
    let usage = response.get("usage")?;
    Some(TokenUsage {
        prompt_tokens: usage.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: usage.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: usage.get("total_tokens")?.as_u64()? as u32,
    })
}
