use super::{FunctionDescriptor, ToolCall};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token usage information from the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A tool call that passed lookup and argument validation
#[derive(Debug, Clone)]
pub struct PlannedCall {
    pub call: ToolCall,
    pub descriptor: FunctionDescriptor,
    /// `(variable, value)` pairs in declaration order, ready for the command line
    pub cli_args: Vec<(String, String)>,
}

/// A tool call that was not launched, and why
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedCall {
    /// Function name as returned by the model, if any
    pub name: Option<String>,
    pub code: String,
    pub reason: String,
}

/// What the model chose for one prompt
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub planned: Vec<PlannedCall>,
    pub skipped: Vec<SkippedCall>,
    /// Plain-text reply, when the model answered instead of calling a function
    pub assistant_text: Option<String>,
    pub tokens: Option<TokenUsage>,
    pub duration: Duration,
}

impl Selection {
    /// True when nothing can be launched
    pub fn is_empty(&self) -> bool {
        self.planned.is_empty()
    }

    /// Short multi-line summary for the log
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        for planned in &self.planned {
            lines.push(format!("call {}", planned.call.describe()));
        }
        for skipped in &self.skipped {
            lines.push(format!(
                "skip {}: [{}] {}",
                skipped.name.as_deref().unwrap_or("<unnamed>"),
                skipped.code,
                skipped.reason
            ));
        }
        if lines.is_empty() {
            lines.push("no function call detected".to_string());
        }
        lines.join("\n")
    }
}
