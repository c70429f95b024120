//! Process, HTTP and logging plumbing around the core.

pub mod launcher;
pub mod llm_client;
pub mod log_sink;
pub mod recorder;
pub(crate) mod tool_call_utils;

pub use launcher::{collect_manual_args, RunHandle, RunOutcome, ScriptLauncher};
pub use llm_client::{ChatCompletionRequest, LlmClient, OpenAiCompatClient};
pub use log_sink::{LogSink, LogSource, MemorySink, TracingSink};
pub use recorder::{validate_recording_request, Recorder};
