//! action-gen: record browser interactions, save them as parameterised
//! functions, and invoke them by hand or through LLM tool calling.
//!
//! The core is two pieces. [`FunctionBuilder`] rewrites a recorder's raw
//! script into a standalone script that takes its parameters as `--flags` and
//! stays alive until the browser is closed. [`FunctionRegistry`] keeps the
//! list of saved functions in a JSON file that doubles as the `tools` array of
//! a chat-completion request.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use action_gen::{Config, FunctionBuilder, ParameterSpec};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     config.ensure_layout()?;
//!
//!     let raw = std::fs::read_to_string("recording.py")?;
//!     let builder = FunctionBuilder::from_config(&config)?;
//!     let report = builder.build(
//!         &raw,
//!         "search_youtube",
//!         "Search YouTube for a keyword",
//!         &[ParameterSpec::string("query", "What to search for")],
//!     )?;
//!     println!("saved {}", report.script_path.display());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod schemas;
pub mod services;
pub mod types;

pub use config::{Config, LlmConfig};
pub use core::{
    BuildReport, DispatchOutcome, Dispatcher, FunctionBuilder, FunctionRegistry, KeepAlive,
    ScriptRewriter,
};
pub use error::{ActionError, Result};
pub use services::{
    collect_manual_args, LlmClient, LogSink, LogSource, MemorySink, OpenAiCompatClient, Recorder,
    RunHandle, RunOutcome, ScriptLauncher, TracingSink,
};
pub use types::{FunctionDescriptor, ParamKind, ParameterSpec, Selection, ToolCall};

#[cfg(feature = "cli")]
pub mod cli;
