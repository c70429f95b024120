pub mod builder;
pub mod dispatcher;
pub mod registry;
pub mod rewrite;

pub use builder::{BuildReport, FunctionBuilder};
pub use dispatcher::{DispatchOutcome, Dispatcher, DEFAULT_SYSTEM_PROMPT};
pub use registry::{FunctionRegistry, SCRATCH_STEM};
pub use rewrite::{KeepAlive, RewrittenScript, ScriptRewriter, SessionSetup};
