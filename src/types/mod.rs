pub mod descriptor;
pub mod dispatch;
pub mod tool_call;

pub use descriptor::{FunctionDescriptor, ParamKind, ParameterSpec};
pub use dispatch::{PlannedCall, Selection, SkippedCall, TokenUsage};
pub use tool_call::ToolCall;
