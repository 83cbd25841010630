//! Tool calls recovered from plain model text.

pub mod builtin;
pub mod calc;
pub mod flow;
pub mod recovery;
pub mod registry;
pub mod scanner;

pub use builtin::{default_registry, TOOL_SYSTEM_PROMPT};
pub use flow::{FlowObserver, FlowStage, ToolCallingFlow, ToolTurn};
pub use recovery::{
    execute_invocation, execute_invocations, format_tool_results_message, recover_invocations,
    ToolInvocation, ToolOutcome,
};
pub use registry::{ToolDefinition, ToolError, ToolHandler, ToolRegistry};
