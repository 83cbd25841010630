use serde_json::{Map, Value};

use super::registry::{ToolError, ToolRegistry};
use super::scanner::candidate_objects;

const TOOL_RESULTS_HEADER: &str = "Tool results:";
const TOOL_RESULTS_FOOTER: &str = "Please provide the final answer based on these results.";

/// A tool call recovered from model text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// An invocation and what running it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub invocation: ToolInvocation,
    pub result: Result<String, ToolError>,
}

impl ToolOutcome {
    /// The result as the model will read it; failures become readable text.
    #[must_use]
    pub fn result_text(&self) -> String {
        match &self.result {
            Ok(text) => text.clone(),
            Err(err @ ToolError::UnknownTool(_)) => format!("Error: {err}"),
            Err(err) => err.to_string(),
        }
    }
}

/// Recover tool invocations from free text.
///
/// Each flat JSON object is matched against every registered tool that
/// declares at least one of its keys. Invocations come out in order of
/// appearance, ties in registry order. Text that yields nothing is not an
/// error.
#[must_use]
pub fn recover_invocations(text: &str, registry: &ToolRegistry) -> Vec<ToolInvocation> {
    let mut invocations = Vec::new();
    for candidate in candidate_objects(text) {
        for tool in registry.matching(&candidate.object) {
            invocations.push(ToolInvocation {
                tool_name: tool.name.clone(),
                arguments: candidate.object.clone(),
            });
        }
    }
    if !invocations.is_empty() {
        tracing::debug!(count = invocations.len(), "recovered tool invocations from text");
    }
    invocations
}

/// Run one invocation. Failures are returned in the outcome, never raised.
#[must_use]
pub fn execute_invocation(invocation: ToolInvocation, registry: &ToolRegistry) -> ToolOutcome {
    let result = match registry.get(&invocation.tool_name) {
        Some(tool) => tool.invoke(&invocation.arguments),
        None => Err(ToolError::UnknownTool(invocation.tool_name.clone())),
    };
    if let Err(err) = &result {
        tracing::warn!(tool = %invocation.tool_name, error = %err, "tool invocation failed");
    }
    ToolOutcome { invocation, result }
}

/// Run invocations in order.
#[must_use]
pub fn execute_invocations(
    invocations: Vec<ToolInvocation>,
    registry: &ToolRegistry,
) -> Vec<ToolOutcome> {
    invocations
        .into_iter()
        .map(|invocation| execute_invocation(invocation, registry))
        .collect()
}

/// The synthetic user message that hands results back to the model.
#[must_use]
pub fn format_tool_results_message(outcomes: &[ToolOutcome]) -> String {
    let mut message = String::from(TOOL_RESULTS_HEADER);
    for outcome in outcomes {
        message.push_str("\n- ");
        message.push_str(&outcome.invocation.tool_name);
        message.push_str(": ");
        message.push_str(&outcome.result_text());
    }
    message.push_str("\n\n");
    message.push_str(TOOL_RESULTS_FOOTER);
    message
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
