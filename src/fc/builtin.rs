use serde_json::{json, Map, Value};

use super::calc::{evaluate, format_number};
use super::registry::{ToolDefinition, ToolError, ToolRegistry};

/// System prompt for models that answer tool requests with bare JSON.
pub const TOOL_SYSTEM_PROMPT: &str = r#"You are a helpful assistant with access to these tools:
- calculate: Perform mathematical calculations by returning JSON like {"expression": "2+2"}
- get_weather: Get weather by returning JSON like {"location": "San Francisco, CA"}

When you want to use a tool, output ONLY the JSON for that tool. Do not include any other text."#;

fn string_argument<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<Option<&'a str>, ToolError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => Err(ToolError::InvalidArgument {
            argument: name.to_string(),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn get_weather(arguments: &Map<String, Value>) -> Result<String, ToolError> {
    let location = string_argument(arguments, "location")?.unwrap_or_default();
    let unit = string_argument(arguments, "unit")?.unwrap_or("fahrenheit");
    let Some(symbol) = unit.chars().next() else {
        return Err(ToolError::InvalidArgument {
            argument: "unit".into(),
            reason: "must not be empty".into(),
        });
    };
    Ok(format!(
        "The weather in {location} is 72°{}, partly cloudy",
        symbol.to_uppercase()
    ))
}

fn calculate(arguments: &Map<String, Value>) -> Result<String, ToolError> {
    let expression = match arguments.get("expression") {
        Some(Value::Number(number)) => return Ok(number.to_string()),
        _ => string_argument(arguments, "expression")?.unwrap_or_default(),
    };
    evaluate(expression)
        .map(format_number)
        .map_err(|err| ToolError::Execution(format!("Error calculating: {err}")))
}

#[must_use]
pub fn weather_tool() -> ToolDefinition {
    ToolDefinition::new(
        "get_weather",
        "Get the current weather for a location",
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                },
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "The temperature unit"
                }
            },
            "required": ["location"]
        }),
        get_weather,
    )
}

#[must_use]
pub fn calculator_tool() -> ToolDefinition {
    ToolDefinition::new(
        "calculate",
        "Perform a mathematical calculation",
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The mathematical expression to evaluate, e.g. '2 + 2' or 'sqrt(16)'"
                }
            },
            "required": ["expression"]
        }),
        calculate,
    )
}

/// `get_weather` then `calculate`.
#[must_use]
pub fn default_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(weather_tool())
        .with_tool(calculator_tool())
}
