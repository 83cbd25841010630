use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::protocol::openai_chat::{OpenAiTool, OpenAiToolFunction};

/// Why a tool invocation produced no result. Always rendered back to the
/// model as text, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown function {0}")]
    UnknownTool(String),
    #[error("missing required argument '{argument}' for {tool}")]
    MissingArgument { tool: String, argument: String },
    #[error("invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },
    #[error("{0}")]
    Execution(String),
}

pub type ToolHandler = fn(&Map<String, Value>) -> Result<String, ToolError>;

/// A locally executable tool and the schema advertised for it.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema object with `properties` and optional `required`.
    pub parameters: Value,
    pub handler: ToolHandler,
}

impl ToolDefinition {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    /// Property names declared in the parameter schema.
    pub fn declared_properties(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|properties| properties.keys().map(String::as_str))
    }

    pub fn required_properties(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    /// Presence heuristic: at least one declared property is a key of `arguments`.
    #[must_use]
    pub fn matches(&self, arguments: &Map<String, Value>) -> bool {
        self.declared_properties()
            .any(|property| arguments.contains_key(property))
    }

    /// Check required keys, then run the handler.
    ///
    /// # Errors
    ///
    /// [`ToolError::MissingArgument`] for the first absent required key, or
    /// whatever the handler reports.
    pub fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        if let Some(missing) = self
            .required_properties()
            .find(|property| !arguments.contains_key(*property))
        {
            return Err(ToolError::MissingArgument {
                tool: self.name.clone(),
                argument: missing.to_string(),
            });
        }
        (self.handler)(arguments)
    }

    #[must_use]
    pub fn to_openai_tool(&self) -> OpenAiTool {
        OpenAiTool {
            type_: "function".to_string(),
            function: OpenAiToolFunction {
                name: self.name.clone(),
                description: Some(self.description.clone()),
                parameters: Some(self.parameters.clone()),
            },
        }
    }
}

/// Tools in registration order, with a name index.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: FxHashMap<String, usize>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: ToolDefinition) {
        if let Some(&slot) = self.index.get(&tool.name) {
            self.tools[slot] = tool;
            return;
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
    }

    #[must_use]
    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.register(tool);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Every tool whose declared properties overlap `arguments`, in registry order.
    pub fn matching<'a>(
        &'a self,
        arguments: &'a Map<String, Value>,
    ) -> impl Iterator<Item = &'a ToolDefinition> + 'a {
        self.tools.iter().filter(move |tool| tool.matches(arguments))
    }

    /// Tool schemas in the chat-completions `tools` shape.
    #[must_use]
    pub fn to_openai_tools(&self) -> Vec<OpenAiTool> {
        self.tools.iter().map(ToolDefinition::to_openai_tool).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(arguments: &Map<String, Value>) -> Result<String, ToolError> {
        Ok(Value::Object(arguments.clone()).to_string())
    }

    fn lookup_tool() -> ToolDefinition {
        ToolDefinition::new(
            "lookup",
            "Look something up",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}, "limit": {"type": "integer"}},
                "required": ["query"]
            }),
            echo,
        )
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_matches_on_any_declared_property() {
        let tool = lookup_tool();
        assert!(tool.matches(&object(json!({"limit": 3}))));
        assert!(tool.matches(&object(json!({"query": "x", "other": 1}))));
        assert!(!tool.matches(&object(json!({"other": 1}))));
    }

    #[test]
    fn test_invoke_requires_declared_keys() {
        let tool = lookup_tool();
        let err = tool.invoke(&object(json!({"limit": 3}))).unwrap_err();
        assert_eq!(
            err,
            ToolError::MissingArgument {
                tool: "lookup".into(),
                argument: "query".into()
            }
        );
        assert_eq!(tool.invoke(&object(json!({"query": "q"}))).unwrap(), r#"{"query":"q"}"#);
    }

    #[test]
    fn test_register_replaces_same_name_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(lookup_tool());
        registry.register(ToolDefinition::new("other", "", json!({}), echo));
        registry.register(ToolDefinition::new("lookup", "v2", json!({}), echo));
        let names: Vec<&str> = registry.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["lookup", "other"]);
        assert_eq!(registry.get("lookup").unwrap().description, "v2");
    }

    #[test]
    fn test_openai_tool_shape() {
        let tools = ToolRegistry::new().with_tool(lookup_tool()).to_openai_tools();
        let value = serde_json::to_value(&tools).unwrap();
        assert_eq!(value[0]["type"], "function");
        assert_eq!(value[0]["function"]["name"], "lookup");
        assert_eq!(value[0]["function"]["parameters"]["required"][0], "query");
    }
}
