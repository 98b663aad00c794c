//! Tools exposed to authenticated clients

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// What `tools/list` reports about a tool
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Run the tool for the authenticated subject and return its text output
    async fn call(&self, arguments: &Value, subject_id: &str) -> Result<String, ToolError>;
}

/// Echoes the message back
struct Echo;

#[async_trait]
impl Tool for Echo {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "echo",
            description: "Echo back the input message",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "The message to echo back" }
                },
                "required": ["message"]
            }),
        }
    }

    async fn call(&self, arguments: &Value, _subject_id: &str) -> Result<String, ToolError> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("'message' must be a string".to_string()))?;
        Ok(format!("Echo: {message}"))
    }
}

/// Connectivity check that also shows who the server thinks is calling
struct Ping;

#[async_trait]
impl Tool for Ping {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "ping",
            description: "Simple ping tool to test connectivity",
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn call(&self, _arguments: &Value, subject_id: &str) -> Result<String, ToolError> {
        Ok(format!("pong for {subject_id}"))
    }
}

/// The set of tools served by this instance
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: vec![Box::new(Echo), Box::new(Ping)],
        }
    }
}

impl ToolRegistry {
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    pub async fn call(
        &self,
        name: &str,
        arguments: &Value,
        subject_id: &str,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.descriptor().name == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.call(arguments, subject_id).await
    }
}
