use super::types::HttpMethod;
use crate::error::{BridgeError, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the single tool the bridge exposes
pub const NOTION_API_TOOL: &str = "notion-api";

static BUILTIN: Lazy<Arc<ToolRegistry>> = Lazy::new(|| {
    Arc::new(ToolRegistry {
        tools: vec![notion_api_descriptor()],
    })
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

/// Describes a tool clients may invoke with a `function_call` message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterSpec>,
}

fn notion_api_descriptor() -> ToolDescriptor {
    let mut parameters = BTreeMap::new();
    parameters.insert(
        "path".to_string(),
        ParameterSpec {
            kind: ParameterType::String,
            description: "API path relative to the backend base URL, e.g. /pages/{id}".to_string(),
            required: true,
            default: None,
            allowed: None,
        },
    );
    parameters.insert(
        "method".to_string(),
        ParameterSpec {
            kind: ParameterType::String,
            description: "HTTP method".to_string(),
            required: false,
            default: Some(json!(HttpMethod::Get.as_str())),
            allowed: Some(
                HttpMethod::ALL
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
            ),
        },
    );
    parameters.insert(
        "body".to_string(),
        ParameterSpec {
            kind: ParameterType::Object,
            description: "JSON request body, sent for POST and PATCH".to_string(),
            required: false,
            default: None,
            allowed: None,
        },
    );

    ToolDescriptor {
        name: NOTION_API_TOOL.to_string(),
        description: "Call the Notion REST API".to_string(),
        parameters,
    }
}

/// The set of tools the dispatcher routes to the bridge
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn builtin() -> Arc<Self> {
        Arc::clone(&BUILTIN)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }
}

/// Parameters of a `notion-api` call after validation
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub path: String,
    pub method: HttpMethod,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Extract `{path, method, body}`; a null parameter object counts as empty.
    pub fn from_parameters(parameters: &Value) -> Result<Self> {
        let empty = serde_json::Map::new();
        let params = match parameters {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(BridgeError::InvalidParameter(format!(
                    "parameters must be an object, got {}",
                    json_type(other)
                )))
            }
        };

        let path = match params.get("path") {
            None | Some(Value::Null) => {
                return Err(BridgeError::MissingParameter("path".to_string()))
            }
            Some(Value::String(path)) if path.is_empty() => {
                return Err(BridgeError::MissingParameter("path".to_string()))
            }
            Some(Value::String(path)) => path.clone(),
            Some(other) => {
                return Err(BridgeError::InvalidParameter(format!(
                    "path must be a string, got {}",
                    json_type(other)
                )))
            }
        };

        let method = match params.get("method") {
            None | Some(Value::Null) => HttpMethod::default(),
            Some(Value::String(method)) => method.parse()?,
            Some(other) => {
                return Err(BridgeError::InvalidParameter(format!(
                    "method must be a string, got {}",
                    json_type(other)
                )))
            }
        };

        let body = match params.get("body") {
            None | Some(Value::Null) => None,
            Some(body @ Value::Object(_)) => Some(body.clone()),
            Some(other) => {
                return Err(BridgeError::InvalidParameter(format!(
                    "body must be an object, got {}",
                    json_type(other)
                )))
            }
        };

        Ok(Self { path, method, body })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
