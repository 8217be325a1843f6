use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config_manager::agent::is_http_url;
use crate::error::{FieldError, StudioError};
use crate::validation::Violations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Function,
    Webhook,
    ApiCall,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolKind::Function => "function",
            ToolKind::Webhook => "webhook",
            ToolKind::ApiCall => "api_call",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

fn default_get() -> HttpMethod {
    HttpMethod::Get
}

fn default_true() -> bool {
    true
}

/// Free-text function body. Never executed here, only forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub expects_response: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallTool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default = "default_get")]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default = "default_true")]
    pub expects_response: bool,
}

/// A capability the agent can invoke during a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function(FunctionTool),
    Webhook(WebhookTool),
    ApiCall(ApiCallTool),
}

impl ToolDefinition {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolDefinition::Function(_) => ToolKind::Function,
            ToolDefinition::Webhook(_) => ToolKind::Webhook,
            ToolDefinition::ApiCall(_) => ToolKind::ApiCall,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ToolDefinition::Function(t) => &t.id,
            ToolDefinition::Webhook(t) => &t.id,
            ToolDefinition::ApiCall(t) => &t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolDefinition::Function(t) => &t.name,
            ToolDefinition::Webhook(t) => &t.name,
            ToolDefinition::ApiCall(t) => &t.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ToolDefinition::Function(t) => &t.description,
            ToolDefinition::Webhook(t) => &t.description,
            ToolDefinition::ApiCall(t) => &t.description,
        }
    }

    /// Field violations under `prefix` (e.g. `tools[2]`).
    pub fn violations(&self, prefix: &str) -> Vec<FieldError> {
        let mut v = Violations::new();
        v.required(&format!("{}.name", prefix), self.name());
        v.required(&format!("{}.description", prefix), self.description());

        match self {
            ToolDefinition::Function(t) => {
                v.required(&format!("{}.body", prefix), &t.body);
                check_schema(&mut v, prefix, t.parameters.as_ref());
            }
            ToolDefinition::Webhook(t) => check_url(&mut v, prefix, &t.url),
            ToolDefinition::ApiCall(t) => {
                check_url(&mut v, prefix, &t.url);
                check_schema(&mut v, prefix, t.parameters.as_ref());
            }
        }
        v.into_errors()
    }

    pub fn validate(&self) -> Result<(), StudioError> {
        let errors = self.violations("tool");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StudioError::Validation(errors))
        }
    }
}

fn check_url(v: &mut Violations, prefix: &str, url: &str) {
    let field = format!("{}.url", prefix);
    if url.trim().is_empty() {
        v.push(field, "is required");
    } else if !is_http_url(url) {
        v.push(field, "must be an absolute http(s) URL");
    }
}

fn check_schema(v: &mut Violations, prefix: &str, schema: Option<&Value>) {
    if let Some(schema) = schema {
        if !schema.is_object() {
            v.push(format!("{}.parameters", prefix), "must be a JSON object");
        }
    }
}

/// Loose tool-builder form; every field optional until the kind demands it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolDraft {
    #[serde(rename = "type", default)]
    pub kind: ToolKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub body: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub parameters: Option<Value>,
    pub expects_response: Option<bool>,
}

impl TryFrom<ToolDraft> for ToolDefinition {
    type Error = StudioError;

    fn try_from(draft: ToolDraft) -> Result<Self, Self::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let name = draft.name.trim().to_string();
        let description = draft.description.trim().to_string();
        let expects_response = draft.expects_response.unwrap_or(true);

        let tool = match draft.kind {
            ToolKind::Function => ToolDefinition::Function(FunctionTool {
                id,
                name,
                description,
                body: draft.body.unwrap_or_default(),
                parameters: draft.parameters,
            }),
            ToolKind::Webhook => ToolDefinition::Webhook(WebhookTool {
                id,
                name,
                description,
                url: draft.url.unwrap_or_default().trim().to_string(),
                method: draft.method.unwrap_or(HttpMethod::Post),
                headers: draft.headers,
                expects_response,
            }),
            ToolKind::ApiCall => ToolDefinition::ApiCall(ApiCallTool {
                id,
                name,
                description,
                url: draft.url.unwrap_or_default().trim().to_string(),
                method: draft.method.unwrap_or(HttpMethod::Get),
                headers: draft.headers,
                parameters: draft.parameters,
                expects_response,
            }),
        };

        tool.validate()?;
        Ok(tool)
    }
}
