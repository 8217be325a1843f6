use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config_manager::AgentConfiguration;
use crate::session::ConversationTurn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    #[error("sign in to use cloud features")]
    NotSignedIn,

    #[error("cloud authentication failed: {0}")]
    Auth(String),

    #[error("cloud storage unreachable: {0}")]
    Network(String),

    #[error("cloud storage rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl From<reqwest::Error> for CloudError {
    fn from(err: reqwest::Error) -> Self {
        CloudError::Network(err.to_string())
    }
}

/// Signed-in cloud identity. The access token never leaves the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudUser {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignUpOutcome {
    pub user_id: Option<String>,
    /// Provider wants the address verified before the first sign-in.
    pub confirmation_required: bool,
}

/// Row ids may come back as integers or UUID strings.
fn deserialize_row_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// One agent configuration synced to cloud storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAgentRecord {
    #[serde(deserialize_with = "deserialize_row_id")]
    pub id: String,
    pub agent_name: String,
    pub config: AgentConfiguration,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRecord {
    pub agent_id: Option<String>,
    pub messages: Vec<ConversationTurn>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageMetric {
    pub feature: String,
    pub count: u64,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAnalytics {
    pub total_usage: usize,
    pub agent_count: usize,
    pub conversation_count: usize,
}

/// Hosted authentication and row storage keyed by user identity.
#[async_trait]
pub trait CloudStore: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<SignUpOutcome, CloudError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<CloudUser, CloudError>;

    async fn sign_out(&self, user: &CloudUser) -> Result<(), CloudError>;

    async fn save_api_key(&self, user: &CloudUser, api_key: &str) -> Result<(), CloudError>;

    async fn load_api_key(&self, user: &CloudUser) -> Result<Option<String>, CloudError>;

    async fn save_agent_config(
        &self,
        user: &CloudUser,
        config: &AgentConfiguration,
    ) -> Result<SavedAgentRecord, CloudError>;

    async fn list_agent_configs(&self, user: &CloudUser) -> Result<Vec<SavedAgentRecord>, CloudError>;

    /// Returns whether a row was removed.
    async fn delete_agent_config(&self, user: &CloudUser, record_id: &str) -> Result<bool, CloudError>;

    async fn save_conversation(&self, user: &CloudUser, conversation: &ConversationRecord) -> Result<(), CloudError>;

    async fn record_usage(&self, user: &CloudUser, metric: &UsageMetric) -> Result<(), CloudError>;

    async fn user_analytics(&self, user: &CloudUser) -> Result<UserAnalytics, CloudError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_accept_numbers_and_strings() {
        let numeric: SavedAgentRecord = serde_json::from_value(serde_json::json!({
            "id": 42,
            "agent_name": "Support Bot",
            "config": {"name": "Support Bot"},
        }))
        .unwrap();
        assert_eq!(numeric.id, "42");

        let uuid: SavedAgentRecord = serde_json::from_value(serde_json::json!({
            "id": "7d1c",
            "agent_name": "Support Bot",
            "config": {},
        }))
        .unwrap();
        assert_eq!(uuid.id, "7d1c");
        assert_eq!(uuid.config.voice, AgentConfiguration::default().voice);
    }

    #[test]
    fn access_token_is_not_serialized() {
        let user = CloudUser {
            id: "u1".into(),
            email: "a@b.c".into(),
            access_token: "secret".into(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }
}
