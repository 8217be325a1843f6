pub mod manager;
pub mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cloud::CloudUser;
use crate::config_manager::{AgentConfiguration, ToolDefinition};
use crate::error::StudioError;
use crate::voice_api::types::{DubbingJob, Model, Voice};

pub use manager::{SessionHandle, SessionManager};
pub use store::{ConfigKey, ConfigStore};

/// Generation history is capped per session.
pub const HISTORY_LIMIT: usize = 50;

/// Turns kept in the test conversation; older turns fall off the front.
pub const TEST_TURN_LIMIT: usize = 100;

/// Dubbing jobs tracked per session; older jobs fall off the front.
pub const DUBBING_JOB_LIMIT: usize = 50;

/// Tools kept in the session's tool library.
pub const TOOL_LIBRARY_LIMIT: usize = 100;

/// Agents kept in the session's saved list.
pub const SAVED_AGENT_LIMIT: usize = 50;

fn drop_oldest<T>(items: &mut Vec<T>, limit: usize) {
    if items.len() > limit {
        let excess = items.len() - limit;
        items.drain(..excess);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
}

/// One line of the agent builder's test conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A completed generation shown in the page history lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRecord {
    pub id: String,
    pub feature: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    pub characters: usize,
    pub created_at: DateTime<Utc>,
}

/// Everything one dashboard user has built up since their first request.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub store: ConfigStore,
    pub api_key: Option<String>,
    pub voices: Vec<Voice>,
    pub models: Vec<Model>,
    pub saved_agents: BTreeMap<String, AgentConfiguration>,
    pub custom_tools: Vec<ToolDefinition>,
    pub history: Vec<GenerationRecord>,
    pub test_conversation: Vec<ConversationTurn>,
    /// User messages sent since the test conversation was last cleared.
    pub test_messages_sent: usize,
    pub dubbing_jobs: Vec<DubbingJob>,
    pub deployed_agent_id: Option<String>,
    pub cloud_user: Option<CloudUser>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, defaults: &AgentConfiguration) -> Self {
        Self {
            id: id.into(),
            store: ConfigStore::new(defaults),
            api_key: None,
            voices: Vec::new(),
            models: Vec::new(),
            saved_agents: BTreeMap::new(),
            custom_tools: Vec::new(),
            history: Vec::new(),
            test_conversation: Vec::new(),
            test_messages_sent: 0,
            dubbing_jobs: Vec::new(),
            deployed_agent_id: None,
            cloud_user: None,
            created_at: Utc::now(),
        }
    }

    pub fn record_generation(
        &mut self,
        feature: &str,
        summary: impl Into<String>,
        voice_id: Option<String>,
        characters: usize,
    ) {
        self.history.push(GenerationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            feature: feature.to_string(),
            summary: summary.into(),
            voice_id,
            characters,
            created_at: Utc::now(),
        });
        drop_oldest(&mut self.history, HISTORY_LIMIT);
    }

    pub fn push_test_turn(&mut self, turn: ConversationTurn) {
        if turn.role == TurnRole::User {
            self.test_messages_sent += 1;
        }
        self.test_conversation.push(turn);
        drop_oldest(&mut self.test_conversation, TEST_TURN_LIMIT);
    }

    pub fn clear_test_conversation(&mut self) {
        self.test_conversation.clear();
        self.test_messages_sent = 0;
    }

    pub fn track_dubbing_job(&mut self, job: DubbingJob) {
        self.dubbing_jobs.push(job);
        drop_oldest(&mut self.dubbing_jobs, DUBBING_JOB_LIMIT);
    }

    /// Whether `tool` would be a new library entry. Fails when it would be
    /// new and the library is full.
    pub fn check_library_room(&self, tool: &ToolDefinition) -> Result<bool, StudioError> {
        if self.custom_tools.iter().any(|t| t.name() == tool.name()) {
            return Ok(false);
        }
        if self.custom_tools.len() >= TOOL_LIBRARY_LIMIT {
            return Err(StudioError::invalid(
                "tool",
                format!("the tool library holds at most {} tools", TOOL_LIBRARY_LIMIT),
            ));
        }
        Ok(true)
    }

    /// Fails when saving `id` would grow the saved list past its limit.
    pub fn check_saved_agent_room(&self, id: Option<&str>) -> Result<(), StudioError> {
        let replaces = id.is_some_and(|id| self.saved_agents.contains_key(id));
        if !replaces && self.saved_agents.len() >= SAVED_AGENT_LIMIT {
            return Err(StudioError::invalid(
                "saved_agents",
                format!("at most {} agents can be saved; delete one first", SAVED_AGENT_LIMIT),
            ));
        }
        Ok(())
    }

    pub fn history_for(&self, feature: &str) -> Vec<&GenerationRecord> {
        self.history.iter().rev().filter(|r| r.feature == feature).collect()
    }

    pub fn saved_agent_summaries(&self) -> Vec<Value> {
        self.saved_agents
            .iter()
            .map(|(id, agent)| {
                json!({
                    "id": id,
                    "name": agent.name,
                    "description": agent.description,
                    "tags": agent.tags,
                    "updated_at": agent.updated_at,
                })
            })
            .collect()
    }

    /// Session overview returned by `GET /api/sessions/:sid`. The API key is
    /// reported by presence only.
    pub fn summary(&self) -> Value {
        json!({
            "id": self.id,
            "created_at": self.created_at,
            "has_api_key": self.api_key.is_some(),
            "config_dirty": self.store.is_dirty(),
            "voices": self.voices.len(),
            "models": self.models.len(),
            "saved_agents": self.saved_agent_summaries(),
            "custom_tools": self.custom_tools.len(),
            "history": self.history.len(),
            "test_messages": self.test_conversation.len(),
            "deployed_agent_id": self.deployed_agent_id,
            "cloud_user": self.cloud_user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_the_latest_entries() {
        let mut session = Session::new("s1", &AgentConfiguration::default());
        for i in 0..HISTORY_LIMIT + 5 {
            session.record_generation("text-to-speech", format!("clip {}", i), None, i);
        }
        assert_eq!(session.history.len(), HISTORY_LIMIT);
        assert_eq!(session.history[0].summary, "clip 5");
        assert_eq!(session.history_for("text-to-speech")[0].summary, format!("clip {}", HISTORY_LIMIT + 4));
        assert!(session.history_for("dubbing").is_empty());
    }

    #[test]
    fn test_conversation_and_dubbing_jobs_are_capped() {
        let mut session = Session::new("s1", &AgentConfiguration::default());
        for i in 0..TEST_TURN_LIMIT {
            session.push_test_turn(ConversationTurn::new(TurnRole::User, format!("q{}", i)));
            session.push_test_turn(ConversationTurn::new(TurnRole::Agent, format!("a{}", i)));
        }
        assert_eq!(session.test_conversation.len(), TEST_TURN_LIMIT);
        assert_eq!(session.test_messages_sent, TEST_TURN_LIMIT);
        assert_eq!(session.test_conversation.last().unwrap().content, format!("a{}", TEST_TURN_LIMIT - 1));
        session.clear_test_conversation();
        assert_eq!(session.test_messages_sent, 0);

        for i in 0..DUBBING_JOB_LIMIT + 3 {
            session.track_dubbing_job(DubbingJob {
                dubbing_id: format!("dub{}", i),
                expected_duration_sec: None,
            });
        }
        assert_eq!(session.dubbing_jobs.len(), DUBBING_JOB_LIMIT);
        assert_eq!(session.dubbing_jobs[0].dubbing_id, "dub3");
    }

    #[test]
    fn saved_agents_stop_at_the_limit_but_can_be_replaced() {
        let mut session = Session::new("s1", &AgentConfiguration::default());
        for i in 0..SAVED_AGENT_LIMIT {
            session.saved_agents.insert(format!("agent{}", i), AgentConfiguration::default());
        }
        assert!(session.check_saved_agent_room(None).is_err());
        assert!(session.check_saved_agent_room(Some("new")).is_err());
        assert!(session.check_saved_agent_room(Some("agent7")).is_ok());
    }

    #[test]
    fn summary_hides_the_api_key() {
        let mut session = Session::new("s1", &AgentConfiguration::default());
        session.api_key = Some("sk_live_secret".into());
        let summary = session.summary().to_string();
        assert!(!summary.contains("sk_live_secret"));
        assert!(summary.contains("\"has_api_key\":true"));
    }
}
