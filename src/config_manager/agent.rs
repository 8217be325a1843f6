use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config_manager::tools::ToolDefinition;
use crate::error::{FieldError, StudioError};
use crate::validation::Violations;

/// Voice used by the default agent.
pub const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

/// Languages offered by the builder's pickers.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "es", "fr", "de", "it", "pt", "zh", "ja", "ko"];

/// Synthesis models the provider accepts for agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SynthesisModel {
    #[serde(rename = "eleven_multilingual_v2", alias = "multilingual")]
    Multilingual,
    #[default]
    #[serde(rename = "eleven_turbo_v2_5", alias = "turbo")]
    Turbo,
    #[serde(rename = "eleven_flash_v2_5", alias = "flash")]
    Flash,
    #[serde(rename = "eleven_monolingual_v1", alias = "monolingual")]
    Monolingual,
}

impl SynthesisModel {
    pub const ALL: [SynthesisModel; 4] = [
        SynthesisModel::Multilingual,
        SynthesisModel::Turbo,
        SynthesisModel::Flash,
        SynthesisModel::Monolingual,
    ];

    /// Provider model identifier.
    pub fn id(&self) -> &'static str {
        match self {
            SynthesisModel::Multilingual => "eleven_multilingual_v2",
            SynthesisModel::Turbo => "eleven_turbo_v2_5",
            SynthesisModel::Flash => "eleven_flash_v2_5",
            SynthesisModel::Monolingual => "eleven_monolingual_v1",
        }
    }
}

/// Voice and synthesis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub voice_id: String,
    pub model_id: SynthesisModel,
    pub stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: SynthesisModel::Turbo,
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

impl VoiceSettings {
    pub fn validate(&self, v: &mut Violations) {
        v.required("voice.voice_id", &self.voice_id);
        v.unit("voice.stability", self.stability);
        v.unit("voice.similarity_boost", self.similarity_boost);
        v.unit("voice.style", self.style);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSettings {
    pub system_prompt: String,
    pub first_message: String,
    pub language: String,
    pub max_duration_seconds: u32,
    pub timeout_seconds: u32,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful AI assistant.".to_string(),
            first_message: "Hello! How can I help you today?".to_string(),
            language: "en".to_string(),
            max_duration_seconds: 600,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AsrProvider {
    #[default]
    Elevenlabs,
    Openai,
}

/// Speech recognition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrSettings {
    pub provider: AsrProvider,
    pub language: String,
    pub model: String,
}

impl Default for AsrSettings {
    fn default() -> Self {
        Self {
            provider: AsrProvider::Elevenlabs,
            language: "en".to_string(),
            model: "nova-2".to_string(),
        }
    }
}

impl AsrSettings {
    /// Models each provider exposes.
    pub fn models_for(provider: AsrProvider) -> &'static [&'static str] {
        match provider {
            AsrProvider::Elevenlabs => &["nova-2", "nova-1"],
            AsrProvider::Openai => &["whisper-1"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnDetectionMode {
    #[default]
    ServerVad,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnDetection {
    pub mode: TurnDetectionMode,
    pub threshold: f64,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            mode: TurnDetectionMode::ServerVad,
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 1000,
        }
    }
}

/// Uploaded document referenced by the agent's knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime: String,
    /// Decoded text for plain-text uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Provider-side document id, set once the text has been uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBase {
    pub enabled: bool,
    pub documents: Vec<KnowledgeDocument>,
    pub chunk_size: u32,
    pub similarity_threshold: f64,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            enabled: false,
            documents: Vec::new(),
            chunk_size: 500,
            similarity_threshold: 0.7,
        }
    }
}

impl KnowledgeBase {
    /// Adds a document unless one with the same name is already attached.
    /// Returns whether the document was added.
    pub fn add_document(&mut self, doc: KnowledgeDocument) -> bool {
        if self.documents.iter().any(|d| d.name == doc.name || d.id == doc.id) {
            return false;
        }
        self.documents.push(doc);
        true
    }

    pub fn remove_document(&mut self, id: &str) -> Option<KnowledgeDocument> {
        let idx = self.documents.iter().position(|d| d.id == id)?;
        Some(self.documents.remove(idx))
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub webhook_url: String,
    pub max_concurrent_calls: u32,
    pub enable_interruptions: bool,
    pub enable_backchannel: bool,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            max_concurrent_calls: 10,
            enable_interruptions: true,
            enable_backchannel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub require_auth: bool,
    pub log_conversations: bool,
    pub data_retention_days: u32,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            require_auth: false,
            log_conversations: true,
            data_retention_days: 30,
        }
    }
}

/// One conversational agent definition, edited field by field in the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub voice: VoiceSettings,
    pub conversation: ConversationSettings,
    pub asr: AsrSettings,
    pub turn_detection: TurnDetection,
    pub tools: Vec<ToolDefinition>,
    pub knowledge_base: KnowledgeBase,
    pub platform: PlatformSettings,
    pub security: SecuritySettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for AgentConfiguration {
    fn default() -> Self {
        Self {
            id: None,
            name: "New Agent".to_string(),
            description: "A conversational AI agent".to_string(),
            tags: Vec::new(),
            voice: VoiceSettings::default(),
            conversation: ConversationSettings::default(),
            asr: AsrSettings::default(),
            turn_detection: TurnDetection::default(),
            tools: Vec::new(),
            knowledge_base: KnowledgeBase::default(),
            platform: PlatformSettings::default(),
            security: SecuritySettings::default(),
            created_at: None,
            updated_at: None,
        }
    }
}

fn language_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]{2,3}(-[A-Za-z]{2,4})?$").expect("language pattern is valid")
    })
}

impl AgentConfiguration {
    /// Every field violation, empty when the configuration can be submitted.
    pub fn violations(&self) -> Vec<FieldError> {
        let mut v = Violations::new();

        v.required("name", &self.name);
        for (i, tag) in self.tags.iter().enumerate() {
            if tag.trim().is_empty() {
                v.push(format!("tags[{}]", i), "must not be empty");
            } else if self.tags[..i].contains(tag) {
                v.push(format!("tags[{}]", i), format!("duplicate tag '{}'", tag));
            }
        }

        self.voice.validate(&mut v);

        let conv = &self.conversation;
        if !language_pattern().is_match(&conv.language) {
            v.push("conversation.language", "must be a language code such as 'en' or 'pt-BR'");
        }
        v.range_u32("conversation.max_duration_seconds", conv.max_duration_seconds, 60, 3600);
        v.range_u32("conversation.timeout_seconds", conv.timeout_seconds, 10, 300);

        if !language_pattern().is_match(&self.asr.language) {
            v.push("asr.language", "must be a language code such as 'en' or 'pt-BR'");
        }
        if !AsrSettings::models_for(self.asr.provider).contains(&self.asr.model.as_str()) {
            v.push("asr.model", format!("'{}' is not offered by this provider", self.asr.model));
        }

        let turn = &self.turn_detection;
        if turn.mode == TurnDetectionMode::ServerVad {
            v.unit("turn_detection.threshold", turn.threshold);
            v.range_u32("turn_detection.prefix_padding_ms", turn.prefix_padding_ms, 0, 1000);
            v.range_u32("turn_detection.silence_duration_ms", turn.silence_duration_ms, 500, 5000);
        }

        for (i, tool) in self.tools.iter().enumerate() {
            v.extend(tool.violations(&format!("tools[{}]", i)));
            if self.tools[..i].iter().any(|t| t.name() == tool.name()) {
                v.push(format!("tools[{}].name", i), format!("duplicate tool name '{}'", tool.name()));
            }
        }

        let kb = &self.knowledge_base;
        v.range_u32("knowledge_base.chunk_size", kb.chunk_size, 100, 2000);
        v.unit("knowledge_base.similarity_threshold", kb.similarity_threshold);
        for (i, doc) in kb.documents.iter().enumerate() {
            if kb.documents[..i].iter().any(|d| d.id == doc.id) {
                v.push(format!("knowledge_base.documents[{}]", i), "duplicate document id");
            }
        }

        let platform = &self.platform;
        if !platform.webhook_url.is_empty() && !is_http_url(&platform.webhook_url) {
            v.push("platform.webhook_url", "must be an http(s) URL");
        }
        v.range_u32("platform.max_concurrent_calls", platform.max_concurrent_calls, 1, 100);
        v.range_u32("security.data_retention_days", self.security.data_retention_days, 1, 365);

        v.into_errors()
    }

    /// Gate applied before anything is sent to the provider or the cloud.
    pub fn validate(&self) -> Result<(), StudioError> {
        let errors = self.violations();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StudioError::Validation(errors))
        }
    }

    /// Stamp identity and timestamps when the agent is saved. Returns the id.
    pub fn touch(&mut self, now: DateTime<Utc>) -> String {
        let id = self
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
        id
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }
}

pub(crate) fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_manager::tools::{ToolDefinition, WebhookTool};

    fn fields(config: &AgentConfiguration) -> Vec<String> {
        config.violations().into_iter().map(|e| e.field).collect()
    }

    #[test]
    fn default_configuration_is_submittable() {
        let config = AgentConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.voice.model_id, SynthesisModel::Turbo);
        assert!(config.tools.is_empty());
    }

    #[test]
    fn voice_settings_outside_unit_range_are_rejected() {
        for bad in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
            let mut config = AgentConfiguration::default();
            config.voice.stability = bad;
            config.voice.style = bad;
            let fields = fields(&config);
            assert!(fields.contains(&"voice.stability".to_string()), "{}", bad);
            assert!(fields.contains(&"voice.style".to_string()), "{}", bad);
        }
    }

    #[test]
    fn turbo_alias_deserializes() {
        let model: SynthesisModel = serde_json::from_str("\"turbo\"").unwrap();
        assert_eq!(model, SynthesisModel::Turbo);
        assert_eq!(serde_json::to_string(&model).unwrap(), "\"eleven_turbo_v2_5\"");
    }

    #[test]
    fn turn_ranges_only_apply_to_server_vad() {
        let mut config = AgentConfiguration::default();
        config.turn_detection.silence_duration_ms = 10;
        assert_eq!(fields(&config), vec!["turn_detection.silence_duration_ms"]);

        config.turn_detection.mode = TurnDetectionMode::None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_tool_names_and_tags_are_flagged() {
        let tool = ToolDefinition::Webhook(WebhookTool {
            id: "t1".into(),
            name: "lookup".into(),
            description: "Looks things up".into(),
            url: "https://example.com/hook".into(),
            method: Default::default(),
            headers: Default::default(),
            expects_response: true,
        });
        let mut config = AgentConfiguration::default();
        config.tools = vec![tool.clone(), tool];
        config.tags = vec!["support".into(), "support".into()];
        let fields = fields(&config);
        assert!(fields.contains(&"tools[1].name".to_string()));
        assert!(fields.contains(&"tags[1]".to_string()));
    }

    #[test]
    fn knowledge_documents_are_a_set() {
        let mut kb = KnowledgeBase::default();
        let doc = KnowledgeDocument {
            id: "d1".into(),
            name: "faq.txt".into(),
            size: 10,
            mime: "text/plain".into(),
            content: None,
            provider_id: None,
        };
        assert!(kb.add_document(doc.clone()));
        assert!(!kb.add_document(KnowledgeDocument { id: "d2".into(), ..doc }));
        assert_eq!(kb.document_ids(), vec!["d1"]);
        assert!(kb.remove_document("d1").is_some());
        assert!(kb.documents.is_empty());
    }

    #[test]
    fn webhook_url_must_be_http() {
        let mut config = AgentConfiguration::default();
        config.platform.webhook_url = "ftp://example.com".into();
        assert_eq!(fields(&config), vec!["platform.webhook_url"]);
    }

    #[test]
    fn touch_keeps_identity() {
        let mut config = AgentConfiguration::default();
        let first = Utc::now();
        let id = config.touch(first);
        assert_eq!(config.touch(Utc::now()), id);
        assert_eq!(config.id.as_deref(), Some(id.as_str()));
        assert_eq!(config.created_at, Some(first));
    }
}
