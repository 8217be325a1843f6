use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::config_manager::AgentConfiguration;
use crate::error::{FieldError, StudioError};

/// Editable keys of the active agent configuration, named by their dotted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Name,
    Description,
    Tags,
    VoiceId,
    ModelId,
    Stability,
    SimilarityBoost,
    Style,
    UseSpeakerBoost,
    SystemPrompt,
    FirstMessage,
    Language,
    MaxDurationSeconds,
    TimeoutSeconds,
    AsrProvider,
    AsrLanguage,
    AsrModel,
    TurnMode,
    TurnThreshold,
    PrefixPaddingMs,
    SilenceDurationMs,
    Tools,
    KnowledgeEnabled,
    KnowledgeDocuments,
    ChunkSize,
    SimilarityThreshold,
    WebhookUrl,
    MaxConcurrentCalls,
    EnableInterruptions,
    EnableBackchannel,
    RequireAuth,
    LogConversations,
    DataRetentionDays,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 33] = [
        ConfigKey::Name,
        ConfigKey::Description,
        ConfigKey::Tags,
        ConfigKey::VoiceId,
        ConfigKey::ModelId,
        ConfigKey::Stability,
        ConfigKey::SimilarityBoost,
        ConfigKey::Style,
        ConfigKey::UseSpeakerBoost,
        ConfigKey::SystemPrompt,
        ConfigKey::FirstMessage,
        ConfigKey::Language,
        ConfigKey::MaxDurationSeconds,
        ConfigKey::TimeoutSeconds,
        ConfigKey::AsrProvider,
        ConfigKey::AsrLanguage,
        ConfigKey::AsrModel,
        ConfigKey::TurnMode,
        ConfigKey::TurnThreshold,
        ConfigKey::PrefixPaddingMs,
        ConfigKey::SilenceDurationMs,
        ConfigKey::Tools,
        ConfigKey::KnowledgeEnabled,
        ConfigKey::KnowledgeDocuments,
        ConfigKey::ChunkSize,
        ConfigKey::SimilarityThreshold,
        ConfigKey::WebhookUrl,
        ConfigKey::MaxConcurrentCalls,
        ConfigKey::EnableInterruptions,
        ConfigKey::EnableBackchannel,
        ConfigKey::RequireAuth,
        ConfigKey::LogConversations,
        ConfigKey::DataRetentionDays,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::Name => "name",
            ConfigKey::Description => "description",
            ConfigKey::Tags => "tags",
            ConfigKey::VoiceId => "voice.voice_id",
            ConfigKey::ModelId => "voice.model_id",
            ConfigKey::Stability => "voice.stability",
            ConfigKey::SimilarityBoost => "voice.similarity_boost",
            ConfigKey::Style => "voice.style",
            ConfigKey::UseSpeakerBoost => "voice.use_speaker_boost",
            ConfigKey::SystemPrompt => "conversation.system_prompt",
            ConfigKey::FirstMessage => "conversation.first_message",
            ConfigKey::Language => "conversation.language",
            ConfigKey::MaxDurationSeconds => "conversation.max_duration_seconds",
            ConfigKey::TimeoutSeconds => "conversation.timeout_seconds",
            ConfigKey::AsrProvider => "asr.provider",
            ConfigKey::AsrLanguage => "asr.language",
            ConfigKey::AsrModel => "asr.model",
            ConfigKey::TurnMode => "turn_detection.mode",
            ConfigKey::TurnThreshold => "turn_detection.threshold",
            ConfigKey::PrefixPaddingMs => "turn_detection.prefix_padding_ms",
            ConfigKey::SilenceDurationMs => "turn_detection.silence_duration_ms",
            ConfigKey::Tools => "tools",
            ConfigKey::KnowledgeEnabled => "knowledge_base.enabled",
            ConfigKey::KnowledgeDocuments => "knowledge_base.documents",
            ConfigKey::ChunkSize => "knowledge_base.chunk_size",
            ConfigKey::SimilarityThreshold => "knowledge_base.similarity_threshold",
            ConfigKey::WebhookUrl => "platform.webhook_url",
            ConfigKey::MaxConcurrentCalls => "platform.max_concurrent_calls",
            ConfigKey::EnableInterruptions => "platform.enable_interruptions",
            ConfigKey::EnableBackchannel => "platform.enable_backchannel",
            ConfigKey::RequireAuth => "security.require_auth",
            ConfigKey::LogConversations => "security.log_conversations",
            ConfigKey::DataRetentionDays => "security.data_retention_days",
        }
    }

    fn segments(&self) -> impl Iterator<Item = &'static str> {
        self.name().split('.')
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigKey {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| StudioError::NotFound(format!("configuration key '{}'", s)))
    }
}

fn lookup<'v>(doc: &'v Value, key: ConfigKey) -> Option<&'v Value> {
    key.segments().try_fold(doc, |node, segment| node.get(segment))
}

fn assign(doc: &mut Value, key: ConfigKey, value: Value) {
    let mut node = doc;
    let mut segments = key.segments().peekable();
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else { return };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// The only serialization failure is a map with non-string keys, which the
/// configuration model does not contain.
fn to_document(config: &AgentConfiguration) -> Value {
    serde_json::to_value(config).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Session-scoped key/value view of the active agent configuration.
///
/// `set` never validates; shape and range checks happen when a page takes a
/// [`snapshot`](ConfigStore::snapshot) before submitting.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    defaults: Value,
    current: Value,
    dirty: bool,
}

impl ConfigStore {
    pub fn new(defaults: &AgentConfiguration) -> Self {
        let defaults = to_document(defaults);
        Self {
            current: defaults.clone(),
            defaults,
            dirty: false,
        }
    }

    /// Current value, or the declared default when the key was never populated.
    pub fn get(&self, key: ConfigKey) -> Value {
        lookup(&self.current, key)
            .or_else(|| lookup(&self.defaults, key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn default_value(&self, key: ConfigKey) -> Value {
        lookup(&self.defaults, key).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, key: ConfigKey, value: Value) {
        assign(&mut self.current, key, value);
        self.dirty = true;
    }

    pub fn reset(&mut self) {
        self.current = self.defaults.clone();
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn document(&self) -> &Value {
        &self.current
    }

    /// Typed view of the current values. Fails with one field error per key
    /// whose value has the wrong shape (a string where a number belongs, an
    /// unknown model id, a malformed tool).
    pub fn snapshot(&self) -> Result<AgentConfiguration, StudioError> {
        match serde_json::from_value(self.current.clone()) {
            Ok(config) => Ok(config),
            Err(err) => Err(StudioError::Validation(self.shape_errors(&err.to_string()))),
        }
    }

    fn shape_errors(&self, fallback: &str) -> Vec<FieldError> {
        let mut errors: Vec<FieldError> = ConfigKey::ALL
            .iter()
            .filter_map(|&key| {
                let value = lookup(&self.current, key)?.clone();
                let mut candidate = self.defaults.clone();
                assign(&mut candidate, key, value);
                serde_json::from_value::<AgentConfiguration>(candidate)
                    .err()
                    .map(|e| FieldError::new(key.name(), e.to_string()))
            })
            .collect();
        if errors.is_empty() {
            errors.push(FieldError::new("config", fallback));
        }
        errors
    }

    /// Install a whole configuration (import, load of a saved agent).
    pub fn replace(&mut self, config: &AgentConfiguration) {
        self.current = to_document(config);
        self.dirty = true;
    }

    /// Apply an edit to a typed snapshot and write it back only if the edit
    /// succeeds. A failing edit leaves the store untouched.
    pub fn update<T>(
        &mut self,
        edit: impl FnOnce(&mut AgentConfiguration) -> Result<T, StudioError>,
    ) -> Result<T, StudioError> {
        let mut config = self.snapshot()?;
        let out = edit(&mut config)?;
        self.replace(&config);
        Ok(out)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(&AgentConfiguration::default())
    }
}
