use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config_manager::agent::{AgentConfiguration, AsrProvider, SynthesisModel, TurnDetectionMode};
use crate::config_manager::tools::{HttpMethod, ToolDefinition};

/// A voice known to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<Voice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub model_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub can_do_text_to_speech: bool,
    #[serde(default)]
    pub can_do_voice_conversion: bool,
}

/// Audio encodings the provider can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    #[default]
    #[serde(rename = "mp3_44100_128")]
    Mp3Standard,
    #[serde(rename = "mp3_44100_192")]
    Mp3High,
    #[serde(rename = "mp3_22050_32")]
    Mp3Low,
    #[serde(rename = "pcm_16000")]
    Pcm16k,
    #[serde(rename = "pcm_22050")]
    Pcm22k,
    #[serde(rename = "pcm_24000")]
    Pcm24k,
    #[serde(rename = "pcm_44100")]
    Pcm44k,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Mp3Standard,
        OutputFormat::Mp3High,
        OutputFormat::Mp3Low,
        OutputFormat::Pcm16k,
        OutputFormat::Pcm22k,
        OutputFormat::Pcm24k,
        OutputFormat::Pcm44k,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp3Standard => "mp3_44100_128",
            OutputFormat::Mp3High => "mp3_44100_192",
            OutputFormat::Mp3Low => "mp3_22050_32",
            OutputFormat::Pcm16k => "pcm_16000",
            OutputFormat::Pcm22k => "pcm_22050",
            OutputFormat::Pcm24k => "pcm_24000",
            OutputFormat::Pcm44k => "pcm_44100",
        }
    }

    pub fn content_type(&self) -> &'static str {
        if self.as_str().starts_with("mp3") {
            "audio/mpeg"
        } else {
            "audio/pcm"
        }
    }

    pub fn extension(&self) -> &'static str {
        if self.as_str().starts_with("mp3") {
            "mp3"
        } else {
            "pcm"
        }
    }
}

/// `voice_settings` block of synthesis requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettingsPayload {
    pub stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub use_speaker_boost: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextToSpeechRequest {
    #[serde(skip)]
    pub voice_id: String,
    #[serde(skip)]
    pub output_format: OutputFormat,
    #[serde(skip)]
    pub enable_logging: bool,
    #[serde(skip)]
    pub optimize_streaming_latency: Option<u8>,
    pub text: String,
    pub model_id: String,
    pub voice_settings: VoiceSettingsPayload,
}

/// Generated or processed audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioOutput {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// An uploaded audio (or video) file on its way to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechToSpeechRequest {
    pub voice_id: String,
    pub model_id: String,
    pub audio: MediaUpload,
    pub voice_settings: Option<VoiceSettingsPayload>,
    pub remove_background_noise: bool,
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceDesignRequest {
    pub voice_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub auto_generate_text: bool,
    pub loudness: f64,
    pub quality: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    pub guidance_scale: f64,
    #[serde(skip)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePreview {
    pub generated_voice_id: String,
    pub audio_base_64: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePreviews {
    pub previews: Vec<VoicePreview>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateVoiceFromPreviewRequest {
    pub voice_name: String,
    pub voice_description: String,
    pub generated_voice_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedVoice {
    pub voice_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloneVoiceRequest {
    pub name: String,
    pub description: String,
    pub files: Vec<MediaUpload>,
    pub remove_background_noise: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DubbingRequest {
    pub file: MediaUpload,
    pub name: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub num_speakers: u32,
    pub watermark: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DubbingJob {
    pub dubbing_id: String,
    #[serde(default)]
    pub expected_duration_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DubbingStatus {
    pub dubbing_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    #[serde(default)]
    pub target_languages: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A tool registered with the provider's workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTool {
    pub id: String,
    #[serde(default)]
    pub tool_config: ProviderToolConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderToolConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsResponse {
    pub tools: Vec<ProviderTool>,
}

/// Character usage for the account behind the API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub tier: Option<String>,
    pub character_count: u64,
    pub character_limit: u64,
    #[serde(default)]
    pub next_character_count_reset_unix: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Subscription {
    pub fn remaining_characters(&self) -> u64 {
        self.character_limit.saturating_sub(self.character_count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedAgent {
    pub agent_id: String,
}

/// Body of the provider's create-agent call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub tags: Vec<String>,
    pub conversation_config: ConversationConfig,
    pub platform_settings: PlatformSettingsPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationConfig {
    pub agent: AgentSection,
    pub tts: TtsSection,
    pub asr: AsrSection,
    pub turn: TurnSection,
    pub conversation: ConversationSection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSection {
    pub first_message: String,
    pub language: String,
    pub prompt: PromptSection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSection {
    pub prompt: String,
    pub tools: Vec<ToolPayload>,
    pub knowledge_base: Vec<KnowledgeRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Body of `POST /v1/convai/knowledge-base/text`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeText {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedKnowledge {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtsSection {
    pub voice_id: String,
    pub model_id: SynthesisModel,
    pub stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub use_speaker_boost: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsrSection {
    pub provider: AsrProvider,
    pub language: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnSection {
    pub mode: TurnDetectionMode,
    pub turn_timeout: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vad_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_padding_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_duration_ms: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSection {
    pub max_duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformSettingsPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub max_concurrent_calls: u32,
    pub enable_interruptions: bool,
    pub enable_backchannel: bool,
    pub require_auth: bool,
    pub record_conversations: bool,
    pub data_retention_days: u32,
}

/// Tool as the provider expects it. Functions become client tools carrying
/// their body verbatim; webhooks and API calls become server-side webhooks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolPayload {
    Client {
        name: String,
        description: String,
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parameters: Option<Value>,
        expects_response: bool,
    },
    Webhook {
        name: String,
        description: String,
        api_schema: ApiSchema,
        expects_response: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiSchema {
    pub url: String,
    pub method: HttpMethod,
    pub request_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_params_schema: Option<Value>,
}

impl From<&ToolDefinition> for ToolPayload {
    fn from(tool: &ToolDefinition) -> Self {
        match tool {
            ToolDefinition::Function(t) => ToolPayload::Client {
                name: t.name.clone(),
                description: t.description.clone(),
                body: t.body.clone(),
                parameters: t.parameters.clone(),
                expects_response: true,
            },
            ToolDefinition::Webhook(t) => ToolPayload::Webhook {
                name: t.name.clone(),
                description: t.description.clone(),
                api_schema: ApiSchema {
                    url: t.url.clone(),
                    method: t.method,
                    request_headers: t.headers.clone(),
                    query_params_schema: None,
                },
                expects_response: t.expects_response,
            },
            ToolDefinition::ApiCall(t) => ToolPayload::Webhook {
                name: t.name.clone(),
                description: t.description.clone(),
                api_schema: ApiSchema {
                    url: t.url.clone(),
                    method: t.method,
                    request_headers: t.headers.clone(),
                    query_params_schema: t.parameters.clone(),
                },
                expects_response: t.expects_response,
            },
        }
    }
}

/// Knowledge documents are referenced only once they carry a provider id.
/// `description` stays dashboard metadata; the create-agent body has no field for it.
impl From<&AgentConfiguration> for CreateAgentRequest {
    fn from(config: &AgentConfiguration) -> Self {
        let turn = &config.turn_detection;
        let vad = turn.mode == TurnDetectionMode::ServerVad;

        CreateAgentRequest {
            name: config.name.clone(),
            tags: config.tags.clone(),
            conversation_config: ConversationConfig {
                agent: AgentSection {
                    first_message: config.conversation.first_message.clone(),
                    language: config.conversation.language.clone(),
                    prompt: PromptSection {
                        prompt: config.conversation.system_prompt.clone(),
                        tools: config.tools.iter().map(ToolPayload::from).collect(),
                        knowledge_base: if config.knowledge_base.enabled {
                            config
                                .knowledge_base
                                .documents
                                .iter()
                                .filter_map(|d| {
                                    d.provider_id.as_ref().map(|id| KnowledgeRef {
                                        id: id.clone(),
                                        name: d.name.clone(),
                                        kind: "text".to_string(),
                                    })
                                })
                                .collect()
                        } else {
                            Vec::new()
                        },
                    },
                },
                tts: TtsSection {
                    voice_id: config.voice.voice_id.clone(),
                    model_id: config.voice.model_id,
                    stability: config.voice.stability,
                    similarity_boost: config.voice.similarity_boost,
                    style: config.voice.style,
                    use_speaker_boost: config.voice.use_speaker_boost,
                },
                asr: AsrSection {
                    provider: config.asr.provider,
                    language: config.asr.language.clone(),
                    model: config.asr.model.clone(),
                },
                turn: TurnSection {
                    mode: turn.mode,
                    turn_timeout: config.conversation.timeout_seconds,
                    vad_threshold: vad.then_some(turn.threshold),
                    prefix_padding_ms: vad.then_some(turn.prefix_padding_ms),
                    silence_duration_ms: vad.then_some(turn.silence_duration_ms),
                },
                conversation: ConversationSection {
                    max_duration_seconds: config.conversation.max_duration_seconds,
                },
            },
            platform_settings: PlatformSettingsPayload {
                webhook_url: (!config.platform.webhook_url.is_empty())
                    .then(|| config.platform.webhook_url.clone()),
                max_concurrent_calls: config.platform.max_concurrent_calls,
                enable_interruptions: config.platform.enable_interruptions,
                enable_backchannel: config.platform.enable_backchannel,
                require_auth: config.security.require_auth,
                record_conversations: config.security.log_conversations,
                data_retention_days: config.security.data_retention_days,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_manager::tools::FunctionTool;

    #[test]
    fn agent_request_carries_fields_unchanged() {
        let mut config = AgentConfiguration::default();
        config.name = "Support Bot".into();
        config.voice.voice_id = "v1".into();
        config.voice.model_id = SynthesisModel::Turbo;
        config.voice.stability = 0.5;

        let request = CreateAgentRequest::from(&config);
        assert_eq!(request.name, "Support Bot");
        assert_eq!(request.conversation_config.tts.voice_id, "v1");
        assert_eq!(request.conversation_config.tts.model_id, SynthesisModel::Turbo);
        assert_eq!(request.conversation_config.tts.stability, 0.5);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["conversation_config"]["tts"]["model_id"], "eleven_turbo_v2_5");
        assert!(json["platform_settings"].get("webhook_url").is_none());
    }

    #[test]
    fn function_tools_forward_their_body() {
        let tool = ToolDefinition::Function(FunctionTool {
            id: "f".into(),
            name: "sum".into(),
            description: "Adds".into(),
            body: "return a + b".into(),
            parameters: None,
        });
        let json = serde_json::to_value(ToolPayload::from(&tool)).unwrap();
        assert_eq!(json["type"], "client");
        assert_eq!(json["body"], "return a + b");
    }

    #[test]
    fn only_uploaded_documents_are_referenced() {
        let mut config = AgentConfiguration::default();
        let doc = crate::config_manager::KnowledgeDocument {
            id: "d1".into(),
            name: "faq.md".into(),
            size: 3,
            mime: "text/markdown".into(),
            content: Some("faq".into()),
            provider_id: Some("kb_1".into()),
        };
        config.knowledge_base.documents.push(doc.clone());
        config.knowledge_base.documents.push(crate::config_manager::KnowledgeDocument {
            id: "d2".into(),
            name: "manual.pdf".into(),
            provider_id: None,
            ..doc
        });
        let request = CreateAgentRequest::from(&config);
        assert!(request.conversation_config.agent.prompt.knowledge_base.is_empty());

        config.knowledge_base.enabled = true;
        let request = CreateAgentRequest::from(&config);
        let refs = &request.conversation_config.agent.prompt.knowledge_base;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "kb_1");
        assert_eq!(refs[0].kind, "text");
        assert!(serde_json::to_value(&request).unwrap().get("description").is_none());
    }

    #[test]
    fn output_format_metadata() {
        assert_eq!(OutputFormat::default().as_str(), "mp3_44100_128");
        assert_eq!(OutputFormat::Pcm24k.content_type(), "audio/pcm");
        let parsed: OutputFormat = serde_json::from_str("\"pcm_16000\"").unwrap();
        assert_eq!(parsed, OutputFormat::Pcm16k);
    }
}
