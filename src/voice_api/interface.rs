use std::sync::Arc;

use async_trait::async_trait;

use super::error::ApiError;
use super::types::*;

/// External voice-AI API, one instance per API key.
///
/// Every method is a single best-effort call: no retries, no caching.
#[async_trait]
pub trait VoiceApi: Send + Sync {
    async fn list_voices(&self) -> Result<Vec<Voice>, ApiError>;

    async fn list_models(&self) -> Result<Vec<Model>, ApiError>;

    async fn text_to_speech(&self, request: &TextToSpeechRequest) -> Result<AudioOutput, ApiError>;

    async fn speech_to_speech(&self, request: &SpeechToSpeechRequest) -> Result<AudioOutput, ApiError>;

    /// Strip background noise from a recording.
    async fn isolate_audio(&self, audio: &MediaUpload) -> Result<AudioOutput, ApiError>;

    async fn design_voice_previews(&self, request: &VoiceDesignRequest) -> Result<VoicePreviews, ApiError>;

    async fn create_voice_from_preview(
        &self,
        request: &CreateVoiceFromPreviewRequest,
    ) -> Result<CreatedVoice, ApiError>;

    /// Instant voice clone from uploaded samples.
    async fn clone_voice(&self, request: &CloneVoiceRequest) -> Result<CreatedVoice, ApiError>;

    async fn start_dubbing(&self, request: &DubbingRequest) -> Result<DubbingJob, ApiError>;

    async fn dubbing_status(&self, dubbing_id: &str) -> Result<DubbingStatus, ApiError>;

    /// Store a text document in the provider's knowledge base.
    async fn create_knowledge_document(&self, document: &KnowledgeText) -> Result<CreatedKnowledge, ApiError>;

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<CreatedAgent, ApiError>;

    async fn list_tools(&self) -> Result<Vec<ProviderTool>, ApiError>;

    async fn subscription(&self) -> Result<Subscription, ApiError>;
}

/// Builds a [`VoiceApi`] bound to a specific API key.
pub trait VoiceApiFactory: Send + Sync {
    fn client(&self, api_key: &str) -> Arc<dyn VoiceApi>;
}
