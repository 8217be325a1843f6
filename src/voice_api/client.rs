use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use super::error::ApiError;
use super::interface::VoiceApi;
use super::types::*;

/// ElevenLabs REST client bound to one API key.
#[derive(Clone)]
pub struct ElevenLabsClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ElevenLabsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ElevenLabsClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build `{base}/v1/<segments...>` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::Network(format!("invalid provider URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Network(format!("invalid provider URL {}", self.base_url)))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.header("xi-api-key", &self.api_key).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_response(status.as_u16(), &body);
        error!("Provider call failed with HTTP {}: {}", status, err);
        Err(err)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        debug!("GET {}", url);
        let response = self.send(self.http.get(url)).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!("POST {}", url);
        let response = self.send(self.http.post(url).json(body)).await?;
        Ok(response.json().await?)
    }

    async fn read_audio(response: Response, fallback_type: &str) -> Result<AudioOutput, ApiError> {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(fallback_type)
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        debug!("Received {} bytes of {}", bytes.len(), content_type);
        Ok(AudioOutput { bytes, content_type })
    }
}

fn file_part(upload: &MediaUpload) -> Result<Part, ApiError> {
    Part::bytes(upload.bytes.clone())
        .file_name(upload.file_name.clone())
        .mime_str(&upload.content_type)
        .map_err(|_| ApiError::Validation(format!("invalid content type '{}'", upload.content_type)))
}

#[async_trait]
impl VoiceApi for ElevenLabsClient {
    async fn list_voices(&self) -> Result<Vec<Voice>, ApiError> {
        let response: VoicesResponse = self.get_json(&["voices"]).await?;
        Ok(response.voices)
    }

    async fn list_models(&self) -> Result<Vec<Model>, ApiError> {
        self.get_json(&["models"]).await
    }

    async fn text_to_speech(&self, request: &TextToSpeechRequest) -> Result<AudioOutput, ApiError> {
        let url = self.endpoint(&["text-to-speech", &request.voice_id])?;
        let mut query = vec![
            ("output_format", request.output_format.as_str().to_string()),
            ("enable_logging", request.enable_logging.to_string()),
        ];
        if let Some(latency) = request.optimize_streaming_latency {
            query.push(("optimize_streaming_latency", latency.to_string()));
        }

        debug!(
            "Synthesizing {} characters with voice {} ({})",
            request.text.chars().count(),
            request.voice_id,
            request.model_id
        );
        let response = self
            .send(self.http.post(url).query(&query).json(request))
            .await?;
        Self::read_audio(response, request.output_format.content_type()).await
    }

    async fn speech_to_speech(&self, request: &SpeechToSpeechRequest) -> Result<AudioOutput, ApiError> {
        let url = self.endpoint(&["speech-to-speech", &request.voice_id])?;
        let mut form = Form::new()
            .part("audio", file_part(&request.audio)?)
            .text("model_id", request.model_id.clone())
            .text("remove_background_noise", request.remove_background_noise.to_string());
        if let Some(settings) = &request.voice_settings {
            let encoded = serde_json::to_string(settings)
                .map_err(|e| ApiError::Validation(format!("voice settings: {}", e)))?;
            form = form.text("voice_settings", encoded);
        }

        let response = self
            .send(
                self.http
                    .post(url)
                    .query(&[("output_format", request.output_format.as_str())])
                    .multipart(form),
            )
            .await?;
        Self::read_audio(response, request.output_format.content_type()).await
    }

    async fn isolate_audio(&self, audio: &MediaUpload) -> Result<AudioOutput, ApiError> {
        let url = self.endpoint(&["audio-isolation"])?;
        let form = Form::new().part("audio", file_part(audio)?);
        let response = self.send(self.http.post(url).multipart(form)).await?;
        Self::read_audio(response, "audio/mpeg").await
    }

    async fn design_voice_previews(&self, request: &VoiceDesignRequest) -> Result<VoicePreviews, ApiError> {
        let mut url = self.endpoint(&["text-to-voice", "create-previews"])?;
        url.query_pairs_mut()
            .append_pair("output_format", request.output_format.as_str());
        self.post_json(url, request).await
    }

    async fn create_voice_from_preview(
        &self,
        request: &CreateVoiceFromPreviewRequest,
    ) -> Result<CreatedVoice, ApiError> {
        let url = self.endpoint(&["text-to-voice", "create-voice-from-preview"])?;
        self.post_json(url, request).await
    }

    async fn clone_voice(&self, request: &CloneVoiceRequest) -> Result<CreatedVoice, ApiError> {
        let url = self.endpoint(&["voices", "add"])?;
        let mut form = Form::new()
            .text("name", request.name.clone())
            .text("description", request.description.clone())
            .text("remove_background_noise", request.remove_background_noise.to_string());
        for file in &request.files {
            form = form.part("files", file_part(file)?);
        }

        let response = self.send(self.http.post(url).multipart(form)).await?;
        Ok(response.json().await?)
    }

    async fn start_dubbing(&self, request: &DubbingRequest) -> Result<DubbingJob, ApiError> {
        let url = self.endpoint(&["dubbing"])?;
        let mut form = Form::new()
            .part("file", file_part(&request.file)?)
            .text("source_lang", request.source_lang.clone())
            .text("target_lang", request.target_lang.clone())
            .text("num_speakers", request.num_speakers.to_string())
            .text("watermark", request.watermark.to_string());
        if let Some(name) = &request.name {
            form = form.text("name", name.clone());
        }

        let response = self.send(self.http.post(url).multipart(form)).await?;
        Ok(response.json().await?)
    }

    async fn dubbing_status(&self, dubbing_id: &str) -> Result<DubbingStatus, ApiError> {
        self.get_json(&["dubbing", dubbing_id]).await
    }

    async fn create_knowledge_document(&self, document: &KnowledgeText) -> Result<CreatedKnowledge, ApiError> {
        let url = self.endpoint(&["convai", "knowledge-base", "text"])?;
        self.post_json(url, document).await
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<CreatedAgent, ApiError> {
        let url = self.endpoint(&["convai", "agents", "create"])?;
        self.post_json(url, request).await
    }

    async fn list_tools(&self) -> Result<Vec<ProviderTool>, ApiError> {
        let response: ToolsResponse = self.get_json(&["convai", "tools"]).await?;
        Ok(response.tools)
    }

    async fn subscription(&self) -> Result<Subscription, ApiError> {
        self.get_json(&["user", "subscription"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ElevenLabsClient {
        ElevenLabsClient::new(Client::new(), base, "sk-test")
    }

    #[test]
    fn endpoints_are_versioned_and_encoded() {
        let url = client("https://api.elevenlabs.io")
            .endpoint(&["text-to-speech", "abc/../def"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.elevenlabs.io/v1/text-to-speech/abc%2F..%2Fdef"
        );

        let url = client("http://localhost:9000/").endpoint(&["voices"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/v1/voices");
    }

    #[test]
    fn invalid_base_url_is_a_network_error() {
        assert!(matches!(
            client("not a url").endpoint(&["voices"]),
            Err(ApiError::Network(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_network_error() {
        let err = client("http://127.0.0.1:9").list_voices().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[test]
    fn bad_content_type_is_rejected_before_sending() {
        let upload = MediaUpload {
            file_name: "take.mp3".into(),
            content_type: "not a mime".into(),
            bytes: vec![1, 2, 3],
        };
        assert!(matches!(file_part(&upload), Err(ApiError::Validation(_))));
    }

    #[test]
    fn debug_output_hides_key() {
        let rendered = format!("{:?}", client("https://api.elevenlabs.io"));
        assert!(!rendered.contains("sk-test"));
    }
}
