#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, Response};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use voice_studio_backend::cloud::{
    CloudError, CloudStore, CloudUser, ConversationRecord, SavedAgentRecord, SignUpOutcome, UsageMetric,
    UserAnalytics,
};
use voice_studio_backend::config::AppConfig;
use voice_studio_backend::config_manager::AgentConfiguration;
use voice_studio_backend::state::AppState;
use voice_studio_backend::voice_api::types::*;
use voice_studio_backend::voice_api::{ApiError, VoiceApi, VoiceApiFactory};

pub const API_KEY: &str = "sk_test_0123456789";

/// Provider double that records every call it receives.
#[derive(Default)]
pub struct FakeVoiceApi {
    pub calls: Mutex<Vec<String>>,
    pub agents: Mutex<Vec<CreateAgentRequest>>,
    pub speech: Mutex<Vec<TextToSpeechRequest>>,
    pub conversions: Mutex<Vec<SpeechToSpeechRequest>>,
    pub clones: Mutex<Vec<CloneVoiceRequest>>,
    pub dubbings: Mutex<Vec<DubbingRequest>>,
    pub knowledge: Mutex<Vec<KnowledgeText>>,
    pub failure: Mutex<Option<ApiError>>,
}

impl FakeVoiceApi {
    pub fn fail_with(&self, err: ApiError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == name).count()
    }

    fn enter(&self, name: &str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(name.to_string());
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn fake_audio() -> AudioOutput {
    AudioOutput {
        bytes: b"ID3fake-mp3".to_vec(),
        content_type: "audio/mpeg".into(),
    }
}

#[async_trait]
impl VoiceApi for FakeVoiceApi {
    async fn list_voices(&self) -> Result<Vec<Voice>, ApiError> {
        self.enter("list_voices")?;
        Ok(vec![Voice {
            voice_id: "v1".into(),
            name: "Rachel".into(),
            category: Some("premade".into()),
            labels: None,
            preview_url: None,
        }])
    }

    async fn list_models(&self) -> Result<Vec<Model>, ApiError> {
        self.enter("list_models")?;
        Ok(vec![Model {
            model_id: "eleven_turbo_v2_5".into(),
            name: "Turbo v2.5".into(),
            description: None,
            can_do_text_to_speech: true,
            can_do_voice_conversion: false,
        }])
    }

    async fn text_to_speech(&self, request: &TextToSpeechRequest) -> Result<AudioOutput, ApiError> {
        self.enter("text_to_speech")?;
        self.speech.lock().unwrap().push(request.clone());
        Ok(AudioOutput {
            bytes: b"ID3fake-mp3".to_vec(),
            content_type: "audio/mpeg".into(),
        })
    }

    async fn speech_to_speech(&self, request: &SpeechToSpeechRequest) -> Result<AudioOutput, ApiError> {
        self.enter("speech_to_speech")?;
        self.conversions.lock().unwrap().push(request.clone());
        Ok(fake_audio())
    }

    async fn isolate_audio(&self, _audio: &MediaUpload) -> Result<AudioOutput, ApiError> {
        self.enter("isolate_audio")?;
        Ok(fake_audio())
    }

    async fn design_voice_previews(&self, _request: &VoiceDesignRequest) -> Result<VoicePreviews, ApiError> {
        self.enter("design_voice_previews")?;
        Ok(VoicePreviews {
            previews: Vec::new(),
            text: None,
        })
    }

    async fn create_voice_from_preview(
        &self,
        _request: &CreateVoiceFromPreviewRequest,
    ) -> Result<CreatedVoice, ApiError> {
        self.enter("create_voice_from_preview")?;
        Ok(CreatedVoice {
            voice_id: "designed_1".into(),
        })
    }

    async fn clone_voice(&self, request: &CloneVoiceRequest) -> Result<CreatedVoice, ApiError> {
        self.enter("clone_voice")?;
        self.clones.lock().unwrap().push(request.clone());
        Ok(CreatedVoice {
            voice_id: "cloned_1".into(),
        })
    }

    async fn start_dubbing(&self, request: &DubbingRequest) -> Result<DubbingJob, ApiError> {
        self.enter("start_dubbing")?;
        self.dubbings.lock().unwrap().push(request.clone());
        Ok(DubbingJob {
            dubbing_id: "dub_1".into(),
            expected_duration_sec: Some(12.5),
        })
    }

    async fn dubbing_status(&self, dubbing_id: &str) -> Result<DubbingStatus, ApiError> {
        self.enter("dubbing_status")?;
        Ok(DubbingStatus {
            dubbing_id: dubbing_id.to_string(),
            name: None,
            status: "dubbing".into(),
            target_languages: vec!["es".into()],
            error: None,
        })
    }

    async fn create_knowledge_document(&self, document: &KnowledgeText) -> Result<CreatedKnowledge, ApiError> {
        self.enter("create_knowledge_document")?;
        let mut knowledge = self.knowledge.lock().unwrap();
        knowledge.push(document.clone());
        Ok(CreatedKnowledge {
            id: format!("kb_{}", knowledge.len()),
        })
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<CreatedAgent, ApiError> {
        self.enter("create_agent")?;
        self.agents.lock().unwrap().push(request.clone());
        Ok(CreatedAgent {
            agent_id: "agent_123".into(),
        })
    }

    async fn list_tools(&self) -> Result<Vec<ProviderTool>, ApiError> {
        self.enter("list_tools")?;
        Ok(Vec::new())
    }

    async fn subscription(&self) -> Result<Subscription, ApiError> {
        self.enter("subscription")?;
        Ok(Subscription {
            tier: Some("creator".into()),
            character_count: 1200,
            character_limit: 100_000,
            next_character_count_reset_unix: None,
            status: Some("active".into()),
        })
    }
}

/// Hands the same recording double to every session.
pub struct FakeFactory(pub Arc<FakeVoiceApi>);

impl VoiceApiFactory for FakeFactory {
    fn client(&self, _api_key: &str) -> Arc<dyn VoiceApi> {
        self.0.clone()
    }
}

pub const CLOUD_PASSWORD: &str = "hunter22";

/// Cloud double with a single account whose password is [`CLOUD_PASSWORD`].
#[derive(Default)]
pub struct FakeCloudStore {
    pub calls: Mutex<Vec<String>>,
    pub api_key: Mutex<Option<String>>,
    pub agents: Mutex<Vec<SavedAgentRecord>>,
    pub conversations: Mutex<Vec<ConversationRecord>>,
    pub usage: Mutex<Vec<UsageMetric>>,
}

impl FakeCloudStore {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, name: &str, user: &CloudUser) -> Result<(), CloudError> {
        self.calls.lock().unwrap().push(name.to_string());
        if user.access_token == "token_1" {
            Ok(())
        } else {
            Err(CloudError::Auth("invalid JWT".into()))
        }
    }
}

#[async_trait]
impl CloudStore for FakeCloudStore {
    async fn sign_up(&self, _email: &str, _password: &str, _metadata: Value) -> Result<SignUpOutcome, CloudError> {
        self.calls.lock().unwrap().push("sign_up".into());
        Ok(SignUpOutcome {
            user_id: Some("user_1".into()),
            confirmation_required: true,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<CloudUser, CloudError> {
        self.calls.lock().unwrap().push("sign_in".into());
        if password != CLOUD_PASSWORD {
            return Err(CloudError::Auth("Invalid login credentials".into()));
        }
        Ok(CloudUser {
            id: "user_1".into(),
            email: email.to_string(),
            access_token: "token_1".into(),
        })
    }

    async fn sign_out(&self, user: &CloudUser) -> Result<(), CloudError> {
        self.enter("sign_out", user)
    }

    async fn save_api_key(&self, user: &CloudUser, api_key: &str) -> Result<(), CloudError> {
        self.enter("save_api_key", user)?;
        *self.api_key.lock().unwrap() = Some(api_key.to_string());
        Ok(())
    }

    async fn load_api_key(&self, user: &CloudUser) -> Result<Option<String>, CloudError> {
        self.enter("load_api_key", user)?;
        Ok(self.api_key.lock().unwrap().clone())
    }

    async fn save_agent_config(
        &self,
        user: &CloudUser,
        config: &AgentConfiguration,
    ) -> Result<SavedAgentRecord, CloudError> {
        self.enter("save_agent_config", user)?;
        let mut agents = self.agents.lock().unwrap();
        let record = SavedAgentRecord {
            id: format!("rec_{}", agents.len() + 1),
            agent_name: config.name.clone(),
            config: config.clone(),
            created_at: Some("2026-01-01T00:00:00Z".into()),
            updated_at: None,
        };
        agents.push(record.clone());
        Ok(record)
    }

    async fn list_agent_configs(&self, user: &CloudUser) -> Result<Vec<SavedAgentRecord>, CloudError> {
        self.enter("list_agent_configs", user)?;
        Ok(self.agents.lock().unwrap().clone())
    }

    async fn delete_agent_config(&self, user: &CloudUser, record_id: &str) -> Result<bool, CloudError> {
        self.enter("delete_agent_config", user)?;
        let mut agents = self.agents.lock().unwrap();
        let before = agents.len();
        agents.retain(|r| r.id != record_id);
        Ok(agents.len() < before)
    }

    async fn save_conversation(&self, user: &CloudUser, conversation: &ConversationRecord) -> Result<(), CloudError> {
        self.enter("save_conversation", user)?;
        self.conversations.lock().unwrap().push(conversation.clone());
        Ok(())
    }

    async fn record_usage(&self, user: &CloudUser, metric: &UsageMetric) -> Result<(), CloudError> {
        self.enter("record_usage", user)?;
        self.usage.lock().unwrap().push(metric.clone());
        Ok(())
    }

    async fn user_analytics(&self, user: &CloudUser) -> Result<UserAnalytics, CloudError> {
        self.enter("user_analytics", user)?;
        Ok(UserAnalytics {
            total_usage: self.usage.lock().unwrap().len(),
            agent_count: self.agents.lock().unwrap().len(),
            conversation_count: self.conversations.lock().unwrap().len(),
        })
    }
}

pub fn test_app() -> (Router, Arc<FakeVoiceApi>) {
    test_app_with_config(AppConfig::default())
}

pub fn test_app_with_config(config: AppConfig) -> (Router, Arc<FakeVoiceApi>) {
    let api = Arc::new(FakeVoiceApi::default());
    let state = AppState::with_services(config, Arc::new(FakeFactory(api.clone())), None);
    (voice_studio_backend::app(state), api)
}

pub fn test_app_with_cloud() -> (Router, Arc<FakeVoiceApi>, Arc<FakeCloudStore>) {
    let api = Arc::new(FakeVoiceApi::default());
    let cloud = Arc::new(FakeCloudStore::default());
    let state = AppState::with_services(
        AppConfig::default(),
        Arc::new(FakeFactory(api.clone())),
        Some(cloud.clone()),
    );
    (voice_studio_backend::app(state), api, cloud)
}

/// One part of a hand-built `multipart/form-data` body.
pub enum FormPart<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

const BOUNDARY: &str = "studio-test-boundary";

pub async fn send_multipart(app: &Router, uri: &str, parts: &[FormPart<'_>]) -> Response<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            FormPart::Text(name, value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File {
                field,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        field, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
}

pub async fn send_text(app: &Router, method: Method, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "text/plain")
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn connect(app: &Router, sid: &str) {
    let response = send(
        app,
        Method::PUT,
        &format!("/api/sessions/{}/api-key", sid),
        Some(serde_json::json!({ "api_key": API_KEY })),
    )
    .await;
    assert_eq!(response.status(), 200);
}

pub async fn set_value(app: &Router, sid: &str, key: &str, value: Value) {
    let response = send(
        app,
        Method::PUT,
        &format!("/api/sessions/{}/config/{}", sid, key),
        Some(serde_json::json!({ "value": value })),
    )
    .await;
    assert_eq!(response.status(), 200);
}
