//! Dashboard pages. Each page renders a JSON view model from session state and
//! accepts typed actions; upload-driven pages also take multipart files.

pub mod agent_builder;
pub mod analytics;
pub mod audio_isolation;
pub mod cloud;
pub mod dubbing;
pub mod speech_to_speech;
pub mod text_to_speech;
pub mod voice_design;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cloud::{CloudError, CloudStore, CloudUser, UsageMetric};
use crate::config_manager::SynthesisModel;
use crate::error::StudioError;
use crate::session::Session;
use crate::validation::Violations;
use crate::voice_api::types::{AudioOutput, MediaUpload, Model, Voice};
use crate::voice_api::{VoiceApi, VoiceApiFactory};

/// Largest accepted upload per file.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Audio formats accepted by the conversion pages.
pub const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "flac", "m4a"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    TextToSpeech,
    VoiceDesign,
    SpeechToSpeech,
    AudioIsolation,
    Dubbing,
    AgentBuilder,
    Analytics,
    Cloud,
}

impl Page {
    pub const ALL: [Page; 8] = [
        Page::TextToSpeech,
        Page::VoiceDesign,
        Page::SpeechToSpeech,
        Page::AudioIsolation,
        Page::Dubbing,
        Page::AgentBuilder,
        Page::Analytics,
        Page::Cloud,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Page::TextToSpeech => "text-to-speech",
            Page::VoiceDesign => "voice-design",
            Page::SpeechToSpeech => "speech-to-speech",
            Page::AudioIsolation => "audio-isolation",
            Page::Dubbing => "dubbing",
            Page::AgentBuilder => "agent-builder",
            Page::Analytics => "analytics",
            Page::Cloud => "cloud",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Page::TextToSpeech => "Text to Speech",
            Page::VoiceDesign => "Voice Design & Cloning",
            Page::SpeechToSpeech => "Speech to Speech",
            Page::AudioIsolation => "Audio Isolation",
            Page::Dubbing => "Dubbing & Translation",
            Page::AgentBuilder => "Agent Builder",
            Page::Analytics => "Analytics",
            Page::Cloud => "Cloud Sync",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Page::TextToSpeech => "Convert text to natural speech with any voice",
            Page::VoiceDesign => "Design new voices from a description or clone one from samples",
            Page::SpeechToSpeech => "Transform a recording into another voice",
            Page::AudioIsolation => "Remove background noise from recordings",
            Page::Dubbing => "Localize audio and video into another language",
            Page::AgentBuilder => "Configure, test and deploy conversational agents",
            Page::Analytics => "Usage and session statistics",
            Page::Cloud => "Sign in to sync API keys and agents",
        }
    }

    /// Multipart endpoints that belong to this page.
    pub fn uploads(&self) -> &'static [UploadKind] {
        match self {
            Page::VoiceDesign => &[UploadKind::VoiceClone],
            Page::SpeechToSpeech => &[UploadKind::SpeechToSpeech],
            Page::AudioIsolation => &[UploadKind::AudioIsolation],
            Page::Dubbing => &[UploadKind::Dubbing],
            Page::AgentBuilder => &[UploadKind::Knowledge],
            _ => &[],
        }
    }

    pub fn listing() -> Value {
        Value::Array(
            Page::ALL
                .iter()
                .map(|page| {
                    json!({
                        "page": page.slug(),
                        "title": page.title(),
                        "description": page.description(),
                        "uploads": page.uploads().iter().map(UploadKind::slug).collect::<Vec<_>>(),
                    })
                })
                .collect(),
        )
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Page {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Page::ALL
            .iter()
            .copied()
            .find(|page| page.slug() == s)
            .ok_or_else(|| StudioError::NotFound(format!("page '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadKind {
    SpeechToSpeech,
    AudioIsolation,
    VoiceClone,
    Dubbing,
    Knowledge,
}

impl UploadKind {
    pub const ALL: [UploadKind; 5] = [
        UploadKind::SpeechToSpeech,
        UploadKind::AudioIsolation,
        UploadKind::VoiceClone,
        UploadKind::Dubbing,
        UploadKind::Knowledge,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            UploadKind::SpeechToSpeech => "speech-to-speech",
            UploadKind::AudioIsolation => "audio-isolation",
            UploadKind::VoiceClone => "voice-clone",
            UploadKind::Dubbing => "dubbing",
            UploadKind::Knowledge => "knowledge",
        }
    }
}

impl FromStr for UploadKind {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UploadKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| StudioError::NotFound(format!("upload '{}'", s)))
    }
}

/// Text fields and files of one multipart submission.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub fields: BTreeMap<String, String>,
    pub files: Vec<MediaUpload>,
}

impl UploadForm {
    /// Non-blank text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, StudioError> {
        match self.text(name) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| StudioError::invalid(name, format!("'{}' is not a valid value", raw))),
        }
    }

    /// Checkbox-style flag: `true/false`, `on/off`, `1/0`.
    pub fn flag(&self, name: &str) -> Result<Option<bool>, StudioError> {
        match self.text(name).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(None),
            Some("true" | "on" | "1" | "yes") => Ok(Some(true)),
            Some("false" | "off" | "0" | "no") => Ok(Some(false)),
            Some(other) => Err(StudioError::invalid(name, format!("'{}' is not a boolean", other))),
        }
    }

    /// Enum field parsed through its serde representation.
    pub fn choice<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StudioError> {
        match self.text(name) {
            None => Ok(None),
            Some(raw) => serde_json::from_value(Value::String(raw.to_string()))
                .map(Some)
                .map_err(|_| StudioError::invalid(name, format!("'{}' is not a supported option", raw))),
        }
    }

    pub fn single_file(&self) -> Result<&MediaUpload, StudioError> {
        match self.files.as_slice() {
            [file] => Ok(file),
            [] => Err(StudioError::invalid("file", "is required")),
            _ => Err(StudioError::invalid("file", "exactly one file is expected")),
        }
    }
}

/// Size and type checks for one uploaded file.
pub(crate) fn check_media(v: &mut Violations, field: &str, file: &MediaUpload, allowed: &[&str]) {
    if file.bytes.is_empty() {
        v.push(field, format!("'{}' is empty", file.file_name));
    } else if file.bytes.len() > MAX_UPLOAD_BYTES {
        v.push(
            field,
            format!("'{}' exceeds the {} MB limit", file.file_name, MAX_UPLOAD_BYTES / (1024 * 1024)),
        );
    }
    let extension = file
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !allowed.contains(&extension.as_str()) {
        v.push(
            field,
            format!("'{}' must be one of: {}", file.file_name, allowed.join(", ")),
        );
    }
    if !is_media_type(&file.content_type) {
        v.push(
            field,
            format!("'{}' has an invalid content type '{}'", file.file_name, file.content_type),
        );
    }
}

/// Whether the provider client will accept `content_type` as a part's media type.
pub(crate) fn is_media_type(content_type: &str) -> bool {
    reqwest::multipart::Part::bytes(Vec::new())
        .mime_str(content_type)
        .is_ok()
}

/// The voice id must name a voice the provider listed, once the list is known.
pub(crate) fn check_known_voice(v: &mut Violations, field: &str, voice_id: &str, voices: &[Voice]) {
    if voice_id.trim().is_empty() {
        v.push(field, "is required");
    } else if !voices.is_empty() && !voices.iter().any(|voice| voice.voice_id == voice_id) {
        v.push(field, format!("unknown voice '{}'", voice_id));
    }
}

/// Synthesis model ids are the built-in ones plus whatever the provider listed.
pub(crate) fn check_known_model(v: &mut Violations, field: &str, model_id: &str, models: &[Model]) {
    if model_id.trim().is_empty() {
        v.push(field, "is required");
    } else if !SynthesisModel::ALL.iter().any(|m| m.id() == model_id)
        && !models.iter().any(|m| m.model_id == model_id)
    {
        v.push(field, format!("unknown model '{}'", model_id));
    }
}

pub(crate) fn parse_action<T: DeserializeOwned>(body: Value) -> Result<T, StudioError> {
    serde_json::from_value(body).map_err(|e| StudioError::invalid("action", e.to_string()))
}

pub(crate) fn audio_file_name(prefix: &str, content_type: &str) -> String {
    let extension = match content_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/flac" => "flac",
        _ => "pcm",
    };
    format!("{}_{}.{}", prefix, Utc::now().format("%Y%m%d_%H%M%S"), extension)
}

pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// What a page hands back: a view model, or a generated audio file.
#[derive(Debug)]
pub enum PageOutput {
    View(Value),
    Audio { audio: AudioOutput, file_name: String },
}

impl IntoResponse for PageOutput {
    fn into_response(self) -> Response {
        match self {
            PageOutput::View(value) => Json(value).into_response(),
            PageOutput::Audio { audio, file_name } => (
                [
                    (header::CONTENT_TYPE, audio.content_type),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name),
                    ),
                ],
                audio.bytes,
            )
                .into_response(),
        }
    }
}

/// Session plus the services a page may call for one user action.
pub struct PageContext<'a> {
    pub session: &'a mut Session,
    pub voice_api: Arc<dyn VoiceApiFactory>,
    pub cloud: Option<Arc<dyn CloudStore>>,
    pub default_api_key: Option<String>,
}

impl PageContext<'_> {
    /// Session key first, then the process-wide fallback.
    pub fn api_key(&self) -> Option<&str> {
        self.session
            .api_key
            .as_deref()
            .or(self.default_api_key.as_deref())
    }

    pub fn api(&self) -> Result<Arc<dyn VoiceApi>, StudioError> {
        match self.api_key() {
            Some(key) => Ok(self.voice_api.client(key)),
            None => Err(StudioError::Authentication(
                "No API key configured. Add your ElevenLabs API key to continue.".to_string(),
            )),
        }
    }

    pub fn cloud_store(&self) -> Result<Arc<dyn CloudStore>, StudioError> {
        self.cloud
            .clone()
            .ok_or_else(|| StudioError::NotConfigured("cloud storage".to_string()))
    }

    /// Cloud store and the signed-in user.
    pub fn cloud_session(&self) -> Result<(Arc<dyn CloudStore>, CloudUser), StudioError> {
        let store = self.cloud_store()?;
        let user = self.session.cloud_user.clone().ok_or(CloudError::NotSignedIn)?;
        Ok((store, user))
    }

    /// Best effort: usage tracking never fails the user's action.
    pub async fn record_usage(&self, feature: &str, count: u64, metadata: Value) {
        let (Some(store), Some(user)) = (self.cloud.as_ref(), self.session.cloud_user.as_ref()) else {
            return;
        };
        let metric = UsageMetric {
            feature: feature.to_string(),
            count,
            metadata,
        };
        if let Err(e) = store.record_usage(user, &metric).await {
            warn!("Could not record {} usage: {}", feature, e);
        }
    }
}

pub async fn render(page: Page, ctx: &mut PageContext<'_>) -> Result<Value, StudioError> {
    debug!("Rendering {} for session {}", page, ctx.session.id);
    match page {
        Page::TextToSpeech => text_to_speech::render(ctx),
        Page::VoiceDesign => voice_design::render(ctx),
        Page::SpeechToSpeech => speech_to_speech::render(ctx),
        Page::AudioIsolation => audio_isolation::render(ctx),
        Page::Dubbing => dubbing::render(ctx),
        Page::AgentBuilder => agent_builder::render(ctx),
        Page::Analytics => analytics::render(ctx).await,
        Page::Cloud => cloud::render(ctx),
    }
}

pub async fn submit(page: Page, ctx: &mut PageContext<'_>, body: Value) -> Result<PageOutput, StudioError> {
    info!("Submitting {} for session {}", page, ctx.session.id);
    match page {
        Page::TextToSpeech => text_to_speech::submit(ctx, body).await,
        Page::VoiceDesign => voice_design::submit(ctx, body).await,
        Page::SpeechToSpeech | Page::AudioIsolation => Err(StudioError::BadRequest(format!(
            "{} takes a multipart upload at uploads/{}",
            page.title(),
            page.slug()
        ))),
        Page::Dubbing => dubbing::submit(ctx, body).await,
        Page::AgentBuilder => agent_builder::submit(ctx, body).await,
        Page::Analytics => analytics::render(ctx).await.map(PageOutput::View),
        Page::Cloud => cloud::submit(ctx, body).await,
    }
}

pub async fn upload(kind: UploadKind, ctx: &mut PageContext<'_>, form: UploadForm) -> Result<PageOutput, StudioError> {
    info!(
        "Upload {} with {} file(s) for session {}",
        kind.slug(),
        form.files.len(),
        ctx.session.id
    );
    match kind {
        UploadKind::SpeechToSpeech => speech_to_speech::upload(ctx, form).await,
        UploadKind::AudioIsolation => audio_isolation::upload(ctx, form).await,
        UploadKind::VoiceClone => voice_design::clone_upload(ctx, form).await,
        UploadKind::Dubbing => dubbing::upload(ctx, form).await,
        UploadKind::Knowledge => agent_builder::knowledge_upload(ctx, form),
    }
}

/// Minimum plausible length of a provider API key.
const MIN_API_KEY_LEN: usize = 10;

/// Validate a key against the provider and, on success, store it for the
/// session together with the voice and model lists it unlocks.
pub async fn set_api_key(ctx: &mut PageContext<'_>, api_key: &str) -> Result<Value, StudioError> {
    let api_key = api_key.trim();
    if api_key.len() <= MIN_API_KEY_LEN {
        return Err(StudioError::invalid(
            "api_key",
            format!("must be longer than {} characters", MIN_API_KEY_LEN),
        ));
    }

    let client = ctx.voice_api.client(api_key);
    let voices = client.list_voices().await?;
    let models = client.list_models().await?;
    info!(
        "API key accepted for session {} ({} voices, {} models)",
        ctx.session.id,
        voices.len(),
        models.len()
    );

    ctx.session.api_key = Some(api_key.to_string());
    ctx.session.voices = voices;
    ctx.session.models = models;

    Ok(json!({
        "connected": true,
        "voices": ctx.session.voices,
        "models": ctx.session.models,
    }))
}
