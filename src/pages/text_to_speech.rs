use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{audio_file_name, check_known_model, check_known_voice, parse_action, preview, PageContext, PageOutput};
use crate::config_manager::agent::VoiceSettings;
use crate::config_manager::SynthesisModel;
use crate::error::StudioError;
use crate::session::Session;
use crate::validation::Violations;
use crate::voice_api::types::{OutputFormat, TextToSpeechRequest, VoiceSettingsPayload};

const FEATURE: &str = "text-to-speech";

/// Longest text accepted per request.
pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpeechForm {
    pub text: String,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub stability: Option<f64>,
    pub similarity_boost: Option<f64>,
    pub style: Option<f64>,
    pub use_speaker_boost: Option<bool>,
    pub output_format: OutputFormat,
    pub optimize_streaming_latency: Option<u8>,
    pub enable_logging: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    Generate(SpeechForm),
    ClearHistory,
}

/// Fill unset form fields from the agent's voice settings and check ranges.
fn build_request(
    form: SpeechForm,
    defaults: &VoiceSettings,
    session: &Session,
) -> Result<TextToSpeechRequest, StudioError> {
    let voice_id = form.voice_id.unwrap_or_else(|| defaults.voice_id.clone());
    let model_id = form
        .model_id
        .unwrap_or_else(|| defaults.model_id.id().to_string());
    let settings = VoiceSettingsPayload {
        stability: form.stability.unwrap_or(defaults.stability),
        similarity_boost: form.similarity_boost.unwrap_or(defaults.similarity_boost),
        style: form.style.unwrap_or(defaults.style),
        use_speaker_boost: form.use_speaker_boost.unwrap_or(defaults.use_speaker_boost),
    };

    let mut v = Violations::new();
    v.required("text", &form.text);
    v.max_chars("text", &form.text, MAX_TEXT_CHARS);
    check_known_voice(&mut v, "voice_id", &voice_id, &session.voices);
    check_known_model(&mut v, "model_id", &model_id, &session.models);
    v.unit("stability", settings.stability);
    v.unit("similarity_boost", settings.similarity_boost);
    v.unit("style", settings.style);
    if let Some(latency) = form.optimize_streaming_latency {
        if latency > 4 {
            v.push("optimize_streaming_latency", "must be between 0 and 4");
        }
    }
    v.into_result()?;

    Ok(TextToSpeechRequest {
        voice_id,
        output_format: form.output_format,
        enable_logging: form.enable_logging.unwrap_or(true),
        optimize_streaming_latency: form.optimize_streaming_latency,
        text: form.text,
        model_id,
        voice_settings: settings,
    })
}

pub fn render(ctx: &PageContext<'_>) -> Result<Value, StudioError> {
    let store = &ctx.session.store;
    Ok(json!({
        "page": FEATURE,
        "defaults": store.document()["voice"],
        "max_characters": MAX_TEXT_CHARS,
        "voices": ctx.session.voices,
        "models": ctx.session.models,
        "synthesis_models": SynthesisModel::ALL.iter().map(|m| m.id()).collect::<Vec<_>>(),
        "output_formats": OutputFormat::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
        "history": ctx.session.history_for(FEATURE),
        "has_api_key": ctx.api_key().is_some(),
    }))
}

pub async fn submit(ctx: &mut PageContext<'_>, body: Value) -> Result<PageOutput, StudioError> {
    match parse_action(body)? {
        Action::Generate(form) => generate(ctx, form).await,
        Action::ClearHistory => {
            ctx.session.history.retain(|r| r.feature != FEATURE);
            render(ctx).map(PageOutput::View)
        }
    }
}

async fn generate(ctx: &mut PageContext<'_>, form: SpeechForm) -> Result<PageOutput, StudioError> {
    let defaults = ctx.session.store.snapshot()?.voice;
    let request = build_request(form, &defaults, &*ctx.session)?;
    let api = ctx.api()?;

    let audio = api.text_to_speech(&request).await?;
    let characters = request.text.chars().count();
    info!(
        "Generated {} bytes of speech ({} chars, voice {})",
        audio.bytes.len(),
        characters,
        request.voice_id
    );

    ctx.session.record_generation(
        FEATURE,
        preview(&request.text, 50),
        Some(request.voice_id.clone()),
        characters,
    );
    ctx.record_usage(
        "text_to_speech",
        characters as u64,
        json!({ "voice_id": request.voice_id, "model_id": request.model_id }),
    )
    .await;

    let file_name = audio_file_name("speech", &audio.content_type);
    Ok(PageOutput::Audio { audio, file_name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_manager::AgentConfiguration;
    use crate::voice_api::types::{Model, Voice};

    fn session() -> Session {
        Session::new("s", &AgentConfiguration::default())
    }

    fn form(text: &str) -> SpeechForm {
        SpeechForm {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn unset_fields_come_from_the_agent_voice() {
        let mut defaults = VoiceSettings::default();
        defaults.stability = 0.3;
        let request = build_request(form("Hello"), &defaults, &session()).unwrap();
        assert_eq!(request.voice_settings.stability, 0.3);
        assert_eq!(request.model_id, "eleven_turbo_v2_5");
        assert_eq!(request.voice_id, defaults.voice_id);
        assert!(request.enable_logging);
    }

    #[test]
    fn text_limits() {
        let defaults = VoiceSettings::default();
        assert!(build_request(form("  "), &defaults, &session()).is_err());
        let long = "a".repeat(MAX_TEXT_CHARS + 1);
        let err = build_request(form(&long), &defaults, &session()).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "text");
        assert!(build_request(form(&"a".repeat(MAX_TEXT_CHARS)), &defaults, &session()).is_ok());
    }

    #[test]
    fn out_of_range_settings_and_latency() {
        let mut f = form("Hello");
        f.similarity_boost = Some(1.2);
        f.optimize_streaming_latency = Some(5);
        let err = build_request(f, &VoiceSettings::default(), &session()).unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["similarity_boost", "optimize_streaming_latency"]);
    }

    #[test]
    fn model_must_be_a_synthesis_model_or_listed() {
        let mut f = form("Hello");
        f.model_id = Some("eleven_made_up".into());
        let err = build_request(f.clone(), &VoiceSettings::default(), &session()).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "model_id");

        let mut s = session();
        s.models.push(Model {
            model_id: "eleven_made_up".into(),
            name: "Custom".into(),
            description: None,
            can_do_text_to_speech: true,
            can_do_voice_conversion: false,
        });
        assert!(build_request(f, &VoiceSettings::default(), &s).is_ok());

        let mut f = form("Hello");
        f.model_id = Some("eleven_multilingual_v2".into());
        assert!(build_request(f, &VoiceSettings::default(), &session()).is_ok());
    }

    #[test]
    fn voice_must_be_listed_once_voices_are_known() {
        let mut s = session();
        s.voices.push(Voice {
            voice_id: "v1".into(),
            name: "Rachel".into(),
            category: None,
            labels: None,
            preview_url: None,
        });
        let mut f = form("Hello");
        f.voice_id = Some("v2".into());
        assert!(build_request(f.clone(), &VoiceSettings::default(), &s).is_err());
        f.voice_id = Some("v1".into());
        assert!(build_request(f, &VoiceSettings::default(), &s).is_ok());
    }
}
