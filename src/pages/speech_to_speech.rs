use serde_json::{json, Value};
use tracing::info;

use super::{audio_file_name, check_known_voice, check_media, PageContext, PageOutput, UploadForm, AUDIO_FORMATS};
use crate::config_manager::agent::VoiceSettings;
use crate::error::StudioError;
use crate::session::Session;
use crate::validation::Violations;
use crate::voice_api::types::{OutputFormat, SpeechToSpeechRequest, VoiceSettingsPayload};

const FEATURE: &str = "speech-to-speech";

/// Voice conversion models offered by the provider.
pub const STS_MODELS: &[&str] = &["eleven_multilingual_sts_v2", "eleven_english_sts_v2"];

fn build_request(
    form: UploadForm,
    defaults: &VoiceSettings,
    session: &Session,
) -> Result<SpeechToSpeechRequest, StudioError> {
    let mut v = Violations::new();
    let audio = form.single_file()?.clone();
    check_media(&mut v, "file", &audio, AUDIO_FORMATS);

    let voice_id = form
        .text("voice_id")
        .map(str::to_string)
        .unwrap_or_else(|| defaults.voice_id.clone());
    check_known_voice(&mut v, "voice_id", &voice_id, &session.voices);

    let model_id = form.text("model_id").unwrap_or(STS_MODELS[0]).to_string();
    if !STS_MODELS.contains(&model_id.as_str()) {
        v.push("model_id", format!("must be one of: {}", STS_MODELS.join(", ")));
    }

    let stability = form.parse::<f64>("stability")?;
    let similarity_boost = form.parse::<f64>("similarity_boost")?;
    let style = form.parse::<f64>("style")?;
    // only send settings when the user touched one of them
    let voice_settings = if stability.is_some() || similarity_boost.is_some() || style.is_some() {
        let settings = VoiceSettingsPayload {
            stability: stability.unwrap_or(defaults.stability),
            similarity_boost: similarity_boost.unwrap_or(defaults.similarity_boost),
            style: style.unwrap_or(defaults.style),
            use_speaker_boost: defaults.use_speaker_boost,
        };
        v.unit("stability", settings.stability);
        v.unit("similarity_boost", settings.similarity_boost);
        v.unit("style", settings.style);
        Some(settings)
    } else {
        None
    };

    let remove_background_noise = form.flag("remove_background_noise")?.unwrap_or(false);
    let output_format = form.choice::<OutputFormat>("output_format")?.unwrap_or_default();
    v.into_result()?;

    Ok(SpeechToSpeechRequest {
        voice_id,
        model_id,
        audio,
        voice_settings,
        remove_background_noise,
        output_format,
    })
}

pub fn render(ctx: &PageContext<'_>) -> Result<Value, StudioError> {
    Ok(json!({
        "page": FEATURE,
        "accepted_formats": AUDIO_FORMATS,
        "max_upload_mb": super::MAX_UPLOAD_BYTES / (1024 * 1024),
        "models": STS_MODELS,
        "default_voice_id": ctx.session.store.document()["voice"]["voice_id"],
        "voices": ctx.session.voices,
        "history": ctx.session.history_for(FEATURE),
    }))
}

pub async fn upload(ctx: &mut PageContext<'_>, form: UploadForm) -> Result<PageOutput, StudioError> {
    let defaults = ctx.session.store.snapshot()?.voice;
    let request = build_request(form, &defaults, &*ctx.session)?;
    let audio = ctx.api()?.speech_to_speech(&request).await?;
    info!(
        "Converted {} into voice {} ({} bytes)",
        request.audio.file_name,
        request.voice_id,
        audio.bytes.len()
    );

    ctx.session.record_generation(
        FEATURE,
        format!("Converted {}", request.audio.file_name),
        Some(request.voice_id.clone()),
        0,
    );
    ctx.record_usage("speech_to_speech", 1, json!({ "voice_id": request.voice_id }))
        .await;

    let file_name = audio_file_name("converted", &audio.content_type);
    Ok(PageOutput::Audio { audio, file_name })
}
