use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{check_media, parse_action, preview, PageContext, PageOutput, UploadForm};
use crate::error::StudioError;
use crate::validation::Violations;
use crate::voice_api::types::{
    CloneVoiceRequest, CreateVoiceFromPreviewRequest, OutputFormat, Voice, VoiceDesignRequest,
};

const FEATURE: &str = "voice-design";

/// Sample formats accepted for instant cloning.
pub const SAMPLE_FORMATS: &[&str] = &["mp3", "wav"];
pub const MAX_SAMPLES: usize = 25;
const MAX_DESCRIPTION_CHARS: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DesignForm {
    pub description: String,
    pub text: Option<String>,
    pub auto_generate_text: bool,
    pub loudness: f64,
    pub quality: f64,
    pub seed: Option<u32>,
    pub guidance_scale: f64,
    pub output_format: OutputFormat,
}

impl Default for DesignForm {
    fn default() -> Self {
        Self {
            description: String::new(),
            text: None,
            auto_generate_text: true,
            loudness: 0.0,
            quality: 0.75,
            seed: Some(42),
            guidance_scale: 1.0,
            output_format: OutputFormat::default(),
        }
    }
}

impl DesignForm {
    fn into_request(self) -> Result<VoiceDesignRequest, StudioError> {
        let mut v = Violations::new();
        v.required("description", &self.description);
        v.max_chars("description", &self.description, MAX_DESCRIPTION_CHARS);
        let text = if self.auto_generate_text {
            None
        } else {
            let text = self.text.unwrap_or_default();
            v.required("text", &text);
            v.max_chars("text", &text, MAX_DESCRIPTION_CHARS);
            Some(text)
        };
        v.range_f64("loudness", self.loudness, -1.0, 1.0);
        v.unit("quality", self.quality);
        v.range_f64("guidance_scale", self.guidance_scale, 0.0, 5.0);
        v.into_result()?;

        Ok(VoiceDesignRequest {
            voice_description: self.description,
            text,
            auto_generate_text: self.auto_generate_text,
            loudness: self.loudness,
            quality: self.quality,
            seed: self.seed,
            guidance_scale: self.guidance_scale,
            output_format: self.output_format,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    Preview(DesignForm),
    Create {
        name: String,
        description: String,
        generated_voice_id: String,
    },
}

pub fn render(ctx: &PageContext<'_>) -> Result<Value, StudioError> {
    Ok(json!({
        "page": FEATURE,
        "defaults": {
            "auto_generate_text": true,
            "loudness": 0.0,
            "quality": 0.75,
            "seed": 42,
            "guidance_scale": 1.0,
        },
        "output_formats": OutputFormat::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
        "sample_formats": SAMPLE_FORMATS,
        "max_samples": MAX_SAMPLES,
        "voices": ctx.session.voices,
        "history": ctx.session.history_for(FEATURE),
    }))
}

pub async fn submit(ctx: &mut PageContext<'_>, body: Value) -> Result<PageOutput, StudioError> {
    match parse_action(body)? {
        Action::Preview(form) => {
            let request = form.into_request()?;
            let previews = ctx.api()?.design_voice_previews(&request).await?;
            info!("Received {} voice previews", previews.previews.len());

            ctx.session.record_generation(
                FEATURE,
                preview(&request.voice_description, 50),
                None,
                request.voice_description.chars().count(),
            );
            ctx.record_usage("voice_design", 1, json!({ "previews": previews.previews.len() }))
                .await;
            Ok(PageOutput::View(json!({ "previews": previews })))
        }
        Action::Create {
            name,
            description,
            generated_voice_id,
        } => {
            let mut v = Violations::new();
            v.required("name", &name);
            v.required("description", &description);
            v.required("generated_voice_id", &generated_voice_id);
            v.into_result()?;

            let request = CreateVoiceFromPreviewRequest {
                voice_name: name.trim().to_string(),
                voice_description: description,
                generated_voice_id,
            };
            let created = ctx.api()?.create_voice_from_preview(&request).await?;
            info!("Saved designed voice {} as {}", request.voice_name, created.voice_id);

            add_voice(ctx, &created.voice_id, &request.voice_name, "generated");
            Ok(PageOutput::View(json!({ "voice_id": created.voice_id })))
        }
    }
}

fn add_voice(ctx: &mut PageContext<'_>, voice_id: &str, name: &str, category: &str) {
    ctx.session.voices.push(Voice {
        voice_id: voice_id.to_string(),
        name: name.to_string(),
        category: Some(category.to_string()),
        labels: None,
        preview_url: None,
    });
}

fn clone_request(form: UploadForm) -> Result<CloneVoiceRequest, StudioError> {
    let mut v = Violations::new();
    let name = form.text("name").unwrap_or_default().to_string();
    v.required("name", &name);
    if form.files.is_empty() || form.files.len() > MAX_SAMPLES {
        v.push("files", format!("provide between 1 and {} samples", MAX_SAMPLES));
    }
    for (i, file) in form.files.iter().enumerate() {
        check_media(&mut v, &format!("files[{}]", i), file, SAMPLE_FORMATS);
    }
    let remove_background_noise = form.flag("remove_background_noise")?.unwrap_or(false);
    v.into_result()?;

    Ok(CloneVoiceRequest {
        name,
        description: form.text("description").unwrap_or_default().to_string(),
        files: form.files,
        remove_background_noise,
    })
}

pub async fn clone_upload(ctx: &mut PageContext<'_>, form: UploadForm) -> Result<PageOutput, StudioError> {
    let request = clone_request(form)?;
    let created = ctx.api()?.clone_voice(&request).await?;
    info!(
        "Cloned voice {} from {} samples",
        created.voice_id,
        request.files.len()
    );

    add_voice(ctx, &created.voice_id, &request.name, "cloned");
    ctx.session
        .record_generation(FEATURE, format!("Cloned {}", request.name), Some(created.voice_id.clone()), 0);
    ctx.record_usage("voice_cloning", 1, json!({ "samples": request.files.len() }))
        .await;
    Ok(PageOutput::View(json!({ "voice_id": created.voice_id, "name": request.name })))
}
