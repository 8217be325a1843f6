use serde_json::{json, Value};
use tracing::info;

use super::{audio_file_name, check_media, PageContext, PageOutput, UploadForm, AUDIO_FORMATS, MAX_UPLOAD_BYTES};
use crate::error::StudioError;
use crate::validation::Violations;

const FEATURE: &str = "audio-isolation";

pub fn render(ctx: &PageContext<'_>) -> Result<Value, StudioError> {
    Ok(json!({
        "page": FEATURE,
        "accepted_formats": AUDIO_FORMATS,
        "max_upload_mb": MAX_UPLOAD_BYTES / (1024 * 1024),
        "history": ctx.session.history_for(FEATURE),
    }))
}

pub async fn upload(ctx: &mut PageContext<'_>, form: UploadForm) -> Result<PageOutput, StudioError> {
    let file = form.single_file()?;
    let mut v = Violations::new();
    check_media(&mut v, "file", file, AUDIO_FORMATS);
    v.into_result()?;

    let audio = ctx.api()?.isolate_audio(file).await?;
    info!("Isolated voice from {} ({} bytes)", file.file_name, audio.bytes.len());

    ctx.session
        .record_generation(FEATURE, format!("Isolated {}", file.file_name), None, 0);
    ctx.record_usage("audio_isolation", 1, json!({ "file": file.file_name }))
        .await;

    let file_name = audio_file_name("isolated", &audio.content_type);
    Ok(PageOutput::Audio { audio, file_name })
}
