use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{check_media, parse_action, PageContext, PageOutput, UploadForm, MAX_UPLOAD_BYTES};
use crate::config_manager::agent::SUPPORTED_LANGUAGES;
use crate::error::StudioError;
use crate::validation::Violations;
use crate::voice_api::types::DubbingRequest;

const FEATURE: &str = "dubbing";

/// Video and audio sources the dubbing service accepts.
pub const DUBBING_FORMATS: &[&str] = &["mp4", "mov", "avi", "mp3", "wav", "flac", "m4a"];

const MAX_SPEAKERS: u32 = 32;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    Status { dubbing_id: String },
}

fn check_language(v: &mut Violations, field: &str, value: &str) {
    if !SUPPORTED_LANGUAGES.contains(&value) {
        v.push(field, format!("must be one of: {}", SUPPORTED_LANGUAGES.join(", ")));
    }
}

fn build_request(form: UploadForm) -> Result<DubbingRequest, StudioError> {
    let mut v = Violations::new();
    let file = form.single_file()?.clone();
    check_media(&mut v, "file", &file, DUBBING_FORMATS);

    let source_lang = form.text("source_lang").unwrap_or_default().to_string();
    let target_lang = form.text("target_lang").unwrap_or_default().to_string();
    check_language(&mut v, "source_lang", &source_lang);
    check_language(&mut v, "target_lang", &target_lang);
    if !source_lang.is_empty() && source_lang == target_lang {
        v.push("target_lang", "must differ from the source language");
    }

    let num_speakers = form.parse::<u32>("num_speakers")?.unwrap_or(0);
    v.range_u32("num_speakers", num_speakers, 0, MAX_SPEAKERS);
    let watermark = form.flag("watermark")?.unwrap_or(false);
    v.into_result()?;

    Ok(DubbingRequest {
        name: form.text("name").map(str::to_string),
        file,
        source_lang,
        target_lang,
        num_speakers,
        watermark,
    })
}

pub fn render(ctx: &PageContext<'_>) -> Result<Value, StudioError> {
    Ok(json!({
        "page": FEATURE,
        "languages": SUPPORTED_LANGUAGES,
        "accepted_formats": DUBBING_FORMATS,
        "max_upload_mb": MAX_UPLOAD_BYTES / (1024 * 1024),
        "jobs": ctx.session.dubbing_jobs,
    }))
}

pub async fn upload(ctx: &mut PageContext<'_>, form: UploadForm) -> Result<PageOutput, StudioError> {
    let request = build_request(form)?;
    let job = ctx.api()?.start_dubbing(&request).await?;
    info!(
        "Started dubbing {} ({} -> {}) as {}",
        request.file.file_name, request.source_lang, request.target_lang, job.dubbing_id
    );

    ctx.session.track_dubbing_job(job.clone());
    ctx.session.record_generation(
        FEATURE,
        format!(
            "{}: {} -> {}",
            request.file.file_name, request.source_lang, request.target_lang
        ),
        None,
        0,
    );
    ctx.record_usage(
        "dubbing",
        1,
        json!({ "source_lang": request.source_lang, "target_lang": request.target_lang }),
    )
    .await;
    Ok(PageOutput::View(json!({ "job": job })))
}

pub async fn submit(ctx: &mut PageContext<'_>, body: Value) -> Result<PageOutput, StudioError> {
    match parse_action(body)? {
        Action::Status { dubbing_id } => {
            let mut v = Violations::new();
            v.required("dubbing_id", &dubbing_id);
            v.into_result()?;

            let status = ctx.api()?.dubbing_status(dubbing_id.trim()).await?;
            Ok(PageOutput::View(json!({ "status": status })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice_api::types::MediaUpload;

    fn form(source: &str, target: &str) -> UploadForm {
        let mut form = UploadForm {
            fields: Default::default(),
            files: vec![MediaUpload {
                file_name: "clip.mp4".to_string(),
                content_type: "video/mp4".to_string(),
                bytes: vec![1; 64],
            }],
        };
        form.fields.insert("source_lang".into(), source.into());
        form.fields.insert("target_lang".into(), target.into());
        form
    }

    #[test]
    fn source_and_target_must_differ() {
        let err = build_request(form("en", "en")).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "target_lang");
        assert!(build_request(form("en", "es")).is_ok());
    }

    #[test]
    fn languages_come_from_the_supported_list() {
        let err = build_request(form("en", "xx")).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "target_lang");
        let err = build_request(form("", "es")).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "source_lang");
    }
}
