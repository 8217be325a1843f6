use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config_manager::utils::{export_config, export_file_name, import_config};
use crate::config_manager::ExportFormat;
use crate::error::StudioError;
use crate::pages::{self, Page, PageOutput, UploadForm, UploadKind};
use crate::session::{ConfigKey, Session, SessionHandle};
use crate::state::AppState;
use crate::voice_api::types::MediaUpload;

fn session(state: &AppState, sid: &str) -> Result<SessionHandle, StudioError> {
    state.sessions.get_or_init(sid)
}

fn config_view(session: &Session) -> Value {
    json!({
        "config": session.store.document(),
        "dirty": session.store.is_dirty(),
        "keys": ConfigKey::ALL.iter().map(ConfigKey::name).collect::<Vec<_>>(),
    })
}

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len(),
        "cloud_enabled": state.cloud.is_some(),
        "default_api_key": state.config.elevenlabs_api_key.is_some(),
    }))
}

pub async fn list_pages() -> Json<Value> {
    Json(Page::listing())
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<Value>, StudioError> {
    let handle = session(&state, &sid)?;
    let session = handle.lock().await;
    Ok(Json(session.summary()))
}

pub async fn delete_session(State(state): State<AppState>, Path(sid): Path<String>) -> StatusCode {
    if state.sessions.clear(&sid) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyBody {
    pub api_key: String,
}

pub async fn set_api_key(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(body): Json<ApiKeyBody>,
) -> Result<Json<Value>, StudioError> {
    let handle = session(&state, &sid)?;
    let mut session = handle.lock().await;
    let mut ctx = state.page_context(&mut session);
    pages::set_api_key(&mut ctx, &body.api_key).await.map(Json)
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<Value>, StudioError> {
    let handle = session(&state, &sid)?;
    let session = handle.lock().await;
    Ok(Json(config_view(&session)))
}

pub async fn reset_config(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<Value>, StudioError> {
    state.sessions.reset(&sid).await?;
    let handle = session(&state, &sid)?;
    let session = handle.lock().await;
    info!("Configuration reset for session {}", sid);
    Ok(Json(config_view(&session)))
}

pub async fn get_config_value(
    State(state): State<AppState>,
    Path((sid, key)): Path<(String, String)>,
) -> Result<Json<Value>, StudioError> {
    let key: ConfigKey = key.parse()?;
    let handle = session(&state, &sid)?;
    let session = handle.lock().await;
    Ok(Json(json!({
        "key": key.name(),
        "value": session.store.get(key),
        "default": session.store.default_value(key),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SetValueBody {
    pub value: Value,
}

/// Field edit from a form control. Stored as-is; pages validate on submit.
pub async fn set_config_value(
    State(state): State<AppState>,
    Path((sid, key)): Path<(String, String)>,
    Json(body): Json<SetValueBody>,
) -> Result<Json<Value>, StudioError> {
    let key: ConfigKey = key.parse()?;
    let handle = session(&state, &sid)?;
    let mut session = handle.lock().await;
    debug!("Session {} set {}", sid, key);
    session.store.set(key, body.value);
    Ok(Json(json!({
        "key": key.name(),
        "value": session.store.get(key),
        "dirty": session.store.is_dirty(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

pub async fn export_configuration(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, StudioError> {
    let handle = session(&state, &sid)?;
    let session = handle.lock().await;
    let config = session.store.snapshot()?;
    let content = export_config(&config, query.format)?;
    let file_name = export_file_name(&config, query.format);

    Ok((
        [
            (header::CONTENT_TYPE, query.format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        content,
    )
        .into_response())
}

/// Replace the active configuration with an exported JSON or YAML document.
pub async fn import_configuration(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    body: String,
) -> Result<Json<Value>, StudioError> {
    let config = import_config(&body)?;
    let handle = session(&state, &sid)?;
    let mut session = handle.lock().await;
    session.store.replace(&config);
    info!("Imported configuration '{}' into session {}", config.name, sid);
    Ok(Json(config_view(&session)))
}

pub async fn render_page(
    State(state): State<AppState>,
    Path((sid, page)): Path<(String, String)>,
) -> Result<Json<Value>, StudioError> {
    let page: Page = page.parse()?;
    let handle = session(&state, &sid)?;
    let mut session = handle.lock().await;
    let mut ctx = state.page_context(&mut session);
    pages::render(page, &mut ctx).await.map(Json)
}

pub async fn submit_page(
    State(state): State<AppState>,
    Path((sid, page)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<PageOutput, StudioError> {
    let page: Page = page.parse()?;
    let handle = session(&state, &sid)?;
    let mut session = handle.lock().await;
    let mut ctx = state.page_context(&mut session);
    pages::submit(page, &mut ctx, body).await
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> StudioError {
    StudioError::BadRequest(format!("invalid multipart body: {}", err))
}

/// Parts with a file name become files, everything else a text field.
async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, StudioError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                form.files.push(MediaUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            None => {
                let text = field.text().await.map_err(bad_multipart)?;
                form.fields.insert(name, text);
            }
        }
    }
    Ok(form)
}

pub async fn upload(
    State(state): State<AppState>,
    Path((sid, kind)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<PageOutput, StudioError> {
    let kind: UploadKind = kind.parse()?;
    let form = read_upload(multipart).await?;
    let handle = session(&state, &sid)?;
    let mut session = handle.lock().await;
    let mut ctx = state.page_context(&mut session);
    pages::upload(kind, &mut ctx, form).await
}
