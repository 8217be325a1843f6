use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{check_known_voice, check_media, parse_action, PageContext, PageOutput, UploadForm};
use crate::config_manager::agent::{AsrProvider, AsrSettings, SUPPORTED_LANGUAGES};
use crate::config_manager::utils::{decode_text_document, is_text_document};
use crate::config_manager::{AgentConfiguration, KnowledgeDocument, SynthesisModel, ToolDefinition, ToolDraft};
use crate::error::StudioError;
use crate::session::{ConversationTurn, TurnRole};
use crate::validation::Violations;
use crate::voice_api::types::{CreateAgentRequest, KnowledgeText};
use crate::voice_api::VoiceApi;

const FEATURE: &str = "agent-builder";

/// Knowledge base document types.
pub const KNOWLEDGE_FORMATS: &[&str] = &["txt", "pdf", "docx", "md"];

/// Canned replies for the builder's test chat. No model is involved.
const TEST_REPLIES: [&str; 5] = [
    "I understand your message. How can I help you further?",
    "That's interesting! Can you tell me more about that?",
    "Based on my configuration, I would suggest...",
    "Let me think about that for a moment...",
    "I'm here to help! What would you like to know?",
];

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    Save,
    Deploy,
    AddTool {
        tool: ToolDraft,
        #[serde(default = "default_true")]
        attach: bool,
    },
    RemoveTool {
        tool_id: String,
    },
    AttachTool {
        tool_id: String,
    },
    ListProviderTools,
    AddTag {
        tag: String,
    },
    RemoveTag {
        tag: String,
    },
    RemoveDocument {
        document_id: String,
    },
    AddKnowledgeUrl {
        url: String,
    },
    SendTestMessage {
        message: String,
    },
    ClearTestConversation,
    LoadSaved {
        agent_id: String,
    },
    DeleteSaved {
        agent_id: String,
    },
}

pub fn render(ctx: &PageContext<'_>) -> Result<Value, StudioError> {
    let session = &*ctx.session;
    let violations = match session.store.snapshot() {
        Ok(config) => config.violations(),
        Err(err) => err.field_errors().to_vec(),
    };

    Ok(json!({
        "page": FEATURE,
        "config": session.store.document(),
        "dirty": session.store.is_dirty(),
        "violations": violations,
        "tool_library": session.custom_tools,
        "saved_agents": session.saved_agent_summaries(),
        "test_conversation": session.test_conversation,
        "deployed_agent_id": session.deployed_agent_id,
        "voices": session.voices,
        "options": {
            "synthesis_models": SynthesisModel::ALL.iter().map(|m| m.id()).collect::<Vec<_>>(),
            "languages": SUPPORTED_LANGUAGES,
            "asr_models": {
                "elevenlabs": AsrSettings::models_for(AsrProvider::Elevenlabs),
                "openai": AsrSettings::models_for(AsrProvider::Openai),
            },
            "tool_kinds": ["function", "webhook", "api_call"],
            "http_methods": ["GET", "POST", "PUT", "PATCH", "DELETE"],
            "turn_modes": ["server_vad", "none"],
            "knowledge_formats": KNOWLEDGE_FORMATS,
        },
    }))
}

fn view(ctx: &PageContext<'_>) -> Result<PageOutput, StudioError> {
    render(ctx).map(PageOutput::View)
}

fn duplicate_name(tools: &[ToolDefinition], tool: &ToolDefinition) -> Result<(), StudioError> {
    if tools.iter().any(|t| t.name() == tool.name()) {
        Err(StudioError::invalid(
            "tool.name",
            format!("a tool named '{}' is already attached", tool.name()),
        ))
    } else {
        Ok(())
    }
}

pub async fn submit(ctx: &mut PageContext<'_>, body: Value) -> Result<PageOutput, StudioError> {
    match parse_action(body)? {
        Action::Save => save(ctx).map(PageOutput::View),
        Action::Deploy => deploy(ctx).await.map(PageOutput::View),
        Action::AddTool { tool, attach } => {
            let tool = ToolDefinition::try_from(tool)?;
            let new_in_library = ctx.session.check_library_room(&tool)?;
            if attach {
                ctx.session.store.update(|config| {
                    duplicate_name(&config.tools, &tool)?;
                    config.tools.push(tool.clone());
                    Ok(())
                })?;
            }
            if new_in_library {
                ctx.session.custom_tools.push(tool.clone());
            }
            info!("Added {} tool '{}'", tool.kind(), tool.name());
            view(ctx)
        }
        Action::RemoveTool { tool_id } => {
            ctx.session.store.update(|config| {
                let before = config.tools.len();
                config.tools.retain(|t| t.id() != tool_id);
                if config.tools.len() == before {
                    return Err(StudioError::NotFound(format!("tool '{}'", tool_id)));
                }
                Ok(())
            })?;
            view(ctx)
        }
        Action::AttachTool { tool_id } => {
            let tool = ctx
                .session
                .custom_tools
                .iter()
                .find(|t| t.id() == tool_id)
                .cloned()
                .ok_or_else(|| StudioError::NotFound(format!("tool '{}'", tool_id)))?;
            tool.validate()?;
            ctx.session.store.update(|config| {
                duplicate_name(&config.tools, &tool)?;
                config.tools.push(tool);
                Ok(())
            })?;
            view(ctx)
        }
        Action::ListProviderTools => {
            let tools = ctx.api()?.list_tools().await?;
            Ok(PageOutput::View(json!({ "provider_tools": tools })))
        }
        Action::AddTag { tag } => {
            ctx.session.store.update(|config| {
                if config.add_tag(&tag) {
                    Ok(())
                } else {
                    Err(StudioError::invalid("tag", "must be non-empty and not already present"))
                }
            })?;
            view(ctx)
        }
        Action::RemoveTag { tag } => {
            ctx.session.store.update(|config| {
                let idx = config
                    .tags
                    .iter()
                    .position(|t| *t == tag)
                    .ok_or_else(|| StudioError::NotFound(format!("tag '{}'", tag)))?;
                config.tags.remove(idx);
                Ok(())
            })?;
            view(ctx)
        }
        Action::RemoveDocument { document_id } => {
            ctx.session.store.update(|config| {
                config
                    .knowledge_base
                    .remove_document(&document_id)
                    .map(|_| ())
                    .ok_or_else(|| StudioError::NotFound(format!("document '{}'", document_id)))
            })?;
            view(ctx)
        }
        Action::AddKnowledgeUrl { url } => {
            debug!("Rejected knowledge URL {}", url);
            Err(StudioError::invalid(
                "url",
                "adding knowledge from a web page is not supported; upload a document instead",
            ))
        }
        Action::SendTestMessage { message } => {
            let mut v = Violations::new();
            v.required("message", &message);
            v.into_result()?;

            let reply = TEST_REPLIES[ctx.session.test_messages_sent % TEST_REPLIES.len()];
            ctx.session.push_test_turn(ConversationTurn::new(TurnRole::User, message.trim()));
            ctx.session.push_test_turn(ConversationTurn::new(TurnRole::Agent, reply));

            Ok(PageOutput::View(json!({
                "reply": reply,
                "simulated": true,
                "test_conversation": ctx.session.test_conversation,
            })))
        }
        Action::ClearTestConversation => {
            ctx.session.clear_test_conversation();
            view(ctx)
        }
        Action::LoadSaved { agent_id } => {
            let config = ctx
                .session
                .saved_agents
                .get(&agent_id)
                .cloned()
                .ok_or_else(|| StudioError::NotFound(format!("saved agent '{}'", agent_id)))?;
            ctx.session.store.replace(&config);
            ctx.session.store.mark_clean();
            view(ctx)
        }
        Action::DeleteSaved { agent_id } => {
            ctx.session
                .saved_agents
                .remove(&agent_id)
                .ok_or_else(|| StudioError::NotFound(format!("saved agent '{}'", agent_id)))?;
            view(ctx)
        }
    }
}

/// Validate the active configuration and keep it in the session's saved agents.
fn save(ctx: &mut PageContext<'_>) -> Result<Value, StudioError> {
    let mut config = ctx.session.store.snapshot()?;
    config.validate()?;
    ctx.session.check_saved_agent_room(config.id.as_deref())?;

    let id = config.touch(Utc::now());
    info!("Saved agent '{}' as {}", config.name, id);
    ctx.session.store.replace(&config);
    ctx.session.store.mark_clean();
    ctx.session.saved_agents.insert(id.clone(), config);

    Ok(json!({
        "agent_id": id,
        "saved_agents": ctx.session.saved_agent_summaries(),
    }))
}

/// One create-agent call with the validated snapshot. Session state changes
/// only after the provider accepted the agent.
async fn deploy(ctx: &mut PageContext<'_>) -> Result<Value, StudioError> {
    let config = ctx.session.store.snapshot()?;
    let mut v = Violations::new();
    v.extend(config.violations());
    if !config.voice.voice_id.trim().is_empty() {
        check_known_voice(&mut v, "voice.voice_id", &config.voice.voice_id, &ctx.session.voices);
    }
    v.into_result()?;
    ctx.session.check_saved_agent_room(config.id.as_deref())?;

    let api = ctx.api()?;
    let mut config = config;
    let skipped = sync_knowledge(api.as_ref(), &mut config).await?;
    let request = CreateAgentRequest::from(&config);
    let created = api.create_agent(&request).await?;
    info!("Deployed agent '{}' as {}", config.name, created.agent_id);

    let saved_id = config.touch(Utc::now());
    ctx.session.store.replace(&config);
    ctx.session.store.mark_clean();
    ctx.session.saved_agents.insert(saved_id.clone(), config);
    ctx.session.deployed_agent_id = Some(created.agent_id.clone());

    ctx.record_usage(
        "agent_deployment",
        1,
        json!({ "agent_id": created.agent_id, "name": request.name }),
    )
    .await;

    Ok(json!({
        "agent_id": created.agent_id,
        "saved_id": saved_id,
        "name": request.name,
        "skipped_documents": skipped,
    }))
}

/// Upload knowledge text the provider has not seen yet and record the ids it
/// hands back on `config`. Documents without decoded text are skipped and
/// their names returned.
async fn sync_knowledge(api: &dyn VoiceApi, config: &mut AgentConfiguration) -> Result<Vec<String>, StudioError> {
    let mut skipped = Vec::new();
    if !config.knowledge_base.enabled {
        return Ok(skipped);
    }
    for doc in config.knowledge_base.documents.iter_mut() {
        if doc.provider_id.is_some() {
            continue;
        }
        match &doc.content {
            Some(text) => {
                let created = api
                    .create_knowledge_document(&KnowledgeText {
                        name: doc.name.clone(),
                        text: text.clone(),
                    })
                    .await?;
                debug!("Uploaded knowledge document '{}' as {}", doc.name, created.id);
                doc.provider_id = Some(created.id);
            }
            None => {
                warn!("Knowledge document '{}' has no text content; not sent", doc.name);
                skipped.push(doc.name.clone());
            }
        }
    }
    Ok(skipped)
}

/// Attach uploaded documents to the knowledge base. Text files keep their
/// decoded content; other types are referenced by name.
pub fn knowledge_upload(ctx: &mut PageContext<'_>, form: UploadForm) -> Result<PageOutput, StudioError> {
    let mut v = Violations::new();
    if form.files.is_empty() {
        v.push("files", "is required");
    }
    for (i, file) in form.files.iter().enumerate() {
        check_media(&mut v, &format!("files[{}]", i), file, KNOWLEDGE_FORMATS);
    }
    v.into_result()?;

    let documents: Vec<KnowledgeDocument> = form
        .files
        .into_iter()
        .map(|file| {
            let content = is_text_document(&file.content_type, &file.file_name)
                .then(|| decode_text_document(&file.bytes));
            KnowledgeDocument {
                id: uuid::Uuid::new_v4().to_string(),
                name: file.file_name,
                size: file.bytes.len() as u64,
                mime: file.content_type,
                content,
                provider_id: None,
            }
        })
        .collect();

    let count = documents.len();
    ctx.session.store.update(|config| {
        for doc in documents {
            let name = doc.name.clone();
            if !config.knowledge_base.add_document(doc) {
                return Err(StudioError::invalid(
                    "files",
                    format!("'{}' is already in the knowledge base", name),
                ));
            }
        }
        Ok(())
    })?;
    info!("Attached {} knowledge document(s)", count);
    view(ctx)
}
