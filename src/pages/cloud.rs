use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{parse_action, PageContext, PageOutput};
use crate::cloud::ConversationRecord;
use crate::error::StudioError;
use crate::validation::Violations;

/// Shortest password the auth provider accepts.
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    SignUp {
        email: String,
        password: String,
        #[serde(default)]
        full_name: String,
    },
    SignIn {
        email: String,
        password: String,
    },
    SignOut,
    SaveApiKey,
    LoadApiKey,
    SaveAgent,
    ListAgents,
    LoadAgent {
        record_id: String,
    },
    DeleteAgent {
        record_id: String,
    },
    SaveConversation,
}

fn check_credentials(email: &str, password: &str) -> Result<(), StudioError> {
    let mut v = Violations::new();
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => v.push("email", "must be an email address"),
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        v.push(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
    v.into_result()
}

pub fn render(ctx: &PageContext<'_>) -> Result<Value, StudioError> {
    Ok(json!({
        "page": "cloud",
        "enabled": ctx.cloud.is_some(),
        "user": ctx.session.cloud_user,
        "has_api_key": ctx.session.api_key.is_some(),
    }))
}

pub async fn submit(ctx: &mut PageContext<'_>, body: Value) -> Result<PageOutput, StudioError> {
    let out = match parse_action(body)? {
        Action::SignUp {
            email,
            password,
            full_name,
        } => {
            check_credentials(&email, &password)?;
            let outcome = ctx
                .cloud_store()?
                .sign_up(email.trim(), &password, json!({ "full_name": full_name }))
                .await?;
            info!("Cloud sign-up for {}", email.trim());
            json!({ "sign_up": outcome })
        }
        Action::SignIn { email, password } => {
            check_credentials(&email, &password)?;
            let store = ctx.cloud_store()?;
            let user = store.sign_in(email.trim(), &password).await?;
            info!("Session {} signed in to cloud as {}", ctx.session.id, user.id);

            // a stored key is restored only when the session has none yet
            let mut api_key_restored = false;
            if ctx.session.api_key.is_none() {
                match store.load_api_key(&user).await {
                    Ok(Some(key)) => {
                        ctx.session.api_key = Some(key);
                        api_key_restored = true;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Could not restore saved API key: {}", e),
                }
            }
            ctx.session.cloud_user = Some(user);
            json!({ "user": ctx.session.cloud_user, "api_key_restored": api_key_restored })
        }
        Action::SignOut => {
            let (store, user) = ctx.cloud_session()?;
            store.sign_out(&user).await?;
            ctx.session.cloud_user = None;
            json!({ "signed_out": true })
        }
        Action::SaveApiKey => {
            let (store, user) = ctx.cloud_session()?;
            let key = ctx
                .session
                .api_key
                .clone()
                .ok_or_else(|| StudioError::invalid("api_key", "no API key set for this session"))?;
            store.save_api_key(&user, &key).await?;
            json!({ "saved": true })
        }
        Action::LoadApiKey => {
            let (store, user) = ctx.cloud_session()?;
            let key = store
                .load_api_key(&user)
                .await?
                .ok_or_else(|| StudioError::NotFound("saved API key".to_string()))?;
            ctx.session.api_key = Some(key);
            json!({ "loaded": true })
        }
        Action::SaveAgent => {
            let (store, user) = ctx.cloud_session()?;
            let config = ctx.session.store.snapshot()?;
            config.validate()?;
            let record = store.save_agent_config(&user, &config).await?;
            info!("Synced agent '{}' to cloud as {}", record.agent_name, record.id);
            json!({ "record": { "id": record.id, "agent_name": record.agent_name, "created_at": record.created_at } })
        }
        Action::ListAgents => {
            let (store, user) = ctx.cloud_session()?;
            let records = store.list_agent_configs(&user).await?;
            let listing: Vec<Value> = records
                .iter()
                .map(|r| json!({ "id": r.id, "agent_name": r.agent_name, "created_at": r.created_at, "updated_at": r.updated_at }))
                .collect();
            json!({ "agents": listing })
        }
        Action::LoadAgent { record_id } => {
            let (store, user) = ctx.cloud_session()?;
            let record = store
                .list_agent_configs(&user)
                .await?
                .into_iter()
                .find(|r| r.id == record_id)
                .ok_or_else(|| StudioError::NotFound(format!("cloud agent '{}'", record_id)))?;
            ctx.session.store.replace(&record.config);
            ctx.session.store.mark_clean();
            json!({ "loaded": record.id, "config": ctx.session.store.document() })
        }
        Action::DeleteAgent { record_id } => {
            let (store, user) = ctx.cloud_session()?;
            if !store.delete_agent_config(&user, &record_id).await? {
                return Err(StudioError::NotFound(format!("cloud agent '{}'", record_id)));
            }
            json!({ "deleted": record_id })
        }
        Action::SaveConversation => {
            let (store, user) = ctx.cloud_session()?;
            if ctx.session.test_conversation.is_empty() {
                return Err(StudioError::invalid("test_conversation", "is empty"));
            }
            let record = ConversationRecord {
                agent_id: ctx.session.deployed_agent_id.clone(),
                messages: ctx.session.test_conversation.clone(),
                metadata: json!({ "source": "agent-builder" }),
            };
            store.save_conversation(&user, &record).await?;
            json!({ "saved": record.messages.len() })
        }
    };
    Ok(PageOutput::View(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_checked_locally() {
        assert!(check_credentials("user@example.com", "secret1").is_ok());
        let err = check_credentials("user@localhost", "123").unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password"]);
    }
}
