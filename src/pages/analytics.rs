use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::PageContext;
use crate::error::StudioError;
use crate::session::{Session, TurnRole};

fn session_statistics(session: &Session) -> Value {
    let mut generations: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &session.history {
        *generations.entry(record.feature.as_str()).or_default() += 1;
    }
    let characters: usize = session.history.iter().map(|r| r.characters).sum();
    let user_messages = session
        .test_conversation
        .iter()
        .filter(|t| t.role == TurnRole::User)
        .count();

    json!({
        "generations": generations,
        "characters_generated": characters,
        "saved_agents": session.saved_agents.len(),
        "custom_tools": session.custom_tools.len(),
        "dubbing_jobs": session.dubbing_jobs.len(),
        "test_messages": {
            "user": user_messages,
            "agent": session.test_conversation.len() - user_messages,
        },
        "session_started": session.created_at,
    })
}

/// Provider usage when a key is available, cloud totals when signed in.
/// A failing provider or cloud call fails the page; nothing is cached.
pub async fn render(ctx: &PageContext<'_>) -> Result<Value, StudioError> {
    let subscription = match ctx.api_key() {
        Some(_) => {
            let sub = ctx.api()?.subscription().await?;
            let used_percent = if sub.character_limit == 0 {
                0.0
            } else {
                sub.character_count as f64 * 100.0 / sub.character_limit as f64
            };
            Some(json!({
                "tier": sub.tier,
                "character_count": sub.character_count,
                "character_limit": sub.character_limit,
                "remaining_characters": sub.remaining_characters(),
                "used_percent": used_percent,
                "next_reset_unix": sub.next_character_count_reset_unix,
            }))
        }
        None => None,
    };

    let cloud = match (ctx.cloud.as_ref(), ctx.session.cloud_user.as_ref()) {
        (Some(store), Some(user)) => Some(store.user_analytics(user).await?),
        _ => None,
    };

    Ok(json!({
        "page": "analytics",
        "subscription": subscription,
        "session": session_statistics(&*ctx.session),
        "cloud": cloud,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_manager::AgentConfiguration;
    use crate::session::ConversationTurn;

    #[test]
    fn statistics_count_per_feature() {
        let mut session = Session::new("s", &AgentConfiguration::default());
        session.record_generation("text-to-speech", "a", None, 120);
        session.record_generation("text-to-speech", "b", None, 30);
        session.record_generation("dubbing", "c", None, 0);
        session.push_test_turn(ConversationTurn::new(TurnRole::User, "hi"));
        session.push_test_turn(ConversationTurn::new(TurnRole::Agent, "hello"));

        let stats = session_statistics(&session);
        assert_eq!(stats["generations"]["text-to-speech"], 2);
        assert_eq!(stats["characters_generated"], 150);
        assert_eq!(stats["test_messages"]["agent"], 1);
    }
}
