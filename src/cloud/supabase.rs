use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::interface::*;
use crate::config_manager::AgentConfiguration;

/// Supabase auth (`/auth/v1`) and PostgREST (`/rest/v1`) client.
pub struct SupabaseClient {
    http: Client,
    url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyRow {
    api_key: String,
}

impl SupabaseClient {
    pub fn new(http: Client, url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }

    fn as_user(&self, request: RequestBuilder, user: &CloudUser) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&user.access_token)
    }

    fn anonymous(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, CloudError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
        warn!("Cloud storage call failed with HTTP {}: {}", status, message);
        Err(match status.as_u16() {
            401 | 403 => CloudError::Auth(message),
            code => CloudError::Rejected { status: code, message },
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CloudError> {
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    async fn count_rows(&self, user: &CloudUser, table: &str) -> Result<usize, CloudError> {
        let rows: Vec<Value> = self
            .json(self.as_user(
                self.http
                    .get(self.table_url(table))
                    .query(&[("select", "id".to_string()), ("user_id", eq(&user.id))]),
                user,
            ))
            .await?;
        Ok(rows.len())
    }

    async fn insert(&self, user: &CloudUser, table: &str, row: Value) -> Result<(), CloudError> {
        self.send(self.as_user(
            self.http
                .post(self.table_url(table))
                .header("Prefer", "return=minimal")
                .json(&row),
            user,
        ))
        .await?;
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// Auth errors use `error_description`/`msg`, PostgREST uses `message`.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[async_trait]
impl CloudStore for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<SignUpOutcome, CloudError> {
        let body: Value = self
            .json(self.anonymous(self.http.post(self.auth_url("signup")).json(&json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))))
            .await?;

        let user_id = body
            .pointer("/user/id")
            .or_else(|| body.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(SignUpOutcome {
            user_id,
            confirmation_required: body.get("access_token").map_or(true, Value::is_null),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<CloudUser, CloudError> {
        let token: TokenResponse = self
            .json(self.anonymous(
                self.http
                    .post(self.auth_url("token"))
                    .query(&[("grant_type", "password")])
                    .json(&json!({ "email": email, "password": password })),
            ))
            .await?;
        debug!("Cloud sign-in for user {}", token.user.id);

        Ok(CloudUser {
            id: token.user.id,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            access_token: token.access_token,
        })
    }

    async fn sign_out(&self, user: &CloudUser) -> Result<(), CloudError> {
        self.send(self.as_user(self.http.post(self.auth_url("logout")), user))
            .await?;
        Ok(())
    }

    async fn save_api_key(&self, user: &CloudUser, api_key: &str) -> Result<(), CloudError> {
        self.send(self.as_user(
            self.http
                .post(self.table_url("api_keys"))
                .query(&[("on_conflict", "user_id")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&json!({
                    "user_id": user.id,
                    "api_key": api_key,
                    "updated_at": Utc::now().to_rfc3339(),
                })),
            user,
        ))
        .await?;
        Ok(())
    }

    async fn load_api_key(&self, user: &CloudUser) -> Result<Option<String>, CloudError> {
        let rows: Vec<ApiKeyRow> = self
            .json(self.as_user(
                self.http.get(self.table_url("api_keys")).query(&[
                    ("select", "api_key".to_string()),
                    ("user_id", eq(&user.id)),
                    ("limit", "1".to_string()),
                ]),
                user,
            ))
            .await?;
        Ok(rows.into_iter().next().map(|row| row.api_key))
    }

    async fn save_agent_config(
        &self,
        user: &CloudUser,
        config: &AgentConfiguration,
    ) -> Result<SavedAgentRecord, CloudError> {
        let now = Utc::now().to_rfc3339();
        let agent_name = if config.name.trim().is_empty() {
            "Untitled Agent".to_string()
        } else {
            config.name.clone()
        };
        let rows: Vec<SavedAgentRecord> = self
            .json(self.as_user(
                self.http
                    .post(self.table_url("agent_configs"))
                    .header("Prefer", "return=representation")
                    .json(&json!({
                        "user_id": user.id,
                        "agent_name": agent_name,
                        "config": config,
                        "created_at": now,
                        "updated_at": now,
                    })),
                user,
            ))
            .await?;

        rows.into_iter().next().ok_or(CloudError::Rejected {
            status: 200,
            message: "insert returned no row".to_string(),
        })
    }

    async fn list_agent_configs(&self, user: &CloudUser) -> Result<Vec<SavedAgentRecord>, CloudError> {
        self.json(self.as_user(
            self.http.get(self.table_url("agent_configs")).query(&[
                ("select", "*".to_string()),
                ("user_id", eq(&user.id)),
                ("order", "created_at.desc".to_string()),
            ]),
            user,
        ))
        .await
    }

    async fn delete_agent_config(&self, user: &CloudUser, record_id: &str) -> Result<bool, CloudError> {
        let rows: Vec<Value> = self
            .json(self.as_user(
                self.http
                    .delete(self.table_url("agent_configs"))
                    .query(&[("id", eq(record_id)), ("user_id", eq(&user.id))])
                    .header("Prefer", "return=representation"),
                user,
            ))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn save_conversation(&self, user: &CloudUser, conversation: &ConversationRecord) -> Result<(), CloudError> {
        self.insert(
            user,
            "conversations",
            json!({
                "user_id": user.id,
                "agent_id": conversation.agent_id,
                "messages": conversation.messages,
                "metadata": conversation.metadata,
                "created_at": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    async fn record_usage(&self, user: &CloudUser, metric: &UsageMetric) -> Result<(), CloudError> {
        self.insert(
            user,
            "usage_metrics",
            json!({
                "user_id": user.id,
                "feature_used": metric.feature,
                "usage_count": metric.count,
                "metadata": metric.metadata,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    async fn user_analytics(&self, user: &CloudUser) -> Result<UserAnalytics, CloudError> {
        Ok(UserAnalytics {
            total_usage: self.count_rows(user, "usage_metrics").await?,
            agent_count: self.count_rows(user, "agent_configs").await?,
            conversation_count: self.count_rows(user, "conversations").await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_auth_description() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            Some("Invalid login credentials".to_string())
        );
        assert_eq!(
            error_message(r#"{"code":"42P01","message":"relation \"api_keys\" does not exist"}"#),
            Some("relation \"api_keys\" does not exist".to_string())
        );
        assert_eq!(error_message("<html>"), None);
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        let client = SupabaseClient::new(Client::new(), "https://demo.supabase.co/", "anon");
        assert_eq!(client.table_url("agent_configs"), "https://demo.supabase.co/rest/v1/agent_configs");
        assert_eq!(client.auth_url("token"), "https://demo.supabase.co/auth/v1/token");
    }
}
