use serde_json::Value;
use thiserror::Error;

/// Failures of the External API Client. Messages are the provider's own text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rejected by provider: {0}")]
    Validation(String),
}

impl ApiError {
    /// Classify a non-2xx provider response.
    pub fn from_response(status: u16, body: &str) -> Self {
        let (code, message) = parse_detail(body);
        let message = message.unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("provider returned HTTP {}", status)
            } else {
                body.trim().to_string()
            }
        });

        match code.as_deref() {
            Some("quota_exceeded") | Some("too_many_concurrent_requests") => {
                return ApiError::QuotaExceeded(message)
            }
            Some("invalid_api_key") | Some("needs_authorization") | Some("missing_permissions") => {
                return ApiError::Authentication(message)
            }
            _ => {}
        }

        match status {
            401 | 403 => ApiError::Authentication(message),
            429 => ApiError::QuotaExceeded(message),
            400..=499 => ApiError::Validation(message),
            _ => ApiError::Network(message),
        }
    }
}

/// Provider error bodies look like `{"detail": {"status": ..., "message": ...}}`,
/// `{"detail": "..."}`, or a FastAPI list of `{"msg": ...}` entries.
fn parse_detail(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    match value.get("detail") {
        Some(Value::String(msg)) => (None, Some(msg.clone())),
        Some(Value::Object(detail)) => (
            detail.get("status").and_then(Value::as_str).map(str::to_string),
            detail.get("message").and_then(Value::as_str).map(str::to_string),
        ),
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            (None, (!msgs.is_empty()).then(|| msgs.join("; ")))
        }
        _ => (None, value.get("message").and_then(Value::as_str).map(str::to_string)),
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ApiError::Network(format!("unreadable provider response: {}", err))
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_status_wins_over_http_code() {
        let body = r#"{"detail":{"status":"quota_exceeded","message":"This request exceeds your quota."}}"#;
        assert_eq!(
            ApiError::from_response(401, body),
            ApiError::QuotaExceeded("This request exceeds your quota.".into())
        );
    }

    #[test]
    fn unauthorized_is_authentication() {
        let body = r#"{"detail":{"status":"invalid_api_key","message":"Invalid API key"}}"#;
        assert_eq!(
            ApiError::from_response(401, body),
            ApiError::Authentication("Invalid API key".into())
        );
        assert!(matches!(ApiError::from_response(403, ""), ApiError::Authentication(_)));
    }

    #[test]
    fn unprocessable_keeps_field_messages() {
        let body = r#"{"detail":[{"loc":["body","text"],"msg":"field required"}]}"#;
        assert_eq!(
            ApiError::from_response(422, body),
            ApiError::Validation("field required".into())
        );
    }

    #[test]
    fn server_errors_are_network() {
        assert_eq!(
            ApiError::from_response(503, "upstream unavailable"),
            ApiError::Network("upstream unavailable".into())
        );
        assert_eq!(
            ApiError::from_response(500, ""),
            ApiError::Network("provider returned HTTP 500".into())
        );
    }

    #[test]
    fn rate_limit_is_quota() {
        assert!(matches!(
            ApiError::from_response(429, r#"{"detail":"slow down"}"#),
            ApiError::QuotaExceeded(m) if m == "slow down"
        ));
    }
}
