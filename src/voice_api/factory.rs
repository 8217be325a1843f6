use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tracing::info;

use super::client::ElevenLabsClient;
use super::interface::{VoiceApi, VoiceApiFactory};

/// Hands out ElevenLabs clients that share one connection pool.
pub struct ElevenLabsFactory {
    http: Client,
    base_url: String,
}

impl ElevenLabsFactory {
    /// `timeout` of `None` keeps the HTTP client's default (no limit).
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let base_url = base_url.into();
        info!("Voice API endpoint: {}", base_url);

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }
}

impl VoiceApiFactory for ElevenLabsFactory {
    fn client(&self, api_key: &str) -> Arc<dyn VoiceApi> {
        Arc::new(ElevenLabsClient::new(
            self.http.clone(),
            self.base_url.clone(),
            api_key,
        ))
    }
}
