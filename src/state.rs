use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cloud::{CloudStore, SupabaseClient};
use crate::config::AppConfig;
use crate::config_manager::AgentConfiguration;
use crate::pages::PageContext;
use crate::session::{Session, SessionManager};
use crate::voice_api::{ElevenLabsFactory, VoiceApiFactory};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionManager>,
    pub voice_api: Arc<dyn VoiceApiFactory>,
    pub cloud: Option<Arc<dyn CloudStore>>,
}

impl AppState {
    /// Wire the real provider and, when configured, cloud storage.
    pub fn new(config: AppConfig) -> Result<Self> {
        let voice_api = ElevenLabsFactory::new(config.elevenlabs_base_url.clone(), config.request_timeout())?;

        let cloud: Option<Arc<dyn CloudStore>> = match (&config.supabase_url, &config.supabase_key) {
            (Some(url), Some(key)) => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = config.request_timeout() {
                    builder = builder.timeout(timeout);
                }
                info!("Cloud storage enabled at {}", url);
                Some(Arc::new(SupabaseClient::new(builder.build()?, url.clone(), key.clone())))
            }
            _ => {
                info!("Cloud storage disabled (SUPABASE_URL / SUPABASE_KEY not set)");
                None
            }
        };

        if config.elevenlabs_api_key.is_some() {
            info!("Default ElevenLabs API key configured");
        }

        Ok(Self::with_services(config, Arc::new(voice_api), cloud))
    }

    pub fn with_services(
        config: AppConfig,
        voice_api: Arc<dyn VoiceApiFactory>,
        cloud: Option<Arc<dyn CloudStore>>,
    ) -> Self {
        let sessions = SessionManager::with_limits(
            AgentConfiguration::default(),
            config.session_idle_timeout(),
            config.max_sessions,
        );
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            voice_api,
            cloud,
        }
    }

    pub fn page_context<'a>(&self, session: &'a mut Session) -> PageContext<'a> {
        PageContext {
            session,
            voice_api: self.voice_api.clone(),
            cloud: self.cloud.clone(),
            default_api_key: self.config.elevenlabs_api_key.clone(),
        }
    }
}
