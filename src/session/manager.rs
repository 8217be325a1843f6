use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use regex::Regex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Session;
use crate::config_manager::AgentConfiguration;
use crate::error::StudioError;

pub type SessionHandle = Arc<Mutex<Session>>;

/// Default idle lifetime of a session.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default ceiling on live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

fn session_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("session id pattern is valid"))
}

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

/// Owns every live session. Each session sits behind its own mutex, so one
/// user action runs at a time per session while sessions stay independent.
///
/// Sessions idle for longer than the idle timeout are dropped by
/// [`sweep`](SessionManager::sweep); when the ceiling is reached the least
/// recently used session is evicted to make room for a new one.
pub struct SessionManager {
    sessions: DashMap<String, SessionEntry>,
    defaults: AgentConfiguration,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_defaults(AgentConfiguration::default())
    }

    pub fn with_defaults(defaults: AgentConfiguration) -> Self {
        Self::with_limits(defaults, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_limits(defaults: AgentConfiguration, idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            defaults,
            idle_timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn defaults(&self) -> &AgentConfiguration {
        &self.defaults
    }

    fn check_id(id: &str) -> Result<(), StudioError> {
        if session_id_pattern().is_match(id) {
            Ok(())
        } else {
            Err(StudioError::invalid(
                "session_id",
                "must be 1-64 letters, digits, '-' or '_'",
            ))
        }
    }

    /// Returns the session, installing the default configuration on first access.
    pub fn get_or_init(&self, id: &str) -> Result<SessionHandle, StudioError> {
        Self::check_id(id)?;
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.last_seen = Instant::now();
            return Ok(entry.handle.clone());
        }

        if self.sessions.len() >= self.max_sessions {
            self.sweep();
        }
        while self.sessions.len() >= self.max_sessions {
            if !self.evict_least_recent() {
                break;
            }
        }

        let mut entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
            info!("Starting session {}", id);
            SessionEntry {
                handle: Arc::new(Mutex::new(Session::new(id, &self.defaults))),
                last_seen: Instant::now(),
            }
        });
        entry.last_seen = Instant::now();
        Ok(entry.handle.clone())
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.handle.clone())
    }

    /// Drops all state held for the session. Returns whether it existed.
    pub fn clear(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!("Cleared session {}", id);
        }
        removed
    }

    /// Restores the session's configuration store to its defaults.
    pub async fn reset(&self, id: &str) -> Result<(), StudioError> {
        let handle = self.get_or_init(id)?;
        let mut session = handle.lock().await;
        session.store.reset();
        debug!("Reset configuration for session {}", id);
        Ok(())
    }

    /// Drops sessions idle for longer than the configured timeout.
    pub fn sweep(&self) -> usize {
        self.sweep_idle(self.idle_timeout)
    }

    /// Drops sessions not touched within `idle`. Returns how many went.
    pub fn sweep_idle(&self, idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.last_seen.elapsed() < idle);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!("Expired {} idle session(s)", removed);
        }
        removed
    }

    fn evict_least_recent(&self) -> bool {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.last_seen)
            .map(|entry| entry.key().clone());
        match oldest {
            Some(id) => {
                info!("Session limit reached, evicting {}", id);
                self.sessions.remove(&id).is_some()
            }
            None => false,
        }
    }

    /// Runs [`sweep`](SessionManager::sweep) every `every` until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                manager.sweep();
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConfigKey;
    use serde_json::json;

    #[tokio::test]
    async fn first_access_installs_defaults_and_later_access_reuses_state() {
        let manager = SessionManager::new();
        {
            let handle = manager.get_or_init("abc").unwrap();
            let mut session = handle.lock().await;
            assert!(!session.store.is_dirty());
            assert!(session.custom_tools.is_empty());
            session.store.set(ConfigKey::Name, json!("Support Bot"));
        }

        let handle = manager.get_or_init("abc").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.store.get(ConfigKey::Name), json!("Support Bot"));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let manager = SessionManager::new();
        manager
            .get_or_init("a")
            .unwrap()
            .lock()
            .await
            .store
            .set(ConfigKey::Stability, json!(0.9));
        let b = manager.get_or_init("b").unwrap();
        assert_eq!(b.lock().await.store.get(ConfigKey::Stability), json!(0.5));
    }

    #[tokio::test]
    async fn reset_and_clear() {
        let manager = SessionManager::new();
        let handle = manager.get_or_init("abc").unwrap();
        handle.lock().await.store.set(ConfigKey::Style, json!(0.3));
        handle.lock().await.api_key = Some("sk_0123456789".into());

        manager.reset("abc").await.unwrap();
        {
            let session = handle.lock().await;
            assert_eq!(session.store.get(ConfigKey::Style), json!(0.0));
            assert!(session.api_key.is_some());
        }

        assert!(manager.clear("abc"));
        assert!(!manager.clear("abc"));
        assert!(manager.get("abc").is_none());
        let fresh = manager.get_or_init("abc").unwrap();
        assert!(fresh.lock().await.api_key.is_none());
    }

    #[tokio::test]
    async fn idle_sessions_are_swept() {
        let manager = SessionManager::new();
        manager.get_or_init("a").unwrap();
        manager.get_or_init("b").unwrap();
        assert_eq!(manager.sweep_idle(Duration::from_secs(60)), 0);
        assert_eq!(manager.sweep_idle(Duration::ZERO), 2);
        assert!(manager.is_empty());
    }

    #[test]
    fn ceiling_evicts_the_least_recently_used() {
        let manager = SessionManager::with_limits(AgentConfiguration::default(), DEFAULT_IDLE_TIMEOUT, 2);
        manager.get_or_init("a").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        manager.get_or_init("b").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        manager.get_or_init("a").unwrap();
        std::thread::sleep(Duration::from_millis(5));

        manager.get_or_init("c").unwrap();
        assert_eq!(manager.len(), 2);
        assert!(manager.get("a").is_some());
        assert!(manager.get("b").is_none());
        assert!(manager.get("c").is_some());
    }

    #[test]
    fn rejects_unsafe_ids() {
        let manager = SessionManager::new();
        assert!(manager.get_or_init("../etc").is_err());
        assert!(manager.get_or_init("").is_err());
        assert!(manager.get_or_init(&"x".repeat(65)).is_err());
    }
}
