use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Process-level settings read once at start-up.
///
/// Sources, lowest priority first: built-in defaults, the `key=value`
/// environment file, then the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Fallback key for sessions that never supplied their own.
    #[serde(default)]
    pub elevenlabs_api_key: Option<String>,

    #[serde(default = "default_elevenlabs_base_url")]
    pub elevenlabs_base_url: String,

    #[serde(default)]
    pub supabase_url: Option<String>,

    #[serde(default)]
    pub supabase_key: Option<String>,

    /// Built dashboard assets served at `/`.
    #[serde(default)]
    pub static_dir: Option<String>,

    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Sessions untouched for this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Live session ceiling; the least recently used session makes room.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_session_idle_secs() -> u64 {
    3600
}

fn default_max_sessions() -> usize {
    1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            elevenlabs_api_key: None,
            elevenlabs_base_url: default_elevenlabs_base_url(),
            supabase_url: None,
            supabase_key: None,
            static_dir: None,
            request_timeout_secs: None,
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl AppConfig {
    /// Load from an env file (missing file is fine) and the process environment.
    pub fn load(env_file: &Path) -> Result<Self> {
        Self::load_with_env(env_file, None)
    }

    /// Like [`AppConfig::load`], but with an explicit environment map instead
    /// of the real process environment.
    pub fn load_with_env(
        env_file: &Path,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        if env_file.exists() {
            let content = fs::read_to_string(env_file)?;
            builder = builder.add_source(config::File::from_str(
                &normalize_env_file(&content),
                config::FileFormat::Ini,
            ));
            tracing::debug!("Read environment file {}", env_file.display());
        } else {
            tracing::debug!("No environment file at {}", env_file.display());
        }

        let settings = builder
            .add_source(config::Environment::default().source(env))
            .build()?;

        let mut config: AppConfig = settings.try_deserialize()?;
        config.drop_blank_values();
        Ok(config)
    }

    pub fn cloud_enabled(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_key.is_some()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    fn drop_blank_values(&mut self) {
        for value in [
            &mut self.elevenlabs_api_key,
            &mut self.supabase_url,
            &mut self.supabase_key,
            &mut self.static_dir,
        ] {
            if value.as_deref().map(str::trim).is_some_and(str::is_empty) {
                *value = None;
            }
        }
    }
}

fn env_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$")
            .expect("env line pattern is valid")
    })
}

fn env_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{(\w+)\}").expect("env reference pattern is valid"))
}

/// Rewrites a dotenv file into INI root entries: keys lower-cased, quotes
/// stripped, `${VAR}` references expanded. Comments and junk lines are dropped.
fn normalize_env_file(content: &str) -> String {
    let mut out = String::new();
    for line in content.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let Some(caps) = env_line_pattern().captures(line) else {
            continue;
        };
        let key = caps[1].to_lowercase();
        let value = expand_env_refs(strip_quotes(&caps[2]));
        out.push_str(&key);
        out.push('=');
        out.push_str(&value);
        out.push('\n');
    }
    out
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Replace `${VAR}` with the process environment value; unknown names stay.
pub fn expand_env_refs(value: &str) -> String {
    env_ref_pattern()
        .replace_all(value, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(content: &str, env: &[(&str, &str)]) -> AppConfig {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let env = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        AppConfig::load_with_env(file.path(), Some(env)).unwrap()
    }

    #[test]
    fn reads_env_file_keys() {
        let config = load(
            "# studio\nELEVENLABS_API_KEY=\"sk-test-123456\"\nPORT=9191\nexport SUPABASE_URL=https://demo.supabase.co\nSUPABASE_KEY='anon'\n",
            &[],
        );
        assert_eq!(config.elevenlabs_api_key.as_deref(), Some("sk-test-123456"));
        assert_eq!(config.port, 9191);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.cloud_enabled());
    }

    #[test]
    fn environment_overrides_file() {
        let config = load("PORT=9191\n", &[("PORT", "7000")]);
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn blank_values_are_unset() {
        let config = load("SUPABASE_URL=\nSUPABASE_KEY=abc\n", &[]);
        assert!(config.supabase_url.is_none());
        assert!(!config.cloud_enabled());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load_with_env(
            Path::new("/nonexistent/studio.env"),
            Some(config::Map::new()),
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.elevenlabs_base_url, "https://api.elevenlabs.io");
        assert_eq!(config.session_idle_timeout(), Duration::from_secs(3600));
        assert_eq!(config.max_sessions, 1000);
    }

    #[test]
    fn expands_known_references_only() {
        std::env::set_var("STUDIO_TEST_EXPAND_REF", "expanded");
        assert_eq!(expand_env_refs("a-${STUDIO_TEST_EXPAND_REF}-b"), "a-expanded-b");
        assert_eq!(
            expand_env_refs("${STUDIO_TEST_SURELY_UNSET_VAR}"),
            "${STUDIO_TEST_SURELY_UNSET_VAR}"
        );
    }
}
