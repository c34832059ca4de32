use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub session: SessionPolicyConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub speech: SpeechConfig,
    pub events: EventsConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    /// Prefix used when building public media URLs
    pub public_base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "interview-capture".to_string(),
            http: HttpConfig::default(),
            public_base_url: "http://localhost:8080/media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Session continuity thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionPolicyConfig {
    /// An active session untouched for this long is auto-paused on check
    pub staleness_minutes: i64,
    /// A paused session older than this can no longer be resumed
    pub max_pause_days: i64,
}

impl Default for SessionPolicyConfig {
    fn default() -> Self {
        Self {
            staleness_minutes: 30,
            max_pause_days: 7,
        }
    }
}

impl SessionPolicyConfig {
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.staleness_minutes)
    }

    pub fn max_pause(&self) -> chrono::Duration {
        chrono::Duration::days(self.max_pause_days)
    }
}

/// One rate limit rule: at most `max_requests` per `window_secs`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateRule {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub start_session: RateRule,
    pub session_update: RateRule,
    pub submit_response: RateRule,
    pub upload_chunk: RateRule,
    pub synthesize: RateRule,
    pub transcribe: RateRule,
    /// Transcription input ceiling in bytes
    pub transcribe_max_bytes: usize,
    /// Per-chunk upload ceiling in bytes
    pub chunk_max_bytes: usize,
    /// How often expired counters are swept from memory
    pub sweep_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            start_session: RateRule::new(10, 60),
            session_update: RateRule::new(60, 60),
            submit_response: RateRule::new(30, 60),
            upload_chunk: RateRule::new(300, 60),
            synthesize: RateRule::new(20, 60),
            transcribe: RateRule::new(20, 60),
            transcribe_max_bytes: 25 * 1024 * 1024,
            chunk_max_bytes: 50 * 1024 * 1024,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the media object store (`~` is expanded)
    pub root: String,
    /// Optional JSON file of studies to seed the row store with
    pub studies_file: Option<String>,
    /// Unfinalized upload sessions older than this are reclaimed
    pub upload_ttl_hours: i64,
    /// Serve the media root under `/media`. Turn off when a CDN or proxy
    /// serves `public_base_url` instead.
    pub serve_media: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "~/.interview-capture/media".to_string(),
            studies_file: None,
            upload_ttl_hours: 24,
            serve_media: true,
        }
    }
}

impl StorageConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.root).into_owned())
    }

    pub fn upload_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.upload_ttl_hours)
    }

    pub fn studies_path(&self) -> Option<PathBuf> {
        self.studies_file
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

/// Client-side capture tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub chunk_interval_secs: u64,
    pub max_duration_secs: u64,
    pub upload_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_interval_secs: 5,
            max_duration_secs: 30 * 60,
            upload_attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    pub api_key: Option<String>,
    pub tts_model: String,
    pub stt_model: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            tts_model: "tts-1".to_string(),
            stt_model: "whisper-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// NATS server URL; lifecycle events are not published when unset
    pub nats_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token -> researcher id
    pub researcher_tokens: HashMap<String, String>,
}

impl Config {
    /// Load from `path` (any format the config crate understands), overridden
    /// by `INTERVIEW__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("INTERVIEW").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
