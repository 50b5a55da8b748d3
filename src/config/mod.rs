use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 4800;
const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DEFAULT_DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const DEFAULT_SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_AI_UPSTREAM: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_AI_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_AI_DAILY_LIMIT: u32 = 3;
const DEFAULT_DEBOUNCE_MS: u64 = 1000;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── DriveConfig ──────────────────────────────────────────────────────────────

/// Cloud-drive endpoints (`[drive]` in config.toml). Overriding these points
/// the adapter at a mock service in tests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Files/metadata API base.
    pub api_base: String,
    /// Content upload API base.
    pub upload_base: String,
    /// Spreadsheets API base.
    pub sheets_base: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DRIVE_API_BASE.to_string(),
            upload_base: DEFAULT_DRIVE_UPLOAD_BASE.to_string(),
            sheets_base: DEFAULT_SHEETS_BASE.to_string(),
        }
    }
}

// ─── AiConfig ─────────────────────────────────────────────────────────────────

/// Completion relay settings (`[ai]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiConfig {
    /// OpenAI-compatible chat completions endpoint the proxy forwards to.
    pub upstream_url: String,
    /// Model id sent with every request.
    pub model: String,
    /// Client-side daily usage cap, per calendar date.
    pub daily_limit: u32,
    /// Where the client sends its analysis requests. None = the proxy this
    /// process serves on `http://{bind}:{port}/api/ai`.
    pub proxy_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_AI_UPSTREAM.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            daily_limit: DEFAULT_AI_DAILY_LIMIT,
            proxy_url: None,
        }
    }
}

// ─── SyncConfig ───────────────────────────────────────────────────────────────

/// Autosave tuning (`[sync]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Debounce delay between the last edit and its write, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// AI proxy server port (default: 4800).
    port: Option<u16>,
    /// Bind address for the proxy server (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,idealog=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Cloud-drive endpoints (`[drive]`).
    drive: Option<DriveConfig>,
    /// Completion relay settings (`[ai]`).
    ai: Option<AiConfig>,
    /// Autosave tuning (`[sync]`).
    sync: Option<SyncConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub log: String,
    /// "pretty" (default) | "json".
    pub log_format: String,
    pub drive: DriveConfig,
    pub ai: AiConfig,
    pub sync: SyncConfig,
    /// Upstream completion API key (IDEALOG_AI_KEY / GROQ_API_KEY env).
    /// None means the proxy rejects requests with a configuration error.
    pub ai_api_key: Option<String>,
}

impl AppConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("IDEALOG_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("IDEALOG_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let ai_api_key = std::env::var("IDEALOG_AI_KEY")
            .ok()
            .or_else(|| std::env::var("GROQ_API_KEY").ok())
            .filter(|k| !k.is_empty());

        Self {
            port,
            bind_address,
            data_dir,
            log,
            log_format,
            drive: toml.drive.unwrap_or_default(),
            ai: toml.ai.unwrap_or_default(),
            sync: toml.sync.unwrap_or_default(),
            ai_api_key,
        }
    }

    /// Where the AI client sends requests: the configured proxy, or the one
    /// this process serves.
    pub fn proxy_url(&self) -> String {
        self.ai
            .proxy_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/api/ai", self.bind_address, self.port))
    }

    pub fn autosave_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sync.debounce_ms)
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/idealog
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("idealog");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/idealog or ~/.local/share/idealog
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("idealog");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("idealog");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\idealog
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("idealog");
        }
    }
    // Fallback
    PathBuf::from(".idealog")
}
