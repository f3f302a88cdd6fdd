//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.line-relay/config.json`) and environment.
//! Credentials may live in the file but the usual deployment supplies them through
//! `LINE_CHANNEL_SECRET`, `LINE_CHANNEL_ACCESS_TOKEN`, `DIFY_API_KEY` and `DIFY_API_URL`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LINE Messaging API credentials and endpoints.
    #[serde(default)]
    pub line: LineConfig,

    /// Dify analysis app settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// User-visible texts.
    #[serde(default)]
    pub messages: MessagesConfig,
}

/// Server bind and port, plus the startup credential policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the webhook listener (default 8080).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the webhook must be reachable by LINE).
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// When true (default), refuse to start if any credential is missing.
    /// When false, log the missing credentials and start anyway.
    #[serde(default = "default_true")]
    pub strict_credentials: bool,
}

fn default_server_port() -> u16 {
    8080
}

fn default_server_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
            strict_credentials: true,
        }
    }
}

/// LINE channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Channel secret used to verify `X-Line-Signature`. Overridden by LINE_CHANNEL_SECRET.
    pub channel_secret: Option<String>,
    /// Long-lived channel access token. Overridden by LINE_CHANNEL_ACCESS_TOKEN.
    pub channel_access_token: Option<String>,
    /// Base URL for reply and push (default https://api.line.me).
    #[serde(default = "default_line_api_base")]
    pub api_base: String,
    /// Base URL for content download (default https://api-data.line.me).
    #[serde(default = "default_line_data_api_base")]
    pub data_api_base: String,
    /// Timeout for every LINE API call, in seconds.
    #[serde(default = "default_line_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_line_api_base() -> String {
    "https://api.line.me".to_string()
}

fn default_line_data_api_base() -> String {
    "https://api-data.line.me".to_string()
}

fn default_line_timeout_secs() -> u64 {
    60
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: None,
            channel_access_token: None,
            api_base: default_line_api_base(),
            data_api_base: default_line_data_api_base(),
            timeout_secs: default_line_timeout_secs(),
        }
    }
}

/// How the image reaches the analysis app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStrategy {
    /// One multipart POST carrying the image and the scalar fields.
    #[default]
    Multipart,
    /// Upload to `/files/upload`, then reference the file id from `/chat-messages`.
    UploadThenReference,
}

/// Dify analysis app config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// App API key (sent as Bearer). Overridden by DIFY_API_KEY.
    pub api_key: Option<String>,
    /// For `multipart`, the full endpoint URL; for `uploadThenReference`, the API base
    /// (e.g. https://api.dify.ai/v1). Overridden by DIFY_API_URL.
    pub api_url: Option<String>,
    #[serde(default)]
    pub strategy: AnalysisStrategy,
    /// Multipart field name of the image part (multipart strategy only).
    #[serde(default = "default_image_field")]
    pub image_field: String,
    /// Query sent with the image. Some apps reject an empty query; the upload strategy always
    /// sends one and falls back to a built-in prompt when this is unset.
    #[serde(default)]
    pub query: Option<String>,
    /// Timeout for each analysis call, in seconds.
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_image_field() -> String {
    "pipe_drawing_image".to_string()
}

fn default_analysis_timeout_secs() -> u64 {
    300
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            strategy: AnalysisStrategy::default(),
            image_field: default_image_field(),
            query: None,
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

/// Texts sent to users. Defaults are the original deployment's Traditional Chinese wording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagesConfig {
    /// Reply to any text message.
    pub text_reply: String,
    /// Immediate acknowledgement of an image.
    pub image_received: String,
    /// Pushed when the app answered without an `answer`.
    pub no_answer: String,
    /// Prefix of the notice pushed when the analysis call fails.
    pub analysis_failed: String,
    /// Pushed when the image could not be downloaded from LINE.
    pub download_failed: String,
    /// Prefix of the notice pushed when the app returned something other than JSON.
    pub malformed_response: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            text_reply: "您好，請直接上傳需要分析的管件圖面。".to_string(),
            image_received: "圖面已收到，專家系統分析中，請稍候約30秒...".to_string(),
            no_answer: "分析完成，但未收到有效回覆。".to_string(),
            analysis_failed: "Dify API 呼叫失敗".to_string(),
            download_failed: "圖片下載失敗，請稍後再試。".to_string(),
            malformed_response: "Dify API 回應格式錯誤".to_string(),
        }
    }
}

/// Credentials resolved from env and config, each trimmed and `None` when empty.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub channel_secret: Option<String>,
    pub channel_access_token: Option<String>,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
}

impl Credentials {
    /// Names of the environment variables whose value is missing from both env and config.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.channel_secret.is_none() {
            out.push(ENV_CHANNEL_SECRET);
        }
        if self.channel_access_token.is_none() {
            out.push(ENV_CHANNEL_ACCESS_TOKEN);
        }
        if self.api_key.is_none() {
            out.push(ENV_DIFY_API_KEY);
        }
        if self.api_url.is_none() {
            out.push(ENV_DIFY_API_URL);
        }
        out
    }
}

pub const ENV_CHANNEL_SECRET: &str = "LINE_CHANNEL_SECRET";
pub const ENV_CHANNEL_ACCESS_TOKEN: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const ENV_DIFY_API_KEY: &str = "DIFY_API_KEY";
pub const ENV_DIFY_API_URL: &str = "DIFY_API_URL";

fn env_or(name: &str, fallback: Option<&String>) -> Option<String> {
    std::env::var(name)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            fallback
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the four credentials: env overrides config.
pub fn resolve_credentials(config: &Config) -> Credentials {
    Credentials {
        channel_secret: env_or(ENV_CHANNEL_SECRET, config.line.channel_secret.as_ref()),
        channel_access_token: env_or(
            ENV_CHANNEL_ACCESS_TOKEN,
            config.line.channel_access_token.as_ref(),
        ),
        api_key: env_or(ENV_DIFY_API_KEY, config.analysis.api_key.as_ref()),
        api_url: env_or(ENV_DIFY_API_URL, config.analysis.api_url.as_ref()),
    }
}

/// Write resolved credentials back into the config so components only read `Config`.
/// Fails when any is missing and `server.strictCredentials` is set.
pub fn apply_credentials(config: &mut Config, creds: Credentials) -> Result<()> {
    let missing = creds.missing();
    if !missing.is_empty() {
        if config.server.strict_credentials {
            anyhow::bail!(
                "missing required credentials: {} (set the environment variables or the config file)",
                missing.join(", ")
            );
        }
        log::error!(
            "missing required credentials: {}; starting anyway (server.strictCredentials is false)",
            missing.join(", ")
        );
    }
    config.line.channel_secret = creds.channel_secret;
    config.line.channel_access_token = creds.channel_access_token;
    config.analysis.api_key = creds.api_key;
    config.analysis.api_url = creds.api_url;
    Ok(())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".line-relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, RELAY_CONFIG_PATH, or the default. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
