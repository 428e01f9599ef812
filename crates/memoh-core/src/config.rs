use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{MemohError, Result};

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_db_path() -> String {
    "memoh.db".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_edit_interval_ms() -> u64 {
    5_000
}

fn default_history_minutes() -> i64 {
    crate::types::DEFAULT_MAX_CONTEXT_LOAD_MINUTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Token,
}

impl Default for AuthMode {
    fn default() -> Self {
        AuthMode::None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub token: Option<String>,
}

/// The external agent gateway this process resolves conversations against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGatewayConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for AgentGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8091".to_string(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub allowed_chat_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookAuthMode {
    None,
    HmacSha256,
    BearerToken,
}

impl Default for WebhookAuthMode {
    fn default() -> Self {
        WebhookAuthMode::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSourceConfig {
    pub name: String,
    #[serde(default)]
    pub auth_mode: WebhookAuthMode,
    #[serde(default)]
    pub secret: Option<String>,
    pub bot_id: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub sources: Vec<WebhookSourceConfig>,
}

fn default_model_id() -> String {
    "gpt-4o-mini".to_string()
}

fn default_client_type() -> String {
    "openai".to_string()
}

fn default_input_modalities() -> Vec<String> {
    vec!["text".to_string()]
}

/// The single model the bundled `FixedModelCatalog` resolves every bot/chat
/// to — per-bot model selection is out of scope (§1), this is the seam an
/// operator with a real catalog replaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_client_type")]
    pub client_type: String,
    #[serde(default = "default_input_modalities")]
    pub input_modalities: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            client_type: default_client_type(),
            input_modalities: default_input_modalities(),
            api_key: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_history_minutes")]
    pub default_history_minutes: i64,
    #[serde(default = "default_edit_interval_ms")]
    pub telegram_edit_interval_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_history_minutes: default_history_minutes(),
            telegram_edit_interval_ms: default_edit_interval_ms(),
        }
    }
}

/// Root configuration, loaded the way `SkynetConfig::load` does: a bundled
/// default, then an optional TOML file on disk, then `MEMOH_`-prefixed
/// environment overrides — each layer only overriding keys it sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemohConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub agent_gateway: AgentGatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub default_model: ModelConfig,
}

impl MemohConfig {
    /// Resolves the config file path with the same precedence as the
    /// teacher's loader: explicit argument, then `MEMOH_CONFIG`, then
    /// `~/.memoh/memoh.toml`, then none (defaults + env only).
    fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p);
        }
        if let Ok(p) = std::env::var("MEMOH_CONFIG") {
            return Some(PathBuf::from(p));
        }
        dirs_home().map(|h| h.join(".memoh").join("memoh.toml"))
    }

    pub fn load(explicit_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(MemohConfig::default()));

        if let Some(path) = Self::resolve_path(explicit_path) {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("MEMOH_").split("__"));

        figment
            .extract()
            .map_err(|e| MemohError::Config(e.to_string()))
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
