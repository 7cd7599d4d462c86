//! Configuration for the vigil engine.
//!
//! Uses `figment` for layered configuration: built-in defaults -> user
//! config file -> workspace config -> environment. Everything is reified
//! into [`EngineConfig`] at engine construction; nothing is parsed on the
//! scan path.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::Thresholds;

/// Which language-model provider the semantic layer should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Probe for a local provider, then fall back to OpenAI if a key is set.
    #[default]
    Auto,
    Ollama,
    LmStudio,
    OpenAi,
}

/// Sliding-window rate limit applied per sender by the context layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Maximum messages per window before the violation bump applies.
    pub max: usize,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max: 10,
        }
    }
}

/// The model name that marks "caller never chose a model"; when Ollama is
/// detected the classifier replaces it with a local model from the Ollama
/// list.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether the semantic layer calls out to a language model at all.
    pub semantic_enabled: bool,
    /// Heuristic risk at or above which the semantic layer runs.
    pub semantic_threshold: f64,
    /// Strict mode swaps in the tighter threshold ladder.
    pub strict_mode: bool,
    /// Default threshold ladder (ignored while strict mode is on).
    pub thresholds: Thresholds,
    pub llm_provider: LlmProvider,
    /// Endpoint override; defaults are per provider.
    pub llm_endpoint: Option<String>,
    pub llm_model: String,
    /// API key for the `openai` provider. Local providers need none.
    pub api_key: Option<String>,
    /// When true, a scan that needs the semantic layer fails if no
    /// provider can be detected. When false the heuristic-flag fallback is
    /// used silently.
    pub require_llm: bool,
    /// Directory of per-category pattern files. `None` uses the built-in
    /// catalog.
    pub patterns_dir: Option<PathBuf>,
    pub decode_payloads: bool,
    pub normalize_unicode: bool,
    /// Reserved: decoding currently runs at depth 1.
    pub max_decode_depth: u32,
    pub history_enabled: bool,
    /// Cap on the recent-messages FIFO used for repetition detection.
    pub max_history_size: usize,
    pub rate_limit: RateLimit,
    /// Senders always allowed (seeded into the decision resolver).
    pub allow_list: Vec<String>,
    /// Senders always blocked (seeded into the decision resolver).
    pub block_list: Vec<String>,
    /// Log level hint for embedders configuring a subscriber.
    pub log_level: String,
    /// Semantic call timeout in seconds.
    pub llm_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            semantic_enabled: true,
            semantic_threshold: 0.3,
            strict_mode: false,
            thresholds: Thresholds::default(),
            llm_provider: LlmProvider::Auto,
            llm_endpoint: None,
            llm_model: DEFAULT_MODEL.to_string(),
            api_key: None,
            require_llm: true,
            patterns_dir: None,
            decode_payloads: true,
            normalize_unicode: true,
            max_decode_depth: 2,
            history_enabled: true,
            max_history_size: 1000,
            rate_limit: RateLimit::default(),
            allow_list: Vec::new(),
            block_list: Vec::new(),
            log_level: "info".to_string(),
            llm_timeout_secs: 10,
        }
    }
}

/// Partial update accepted by `Engine::configure` at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub thresholds: Option<Thresholds>,
    pub strict_mode: Option<bool>,
    pub semantic_enabled: Option<bool>,
    pub semantic_threshold: Option<f64>,
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `VIGIL_`)
/// 2. Workspace-local config (`.vigil/config.toml`)
/// 3. User config (`~/.config/vigil/config.toml`)
/// 4. Built-in defaults
pub fn load_config(workspace: Option<&Path>) -> Result<EngineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "vigil", "vigil") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".vigil").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("VIGIL_").split("__"));

    figment.extract().map_err(Box::new)
}
