//! Semantic layer: language-model intent classification.
//!
//! When the heuristic risk lands in the gating window the orchestrator asks
//! this layer to classify the message into the intent taxonomy. The call
//! goes to an OpenAI-style chat-completions endpoint; provider detection
//! probes local Ollama and LM Studio instances before falling back to
//! OpenAI when an API key is configured. Detection runs once per engine
//! instance (single-flight) and is cached.
//!
//! Every failure past detection is recovered locally: call errors and
//! unparseable replies degrade to the deterministic heuristic-flag fallback
//! so the scan always completes.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::{EngineConfig, LlmProvider, DEFAULT_MODEL};
use crate::error::{EngineError, Result};
use crate::types::{Action, Intent, SemanticResult};

/// Default base URL of a local Ollama instance.
pub const OLLAMA_BASE: &str = "http://localhost:11434";
/// Default base URL of a local LM Studio instance.
pub const LMSTUDIO_BASE: &str = "http://localhost:1234";
/// Default base URL of the OpenAI API.
pub const OPENAI_BASE: &str = "https://api.openai.com/v1";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Messages are truncated to this many characters before prompting.
const PROMPT_CHAR_LIMIT: usize = 2000;

/// Transport-level failure of a model call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("http status {0}")]
    Status(u16),
}

/// The wire seam to the language model.
///
/// `probe` issues a cheap GET used for provider detection; `complete` posts
/// an OpenAI-style chat-completions body and returns the assistant message
/// content. Tests substitute a scripted implementation.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> std::result::Result<String, TransportError>;

    async fn complete(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: Value,
        timeout: Duration,
    ) -> std::result::Result<String, TransportError>;
}

/// Production transport over `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn probe(&self, url: &str, timeout: Duration) -> std::result::Result<String, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn complete(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: Value,
        timeout: Duration,
    ) -> std::result::Result<String, TransportError> {
        let mut request = self.client.post(url).timeout(timeout).json(&body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(TransportError::Status(status.as_u16()));
        }
        let reply: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        reply["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::Request("completion reply had no message content".into()))
    }
}

fn classify_reqwest_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Request(e.to_string())
    }
}

/// Which provider detection settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    LmStudio,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::LmStudio => "lmstudio",
            ProviderKind::OpenAi => "openai",
        }
    }
}

/// Resolved provider: where to send chat completions and with which model.
#[derive(Debug, Clone)]
struct ProviderInfo {
    kind: ProviderKind,
    chat_url: String,
    model: String,
}

/// Raw verdict shape parsed from the model reply. Every field is optional;
/// coercion and clamping happen after parsing.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    intent: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    red_flags: Option<Vec<String>>,
    recommended_action: Option<String>,
}

pub struct SemanticClassifier {
    provider_pref: LlmProvider,
    endpoint_override: Option<String>,
    configured_model: String,
    api_key: Option<String>,
    require_llm: bool,
    timeout: Duration,
    transport: Arc<dyn ChatTransport>,
    detected: OnceCell<Option<ProviderInfo>>,
}

impl SemanticClassifier {
    pub fn new(config: &EngineConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            provider_pref: config.llm_provider,
            endpoint_override: config.llm_endpoint.clone(),
            configured_model: config.llm_model.clone(),
            api_key: config.api_key.clone(),
            require_llm: config.require_llm,
            timeout: Duration::from_secs(config.llm_timeout_secs),
            transport,
            detected: OnceCell::new(),
        }
    }

    /// Classify a message. `enabled == false` short-circuits to the
    /// deterministic heuristic-flag fallback.
    ///
    /// The only error this returns is [`EngineError::NoLlmProvider`], and
    /// only when a provider is required but none can be detected.
    pub async fn classify(
        &self,
        message: &str,
        flags: &[String],
        enabled: bool,
    ) -> Result<SemanticResult> {
        if !enabled {
            let mut result = fallback_from_flags(flags);
            result.error = Some("semantic classifier disabled".into());
            return Ok(result);
        }

        let detection = self
            .detected
            .get_or_init(|| async { self.detect().await })
            .await;

        let provider = match detection {
            Some(provider) => provider,
            None if self.require_llm => return Err(EngineError::NoLlmProvider),
            None => {
                let mut result = fallback_from_flags(flags);
                result.error = Some("no LLM provider detected".into());
                return Ok(result);
            }
        };

        let started = Instant::now();
        let prompt = build_prompt(message, flags);
        let body = json!({
            "model": provider.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.1,
            "max_tokens": 200,
        });
        let api_key = match provider.kind {
            ProviderKind::OpenAi => self.api_key.as_deref(),
            _ => None,
        };

        match self
            .transport
            .complete(&provider.chat_url, api_key, body, self.timeout)
            .await
        {
            Ok(content) => {
                let mut result = parse_verdict(&content);
                result.provider = Some(provider.kind.as_str().to_string());
                result.model = Some(provider.model.clone());
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                Ok(result)
            }
            Err(e) => {
                warn!(provider = provider.kind.as_str(), error = %e, "semantic call failed, using fallback");
                let mut result = fallback_from_flags(flags);
                result.provider = Some(provider.kind.as_str().to_string());
                result.model = Some(provider.model.clone());
                result.error = Some(e.to_string());
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                Ok(result)
            }
        }
    }

    async fn detect(&self) -> Option<ProviderInfo> {
        match self.provider_pref {
            LlmProvider::Ollama => self.detect_ollama().await,
            LlmProvider::LmStudio => self.detect_lmstudio().await,
            LlmProvider::OpenAi => self.openai_info(),
            LlmProvider::Auto => {
                if let Some(provider) = self.detect_ollama().await {
                    return Some(provider);
                }
                if let Some(provider) = self.detect_lmstudio().await {
                    return Some(provider);
                }
                self.openai_info()
            }
        }
    }

    async fn detect_ollama(&self) -> Option<ProviderInfo> {
        let base = self.base_url(OLLAMA_BASE);
        let tags = self
            .transport
            .probe(&format!("{base}/api/tags"), PROBE_TIMEOUT)
            .await
            .ok()?;
        let model = if self.configured_model == DEFAULT_MODEL {
            pick_ollama_model(&tags).unwrap_or_else(|| self.configured_model.clone())
        } else {
            self.configured_model.clone()
        };
        debug!(model = %model, "detected ollama");
        Some(ProviderInfo {
            kind: ProviderKind::Ollama,
            chat_url: format!("{base}/v1/chat/completions"),
            model,
        })
    }

    async fn detect_lmstudio(&self) -> Option<ProviderInfo> {
        let base = self.base_url(LMSTUDIO_BASE);
        self.transport
            .probe(&format!("{base}/v1/models"), PROBE_TIMEOUT)
            .await
            .ok()?;
        debug!("detected lm studio");
        Some(ProviderInfo {
            kind: ProviderKind::LmStudio,
            chat_url: format!("{base}/v1/chat/completions"),
            model: self.configured_model.clone(),
        })
    }

    fn openai_info(&self) -> Option<ProviderInfo> {
        self.api_key.as_ref()?;
        let base = self.base_url(OPENAI_BASE);
        Some(ProviderInfo {
            kind: ProviderKind::OpenAi,
            chat_url: format!("{base}/chat/completions"),
            model: self.configured_model.clone(),
        })
    }

    fn base_url(&self, default: &str) -> String {
        self.endpoint_override
            .clone()
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Pick a local model from an Ollama `/api/tags` reply, preferring smaller
/// instruction-tuned families known to follow the JSON contract.
fn pick_ollama_model(tags_json: &str) -> Option<String> {
    let tags: Value = serde_json::from_str(tags_json).ok()?;
    let names: Vec<String> = tags["models"]
        .as_array()?
        .iter()
        .filter_map(|m| m["name"].as_str().map(str::to_string))
        .collect();
    for preference in ["qwen2.5", "qwen", "mistral", "llama3", "llama"] {
        if let Some(name) = names.iter().find(|n| n.contains(preference)) {
            return Some(name.clone());
        }
    }
    names.first().cloned()
}

fn build_prompt(message: &str, flags: &[String]) -> String {
    let truncated: String = message.chars().take(PROMPT_CHAR_LIMIT).collect();
    let taxonomy: Vec<&str> = Intent::TAXONOMY.iter().map(|i| i.as_str()).collect();
    let flags_line = if flags.is_empty() {
        "none".to_string()
    } else {
        flags.join(", ")
    };
    format!(
        "You are a security classifier guarding an AI agent. Classify the \
         intent of the message below.\n\
         Heuristic flags already raised: {flags_line}\n\n\
         Message:\n\"\"\"\n{truncated}\n\"\"\"\n\n\
         Reply with a single JSON object and nothing else:\n\
         {{\"intent\": \"<one of: {}>\", \"confidence\": <0..1>, \
         \"reasoning\": \"<short>\", \"red_flags\": [\"...\"], \
         \"recommended_action\": \"allow|warn|block\"}}",
        taxonomy.join("|")
    )
}

/// Extract the first balanced `{...}` substring of a reply.
fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in reply[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&reply[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse and coerce a model reply into a [`SemanticResult`].
fn parse_verdict(content: &str) -> SemanticResult {
    let parse_failure = |detail: &str| SemanticResult {
        intent: Intent::Benign,
        confidence: 0.3,
        reasoning: String::new(),
        red_flags: Vec::new(),
        recommended_action: Action::Allow,
        provider: None,
        model: None,
        elapsed_ms: 0,
        error: None,
        parse_error: Some(detail.to_string()),
    };

    let Some(object) = extract_json_object(content) else {
        return parse_failure("reply contained no JSON object");
    };
    let raw: RawVerdict = match serde_json::from_str(object) {
        Ok(raw) => raw,
        Err(e) => return parse_failure(&format!("invalid verdict structure: {e}")),
    };

    let (intent, confidence) = match raw.intent.as_deref().and_then(Intent::from_label) {
        Some(intent) => (intent, raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0)),
        // anything outside the taxonomy coerces to benign at half confidence
        None => (Intent::Benign, 0.5),
    };

    SemanticResult {
        intent,
        confidence,
        reasoning: raw.reasoning.unwrap_or_default(),
        red_flags: raw.red_flags.unwrap_or_default(),
        recommended_action: raw
            .recommended_action
            .as_deref()
            .map(Action::parse)
            .unwrap_or(Action::Allow),
        provider: None,
        model: None,
        elapsed_ms: 0,
        error: None,
        parse_error: None,
    }
}

/// Deterministic intent derivation from heuristic flags; first match wins.
pub fn fallback_from_flags(flags: &[String]) -> SemanticResult {
    const TABLE: &[(&str, Intent, f64, Action)] = &[
        ("command_injection", Intent::CommandInjection, 0.8, Action::Block),
        ("credential_theft", Intent::CredentialTheft, 0.8, Action::Block),
        ("instruction_override", Intent::InstructionOverride, 0.8, Action::Block),
        ("data_exfiltration", Intent::DataExfiltration, 0.8, Action::Block),
        ("impersonation", Intent::Impersonation, 0.7, Action::Warn),
        ("discovery", Intent::Discovery, 0.6, Action::Warn),
    ];

    let hit = TABLE
        .iter()
        .find(|(flag, _, _, _)| flags.iter().any(|f| f == flag));

    let (intent, confidence, recommended_action, reasoning) = match hit {
        Some((flag, intent, confidence, action)) => (
            *intent,
            *confidence,
            *action,
            format!("derived from heuristic flag '{flag}'"),
        ),
        None => (
            Intent::Benign,
            0.5,
            Action::Allow,
            "no high-signal heuristic flags".to_string(),
        ),
    };

    SemanticResult {
        intent,
        confidence,
        reasoning,
        red_flags: Vec::new(),
        recommended_action,
        provider: None,
        model: None,
        elapsed_ms: 0,
        error: None,
        parse_error: None,
    }
}
