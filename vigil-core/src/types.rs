//! Core data model for the vigil engine.
//!
//! Everything the scan pipeline produces or consumes is defined here: the
//! scan context, the intent taxonomy, per-layer result records, and the
//! composite scan result. All risk scores are in `[0.0, 1.0]`; combining
//! operations clamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Clamp a risk score into `[0.0, 1.0]`.
pub(crate) fn clamp_risk(risk: f64) -> f64 {
    risk.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Where a message came from. Each source carries a documented trust weight
/// and a risk multiplier used by the context layer. Unknown source strings
/// fall back to [`Source::Public`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Source {
    Internal,
    Authenticated,
    Known,
    #[default]
    Public,
    Untrusted,
    Webhook,
    Email,
    Api,
    Web,
}

impl Source {
    /// Parse a source label, folding unknown values to `public`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "internal" => Source::Internal,
            "authenticated" => Source::Authenticated,
            "known" => Source::Known,
            "public" => Source::Public,
            "untrusted" => Source::Untrusted,
            "webhook" => Source::Webhook,
            "email" => Source::Email,
            "api" => Source::Api,
            "web" => Source::Web,
            _ => Source::Public,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Internal => "internal",
            Source::Authenticated => "authenticated",
            Source::Known => "known",
            Source::Public => "public",
            Source::Untrusted => "untrusted",
            Source::Webhook => "webhook",
            Source::Email => "email",
            Source::Api => "api",
            Source::Web => "web",
        }
    }

    /// Trust weight, reported in the context trace.
    pub fn trust(&self) -> f64 {
        match self {
            Source::Internal => 1.0,
            Source::Authenticated => 0.8,
            Source::Known => 0.6,
            Source::Public => 0.3,
            Source::Untrusted => 0.1,
            Source::Webhook => 0.2,
            Source::Email => 0.3,
            Source::Api => 0.4,
            Source::Web => 0.2,
        }
    }

    /// Risk multiplier applied to the base risk by the context layer.
    pub fn risk_multiplier(&self) -> f64 {
        match self {
            Source::Internal => 0.5,
            Source::Authenticated => 0.8,
            Source::Known => 1.0,
            Source::Public => 1.2,
            Source::Untrusted => 1.0,
            Source::Webhook => 1.2,
            Source::Email => 1.3,
            Source::Api => 1.1,
            Source::Web => 1.2,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Source {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(d)?;
        Ok(Source::parse(&label))
    }
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// Threat intent taxonomy produced by the semantic layer (or derived from
/// heuristic flags when no classification is available).
///
/// `Encoding` is engine-internal: it can be derived from the heuristic flag
/// set but is never produced by the classifier; unknown model output
/// coerces to `Benign`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Benign,
    Curious,
    PromptLeak,
    InstructionOverride,
    CommandInjection,
    CredentialTheft,
    DataExfiltration,
    Impersonation,
    Discovery,
    SocialEngineering,
    MultiStage,
    Encoding,
}

impl Intent {
    /// The classifier's valid output taxonomy, in declaration order.
    pub const TAXONOMY: &'static [Intent] = &[
        Intent::Benign,
        Intent::Curious,
        Intent::PromptLeak,
        Intent::InstructionOverride,
        Intent::CommandInjection,
        Intent::CredentialTheft,
        Intent::DataExfiltration,
        Intent::Impersonation,
        Intent::Discovery,
        Intent::SocialEngineering,
        Intent::MultiStage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Benign => "benign",
            Intent::Curious => "curious",
            Intent::PromptLeak => "prompt_leak",
            Intent::InstructionOverride => "instruction_override",
            Intent::CommandInjection => "command_injection",
            Intent::CredentialTheft => "credential_theft",
            Intent::DataExfiltration => "data_exfiltration",
            Intent::Impersonation => "impersonation",
            Intent::Discovery => "discovery",
            Intent::SocialEngineering => "social_engineering",
            Intent::MultiStage => "multi_stage",
            Intent::Encoding => "encoding",
        }
    }

    /// Look up a classifier label. Returns `None` for anything outside the
    /// taxonomy (including `encoding`), which callers coerce to benign.
    pub fn from_label(label: &str) -> Option<Intent> {
        let label = label.trim().to_ascii_lowercase();
        Intent::TAXONOMY
            .iter()
            .copied()
            .find(|intent| intent.as_str() == label)
    }

    /// Intrinsic risk of an intent, combined with classifier confidence by
    /// the context layer.
    pub fn risk(&self) -> f64 {
        match self {
            Intent::Benign => 0.0,
            Intent::Curious => 0.2,
            Intent::Discovery => 0.4,
            Intent::PromptLeak => 0.5,
            Intent::SocialEngineering => 0.6,
            Intent::Impersonation => 0.7,
            Intent::InstructionOverride => 0.85,
            Intent::CredentialTheft => 0.9,
            Intent::DataExfiltration => 0.9,
            Intent::CommandInjection => 0.95,
            Intent::MultiStage => 0.9,
            Intent::Encoding => 0.3,
        }
    }

    /// Whether this intent short-circuits the decision layer to a block
    /// when classified with high confidence.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Intent::CommandInjection | Intent::CredentialTheft | Intent::DataExfiltration
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Final decision for a message, in increasing severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Allow,
    Warn,
    Block,
    Quarantine,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Warn => "warn",
            Action::Block => "block",
            Action::Quarantine => "quarantine",
        }
    }

    /// Parse an action label (used for `recommended_action` in model
    /// replies and for pattern-file metadata). Unknown labels fall back to
    /// `warn`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "allow" => Action::Allow,
            "warn" => Action::Warn,
            "block" => Action::Block,
            "quarantine" => Action::Quarantine,
            _ => Action::Warn,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scan context
// ---------------------------------------------------------------------------

/// Caller-supplied metadata accompanying a scanned message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanContext {
    /// Where the message came from. Defaults to `public`.
    #[serde(default)]
    pub source: Source,
    /// Stable identifier for the sender, if known.
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Free-form caller metadata; the engine carries it but never inspects it.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ScanContext {
    pub fn from_source(source: Source) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn with_sender(source: Source, sender_id: impl Into<String>) -> Self {
        Self {
            source,
            sender_id: Some(sender_id.into()),
            metadata: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decode kinds + matches
// ---------------------------------------------------------------------------

/// Which canonicalized view a heuristic match was found in. `None` on a
/// [`PatternMatch`] means the original message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeKind {
    Base64,
    Url,
    Hex,
    Unicode,
    Invisible,
    UnicodeNormalized,
}

impl DecodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeKind::Base64 => "base64",
            DecodeKind::Url => "url",
            DecodeKind::Hex => "hex",
            DecodeKind::Unicode => "unicode",
            DecodeKind::Invisible => "invisible",
            DecodeKind::UnicodeNormalized => "unicode_normalized",
        }
    }
}

impl std::fmt::Display for DecodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum characters of matched text carried in a [`PatternMatch`].
pub const MATCH_PREVIEW_CHARS: usize = 100;

/// A single heuristic pattern hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Owning category name (the heuristic flag vocabulary).
    pub category: String,
    /// The category's risk scalar.
    pub risk: f64,
    /// Human description of the pattern that fired.
    pub description: String,
    /// Matched substring, truncated to [`MATCH_PREVIEW_CHARS`] characters.
    pub matched: String,
    /// The canonicalized view the hit came from, if not the original text.
    pub decoded_from: Option<DecodeKind>,
}

// ---------------------------------------------------------------------------
// Layer results
// ---------------------------------------------------------------------------

/// Output of the heuristic layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicResult {
    pub risk_score: f64,
    /// Distinct category names that matched (plus `multiple_indicators`
    /// when the aggregation bump fires).
    pub flags: Vec<String>,
    pub matches: Vec<PatternMatch>,
    /// True iff `risk_score` sits strictly inside the semantic window.
    pub requires_semantic: bool,
    pub elapsed_ms: u64,
}

/// Output of the semantic layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticResult {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
    pub red_flags: Vec<String>,
    pub recommended_action: Action,
    /// Which provider answered (`ollama`, `lmstudio`, `openai`), if any.
    pub provider: Option<String>,
    /// Which model answered, if any.
    pub model: Option<String>,
    pub elapsed_ms: u64,
    /// Set when the call failed or the classifier was disabled and the
    /// heuristic-flag fallback produced this result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when a reply was received but no valid verdict could be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

/// Output of the context layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResult {
    pub base_risk: f64,
    pub adjusted_risk: f64,
    pub source_trust: f64,
    pub source_multiplier: f64,
    pub sender_risk: f64,
    pub rate_limit_violation: bool,
    pub pattern_repetition: bool,
    pub elapsed_ms: u64,
}

/// Warn/block/quarantine threshold ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warn: f64,
    pub block: f64,
    pub quarantine: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn: 0.4,
            block: 0.8,
            quarantine: 0.9,
        }
    }
}

impl Thresholds {
    /// The fixed ladder used in strict mode.
    pub const STRICT: Thresholds = Thresholds {
        warn: 0.3,
        block: 0.6,
        quarantine: 0.8,
    };
}

/// Output of the decision layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    pub action: Action,
    pub risk_score: f64,
    pub intent: Intent,
    pub reason: String,
    /// The threshold ladder in effect when the decision was made.
    pub thresholds: Thresholds,
    pub strict_mode: bool,
    pub confidence: f64,
    pub flags: Vec<String>,
    pub matches: Vec<PatternMatch>,
    pub red_flags: Vec<String>,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Composite result
// ---------------------------------------------------------------------------

/// Per-layer traces of a single scan. `semantic` is `None` when the
/// heuristic risk stayed below the semantic threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanLayers {
    pub heuristic: HeuristicResult,
    pub semantic: Option<SemanticResult>,
    pub context: ContextResult,
    pub decision: DecisionResult,
}

/// The composite result of `scan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub action: Action,
    pub risk_score: f64,
    pub intent: Intent,
    /// Human-readable alert text selected from the template table.
    pub message: String,
    pub layers: ScanLayers,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// `scan_with_alert` wraps the result with pre-rendered alert strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    #[serde(flatten)]
    pub result: ScanResult,
    /// Verbose multi-line alert suitable for an operator channel.
    pub alert: String,
    /// One-line notification suitable for a status line.
    pub notification: String,
}

/// Result of the `quick_check` fast path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickCheck {
    pub dangerous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl QuickCheck {
    pub fn safe() -> Self {
        Self {
            dangerous: false,
            category: None,
            pattern: None,
        }
    }
}

/// Snapshot returned by `Engine::stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub pattern_count: usize,
    pub categories: Vec<String>,
    pub intents: Vec<String>,
    pub thresholds: Thresholds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_source_folds_to_public() {
        assert_eq!(Source::parse("carrier-pigeon"), Source::Public);
        assert_eq!(Source::parse("EMAIL"), Source::Email);
        assert_eq!(Source::parse(" webhook "), Source::Webhook);
    }

    #[test]
    fn test_source_tables() {
        assert_eq!(Source::Internal.trust(), 1.0);
        assert_eq!(Source::Internal.risk_multiplier(), 0.5);
        assert_eq!(Source::Email.risk_multiplier(), 1.3);
        assert_eq!(Source::Untrusted.trust(), 0.1);
    }

    #[test]
    fn test_source_deserialize_fallback() {
        let ctx: ScanContext =
            serde_json::from_str(r#"{"source": "smoke-signal", "sender_id": "s1"}"#).unwrap();
        assert_eq!(ctx.source, Source::Public);
        assert_eq!(ctx.sender_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_intent_labels_round_trip() {
        for intent in Intent::TAXONOMY {
            assert_eq!(Intent::from_label(intent.as_str()), Some(*intent));
        }
        // encoding is engine-internal and not a valid classifier label
        assert_eq!(Intent::from_label("encoding"), None);
        assert_eq!(Intent::from_label("world_domination"), None);
    }

    #[test]
    fn test_critical_intents() {
        assert!(Intent::CommandInjection.is_critical());
        assert!(Intent::CredentialTheft.is_critical());
        assert!(Intent::DataExfiltration.is_critical());
        assert!(!Intent::InstructionOverride.is_critical());
        assert!(!Intent::Benign.is_critical());
    }

    #[test]
    fn test_action_parse_fallback() {
        assert_eq!(Action::parse("block"), Action::Block);
        assert_eq!(Action::parse("QUARANTINE"), Action::Quarantine);
        assert_eq!(Action::parse("nuke-from-orbit"), Action::Warn);
    }

    #[test]
    fn test_action_ordering() {
        assert!(Action::Allow < Action::Warn);
        assert!(Action::Warn < Action::Block);
        assert!(Action::Block < Action::Quarantine);
    }

    #[test]
    fn test_thresholds_defaults() {
        let t = Thresholds::default();
        assert_eq!(t.warn, 0.4);
        assert_eq!(t.block, 0.8);
        assert_eq!(t.quarantine, 0.9);
        assert_eq!(Thresholds::STRICT.block, 0.6);
    }

    #[test]
    fn test_clamp_risk() {
        assert_eq!(clamp_risk(1.7), 1.0);
        assert_eq!(clamp_risk(-0.2), 0.0);
        assert_eq!(clamp_risk(0.42), 0.42);
    }

    #[test]
    fn test_decode_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&DecodeKind::UnicodeNormalized).unwrap(),
            "\"unicode_normalized\""
        );
        assert_eq!(DecodeKind::Base64.as_str(), "base64");
    }
}
