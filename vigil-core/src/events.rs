//! Security event logging.
//!
//! Non-allow decisions are emitted as structured records through the
//! `tracing` facade on the `vigil::security` target. The raw message is
//! never logged; events carry a stable SHA-256 hash of it instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::types::{Action, DecisionResult, Intent, Source};

/// Hex digits of the SHA-256 digest carried in events.
const HASH_PREFIX_LEN: usize = 16;

/// Privacy-preserving message fingerprint.
pub fn message_hash(message: &str) -> String {
    let digest = Sha256::digest(message.as_bytes());
    let mut hex = String::with_capacity(HASH_PREFIX_LEN);
    for byte in digest.iter().take(HASH_PREFIX_LEN / 2) {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// A structured security event for a non-allow decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub intent: Intent,
    pub risk_score: f64,
    pub action: Action,
    pub source: Source,
    pub flags: Vec<String>,
    pub message_hash: String,
    pub details: String,
}

impl SecurityEvent {
    pub fn from_decision(message: &str, source: Source, decision: &DecisionResult) -> Self {
        let level = match decision.action {
            Action::Block | Action::Quarantine => "warn",
            _ => "info",
        };
        Self {
            timestamp: Utc::now(),
            level: level.to_string(),
            event_type: "security_decision".to_string(),
            intent: decision.intent,
            risk_score: decision.risk_score,
            action: decision.action,
            source,
            flags: decision.flags.clone(),
            message_hash: message_hash(message),
            details: decision.reason.clone(),
        }
    }

    /// Emit the event through the tracing facade.
    pub fn emit(&self) {
        match self.action {
            Action::Block | Action::Quarantine => warn!(
                target: "vigil::security",
                action = self.action.as_str(),
                intent = self.intent.as_str(),
                risk = self.risk_score,
                source = self.source.as_str(),
                flags = ?self.flags,
                message_hash = %self.message_hash,
                details = %self.details,
                "security decision"
            ),
            _ => info!(
                target: "vigil::security",
                action = self.action.as_str(),
                intent = self.intent.as_str(),
                risk = self.risk_score,
                source = self.source.as_str(),
                flags = ?self.flags,
                message_hash = %self.message_hash,
                details = %self.details,
                "security decision"
            ),
        }
    }
}
