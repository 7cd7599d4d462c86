//! Decision layer: final action selection.
//!
//! Consults the allow/block lists, derives the final intent, applies the
//! critical-intent short-circuit, and walks the threshold ladder (strict or
//! configured) over the context-adjusted risk.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use crate::types::{
    Action, ContextResult, DecisionResult, HeuristicResult, Intent, ScanContext, SemanticResult,
    Thresholds,
};

/// Flag-to-intent derivation order when no semantic classification is
/// available (or it came back benign).
const FLAG_PRIORITY: &[(&str, Intent)] = &[
    ("command_injection", Intent::CommandInjection),
    ("credential_theft", Intent::CredentialTheft),
    ("data_exfiltration", Intent::DataExfiltration),
    ("instruction_override", Intent::InstructionOverride),
    ("impersonation", Intent::Impersonation),
    ("discovery", Intent::Discovery),
    ("encoding", Intent::Encoding),
];

/// Confidence floor for the critical-intent short-circuit.
const CRITICAL_CONFIDENCE: f64 = 0.7;

pub struct DecisionResolver {
    thresholds: RwLock<Thresholds>,
    strict_mode: AtomicBool,
    allow_list: RwLock<HashSet<String>>,
    block_list: RwLock<HashSet<String>>,
}

impl DecisionResolver {
    pub fn new(
        thresholds: Thresholds,
        strict_mode: bool,
        allow_list: impl IntoIterator<Item = String>,
        block_list: impl IntoIterator<Item = String>,
    ) -> Self {
        let allow: HashSet<String> = allow_list.into_iter().collect();
        let block: HashSet<String> = block_list
            .into_iter()
            .filter(|s| !allow.contains(s))
            .collect();
        Self {
            thresholds: RwLock::new(thresholds),
            strict_mode: AtomicBool::new(strict_mode),
            allow_list: RwLock::new(allow),
            block_list: RwLock::new(block),
        }
    }

    /// Resolve the final action for one scan.
    pub fn resolve(
        &self,
        heuristic: &HeuristicResult,
        semantic: Option<&SemanticResult>,
        context: Option<&ContextResult>,
        ctx: &ScanContext,
    ) -> DecisionResult {
        let started = Instant::now();
        let strict_mode = self.strict_mode.load(Ordering::Relaxed);
        let thresholds = if strict_mode {
            Thresholds::STRICT
        } else {
            *read_lock(&self.thresholds)
        };

        let intent = match semantic {
            Some(s) if s.intent != Intent::Benign => s.intent,
            _ => derive_intent(&heuristic.flags),
        };
        let confidence = semantic.map(|s| s.confidence).unwrap_or(0.5);
        let risk_score = context
            .map(|c| c.adjusted_risk)
            .unwrap_or(heuristic.risk_score);

        let listed = ctx.sender_id.as_deref().map(|sender| {
            (
                read_lock(&self.allow_list).contains(sender),
                read_lock(&self.block_list).contains(sender),
            )
        });

        let (action, reason) = match listed {
            Some((true, _)) => (Action::Allow, "sender in allow list".to_string()),
            Some((_, true)) => (Action::Block, "sender in block list".to_string()),
            _ if intent.is_critical() && confidence > CRITICAL_CONFIDENCE => (
                Action::Block,
                format!("critical intent {intent} at confidence {confidence:.2}"),
            ),
            _ => ladder(risk_score, &thresholds),
        };

        DecisionResult {
            action,
            risk_score,
            intent,
            reason,
            thresholds,
            strict_mode,
            confidence,
            flags: heuristic.flags.clone(),
            matches: heuristic.matches.clone(),
            red_flags: semantic.map(|s| s.red_flags.clone()).unwrap_or_default(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Put a sender on the allow list, removing it from the block list.
    pub fn allow(&self, sender_id: &str) {
        write_lock(&self.block_list).remove(sender_id);
        write_lock(&self.allow_list).insert(sender_id.to_string());
    }

    /// Put a sender on the block list, removing it from the allow list.
    pub fn block(&self, sender_id: &str) {
        write_lock(&self.allow_list).remove(sender_id);
        write_lock(&self.block_list).insert(sender_id.to_string());
    }

    pub fn set_thresholds(&self, thresholds: Thresholds) {
        *write_lock(&self.thresholds) = thresholds;
    }

    pub fn set_strict_mode(&self, strict: bool) {
        self.strict_mode.store(strict, Ordering::Relaxed);
    }

    pub fn thresholds(&self) -> Thresholds {
        if self.strict_mode.load(Ordering::Relaxed) {
            Thresholds::STRICT
        } else {
            *read_lock(&self.thresholds)
        }
    }

    pub fn is_allowed(&self, sender_id: &str) -> bool {
        read_lock(&self.allow_list).contains(sender_id)
    }

    pub fn is_blocked(&self, sender_id: &str) -> bool {
        read_lock(&self.block_list).contains(sender_id)
    }
}

fn ladder(risk: f64, thresholds: &Thresholds) -> (Action, String) {
    if risk >= thresholds.quarantine {
        (
            Action::Quarantine,
            format!("risk {risk:.2} >= quarantine threshold {:.2}", thresholds.quarantine),
        )
    } else if risk >= thresholds.block {
        (
            Action::Block,
            format!("risk {risk:.2} >= block threshold {:.2}", thresholds.block),
        )
    } else if risk >= thresholds.warn {
        (
            Action::Warn,
            format!("risk {risk:.2} >= warn threshold {:.2}", thresholds.warn),
        )
    } else {
        (
            Action::Allow,
            format!("risk {risk:.2} below warn threshold {:.2}", thresholds.warn),
        )
    }
}

fn derive_intent(flags: &[String]) -> Intent {
    FLAG_PRIORITY
        .iter()
        .find(|(flag, _)| flags.iter().any(|f| f == flag))
        .map(|(_, intent)| *intent)
        .unwrap_or(Intent::Benign)
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
