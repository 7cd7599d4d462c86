//! Context layer: state-aware risk adjustment.
//!
//! Adjusts the combined heuristic/semantic risk using source-trust
//! multipliers, per-sender violation history, a sliding-window rate limit,
//! and cross-sender pattern repetition. All state is process-local, bounded,
//! and mutated only on the scan path (plus the explicit admin operations).
//! Locks are held only around the mutation steps, never across I/O.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::warn;

use crate::config::RateLimit;
use crate::types::{clamp_risk, ContextResult, HeuristicResult, ScanContext, SemanticResult};

/// Senders without an explicit id share one history bucket.
pub const ANONYMOUS_SENDER: &str = "anonymous";

/// How many recent messages the repetition check looks back over.
const REPETITION_WINDOW: usize = 20;
/// Distinct other senders required to call a pattern repeated.
const REPETITION_SENDERS: usize = 3;

/// Per-sender history: a trimmed timestamp ring, a violation counter, and
/// an optional explicit trust flag set by the admin operations.
#[derive(Debug, Default)]
pub(crate) struct SenderHistory {
    timestamps: VecDeque<i64>,
    violations: u32,
    pub(crate) trusted: Option<bool>,
}

#[derive(Debug)]
struct RecentEntry {
    #[allow(dead_code)]
    timestamp: i64,
    sender_id: String,
    #[allow(dead_code)]
    risk: f64,
    patterns: Vec<String>,
}

pub struct ContextEvaluator {
    history_enabled: bool,
    max_history_size: usize,
    rate_limit: RateLimit,
    senders: Mutex<HashMap<String, SenderHistory>>,
    recent: Mutex<VecDeque<RecentEntry>>,
}

impl ContextEvaluator {
    pub fn new(history_enabled: bool, max_history_size: usize, rate_limit: RateLimit) -> Self {
        Self {
            history_enabled,
            max_history_size,
            rate_limit,
            senders: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Evaluate context for one scan and record it into sender history.
    pub fn evaluate(
        &self,
        heuristic: &HeuristicResult,
        semantic: Option<&SemanticResult>,
        ctx: &ScanContext,
    ) -> ContextResult {
        let started = Instant::now();
        let now = Utc::now().timestamp_millis();
        let sender = ctx
            .sender_id
            .clone()
            .unwrap_or_else(|| ANONYMOUS_SENDER.to_string());

        let semantic_risk = semantic
            .map(|s| s.intent.risk() * s.confidence)
            .unwrap_or(0.0);
        let base_risk = clamp_risk(heuristic.risk_score.max(semantic_risk));
        let source_multiplier = ctx.source.risk_multiplier();
        let mut adjusted = base_risk * source_multiplier;

        let mut sender_risk = 0.0;
        let mut rate_limit_violation = false;
        let mut pattern_repetition = false;

        if self.history_enabled {
            {
                let mut senders = lock_or_degrade(&self.senders, "sender history");
                let history = senders.entry(sender.clone()).or_default();

                // A clean current message never raises risk from history alone.
                if !heuristic.flags.is_empty() && history.violations > 2 {
                    sender_risk = (0.2 + 0.05 * f64::from(history.violations)).min(0.7);
                    adjusted = adjusted.max(sender_risk);
                }

                let window_start = now - self.rate_limit.window_ms as i64;
                let in_window = history
                    .timestamps
                    .iter()
                    .filter(|t| **t > window_start)
                    .count();
                if in_window >= self.rate_limit.max {
                    rate_limit_violation = true;
                    adjusted = (adjusted + 0.2).min(1.0);
                }
            }

            if !heuristic.matches.is_empty() {
                let recent = lock_or_degrade(&self.recent, "recent messages");
                if is_repeated_pattern(&recent, &sender, heuristic) {
                    pattern_repetition = true;
                    adjusted = (adjusted + 0.1).min(1.0);
                }
            }
        }

        let adjusted_risk = clamp_risk(adjusted);

        if self.history_enabled {
            self.record(&sender, now, base_risk, adjusted_risk, heuristic);
        }

        ContextResult {
            base_risk,
            adjusted_risk,
            source_trust: ctx.source.trust(),
            source_multiplier,
            sender_risk,
            rate_limit_violation,
            pattern_repetition,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn record(
        &self,
        sender: &str,
        now: i64,
        base_risk: f64,
        adjusted_risk: f64,
        heuristic: &HeuristicResult,
    ) {
        {
            let mut senders = lock_or_degrade(&self.senders, "sender history");
            let history = senders.entry(sender.to_string()).or_default();
            history.timestamps.push_back(now);
            let retain_after = now - (self.rate_limit.window_ms as i64).saturating_mul(10);
            while history
                .timestamps
                .front()
                .is_some_and(|t| *t < retain_after)
            {
                history.timestamps.pop_front();
            }
            if base_risk > 0.7 {
                history.violations += 1;
            }
        }

        let mut patterns: Vec<String> = heuristic
            .matches
            .iter()
            .map(|m| m.description.clone())
            .collect();
        patterns.sort();
        patterns.dedup();

        let mut recent = lock_or_degrade(&self.recent, "recent messages");
        recent.push_back(RecentEntry {
            timestamp: now,
            sender_id: sender.to_string(),
            risk: adjusted_risk,
            patterns,
        });
        while recent.len() > self.max_history_size {
            recent.pop_front();
        }
    }

    /// Clear one sender's ring and violation counter.
    pub fn reset_sender(&self, sender_id: &str) {
        let mut senders = lock_or_degrade(&self.senders, "sender history");
        senders.remove(sender_id);
    }

    /// Record an explicit trust decision on the sender's history entry.
    pub fn mark_trusted(&self, sender_id: &str, trusted: bool) {
        let mut senders = lock_or_degrade(&self.senders, "sender history");
        senders.entry(sender_id.to_string()).or_default().trusted = Some(trusted);
    }

    #[cfg(test)]
    fn violations(&self, sender_id: &str) -> u32 {
        let senders = lock_or_degrade(&self.senders, "sender history");
        senders.get(sender_id).map(|h| h.violations).unwrap_or(0)
    }
}

/// Whether any of the current matches' pattern descriptions were seen in
/// the recent window from enough distinct other senders.
fn is_repeated_pattern(
    recent: &MutexGuard<'_, VecDeque<RecentEntry>>,
    sender: &str,
    heuristic: &HeuristicResult,
) -> bool {
    let mut other_senders: Vec<&str> = Vec::new();
    for entry in recent.iter().rev().take(REPETITION_WINDOW) {
        if entry.sender_id == sender {
            continue;
        }
        let overlaps = heuristic
            .matches
            .iter()
            .any(|m| entry.patterns.iter().any(|p| p == &m.description));
        if overlaps && !other_senders.contains(&entry.sender_id.as_str()) {
            other_senders.push(&entry.sender_id);
            if other_senders.len() >= REPETITION_SENDERS {
                return true;
            }
        }
    }
    false
}

/// Recover a poisoned lock instead of failing the scan: the shared state is
/// self-healing (rings trim on every touch), so degraded reads are safe.
fn lock_or_degrade<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(structure = what, "context state lock poisoned, degrading");
            poisoned.into_inner()
        }
    }
}
