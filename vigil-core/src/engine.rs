//! The engine: orchestrates the four-layer scan pipeline.
//!
//! A single scan runs heuristic -> (semantic, gated on heuristic risk) ->
//! context -> decision, assembles the composite result, and emits a
//! security event for any non-allow outcome. One engine instance is shared
//! across tasks; all interior state is lock-guarded and `scan` takes
//! `&self`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use tracing::debug;

use crate::alerts;
use crate::catalog::Catalog;
use crate::config::{ConfigUpdate, EngineConfig};
use crate::context::ContextEvaluator;
use crate::decision::DecisionResolver;
use crate::error::Result;
use crate::events::SecurityEvent;
use crate::heuristic::HeuristicScanner;
use crate::semantic::{ChatTransport, HttpTransport, SemanticClassifier};
use crate::types::{
    Action, EngineStats, Intent, QuickCheck, ScanContext, ScanLayers, ScanReport, ScanResult,
};

pub struct Engine {
    catalog: Arc<Catalog>,
    heuristic: HeuristicScanner,
    semantic: SemanticClassifier,
    context: ContextEvaluator,
    resolver: DecisionResolver,
    semantic_enabled: AtomicBool,
    semantic_threshold: RwLock<f64>,
}

impl Engine {
    /// Build an engine with the production HTTP transport.
    ///
    /// Fails only on catalog problems: a missing or malformed pattern
    /// directory, or a pattern that does not compile.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Build an engine with a caller-supplied model transport.
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn ChatTransport>) -> Result<Self> {
        let catalog = Arc::new(match &config.patterns_dir {
            Some(dir) => Catalog::load_dir(dir)?,
            None => Catalog::builtin()?,
        });

        let heuristic = HeuristicScanner::new(
            catalog.clone(),
            config.decode_payloads,
            config.normalize_unicode,
        );
        let semantic = SemanticClassifier::new(&config, transport);
        let context = ContextEvaluator::new(
            config.history_enabled,
            config.max_history_size,
            config.rate_limit,
        );
        let resolver = DecisionResolver::new(
            config.thresholds,
            config.strict_mode,
            config.allow_list.clone(),
            config.block_list.clone(),
        );

        Ok(Self {
            catalog,
            heuristic,
            semantic,
            context,
            resolver,
            semantic_enabled: AtomicBool::new(config.semantic_enabled),
            semantic_threshold: RwLock::new(config.semantic_threshold),
        })
    }

    /// Scan one message through the full pipeline.
    pub async fn scan(&self, message: &str, ctx: &ScanContext) -> Result<ScanResult> {
        let started = Instant::now();

        let heuristic = self.heuristic.scan(message);
        debug!(
            risk = heuristic.risk_score,
            flags = ?heuristic.flags,
            "heuristic layer complete"
        );

        let semantic = if heuristic.risk_score >= self.semantic_threshold() {
            let enabled = self.semantic_enabled.load(Ordering::Relaxed);
            Some(
                self.semantic
                    .classify(message, &heuristic.flags, enabled)
                    .await?,
            )
        } else {
            None
        };

        let context = self.context.evaluate(&heuristic, semantic.as_ref(), ctx);
        let decision = self
            .resolver
            .resolve(&heuristic, semantic.as_ref(), Some(&context), ctx);

        if decision.action != Action::Allow {
            SecurityEvent::from_decision(message, ctx.source, &decision).emit();
        }

        let alert_text = alerts::alert_message(decision.intent, decision.action);
        Ok(ScanResult {
            action: decision.action,
            risk_score: decision.risk_score,
            intent: decision.intent,
            message: alert_text.to_string(),
            layers: ScanLayers {
                heuristic,
                semantic,
                context,
                decision,
            },
            elapsed_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        })
    }

    /// Scan and render operator-facing alert strings alongside the result.
    pub async fn scan_with_alert(&self, message: &str, ctx: &ScanContext) -> Result<ScanReport> {
        let result = self.scan(message, ctx).await?;
        let decision = &result.layers.decision;
        let alert = format!(
            "[vigil:{}] intent={} risk={:.2} source={} flags=[{}]\nreason: {}\n{}",
            result.action,
            result.intent,
            result.risk_score,
            ctx.source,
            decision.flags.join(", "),
            decision.reason,
            result.message,
        );
        let notification = format!("{}: {}", result.action, result.message);
        Ok(ScanReport {
            result,
            alert,
            notification,
        })
    }

    /// Fast path: high-risk patterns only, no decoding, no state updates.
    pub fn quick_check(&self, message: &str) -> QuickCheck {
        self.heuristic.quick_check(message)
    }

    /// Put a sender on the allow list (removing any block-list entry) and
    /// mark its history trusted.
    pub fn trust_sender(&self, sender_id: &str) {
        self.resolver.allow(sender_id);
        self.context.mark_trusted(sender_id, true);
    }

    /// Put a sender on the block list (removing any allow-list entry).
    pub fn block_sender(&self, sender_id: &str) {
        self.resolver.block(sender_id);
        self.context.mark_trusted(sender_id, false);
    }

    /// Forget a sender's rate/violation history.
    pub fn reset_sender(&self, sender_id: &str) {
        self.context.reset_sender(sender_id);
    }

    /// Apply a sparse runtime configuration update.
    pub fn configure(&self, update: ConfigUpdate) {
        if let Some(thresholds) = update.thresholds {
            self.resolver.set_thresholds(thresholds);
        }
        if let Some(strict) = update.strict_mode {
            self.resolver.set_strict_mode(strict);
        }
        if let Some(enabled) = update.semantic_enabled {
            self.semantic_enabled.store(enabled, Ordering::Relaxed);
        }
        if let Some(threshold) = update.semantic_threshold {
            *self
                .semantic_threshold
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = threshold.clamp(0.0, 1.0);
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            pattern_count: self.catalog.pattern_count(),
            categories: self.catalog.category_names(),
            intents: Intent::TAXONOMY
                .iter()
                .map(|i| i.as_str().to_string())
                .collect(),
            thresholds: self.resolver.thresholds(),
        }
    }

    fn semantic_threshold(&self) -> f64 {
        *self
            .semantic_threshold
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
