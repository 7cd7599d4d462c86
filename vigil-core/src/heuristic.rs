//! Heuristic layer: regex scanning over original and canonicalized views.
//!
//! The scanner runs every compiled pattern against the original message,
//! the unicode-normalized view (when it differs), and each decoded view
//! from the decoder suite. Matches found in a canonicalized view are tagged
//! with the view's decode kind. Duplicate matches across views are kept;
//! the aggregation rule counts each hit independently, which is what lets
//! encoded attacks lift risk above a single category's ceiling.

use std::sync::Arc;
use std::time::Instant;

use crate::catalog::Catalog;
use crate::decode;
use crate::normalize::normalize;
use crate::types::{
    clamp_risk, DecodeKind, HeuristicResult, PatternMatch, QuickCheck, MATCH_PREVIEW_CHARS,
};

/// Synthetic flag added when many low-risk indicators stack up.
pub const MULTIPLE_INDICATORS: &str = "multiple_indicators";

/// Risk floor above which a category participates in `quick_check`.
const QUICK_CHECK_RISK: f64 = 0.7;

/// Semantic gating window: risk strictly inside (low, high) requests a
/// semantic classification.
const SEMANTIC_WINDOW: (f64, f64) = (0.3, 0.8);

pub struct HeuristicScanner {
    catalog: Arc<Catalog>,
    decode_payloads: bool,
    normalize_unicode: bool,
}

impl HeuristicScanner {
    pub fn new(catalog: Arc<Catalog>, decode_payloads: bool, normalize_unicode: bool) -> Self {
        Self {
            catalog,
            decode_payloads,
            normalize_unicode,
        }
    }

    /// Scan a message and aggregate matches into a layer result.
    pub fn scan(&self, message: &str) -> HeuristicResult {
        let started = Instant::now();
        let mut matches = Vec::new();

        self.scan_view(message, None, &mut matches);

        if self.normalize_unicode {
            let normalized = normalize(message);
            if normalized != message {
                self.scan_view(&normalized, Some(DecodeKind::UnicodeNormalized), &mut matches);
            }
        }

        if self.decode_payloads {
            for view in decode::candidate_views(message) {
                if view.text != message {
                    self.scan_view(&view.text, Some(view.kind), &mut matches);
                }
            }
        }

        let raw_risk = matches.iter().fold(0.0_f64, |acc, m| acc.max(m.risk));
        let mut risk_score = raw_risk;
        let mut flags: Vec<String> = Vec::new();
        for m in &matches {
            if !flags.iter().any(|f| f == &m.category) {
                flags.push(m.category.clone());
            }
        }

        if matches.len() >= 3 && raw_risk < 0.7 {
            risk_score = (raw_risk + 0.1 * matches.len() as f64).min(0.9);
            flags.push(MULTIPLE_INDICATORS.to_string());
        }
        let risk_score = clamp_risk(risk_score);

        HeuristicResult {
            risk_score,
            requires_semantic: risk_score > SEMANTIC_WINDOW.0 && risk_score < SEMANTIC_WINDOW.1,
            flags,
            matches,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Fast path: first hit from a high-risk category, no decoding or
    /// normalization.
    pub fn quick_check(&self, message: &str) -> QuickCheck {
        for category in self.catalog.categories() {
            if category.risk < QUICK_CHECK_RISK {
                continue;
            }
            for pattern in &category.patterns {
                if pattern.regex.is_match(message) {
                    return QuickCheck {
                        dangerous: true,
                        category: Some(category.name.clone()),
                        pattern: Some(pattern.description.clone()),
                    };
                }
            }
        }
        QuickCheck::safe()
    }

    fn scan_view(&self, view: &str, decoded_from: Option<DecodeKind>, out: &mut Vec<PatternMatch>) {
        for category in self.catalog.categories() {
            for pattern in &category.patterns {
                for hit in pattern.regex.find_iter(view) {
                    out.push(PatternMatch {
                        category: category.name.clone(),
                        risk: category.risk,
                        description: pattern.description.clone(),
                        matched: truncate_chars(hit.as_str(), MATCH_PREVIEW_CHARS),
                        decoded_from,
                    });
                }
            }
        }
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
