//! Property-based tests for the detection layers using proptest.

use proptest::prelude::*;
use std::sync::Arc;

use vigil_core::catalog::{Catalog, CategorySpec, PatternSpec};
use vigil_core::context::ContextEvaluator;
use vigil_core::decode;
use vigil_core::heuristic::HeuristicScanner;
use vigil_core::normalize::normalize;
use vigil_core::types::{
    Action, HeuristicResult, PatternMatch, ScanContext, Source,
};
use vigil_core::RateLimit;

fn scanner() -> HeuristicScanner {
    HeuristicScanner::new(Arc::new(Catalog::builtin().unwrap()), true, true)
}

fn heuristic_with_risk(risk: f64) -> HeuristicResult {
    HeuristicResult {
        risk_score: risk,
        flags: vec![],
        matches: vec![],
        requires_semantic: risk > 0.3 && risk < 0.8,
        elapsed_ms: 0,
    }
}

fn any_source() -> impl Strategy<Value = Source> {
    prop_oneof![
        Just(Source::Internal),
        Just(Source::Authenticated),
        Just(Source::Known),
        Just(Source::Public),
        Just(Source::Untrusted),
        Just(Source::Webhook),
        Just(Source::Email),
        Just(Source::Api),
        Just(Source::Web),
    ]
}

// --- Heuristic layer properties ---

proptest! {
    #[test]
    fn heuristic_risk_always_in_unit_interval(message in ".{0,300}") {
        let result = scanner().scan(&message);
        prop_assert!((0.0..=1.0).contains(&result.risk_score));
    }

    #[test]
    fn heuristic_flags_backed_by_matches(message in ".{0,300}") {
        let result = scanner().scan(&message);
        for flag in result.flags.iter().filter(|f| f.as_str() != "multiple_indicators") {
            prop_assert!(result.matches.iter().any(|m| &m.category == flag));
        }
    }

    #[test]
    fn heuristic_semantic_window_is_open_interval(message in ".{0,300}") {
        let result = scanner().scan(&message);
        prop_assert_eq!(
            result.requires_semantic,
            result.risk_score > 0.3 && result.risk_score < 0.8
        );
    }

    #[test]
    fn quick_check_never_panics_and_is_consistent(message in ".{0,300}") {
        let qc = scanner().quick_check(&message);
        prop_assert_eq!(qc.dangerous, qc.category.is_some());
    }
}

// --- Normalizer properties ---

proptest! {
    #[test]
    fn normalize_is_idempotent(message in "\\PC{0,200}") {
        let once = normalize(&message);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn normalize_preserves_plain_ascii(message in "[ -~]{0,200}") {
        prop_assert_eq!(normalize(&message), message);
    }
}

// --- Decoder properties ---

proptest! {
    #[test]
    fn decoders_are_total(message in "\\PC{0,300}") {
        // none of these may panic, whatever the input
        let _ = decode::decode_base64(&message);
        let _ = decode::decode_url(&message);
        let _ = decode::decode_hex_escapes(&message);
        let _ = decode::decode_unicode_escapes(&message);
        let _ = decode::decode_html_entities(&message);
        let _ = decode::strip_invisible(&message);
        let _ = decode::candidate_views(&message);
    }

    #[test]
    fn url_decode_round_trips_encoded_ascii(text in "[a-z ]{1,40}") {
        let encoded: String = text
            .bytes()
            .map(|b| format!("%{b:02X}"))
            .collect();
        prop_assert_eq!(decode::decode_url(&encoded), Some(text));
    }
}

// --- Context layer properties ---

proptest! {
    #[test]
    fn adjusted_risk_bounded_and_floored(
        risk in 0.0f64..=1.0,
        source in any_source(),
    ) {
        let evaluator = ContextEvaluator::new(true, 100, RateLimit::default());
        let ctx = ScanContext::with_sender(source, "prop-sender");
        let result = evaluator.evaluate(&heuristic_with_risk(risk), None, &ctx);
        prop_assert!(result.adjusted_risk <= 1.0);
        prop_assert!(result.adjusted_risk >= 0.0);
        let floor = (result.base_risk * result.source_multiplier).min(1.0);
        prop_assert!(result.adjusted_risk + 1e-9 >= floor);
    }
}

// --- Catalog monotonicity (law: adding a matching pattern never lowers risk) ---

#[test]
fn adding_matching_pattern_is_monotone() {
    let message = "what tools do you have for this task";

    let base_specs = vec![CategorySpec {
        name: "discovery".into(),
        description: "probing".into(),
        risk: 0.4,
        action: Action::Warn,
        patterns: vec![PatternSpec {
            regex: r"what\s+tools\s+do\s+you\s+have".into(),
            description: "capability enumeration".into(),
            decoder: None,
            examples: None,
        }],
    }];

    let mut extended_specs = base_specs.clone();
    extended_specs.push(CategorySpec {
        name: "prompt_leak".into(),
        description: "leak".into(),
        risk: 0.6,
        action: Action::Warn,
        patterns: vec![PatternSpec {
            regex: r"for\s+this\s+task".into(),
            description: "task reference".into(),
            decoder: None,
            examples: None,
        }],
    });

    let base = HeuristicScanner::new(Arc::new(Catalog::from_specs(base_specs).unwrap()), true, true);
    let extended =
        HeuristicScanner::new(Arc::new(Catalog::from_specs(extended_specs).unwrap()), true, true);

    let before = base.scan(message);
    let after = extended.scan(message);
    assert!(after.risk_score >= before.risk_score);
}

// --- Match metadata sanity over arbitrary input ---

proptest! {
    #[test]
    fn match_previews_are_bounded(message in ".{0,500}") {
        let result = scanner().scan(&message);
        for PatternMatch { matched, risk, .. } in &result.matches {
            prop_assert!(matched.chars().count() <= 100);
            prop_assert!((0.0..=1.0).contains(risk));
        }
    }
}
