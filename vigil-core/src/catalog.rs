//! Pattern catalog: declarative category files compiled into rule sets.
//!
//! Each JSON file defines one category: a name, a description, a risk
//! scalar, a suggested action, and a list of regex patterns. Regexes are
//! compiled case-insensitive at load time; any compile failure (including
//! ECMAScript-only constructs such as look-around, which the `regex` crate
//! rejects) aborts initialization; there is no partial catalog.
//!
//! When no directory is configured, [`Catalog::builtin`] provides a
//! compiled-in catalog covering the eight canonical categories.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::types::Action;

/// One pattern as declared in a category file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub regex: String,
    pub description: String,
    /// Optional hint naming the decoder this pattern is intended to catch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<String>,
    /// Example strings, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
}

/// One category file, as parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    pub description: String,
    pub risk: f64,
    pub action: Action,
    pub patterns: Vec<PatternSpec>,
}

/// A compiled pattern ready for scanning.
#[derive(Debug)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub description: String,
    pub decoder: Option<String>,
}

/// A named bundle of compiled patterns sharing one risk scalar.
#[derive(Debug)]
pub struct Category {
    pub name: String,
    pub description: String,
    pub risk: f64,
    pub action: Action,
    pub patterns: Vec<CompiledPattern>,
}

/// The full immutable rule set the heuristic layer scans with.
#[derive(Debug)]
pub struct Catalog {
    categories: Vec<Category>,
}

impl Catalog {
    /// Compile a set of category specs into a catalog.
    pub fn from_specs(specs: Vec<CategorySpec>) -> Result<Self> {
        let mut categories = Vec::with_capacity(specs.len());
        for spec in specs {
            if !(0.0..=1.0).contains(&spec.risk) {
                return Err(EngineError::PatternLoad {
                    path: spec.name.clone().into(),
                    message: format!("category risk {} is outside [0, 1]", spec.risk),
                });
            }
            let mut patterns = Vec::with_capacity(spec.patterns.len());
            for pattern in spec.patterns {
                let regex = RegexBuilder::new(&pattern.regex)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| EngineError::InvalidRegex {
                        category: spec.name.clone(),
                        pattern: pattern.regex.clone(),
                        message: e.to_string(),
                    })?;
                patterns.push(CompiledPattern {
                    regex,
                    description: pattern.description,
                    decoder: pattern.decoder,
                });
            }
            categories.push(Category {
                name: spec.name,
                description: spec.description,
                risk: spec.risk,
                action: spec.action,
                patterns,
            });
        }
        Ok(Self { categories })
    }

    /// Load a catalog from a directory of per-category JSON files.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| EngineError::PatternLoad {
            path: dir.to_path_buf(),
            message: format!("cannot read pattern directory: {e}"),
        })?;

        let mut files: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(EngineError::PatternLoad {
                path: dir.to_path_buf(),
                message: "no .json pattern files found".into(),
            });
        }

        let mut specs = Vec::with_capacity(files.len());
        for path in files {
            let raw = std::fs::read_to_string(&path).map_err(|e| EngineError::PatternLoad {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let spec: CategorySpec =
                serde_json::from_str(&raw).map_err(|e| EngineError::PatternLoad {
                    path: path.clone(),
                    message: format!("malformed category file: {e}"),
                })?;
            specs.push(spec);
        }
        Self::from_specs(specs)
    }

    /// The compiled-in default catalog.
    pub fn builtin() -> Result<Self> {
        Self::from_specs(builtin_specs())
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn pattern_count(&self) -> usize {
        self.categories.iter().map(|c| c.patterns.len()).sum()
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }
}

fn category(
    name: &str,
    description: &str,
    risk: f64,
    action: Action,
    patterns: &[(&str, &str)],
) -> CategorySpec {
    CategorySpec {
        name: name.into(),
        description: description.into(),
        risk,
        action,
        patterns: patterns
            .iter()
            .map(|(regex, description)| PatternSpec {
                regex: (*regex).into(),
                description: (*description).into(),
                decoder: None,
                examples: None,
            })
            .collect(),
    }
}

/// The built-in category set. Risk levels are chosen so the four severe
/// categories are visible to the quick-check fast path (risk >= 0.7) while
/// `encoding` alone stays below the warn band.
fn builtin_specs() -> Vec<CategorySpec> {
    let mut specs = vec![
        category(
            "command_injection",
            "Attempts to make the agent run shell commands or arbitrary code",
            0.9,
            Action::Block,
            &[
                (
                    r"(curl|wget)\s+[^\s|;]+\s*\|\s*(ba|z|da)?sh",
                    "download piped into a shell",
                ),
                (r"\brm\s+-[a-z]*r[a-z]*f?\b", "recursive file deletion"),
                (
                    r"(^|[;&|])\s*(bash|sh|zsh)\s+-c\b",
                    "explicit shell -c execution",
                ),
                (
                    r"\b(eval|exec|system|popen)\s*\(",
                    "dynamic code execution call",
                ),
                (
                    r"\$\(\s*(curl|wget|cat|bash|sh|nc)\b[^)]*\)",
                    "command substitution around a fetch or shell",
                ),
                (
                    r"\bpowershell(\.exe)?\s+-(e|enc|encodedcommand)\b",
                    "encoded powershell invocation",
                ),
                (r"\bchmod\s+\+x\b", "marking a payload executable"),
            ],
        ),
        category(
            "instruction_override",
            "Attempts to cancel or replace the agent's standing instructions",
            0.7,
            Action::Block,
            &[
                (
                    r"ignore\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions?|directions?|prompts?|rules?)",
                    "ignore previous instructions",
                ),
                (
                    r"disregard\s+(all\s+)?(previous|prior|above|your)",
                    "disregard prior guidance",
                ),
                (
                    r"forget\s+(all\s+)?(your|previous|prior)\s+(instructions?|rules?|training)",
                    "forget standing instructions",
                ),
                (
                    r"(override|supersede|replace)\s+(all\s+)?(previous|prior|your)\s+(instructions?|rules?)",
                    "override standing instructions",
                ),
                (r"new\s+(instructions?|rules?)\s*:", "inline replacement instructions"),
                (
                    r"you\s+are\s+now\s+(in\s+)?(developer|debug|god|dan|jailbreak)\s+mode",
                    "privileged mode switch demand",
                ),
                (
                    r"do\s+not\s+follow\s+(the|any|your)\s+(previous|above|prior|original)",
                    "do-not-follow demand",
                ),
                (
                    r"from\s+now\s+on\s*,?\s*(you|ignore|disregard)",
                    "standing behavior override",
                ),
            ],
        ),
        category(
            "credential_theft",
            "Attempts to extract keys, passwords, tokens, or other secrets",
            0.8,
            Action::Block,
            &[
                (
                    r"(send|share|give|paste|reveal|show|tell)\s+(me\s+)?(your|the)\s+(api[\s_-]?keys?|passwords?|secrets?|tokens?|credentials?)",
                    "credential handover demand",
                ),
                (
                    r"what('?s|\s+is)\s+(your|the)\s+(api[\s_-]?key|password|secret|token)",
                    "direct credential question",
                ),
                (
                    r"\b(aws_secret_access_key|id_rsa|ssh[\s_-]?private\s+key|\.env\b)",
                    "secret material reference",
                ),
                (
                    r"(print|dump|read|cat)\s+.{0,24}(environment\s+variables?|env\s+vars?|secrets?\s+file)",
                    "environment or secrets dump demand",
                ),
            ],
        ),
        category(
            "data_exfiltration",
            "Attempts to move data out to an attacker-controlled destination",
            0.8,
            Action::Block,
            &[
                (
                    r"forward\s+(all\s+)?(your\s+)?(emails?|messages?|mail|data|files?)",
                    "bulk forwarding demand",
                ),
                (
                    r"(send|upload|post|copy|transmit)\s+.{0,40}\s+to\s+(https?://|ftp://|\S+@\S+)",
                    "send content to external endpoint",
                ),
                (r"exfiltrat", "explicit exfiltration language"),
                (
                    r"(leak|extract|dump)\s+(the\s+)?(database|user\s+data|conversation|chat\s+history)",
                    "bulk data dump demand",
                ),
            ],
        ),
        category(
            "impersonation",
            "Claims of authority intended to unlock privileged behavior",
            0.6,
            Action::Warn,
            &[
                (
                    r"\bi('m|\s+am)\s+(the|your)\s+(system\s+)?(admin(istrator)?|developer|owner|creator|ceo|support)",
                    "first-person authority claim",
                ),
                (
                    r"this\s+is\s+(the|your)\s+(system|admin(istrator)?|developer|security\s+team)",
                    "third-person authority claim",
                ),
                (
                    r"on\s+behalf\s+of\s+(the\s+)?(security|it|admin|compliance)\s+team",
                    "delegated authority claim",
                ),
                (
                    r"\[?(system|admin)\s+(message|notice|override)\]?\s*:",
                    "fake system banner",
                ),
            ],
        ),
        category(
            "discovery",
            "Probing for capabilities, configuration, or model identity",
            0.4,
            Action::Warn,
            &[
                (
                    r"what\s+(tools|functions|capabilities|commands|plugins|apis)\s+(do\s+you|can\s+you|are\s+(available|enabled))",
                    "capability enumeration",
                ),
                (
                    r"list\s+(all\s+)?(your\s+)?(tools|functions|commands|capabilities|plugins)",
                    "tool listing demand",
                ),
                (
                    r"what\s+(model|version|llm)\s+(are\s+you|is\s+this)",
                    "model fingerprinting",
                ),
                (
                    r"(show|describe)\s+(me\s+)?(your|the)\s+(configuration|config|settings|setup)",
                    "configuration probe",
                ),
                (
                    r"what\s+are\s+you\s+(allowed|not\s+allowed|able)\s+to",
                    "boundary probing",
                ),
            ],
        ),
        category(
            "prompt_leak",
            "Attempts to read the system prompt or hidden context",
            0.6,
            Action::Warn,
            &[
                (
                    r"(reveal|show|print|repeat|output|display|share)\s+(me\s+)?(your|the)\s+(system\s+|initial\s+|original\s+)?(prompt|instructions)",
                    "system prompt disclosure demand",
                ),
                (
                    r"repeat\s+(everything|all\s+text|the\s+words?)\s+(above|before)",
                    "context replay demand",
                ),
                (
                    r"what\s+(are|were)\s+your\s+(instructions|rules|guidelines)",
                    "instruction interrogation",
                ),
                (
                    r"your\s+(hidden|secret|internal)\s+(prompt|instructions|rules)",
                    "hidden prompt reference",
                ),
            ],
        ),
    ];

    // The encoding category carries decoder hints; build it explicitly.
    specs.push(CategorySpec {
        name: "encoding".into(),
        description: "Encoded or obfuscated payloads that warrant a decoded re-scan".into(),
        risk: 0.3,
        action: Action::Warn,
        patterns: vec![
            PatternSpec {
                regex: r"[A-Za-z0-9+/]{30,}={0,2}".into(),
                description: "long base64 run".into(),
                decoder: Some("base64".into()),
                examples: None,
            },
            PatternSpec {
                regex: r"(?:%[0-9A-Fa-f]{2}){3,}".into(),
                description: "url-encoded run".into(),
                decoder: Some("url".into()),
                examples: None,
            },
            PatternSpec {
                regex: r"(?:\\x[0-9A-Fa-f]{2}){4,}".into(),
                description: "hex escape run".into(),
                decoder: Some("hex".into()),
                examples: None,
            },
            PatternSpec {
                regex: r"(?:\\u[0-9A-Fa-f]{4}){4,}".into(),
                description: "unicode escape run".into(),
                decoder: Some("unicode".into()),
                examples: None,
            },
            PatternSpec {
                regex: r"(?:&#x?[0-9A-Fa-f]{1,7};){4,}".into(),
                description: "html entity run".into(),
                decoder: None,
                examples: None,
            },
        ],
    });

    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_compiles() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.categories().len(), 8);
        assert!(catalog.pattern_count() > 30);
        let names = catalog.category_names();
        for expected in [
            "command_injection",
            "instruction_override",
            "credential_theft",
            "data_exfiltration",
            "impersonation",
            "discovery",
            "prompt_leak",
            "encoding",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_builtin_risks_in_range() {
        let catalog = Catalog::builtin().unwrap();
        for category in catalog.categories() {
            assert!((0.0..=1.0).contains(&category.risk), "{}", category.name);
        }
    }

    #[test]
    fn test_case_insensitive_compile() {
        let catalog = Catalog::from_specs(vec![category(
            "demo",
            "demo",
            0.5,
            Action::Warn,
            &[(r"ignore\s+this", "demo pattern")],
        )])
        .unwrap();
        let pattern = &catalog.categories()[0].patterns[0];
        assert!(pattern.regex.is_match("IGNORE THIS"));
        assert!(pattern.regex.is_match("Ignore this"));
    }

    #[test]
    fn test_invalid_regex_is_fatal() {
        let err = Catalog::from_specs(vec![category(
            "bad",
            "bad",
            0.5,
            Action::Warn,
            &[(r"(?=lookahead)", "ecmascript-only construct")],
        )])
        .unwrap_err();
        match err {
            EngineError::InvalidRegex { category, .. } => assert_eq!(category, "bad"),
            other => panic!("expected InvalidRegex, got {other}"),
        }
    }

    #[test]
    fn test_out_of_range_risk_is_fatal() {
        let err =
            Catalog::from_specs(vec![category("bad", "bad", 1.5, Action::Warn, &[])]).unwrap_err();
        assert!(matches!(err, EngineError::PatternLoad { .. }));
    }

    #[test]
    fn test_load_dir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = serde_json::json!({
            "name": "custom_threats",
            "description": "test category",
            "risk": 0.75,
            "action": "block",
            "patterns": [
                { "regex": "launch\\s+the\\s+missiles", "description": "missile launch" },
                { "regex": "[A-Za-z0-9+/]{40,}", "description": "blob", "decoder": "base64",
                  "examples": ["aGVsbG8..."] }
            ]
        });
        std::fs::write(
            dir.path().join("custom.json"),
            serde_json::to_string_pretty(&file).unwrap(),
        )
        .unwrap();

        let catalog = Catalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.categories().len(), 1);
        let category = &catalog.categories()[0];
        assert_eq!(category.name, "custom_threats");
        assert_eq!(category.risk, 0.75);
        assert_eq!(category.action, Action::Block);
        assert_eq!(category.patterns.len(), 2);
        assert_eq!(category.patterns[1].decoder.as_deref(), Some("base64"));
        assert!(category.patterns[0].regex.is_match("LAUNCH the missiles"));
    }

    #[test]
    fn test_load_dir_missing_is_fatal() {
        let err = Catalog::load_dir(Path::new("/nonexistent/patterns")).unwrap_err();
        assert!(matches!(err, EngineError::PatternLoad { .. }));
    }

    #[test]
    fn test_load_dir_empty_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::PatternLoad { .. }));
    }

    #[test]
    fn test_load_dir_malformed_json_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let err = Catalog::load_dir(dir.path()).unwrap_err();
        match err {
            EngineError::PatternLoad { message, .. } => {
                assert!(message.contains("malformed"));
            }
            other => panic!("expected PatternLoad, got {other}"),
        }
    }
}
