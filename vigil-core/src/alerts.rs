//! Alert template table.
//!
//! A static (intent × action) mapping to short human-readable strings. The
//! table never influences the decision; the engine only selects from it.
//! Intents without a dedicated bucket fall back to the unknown bucket, and
//! the allow action shares one neutral string.

use crate::types::{Action, Intent};

struct Bucket {
    warn: &'static str,
    block: &'static str,
    quarantine: &'static str,
}

const ALLOW_TEXT: &str = "Message allowed.";

const UNKNOWN: Bucket = Bucket {
    warn: "Suspicious message detected; review before acting on it.",
    block: "Message blocked by security policy.",
    quarantine: "Message quarantined for review.",
};

const INSTRUCTION_OVERRIDE: Bucket = Bucket {
    warn: "Possible attempt to override agent instructions.",
    block: "Blocked an attempt to override agent instructions.",
    quarantine: "Quarantined an instruction-override attempt.",
};

const COMMAND_INJECTION: Bucket = Bucket {
    warn: "Message resembles a command-injection attempt.",
    block: "Blocked a command-injection attempt.",
    quarantine: "Quarantined a command-injection attempt.",
};

const CREDENTIAL_THEFT: Bucket = Bucket {
    warn: "Message probes for credentials or secrets.",
    block: "Blocked an attempt to extract credentials.",
    quarantine: "Quarantined a credential-theft attempt.",
};

const DATA_EXFILTRATION: Bucket = Bucket {
    warn: "Message asks to move data to an external destination.",
    block: "Blocked a data-exfiltration attempt.",
    quarantine: "Quarantined a data-exfiltration attempt.",
};

const PROMPT_LEAK: Bucket = Bucket {
    warn: "Message probes for the system prompt.",
    block: "Blocked an attempt to read the system prompt.",
    quarantine: "Quarantined a prompt-leak attempt.",
};

const IMPERSONATION: Bucket = Bucket {
    warn: "Sender claims an authority role; verify independently.",
    block: "Blocked a message impersonating an authority.",
    quarantine: "Quarantined an impersonation attempt.",
};

const DISCOVERY: Bucket = Bucket {
    warn: "Sender is probing agent capabilities.",
    block: "Blocked a capability-discovery probe.",
    quarantine: "Quarantined a capability-discovery probe.",
};

const SOCIAL_ENGINEERING: Bucket = Bucket {
    warn: "Message shows social-engineering pressure tactics.",
    block: "Blocked a social-engineering attempt.",
    quarantine: "Quarantined a social-engineering attempt.",
};

fn bucket(intent: Intent) -> &'static Bucket {
    match intent {
        Intent::InstructionOverride => &INSTRUCTION_OVERRIDE,
        Intent::CommandInjection => &COMMAND_INJECTION,
        Intent::CredentialTheft => &CREDENTIAL_THEFT,
        Intent::DataExfiltration => &DATA_EXFILTRATION,
        Intent::PromptLeak => &PROMPT_LEAK,
        Intent::Impersonation => &IMPERSONATION,
        Intent::Discovery => &DISCOVERY,
        Intent::SocialEngineering => &SOCIAL_ENGINEERING,
        // curious, multi_stage, encoding and benign use the shared bucket
        _ => &UNKNOWN,
    }
}

/// Select the alert string for an (intent, action) pair.
pub fn alert_message(intent: Intent, action: Action) -> &'static str {
    let bucket = bucket(intent);
    match action {
        Action::Allow => ALLOW_TEXT,
        Action::Warn => bucket.warn,
        Action::Block => bucket.block,
        Action::Quarantine => bucket.quarantine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_intents_have_distinct_text() {
        let a = alert_message(Intent::CommandInjection, Action::Block);
        let b = alert_message(Intent::CredentialTheft, Action::Block);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_bucket_fallback() {
        assert_eq!(
            alert_message(Intent::MultiStage, Action::Block),
            UNKNOWN.block
        );
        assert_eq!(alert_message(Intent::Curious, Action::Warn), UNKNOWN.warn);
        assert_eq!(
            alert_message(Intent::Encoding, Action::Quarantine),
            UNKNOWN.quarantine
        );
    }

    #[test]
    fn test_allow_is_neutral_for_every_intent() {
        for intent in Intent::TAXONOMY {
            assert_eq!(alert_message(*intent, Action::Allow), ALLOW_TEXT);
        }
    }

    #[test]
    fn test_every_pair_has_text() {
        for intent in Intent::TAXONOMY {
            for action in [Action::Allow, Action::Warn, Action::Block, Action::Quarantine] {
                assert!(!alert_message(*intent, action).is_empty());
            }
        }
    }
}
