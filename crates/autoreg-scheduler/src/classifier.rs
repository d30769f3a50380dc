//! Outcome classification: turns one registration report into an outcome kind.
//!
//! All vendor phrase matching lives here so the retry driver never looks at
//! strings. Rules, first match wins:
//! 1. both steps completed → `Success`
//! 2. "registration will be open on …" (or the vendor's too-soon rule code) → `TooSoon`
//! 3. conflict phrases or the fatal-validation flag → `Fatal(reason)`
//! 4. everything else → `RetryableFailure`

use std::sync::LazyLock;

use autoreg_core::types::RegistrationReport;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TOO_SOON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)registration\s+will\s+be\s+open\s+on").expect("static regex")
});

/// Vendor error code of the "too soon" validation rule.
const TOO_SOON_RULE_CODE: i64 = 40;

/// Phrase → fatal reason, checked in order.
const FATAL_PHRASES: &[(&str, FatalReason)] = &[
    ("already have a reservation at this time", FatalReason::ReservationConflict),
    ("already registered", FatalReason::AlreadyRegistered),
    ("already reserved", FatalReason::AlreadyRegistered),
];

/// Why an attempt can never succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalReason {
    AlreadyRegistered,
    ReservationConflict,
    ApiError,
}

/// Classified kind of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    TooSoon,
    Fatal(FatalReason),
    RetryableFailure,
}

/// Classified result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub kind: OutcomeKind,
    pub message: String,
    pub diagnostic: Option<serde_json::Value>,
}

/// Seam for swapping the vendor-specific matching rules.
pub trait OutcomeClassifier: Send + Sync {
    fn classify(&self, report: &RegistrationReport) -> AttemptOutcome;
}

/// Classifier for the vendor's `validation` payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct VendorClassifier;

impl OutcomeClassifier for VendorClassifier {
    fn classify(&self, report: &RegistrationReport) -> AttemptOutcome {
        let message = best_message(report);
        let outcome = |kind| AttemptOutcome {
            kind,
            message: message.clone(),
            diagnostic: report.diagnostic.clone(),
        };

        if report.completed {
            return outcome(OutcomeKind::Success);
        }

        let Some(diagnostic) = report.diagnostic.as_ref() else {
            return outcome(OutcomeKind::RetryableFailure);
        };

        let mut texts = Vec::new();
        collect_strings(diagnostic, &mut texts);

        if texts.iter().any(|t| TOO_SOON.is_match(t)) || too_soon_rule_code(diagnostic) {
            return outcome(OutcomeKind::TooSoon);
        }

        let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
        for (phrase, reason) in FATAL_PHRASES {
            if lowered.iter().any(|t| t.contains(phrase)) {
                return outcome(OutcomeKind::Fatal(*reason));
            }
        }

        if is_fatal_flag(diagnostic) {
            return outcome(OutcomeKind::Fatal(FatalReason::ApiError));
        }

        outcome(OutcomeKind::RetryableFailure)
    }
}

/// The vendor's notification text when present, else the transport message.
fn best_message(report: &RegistrationReport) -> String {
    report
        .diagnostic
        .as_ref()
        .and_then(|d| d.pointer("/validation/notification"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| report.message.clone())
}

fn is_fatal_flag(diagnostic: &serde_json::Value) -> bool {
    diagnostic
        .pointer("/validation/isFatal")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn too_soon_rule_code(diagnostic: &serde_json::Value) -> bool {
    diagnostic
        .pointer("/validation/rules/tooSoonRule/errorCode")
        .and_then(|v| v.as_i64())
        == Some(TOO_SOON_RULE_CODE)
}

/// Depth-first string leaves, in document order.
fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(report: RegistrationReport) -> AttemptOutcome {
        VendorClassifier.classify(&report)
    }

    fn rejected(diagnostic: serde_json::Value) -> RegistrationReport {
        RegistrationReport::failed("Step 1 failed", Some(diagnostic))
    }

    #[test]
    fn test_completed_is_success() {
        let out = classify(RegistrationReport {
            completed: true,
            message: "Registration completed".into(),
            diagnostic: Some(json!({"status": "COMPLETED"})),
        });
        assert_eq!(out.kind, OutcomeKind::Success);
        assert_eq!(out.message, "Registration completed");
    }

    #[test]
    fn test_too_soon_phrase() {
        let out = classify(rejected(json!({
            "validation": {
                "isFatal": true,
                "notification": "Registration will be open on 2025-05-08T10:00:00Z"
            }
        })));
        assert_eq!(out.kind, OutcomeKind::TooSoon);
        assert_eq!(out.message, "Registration will be open on 2025-05-08T10:00:00Z");
    }

    #[test]
    fn test_too_soon_phrase_case_insensitive_and_nested() {
        let out = classify(rejected(json!({
            "validation": {"rules": [{"message": "REGISTRATION WILL BE OPEN ON Friday"}]}
        })));
        assert_eq!(out.kind, OutcomeKind::TooSoon);
    }

    #[test]
    fn test_too_soon_rule_code() {
        let out = classify(rejected(json!({
            "validation": {"isFatal": true, "rules": {"tooSoonRule": {"errorCode": 40}}}
        })));
        assert_eq!(out.kind, OutcomeKind::TooSoon);
    }

    #[test]
    fn test_reservation_conflict_wins_over_generic_fatal() {
        let out = classify(rejected(json!({
            "validation": {
                "isFatal": true,
                "notification": "You already have a reservation at this time"
            }
        })));
        assert_eq!(out.kind, OutcomeKind::Fatal(FatalReason::ReservationConflict));
    }

    #[test]
    fn test_already_registered() {
        let out = classify(rejected(json!({
            "validation": {"notification": "Member is already registered for this class."}
        })));
        assert_eq!(out.kind, OutcomeKind::Fatal(FatalReason::AlreadyRegistered));
    }

    #[test]
    fn test_fatal_flag_without_known_phrase() {
        let out = classify(rejected(json!({
            "validation": {"isFatal": true, "notification": "Member is not eligible"}
        })));
        assert_eq!(out.kind, OutcomeKind::Fatal(FatalReason::ApiError));
        assert_eq!(out.message, "Member is not eligible");
    }

    #[test]
    fn test_unclassified_validation_is_retryable() {
        let out = classify(rejected(json!({"validation": {"isFatal": false, "notification": "Try again"}})));
        assert_eq!(out.kind, OutcomeKind::RetryableFailure);
    }

    #[test]
    fn test_network_error_is_retryable() {
        let out = classify(RegistrationReport::failed("Request timed out", None));
        assert_eq!(out.kind, OutcomeKind::RetryableFailure);
        assert_eq!(out.message, "Request timed out");
    }

    #[test]
    fn test_malformed_body_is_retryable() {
        let out = classify(rejected(json!("<html>502 Bad Gateway</html>")));
        assert_eq!(out.kind, OutcomeKind::RetryableFailure);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let report = rejected(json!({
            "validation": {"isFatal": true, "notification": "You are already registered"}
        }));
        let first = classify(report.clone());
        for _ in 0..5 {
            assert_eq!(classify(report.clone()), first);
        }
    }
}
