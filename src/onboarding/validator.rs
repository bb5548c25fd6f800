//! Step validation — decides whether a step's fields allow advancing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::graph::WorkflowGraph;
use super::model::{fields, FieldValue, ProfileDraft};
use super::state::StepId;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("phone pattern is valid"));

/// Outcome of validating one step against the draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub missing_fields: BTreeSet<String>,
    /// Field name → human-readable reason.
    pub invalid_fields: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.missing_fields.is_empty() && self.invalid_fields.is_empty()
    }
}

/// Checks a step's required fields. Pure, synchronous, no I/O.
pub trait StepValidator: Send + Sync {
    fn validate(&self, step: StepId, draft: &ProfileDraft) -> ValidationResult;
}

/// Presence and format checks driven by the graph's field sets.
pub struct RequiredFieldsValidator {
    graph: Arc<WorkflowGraph>,
}

impl RequiredFieldsValidator {
    pub fn new(graph: Arc<WorkflowGraph>) -> Self {
        Self { graph }
    }
}

impl StepValidator for RequiredFieldsValidator {
    fn validate(&self, step: StepId, draft: &ProfileDraft) -> ValidationResult {
        let mut result = ValidationResult::default();

        let record = match self.graph.record(step) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(step = %step, "Validating undeclared step: {}", e);
                result
                    .invalid_fields
                    .insert(step.to_string(), "step is not part of this workflow".into());
                return result;
            }
        };

        for name in &record.required_fields {
            match draft.get(name) {
                None => {
                    result.missing_fields.insert(name.clone());
                }
                Some(value) if value.is_blank() => {
                    result.missing_fields.insert(name.clone());
                }
                Some(value) => {
                    if let Some(reason) = check_format(name, value) {
                        result.invalid_fields.insert(name.clone(), reason);
                    }
                }
            }
        }

        // Optional fields are only checked when the user filled them in.
        for name in &record.optional_fields {
            if let Some(value) = draft.get(name).filter(|v| !v.is_blank()) {
                if let Some(reason) = check_format(name, value) {
                    result.invalid_fields.insert(name.clone(), reason);
                }
            }
        }

        result
    }
}

/// Per-field format rules. Returns the reason when the value is unusable.
fn check_format(name: &str, value: &FieldValue) -> Option<String> {
    match (name, value) {
        (fields::ACCOUNT_TYPE, FieldValue::AccountType(_)) => None,
        (fields::ACCOUNT_TYPE, _) => Some("must be Individual or Business".into()),
        (fields::EMAIL, FieldValue::Text(s)) => {
            (!EMAIL_RE.is_match(s.trim())).then(|| "not a valid email address".into())
        }
        (fields::PHONE, FieldValue::Text(s)) => {
            let digits: String = s.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
            (!PHONE_RE.is_match(&digits)).then(|| "must be 7-15 digits".into())
        }
        (fields::WEBSITE, FieldValue::Text(s)) => {
            let s = s.trim();
            (!(s.starts_with("http://") || s.starts_with("https://")))
                .then(|| "must start with http:// or https://".into())
        }
        (fields::PORTFOLIO, FieldValue::Portfolio(items)) => items
            .iter()
            .position(|item| item.title.trim().is_empty())
            .map(|idx| format!("item {} has no title", idx + 1)),
        (fields::PORTFOLIO, _) => Some("must be a list of portfolio items".into()),
        (fields::ADDRESS, FieldValue::Address(addr)) => {
            let mut gaps = Vec::new();
            if addr.line1.trim().is_empty() {
                gaps.push("line1");
            }
            if addr.city.trim().is_empty() {
                gaps.push("city");
            }
            if addr.postal_code.trim().is_empty() {
                gaps.push("postalCode");
            }
            if addr.country.trim().is_empty() {
                gaps.push("country");
            }
            (!gaps.is_empty()).then(|| format!("missing {}", gaps.join(", ")))
        }
        (fields::ADDRESS, _) => Some("must be an address".into()),
        (fields::VERIFICATION_DOCUMENT | fields::AVATAR, FieldValue::Document(_)) => None,
        (fields::VERIFICATION_DOCUMENT | fields::AVATAR, _) => {
            Some("must be an uploaded document".into())
        }
        (_, FieldValue::Text(_)) => None,
        (_, _) => Some("unexpected value type".into()),
    }
}
