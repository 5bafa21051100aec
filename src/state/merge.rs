//! Deep merge of untyped JSON onto the default document, with per-section
//! schema validation.

use crate::types::{
    AgentKnowledge, ApplicationRecord, InterviewState, JobSearchState, ResumeState,
    StateDocument, SystemState, UserProfile, UserState,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Outcome of a validated merge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeReport {
    /// JSON pointers of sections that failed validation and were reset to
    /// their defaults. `""` means the whole incoming document was rejected.
    pub quarantined: Vec<String>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.quarantined.is_empty()
    }
}

/// Merge `source` onto `target`.
///
/// Objects merge key by key, recursively. Anything else in `source`
/// (scalars, arrays, null) replaces the value in `target`.
pub fn deep_merge(target: &Value, source: &Value) -> Value {
    match (target, source) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut out = base.clone();
            for (key, value) in overlay {
                let merged = match out.get(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (_, overlay) => overlay.clone(),
    }
}

type Validator = fn(&Value) -> bool;

fn validates<T: DeserializeOwned>(value: &Value) -> bool {
    serde_json::from_value::<T>(value.clone()).is_ok()
}

/// Sections validated independently, as JSON pointers. Containers come
/// after their children so a container is only reset when it is not an
/// object at all.
const SECTIONS: &[(&str, Validator)] = &[
    ("/user", validates::<UserState>),
    ("/agentKnowledge/userProfile", validates::<UserProfile>),
    ("/agentKnowledge/interview", validates::<InterviewState>),
    ("/agentKnowledge/resume", validates::<ResumeState>),
    ("/agentKnowledge/jobSearch", validates::<JobSearchState>),
    (
        "/agentKnowledge/applications",
        validates::<BTreeMap<String, ApplicationRecord>>,
    ),
    ("/agentKnowledge", validates::<AgentKnowledge>),
    ("/system", validates::<SystemState>),
];

/// Deep-merge `incoming` onto `defaults` and decode the result.
///
/// Sections of the merged document that do not match the schema are
/// replaced by the corresponding section of `defaults` and listed in the
/// report. The session bag of `defaults` is carried over untouched.
pub fn merge_validated(
    defaults: &StateDocument,
    incoming: &Value,
) -> (StateDocument, MergeReport) {
    let mut report = MergeReport::default();

    if !incoming.is_object() {
        warn!("Incoming state is not a JSON object, keeping defaults");
        report.quarantined.push(String::new());
        return (defaults.clone(), report);
    }

    let base = match serde_json::to_value(defaults) {
        Ok(base) => base,
        Err(e) => {
            warn!(error = %e, "Failed to encode default state");
            report.quarantined.push(String::new());
            return (defaults.clone(), report);
        }
    };

    let mut merged = deep_merge(&base, incoming);

    for (pointer, is_valid) in SECTIONS {
        let Some(section) = merged.pointer(pointer) else {
            continue;
        };
        if is_valid(section) {
            continue;
        }

        warn!(section = %pointer, "Quarantining section that failed validation");
        let fallback = base.pointer(pointer).cloned().unwrap_or(Value::Null);
        if let Some(slot) = merged.pointer_mut(pointer) {
            *slot = fallback;
        }
        report.quarantined.push((*pointer).to_string());
    }

    let mut doc = match serde_json::from_value::<StateDocument>(merged) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "Merged state failed validation, keeping defaults");
            report.quarantined.push(String::new());
            defaults.clone()
        }
    };
    doc.session = defaults.session.clone();

    (doc, report)
}
