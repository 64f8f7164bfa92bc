//! Best-effort side channel for external calls that must not fail the
//! primary operation (media deletes, notification mail, attachment upload).
//!
//! Each call runs at most once. Its result is recorded as a [`SideEffect`]
//! and returned next to the primary value in an [`Outcome`].

use serde::Serialize;
use std::fmt::Display;
use tracing::warn;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EffectStatus {
    Completed,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SideEffect {
    pub action: String,
    #[serde(flatten)]
    pub status: EffectStatus,
}

impl SideEffect {
    pub fn completed(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: EffectStatus::Completed,
        }
    }

    pub fn skipped(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: EffectStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(action: impl Into<String>, reason: impl Display) -> Self {
        let action = action.into();
        let reason = reason.to_string();
        warn!(action = %action, error = %reason, "side effect failed");
        Self {
            action,
            status: EffectStatus::Failed { reason },
        }
    }

    pub fn from_result<T, E: Display>(action: impl Into<String>, result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::completed(action),
            Err(err) => Self::failed(action, err),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, EffectStatus::Failed { .. })
    }
}

/// Primary result plus the side effects attempted while producing it.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub side_effects: Vec<SideEffect>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            side_effects: Vec::new(),
        }
    }

    pub fn with_effects(value: T, side_effects: Vec<SideEffect>) -> Self {
        Self {
            value,
            side_effects,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            side_effects: self.side_effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_flat_status() {
        let effect = SideEffect::failed("media.delete:nissal/products/a", "timeout");
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["action"], "media.delete:nissal/products/a");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "timeout");

        let ok = serde_json::to_value(SideEffect::completed("mail.notify")).unwrap();
        assert_eq!(ok, serde_json::json!({"action": "mail.notify", "status": "completed"}));
    }

    #[test]
    fn from_result_records_failures() {
        let err: Result<(), &str> = Err("boom");
        assert!(SideEffect::from_result("x", &err).is_failed());
        let ok: Result<(), &str> = Ok(());
        assert!(!SideEffect::from_result("x", &ok).is_failed());
    }
}
