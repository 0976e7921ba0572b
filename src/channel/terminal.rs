//! Terminal-event detection.
//!
//! Servers signal task completion inside the payload rather than with a close
//! code. A matching payload ends the subscription without a reconnect.

use crate::config::TerminalConfig;
use serde_json::Value;

/// Matches payloads whose `field` holds one of `values` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalRule {
    field: String,
    values: Vec<String>,
}

impl TerminalRule {
    pub fn new(field: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        Self {
            field: field.into(),
            values: values
                .into_iter()
                .map(|value| value.trim().to_ascii_lowercase())
                .filter(|value| !value.is_empty())
                .collect(),
        }
    }

    /// A rule that never matches; only close codes end the subscription.
    pub fn disabled() -> Self {
        Self {
            field: String::new(),
            values: Vec::new(),
        }
    }

    pub fn from_config(config: &TerminalConfig) -> Self {
        Self::new(config.field.clone(), config.values.iter().cloned())
    }

    pub fn is_enabled(&self) -> bool {
        !self.field.is_empty() && !self.values.is_empty()
    }

    /// The terminal status carried by `payload`, if any.
    pub fn terminal_status<'a>(&self, payload: &'a Value) -> Option<&'a str> {
        if !self.is_enabled() {
            return None;
        }
        let status = payload.get(&self.field)?.as_str()?;
        let normalized = status.trim().to_ascii_lowercase();
        self.values
            .iter()
            .any(|value| *value == normalized)
            .then_some(status)
    }
}

impl Default for TerminalRule {
    fn default() -> Self {
        Self::from_config(&TerminalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_rule_matches_completed_status_in_any_case() {
        let rule = TerminalRule::default();
        let payload = json!({"status": "COMPLETED", "step": "commit"});
        assert_eq!(rule.terminal_status(&payload), Some("COMPLETED"));
    }

    #[test]
    fn progress_payloads_are_not_terminal() {
        let rule = TerminalRule::default();
        assert_eq!(rule.terminal_status(&json!({"status": "running"})), None);
        assert_eq!(rule.terminal_status(&json!({"status": 3})), None);
        assert_eq!(rule.terminal_status(&json!(["completed"])), None);
    }

    #[test]
    fn disabled_rule_never_matches() {
        let rule = TerminalRule::disabled();
        assert!(!rule.is_enabled());
        assert_eq!(rule.terminal_status(&json!({"status": "completed"})), None);
    }

    #[test]
    fn custom_field_and_values() {
        let rule = TerminalRule::new("phase", vec!["Done".to_string(), " ".to_string()]);
        assert_eq!(rule.terminal_status(&json!({"phase": "done"})), Some("done"));
        assert_eq!(rule.terminal_status(&json!({"status": "done"})), None);
    }
}
