use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODE: &str = "rag";

/// Answer strategy sent as the `type` parameter of an ask request. The remote
/// service decides which values are valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mode(String);

impl Mode {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::new(DEFAULT_MODE)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn default_choices() -> Vec<Mode> {
    vec![Mode::new("rag"), Mode::new("fulltext")]
}

/// Process-wide mode selection. Sessions copy the current value when they
/// start, so changing it never reaches a stream already in flight.
#[derive(Debug, Clone)]
pub struct ModeSelector {
    current: Mode,
    choices: Vec<Mode>,
}

impl Default for ModeSelector {
    fn default() -> Self {
        Self::new(Mode::default(), default_choices())
    }
}

impl ModeSelector {
    pub fn new(initial: Mode, choices: Vec<Mode>) -> Self {
        let mut choices = choices;
        if !choices.contains(&initial) {
            choices.insert(0, initial.clone());
        }
        Self {
            current: initial,
            choices,
        }
    }

    pub fn select(&mut self, value: impl Into<String>) {
        let mode = Mode::new(value);
        tracing::debug!(mode = %mode, "mode selected");
        self.current = mode;
    }

    pub fn current(&self) -> Mode {
        self.current.clone()
    }

    pub fn choices(&self) -> &[Mode] {
        &self.choices
    }

    /// Advances to the next configured choice, wrapping around. A value set
    /// through `select` that is not among the choices restarts at the first.
    pub fn cycle(&mut self) -> Mode {
        let next = match self.choices.iter().position(|mode| *mode == self.current) {
            Some(idx) => self.choices[(idx + 1) % self.choices.len()].clone(),
            None => self
                .choices
                .first()
                .cloned()
                .unwrap_or_else(|| self.current.clone()),
        };
        self.select(next.0.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_rag() {
        let selector = ModeSelector::default();
        assert_eq!(selector.current().as_str(), "rag");
        assert_eq!(selector.choices().len(), 2);
    }

    #[test]
    fn select_accepts_any_value() {
        let mut selector = ModeSelector::default();
        selector.select("experimental");
        assert_eq!(selector.current(), Mode::new("experimental"));
    }

    #[test]
    fn cycle_wraps_and_recovers_from_custom_values() {
        let mut selector = ModeSelector::default();
        assert_eq!(selector.cycle().as_str(), "fulltext");
        assert_eq!(selector.cycle().as_str(), "rag");
        selector.select("custom");
        assert_eq!(selector.cycle().as_str(), "rag");
    }

    #[test]
    fn initial_mode_joins_choices() {
        let selector = ModeSelector::new(Mode::new("summary"), default_choices());
        assert_eq!(selector.choices()[0].as_str(), "summary");
    }
}
