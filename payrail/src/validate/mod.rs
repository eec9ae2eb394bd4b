//! Pure, per-field validation rules.
//!
//! Rules are pure functions of an input value plus optional context (selected
//! card network, country). No side effects and no network access.
//!
//! The timing policy lives in [`Validator::check`]: while the user is typing
//! only the validity flag is updated and no message is surfaced; on blur the
//! full rule output, message included, is returned. An empty field is always
//! invalid-but-silent in both phases, distinguishing "incomplete" from
//! "wrong".

mod rules;

pub use rules::*;

/// Which interaction phase produced the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPhase {
    /// The field is being edited; feedback must stay silent.
    Typing,
    /// The field lost focus; the full message may surface.
    Blur,
}

/// Outcome of running one rule against one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the input passed the rule.
    pub is_valid: bool,
    /// Stable error code, present only for surfaced failures.
    pub error_code: Option<&'static str>,
    /// Human-readable message, present only for surfaced failures.
    pub message: Option<String>,
}

impl ValidationResult {
    /// A passing result.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            is_valid: true,
            error_code: None,
            message: None,
        }
    }

    /// A failing result with a code and message.
    #[must_use]
    pub fn invalid(error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_code: Some(error_code),
            message: Some(message.into()),
        }
    }

    /// A failing result that surfaces nothing, used for empty fields.
    #[must_use]
    pub const fn invalid_silent() -> Self {
        Self {
            is_valid: false,
            error_code: None,
            message: None,
        }
    }

    /// Strips code and message, keeping only the validity flag.
    #[must_use]
    pub fn silenced(mut self) -> Self {
        self.error_code = None;
        self.message = None;
        self
    }
}

/// A pure validation rule over a string input.
pub trait ValidationRule: Send + Sync {
    /// Runs the full rule, message included.
    fn validate(&self, value: &str) -> ValidationResult;
}

/// Applies the interaction-phase policy on top of a raw rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// Checks `value` against `rule` under the given phase.
    ///
    /// Empty input is invalid-but-silent in every phase. During typing the
    /// result is silenced so no error text flashes mid-entry; on blur the
    /// full result is returned.
    #[must_use]
    pub fn check(value: &str, rule: &dyn ValidationRule, phase: InputPhase) -> ValidationResult {
        if value.trim().is_empty() {
            return ValidationResult::invalid_silent();
        }
        let result = rule.validate(value);
        match phase {
            InputPhase::Typing => result.silenced(),
            InputPhase::Blur => result,
        }
    }
}
