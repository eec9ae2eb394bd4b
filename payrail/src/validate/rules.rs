//! Concrete validation rules for checkout input fields.

use std::sync::LazyLock;

use regex::Regex;

use crate::cardnet::CardNetwork;
use crate::session::unix_now;

use super::{ValidationResult, ValidationRule};

/// Luhn checksum over a digit string.
#[must_use]
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    let mut double = false;
    for ch in digits.chars().rev() {
        let Some(d) = ch.to_digit(10) else {
            return false;
        };
        let mut d = d;
        if double {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        double = !double;
    }
    !digits.is_empty() && sum % 10 == 0
}

fn sanitize_digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Card number rule: digits only, network-valid length, Luhn checksum.
///
/// When a network is supplied (selected by the user for co-badged cards, or
/// resolved from the BIN), its specific length table applies; otherwise the
/// generic 12..=19 span.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardNumberRule {
    /// The resolved or user-selected network, when known.
    pub network: Option<CardNetwork>,
}

impl CardNumberRule {
    /// Creates a rule bound to a specific network.
    #[must_use]
    pub const fn for_network(network: CardNetwork) -> Self {
        Self {
            network: Some(network),
        }
    }
}

impl ValidationRule for CardNumberRule {
    fn validate(&self, value: &str) -> ValidationResult {
        let stripped: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        if stripped.chars().any(|c| !c.is_ascii_digit()) {
            return ValidationResult::invalid("invalid-card-number", "Card number is invalid");
        }
        let digits = stripped;
        let network = self.network.unwrap_or(CardNetwork::Other);
        if !network.lengths().contains(&digits.len()) {
            return ValidationResult::invalid("invalid-card-number", "Card number is invalid");
        }
        if !luhn_valid(&digits) {
            return ValidationResult::invalid("invalid-card-number", "Card number is invalid");
        }
        ValidationResult::valid()
    }
}

/// Parses `MM/YY` or `MM/YYYY` into a month and four-digit year.
///
/// Two-digit years expand into the 2000s. Returns `None` for anything else;
/// this is the single definition of the accepted expiry shapes, shared by
/// [`ExpiryRule`] and the instrument builders.
#[must_use]
pub fn parse_expiry(value: &str) -> Option<(u32, i64)> {
    let (month, year) = value.trim().split_once('/')?;
    let month: u32 = month.trim().parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    let year = year.trim();
    let year = match (year.len(), year.parse::<i64>()) {
        (2, Ok(two)) => 2000 + two,
        (4, Ok(four)) => four,
        _ => return None,
    };
    Some((month, year))
}

/// Expiry rule: `MM/YY` or `MM/YYYY`, month 01..=12, not in the past.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryRule {
    now_secs: u64,
}

impl Default for ExpiryRule {
    fn default() -> Self {
        Self {
            now_secs: unix_now(),
        }
    }
}

impl ExpiryRule {
    /// Creates a rule evaluated against the current clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a rule evaluated against a fixed instant, for tests.
    #[must_use]
    pub const fn at(now_secs: u64) -> Self {
        Self { now_secs }
    }

    fn current_year_month(&self) -> (i64, u32) {
        let days = (self.now_secs / 86_400) as i64;
        civil_from_days(days)
    }
}

impl ValidationRule for ExpiryRule {
    fn validate(&self, value: &str) -> ValidationResult {
        let Some((month, year)) = parse_expiry(value) else {
            return ValidationResult::invalid("invalid-expiry-date", "Expiry date is invalid");
        };

        let (current_year, current_month) = self.current_year_month();
        if year < current_year || (year == current_year && month < current_month) {
            return ValidationResult::invalid("expired-card", "Card has expired");
        }
        ValidationResult::valid()
    }
}

/// Days-since-epoch to (year, month), Gregorian proleptic.
fn civil_from_days(days: i64) -> (i64, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };
    (year, month as u32)
}

/// Security code rule: exact length for the network (3, or 4 for Amex).
#[derive(Debug, Clone, Copy, Default)]
pub struct CvvRule {
    /// The resolved network, when known.
    pub network: Option<CardNetwork>,
}

impl CvvRule {
    /// Creates a rule bound to a specific network.
    #[must_use]
    pub const fn for_network(network: CardNetwork) -> Self {
        Self {
            network: Some(network),
        }
    }
}

impl ValidationRule for CvvRule {
    fn validate(&self, value: &str) -> ValidationResult {
        let digits = sanitize_digits(value);
        if digits.len() != value.trim().len() {
            return ValidationResult::invalid("invalid-cvv", "Security code is invalid");
        }
        let expected = self.network.map_or(3, |n| n.code_length());
        // Without a resolved network a 4-digit code may still be an Amex.
        let acceptable = if self.network.is_some() {
            digits.len() == expected
        } else {
            digits.len() == 3 || digits.len() == 4
        };
        if acceptable {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid("invalid-cvv", "Security code is invalid")
        }
    }
}

static NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L} '\-]+$").expect("static regex"));

/// Cardholder name rule: at least two characters, letters plus space,
/// hyphen, and apostrophe.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardholderNameRule;

impl ValidationRule for CardholderNameRule {
    fn validate(&self, value: &str) -> ValidationResult {
        let trimmed = value.trim();
        if trimmed.chars().count() < 2 || !NAME_CHARS.is_match(trimmed) {
            return ValidationResult::invalid("invalid-cardholder-name", "Name is invalid");
        }
        ValidationResult::valid()
    }
}

static POSTAL_GENERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 \-]{0,9}$").expect("static regex"));
static POSTAL_US: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("static regex"));
static POSTAL_GB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{1,2}\d[A-Za-z\d]? ?\d[A-Za-z]{2}$").expect("static regex")
});
static POSTAL_CA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]\d[A-Za-z] ?\d[A-Za-z]\d$").expect("static regex")
});

/// Postal code rule with per-country patterns and a permissive fallback.
#[derive(Debug, Clone, Default)]
pub struct PostalCodeRule {
    /// ISO country code selecting the pattern, when known.
    pub country: Option<String>,
}

impl PostalCodeRule {
    /// Creates a rule for a specific country.
    #[must_use]
    pub fn for_country(country: impl Into<String>) -> Self {
        Self {
            country: Some(country.into()),
        }
    }
}

impl ValidationRule for PostalCodeRule {
    fn validate(&self, value: &str) -> ValidationResult {
        let trimmed = value.trim();
        let pattern = match self.country.as_deref().map(str::to_ascii_uppercase) {
            Some(ref c) if c == "US" => &*POSTAL_US,
            Some(ref c) if c == "GB" => &*POSTAL_GB,
            Some(ref c) if c == "CA" => &*POSTAL_CA,
            _ => &*POSTAL_GENERIC,
        };
        if pattern.is_match(trimmed) {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid("invalid-postal-code", "Postal code is invalid")
        }
    }
}

/// Presence-only rule for fields that merely need a value on submit.
#[derive(Debug, Clone)]
pub struct RequiredFieldRule {
    code: &'static str,
    message: &'static str,
}

impl RequiredFieldRule {
    /// Creates a required-field rule with the code and message to surface.
    #[must_use]
    pub const fn new(code: &'static str, message: &'static str) -> Self {
        Self { code, message }
    }
}

impl ValidationRule for RequiredFieldRule {
    fn validate(&self, value: &str) -> ValidationResult {
        if value.trim().is_empty() {
            ValidationResult::invalid(self.code, self.message)
        } else {
            ValidationResult::valid()
        }
    }
}
