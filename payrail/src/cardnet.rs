//! Card network identification and the local BIN table.
//!
//! Every supported network carries a static table of BIN prefix patterns,
//! valid card number lengths, and security-code length. The table answers
//! local, synchronous resolution for short inputs; once 8 digits are
//! available the debounced remote lookup in `payrail-methods` takes over and
//! falls back to this table on failure.

use serde::{Deserialize, Serialize};

/// A card network (payment scheme printed on the card).
///
/// The serialized values are the backend wire identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardNetwork {
    /// American Express.
    #[serde(rename = "AMEX")]
    Amex,
    /// Bancontact (resolved remotely; no local BIN patterns).
    #[serde(rename = "BANCONTACT")]
    Bancontact,
    /// Cartes Bancaires (co-badged with Visa/Mastercard; resolved remotely).
    #[serde(rename = "CARTES_BANCAIRES")]
    CartesBancaires,
    /// Diners Club.
    #[serde(rename = "DINERS_CLUB")]
    Diners,
    /// Discover.
    #[serde(rename = "DISCOVER")]
    Discover,
    /// eftpos (Australian domestic scheme; resolved remotely).
    #[serde(rename = "EFTPOS")]
    Eftpos,
    /// Elo.
    #[serde(rename = "ELO")]
    Elo,
    /// Hiper.
    #[serde(rename = "HIPER")]
    Hiper,
    /// Hipercard.
    #[serde(rename = "HIPERCARD")]
    Hipercard,
    /// JCB.
    #[serde(rename = "JCB")]
    Jcb,
    /// Maestro.
    #[serde(rename = "MAESTRO")]
    Maestro,
    /// Mastercard.
    #[serde(rename = "MASTERCARD")]
    Mastercard,
    /// Mir.
    #[serde(rename = "MIR")]
    Mir,
    /// Visa.
    #[serde(rename = "VISA")]
    Visa,
    /// UnionPay.
    #[serde(rename = "UNIONPAY")]
    Unionpay,
    /// Unrecognized network.
    #[serde(rename = "OTHER", alias = "UNKNOWN")]
    Other,
}

/// An inclusive BIN prefix pattern.
///
/// `(4, 4)` matches any number starting with 4; `(644, 649)` matches numbers
/// whose first three digits fall in 644..=649. For inputs shorter than the
/// pattern, both bounds are truncated to the input length so partial entries
/// still surface candidates.
type Pattern = (u32, u32);

/// Static validation metadata for a network.
#[derive(Debug, Clone, Copy)]
pub struct NetworkValidation {
    /// Human-readable network name.
    pub display_name: &'static str,
    /// BIN prefix patterns.
    pub patterns: &'static [Pattern],
    /// Valid card number lengths.
    pub lengths: &'static [usize],
    /// Security code label (CVV, CVC, CID, ...).
    pub code_name: &'static str,
    /// Security code length.
    pub code_length: usize,
}

/// All networks in resolution order.
pub const ALL_NETWORKS: &[CardNetwork] = &[
    CardNetwork::Amex,
    CardNetwork::Bancontact,
    CardNetwork::CartesBancaires,
    CardNetwork::Diners,
    CardNetwork::Discover,
    CardNetwork::Eftpos,
    CardNetwork::Elo,
    CardNetwork::Hiper,
    CardNetwork::Hipercard,
    CardNetwork::Jcb,
    CardNetwork::Maestro,
    CardNetwork::Mastercard,
    CardNetwork::Mir,
    CardNetwork::Visa,
    CardNetwork::Unionpay,
];

impl CardNetwork {
    /// Returns the static validation metadata for this network.
    ///
    /// Networks that are only resolvable via the remote BIN service
    /// (Bancontact, Cartes Bancaires, eftpos) have no local table entry.
    #[must_use]
    pub const fn validation(&self) -> Option<NetworkValidation> {
        match self {
            Self::Amex => Some(NetworkValidation {
                display_name: "American Express",
                patterns: &[(34, 34), (37, 37)],
                lengths: &[15],
                code_name: "CID",
                code_length: 4,
            }),
            Self::Diners => Some(NetworkValidation {
                display_name: "Diners",
                patterns: &[(300, 305), (36, 36), (38, 38), (39, 39)],
                lengths: &[14, 16, 19],
                code_name: "CVV",
                code_length: 3,
            }),
            Self::Discover => Some(NetworkValidation {
                display_name: "Discover",
                patterns: &[(6011, 6011), (644, 649), (65, 65)],
                lengths: &[16, 19],
                code_name: "CID",
                code_length: 3,
            }),
            Self::Elo => Some(NetworkValidation {
                display_name: "Elo",
                patterns: &[
                    (401_178, 401_179),
                    (438_935, 438_935),
                    (457_631, 457_632),
                    (431_274, 431_274),
                    (451_416, 451_416),
                    (457_393, 457_393),
                    (504_175, 504_175),
                    (506_699, 506_778),
                    (509_000, 509_999),
                    (627_780, 627_780),
                    (636_297, 636_297),
                    (636_368, 636_368),
                    (650_031, 650_033),
                    (650_035, 650_051),
                    (650_405, 650_439),
                    (650_485, 650_538),
                    (650_541, 650_598),
                    (650_700, 650_718),
                    (650_720, 650_727),
                    (650_901, 650_978),
                    (651_652, 651_679),
                    (655_000, 655_019),
                    (655_021, 655_058),
                ],
                lengths: &[16],
                code_name: "CVE",
                code_length: 3,
            }),
            Self::Hiper => Some(NetworkValidation {
                display_name: "Hiper",
                patterns: &[
                    (637_095, 637_095),
                    (63_737_423, 63_737_423),
                    (63_743_358, 63_743_358),
                    (637_568, 637_568),
                    (637_599, 637_599),
                    (637_609, 637_609),
                    (637_612, 637_612),
                ],
                lengths: &[16],
                code_name: "CVC",
                code_length: 3,
            }),
            Self::Hipercard => Some(NetworkValidation {
                display_name: "Hipercard",
                patterns: &[(606_282, 606_282)],
                lengths: &[16],
                code_name: "CVC",
                code_length: 3,
            }),
            Self::Jcb => Some(NetworkValidation {
                display_name: "JCB",
                patterns: &[(2131, 2131), (1800, 1800), (3528, 3589)],
                lengths: &[16, 17, 18, 19],
                code_name: "CVV",
                code_length: 3,
            }),
            Self::Mastercard => Some(NetworkValidation {
                display_name: "Mastercard",
                patterns: &[
                    (51, 55),
                    (2221, 2229),
                    (223, 229),
                    (23, 26),
                    (270, 271),
                    (2720, 2720),
                ],
                lengths: &[16],
                code_name: "CVC",
                code_length: 3,
            }),
            Self::Maestro => Some(NetworkValidation {
                display_name: "Maestro",
                patterns: &[
                    (493_698, 493_698),
                    (500_000, 504_174),
                    (504_176, 506_698),
                    (506_779, 508_999),
                    (56, 59),
                    (63, 63),
                    (67, 67),
                    (6, 6),
                ],
                lengths: &[16, 17, 18, 19],
                code_name: "CVC",
                code_length: 3,
            }),
            Self::Mir => Some(NetworkValidation {
                display_name: "Mir",
                patterns: &[(2200, 2204)],
                lengths: &[16, 17, 18, 19],
                code_name: "CVP2",
                code_length: 3,
            }),
            Self::Visa => Some(NetworkValidation {
                display_name: "Visa",
                patterns: &[(4, 4)],
                lengths: &[16, 18, 19],
                code_name: "CVV",
                code_length: 3,
            }),
            Self::Unionpay => Some(NetworkValidation {
                display_name: "UnionPay",
                patterns: &[
                    (620, 620),
                    (624, 626),
                    (62100, 62182),
                    (62184, 62187),
                    (62185, 62197),
                    (62200, 62205),
                    (622_010, 622_999),
                    (62207, 62209),
                    (622_126, 622_925),
                    (623, 626),
                    (6270, 6270),
                    (6272, 6272),
                    (6276, 6276),
                    (627_700, 627_779),
                    (627_781, 627_799),
                    (6282, 6289),
                    (6291, 6291),
                    (6292, 6292),
                    (810, 810),
                    (8110, 8131),
                    (8132, 8151),
                    (8152, 8163),
                    (8164, 8171),
                ],
                lengths: &[14, 15, 16, 17, 18, 19],
                code_name: "CVN",
                code_length: 3,
            }),
            Self::Bancontact | Self::CartesBancaires | Self::Eftpos | Self::Other => None,
        }
    }

    /// Returns the human-readable network name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self.validation() {
            Some(v) => v.display_name,
            None => match self {
                Self::Bancontact => "Bancontact",
                Self::CartesBancaires => "Cartes Bancaires",
                Self::Eftpos => "eftpos",
                _ => "Unknown",
            },
        }
    }

    /// Security code length for this network (3, or 4 for Amex).
    #[must_use]
    pub fn code_length(&self) -> usize {
        self.validation().map_or(3, |v| v.code_length)
    }

    /// Valid card number lengths; the generic 12..=19 span when the
    /// network has no local table entry.
    #[must_use]
    pub fn lengths(&self) -> &'static [usize] {
        const GENERIC: &[usize] = &[12, 13, 14, 15, 16, 17, 18, 19];
        self.validation().map_or(GENERIC, |v| v.lengths)
    }

    /// Returns `true` when the given digit string matches one of this
    /// network's BIN patterns.
    ///
    /// Inputs shorter than a pattern still match when they fall inside the
    /// truncated pattern bounds, so candidates surface while typing.
    #[must_use]
    pub fn matches(&self, digits: &str) -> bool {
        let Some(validation) = self.validation() else {
            return false;
        };
        validation
            .patterns
            .iter()
            .any(|&pattern| pattern_matches(pattern, digits))
    }

    /// Parses the backend wire value, tolerating legacy aliases.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        let upper = value.to_ascii_uppercase();
        match upper.as_str() {
            "DINERS" | "DINERSCLUB" | "DINERS_CLUB" => Self::Diners,
            "CARTESBANCAIRES" | "CARTES_BANCAIRES" => Self::CartesBancaires,
            other => serde_json::from_value(serde_json::Value::String(other.to_owned()))
                .unwrap_or(Self::Other),
        }
    }
}

/// Checks a digit string against one inclusive prefix pattern.
fn pattern_matches((lo, hi): Pattern, digits: &str) -> bool {
    if digits.is_empty() {
        return false;
    }
    let pattern_len = decimal_digits(hi.max(lo));
    let take = digits.len().min(pattern_len);
    let Ok(prefix) = digits[..take].parse::<u32>() else {
        return false;
    };
    let scale = 10_u32.pow((pattern_len - take) as u32);
    prefix >= lo / scale && prefix <= hi / scale
}

const fn decimal_digits(mut value: u32) -> usize {
    let mut count = 1;
    while value >= 10 {
        value /= 10;
        count += 1;
    }
    count
}

/// Resolves candidate networks for a digit string from the local BIN table.
///
/// Returns every network whose patterns the input can still match, in
/// resolution order. A non-empty input that matches nothing yields
/// `[CardNetwork::Other]`; an empty input yields nothing.
#[must_use]
pub fn resolve_local(digits: &str) -> Vec<CardNetwork> {
    let sanitized: String = digits.chars().filter(char::is_ascii_digit).collect();
    if sanitized.is_empty() {
        return Vec::new();
    }
    let matched: Vec<CardNetwork> = ALL_NETWORKS
        .iter()
        .copied()
        .filter(|network| network.matches(&sanitized))
        .collect();
    if matched.is_empty() {
        vec![CardNetwork::Other]
    } else {
        matched
    }
}
