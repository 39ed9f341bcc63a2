use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Amounts and balances are integer counts of the currency's smallest unit.
/// For every supported currency 1 unit = 100 cents, so $50.00 = 5000.
pub type Cents = i64;

/// Currencies an account may be opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Cad,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Cad, Currency::Eur];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Cad => "CAD",
            Currency::Eur => "EUR",
        }
    }

    pub fn is_supported(code: &str) -> bool {
        code.parse::<Currency>().is_ok()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ParseAmountError;

    /// Codes are matched exactly; "usd" is not a currency code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| ParseAmountError::UnsupportedCurrency(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAmountError {
    #[error("invalid amount '{0}': expected digits with at most two decimals")]
    InvalidFormat(String),

    #[error("amount '{0}' is out of range")]
    Overflow(String),

    #[error("unsupported currency '{0}'")]
    UnsupportedCurrency(String),
}

/// Render cents as a decimal string, e.g. 5000 -> "50.00", -7 -> "-0.07".
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a decimal string into cents.
///
/// Accepts "50", "50.5", "50.05" and ".5". More than two decimals is an error
/// rather than a silent truncation.
pub fn parse_cents(input: &str) -> Result<Cents, ParseAmountError> {
    let raw = input.trim();
    let invalid = || ParseAmountError::InvalidFormat(input.to_string());
    let overflow = || ParseAmountError::Overflow(input.to_string());

    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    let (units_str, frac_str) = digits.split_once('.').unwrap_or((digits, ""));
    if units_str.is_empty() && frac_str.is_empty() {
        return Err(invalid());
    }
    if !units_str.bytes().all(|b| b.is_ascii_digit())
        || !frac_str.bytes().all(|b| b.is_ascii_digit())
        || frac_str.len() > 2
    {
        return Err(invalid());
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| overflow())?
    };
    let frac: i64 = match frac_str.len() {
        0 => 0,
        1 => frac_str.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac_str.parse().map_err(|_| invalid())?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .ok_or_else(overflow)?;
    Ok(if negative { -cents } else { cents })
}
