use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fund/class registration. One row per CNPJ; the ticker is unique
/// across the whole registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fund {
    /// Legal registration identifier, normalized to `NN.NNN.NNN/NNNN-NN`.
    pub cnpj: String,
    /// B3 trading symbol (e.g. "MXRF11").
    pub ticker: String,
    /// Display name of the fund/class.
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Fund {
    pub fn new(cnpj: String, ticker: String) -> Self {
        Self {
            cnpj,
            ticker,
            name: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Normalize a CNPJ to its punctuated form (`NN.NNN.NNN/NNNN-NN`).
/// Accepts the punctuated form or a bare 14-digit string; anything else
/// is rejected.
pub fn normalize_cnpj(input: &str) -> Result<String, ParseCnpjError> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 14 {
        return Err(ParseCnpjError::WrongLength(digits.len()));
    }

    // Reject inputs with stray characters beyond digits and CNPJ punctuation
    if input
        .chars()
        .any(|c| !c.is_ascii_digit() && !matches!(c, '.' | '/' | '-') && !c.is_whitespace())
    {
        return Err(ParseCnpjError::InvalidCharacter);
    }

    Ok(format!(
        "{}.{}.{}/{}-{}",
        &digits[0..2],
        &digits[2..5],
        &digits[5..8],
        &digits[8..12],
        &digits[12..14]
    ))
}

/// Normalize a ticker: trimmed, uppercased, 1 to 12 alphanumeric characters.
pub fn normalize_ticker(input: &str) -> Result<String, ParseTickerError> {
    let ticker = input.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ParseTickerError::Empty);
    }
    if ticker.len() > 12 || !ticker.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ParseTickerError::InvalidFormat);
    }
    Ok(ticker)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCnpjError {
    WrongLength(usize),
    InvalidCharacter,
}

impl fmt::Display for ParseCnpjError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCnpjError::WrongLength(n) => {
                write!(f, "expected 14 digits, found {}", n)
            }
            ParseCnpjError::InvalidCharacter => write!(f, "invalid character in CNPJ"),
        }
    }
}

impl std::error::Error for ParseCnpjError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseTickerError {
    Empty,
    InvalidFormat,
}

impl fmt::Display for ParseTickerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseTickerError::Empty => write!(f, "ticker is empty"),
            ParseTickerError::InvalidFormat => {
                write!(f, "ticker must be 1-12 alphanumeric characters")
            }
        }
    }
}

impl std::error::Error for ParseTickerError {}
