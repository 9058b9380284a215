use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A dividend distribution for a ticker at a reference date.
/// At most one record exists per (ticker, reference_date) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dividend {
    pub ticker: String,
    pub reference_date: NaiveDate,
    /// Distributed amount per share (Rendimento), in BRL.
    pub dividendo: f64,
    pub created_at: DateTime<Utc>,
}

impl Dividend {
    pub fn new(ticker: String, reference_date: NaiveDate, dividendo: f64) -> Self {
        Self {
            ticker,
            reference_date,
            dividendo,
            created_at: Utc::now(),
        }
    }
}
