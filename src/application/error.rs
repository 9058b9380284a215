use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Fund not found: {0}")]
    FundNotFound(String),

    #[error("Invalid CNPJ '{input}': {reason}")]
    InvalidCnpj { input: String, reason: String },

    #[error("Invalid ticker '{input}': {reason}")]
    InvalidTicker { input: String, reason: String },

    #[error("Ticker {ticker} is already registered to {cnpj}")]
    TickerTaken { ticker: String, cnpj: String },

    #[error("Metrics snapshot already exists for {ticker} at {reference_date}")]
    MetricsExists {
        ticker: String,
        reference_date: NaiveDate,
    },

    #[error("Dividend already recorded for {ticker} at {reference_date}")]
    DividendExists {
        ticker: String,
        reference_date: NaiveDate,
    },

    #[error("Invalid dividend amount: {0}")]
    InvalidDividend(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
