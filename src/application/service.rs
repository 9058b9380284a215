use chrono::NaiveDate;
use std::collections::HashMap;

use crate::domain::{
    Dividend, Fund, IntegrityReport, MetricsSnapshot, build_integrity_report, normalize_cnpj,
    normalize_ticker,
};
use crate::storage::Repository;

use super::AppError;

/// Application service providing high-level operations over the fund
/// registry and its history tables. This is the primary interface for any
/// client (CLI, ingestion, export).
pub struct FundService {
    repo: Repository,
}

/// Detailed fund information for display.
pub struct FundInfo {
    pub fund: Fund,
    pub latest_metrics: Option<MetricsSnapshot>,
    pub latest_dividend: Option<Dividend>,
}

impl FundService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Registry operations
    // ========================

    /// Register a fund, or refresh the ticker and display name of an
    /// already-registered CNPJ. Idempotent for identical inputs. Fails
    /// with `TickerTaken` if the ticker belongs to a different CNPJ.
    pub async fn register_fund(
        &self,
        cnpj: &str,
        ticker: &str,
        name: Option<String>,
    ) -> Result<Fund, AppError> {
        let cnpj = normalize_cnpj(cnpj).map_err(|e| AppError::InvalidCnpj {
            input: cnpj.to_string(),
            reason: e.to_string(),
        })?;
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker {
            input: ticker.to_string(),
            reason: e.to_string(),
        })?;

        // The unique(ticker) constraint would also catch this, but checking
        // first gives the caller the offending CNPJ instead of a bare
        // database error.
        if let Some(existing) = self.repo.get_fund_by_ticker(&ticker).await? {
            if existing.cnpj != cnpj {
                return Err(AppError::TickerTaken {
                    ticker,
                    cnpj: existing.cnpj,
                });
            }
        }

        let mut fund = Fund::new(cnpj, ticker);
        if let Some(name) = name {
            fund = fund.with_name(name);
        }

        self.repo.upsert_fund(&fund).await?;

        // Re-read so an updated row keeps its original created_at.
        self.repo
            .get_fund_by_cnpj(&fund.cnpj)
            .await?
            .ok_or_else(|| AppError::FundNotFound(fund.cnpj.clone()))
    }

    /// Get a fund by ticker.
    pub async fn get_fund(&self, ticker: &str) -> Result<Fund, AppError> {
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker {
            input: ticker.to_string(),
            reason: e.to_string(),
        })?;
        self.repo
            .get_fund_by_ticker(&ticker)
            .await?
            .ok_or(AppError::FundNotFound(ticker))
    }

    /// Get a fund by CNPJ.
    pub async fn get_fund_by_cnpj(&self, cnpj: &str) -> Result<Fund, AppError> {
        let cnpj = normalize_cnpj(cnpj).map_err(|e| AppError::InvalidCnpj {
            input: cnpj.to_string(),
            reason: e.to_string(),
        })?;
        self.repo
            .get_fund_by_cnpj(&cnpj)
            .await?
            .ok_or(AppError::FundNotFound(cnpj))
    }

    /// Get detailed fund information.
    pub async fn get_fund_info(&self, ticker: &str) -> Result<FundInfo, AppError> {
        let fund = self.get_fund(ticker).await?;
        let latest_metrics = self.repo.latest_metrics(&fund.ticker).await?;
        let latest_dividend = self.repo.latest_dividend(&fund.ticker).await?;

        Ok(FundInfo {
            fund,
            latest_metrics,
            latest_dividend,
        })
    }

    /// List all registered funds.
    pub async fn list_funds(&self) -> Result<Vec<Fund>, AppError> {
        Ok(self.repo.list_funds().await?)
    }

    /// Map of CNPJ -> ticker for the whole registry. Used by ingestion to
    /// resolve report rows to tickers.
    pub async fn registry_ticker_map(&self) -> Result<HashMap<String, String>, AppError> {
        Ok(self.repo.fund_ticker_map().await?)
    }

    // ========================
    // Metrics operations
    // ========================

    /// Record a new metrics snapshot. Fails if a snapshot already exists
    /// for the (ticker, reference date) pair.
    ///
    /// The ticker is not required to be registered: the history tables
    /// are deliberately decoupled from the registry so bulk loads can
    /// arrive in any order.
    pub async fn record_metrics(
        &self,
        ticker: &str,
        reference_date: NaiveDate,
        patrimonio_liquido: Option<f64>,
        valor_patrimonial_cota: Option<f64>,
        numero_cotistas: Option<i64>,
    ) -> Result<MetricsSnapshot, AppError> {
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker {
            input: ticker.to_string(),
            reason: e.to_string(),
        })?;

        if self.repo.get_metrics(&ticker, reference_date).await?.is_some() {
            return Err(AppError::MetricsExists {
                ticker,
                reference_date,
            });
        }

        let mut snapshot = MetricsSnapshot::new(ticker, reference_date);
        snapshot.patrimonio_liquido = patrimonio_liquido;
        snapshot.valor_patrimonial_cota = valor_patrimonial_cota;
        snapshot.numero_cotistas = numero_cotistas;

        self.repo.insert_metrics(&snapshot).await?;
        Ok(snapshot)
    }

    /// Write a snapshot with merge-duplicates semantics: an existing
    /// (ticker, reference date) row has its values replaced. Used by
    /// ingestion, which re-processes overlapping report months.
    pub async fn ingest_metrics(&self, snapshot: &MetricsSnapshot) -> Result<(), AppError> {
        self.repo.upsert_metrics(snapshot).await?;
        Ok(())
    }

    /// List all snapshots for a ticker, oldest first.
    pub async fn list_metrics(&self, ticker: &str) -> Result<Vec<MetricsSnapshot>, AppError> {
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker {
            input: ticker.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.repo.list_metrics(&ticker).await?)
    }

    /// List every snapshot in the store.
    pub async fn list_all_metrics(&self) -> Result<Vec<MetricsSnapshot>, AppError> {
        Ok(self.repo.list_all_metrics().await?)
    }

    // ========================
    // Dividend operations
    // ========================

    /// Record a new dividend. Fails if one already exists for the
    /// (ticker, reference date) pair, or if the amount is not positive.
    pub async fn record_dividend(
        &self,
        ticker: &str,
        reference_date: NaiveDate,
        dividendo: f64,
    ) -> Result<Dividend, AppError> {
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker {
            input: ticker.to_string(),
            reason: e.to_string(),
        })?;

        if !dividendo.is_finite() || dividendo <= 0.0 {
            return Err(AppError::InvalidDividend(format!(
                "amount must be positive, got {}",
                dividendo
            )));
        }

        if self.repo.get_dividend(&ticker, reference_date).await?.is_some() {
            return Err(AppError::DividendExists {
                ticker,
                reference_date,
            });
        }

        let dividend = Dividend::new(ticker, reference_date, dividendo);
        self.repo.insert_dividend(&dividend).await?;
        Ok(dividend)
    }

    /// Write a dividend with merge-duplicates semantics.
    pub async fn ingest_dividend(&self, dividend: &Dividend) -> Result<(), AppError> {
        self.repo.upsert_dividend(dividend).await?;
        Ok(())
    }

    /// List all dividends for a ticker, oldest first.
    pub async fn list_dividends(&self, ticker: &str) -> Result<Vec<Dividend>, AppError> {
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker {
            input: ticker.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.repo.list_dividends(&ticker).await?)
    }

    /// List every dividend in the store.
    pub async fn list_all_dividends(&self) -> Result<Vec<Dividend>, AppError> {
        Ok(self.repo.list_all_dividends().await?)
    }

    /// Sum of dividends for a ticker within an inclusive date range.
    pub async fn sum_dividends(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<f64, AppError> {
        let ticker = normalize_ticker(ticker).map_err(|e| AppError::InvalidTicker {
            input: ticker.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.repo.sum_dividends(&ticker, from, to).await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check registry/history consistency and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;

        Ok(build_integrity_report(
            stats.fund_count,
            stats.metrics_count,
            stats.dividend_count,
            stats.orphan_metric_tickers,
            stats.orphan_dividend_tickers,
            stats.negative_dividends,
        ))
    }
}
