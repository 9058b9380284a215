use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::{Dividend, Fund, MetricsSnapshot};

/// Statistics for registry/history consistency checks.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub fund_count: i64,
    pub metrics_count: i64,
    pub dividend_count: i64,
    pub orphan_metric_tickers: Vec<String>,
    pub orphan_dividend_tickers: Vec<String>,
    pub negative_dividends: i64,
}

/// Repository for persisting and querying the fund registry and its
/// metrics/dividend history.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Safe to run against an already-initialized store.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(super::MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Fund registry operations
    // ========================

    /// Insert a fund or, if the CNPJ is already registered, refresh its
    /// ticker and display name in place. Keyed strictly on the CNPJ; a
    /// ticker collision with a different CNPJ is a constraint violation
    /// and surfaces as an error.
    pub async fn upsert_fund(&self, fund: &Fund) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fund_registry (cnpj_fundo_classe, ticker, nome_fundo_classe, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cnpj_fundo_classe) DO UPDATE SET
                ticker = excluded.ticker,
                nome_fundo_classe = excluded.nome_fundo_classe
            "#,
        )
        .bind(&fund.cnpj)
        .bind(&fund.ticker)
        .bind(&fund.name)
        .bind(fund.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to upsert fund")?;
        Ok(())
    }

    /// Get a fund by CNPJ.
    pub async fn get_fund_by_cnpj(&self, cnpj: &str) -> Result<Option<Fund>> {
        let row = sqlx::query(
            r#"
            SELECT cnpj_fundo_classe, ticker, nome_fundo_classe, created_at
            FROM fund_registry
            WHERE cnpj_fundo_classe = ?
            "#,
        )
        .bind(cnpj)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch fund by CNPJ")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_fund(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a fund by ticker.
    pub async fn get_fund_by_ticker(&self, ticker: &str) -> Result<Option<Fund>> {
        let row = sqlx::query(
            r#"
            SELECT cnpj_fundo_classe, ticker, nome_fundo_classe, created_at
            FROM fund_registry
            WHERE ticker = ?
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch fund by ticker")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_fund(&row)?)),
            None => Ok(None),
        }
    }

    /// List all registered funds, ordered by ticker.
    pub async fn list_funds(&self) -> Result<Vec<Fund>> {
        let rows = sqlx::query(
            r#"
            SELECT cnpj_fundo_classe, ticker, nome_fundo_classe, created_at
            FROM fund_registry
            ORDER BY ticker
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list funds")?;

        rows.iter().map(Self::row_to_fund).collect()
    }

    /// Map of CNPJ -> ticker for the whole registry.
    pub async fn fund_ticker_map(&self) -> Result<std::collections::HashMap<String, String>> {
        let rows = sqlx::query("SELECT cnpj_fundo_classe, ticker FROM fund_registry")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch registry mapping")?;

        Ok(rows
            .iter()
            .map(|row| (row.get("cnpj_fundo_classe"), row.get("ticker")))
            .collect())
    }

    fn row_to_fund(row: &sqlx::sqlite::SqliteRow) -> Result<Fund> {
        let created_at_str: String = row.get("created_at");

        Ok(Fund {
            cnpj: row.get("cnpj_fundo_classe"),
            ticker: row.get("ticker"),
            name: row.get("nome_fundo_classe"),
            created_at: parse_created_at(&created_at_str)?,
        })
    }

    // ========================
    // Metrics operations
    // ========================

    /// Insert a metrics snapshot. Fails if a snapshot already exists for
    /// the (ticker, reference date) pair.
    pub async fn insert_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fii_metrics (ticker, data_referencia, patrimonio_liquido, valor_patrimonial_cota, numero_cotistas, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.ticker)
        .bind(snapshot.reference_date.to_string())
        .bind(snapshot.patrimonio_liquido)
        .bind(snapshot.valor_patrimonial_cota)
        .bind(snapshot.numero_cotistas)
        .bind(snapshot.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert metrics snapshot")?;
        Ok(())
    }

    /// Insert a metrics snapshot, replacing the values of an existing one
    /// for the same (ticker, reference date). Used by bulk ingestion,
    /// which re-processes overlapping report months.
    pub async fn upsert_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fii_metrics (ticker, data_referencia, patrimonio_liquido, valor_patrimonial_cota, numero_cotistas, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker, data_referencia) DO UPDATE SET
                patrimonio_liquido = excluded.patrimonio_liquido,
                valor_patrimonial_cota = excluded.valor_patrimonial_cota,
                numero_cotistas = excluded.numero_cotistas
            "#,
        )
        .bind(&snapshot.ticker)
        .bind(snapshot.reference_date.to_string())
        .bind(snapshot.patrimonio_liquido)
        .bind(snapshot.valor_patrimonial_cota)
        .bind(snapshot.numero_cotistas)
        .bind(snapshot.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to upsert metrics snapshot")?;
        Ok(())
    }

    /// Get the snapshot for a (ticker, reference date) pair.
    pub async fn get_metrics(
        &self,
        ticker: &str,
        reference_date: NaiveDate,
    ) -> Result<Option<MetricsSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, data_referencia, patrimonio_liquido, valor_patrimonial_cota, numero_cotistas, created_at
            FROM fii_metrics
            WHERE ticker = ? AND data_referencia = ?
            "#,
        )
        .bind(ticker)
        .bind(reference_date.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch metrics snapshot")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_metrics(&row)?)),
            None => Ok(None),
        }
    }

    /// List all snapshots for a ticker, oldest first.
    pub async fn list_metrics(&self, ticker: &str) -> Result<Vec<MetricsSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, data_referencia, patrimonio_liquido, valor_patrimonial_cota, numero_cotistas, created_at
            FROM fii_metrics
            WHERE ticker = ?
            ORDER BY data_referencia
            "#,
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list metrics")?;

        rows.iter().map(Self::row_to_metrics).collect()
    }

    /// List every snapshot in the store, ordered by ticker then date.
    pub async fn list_all_metrics(&self) -> Result<Vec<MetricsSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, data_referencia, patrimonio_liquido, valor_patrimonial_cota, numero_cotistas, created_at
            FROM fii_metrics
            ORDER BY ticker, data_referencia
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list all metrics")?;

        rows.iter().map(Self::row_to_metrics).collect()
    }

    /// Get the most recent snapshot for a ticker.
    pub async fn latest_metrics(&self, ticker: &str) -> Result<Option<MetricsSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, data_referencia, patrimonio_liquido, valor_patrimonial_cota, numero_cotistas, created_at
            FROM fii_metrics
            WHERE ticker = ?
            ORDER BY data_referencia DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest metrics")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_metrics(&row)?)),
            None => Ok(None),
        }
    }

    fn row_to_metrics(row: &sqlx::sqlite::SqliteRow) -> Result<MetricsSnapshot> {
        let date_str: String = row.get("data_referencia");
        let created_at_str: String = row.get("created_at");

        Ok(MetricsSnapshot {
            ticker: row.get("ticker"),
            reference_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .context("Invalid reference date")?,
            patrimonio_liquido: row.get("patrimonio_liquido"),
            valor_patrimonial_cota: row.get("valor_patrimonial_cota"),
            numero_cotistas: row.get("numero_cotistas"),
            created_at: parse_created_at(&created_at_str)?,
        })
    }

    // ========================
    // Dividend operations
    // ========================

    /// Insert a dividend record. Fails if one already exists for the
    /// (ticker, reference date) pair.
    pub async fn insert_dividend(&self, dividend: &Dividend) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fii_dividends (ticker, data_referencia, dividendo, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&dividend.ticker)
        .bind(dividend.reference_date.to_string())
        .bind(dividend.dividendo)
        .bind(dividend.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert dividend")?;
        Ok(())
    }

    /// Insert a dividend record, replacing the amount of an existing one
    /// for the same (ticker, reference date).
    pub async fn upsert_dividend(&self, dividend: &Dividend) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fii_dividends (ticker, data_referencia, dividendo, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(ticker, data_referencia) DO UPDATE SET
                dividendo = excluded.dividendo
            "#,
        )
        .bind(&dividend.ticker)
        .bind(dividend.reference_date.to_string())
        .bind(dividend.dividendo)
        .bind(dividend.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to upsert dividend")?;
        Ok(())
    }

    /// Get the dividend for a (ticker, reference date) pair.
    pub async fn get_dividend(
        &self,
        ticker: &str,
        reference_date: NaiveDate,
    ) -> Result<Option<Dividend>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, data_referencia, dividendo, created_at
            FROM fii_dividends
            WHERE ticker = ? AND data_referencia = ?
            "#,
        )
        .bind(ticker)
        .bind(reference_date.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch dividend")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_dividend(&row)?)),
            None => Ok(None),
        }
    }

    /// List all dividends for a ticker, oldest first.
    pub async fn list_dividends(&self, ticker: &str) -> Result<Vec<Dividend>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, data_referencia, dividendo, created_at
            FROM fii_dividends
            WHERE ticker = ?
            ORDER BY data_referencia
            "#,
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list dividends")?;

        rows.iter().map(Self::row_to_dividend).collect()
    }

    /// Get the most recent dividend for a ticker.
    pub async fn latest_dividend(&self, ticker: &str) -> Result<Option<Dividend>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, data_referencia, dividendo, created_at
            FROM fii_dividends
            WHERE ticker = ?
            ORDER BY data_referencia DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest dividend")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_dividend(&row)?)),
            None => Ok(None),
        }
    }

    /// List every dividend in the store, ordered by ticker then date.
    pub async fn list_all_dividends(&self) -> Result<Vec<Dividend>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, data_referencia, dividendo, created_at
            FROM fii_dividends
            ORDER BY ticker, data_referencia
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list all dividends")?;

        rows.iter().map(Self::row_to_dividend).collect()
    }

    /// Sum of dividends for a ticker within a reference-date range
    /// (inclusive bounds).
    pub async fn sum_dividends(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<f64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(dividendo), 0.0) as total
            FROM fii_dividends
            WHERE ticker = ? AND data_referencia >= ? AND data_referencia <= ?
            "#,
        )
        .bind(ticker)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum dividends")?;

        Ok(row.get("total"))
    }

    fn row_to_dividend(row: &sqlx::sqlite::SqliteRow) -> Result<Dividend> {
        let date_str: String = row.get("data_referencia");
        let created_at_str: String = row.get("created_at");

        Ok(Dividend {
            ticker: row.get("ticker"),
            reference_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .context("Invalid reference date")?,
            dividendo: row.get("dividendo"),
            created_at: parse_created_at(&created_at_str)?,
        })
    }

    // ========================
    // Integrity operations
    // ========================

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let fund_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM fund_registry")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let metrics_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM fii_metrics")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let dividend_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM fii_dividends")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        // Tickers with history but no registry row. The schema has no
        // foreign keys, so this can only be detected after the fact.
        let orphan_metric_tickers: Vec<String> = sqlx::query(
            r#"
            SELECT DISTINCT m.ticker as ticker
            FROM fii_metrics m
            WHERE NOT EXISTS (SELECT 1 FROM fund_registry f WHERE f.ticker = m.ticker)
            ORDER BY m.ticker
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.get("ticker"))
        .collect();

        let orphan_dividend_tickers: Vec<String> = sqlx::query(
            r#"
            SELECT DISTINCT d.ticker as ticker
            FROM fii_dividends d
            WHERE NOT EXISTS (SELECT 1 FROM fund_registry f WHERE f.ticker = d.ticker)
            ORDER BY d.ticker
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.get("ticker"))
        .collect();

        let negative_dividends: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM fii_dividends
            WHERE dividendo < 0
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            fund_count,
            metrics_count,
            dividend_count,
            orphan_metric_tickers,
            orphan_dividend_tickers,
            negative_dividends,
        })
    }
}

/// Rows written by this crate carry RFC 3339 timestamps; rows created by
/// ad-hoc SQL fall back to the schema default (`YYYY-MM-DD HH:MM:SS`).
fn parse_created_at(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .context("Invalid created_at timestamp")?;
    Ok(naive.and_utc())
}
