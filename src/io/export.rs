use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::FundService;
use crate::domain::{Dividend, Fund, MetricsSnapshot};

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub funds: Vec<Fund>,
    pub metrics: Vec<MetricsSnapshot>,
    pub dividends: Vec<Dividend>,
}

/// Exporter for converting store data to various formats
pub struct Exporter<'a> {
    service: &'a FundService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a FundService) -> Self {
        Self { service }
    }

    /// Export the fund registry to CSV format
    pub async fn export_funds_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let funds = self.service.list_funds().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["cnpj_fundo_classe", "ticker", "nome_fundo_classe", "created_at"])?;

        let mut count = 0;
        for fund in &funds {
            csv_writer.write_record([
                fund.cnpj.clone(),
                fund.ticker.clone(),
                fund.name.clone().unwrap_or_default(),
                fund.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export all metrics snapshots to CSV format
    pub async fn export_metrics_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let snapshots = self.service.list_all_metrics().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "ticker",
            "data_referencia",
            "patrimonio_liquido",
            "valor_patrimonial_cota",
            "numero_cotistas",
        ])?;

        let mut count = 0;
        for snapshot in &snapshots {
            csv_writer.write_record([
                snapshot.ticker.clone(),
                snapshot.reference_date.to_string(),
                snapshot
                    .patrimonio_liquido
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                snapshot
                    .valor_patrimonial_cota
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                snapshot
                    .numero_cotistas
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export all dividends to CSV format
    pub async fn export_dividends_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let dividends = self.service.list_all_dividends().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["ticker", "data_referencia", "dividendo"])?;

        let mut count = 0;
        for dividend in &dividends {
            csv_writer.write_record([
                dividend.ticker.clone(),
                dividend.reference_date.to_string(),
                dividend.dividendo.to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export full database as JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let funds = self.service.list_funds().await?;
        let metrics = self.service.list_all_metrics().await?;
        let dividends = self.service.list_all_dividends().await?;

        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            funds,
            metrics,
            dividends,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
