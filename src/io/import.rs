use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Read;

use crate::application::FundService;
use crate::domain::{Dividend, MetricsSnapshot, book_value_per_share, normalize_cnpj};

const COL_CNPJ: &str = "CNPJ_Fundo_Classe";
const COL_DATE: &str = "Data_Referencia";
const COL_VERSION: &str = "Versao";

/// Dividend value columns in priority order; the first one present wins.
const DIVIDEND_COLUMNS: [&str; 3] = [
    "Rendimento_Distribuido",
    "Rendimento_Cota",
    "Dividendos_Distribuidos",
];

/// Result of ingesting a set of CVM monthly reports
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Distinct (cnpj, reference date) rows after the merge and
    /// latest-version filter.
    pub rows_processed: usize,
    pub metrics_written: usize,
    pub dividends_written: usize,
    /// Rows whose CNPJ has no ticker in the registry.
    pub skipped_unmapped: usize,
    pub errors: Vec<IngestError>,
}

/// Error that occurred while writing a merged report row
#[derive(Debug, Clone)]
pub struct IngestError {
    pub ticker: String,
    pub reference_date: NaiveDate,
    pub error: String,
}

/// Options for ingestion
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Parse and merge, but write nothing.
    pub dry_run: bool,
}

/// A raw report row: trimmed header name -> cell value.
type ReportRow = HashMap<String, String>;

/// Importer for loading CVM monthly-report CSVs into the store.
///
/// The monthly "informe mensal" comes as three semicolon-delimited files
/// (geral, ativo/passivo, complemento) sharing the key columns
/// (CNPJ_Fundo_Classe, Data_Referencia, Versao). They are outer-merged on
/// that key, reduced to the highest Versao per (CNPJ, reference date), and
/// resolved to tickers through the registry. Writes use merge-duplicates
/// semantics so re-ingesting an overlapping month is idempotent.
pub struct Importer<'a> {
    service: &'a FundService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a FundService) -> Self {
        Self { service }
    }

    /// Ingest one month's worth of CVM report files.
    pub async fn ingest_cvm_reports<R: Read>(
        &self,
        geral: R,
        ativo: R,
        complemento: R,
        options: IngestOptions,
    ) -> Result<IngestReport> {
        let geral = read_report_csv(geral).context("Failed to read geral report")?;
        let ativo = read_report_csv(ativo).context("Failed to read ativo report")?;
        let complemento =
            read_report_csv(complemento).context("Failed to read complemento report")?;

        let merged = merge_report_rows(vec![geral, ativo, complemento]);
        let rows = filter_latest_versions(merged);

        let ticker_map = self.service.registry_ticker_map().await?;

        let mut report = IngestReport {
            rows_processed: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let Some(cnpj) = non_empty(&row, COL_CNPJ) else {
                continue;
            };
            // Some feeds carry bare-digit CNPJs; the registry stores the
            // punctuated form.
            let cnpj = normalize_cnpj(&cnpj).unwrap_or(cnpj);
            let Some(reference_date) = non_empty(&row, COL_DATE).and_then(parse_report_date)
            else {
                continue;
            };

            let Some(ticker) = ticker_map.get(&cnpj) else {
                report.skipped_unmapped += 1;
                continue;
            };

            let patrimonio = first_numeric(&row, &["Patrimonio_Liquido"]);
            let cotas = first_numeric(&row, &["Cotas_Emitidas"]);
            let cotistas = first_numeric(&row, &["Numero_Cotistas"]).map(|n| n as i64);
            let vpa = book_value_per_share(patrimonio, cotas);

            let mut snapshot = MetricsSnapshot::new(ticker.clone(), reference_date);
            snapshot.patrimonio_liquido = patrimonio;
            snapshot.valor_patrimonial_cota = vpa;
            snapshot.numero_cotistas = cotistas;

            if !options.dry_run {
                if let Err(e) = self.service.ingest_metrics(&snapshot).await {
                    report.errors.push(IngestError {
                        ticker: ticker.clone(),
                        reference_date,
                        error: format!("Metrics write failed: {}", e),
                    });
                    continue;
                }
            }
            report.metrics_written += 1;

            // Rows without a distributed amount carry no dividend record.
            let Some(dividendo) = first_numeric(&row, &DIVIDEND_COLUMNS).filter(|d| *d > 0.0)
            else {
                continue;
            };

            let dividend = Dividend::new(ticker.clone(), reference_date, dividendo);

            if !options.dry_run {
                if let Err(e) = self.service.ingest_dividend(&dividend).await {
                    report.errors.push(IngestError {
                        ticker: ticker.clone(),
                        reference_date,
                        error: format!("Dividend write failed: {}", e),
                    });
                    continue;
                }
            }
            report.dividends_written += 1;
        }

        Ok(report)
    }
}

/// Read a semicolon-delimited CVM report into raw rows keyed by trimmed
/// header names. The three report files carry different column sets, so
/// rows are kept as maps instead of a fixed record type.
fn read_report_csv<R: Read>(reader: R) -> Result<Vec<ReportRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.context("CSV parse error")?;
        let row: ReportRow = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(header, value)| (header.clone(), value.trim().to_string()))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

/// Outer-merge report files on (CNPJ, reference date, version): rows with
/// the same key are combined field-wise, later files filling in columns
/// the earlier ones lack.
fn merge_report_rows(files: Vec<Vec<ReportRow>>) -> Vec<ReportRow> {
    let mut merged: Vec<ReportRow> = Vec::new();
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();

    for rows in files {
        for row in rows {
            let key = (
                row.get(COL_CNPJ).cloned().unwrap_or_default(),
                row.get(COL_DATE).cloned().unwrap_or_default(),
                row.get(COL_VERSION).cloned().unwrap_or_default(),
            );

            match index.get(&key).copied() {
                Some(i) => {
                    let target = &mut merged[i];
                    for (header, value) in row {
                        target.entry(header).or_insert(value);
                    }
                }
                None => {
                    index.insert(key, merged.len());
                    merged.push(row);
                }
            }
        }
    }

    merged
}

/// Keep only the highest version per (CNPJ, reference date), dropping rows
/// without both key fields. Reports are re-published with incremented
/// Versao when corrected, and only the latest filing counts.
fn filter_latest_versions(rows: Vec<ReportRow>) -> Vec<ReportRow> {
    let mut latest: HashMap<(String, String), (Option<f64>, ReportRow)> = HashMap::new();

    for row in rows {
        let (Some(cnpj), Some(date)) = (non_empty(&row, COL_CNPJ), non_empty(&row, COL_DATE))
        else {
            continue;
        };

        let version = non_empty(&row, COL_VERSION).and_then(|v| parse_report_number(&v));
        let key = (cnpj, date);

        let replace = match latest.get(&key) {
            Some((existing, _)) => version > *existing,
            None => true,
        };
        if replace {
            latest.insert(key, (version, row));
        }
    }

    let mut rows: Vec<ReportRow> = latest.into_values().map(|(_, row)| row).collect();
    // Deterministic output order for reports and tests
    rows.sort_by(|a, b| {
        let ka = (a.get(COL_CNPJ), a.get(COL_DATE));
        let kb = (b.get(COL_CNPJ), b.get(COL_DATE));
        ka.cmp(&kb)
    });
    rows
}

fn non_empty(row: &ReportRow, column: &str) -> Option<String> {
    row.get(column)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// First parseable numeric value among the given columns.
fn first_numeric(row: &ReportRow, columns: &[&str]) -> Option<f64> {
    columns
        .iter()
        .filter_map(|column| non_empty(row, column))
        .find_map(|value| parse_report_number(&value))
}

/// Parse a CVM numeric cell. Malformed values are treated as absent, the
/// way the original feed's blanks are.
fn parse_report_number(value: &str) -> Option<f64> {
    let normalized = value.trim().replace(',', ".");
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a CVM reference date. The feed uses ISO dates, occasionally with
/// a time component; Brazilian day-first dates show up in older files.
fn parse_report_date(value: String) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(value, "%d/%m/%Y").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> ReportRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_report_number() {
        assert_eq!(parse_report_number("1234.56"), Some(1234.56));
        assert_eq!(parse_report_number("1234,56"), Some(1234.56));
        assert_eq!(parse_report_number(" 42 "), Some(42.0));
        assert_eq!(parse_report_number("n/a"), None);
        assert_eq!(parse_report_number(""), None);
    }

    #[test]
    fn test_parse_report_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(parse_report_date("2024-01-31".into()), Some(expected));
        assert_eq!(
            parse_report_date("2024-01-31 00:00:00".into()),
            Some(expected)
        );
        assert_eq!(parse_report_date("31/01/2024".into()), Some(expected));
        assert_eq!(parse_report_date("not-a-date".into()), None);
    }

    #[test]
    fn test_merge_fills_missing_columns() {
        let geral = vec![row(&[
            (COL_CNPJ, "97.521.225/0001-25"),
            (COL_DATE, "2024-01-31"),
            (COL_VERSION, "1"),
            ("Numero_Cotistas", "1000"),
        ])];
        let complemento = vec![row(&[
            (COL_CNPJ, "97.521.225/0001-25"),
            (COL_DATE, "2024-01-31"),
            (COL_VERSION, "1"),
            ("Patrimonio_Liquido", "5000000"),
        ])];

        let merged = merge_report_rows(vec![geral, complemento]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get("Numero_Cotistas").unwrap(), "1000");
        assert_eq!(merged[0].get("Patrimonio_Liquido").unwrap(), "5000000");
    }

    #[test]
    fn test_filter_keeps_highest_version() {
        let rows = vec![
            row(&[
                (COL_CNPJ, "97.521.225/0001-25"),
                (COL_DATE, "2024-01-31"),
                (COL_VERSION, "1"),
                ("Patrimonio_Liquido", "100"),
            ]),
            row(&[
                (COL_CNPJ, "97.521.225/0001-25"),
                (COL_DATE, "2024-01-31"),
                (COL_VERSION, "3"),
                ("Patrimonio_Liquido", "300"),
            ]),
            row(&[
                (COL_CNPJ, "97.521.225/0001-25"),
                (COL_DATE, "2024-01-31"),
                (COL_VERSION, "2"),
                ("Patrimonio_Liquido", "200"),
            ]),
        ];

        let filtered = filter_latest_versions(rows);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].get("Patrimonio_Liquido").unwrap(), "300");
    }

    #[test]
    fn test_filter_drops_rows_without_keys() {
        let rows = vec![
            row(&[(COL_DATE, "2024-01-31"), (COL_VERSION, "1")]),
            row(&[(COL_CNPJ, "97.521.225/0001-25"), (COL_VERSION, "1")]),
        ];

        assert!(filter_latest_versions(rows).is_empty());
    }

    #[test]
    fn test_versioned_row_beats_unversioned() {
        let rows = vec![
            row(&[
                (COL_CNPJ, "97.521.225/0001-25"),
                (COL_DATE, "2024-01-31"),
                ("Patrimonio_Liquido", "100"),
            ]),
            row(&[
                (COL_CNPJ, "97.521.225/0001-25"),
                (COL_DATE, "2024-01-31"),
                (COL_VERSION, "1"),
                ("Patrimonio_Liquido", "200"),
            ]),
        ];

        let filtered = filter_latest_versions(rows);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].get("Patrimonio_Liquido").unwrap(), "200");
    }

    #[test]
    fn test_first_numeric_priority_order() {
        let r = row(&[
            ("Rendimento_Cota", "0.11"),
            ("Rendimento_Distribuido", "0.10"),
        ]);
        assert_eq!(first_numeric(&r, &DIVIDEND_COLUMNS), Some(0.10));
    }

    #[test]
    fn test_read_report_csv_trims_headers() {
        let data = " CNPJ_Fundo_Classe ;Data_Referencia;Versao\n97.521.225/0001-25;2024-01-31;1\n";
        let rows = read_report_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(COL_CNPJ).unwrap(), "97.521.225/0001-25");
    }
}
