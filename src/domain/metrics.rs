use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A fundamentals snapshot for a ticker at a reference date.
/// At most one snapshot exists per (ticker, reference_date) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ticker: String,
    /// The month the CVM report pertains to, not the ingestion time.
    pub reference_date: NaiveDate,
    /// Net asset value (Patrimonio Liquido), in BRL.
    pub patrimonio_liquido: Option<f64>,
    /// Book value per share (Valor Patrimonial da Cota), in BRL.
    pub valor_patrimonial_cota: Option<f64>,
    /// Shareholder count (Numero de Cotistas).
    pub numero_cotistas: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub fn new(ticker: String, reference_date: NaiveDate) -> Self {
        Self {
            ticker,
            reference_date,
            patrimonio_liquido: None,
            valor_patrimonial_cota: None,
            numero_cotistas: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_patrimonio_liquido(mut self, value: f64) -> Self {
        self.patrimonio_liquido = Some(value);
        self
    }

    pub fn with_valor_patrimonial_cota(mut self, value: f64) -> Self {
        self.valor_patrimonial_cota = Some(value);
        self
    }

    pub fn with_numero_cotistas(mut self, count: i64) -> Self {
        self.numero_cotistas = Some(count);
        self
    }
}

/// Derive book value per share from net asset value and shares issued.
/// Returns None unless both inputs are present and shares is positive.
pub fn book_value_per_share(patrimonio: Option<f64>, cotas_emitidas: Option<f64>) -> Option<f64> {
    match (patrimonio, cotas_emitidas) {
        (Some(pl), Some(cotas)) if cotas > 0.0 => Some(pl / cotas),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_book_value_per_share() {
        assert_eq!(
            book_value_per_share(Some(1_000_000.0), Some(100_000.0)),
            Some(10.0)
        );
    }

    #[test]
    fn test_book_value_requires_both_inputs() {
        assert_eq!(book_value_per_share(Some(1_000_000.0), None), None);
        assert_eq!(book_value_per_share(None, Some(100_000.0)), None);
        assert_eq!(book_value_per_share(None, None), None);
    }

    #[test]
    fn test_book_value_rejects_zero_shares() {
        assert_eq!(book_value_per_share(Some(1_000_000.0), Some(0.0)), None);
        assert_eq!(book_value_per_share(Some(1_000_000.0), Some(-5.0)), None);
    }

    #[test]
    fn test_snapshot_builder() {
        let snapshot = MetricsSnapshot::new("MXRF11".into(), date("2024-01-31"))
            .with_patrimonio_liquido(2_500_000_000.0)
            .with_valor_patrimonial_cota(10.12)
            .with_numero_cotistas(1_050_000);

        assert_eq!(snapshot.ticker, "MXRF11");
        assert_eq!(snapshot.numero_cotistas, Some(1_050_000));
        assert_eq!(snapshot.valor_patrimonial_cota, Some(10.12));
    }
}
