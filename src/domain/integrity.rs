/// Report produced by the `check` command.
///
/// The schema deliberately carries no foreign keys from the history tables
/// to the registry, so ticker consistency is a convention. This report
/// makes the convention observable.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub fund_count: i64,
    pub metrics_count: i64,
    pub dividend_count: i64,
    /// Tickers present in fii_metrics with no fund_registry row.
    pub orphan_metric_tickers: Vec<String>,
    /// Tickers present in fii_dividends with no fund_registry row.
    pub orphan_dividend_tickers: Vec<String>,
    /// Dividend rows with a negative amount.
    pub negative_dividends: i64,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn build_integrity_report(
    fund_count: i64,
    metrics_count: i64,
    dividend_count: i64,
    orphan_metric_tickers: Vec<String>,
    orphan_dividend_tickers: Vec<String>,
    negative_dividends: i64,
) -> IntegrityReport {
    let mut issues = Vec::new();

    if !orphan_metric_tickers.is_empty() {
        issues.push(format!(
            "{} ticker(s) in fii_metrics missing from the registry: {}",
            orphan_metric_tickers.len(),
            orphan_metric_tickers.join(", ")
        ));
    }

    if !orphan_dividend_tickers.is_empty() {
        issues.push(format!(
            "{} ticker(s) in fii_dividends missing from the registry: {}",
            orphan_dividend_tickers.len(),
            orphan_dividend_tickers.join(", ")
        ));
    }

    if negative_dividends > 0 {
        issues.push(format!(
            "{} dividend row(s) with a negative amount",
            negative_dividends
        ));
    }

    IntegrityReport {
        fund_count,
        metrics_count,
        dividend_count,
        orphan_metric_tickers,
        orphan_dividend_tickers,
        negative_dividends,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_report() {
        let report = build_integrity_report(2, 10, 8, vec![], vec![], 0);
        assert!(report.is_clean());
        assert_eq!(report.fund_count, 2);
    }

    #[test]
    fn test_orphan_tickers_flagged() {
        let report =
            build_integrity_report(1, 5, 3, vec!["XPTO11".to_string()], vec![], 0);
        assert!(!report.is_clean());
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("XPTO11"));
    }

    #[test]
    fn test_negative_dividends_flagged() {
        let report = build_integrity_report(1, 0, 4, vec![], vec![], 2);
        assert!(!report.is_clean());
        assert!(report.issues[0].contains("negative"));
    }
}
