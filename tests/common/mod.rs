// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use fiistore::application::FundService;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(FundService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = FundService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Test fixture: a small seeded registry
pub struct SeededRegistry;

impl SeededRegistry {
    pub const MXRF_CNPJ: &'static str = "97.521.225/0001-25";
    pub const HGLG_CNPJ: &'static str = "11.728.688/0001-47";

    /// Register MXRF11 and HGLG11
    pub async fn create_basic(service: &FundService) -> Result<()> {
        service
            .register_fund(Self::MXRF_CNPJ, "MXRF11", Some("Maxi Renda FII".into()))
            .await?;
        service
            .register_fund(Self::HGLG_CNPJ, "HGLG11", Some("CSHG Logística FII".into()))
            .await?;
        Ok(())
    }
}
