use anyhow::Result;
use fiistore::Repository;
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

async fn test_pool() -> Result<(SqlitePool, Repository, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_str().unwrap());

    let repo = Repository::init(&db_url).await?;
    let pool = SqlitePool::connect(&db_url).await?;
    Ok((pool, repo, temp_dir))
}

async fn table_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|row| row.get("name")).collect())
}

#[tokio::test]
async fn test_migration_creates_expected_tables() -> Result<()> {
    let (pool, _repo, _temp) = test_pool().await?;

    let tables = table_names(&pool).await?;
    assert_eq!(tables, vec!["fii_dividends", "fii_metrics", "fund_registry"]);

    Ok(())
}

#[tokio::test]
async fn test_migration_is_idempotent() -> Result<()> {
    let (pool, repo, _temp) = test_pool().await?;

    let before = table_names(&pool).await?;

    // Re-applying the DDL must neither fail nor change the table set
    repo.migrate().await?;
    repo.migrate().await?;

    let after = table_names(&pool).await?;
    assert_eq!(before, after);

    Ok(())
}

#[tokio::test]
async fn test_migration_preserves_existing_data() -> Result<()> {
    let (pool, repo, _temp) = test_pool().await?;

    sqlx::query(
        "INSERT INTO fund_registry (cnpj_fundo_classe, ticker) VALUES ('97.521.225/0001-25', 'MXRF11')",
    )
    .execute(&pool)
    .await?;

    repo.migrate().await?;

    let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM fund_registry")
        .fetch_one(&pool)
        .await?
        .get("count");
    assert_eq!(count, 1);

    Ok(())
}

#[tokio::test]
async fn test_created_at_defaults_for_raw_inserts() -> Result<()> {
    let (pool, _repo, _temp) = test_pool().await?;

    // Rows written outside the application still get a creation timestamp
    sqlx::query(
        "INSERT INTO fund_registry (cnpj_fundo_classe, ticker) VALUES ('97.521.225/0001-25', 'MXRF11')",
    )
    .execute(&pool)
    .await?;

    let created_at: String = sqlx::query("SELECT created_at FROM fund_registry")
        .fetch_one(&pool)
        .await?
        .get("created_at");
    assert!(!created_at.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_duplicate_composite_key_rejected_by_engine() -> Result<()> {
    let (pool, _repo, _temp) = test_pool().await?;

    sqlx::query(
        "INSERT INTO fii_metrics (ticker, data_referencia, patrimonio_liquido) VALUES ('MXRF11', '2024-01-31', 1000.0)",
    )
    .execute(&pool)
    .await?;

    let result = sqlx::query(
        "INSERT INTO fii_metrics (ticker, data_referencia, patrimonio_liquido) VALUES ('MXRF11', '2024-01-31', 2000.0)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "Second insert with same key must fail");

    Ok(())
}

#[tokio::test]
async fn test_null_reference_date_rejected_by_engine() -> Result<()> {
    let (pool, _repo, _temp) = test_pool().await?;

    let result = sqlx::query(
        "INSERT INTO fii_dividends (ticker, data_referencia, dividendo) VALUES ('MXRF11', NULL, 0.1)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "NULL primary-key column must be rejected");

    Ok(())
}

#[tokio::test]
async fn test_null_cnpj_rejected_by_engine() -> Result<()> {
    let (pool, _repo, _temp) = test_pool().await?;

    let result = sqlx::query(
        "INSERT INTO fund_registry (cnpj_fundo_classe, ticker) VALUES (NULL, 'MXRF11')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_duplicate_ticker_rejected_by_engine() -> Result<()> {
    let (pool, _repo, _temp) = test_pool().await?;

    sqlx::query(
        "INSERT INTO fund_registry (cnpj_fundo_classe, ticker) VALUES ('97.521.225/0001-25', 'MXRF11')",
    )
    .execute(&pool)
    .await?;

    let result = sqlx::query(
        "INSERT INTO fund_registry (cnpj_fundo_classe, ticker) VALUES ('11.111.111/0001-11', 'MXRF11')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "unique(ticker) must reject a second CNPJ");

    Ok(())
}

#[tokio::test]
async fn test_upsert_keyed_on_cnpj_at_sql_level() -> Result<()> {
    let (pool, _repo, _temp) = test_pool().await?;

    let upsert = r#"
        INSERT INTO fund_registry (cnpj_fundo_classe, ticker, nome_fundo_classe)
        VALUES (?, ?, ?)
        ON CONFLICT(cnpj_fundo_classe) DO UPDATE SET
            ticker = excluded.ticker,
            nome_fundo_classe = excluded.nome_fundo_classe
    "#;

    sqlx::query(upsert)
        .bind("97.521.225/0001-25")
        .bind("MXRF11")
        .bind("Maxi Renda FII")
        .execute(&pool)
        .await?;

    sqlx::query(upsert)
        .bind("97.521.225/0001-25")
        .bind("MXRF11")
        .bind("Maxi Renda FII Atualizado")
        .execute(&pool)
        .await?;

    let rows = sqlx::query("SELECT ticker, nome_fundo_classe FROM fund_registry")
        .fetch_all(&pool)
        .await?;
    assert_eq!(rows.len(), 1);
    let name: String = rows[0].get("nome_fundo_classe");
    assert_eq!(name, "Maxi Renda FII Atualizado");

    Ok(())
}
