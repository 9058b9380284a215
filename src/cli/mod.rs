use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::application::FundService;

/// Fiistore - FII Fundamentals Store
#[derive(Parser)]
#[command(name = "fiistore")]
#[command(about = "A local-first database of Brazilian real-estate fund (FII) fundamentals")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "fiistore.db")]
    pub database: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Register a fund, or refresh the ticker/name of an existing CNPJ
    Seed {
        /// Fund/class CNPJ (e.g., "97.521.225/0001-25" or bare digits)
        cnpj: String,

        /// Trading symbol (e.g., "MXRF11")
        ticker: String,

        /// Display name of the fund/class
        name: Option<String>,
    },

    /// Fund registry commands
    #[command(subcommand)]
    Fund(FundCommands),

    /// Metrics snapshot commands
    #[command(subcommand)]
    Metrics(MetricsCommands),

    /// Dividend commands
    #[command(subcommand)]
    Dividend(DividendCommands),

    /// Ingest CVM monthly-report CSVs (geral, ativo/passivo, complemento)
    Ingest {
        /// Path to the "geral" report CSV
        geral: String,

        /// Path to the "ativo e passivo" report CSV
        ativo: String,

        /// Path to the "complemento" report CSV
        complemento: String,

        /// Parse and merge without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify registry/history consistency
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: funds, metrics, dividends, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum FundCommands {
    /// List all registered funds
    List,

    /// Show detailed fund information
    Show {
        /// Ticker
        ticker: String,
    },
}

#[derive(Subcommand)]
pub enum MetricsCommands {
    /// Record a metrics snapshot
    Add {
        /// Ticker
        ticker: String,

        /// Reference date (YYYY-MM-DD)
        date: String,

        /// Net asset value (Patrimonio Liquido), in BRL
        #[arg(long)]
        patrimonio: Option<f64>,

        /// Book value per share (Valor Patrimonial da Cota), in BRL
        #[arg(long)]
        vpa: Option<f64>,

        /// Shareholder count
        #[arg(long)]
        cotistas: Option<i64>,
    },

    /// List snapshots for a ticker
    List {
        /// Ticker
        ticker: String,
    },
}

#[derive(Subcommand)]
pub enum DividendCommands {
    /// Record a dividend distribution
    Add {
        /// Ticker
        ticker: String,

        /// Reference date (YYYY-MM-DD)
        date: String,

        /// Distributed amount per share, in BRL
        amount: f64,
    },

    /// List dividends for a ticker
    List {
        /// Ticker
        ticker: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                FundService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Seed { cnpj, ticker, name } => {
                let service = FundService::connect(&self.database).await?;
                let fund = service.register_fund(&cnpj, &ticker, name).await?;
                println!(
                    "Registered fund: {} ({}){}",
                    fund.ticker,
                    fund.cnpj,
                    fund.name
                        .as_deref()
                        .map(|n| format!(" - {}", n))
                        .unwrap_or_default()
                );
            }

            Commands::Fund(fund_cmd) => {
                let service = FundService::connect(&self.database).await?;
                run_fund_command(&service, fund_cmd).await?;
            }

            Commands::Metrics(metrics_cmd) => {
                let service = FundService::connect(&self.database).await?;
                run_metrics_command(&service, metrics_cmd).await?;
            }

            Commands::Dividend(dividend_cmd) => {
                let service = FundService::connect(&self.database).await?;
                run_dividend_command(&service, dividend_cmd).await?;
            }

            Commands::Ingest {
                geral,
                ativo,
                complemento,
                dry_run,
            } => {
                let service = FundService::connect(&self.database).await?;
                run_ingest_command(&service, &geral, &ativo, &complemento, dry_run).await?;
            }

            Commands::Check => {
                let service = FundService::connect(&self.database).await?;
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
            } => {
                let service = FundService::connect(&self.database).await?;
                run_export_command(&service, &export_type, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

async fn run_fund_command(service: &FundService, cmd: FundCommands) -> Result<()> {
    match cmd {
        FundCommands::List => {
            let funds = service.list_funds().await?;
            if funds.is_empty() {
                println!("No funds registered.");
            } else {
                println!("{:<10} {:<20} NAME", "TICKER", "CNPJ");
                println!("{}", "-".repeat(60));
                for fund in funds {
                    println!(
                        "{:<10} {:<20} {}",
                        fund.ticker,
                        fund.cnpj,
                        fund.name.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        FundCommands::Show { ticker } => {
            let info = service.get_fund_info(&ticker).await?;
            let fund = &info.fund;

            println!("Fund: {}", fund.ticker);
            println!("  CNPJ:       {}", fund.cnpj);
            if let Some(name) = &fund.name {
                println!("  Name:       {}", name);
            }
            println!(
                "  Registered: {}",
                fund.created_at.format("%Y-%m-%d %H:%M:%S")
            );

            if let Some(metrics) = &info.latest_metrics {
                println!();
                println!("  Latest snapshot ({}):", metrics.reference_date);
                println!(
                    "    Patrimonio liquido:  {}",
                    format_optional(metrics.patrimonio_liquido)
                );
                println!(
                    "    Valor patrimonial:   {}",
                    format_optional(metrics.valor_patrimonial_cota)
                );
                println!(
                    "    Cotistas:            {}",
                    metrics
                        .numero_cotistas
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }

            if let Some(dividend) = &info.latest_dividend {
                println!();
                println!(
                    "  Latest dividend:       {:.4} ({})",
                    dividend.dividendo, dividend.reference_date
                );
            }
        }
    }
    Ok(())
}

async fn run_metrics_command(service: &FundService, cmd: MetricsCommands) -> Result<()> {
    match cmd {
        MetricsCommands::Add {
            ticker,
            date,
            patrimonio,
            vpa,
            cotistas,
        } => {
            let reference_date = parse_date(&date)?;
            let snapshot = service
                .record_metrics(&ticker, reference_date, patrimonio, vpa, cotistas)
                .await?;
            println!(
                "Recorded snapshot: {} at {}",
                snapshot.ticker, snapshot.reference_date
            );
        }

        MetricsCommands::List { ticker } => {
            let snapshots = service.list_metrics(&ticker).await?;
            if snapshots.is_empty() {
                println!("No snapshots found.");
            } else {
                println!(
                    "{:<12} {:>18} {:>12} {:>12}",
                    "DATE", "PATRIMONIO", "VPA", "COTISTAS"
                );
                println!("{}", "-".repeat(58));
                for snapshot in snapshots {
                    println!(
                        "{:<12} {:>18} {:>12} {:>12}",
                        snapshot.reference_date.to_string(),
                        format_optional(snapshot.patrimonio_liquido),
                        format_optional(snapshot.valor_patrimonial_cota),
                        snapshot
                            .numero_cotistas
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_dividend_command(service: &FundService, cmd: DividendCommands) -> Result<()> {
    match cmd {
        DividendCommands::Add {
            ticker,
            date,
            amount,
        } => {
            let reference_date = parse_date(&date)?;
            let dividend = service
                .record_dividend(&ticker, reference_date, amount)
                .await?;
            println!(
                "Recorded dividend: {} {:.4} at {}",
                dividend.ticker, dividend.dividendo, dividend.reference_date
            );
        }

        DividendCommands::List { ticker } => {
            let dividends = service.list_dividends(&ticker).await?;
            if dividends.is_empty() {
                println!("No dividends found.");
            } else {
                println!("{:<12} {:>10}", "DATE", "DIVIDEND");
                println!("{}", "-".repeat(24));
                for dividend in dividends {
                    println!(
                        "{:<12} {:>10.4}",
                        dividend.reference_date.to_string(),
                        dividend.dividendo
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_ingest_command(
    service: &FundService,
    geral: &str,
    ativo: &str,
    complemento: &str,
    dry_run: bool,
) -> Result<()> {
    use crate::io::{Importer, IngestOptions};
    use std::fs::File;

    let open = |path: &str| {
        File::open(path).with_context(|| format!("Failed to open report file: {}", path))
    };

    let importer = Importer::new(service);
    let report = importer
        .ingest_cvm_reports(
            open(geral)?,
            open(ativo)?,
            open(complemento)?,
            IngestOptions { dry_run },
        )
        .await?;

    if dry_run {
        println!("Dry run - nothing written.");
    }
    println!(
        "Processed {} row(s): {} snapshot(s), {} dividend(s), {} unmapped CNPJ(s) skipped",
        report.rows_processed,
        report.metrics_written,
        report.dividends_written,
        report.skipped_unmapped
    );

    if !report.errors.is_empty() {
        println!();
        println!("{} error(s):", report.errors.len());
        for error in &report.errors {
            println!(
                "  {} {}: {}",
                error.ticker, error.reference_date, error.error
            );
        }
    }

    Ok(())
}

async fn run_check_command(service: &FundService) -> Result<()> {
    let report = service.check_integrity().await?;

    println!("Store contents:");
    println!("  Funds:     {}", report.fund_count);
    println!("  Snapshots: {}", report.metrics_count);
    println!("  Dividends: {}", report.dividend_count);
    println!();

    if report.is_clean() {
        println!("No issues found.");
    } else {
        println!("{} issue(s) found:", report.issues.len());
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }

    Ok(())
}

async fn run_export_command(
    service: &FundService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "funds" => {
            let count = exporter.export_funds_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} funds", count);
            }
        }
        "metrics" => {
            let count = exporter.export_metrics_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} snapshots", count);
            }
        }
        "dividends" => {
            let count = exporter.export_dividends_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} dividends", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} funds, {} snapshots, {} dividends",
                    snapshot.funds.len(),
                    snapshot.metrics.len(),
                    snapshot.dividends.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: funds, metrics, dividends, full",
                export_type
            );
        }
    }

    Ok(())
}
