//! Replays the stock ledger of every product and variant and compares it
//! with the stored on-hand counters. Exits with status 1 on any divergence.

use anyhow::{Context, Result};
use clap::Parser;
use stock_ledger_api::{
    config,
    db::{self, DbConfig},
    services::{stock::StockTarget, stock_movements::audit_ledger},
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "ledger-audit", about = "Verify stock counters against the movement ledger")]
struct Cli {
    /// Database to audit. Defaults to the configured `database_url`.
    #[arg(long)]
    database_url: Option<String>,

    /// Emit one JSON document instead of a table
    #[arg(long)]
    json: bool,

    /// Only report targets whose counter disagrees with the ledger
    #[arg(long)]
    divergent_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_tracing("warn", false);

    let database_url = match cli.database_url {
        Some(url) => url,
        None => {
            config::load_config()
                .context("no --database-url given and configuration could not be loaded")?
                .database_url
        }
    };

    let pool = db::establish_connection_with_config(&DbConfig {
        url: database_url,
        ..DbConfig::default()
    })
    .await
    .context("failed to connect to the database")?;

    let checks = audit_ledger(&pool).await.context("ledger audit failed")?;
    let divergent = checks.iter().filter(|c| !c.consistent).count();
    info!(checked = checks.len(), divergent, "Ledger audit finished");

    let report: Vec<_> = checks
        .iter()
        .filter(|c| !cli.divergent_only || !c.consistent)
        .collect();

    if cli.json {
        let body = serde_json::json!({
            "checked": checks.len(),
            "divergent": divergent,
            "results": report,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{:<8} {:<36} {:>10} {:>10}  STATUS", "KIND", "ID", "STOCK", "LEDGER");
        for check in &report {
            let kind = match check.target {
                StockTarget::Product(_) => "product",
                StockTarget::Variant(_) => "variant",
            };
            println!(
                "{:<8} {:<36} {:>10} {:>10}  {}",
                kind,
                check.target.id(),
                check.stock,
                check.ledger_sum,
                if check.consistent { "ok" } else { "DIVERGED" }
            );
        }
        println!("{} checked, {} divergent", checks.len(), divergent);
    }

    if divergent > 0 {
        std::process::exit(1);
    }
    Ok(())
}
