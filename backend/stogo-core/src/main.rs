// src/main.rs

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stogo_core::config::load_network_config as load_config_file;
use stogo_core::csv_io::{read_payroll_records, read_rows, write_json, write_records};
use stogo_core::invoice::{
    InvoiceGroup, INVOICE_DETAIL_COLUMNS, INVOICE_FEED_COLUMNS, PRODUCTIVITY_COLUMNS,
};
use stogo_core::payroll::PAYROLL_COLUMNS;
use stogo_core::rule_store::{load_network_config, HttpRuleStoreConfig};
use stogo_core::server::{run_server, AppState};
use stogo_core::{
    AppConfig, HttpRuleStore, InvoiceInputs, InvoiceTransformer, NetworkConfig, PayrollInputs,
    PayrollOutputRecord, PayrollTransformer,
};

#[derive(Parser, Debug)]
#[command(name = "stogo-core", version, about = "Timecard → payroll → invoice transforms")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve,

    /// Turn a timecard extract into the payroll file. The full records,
    /// incentive flags included, are also written next to it as JSON.
    Payroll {
        #[command(flatten)]
        source: ConfigSource,
        #[arg(long)]
        timecards: PathBuf,
        #[arg(long)]
        crosswalk: PathBuf,
        #[arg(long)]
        facilities: Option<PathBuf>,
        #[arg(long)]
        shifts: Option<PathBuf>,
        /// Any date inside the selected Sunday–Saturday pay week (YYYY-MM-DD).
        #[arg(long)]
        pay_period_start: NaiveDate,
        #[arg(long)]
        out: PathBuf,
    },

    /// Build main and micro invoices from one or more payroll files.
    Invoice {
        #[command(flatten)]
        source: ConfigSource,
        /// Payroll file per period (the `.json` records or the CSV); repeat
        /// for each period.
        #[arg(long = "payroll", required = true)]
        payroll: Vec<PathBuf>,
        /// Previously generated invoice detail files.
        #[arg(long)]
        history: Vec<PathBuf>,
        #[arg(long)]
        invoice_date: NaiveDate,
        #[arg(long)]
        out_dir: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct ConfigSource {
    /// Network configuration JSON file.
    #[arg(long, conflicts_with = "client")]
    config: Option<PathBuf>,
    /// Client name resolved through the configured rule store.
    #[arg(long)]
    client: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let app_config = AppConfig::from_env().context("Failed to load STOGO_* configuration")?;

    match cli.command {
        Command::Serve => {
            let state = AppState::from_config(&app_config)?;
            run_server(&app_config, state).await?;
        }
        Command::Payroll {
            source,
            timecards,
            crosswalk,
            facilities,
            shifts,
            pay_period_start,
            out,
        } => {
            let records_path = out.with_extension("json");
            if records_path == out {
                bail!("--out names the payroll CSV; use an extension other than .json");
            }
            let network = resolve_network_config(&source, &app_config).await?;
            let inputs = PayrollInputs {
                timecards: read_rows(&timecards)
                    .with_context(|| format!("Reading timecards {:?}", timecards))?,
                crosswalk: read_rows(&crosswalk)
                    .with_context(|| format!("Reading crosswalk {:?}", crosswalk))?,
                facilities: read_optional_rows(facilities.as_deref())?,
                shifts: read_optional_rows(shifts.as_deref())?,
                pay_period_start,
            };

            let run = PayrollTransformer::new(network.payroll).run(&inputs);
            if !run.summary.negative_pay_hours.is_empty() {
                warn!(
                    "Review negative pay hours on timecards: {}",
                    run.summary.negative_pay_hours.join(", ")
                );
            }
            let written = write_records(
                &out,
                &PAYROLL_COLUMNS,
                run.records.iter().map(PayrollOutputRecord::export_row),
            )?;
            write_json(&records_path, &run.records)?;
            info!(
                "Wrote {} payroll rows to {:?} (records in {:?})",
                written, out, records_path
            );
        }
        Command::Invoice {
            source,
            payroll,
            history,
            invoice_date,
            out_dir,
        } => {
            let network = resolve_network_config(&source, &app_config).await?;

            let mut periods = Vec::with_capacity(payroll.len());
            for path in &payroll {
                periods.push(
                    read_payroll_records(path)
                        .with_context(|| format!("Reading payroll {:?}", path))?,
                );
            }
            let mut history_rows = Vec::new();
            for path in &history {
                history_rows.extend(
                    read_rows(path).with_context(|| format!("Reading history {:?}", path))?,
                );
            }

            let inputs = InvoiceInputs {
                periods,
                history: history_rows,
                invoice_date,
            };
            let run = InvoiceTransformer::new(network.invoice).run(&inputs);

            fs::create_dir_all(&out_dir)
                .with_context(|| format!("Creating output directory {:?}", out_dir))?;
            write_group(&out_dir, &run.main)?;
            write_group(&out_dir, &run.secondary)?;
            info!(
                "Next invoice sequences: main={}, micro={}",
                run.next_main_sequence, run.next_secondary_sequence
            );
        }
    }

    Ok(())
}

async fn resolve_network_config(source: &ConfigSource, app: &AppConfig) -> Result<NetworkConfig> {
    if let Some(path) = source.config.as_ref().or(app.network_config.as_ref()) {
        return Ok(load_config_file(path)?);
    }
    let Some(client) = &source.client else {
        bail!("Pass --config <file> or --client <name> (or set STOGO_NETWORK_CONFIG)");
    };
    let Some(url) = &app.rule_store_url else {
        bail!("--client requires STOGO_RULE_STORE_URL to be set");
    };
    let store = HttpRuleStore::new(HttpRuleStoreConfig {
        base_url: url.clone(),
        cache_dir: app.cache_dir.clone(),
        cache_duration_secs: app.cache_duration_secs,
    })?;
    load_network_config(&store, client)
        .await
        .with_context(|| format!("Loading rules for client '{}'", client))
}

fn read_optional_rows(path: Option<&Path>) -> Result<Vec<stogo_core::Row>> {
    match path {
        Some(path) => read_rows(path).with_context(|| format!("Reading {:?}", path)),
        None => Ok(Vec::new()),
    }
}

fn write_group(out_dir: &Path, group: &InvoiceGroup) -> Result<()> {
    let label = group.kind.label();
    write_records(
        out_dir.join(format!("{}_invoice_detail.csv", label)),
        &INVOICE_DETAIL_COLUMNS,
        group.details.iter().map(|r| r.export_row()),
    )?;
    write_records(
        out_dir.join(format!("{}_invoice_feed.csv", label)),
        &INVOICE_FEED_COLUMNS,
        group.feed.iter().map(|r| r.export_row()),
    )?;
    write_records(
        out_dir.join(format!("{}_productivity.csv", label)),
        &PRODUCTIVITY_COLUMNS,
        group.productivity.iter().map(|r| r.export_row()),
    )?;
    info!(
        "Invoice {} ({}): {} lines, total {}",
        group.invoice_number,
        label,
        group.len(),
        group.total_amount
    );
    Ok(())
}
