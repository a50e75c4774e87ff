use std::path::PathBuf;
use std::process;
use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use ppe_ledger::*;
use rust_decimal::Decimal;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "ppe-cli")]
#[command(about = "PPE Ledger CLI - issue, transfer and audit protective equipment records")]
#[command(version = "1.0.0")]
struct Cli {
    /// Journal file holding the ledger (overrides PPE_LEDGER_PATH)
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Id scheme: inventory or generated (overrides PPE_ID_SCHEME)
    #[arg(long, global = true)]
    id_scheme: Option<IdScheme>,

    /// Log filter, e.g. "debug" or "ppe_ledger=trace" (overrides PPE_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FieldArgs {
    /// Employee full name
    #[arg(long)]
    owner_name: String,

    /// Employee personnel number
    #[arg(long)]
    owner_id: String,

    /// Equipment name
    #[arg(long)]
    name: String,

    /// Unit price, at most two decimal places
    #[arg(long)]
    price: Decimal,

    /// Date the item entered service (YYYY-MM-DD)
    #[arg(long)]
    start_date: NaiveDate,

    /// Service life in months
    #[arg(long)]
    lifetime: u32,
}

impl From<FieldArgs> for AssetFields {
    fn from(args: FieldArgs) -> Self {
        AssetFields {
            owner_name: args.owner_name,
            owner_employee_id: args.owner_id,
            equipment_name: args.name,
            unit_price: args.price,
            start_use_date: args.start_date,
            lifetime_months: args.lifetime,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a new asset
    Create {
        /// Inventory number (omit under the generated id scheme)
        #[arg(long)]
        id: Option<String>,

        #[command(flatten)]
        fields: FieldArgs,

        /// Subsidiary the asset is issued at
        #[arg(long)]
        subsidiary: String,
    },

    /// Print the current value of an asset
    Read { id: String },

    /// Print whether an asset currently exists
    Exists { id: String },

    /// Replace the mutable attributes of an asset
    Update {
        id: String,

        #[command(flatten)]
        fields: FieldArgs,

        /// Status correction (InService or Retired)
        #[arg(long)]
        status: Option<AssetStatus>,

        /// Subsidiary correction
        #[arg(long)]
        subsidiary: Option<String>,
    },

    /// Delete an asset; its history is kept
    Delete { id: String },

    /// Propose moving an asset to another subsidiary
    Transfer {
        id: String,

        /// Destination subsidiary
        #[arg(long)]
        to: String,

        #[arg(long, default_value = "")]
        note: String,
    },

    /// Confirm a proposed transfer
    ApplyTransfer {
        id: String,

        /// Status after the move (in-service or retired)
        #[arg(long, default_value = "in-service")]
        status: AssetStatus,
    },

    /// List all live assets
    List,

    /// Print every version of an asset, oldest first
    History { id: String },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(path) = cli.ledger {
        settings.ledger_path = path;
    }
    if let Some(scheme) = cli.id_scheme {
        settings.id_scheme = scheme;
    }
    if let Some(filter) = cli.log_level {
        settings.log_filter = filter;
    }
    ppe_ledger::telemetry::init(&settings.log_filter)?;

    let ledger = JournalLedger::open(&settings.ledger_path)
        .with_context(|| format!("opening ledger {}", settings.ledger_path.display()))?;
    let registry = AssetRegistry::new(settings.id_scheme);

    match cli.command {
        Commands::Create { id, fields, subsidiary } => {
            let record = registry.create(&ledger, id.as_deref(), fields.into(), &subsidiary)?;
            print_json(&record_json(&record)?)
        }
        Commands::Read { id } => print_json(&record_json(&registry.read(&ledger, &id)?)?),
        Commands::Exists { id } => {
            println!("{}", registry.exists(&ledger, &id));
            Ok(())
        }
        Commands::Update { id, fields, status, subsidiary } => {
            let update = AssetUpdate {
                fields: fields.into(),
                status,
                current_subsidiary: subsidiary,
            };
            print_json(&record_json(&registry.update(&ledger, &id, update)?)?)
        }
        Commands::Delete { id } => {
            registry.delete(&ledger, &id)?;
            println!("Deleted: {}", id);
            Ok(())
        }
        Commands::Transfer { id, to, note } => {
            print_json(&record_json(&registry.transfer(&ledger, &id, &to, &note)?)?)
        }
        Commands::ApplyTransfer { id, status } => {
            print_json(&record_json(&registry.apply_transfer(&ledger, &id, status)?)?)
        }
        Commands::List => {
            let records = registry
                .list(&ledger)?
                .map(|r| record_json(&r))
                .collect::<anyhow::Result<Vec<_>>>()?;
            print_json(&Value::Array(records))
        }
        Commands::History { id } => {
            let entries = registry
                .history(&ledger, &id)?
                .iter()
                .map(history_json)
                .collect::<anyhow::Result<Vec<_>>>()?;
            print_json(&Value::Array(entries))
        }
    }
}

/// The canonical encoding, reparsed so it can be pretty-printed.
fn record_json(record: &AssetRecord) -> anyhow::Result<Value> {
    let bytes = encode(record)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn history_json(entry: &HistoryEntry) -> anyhow::Result<Value> {
    let state = match &entry.state {
        Version::Record(record) => record_json(record)?,
        Version::Tombstone => json!("tombstone"),
        Version::Unreadable { reason } => json!({ "unreadable": reason }),
    };
    Ok(json!({ "version": entry.version.as_str(), "state": state }))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
