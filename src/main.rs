use anyhow::Context;
use clap::{Parser, Subcommand};
use ewaste_ledger::{Actor, ActorId, CalendarDate, Caller, Config, LedgerService, Role, Store};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ewaste-ledger", about = "Operator tasks for the e-waste ledger")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "ewaste.toml")]
    config: PathBuf,

    /// Overrides the configured database directory
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the configured default categories that do not exist yet
    Seed,
    /// Print a report as JSON
    Report {
        #[command(subcommand)]
        report: Report,
    },
}

#[derive(Subcommand)]
enum Report {
    /// Totals for one collection date (defaults to today)
    Daily {
        #[arg(long)]
        date: Option<String>,
    },
    /// Totals per calendar month
    Monthly,
    /// Suppliers ranked by the value of the items they supplied
    Suppliers,
}

// The operator runs with full privilege.
const OPERATOR: Actor = Actor {
    id: ActorId(0),
    role: Role::Admin,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let store = Store::open(&config.database_path)
        .with_context(|| format!("opening database at {}", config.database_path.display()))?;
    let service = LedgerService::with_store(store);
    let caller = Caller::authenticated(OPERATOR);

    match cli.command {
        Command::Seed => {
            let outcome = service.seed_categories(&caller, &config.seed_categories)?;
            for name in &outcome.created {
                println!("Created category {name}");
            }
            for name in &outcome.existing {
                println!("Category {name} already exists");
            }
        }
        Command::Report { report } => {
            let reports = service.reports();
            let json = match report {
                Report::Daily { date } => {
                    let date = match date {
                        Some(raw) => CalendarDate::parse("date", &raw)?,
                        None => CalendarDate::today(),
                    };
                    serde_json::to_string_pretty(&reports.daily(&caller, date)?)?
                }
                Report::Monthly => serde_json::to_string_pretty(&serde_json::json!({
                    "monthly": reports.monthly(&caller)?
                }))?,
                Report::Suppliers => serde_json::to_string_pretty(&serde_json::json!({
                    "ranking": reports.supplier_ranking(&caller)?
                }))?,
            };
            println!("{json}");
        }
    }

    service.store().flush()?;
    Ok(())
}
