use std::error::Error;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use shelfwatch::catalog::CatalogSnapshot;
use shelfwatch::config::Config;
use shelfwatch::core::pipeline::{PipelineInput, PipelineOutput, run_pipeline};
use shelfwatch::core::{AlertId, AlertPriority, AlertStatus, AlertType};
use shelfwatch::db::SharedDatabase;
use shelfwatch::engine::AlertEngine;
use shelfwatch::notifications::Notifier;
use shelfwatch::query::{AlertFilter, Pagination};

/// Shelf-monitoring alert engine.
#[derive(Parser, Debug)]
#[command(name = "shelfwatch", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "shelfwatch.toml")]
    config: PathBuf,

    /// Override the database path from the configuration
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest detection reports (JSON, JSON array or JSON lines). Reads stdin when no files are given.
    Ingest { files: Vec<PathBuf> },
    /// Acknowledge one or more alerts
    Ack {
        #[arg(long)]
        actor: String,
        /// Recorded in the history; only valid with a single id
        #[arg(long)]
        note: Option<String>,
        #[arg(required = true)]
        ids: Vec<AlertId>,
    },
    /// Resolve one or more alerts
    Resolve {
        #[arg(long)]
        actor: String,
        /// Recorded in the history; only valid with a single id
        #[arg(long)]
        note: Option<String>,
        #[arg(required = true)]
        ids: Vec<AlertId>,
    },
    /// Assign an alert to a staff member
    Assign {
        id: AlertId,
        staff: String,
        #[arg(long)]
        actor: String,
    },
    /// Append a note to an alert's history
    Note {
        id: AlertId,
        text: String,
        #[arg(long)]
        actor: String,
    },
    /// List alerts, newest first
    List {
        #[arg(long)]
        status: Option<AlertStatus>,
        #[arg(long)]
        priority: Option<AlertPriority>,
        #[arg(long = "type")]
        alert_type: Option<AlertType>,
        #[arg(long)]
        shelf: Option<String>,
        #[arg(long)]
        staff: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Unresolved alerts assigned to a staff member
    Dashboard { staff: String },
    /// Audit trail of an alert, oldest first
    History { id: AlertId },
    /// Show a single alert
    Show { id: AlertId },
    /// Aggregate counts over all alerts
    Stats,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries JSON results; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("shelfwatch={}", cli.log_level))),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load(&cli.config);
    if let Some(ref path) = cli.database {
        config.database.path = path.display().to_string();
    }

    let db = open_database(&config)?;
    seed_catalog(&db, &config);
    let snapshot = CatalogSnapshot::load_from_db(&db)?;
    let engine = AlertEngine::with_snapshot(&config, db, snapshot);

    match cli.command {
        Command::Ingest { files } => ingest(engine, &config, &files),
        Command::Ack { actor, note, ids } => {
            check_note(&ids, note.as_deref())?;
            match ids.as_slice() {
                [id] => print_json(&engine.acknowledge(*id, &actor, note.as_deref())?),
                _ => print_json(&engine.acknowledge_many(&ids, &actor)?),
            }
        }
        Command::Resolve { actor, note, ids } => {
            check_note(&ids, note.as_deref())?;
            match ids.as_slice() {
                [id] => print_json(&engine.resolve(*id, &actor, note.as_deref())?),
                _ => print_json(&engine.resolve_many(&ids, &actor)?),
            }
        }
        Command::Assign { id, staff, actor } => print_json(&engine.assign(id, &staff, &actor)?),
        Command::Note { id, text, actor } => print_json(&engine.add_note(id, &actor, &text)?),
        Command::List {
            status,
            priority,
            alert_type,
            shelf,
            staff,
            limit,
            offset,
        } => {
            let filter = AlertFilter {
                status,
                priority,
                alert_type,
                shelf_id: shelf,
                assigned_staff: staff,
                ..Default::default()
            };
            print_json(&engine.list_alerts(&filter, Pagination { limit, offset })?)
        }
        Command::Dashboard { staff } => print_json(&engine.dashboard(&staff)?),
        Command::History { id } => print_json(&engine.history(id)?),
        Command::Show { id } => print_json(&engine.get_alert(id)?),
        Command::Stats => print_json(&engine.statistics()?),
    }
}

/// Bulk transitions carry no note, so refuse one rather than drop it.
fn check_note(ids: &[AlertId], note: Option<&str>) -> Result<(), String> {
    if note.is_some() && ids.len() > 1 {
        return Err("--note applies to a single alert id".to_string());
    }
    Ok(())
}

fn open_database(config: &Config) -> Result<SharedDatabase, Box<dyn Error>> {
    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let db = SharedDatabase::open(db_path, Duration::from_millis(config.database.busy_timeout_ms))?;
    tracing::info!("Alert database opened at {}", config.database.path);
    Ok(db)
}

/// Load shelf, inventory and staff CSVs if they exist. Failures are logged, not fatal.
fn seed_catalog(db: &SharedDatabase, config: &Config) {
    type Loader = fn(&SharedDatabase, &Path) -> Result<usize, Box<dyn Error>>;
    let sources: [(&Option<String>, &str, Loader); 3] = [
        (&config.database.shelves_csv, "shelves", SharedDatabase::load_shelves_from_csv),
        (&config.database.inventory_csv, "inventory placements", SharedDatabase::load_inventory_from_csv),
        (&config.database.staff_csv, "staff members", SharedDatabase::load_staff_from_csv),
    ];
    for (path, what, load) in sources {
        let Some(path) = path.as_deref().map(Path::new) else {
            continue;
        };
        if !path.exists() {
            continue;
        }
        match load(db, path) {
            Ok(count) => tracing::info!("Loaded {count} {what} from {}", path.display()),
            Err(e) => tracing::warn!("Failed to load {}: {e}", path.display()),
        }
    }
}

fn ingest(engine: AlertEngine, config: &Config, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut parsed = Vec::new();
    if files.is_empty() {
        let mut content = String::new();
        std::io::stdin().read_to_string(&mut content)?;
        parsed.extend(read_payloads("stdin", &content));
    }
    for file in files {
        let content = std::fs::read_to_string(file)?;
        parsed.extend(read_payloads(&file.display().to_string(), &content));
    }

    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let mut results = Vec::new();
    for item in parsed {
        match item {
            Ok(input) => in_tx.send(input)?,
            Err(rejected) => results.push(rejected),
        }
    }
    drop(in_tx);

    let engine = Arc::new(engine);
    let notifier = Arc::new(Notifier::new(&config.notifications));
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_pipeline(in_rx, out_tx, engine, notifier, config.pipeline.max_in_flight));

    while let Ok(message) = out_rx.try_recv() {
        results.push(message);
    }
    print_json(&results)
}

/// A whole document (object or array of objects), or JSON lines.
fn read_payloads(source: &str, content: &str) -> Vec<Result<PipelineInput, PipelineOutput>> {
    if let Ok(document) = serde_json::from_str::<Value>(content) {
        return match document {
            Value::Array(payloads) => payloads
                .into_iter()
                .enumerate()
                .map(|(i, payload)| {
                    Ok(PipelineInput {
                        source: format!("{source}[{i}]"),
                        payload,
                    })
                })
                .collect(),
            payload => vec![Ok(PipelineInput {
                source: source.to_string(),
                payload,
            })],
        };
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let source = format!("{source}:{}", i + 1);
            match serde_json::from_str(line) {
                Ok(payload) => Ok(PipelineInput { source, payload }),
                Err(e) => Err(PipelineOutput::Rejected {
                    source,
                    kind: "parse".to_string(),
                    error: e.to_string(),
                }),
            }
        })
        .collect()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
