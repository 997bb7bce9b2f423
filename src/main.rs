use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secrecy::SecretString;

use chgd_engine::{RulePolicy, Validator};
use chgd_llm::{AnthropicGenerator, ReliableGenerator};
use chgd_store::{Database, TicketRepo};
use chgd_telemetry::{init_telemetry, LogQuery, SqliteLogSink, TelemetryConfig};

/// Change ticket compliance service.
#[derive(Parser, Debug)]
#[command(name = "chgd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Path to the ticket database. Defaults to ~/.chgd/database/chgd.db.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Path to a JSON rule policy file. Defaults apply when omitted.
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Generation model override.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query warn+ logs persisted by the telemetry sink.
    Logs {
        /// Filter by level (warn, error).
        #[arg(long)]
        level: Option<String>,
        /// Filter by target module substring.
        #[arg(long)]
        target: Option<String>,
        /// Filter by correlated ticket id.
        #[arg(long)]
        ticket: Option<String>,
        /// Only records at or after this RFC 3339 timestamp.
        #[arg(long)]
        since: Option<String>,
        /// Maximum number of records, newest first.
        #[arg(long, default_value_t = 100)]
        limit: u32,
        /// Path to the log database. Defaults to ~/.chgd/database/chgd-logs.db.
        #[arg(long)]
        log_db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(Command::Logs {
        level,
        target,
        ticket,
        since,
        limit,
        log_db,
    }) = args.command
    {
        return show_logs(level, target, ticket, since, limit, log_db);
    }

    let _telemetry = init_telemetry(TelemetryConfig::default());

    tracing::info!("starting chgd");

    let db_path = match args.db_path {
        Some(path) => path,
        None => dirs_home().join(".chgd").join("database").join("chgd.db"),
    };
    let db = Database::open(&db_path).context("open database")?;

    let policy = load_policy(args.policy.as_deref())?;
    let validator = Arc::new(Validator::new(&policy));

    let repo = TicketRepo::new(db.clone());
    let seeded = validator
        .seed_if_empty(&repo)
        .context("seed ticket catalog")?;
    if seeded > 0 {
        tracing::info!(count = seeded, "seeded ticket catalog");
    } else {
        // An existing store may carry verdicts computed under an older
        // policy; recompute them before serving.
        let revalidated = chgd_engine::batch::revalidate_all(
            db.clone(),
            validator.clone(),
            chgd_engine::batch::DEFAULT_CONCURRENCY,
        )
        .await
        .context("revalidate stored tickets")?;
        tracing::info!(count = revalidated, "revalidated stored tickets");
    }

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map(SecretString::from)
        .context("ANTHROPIC_API_KEY is not set")?;
    let generator = AnthropicGenerator::new(api_key, args.model.as_deref())
        .context("build generation client")?;
    let generator = Arc::new(ReliableGenerator::with_defaults(generator));

    let config = chgd_server::ServerConfig { port: args.port };
    let handle = chgd_server::start(config, db, generator)
        .await
        .context("start server")?;

    tracing::info!(port = handle.port, "chgd ready");

    tokio::signal::ctrl_c().await.context("listen for ctrl+c")?;

    tracing::info!("shutting down");
    Ok(())
}

fn show_logs(
    level: Option<String>,
    target: Option<String>,
    ticket: Option<String>,
    since: Option<String>,
    limit: u32,
    log_db: Option<PathBuf>,
) -> anyhow::Result<()> {
    let path = log_db.unwrap_or_else(|| TelemetryConfig::default().log_db_path);
    let sink = SqliteLogSink::new(&path)
        .with_context(|| format!("open log database {}", path.display()))?;

    let query = LogQuery {
        level: level.map(|l| l.to_uppercase()),
        target,
        ticket_id: ticket,
        since,
        limit: Some(limit),
    };
    let records = sink.query(&query).context("query logs")?;
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

fn load_policy(path: Option<&std::path::Path>) -> anyhow::Result<RulePolicy> {
    let Some(path) = path else {
        return Ok(RulePolicy::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read policy file {}", path.display()))?;
    let policy = serde_json::from_str(&raw)
        .with_context(|| format!("parse policy file {}", path.display()))?;
    Ok(policy)
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
