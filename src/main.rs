use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use sovereign_filter::config::FilterConfig;
use sovereign_filter::nudge::generate_nudges;
use sovereign_filter::pipeline::{
    BatchQueue, InboundMessage, SovereignFilter, dispatch_with_sovereign_filter, render_digest,
};
use sovereign_filter::store::{ContactRegistry, ContactUpsert, LibSqlRegistry};

const USAGE: &str = "\
usage: sovereign-filter <command>

commands:
  route                                     read JSON-lines messages on stdin, print decisions
  nudges [hours]                            list contacts silent for longer than <hours>
  contacts                                  list all contacts
  upsert <identity> <name> [--priority] [--notes <text>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = FilterConfig::from_env().context("invalid SOVEREIGN_* configuration")?;
    let db_path = config.database_path();
    let registry = Arc::new(
        LibSqlRegistry::new_local(&db_path)
            .await
            .with_context(|| format!("failed to open registry at {}", db_path.display()))?,
    );

    match command.as_str() {
        "route" => route(&config, registry).await,
        "nudges" => {
            let hours = match args.get(1) {
                Some(raw) => raw.parse().context("hours must be a non-negative integer")?,
                None => config.nudge_after_silent_hours,
            };
            let nudges = generate_nudges(registry.as_ref(), hours).await?;
            println!("{}", serde_json::to_string_pretty(&nudges)?);
            Ok(())
        }
        "contacts" => {
            let contacts = registry.list_contacts().await?;
            println!("{}", serde_json::to_string_pretty(&contacts)?);
            Ok(())
        }
        "upsert" => {
            let upsert = parse_upsert(&args[1..])?;
            let stored = registry.upsert_contact(&upsert).await?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
            Ok(())
        }
        other => {
            eprintln!("unknown command '{other}'\n\n{USAGE}");
            std::process::exit(2);
        }
    }
}

/// Route stdin messages until EOF, then print the drained batch digest.
async fn route(config: &FilterConfig, registry: Arc<LibSqlRegistry>) -> anyhow::Result<()> {
    let queue = BatchQueue::new();
    let filter = SovereignFilter::new(registry.clone(), registry, queue.clone());

    info!(
        enabled = config.enabled,
        schedule = config
            .batch_schedule
            .as_ref()
            .map(|s| s.expression())
            .unwrap_or("unset"),
        "Routing messages from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let message: InboundMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Skipping malformed message line");
                continue;
            }
        };

        let rendered = match dispatch_with_sovereign_filter(config, &filter, &message).await {
            Ok(decision) => serde_json::to_string(&decision)?,
            Err(e) => {
                error!(error = %e, provider = %message.provider, "Filter failed for message");
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        };
        stdout.write_all(rendered.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    filter.settle_touches().await;

    let drained = queue.drain().await;
    if let Some(digest) = render_digest(&drained) {
        eprintln!("\n{digest}");
    }
    Ok(())
}

fn parse_upsert(args: &[String]) -> anyhow::Result<ContactUpsert> {
    let mut positional = Vec::new();
    let mut priority = None;
    let mut notes = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--priority" => priority = Some(true),
            "--no-priority" => priority = Some(false),
            "--notes" => match iter.next() {
                Some(text) => notes = Some(text.clone()),
                None => bail!("--notes needs a value"),
            },
            _ => positional.push(arg.clone()),
        }
    }

    let [identity, name] = positional.as_slice() else {
        bail!("upsert needs <identity> <name>\n\n{USAGE}");
    };

    let mut upsert = ContactUpsert::new(identity.clone()).display_name(name.clone());
    upsert.priority = priority;
    upsert.notes = notes;
    Ok(upsert)
}
