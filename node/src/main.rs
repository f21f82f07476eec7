// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use lore_kernel::{ItemDraft, StatePatch};
use lore_node::config::StoreConfig;
use lore_node::store::{ListFilter, Store};
use lore_node::telemetry::init_telemetry;
use lore_node::StoreError;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "lore-node")]
#[command(about = "Inspect and edit a lore knowledge store", long_about = None)]
struct Cli {
    /// Store directory (defaults to .lore)
    #[arg(long, short, global = true, env = "LORE_DIR")]
    dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new store.
    Init {
        #[arg(long)]
        project: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Add an item and print its ID.
    Add {
        /// lesson, decision, pattern, or any custom type
        #[arg(long = "type", short = 't')]
        item_type: String,
        oneliner: String,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long = "ref")]
        refs: Vec<String>,
    },
    /// Append a new version of an existing item.
    Update {
        id: String,
        #[arg(long)]
        oneliner: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        body: Option<String>,
        /// Replaces the reference list when given
        #[arg(long = "ref")]
        refs: Vec<String>,
    },
    /// Delete an item.
    Rm { id: String },
    /// Show one item.
    Get { id: String },
    /// List live items.
    List {
        #[arg(long = "type")]
        item_type: Option<String>,
        /// Matches topic or domain
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long, value_parser = parse_time)]
        since: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_time)]
        until: Option<DateTime<Utc>>,
    },
    /// Show the session state, or merge the given fields into it.
    State {
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        progress: Option<String>,
        #[arg(long)]
        blocker: Option<String>,
        #[arg(long)]
        next: Vec<String>,
        #[arg(long = "file")]
        working_files: Vec<String>,
        #[arg(long = "question")]
        open_questions: Vec<String>,
    },
    /// Item counts per topic.
    Topics,
    /// Rewrite the log down to live items.
    Compact,
    /// Check the snapshot against a full replay.
    Verify,
    /// Store statistics.
    Stats,
    /// Print a raw store file.
    Dump {
        #[arg(value_enum)]
        file: DumpTarget,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DumpTarget {
    Log,
    Index,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got {raw:?}"))
}

fn main() -> ExitCode {
    init_telemetry();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(store_err) = e.downcast_ref::<StoreError>() {
                if store_err.is_lock_timeout() {
                    eprintln!("error: store is busy: {store_err}");
                    return ExitCode::from(2);
                }
            }
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let out = text(value);
        if !out.is_empty() {
            println!("{out}");
        }
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = StoreConfig::from_env();
    if let Some(dir) = cli.dir {
        config.root = dir;
    }
    let json = cli.json;
    let mut store = Store::new(config);

    match cli.command {
        Commands::Init { project, description } => {
            store.init(&project, &description)?;
            let root = store.root().display().to_string();
            emit(json, &serde_json::json!({ "root": root, "project": project }), |_| {
                format!("initialized lore store in {root}")
            })
        }
        Commands::Add {
            item_type,
            oneliner,
            topic,
            domain,
            severity,
            body,
            refs,
        } => {
            let draft = ItemDraft {
                item_type,
                oneliner,
                topic,
                domain,
                severity,
                refs,
                body,
            };
            let id = store.create_item(draft)?;
            emit(json, &serde_json::json!({ "id": id }), |_| id.clone())
        }
        Commands::Update {
            id,
            oneliner,
            topic,
            domain,
            severity,
            body,
            refs,
        } => {
            let entry = store.modify_item(&id, |e| {
                if let Some(v) = oneliner {
                    e.oneliner = v;
                }
                if topic.is_some() {
                    e.topic = topic;
                }
                if domain.is_some() {
                    e.domain = domain;
                }
                if severity.is_some() {
                    e.severity = severity;
                }
                if let Some(v) = body {
                    e.body = v;
                }
                if !refs.is_empty() {
                    e.refs = refs;
                }
            })?;
            emit(json, &entry, |e| format!("updated {}", e.id))
        }
        Commands::Rm { id } => {
            store.remove(&id)?;
            emit(json, &serde_json::json!({ "removed": id }), |_| format!("removed {id}"))
        }
        Commands::Get { id } => {
            let entry = store.get(&id).with_context(|| format!("reading {id}"))?;
            emit(json, &entry, |e| {
                let mut out = format!("{} [{}] {}\ncreated: {}", e.id, e.item_type, e.oneliner, e.created.to_rfc3339());
                if let Some(c) = e.classification() {
                    out.push_str(&format!("\ntopic: {c}"));
                }
                if let Some(s) = &e.severity {
                    out.push_str(&format!("\nseverity: {s}"));
                }
                if !e.refs.is_empty() {
                    out.push_str(&format!("\nrefs: {}", e.refs.join(", ")));
                }
                if !e.body.is_empty() {
                    out.push_str("\n\n");
                    out.push_str(&e.body);
                }
                out
            })
        }
        Commands::List {
            item_type,
            topic,
            severity,
            since,
            until,
        } => {
            let filter = ListFilter {
                item_type,
                topic,
                severity,
                since,
                until,
            };
            let items = store.list(&filter)?;
            emit(json, &items, |items| {
                items
                    .iter()
                    .map(|i| format!("{}  {:<9} {}", i.id, i.item_type, i.oneliner))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::State {
            goal,
            progress,
            blocker,
            next,
            working_files,
            open_questions,
        } => {
            let patch = StatePatch {
                goal,
                progress,
                blocker,
                next,
                working_files,
                open_questions,
            };
            let state = if patch == StatePatch::default() {
                store.state()?
            } else {
                store.update_state(patch)?
            };
            emit(json, &state, |s| serde_yaml::to_string(s).unwrap_or_default().trim_end().to_string())
        }
        Commands::Topics => {
            let topics = store.topics()?;
            emit(json, &topics, |topics| {
                topics
                    .iter()
                    .map(|t| format!("{:<20} {}", t.name, t.count))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Compact => {
            let report = store.compact()?;
            emit(json, &report, |r| {
                format!(
                    "compacted: {} live items, {} -> {} bytes",
                    r.live_items, r.bytes_before, r.bytes_after
                )
            })
        }
        Commands::Verify => {
            let report = store.verify()?;
            emit(json, &report, |r| {
                format!(
                    "{} ({} open, seq {}, {} live)\n  hydrated: {}\n  replayed: {}",
                    if r.consistent { "consistent" } else { "MISMATCH" },
                    r.mode.as_str(),
                    r.applied_seq,
                    r.live_items,
                    r.hydrated_digest,
                    r.replay_digest
                )
            })?;
            if !report.consistent {
                anyhow::bail!("snapshot does not match the knowledge log");
            }
            Ok(())
        }
        Commands::Stats => {
            let stats = store.stats()?;
            emit(json, &stats, |s| {
                let mut out = format!(
                    "live items: {}\napplied seq: {}\nlog bytes: {}\ntombstones: {}",
                    s.live_items, s.applied_seq, s.log_bytes, s.tombstones
                );
                for (t, n) in &s.by_type {
                    out.push_str(&format!("\n  {t}: {n}"));
                }
                out
            })
        }
        Commands::Dump { file } => {
            let raw = match file {
                DumpTarget::Log => store.dump_log()?,
                DumpTarget::Index => store.dump_index()?,
            };
            print!("{raw}");
            Ok(())
        }
    }
}
