//! struttura binary
//!
//! Offline inspection of a JSON construction store.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                             | Default          | Description               |
//! |---------------------------------|------------------|---------------------------|
//! | `STRUTTURA_STORE_DIR`           | `constructions`  | JSON store directory      |
//! | `STRUTTURA_DEFAULT_LANGUAGE`    | `en`             | Language for titles       |
//! | `STRUTTURA_LOG_FILTER`          | `struttura=info` | Default log directive     |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use struttura::store::{ConstructionRecord, ConstructionStore, JsonDirStore};
use struttura::StrutturaConfig;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "struttura", about = "Struttura construction store inspector", version)]
struct Args {
    /// Optional TOML configuration file
    #[arg(long, env = "STRUTTURA_CONFIG")]
    config: Option<PathBuf>,

    /// Store directory (overrides configuration)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Language used for titles and descriptions (overrides configuration)
    #[arg(long)]
    lang: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored constructions
    List,
    /// Show one construction in detail
    Info { id: String },
    /// Check whether a construction is ready to publish
    Validate { id: String },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = StrutturaConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_filter.parse()?),
        )
        .init();

    let store_dir = args.store_dir.unwrap_or_else(|| config.store_dir.clone());
    let lang = args.lang.unwrap_or_else(|| config.default_language.clone());
    let store = JsonDirStore::new(&store_dir)
        .with_context(|| format!("Cannot open store at {}", store_dir.display()))?;
    log::info!("Using store {}", store.dir().display());

    match args.command {
        Command::List => list(&store, &lang),
        Command::Info { id } => info(&load(&store, &id)?, &lang),
        Command::Validate { id } => validate(load(&store, &id)?),
    }
}

fn load(store: &JsonDirStore, id: &str) -> Result<ConstructionRecord> {
    store
        .load(id)?
        .with_context(|| format!("No construction '{}' in store", id))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn list(store: &JsonDirStore, lang: &str) -> Result<()> {
    let ids = store.list()?;
    if ids.is_empty() {
        println!("(no constructions)");
        return Ok(());
    }
    for id in ids {
        let Some(record) = store.load(&id)? else {
            continue;
        };
        let title = record.metadata.titles.get_with_fallback(lang).unwrap_or("-");
        println!(
            "{:<40} {:<12} {:>6} blocks  {}",
            id,
            record.metadata.bounds.size_string(),
            record.snapshot.blocks().len(),
            title
        );
    }
    Ok(())
}

fn info(record: &ConstructionRecord, lang: &str) -> Result<()> {
    let meta = &record.metadata;
    let snapshot = &record.snapshot;
    println!("id:          {}", meta.id);
    println!("author:      {} ({})", meta.author_name, meta.author_id);
    println!(
        "title:       {}",
        meta.titles.get_with_fallback(lang).unwrap_or("-")
    );
    if let Some(short) = meta.short_descriptions.get_with_fallback(lang) {
        println!("summary:     {}", short);
    }
    println!("size:        {}", meta.bounds.size_string());
    println!("origin:      {}", snapshot.origin());
    println!(
        "blocks:      {} tracked, {} solid",
        snapshot.blocks().len(),
        meta.stats.solid_blocks
    );
    println!(
        "entities:    {} ({} mobs)",
        meta.stats.entities, meta.stats.mobs
    );
    println!("cmd blocks:  {}", meta.stats.command_blocks);
    match meta.anchors.entrance() {
        Some(entrance) => println!("entrance:    {} yaw {}", entrance.pos, entrance.yaw),
        None => println!("entrance:    -"),
    }

    if !meta.required_mods.is_empty() {
        println!("mods:");
        for (namespace, required) in &meta.required_mods {
            println!(
                "  {:<20} {:>5} blocks {:>4} entities  {}",
                namespace, required.block_count, required.entity_count, required.display_name
            );
        }
    }

    if !snapshot.rooms().is_empty() {
        println!("rooms:");
        for room in snapshot.rooms().values() {
            println!(
                "  {:<30} {:>5} changes {:>4} entities  \"{}\"",
                room.id,
                room.blocks.len(),
                room.entities.len(),
                room.name
            );
        }
    }

    let mut counts: Vec<_> = snapshot.block_counts().into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    println!("palette:");
    for (block, count) in counts.iter().take(10) {
        println!("  {:>6}  {}", count, block);
    }
    println!("fingerprint: {}", snapshot.fingerprint()?);
    Ok(())
}

fn validate(record: ConstructionRecord) -> Result<()> {
    let construction = record.into_construction()?;
    match construction.validate_for_publish() {
        Ok(()) => {
            println!("'{}' is ready to publish", construction.id());
            Ok(())
        }
        Err(e) => anyhow::bail!("'{}' cannot be published: {}", construction.id(), e),
    }
}
