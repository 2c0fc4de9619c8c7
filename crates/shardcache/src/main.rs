//! shardcache: replay gateway captures through the store.
//!
//! Subcommands:
//! - `replay`: submit every dispatch of a capture and print per-category counts
//! - `query`: replay a capture, then report on one guild

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use miette::Result;
use serde_json::json;
use shardcache_model::Id;
use shardcache_store::{
    CustomAction, EntityKind, KvLayout, Query, Scope, Store, StoreError, StoreFlag,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod replay;

use replay::{ConfigOverrides, load_config, replay_file};

#[derive(Parser)]
#[command(name = "shardcache")]
#[command(about = "Event-sourced store for sharded gateway state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// JSON-lines capture to replay
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Store config file (JSON)
    #[arg(long, env = "SHARDCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Categories to disable, e.g. `presence,voice_state`
    #[arg(long, value_delimiter = ',')]
    disable: Vec<StoreFlag>,

    /// Entries fetched per backend scan
    #[arg(long, env = "SHARDCACHE_PAGE_SIZE")]
    page_size: Option<usize>,

    /// Sweep invalidated shards inline instead of in the background
    #[arg(long, env = "SHARDCACHE_INLINE_SWEEP")]
    inline_sweep: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a capture and print per-category counts
    Replay {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Replay a capture, then report a guild and its member list
    Query {
        #[command(flatten)]
        store: StoreArgs,

        /// Guild to report on
        #[arg(long)]
        guild: Id,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "shardcache=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { store } => run_replay(&store).await,
        Commands::Query { store, guild } => run_query(&store, guild).await,
    }
}

fn build_store(args: &StoreArgs) -> Result<Store> {
    let overrides = ConfigOverrides {
        disable: args.disable.clone(),
        page_size: args.page_size,
        inline_sweep: args.inline_sweep,
    };
    let config = load_config(args.config.as_deref(), &overrides)
        .map_err(|e| miette::miette!("{}", e))?;
    info!(
        disabled = ?config.flags.disabled(),
        page_size = config.scan_page_size,
        background_sweep = config.background_sweep,
        "shardcache: store configured"
    );
    let layout = KvLayout::in_memory(config);
    Store::from_layout(&layout).map_err(|e| miette::miette!("{}", e))
}

async fn replay_into(store: &Store, file: &Path) -> Result<replay::ReplaySummary> {
    replay_file(store, file)
        .await
        .map_err(|e| miette::miette!("{}", e))
}

async fn run_replay(args: &StoreArgs) -> Result<()> {
    let store = build_store(args)?;
    let summary = replay_into(&store, &args.file).await?;

    println!(
        "{} lines: {} applied, {} skipped, {} failed ({} creates)",
        summary.lines, summary.applied, summary.skipped, summary.failed, summary.creates
    );
    for (kind, count) in &summary.per_kind {
        println!("  {:<36} {}", kind, count);
    }
    Ok(())
}

async fn run_query(args: &StoreArgs, guild_id: Id) -> Result<()> {
    let store = build_store(args)?;
    replay_into(&store, &args.file).await?;

    let execute = |action: shardcache_store::Action| {
        let store = store.clone();
        async move { store.execute(action).await.map_err(|e| miette::miette!("{}", e)) }
    };

    let guild = execute(Query::get(EntityKind::Guild, guild_id).into())
        .await?
        .into_entity();
    let state = execute(CustomAction::new("MEMBER_LIST_STATE", json!({ "guild_id": guild_id })).into())
        .await?
        .into_custom();
    let members = execute(Query::count(EntityKind::Member, Scope::Guild { guild_id }).into())
        .await?
        .count();
    let exact = match store
        .execute(Query::CountExactMembers { guild_id })
        .await
    {
        Ok(outcome) => json!(outcome.count()),
        Err(StoreError::ExactResultNotAvailable { .. }) => json!("unavailable"),
        Err(e) => return Err(miette::miette!("{}", e)),
    };

    let report = json!({
        "guild": guild,
        "member_list": state,
        "members": members,
        "exact_members": exact,
    });
    let rendered = serde_json::to_string_pretty(&report).map_err(|e| miette::miette!("{}", e))?;
    println!("{}", rendered);
    Ok(())
}
