//! vecmem command-line front-end
//!
//! Every subcommand prints one JSON document to stdout; logs go to stderr.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vecmem::{MemoryKind, MemoryManager, MemoryNode, SearchOptions, StoreConfig};

#[derive(Parser)]
#[command(name = "vecmem")]
#[command(about = "Semantic memory store: embed, index and search short texts")]
#[command(version)]
struct Args {
    /// RocksDB directory (default: ~/.vecmem/data)
    #[arg(long, global = true, env = "VECMEM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Keep records in memory only
    #[arg(long, global = true)]
    memory_only: bool,

    /// Embedding dimension
    #[arg(long, global = true, env = "VECMEM_DIMENSION")]
    dimension: Option<usize>,

    /// Embedding server base URL; an empty value skips the server
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// OpenAI-compatible embeddings endpoint
    #[arg(long, global = true, env = "VECMEM_EMBEDDING_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the embeddings endpoint
    #[arg(long, global = true, env = "VECMEM_EMBEDDING_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Do not try to load the in-process model
    #[arg(long, global = true)]
    no_local_model: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a memory
    Store {
        /// Memory id (generated if omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "fact")]
        kind: MemoryKind,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Semantic search
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
        /// Only memories carrying one of these tags
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Fetch one memory
    Get { id: String },
    /// Delete memories
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Store statistics
    Stats,
    /// Export every record as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import a JSON export
    Import { file: PathBuf },
    /// Delete everything
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
    /// Cosine similarity of two texts
    Similarity { a: String, b: String },
}

fn default_data_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".vecmem").join("data"))
}

/// Environment overrides first, then flags
fn build_config(args: &Args) -> StoreConfig {
    let mut config = StoreConfig::from_env();

    config.data_dir = if args.memory_only {
        None
    } else {
        args.data_dir
            .clone()
            .or(config.data_dir)
            .or_else(default_data_dir)
    };
    if let Some(dimension) = args.dimension.filter(|d| *d > 0) {
        config.dimension = dimension;
    }
    if let Some(url) = &args.server_url {
        config.embedding.server_url = if url.is_empty() { None } else { Some(url.clone()) };
    }
    if args.api_url.is_some() {
        config.embedding.api_url = args.api_url.clone();
    }
    if args.api_key.is_some() {
        config.embedding.api_key = args.api_key.clone();
    }
    if args.no_local_model {
        config.embedding.enable_local_model = false;
    }
    config
}

async fn run(manager: &MemoryManager, command: Command) -> anyhow::Result<Value> {
    let output = match command {
        Command::Store {
            id,
            content,
            kind,
            tags,
        } => {
            let mut builder = MemoryNode::builder().content(content).kind(kind).tags(tags);
            if let Some(id) = id {
                builder = builder.id(id);
            }
            let node = builder.build().context("invalid memory")?;
            let id = manager.store(node).await?;
            json!({ "id": id })
        }
        Command::Search {
            query,
            limit,
            min_score,
            tags,
        } => {
            let mut options = SearchOptions::new();
            options.max_results = limit;
            options.min_score = min_score;
            options.tags = tags;
            let results = manager.search(&query, options).await?;
            serde_json::to_value(results)?
        }
        Command::Get { id } => match manager.get_by_id(&id).await? {
            Some(node) => serde_json::to_value(node)?,
            None => bail!("memory {} not found", id),
        },
        Command::Delete { ids } => serde_json::to_value(manager.delete_batch(&ids).await?)?,
        Command::Stats => serde_json::to_value(manager.stats().await?)?,
        Command::Export { output } => {
            let snapshot = serde_json::to_value(manager.export().await?)?;
            match output {
                Some(path) => {
                    write_json(&path, &snapshot)?;
                    let count = snapshot["vectors"].as_array().map_or(0, Vec::len);
                    json!({ "exported": count, "path": path })
                }
                None => snapshot,
            }
        }
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let document: Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            serde_json::to_value(manager.import(&document).await?)?
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear the store without --yes");
            }
            manager.clear().await?;
            json!({ "cleared": true })
        }
        Command::Similarity { a, b } => {
            json!({ "similarity": manager.similarity(&a, &b).await? })
        }
    };
    Ok(output)
}

fn write_json(path: &Path, value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// How long exit waits on blocking tasks, e.g. a model load that timed out
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Drive `future` to completion, then stop the runtime without waiting on
/// abandoned blocking work for longer than [`SHUTDOWN_GRACE`].
fn block_on_bounded<F: Future>(runtime: tokio::runtime::Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    output
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vecmem=info,vecmem_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    block_on_bounded(runtime, run_cli(args))
}

async fn run_cli(args: Args) -> anyhow::Result<()> {
    let config = build_config(&args);
    tracing::debug!("Data directory: {:?}", config.data_dir);

    let manager = MemoryManager::new(config);
    manager
        .initialize()
        .await
        .context("failed to initialize memory store")?;

    let result = run(&manager, args.command).await;
    manager.shutdown().await.context("failed to flush memory store")?;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
