//! # Transcript Ingest CLI (`tingest`)
//!
//! ## Usage
//!
//! ```bash
//! tingest --config ./config/ingest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tingest run` | Ingest every transcript under the configured root |
//! | `tingest init-index` | Create the vector index if it does not exist |
//! | `tingest inspect <FILENAME>...` | Print the metadata mapped from filenames |
//!
//! Diagnostics go to stderr through `tracing` (set `RUST_LOG` to change
//! the level); the run summary goes to stdout.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use transcript_ingest::cancel::CancelToken;
use transcript_ingest::config::{self, Config};
use transcript_ingest::ingest::{self, RunOptions};
use transcript_ingest::mapper;
use transcript_ingest::progress::ProgressMode;
use transcript_ingest::vector_index::{self, IndexSpec};

const DEFAULT_CONFIG: &str = "./config/ingest.toml";

/// Transcript Ingest — idempotent ingestion of transcripts into a vector index.
#[derive(Parser)]
#[command(name = "tingest", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ingest.toml`; built-in defaults are used when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest transcripts: map, chunk, embed, upsert, audit.
    Run {
        /// Directory (or single file) to ingest. Overrides `ingest.root`.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Chunks per embed/upsert batch. Overrides `ingest.batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Files processed concurrently. Overrides `ingest.concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,

        /// List files, programs and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Only process the first N files (in sorted order).
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr. Defaults to human on a TTY, off otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Create the vector index if it does not exist.
    InitIndex,

    /// Print the program metadata mapped from each filename as JSON.
    Inspect {
        #[arg(required = true)]
        filenames: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Ok(config::load_config(p)?),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Ok(config::load_config(Path::new(DEFAULT_CONFIG))?)
        }
        None => Ok(config::parse_config("")?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            path,
            batch_size,
            concurrency,
            dry_run,
            limit,
            progress,
        } => {
            let cfg = load(cli.config.as_deref())?;
            let (cancel, handle) = CancelToken::new();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, finishing in-flight batches");
                    handle.cancel();
                }
            });

            let opts = RunOptions {
                path,
                batch_size,
                concurrency,
                limit,
                dry_run,
                progress: progress.map(ProgressMode::from),
            };
            ingest::run_ingest(&cfg, opts, cancel).await?;
        }
        Commands::InitIndex => {
            let cfg = load(cli.config.as_deref())?;
            let dimension = match cfg.embedding.dims {
                Some(d) if d > 0 => d,
                _ => bail!("embedding.dims must be set to create the index"),
            };
            let index = vector_index::create_index(&cfg.index)?;
            index
                .ensure_index(&IndexSpec {
                    name: cfg.index.name.clone(),
                    dimension,
                    metric: cfg.index.metric,
                })
                .await?;
            println!(
                "index {} ready (dimension {}, metric {})",
                index.name(),
                dimension,
                cfg.index.metric.as_str()
            );
        }
        Commands::Inspect { filenames } => {
            for filename in &filenames {
                let meta = mapper::map_filename(filename);
                let line = serde_json::json!({ "filename": filename, "metadata": meta });
                println!("{}", line);
            }
        }
    }

    Ok(())
}
