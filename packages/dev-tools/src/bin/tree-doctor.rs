//! Tree Doctor - inspect and repair an MPTree database
//!
//! Operates on the node table of a local libsql database file. The path
//! layout comes from the same `MPTREE_*` environment variables the library
//! reads (see `TreeConfig::from_env`), so it must match the layout the tree
//! was written with.
//!
//! # Usage
//!
//! ```bash
//! # Report problems as JSON (exit code 1 if any were found)
//! cargo run --bin tree-doctor -- --db ./data/tree.db check
//!
//! # Repair counters, optionally closing gaps in sibling lists
//! cargo run --bin tree-doctor -- --db ./data/tree.db fix --fix-paths
//!
//! # Export and re-import the forest
//! cargo run --bin tree-doctor -- --db ./data/tree.db dump --keep-ids > tree.json
//! cargo run --bin tree-doctor -- --db ./copy.db load tree.json --keep-ids
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `tree_doctor=info,mptree_core=info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mptree_core::{DumpedNode, FixTreeOptions, TreeConfig, TreeService};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tree-doctor", about = "Inspect and repair materialized path trees")]
struct Cli {
    /// Database file holding the node table
    #[arg(long, default_value = "./data/tree.db")]
    db: PathBuf,

    /// Node table name (overrides MPTREE_TABLE)
    #[arg(long)]
    table: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report every row that breaks a tree invariant
    Check,
    /// Repair depth and child counters
    Fix {
        /// Rebuild every path from a dump (stop other writers first)
        #[arg(long)]
        destructive: bool,
        /// Renumber sibling lists to close gaps
        #[arg(long, conflicts_with = "destructive")]
        fix_paths: bool,
    },
    /// Print the forest as nested JSON
    Dump {
        /// Include node ids in the output
        #[arg(long)]
        keep_ids: bool,
    },
    /// Insert a nested JSON dump as new roots
    Load {
        /// File produced by `dump`
        file: PathBuf,
        /// Reuse ids present in the file
        #[arg(long)]
        keep_ids: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tree_doctor=info,mptree_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TreeConfig::from_env().context("invalid MPTREE_* configuration")?;
    if let Some(table) = cli.table {
        config = config.with_table(table);
        config.validate()?;
    }

    let service: TreeService<Value> = TreeService::open(&cli.db, &config)
        .await
        .with_context(|| format!("failed to open {}", cli.db.display()))?;
    tracing::debug!(db = %cli.db.display(), table = %config.table, "Opened tree database");

    match cli.command {
        Commands::Check => {
            let problems = service.find_problems().await?;
            println!("{}", serde_json::to_string_pretty(&problems)?);
            if !problems.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Fix {
            destructive,
            fix_paths,
        } => {
            let options = FixTreeOptions {
                destructive,
                fix_paths,
            };
            let report = service.fix_tree_with(options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Dump { keep_ids } => {
            let dump = service.dump_tree(None, keep_ids).await?;
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        Commands::Load { file, keep_ids } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let nodes: Vec<DumpedNode<Value>> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a tree dump", file.display()))?;

            let ids = service.load_tree(nodes, None, keep_ids).await?;
            println!("Loaded {} nodes", ids.len());
        }
    }

    Ok(())
}
