//! Command line shell over a directory-backed B-tree
//!
//! Keys are strings. Set `RUST_LOG=duobtree=debug` to watch splits and
//! merges as they happen.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use duobtree::{BTree, BTreeError, DirStore, DurabilityLevel, StoreConfig, TreeConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "btree-cli", version, about = "Inspect and edit an on-disk B-tree")]
struct Cli {
    /// Directory holding the tree's records
    #[arg(long, default_value = "./btree_data")]
    dir: PathBuf,

    /// Minimum degree t; must match the degree the tree was created with
    #[arg(long, default_value_t = duobtree::config::DEFAULT_DEGREE)]
    degree: usize,

    /// Skip fsync on every write
    #[arg(long)]
    no_sync: bool,

    /// Fail on inserting an existing key instead of ignoring it
    #[arg(long)]
    reject_duplicates: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert keys
    Insert { keys: Vec<String> },

    /// Delete keys
    Delete { keys: Vec<String> },

    /// Report whether a key is present (exit status 1 when absent)
    Exists { key: String },

    /// Validate invariants and report tree shape
    Check,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duobtree=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = TreeConfig::with_degree(cli.degree);
    if cli.reject_duplicates {
        config = config.rejecting_duplicates();
    }

    let mut store_config = StoreConfig::new(&cli.dir);
    if cli.no_sync {
        store_config.durability = DurabilityLevel::NoSync;
    }

    let mut tree: BTree<String, DirStore<String>> = BTree::open_dir(config, store_config)
        .with_context(|| format!("opening tree at {}", cli.dir.display()))?;

    match cli.command {
        Command::Insert { keys } => {
            for key in keys {
                if tree.insert(key.clone())? {
                    println!("inserted {}", key);
                } else {
                    println!("{} already present", key);
                }
            }
        }
        Command::Delete { keys } => {
            let mut missing = 0;
            for key in &keys {
                match tree.delete(key) {
                    Ok(()) => println!("deleted {}", key),
                    Err(BTreeError::NotFound(_)) => {
                        println!("{} not found", key);
                        missing += 1;
                    }
                    Err(e) => return Err(e).with_context(|| format!("deleting {}", key)),
                }
            }
            if missing > 0 {
                return Ok(ExitCode::from(1));
            }
        }
        Command::Exists { key } => {
            let found = tree.exists(&key)?;
            println!("{}", found);
            if !found {
                return Ok(ExitCode::from(1));
            }
        }
        Command::Check => {
            let stats = tree.validate().context("tree failed validation")?;
            let orphans = tree.orphaned_records()?;
            println!(
                "ok: t={} height={} nodes={} leaves={} keys={}",
                tree.degree(),
                stats.height,
                stats.nodes,
                stats.leaves,
                stats.keys
            );
            if !orphans.is_empty() {
                bail!("{} unreachable records: {:?}", orphans.len(), orphans);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
