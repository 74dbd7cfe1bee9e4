//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Edit a content builder block tree stored as a JSON dump
#[derive(Parser, Debug)]
#[command(name = "ctree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Tree dump file (default: `dump_path` from settings)
    #[arg(short, long, global = true, env = "CTREE_FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the tree
    Show,

    /// Print the raw JSON dump
    Dump {
        /// Pretty-print
        #[arg(short, long)]
        pretty: bool,
    },

    /// Append a block
    Add {
        /// Parent key (default: root)
        #[arg(short, long)]
        parent: Option<String>,

        /// Block type (default: from settings)
        #[arg(short = 't', long = "type")]
        node_type: Option<String>,

        /// Block label (default: synthesized)
        #[arg(short, long)]
        label: Option<String>,

        /// Full block value as JSON; overrides --type and --label
        #[arg(long, conflicts_with_all = ["node_type", "label"])]
        value: Option<String>,
    },

    /// Remove a block and its children
    Remove {
        key: String,
    },

    /// Copy a block and its children next to it
    Duplicate {
        key: String,
    },

    /// Reorder (same key twice) or reparent a block
    Move {
        src: String,
        target: String,

        /// Position among the new siblings
        #[arg(short, long, default_value_t = 0)]
        index: usize,
    },

    /// Replace a block's value with JSON
    Edit {
        key: String,
        value: String,
    },

    /// Replace the whole tree with a dump file
    Restore {
        #[arg(value_hint = ValueHint::FilePath)]
        source: PathBuf,
    },

    /// List the editor type catalog
    Types,

    /// Show effective settings
    Config,

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
