//! CLI argument definitions using clap
//!
//! Commands:
//! - moonhost function create|deploy|list|versions|rename|retention|delete
//! - moonhost env set|unset|list
//! - moonhost invoke --id <id>   (event JSON on stdin)
//! - moonhost executions --id <id>
//! - moonhost sweep
//! - moonhost housekeep

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// moonhost - sandboxed Lua function host
#[derive(Parser, Debug)]
#[command(name = "moonhost")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit host logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage functions and their code
    Function {
        #[command(subcommand)]
        action: FunctionAction,
    },

    /// Manage a function's environment variables
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },

    /// Invoke a function with an event read from stdin
    Invoke {
        #[arg(long)]
        id: String,
    },

    /// List a function's executions, newest first
    Executions {
        #[arg(long)]
        id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Run one retention sweep and exit
    Sweep,

    /// Run the retention scheduler until interrupted
    Housekeep,
}

#[derive(Subcommand, Debug)]
pub enum FunctionAction {
    /// Register a function and store its first version
    Create {
        #[arg(long)]
        name: String,

        /// Lua source file
        #[arg(long)]
        code: PathBuf,

        /// Execution retention in days (7, 15, 30 or 365)
        #[arg(long)]
        retention: Option<u32>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Store a new version of a function's code
    Deploy {
        #[arg(long)]
        id: String,

        #[arg(long)]
        code: PathBuf,

        /// Commit message
        #[arg(long)]
        message: Option<String>,
    },

    List {
        #[arg(long, default_value_t = 100)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    Versions {
        #[arg(long)]
        id: String,
    },

    Rename {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,
    },

    /// Change the retention override
    Retention {
        #[arg(long)]
        id: String,

        #[arg(long)]
        days: u32,
    },

    /// Delete a function with its versions and executions
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum EnvAction {
    Set {
        #[arg(long)]
        id: String,

        key: String,

        value: String,
    },

    Unset {
        #[arg(long)]
        id: String,

        key: String,
    },

    List {
        #[arg(long)]
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
