//! CLI command definitions (§10.5).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// fleetd - Agent Fleet Orchestrator
#[derive(Parser)]
#[command(name = "fleetd", about = "Agent fleet orchestrator with search index and project memory", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the orchestrator, optionally serving the HTTP API (§6 `http.listen_addr`)
    Serve,

    /// Submit a task and print its id
    Submit {
        /// Project identifier the task belongs to
        #[arg(long)]
        project: String,

        /// Natural-language task description
        description: String,

        /// Deadline, in milliseconds, to wait for completion
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Poll a task's status
    Status {
        task_id: String,
    },

    /// Cancel an in-flight task
    Cancel {
        task_id: String,
    },

    /// Search the unified index
    Search {
        query: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Project memory operations
    #[command(subcommand)]
    Memory(MemoryCommand),

    /// Audit ledger operations
    #[command(subcommand)]
    Ledger(LedgerCommand),
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Initialize a project's FULL/CRITERIA/CHANGELOG triple
    Init { project: String },

    /// Append a categorized changelog entry
    Append { project: String, entry: String },

    /// Retrieve relevant context for a query, budgeted in tokens
    Context {
        project: String,
        query: String,
        #[arg(long, default_value_t = 2000)]
        budget: usize,
    },
}

#[derive(Subcommand)]
pub enum LedgerCommand {
    /// Verify the hash chain between two record ids
    Verify { from: String, to: String },
}
