//! CLI argument parsing using clap v4
//!
//! One binary plays all three roles: `serve` runs the router, `work` runs a
//! reviewing worker and `monitor` attaches a read-only observer.

use clap::{Args, Parser, Subcommand};

/// Peer Review - task router and reviewing workers
///
/// A router hands review requests between a fixed group of workers over a
/// line-based TCP protocol. Each worker writes, asks a random peer to review,
/// and reviews whatever lands in its own queue.
#[derive(Parser, Debug)]
#[command(name = "peer-review")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Router address overrides shared by every networked command
#[derive(Args, Debug, Clone, Default)]
pub struct Endpoint {
    /// Path to configuration file
    #[arg(short, long, env = "PEER_REVIEW_CONFIG")]
    pub config: Option<String>,

    /// Router host
    #[arg(long)]
    pub host: Option<String>,

    /// Router port
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the task router
    Serve {
        #[command(flatten)]
        endpoint: Endpoint,

        /// Number of workers that must join before work starts
        #[arg(short = 'n', long)]
        group_size: Option<u32>,
    },

    /// Run a reviewing worker
    Work {
        #[command(flatten)]
        endpoint: Endpoint,

        /// Reclaim this identity instead of taking the next free one
        #[arg(long)]
        id: Option<u32>,

        /// Seed the writing/review simulation for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Size of the group to pick reviewers from
        #[arg(short = 'n', long)]
        group_size: Option<u32>,
    },

    /// Attach to a router and print its event stream
    Monitor {
        #[command(flatten)]
        endpoint: Endpoint,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
