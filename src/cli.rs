use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mixvault")]
#[command(author, version, about = "Mix export and archive generation service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,

    /// Delete expired export artifacts once and exit
    Sweep,

    /// Create a user account
    CreateUser {
        /// Unique username
        username: String,

        /// Role label stored with the user
        #[arg(long, default_value = "member")]
        role: String,
    },

    /// Grant or update a user's download plan
    Grant {
        /// Username to grant the plan to
        username: String,

        /// Total download credits for the plan
        #[arg(long)]
        limit: u32,

        /// Membership identifier (enables premium videos while active)
        #[arg(long)]
        membership: Option<String>,

        /// Membership length in days (open-ended if omitted)
        #[arg(long)]
        days: Option<i64>,

        /// Reset used credits to zero
        #[arg(long)]
        reset: bool,
    },

    /// Issue a bearer token for a user
    IssueToken {
        /// Username to issue the token for
        username: String,
    },

    /// Import catalog videos from a JSON array
    ImportVideos {
        /// JSON file holding an array of video records
        file: PathBuf,
    },
}
