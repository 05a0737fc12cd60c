use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vt", about = concat!("vaultask v", env!("CARGO_PKG_VERSION"), " - checkbox tasks across a markdown vault"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Vault directory (overrides the profile's vault)
    #[arg(long, global = true)]
    pub vault: Option<String>,

    /// Profile from config.toml
    #[arg(long, global = true)]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create tasks.md with a starter task in the current directory
    Init,
    /// Evaluate queries and list matching tasks
    List(ListArgs),
    /// Toggle tasks done / not done
    Toggle(LocationsArgs),
    /// Replace a task's description
    Edit(TextArgs),
    /// Delete task lines
    Delete(LocationsArgs),
    /// Add a new task below an existing one
    Add(TextArgs),
    /// Set, raise or lower a task's priority
    Priority(PriorityArgs),
    /// Search listed tasks by regex (case-insensitive)
    Search(SearchArgs),
    /// Keep listing as the vault changes on disk
    Watch(ListArgs),
    /// Open a task in $EDITOR at its line
    Open(LocationArgs),
}

#[derive(Args)]
pub struct ListArgs {
    /// Query file (absolute or vault-relative) or inline query text
    pub query: Option<String>,
}

#[derive(Args)]
pub struct LocationArgs {
    /// Task location as FILE:LINE
    pub location: String,
}

#[derive(Args)]
pub struct LocationsArgs {
    /// Task locations as FILE:LINE
    #[arg(required = true)]
    pub locations: Vec<String>,
}

#[derive(Args)]
pub struct TextArgs {
    /// Task location as FILE:LINE
    pub location: String,
    /// Description text
    pub text: String,
}

#[derive(Args)]
pub struct PriorityArgs {
    /// Task location as FILE:LINE
    pub location: String,
    /// highest, high, medium, normal, low, lowest, up or down
    pub level: String,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Regex pattern to search for
    pub pattern: String,
    /// Query file or inline query text to search within
    pub query: Option<String>,
}
