use clap::{Parser, Subcommand, ValueEnum};

use taskmate::models::Priority;

#[derive(Parser)]
#[command(author, version, about = "Keep a remote task list in sync from the terminal", long_about = None)]
pub struct Cli {
    /// API root of the task service, e.g. http://localhost:8000/v1/
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Config file to use instead of ~/.taskmate.toml
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    #[value(name = "H", aliases = ["h", "high"])]
    High,
    #[value(name = "M", aliases = ["m", "medium"])]
    Medium,
    #[value(name = "L", aliases = ["l", "low"])]
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::High => Priority::High,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::Low => Priority::Low,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all tasks
    List,
    /// Add a new task
    Add {
        #[arg(value_name = "TITLE")]
        title: String,
        #[arg(short, long, value_enum, default_value = "M")]
        priority: PriorityArg,
        /// Due date, e.g. 2026-10-20T17:30
        #[arg(short, long, value_name = "DUE")]
        due: Option<String>,
    },
    /// Flip the completed flag of a task
    Toggle {
        #[arg(value_name = "ID")]
        id: u64,
    },
    /// Delete a task
    Delete {
        #[arg(value_name = "ID")]
        id: u64,
    },
    /// Change the title of a task
    Rename {
        #[arg(value_name = "ID")]
        id: u64,
        #[arg(value_name = "TITLE")]
        title: String,
    },
    /// Analyze task habits
    Insight,
    /// Read or change persistent settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Launch TUI interface
    Tui,
    /// Generate shell completions
    Completions {
        #[arg(value_name = "SHELL")]
        shell: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a config value
    Set {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// Show a config value
    Get {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// List all config values
    List,
    /// Reset a config value to its default
    Delete {
        #[arg(value_name = "KEY")]
        key: String,
    },
}
