use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Shop-floor task timer.
/// Storage defaults to ~/.shopclock/tasks.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "shopclock", version, about = "Track task lifecycles and working time")]
pub struct Cli {
    /// Path to the JSON task database.
    #[arg(long, global = true, env = "SHOPCLOCK_DB")]
    pub db: Option<PathBuf>,

    /// Directory holding the task database.
    #[arg(long, global = true, env = "SHOPCLOCK_HOME")]
    pub data_dir: Option<PathBuf>,

    /// Operator performing the command.
    #[arg(long, global = true, env = "SHOPCLOCK_OPERATOR")]
    pub operator: Option<String>,

    /// Act with admin capability (required for `end`).
    #[arg(long, global = true)]
    pub admin: bool,

    /// Log level: trace | debug | info | warn | error.
    #[arg(long, global = true, env = "SHOPCLOCK_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}
