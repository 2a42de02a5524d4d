//! # shopclock
//!
//! Command-line host for the shop-floor task timer. It keeps tasks in a local
//! JSON file and drives them through the lifecycle engine in the `shopclock`
//! library.
//!
//! ## Quick Start
//!
//! ```bash
//! shopclock --operator ana add "Face flange" --machine lathe-2 --expected-minutes 45
//! shopclock start 1
//! shopclock hold 1 --reason "waiting on material"
//! shopclock resume 1
//! shopclock complete 1
//! shopclock report --for ana
//! shopclock daily --month 3
//! ```
//!
//! `end` force-closes a task and needs `--admin`.
//!
//! Data is stored in `~/.shopclock/tasks.json` unless `--db`, `--data-dir`,
//! `SHOPCLOCK_DB` or `SHOPCLOCK_HOME` say otherwise.

use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use shopclock::clock::SystemClock;
use shopclock::config::{Config, Overrides};
use shopclock::db::Database;
use shopclock::lifecycle::TaskEngine;

mod cli;
mod cmd;

use cli::Cli;
use cmd::{Commands, Session};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Completions need neither config nor storage.
    if let Commands::Completions { shell } = cli.command {
        cmd::cmd_completions(shell);
        return Ok(());
    }

    let overrides = Overrides {
        data_dir: cli.data_dir,
        db: cli.db,
        operator: cli.operator,
        admin: cli.admin,
        log_level: cli.log_level,
    };
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let config = Config::resolve(overrides, home)?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();
    debug!(db = %config.db_path.display(), capability = ?config.capability, "configuration resolved");

    let db = Database::load(&config.db_path)?;
    let mut session = Session {
        db,
        db_path: &config.db_path,
        engine: TaskEngine::new(SystemClock),
        config: &config,
    };
    cmd::run(cli.command, &mut session)
}
