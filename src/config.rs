//! Runtime configuration for the CLI host.
//!
//! Values come from command-line flags first, then environment variables
//! (clap reads both into [`Overrides`]), then the defaults below.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::Level;

use crate::fields::Capability;

pub const DEFAULT_DIR_NAME: &str = ".shopclock";
pub const DEFAULT_DB_FILE: &str = "tasks.json";

/// Explicit settings supplied by the user.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub operator: Option<String>,
    pub admin: bool,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Who is acting; new tasks are assigned to this operator unless told otherwise.
    pub operator: Option<String>,
    pub capability: Capability,
    pub log_level: Level,
}

impl Config {
    /// Resolve the final configuration. `home` is the user's home directory,
    /// used only when no data directory was given.
    pub fn resolve(overrides: Overrides, home: Option<PathBuf>) -> Result<Self> {
        let data_dir = match (overrides.data_dir, overrides.db.as_ref()) {
            (Some(dir), _) => dir,
            (None, Some(db)) => db
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            (None, None) => home.unwrap_or_else(|| PathBuf::from(".")).join(DEFAULT_DIR_NAME),
        };
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db_path = overrides.db.unwrap_or_else(|| data_dir.join(DEFAULT_DB_FILE));
        let operator = overrides.operator.map(|o| o.trim().to_string()).filter(|o| !o.is_empty());
        let capability = if overrides.admin { Capability::Admin } else { Capability::Operator };
        let log_level = overrides.log_level.as_deref().map(parse_level).unwrap_or(Level::WARN);

        Ok(Config { data_dir, db_path, operator, capability, log_level })
    }
}

/// Map a level name to a tracing level; unknown names fall back to `warn`.
pub fn parse_level(name: &str) -> Level {
    match name.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}
