// Config module for run settings resolved from the environment and CLI

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::databases::Database;

pub fn root_dir() -> PathBuf {
    std::env::var_os("HOSTDB_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn cache_dir(root: &Path) -> PathBuf {
    std::env::var_os("HOSTDB_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join(constants::DOWNLOADS_DIR))
}

pub fn default_output_dir() -> PathBuf {
    std::env::var_os("HOSTDB_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_OUTPUT_DIR))
}

/// `CI=true` (any case) or `CI=1` turns off interactive prompts.
pub fn is_ci() -> bool {
    std::env::var("CI")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Settings shared by every component of a run. Built once in `main` and
/// passed down explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ci: bool,
    pub timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        let root = root_dir();
        Self {
            cache_dir: cache_dir(&root),
            output_dir: default_output_dir(),
            ci: is_ci(),
            timeout: Duration::from_secs(constants::DEFAULT_TIMEOUT_SECS),
            root,
        }
    }

    pub fn with_output_dir(mut self, output: Option<PathBuf>) -> Self {
        if let Some(dir) = output {
            self.output_dir = dir;
        }
        self
    }

    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.timeout = Duration::from_secs(secs);
        }
        self
    }

    /// Directory holding a database's `sources.json` and build script.
    pub fn build_dir(&self, database: Database) -> PathBuf {
        self.root.join(constants::BUILDS_DIR).join(database.name())
    }

    pub fn sources_path(&self, database: Database) -> PathBuf {
        self.build_dir(database).join(constants::SOURCES_FILE)
    }
}
