// CLI module for handling command-line interface

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::databases::Database;
use crate::platform::Platform;
use crate::version::VersionSpec;

#[derive(Parser)]
#[command(name = "hostdb")]
#[command(version)]
#[command(about = "Re-host prebuilt database binaries as uniform, verified archives")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download (or build), verify and repackage a database release
    Download(DownloadArgs),
    /// Show configured versions and their platforms
    List {
        /// Limit the listing to one database
        database: Option<Database>,
    },
    /// Check a repackaged archive's layout and print its provenance record
    Inspect {
        archive: PathBuf,
        /// Fail unless the archive holds this database
        #[arg(long)]
        database: Option<Database>,
    },
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["platform", "all_platforms"]),
))]
pub struct DownloadArgs {
    pub database: Database,

    /// Release to fetch, as X.Y.Z
    #[arg(long)]
    pub version: VersionSpec,

    #[arg(long)]
    pub platform: Option<Platform>,

    /// Process all five platforms; ones missing from the sources file are skipped
    #[arg(long)]
    pub all_platforms: bool,

    /// Directory for finished archives [default: $HOSTDB_OUTPUT_DIR or ./dist]
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Build platforms that have no prebuilt binary instead of skipping them
    #[arg(long)]
    pub build_fallback: bool,

    /// Give up on a single download after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

impl DownloadArgs {
    pub fn platforms(&self) -> Vec<Platform> {
        match self.platform {
            Some(platform) if !self.all_platforms => vec![platform],
            _ => Platform::ALL.to_vec(),
        }
    }
}
