// Constants module for shared string constants

pub const SOURCES_FILE: &str = "sources.json";
pub const BUILDS_DIR: &str = "builds";
pub const DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_OUTPUT_DIR: &str = "dist";
pub const METADATA_FILE: &str = ".hostdb-metadata.json";
pub const BUILD_SCRIPT: &str = "build-local.sh";

/// Suffix for files that are still being written; renamed away on success.
pub const PARTIAL_SUFFIX: &str = "part";

/// Identifies this tool in provenance records and HTTP requests.
pub const REHOSTED_BY: &str = concat!("hostdb/", env!("CARGO_PKG_VERSION"));

/// Download timeout when none is given on the command line (30 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;
