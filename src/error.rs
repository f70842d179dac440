// Error taxonomy for the download-verify-repackage pipeline

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostdbError>;

#[derive(Debug, Error)]
pub enum HostdbError {
    /// Malformed version or platform, rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no source entry for {database} {version}; configured versions: {available}")]
    SourceNotFound {
        database: String,
        version: String,
        available: String,
    },

    #[error("{database} {version} has no source for {platform}")]
    PlatformUnavailable {
        database: String,
        version: String,
        platform: String,
    },

    #[error("download of {url} failed: {reason}")]
    DownloadError { url: String, reason: String },

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("extraction of {} failed: {reason}", path.display())]
    ExtractionFailure { path: PathBuf, reason: String },

    #[error("build of {database} {version} for {platform} failed")]
    BuildFailure {
        database: String,
        version: String,
        platform: String,
    },

    #[error("required tool '{tool}' not found on PATH (needed for {purpose})")]
    ToolMissing { tool: String, purpose: String },

    #[error("invalid sources file {}: {reason}", path.display())]
    InvalidSources { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl HostdbError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error must stop the whole run rather than one platform.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_checksum_mismatch_halts_run() {
        let mismatch = HostdbError::ChecksumMismatch {
            file: "a.tar.gz".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(mismatch.is_fatal_for_run());

        let download = HostdbError::DownloadError {
            url: "https://example.com".into(),
            reason: "timeout".into(),
        };
        assert!(!download.is_fatal_for_run());

        let build = HostdbError::BuildFailure {
            database: "redis".into(),
            version: "7.4.1".into(),
            platform: "linux-x64".into(),
        };
        assert!(!build.is_fatal_for_run());
    }

    #[test]
    fn test_messages_name_the_subject() {
        let err = HostdbError::ToolMissing {
            tool: "tar".into(),
            purpose: "tar.gz extraction".into(),
        };
        assert!(err.to_string().contains("'tar'"));
        assert!(err.to_string().contains("tar.gz extraction"));
    }
}
