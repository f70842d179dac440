// Provenance record written into every repackaged archive

use std::fs;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::databases::Database;
use crate::error::{HostdbError, Result};
use crate::platform::Platform;
use crate::version::VersionSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceMetadata {
    pub name: String,
    pub version: String,
    pub platform: String,
    /// Download URL, or `build:<builder>` for artifacts built from source.
    pub source: String,
    pub rehosted_by: String,
    /// RFC 3339 UTC time the archive was assembled.
    pub rehosted_at: String,
}

impl ProvenanceMetadata {
    pub fn new(
        database: Database,
        version: &VersionSpec,
        platform: Platform,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: database.name().to_string(),
            version: version.to_string(),
            platform: platform.to_string(),
            source: source.into(),
            rehosted_by: constants::REHOSTED_BY.to_string(),
            rehosted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Write `.hostdb-metadata.json` into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(constants::METADATA_FILE);
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            HostdbError::io(
                "failed to serialize metadata",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        fs::write(&path, format!("{}\n", text))
            .map_err(|e| HostdbError::io(format!("failed to write {}", path.display()), e))
    }

    /// Parse a record read back out of an archive.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
