// Sources module: per-database source descriptors and their resolution

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::databases::Database;
use crate::error::{HostdbError, Result};
use crate::platform::Platform;
use crate::version::VersionSpec;

pub mod hash;
pub mod http;

pub use http::{Fetcher, HttpFetcher};

/// Container format of a vendor download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
    #[serde(rename = "tar.xz")]
    TarXz,
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "jar")]
    Jar,
    #[serde(rename = "msi")]
    Msi,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Jar => "jar",
            ArchiveFormat::Msi => "msi",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    #[default]
    Official,
    Mirror,
    BuildRequired,
}

/// How the artifact for one (version, platform) pair is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSourceEntry")]
pub enum SourceEntry {
    Downloadable {
        url: String,
        format: ArchiveFormat,
        checksum: Option<String>,
        source_type: SourceType,
    },
    BuildRequired {
        note: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSourceEntry {
    url: Option<String>,
    format: Option<ArchiveFormat>,
    #[serde(alias = "sha256", alias = "sha3_256")]
    checksum: Option<String>,
    source_type: Option<SourceType>,
    note: Option<String>,
}

impl TryFrom<RawSourceEntry> for SourceEntry {
    type Error = String;

    fn try_from(raw: RawSourceEntry) -> std::result::Result<Self, Self::Error> {
        let source_type = raw.source_type.unwrap_or_default();
        if source_type == SourceType::BuildRequired {
            return Ok(SourceEntry::BuildRequired { note: raw.note });
        }

        let url = raw
            .url
            .ok_or_else(|| "downloadable entry is missing 'url'".to_string())?;
        if !(url.starts_with("https://") || url.starts_with("http://") || url.starts_with("file://"))
        {
            return Err(format!("unsupported URL scheme in '{}'", url));
        }
        let format = raw
            .format
            .ok_or_else(|| format!("entry for '{}' is missing 'format'", url))?;
        let checksum = raw.checksum.filter(|c| !c.trim().is_empty());
        if let Some(sum) = &checksum {
            if !sum.trim().chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(format!("checksum for '{}' is not hexadecimal", url));
            }
        }

        Ok(SourceEntry::Downloadable {
            url,
            format,
            checksum,
            source_type,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    database: String,
    versions: BTreeMap<String, BTreeMap<String, SourceEntry>>,
    #[serde(default)]
    components: BTreeMap<String, BTreeMap<String, SourceEntry>>,
    #[serde(default)]
    notes: Option<serde_json::Value>,
}

type PlatformTable = BTreeMap<Platform, SourceEntry>;

/// The loaded `sources.json` of one database. Read-only after load.
#[derive(Debug)]
pub struct SourceCatalog {
    database: Database,
    path: PathBuf,
    versions: BTreeMap<VersionSpec, PlatformTable>,
    components: BTreeMap<String, PlatformTable>,
    notes: Option<serde_json::Value>,
}

fn platform_table(
    raw: BTreeMap<String, SourceEntry>,
    path: &Path,
    owner: &str,
) -> Result<PlatformTable> {
    raw.into_iter()
        .map(|(key, entry)| {
            let platform = key.parse::<Platform>().map_err(|_| HostdbError::InvalidSources {
                path: path.to_path_buf(),
                reason: format!("unknown platform '{}' under {}", key, owner),
            })?;
            Ok((platform, entry))
        })
        .collect()
}

impl SourceCatalog {
    pub fn load(settings: &Settings, database: Database) -> Result<Self> {
        Self::from_path(&settings.sources_path(database), database)
    }

    pub fn from_path(path: &Path, database: Database) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HostdbError::io(format!("failed to read sources file {}", path.display()), e)
        })?;
        Self::parse(&text, path, database)
    }

    pub fn parse(text: &str, path: &Path, database: Database) -> Result<Self> {
        let file: SourcesFile =
            serde_json::from_str(text).map_err(|e| HostdbError::InvalidSources {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if file.database != database.name() {
            return Err(HostdbError::InvalidSources {
                path: path.to_path_buf(),
                reason: format!(
                    "file describes '{}', expected '{}'",
                    file.database,
                    database.name()
                ),
            });
        }

        let mut versions = BTreeMap::new();
        for (raw_version, platforms) in file.versions {
            let version =
                VersionSpec::parse(&raw_version).map_err(|e| HostdbError::InvalidSources {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            let owner = format!("version {}", raw_version);
            versions.insert(version, platform_table(platforms, path, &owner)?);
        }

        let mut components = BTreeMap::new();
        for (name, platforms) in file.components {
            let owner = format!("component {}", name);
            components.insert(name, platform_table(platforms, path, &owner)?);
        }

        Ok(Self {
            database,
            path: path.to_path_buf(),
            versions,
            components,
            notes: file.notes,
        })
    }

    pub fn database(&self) -> Database {
        self.database
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn notes(&self) -> Option<&serde_json::Value> {
        self.notes.as_ref()
    }

    /// Fails with `SourceNotFound` when the version is not configured at all.
    pub fn ensure_version(&self, version: &VersionSpec) -> Result<()> {
        if self.versions.contains_key(version) {
            return Ok(());
        }
        Err(HostdbError::SourceNotFound {
            database: self.database.name().to_string(),
            version: version.to_string(),
            available: self
                .versions()
                .iter()
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Look up the source for one platform. `None` means the platform is
    /// unavailable for this version and should be skipped.
    pub fn resolve(&self, version: &VersionSpec, platform: Platform) -> Option<&SourceEntry> {
        self.versions.get(version)?.get(&platform)
    }

    pub fn component(&self, name: &str, platform: Platform) -> Option<&SourceEntry> {
        self.components.get(name)?.get(&platform)
    }

    /// Configured versions, newest first.
    pub fn versions(&self) -> Vec<&VersionSpec> {
        let mut versions: Vec<_> = self.versions.keys().collect();
        versions.sort_by_key(|v| std::cmp::Reverse(v.components()));
        versions
    }

    pub fn platforms(&self, version: &VersionSpec) -> Vec<(Platform, &SourceEntry)> {
        self.versions
            .get(version)
            .map(|table| table.iter().map(|(p, e)| (*p, e)).collect())
            .unwrap_or_default()
    }
}
