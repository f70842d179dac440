// Extract module: unpacking vendor downloads and finding the payload inside

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{HostdbError, Result};
use crate::sources::ArchiveFormat;
use crate::tools::{Tool, Toolbox};

mod msi;
mod tarball;
mod zipfile;

pub use msi::{MsiExtractor, MsiTool};
pub use tarball::{TarCompression, TarExtractor};
pub use zipfile::ZipExtractor;

/// Unpacks one archive format into a directory.
pub trait Extractor {
    fn name(&self) -> &'static str;

    /// Extract `archive` into `dest`, which is created if needed.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Where the payload directory sits inside an extracted download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLocator {
    /// The extraction directory is itself the payload.
    Root,
    /// First directory whose name starts with the prefix (case-insensitive).
    Prefix(&'static str),
    /// First directory whose name ends with the suffix (case-insensitive).
    Suffix(&'static str),
}

/// The extractors available to this run, chosen once from the toolbox.
#[derive(Debug, Clone)]
pub struct Extractors {
    tar: Option<PathBuf>,
    msi_chain: Vec<MsiTool>,
}

impl Extractors {
    pub fn select(toolbox: &Toolbox) -> Self {
        let mut msi_chain = Vec::new();
        if let Some(path) = toolbox.path(Tool::Msiexec) {
            msi_chain.push(MsiTool::Msiexec(path.to_path_buf()));
        }
        if let Some(path) = toolbox.path(Tool::SevenZip) {
            msi_chain.push(MsiTool::SevenZip(path.to_path_buf()));
        }
        if let Some(path) = toolbox.path(Tool::Lessmsi) {
            msi_chain.push(MsiTool::Lessmsi(path.to_path_buf()));
        }

        Self {
            tar: toolbox.path(Tool::Tar).map(Path::to_path_buf),
            msi_chain,
        }
    }

    /// The tool a format cannot be extracted without, if any.
    pub fn required_tool(format: ArchiveFormat) -> Option<Tool> {
        match format {
            ArchiveFormat::TarGz | ArchiveFormat::TarXz => Some(Tool::Tar),
            // zip/jar are read in-process; MSI always has the deferral fallback
            ArchiveFormat::Zip | ArchiveFormat::Jar | ArchiveFormat::Msi => None,
        }
    }

    pub fn has_msi_tool(&self) -> bool {
        !self.msi_chain.is_empty()
    }

    pub fn for_format(&self, format: ArchiveFormat) -> Result<Box<dyn Extractor>> {
        let tar = |compression| -> Result<Box<dyn Extractor>> {
            let path = self.tar.clone().ok_or_else(|| HostdbError::ToolMissing {
                tool: Tool::Tar.name().to_string(),
                purpose: format!("{} extraction", format),
            })?;
            Ok(Box::new(TarExtractor::new(path, compression)))
        };

        match format {
            ArchiveFormat::TarGz => tar(TarCompression::Gzip),
            ArchiveFormat::TarXz => tar(TarCompression::Xz),
            // A JAR is a zip container
            ArchiveFormat::Zip | ArchiveFormat::Jar => Ok(Box::new(ZipExtractor)),
            ArchiveFormat::Msi => Ok(Box::new(MsiExtractor::new(self.msi_chain.clone()))),
        }
    }

    /// Extract `archive` of `format` into `dest` with the matching extractor.
    pub fn extract(&self, format: ArchiveFormat, archive: &Path, dest: &Path) -> Result<()> {
        let extractor = self.for_format(format)?;
        debug!(
            "Extracting {} with {} into {}",
            archive.display(),
            extractor.name(),
            dest.display()
        );
        extractor.extract(archive, dest)
    }
}

/// Find the payload directory inside `extracted`.
///
/// A miss is an `ExtractionFailure`: vendor layouts are stable, so it means
/// the locator is wrong rather than that a retry could help.
pub fn locate_payload(extracted: &Path, locator: PayloadLocator) -> Result<PathBuf> {
    let (pattern, wanted) = match locator {
        PayloadLocator::Root => return Ok(extracted.to_path_buf()),
        PayloadLocator::Prefix(prefix) => ("prefix", prefix),
        PayloadLocator::Suffix(suffix) => ("suffix", suffix),
    };
    let wanted_lower = wanted.to_lowercase();
    let is_match = |name: &str| {
        let name = name.to_lowercase();
        match locator {
            PayloadLocator::Suffix(_) => name.ends_with(&wanted_lower),
            PayloadLocator::Prefix(_) | PayloadLocator::Root => name.starts_with(&wanted_lower),
        }
    };

    let entries = fs::read_dir(extracted).map_err(|e| {
        HostdbError::io(format!("failed to read {}", extracted.display()), e)
    })?;

    let mut dirs: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| HostdbError::io(format!("failed to read {}", extracted.display()), e))?;
        if entry.path().is_dir() {
            dirs.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    dirs.sort();

    match dirs.iter().find(|name| is_match(name)) {
        Some(name) => Ok(extracted.join(name)),
        None => Err(HostdbError::ExtractionFailure {
            path: extracted.to_path_buf(),
            reason: format!(
                "no directory with {} '{}' (found: {})",
                pattern,
                wanted,
                if dirs.is_empty() {
                    "nothing".to_string()
                } else {
                    dirs.join(", ")
                }
            ),
        }),
    }
}
