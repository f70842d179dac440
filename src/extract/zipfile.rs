// Zip and JAR extraction with the zip crate

use std::fs::{self, File};
use std::io;
use std::path::Path;

use log::{debug, warn};

use super::Extractor;
use crate::error::{HostdbError, Result};

/// In-process zip reader, so no host needs an `unzip` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

fn failure(archive: &Path, reason: impl Into<String>) -> HostdbError {
    HostdbError::ExtractionFailure {
        path: archive.to_path_buf(),
        reason: reason.into(),
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
        .map_err(|e| HostdbError::io(format!("failed to chmod {}", path.display()), e))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

impl Extractor for ZipExtractor {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)
            .map_err(|e| HostdbError::io(format!("failed to create {}", dest.display()), e))?;

        let file = File::open(archive)
            .map_err(|e| HostdbError::io(format!("failed to open {}", archive.display()), e))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| failure(archive, e.to_string()))?;

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| failure(archive, e.to_string()))?;

            // Entries that would escape `dest` are skipped, not trusted
            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipping unsafe zip entry '{}'", entry.name());
                continue;
            };
            let out_path = dest.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| {
                    HostdbError::io(format!("failed to create {}", out_path.display()), e)
                })?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    HostdbError::io(format!("failed to create {}", parent.display()), e)
                })?;
            }
            let mut out = File::create(&out_path).map_err(|e| {
                HostdbError::io(format!("failed to write {}", out_path.display()), e)
            })?;
            io::copy(&mut entry, &mut out)
                .map_err(|e| failure(archive, format!("{}: {}", entry.name(), e)))?;

            if let Some(mode) = entry.unix_mode() {
                apply_mode(&out_path, mode)?;
            }
        }

        debug!("Extracted {} entries from {}", zip.len(), archive.display());
        Ok(())
    }
}
