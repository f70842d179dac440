// Tarball extraction through the system tar

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use super::Extractor;
use crate::error::{HostdbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    Gzip,
    Xz,
}

impl TarCompression {
    fn flag(&self) -> &'static str {
        match self {
            TarCompression::Gzip => "-xzf",
            TarCompression::Xz => "-xJf",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TarExtractor {
    tar: PathBuf,
    compression: TarCompression,
}

impl TarExtractor {
    pub fn new(tar: PathBuf, compression: TarCompression) -> Self {
        Self { tar, compression }
    }
}

impl Extractor for TarExtractor {
    fn name(&self) -> &'static str {
        match self.compression {
            TarCompression::Gzip => "tar (gzip)",
            TarCompression::Xz => "tar (xz)",
        }
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)
            .map_err(|e| HostdbError::io(format!("failed to create {}", dest.display()), e))?;

        debug!(
            "{} {} {} -C {}",
            self.tar.display(),
            self.compression.flag(),
            archive.display(),
            dest.display()
        );
        let output = Command::new(&self.tar)
            .arg(self.compression.flag())
            .arg(archive)
            .arg("-C")
            .arg(dest)
            .output()
            .map_err(|e| HostdbError::ExtractionFailure {
                path: archive.to_path_buf(),
                reason: format!("failed to run tar: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HostdbError::ExtractionFailure {
                path: archive.to_path_buf(),
                reason: format!("tar extraction failed: {}", stderr.trim()),
            });
        }

        Ok(())
    }
}
