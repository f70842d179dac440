// MSI extraction: an ordered chain of tools with a manual-handling fallback

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};

use super::Extractor;
use crate::error::{HostdbError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsiTool {
    /// Windows installer administrative install
    Msiexec(PathBuf),
    SevenZip(PathBuf),
    Lessmsi(PathBuf),
}

impl MsiTool {
    fn label(&self) -> &'static str {
        match self {
            MsiTool::Msiexec(_) => "msiexec",
            MsiTool::SevenZip(_) => "7z",
            MsiTool::Lessmsi(_) => "lessmsi",
        }
    }

    fn command(&self, msi: &Path, dest: &Path) -> Command {
        match self {
            MsiTool::Msiexec(exe) => {
                let mut cmd = Command::new(exe);
                cmd.arg("/a")
                    .arg(msi)
                    .arg("/qn")
                    .arg(format!("TARGETDIR={}", dest.display()));
                cmd
            }
            MsiTool::SevenZip(exe) => {
                let mut cmd = Command::new(exe);
                cmd.arg("x").arg(msi).arg(format!("-o{}", dest.display())).arg("-y");
                cmd
            }
            MsiTool::Lessmsi(exe) => {
                // lessmsi wants the output directory with a trailing separator
                let mut out = dest.as_os_str().to_os_string();
                out.push(std::path::MAIN_SEPARATOR_STR);
                let mut cmd = Command::new(exe);
                cmd.arg("x").arg(msi).arg(out);
                cmd
            }
        }
    }
}

/// Tries each available tool in order. When all of them fail (or none is
/// installed) the installer is copied into `dest` untouched and the platform
/// fails with a message asking for manual or CI-side extraction.
#[derive(Debug, Clone)]
pub struct MsiExtractor {
    chain: Vec<MsiTool>,
}

impl MsiExtractor {
    pub fn new(chain: Vec<MsiTool>) -> Self {
        Self { chain }
    }

    fn defer(&self, msi: &Path, dest: &Path, attempts: &[String]) -> Result<()> {
        let file_name = msi.file_name().unwrap_or_default();
        let left_at = dest.join(file_name);
        fs::copy(msi, &left_at)
            .map_err(|e| HostdbError::io(format!("failed to copy {}", msi.display()), e))?;

        let tried = if attempts.is_empty() {
            "no MSI tool installed (msiexec, 7z, lessmsi)".to_string()
        } else {
            attempts.join("; ")
        };
        Err(HostdbError::ExtractionFailure {
            path: msi.to_path_buf(),
            reason: format!(
                "{}. Installer left at {} for manual extraction",
                tried,
                left_at.display()
            ),
        })
    }
}

impl Extractor for MsiExtractor {
    fn name(&self) -> &'static str {
        "msi"
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)
            .map_err(|e| HostdbError::io(format!("failed to create {}", dest.display()), e))?;
        // msiexec rejects relative TARGETDIR values
        let dest = fs::canonicalize(dest)
            .map_err(|e| HostdbError::io(format!("failed to resolve {}", dest.display()), e))?;

        let mut attempts = Vec::new();
        for tool in &self.chain {
            debug!("Extracting {} with {}", archive.display(), tool.label());
            match tool.command(archive, &dest).output() {
                Ok(output) if output.status.success() => return Ok(()),
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(
                        "{} could not extract {}: {}",
                        tool.label(),
                        archive.display(),
                        stderr.trim()
                    );
                    attempts.push(format!("{} exited with {}", tool.label(), output.status));
                }
                Err(e) => {
                    warn!("{} failed to start: {}", tool.label(), e);
                    attempts.push(format!("{} failed to start: {}", tool.label(), e));
                }
            }
        }

        self.defer(archive, &dest, &attempts)
    }
}
