// External command discovery, done once per run

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{HostdbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    Tar,
    Msiexec,
    SevenZip,
    Lessmsi,
    Bash,
    Docker,
    Git,
    Go,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::Tar,
        Tool::Msiexec,
        Tool::SevenZip,
        Tool::Lessmsi,
        Tool::Bash,
        Tool::Docker,
        Tool::Git,
        Tool::Go,
    ];

    /// Executable names tried in order.
    fn candidates(&self) -> &'static [&'static str] {
        match self {
            Tool::Tar => &["tar"],
            Tool::Msiexec => &["msiexec"],
            Tool::SevenZip => &["7z", "7zz", "7za"],
            Tool::Lessmsi => &["lessmsi"],
            Tool::Bash => &["bash"],
            Tool::Docker => &["docker"],
            Tool::Git => &["git"],
            Tool::Go => &["go"],
        }
    }

    pub fn name(&self) -> &'static str {
        self.candidates()[0]
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The external tools available to this run.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    found: BTreeMap<Tool, PathBuf>,
}

impl Toolbox {
    /// Look every tool up on `PATH`.
    pub fn probe() -> Self {
        let mut found = BTreeMap::new();
        for tool in Tool::ALL {
            let hit = tool
                .candidates()
                .iter()
                .find_map(|exe| which::which(exe).ok());
            match hit {
                Some(path) => {
                    debug!("Found {} at {}", tool, path.display());
                    found.insert(tool, path);
                }
                None => debug!("{} not found on PATH", tool),
            }
        }
        Self { found }
    }

    /// A toolbox with exactly the given tools, for tests and dry runs.
    pub fn with_tools(tools: impl IntoIterator<Item = (Tool, PathBuf)>) -> Self {
        Self {
            found: tools.into_iter().collect(),
        }
    }

    pub fn path(&self, tool: Tool) -> Option<&Path> {
        self.found.get(&tool).map(PathBuf::as_path)
    }

    pub fn require(&self, tool: Tool, purpose: &str) -> Result<&Path> {
        self.path(tool).ok_or_else(|| HostdbError::ToolMissing {
            tool: tool.name().to_string(),
            purpose: purpose.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_missing_tool() {
        let toolbox = Toolbox::with_tools([(Tool::Tar, PathBuf::from("/usr/bin/tar"))]);
        assert_eq!(
            toolbox.require(Tool::Tar, "extraction").unwrap(),
            Path::new("/usr/bin/tar")
        );
        match toolbox.require(Tool::Docker, "source builds") {
            Err(HostdbError::ToolMissing { tool, purpose }) => {
                assert_eq!(tool, "docker");
                assert_eq!(purpose, "source builds");
            }
            other => panic!("expected ToolMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_seven_zip_has_alternates() {
        assert_eq!(Tool::SevenZip.name(), "7z");
        assert!(Tool::SevenZip.candidates().contains(&"7za"));
    }
}
