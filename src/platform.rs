// Platform targets that archives are produced for

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HostdbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "linux-x64")]
    LinuxX64,
    #[serde(rename = "linux-arm64")]
    LinuxArm64,
    #[serde(rename = "darwin-x64")]
    DarwinX64,
    #[serde(rename = "darwin-arm64")]
    DarwinArm64,
    #[serde(rename = "win32-x64")]
    Win32X64,
}

impl Platform {
    /// All targets, in the order an `--all-platforms` run visits them.
    pub const ALL: [Platform; 5] = [
        Platform::LinuxX64,
        Platform::LinuxArm64,
        Platform::DarwinX64,
        Platform::DarwinArm64,
        Platform::Win32X64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinuxX64 => "linux-x64",
            Platform::LinuxArm64 => "linux-arm64",
            Platform::DarwinX64 => "darwin-x64",
            Platform::DarwinArm64 => "darwin-arm64",
            Platform::Win32X64 => "win32-x64",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Win32X64)
    }

    /// Extension of the repackaged archive for this target.
    pub fn archive_extension(&self) -> &'static str {
        if self.is_windows() { "zip" } else { "tar.gz" }
    }

    /// Name of an executable on this target.
    pub fn executable_name(&self, stem: &str) -> String {
        if self.is_windows() {
            format!("{}.exe", stem)
        } else {
            stem.to_string()
        }
    }

    pub fn goos(&self) -> &'static str {
        match self {
            Platform::LinuxX64 | Platform::LinuxArm64 => "linux",
            Platform::DarwinX64 | Platform::DarwinArm64 => "darwin",
            Platform::Win32X64 => "windows",
        }
    }

    pub fn goarch(&self) -> &'static str {
        match self {
            Platform::LinuxX64 | Platform::DarwinX64 | Platform::Win32X64 => "amd64",
            Platform::LinuxArm64 | Platform::DarwinArm64 => "arm64",
        }
    }

    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = HostdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                HostdbError::InvalidArgument(format!(
                    "unknown platform '{}'. Supported platforms: {}",
                    s,
                    Self::supported_list()
                ))
            })
    }
}
