// Inspect command: validate a repackaged archive and show its provenance

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::Command;

use anyhow::bail;

use crate::constants;
use crate::databases::Database;
use crate::error::{HostdbError, Result};
use crate::metadata::ProvenanceMetadata;
use crate::platform::Platform;
use crate::repackage;
use crate::sources::hash::{self, HashAlgorithm};
use crate::tools::{Tool, Toolbox};
use crate::ui::Ui;
use crate::version::VersionSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    Zip,
}

#[derive(Debug)]
pub struct ArchiveReport {
    pub top: String,
    pub entries: usize,
    pub metadata: ProvenanceMetadata,
    pub sha256: String,
}

fn invalid(archive: &Path, reason: impl Into<String>) -> HostdbError {
    HostdbError::ExtractionFailure {
        path: archive.to_path_buf(),
        reason: reason.into(),
    }
}

fn kind_of(archive: &Path) -> Result<ArchiveKind> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(ArchiveKind::TarGz)
    } else if name.ends_with(".zip") {
        Ok(ArchiveKind::Zip)
    } else {
        Err(HostdbError::InvalidArgument(format!(
            "'{}' is neither a .tar.gz nor a .zip archive",
            archive.display()
        )))
    }
}

fn run_tar(tar: &Path, flags: &str, archive: &Path, members: &[&str]) -> Result<String> {
    let output = Command::new(tar)
        .arg(flags)
        .arg(archive)
        .args(members)
        .output()
        .map_err(|e| invalid(archive, format!("failed to run tar: {}", e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(invalid(archive, stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn zip_error(archive: &Path) -> impl Fn(zip::result::ZipError) -> HostdbError + '_ {
    move |e| invalid(archive, e.to_string())
}

fn list_entries(kind: ArchiveKind, archive: &Path, toolbox: &Toolbox) -> Result<Vec<String>> {
    let raw: Vec<String> = match kind {
        ArchiveKind::TarGz => {
            let tar = toolbox.require(Tool::Tar, "tar.gz inspection")?;
            run_tar(tar, "-tzf", archive, &[])?
                .lines()
                .map(String::from)
                .collect()
        }
        ArchiveKind::Zip => {
            let file = File::open(archive)
                .map_err(|e| HostdbError::io(format!("failed to open {}", archive.display()), e))?;
            let zip = zip::ZipArchive::new(file).map_err(zip_error(archive))?;
            zip.file_names().map(String::from).collect()
        }
    };

    Ok(raw
        .into_iter()
        .map(|name| name.trim_start_matches("./").to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

fn read_member(kind: ArchiveKind, archive: &Path, toolbox: &Toolbox, member: &str) -> Result<String> {
    match kind {
        ArchiveKind::TarGz => {
            let tar = toolbox.require(Tool::Tar, "tar.gz inspection")?;
            run_tar(tar, "-xzOf", archive, &[member])
        }
        ArchiveKind::Zip => {
            let file = File::open(archive)
                .map_err(|e| HostdbError::io(format!("failed to open {}", archive.display()), e))?;
            let mut zip = zip::ZipArchive::new(file).map_err(zip_error(archive))?;
            let mut entry = zip.by_name(member).map_err(zip_error(archive))?;
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| invalid(archive, format!("cannot read {}: {}", member, e)))?;
            Ok(text)
        }
    }
}

/// Check that `archive` has exactly one top-level directory holding exactly
/// one well-formed provenance record, and return what it says.
pub fn inspect_archive(archive: &Path, toolbox: &Toolbox) -> Result<ArchiveReport> {
    let kind = kind_of(archive)?;
    let entries = list_entries(kind, archive, toolbox)?;

    let tops: BTreeSet<&str> = entries
        .iter()
        .filter_map(|name| name.split('/').next())
        .collect();
    let top = match tops.len() {
        1 => tops.iter().next().map(|t| t.to_string()).unwrap_or_default(),
        0 => return Err(invalid(archive, "archive is empty")),
        _ => {
            return Err(invalid(
                archive,
                format!(
                    "expected one top-level directory, found {}",
                    tops.into_iter().collect::<Vec<_>>().join(", ")
                ),
            ));
        }
    };

    let expected_member = format!("{}/{}", top, constants::METADATA_FILE);
    let records: Vec<&String> = entries
        .iter()
        .filter(|name| {
            name.rsplit('/').next() == Some(constants::METADATA_FILE)
        })
        .collect();
    match records.as_slice() {
        [only] if **only == expected_member => {}
        [] => return Err(invalid(archive, format!("missing {}", expected_member))),
        _ => {
            return Err(invalid(
                archive,
                format!(
                    "expected exactly one {}, found: {}",
                    expected_member,
                    records.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
                ),
            ));
        }
    }

    let text = read_member(kind, archive, toolbox, &expected_member)?;
    let metadata = ProvenanceMetadata::from_json(&text)
        .map_err(|e| invalid(archive, format!("malformed {}: {}", expected_member, e)))?;

    if metadata.name != top {
        return Err(invalid(
            archive,
            format!("metadata names '{}' but the archive holds '{}/'", metadata.name, top),
        ));
    }
    metadata
        .name
        .parse::<Database>()
        .and_then(|_| VersionSpec::parse(&metadata.version))
        .and_then(|_| metadata.platform.parse::<Platform>())
        .map_err(|e| invalid(archive, format!("metadata is inconsistent: {}", e)))?;
    chrono::DateTime::parse_from_rfc3339(&metadata.rehosted_at)
        .map_err(|e| invalid(archive, format!("bad rehosted_at '{}': {}", metadata.rehosted_at, e)))?;

    Ok(ArchiveReport {
        top,
        entries: entries.len(),
        sha256: hash::hash_file(archive, HashAlgorithm::Sha256)?,
        metadata,
    })
}

pub fn inspect(
    archive: &Path,
    database: Option<Database>,
    toolbox: &Toolbox,
    ui: Ui,
) -> anyhow::Result<i32> {
    let report = inspect_archive(archive, toolbox)?;
    let meta = &report.metadata;

    if let Some(database) = database {
        if meta.name != database.name() {
            bail!(
                "{} holds {}, not {}",
                archive.display(),
                meta.name,
                database
            );
        }
    }

    // Fields were validated above, so these parses cannot fail
    if let (Ok(db), Ok(version), Ok(platform)) = (
        meta.name.parse::<Database>(),
        VersionSpec::parse(&meta.version),
        meta.platform.parse::<Platform>(),
    ) {
        let expected = repackage::archive_name(db, version.as_str(), platform);
        let actual = archive.file_name().map(|n| n.to_string_lossy().to_string());
        if actual.as_deref() != Some(expected.as_str()) {
            ui.warning(&format!("Archive was renamed; canonical name is {}", expected));
        }
    }

    ui.success(&format!("{} ({} entries under {}/)", archive.display(), report.entries, report.top));
    ui.status("name", &meta.name);
    ui.status("version", &meta.version);
    ui.status("platform", &meta.platform);
    ui.status("source", &meta.source);
    ui.status("rehosted_by", &meta.rehosted_by);
    ui.status("rehosted_at", &meta.rehosted_at);
    ui.status("sha256", &report.sha256);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repackage::{Archiver, RepackageRequest};
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::{FileOptions, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            zip.start_file(name.to_string(), FileOptions::<()>::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn record(name: &str) -> String {
        format!(
            r#"{{"name":"{}","version":"3.47.2","platform":"win32-x64","source":"https://sqlite.org/x.zip","rehosted_by":"hostdb/0.1.0","rehosted_at":"2026-01-05T10:00:00Z"}}"#,
            name
        )
    }

    #[test]
    fn test_accepts_repackaged_archive() {
        let temp = TempDir::new().unwrap();
        let payload = temp.path().join("payload");
        fs::create_dir_all(&payload).unwrap();
        fs::write(payload.join("sqlite3.exe"), b"MZ").unwrap();

        let version = VersionSpec::parse("3.47.2").unwrap();
        let output = temp.path().join("sqlite-3.47.2-win32-x64.zip");
        let metadata = ProvenanceMetadata::new(
            Database::Sqlite,
            &version,
            Platform::Win32X64,
            "https://sqlite.org/2024/sqlite-tools-win-x64-3470200.zip",
        );
        repackage::repackage(
            &RepackageRequest {
                database: Database::Sqlite,
                platform: Platform::Win32X64,
                payload: &payload,
                components: &[],
                output: &output,
                metadata: &metadata,
            },
            &Archiver::select(&Toolbox::default()),
        )
        .unwrap();

        let report = inspect_archive(&output, &Toolbox::default()).unwrap();
        assert_eq!(report.top, "sqlite");
        assert_eq!(report.metadata, metadata);
        assert_eq!(report.sha256.len(), 64);
    }

    #[test]
    fn test_rejects_two_top_level_entries() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("sqlite-3.47.2-win32-x64.zip");
        write_zip(
            &archive,
            &[
                ("sqlite/.hostdb-metadata.json", record("sqlite").as_str()),
                ("extra/readme.txt", "hi"),
            ],
        );
        let err = inspect_archive(&archive, &Toolbox::default()).unwrap_err();
        assert!(err.to_string().contains("one top-level directory"));
    }

    #[test]
    fn test_rejects_missing_metadata() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("sqlite-3.47.2-win32-x64.zip");
        write_zip(&archive, &[("sqlite/bin/sqlite3.exe", "MZ")]);
        let err = inspect_archive(&archive, &Toolbox::default()).unwrap_err();
        assert!(err.to_string().contains("missing sqlite/.hostdb-metadata.json"));
    }

    #[test]
    fn test_rejects_nested_second_record() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("sqlite-3.47.2-win32-x64.zip");
        write_zip(
            &archive,
            &[
                ("sqlite/.hostdb-metadata.json", record("sqlite").as_str()),
                ("sqlite/share/.hostdb-metadata.json", record("sqlite").as_str()),
            ],
        );
        assert!(inspect_archive(&archive, &Toolbox::default()).is_err());
    }

    #[test]
    fn test_rejects_name_mismatch() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("sqlite-3.47.2-win32-x64.zip");
        write_zip(&archive, &[("sqlite/.hostdb-metadata.json", record("redis").as_str())]);
        let err = inspect_archive(&archive, &Toolbox::default()).unwrap_err();
        assert!(err.to_string().contains("metadata names 'redis'"));
    }

    #[test]
    fn test_unknown_extension() {
        let err = inspect_archive(Path::new("sqlite.rar"), &Toolbox::default()).unwrap_err();
        assert!(matches!(err, HostdbError::InvalidArgument(_)));
    }
}
