// Repackaging: normalize a payload into `<db>/` and archive it

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::constants;
use crate::databases::Database;
use crate::error::{HostdbError, Result};
use crate::metadata::ProvenanceMetadata;
use crate::platform::Platform;
use crate::tools::{Tool, Toolbox};

/// How a payload directory maps onto the canonical `<db>/` tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadPlacement {
    /// Copy the payload's contents as-is.
    Tree,
    /// Loose files at the payload root go into `bin/`; directories are kept.
    BinOnly,
}

/// An extracted auxiliary component. Only its `bin/` is merged.
#[derive(Debug, Clone)]
pub struct ComponentPayload {
    pub name: String,
    pub dir: PathBuf,
}

pub struct RepackageRequest<'a> {
    pub database: Database,
    pub platform: Platform,
    pub payload: &'a Path,
    pub components: &'a [ComponentPayload],
    pub output: &'a Path,
    pub metadata: &'a ProvenanceMetadata,
}

/// Final archive name, e.g. `mysql-8.4.3-linux-x64.tar.gz`.
pub fn archive_name(database: Database, version: &str, platform: Platform) -> String {
    format!(
        "{}-{}-{}.{}",
        database.name(),
        version,
        platform,
        platform.archive_extension()
    )
}

fn io_err(action: &str, path: &Path) -> impl FnOnce(io::Error) -> HostdbError {
    let context = format!("failed to {} {}", action, path.display());
    move |e| HostdbError::io(context, e)
}

/// Recursively copy `src` into `dst`, keeping symlinks as symlinks where the
/// host supports them and never copying a stray metadata record.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(io_err("create", dst))?;

    let mut entries = fs::read_dir(src)
        .map_err(io_err("read", src))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(io_err("read", src))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if name == constants::METADATA_FILE {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        let file_type = fs::symlink_metadata(&from)
            .map_err(io_err("stat", &from))?
            .file_type();

        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(io_err("copy", &from))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from).map_err(io_err("read link", from))?;
    std::os::unix::fs::symlink(&target, to).map_err(io_err("link", to))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        copy_tree(from, to)
    } else {
        fs::copy(from, to).map(|_| ()).map_err(io_err("copy", from))
    }
}

fn place_payload(payload: &Path, db_dir: &Path, placement: PayloadPlacement) -> Result<()> {
    match placement {
        PayloadPlacement::Tree => copy_tree(payload, db_dir),
        PayloadPlacement::BinOnly => {
            let bin = db_dir.join("bin");
            fs::create_dir_all(&bin).map_err(io_err("create", &bin))?;
            for entry in fs::read_dir(payload).map_err(io_err("read", payload))? {
                let entry = entry.map_err(io_err("read", payload))?;
                let name = entry.file_name();
                if name == constants::METADATA_FILE {
                    continue;
                }
                let from = entry.path();
                if from.is_dir() {
                    copy_tree(&from, &db_dir.join(&name))?;
                } else {
                    fs::copy(&from, bin.join(&name)).map_err(io_err("copy", &from))?;
                }
            }
            Ok(())
        }
    }
}

/// Merge each component's `bin/` into the shared `bin/`.
fn merge_components(components: &[ComponentPayload], db_dir: &Path) -> Result<()> {
    for component in components {
        let bin = component.dir.join("bin");
        if !bin.is_dir() {
            return Err(HostdbError::ExtractionFailure {
                path: component.dir.clone(),
                reason: format!("component '{}' has no bin/ directory", component.name),
            });
        }
        debug!("Merging {} into {}", bin.display(), db_dir.display());
        copy_tree(&bin, &db_dir.join("bin"))?;
    }
    Ok(())
}

#[cfg(unix)]
fn mark_executables(db_dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let bin = db_dir.join("bin");
    if !bin.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(&bin).map_err(io_err("read", &bin))? {
        let path = entry.map_err(io_err("read", &bin))?.path();
        // Leave symlinks alone; their targets are handled on their own
        let meta = fs::symlink_metadata(&path).map_err(io_err("stat", &path))?;
        if meta.file_type().is_file() {
            let mode = meta.permissions().mode() | 0o755;
            fs::set_permissions(&path, fs::Permissions::from_mode(mode))
                .map_err(io_err("chmod", &path))?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn mark_executables(_db_dir: &Path) -> Result<()> {
    Ok(())
}

/// Writes the staged tree as tar.gz (via the system tar) or zip.
#[derive(Debug, Clone)]
pub struct Archiver {
    tar: Option<PathBuf>,
}

impl Archiver {
    pub fn select(toolbox: &Toolbox) -> Self {
        Self {
            tar: toolbox.path(Tool::Tar).map(Path::to_path_buf),
        }
    }

    /// The tool needed to produce archives for `platform`, if any.
    pub fn required_tool(platform: Platform) -> Option<Tool> {
        if platform.is_windows() {
            None
        } else {
            Some(Tool::Tar)
        }
    }

    /// Archive `root/<top>` into `dest` with `<top>` as the sole entry.
    pub fn write(&self, platform: Platform, root: &Path, top: &str, dest: &Path) -> Result<()> {
        if platform.is_windows() {
            write_zip(root, top, dest)
        } else {
            let tar = self.tar.as_ref().ok_or_else(|| HostdbError::ToolMissing {
                tool: Tool::Tar.name().to_string(),
                purpose: "tar.gz archive creation".to_string(),
            })?;
            write_tar_gz(tar, root, top, dest)
        }
    }
}

fn write_tar_gz(tar: &Path, root: &Path, top: &str, dest: &Path) -> Result<()> {
    let output = Command::new(tar)
        .arg("-czf")
        .arg(dest)
        .arg("-C")
        .arg(root)
        .arg(top)
        .output()
        .map_err(io_err("run tar for", dest))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HostdbError::io(
            format!("tar failed for {}", dest.display()),
            io::Error::other(stderr.trim().to_string()),
        ));
    }
    Ok(())
}

fn zip_entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn add_zip_dir(
    zip: &mut ZipWriter<File>,
    root: &Path,
    dir: &Path,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(io_err("read", dir))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(io_err("read", dir))?;
    entries.sort_by_key(|e| e.file_name());

    let relative_dir = dir.strip_prefix(root).unwrap_or(dir);
    let is_bin = relative_dir.file_name().is_some_and(|n| n == "bin");

    for entry in entries {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let name = zip_entry_name(relative);
        let zip_err = |e: zip::result::ZipError| {
            HostdbError::io(format!("failed to add {} to zip", name), io::Error::other(e))
        };

        if path.is_dir() {
            let options = FileOptions::<()>::default().unix_permissions(0o755);
            zip.add_directory(format!("{}/", name), options)
                .map_err(zip_err)?;
            add_zip_dir(zip, root, &path)?;
        } else {
            let mode = if is_bin { 0o755 } else { 0o644 };
            let options = FileOptions::<()>::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(mode);
            zip.start_file(name.clone(), options).map_err(zip_err)?;
            let mut file = File::open(&path).map_err(io_err("open", &path))?;
            io::copy(&mut file, zip).map_err(io_err("compress", &path))?;
        }
    }
    Ok(())
}

fn write_zip(root: &Path, top: &str, dest: &Path) -> Result<()> {
    let file = File::create(dest).map_err(io_err("create", dest))?;
    let mut zip = ZipWriter::new(file);

    let options = FileOptions::<()>::default().unix_permissions(0o755);
    zip.add_directory(format!("{}/", top), options)
        .map_err(|e| HostdbError::io("failed to start zip", io::Error::other(e)))?;
    add_zip_dir(&mut zip, root, &root.join(top))?;

    zip.finish()
        .map_err(|e| HostdbError::io("failed to finish zip", io::Error::other(e)))?;
    Ok(())
}

/// Assemble the canonical tree and write the final archive.
///
/// The archive is written next to `output` under a temporary name and renamed
/// into place, so `output` only ever holds a complete archive. The staging
/// tree is removed on every path.
pub fn repackage(request: &RepackageRequest<'_>, archiver: &Archiver) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix("hostdb-staging-")
        .tempdir()
        .map_err(|e| HostdbError::io("failed to create staging directory", e))?;

    let top = request.database.name();
    let db_dir = staging.path().join(top);

    place_payload(request.payload, &db_dir, request.database.placement())?;
    merge_components(request.components, &db_dir)?;
    if !request.platform.is_windows() {
        mark_executables(&db_dir)?;
    }
    // Last, so the record reflects the final composition
    request.metadata.write_to(&db_dir)?;

    if let Some(parent) = request.output.parent() {
        fs::create_dir_all(parent).map_err(io_err("create", parent))?;
    }
    let mut temp_name = request.output.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_output = request.output.with_file_name(temp_name);

    let written = archiver
        .write(request.platform, staging.path(), top, &temp_output)
        .and_then(|_| fs::rename(&temp_output, request.output).map_err(io_err("rename", &temp_output)));
    if written.is_err() {
        let _ = fs::remove_file(&temp_output);
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionSpec;
    use tempfile::TempDir;

    fn metadata(db: Database, platform: Platform) -> ProvenanceMetadata {
        ProvenanceMetadata::new(
            db,
            &VersionSpec::parse("1.2.3").unwrap(),
            platform,
            "file:///dev/null",
        )
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(
            archive_name(Database::Mysql, "8.4.3", Platform::LinuxX64),
            "mysql-8.4.3-linux-x64.tar.gz"
        );
        assert_eq!(
            archive_name(Database::Sqlite, "3.47.2", Platform::Win32X64),
            "sqlite-3.47.2-win32-x64.zip"
        );
    }

    #[test]
    fn test_bin_only_placement_keeps_directories() {
        let temp = TempDir::new().unwrap();
        let payload = temp.path().join("payload");
        fs::create_dir_all(payload.join("share")).unwrap();
        fs::write(payload.join("sqlite3"), b"x").unwrap();
        fs::write(payload.join("share").join("doc.txt"), b"d").unwrap();
        fs::write(payload.join(constants::METADATA_FILE), b"{}").unwrap();

        let db_dir = temp.path().join("sqlite");
        place_payload(&payload, &db_dir, PayloadPlacement::BinOnly).unwrap();

        assert!(db_dir.join("bin/sqlite3").is_file());
        assert!(db_dir.join("share/doc.txt").is_file());
        assert!(!db_dir.join("bin").join(constants::METADATA_FILE).exists());
    }

    #[test]
    fn test_components_merge_into_shared_bin() {
        let temp = TempDir::new().unwrap();
        let payload = temp.path().join("mongodb-linux");
        fs::create_dir_all(payload.join("bin")).unwrap();
        fs::write(payload.join("bin/mongod"), b"server").unwrap();

        let shell = temp.path().join("mongosh-2.3.8");
        fs::create_dir_all(shell.join("bin")).unwrap();
        fs::write(shell.join("bin/mongosh"), b"shell").unwrap();
        fs::write(shell.join("LICENSE"), b"not merged").unwrap();

        let db_dir = temp.path().join("mongodb");
        place_payload(&payload, &db_dir, PayloadPlacement::Tree).unwrap();
        merge_components(
            &[ComponentPayload {
                name: "mongosh".into(),
                dir: shell,
            }],
            &db_dir,
        )
        .unwrap();

        assert!(db_dir.join("bin/mongod").is_file());
        assert!(db_dir.join("bin/mongosh").is_file());
        assert!(!db_dir.join("LICENSE").exists());
    }

    #[test]
    fn test_component_without_bin_fails() {
        let temp = TempDir::new().unwrap();
        let component = temp.path().join("jre");
        fs::create_dir_all(&component).unwrap();
        let err = merge_components(
            &[ComponentPayload {
                name: "jre".into(),
                dir: component,
            }],
            &temp.path().join("questdb"),
        )
        .unwrap_err();
        assert!(matches!(err, HostdbError::ExtractionFailure { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_bin_files_become_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let db_dir = temp.path().join("redis");
        fs::create_dir_all(db_dir.join("bin")).unwrap();
        let server = db_dir.join("bin/redis-server");
        fs::write(&server, b"x").unwrap();
        fs::set_permissions(&server, fs::Permissions::from_mode(0o644)).unwrap();

        mark_executables(&db_dir).unwrap();
        let mode = fs::metadata(&server).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }

    #[test]
    fn test_windows_target_produces_single_top_level_zip() {
        let temp = TempDir::new().unwrap();
        let payload = temp.path().join("payload");
        fs::create_dir_all(&payload).unwrap();
        fs::write(payload.join("redis-server.exe"), b"exe").unwrap();

        let output = temp.path().join("dist").join("redis-1.2.3-win32-x64.zip");
        let meta = metadata(Database::Redis, Platform::Win32X64);
        let request = RepackageRequest {
            database: Database::Redis,
            platform: Platform::Win32X64,
            payload: &payload,
            components: &[],
            output: &output,
            metadata: &meta,
        };
        repackage(&request, &Archiver::select(&Toolbox::default())).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.iter().all(|n| n.starts_with("redis/")), "{:?}", names);
        assert!(names.contains(&"redis/bin/redis-server.exe".to_string()));
        assert!(names.contains(&"redis/.hostdb-metadata.json".to_string()));

        let mut record = String::new();
        io::Read::read_to_string(
            &mut zip.by_name("redis/.hostdb-metadata.json").unwrap(),
            &mut record,
        )
        .unwrap();
        assert!(record.contains("\"platform\": \"win32-x64\""));
        assert!(!output.with_file_name("redis-1.2.3-win32-x64.zip.tmp").exists());
    }

    #[test]
    fn test_unix_target_without_tar_leaves_no_output() {
        let temp = TempDir::new().unwrap();
        let payload = temp.path().join("payload");
        fs::create_dir_all(&payload).unwrap();

        let output = temp.path().join("redis-1.2.3-linux-x64.tar.gz");
        let meta = metadata(Database::Redis, Platform::LinuxX64);
        let request = RepackageRequest {
            database: Database::Redis,
            platform: Platform::LinuxX64,
            payload: &payload,
            components: &[],
            output: &output,
            metadata: &meta,
        };
        let err = repackage(&request, &Archiver::select(&Toolbox::default())).unwrap_err();
        assert!(matches!(err, HostdbError::ToolMissing { .. }));
        assert!(!output.exists());
    }
}
