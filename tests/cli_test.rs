use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

/// Run the built binary against `root`, returning (exit code, combined output, stderr).
fn run_command(args: &[&str], root: &Path) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_hostdb"))
        .args(args)
        .env("HOSTDB_ROOT", root)
        .env("HOSTDB_CACHE_DIR", root.join("downloads"))
        .env("HOSTDB_OUTPUT_DIR", root.join("dist"))
        .env("CI", "true")
        .env_remove("RUST_LOG")
        .current_dir(root)
        .output()
        .expect("Failed to execute hostdb");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8(output.stdout).unwrap_or_default();
    let stderr = String::from_utf8(output.stderr).unwrap_or_default();
    let combined = format!("{}\n{}", stdout, stderr);
    (code, combined, stderr)
}

fn setup_test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

fn has_tool(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn sha256_of(path: &Path) -> String {
    hex::encode(Sha256::digest(fs::read(path).unwrap()))
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn write_sources(root: &Path, database: &str, json: &str) -> PathBuf {
    let dir = root.join("builds").join(database);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("sources.json");
    fs::write(&path, json).unwrap();
    path
}

/// A Windows Redis download: loose executables at the archive root.
fn create_redis_zip(path: &Path) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
    zip.start_file("redis-server.exe", options).unwrap();
    zip.write_all(b"MZ redis-server").unwrap();
    zip.start_file("redis-cli.exe", options).unwrap();
    zip.write_all(b"MZ redis-cli").unwrap();
    zip.finish().unwrap();
}

/// A MySQL Linux download: everything under one versioned directory.
fn create_mysql_tarball(vendor: &Path) -> PathBuf {
    let tree = vendor.join("src").join("mysql-8.4.3-linux-glibc2.28-x86_64");
    fs::create_dir_all(tree.join("bin")).unwrap();
    fs::create_dir_all(tree.join("lib")).unwrap();
    fs::write(tree.join("bin").join("mysqld"), b"#!/bin/sh\n").unwrap();
    fs::write(tree.join("lib").join("libmysqlclient.so"), b"elf").unwrap();

    let archive = vendor.join("mysql-8.4.3-linux-glibc2.28-x86_64.tar.gz");
    let status = Command::new("tar")
        .arg("-czf")
        .arg(&archive)
        .arg("-C")
        .arg(vendor.join("src"))
        .arg("mysql-8.4.3-linux-glibc2.28-x86_64")
        .status()
        .unwrap();
    assert!(status.success());
    archive
}

fn redis_sources(zip: &Path, checksum: &str) -> String {
    format!(
        r#"{{
  "database": "redis",
  "notes": "Redis Open Source",
  "versions": {{
    "7.4.1": {{
      "win32-x64": {{ "url": "{}", "format": "zip", "checksum": "{}", "sourceType": "mirror" }},
      "linux-arm64": {{ "sourceType": "build-required", "note": "built from source" }}
    }}
  }}
}}"#,
        file_url(zip),
        checksum
    )
}

#[test]
fn test_help_exits_zero() {
    let temp_dir = setup_test_dir();
    let (code, output, _) = run_command(&["--help"], temp_dir.path());
    assert_eq!(code, 0, "output: {}", output);
    assert!(output.contains("download"));
    assert!(output.contains("inspect"));
}

#[test]
fn test_invalid_version_exits_one_before_io() {
    let temp_dir = setup_test_dir();
    let (code, output, _) = run_command(
        &["download", "redis", "--version", "7.4", "--platform", "linux-x64"],
        temp_dir.path(),
    );
    assert_eq!(code, 1, "output: {}", output);
    assert!(output.contains("7.4"), "output: {}", output);
    assert!(!temp_dir.path().join("downloads").exists());
    assert!(!temp_dir.path().join("dist").exists());
}

#[test]
fn test_invalid_platform_exits_one() {
    let temp_dir = setup_test_dir();
    let (code, output, _) = run_command(
        &["download", "redis", "--version", "7.4.1", "--platform", "linux-x86"],
        temp_dir.path(),
    );
    assert_eq!(code, 1, "output: {}", output);
    assert!(output.contains("linux-x86"), "output: {}", output);
}

#[test]
fn test_unknown_version_exits_one() {
    let temp_dir = setup_test_dir();
    let vendor = temp_dir.path().join("vendor.zip");
    create_redis_zip(&vendor);
    write_sources(temp_dir.path(), "redis", &redis_sources(&vendor, &sha256_of(&vendor)));

    let (code, output, _) = run_command(
        &["download", "redis", "--version", "9.9.9", "--all-platforms"],
        temp_dir.path(),
    );
    assert_eq!(code, 1, "output: {}", output);
    assert!(output.contains("no source entry"), "output: {}", output);
    assert!(output.contains("7.4.1"), "configured versions listed: {}", output);
}

#[test]
fn test_download_zip_and_inspect() {
    let temp_dir = setup_test_dir();
    let vendor = temp_dir.path().join("vendor.zip");
    create_redis_zip(&vendor);
    write_sources(temp_dir.path(), "redis", &redis_sources(&vendor, &sha256_of(&vendor)));

    let (code, output, _) = run_command(
        &["download", "redis", "--version", "7.4.1", "--platform", "win32-x64"],
        temp_dir.path(),
    );
    assert_eq!(code, 0, "output: {}", output);

    let archive = temp_dir.path().join("dist").join("redis-7.4.1-win32-x64.zip");
    assert!(archive.is_file(), "archive missing. output: {}", output);
    assert!(output.contains(&sha256_of(&archive)), "sha256 printed: {}", output);
    assert!(
        temp_dir
            .path()
            .join("downloads")
            .join("redis-7.4.1-win32-x64-original.zip")
            .is_file()
    );

    let mut zip = zip::ZipArchive::new(fs::File::open(&archive).unwrap()).unwrap();
    let names: Vec<String> = zip.file_names().map(String::from).collect();
    assert!(names.iter().all(|n| n.starts_with("redis/")), "{:?}", names);
    assert!(names.contains(&"redis/bin/redis-server.exe".to_string()));
    let mut record = String::new();
    std::io::Read::read_to_string(
        &mut zip.by_name("redis/.hostdb-metadata.json").unwrap(),
        &mut record,
    )
    .unwrap();
    let record: serde_json::Value = serde_json::from_str(&record).unwrap();
    assert_eq!(record["name"], "redis");
    assert_eq!(record["version"], "7.4.1");
    assert_eq!(record["platform"], "win32-x64");
    assert_eq!(record["source"], file_url(&vendor));

    let (code, output, _) =
        run_command(&["inspect", archive.to_str().unwrap(), "--database", "redis"], temp_dir.path());
    assert_eq!(code, 0, "output: {}", output);
    assert!(output.contains("rehosted_at"), "output: {}", output);

    let (code, output, _) =
        run_command(&["inspect", archive.to_str().unwrap(), "--database", "mysql"], temp_dir.path());
    assert_eq!(code, 1, "output: {}", output);
}

#[test]
fn test_corrupt_cache_halts_then_refetches() {
    let temp_dir = setup_test_dir();
    let vendor = temp_dir.path().join("vendor.zip");
    create_redis_zip(&vendor);
    write_sources(temp_dir.path(), "redis", &redis_sources(&vendor, &sha256_of(&vendor)));

    let cached = temp_dir
        .path()
        .join("downloads")
        .join("redis-7.4.1-win32-x64-original.zip");
    fs::create_dir_all(cached.parent().unwrap()).unwrap();
    fs::write(&cached, b"truncated download").unwrap();

    let args = ["download", "redis", "--version", "7.4.1", "--platform", "win32-x64"];
    let (code, output, _) = run_command(&args, temp_dir.path());
    assert_eq!(code, 1, "output: {}", output);
    assert!(output.contains("checksum mismatch"), "output: {}", output);
    assert!(!cached.exists(), "corrupt cache entry must be deleted");
    assert!(!temp_dir.path().join("dist").join("redis-7.4.1-win32-x64.zip").exists());

    let (code, output, _) = run_command(&args, temp_dir.path());
    assert_eq!(code, 0, "second run refetches: {}", output);
    assert_eq!(sha256_of(&cached), sha256_of(&vendor));
}

#[test]
fn test_all_platforms_skips_unavailable() {
    let temp_dir = setup_test_dir();
    let vendor = temp_dir.path().join("vendor.zip");
    create_redis_zip(&vendor);
    write_sources(temp_dir.path(), "redis", &redis_sources(&vendor, &sha256_of(&vendor)));

    let (code, output, _) = run_command(
        &["download", "redis", "--version", "7.4.1", "--all-platforms"],
        temp_dir.path(),
    );
    assert_eq!(code, 0, "output: {}", output);
    assert!(output.contains("1 downloaded"), "output: {}", output);
    assert!(output.contains("4 skipped"), "output: {}", output);
    assert!(output.contains("--build-fallback"), "output: {}", output);

    let produced: Vec<_> = fs::read_dir(temp_dir.path().join("dist"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(produced, vec!["redis-7.4.1-win32-x64.zip".to_string()]);
}

#[test]
fn test_build_fallback_failure_keeps_siblings() {
    if !has_tool("bash") || !has_tool("tar") {
        return;
    }
    let temp_dir = setup_test_dir();
    let vendor = temp_dir.path().join("vendor.zip");
    create_redis_zip(&vendor);
    write_sources(temp_dir.path(), "redis", &redis_sources(&vendor, &sha256_of(&vendor)));
    fs::write(
        temp_dir.path().join("builds/redis/build-local.sh"),
        "#!/usr/bin/env bash\necho 'docker build failed' >&2\nexit 1\n",
    )
    .unwrap();

    let (code, output, _) = run_command(
        &[
            "download",
            "redis",
            "--version",
            "7.4.1",
            "--all-platforms",
            "--build-fallback",
        ],
        temp_dir.path(),
    );
    assert_eq!(code, 1, "output: {}", output);
    assert!(output.contains("1 failed"), "output: {}", output);
    assert!(output.contains("1 downloaded"), "output: {}", output);
    assert!(temp_dir.path().join("dist").join("redis-7.4.1-win32-x64.zip").is_file());
    assert!(!temp_dir.path().join("dist").join("redis-7.4.1-linux-arm64.tar.gz").exists());
}

#[test]
fn test_build_fallback_success_records_builder() {
    if !has_tool("bash") || !has_tool("tar") {
        return;
    }
    let temp_dir = setup_test_dir();
    let vendor = temp_dir.path().join("vendor.zip");
    create_redis_zip(&vendor);
    write_sources(temp_dir.path(), "redis", &redis_sources(&vendor, &sha256_of(&vendor)));
    fs::write(
        temp_dir.path().join("builds/redis/build-local.sh"),
        r#"#!/usr/bin/env bash
set -e
while [ $# -gt 0 ]; do
  case "$1" in
    --output) OUTPUT="$2"; shift 2 ;;
    *) shift 2 ;;
  esac
done
mkdir -p "$OUTPUT/bin"
printf '#!/bin/sh\n' > "$OUTPUT/bin/redis-server"
"#,
    )
    .unwrap();

    let (code, output, _) = run_command(
        &[
            "download",
            "redis",
            "--version",
            "7.4.1",
            "--platform",
            "linux-arm64",
            "--build-fallback",
        ],
        temp_dir.path(),
    );
    assert_eq!(code, 0, "output: {}", output);
    assert!(output.contains("1 built"), "output: {}", output);

    let archive = temp_dir.path().join("dist").join("redis-7.4.1-linux-arm64.tar.gz");
    let record = Command::new("tar")
        .arg("-xzOf")
        .arg(&archive)
        .arg("redis/.hostdb-metadata.json")
        .output()
        .unwrap();
    assert!(record.status.success());
    let record: serde_json::Value = serde_json::from_slice(&record.stdout).unwrap();
    assert_eq!(record["source"], "build:docker");

    let (code, output, _) = run_command(&["inspect", archive.to_str().unwrap()], temp_dir.path());
    assert_eq!(code, 0, "output: {}", output);
}

#[test]
fn test_download_tarball_with_prefix_payload() {
    if !has_tool("tar") {
        return;
    }
    let temp_dir = setup_test_dir();
    let vendor_dir = temp_dir.path().join("vendor");
    fs::create_dir_all(&vendor_dir).unwrap();
    let tarball = create_mysql_tarball(&vendor_dir);
    write_sources(
        temp_dir.path(),
        "mysql",
        &format!(
            r#"{{"database":"mysql","versions":{{"8.4.3":{{"linux-x64":{{"url":"{}","format":"tar.gz","sha256":"{}"}}}}}}}}"#,
            file_url(&tarball),
            sha256_of(&tarball).to_uppercase()
        ),
    );

    let (code, output, _) = run_command(
        &["download", "mysql", "--version", "8.4.3", "--platform", "linux-x64"],
        temp_dir.path(),
    );
    assert_eq!(code, 0, "output: {}", output);

    let archive = temp_dir.path().join("dist").join("mysql-8.4.3-linux-x64.tar.gz");
    let listing = Command::new("tar").arg("-tzf").arg(&archive).output().unwrap();
    let listing = String::from_utf8(listing.stdout).unwrap();
    for line in listing.lines() {
        assert!(line.starts_with("mysql/"), "unexpected entry {}", line);
    }
    assert!(listing.contains("mysql/bin/mysqld"));
    assert!(listing.contains("mysql/lib/libmysqlclient.so"));
    assert_eq!(listing.matches(".hostdb-metadata.json").count(), 1);
}

#[test]
fn test_list_shows_versions_and_platforms() {
    let temp_dir = setup_test_dir();
    let vendor = temp_dir.path().join("vendor.zip");
    create_redis_zip(&vendor);
    write_sources(temp_dir.path(), "redis", &redis_sources(&vendor, &sha256_of(&vendor)));

    let (code, output, _) = run_command(&["list"], temp_dir.path());
    assert_eq!(code, 0, "output: {}", output);
    assert!(output.contains("Redis (redis)"), "output: {}", output);
    assert!(output.contains("Redis Open Source"), "output: {}", output);
    assert!(output.contains("7.4.1"), "output: {}", output);
    assert!(output.contains("win32-x64 [mirror]"), "output: {}", output);
    assert!(output.contains("linux-arm64 [build]"), "output: {}", output);

    let (code, output, _) = run_command(&["list", "mysql"], temp_dir.path());
    assert_eq!(code, 1, "missing sources file: {}", output);
}

#[test]
fn test_inspect_rejects_foreign_archive() {
    let temp_dir = setup_test_dir();
    let archive = temp_dir.path().join("plugins.zip");
    let mut zip = ZipWriter::new(fs::File::create(&archive).unwrap());
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
    zip.start_file("a/readme.txt", options).unwrap();
    zip.write_all(b"a").unwrap();
    zip.start_file("b/readme.txt", options).unwrap();
    zip.write_all(b"b").unwrap();
    zip.finish().unwrap();

    let (code, output, _) = run_command(&["inspect", archive.to_str().unwrap()], temp_dir.path());
    assert_eq!(code, 1, "output: {}", output);
    assert!(output.contains("one top-level directory"), "output: {}", output);
}
