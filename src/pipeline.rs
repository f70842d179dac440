// Pipeline: resolve, acquire, verify, extract and repackage each platform
//
// Platforms run strictly one after another. Every per-platform failure is
// collected into the run summary except a checksum mismatch, which stops the
// run on the spot.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::build::{self, BuildRequest, BuildStrategy, Builder};
use crate::config::Settings;
use crate::databases::Database;
use crate::error::{HostdbError, Result};
use crate::extract::{self, Extractors};
use crate::metadata::ProvenanceMetadata;
use crate::platform::Platform;
use crate::repackage::{self, Archiver, ComponentPayload, RepackageRequest};
use crate::sources::hash::{self, HashAlgorithm, Verification};
use crate::sources::{ArchiveFormat, Fetcher, SourceCatalog, SourceEntry};
use crate::tools::Toolbox;
use crate::ui::Ui;
use crate::version::VersionSpec;

/// Where a platform is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Resolving,
    Downloading,
    Building,
    Verifying,
    Extracting,
    Repackaging,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Resolving => "resolving",
            Stage::Downloading => "downloading",
            Stage::Building => "building",
            Stage::Verifying => "verifying",
            Stage::Extracting => "extracting",
            Stage::Repackaging => "repackaging",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// How the original artifact was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Downloaded,
    Cached,
    Built,
}

#[derive(Debug)]
pub enum Outcome {
    Done {
        archive: PathBuf,
        sha256: String,
        acquisition: Acquisition,
    },
    Skipped(String),
    Failed(HostdbError),
}

/// Per-platform results of one run, in processing order.
#[derive(Debug, Default)]
pub struct Summary {
    pub downloaded: usize,
    pub cached: usize,
    pub built: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<(Platform, Outcome)>,
}

impl Summary {
    fn record(&mut self, platform: Platform, outcome: Outcome) {
        match &outcome {
            Outcome::Done { acquisition, .. } => match acquisition {
                Acquisition::Downloaded => self.downloaded += 1,
                Acquisition::Cached => self.cached += 1,
                Acquisition::Built => self.built += 1,
            },
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
        self.results.push((platform, outcome));
    }

    pub fn completed(&self) -> usize {
        self.downloaded + self.cached + self.built
    }

    /// Skips are not failures; any failed platform makes the run fail.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 { 1 } else { 0 }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} cached, {} built, {} skipped, {} failed",
            self.downloaded, self.cached, self.built, self.skipped, self.failed
        )
    }
}

/// What will happen to one platform, decided before any I/O.
enum Plan<'c> {
    Download {
        url: &'c str,
        format: ArchiveFormat,
        checksum: Option<&'c str>,
    },
    Build(BuildStrategy),
    Skip(String),
    Fail(HostdbError),
}

/// Cache file name of an original vendor download.
pub fn cache_file_name(
    database: Database,
    key: &str,
    platform: Platform,
    format: ArchiveFormat,
) -> String {
    format!(
        "{}-{}-{}-original.{}",
        database,
        key,
        platform,
        format.extension()
    )
}

pub struct Pipeline<'a> {
    database: Database,
    catalog: &'a SourceCatalog,
    version: &'a VersionSpec,
    settings: &'a Settings,
    toolbox: &'a Toolbox,
    fetcher: &'a dyn Fetcher,
    ui: Ui,
    build_fallback: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        catalog: &'a SourceCatalog,
        version: &'a VersionSpec,
        settings: &'a Settings,
        toolbox: &'a Toolbox,
        fetcher: &'a dyn Fetcher,
        ui: Ui,
    ) -> Self {
        Self {
            database: catalog.database(),
            catalog,
            version,
            settings,
            toolbox,
            fetcher,
            ui,
            build_fallback: false,
        }
    }

    pub fn with_build_fallback(mut self, enabled: bool) -> Self {
        self.build_fallback = enabled;
        self
    }

    fn enter(&self, platform: Platform, stage: Stage) {
        debug!("{} {} [{}]: {}", self.database, self.version, platform, stage);
    }

    fn plan(&self, platform: Platform) -> Plan<'a> {
        self.enter(platform, Stage::Resolving);
        let catalog: &'a SourceCatalog = self.catalog;
        match catalog.resolve(self.version, platform) {
            None => Plan::Skip(
                HostdbError::PlatformUnavailable {
                    database: self.database.to_string(),
                    version: self.version.to_string(),
                    platform: platform.to_string(),
                }
                .to_string(),
            ),
            Some(SourceEntry::Downloadable {
                url,
                format,
                checksum,
                ..
            }) => Plan::Download {
                url: url.as_str(),
                format: *format,
                checksum: checksum.as_deref(),
            },
            Some(SourceEntry::BuildRequired { note }) if !self.build_fallback => {
                let note = note.as_deref().map(|n| format!(" ({})", n)).unwrap_or_default();
                Plan::Skip(format!(
                    "no prebuilt binary{}; rerun with --build-fallback to build it",
                    note
                ))
            }
            Some(SourceEntry::BuildRequired { .. }) => match self.database.build_strategy() {
                Some(strategy) => Plan::Build(strategy),
                None => {
                    warn!("{} has no fallback builder", self.database);
                    Plan::Fail(self.build_failure(platform))
                }
            },
        }
    }

    fn build_failure(&self, platform: Platform) -> HostdbError {
        HostdbError::BuildFailure {
            database: self.database.to_string(),
            version: self.version.to_string(),
            platform: platform.to_string(),
        }
    }

    /// Fail with `ToolMissing` before any work if a planned platform could
    /// not be finished with the tools on this host.
    fn check_tools(&self, plans: &[(Platform, Plan<'a>)]) -> Result<()> {
        let require_for = |format: ArchiveFormat| -> Result<()> {
            if let Some(tool) = Extractors::required_tool(format) {
                self.toolbox.require(tool, &format!("{} extraction", format))?;
            }
            if format == ArchiveFormat::Msi && !Extractors::select(self.toolbox).has_msi_tool() {
                self.ui.warning(
                    "No MSI tool (msiexec, 7z, lessmsi) found; installers will be left for manual extraction",
                );
            }
            Ok(())
        };

        for (platform, plan) in plans {
            match plan {
                Plan::Skip(_) | Plan::Fail(_) => continue,
                Plan::Download { format, .. } => require_for(*format)?,
                Plan::Build(_) => {}
            }
            for component in self.database.components() {
                if let Some(SourceEntry::Downloadable { format, .. }) =
                    self.catalog.component(component.name, *platform)
                {
                    require_for(*format)?;
                }
            }
            if let Some(tool) = Archiver::required_tool(*platform) {
                self.toolbox.require(tool, "tar.gz archive creation")?;
            }
        }
        Ok(())
    }

    /// Process `platforms` in order.
    ///
    /// Returns `Err` only for run-level failures: unknown version, missing
    /// tools, or a checksum mismatch. Everything else lands in the summary.
    pub async fn run(&self, platforms: &[Platform]) -> Result<Summary> {
        self.catalog.ensure_version(self.version)?;

        let plans: Vec<(Platform, Plan<'a>)> = platforms
            .iter()
            .map(|platform| {
                self.enter(*platform, Stage::Pending);
                (*platform, self.plan(*platform))
            })
            .collect();
        self.check_tools(&plans)?;

        let strategy = plans.iter().find_map(|(_, plan)| match plan {
            Plan::Build(strategy) => Some(*strategy),
            _ => None,
        });
        let builder = match strategy {
            Some(strategy) => Some(build::select(
                strategy,
                self.database,
                self.settings,
                self.toolbox,
                self.ui,
            )?),
            None => None,
        };

        let extractors = Extractors::select(self.toolbox);
        let archiver = Archiver::select(self.toolbox);
        let mut summary = Summary::default();

        for (platform, plan) in plans {
            let result = match plan {
                Plan::Skip(reason) => {
                    self.ui
                        .warning(&format!("Skipping {}: {}", platform, reason));
                    summary.record(platform, Outcome::Skipped(reason));
                    continue;
                }
                Plan::Fail(e) => Err(e),
                Plan::Download {
                    url,
                    format,
                    checksum,
                } => {
                    self.download(platform, url, format, checksum, &extractors, &archiver)
                        .await
                }
                Plan::Build(_) => match builder.as_deref() {
                    Some(builder) => {
                        self.build(platform, builder, &extractors, &archiver).await
                    }
                    None => Err(self.build_failure(platform)),
                },
            };

            match result {
                Ok((archive, sha256, acquisition)) => {
                    self.enter(platform, Stage::Done);
                    self.ui.success(&archive.display().to_string());
                    self.ui.dim(&format!("  sha256 {}", sha256));
                    summary.record(
                        platform,
                        Outcome::Done {
                            archive,
                            sha256,
                            acquisition,
                        },
                    );
                }
                Err(e) if e.is_fatal_for_run() => return Err(e),
                Err(e) => {
                    self.ui.error(&format!("{} failed: {}", platform, e));
                    summary.record(platform, Outcome::Failed(e));
                }
            }
        }

        Ok(summary)
    }

    /// Fetch `url` into the cache unless already there, then verify it.
    /// Returns whether the cache was hit.
    async fn acquire(
        &self,
        platform: Platform,
        url: &str,
        cached_at: &Path,
        checksum: Option<&str>,
        algorithm: HashAlgorithm,
    ) -> Result<bool> {
        let cached = cached_at.is_file();
        if cached {
            self.ui
                .dim(&format!("  Using cached {}", cached_at.display()));
        } else {
            self.enter(platform, Stage::Downloading);
            self.fetcher
                .fetch(url, cached_at, self.settings.timeout)
                .await?;
        }

        self.enter(platform, Stage::Verifying);
        match hash::verify_file(cached_at, algorithm, checksum) {
            Ok(Verification::Verified(digest)) => {
                info!("Verified {} {}:{}", cached_at.display(), algorithm.name(), digest);
            }
            Ok(Verification::Unverified(digest)) => {
                self.ui.warning(&format!(
                    "No checksum on file for {}; {} is {}",
                    url,
                    algorithm.name(),
                    digest
                ));
            }
            Err(e) => {
                // Never leave an artifact that failed verification in the cache
                if let Err(remove) = fs::remove_file(cached_at) {
                    warn!("Could not remove {}: {}", cached_at.display(), remove);
                } else {
                    self.ui
                        .warning(&format!("Deleted {}", cached_at.display()));
                }
                return Err(e);
            }
        }
        Ok(cached)
    }

    /// Fetch, verify and extract every auxiliary component for `platform`.
    async fn gather_components(
        &self,
        platform: Platform,
        extractors: &Extractors,
        scratch: &Path,
    ) -> Result<Vec<ComponentPayload>> {
        let mut payloads = Vec::new();
        for component in self.database.components() {
            let missing = || HostdbError::InvalidSources {
                path: self.catalog.path().to_path_buf(),
                reason: format!(
                    "no downloadable '{}' component for {}",
                    component.name, platform
                ),
            };
            let Some(SourceEntry::Downloadable {
                url,
                format,
                checksum,
                ..
            }) = self.catalog.component(component.name, platform)
            else {
                return Err(missing());
            };

            let cached_at = self.settings.cache_dir.join(cache_file_name(
                self.database,
                component.name,
                platform,
                *format,
            ));
            self.acquire(
                platform,
                url,
                &cached_at,
                checksum.as_deref(),
                HashAlgorithm::Sha256,
            )
            .await?;

            self.enter(platform, Stage::Extracting);
            let dest = scratch.join(format!("component-{}", component.name));
            extractors.extract(*format, &cached_at, &dest)?;
            payloads.push(ComponentPayload {
                name: component.name.to_string(),
                dir: extract::locate_payload(&dest, component.locator)?,
            });
        }
        Ok(payloads)
    }

    fn finish(
        &self,
        platform: Platform,
        payload: &Path,
        components: &[ComponentPayload],
        source: String,
        archiver: &Archiver,
    ) -> Result<(PathBuf, String)> {
        self.enter(platform, Stage::Repackaging);
        let output = self.settings.output_dir.join(repackage::archive_name(
            self.database,
            self.version.as_str(),
            platform,
        ));
        let metadata = ProvenanceMetadata::new(self.database, self.version, platform, source);
        repackage::repackage(
            &RepackageRequest {
                database: self.database,
                platform,
                payload,
                components,
                output: &output,
                metadata: &metadata,
            },
            archiver,
        )?;
        let sha256 = hash::hash_file(&output, HashAlgorithm::Sha256)?;
        Ok((output, sha256))
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        tempfile::Builder::new()
            .prefix("hostdb-work-")
            .tempdir()
            .map_err(|e| HostdbError::io("failed to create work directory", e))
    }

    async fn download(
        &self,
        platform: Platform,
        url: &str,
        format: ArchiveFormat,
        checksum: Option<&str>,
        extractors: &Extractors,
        archiver: &Archiver,
    ) -> Result<(PathBuf, String, Acquisition)> {
        self.ui.action(&format!(
            "{} {} for {}",
            self.database.display_name(),
            self.version,
            platform
        ));
        let cached_at = self.settings.cache_dir.join(cache_file_name(
            self.database,
            self.version.as_str(),
            platform,
            format,
        ));
        let cached = self
            .acquire(
                platform,
                url,
                &cached_at,
                checksum,
                self.database.hash_algorithm(),
            )
            .await?;

        let scratch = self.scratch_dir()?;
        self.enter(platform, Stage::Extracting);
        let extracted = scratch.path().join("original");
        extractors.extract(format, &cached_at, &extracted)?;
        let payload = extract::locate_payload(&extracted, self.database.payload_locator(platform))?;
        let components = self
            .gather_components(platform, extractors, scratch.path())
            .await?;

        let (archive, sha256) =
            self.finish(platform, &payload, &components, url.to_string(), archiver)?;
        let acquisition = if cached {
            Acquisition::Cached
        } else {
            Acquisition::Downloaded
        };
        Ok((archive, sha256, acquisition))
    }

    async fn build(
        &self,
        platform: Platform,
        builder: &dyn Builder,
        extractors: &Extractors,
        archiver: &Archiver,
    ) -> Result<(PathBuf, String, Acquisition)> {
        if !builder.can_build(platform) {
            warn!("The {} builder cannot target {}", builder.name(), platform);
            return Err(self.build_failure(platform));
        }

        self.enter(platform, Stage::Building);
        let scratch = self.scratch_dir()?;
        let built = scratch.path().join("build");
        fs::create_dir_all(&built)
            .map_err(|e| HostdbError::io(format!("failed to create {}", built.display()), e))?;

        let request = BuildRequest {
            database: self.database,
            version: self.version,
            platform,
            output_dir: &built,
        };
        if !builder.build(&request) {
            return Err(self.build_failure(platform));
        }
        // Built trees have no published digest to check against
        self.enter(platform, Stage::Verifying);
        debug!("Skipping verification of locally built {}", built.display());

        let components = self
            .gather_components(platform, extractors, scratch.path())
            .await?;
        let source = format!("build:{}", builder.name());
        let (archive, sha256) = self.finish(platform, &built, &components, source, archiver)?;
        Ok((archive, sha256, Acquisition::Built))
    }
}
