// Build module: producing a platform's payload from source when no
// prebuilt binary exists

use std::fs;
use std::path::Path;
use std::process::Command;

use log::{debug, error};

use crate::config::Settings;
use crate::constants;
use crate::databases::Database;
use crate::error::{HostdbError, Result};
use crate::platform::Platform;
use crate::tools::{Tool, Toolbox};
use crate::ui::Ui;
use crate::version::VersionSpec;

mod docker;
mod gocross;

pub use docker::DockerScriptBuilder;
pub use gocross::GoCrossBuilder;

/// How a database's missing platforms can be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// `builds/<db>/build-local.sh`, which drives a Docker build.
    DockerScript,
    /// Cross-compile a Go program for the target's GOOS/GOARCH.
    GoCross {
        repository: &'static str,
        package: &'static str,
        binary: &'static str,
    },
}

pub struct BuildRequest<'a> {
    pub database: Database,
    pub version: &'a VersionSpec,
    pub platform: Platform,
    /// Receives the installed tree (`bin/`, `lib/`, ...) of the build.
    pub output_dir: &'a Path,
}

/// A fallback builder. Failures are reported as `false` and logged so a
/// failed build never takes sibling platforms down with it.
pub trait Builder {
    /// Short label recorded as `build:<name>` in provenance metadata.
    fn name(&self) -> &'static str;

    fn can_build(&self, platform: Platform) -> bool;

    fn build(&self, request: &BuildRequest<'_>) -> bool;
}

/// Run a build step, folding spawn errors and non-zero exits into `false`.
fn run_step(mut cmd: Command, step: &str) -> bool {
    debug!("Running {:?}", cmd);
    match cmd.status() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            error!("{} exited with {}", step, status);
            false
        }
        Err(e) => {
            error!("{} failed to start: {}", step, e);
            false
        }
    }
}

/// Pick the builder for `strategy`, failing with `ToolMissing` up front if
/// anything it shells out to is absent.
pub fn select(
    strategy: BuildStrategy,
    database: Database,
    settings: &Settings,
    toolbox: &Toolbox,
    ui: Ui,
) -> Result<Box<dyn Builder>> {
    match strategy {
        BuildStrategy::DockerScript => {
            let purpose = format!("building {} from source", database);
            let bash = toolbox.require(Tool::Bash, &purpose)?;
            let script = settings.build_dir(database).join(constants::BUILD_SCRIPT);
            if !script.is_file() {
                return Err(HostdbError::ToolMissing {
                    tool: script.display().to_string(),
                    purpose,
                });
            }
            // The script runs from its own directory, so a relative root must
            // not leak into its path
            let script = fs::canonicalize(&script).map_err(|e| {
                HostdbError::io(format!("failed to resolve {}", script.display()), e)
            })?;
            // Only offer to remove the build image when someone can answer
            let prompt_cleanup = !settings.ci
                && ui.is_interactive()
                && std::io::IsTerminal::is_terminal(&std::io::stdin());
            Ok(Box::new(DockerScriptBuilder::new(
                bash.to_path_buf(),
                script,
                toolbox.path(Tool::Docker).map(Path::to_path_buf),
                prompt_cleanup,
                ui,
            )))
        }
        BuildStrategy::GoCross {
            repository,
            package,
            binary,
        } => {
            let purpose = format!("cross-compiling {}", database);
            let git = toolbox.require(Tool::Git, &purpose)?.to_path_buf();
            let go = toolbox.require(Tool::Go, &purpose)?.to_path_buf();
            Ok(Box::new(GoCrossBuilder::new(
                git, go, repository, package, binary, ui,
            )))
        }
    }
}
