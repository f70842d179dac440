// Docker-backed source builds through the per-database build script

use std::path::PathBuf;
use std::process::Command;

use dialoguer::Confirm;
use log::{error, info, warn};

use super::{BuildRequest, Builder, run_step};
use crate::databases::Database;
use crate::platform::Platform;
use crate::ui::Ui;
use crate::version::VersionSpec;

/// Runs `build-local.sh --version V --platform P --output DIR`.
///
/// The script builds inside a Linux container, so only Linux targets are
/// buildable this way.
pub struct DockerScriptBuilder {
    bash: PathBuf,
    script: PathBuf,
    docker: Option<PathBuf>,
    prompt_cleanup: bool,
    ui: Ui,
}

pub fn image_tag(database: Database, version: &VersionSpec) -> String {
    format!("hostdb-{}-build:{}", database, version)
}

impl DockerScriptBuilder {
    pub fn new(
        bash: PathBuf,
        script: PathBuf,
        docker: Option<PathBuf>,
        prompt_cleanup: bool,
        ui: Ui,
    ) -> Self {
        Self {
            bash,
            script,
            docker,
            prompt_cleanup,
            ui,
        }
    }

    fn offer_cleanup(&self, image: &str) {
        let Some(docker) = self.docker.as_ref().filter(|_| self.prompt_cleanup) else {
            return;
        };

        let remove = Confirm::new()
            .with_prompt(format!("Remove build image {}?", image))
            .default(false)
            .interact();
        match remove {
            Ok(true) => {
                let mut cmd = Command::new(docker);
                cmd.arg("rmi").arg(image);
                if run_step(cmd, "docker rmi") {
                    self.ui.success(&format!("Removed {}", image));
                }
            }
            Ok(false) => info!("Keeping build image {}", image),
            Err(e) => warn!("Could not read cleanup answer: {}", e),
        }
    }
}

impl Builder for DockerScriptBuilder {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn can_build(&self, platform: Platform) -> bool {
        matches!(platform, Platform::LinuxX64 | Platform::LinuxArm64)
    }

    fn build(&self, request: &BuildRequest<'_>) -> bool {
        if !self.can_build(request.platform) {
            warn!(
                "{} cannot be built for {} with Docker",
                request.database, request.platform
            );
            return false;
        }

        // Both paths must survive the switch into the script's directory
        let (script, output) = match (
            std::path::absolute(&self.script),
            std::path::absolute(request.output_dir),
        ) {
            (Ok(script), Ok(output)) => (script, output),
            (Err(e), _) | (_, Err(e)) => {
                error!("Cannot resolve build paths for {}: {}", self.script.display(), e);
                return false;
            }
        };

        let image = image_tag(request.database, request.version);
        self.ui.action(&format!(
            "Building {} {} for {} ({})",
            request.database.display_name(),
            request.version,
            request.platform,
            script.display()
        ));

        let mut cmd = Command::new(&self.bash);
        cmd.arg(&script)
            .arg("--version")
            .arg(request.version.as_str())
            .arg("--platform")
            .arg(request.platform.as_str())
            .arg("--output")
            .arg(&output)
            .env("HOSTDB_BUILD_IMAGE", &image);
        if let Some(dir) = script.parent() {
            cmd.current_dir(dir);
        }

        let built = run_step(cmd, "build script");
        self.offer_cleanup(&image);
        built
    }
}
