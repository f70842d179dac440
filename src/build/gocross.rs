// Go cross-compilation from a tagged source checkout

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use log::error;

use super::{BuildRequest, Builder, run_step};
use crate::platform::Platform;
use crate::ui::Ui;

pub struct GoCrossBuilder {
    git: PathBuf,
    go: PathBuf,
    repository: &'static str,
    package: &'static str,
    binary: &'static str,
    ui: Ui,
}

impl GoCrossBuilder {
    pub fn new(
        git: PathBuf,
        go: PathBuf,
        repository: &'static str,
        package: &'static str,
        binary: &'static str,
        ui: Ui,
    ) -> Self {
        Self {
            git,
            go,
            repository,
            package,
            binary,
            ui,
        }
    }
}

impl Builder for GoCrossBuilder {
    fn name(&self) -> &'static str {
        "go"
    }

    // Pure Go with cgo off builds for every target from any host
    fn can_build(&self, _platform: Platform) -> bool {
        true
    }

    fn build(&self, request: &BuildRequest<'_>) -> bool {
        let checkout = match tempfile::Builder::new().prefix("hostdb-src-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("Could not create checkout directory: {}", e);
                return false;
            }
        };
        let src = checkout.path().join("src");
        let tag = format!("v{}", request.version);

        let spinner = self.ui.spinner(&format!("Cloning {} at {}", self.repository, tag));
        let mut clone = Command::new(&self.git);
        clone
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--branch")
            .arg(&tag)
            .arg(self.repository)
            .arg(&src);
        if !run_step(clone, "git clone") {
            self.ui.finish_spinner_error(&spinner, &format!("Clone of {} failed", tag));
            return false;
        }
        self.ui.finish_spinner_success(&spinner, &format!("Cloned {}", tag));

        let bin = request.output_dir.join("bin");
        if let Err(e) = fs::create_dir_all(&bin) {
            error!("Could not create {}: {}", bin.display(), e);
            return false;
        }
        let output = bin.join(request.platform.executable_name(self.binary));

        let spinner = self.ui.spinner(&format!(
            "Compiling {} for {}/{}",
            self.binary,
            request.platform.goos(),
            request.platform.goarch()
        ));
        let mut build = Command::new(&self.go);
        build
            .arg("build")
            .arg("-o")
            .arg(&output)
            .arg(self.package)
            .current_dir(&src)
            .env("CGO_ENABLED", "0")
            .env("GOOS", request.platform.goos())
            .env("GOARCH", request.platform.goarch());
        let built = run_step(build, "go build");
        if built {
            self.ui
                .finish_spinner_success(&spinner, &format!("Built {}", output.display()));
        } else {
            self.ui
                .finish_spinner_error(&spinner, &format!("Build of {} failed", self.binary));
        }
        built
    }
}
