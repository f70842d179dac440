// Download command: run the pipeline for one database release

use anyhow::Context;
use log::debug;

use crate::cli::DownloadArgs;
use crate::config::Settings;
use crate::pipeline::{Outcome, Pipeline};
use crate::sources::{HttpFetcher, SourceCatalog};
use crate::tools::Toolbox;
use crate::ui::Ui;

pub async fn download(
    args: &DownloadArgs,
    settings: &Settings,
    toolbox: &Toolbox,
    ui: Ui,
) -> anyhow::Result<i32> {
    let catalog = SourceCatalog::load(settings, args.database)
        .with_context(|| format!("Could not load sources for {}", args.database))?;
    debug!("Loaded {}", catalog.path().display());

    let fetcher = HttpFetcher::new(ui)?;
    let platforms = args.platforms();

    ui.header(&format!(
        "{} {} ({} platform{})",
        args.database.display_name(),
        args.version,
        platforms.len(),
        if platforms.len() == 1 { "" } else { "s" }
    ));

    let summary = Pipeline::new(&catalog, &args.version, settings, toolbox, &fetcher, ui)
        .with_build_fallback(args.build_fallback)
        .run(&platforms)
        .await?;

    ui.header(&format!("Summary: {}", summary));
    for (platform, outcome) in &summary.results {
        match outcome {
            Outcome::Done { archive, .. } => {
                ui.status(platform.as_str(), &archive.display().to_string())
            }
            Outcome::Skipped(reason) => ui.dim(&format!("{} skipped: {}", platform, reason)),
            Outcome::Failed(e) => ui.error(&format!("{} failed: {}", platform, e)),
        }
    }
    if summary.completed() == 0 && summary.failed == 0 {
        ui.warning("Nothing was produced; every requested platform was skipped");
    }

    Ok(summary.exit_code())
}
