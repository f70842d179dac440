// List command: configured versions and platforms per database

use log::debug;

use crate::config::Settings;
use crate::databases::Database;
use crate::sources::{SourceCatalog, SourceEntry, SourceType};
use crate::ui::Ui;

fn describe(entry: &SourceEntry) -> &'static str {
    match entry {
        SourceEntry::Downloadable {
            source_type: SourceType::Mirror,
            ..
        } => "mirror",
        SourceEntry::Downloadable { checksum: None, .. } => "unverified",
        SourceEntry::Downloadable { .. } => "official",
        SourceEntry::BuildRequired { .. } => "build",
    }
}

/// Free-form `notes` of a sources file as one line.
fn notes_line(notes: &serde_json::Value) -> Option<String> {
    match notes {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) if text.trim().is_empty() => None,
        serde_json::Value::String(text) => Some(text.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn print_catalog(catalog: &SourceCatalog, ui: Ui) {
    let database = catalog.database();
    ui.header(&format!("{} ({})", database.display_name(), database));
    if let Some(line) = catalog.notes().and_then(notes_line) {
        ui.dim(&format!("  {}", line));
    }

    let versions = catalog.versions();
    if versions.is_empty() {
        ui.dim("  no versions configured");
        return;
    }
    for version in versions {
        let platforms = catalog
            .platforms(version)
            .into_iter()
            .map(|(platform, entry)| format!("{} [{}]", platform, describe(entry)))
            .collect::<Vec<_>>();
        let listed = if platforms.is_empty() {
            "no platforms".to_string()
        } else {
            platforms.join(", ")
        };
        ui.status(&format!("  {}", version), &listed);
    }
}

/// List one database, or every database that has a sources file.
pub fn list(database: Option<Database>, settings: &Settings, ui: Ui) -> anyhow::Result<i32> {
    if let Some(database) = database {
        let catalog = SourceCatalog::load(settings, database)?;
        print_catalog(&catalog, ui);
        return Ok(0);
    }

    let mut shown = 0;
    for database in Database::ALL {
        let path = settings.sources_path(database);
        if !path.is_file() {
            debug!("No sources file at {}", path.display());
            continue;
        }
        let catalog = SourceCatalog::from_path(&path, database)?;
        print_catalog(&catalog, ui);
        shown += 1;
    }

    if shown == 0 {
        ui.warning(&format!(
            "No sources files found under {}",
            settings.root.join(crate::constants::BUILDS_DIR).display()
        ));
    }
    Ok(0)
}
