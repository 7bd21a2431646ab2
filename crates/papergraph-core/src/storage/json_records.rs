use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{CoreError, Result};
use crate::models::{LinkExport, PaperRecord};

/// Save a PaperRecord as a JSON file: `{dir}/{short_id}.json`.
pub fn save_record(dir: &Path, record: &PaperRecord) -> Result<PathBuf> {
    if record.external_id.trim().is_empty() {
        return Err(CoreError::ValidationError(
            "cannot cache a record without an external id".to_string(),
        ));
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", record.short_id()));
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Write every record of a corpus; abstract-less records are cached too.
/// Returns the number of distinct files written: records sharing a short id
/// land in one file, the last one wins.
pub fn save_records(dir: &Path, records: &[PaperRecord]) -> Result<usize> {
    let mut written = HashSet::new();
    for record in records {
        written.insert(save_record(dir, record)?);
    }
    Ok(written.len())
}

/// Load a single PaperRecord from a JSON file.
pub fn load_record(path: &Path) -> Result<PaperRecord> {
    let contents = fs::read_to_string(path)?;
    let record: PaperRecord = serde_json::from_str(&contents)?;
    if record.external_id.trim().is_empty() {
        return Err(CoreError::ValidationError(format!(
            "{} has an empty openAlexId",
            path.display()
        )));
    }
    Ok(record)
}

/// List all records in the cache directory, ordered by file name.
///
/// Broken files are skipped with a warning.
pub fn list_records(dir: &Path) -> Result<Vec<PaperRecord>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        match load_record(&path) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping broken cache file"),
        }
    }
    Ok(records)
}

/// Write the edge export (`graph_links.json`).
pub fn save_links(path: &Path, links: &[LinkExport]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(links)?)?;
    Ok(())
}

pub fn load_links(path: &Path) -> Result<Vec<LinkExport>> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
