use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::config::Settings;
use crate::error::EtlError;
use crate::history::RunHistory;

const WORKBOOK_EXTENSIONS: [&str; 3] = ["xlsx", "xlsm", "xls"];

fn is_workbook(path: &Path) -> bool {
    let lock_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("~$"));
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| WORKBOOK_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
    path.is_file() && ext_ok && !lock_file
}

/// Workbooks waiting in `dir`, sorted by file name.
pub fn list_intake_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing intake {:?}", dir))? {
        let path = entry?.path();
        if is_workbook(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Delete a not-yet-processed intake file by bare name.
pub fn delete_intake_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let bare = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|n| n == name);
    if !bare {
        return Err(EtlError::InvalidFileName(name.to_string()).into());
    }
    let path = dir.join(name);
    if !path.is_file() {
        return Err(EtlError::FileNotFound(name.to_string()).into());
    }
    fs::remove_file(&path).with_context(|| format!("deleting {:?}", path))?;
    info!(file = name, "deleted intake file");
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub intake_files: usize,
    pub processed_exports: usize,
    pub last_run_id: Option<String>,
    pub available_files: Vec<String>,
}

/// Counts of pending and exported files plus the latest run id.
pub fn stats(settings: &Settings) -> Result<Stats> {
    let available_files: Vec<String> = list_intake_files(&settings.input_dir)?
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();

    let processed_exports = if settings.output_dir.exists() {
        fs::read_dir(&settings.output_dir)?
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .ends_with("_with_kpis.parquet")
            })
            .count()
    } else {
        0
    };

    let last_run_id = RunHistory::new_runs(&settings.history_dir)?.last_run_id()?;

    Ok(Stats {
        intake_files: available_files.len(),
        processed_exports,
        last_run_id,
        available_files,
    })
}
