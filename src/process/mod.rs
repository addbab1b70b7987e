// src/process/mod.rs
pub mod classify;
pub mod date_parser;
pub mod kpi;
pub mod merge;
pub mod raw_table;
pub mod reconcile;
pub mod utils;
pub mod workbook;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::Serialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::EtlError;
use crate::history::{RunArtifact, RunHistory};
use crate::intake::list_intake_files;
use crate::persist::{
    archive::{FileMover, Sleeper},
    archive_with_retry, export_path, run_table_name, validate_run_id, write_parquet,
    ArchiveOutcome, FsMover, RunStore, ThreadSleeper,
};
use crate::schema::{SchemaRegistry, SheetRole, CLAIM_KEY};

use self::raw_table::Table;

/// Local time as `YYYYMMDD_HHMMSS`.
pub fn default_run_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Classify, load, reconcile, merge and score one workbook, in memory.
#[tracing::instrument(level = "debug", skip(path, registry), fields(path = %path.as_ref().display()))]
pub fn enrich_workbook<P: AsRef<Path>>(
    path: P,
    registry: &SchemaRegistry,
    cutoff: f64,
) -> Result<Table> {
    let mut reader = workbook::WorkbookReader::open(path)?;
    let roles = classify::classify_sheets(&reader.sheet_names())?;

    // one sheet may serve several roles; it is read once
    let wanted: Vec<&str> = roles.values().map(String::as_str).collect();
    let raw = reader.load_sheets(&wanted)?;

    let mut sheets: HashMap<SheetRole, Table> = HashMap::with_capacity(roles.len());
    for (role, sheet) in &roles {
        let table = raw
            .get(sheet)
            .with_context(|| format!("sheet '{}' was not loaded", sheet))?;
        sheets.insert(
            *role,
            reconcile::normalize_sheet(table, registry.fields(*role), cutoff),
        );
    }

    for field in registry.canonical_fields() {
        if sheets.get(&field.role).is_some_and(|t| !t.has_column(&field.name)) {
            debug!(role = %field.role, field = %field.name, "canonical field absent");
        }
    }

    let merged = merge::merge_sheets(&sheets, CLAIM_KEY)?;
    let scored = kpi::calculate_kpis(&merged);
    Ok(merge::finalize_columns(&scored))
}

/// Result of one workbook, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file: String,
    pub success: bool,
    pub rows: Option<usize>,
    pub output_path: Option<PathBuf>,
    pub table_name: Option<String>,
    pub elapsed_secs: f64,
    pub archive: Option<ArchiveOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub outcomes: Vec<FileOutcome>,
}

struct Written {
    rows: usize,
    output_path: PathBuf,
    table_name: String,
}

/// Everything a run needs, opened once and shared by each file in it.
pub struct Pipeline {
    settings: Settings,
    registry: SchemaRegistry,
    store: RunStore,
    history: RunHistory,
    /// Run table name -> source file name that owns it.
    claimed: HashMap<String, String>,
    mover: Box<dyn FileMover>,
    sleeper: Box<dyn Sleeper>,
}

impl Pipeline {
    pub fn open(settings: Settings) -> Result<Self> {
        settings.ensure_dirs()?;
        let registry = settings.registry()?;
        let store = RunStore::open(&settings.db_path)?;
        let history = RunHistory::new_runs(&settings.history_dir)?;
        let claimed = history
            .load()?
            .into_iter()
            .map(|a| (a.table_name, a.source_file))
            .collect();
        Ok(Self {
            settings,
            registry,
            store,
            history,
            claimed,
            mover: Box::new(FsMover),
            sleeper: Box::new(ThreadSleeper),
        })
    }

    /// Swap the archive mover and sleeper.
    pub fn with_archiver(mut self, mover: Box<dyn FileMover>, sleeper: Box<dyn Sleeper>) -> Self {
        self.mover = mover;
        self.sleeper = sleeper;
        self
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Run table for `file` under `run_id`. Files whose names reduce to the
    /// same tag get `_2`, `_3`, ... in the order they are processed.
    fn table_name_for(&self, run_id: &str, path: &Path, file: &str) -> Result<String> {
        let base = run_table_name(run_id, path)?;
        let mut name = base.clone();
        let mut n = 1;
        while self.claimed.get(&name).is_some_and(|owner| owner != file) {
            n += 1;
            name = format!("{}_{}", base, n);
        }
        if n > 1 {
            warn!(file, table = %name, taken = %base, "file tag already used in this run");
        }
        Ok(name)
    }

    fn write_outputs(&mut self, path: &Path, file: &str, run_id: &str) -> Result<Written> {
        let table_name = self.table_name_for(run_id, path, file)?;
        let table = enrich_workbook(path, &self.registry, self.settings.match_cutoff)?;
        let output_path = export_path(path, &self.settings.output_dir);
        write_parquet(&table, &output_path)?;
        self.store.write_run_table(&table_name, &table)?;
        self.claimed.insert(table_name.clone(), file.to_string());
        Ok(Written {
            rows: table.num_rows(),
            output_path,
            table_name,
        })
    }

    /// Process one workbook end to end. Errors never escape: they become a
    /// failed outcome and leave the file in intake.
    #[tracing::instrument(level = "info", skip(self, path), fields(file = %path.display()))]
    pub fn process_workbook(&mut self, path: &Path, run_id: &str) -> FileOutcome {
        let start = Instant::now();
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let written = validate_run_id(run_id)
            .map_err(anyhow::Error::from)
            .and_then(|_| self.write_outputs(path, &file, run_id));

        let written = match written {
            Ok(w) => w,
            Err(e) => {
                let schema = e
                    .downcast_ref::<EtlError>()
                    .is_some_and(EtlError::is_schema_error);
                error!(file = %file, schema, "processing failed: {:#}", e);
                return FileOutcome {
                    file,
                    success: false,
                    rows: None,
                    output_path: None,
                    table_name: None,
                    elapsed_secs: start.elapsed().as_secs_f64(),
                    archive: None,
                    error: Some(format!("{:#}", e)),
                };
            }
        };

        let archive = archive_with_retry(
            path,
            &self.settings.archive_dir,
            self.settings.retry_policy(),
            self.mover.as_ref(),
            self.sleeper.as_ref(),
        );
        if !archive.is_moved() {
            warn!(file = %file, ?archive, "file left in intake");
        }

        let elapsed_secs = start.elapsed().as_secs_f64();
        let artifact = RunArtifact {
            run_id: run_id.to_string(),
            source_file: file.clone(),
            table_name: written.table_name.clone(),
            output_path: written.output_path.display().to_string(),
            rows: written.rows as u64,
            elapsed_secs,
            processed_at: Utc::now(),
        };
        if let Err(e) = self.history.add(&artifact) {
            warn!(file = %file, "could not record run history: {:#}", e);
        }

        info!(file = %file, rows = written.rows, elapsed_secs, "processed");
        FileOutcome {
            file,
            success: true,
            rows: Some(written.rows),
            output_path: Some(written.output_path),
            table_name: Some(written.table_name),
            elapsed_secs,
            archive: Some(archive),
            error: None,
        }
    }

    /// Process every intake workbook in file-name order under one run id.
    /// Only an invalid run id or an unreadable intake directory is an error;
    /// individual file failures are counted in the report.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn process_batch(&mut self, run_id: &str) -> Result<BatchReport> {
        validate_run_id(run_id)?;
        let start = Instant::now();
        let files = list_intake_files(&self.settings.input_dir)?;
        info!(files = files.len(), "starting batch");

        let outcomes: Vec<FileOutcome> = files
            .iter()
            .map(|path| self.process_workbook(path, run_id))
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let report = BatchReport {
            run_id: run_id.to_string(),
            attempted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            elapsed_secs: start.elapsed().as_secs_f64(),
            outcomes,
        };
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }
}
