use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::persist::RetryPolicy;
use crate::process::reconcile::DEFAULT_CUTOFF;
use crate::schema::{FieldMapping, SchemaRegistry, SheetRole};

/// Runtime settings, read from YAML. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub history_dir: PathBuf,
    pub db_path: PathBuf,
    pub match_cutoff: f64,
    pub archive_attempts: u32,
    pub archive_backoff_ms: u64,
    /// Replaces the built-in header mappings when present.
    pub sheet_mappings: Option<BTreeMap<SheetRole, Vec<FieldMapping>>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/input"),
            output_dir: PathBuf::from("data/output"),
            archive_dir: PathBuf::from("data/archive"),
            history_dir: PathBuf::from("data/history"),
            db_path: PathBuf::from("data/claims.db"),
            match_cutoff: DEFAULT_CUTOFF,
            archive_attempts: 3,
            archive_backoff_ms: 1000,
            sheet_mappings: None,
        }
    }
}

impl Settings {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).context("parsing settings YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading settings file {:?}", path))?;
        Self::from_yaml_str(&contents)
    }

    /// Header mappings: the configured ones, or the built-in registry.
    pub fn registry(&self) -> Result<SchemaRegistry> {
        match &self.sheet_mappings {
            Some(m) => Ok(SchemaRegistry::new(m.clone())?),
            None => Ok(SchemaRegistry::default()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.archive_attempts,
            backoff: Duration::from_millis(self.archive_backoff_ms),
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for d in [
            &self.input_dir,
            &self.output_dir,
            &self.archive_dir,
            &self.history_dir,
        ] {
            fs::create_dir_all(d).with_context(|| format!("creating {:?}", d))?;
        }
        Ok(())
    }
}
