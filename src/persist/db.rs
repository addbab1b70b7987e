use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::error::EtlError;
use crate::persist::convert::{infer_kinds, ColumnKind};
use crate::process::raw_table::{Table, Value};

/// Prefix shared by every per-run claims table.
pub const TABLE_PREFIX: &str = "claims_with_kpis_";
pub const DEFAULT_REPORT_LIMIT: usize = 1000;

static RUN_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static TAG_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Reject run ids that could not be embedded verbatim in a table name.
pub fn validate_run_id(run_id: &str) -> Result<(), EtlError> {
    if RUN_ID_RE.is_match(run_id) {
        Ok(())
    } else {
        Err(EtlError::InvalidRunId(run_id.to_string()))
    }
}

/// Lower-cased file stem with every run of non-alphanumerics collapsed to `_`.
pub fn file_tag(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let tag = TAG_SEP_RE.replace_all(&stem, "_");
    let tag = tag.trim_matches('_');
    if tag.is_empty() {
        "workbook".to_string()
    } else {
        tag.to_string()
    }
}

pub fn run_table_name(run_id: &str, source: &Path) -> Result<String, EtlError> {
    validate_run_id(run_id)?;
    Ok(format!("{}{}_{}", TABLE_PREFIX, run_id, file_tag(source)))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Number => "REAL",
        ColumnKind::Bool => "INTEGER",
        ColumnKind::Date | ColumnKind::Text => "TEXT",
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Number(n) => SqlValue::Real(*n),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Date(_) | Value::Text(_) => SqlValue::Text(value.to_string()),
    }
}

fn to_json(value: SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(i) => serde_json::Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(s) => serde_json::Value::String(s),
        SqlValue::Blob(b) => serde_json::Value::String(format!("<{} bytes>", b.len())),
    }
}

/// Rows of one run table, ready for JSON output.
#[derive(Debug, Serialize)]
pub struct Report {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// SQLite-backed store holding one table per run and source file.
pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {:?}", parent))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening run database {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory().context("opening in-memory database")?,
        })
    }

    /// Replace run table `name` with `table`'s rows, in one transaction.
    /// `name` must come from [`run_table_name`].
    #[tracing::instrument(level = "debug", skip(self, table), fields(rows = table.num_rows()))]
    pub fn write_run_table(&mut self, name: &str, table: &Table) -> Result<()> {
        if !name.starts_with(TABLE_PREFIX) {
            return Err(EtlError::UnknownTable(name.to_string()).into());
        }
        let kinds = infer_kinds(table);
        let quoted = quote_ident(name);

        let column_defs: Vec<String> = table
            .columns
            .iter()
            .zip(&kinds)
            .map(|(col, kind)| format!("{} {}", quote_ident(col), sql_type(*kind)))
            .collect();
        let placeholders = vec!["?"; table.num_columns()].join(", ");

        let tx = self.conn.transaction().context("starting run table transaction")?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quoted), [])
            .with_context(|| format!("dropping {}", name))?;
        tx.execute(
            &format!("CREATE TABLE {} ({})", quoted, column_defs.join(", ")),
            [],
        )
        .with_context(|| format!("creating {}", name))?;
        if table.num_columns() > 0 {
            let mut stmt = tx
                .prepare(&format!("INSERT INTO {} VALUES ({})", quoted, placeholders))
                .with_context(|| format!("preparing insert into {}", name))?;
            for row in &table.rows {
                stmt.execute(params_from_iter(row.iter().map(to_sql)))
                    .with_context(|| format!("inserting into {}", name))?;
            }
        }
        tx.commit().context("committing run table")?;
        info!(table = %name, rows = table.num_rows(), "stored run table");
        Ok(())
    }

    /// Names of all run tables, oldest run first.
    pub fn list_run_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND substr(name, 1, ?1) = ?2 ORDER BY name",
        )?;
        let names = stmt
            .query_map(
                rusqlite::params![TABLE_PREFIX.len() as i64, TABLE_PREFIX],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Up to `limit` rows of an existing run table. Names not in the database
    /// are rejected before any SQL is built from them.
    pub fn read_run_table(&self, name: &str, limit: usize) -> Result<Report> {
        if !self.list_run_tables()?.iter().any(|t| t == name) {
            return Err(EtlError::UnknownTable(name.to_string()).into());
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} LIMIT ?1", quote_ident(name)))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([limit as i64])?;
        while let Some(row) = cursor.next()? {
            let mut obj = serde_json::Map::with_capacity(width);
            for (i, col) in columns.iter().enumerate() {
                obj.insert(col.clone(), to_json(row.get::<_, SqlValue>(i)?));
            }
            rows.push(obj);
        }
        debug!(table = name, rows = rows.len(), "read run table");
        Ok(Report {
            table: name.to_string(),
            columns,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sample(rows: usize) -> Table {
        let dos = NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Table::new(
            vec!["claim no".into(), "gcr (%)".into(), "dos".into()],
            (0..rows)
                .map(|i| {
                    vec![
                        Value::Text(format!("A{}", i)),
                        Value::Number(50.0),
                        Value::Date(dos),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn test_run_id_validation() {
        assert!(validate_run_id("20250701_093000").is_ok());
        assert!(validate_run_id("nightly-2").is_ok());
        for bad in ["", "a b", "x;DROP", "../x"] {
            assert!(matches!(validate_run_id(bad), Err(EtlError::InvalidRunId(_))));
        }
    }

    #[test]
    fn test_file_tag() {
        assert_eq!(file_tag(Path::new("in/Monthly Data Jul'25.xlsx")), "monthly_data_jul_25");
        assert_eq!(file_tag(Path::new("---.xlsx")), "workbook");
    }

    #[test]
    fn test_runs_do_not_overwrite_each_other() -> Result<()> {
        let dir = tempdir()?;
        let mut store = RunStore::open(&dir.path().join("db").join("claims.db"))?;
        let src = Path::new("July.xlsx");

        let a = run_table_name("20250701_000000", src)?;
        let b = run_table_name("20250702_000000", src)?;
        store.write_run_table(&a, &sample(2))?;
        store.write_run_table(&b, &sample(3))?;
        assert_ne!(a, b);
        assert_eq!(store.list_run_tables()?, vec![a.clone(), b.clone()]);

        // same run id replaces
        store.write_run_table(&a, &sample(1))?;
        assert_eq!(store.read_run_table(&a, DEFAULT_REPORT_LIMIT)?.rows.len(), 1);
        assert_eq!(store.read_run_table(&b, DEFAULT_REPORT_LIMIT)?.rows.len(), 3);
        Ok(())
    }

    #[test]
    fn test_report_limit_and_values() -> Result<()> {
        let mut store = RunStore::open_in_memory()?;
        let name = run_table_name("r1", Path::new("x.xlsx"))?;
        store.write_run_table(&name, &sample(5))?;
        let report = store.read_run_table(&name, 2)?;
        assert_eq!(report.columns, vec!["claim no", "gcr (%)", "dos"]);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0]["claim no"], serde_json::json!("A0"));
        assert_eq!(report.rows[0]["gcr (%)"], serde_json::json!(50.0));
        assert_eq!(report.rows[0]["dos"], serde_json::json!("2025-07-01 00:00:00"));
        Ok(())
    }

    #[test]
    fn test_unknown_table_rejected() -> Result<()> {
        let store = RunStore::open_in_memory()?;
        let err = store
            .read_run_table("claims_with_kpis_x\"; DROP TABLE y; --", 10)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::UnknownTable(_))
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_names_rejected_before_write() -> Result<()> {
        let mut store = RunStore::open_in_memory()?;
        assert!(run_table_name("bad id", Path::new("x.xlsx")).is_err());
        assert!(store.write_run_table("other_table", &sample(1)).is_err());
        assert!(store.list_run_tables()?.is_empty());
        Ok(())
    }
}
