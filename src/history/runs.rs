use anyhow::Result;
use arrow::{
    array::{Array, ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray, UInt64Array},
    datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};

use crate::history::table_history::{HistoryRow, TableHistory};

/// One successfully processed workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunArtifact {
    pub run_id: String,
    pub source_file: String,
    pub table_name: String,
    pub output_path: String,
    pub rows: u64,
    pub elapsed_secs: f64,
    pub processed_at: DateTime<Utc>,
}

fn strings<'a>(batch: &'a RecordBatch, i: usize) -> Option<&'a StringArray> {
    batch.column(i).as_any().downcast_ref::<StringArray>()
}

impl HistoryRow for RunArtifact {
    const KEY_COLUMN: usize = 2;

    fn partition_date(&self) -> NaiveDate {
        self.processed_at.date_naive()
    }

    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("run_id", ArrowDataType::Utf8, false),
            Field::new("source_file", ArrowDataType::Utf8, false),
            Field::new("table_name", ArrowDataType::Utf8, false),
            Field::new("output_path", ArrowDataType::Utf8, false),
            Field::new("rows", ArrowDataType::UInt64, false),
            Field::new("elapsed_secs", ArrowDataType::Float64, false),
            Field::new(
                "processed_at",
                ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
        ])
    }

    fn to_arrays(&self) -> Vec<ArrayRef> {
        vec![
            Arc::new(StringArray::from(vec![self.run_id.clone()])),
            Arc::new(StringArray::from(vec![self.source_file.clone()])),
            Arc::new(StringArray::from(vec![self.table_name.clone()])),
            Arc::new(StringArray::from(vec![self.output_path.clone()])),
            Arc::new(UInt64Array::from(vec![self.rows])),
            Arc::new(Float64Array::from(vec![self.elapsed_secs])),
            Arc::new(TimestampMicrosecondArray::from(vec![self
                .processed_at
                .timestamp_micros()])),
        ]
    }

    /// The run table name is unique per run id and file.
    fn unique_key(&self) -> String {
        self.table_name.clone()
    }

    fn from_batch(batch: &RecordBatch, row: usize) -> Option<Self> {
        let rows = batch.column(4).as_any().downcast_ref::<UInt64Array>()?;
        let elapsed = batch.column(5).as_any().downcast_ref::<Float64Array>()?;
        let at = batch
            .column(6)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()?;
        if at.is_null(row) {
            return None;
        }
        Some(Self {
            run_id: strings(batch, 0)?.value(row).to_string(),
            source_file: strings(batch, 1)?.value(row).to_string(),
            table_name: strings(batch, 2)?.value(row).to_string(),
            output_path: strings(batch, 3)?.value(row).to_string(),
            rows: rows.value(row),
            elapsed_secs: elapsed.value(row),
            processed_at: Utc.timestamp_micros(at.value(row)).single()?,
        })
    }
}

pub type RunHistory = TableHistory<RunArtifact>;

impl TableHistory<RunArtifact> {
    pub fn new_runs(base: impl Into<PathBuf>) -> Result<Self> {
        TableHistory::new(base, "runs")
    }

    /// Run id of the most recently recorded artifact.
    pub fn last_run_id(&self) -> Result<Option<String>> {
        Ok(self
            .load()?
            .into_iter()
            .max_by(|a, b| {
                a.processed_at
                    .cmp(&b.processed_at)
                    .then_with(|| a.run_id.cmp(&b.run_id))
            })
            .map(|a| a.run_id))
    }
}
