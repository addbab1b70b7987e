use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::Schema as ArrowSchema,
    record_batch::RecordBatch,
};
use chrono::{NaiveDate, Utc};
use glob::glob;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::{
    collections::HashSet,
    fs::{self, File},
    io::BufWriter,
    marker::PhantomData,
    path::PathBuf,
    sync::{Arc, Mutex},
};

/// Trait representing a row in a history table.
/// - Defines schema, to_arrays, unique_key for writes.
/// - `from_batch` rebuilds rows when the ledger is read back.
pub trait HistoryRow: Sized {
    /// Partition date (UTC naive) for hive partitioning
    fn partition_date(&self) -> NaiveDate;
    /// Arrow schema for this row type
    fn schema() -> ArrowSchema;
    /// Convert this row into column arrays matching the schema
    fn to_arrays(&self) -> Vec<ArrayRef>;
    /// Unique dedupe key for this row (used when writing)
    fn unique_key(&self) -> String;
    /// Rebuild row `row` of a stored batch
    fn from_batch(batch: &RecordBatch, row: usize) -> Option<Self>;
    /// Column index for key in schema
    const KEY_COLUMN: usize;

    /// Extract the dedupe key from an existing batch row (for scanning)
    fn extract_key(batch: &RecordBatch, row: usize) -> Option<String> {
        batch
            .column(Self::KEY_COLUMN)
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|arr| arr.value(row).to_string())
    }
}

/// Generic hive-partitioned, append-only history table.
pub struct TableHistory<R: HistoryRow> {
    base_dir: PathBuf,
    table: String,
    schema: Arc<ArrowSchema>,
    seen: Mutex<HashSet<String>>,
    _marker: PhantomData<R>,
}

impl<R: HistoryRow> TableHistory<R> {
    /// Create the table directory and scan existing keys into `seen`.
    pub fn new(base_dir: impl Into<PathBuf>, table: &str) -> Result<Self> {
        let base_dir = base_dir.into();
        let table_dir = base_dir.join(table);
        fs::create_dir_all(&table_dir)
            .with_context(|| format!("could not create `{}`", table_dir.display()))?;

        let history = Self {
            base_dir,
            table: table.to_string(),
            schema: Arc::new(R::schema()),
            seen: Mutex::new(HashSet::new()),
            _marker: PhantomData,
        };

        let mut keys = HashSet::new();
        history.for_each_batch(|batch| {
            for i in 0..batch.num_rows() {
                if let Some(key) = R::extract_key(batch, i) {
                    keys.insert(key);
                }
            }
        })?;
        *history.lock_seen() = keys;
        Ok(history)
    }

    fn lock_seen(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn for_each_batch(&self, mut f: impl FnMut(&RecordBatch)) -> Result<()> {
        let pattern = format!("{}/date=*/*.parquet", self.base_dir.join(&self.table).display());
        let mut paths: Vec<PathBuf> = glob(&pattern)?.filter_map(Result::ok).collect();
        paths.sort();
        for path in paths {
            let file = File::open(&path)
                .with_context(|| format!("failed to open `{}`", path.display()))?;
            let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)?
                .with_batch_size(1024)
                .build()?;
            while let Some(batch) = reader.next().transpose()? {
                f(&batch);
            }
        }
        Ok(())
    }

    /// Append a row. Rows whose key is already present are skipped.
    pub fn add(&self, row: &R) -> Result<()> {
        let key = row.unique_key();
        if !self.lock_seen().insert(key.clone()) {
            return Ok(());
        }

        let partition = format!("date={}", row.partition_date().format("%Y%m%d"));
        let dir = self.base_dir.join(&self.table).join(partition);
        fs::create_dir_all(&dir)?;

        let ts = Utc::now().timestamp_micros();
        let fname = format!("{}---{}.parquet", key, ts);
        let tmp = dir.join(format!("{}.tmp", fname));
        let final_path = dir.join(&fname);

        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), self.schema.clone(), None)?;
        let batch = RecordBatch::try_new(self.schema.clone(), row.to_arrays())?;
        writer.write(&batch)?;
        writer.close()?;
        fs::rename(&tmp, &final_path)?;
        Ok(())
    }

    /// Check if a row exists by its dedupe key
    pub fn get(&self, key: &str) -> bool {
        self.lock_seen().contains(key)
    }

    /// Every stored row, in partition then file-name order.
    pub fn load(&self) -> Result<Vec<R>> {
        let mut rows = Vec::new();
        self.for_each_batch(|batch| {
            rows.extend((0..batch.num_rows()).filter_map(|i| R::from_batch(batch, i)));
        })?;
        Ok(rows)
    }
}
