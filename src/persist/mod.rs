pub mod archive;
pub mod convert;
pub mod db;
pub mod parquet;

pub use archive::{archive_with_retry, ArchiveOutcome, FsMover, RetryPolicy, ThreadSleeper};
pub use db::{run_table_name, validate_run_id, Report, RunStore, DEFAULT_REPORT_LIMIT};
pub use parquet::{export_path, write_parquet};
