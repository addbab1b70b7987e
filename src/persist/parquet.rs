use anyhow::{Context, Result};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use crate::persist::convert::table_to_batch;
use crate::process::raw_table::Table;

/// `<out_dir>/<stem>_with_kpis.parquet` for a source workbook.
pub fn export_path(source: &Path, out_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "workbook".to_string());
    out_dir.join(format!("{}_with_kpis.parquet", stem))
}

/// Write `table` as a Snappy Parquet file at `path`, via a `.tmp` sibling
/// renamed into place so readers never see a half-written export.
pub fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating export directory {:?}", parent))?;
    }
    let batch = table_to_batch(table).context("converting table to Arrow")?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("could not create temporary file `{}`", tmp_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating ArrowWriter for export")?;
    writer.write(&batch).context("writing export batch")?;
    writer.close().context("closing export writer")?;

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "failed to rename `{}` to `{}`",
            tmp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::raw_table::Value;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    #[test]
    fn test_export_path_from_stem() {
        let p = export_path(Path::new("/in/Monthly Data Jul'25.xlsx"), Path::new("/out"));
        assert_eq!(p, PathBuf::from("/out/Monthly Data Jul'25_with_kpis.parquet"));
    }

    #[test]
    fn test_write_and_read_back() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("claims_with_kpis.parquet");
        let t = Table::new(
            vec!["claim no".into(), "gcr (%)".into()],
            vec![
                vec![Value::Text("A1".into()), Value::Number(80.0)],
                vec![Value::Text("A2".into()), Value::Number(0.0)],
            ],
        );
        write_parquet(&t, &path)?;
        assert!(path.exists());
        assert!(!path.with_extension("parquet.tmp").exists());

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?.build()?;
        let mut rows = 0;
        for batch in reader {
            let batch = batch?;
            assert_eq!(batch.schema().field(1).name(), "gcr (%)");
            rows += batch.num_rows();
        }
        assert_eq!(rows, 2);
        Ok(())
    }
}
