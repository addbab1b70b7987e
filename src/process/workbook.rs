use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::process::date_parser::{from_excel_serial, parse_datetime};
use crate::process::raw_table::{Table, Value};

/// An open workbook. Sheets are read on demand from the one handle.
pub struct WorkbookReader {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl WorkbookReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let sheets = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook: {:?}", path))?;
        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    /// Sheet names, in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    /// Read one sheet. The first row is its header row; fully blank rows
    /// are skipped.
    pub fn load_sheet(&mut self, name: &str) -> Result<Table> {
        let range = self
            .sheets
            .worksheet_range(name)
            .with_context(|| format!("Failed to read sheet '{}' in {:?}", name, self.path))?;

        let mut rows = range.rows();
        let headers = match rows.next() {
            Some(header_row) => header_names(header_row),
            None => {
                warn!(sheet = name, "sheet is empty");
                return Ok(Table::default());
            }
        };

        let mut data = Vec::new();
        for row in rows {
            let mut values: Vec<Value> = row.iter().map(cell_value).collect();
            values.resize(headers.len(), Value::Null);
            if values.iter().all(Value::is_null) {
                continue;
            }
            data.push(values);
        }
        debug!(sheet = name, columns = headers.len(), rows = data.len(), "loaded sheet");
        Ok(Table::new(headers, data))
    }

    /// Read each named sheet once, even when a name is listed twice.
    #[tracing::instrument(level = "debug", skip(self, names), fields(path = %self.path.display()))]
    pub fn load_sheets(&mut self, names: &[&str]) -> Result<HashMap<String, Table>> {
        let mut out = HashMap::with_capacity(names.len());
        for &name in names {
            if !out.contains_key(name) {
                let table = self.load_sheet(name)?;
                out.insert(name.to_string(), table);
            }
        }
        Ok(out)
    }
}

/// Header strings for the first row. Blank headers become `Unnamed: <i>`,
/// repeats are suffixed `.1`, `.2`, … so every name is distinct.
fn header_names(row: &[Data]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    row.iter()
        .enumerate()
        .map(|(i, cell)| {
            let raw = cell_value(cell).to_string();
            let base = if raw.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                raw
            };
            let n = seen.entry(base.clone()).or_insert(0);
            let name = if *n == 0 {
                base
            } else {
                format!("{}.{}", base, n)
            };
            *n += 1;
            name
        })
        .collect()
}

/// Workbook cell → pipeline value.
pub fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(n) => Value::Number(*n),
        Data::Int(n) => Value::Number(*n as f64),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => from_excel_serial(dt.as_f64())
            .map(Value::Date)
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) => parse_datetime(s)
            .map(Value::Date)
            .unwrap_or_else(|| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_names_fill_and_dedupe() {
        let row = vec![
            Data::String("Amount".into()),
            Data::Empty,
            Data::String("Amount".into()),
            Data::String("Amount".into()),
        ];
        assert_eq!(
            header_names(&row),
            vec!["Amount", "Unnamed: 1", "Amount.1", "Amount.2"]
        );
    }

    #[test]
    fn test_cell_value_mapping() {
        assert_eq!(cell_value(&Data::Int(7)), Value::Number(7.0));
        assert_eq!(cell_value(&Data::String("  ".into())), Value::Null);
        assert_eq!(cell_value(&Data::Bool(true)), Value::Bool(true));
        assert!(matches!(
            cell_value(&Data::DateTimeIso("2025-07-01T00:00:00".into())),
            Value::Date(_)
        ));
    }

    #[test]
    fn test_reader_loads_each_sheet_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("book.xlsx");
        let mut wb = rust_xlsxwriter::Workbook::new();
        let ws = wb.add_worksheet();
        ws.set_name("Payment Adjustment")?;
        ws.write_string(0, 0, "Account Num")?;
        // row 1 left blank
        ws.write_number(2, 0, 7)?;
        wb.save(&path)?;

        let mut reader = WorkbookReader::open(&path)?;
        assert_eq!(reader.sheet_names(), vec!["Payment Adjustment"]);
        let sheets = reader.load_sheets(&["Payment Adjustment", "Payment Adjustment"])?;
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets["Payment Adjustment"].rows, vec![vec![Value::Number(7.0)]]);
        Ok(())
    }
}
