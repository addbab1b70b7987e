use anyhow::Result;
use arrow::{
    array::{ArrayRef, BooleanBuilder, Float64Builder, StringBuilder, TimestampMillisecondBuilder},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use crate::process::raw_table::{Table, Value};

/// Column type inferred from the non-null cells of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Number,
    Date,
    Bool,
    Text,
}

impl ColumnKind {
    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnKind::Number => DataType::Float64,
            ColumnKind::Date => DataType::Timestamp(TimeUnit::Millisecond, None),
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Text => DataType::Utf8,
        }
    }
}

/// All non-null cells numbers → Number, all dates → Date, all bools → Bool;
/// anything mixed (or an all-null column) is Text.
pub fn infer_kind<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for v in values {
        let k = match v {
            Value::Null => continue,
            Value::Number(_) => ColumnKind::Number,
            Value::Date(_) => ColumnKind::Date,
            Value::Bool(_) => ColumnKind::Bool,
            Value::Text(_) => return ColumnKind::Text,
        };
        match kind {
            None => kind = Some(k),
            Some(prev) if prev != k => return ColumnKind::Text,
            _ => {}
        }
    }
    kind.unwrap_or(ColumnKind::Text)
}

/// Per-column kinds for a whole table.
pub fn infer_kinds(table: &Table) -> Vec<ColumnKind> {
    (0..table.num_columns())
        .map(|i| infer_kind(table.rows.iter().map(|r| &r[i])))
        .collect()
}

/// Convert a table into one Arrow batch with inferred column types.
pub fn table_to_batch(table: &Table) -> Result<RecordBatch> {
    let kinds = infer_kinds(table);
    let fields: Vec<Field> = table
        .columns
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| Field::new(name, kind.arrow_type(), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let mut out = Vec::with_capacity(table.num_columns());
    for (i, kind) in kinds.iter().enumerate() {
        let cells = table.rows.iter().map(|r| &r[i]);
        let col: ArrayRef = match kind {
            ColumnKind::Number => {
                let mut b = Float64Builder::with_capacity(table.num_rows());
                for v in cells {
                    b.append_option(v.as_f64());
                }
                Arc::new(b.finish())
            }
            ColumnKind::Date => {
                let mut b = TimestampMillisecondBuilder::with_capacity(table.num_rows());
                for v in cells {
                    b.append_option(v.as_date().map(|d| d.and_utc().timestamp_millis()));
                }
                Arc::new(b.finish())
            }
            ColumnKind::Bool => {
                let mut b = BooleanBuilder::with_capacity(table.num_rows());
                for v in cells {
                    b.append_option(match v {
                        Value::Bool(x) => Some(*x),
                        _ => None,
                    });
                }
                Arc::new(b.finish())
            }
            ColumnKind::Text => {
                let mut b = StringBuilder::new();
                for v in cells {
                    if v.is_null() {
                        b.append_null();
                    } else {
                        b.append_value(v.to_string());
                    }
                }
                Arc::new(b.finish())
            }
        };
        out.push(col);
    }

    // zero-column batches need an explicit row count
    let options = arrow::record_batch::RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    RecordBatch::try_new_with_options(schema, out, &options).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, StringArray, TimestampMillisecondArray};
    use chrono::NaiveDate;

    #[test]
    fn test_infer_kind() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(infer_kind([Value::Null, Value::Number(1.0)].iter()), ColumnKind::Number);
        assert_eq!(infer_kind([d.clone(), Value::Null].iter()), ColumnKind::Date);
        assert_eq!(infer_kind([d, Value::Number(1.0)].iter()), ColumnKind::Text);
        assert_eq!(infer_kind([Value::Null].iter()), ColumnKind::Text);
    }

    #[test]
    fn test_table_to_batch_types() -> Result<()> {
        let t = Table::new(
            vec!["claim no".into(), "paid amount".into(), "dos".into()],
            vec![
                vec![
                    Value::Number(1001.0),
                    Value::Number(12.5),
                    Value::Date(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()),
                ],
                vec![Value::Text("A-7".into()), Value::Null, Value::Null],
            ],
        );
        let batch = table_to_batch(&t)?;
        assert_eq!(batch.num_rows(), 2);

        let claims = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(claims.value(0), "1001");
        assert_eq!(claims.value(1), "A-7");

        let paid = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(paid.value(0), 12.5);
        assert!(paid.is_null(1));

        let dos = batch
            .column(2)
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .unwrap();
        assert_eq!(dos.value(0), 86_400_000);
        Ok(())
    }
}
