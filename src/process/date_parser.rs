use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::process::raw_table::Value;
use crate::process::utils::clean_str;

const YEAR_FIRST_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

const MONTH_FIRST_FORMATS: &[&str] = &["%m/%d/%y %H:%M", "%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];

const YEAR_FIRST_DATES: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

// %y before %Y: chrono's %Y happily reads "25" as year 0025.
const OTHER_DATES: &[&str] = &["%m/%d/%y", "%m/%d/%Y", "%d-%b-%Y"];

/// Parse a date or date-time string in any of the accepted layouts.
/// Returns None if parsing fails.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = clean_str(s);
    if s.is_empty() {
        return None;
    }
    let year_first = s.len() >= 5 && s.as_bytes()[..4].iter().all(u8::is_ascii_digit);
    let (datetimes, dates) = if year_first {
        (YEAR_FIRST_FORMATS, YEAR_FIRST_DATES)
    } else {
        (MONTH_FIRST_FORMATS, OTHER_DATES)
    };

    for fmt in datetimes {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(dt);
        }
    }
    for fmt in dates {
        if let Ok(d) = NaiveDate::parse_from_str(&s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Excel serial day number (1900 date system) → timestamp.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    // 1899-12-30 absorbs Excel's phantom 1900-02-29.
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// Coerce any cell to a timestamp; anything unreadable becomes None.
pub fn coerce_date(v: &Value) -> Option<NaiveDateTime> {
    match v {
        Value::Date(d) => Some(*d),
        Value::Text(s) => parse_datetime(s),
        Value::Number(n) => from_excel_serial(*n),
        _ => None,
    }
}

/// Cell-level form of [`coerce_date`]: unparseable input turns into `Value::Null`.
pub fn to_date_value(v: &Value) -> Value {
    coerce_date(v).map(Value::Date).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_common_layouts() {
        assert_eq!(parse_datetime("2025-07-01"), Some(ymd(2025, 7, 1)));
        assert_eq!(parse_datetime("07/01/2025"), Some(ymd(2025, 7, 1)));
        assert_eq!(parse_datetime("7/1/25"), Some(ymd(2025, 7, 1)));
        assert_eq!(parse_datetime("\"2024/12/14\""), Some(ymd(2024, 12, 14)));
        assert_eq!(parse_datetime("01-Jul-2025"), Some(ymd(2025, 7, 1)));
        assert_eq!(
            parse_datetime("2024/12/22 00:05:00"),
            Some(ymd(2024, 12, 22) + Duration::minutes(5))
        );
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_datetime("pending"), None);
        assert_eq!(parse_datetime(""), None);
        assert_eq!(to_date_value(&Value::Text("13/45/2025".into())), Value::Null);
        assert_eq!(to_date_value(&Value::Bool(true)), Value::Null);
    }

    #[test]
    fn test_excel_serial() {
        // 45839 is 2025-07-01 in the 1900 system
        assert_eq!(from_excel_serial(45839.0), Some(ymd(2025, 7, 1)));
        assert_eq!(
            from_excel_serial(45839.5),
            Some(ymd(2025, 7, 1) + Duration::hours(12))
        );
        assert_eq!(from_excel_serial(-1.0), None);
    }
}
