//! Fixed-width date decoding
//!
//! Source files store dates as runs of digits. Numeric cells lose their
//! leading zeros, so integers are left-padded to the encoding's width
//! before parsing. Anything that does not parse becomes null.

use crate::schema::{parse_iso_datetime, Value};
use chrono::{NaiveDate, NaiveDateTime};

/// Digit layout of a date column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateEncoding {
    /// `YYYYMMDD`
    YearMonthDay,
    /// `DDMMYYYY`
    DayMonthYear,
    /// `YYYYMM`, read as the first day of the month
    YearMonth,
}

impl DateEncoding {
    fn width(&self) -> usize {
        match self {
            DateEncoding::YearMonthDay | DateEncoding::DayMonthYear => 8,
            DateEncoding::YearMonth => 6,
        }
    }

    pub fn parse(&self, raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if raw.len() == self.width() && raw.bytes().all(|b| b.is_ascii_digit()) {
            let date = match self {
                DateEncoding::YearMonthDay => NaiveDate::parse_from_str(raw, "%Y%m%d"),
                DateEncoding::DayMonthYear => NaiveDate::parse_from_str(raw, "%d%m%Y"),
                DateEncoding::YearMonth => NaiveDate::parse_from_str(&format!("{}01", raw), "%Y%m%d"),
            };
            return date.ok().and_then(|d| d.and_hms_opt(0, 0, 0));
        }
        // Some exports already carry ISO dates
        parse_iso_datetime(raw)
    }

    /// Decode a cell; never fails
    pub fn coerce(&self, value: &Value) -> Value {
        let parsed = match value {
            Value::DateTime(dt) => Some(*dt),
            Value::Text(s) => self.parse(s),
            Value::Integer(i) if *i >= 0 => self.parse(&format!("{:0width$}", i, width = self.width())),
            _ => None,
        };
        parsed.map_or(Value::Null, Value::DateTime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::DateTime(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
    }

    #[test]
    fn parses_each_layout() {
        assert_eq!(DateEncoding::YearMonthDay.coerce(&Value::text("20200131")), date(2020, 1, 31));
        assert_eq!(DateEncoding::DayMonthYear.coerce(&Value::text("31012020")), date(2020, 1, 31));
        assert_eq!(DateEncoding::YearMonth.coerce(&Value::text("202002")), date(2020, 2, 1));
    }

    #[test]
    fn pads_numeric_cells() {
        assert_eq!(DateEncoding::DayMonthYear.coerce(&Value::Integer(1022019)), date(2019, 2, 1));
    }

    #[test]
    fn unparsable_values_become_null() {
        assert_eq!(DateEncoding::YearMonthDay.coerce(&Value::text("20201345")), Value::Null);
        assert_eq!(DateEncoding::DayMonthYear.coerce(&Value::text("00000000")), Value::Null);
        assert_eq!(DateEncoding::YearMonth.coerce(&Value::text("2020")), Value::Null);
        assert_eq!(DateEncoding::YearMonthDay.coerce(&Value::Decimal(1.5)), Value::Null);
        assert_eq!(DateEncoding::YearMonthDay.coerce(&Value::Null), Value::Null);
    }

    #[test]
    fn accepts_iso_text() {
        assert_eq!(DateEncoding::DayMonthYear.coerce(&Value::text("2020-01-31")), date(2020, 1, 31));
    }
}
