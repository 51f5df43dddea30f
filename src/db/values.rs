use chrono::{DateTime, NaiveDate, NaiveDateTime};
use duckdb::types::{TimeUnit, ValueRef};
use std::fmt;

/// A single cell returned by either backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Scalar {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Renders the value as a tuple-literal cell: `None`, `True`, `'text'`, `datetime.date(..)`.
    pub fn to_literal(&self) -> String {
        match self {
            Scalar::Null => "None".to_string(),
            Scalar::Bool(true) => "True".to_string(),
            Scalar::Bool(false) => "False".to_string(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) if v.is_finite() => format!("{:?}", v),
            Scalar::Float(_) => "None".to_string(),
            Scalar::Text(s) => quote_literal(s),
            Scalar::Date(d) => format!("datetime.date({})", d.format("%Y, %-m, %-d")),
            Scalar::Timestamp(ts) => {
                format!("datetime.datetime({})", ts.format("%Y, %-m, %-d, %-H, %-M, %-S"))
            }
        }
    }

    /// Converts a DuckDB cell. Returns `None` for nested and exotic types,
    /// which callers read back as text instead.
    pub fn from_value_ref(value: ValueRef<'_>) -> Option<Scalar> {
        let scalar = match value {
            ValueRef::Null => Scalar::Null,
            ValueRef::Boolean(b) => Scalar::Bool(b),
            ValueRef::TinyInt(v) => Scalar::Int(v as i64),
            ValueRef::SmallInt(v) => Scalar::Int(v as i64),
            ValueRef::Int(v) => Scalar::Int(v as i64),
            ValueRef::BigInt(v) => Scalar::Int(v),
            ValueRef::HugeInt(v) => i64::try_from(v)
                .map(Scalar::Int)
                .unwrap_or(Scalar::Float(v as f64)),
            ValueRef::UTinyInt(v) => Scalar::Int(v as i64),
            ValueRef::USmallInt(v) => Scalar::Int(v as i64),
            ValueRef::UInt(v) => Scalar::Int(v as i64),
            ValueRef::UBigInt(v) => i64::try_from(v)
                .map(Scalar::Int)
                .unwrap_or(Scalar::Float(v as f64)),
            ValueRef::Float(v) => Scalar::Float(v as f64),
            ValueRef::Double(v) => Scalar::Float(v),
            ValueRef::Decimal(d) => d
                .to_string()
                .parse::<f64>()
                .map(Scalar::Float)
                .unwrap_or_else(|_| Scalar::Text(d.to_string())),
            ValueRef::Text(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
                .map(Scalar::Date)
                .unwrap_or(Scalar::Int(days as i64)),
            ValueRef::Timestamp(unit, raw) => timestamp_from_unit(unit, raw)
                .map(Scalar::Timestamp)
                .unwrap_or(Scalar::Int(raw)),
            _ => return None,
        };
        Some(scalar)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "None"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Scalar::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn timestamp_from_unit(unit: TimeUnit, raw: i64) -> Option<NaiveDateTime> {
    let micros = match unit {
        TimeUnit::Second => raw.checked_mul(1_000_000)?,
        TimeUnit::Millisecond => raw.checked_mul(1_000)?,
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    };
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Formats a number with thousands separators and two decimals: `1234.5` → `1,234.50`.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c != '0' && c != '.');
    format!("{}{}.{}", if negative { "-" } else { "" }, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_get_grouping_and_two_decimals() {
        assert_eq!(format_amount(0.0), "0.00");
        assert_eq!(format_amount(999.999), "1,000.00");
        assert_eq!(format_amount(1234567.891), "1,234,567.89");
        assert_eq!(format_amount(-4321.5), "-4,321.50");
        assert_eq!(format_amount(-0.001), "0.00");
    }

    #[test]
    fn literals_use_tuple_syntax() {
        assert_eq!(Scalar::Null.to_literal(), "None");
        assert_eq!(Scalar::Float(3.0).to_literal(), "3.0");
        assert_eq!(Scalar::Text("O'Brien".into()).to_literal(), r"'O\'Brien'");
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Scalar::Date(date).to_literal(), "datetime.date(2024, 3, 9)");
        let ts = date.and_hms_opt(14, 5, 0).unwrap();
        assert_eq!(
            Scalar::Timestamp(ts).to_literal(),
            "datetime.datetime(2024, 3, 9, 14, 5, 0)"
        );
    }

    #[test]
    fn duckdb_cells_convert_to_scalars() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT 42::INTEGER, 12.50::DECIMAL(10,2), 'hi', NULL, DATE '2024-01-02', \
                 TIMESTAMP '2024-01-02 03:04:05'",
            )
            .unwrap();
        let mut rows = stmt.query([]).unwrap();
        let row = rows.next().unwrap().unwrap();

        let cells: Vec<Scalar> = (0..6)
            .map(|i| Scalar::from_value_ref(row.get_ref(i).unwrap()).unwrap())
            .collect();

        assert_eq!(cells[0], Scalar::Int(42));
        assert_eq!(cells[1], Scalar::Float(12.5));
        assert_eq!(cells[2], Scalar::Text("hi".into()));
        assert_eq!(cells[3], Scalar::Null);
        assert_eq!(cells[4], Scalar::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
        assert_eq!(
            cells[5],
            Scalar::Timestamp(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap()
            )
        );
    }
}
