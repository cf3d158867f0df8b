// Native Values
// The value type rows decode into and parameters bind from, plus the native type tags
// type rules declare.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::db::traits::JavaValue;

/// Cell value in a result row, also used as a bind parameter.
///
/// Deserializing from JSON yields only the JSON-shaped variants: strings stay `String`
/// and arrays become `List`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Exact decimal in its textual form
    Decimal(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    List(Vec<CellValue>),
    Binary(Vec<u8>),
}

/// Native type a rule decodes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeType {
    /// Untyped passthrough
    Any,
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Bytes,
    Date,
    Time,
    Timestamp,
    List,
}

impl NativeType {
    pub fn name(&self) -> &'static str {
        match self {
            NativeType::Any => "object",
            NativeType::Bool => "bool",
            NativeType::Int => "int",
            NativeType::Float => "float",
            NativeType::Decimal => "decimal",
            NativeType::String => "str",
            NativeType::Bytes => "bytes",
            NativeType::Date => "date",
            NativeType::Time => "time",
            NativeType::Timestamp => "datetime",
            NativeType::List => "list",
        }
    }

    /// Construct a value of this type from a raw driver value, then check the result
    /// really is of this type.
    pub fn coerce(&self, raw: JavaValue) -> Result<CellValue, String> {
        if raw.is_null() {
            return Ok(CellValue::Null);
        }
        let source = raw.type_name();
        let value = match (self, raw) {
            (NativeType::Any, raw) => CellValue::from_java(raw),

            (NativeType::Bool, JavaValue::Boolean(b)) => CellValue::Bool(b),
            (NativeType::Bool, raw) => match integral(&raw) {
                Some(i) => CellValue::Bool(i != 0),
                None => return Err(unexpected(source, self)),
            },

            (NativeType::Int, JavaValue::Float(f)) => CellValue::Int(f.trunc() as i64),
            (NativeType::Int, JavaValue::Double(f)) => CellValue::Int(f.trunc() as i64),
            (NativeType::Int, JavaValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(CellValue::Int)
                .map_err(|e| format!("invalid literal for int: '{}' ({})", s, e))?,
            (NativeType::Int, raw) => match integral(&raw) {
                Some(i) => CellValue::Int(i),
                None => return Err(unexpected(source, self)),
            },

            (NativeType::Float, JavaValue::Float(f)) => CellValue::Float(f as f64),
            (NativeType::Float, JavaValue::Double(f)) => CellValue::Float(f),
            (NativeType::Float, JavaValue::BigDecimal(s))
            | (NativeType::Float, JavaValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(CellValue::Float)
                .map_err(|e| format!("could not convert string to float: '{}' ({})", s, e))?,
            (NativeType::Float, raw) => match integral(&raw) {
                Some(i) => CellValue::Float(i as f64),
                None => return Err(unexpected(source, self)),
            },

            (NativeType::Decimal, JavaValue::BigDecimal(s)) => CellValue::Decimal(s),
            (NativeType::Decimal, JavaValue::String(s)) => {
                if s.trim().parse::<f64>().is_err() {
                    return Err(format!("invalid decimal literal: '{}'", s));
                }
                CellValue::Decimal(s.trim().to_string())
            }
            (NativeType::Decimal, raw) => match integral(&raw) {
                Some(i) => CellValue::Decimal(i.to_string()),
                None => return Err(unexpected(source, self)),
            },

            (NativeType::String, JavaValue::Bytes(bytes)) => {
                CellValue::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            (NativeType::String, raw) => CellValue::String(raw.to_string()),

            (NativeType::Bytes, JavaValue::Bytes(bytes)) => CellValue::Binary(bytes),
            (NativeType::Bytes, JavaValue::String(s)) => CellValue::Binary(s.into_bytes()),

            (NativeType::Date, JavaValue::Date(text)) => CellValue::Date(parse_date(&text)?),
            (NativeType::Time, JavaValue::Time(text)) => CellValue::Time(parse_time(&text)?),
            (NativeType::Timestamp, JavaValue::Timestamp { text, nanos }) => {
                CellValue::Timestamp(parse_timestamp(&text, nanos)?)
            }

            (NativeType::List, JavaValue::Array(items)) => {
                CellValue::List(items.into_iter().map(CellValue::from_java).collect())
            }

            _ => return Err(unexpected(source, self)),
        };

        if !value.is_instance(*self) {
            return Err(format!(
                "unexpected type {}, expected: {}",
                value.type_name(),
                self.name()
            ));
        }
        Ok(value)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn integral(raw: &JavaValue) -> Option<i64> {
    match raw {
        JavaValue::Byte(v) => Some(*v as i64),
        JavaValue::Short(v) => Some(*v as i64),
        JavaValue::Int(v) => Some(*v as i64),
        JavaValue::Long(v) => Some(*v),
        JavaValue::BigDecimal(s) if decimal_scale(s) == 0 => decimal_long_value(s),
        _ => None,
    }
}

fn unexpected(source: &str, target: &NativeType) -> String {
    format!("cannot construct {} from {}", target.name(), source)
}

impl CellValue {
    pub fn type_name(&self) -> &'static str {
        self.native_type().name()
    }

    /// Native type of this value; `Null` reports `Any`
    pub fn native_type(&self) -> NativeType {
        match self {
            CellValue::Null => NativeType::Any,
            CellValue::Bool(_) => NativeType::Bool,
            CellValue::Int(_) => NativeType::Int,
            CellValue::Float(_) => NativeType::Float,
            CellValue::Decimal(_) => NativeType::Decimal,
            CellValue::String(_) => NativeType::String,
            CellValue::Date(_) => NativeType::Date,
            CellValue::Time(_) => NativeType::Time,
            CellValue::Timestamp(_) => NativeType::Timestamp,
            CellValue::Binary(_) => NativeType::Bytes,
            CellValue::List(_) => NativeType::List,
        }
    }

    pub fn is_instance(&self, native: NativeType) -> bool {
        native == NativeType::Any || self.native_type() == native
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Passthrough conversion used for untyped columns and array elements
    pub fn from_java(raw: JavaValue) -> Self {
        match raw {
            JavaValue::Null => CellValue::Null,
            JavaValue::Boolean(b) => CellValue::Bool(b),
            JavaValue::Byte(v) => CellValue::Int(v as i64),
            JavaValue::Short(v) => CellValue::Int(v as i64),
            JavaValue::Int(v) => CellValue::Int(v as i64),
            JavaValue::Long(v) => CellValue::Int(v),
            JavaValue::Float(v) => CellValue::Float(v as f64),
            JavaValue::Double(v) => CellValue::Float(v),
            JavaValue::BigDecimal(s) => CellValue::Decimal(s),
            JavaValue::String(s) => CellValue::String(s),
            JavaValue::Bytes(bytes) => CellValue::Binary(bytes),
            JavaValue::Date(text) => parse_date(&text)
                .map(CellValue::Date)
                .unwrap_or(CellValue::String(text)),
            JavaValue::Time(text) => parse_time(&text)
                .map(CellValue::Time)
                .unwrap_or(CellValue::String(text)),
            JavaValue::Timestamp { text, nanos } => parse_timestamp(&text, nanos)
                .map(CellValue::Timestamp)
                .unwrap_or(CellValue::String(text)),
            JavaValue::Array(items) => {
                CellValue::List(items.into_iter().map(CellValue::from_java).collect())
            }
            other @ (JavaValue::Properties(_) | JavaValue::Object(_)) => {
                CellValue::String(other.to_string())
            }
        }
    }

    /// Java representation handed to `setObject`
    pub fn to_java(&self) -> JavaValue {
        match self {
            CellValue::Null => JavaValue::Null,
            CellValue::Bool(b) => JavaValue::Boolean(*b),
            CellValue::Int(i) => JavaValue::Long(*i),
            CellValue::Float(f) => JavaValue::Double(*f),
            CellValue::Decimal(s) => JavaValue::BigDecimal(s.clone()),
            CellValue::String(s) => JavaValue::String(s.clone()),
            CellValue::Date(d) => JavaValue::Date(d.format("%Y-%m-%d").to_string()),
            CellValue::Time(t) => JavaValue::Time(t.format("%H:%M:%S").to_string()),
            CellValue::Timestamp(ts) => JavaValue::Timestamp {
                text: ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                nanos: ts.nanosecond(),
            },
            CellValue::Binary(bytes) => JavaValue::Bytes(bytes.clone()),
            CellValue::List(items) => {
                JavaValue::Array(items.iter().map(CellValue::to_java).collect())
            }
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "None"),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Decimal(s) => write!(f, "{}", s),
            CellValue::String(s) => write!(f, "'{}'", s),
            CellValue::Date(d) => write!(f, "{}", d),
            CellValue::Time(t) => write!(f, "{}", t),
            CellValue::Timestamp(ts) => write!(f, "{}", ts),
            CellValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            CellValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Int(value as i64)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(value: Vec<u8>) -> Self {
        CellValue::Binary(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Timestamp(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Digits after the decimal point of a `BigDecimal` string
pub(crate) fn decimal_scale(text: &str) -> usize {
    text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

/// `BigDecimal#longValue()`: the integral part, truncated
pub(crate) fn decimal_long_value(text: &str) -> Option<i64> {
    let integral = text.split_once('.').map(|(int, _)| int).unwrap_or(text);
    match integral {
        "" | "-" | "+" => Some(0),
        digits => digits.parse::<i64>().ok(),
    }
}

/// `java.sql.Date` text, `YYYY-MM-DD`
pub(crate) fn parse_date(text: &str) -> Result<NaiveDate, String> {
    let head = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}': {}", text, e))
}

/// `java.sql.Time` text, `HH:MM:SS`
pub(crate) fn parse_time(text: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .map_err(|e| format!("invalid time '{}': {}", text, e))
}

/// `java.sql.Timestamp` text plus its nanosecond field.
///
/// Microseconds are the first six decimal digits of `nanos`, no rounding and no timezone.
pub(crate) fn parse_timestamp(text: &str, nanos: u32) -> Result<NaiveDateTime, String> {
    let head = text.get(..19).unwrap_or(text);
    let base = NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("invalid timestamp '{}': {}", text, e))?;
    let digits = nanos.to_string();
    let micros: u32 = digits
        .get(..6)
        .unwrap_or(&digits)
        .parse()
        .map_err(|e| format!("invalid nanos {}: {}", nanos, e))?;
    base.with_nanosecond(micros * 1_000)
        .ok_or_else(|| format!("microsecond value out of range: {}", micros))
}
