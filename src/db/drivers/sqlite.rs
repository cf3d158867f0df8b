// SQLite Driver
// JDBC-style SQLite driver class on rusqlite, and the connect function that uses it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use chrono::DateTime;
use rusqlite::types::Value;
use rusqlite::{Connection as RusqliteConnection, OpenFlags};
use serde::Deserialize;

use crate::config::{CursorOptions, DriverSettings};
use crate::connect::driver_manager::properties_from_value;
use crate::connect::{ArgType, ArgumentBag, ArgumentSchema, ArgumentSpec, ConnectFunction};
use crate::db::connection::Connection;
use crate::db::traits::{
    Accessor, ColumnMetadata, DatabaseError, ForeignError, JavaValue, JdbcConnection,
    PreparedStatement, ResultMetadata, ResultSet, Result, Setter, COLUMN_NULLABLE_UNKNOWN,
};
use crate::db::types::TypeConverter;
use crate::runtime::{DriverCall, DriverClass, EmbeddedRuntime, JavaRuntime};

pub const DRIVER_CLASS: &str = "org.sqlite.JDBC";
pub const DRIVER_ARCHIVE: &str = "sqlite-jdbc.jar";
pub const URL_PREFIX: &str = "jdbc:sqlite:";

const MEMORY: &str = ":memory:";

type ForeignResult<T> = std::result::Result<T, ForeignError>;

fn sql_error(e: rusqlite::Error) -> ForeignError {
    ForeignError::Sql(e.to_string())
}

/// Connection options read from the driver properties
#[derive(Debug, Clone, Default, PartialEq)]
struct SqliteOptions {
    read_only: bool,
    autocommit: bool,
    foreign_keys: Option<bool>,
    journal_mode: Option<String>,
    busy_timeout: Option<u64>,
}

impl SqliteOptions {
    fn from_properties(properties: &BTreeMap<String, String>) -> ForeignResult<Self> {
        let mut options = SqliteOptions {
            autocommit: true,
            ..Default::default()
        };
        for (key, value) in properties {
            match key.as_str() {
                "open_mode" => options.read_only = value.eq_ignore_ascii_case("readonly"),
                "autocommit" => options.autocommit = parse_flag(key, value)?,
                "foreign_keys" => options.foreign_keys = Some(parse_flag(key, value)?),
                "journal_mode" => options.journal_mode = Some(value.clone()),
                "busy_timeout" => {
                    options.busy_timeout = Some(value.parse().map_err(|_| {
                        ForeignError::Sql(format!("invalid value for busy_timeout: {}", value))
                    })?)
                }
                other => tracing::debug!(property = other, "ignoring unknown sqlite property"),
            }
        }
        Ok(options)
    }
}

fn parse_flag(key: &str, value: &str) -> ForeignResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => Err(ForeignError::Sql(format!("invalid value for {}: {}", key, value))),
    }
}

/// Database file named by a `jdbc:sqlite:` url
fn file_from_url(url: &str) -> ForeignResult<String> {
    let file = url
        .strip_prefix(URL_PREFIX)
        .ok_or_else(|| ForeignError::Sql(format!("invalid database address: {}", URL_PREFIX)))?;
    Ok(if file.is_empty() { MEMORY.to_string() } else { file.to_string() })
}

/// `org.sqlite.JDBC`
pub struct SqliteDriverClass;

impl SqliteDriverClass {
    fn open(
        file: &str,
        properties: &BTreeMap<String, String>,
    ) -> ForeignResult<Box<dyn JdbcConnection>> {
        let options = SqliteOptions::from_properties(properties)?;
        let conn = if file == MEMORY {
            RusqliteConnection::open_in_memory()
        } else {
            let flags = if options.read_only {
                OpenFlags::SQLITE_OPEN_READ_ONLY
            } else {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            };
            RusqliteConnection::open_with_flags(file, flags)
        }
        .map_err(sql_error)?;

        if let Some(enabled) = options.foreign_keys {
            conn.pragma_update(None, "foreign_keys", enabled).map_err(sql_error)?;
        }
        if let Some(mode) = &options.journal_mode {
            conn.pragma_update_and_check(None, "journal_mode", mode, |row| row.get::<_, String>(0))
                .map_err(sql_error)?;
        }
        if let Some(ms) = options.busy_timeout {
            conn.busy_timeout(std::time::Duration::from_millis(ms)).map_err(sql_error)?;
        }

        tracing::debug!(
            memory = file == MEMORY,
            autocommit = options.autocommit,
            "sqlite database opened"
        );
        Ok(Box::new(SqliteConnection {
            session: Rc::new(SqliteSession {
                conn: RefCell::new(Some(conn)),
                autocommit: options.autocommit,
            }),
        }))
    }
}

impl DriverClass for SqliteDriverClass {
    fn name(&self) -> &str {
        DRIVER_CLASS
    }

    fn connect(&self, call: DriverCall) -> ForeignResult<Box<dyn JdbcConnection>> {
        match call {
            DriverCall::Url(url) | DriverCall::UrlWithCredentials { url, .. } => {
                Self::open(&file_from_url(&url)?, &BTreeMap::new())
            }
            DriverCall::UrlWithProperties { url, properties } => {
                Self::open(&file_from_url(&url)?, &properties)
            }
            // SQLiteConnection(String url, String fileName, Properties prop)
            DriverCall::Constructor(args) => match args.as_slice() {
                [JavaValue::String(url), JavaValue::String(file), JavaValue::Properties(properties)]
                    if url.starts_with(URL_PREFIX.trim_end_matches(':')) =>
                {
                    Self::open(file, properties)
                }
                other => Err(ForeignError::NoSuchMethod(format!(
                    "SQLiteConnection({})",
                    other.iter().map(JavaValue::type_name).collect::<Vec<_>>().join(", ")
                ))),
            },
        }
    }
}

struct SqliteSession {
    conn: RefCell<Option<RusqliteConnection>>,
    autocommit: bool,
}

impl SqliteSession {
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&RusqliteConnection) -> rusqlite::Result<T>,
    ) -> ForeignResult<T> {
        let guard = self.conn.borrow();
        let conn = guard
            .as_ref()
            .ok_or_else(|| ForeignError::Sql("database connection closed".to_string()))?;
        f(conn).map_err(sql_error)
    }

    /// Open a transaction when running without autocommit
    fn begin(&self, conn: &RusqliteConnection) -> rusqlite::Result<()> {
        if !self.autocommit && conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn finish(&self, sql: &str) -> ForeignResult<()> {
        self.with_conn(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch(sql)?;
            }
            Ok(())
        })
    }
}

pub struct SqliteConnection {
    session: Rc<SqliteSession>,
}

impl JdbcConnection for SqliteConnection {
    fn prepare_statement(&self, sql: &str) -> ForeignResult<Box<dyn PreparedStatement>> {
        self.session.with_conn(|conn| conn.prepare(sql).map(|_| ()))?;
        Ok(Box::new(SqliteStatement {
            session: Rc::clone(&self.session),
            sql: sql.to_string(),
            params: BTreeMap::new(),
            batch: Vec::new(),
            pending: None,
            update_count: -1,
        }))
    }

    fn commit(&self) -> ForeignResult<()> {
        self.session.finish("COMMIT")
    }

    fn rollback(&self) -> ForeignResult<()> {
        self.session.finish("ROLLBACK")
    }

    fn is_closed(&self) -> bool {
        self.session.conn.borrow().is_none()
    }

    fn close(&self) -> ForeignResult<()> {
        match self.session.conn.borrow_mut().take() {
            Some(conn) => conn.close().map_err(|(_, e)| sql_error(e)),
            None => Ok(()),
        }
    }
}

/// Statement outcome read back by the cursor
enum Executed {
    Rows { names: Vec<String>, rows: Vec<Vec<Value>> },
    Update(usize),
}

pub struct SqliteStatement {
    session: Rc<SqliteSession>,
    sql: String,
    params: BTreeMap<usize, Value>,
    batch: Vec<Vec<Value>>,
    pending: Option<SqliteResultSet>,
    update_count: i64,
}

impl SqliteStatement {
    fn ordered_params(&self) -> ForeignResult<Vec<Value>> {
        let count = self.params.keys().next_back().copied().unwrap_or(0);
        (1..=count)
            .map(|index| {
                self.params.get(&index).cloned().ok_or_else(|| {
                    ForeignError::Sql(format!("value not bound for parameter {}", index))
                })
            })
            .collect()
    }
}

fn to_sqlite(setter: Setter, value: JavaValue) -> ForeignResult<Value> {
    Ok(match value {
        JavaValue::Null => Value::Null,
        JavaValue::Boolean(b) => Value::Integer(i64::from(b)),
        JavaValue::Byte(v) => Value::Integer(i64::from(v)),
        JavaValue::Short(v) => Value::Integer(i64::from(v)),
        JavaValue::Int(v) => Value::Integer(i64::from(v)),
        JavaValue::Long(v) => Value::Integer(v),
        JavaValue::Float(v) => Value::Real(f64::from(v)),
        JavaValue::Double(v) => Value::Real(v),
        JavaValue::Bytes(bytes) => Value::Blob(bytes),
        JavaValue::BigDecimal(text)
        | JavaValue::String(text)
        | JavaValue::Date(text)
        | JavaValue::Time(text)
        | JavaValue::Object(text)
        | JavaValue::Timestamp { text, .. } => Value::Text(text),
        other => {
            return Err(ForeignError::Unsupported(format!(
                "PreparedStatement.{} with {}",
                setter.method_name(),
                other.type_name()
            )))
        }
    })
}

impl PreparedStatement for SqliteStatement {
    fn clear_parameters(&mut self) -> ForeignResult<()> {
        self.params.clear();
        Ok(())
    }

    fn set(&mut self, index: usize, setter: Setter, value: JavaValue) -> ForeignResult<()> {
        if index < 1 {
            return Err(ForeignError::Sql(format!("parameter index out of range: {}", index)));
        }
        self.params.insert(index, to_sqlite(setter, value)?);
        Ok(())
    }

    fn execute(&mut self) -> ForeignResult<bool> {
        let params = self.ordered_params()?;
        self.pending = None;
        let executed = self.session.with_conn(|conn| {
            self.session.begin(conn)?;
            let mut stmt = conn.prepare(&self.sql)?;
            if stmt.column_count() == 0 {
                return stmt
                    .execute(rusqlite::params_from_iter(params.iter()))
                    .map(Executed::Update);
            }
            let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
            let width = names.len();
            let mut rows = Vec::new();
            let mut cursor = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            while let Some(row) = cursor.next()? {
                rows.push(
                    (0..width)
                        .map(|i| row.get::<_, Value>(i))
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                );
            }
            Ok(Executed::Rows { names, rows })
        })?;

        match executed {
            Executed::Rows { names, rows } => {
                self.update_count = -1;
                self.pending = Some(SqliteResultSet::new(names, rows));
                Ok(true)
            }
            Executed::Update(changed) => {
                self.update_count = changed as i64;
                Ok(false)
            }
        }
    }

    fn result_set(&mut self) -> ForeignResult<Option<Box<dyn ResultSet>>> {
        Ok(self.pending.take().map(|rs| Box::new(rs) as Box<dyn ResultSet>))
    }

    fn update_count(&self) -> ForeignResult<i64> {
        Ok(self.update_count)
    }

    fn add_batch(&mut self) -> ForeignResult<()> {
        let params = self.ordered_params()?;
        self.batch.push(params);
        Ok(())
    }

    fn execute_batch(&mut self) -> ForeignResult<Vec<i64>> {
        let batch = std::mem::take(&mut self.batch);
        self.session.with_conn(|conn| {
            self.session.begin(conn)?;
            let mut stmt = conn.prepare(&self.sql)?;
            let mut counts = Vec::with_capacity(batch.len());
            for params in &batch {
                counts.push(stmt.execute(rusqlite::params_from_iter(params.iter()))? as i64);
            }
            Ok(counts)
        })
    }

    fn close(&mut self) -> ForeignResult<()> {
        self.pending = None;
        self.batch.clear();
        Ok(())
    }
}

/// Fully read result set; SQLite has no server side cursor to keep open
pub struct SqliteResultSet {
    metadata: ResultMetadata,
    rows: Vec<Vec<Value>>,
    /// 0 before the first row, `rows.len() + 1` after the last
    position: usize,
    last_null: bool,
}

/// JDBC type of a column, inferred from its first non-null value
fn column_type(rows: &[Vec<Value>], index: usize) -> (i32, &'static str) {
    let first = rows
        .iter()
        .filter_map(|row| row.get(index))
        .find(|value| !matches!(value, Value::Null));
    match first {
        Some(Value::Integer(_)) => (-5, "INTEGER"),
        Some(Value::Real(_)) => (8, "REAL"),
        Some(Value::Text(_)) => (12, "TEXT"),
        Some(Value::Blob(_)) => (-3, "BLOB"),
        _ => (0, "NULL"),
    }
}

impl SqliteResultSet {
    fn new(names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let (type_code, type_name) = column_type(&rows, index);
                ColumnMetadata {
                    name,
                    type_code,
                    type_name: type_name.to_string(),
                    display_size: i32::MAX,
                    precision: 0,
                    scale: 0,
                    nullable: COLUMN_NULLABLE_UNKNOWN,
                }
            })
            .collect();
        Self {
            metadata: ResultMetadata { columns },
            rows,
            position: 0,
            last_null: false,
        }
    }

    fn current(&self, column: usize) -> ForeignResult<&Value> {
        let row = self
            .position
            .checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .ok_or_else(|| ForeignError::Sql("ResultSet not positioned on a row".to_string()))?;
        column
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .ok_or_else(|| {
                ForeignError::Sql(format!("column {} out of bounds [1,{}]", column, row.len()))
            })
    }
}

fn cannot_convert(value: &Value, accessor: Accessor) -> ForeignError {
    let kind = match value {
        Value::Null => "NULL",
        Value::Integer(_) => "INTEGER",
        Value::Real(_) => "REAL",
        Value::Text(_) => "TEXT",
        Value::Blob(_) => "BLOB",
    };
    ForeignError::Sql(format!("cannot read {} value via {}", kind, accessor.method_name()))
}

fn parse_text<T: std::str::FromStr>(
    text: &str,
    value: &Value,
    accessor: Accessor,
) -> ForeignResult<T> {
    text.trim().parse().map_err(|_| cannot_convert(value, accessor))
}

fn long_value(value: &Value, accessor: Accessor) -> ForeignResult<i64> {
    match value {
        Value::Integer(v) => Ok(*v),
        Value::Real(v) => Ok(*v as i64),
        Value::Text(text) => parse_text(text, value, accessor),
        _ => Err(cannot_convert(value, accessor)),
    }
}

fn double_value(value: &Value, accessor: Accessor) -> ForeignResult<f64> {
    match value {
        Value::Integer(v) => Ok(*v as f64),
        Value::Real(v) => Ok(*v),
        Value::Text(text) => parse_text(text, value, accessor),
        _ => Err(cannot_convert(value, accessor)),
    }
}

/// Nanosecond field of a `yyyy-mm-dd hh:mm:ss.fffffffff` string
fn fractional_nanos(text: &str) -> u32 {
    let Some((_, fraction)) = text.get(19..).and_then(|rest| rest.split_once('.')) else {
        return 0;
    };
    let digits: String = fraction.chars().take_while(char::is_ascii_digit).take(9).collect();
    format!("{:0<9}", digits).parse().unwrap_or(0)
}

/// Date and time values are stored as text or as epoch milliseconds
fn temporal_value(value: &Value, accessor: Accessor) -> ForeignResult<JavaValue> {
    match value {
        Value::Text(text) => Ok(match accessor {
            Accessor::GetDate => JavaValue::Date(text.clone()),
            Accessor::GetTime => JavaValue::Time(text.clone()),
            _ => JavaValue::Timestamp {
                text: text.clone(),
                nanos: fractional_nanos(text),
            },
        }),
        Value::Integer(millis) => {
            let utc = DateTime::from_timestamp_millis(*millis)
                .ok_or_else(|| cannot_convert(value, accessor))?;
            let instant = utc.naive_utc();
            Ok(match accessor {
                Accessor::GetDate => JavaValue::Date(instant.format("%Y-%m-%d").to_string()),
                Accessor::GetTime => JavaValue::Time(instant.format("%H:%M:%S").to_string()),
                _ => JavaValue::Timestamp {
                    text: instant.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                    nanos: utc.timestamp_subsec_nanos(),
                },
            })
        }
        _ => Err(cannot_convert(value, accessor)),
    }
}

fn read_value(value: &Value, accessor: Accessor) -> ForeignResult<JavaValue> {
    Ok(match accessor {
        Accessor::GetString => JavaValue::String(match value {
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(text) => text.clone(),
            Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::Null => return Ok(JavaValue::Null),
        }),
        Accessor::GetBoolean => JavaValue::Boolean(match value {
            Value::Text(text) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1"),
            other => long_value(other, accessor)? != 0,
        }),
        Accessor::GetByte => JavaValue::Byte(long_value(value, accessor)? as i8),
        Accessor::GetShort => JavaValue::Short(long_value(value, accessor)? as i16),
        Accessor::GetInt => JavaValue::Int(long_value(value, accessor)? as i32),
        Accessor::GetLong => JavaValue::Long(long_value(value, accessor)?),
        Accessor::GetFloat => JavaValue::Float(double_value(value, accessor)? as f32),
        Accessor::GetDouble => JavaValue::Double(double_value(value, accessor)?),
        Accessor::GetBigDecimal => JavaValue::BigDecimal(match value {
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(text) => text.trim().to_string(),
            other => return Err(cannot_convert(other, accessor)),
        }),
        Accessor::GetBytes => JavaValue::Bytes(match value {
            Value::Blob(bytes) => bytes.clone(),
            Value::Text(text) => text.as_bytes().to_vec(),
            other => return Err(cannot_convert(other, accessor)),
        }),
        Accessor::GetDate | Accessor::GetTime | Accessor::GetTimestamp => {
            temporal_value(value, accessor)?
        }
        Accessor::GetArray | Accessor::GetMap | Accessor::GetStruct => {
            return Err(ForeignError::Unsupported(format!("ResultSet.{}", accessor.method_name())))
        }
        Accessor::GetObject => match value {
            Value::Null => JavaValue::Null,
            Value::Integer(v) => JavaValue::Long(*v),
            Value::Real(v) => JavaValue::Double(*v),
            Value::Text(text) => JavaValue::String(text.clone()),
            Value::Blob(bytes) => JavaValue::Bytes(bytes.clone()),
        },
    })
}

impl ResultSet for SqliteResultSet {
    fn next(&mut self) -> ForeignResult<bool> {
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn is_null(&mut self, column: usize) -> ForeignResult<bool> {
        Ok(matches!(self.current(column)?, Value::Null))
    }

    fn was_null(&self) -> ForeignResult<bool> {
        Ok(self.last_null)
    }

    fn get(&mut self, accessor: Accessor, column: usize) -> ForeignResult<JavaValue> {
        let value = self.current(column)?;
        let is_null = matches!(value, Value::Null);
        let result = if is_null {
            JavaValue::Null
        } else {
            read_value(value, accessor)?
        };
        self.last_null = is_null;
        Ok(result)
    }

    fn metadata(&self) -> ForeignResult<ResultMetadata> {
        Ok(self.metadata.clone())
    }

    fn last(&mut self) -> ForeignResult<bool> {
        self.position = self.rows.len();
        Ok(!self.rows.is_empty())
    }

    fn row(&self) -> ForeignResult<i64> {
        if (1..=self.rows.len()).contains(&self.position) {
            Ok(self.position as i64)
        } else {
            Ok(0)
        }
    }

    fn before_first(&mut self) -> ForeignResult<()> {
        self.position = 0;
        Ok(())
    }

    fn set_fetch_size(&mut self, _rows: usize) -> ForeignResult<()> {
        Err(ForeignError::Unsupported("ResultSet.setFetchSize".to_string()))
    }

    fn close(&mut self) -> ForeignResult<()> {
        self.rows.clear();
        self.position = 0;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SqliteArgs {
    file_name: String,
    #[serde(default)]
    properties: serde_json::Value,
}

/// `connect` for the SQLite driver
pub struct SqliteConnect {
    settings: DriverSettings,
    converter: Arc<TypeConverter>,
    options: CursorOptions,
    runtime: Option<Arc<dyn JavaRuntime>>,
}

impl Default for SqliteConnect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteConnect {
    pub fn new() -> Self {
        Self {
            settings: DriverSettings::new(DRIVER_CLASS),
            converter: Arc::new(TypeConverter::new()),
            options: CursorOptions::default(),
            runtime: None,
        }
    }

    pub fn with_driver_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings = self.settings.with_driver_path(path);
        self
    }

    pub fn with_late_binding(mut self, allow: bool) -> Self {
        self.settings = self.settings.with_late_binding(allow);
        self
    }

    pub fn with_cursor_options(mut self, options: CursorOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve the driver from `runtime` instead of the process-wide one
    pub fn with_runtime(mut self, runtime: Arc<dyn JavaRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

impl ConnectFunction for SqliteConnect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    fn converter(&self) -> Arc<TypeConverter> {
        Arc::clone(&self.converter)
    }

    fn runtime(&self) -> &dyn JavaRuntime {
        match &self.runtime {
            Some(runtime) => runtime.as_ref(),
            None => EmbeddedRuntime::global(),
        }
    }

    fn cursor_options(&self) -> CursorOptions {
        self.options
    }

    fn declare_arguments(&self, schema: &mut ArgumentSchema) -> Result<()> {
        schema.add(
            ArgumentSpec::builder("file_name")
                .position(0)
                .arg_type(ArgType::String)
                .description("sqlite database file path, or \":memory:\"")
                .build()?,
        )?;
        schema.add(
            ArgumentSpec::builder("driver")
                .arg_type(ArgType::String)
                .description("path to the sqlite jdbc driver archive")
                .build()?,
        )?;
        schema.add(
            ArgumentSpec::builder("properties")
                .arg_type(ArgType::Object)
                .default(serde_json::json!({}))
                .build()?,
        )
    }

    fn handle_args(&self, args: &ArgumentBag, settings: &mut DriverSettings) -> Result<()> {
        if let Some(driver) = args.get_str("driver")? {
            settings.driver_path = Some(PathBuf::from(driver));
        }
        Ok(())
    }

    fn get_connection(
        &self,
        class: Arc<dyn DriverClass>,
        args: &ArgumentBag,
    ) -> Result<Connection> {
        let parsed: SqliteArgs = args.deserialize()?;
        let properties = properties_from_value(&parsed.properties)?;
        let handle = class
            .connect(DriverCall::Constructor(vec![
                JavaValue::String(URL_PREFIX.trim_end_matches(':').to_string()),
                JavaValue::String(parsed.file_name),
                JavaValue::Properties(properties),
            ]))
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        Ok(self.wrap(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::{CallArgs, DriverManagerConnect};
    use crate::db::params::Params;
    use crate::db::traits::ErrorKind;
    use crate::db::value::CellValue;
    use serde_json::json;
    use tempfile::TempDir;

    fn runtime() -> Arc<EmbeddedRuntime> {
        let runtime = EmbeddedRuntime::new();
        crate::db::drivers::register_bundled(&runtime);
        Arc::new(runtime)
    }

    fn archive(dir: &TempDir) -> PathBuf {
        let path = dir.path().join(DRIVER_ARCHIVE);
        std::fs::write(&path, b"").unwrap();
        path
    }

    fn memory_connection(dir: &TempDir) -> Connection {
        SqliteConnect::new()
            .with_driver_path(archive(dir))
            .with_runtime(runtime())
            .connect(&CallArgs::new().arg(":memory:"))
            .unwrap()
    }

    fn positional(values: Vec<CellValue>) -> Params {
        Params::Positional(values)
    }

    #[test]
    fn test_file_from_url() {
        assert_eq!(file_from_url("jdbc:sqlite:test.db").unwrap(), "test.db");
        assert_eq!(file_from_url("jdbc:sqlite:").unwrap(), ":memory:");
        assert!(file_from_url("jdbc:postgresql://x").is_err());
    }

    #[test]
    fn test_fractional_nanos() {
        assert_eq!(fractional_nanos("2020-01-02 03:04:05.123"), 123_000_000);
        assert_eq!(fractional_nanos("2020-01-02 03:04:05.123456789"), 123_456_789);
        assert_eq!(fractional_nanos("2020-01-02 03:04:05"), 0);
    }

    #[test]
    fn test_properties_are_parsed() {
        let properties: BTreeMap<String, String> = [
            ("autocommit", "false"),
            ("foreign_keys", "on"),
            ("x", "y"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let options = SqliteOptions::from_properties(&properties).unwrap();
        assert!(!options.autocommit);
        assert_eq!(options.foreign_keys, Some(true));

        let bad: BTreeMap<String, String> =
            [("busy_timeout".to_string(), "soon".to_string())].into();
        assert!(SqliteOptions::from_properties(&bad).is_err());
    }

    #[test]
    fn test_constructor_signature_is_checked() {
        let err = SqliteDriverClass
            .connect(DriverCall::Constructor(vec![JavaValue::String("jdbc:sqlite".into())]))
            .err()
            .unwrap();
        assert!(matches!(err, ForeignError::NoSuchMethod(_)));
    }

    #[test]
    fn test_connect_needs_archive_on_classpath() {
        let err = SqliteConnect::new()
            .with_runtime(runtime())
            .connect(&CallArgs::new().arg(":memory:"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::DriverResolution);
        assert!(err.to_string().contains(DRIVER_CLASS));
    }

    #[test]
    fn test_driver_argument_sets_archive() {
        let dir = TempDir::new().unwrap();
        let runtime = runtime();
        let conn = SqliteConnect::new()
            .with_runtime(runtime.clone())
            .connect(
                &CallArgs::new()
                    .arg(":memory:")
                    .kwarg("driver", archive(&dir).to_string_lossy().to_string()),
            )
            .unwrap();
        assert!(!conn.is_closed());
        assert_eq!(runtime.classpath(), vec![dir.path().join(DRIVER_ARCHIVE)]);
    }

    #[test]
    fn test_round_trip_through_cursor() {
        let dir = TempDir::new().unwrap();
        let conn = memory_connection(&dir);
        let mut cursor = conn.cursor().unwrap();

        cursor
            .execute(
                "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, score REAL, photo BLOB)",
                None,
            )
            .unwrap();
        cursor
            .execute(
                "INSERT INTO people (id, name, score, photo) VALUES (%s, %s, %s, %s)",
                Some(&positional(vec![
                    1.into(),
                    "ada".into(),
                    CellValue::Float(9.5),
                    CellValue::Binary(vec![1, 2]),
                ])),
            )
            .unwrap();
        assert_eq!(cursor.rowcount(), 1);

        let named: Params = Params::Named([("name".to_string(), CellValue::from("bob"))].into());
        cursor
            .execute("INSERT INTO people (id, name) VALUES (2, :name)", Some(&named))
            .unwrap();

        cursor.execute("SELECT id, name, score, photo FROM people ORDER BY id", None).unwrap();
        assert_eq!(cursor.rowcount(), 2);
        let rows = cursor.fetchall().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![
                    CellValue::Int(1),
                    "ada".into(),
                    CellValue::Float(9.5),
                    CellValue::Binary(vec![1, 2])
                ],
                vec![CellValue::Int(2), "bob".into(), CellValue::Null, CellValue::Null],
            ]
        );
        assert_eq!(cursor.fetchone().unwrap(), None);
    }

    #[test]
    fn test_description_shape() {
        let dir = TempDir::new().unwrap();
        let conn = memory_connection(&dir);
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT 1 AS n, 'x' AS s, NULL AS z", None).unwrap();
        let description = cursor.description().unwrap().unwrap();
        assert_eq!(description[0].name, "n");
        assert_eq!(description[0].type_code, "int - JDBC:BIGINT");
        assert_eq!(description[0].display_size, None);
        assert_eq!(description[0].null_ok, None);
        assert_eq!(description[1].type_code, "str - JDBC:VARCHAR");
        assert_eq!(description[2].type_code, "NULL");
    }

    #[test]
    fn test_executemany_batches() {
        let dir = TempDir::new().unwrap();
        let conn = memory_connection(&dir);
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("CREATE TABLE t (v INTEGER)", None).unwrap();
        let sets: Vec<Params> = (0..3).map(|v| positional(vec![CellValue::Int(v)])).collect();
        cursor.executemany("INSERT INTO t (v) VALUES (%s)", &sets).unwrap();
        assert_eq!(cursor.rowcount(), 3);

        cursor
            .executemany(
                "UPDATE t SET v = v + 10 WHERE v >= %s",
                &[positional(vec![CellValue::Int(1)]), positional(vec![CellValue::Int(100)])],
            )
            .unwrap();
        assert_eq!(cursor.rowcount(), 2);
    }

    #[test]
    fn test_large_integers_bind_as_long() {
        let dir = TempDir::new().unwrap();
        let conn = memory_connection(&dir);
        let mut cursor = conn.cursor().unwrap();
        cursor
            .execute(
                "SELECT %s AS big",
                Some(&positional(vec![CellValue::Int(i64::from(i32::MAX) + 1)])),
            )
            .unwrap();
        assert_eq!(cursor.fetchone().unwrap(), Some(vec![CellValue::Int(2_147_483_648)]));
    }

    #[test]
    fn test_statement_errors_carry_sql() {
        let dir = TempDir::new().unwrap();
        let conn = memory_connection(&dir);
        let mut cursor = conn.cursor().unwrap();
        let err = cursor.execute("SELEC nonsense", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Statement);
        assert!(err.to_string().contains("SELEC nonsense"));
    }

    #[test]
    fn test_manual_transactions() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("tx.db");
        let function = SqliteConnect::new().with_driver_path(archive(&dir)).with_runtime(runtime());
        let conn = function
            .connect(
                &CallArgs::new()
                    .arg(db.to_string_lossy().to_string())
                    .kwarg("properties", json!({"autocommit": "false"})),
            )
            .unwrap();
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("CREATE TABLE t (v INTEGER)", None).unwrap();
        conn.commit().unwrap();
        cursor.execute("INSERT INTO t VALUES (1)", None).unwrap();
        conn.rollback().unwrap();
        cursor.execute("INSERT INTO t VALUES (2)", None).unwrap();
        conn.commit().unwrap();

        cursor.execute("SELECT v FROM t", None).unwrap();
        assert_eq!(cursor.fetchall().unwrap(), vec![vec![CellValue::Int(2)]]);
    }

    #[test]
    fn test_file_database_persists_across_connections() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("data.db").to_string_lossy().to_string();
        let function = SqliteConnect::new().with_driver_path(archive(&dir)).with_runtime(runtime());

        let conn = function.connect(&CallArgs::new().arg(db.clone())).unwrap();
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("CREATE TABLE t (v TEXT)", None).unwrap();
        cursor
            .execute("INSERT INTO t VALUES (%s)", Some(&positional(vec!["kept".into()])))
            .unwrap();
        cursor.close().unwrap();
        conn.close().unwrap();

        let conn = function.connect(&CallArgs::new().arg(db)).unwrap();
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT v FROM t", None).unwrap();
        assert_eq!(
            cursor.fetchone_named().unwrap().unwrap().get("v"),
            Some(&CellValue::from("kept"))
        );
    }

    #[test]
    fn test_driver_manager_url_connect() {
        let runtime = runtime();
        runtime.register_class(None, Arc::new(SqliteDriverClass));
        let function = DriverManagerConnect::new("sqlite-url", DriverSettings::new(DRIVER_CLASS))
            .with_runtime(runtime);
        let conn = function.connect(&CallArgs::new().arg("jdbc:sqlite::memory:")).unwrap();
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT 'ok'", None).unwrap();
        assert_eq!(cursor.fetchall().unwrap(), vec![vec![CellValue::from("ok")]]);
    }

    #[test]
    fn test_temporal_values_from_text_and_millis() {
        let text = Value::Text("2021-03-04 05:06:07.25".to_string());
        assert_eq!(
            read_value(&text, Accessor::GetTimestamp).unwrap(),
            JavaValue::Timestamp {
                text: "2021-03-04 05:06:07.25".to_string(),
                nanos: 250_000_000
            }
        );
        let millis = Value::Integer(86_400_000 + 1_500);
        assert_eq!(
            read_value(&millis, Accessor::GetDate).unwrap(),
            JavaValue::Date("1970-01-02".into())
        );
        assert_eq!(
            read_value(&millis, Accessor::GetTime).unwrap(),
            JavaValue::Time("00:00:01".into())
        );
        assert!(matches!(
            read_value(&Value::Blob(vec![1]), Accessor::GetDate),
            Err(ForeignError::Sql(_))
        ));
    }
}
