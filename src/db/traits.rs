// Foreign Driver Traits
// Defines the narrow capability interface every JDBC-style driver exposes to the core,
// plus the error taxonomy shared by the whole crate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value as produced or consumed by the foreign driver.
///
/// Date and time values carry the text the driver renders for them
/// (`java.sql.Date#toString()` and friends) since that is the only
/// representation every driver agrees on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JavaValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// `java.math.BigDecimal` in its plain string form
    BigDecimal(String),
    String(String),
    Bytes(Vec<u8>),
    Date(String),
    Time(String),
    Timestamp { text: String, nanos: u32 },
    Array(Vec<JavaValue>),
    Properties(BTreeMap<String, String>),
    /// Any other object, represented by its `toString()`
    Object(String),
}

impl JavaValue {
    /// Java-side class name, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            JavaValue::Null => "null",
            JavaValue::Boolean(_) => "java.lang.Boolean",
            JavaValue::Byte(_) => "java.lang.Byte",
            JavaValue::Short(_) => "java.lang.Short",
            JavaValue::Int(_) => "java.lang.Integer",
            JavaValue::Long(_) => "java.lang.Long",
            JavaValue::Float(_) => "java.lang.Float",
            JavaValue::Double(_) => "java.lang.Double",
            JavaValue::BigDecimal(_) => "java.math.BigDecimal",
            JavaValue::String(_) => "java.lang.String",
            JavaValue::Bytes(_) => "byte[]",
            JavaValue::Date(_) => "java.sql.Date",
            JavaValue::Time(_) => "java.sql.Time",
            JavaValue::Timestamp { .. } => "java.sql.Timestamp",
            JavaValue::Array(_) => "java.sql.Array",
            JavaValue::Properties(_) => "java.util.Properties",
            JavaValue::Object(_) => "java.lang.Object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JavaValue::Null)
    }
}

impl fmt::Display for JavaValue {
    /// Mirrors `toString()` on the Java side
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaValue::Null => write!(f, "null"),
            JavaValue::Boolean(b) => write!(f, "{}", b),
            JavaValue::Byte(v) => write!(f, "{}", v),
            JavaValue::Short(v) => write!(f, "{}", v),
            JavaValue::Int(v) => write!(f, "{}", v),
            JavaValue::Long(v) => write!(f, "{}", v),
            JavaValue::Float(v) => write!(f, "{}", v),
            JavaValue::Double(v) => write!(f, "{}", v),
            JavaValue::BigDecimal(s)
            | JavaValue::String(s)
            | JavaValue::Date(s)
            | JavaValue::Time(s)
            | JavaValue::Object(s) => write!(f, "{}", s),
            JavaValue::Timestamp { text, .. } => write!(f, "{}", text),
            JavaValue::Bytes(bytes) => write!(f, "[B@{}", bytes.len()),
            JavaValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            JavaValue::Properties(props) => {
                let parts: Vec<String> =
                    props.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

/// Result-set getter methods a type rule may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    GetString,
    GetBoolean,
    GetByte,
    GetShort,
    GetInt,
    GetLong,
    GetFloat,
    GetDouble,
    GetBigDecimal,
    GetBytes,
    GetDate,
    GetTime,
    GetTimestamp,
    GetArray,
    GetMap,
    GetStruct,
    GetObject,
}

impl Accessor {
    pub fn method_name(&self) -> &'static str {
        match self {
            Accessor::GetString => "getString",
            Accessor::GetBoolean => "getBoolean",
            Accessor::GetByte => "getByte",
            Accessor::GetShort => "getShort",
            Accessor::GetInt => "getInt",
            Accessor::GetLong => "getLong",
            Accessor::GetFloat => "getFloat",
            Accessor::GetDouble => "getDouble",
            Accessor::GetBigDecimal => "getBigDecimal",
            Accessor::GetBytes => "getBytes",
            Accessor::GetDate => "getDate",
            Accessor::GetTime => "getTime",
            Accessor::GetTimestamp => "getTimestamp",
            Accessor::GetArray => "getArray",
            Accessor::GetMap => "getMap",
            Accessor::GetStruct => "getStruct",
            Accessor::GetObject => "getObject",
        }
    }
}

/// Prepared-statement setter methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setter {
    SetString,
    SetBoolean,
    SetByte,
    SetShort,
    SetInt,
    SetLong,
    SetFloat,
    SetDouble,
    SetBigDecimal,
    SetBytes,
    SetDate,
    SetTime,
    SetTimestamp,
    SetArray,
    SetMap,
    SetStruct,
    SetObject,
}

impl Setter {
    pub fn method_name(&self) -> &'static str {
        match self {
            Setter::SetString => "setString",
            Setter::SetBoolean => "setBoolean",
            Setter::SetByte => "setByte",
            Setter::SetShort => "setShort",
            Setter::SetInt => "setInt",
            Setter::SetLong => "setLong",
            Setter::SetFloat => "setFloat",
            Setter::SetDouble => "setDouble",
            Setter::SetBigDecimal => "setBigDecimal",
            Setter::SetBytes => "setBytes",
            Setter::SetDate => "setDate",
            Setter::SetTime => "setTime",
            Setter::SetTimestamp => "setTimestamp",
            Setter::SetArray => "setArray",
            Setter::SetMap => "setMap",
            Setter::SetStruct => "setStruct",
            Setter::SetObject => "setObject",
        }
    }
}

/// Errors raised by the foreign side of the bridge
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForeignError {
    /// `java.sql.SQLException` and subclasses
    #[error("{0}")]
    Sql(String),

    /// `java.sql.SQLFeatureNotSupportedException`
    #[error("feature not supported: {0}")]
    Unsupported(String),

    /// The requested method does not exist on the object
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    #[error("class not found: {0}")]
    ClassNotFound(String),
}

/// Outcome of probing an optional driver capability.
///
/// Drivers that do not implement a feature answer `Unsupported`, which is a
/// normal outcome rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    Supported(T),
    Unsupported,
}

impl<T> Capability<T> {
    /// Turn a raw driver result into a capability outcome, keeping real failures as errors
    pub fn from_result(
        result: std::result::Result<T, ForeignError>,
    ) -> std::result::Result<Self, ForeignError> {
        match result {
            Ok(value) => Ok(Capability::Supported(value)),
            Err(ForeignError::Unsupported(_)) => Ok(Capability::Unsupported),
            Err(e) => Err(e),
        }
    }

    pub fn supported(self) -> Option<T> {
        match self {
            Capability::Supported(value) => Some(value),
            Capability::Unsupported => None,
        }
    }
}

/// `ResultSetMetaData.columnNoNulls`
pub const COLUMN_NO_NULLS: i32 = 0;
/// `ResultSetMetaData.columnNullable`
pub const COLUMN_NULLABLE: i32 = 1;
/// `ResultSetMetaData.columnNullableUnknown`
pub const COLUMN_NULLABLE_UNKNOWN: i32 = 2;

/// Column metadata as reported by the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// `java.sql.Types` code
    pub type_code: i32,
    /// Driver specific type name
    pub type_name: String,
    pub display_size: i32,
    pub precision: i32,
    pub scale: i32,
    pub nullable: i32,
}

/// Result set metadata snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub columns: Vec<ColumnMetadata>,
}

impl ResultMetadata {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// 1-based column lookup, as in JDBC
    pub fn column(&self, index: usize) -> Option<&ColumnMetadata> {
        index.checked_sub(1).and_then(|i| self.columns.get(i))
    }
}

/// Foreign result cursor (`java.sql.ResultSet`). Column indexes are 1-based.
pub trait ResultSet {
    /// Advance one row; false at end of data
    fn next(&mut self) -> std::result::Result<bool, ForeignError>;

    /// Whether the given column of the current row holds SQL NULL
    fn is_null(&mut self, column: usize) -> std::result::Result<bool, ForeignError>;

    /// Whether the last value read was SQL NULL
    fn was_null(&self) -> std::result::Result<bool, ForeignError>;

    fn get(
        &mut self,
        accessor: Accessor,
        column: usize,
    ) -> std::result::Result<JavaValue, ForeignError>;

    fn metadata(&self) -> std::result::Result<ResultMetadata, ForeignError>;

    /// Move to the last row; false when the result set is empty
    fn last(&mut self) -> std::result::Result<bool, ForeignError>;

    /// Current row number, 0 when not on a row
    fn row(&self) -> std::result::Result<i64, ForeignError>;

    fn before_first(&mut self) -> std::result::Result<(), ForeignError>;

    fn set_fetch_size(&mut self, rows: usize) -> std::result::Result<(), ForeignError>;

    fn warnings(&self) -> Option<String> {
        None
    }

    fn close(&mut self) -> std::result::Result<(), ForeignError>;
}

/// Foreign prepared statement (`java.sql.PreparedStatement`). Parameter indexes are 1-based.
pub trait PreparedStatement {
    fn clear_parameters(&mut self) -> std::result::Result<(), ForeignError>;

    fn set(
        &mut self,
        index: usize,
        setter: Setter,
        value: JavaValue,
    ) -> std::result::Result<(), ForeignError>;

    /// Execute; true when a result set is available
    fn execute(&mut self) -> std::result::Result<bool, ForeignError>;

    fn result_set(&mut self) -> std::result::Result<Option<Box<dyn ResultSet>>, ForeignError>;

    fn update_count(&self) -> std::result::Result<i64, ForeignError>;

    fn add_batch(&mut self) -> std::result::Result<(), ForeignError>;

    fn execute_batch(&mut self) -> std::result::Result<Vec<i64>, ForeignError>;

    fn close(&mut self) -> std::result::Result<(), ForeignError>;
}

/// Foreign connection handle (`java.sql.Connection`)
pub trait JdbcConnection {
    fn prepare_statement(
        &self,
        sql: &str,
    ) -> std::result::Result<Box<dyn PreparedStatement>, ForeignError>;

    fn commit(&self) -> std::result::Result<(), ForeignError>;

    fn rollback(&self) -> std::result::Result<(), ForeignError>;

    fn is_closed(&self) -> bool;

    fn close(&self) -> std::result::Result<(), ForeignError>;
}

/// Error categories callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Argument,
    DriverResolution,
    Connection,
    State,
    ParameterBinding,
    Statement,
    Conversion,
    NotImplemented,
    Io,
}

/// Caller-supplied connect arguments that failed validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArgumentError {
    #[error("too many positional arguments, accepts at most: {accepted}, got: {given}")]
    TooManyPositional { accepted: usize, given: usize },

    #[error("argument repeated by position and keyword: \"{name}\"")]
    Duplicate { name: String },

    #[error("invalid keyword argument: \"{name}\", valid names: {}", .valid.join(", "))]
    Unknown { name: String, valid: Vec<String> },

    #[error(
        "required arguments missing: {} (note that all positional arguments are mandatory)",
        .names.join(", ")
    )]
    Missing { names: Vec<String> },

    #[error("argument type invalid: \"{name}\" expected {expected}, got: {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error(
        "argument function returned type invalid: \"{name}\" expected {expected}, got: {actual}"
    )]
    TransformTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("argument: \"{name}\" requires these args to ALSO be set: {}", .missing.join(", "))]
    Requires { name: String, missing: Vec<String> },

    #[error("argument: \"{name}\" requires these args to NOT be set: {}", .present.join(", "))]
    Excludes { name: String, present: Vec<String> },

    #[error("argument \"{name}\" value {value} invalid, must be one of: ({})", .choices.join(", "))]
    InvalidChoice {
        name: String,
        value: String,
        choices: Vec<String>,
    },
}

/// Mismatch between SQL placeholders and the supplied parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindingError {
    #[error("\":{key}\" is missing from parameters template in statement: \"{statement}\"")]
    MissingNamed { key: String, statement: String },

    #[error(
        "sql statement is missing named template parameters: ({}) in query: {statement}",
        .keys.iter().map(|k| format!("\":{}\"", k)).collect::<Vec<_>>().join(", ")
    )]
    UnusedNamed { keys: Vec<String>, statement: String },

    #[error(
        "params contains incorrect number of arguments for \"%s\" templates in query, \
         expected: [{expected}] arguments, got: [{actual}]"
    )]
    Insufficient { expected: usize, actual: usize },

    #[error(
        "params contains {actual} elements but query templates consumed only {expected}, \
         unused: [{}]",
        .unused.join(", ")
    )]
    Excess {
        expected: usize,
        actual: usize,
        unused: Vec<String>,
    },
}

/// Common error type for the crate
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("argument is already defined: {0}")]
    NameConflict(String),

    #[error("positional arguments are not sequential, these positions are missing: {0:?}")]
    NonContiguousPositions(Vec<usize>),

    #[error("the parser \"{0}\" has no configured arguments")]
    EmptySchema(String),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error("The driver class \"{class}\" could not be found. {detail}\nClasspath:\n{classpath}")]
    DriverNotFound {
        class: String,
        detail: String,
        classpath: String,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("{0}")]
    State(String),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("Error executing statement:\n{statement}\n{message}")]
    Statement { statement: String, message: String },

    #[error("error converting \"{jdbc_type}\" to \"{native}\" - {cause}")]
    Conversion {
        jdbc_type: String,
        native: String,
        cause: String,
    },

    #[error("JdbcType: {jdbc_type} - unable to get value via {accessor} - {cause}")]
    AttributeResolution {
        jdbc_type: String,
        accessor: String,
        cause: String,
    },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("unable to resolve jdbc type code: {0}")]
    Resolution(i32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::InvalidConfig(_)
            | DatabaseError::NameConflict(_)
            | DatabaseError::NonContiguousPositions(_)
            | DatabaseError::EmptySchema(_) => ErrorKind::Configuration,
            DatabaseError::Argument(_) => ErrorKind::Argument,
            DatabaseError::DriverNotFound { .. } => ErrorKind::DriverResolution,
            DatabaseError::ConnectionFailed(_) => ErrorKind::Connection,
            DatabaseError::State(_) => ErrorKind::State,
            DatabaseError::Binding(_) => ErrorKind::ParameterBinding,
            DatabaseError::Statement { .. } => ErrorKind::Statement,
            DatabaseError::Conversion { .. }
            | DatabaseError::AttributeResolution { .. }
            | DatabaseError::Resolution(_) => ErrorKind::Conversion,
            DatabaseError::NotImplemented(_) => ErrorKind::NotImplemented,
            DatabaseError::IoError(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn statement(statement: &str, err: impl fmt::Display) -> Self {
        DatabaseError::Statement {
            statement: statement.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
