// Database Module
// Connections, cursors and value conversion over JDBC-style drivers

pub mod connection;
pub mod cursor;
pub mod drivers;
pub mod params;
pub mod registry;
pub mod traits;
pub mod types;
pub mod value;
pub mod worker;

#[cfg(test)]
pub mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use cursor::{strip_column_prefixes, ColumnDescription, Cursor, Row, Rows};
pub use drivers::{SqliteConnect, SqliteDriverClass};
pub use params::{BoundStatement, Params};
pub use registry::DriverRegistry;
pub use traits::{
    Accessor, ArgumentError, BindingError, Capability, ColumnMetadata, DatabaseError, ErrorKind,
    ForeignError, JavaValue, JdbcConnection, PreparedStatement, Result, ResultMetadata, ResultSet,
    Setter,
};
pub use types::{TypeConverter, TypeRef, TypeRule};
pub use value::{CellValue, NativeType};
pub use worker::{ConnectionWorker, QueryOutcome};
