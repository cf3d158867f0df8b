// jdbc-dbapi
// DB-API style connections and cursors over JDBC drivers hosted in an embedded runtime

pub mod config;
pub mod connect;
pub mod db;
pub mod runtime;

pub use config::{CursorOptions, DriverSettings, RuntimeConfig};
pub use connect::{
    ArgType, ArgumentBag, ArgumentParser, ArgumentSchema, ArgumentSpec, CallArgs, ConnectFunction,
    DriverManager, DriverManagerConnect,
};
pub use db::{
    CellValue, ColumnDescription, Connection, ConnectionWorker, Cursor, DatabaseError,
    DriverRegistry, ErrorKind, NativeType, Params, QueryOutcome, Result, Row, SqliteConnect,
    TypeConverter,
};
pub use runtime::{DriverCall, DriverClass, EmbeddedRuntime, JavaRuntime};
