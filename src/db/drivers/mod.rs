// Bundled Drivers
// Driver classes shipped with the crate and registered in every bundled runtime.

pub mod sqlite;

use std::sync::Arc;

use crate::runtime::EmbeddedRuntime;

pub use sqlite::{SqliteConnect, SqliteDriverClass};

/// Register the bundled driver classes, each packaged under its archive name
pub fn register_bundled(runtime: &EmbeddedRuntime) {
    runtime.register_class(Some(sqlite::DRIVER_ARCHIVE), Arc::new(SqliteDriverClass));
}
