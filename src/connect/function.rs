// Connect Functions
// Parse connect arguments, resolve the driver class and build a connection.

use std::sync::Arc;

use crate::config::{CursorOptions, DriverSettings};
use crate::connect::parser::{ArgumentBag, ArgumentParser, CallArgs};
use crate::connect::spec::ArgumentSchema;
use crate::db::connection::Connection;
use crate::db::traits::{DatabaseError, JdbcConnection, Result};
use crate::db::types::TypeConverter;
use crate::runtime::{DriverClass, EmbeddedRuntime, JavaRuntime};

/// A `connect` entry point for one database driver.
///
/// Implementations declare their arguments and turn a resolved driver class plus parsed
/// arguments into a [`Connection`]. Everything else has a default.
pub trait ConnectFunction: Send + Sync {
    /// Name used for the argument schema and in logs
    fn name(&self) -> &str;

    /// Driver location before `handle_args` adjusts it
    fn settings(&self) -> &DriverSettings;

    /// Converter shared by every connection this function opens
    fn converter(&self) -> Arc<TypeConverter>;

    /// Add this driver's arguments to the schema.
    ///
    /// A function built on another one calls the other's `declare_arguments` first and then
    /// uses [`ArgumentSchema::define`] to override specs by name.
    fn declare_arguments(&self, schema: &mut ArgumentSchema) -> Result<()>;

    /// Build a connection from the resolved driver class
    fn get_connection(&self, class: Arc<dyn DriverClass>, args: &ArgumentBag) -> Result<Connection>;

    fn runtime(&self) -> &dyn JavaRuntime {
        EmbeddedRuntime::global()
    }

    fn cursor_options(&self) -> CursorOptions {
        CursorOptions::default()
    }

    /// Hook called right after parsing; may adjust the settings used for this call
    fn handle_args(&self, _args: &ArgumentBag, _settings: &mut DriverSettings) -> Result<()> {
        Ok(())
    }

    fn schema(&self) -> Result<ArgumentSchema> {
        let mut schema = ArgumentSchema::new(self.name());
        self.declare_arguments(&mut schema)?;
        Ok(schema)
    }

    fn parse_args(&self, call: &CallArgs) -> Result<(ArgumentBag, DriverSettings)> {
        let schema = self.schema()?;
        let args = ArgumentParser::new(&schema).parse(call)?;
        let mut settings = self.settings().clone();
        self.handle_args(&args, &mut settings)?;
        Ok((args, settings))
    }

    fn load_driver(&self, settings: &DriverSettings) -> Result<Arc<dyn DriverClass>> {
        load_driver(self.runtime(), settings)
    }

    /// Wrap a driver connection with this function's converter and cursor options
    fn wrap(&self, handle: Box<dyn JdbcConnection>) -> Connection {
        Connection::new(handle, self.converter(), self.cursor_options())
    }

    fn connect(&self, call: &CallArgs) -> Result<Connection> {
        let (args, settings) = self.parse_args(call)?;
        let class = self.load_driver(&settings)?;
        tracing::debug!(function = self.name(), class = class.name(), "opening connection");
        self.get_connection(class, &args)
    }
}

fn classpath_dump(runtime: &dyn JavaRuntime) -> String {
    runtime
        .classpath()
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn not_found(
    runtime: &dyn JavaRuntime,
    settings: &DriverSettings,
    detail: String,
) -> DatabaseError {
    tracing::warn!(class = %settings.driver_class, "driver class not found");
    DatabaseError::DriverNotFound {
        class: settings.driver_class.clone(),
        detail,
        classpath: classpath_dump(runtime),
    }
}

/// Resolve the driver class named by `settings`, starting the runtime when needed.
pub fn load_driver(
    runtime: &dyn JavaRuntime,
    settings: &DriverSettings,
) -> Result<Arc<dyn DriverClass>> {
    settings.validate()?;
    let class_name = settings.driver_class.as_str();

    let started = runtime.ensure_started(settings.driver_path.as_deref())?;
    if started {
        tracing::debug!(
            class = class_name,
            path = ?settings.driver_path,
            "started runtime for driver"
        );
    }

    let error = match runtime.resolve_class(class_name) {
        Ok(class) => {
            tracing::debug!(class = class_name, started, "driver class resolved");
            return Ok(class);
        }
        Err(e) => e,
    };

    match (&settings.driver_path, started) {
        (None, true) => Err(not_found(
            runtime,
            settings,
            format!(
                "No driver_path was given, the class must be on the configured classpath ({}).",
                error
            ),
        )),
        (Some(path), true) => Err(not_found(
            runtime,
            settings,
            format!("driver_path = {} ({}).", path.display(), error),
        )),
        (Some(path), false) => {
            if !settings.allow_late_binding {
                return Err(DatabaseError::InvalidConfig(format!(
                    "the java runtime is already running and its classpath cannot be amended \
                     to load \"{}\" from {}; add the archive to the classpath before the first \
                     connection",
                    class_name,
                    path.display()
                )));
            }
            tracing::debug!(
                class = class_name,
                path = %path.display(),
                "loading driver class from archive"
            );
            runtime.load_class_from_archive(path, class_name).map_err(|e| {
                not_found(
                    runtime,
                    settings,
                    format!("Unable to load it from {} ({}).", path.display(), e),
                )
            })
        }
        (None, false) => Err(not_found(
            runtime,
            settings,
            "The runtime is already running and no driver_path was given.".to_string(),
        )),
    }
}
