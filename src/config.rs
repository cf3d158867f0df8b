// Runtime Configuration
// Startup state for the java runtime plus per connect-function driver and cursor settings.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::traits::{DatabaseError, Result};
use crate::runtime::JavaRuntime;

/// Environment variable holding extra classpath entries
pub const CLASSPATH_ENV: &str = "JDBC_DBAPI_CLASSPATH";
/// Environment variable holding whitespace separated `-D`/`-X` runtime options
pub const JVM_OPTIONS_ENV: &str = "JDBC_DBAPI_JVM_OPTIONS";
/// Configuration file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = ".jdbc_dbapi.json";

/// Classpath and startup options applied before the runtime starts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    /// identifier -> option
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DatabaseError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            DatabaseError::InvalidConfig(format!("Invalid JSON in {}: {}", path.display(), e))
        })
    }

    /// Read configuration from `JDBC_DBAPI_CLASSPATH` and `JDBC_DBAPI_JVM_OPTIONS`
    pub fn from_env() -> Self {
        let classpath = std::env::var_os(CLASSPATH_ENV)
            .map(|paths| {
                std::env::split_paths(&paths)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let options = std::env::var(JVM_OPTIONS_ENV)
            .map(|raw| {
                raw.split_whitespace()
                    .map(|option| (option_identifier(option), option.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Self { classpath, options }
    }

    /// Resolve configuration: local file, then user config file, then environment
    pub fn resolve() -> Result<Self> {
        Self::resolve_in(Path::new("."), user_config_path().as_deref())
    }

    /// Resolve with `dir` standing in for the working directory
    pub fn resolve_in(dir: &Path, user_file: Option<&Path>) -> Result<Self> {
        let local = dir.join(LOCAL_CONFIG_FILE);
        if local.is_file() {
            tracing::debug!(path = %local.display(), "loading runtime config");
            return Self::load(&local);
        }

        if let Some(user) = user_file.filter(|path| path.is_file()) {
            tracing::debug!(path = %user.display(), "loading runtime config");
            return Self::load(user);
        }

        Ok(Self::from_env())
    }

    pub fn is_empty(&self) -> bool {
        self.classpath.is_empty() && self.options.is_empty()
    }

    /// Push classpath entries and options into a runtime that has not started yet
    pub fn apply(&self, runtime: &dyn JavaRuntime) -> Result<()> {
        if runtime.is_running() && !self.is_empty() {
            return Err(DatabaseError::InvalidConfig(
                "the java runtime is already running, its classpath and options cannot be amended"
                    .to_string(),
            ));
        }
        for entry in &self.classpath {
            runtime.add_classpath_entry(entry)?;
        }
        for (identifier, option) in &self.options {
            runtime.add_argument(identifier, option)?;
        }
        Ok(())
    }
}

/// `config.json` in the per-user configuration directory
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "jdbc-dbapi", "jdbc-dbapi")
        .map(|dirs| dirs.config_dir().join("config.json"))
}

/// Identifier for an option: the property name for `-Dname=value`, the option itself otherwise
fn option_identifier(option: &str) -> String {
    match option.strip_prefix("-D") {
        Some(property) => property.split('=').next().unwrap_or(property).to_string(),
        None => option.to_string(),
    }
}

/// Where a connect function finds its driver class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Archive to put on the classpath, or load from directly when late binding is allowed
    pub driver_path: Option<PathBuf>,
    pub driver_class: String,
    /// Permit loading from `driver_path` after the runtime has started
    #[serde(default)]
    pub allow_late_binding: bool,
}

impl DriverSettings {
    pub fn new(driver_class: &str) -> Self {
        Self {
            driver_path: None,
            driver_class: driver_class.to_string(),
            allow_late_binding: false,
        }
    }

    pub fn with_driver_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.driver_path = Some(path.into());
        self
    }

    pub fn with_late_binding(mut self, allow: bool) -> Self {
        self.allow_late_binding = allow;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.driver_class.trim().is_empty() {
            return Err(DatabaseError::InvalidConfig("driver class name is required".to_string()));
        }
        if let Some(path) = &self.driver_path {
            if !(path.is_file() || path.is_dir()) {
                return Err(DatabaseError::InvalidConfig(format!(
                    "driver path does not exist or is not a file or directory: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Settings every cursor of a connection starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorOptions {
    /// Work out row counts of result sets by scrolling to the last row
    pub rowcounts: bool,
    /// Default `fetchmany` size
    pub arraysize: usize,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            rowcounts: true,
            arraysize: 1,
        }
    }
}
