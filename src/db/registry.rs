// Connect Function Registry
// Looks up connect functions by name

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::connect::{CallArgs, ConnectFunction};
use crate::db::connection::Connection;
use crate::db::traits::{DatabaseError, Result};

/// Registry for managing connect functions
pub struct DriverRegistry {
    functions: RwLock<HashMap<String, Arc<dyn ConnectFunction>>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding the bundled connect functions
    pub fn with_bundled() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(crate::db::drivers::SqliteConnect::new()));
        registry
    }

    /// Register a connect function under its name, replacing any previous one
    pub fn register(&self, function: Arc<dyn ConnectFunction>) {
        let name = function.name().to_string();
        let mut functions = self.functions.write().unwrap_or_else(|p| p.into_inner());
        functions.insert(name.clone(), function);
        tracing::info!(function = %name, "registered connect function");
    }

    /// Get a connect function by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn ConnectFunction>> {
        let functions = self.functions.read().unwrap_or_else(|p| p.into_inner());
        functions.get(name).cloned().ok_or_else(|| {
            let mut known: Vec<&String> = functions.keys().collect();
            known.sort();
            DatabaseError::InvalidConfig(format!(
                "no connect function named \"{}\", registered: {:?}",
                name, known
            ))
        })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let functions = self.functions.read().unwrap_or_else(|p| p.into_inner());
        let mut names: Vec<String> = functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has(&self, name: &str) -> bool {
        let functions = self.functions.read().unwrap_or_else(|p| p.into_inner());
        functions.contains_key(name)
    }

    /// Remove a connect function
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ConnectFunction>> {
        let mut functions = self.functions.write().unwrap_or_else(|p| p.into_inner());
        let removed = functions.remove(name);
        if removed.is_some() {
            tracing::info!(function = %name, "unregistered connect function");
        }
        removed
    }

    /// Connect through the named function
    pub fn connect(&self, name: &str, args: &CallArgs) -> Result<Connection> {
        let function = self.get(name)?;
        function.connect(args)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
