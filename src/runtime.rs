// Java Runtime
// The process-wide foreign runtime the connect functions resolve driver classes from.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::db::traits::{DatabaseError, ForeignError, JavaValue, JdbcConnection, Result};

/// How a driver class is asked for a connection
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    /// `DriverManager.getConnection(url)`
    Url(String),
    /// `DriverManager.getConnection(url, properties)`
    UrlWithProperties {
        url: String,
        properties: BTreeMap<String, String>,
    },
    /// `DriverManager.getConnection(url, user, password)`
    UrlWithCredentials {
        url: String,
        user: String,
        password: String,
    },
    /// Driver specific constructor arguments
    Constructor(Vec<JavaValue>),
}

impl DriverCall {
    /// Signature name, safe to log
    pub fn signature(&self) -> &'static str {
        match self {
            DriverCall::Url(_) => "url",
            DriverCall::UrlWithProperties { .. } => "url+properties",
            DriverCall::UrlWithCredentials { .. } => "url+credentials",
            DriverCall::Constructor(_) => "constructor",
        }
    }
}

/// A resolved driver class
pub trait DriverClass: Send + Sync {
    fn name(&self) -> &str;

    fn connect(
        &self,
        call: DriverCall,
    ) -> std::result::Result<Box<dyn JdbcConnection>, ForeignError>;
}

/// Capabilities the core needs from the foreign runtime
pub trait JavaRuntime: Send + Sync {
    fn is_running(&self) -> bool;

    /// Start the runtime; fails when it is already running
    fn start(&self) -> Result<()>;

    /// Start the runtime unless it is already running, adding `classpath_entry` first.
    ///
    /// The check, the classpath change and the start happen atomically. Returns `false` when
    /// the runtime was already running, in which case the entry is not added.
    fn ensure_started(&self, classpath_entry: Option<&Path>) -> Result<bool>;

    /// Register a startup option (`-D...` or `-X...`) under an identifier
    fn add_argument(&self, identifier: &str, option: &str) -> Result<()>;

    fn add_classpath_entry(&self, path: &Path) -> Result<()>;

    fn classpath(&self) -> Vec<PathBuf>;

    fn resolve_class(&self, name: &str) -> std::result::Result<Arc<dyn DriverClass>, ForeignError>;

    /// Load a class from one archive through an isolated loader, ignoring the shared classpath
    fn load_class_from_archive(
        &self,
        archive: &Path,
        name: &str,
    ) -> std::result::Result<Arc<dyn DriverClass>, ForeignError>;
}

struct CatalogEntry {
    archive: Option<String>,
    class: Arc<dyn DriverClass>,
}

#[derive(Default)]
struct RuntimeState {
    running: bool,
    classpath: Vec<PathBuf>,
    options: BTreeMap<String, String>,
}

impl RuntimeState {
    fn push_classpath_entry(&mut self, path: &Path) {
        if !self.classpath.iter().any(|p| p == path) {
            tracing::debug!(path = %path.display(), "adding classpath entry");
            self.classpath.push(path.to_path_buf());
        }
    }

    fn launch(&mut self) {
        self.running = true;
        tracing::info!(
            classpath_entries = self.classpath.len(),
            options = ?self.options.values().collect::<Vec<_>>(),
            "java runtime started"
        );
    }
}

/// In-process runtime hosting Rust implemented driver classes.
///
/// A class registered with an archive name is only visible once a classpath entry provides
/// that archive.
pub struct EmbeddedRuntime {
    state: RwLock<RuntimeState>,
    catalog: RwLock<HashMap<String, CatalogEntry>>,
}

impl Default for EmbeddedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedRuntime {
    /// Runtime with an empty class catalog
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RuntimeState::default()),
            catalog: RwLock::new(HashMap::new()),
        }
    }

    /// Runtime with the bundled driver classes registered
    pub fn with_bundled_drivers() -> Self {
        let runtime = Self::new();
        crate::db::drivers::register_bundled(&runtime);
        runtime
    }

    /// The process-wide runtime
    pub fn global() -> &'static EmbeddedRuntime {
        static GLOBAL: OnceLock<EmbeddedRuntime> = OnceLock::new();
        GLOBAL.get_or_init(EmbeddedRuntime::with_bundled_drivers)
    }

    /// Make a class available, optionally packaged in the named archive
    pub fn register_class(&self, archive: Option<&str>, class: Arc<dyn DriverClass>) {
        let name = class.name().to_string();
        tracing::debug!(class = %name, archive = ?archive, "registering driver class");
        self.catalog_mut().insert(
            name,
            CatalogEntry {
                archive: archive.map(str::to_string),
                class,
            },
        );
    }

    /// Startup options in identifier order
    pub fn options(&self) -> Vec<String> {
        self.state().options.values().cloned().collect()
    }

    fn state(&self) -> RwLockReadGuard<'_, RuntimeState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, RuntimeState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn catalog(&self) -> RwLockReadGuard<'_, HashMap<String, CatalogEntry>> {
        self.catalog.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn catalog_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, CatalogEntry>> {
        self.catalog.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn provides_archive(entry: &Path, archive: &str) -> bool {
    if entry.is_dir() {
        return entry.join(archive).is_file();
    }
    entry.file_name().is_some_and(|name| name == archive)
}

impl JavaRuntime for EmbeddedRuntime {
    fn is_running(&self) -> bool {
        self.state().running
    }

    fn start(&self) -> Result<()> {
        let mut state = self.state_mut();
        if state.running {
            return Err(DatabaseError::InvalidConfig(
                "the java runtime is already running".to_string(),
            ));
        }
        state.launch();
        Ok(())
    }

    fn ensure_started(&self, classpath_entry: Option<&Path>) -> Result<bool> {
        let mut state = self.state_mut();
        if state.running {
            return Ok(false);
        }
        if let Some(path) = classpath_entry {
            state.push_classpath_entry(path);
        }
        state.launch();
        Ok(true)
    }

    fn add_argument(&self, identifier: &str, option: &str) -> Result<()> {
        if !(option.starts_with("-D") || option.starts_with("-X")) {
            return Err(DatabaseError::InvalidConfig(format!(
                "runtime option \"{}\" must start with -D or -X",
                option
            )));
        }
        let mut state = self.state_mut();
        if state.running {
            return Err(DatabaseError::InvalidConfig(format!(
                "the java runtime is already running, option \"{}\" cannot be added",
                identifier
            )));
        }
        tracing::debug!(identifier, "adding runtime option");
        state.options.insert(identifier.to_string(), option.to_string());
        Ok(())
    }

    fn add_classpath_entry(&self, path: &Path) -> Result<()> {
        let mut state = self.state_mut();
        if state.running {
            return Err(DatabaseError::InvalidConfig(format!(
                "the java runtime is already running, classpath entry {} cannot be added",
                path.display()
            )));
        }
        state.push_classpath_entry(path);
        Ok(())
    }

    fn classpath(&self) -> Vec<PathBuf> {
        self.state().classpath.clone()
    }

    fn resolve_class(&self, name: &str) -> std::result::Result<Arc<dyn DriverClass>, ForeignError> {
        let state = self.state();
        if !state.running {
            return Err(ForeignError::Sql("the java runtime is not running".to_string()));
        }
        let catalog = self.catalog();
        let entry = catalog
            .get(name)
            .ok_or_else(|| ForeignError::ClassNotFound(name.to_string()))?;
        match &entry.archive {
            None => Ok(Arc::clone(&entry.class)),
            Some(archive) if state.classpath.iter().any(|p| provides_archive(p, archive)) => {
                Ok(Arc::clone(&entry.class))
            }
            Some(_) => Err(ForeignError::ClassNotFound(name.to_string())),
        }
    }

    fn load_class_from_archive(
        &self,
        archive: &Path,
        name: &str,
    ) -> std::result::Result<Arc<dyn DriverClass>, ForeignError> {
        if !archive.exists() {
            return Err(ForeignError::ClassNotFound(format!(
                "{} (archive {} does not exist)",
                name,
                archive.display()
            )));
        }
        let catalog = self.catalog();
        match catalog.get(name) {
            Some(entry)
                if entry
                    .archive
                    .as_deref()
                    .is_some_and(|a| provides_archive(archive, a)) =>
            {
                Ok(Arc::clone(&entry.class))
            }
            _ => Err(ForeignError::ClassNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedClass(&'static str);

    impl DriverClass for NamedClass {
        fn name(&self) -> &str {
            self.0
        }

        fn connect(
            &self,
            _call: DriverCall,
        ) -> std::result::Result<Box<dyn JdbcConnection>, ForeignError> {
            Err(ForeignError::Unsupported("connect".to_string()))
        }
    }

    #[test]
    fn test_start_twice_fails() {
        let runtime = EmbeddedRuntime::new();
        runtime.start().unwrap();
        assert!(runtime.is_running());
        assert!(runtime.start().is_err());
    }

    #[test]
    fn test_ensure_started_starts_once() {
        let runtime = EmbeddedRuntime::new();
        assert!(runtime.ensure_started(Some(Path::new("/opt/first.jar"))).unwrap());
        assert!(!runtime.ensure_started(Some(Path::new("/opt/second.jar"))).unwrap());
        assert!(runtime.is_running());
        assert_eq!(runtime.classpath(), vec![PathBuf::from("/opt/first.jar")]);
    }

    #[test]
    fn test_concurrent_ensure_started_has_one_winner() {
        let runtime = Arc::new(EmbeddedRuntime::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    runtime.ensure_started(None).unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|started| *started)
            .count();
        assert_eq!(winners, 1);
        assert!(runtime.is_running());
    }

    #[test]
    fn test_mutations_after_start_are_rejected() {
        let runtime = EmbeddedRuntime::new();
        runtime.start().unwrap();
        assert!(runtime.add_classpath_entry(Path::new("/tmp/x.jar")).is_err());
        assert!(runtime.add_argument("mem", "-Xmx1g").is_err());
    }

    #[test]
    fn test_add_argument_validates_prefix_and_replaces_by_identifier() {
        let runtime = EmbeddedRuntime::new();
        assert!(runtime.add_argument("bad", "Xmx1g").is_err());
        runtime.add_argument("mem", "-Xmx1g").unwrap();
        runtime.add_argument("mem", "-Xmx2g").unwrap();
        runtime.add_argument("krb", "-Djava.security.krb5.conf=/etc/krb5.conf").unwrap();
        assert_eq!(
            runtime.options(),
            vec!["-Djava.security.krb5.conf=/etc/krb5.conf".to_string(), "-Xmx2g".to_string()]
        );
    }

    #[test]
    fn test_packaged_class_needs_archive_on_classpath() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("demo.jar");
        std::fs::write(&jar, b"").unwrap();

        let runtime = EmbeddedRuntime::new();
        runtime.register_class(Some("demo.jar"), Arc::new(NamedClass("com.demo.Driver")));
        runtime.register_class(None, Arc::new(NamedClass("com.demo.Builtin")));
        runtime.start().unwrap();

        assert!(runtime.resolve_class("com.demo.Builtin").is_ok());
        assert!(matches!(
            runtime.resolve_class("com.demo.Driver"),
            Err(ForeignError::ClassNotFound(_))
        ));
        assert!(runtime.load_class_from_archive(&jar, "com.demo.Driver").is_ok());
    }

    #[test]
    fn test_classpath_directory_provides_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("demo.jar"), b"").unwrap();

        let runtime = EmbeddedRuntime::new();
        runtime.register_class(Some("demo.jar"), Arc::new(NamedClass("com.demo.Driver")));
        runtime.add_classpath_entry(dir.path()).unwrap();
        runtime.start().unwrap();
        assert_eq!(runtime.resolve_class("com.demo.Driver").unwrap().name(), "com.demo.Driver");
        assert_eq!(runtime.classpath(), vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn test_resolve_before_start_fails() {
        let runtime = EmbeddedRuntime::new();
        runtime.register_class(None, Arc::new(NamedClass("com.demo.Builtin")));
        assert!(runtime.resolve_class("com.demo.Builtin").is_err());
    }
}
