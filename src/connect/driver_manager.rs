// Driver Manager
// Picks the `DriverManager.getConnection` signature matching the supplied arguments.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{CursorOptions, DriverSettings};
use crate::connect::function::ConnectFunction;
use crate::connect::parser::ArgumentBag;
use crate::connect::spec::{ArgType, ArgumentSchema, ArgumentSpec};
use crate::db::connection::Connection;
use crate::db::traits::{DatabaseError, JdbcConnection, Result};
use crate::db::types::TypeConverter;
use crate::runtime::{DriverCall, DriverClass, EmbeddedRuntime, JavaRuntime};

/// Convert a JSON object into string properties
pub fn properties_from_value(value: &Value) -> Result<BTreeMap<String, String>> {
    let Value::Object(map) = value else {
        return Err(DatabaseError::InvalidConfig(format!(
            "properties must be an object, got: {}",
            crate::connect::spec::value_type_name(value)
        )));
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(key, v)| match v {
            Value::String(s) => Ok((key.clone(), s.clone())),
            Value::Bool(_) | Value::Number(_) => Ok((key.clone(), v.to_string())),
            other => Err(DatabaseError::InvalidConfig(format!(
                "property \"{}\" must be a scalar, got: {}",
                key,
                crate::connect::spec::value_type_name(other)
            ))),
        })
        .collect()
}

/// Connection request through `java.sql.DriverManager`.
///
/// The url often embeds credentials, so it never shows up in logs, errors or `Debug` output.
#[derive(Clone)]
pub struct DriverManager {
    url: String,
    properties: BTreeMap<String, String>,
    credentials: Option<(String, String)>,
}

impl DriverManager {
    pub fn new(
        url: &str,
        properties: Option<BTreeMap<String, String>>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(DatabaseError::InvalidConfig("url must be a non-empty string".to_string()));
        }

        let credentials = match (username, password) {
            (Some(user), Some(password)) => Some((user.to_string(), password.to_string())),
            (None, None) => None,
            (user, password) => {
                return Err(DatabaseError::InvalidConfig(format!(
                    "both username and password must be set if used, \
                     username-present: {}, password-present: {}",
                    user.is_some(),
                    password.is_some()
                )))
            }
        };

        let properties = properties.unwrap_or_default();
        if credentials.is_some() && !properties.is_empty() {
            return Err(DatabaseError::InvalidConfig(
                "there is no DriverManager signature taking both username/password and properties; \
                 embed the credentials in the url instead"
                    .to_string(),
            ));
        }

        Ok(Self {
            url: url.to_string(),
            properties,
            credentials,
        })
    }

    /// Build from parsed `url`, `properties`, `username` and `password` arguments
    pub fn from_args(args: &ArgumentBag) -> Result<Self> {
        let url = args.get_str("url")?.ok_or_else(|| {
            DatabaseError::InvalidConfig("url must be a non-empty string".to_string())
        })?;
        let properties = args.get("properties")?.map(properties_from_value).transpose()?;
        Self::new(url, properties, args.get_str("username")?, args.get_str("password")?)
    }

    /// The call matching the supplied arguments
    pub fn call(&self) -> DriverCall {
        let call = if !self.properties.is_empty() {
            DriverCall::UrlWithProperties {
                url: self.url.clone(),
                properties: self.properties.clone(),
            }
        } else if let Some((user, password)) = &self.credentials {
            DriverCall::UrlWithCredentials {
                url: self.url.clone(),
                user: user.clone(),
                password: password.clone(),
            }
        } else {
            DriverCall::Url(self.url.clone())
        };
        tracing::debug!(
            signature = call.signature(),
            "using DriverManager.getConnection signature"
        );
        call
    }

    pub fn get_connection(&self, class: &dyn DriverClass) -> Result<Box<dyn JdbcConnection>> {
        class
            .connect(self.call())
            .map_err(|e| DatabaseError::ConnectionFailed(format!("{}: {}", class.name(), e)))
    }
}

impl fmt::Debug for DriverManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverManager")
            .field("url", &"<redacted>")
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("credentials", &self.credentials.is_some())
            .finish()
    }
}

/// Connect function for any driver reachable by url
pub struct DriverManagerConnect {
    name: String,
    settings: DriverSettings,
    converter: Arc<TypeConverter>,
    options: CursorOptions,
    runtime: Option<Arc<dyn JavaRuntime>>,
}

impl DriverManagerConnect {
    pub fn new(name: &str, settings: DriverSettings) -> Self {
        Self {
            name: name.to_string(),
            settings,
            converter: Arc::new(TypeConverter::new()),
            options: CursorOptions::default(),
            runtime: None,
        }
    }

    pub fn with_converter(mut self, converter: TypeConverter) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    pub fn with_cursor_options(mut self, options: CursorOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve drivers from `runtime` instead of the process-wide one
    pub fn with_runtime(mut self, runtime: Arc<dyn JavaRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

impl ConnectFunction for DriverManagerConnect {
    fn name(&self) -> &str {
        &self.name
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
            ArgumentSpec::builder("url")
                .position(0)
                .arg_type(ArgType::String)
                .secret(true)
                .description("jdbc connection url")
                .build()?,
        )?;
        schema.add(
            ArgumentSpec::builder("properties")
                .arg_type(ArgType::Object)
                .excludes(&["username", "password"])
                .description("driver properties")
                .build()?,
        )?;
        schema.add(
            ArgumentSpec::builder("username")
                .arg_type(ArgType::String)
                .requires(&["password"])
                .build()?,
        )?;
        schema.add(
            ArgumentSpec::builder("password")
                .arg_type(ArgType::String)
                .requires(&["username"])
                .secret(true)
                .build()?,
        )
    }

    fn get_connection(
        &self,
        class: Arc<dyn DriverClass>,
        args: &ArgumentBag,
    ) -> Result<Connection> {
        let handle = DriverManager::from_args(args)?.get_connection(class.as_ref())?;
        Ok(self.wrap(handle))
    }
}
