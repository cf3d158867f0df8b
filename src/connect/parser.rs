// Argument Parser
// Validates and normalizes positional and keyword connect arguments against a schema.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::connect::spec::{value_type_name, ArgumentSchema, ArgumentSpec};
use crate::db::traits::{ArgumentError, DatabaseError, Result};

/// Arguments of one `connect` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub named: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.named.insert(name.to_string(), value.into());
        self
    }
}

/// Validated connect arguments
#[derive(Clone, PartialEq)]
pub struct ArgumentBag {
    values: BTreeMap<String, Value>,
    valid: Vec<String>,
    secrets: BTreeSet<String>,
}

impl ArgumentBag {
    fn unknown(&self, name: &str) -> DatabaseError {
        DatabaseError::Argument(ArgumentError::Unknown {
            name: name.to_string(),
            valid: self.valid.clone(),
        })
    }

    /// Value of a declared argument, `None` when it was not given and has no default
    pub fn get(&self, name: &str) -> Result<Option<&Value>> {
        if !self.valid.iter().any(|v| v == name) {
            return Err(self.unknown(name));
        }
        Ok(self.values.get(name).filter(|v| !v.is_null()))
    }

    pub fn get_str(&self, name: &str) -> Result<Option<&str>> {
        Ok(self.get(name)?.and_then(Value::as_str))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_null())
    }

    /// Replace a declared argument's value
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if !self.valid.iter().any(|v| v == name) {
            return Err(self.unknown(name));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Map the bag onto a typed struct
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let object: Map<String, Value> = self.values.clone().into_iter().collect();
        serde_json::from_value(Value::Object(object)).map_err(|e| {
            DatabaseError::InvalidConfig(format!("connect arguments do not fit: {}", e))
        })
    }
}

impl fmt::Debug for ArgumentBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.values {
            if self.secrets.contains(name) {
                map.entry(name, &"<redacted>");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

/// Parses calls against one schema
pub struct ArgumentParser<'a> {
    schema: &'a ArgumentSchema,
}

impl<'a> ArgumentParser<'a> {
    pub fn new(schema: &'a ArgumentSchema) -> Self {
        Self { schema }
    }

    pub fn parse(&self, call: &CallArgs) -> Result<ArgumentBag> {
        let schema = self.schema;
        if schema.is_empty() {
            return Err(DatabaseError::EmptySchema(schema.name().to_string()));
        }
        let positional = schema.positional()?;

        if call.positional.len() > positional.len() {
            return Err(ArgumentError::TooManyPositional {
                accepted: positional.len(),
                given: call.positional.len(),
            }
            .into());
        }

        let mut values: BTreeMap<String, Value> = positional
            .iter()
            .zip(&call.positional)
            .map(|(spec, value)| (spec.name().to_string(), value.clone()))
            .collect();

        for (name, value) in &call.named {
            if schema.get(name).is_none() {
                return Err(ArgumentError::Unknown {
                    name: name.clone(),
                    valid: schema.names(),
                }
                .into());
            }
            if values.contains_key(name) {
                return Err(ArgumentError::Duplicate { name: name.clone() }.into());
            }
            values.insert(name.clone(), value.clone());
        }

        let missing: Vec<String> = schema
            .specs()
            .iter()
            .filter(|spec| {
                spec.is_mandatory()
                    && spec.default_value().is_none()
                    && !values.contains_key(spec.name())
            })
            .map(|spec| spec.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ArgumentError::Missing { names: missing }.into());
        }

        for spec in schema.specs() {
            let (Some(arg_type), Some(value)) = (spec.arg_type(), values.get(spec.name())) else {
                continue;
            };
            if !value.is_null() && !arg_type.matches(value) {
                return Err(ArgumentError::TypeMismatch {
                    name: spec.name().to_string(),
                    expected: arg_type.to_string(),
                    actual: value_type_name(value).to_string(),
                }
                .into());
            }
        }

        for spec in schema.specs().iter().filter(|s| values.contains_key(s.name())) {
            let missing: Vec<String> = spec
                .requires()
                .iter()
                .filter(|name| !values.contains_key(name.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(ArgumentError::Requires {
                    name: spec.name().to_string(),
                    missing,
                }
                .into());
            }

            let present: Vec<String> = spec
                .excludes()
                .iter()
                .filter(|name| values.contains_key(name.as_str()))
                .cloned()
                .collect();
            if !present.is_empty() {
                return Err(ArgumentError::Excludes {
                    name: spec.name().to_string(),
                    present,
                }
                .into());
            }
        }

        for spec in schema.specs() {
            if let Some(default) = spec.default_value() {
                if values.get(spec.name()).map_or(true, Value::is_null) {
                    values.insert(spec.name().to_string(), default.clone());
                }
            }
        }

        for spec in schema.specs() {
            let Some(transform) = spec.transform() else {
                continue;
            };
            let Some(current) = values.get(spec.name()).filter(|v| !v.is_null()).cloned() else {
                continue;
            };
            let updated = transform(schema, current)?;
            if let Some(arg_type) = spec.arg_type() {
                if !updated.is_null() && !arg_type.matches(&updated) {
                    return Err(ArgumentError::TransformTypeMismatch {
                        name: spec.name().to_string(),
                        expected: arg_type.to_string(),
                        actual: value_type_name(&updated).to_string(),
                    }
                    .into());
                }
            }
            values.insert(spec.name().to_string(), updated);
        }

        for spec in schema.specs().iter().filter(|s| !s.choices().is_empty()) {
            let Some(value) = values.get(spec.name()).filter(|v| !v.is_null()) else {
                continue;
            };
            if !spec.choices().contains(value) {
                return Err(invalid_choice(spec, value).into());
            }
        }

        Ok(ArgumentBag {
            values,
            valid: schema.names(),
            secrets: schema
                .specs()
                .iter()
                .filter(|s| s.is_secret())
                .map(|s| s.name().to_string())
                .collect(),
        })
    }
}

fn invalid_choice(spec: &ArgumentSpec, value: &Value) -> ArgumentError {
    ArgumentError::InvalidChoice {
        name: spec.name().to_string(),
        value: spec.display_value(value),
        choices: spec.choices().iter().map(|c| spec.display_value(c)).collect(),
    }
}
