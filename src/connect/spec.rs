// Argument Specs
// Declarative description of the arguments a connect function accepts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::db::traits::{DatabaseError, Result};

/// Post-parse transform, called with the schema and the current value
pub type TransformFn = Arc<dyn Fn(&ArgumentSchema, Value) -> Result<Value> + Send + Sync>;

/// Type constraint on an argument value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Bool,
    /// Integral numbers only
    Integer,
    Float,
    /// Any number
    Number,
    String,
    Array,
    Object,
    Any,
}

impl ArgType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ArgType::Bool => value.is_boolean(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Float => value.is_f64(),
            ArgType::Number => value.is_number(),
            ArgType::String => value.is_string(),
            ArgType::Array => value.is_array(),
            ArgType::Object => value.is_object(),
            ArgType::Any => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArgType::Bool => "bool",
            ArgType::Integer => "int",
            ArgType::Float => "float",
            ArgType::Number => "number",
            ArgType::String => "str",
            ArgType::Array => "list",
            ArgType::Object => "dict",
            ArgType::Any => "object",
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type name of a JSON value, as reported in type errors
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// One accepted argument; immutable once built
#[derive(Clone)]
pub struct ArgumentSpec {
    name: String,
    position: Option<usize>,
    arg_type: Option<ArgType>,
    mandatory: bool,
    requires: Vec<String>,
    excludes: Vec<String>,
    default: Option<Value>,
    description: Option<String>,
    secret: bool,
    choices: Vec<Value>,
    transform: Option<TransformFn>,
}

impl fmt::Debug for ArgumentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentSpec")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("arg_type", &self.arg_type)
            .field("mandatory", &self.mandatory)
            .field("requires", &self.requires)
            .field("excludes", &self.excludes)
            .field("default", &self.default)
            .field("secret", &self.secret)
            .field("choices", &self.choices)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl ArgumentSpec {
    pub fn builder(name: &str) -> ArgumentSpecBuilder {
        ArgumentSpecBuilder {
            name: name.to_string(),
            position: None,
            optional_position: false,
            arg_type: None,
            mandatory: false,
            requires: Vec::new(),
            excludes: Vec::new(),
            default: None,
            description: None,
            secret: false,
            choices: Vec::new(),
            transform: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn arg_type(&self) -> Option<ArgType> {
        self.arg_type
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Value never appears in error text
    pub fn is_secret(&self) -> bool {
        self.secret
    }

    pub fn choices(&self) -> &[Value] {
        &self.choices
    }

    pub fn transform(&self) -> Option<&TransformFn> {
        self.transform.as_ref()
    }

    /// Value as it may appear in error text
    pub fn display_value(&self, value: &Value) -> String {
        if self.secret {
            "<redacted>".to_string()
        } else {
            value.to_string()
        }
    }
}

pub struct ArgumentSpecBuilder {
    name: String,
    position: Option<usize>,
    optional_position: bool,
    arg_type: Option<ArgType>,
    mandatory: bool,
    requires: Vec<String>,
    excludes: Vec<String>,
    default: Option<Value>,
    description: Option<String>,
    secret: bool,
    choices: Vec<Value>,
    transform: Option<TransformFn>,
}

impl ArgumentSpecBuilder {
    /// Accept the argument positionally; positional arguments are mandatory
    pub fn position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self.optional_position = false;
        self
    }

    /// Accept the argument positionally without making it mandatory
    pub fn optional_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self.optional_position = true;
        self
    }

    pub fn arg_type(mut self, arg_type: ArgType) -> Self {
        self.arg_type = Some(arg_type);
        self
    }

    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    pub fn requires(mut self, names: &[&str]) -> Self {
        self.requires = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn excludes(mut self, names: &[&str]) -> Self {
        self.excludes = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn secret(mut self, secret: bool) -> Self {
        self.secret = secret;
        self
    }

    pub fn choices<V: Into<Value>>(mut self, choices: impl IntoIterator<Item = V>) -> Self {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&ArgumentSchema, Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn build(self) -> Result<ArgumentSpec> {
        if !is_identifier(&self.name) {
            return Err(DatabaseError::InvalidConfig(format!(
                "argument `name` is not a valid identifier: {}",
                self.name
            )));
        }

        if self.optional_position && self.mandatory {
            return Err(DatabaseError::InvalidConfig(format!(
                "{}: an optional position cannot be mandatory",
                self.name
            )));
        }
        let mandatory = self.mandatory || (self.position.is_some() && !self.optional_position);
        let default = self.default.filter(|value| !value.is_null());
        if default.is_some() && mandatory {
            return Err(DatabaseError::InvalidConfig(format!(
                "{}: [mandatory] cannot be set when [default] is set",
                self.name
            )));
        }

        Ok(ArgumentSpec {
            name: self.name,
            position: self.position,
            arg_type: self.arg_type,
            mandatory,
            requires: self.requires,
            excludes: self.excludes,
            default,
            description: self.description,
            secret: self.secret,
            choices: self.choices,
            transform: self.transform,
        })
    }
}

/// Ordered, name-unique collection of argument specs
#[derive(Debug, Clone)]
pub struct ArgumentSchema {
    name: String,
    specs: Vec<ArgumentSpec>,
}

impl ArgumentSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            specs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a new spec; the name must not be taken
    pub fn add(&mut self, spec: ArgumentSpec) -> Result<()> {
        if self.get(&spec.name).is_some() {
            return Err(DatabaseError::NameConflict(spec.name));
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Register a spec, replacing any spec with the same name in place
    pub fn define(&mut self, spec: ArgumentSpec) {
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn specs(&self) -> &[ArgumentSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Positional specs ordered by position; positions must run 0..n without gaps
    pub fn positional(&self) -> Result<Vec<&ArgumentSpec>> {
        let mut by_position: BTreeMap<usize, &ArgumentSpec> = BTreeMap::new();
        for spec in &self.specs {
            if let Some(position) = spec.position {
                if let Some(other) = by_position.insert(position, spec) {
                    return Err(DatabaseError::InvalidConfig(format!(
                        "position {} is assigned to both \"{}\" and \"{}\"",
                        position, other.name, spec.name
                    )));
                }
            }
        }

        if let Some(max) = by_position.keys().next_back().copied() {
            let missing: Vec<usize> = (0..=max).filter(|p| !by_position.contains_key(p)).collect();
            if !missing.is_empty() {
                return Err(DatabaseError::NonContiguousPositions(missing));
            }
        }
        Ok(by_position.into_values().collect())
    }
}
