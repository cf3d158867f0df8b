// JDBC Type Conversion
// Registry of per-type rules mapping JDBC column types to native values and back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::db::traits::{Accessor, DatabaseError, JavaValue, Result, ResultSet, Setter};
use crate::db::value::{
    decimal_long_value, decimal_scale, parse_date, parse_time, parse_timestamp, CellValue,
    NativeType,
};

/// Name of the fallback rule used for unregistered types
pub const JDBC_DEFAULT: &str = "JDBC_DEFAULT";

/// Custom conversion applied to the raw value a getter returned
pub type ValueFn = Arc<dyn Fn(&TypeConverter, JavaValue) -> Result<CellValue> + Send + Sync>;

/// Custom conversion reading straight from the result set at a column position
pub type ColumnFn =
    Arc<dyn Fn(&TypeConverter, &mut dyn ResultSet, usize) -> Result<CellValue> + Send + Sync>;

/// How a rule reads a column
#[derive(Clone)]
pub enum GetterStrategy {
    /// Call the accessor, then construct the rule's native type from the raw value
    Accessor(Accessor),
    /// Call the accessor, then hand the raw value to a custom function whose result is trusted
    Convert { accessor: Accessor, convert: ValueFn },
    /// Hand the result set and column position to a custom function
    Column(ColumnFn),
}

impl fmt::Debug for GetterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GetterStrategy::Accessor(accessor) => write!(f, "Accessor({})", accessor.method_name()),
            GetterStrategy::Convert { accessor, .. } => {
                write!(f, "Convert({})", accessor.method_name())
            }
            GetterStrategy::Column(_) => write!(f, "Column"),
        }
    }
}

/// Conversion rule for one JDBC type name
#[derive(Debug, Clone)]
pub struct TypeRule {
    pub name: String,
    pub getter: GetterStrategy,
    pub setter: Setter,
    pub native: NativeType,
}

impl TypeRule {
    pub fn accessor(name: &str, accessor: Accessor, setter: Setter, native: NativeType) -> Self {
        Self {
            name: name.to_uppercase(),
            getter: GetterStrategy::Accessor(accessor),
            setter,
            native,
        }
    }

    pub fn convert<F>(
        name: &str,
        accessor: Accessor,
        setter: Setter,
        native: NativeType,
        convert: F,
    ) -> Self
    where
        F: Fn(&TypeConverter, JavaValue) -> Result<CellValue> + Send + Sync + 'static,
    {
        Self {
            name: name.to_uppercase(),
            getter: GetterStrategy::Convert {
                accessor,
                convert: Arc::new(convert),
            },
            setter,
            native,
        }
    }

    pub fn column<F>(name: &str, setter: Setter, native: NativeType, read: F) -> Self
    where
        F: Fn(&TypeConverter, &mut dyn ResultSet, usize) -> Result<CellValue>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_uppercase(),
            getter: GetterStrategy::Column(Arc::new(read)),
            setter,
            native,
        }
    }

    /// Accessor the rule calls, if it reads through one
    pub fn accessor_name(&self) -> Option<&'static str> {
        match &self.getter {
            GetterStrategy::Accessor(accessor) | GetterStrategy::Convert { accessor, .. } => {
                Some(accessor.method_name())
            }
            GetterStrategy::Column(_) => None,
        }
    }
}

/// Identifies a JDBC type either by `java.sql.Types` code or by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef<'a> {
    Code(i32),
    Name(&'a str),
}

/// `java.sql.JDBCType` names by `java.sql.Types` code
const JDBC_TYPES: &[(i32, &str)] = &[
    (-16, "LONGNVARCHAR"),
    (-15, "NCHAR"),
    (-9, "NVARCHAR"),
    (-8, "ROWID"),
    (-7, "BIT"),
    (-6, "TINYINT"),
    (-5, "BIGINT"),
    (-4, "LONGVARBINARY"),
    (-3, "VARBINARY"),
    (-2, "BINARY"),
    (-1, "LONGVARCHAR"),
    (0, "NULL"),
    (1, "CHAR"),
    (2, "NUMERIC"),
    (3, "DECIMAL"),
    (4, "INTEGER"),
    (5, "SMALLINT"),
    (6, "FLOAT"),
    (7, "REAL"),
    (8, "DOUBLE"),
    (12, "VARCHAR"),
    (16, "BOOLEAN"),
    (70, "DATALINK"),
    (91, "DATE"),
    (92, "TIME"),
    (93, "TIMESTAMP"),
    (1111, "OTHER"),
    (2000, "JAVA_OBJECT"),
    (2001, "DISTINCT"),
    (2002, "STRUCT"),
    (2003, "ARRAY"),
    (2004, "BLOB"),
    (2005, "CLOB"),
    (2006, "REF"),
    (2009, "SQLXML"),
    (2011, "NCLOB"),
    (2012, "REF_CURSOR"),
    (2013, "TIME_WITH_TIMEZONE"),
    (2014, "TIMESTAMP_WITH_TIMEZONE"),
];

/// Type conversion registry, shared by every connection a connect function produces
#[derive(Debug, Clone)]
pub struct TypeConverter {
    rules: HashMap<String, TypeRule>,
    default_rule: TypeRule,
}

impl Default for TypeConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeConverter {
    /// Registry holding the standard rules
    pub fn new() -> Self {
        let mut converter = Self {
            rules: HashMap::new(),
            default_rule: TypeRule::accessor(
                JDBC_DEFAULT,
                Accessor::GetObject,
                Setter::SetObject,
                NativeType::Any,
            ),
        };
        for rule in standard_rules() {
            converter.register(rule);
        }
        converter
    }

    /// Add a rule, replacing any rule with the same name
    pub fn register(&mut self, rule: TypeRule) {
        if rule.name == JDBC_DEFAULT {
            self.default_rule = rule.clone();
        }
        self.rules.insert(rule.name.clone(), rule);
    }

    /// Builder form of `register`
    pub fn with_rule(mut self, rule: TypeRule) -> Self {
        self.register(rule);
        self
    }

    pub fn default_rule(&self) -> &TypeRule {
        &self.default_rule
    }

    /// Look up the rule for a type name in any case, falling back to `default`
    pub fn type_rule<'a>(
        &'a self,
        name: &str,
        default: Option<&'a TypeRule>,
    ) -> Option<&'a TypeRule> {
        self.rules.get(&name.to_uppercase()).or(default)
    }

    /// Canonical type name for a `java.sql.Types` code
    pub fn jdbc_type_name(&self, code: i32) -> Result<String> {
        JDBC_TYPES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| name.to_string())
            .ok_or(DatabaseError::Resolution(code))
    }

    fn resolve_name(&self, type_ref: TypeRef<'_>) -> Result<String> {
        match type_ref {
            TypeRef::Code(code) => self.jdbc_type_name(code),
            TypeRef::Name(name) => Ok(name.to_uppercase()),
        }
    }

    fn rule_for(&self, name: &str) -> &TypeRule {
        self.rules.get(name).unwrap_or(&self.default_rule)
    }

    /// Native type declared for a JDBC type, `Any` when unregistered
    pub fn native_type(&self, type_ref: TypeRef<'_>) -> Result<NativeType> {
        let name = self.resolve_name(type_ref)?;
        Ok(self.rule_for(&name).native)
    }

    /// Decode one column of the current row
    pub fn native_value(
        &self,
        rs: &mut dyn ResultSet,
        column: usize,
        type_ref: TypeRef<'_>,
    ) -> Result<CellValue> {
        if column < 1 {
            return Err(DatabaseError::InvalidConfig(format!(
                "\"column\" invalid value: {} - jdbc columns must be 1 or greater",
                column
            )));
        }

        let type_name = self.resolve_name(type_ref)?;
        let null_check = rs.is_null(column).map_err(|e| DatabaseError::AttributeResolution {
            jdbc_type: type_name.clone(),
            accessor: "isNull".to_string(),
            cause: e.to_string(),
        })?;
        if null_check {
            return Ok(CellValue::Null);
        }

        let rule = self.rule_for(&type_name);

        let (accessor, convert) = match &rule.getter {
            GetterStrategy::Column(read) => {
                return read(self, rs, column).map_err(|e| DatabaseError::Conversion {
                    jdbc_type: type_name.clone(),
                    native: rule.native.to_string(),
                    cause: format!("via result set function \"{}\": {}", rule.name, e),
                });
            }
            GetterStrategy::Accessor(accessor) => (*accessor, None),
            GetterStrategy::Convert { accessor, convert } => (*accessor, Some(convert)),
        };

        let raw = rs
            .get(accessor, column)
            .map_err(|e| DatabaseError::AttributeResolution {
                jdbc_type: type_name.clone(),
                accessor: accessor.method_name().to_string(),
                cause: e.to_string(),
            })?;

        // the driver may only learn about NULL once the value has been read
        if raw.is_null() || rs.was_null().unwrap_or(false) {
            return Ok(CellValue::Null);
        }

        if let Some(convert) = convert {
            return convert(self, raw);
        }

        match rule.native {
            NativeType::Any => Ok(CellValue::from_java(raw)),
            native => native.coerce(raw).map_err(|cause| DatabaseError::Conversion {
                jdbc_type: type_name,
                native: native.to_string(),
                cause,
            }),
        }
    }

    /// DECIMAL and NUMERIC: integral when the scale is 0, exact decimal otherwise
    pub fn decimal_and_numeric(&self, value: JavaValue) -> Result<CellValue> {
        match value {
            JavaValue::BigDecimal(text) => {
                if decimal_scale(&text) == 0 {
                    decimal_long_value(&text).map(CellValue::Int).ok_or_else(|| {
                        conversion(
                            "DECIMAL",
                            NativeType::Int,
                            format!("value out of range: {}", text),
                        )
                    })
                } else {
                    Ok(CellValue::Decimal(text))
                }
            }
            JavaValue::Byte(_) | JavaValue::Short(_) | JavaValue::Int(_) | JavaValue::Long(_) => {
                Ok(CellValue::from_java(value))
            }
            JavaValue::Float(v) => Ok(CellValue::Decimal(v.to_string())),
            JavaValue::Double(v) => Ok(CellValue::Decimal(v.to_string())),
            other => NativeType::Decimal
                .coerce(other)
                .map_err(|cause| conversion("DECIMAL", NativeType::Decimal, cause)),
        }
    }
}

fn conversion(jdbc_type: &str, native: NativeType, cause: impl Into<String>) -> DatabaseError {
    DatabaseError::Conversion {
        jdbc_type: jdbc_type.to_string(),
        native: native.to_string(),
        cause: cause.into(),
    }
}

fn standard_rules() -> Vec<TypeRule> {
    let mut rules = Vec::new();

    for name in [
        "CHAR",
        "VARCHAR",
        "LONGVARCHAR",
        "NCHAR",
        "NVARCHAR",
        "LONGNVARCHAR",
        "CLOB",
        "NCLOB",
    ] {
        rules.push(TypeRule::accessor(
            name,
            Accessor::GetString,
            Setter::SetString,
            NativeType::String,
        ));
    }
    for name in ["BIT", "BOOLEAN"] {
        rules.push(TypeRule::accessor(
            name,
            Accessor::GetBoolean,
            Setter::SetBoolean,
            NativeType::Bool,
        ));
    }

    rules.push(TypeRule::accessor("TINYINT", Accessor::GetByte, Setter::SetByte, NativeType::Int));
    rules.push(TypeRule::accessor(
        "SMALLINT",
        Accessor::GetShort,
        Setter::SetShort,
        NativeType::Int,
    ));
    rules.push(TypeRule::accessor("INTEGER", Accessor::GetInt, Setter::SetInt, NativeType::Int));
    rules.push(TypeRule::accessor("BIGINT", Accessor::GetLong, Setter::SetLong, NativeType::Int));

    rules.push(TypeRule::accessor("REAL", Accessor::GetFloat, Setter::SetFloat, NativeType::Float));
    rules.push(TypeRule::accessor(
        "FLOAT",
        Accessor::GetDouble,
        Setter::SetDouble,
        NativeType::Float,
    ));
    rules.push(TypeRule::accessor(
        "DOUBLE",
        Accessor::GetDouble,
        Setter::SetDouble,
        NativeType::Float,
    ));

    for name in ["DECIMAL", "NUMERIC"] {
        rules.push(TypeRule::convert(
            name,
            Accessor::GetBigDecimal,
            Setter::SetBigDecimal,
            NativeType::Decimal,
            |converter, value| converter.decimal_and_numeric(value),
        ));
    }

    rules.push(TypeRule::convert(
        "DATE",
        Accessor::GetDate,
        Setter::SetDate,
        NativeType::Date,
        |_, value| {
            parse_date(&value.to_string())
                .map(CellValue::Date)
                .map_err(|cause| conversion("DATE", NativeType::Date, cause))
        },
    ));
    rules.push(TypeRule::convert(
        "TIME",
        Accessor::GetTime,
        Setter::SetTime,
        NativeType::Time,
        |_, value| {
            parse_time(&value.to_string())
                .map(CellValue::Time)
                .map_err(|cause| conversion("TIME", NativeType::Time, cause))
        },
    ));
    rules.push(TypeRule::convert(
        "TIMESTAMP",
        Accessor::GetTimestamp,
        Setter::SetTimestamp,
        NativeType::Timestamp,
        |_, value| match value {
            JavaValue::Timestamp { text, nanos } => parse_timestamp(&text, nanos)
                .map(CellValue::Timestamp)
                .map_err(|cause| conversion("TIMESTAMP", NativeType::Timestamp, cause)),
            other => Err(conversion(
                "TIMESTAMP",
                NativeType::Timestamp,
                format!("unexpected value of type {}", other.type_name()),
            )),
        },
    ));

    for name in ["BINARY", "VARBINARY", "LONGVARBINARY", "BLOB"] {
        rules.push(TypeRule::accessor(
            name,
            Accessor::GetBytes,
            Setter::SetBytes,
            NativeType::Bytes,
        ));
    }

    rules.push(TypeRule::column(
        "ARRAY",
        Setter::SetArray,
        NativeType::List,
        |_, rs, column| match rs.get(Accessor::GetArray, column) {
            Ok(JavaValue::Array(items)) => Ok(CellValue::List(
                items.into_iter().map(CellValue::from_java).collect(),
            )),
            Ok(JavaValue::Null) => Ok(CellValue::Null),
            Ok(other) => Err(DatabaseError::State(format!(
                "expected java.sql.Array, got: {}",
                other.type_name()
            ))),
            Err(e) => Err(DatabaseError::State(e.to_string())),
        },
    ));

    rules.push(TypeRule::convert(
        "MAP",
        Accessor::GetMap,
        Setter::SetMap,
        NativeType::Any,
        |_, value| Err(DatabaseError::NotImplemented(format!("MAP conversion: {}", value))),
    ));
    rules.push(TypeRule::convert(
        "STRUCT",
        Accessor::GetStruct,
        Setter::SetStruct,
        NativeType::Any,
        |_, value| Err(DatabaseError::NotImplemented(format!("STRUCT conversion: {}", value))),
    ));

    rules.push(TypeRule::accessor(
        JDBC_DEFAULT,
        Accessor::GetObject,
        Setter::SetObject,
        NativeType::Any,
    ));
    rules
}
