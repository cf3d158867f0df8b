// Statement Parameters
// Rewrites `%s` and `:name` placeholders into JDBC `?` markers and picks the setter for each value.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::db::traits::{BindingError, JavaValue, Setter};
use crate::db::value::CellValue;

/// Parameters for one statement execution.
///
/// A sequence pairs with `%s` markers, a mapping with `:name` markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Positional(Vec<CellValue>),
    Named(BTreeMap<String, CellValue>),
}

impl Params {
    pub fn len(&self) -> usize {
        match self {
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite `sql` into `?` form with the values in marker order
    pub fn bind(&self, sql: &str) -> Result<BoundStatement, BindingError> {
        match self {
            Params::Positional(values) => bind_positional(sql, values),
            Params::Named(values) => bind_named(sql, values),
        }
    }
}

impl From<Vec<CellValue>> for Params {
    fn from(values: Vec<CellValue>) -> Self {
        Params::Positional(values)
    }
}

impl From<BTreeMap<String, CellValue>> for Params {
    fn from(values: BTreeMap<String, CellValue>) -> Self {
        Params::Named(values)
    }
}

/// SQL rewritten for the driver plus its ordered values
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<CellValue>,
}

enum Token<'a> {
    Text(char),
    /// `%s`
    Positional,
    /// `:name`
    Named(&'a str),
}

/// Split SQL into text and placeholder tokens, leaving quoted sections untouched
fn tokenize(sql: &str, named: bool) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            tokens.push(Token::Text(c));
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                tokens.push(Token::Text(c));
                i += 1;
            }
            '%' if !named && next == Some('s') => {
                tokens.push(Token::Positional);
                i += 2;
            }
            '%' if !named && next == Some('%') => {
                tokens.push(Token::Text('%'));
                i += 2;
            }
            ':' if named && next == Some(':') => {
                tokens.push(Token::Text(':'));
                tokens.push(Token::Text(':'));
                i += 2;
            }
            ':' if named && next.is_some_and(|n| n.is_ascii_alphabetic() || n == '_') => {
                let start = offset + 1;
                let mut end = start;
                let mut j = i + 1;
                while let Some((o, ch)) = chars.get(j) {
                    if ch.is_ascii_alphanumeric() || *ch == '_' {
                        end = o + ch.len_utf8();
                        j += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Named(&sql[start..end]));
                i = j;
            }
            _ => {
                tokens.push(Token::Text(c));
                i += 1;
            }
        }
    }
    tokens
}

fn bind_positional(sql: &str, values: &[CellValue]) -> Result<BoundStatement, BindingError> {
    let mut rewritten = String::with_capacity(sql.len());
    let mut markers = 0;
    for token in tokenize(sql, false) {
        match token {
            Token::Text(c) => rewritten.push(c),
            Token::Positional => {
                markers += 1;
                rewritten.push('?');
            }
            Token::Named(key) => {
                rewritten.push(':');
                rewritten.push_str(key);
            }
        }
    }

    if markers > values.len() {
        return Err(BindingError::Insufficient {
            expected: markers,
            actual: values.len(),
        });
    }
    if markers < values.len() {
        return Err(BindingError::Excess {
            expected: markers,
            actual: values.len(),
            unused: values[markers..].iter().map(|v| v.to_string()).collect(),
        });
    }

    Ok(BoundStatement {
        sql: rewritten,
        values: values.to_vec(),
    })
}

fn bind_named(
    sql: &str,
    values: &BTreeMap<String, CellValue>,
) -> Result<BoundStatement, BindingError> {
    let mut rewritten = String::with_capacity(sql.len());
    let mut ordered = Vec::new();
    let mut used = BTreeSet::new();

    for token in tokenize(sql, true) {
        match token {
            Token::Text(c) => rewritten.push(c),
            Token::Named(key) => {
                let value = values.get(key).ok_or_else(|| BindingError::MissingNamed {
                    key: key.to_string(),
                    statement: sql.to_string(),
                })?;
                used.insert(key);
                ordered.push(value.clone());
                rewritten.push('?');
            }
            Token::Positional => rewritten.push_str("%s"),
        }
    }

    let unused: Vec<String> = values
        .keys()
        .filter(|key| !used.contains(key.as_str()))
        .cloned()
        .collect();
    if !unused.is_empty() {
        return Err(BindingError::UnusedNamed {
            keys: unused,
            statement: sql.to_string(),
        });
    }

    Ok(BoundStatement {
        sql: rewritten,
        values: ordered,
    })
}

/// Most specific setter for a value. Integers try the 32-bit setter first.
pub fn setter_for(value: &CellValue) -> (Setter, JavaValue) {
    match value {
        CellValue::String(s) => (Setter::SetString, JavaValue::String(s.clone())),
        CellValue::Float(f) => (Setter::SetDouble, JavaValue::Double(*f)),
        CellValue::Int(i) => match i32::try_from(*i) {
            Ok(narrow) => (Setter::SetInt, JavaValue::Int(narrow)),
            Err(_) => (Setter::SetLong, JavaValue::Long(*i)),
        },
        CellValue::Bool(b) => (Setter::SetBoolean, JavaValue::Boolean(*b)),
        CellValue::Binary(bytes) => (Setter::SetBytes, JavaValue::Bytes(bytes.clone())),
        other => (Setter::SetObject, other.to_java()),
    }
}
