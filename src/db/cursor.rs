// Cursor
// Statement execution, parameter binding, result metadata and row fetching.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeTuple, Serializer};

use crate::config::CursorOptions;
use crate::db::connection::Session;
use crate::db::params::{setter_for, BoundStatement, Params};
use crate::db::traits::{
    Capability, DatabaseError, ForeignError, PreparedStatement, Result, ResultMetadata, ResultSet,
    COLUMN_NO_NULLS, COLUMN_NULLABLE,
};
use crate::db::types::TypeRef;
use crate::db::value::CellValue;

/// One decoded row, in column order
pub type Row = Vec<CellValue>;

/// Seven-field column description.
///
/// Fields: name, type, display size, internal size, precision, scale, null ok.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    /// `"{native} - JDBC:{type name}"`, or `"NULL"` for the NULL type
    pub type_code: String,
    pub display_size: Option<i32>,
    pub internal_size: Option<i32>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub null_ok: Option<bool>,
}

impl Serialize for ColumnDescription {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(7)?;
        tuple.serialize_element(&self.name)?;
        tuple.serialize_element(&self.type_code)?;
        tuple.serialize_element(&self.display_size)?;
        tuple.serialize_element(&self.internal_size)?;
        tuple.serialize_element(&self.precision)?;
        tuple.serialize_element(&self.scale)?;
        tuple.serialize_element(&self.null_ok)?;
        tuple.end()
    }
}

/// Drivers report `Integer.MAX_VALUE` when they have no figure
fn known(value: i32) -> Option<i32> {
    (value != i32::MAX).then_some(value)
}

/// Strip `table.` prefixes from column names.
///
/// A prefix shared by every column is removed; otherwise each column loses its own prefix, even
/// when that leaves duplicate names.
pub fn strip_column_prefixes(names: &[String]) -> Vec<String> {
    let prefix_of = |name: &str| name.split_once('.').map(|(prefix, _)| prefix.to_string());

    let common = names.first().and_then(|first| prefix_of(first)).filter(|prefix| {
        names
            .iter()
            .all(|name| prefix_of(name).as_deref() == Some(prefix.as_str()))
    });

    names
        .iter()
        .map(|name| match (&common, name.split_once('.')) {
            (Some(prefix), _) => name[prefix.len() + 1..].to_string(),
            (None, Some((_, column))) => column.to_string(),
            (None, None) => name.clone(),
        })
        .collect()
}

/// Cursor over one connection. Holds at most one statement and one result set at a time.
pub struct Cursor {
    session: Option<Rc<Session>>,
    statement: Option<Box<dyn PreparedStatement>>,
    result_set: Option<Box<dyn ResultSet>>,
    metadata: Option<ResultMetadata>,
    description: Option<Vec<ColumnDescription>>,
    warnings: Option<String>,
    rowcount: i64,
    rowcounts: bool,
    /// Default number of rows `fetchmany` reads
    pub arraysize: usize,
}

impl Cursor {
    pub(crate) fn new(session: Rc<Session>, options: CursorOptions) -> Self {
        Self {
            session: Some(session),
            statement: None,
            result_set: None,
            metadata: None,
            description: None,
            warnings: None,
            rowcount: -1,
            rowcounts: options.rowcounts,
            arraysize: options.arraysize.max(1),
        }
    }

    /// Rows affected or returned by the last execution, -1 when unknown
    pub fn rowcount(&self) -> i64 {
        self.rowcount
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    fn session(&self) -> Result<Rc<Session>> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| DatabaseError::State("cursor is closed".to_string()))?;
        session.ensure_open()?;
        Ok(Rc::clone(session))
    }

    fn release_result_set(&mut self) {
        if let Some(mut rs) = self.result_set.take() {
            self.warnings = rs.warnings();
            if let Err(e) = rs.close() {
                tracing::warn!(error = %e, "error closing result set");
            }
        }
    }

    fn release_statement(&mut self) {
        if let Some(mut stmt) = self.statement.take() {
            if let Err(e) = stmt.close() {
                tracing::warn!(error = %e, "error closing statement");
            }
        }
    }

    fn reset(&mut self) {
        self.release_result_set();
        self.release_statement();
        self.metadata = None;
        self.description = None;
        self.warnings = None;
        self.rowcount = -1;
    }

    /// Execute a statement, optionally with parameters
    pub fn execute(&mut self, sql: &str, params: Option<&Params>) -> Result<()> {
        let session = self.session()?;
        self.reset();

        let bound = match params {
            Some(params) => params.bind(sql)?,
            None => BoundStatement {
                sql: sql.to_string(),
                values: Vec::new(),
            },
        };

        tracing::debug!(params = bound.values.len(), "executing statement");
        let mut stmt = session
            .handle()
            .prepare_statement(&bound.sql)
            .map_err(|e| DatabaseError::statement(sql, e))?;
        bind_values(stmt.as_mut(), &bound.values).map_err(|e| DatabaseError::statement(sql, e))?;

        let has_result_set = stmt.execute().map_err(|e| DatabaseError::statement(sql, e))?;
        if has_result_set {
            if let Some(mut rs) = stmt.result_set().map_err(|e| DatabaseError::statement(sql, e))? {
                self.metadata = Some(rs.metadata().map_err(|e| DatabaseError::statement(sql, e))?);
                if self.rowcounts {
                    self.rowcount =
                        count_rows(rs.as_mut()).map_err(|e| DatabaseError::statement(sql, e))?;
                }
                self.result_set = Some(rs);
            }
        } else {
            self.rowcount = Capability::from_result(stmt.update_count())
                .map_err(|e| DatabaseError::statement(sql, e))?
                .supported()
                .unwrap_or(-1);
        }

        self.statement = Some(stmt);
        Ok(())
    }

    /// Execute one statement once per parameter set, batched when the driver supports it
    pub fn executemany(&mut self, sql: &str, param_sets: &[Params]) -> Result<()> {
        let session = self.session()?;
        self.reset();

        let bound: Vec<BoundStatement> = param_sets
            .iter()
            .map(|params| params.bind(sql))
            .collect::<std::result::Result<_, _>>()?;
        let Some(first) = bound.first() else {
            self.rowcount = 0;
            return Ok(());
        };

        let mut stmt = session
            .handle()
            .prepare_statement(&first.sql)
            .map_err(|e| DatabaseError::statement(sql, e))?;

        let batch = run_batch(stmt.as_mut(), &bound);
        if let Err(e) = stmt.close() {
            tracing::warn!(error = %e, "error closing batch statement");
        }

        match batch.map_err(|e| DatabaseError::statement(sql, e))? {
            Capability::Supported(counts) => {
                // a negative item count (SUCCESS_NO_INFO) makes the total unknown
                self.rowcount = if counts.iter().any(|count| *count < 0) {
                    -1
                } else {
                    counts.iter().sum()
                };
                tracing::debug!(sets = bound.len(), rowcount = self.rowcount, "batch executed");
            }
            Capability::Unsupported => {
                tracing::debug!(
                    sets = param_sets.len(),
                    "batch execution unsupported, executing one by one"
                );
                let mut total = 0;
                for params in param_sets {
                    self.execute(sql, Some(params))?;
                    if self.rowcount > 0 {
                        total += self.rowcount;
                    }
                }
                self.rowcount = total;
            }
        }
        Ok(())
    }

    /// Next row, or `None` at end of data
    pub fn fetchone(&mut self) -> Result<Option<Row>> {
        let session = self.session()?;
        let (Some(rs), Some(metadata)) = (self.result_set.as_mut(), self.metadata.as_ref()) else {
            return Err(no_result_set(&self.warnings));
        };

        let has_row = rs.next().map_err(|e| DatabaseError::statement("fetch", e))?;
        if !has_row {
            return Ok(None);
        }

        let mut row = Vec::with_capacity(metadata.column_count());
        for (i, column) in metadata.columns.iter().enumerate() {
            let value = session
                .converter
                .native_value(rs.as_mut(), i + 1, TypeRef::Code(column.type_code))?;
            row.push(value);
        }
        Ok(Some(row))
    }

    /// Up to `size` rows, `arraysize` when not given
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>> {
        self.session()?;
        let size = size.unwrap_or(self.arraysize);
        let Some(rs) = self.result_set.as_mut() else {
            return Err(no_result_set(&self.warnings));
        };
        set_fetch_size(rs.as_mut(), size)?;

        let mut rows = Vec::with_capacity(size);
        let mut exhausted = false;
        while rows.len() < size {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        if !exhausted {
            if let Some(rs) = self.result_set.as_mut() {
                set_fetch_size(rs.as_mut(), 0)?;
            }
        }
        Ok(rows)
    }

    /// All remaining rows
    pub fn fetchall(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Iterate remaining rows
    pub fn rows(&mut self) -> Rows<'_> {
        Rows { cursor: self, done: false }
    }

    /// Next row keyed by column name. Later duplicate names overwrite earlier ones.
    pub fn fetchone_named(&mut self) -> Result<Option<BTreeMap<String, CellValue>>> {
        let Some(row) = self.fetchone()? else {
            return Ok(None);
        };
        let names = self.column_names().unwrap_or_default();
        Ok(Some(names.into_iter().zip(row).collect()))
    }

    /// Column names with table prefixes stripped
    pub fn column_names(&self) -> Option<Vec<String>> {
        let metadata = self.metadata.as_ref()?;
        if metadata.columns.is_empty() {
            return None;
        }
        let names: Vec<String> = metadata.columns.iter().map(|c| c.name.clone()).collect();
        Some(strip_column_prefixes(&names))
    }

    /// Column descriptions of the current result, derived once per execution
    pub fn description(&mut self) -> Result<Option<Vec<ColumnDescription>>> {
        if let Some(description) = &self.description {
            return Ok(Some(description.clone()));
        }
        let Some(metadata) = &self.metadata else {
            return Ok(None);
        };
        let converter = match &self.session {
            Some(session) => Arc::clone(&session.converter),
            None => return Err(DatabaseError::State("cursor is closed".to_string())),
        };

        let mut description = Vec::with_capacity(metadata.column_count());
        for column in &metadata.columns {
            let type_code = if column.type_code == 0 {
                "NULL".to_string()
            } else {
                let native = converter.native_type(TypeRef::Code(column.type_code))?;
                let name = converter
                    .jdbc_type_name(column.type_code)
                    .unwrap_or_else(|_| column.type_name.to_uppercase());
                format!("{} - JDBC:{}", native, name)
            };
            let size = known(column.display_size);
            description.push(ColumnDescription {
                name: column.name.clone(),
                type_code,
                display_size: size,
                internal_size: size,
                precision: known(column.precision),
                scale: known(column.scale),
                null_ok: match column.nullable {
                    COLUMN_NO_NULLS => Some(false),
                    COLUMN_NULLABLE => Some(true),
                    _ => None,
                },
            });
        }

        self.description = Some(description.clone());
        Ok(Some(description))
    }

    /// Close the cursor; it cannot be used again. Closing twice is an error.
    pub fn close(&mut self) -> Result<()> {
        if self.session.take().is_none() {
            return Err(DatabaseError::State("cursor is already closed".to_string()));
        }
        self.metadata = None;
        self.description = None;
        self.release_result_set();
        self.release_statement();
        Ok(())
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.release_result_set();
        self.release_statement();
    }
}

/// Iterator over the remaining rows of a cursor
pub struct Rows<'a> {
    cursor: &'a mut Cursor,
    done: bool,
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.fetchone() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn no_result_set(warnings: &Option<String>) -> DatabaseError {
    match warnings {
        Some(warning) => DatabaseError::State(format!(
            "result set is no longer valid cursor warning: {}",
            warning
        )),
        None => DatabaseError::State("result set is no longer valid".to_string()),
    }
}

/// Bind values by 1-based index
fn bind_values(
    stmt: &mut dyn PreparedStatement,
    values: &[CellValue],
) -> std::result::Result<(), ForeignError> {
    stmt.clear_parameters()?;
    for (i, value) in values.iter().enumerate() {
        let (setter, java) = setter_for(value);
        stmt.set(i + 1, setter, java)?;
    }
    Ok(())
}

/// Row count via `last()`/`getRow()`/`beforeFirst()`, -1 when the driver cannot scroll
fn count_rows(rs: &mut dyn ResultSet) -> std::result::Result<i64, ForeignError> {
    let Some(has_rows) = Capability::from_result(rs.last())?.supported() else {
        return Ok(-1);
    };
    let count = if has_rows {
        Capability::from_result(rs.row())?.supported().unwrap_or(-1)
    } else {
        0
    };
    if Capability::from_result(rs.before_first())?.supported().is_none() {
        tracing::warn!("result set moved to its last row but cannot rewind");
    }
    Ok(count)
}

fn run_batch(
    stmt: &mut dyn PreparedStatement,
    bound: &[BoundStatement],
) -> std::result::Result<Capability<Vec<i64>>, ForeignError> {
    for statement in bound {
        bind_values(stmt, &statement.values)?;
        if let Capability::Unsupported = Capability::from_result(stmt.add_batch())? {
            return Ok(Capability::Unsupported);
        }
    }
    Capability::from_result(stmt.execute_batch())
}

fn set_fetch_size(rs: &mut dyn ResultSet, rows: usize) -> Result<()> {
    let outcome = Capability::from_result(rs.set_fetch_size(rows))
        .map_err(|e| DatabaseError::State(format!("error setting fetch size: {}", e)))?;
    if outcome.supported().is_none() {
        tracing::debug!(rows, "fetch size hint unsupported by driver");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::Connection;
    use crate::db::mock::{column, MockConnection, MockOutcome, MockResultSet, MockState};
    use crate::db::traits::{ErrorKind, JavaValue, Setter, COLUMN_NULLABLE_UNKNOWN};
    use crate::db::types::TypeConverter;
    use std::cell::RefCell;

    fn open(batch_supported: bool) -> (Connection, MockConnection, Rc<RefCell<MockState>>) {
        let mock = MockConnection::new();
        let state = mock.state();
        state.borrow_mut().batch_supported = batch_supported;
        // second handle on the same state, used to script outcomes
        let scripting = MockConnection::from_state(Rc::clone(&state));
        (
            Connection::new(
                Box::new(mock),
                Arc::new(TypeConverter::new()),
                CursorOptions::default(),
            ),
            scripting,
            state,
        )
    }

    fn people() -> MockResultSet {
        MockResultSet::new(
            vec![column("people.id", 4), column("people.name", 12)],
            vec![
                vec![JavaValue::Int(1), JavaValue::String("ann".into())],
                vec![JavaValue::Int(2), JavaValue::Null],
                vec![JavaValue::Int(3), JavaValue::String("cy".into())],
            ],
        )
    }

    #[test]
    fn test_execute_and_fetch() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Rows(people()));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT id, name FROM people", None).unwrap();

        assert_eq!(cursor.rowcount(), 3);
        assert_eq!(
            cursor.fetchone().unwrap(),
            Some(vec![CellValue::Int(1), CellValue::String("ann".into())])
        );
        let rest = cursor.fetchall().unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0][1], CellValue::Null);
        assert_eq!(cursor.fetchone().unwrap(), None);
    }

    #[test]
    fn test_rowcount_unknown_when_driver_cannot_scroll() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Rows(people().scrollable(false)));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT * FROM people", None).unwrap();
        assert_eq!(cursor.rowcount(), -1);
        assert_eq!(cursor.fetchall().unwrap().len(), 3);
    }

    #[test]
    fn test_update_count() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Update(4));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("DELETE FROM people", None).unwrap();
        assert_eq!(cursor.rowcount(), 4);
        assert_eq!(cursor.fetchone().unwrap_err().kind(), ErrorKind::State);
    }

    #[test]
    fn test_binding_errors_skip_prepare() {
        let (conn, _, state) = open(true);
        let mut cursor = conn.cursor().unwrap();
        let params = Params::Positional(vec![1.into()]);
        let err = cursor
            .execute("INSERT INTO t VALUES (%s, %s)", Some(&params))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParameterBinding);
        assert!(state.borrow().prepared.is_empty());
    }

    #[test]
    fn test_parameters_are_rewritten_and_bound() {
        let (conn, _, state) = open(true);
        let mut cursor = conn.cursor().unwrap();
        let params = Params::Positional(vec![7.into(), "x".into(), (1i64 << 40).into()]);
        cursor
            .execute("INSERT INTO t VALUES (%s, %s, %s)", Some(&params))
            .unwrap();

        let state = state.borrow();
        assert_eq!(state.prepared, vec!["INSERT INTO t VALUES (?, ?, ?)".to_string()]);
        assert_eq!(
            state.binds,
            vec![
                (1, Setter::SetInt, JavaValue::Int(7)),
                (2, Setter::SetString, JavaValue::String("x".into())),
                (3, Setter::SetLong, JavaValue::Long(1 << 40)),
            ]
        );
    }

    #[test]
    fn test_driver_failure_is_statement_error() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Fail("syntax error near FORM".into()));
        let mut cursor = conn.cursor().unwrap();
        let err = cursor.execute("SELECT * FORM t", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Statement);
        let msg = err.to_string();
        assert!(msg.contains("SELECT * FORM t"));
        assert!(msg.contains("syntax error near FORM"));
    }

    #[test]
    fn test_executemany_batch_sums_counts() {
        let (conn, script, state) = open(true);
        script.push(MockOutcome::Update(1));
        script.push(MockOutcome::Update(2));
        script.push(MockOutcome::Update(0));
        let mut cursor = conn.cursor().unwrap();
        let sets: Vec<Params> = (0..3).map(|i| Params::Positional(vec![i.into()])).collect();
        cursor.executemany("INSERT INTO t VALUES (%s)", &sets).unwrap();
        assert_eq!(cursor.rowcount(), 3);
        assert_eq!(state.borrow().batches.len(), 3);
    }

    #[test]
    fn test_executemany_batch_without_item_counts_is_unknown() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Update(1));
        script.push(MockOutcome::Update(-2));
        script.push(MockOutcome::Update(1));
        let mut cursor = conn.cursor().unwrap();
        let sets: Vec<Params> = (0..3).map(|i| Params::Positional(vec![i.into()])).collect();
        cursor.executemany("INSERT INTO t VALUES (%s)", &sets).unwrap();
        assert_eq!(cursor.rowcount(), -1);

        script.push(MockOutcome::Update(-2));
        script.push(MockOutcome::Update(-2));
        cursor.executemany("INSERT INTO t VALUES (%s)", &sets[..2]).unwrap();
        assert_eq!(cursor.rowcount(), -1);
    }

    #[test]
    fn test_failed_batch_still_closes_statement() {
        let (conn, script, state) = open(true);
        script.push(MockOutcome::Fail("unique constraint violated".into()));
        let mut cursor = conn.cursor().unwrap();
        let sets: Vec<Params> = (0..2).map(|i| Params::Positional(vec![i.into()])).collect();
        let err = cursor.executemany("INSERT INTO t VALUES (%s)", &sets).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Statement);
        assert!(err.to_string().contains("unique constraint violated"));
        assert_eq!(state.borrow().statements_closed, 1);
    }

    #[test]
    fn test_rejected_bind_is_reported_not_retried() {
        let (conn, _, state) = open(true);
        state.borrow_mut().rejected_setter = Some(Setter::SetInt);
        let mut cursor = conn.cursor().unwrap();
        let params = Params::Positional(vec![7.into()]);
        let err = cursor
            .execute("INSERT INTO t VALUES (%s)", Some(&params))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Statement);
        assert!(err.to_string().contains("setInt"));
        assert!(state.borrow().binds.is_empty());
    }

    #[test]
    fn test_fetch_failure_is_statement_error() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Rows(people().failing_next("connection reset")));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT * FROM people", None).unwrap();
        let err = cursor.fetchone().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Statement);
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_executemany_fallback_sums_positive_counts() {
        let (conn, script, state) = open(false);
        script.push(MockOutcome::Update(1));
        script.push(MockOutcome::Update(1));
        script.push(MockOutcome::Update(0));
        let mut cursor = conn.cursor().unwrap();
        let sets: Vec<Params> = (0..3).map(|i| Params::Positional(vec![i.into()])).collect();
        cursor.executemany("UPDATE t SET x = %s", &sets).unwrap();
        assert_eq!(cursor.rowcount(), 2);
        assert_eq!(state.borrow().executions, 3);
    }

    #[test]
    fn test_fetchmany_respects_size_and_arraysize() {
        let (conn, script, _) = open(true);
        let rs = people();
        let fetch_sizes = Rc::clone(&rs.fetch_sizes);
        script.push(MockOutcome::Rows(rs));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT * FROM people", None).unwrap();

        assert_eq!(cursor.fetchmany(Some(2)).unwrap().len(), 2);
        assert_eq!(*fetch_sizes.borrow(), vec![2, 0]);
        assert_eq!(cursor.fetchmany(None).unwrap().len(), 1);
        assert!(cursor.fetchmany(Some(5)).unwrap().is_empty());
    }

    #[test]
    fn test_fetchmany_tolerates_missing_fetch_size_support() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Rows(people().fetch_size_supported(false)));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT * FROM people", None).unwrap();
        assert_eq!(cursor.fetchmany(Some(10)).unwrap().len(), 3);
    }

    #[test]
    fn test_rows_iterator() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Rows(people()));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT * FROM people", None).unwrap();
        let ids: Vec<CellValue> = cursor.rows().map(|row| row.unwrap()[0].clone()).collect();
        assert_eq!(ids, vec![CellValue::Int(1), CellValue::Int(2), CellValue::Int(3)]);
    }

    #[test]
    fn test_fetchone_named_uses_stripped_names() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Rows(people()));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT * FROM people", None).unwrap();
        let row = cursor.fetchone_named().unwrap().unwrap();
        assert_eq!(row.get("id"), Some(&CellValue::Int(1)));
        assert_eq!(row.get("name"), Some(&CellValue::String("ann".into())));
    }

    #[test]
    fn test_column_prefix_stripping() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            strip_column_prefixes(&names(&["orders.id", "orders.total"])),
            names(&["id", "total"])
        );
        assert_eq!(strip_column_prefixes(&names(&["a.id", "b.id"])), names(&["id", "id"]));
        assert_eq!(strip_column_prefixes(&names(&["id", "total"])), names(&["id", "total"]));
    }

    #[test]
    fn test_description_shape() {
        let (conn, script, _) = open(true);
        let mut id = column("id", 4);
        id.nullable = COLUMN_NO_NULLS;
        let mut note = column("note", 12);
        note.display_size = i32::MAX;
        note.precision = i32::MAX;
        note.nullable = COLUMN_NULLABLE_UNKNOWN;
        let empty = column("nothing", 0);
        script.push(MockOutcome::Rows(MockResultSet::new(vec![id, note, empty], vec![])));

        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT id, note, NULL FROM t", None).unwrap();
        assert_eq!(cursor.rowcount(), 0);

        let description = cursor.description().unwrap().unwrap();
        assert_eq!(description[0].type_code, "int - JDBC:INTEGER");
        assert_eq!(description[0].null_ok, Some(false));
        assert_eq!(description[1].type_code, "str - JDBC:VARCHAR");
        assert_eq!(description[1].display_size, None);
        assert_eq!(description[1].internal_size, None);
        assert_eq!(description[1].precision, None);
        assert_eq!(description[1].null_ok, None);
        assert_eq!(description[2].type_code, "NULL");

        let json = serde_json::to_value(&description[0]).unwrap();
        assert_eq!(json, serde_json::json!(["id", "int - JDBC:INTEGER", 10, 10, 10, 0, false]));
    }

    #[test]
    fn test_close_twice_and_use_after_close() {
        let (conn, _, _) = open(true);
        let mut cursor = conn.cursor().unwrap();
        cursor.close().unwrap();
        assert!(cursor.is_closed());
        assert_eq!(cursor.close().unwrap_err().kind(), ErrorKind::State);
        assert_eq!(cursor.execute("SELECT 1", None).unwrap_err().kind(), ErrorKind::State);
    }

    #[test]
    fn test_cursor_fails_after_connection_closed() {
        let (conn, _, _) = open(true);
        let mut cursor = conn.cursor().unwrap();
        conn.close().unwrap();
        assert_eq!(cursor.execute("SELECT 1", None).unwrap_err().kind(), ErrorKind::State);
    }

    #[test]
    fn test_execute_releases_previous_statement() {
        let (conn, script, state) = open(true);
        script.push(MockOutcome::Rows(people()));
        script.push(MockOutcome::Update(1));
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("SELECT * FROM people", None).unwrap();
        cursor.execute("DELETE FROM people WHERE id = 1", None).unwrap();
        assert_eq!(state.borrow().statements_closed, 1);
        assert_eq!(cursor.column_names(), None);
    }

    #[test]
    fn test_no_result_set_error_carries_warnings() {
        let (conn, script, _) = open(true);
        script.push(MockOutcome::Rows(people().with_warnings("data truncated")));
        let mut other = conn.cursor().unwrap();
        other.execute("SELECT * FROM people", None).unwrap();
        other.release_result_set();
        let err = other.fetchone().unwrap_err();
        assert!(err.to_string().contains("data truncated"));
    }
}
