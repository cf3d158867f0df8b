// Scripted Driver
// Test-only foreign driver with canned results and recorded calls.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::db::traits::{
    Accessor, ColumnMetadata, ForeignError, JavaValue, JdbcConnection, PreparedStatement,
    ResultMetadata, ResultSet, Setter, COLUMN_NULLABLE,
};
use crate::db::types::TypeConverter;

type Bind = (usize, Setter, JavaValue);

/// What the next `execute` call produces
pub enum MockOutcome {
    Rows(MockResultSet),
    Update(i64),
    Fail(String),
}

/// Calls recorded across a mock connection and its statements
#[derive(Default)]
pub struct MockState {
    pub prepared: Vec<String>,
    pub binds: Vec<Bind>,
    pub batches: Vec<Vec<Bind>>,
    pub executions: usize,
    pub outcomes: VecDeque<MockOutcome>,
    pub batch_supported: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub closed: bool,
    pub statements_closed: usize,
    /// Setter the driver refuses with an SQL error
    pub rejected_setter: Option<Setter>,
}

pub fn column(name: &str, type_code: i32) -> ColumnMetadata {
    ColumnMetadata {
        name: name.to_string(),
        type_code,
        type_name: TypeConverter::new().jdbc_type_name(type_code).unwrap_or_default(),
        display_size: 10,
        precision: 10,
        scale: 0,
        nullable: COLUMN_NULLABLE,
    }
}

pub struct MockResultSet {
    metadata: ResultMetadata,
    rows: Vec<Vec<JavaValue>>,
    position: usize,
    last_null: bool,
    scrollable: bool,
    fetch_size_supported: bool,
    warnings: Option<String>,
    next_error: Option<String>,
    pub fetch_sizes: Rc<RefCell<Vec<usize>>>,
}

impl MockResultSet {
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<Vec<JavaValue>>) -> Self {
        Self {
            metadata: ResultMetadata { columns },
            rows,
            position: 0,
            last_null: false,
            scrollable: true,
            fetch_size_supported: true,
            warnings: None,
            next_error: None,
            fetch_sizes: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn single_column(name: &str, type_code: i32, values: Vec<JavaValue>) -> Self {
        Self::new(vec![column(name, type_code)], values.into_iter().map(|v| vec![v]).collect())
    }

    pub fn scrollable(mut self, scrollable: bool) -> Self {
        self.scrollable = scrollable;
        self
    }

    pub fn fetch_size_supported(mut self, supported: bool) -> Self {
        self.fetch_size_supported = supported;
        self
    }

    pub fn with_warnings(mut self, warnings: &str) -> Self {
        self.warnings = Some(warnings.to_string());
        self
    }

    pub fn failing_next(mut self, message: &str) -> Self {
        self.next_error = Some(message.to_string());
        self
    }

    fn current(&self, column: usize) -> Result<&JavaValue, ForeignError> {
        let row = self
            .position
            .checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .ok_or_else(|| ForeignError::Sql("no current row".to_string()))?;
        column
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .ok_or_else(|| ForeignError::Sql(format!("column index out of range: {}", column)))
    }
}

impl ResultSet for MockResultSet {
    fn next(&mut self) -> Result<bool, ForeignError> {
        if let Some(message) = &self.next_error {
            return Err(ForeignError::Sql(message.clone()));
        }
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn is_null(&mut self, column: usize) -> Result<bool, ForeignError> {
        Ok(self.current(column)?.is_null())
    }

    fn was_null(&self) -> Result<bool, ForeignError> {
        Ok(self.last_null)
    }

    fn get(&mut self, accessor: Accessor, column: usize) -> Result<JavaValue, ForeignError> {
        let value = self.current(column)?.clone();
        self.last_null = value.is_null();
        Ok(match (accessor, value) {
            (_, JavaValue::Null) => JavaValue::Null,
            (Accessor::GetString, v @ JavaValue::String(_)) => v,
            (Accessor::GetString, v) => JavaValue::String(v.to_string()),
            (_, v) => v,
        })
    }

    fn metadata(&self) -> Result<ResultMetadata, ForeignError> {
        Ok(self.metadata.clone())
    }

    fn last(&mut self) -> Result<bool, ForeignError> {
        if !self.scrollable {
            return Err(ForeignError::Unsupported("ResultSet.last".to_string()));
        }
        self.position = self.rows.len();
        Ok(!self.rows.is_empty())
    }

    fn row(&self) -> Result<i64, ForeignError> {
        if !self.scrollable {
            return Err(ForeignError::Unsupported("ResultSet.getRow".to_string()));
        }
        if self.position >= 1 && self.position <= self.rows.len() {
            Ok(self.position as i64)
        } else {
            Ok(0)
        }
    }

    fn before_first(&mut self) -> Result<(), ForeignError> {
        if !self.scrollable {
            return Err(ForeignError::Unsupported("ResultSet.beforeFirst".to_string()));
        }
        self.position = 0;
        Ok(())
    }

    fn set_fetch_size(&mut self, rows: usize) -> Result<(), ForeignError> {
        if !self.fetch_size_supported {
            return Err(ForeignError::Unsupported("ResultSet.setFetchSize".to_string()));
        }
        self.fetch_sizes.borrow_mut().push(rows);
        Ok(())
    }

    fn warnings(&self) -> Option<String> {
        self.warnings.clone()
    }

    fn close(&mut self) -> Result<(), ForeignError> {
        Ok(())
    }
}

pub struct MockStatement {
    state: Rc<RefCell<MockState>>,
    current: Vec<Bind>,
    queued: Vec<Vec<Bind>>,
    pending: Option<MockResultSet>,
    update_count: i64,
}

impl PreparedStatement for MockStatement {
    fn clear_parameters(&mut self) -> Result<(), ForeignError> {
        self.current.clear();
        Ok(())
    }

    fn set(&mut self, index: usize, setter: Setter, value: JavaValue) -> Result<(), ForeignError> {
        if self.state.borrow().rejected_setter == Some(setter) {
            return Err(ForeignError::Sql(format!(
                "{} rejected for parameter {}",
                setter.method_name(),
                index
            )));
        }
        self.state.borrow_mut().binds.push((index, setter, value.clone()));
        self.current.push((index, setter, value));
        Ok(())
    }

    fn execute(&mut self) -> Result<bool, ForeignError> {
        let mut state = self.state.borrow_mut();
        state.executions += 1;
        match state.outcomes.pop_front() {
            Some(MockOutcome::Rows(rs)) => {
                self.pending = Some(rs);
                self.update_count = -1;
                Ok(true)
            }
            Some(MockOutcome::Update(count)) => {
                self.update_count = count;
                Ok(false)
            }
            Some(MockOutcome::Fail(message)) => Err(ForeignError::Sql(message)),
            None => {
                self.update_count = 0;
                Ok(false)
            }
        }
    }

    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>, ForeignError> {
        Ok(self.pending.take().map(|rs| Box::new(rs) as Box<dyn ResultSet>))
    }

    fn update_count(&self) -> Result<i64, ForeignError> {
        Ok(self.update_count)
    }

    fn add_batch(&mut self) -> Result<(), ForeignError> {
        self.queued.push(self.current.clone());
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<i64>, ForeignError> {
        let mut state = self.state.borrow_mut();
        if !state.batch_supported {
            return Err(ForeignError::Unsupported("PreparedStatement.executeBatch".to_string()));
        }
        if matches!(state.outcomes.front(), Some(MockOutcome::Fail(_))) {
            if let Some(MockOutcome::Fail(message)) = state.outcomes.pop_front() {
                return Err(ForeignError::Sql(message));
            }
        }
        let queued = std::mem::take(&mut self.queued);
        let counts = queued
            .iter()
            .map(|_| match state.outcomes.pop_front() {
                Some(MockOutcome::Update(count)) => count,
                _ => 1,
            })
            .collect();
        state.batches.extend(queued);
        Ok(counts)
    }

    fn close(&mut self) -> Result<(), ForeignError> {
        self.state.borrow_mut().statements_closed += 1;
        Ok(())
    }
}

/// Mock connection; clone the state handle before handing the connection over
pub struct MockConnection {
    state: Rc<RefCell<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState::default())),
        }
    }

    pub fn from_state(state: Rc<RefCell<MockState>>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Rc<RefCell<MockState>> {
        Rc::clone(&self.state)
    }

    pub fn push(&self, outcome: MockOutcome) {
        self.state.borrow_mut().outcomes.push_back(outcome);
    }
}

impl JdbcConnection for MockConnection {
    fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>, ForeignError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(ForeignError::Sql("connection is closed".to_string()));
        }
        state.prepared.push(sql.to_string());
        Ok(Box::new(MockStatement {
            state: Rc::clone(&self.state),
            current: Vec::new(),
            queued: Vec::new(),
            pending: None,
            update_count: -1,
        }))
    }

    fn commit(&self) -> Result<(), ForeignError> {
        self.state.borrow_mut().commits += 1;
        Ok(())
    }

    fn rollback(&self) -> Result<(), ForeignError> {
        self.state.borrow_mut().rollbacks += 1;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    fn close(&self) -> Result<(), ForeignError> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}
