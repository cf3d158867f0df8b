// Connection
// Wraps one foreign driver connection and hands out cursors over it.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::CursorOptions;
use crate::db::cursor::Cursor;
use crate::db::traits::{DatabaseError, JdbcConnection, Result};
use crate::db::types::TypeConverter;

/// State shared between a connection and its cursors
pub(crate) struct Session {
    handle: Box<dyn JdbcConnection>,
    closed: Cell<bool>,
    pub(crate) converter: Arc<TypeConverter>,
}

impl Session {
    pub(crate) fn handle(&self) -> &dyn JdbcConnection {
        self.handle.as_ref()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get() || self.handle.is_closed()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DatabaseError::State("connection is closed".to_string()));
        }
        Ok(())
    }
}

/// An open logical connection. Not safe to drive from several threads at once.
pub struct Connection {
    id: String,
    session: Rc<Session>,
    options: CursorOptions,
}

impl Connection {
    pub fn new(
        handle: Box<dyn JdbcConnection>,
        converter: Arc<TypeConverter>,
        options: CursorOptions,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(connection = %id, "connection opened");
        Self {
            id,
            session: Rc::new(Session {
                handle,
                closed: Cell::new(false),
                converter,
            }),
            options,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn converter(&self) -> &Arc<TypeConverter> {
        &self.session.converter
    }

    pub fn cursor_options(&self) -> CursorOptions {
        self.options
    }

    /// Close the connection. Closing twice is an error.
    pub fn close(&self) -> Result<()> {
        if self.session.closed.get() {
            return Err(DatabaseError::State("connection is already closed".to_string()));
        }
        self.session.closed.set(true);
        if let Err(e) = self.session.handle.close() {
            tracing::warn!(connection = %self.id, error = %e, "error closing driver connection");
        }
        tracing::debug!(connection = %self.id, "connection closed");
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.session.ensure_open()?;
        self.session
            .handle
            .commit()
            .map_err(|e| DatabaseError::statement("COMMIT", e))
    }

    pub fn rollback(&self) -> Result<()> {
        self.session.ensure_open()?;
        self.session
            .handle
            .rollback()
            .map_err(|e| DatabaseError::statement("ROLLBACK", e))
    }

    /// New cursor bound to this connection
    pub fn cursor(&self) -> Result<Cursor> {
        self.session.ensure_open()?;
        Ok(Cursor::new(Rc::clone(&self.session), self.options))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.session.closed.replace(true) {
            if let Err(e) = self.session.handle.close() {
                tracing::warn!(
                    connection = %self.id,
                    error = %e,
                    "error closing driver connection on drop"
                );
            }
        }
    }
}
