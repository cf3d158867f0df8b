// Connection Worker
// Runs one connection on a dedicated thread and serves it to async callers over channels.

use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::connect::{CallArgs, ConnectFunction};
use crate::db::connection::Connection;
use crate::db::cursor::{ColumnDescription, Cursor, Row};
use crate::db::params::Params;
use crate::db::traits::{DatabaseError, Result};

/// Owned result of one statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub rowcount: i64,
    pub description: Option<Vec<ColumnDescription>>,
    pub rows: Vec<Row>,
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Execute {
        sql: String,
        params: Option<Params>,
        reply: Reply<QueryOutcome>,
    },
    ExecuteMany {
        sql: String,
        param_sets: Vec<Params>,
        reply: Reply<i64>,
    },
    Commit(Reply<()>),
    Rollback(Reply<()>),
    Close(Reply<()>),
}

/// Async handle to a connection living on its own thread
#[derive(Clone)]
pub struct ConnectionWorker {
    sender: mpsc::UnboundedSender<Command>,
    connection_id: String,
}

fn stopped() -> DatabaseError {
    DatabaseError::State("connection worker has stopped".to_string())
}

impl ConnectionWorker {
    /// Start a worker thread and open the connection on it
    pub async fn spawn<F>(open: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Connection> + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        thread::Builder::new()
            .name("jdbc-dbapi-worker".to_string())
            .spawn(move || {
                let connection = match open() {
                    Ok(connection) => connection,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(connection.id().to_string())).is_err() {
                    return;
                }
                worker_loop(connection, receiver);
            })?;

        let connection_id = ready_rx.await.map_err(|_| stopped())??;
        Ok(Self { sender, connection_id })
    }

    /// Connect through `function` on a new worker thread
    pub async fn connect(function: Arc<dyn ConnectFunction>, args: CallArgs) -> Result<Self> {
        Self::spawn(move || function.connect(&args)).await
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender.send(command(reply)).map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())?
    }

    /// Execute a statement and collect every row it returns
    pub async fn execute(&self, sql: &str, params: Option<Params>) -> Result<QueryOutcome> {
        let sql = sql.to_string();
        self.request(|reply| Command::Execute { sql, params, reply }).await
    }

    /// Execute a statement once per parameter set; returns the summed row count
    pub async fn execute_many(&self, sql: &str, param_sets: Vec<Params>) -> Result<i64> {
        let sql = sql.to_string();
        self.request(|reply| Command::ExecuteMany { sql, param_sets, reply })
            .await
    }

    pub async fn commit(&self) -> Result<()> {
        self.request(Command::Commit).await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.request(Command::Rollback).await
    }

    /// Close the connection and stop the worker thread
    pub async fn close(&self) -> Result<()> {
        self.request(Command::Close).await
    }
}

fn run_execute(cursor: &mut Cursor, sql: &str, params: Option<&Params>) -> Result<QueryOutcome> {
    cursor.execute(sql, params)?;
    let description = cursor.description()?;
    let rows = if description.is_some() {
        cursor.fetchall()?
    } else {
        Vec::new()
    };
    Ok(QueryOutcome {
        rowcount: cursor.rowcount(),
        description,
        rows,
    })
}

fn worker_loop(connection: Connection, mut receiver: mpsc::UnboundedReceiver<Command>) {
    tracing::debug!(connection = %connection.id(), "connection worker started");
    let mut cursor: Option<Cursor> = None;

    while let Some(command) = receiver.blocking_recv() {
        match command {
            Command::Execute { sql, params, reply } => {
                let result = open_cursor(&connection, &mut cursor)
                    .and_then(|cursor| run_execute(cursor, &sql, params.as_ref()));
                let _ = reply.send(result);
            }
            Command::ExecuteMany { sql, param_sets, reply } => {
                let result = open_cursor(&connection, &mut cursor).and_then(|cursor| {
                    cursor.executemany(&sql, &param_sets)?;
                    Ok(cursor.rowcount())
                });
                let _ = reply.send(result);
            }
            Command::Commit(reply) => {
                let _ = reply.send(connection.commit());
            }
            Command::Rollback(reply) => {
                let _ = reply.send(connection.rollback());
            }
            Command::Close(reply) => {
                drop(cursor.take());
                let _ = reply.send(connection.close());
                break;
            }
        }
    }
    tracing::debug!(connection = %connection.id(), "connection worker stopped");
}

fn open_cursor<'a>(
    connection: &Connection,
    cursor: &'a mut Option<Cursor>,
) -> Result<&'a mut Cursor> {
    if cursor.is_none() {
        *cursor = Some(connection.cursor()?);
    }
    cursor.as_mut().ok_or_else(stopped)
}
