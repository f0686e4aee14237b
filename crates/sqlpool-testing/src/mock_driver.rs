//! In-memory mock driver.
//!
//! Statements are numbered from 1 in creation order across every connection
//! created by the same [`DriverLog`], so tests can tell whether a handle
//! returned by the pool is a recycled one or was freshly prepared.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use hashbrown::HashSet;
use parking_lot::Mutex;
use sqlpool::{Arg, Connection, Connector, DriverError, ResultSet, Statement};

/// A driver-level call recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A connection was opened.
    Connected {
        /// Connection id.
        conn: u64,
    },
    /// `prepareStatement` reached the driver.
    Prepared {
        /// Statement id.
        stmt: u64,
        /// SQL text.
        sql: String,
    },
    /// `prepareCall` reached the driver.
    PreparedCall {
        /// Statement id.
        stmt: u64,
        /// Call text.
        sql: String,
    },
    /// `createStatement` reached the driver.
    Created {
        /// Statement id.
        stmt: u64,
    },
    /// A statement was executed.
    Executed {
        /// Statement id.
        stmt: u64,
    },
    /// A statement's parameters were cleared.
    ParametersCleared {
        /// Statement id.
        stmt: u64,
    },
    /// A statement's result set was closed.
    ResultSetClosed {
        /// Statement id.
        stmt: u64,
    },
    /// A statement was closed.
    StatementClosed {
        /// Statement id.
        stmt: u64,
    },
    /// A connection was closed.
    ConnectionClosed {
        /// Connection id.
        conn: u64,
    },
}

#[derive(Debug, Default)]
struct Failures {
    close_sql: HashSet<String>,
    clear_parameters: bool,
    close_result_set: bool,
}

/// Shared record of everything the mock driver did.
pub struct DriverLog {
    events: Mutex<Vec<DriverEvent>>,
    failures: Mutex<Failures>,
    next_conn: AtomicU64,
    next_stmt: AtomicU64,
    connections_valid: AtomicBool,
}

impl DriverLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            next_conn: AtomicU64::new(1),
            next_stmt: AtomicU64::new(1),
            connections_valid: AtomicBool::new(true),
        })
    }

    /// A connector whose connections report to this log.
    #[must_use]
    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            log: Arc::clone(self),
        })
    }

    /// Open a connection directly, bypassing any pool.
    #[must_use]
    pub fn connection(self: &Arc<Self>) -> MockConnection {
        let id = self.next_conn.fetch_add(1, Ordering::SeqCst);
        self.record(DriverEvent::Connected { conn: id });
        MockConnection {
            id,
            log: Arc::clone(self),
            closed: false,
        }
    }

    /// Create a statement directly, bypassing any connection.
    #[must_use]
    pub fn statement(self: &Arc<Self>, sql: &str) -> MockStatement {
        let id = self.next_stmt.fetch_add(1, Ordering::SeqCst);
        self.record(DriverEvent::Prepared {
            stmt: id,
            sql: sql.to_string(),
        });
        MockStatement::new(id, sql, Arc::clone(self))
    }

    fn record(&self, event: DriverEvent) {
        tracing::trace!(?event, "mock driver event");
        self.events.lock().push(event);
    }

    /// All recorded events, in order.
    #[must_use]
    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.lock().clone()
    }

    /// Number of statements the driver prepared (statements and calls).
    #[must_use]
    pub fn prepared_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, DriverEvent::Prepared { .. } | DriverEvent::PreparedCall { .. }))
            .count()
    }

    /// Ids of statements that were physically closed, in close order.
    #[must_use]
    pub fn closed_statements(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DriverEvent::StatementClosed { stmt } => Some(*stmt),
                _ => None,
            })
            .collect()
    }

    /// Whether the statement with `id` was physically closed.
    #[must_use]
    pub fn is_statement_closed(&self, id: u64) -> bool {
        self.closed_statements().contains(&id)
    }

    /// Id of the most recently executed statement.
    #[must_use]
    pub fn last_executed(&self) -> Option<u64> {
        self.events.lock().iter().rev().find_map(|e| match e {
            DriverEvent::Executed { stmt } => Some(*stmt),
            _ => None,
        })
    }

    /// Number of physically closed connections.
    #[must_use]
    pub fn closed_connections(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, DriverEvent::ConnectionClosed { .. }))
            .count()
    }

    /// Make closing statements prepared from `sql` fail.
    ///
    /// The statement still counts as closed.
    pub fn fail_close_for(&self, sql: &str) {
        self.failures.lock().close_sql.insert(sql.to_string());
    }

    /// Make `clear_parameters` fail on every statement.
    pub fn fail_clear_parameters(&self, fail: bool) {
        self.failures.lock().clear_parameters = fail;
    }

    /// Make closing result sets fail.
    pub fn fail_close_result_set(&self, fail: bool) {
        self.failures.lock().close_result_set = fail;
    }

    /// Set what `is_valid` reports for every connection.
    pub fn set_connections_valid(&self, valid: bool) {
        self.connections_valid.store(valid, Ordering::SeqCst);
    }

    fn next_statement_id(&self) -> u64 {
        self.next_stmt.fetch_add(1, Ordering::SeqCst)
    }
}

impl fmt::Debug for DriverLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverLog")
            .field("events", &self.events.lock().len())
            .finish()
    }
}

/// Connector producing [`MockConnection`]s.
#[derive(Debug)]
pub struct MockConnector {
    log: Arc<DriverLog>,
}

impl Connector for MockConnector {
    fn connect(&self) -> Result<Box<dyn Connection>, DriverError> {
        Ok(Box::new(self.log.connection()))
    }
}

/// A mock physical connection.
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    log: Arc<DriverLog>,
    closed: bool,
}

impl MockConnection {
    /// Connection id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::new("connection is closed").with_sql_state("08003"));
        }
        Ok(())
    }

    fn sql_of(args: &[Arg]) -> Result<&str, DriverError> {
        args.first()
            .and_then(Arg::as_text)
            .ok_or_else(|| DriverError::new("missing SQL text").with_sql_state("07001"))
    }
}

impl Connection for MockConnection {
    fn prepare_statement(&mut self, args: &[Arg]) -> Result<Box<dyn Statement>, DriverError> {
        self.check_open()?;
        let sql = Self::sql_of(args)?;
        let id = self.log.next_statement_id();
        self.log.record(DriverEvent::Prepared {
            stmt: id,
            sql: sql.to_string(),
        });
        Ok(Box::new(MockStatement::new(id, sql, Arc::clone(&self.log))))
    }

    fn prepare_call(&mut self, args: &[Arg]) -> Result<Box<dyn Statement>, DriverError> {
        self.check_open()?;
        let sql = Self::sql_of(args)?;
        let id = self.log.next_statement_id();
        self.log.record(DriverEvent::PreparedCall {
            stmt: id,
            sql: sql.to_string(),
        });
        Ok(Box::new(MockStatement::new(id, sql, Arc::clone(&self.log))))
    }

    fn create_statement(&mut self) -> Result<Box<dyn Statement>, DriverError> {
        self.check_open()?;
        let id = self.log.next_statement_id();
        self.log.record(DriverEvent::Created { stmt: id });
        Ok(Box::new(MockStatement::new(id, "", Arc::clone(&self.log))))
    }

    fn is_valid(&self) -> bool {
        !self.closed && self.log.connections_valid.load(Ordering::SeqCst)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if !self.closed {
            self.closed = true;
            self.log.record(DriverEvent::ConnectionClosed { conn: self.id });
        }
        Ok(())
    }
}

/// A mock statement handle.
#[derive(Debug)]
pub struct MockStatement {
    id: u64,
    sql: String,
    log: Arc<DriverLog>,
    params: Vec<Option<Arg>>,
    result: Option<MockResultSet>,
    closed: bool,
}

impl MockStatement {
    fn new(id: u64, sql: &str, log: Arc<DriverLog>) -> Self {
        Self {
            id,
            sql: sql.to_string(),
            log,
            params: Vec::new(),
            result: None,
            closed: false,
        }
    }

    /// Statement id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// SQL text the statement was prepared from.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Currently bound parameters.
    #[must_use]
    pub fn params(&self) -> &[Option<Arg>] {
        &self.params
    }

    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::new("statement is closed").with_sql_state("HY010"));
        }
        Ok(())
    }
}

impl Statement for MockStatement {
    fn bind(&mut self, index: usize, value: Arg) -> Result<(), DriverError> {
        self.check_open()?;
        if index == 0 {
            return Err(DriverError::new("parameter index is 1-based").with_sql_state("07009"));
        }
        if self.params.len() < index {
            self.params.resize(index, None);
        }
        self.params[index - 1] = Some(value);
        Ok(())
    }

    fn execute(&mut self) -> Result<u64, DriverError> {
        self.check_open()?;
        self.result = Some(MockResultSet {
            stmt: self.id,
            log: Arc::clone(&self.log),
            closed: false,
        });
        self.log.record(DriverEvent::Executed { stmt: self.id });
        Ok(1)
    }

    fn result_set(&mut self) -> Option<&mut dyn ResultSet> {
        self.result.as_mut().map(|rs| rs as &mut dyn ResultSet)
    }

    fn clear_parameters(&mut self) -> Result<(), DriverError> {
        self.check_open()?;
        if self.log.failures.lock().clear_parameters {
            return Err(DriverError::new("clear parameters failed"));
        }
        self.params.clear();
        self.log.record(DriverEvent::ParametersCleared { stmt: self.id });
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.result = None;
        self.log.record(DriverEvent::StatementClosed { stmt: self.id });
        if self.log.failures.lock().close_sql.contains(&self.sql) {
            return Err(DriverError::new(format!("close failed for {}", self.sql)));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A mock result set.
#[derive(Debug)]
pub struct MockResultSet {
    stmt: u64,
    log: Arc<DriverLog>,
    closed: bool,
}

impl ResultSet for MockResultSet {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.log.failures.lock().close_result_set {
            return Err(DriverError::new("result set close failed"));
        }
        if !self.closed {
            self.closed = true;
            self.log.record(DriverEvent::ResultSetClosed { stmt: self.stmt });
        }
        Ok(())
    }
}
