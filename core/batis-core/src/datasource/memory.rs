//! In-memory driver
//!
//! Connections record every statement and answer queries through an
//! optional responder. The driver counts opens, closes and rollbacks and can
//! simulate failures, which is what the pool and executor tests rely on.

use super::{Connection, Driver, IsolationLevel};
use crate::error::{BatisError, BatisResult};
use crate::value::{Row, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

type QueryResponder = Arc<dyn Fn(&str, &[Value]) -> BatisResult<Vec<Row>> + Send + Sync>;

/// One statement seen by a memory connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub connection_id: u64,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct DriverShared {
    next_id: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
    rollbacks: AtomicU64,
    fail_connect: AtomicBool,
    fail_execute: AtomicBool,
    default_auto_commit: AtomicBool,
    responder: RwLock<Option<QueryResponder>>,
    statements: Mutex<Vec<ExecutedStatement>>,
    live: Mutex<Vec<Weak<AtomicBool>>>,
    last_properties: Mutex<HashMap<String, String>>,
}

/// Driver whose connections live in process memory.
#[derive(Clone)]
pub struct MemoryDriver {
    shared: Arc<DriverShared>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        let shared = DriverShared::default();
        shared.default_auto_commit.store(true, Ordering::SeqCst);
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Auto-commit state of newly opened connections.
    pub fn with_auto_commit(self, auto_commit: bool) -> Self {
        self.shared
            .default_auto_commit
            .store(auto_commit, Ordering::SeqCst);
        self
    }

    /// Answers every `query` with the closure's result.
    pub fn on_query<F>(&self, responder: F)
    where
        F: Fn(&str, &[Value]) -> BatisResult<Vec<Row>> + Send + Sync + 'static,
    {
        *self.shared.responder.write() = Some(Arc::new(responder));
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes `execute`, `query` and `update` fail, e.g. to break pings.
    pub fn set_fail_execute(&self, fail: bool) {
        self.shared.fail_execute.store(fail, Ordering::SeqCst);
    }

    /// Marks every open connection closed, as if the server went away.
    pub fn kill_all(&self) {
        let live = self.shared.live.lock();
        for closed in live.iter().filter_map(Weak::upgrade) {
            closed.store(true, Ordering::SeqCst);
        }
    }

    pub fn opened(&self) -> u64 {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> u64 {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    /// Statements executed so far, in order.
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.shared.statements.lock().clone()
    }

    /// Properties passed to the most recent `connect`.
    pub fn last_properties(&self) -> HashMap<String, String> {
        self.shared.last_properties.lock().clone()
    }
}

impl Driver for MemoryDriver {
    fn connect(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> BatisResult<Box<dyn Connection>> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(BatisError::connection(format!("cannot connect to {url}")));
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let closed = Arc::new(AtomicBool::new(false));
        {
            let mut live = self.shared.live.lock();
            live.retain(|w| w.strong_count() > 0);
            live.push(Arc::downgrade(&closed));
        }
        *self.shared.last_properties.lock() = properties.clone();
        self.shared.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryConnection {
            id,
            closed,
            auto_commit: self.shared.default_auto_commit.load(Ordering::SeqCst),
            isolation: None,
            network_timeout: None,
            driver: self.shared.clone(),
        }))
    }
}

pub struct MemoryConnection {
    id: u64,
    closed: Arc<AtomicBool>,
    auto_commit: bool,
    isolation: Option<IsolationLevel>,
    network_timeout: Option<Duration>,
    driver: Arc<DriverShared>,
}

impl MemoryConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout
    }

    fn check_open(&self) -> BatisResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BatisError::connection(format!(
                "memory connection {} is closed",
                self.id
            )))
        } else {
            Ok(())
        }
    }

    fn record(&self, sql: &str, params: &[Value]) -> BatisResult<()> {
        self.check_open()?;
        if self.driver.fail_execute.load(Ordering::SeqCst) {
            return Err(BatisError::connection(format!(
                "statement failed on memory connection {}",
                self.id
            )));
        }
        self.driver.statements.lock().push(ExecutedStatement {
            connection_id: self.id,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn close(&mut self) -> BatisResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.driver.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> BatisResult<bool> {
        Ok(self.closed.load(Ordering::SeqCst))
    }

    fn auto_commit(&self) -> BatisResult<bool> {
        self.check_open()?;
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> BatisResult<()> {
        self.check_open()?;
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn commit(&mut self) -> BatisResult<()> {
        self.check_open()
    }

    fn rollback(&mut self) -> BatisResult<()> {
        self.check_open()?;
        self.driver.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> BatisResult<()> {
        self.record(sql, &[])
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> BatisResult<Vec<Row>> {
        self.record(sql, params)?;
        let responder = self.driver.responder.read().clone();
        match responder {
            Some(responder) => responder(sql, params),
            None => Ok(Vec::new()),
        }
    }

    fn update(&mut self, sql: &str, params: &[Value]) -> BatisResult<u64> {
        self.record(sql, params)?;
        Ok(1)
    }

    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> BatisResult<()> {
        self.check_open()?;
        self.isolation = Some(level);
        Ok(())
    }

    fn set_network_timeout(&mut self, timeout: Duration) -> BatisResult<()> {
        self.check_open()?;
        self.network_timeout = Some(timeout);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
