//! Caller-facing handle for a checked-out connection.

use super::PoolInner;
use super::state::{Physical, Slot};
use crate::datasource::{Connection, IsolationLevel};
use crate::error::{BatisError, BatisResult};
use crate::value::{Row, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Checked-out wrapper around a pooled physical connection.
///
/// Every call checks the wrapper's validity flag while holding the physical
/// connection's lock, so a wrapper that was returned, reclaimed as overdue or
/// force-closed can no longer reach the physical connection and fails with
/// [`BatisError::ConnectionClosed`].
///
/// `close` (or drop) hands the connection back to the pool.
pub struct PooledConnection {
    id: u64,
    physical: Arc<Physical>,
    valid: Arc<AtomicBool>,
    created_at: Instant,
    last_used_at: Instant,
    checkout_at: Instant,
    type_code: u64,
    pool: Weak<PoolInner>,
    returned: bool,
}

impl PooledConnection {
    pub(crate) fn checked_out(slot: &Slot, pool: Weak<PoolInner>) -> Self {
        Self {
            id: slot.id,
            physical: slot.physical.clone(),
            valid: slot.valid.clone(),
            created_at: slot.created_at,
            last_used_at: slot.last_used_at,
            checkout_at: slot.checkout_at,
            type_code: slot.type_code,
            pool,
            returned: false,
        }
    }

    /// Wrapper id; a new wrapper is created every time the physical
    /// connection changes hands.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id of the underlying physical connection.
    pub fn physical_id(&self) -> u64 {
        self.physical.id
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn checkout_at(&self) -> Instant {
        self.checkout_at
    }

    pub fn checkout_time(&self) -> Duration {
        self.checkout_at.elapsed()
    }

    pub fn connection_type_code(&self) -> u64 {
        self.type_code
    }

    fn with_physical<R>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> BatisResult<R>,
    ) -> BatisResult<R> {
        let mut conn = self.physical.conn.lock();
        if !self.is_valid() {
            return Err(BatisError::ConnectionClosed);
        }
        f(conn.as_mut())
    }
}

impl Connection for PooledConnection {
    /// Returns the connection to the pool; later calls are no-ops.
    fn close(&mut self) -> BatisResult<()> {
        if self.returned {
            return Ok(());
        }
        self.returned = true;
        if let Some(pool) = self.pool.upgrade() {
            pool.push_connection(self.id);
        }
        Ok(())
    }

    fn is_closed(&self) -> BatisResult<bool> {
        self.with_physical(|c| c.is_closed())
    }

    fn auto_commit(&self) -> BatisResult<bool> {
        self.with_physical(|c| c.auto_commit())
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> BatisResult<()> {
        self.with_physical(|c| c.set_auto_commit(auto_commit))
    }

    fn commit(&mut self) -> BatisResult<()> {
        self.with_physical(|c| c.commit())
    }

    fn rollback(&mut self) -> BatisResult<()> {
        self.with_physical(|c| c.rollback())
    }

    fn execute(&mut self, sql: &str) -> BatisResult<()> {
        self.with_physical(|c| c.execute(sql))
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> BatisResult<Vec<Row>> {
        self.with_physical(|c| c.query(sql, params))
    }

    fn update(&mut self, sql: &str, params: &[Value]) -> BatisResult<u64> {
        self.with_physical(|c| c.update(sql, params))
    }

    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> BatisResult<()> {
        self.with_physical(|c| c.set_transaction_isolation(level))
    }

    fn set_network_timeout(&mut self, timeout: Duration) -> BatisResult<()> {
        self.with_physical(|c| c.set_network_timeout(timeout))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("physical_id", &self.physical.id)
            .field("valid", &self.is_valid())
            .field("returned", &self.returned)
            .finish()
    }
}
