//! Pool bookkeeping: wrapper slots, idle/active lists and counters.

use super::config::millis;
use crate::datasource::Connection;
use ahash::RandomState;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// One physical connection shared by the wrappers that manage it over time.
pub(crate) struct Physical {
    pub(crate) id: u64,
    pub(crate) conn: Mutex<Box<dyn Connection>>,
}

impl Physical {
    pub(crate) fn new(id: u64, conn: Box<dyn Connection>) -> Arc<Self> {
        Arc::new(Self {
            id,
            conn: Mutex::new(conn),
        })
    }

    /// Rolls back when auto-commit is off.
    pub(crate) fn rollback_if_needed(&self) -> crate::error::BatisResult<()> {
        let mut conn = self.conn.lock();
        if !conn.auto_commit()? {
            conn.rollback()?;
        }
        Ok(())
    }

    /// Best-effort rollback and close; failures are ignored.
    pub(crate) fn close_quietly(&self) {
        let mut conn = self.conn.lock();
        if let Ok(false) = conn.auto_commit() {
            let _ = conn.rollback();
        }
        let _ = conn.close();
    }
}

/// Pool-side record of one wrapper.
///
/// A wrapper is valid until it is returned, reclaimed or force-closed; the
/// flag is shared with the [`super::PooledConnection`] handed to the caller.
pub(crate) struct Slot {
    pub(crate) id: u64,
    pub(crate) physical: Arc<Physical>,
    pub(crate) valid: Arc<AtomicBool>,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
    pub(crate) checkout_at: Instant,
    pub(crate) type_code: u64,
}

impl Slot {
    pub(crate) fn new(id: u64, physical: Arc<Physical>, now: Instant) -> Self {
        Self {
            id,
            physical,
            valid: Arc::new(AtomicBool::new(true)),
            created_at: now,
            last_used_at: now,
            checkout_at: now,
            type_code: 0,
        }
    }

    /// New wrapper over the same physical connection, keeping its history.
    pub(crate) fn rewrap(&self, id: u64) -> Self {
        Self {
            id,
            physical: self.physical.clone(),
            valid: Arc::new(AtomicBool::new(true)),
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            checkout_at: self.checkout_at,
            type_code: self.type_code,
        }
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub(crate) fn checkout_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.checkout_at)
    }

    pub(crate) fn time_since_last_use(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }
}

/// Idle list (take from the front, return to the back), active list (oldest
/// checkout first) and lifetime counters.
#[derive(Default)]
pub(crate) struct PoolState {
    pub(crate) idle: VecDeque<Slot>,
    pub(crate) active: VecDeque<Slot>,
    /// Checkouts being validated outside the pool lock.
    pub(crate) pending: usize,
    pub(crate) request_count: u64,
    pub(crate) accumulated_request_time: Duration,
    pub(crate) accumulated_checkout_time: Duration,
    pub(crate) claimed_overdue_count: u64,
    pub(crate) accumulated_overdue_checkout_time: Duration,
    pub(crate) accumulated_wait_time: Duration,
    pub(crate) had_to_wait_count: u64,
    pub(crate) bad_connection_count: u64,
}

impl PoolState {
    /// Zeroes the counters; the idle/active lists are left alone.
    pub(crate) fn reset_counters(&mut self) {
        self.request_count = 0;
        self.accumulated_request_time = Duration::ZERO;
        self.accumulated_checkout_time = Duration::ZERO;
        self.claimed_overdue_count = 0;
        self.accumulated_overdue_checkout_time = Duration::ZERO;
        self.accumulated_wait_time = Duration::ZERO;
        self.had_to_wait_count = 0;
        self.bad_connection_count = 0;
    }

    pub(crate) fn snapshot(&self, max_active: usize, max_idle: usize) -> PoolStatus {
        PoolStatus {
            active_connections: self.active.len(),
            idle_connections: self.idle.len(),
            max_active,
            max_idle,
            request_count: self.request_count,
            accumulated_request_time: self.accumulated_request_time,
            accumulated_checkout_time: self.accumulated_checkout_time,
            claimed_overdue_count: self.claimed_overdue_count,
            accumulated_overdue_checkout_time: self.accumulated_overdue_checkout_time,
            accumulated_wait_time: self.accumulated_wait_time,
            had_to_wait_count: self.had_to_wait_count,
            bad_connection_count: self.bad_connection_count,
        }
    }
}

/// Point-in-time copy of the pool counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub active_connections: usize,
    pub idle_connections: usize,
    pub max_active: usize,
    pub max_idle: usize,
    pub request_count: u64,
    #[serde(with = "millis")]
    pub accumulated_request_time: Duration,
    #[serde(with = "millis")]
    pub accumulated_checkout_time: Duration,
    pub claimed_overdue_count: u64,
    #[serde(with = "millis")]
    pub accumulated_overdue_checkout_time: Duration,
    #[serde(with = "millis")]
    pub accumulated_wait_time: Duration,
    pub had_to_wait_count: u64,
    pub bad_connection_count: u64,
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos((total.as_nanos() / u128::from(count)) as u64)
    }
}

impl PoolStatus {
    pub fn average_request_time(&self) -> Duration {
        average(self.accumulated_request_time, self.request_count)
    }

    pub fn average_wait_time(&self) -> Duration {
        average(self.accumulated_wait_time, self.had_to_wait_count)
    }

    pub fn average_checkout_time(&self) -> Duration {
        average(self.accumulated_checkout_time, self.request_count)
    }

    pub fn average_overdue_checkout_time(&self) -> Duration {
        average(
            self.accumulated_overdue_checkout_time,
            self.claimed_overdue_count,
        )
    }

    pub fn to_json(&self) -> crate::error::BatisResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===CONFIGURATION==============================================")?;
        writeln!(f, " maxActive                      {}", self.max_active)?;
        writeln!(f, " maxIdle                        {}", self.max_idle)?;
        writeln!(f, "---STATUS-----------------------------------------------------")?;
        writeln!(f, " activeConnections              {}", self.active_connections)?;
        writeln!(f, " idleConnections                {}", self.idle_connections)?;
        writeln!(f, " requestCount                   {}", self.request_count)?;
        writeln!(f, " averageRequestTime             {:?}", self.average_request_time())?;
        writeln!(f, " averageCheckoutTime            {:?}", self.average_checkout_time())?;
        writeln!(f, " claimedOverdue                 {}", self.claimed_overdue_count)?;
        writeln!(f, " averageOverdueCheckoutTime     {:?}", self.average_overdue_checkout_time())?;
        writeln!(f, " hadToWait                      {}", self.had_to_wait_count)?;
        writeln!(f, " averageWaitTime                {:?}", self.average_wait_time())?;
        writeln!(f, " badConnectionCount             {}", self.bad_connection_count)?;
        write!(f, "===============================================================")
    }
}

/// Fingerprint of url + credentials; a pool only takes back connections
/// whose fingerprint matches its own.
pub(crate) fn connection_type_code(url: &str, username: Option<&str>, password: Option<&str>) -> u64 {
    let hasher = RandomState::with_seeds(
        0x9e37_79b9_7f4a_7c15,
        0xbf58_476d_1ce4_e5b9,
        0x94d0_49bb_1331_11eb,
        0x2545_f491_4f6c_dd1d,
    );
    hasher.hash_one(format!(
        "{url}{}{}",
        username.unwrap_or("null"),
        password.unwrap_or("null")
    ))
}
