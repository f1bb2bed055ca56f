//! Synchronous connection pool
//!
//! All pool state sits behind one mutex; callers that find no idle
//! connection, no free active slot and no overdue checkout to reclaim wait
//! on a condvar tied to that mutex. Returns, teardown and interrupts notify
//! it.
//!
//! # Acquisition order
//!
//! 1. oldest idle connection
//! 2. a new physical connection while `active < max_active`
//! 3. the oldest active connection, if checked out longer than
//!    `max_checkout_time` (same physical connection, new wrapper)
//! 4. wait, bounded by `time_to_wait` overall
//!
//! Each candidate is validated before being handed out, with the pool lock
//! released while its physical connection is touched. Too many bad
//! candidates in one acquisition fail it with
//! [`BatisError::ConnectionAcquisition`].

pub mod config;
mod connection;
mod state;

pub use config::{NO_PING_QUERY, PoolConfig};
pub use connection::PooledConnection;
pub use state::PoolStatus;

use super::unpooled::apply_driver_property;
use super::{
    parse_property, Connection, DataSource, DataSourceFactory, Driver, DriverSettings,
    IsolationLevel, UnpooledDataSource,
};
use crate::error::{BatisError, BatisResult};
use parking_lot::{Condvar, Mutex, MutexGuard};
use state::{connection_type_code, Physical, PoolState, Slot};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Shared {
    source: UnpooledDataSource,
    config: PoolConfig,
    state: PoolState,
    expected_type_code: u64,
    interrupt_epoch: u64,
    /// Bumped whenever every connection is torn down.
    generation: u64,
}

impl Shared {
    fn refresh_type_code(&mut self) {
        let settings = self.source.settings();
        self.expected_type_code = connection_type_code(
            &settings.url,
            settings.username.as_deref(),
            settings.password.as_deref(),
        );
    }
}

pub(crate) struct PoolInner {
    shared: Mutex<Shared>,
    available: Condvar,
    next_wrapper_id: AtomicU64,
    next_physical_id: AtomicU64,
}

impl PoolInner {
    fn next_wrapper_id(&self) -> u64 {
        self.next_wrapper_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn next_physical_id(&self) -> u64 {
        self.next_physical_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn pop_connection(
        self: &Arc<Self>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> BatisResult<PooledConnection> {
        let started = Instant::now();
        let mut shared = self.shared.lock();
        let epoch = shared.interrupt_epoch;
        let mut counted_wait = false;
        let mut local_bad_connections = 0usize;
        // deadline and wait accounting start with the first wait;
        // Some(None) is a wait without a deadline
        let mut deadline: Option<Option<Instant>> = None;
        let mut wait_clock: Option<Instant> = None;
        let mut last_pass = false;

        loop {
            let candidate = self.next_candidate(&mut shared, username, password)?;
            let (mut slot, reclaimed) = match candidate {
                Some(candidate) => candidate,
                None => {
                    if last_pass {
                        let waited_ms = started.elapsed().as_millis() as u64;
                        tracing::debug!(target: "pool", waited_ms, "wait for connection timed out");
                        return Err(BatisError::PoolTimeout { waited_ms });
                    }
                    let now = Instant::now();
                    let deadline = *deadline
                        .get_or_insert_with(|| now.checked_add(shared.config.time_to_wait));
                    let since = *wait_clock.get_or_insert(now);
                    if !counted_wait {
                        shared.state.had_to_wait_count += 1;
                        counted_wait = true;
                    }
                    tracing::debug!(
                        target: "pool",
                        max_wait_ms = shared.config.time_to_wait.as_millis() as u64,
                        "waiting for connection"
                    );
                    match Self::wake_time(&shared, deadline) {
                        Some(wake_at) => {
                            self.available.wait_until(&mut shared, wake_at);
                        }
                        None => self.available.wait(&mut shared),
                    }
                    let woke = Instant::now();
                    shared.state.accumulated_wait_time += woke.saturating_duration_since(since);
                    wait_clock = Some(woke);

                    if shared.interrupt_epoch != epoch {
                        tracing::debug!(target: "pool", "wait for connection interrupted");
                        return Err(BatisError::Interrupted);
                    }
                    if deadline.is_some_and(|deadline| woke >= deadline) {
                        last_pass = true;
                    }
                    continue;
                }
            };

            // Validation locks the physical connection, which a reclaimed
            // holder may still be using. The pool lock is released meanwhile
            // and the slot stays reserved against max_active.
            let config = shared.config.clone();
            let generation = shared.generation;
            shared.state.pending += 1;
            let good = MutexGuard::unlocked(&mut shared, || {
                Self::validate(&config, &slot, reclaimed)
            });
            shared.state.pending -= 1;

            if shared.generation != generation {
                // closed or reconfigured while validating
                slot.invalidate();
                MutexGuard::unlocked(&mut shared, || slot.physical.close_quietly());
                self.available.notify_one();
                continue;
            }

            if good {
                let now = Instant::now();
                slot.type_code = connection_type_code(
                    &shared.source.settings().url,
                    username,
                    password,
                );
                slot.checkout_at = now;
                slot.last_used_at = now;

                let conn = PooledConnection::checked_out(&slot, Arc::downgrade(self));
                shared.state.active.push_back(slot);
                shared.state.request_count += 1;
                shared.state.accumulated_request_time += started.elapsed();
                return Ok(conn);
            }

            tracing::debug!(
                target: "pool",
                physical_id = slot.physical.id,
                "bad connection returned from the pool, getting another connection"
            );
            slot.invalidate();
            MutexGuard::unlocked(&mut shared, || slot.physical.close_quietly());
            self.available.notify_one();
            shared.state.bad_connection_count += 1;
            local_bad_connections += 1;
            let limit = shared.config.max_idle + shared.config.bad_connection_tolerance;
            if local_bad_connections > limit {
                tracing::debug!(target: "pool", bad = local_bad_connections, "could not get a good connection");
                return Err(BatisError::ConnectionAcquisition(format!(
                    "{local_bad_connections} bad connections in one acquisition (limit {limit})"
                )));
            }
        }
    }

    /// Steps 1-3 of acquisition; `None` means the caller has to wait. The
    /// flag marks a connection reclaimed from an overdue holder.
    fn next_candidate(
        &self,
        shared: &mut Shared,
        username: Option<&str>,
        password: Option<&str>,
    ) -> BatisResult<Option<(Slot, bool)>> {
        if let Some(slot) = shared.state.idle.pop_front() {
            tracing::debug!(target: "pool", physical_id = slot.physical.id, "checked out connection from pool");
            return Ok(Some((slot, false)));
        }

        if shared.state.active.len() + shared.state.pending < shared.config.max_active {
            let conn = shared.source.new_connection(username, password)?;
            let physical = Physical::new(self.next_physical_id(), conn);
            tracing::debug!(target: "pool", physical_id = physical.id, "created connection");
            let slot = Slot::new(self.next_wrapper_id(), physical, Instant::now());
            return Ok(Some((slot, false)));
        }

        let now = Instant::now();
        let overdue = shared
            .state
            .active
            .front()
            .map(|oldest| oldest.checkout_time(now))
            .filter(|checkout| *checkout > shared.config.max_checkout_time);
        let Some(checkout) = overdue else {
            return Ok(None);
        };
        let Some(old) = shared.state.active.pop_front() else {
            return Ok(None);
        };

        shared.state.claimed_overdue_count += 1;
        shared.state.accumulated_overdue_checkout_time += checkout;
        shared.state.accumulated_checkout_time += checkout;

        // cut off the previous holder; the rollback happens in validate()
        old.invalidate();
        let claimed = old.rewrap(self.next_wrapper_id());
        tracing::debug!(
            target: "pool",
            physical_id = claimed.physical.id,
            checkout_ms = checkout.as_millis() as u64,
            "claimed overdue connection"
        );
        Ok(Some((claimed, true)))
    }

    /// Runs without the pool lock. A reclaimed connection is rolled back
    /// first, which waits for the previous holder's current call to finish.
    fn validate(config: &PoolConfig, slot: &Slot, reclaimed: bool) -> bool {
        if reclaimed {
            if let Err(e) = slot.physical.rollback_if_needed() {
                tracing::debug!(target: "pool", physical_id = slot.physical.id, error = %e, "bad connection, could not roll back");
                return false;
            }
            return slot.is_valid() && Self::ping(config, slot);
        }
        slot.is_valid() && Self::ping(config, slot) && slot.physical.rollback_if_needed().is_ok()
    }

    /// Earliest of the overall deadline and the moment the oldest active
    /// connection becomes overdue. `None` waits until notified.
    fn wake_time(shared: &Shared, deadline: Option<Instant>) -> Option<Instant> {
        let overdue_at = shared.state.active.front().and_then(|oldest| {
            oldest
                .checkout_at
                .checked_add(shared.config.max_checkout_time)?
                .checked_add(Duration::from_millis(1))
        });
        match (overdue_at, deadline) {
            (Some(overdue_at), Some(deadline)) => Some(overdue_at.min(deadline)),
            (overdue_at, deadline) => overdue_at.or(deadline),
        }
    }

    /// Open check plus the optional ping query for long-unused connections.
    /// A failed ping closes the physical connection.
    fn ping(config: &PoolConfig, slot: &Slot) -> bool {
        let mut conn = slot.physical.conn.lock();
        let open = match conn.is_closed() {
            Ok(closed) => !closed,
            Err(e) => {
                tracing::debug!(target: "pool", physical_id = slot.physical.id, error = %e, "connection is bad");
                false
            }
        };
        if !open
            || !config.ping_enabled
            || slot.time_since_last_use(Instant::now()) <= config.ping_not_used_for
        {
            return open;
        }

        tracing::debug!(target: "pool", physical_id = slot.physical.id, "testing connection");
        let result = conn.execute(&config.ping_query).and_then(|_| {
            if !conn.auto_commit()? {
                conn.rollback()?;
            }
            Ok(())
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(target: "pool", query = %config.ping_query, error = %e, "execution of ping query failed");
                if let Err(e) = conn.close() {
                    tracing::debug!(target: "pool", physical_id = slot.physical.id, error = %e, "could not close connection after failed ping");
                }
                false
            }
        }
    }

    /// Takes a wrapper back from its holder.
    pub(crate) fn push_connection(&self, wrapper_id: u64) {
        let mut shared = self.shared.lock();
        let position = shared.state.active.iter().position(|s| s.id == wrapper_id);
        let Some(slot) = position.and_then(|i| shared.state.active.remove(i)) else {
            // reclaimed as overdue or force-closed while checked out
            tracing::debug!(target: "pool", wrapper_id, "a bad connection attempted to return to the pool");
            shared.state.bad_connection_count += 1;
            return;
        };

        if !(slot.is_valid() && Self::ping(&shared.config, &slot)) {
            tracing::debug!(target: "pool", physical_id = slot.physical.id, "discarding bad connection on return");
            slot.invalidate();
            slot.physical.close_quietly();
            shared.state.bad_connection_count += 1;
            self.available.notify_one();
            return;
        }

        let now = Instant::now();
        shared.state.accumulated_checkout_time += slot.checkout_time(now);
        let rolled_back = slot.physical.rollback_if_needed().is_ok();
        let keep = rolled_back
            && shared.state.idle.len() < shared.config.max_idle
            && slot.type_code == shared.expected_type_code;

        if keep {
            let idle = slot.rewrap(self.next_wrapper_id());
            slot.invalidate();
            tracing::debug!(target: "pool", physical_id = idle.physical.id, "returned connection to pool");
            shared.state.idle.push_back(idle);
        } else {
            slot.invalidate();
            slot.physical.close_quietly();
            tracing::debug!(target: "pool", physical_id = slot.physical.id, "closed connection");
        }
        self.available.notify_one();
    }

    /// Detaches every connection and invalidates its wrapper. The caller
    /// closes the returned slots after releasing the pool lock.
    fn take_all_locked(&self, shared: &mut Shared) -> Vec<Slot> {
        shared.refresh_type_code();
        shared.generation = shared.generation.wrapping_add(1);
        let slots: Vec<Slot> = shared
            .state
            .active
            .drain(..)
            .rev()
            .chain(shared.state.idle.drain(..).rev())
            .collect();
        for slot in &slots {
            slot.invalidate();
        }
        slots
    }

    fn close_slots(slots: Vec<Slot>) {
        for slot in &slots {
            slot.physical.close_quietly();
        }
        tracing::debug!(target: "pool", closed = slots.len(), "forcefully closed/removed all connections");
    }
}

/// Pooled [`DataSource`] over an [`UnpooledDataSource`].
///
/// ```rust
/// use batis_core::datasource::{Connection, DriverSettings, MemoryDriver, PooledDataSource};
/// use std::sync::Arc;
///
/// let pool = PooledDataSource::new(Arc::new(MemoryDriver::new()), DriverSettings::new("mem://db"));
/// let mut conn = pool.connection().unwrap();
/// conn.execute("SELECT 1").unwrap();
/// conn.close().unwrap();
/// assert_eq!(pool.status().idle_connections, 1);
/// ```
pub struct PooledDataSource {
    inner: Arc<PoolInner>,
}

impl PooledDataSource {
    /// Pool with default limits.
    pub fn new(driver: Arc<dyn Driver>, settings: DriverSettings) -> Self {
        Self::assemble(UnpooledDataSource::new(driver, settings), PoolConfig::default())
    }

    pub fn with_config(
        driver: Arc<dyn Driver>,
        settings: DriverSettings,
        config: PoolConfig,
    ) -> BatisResult<Self> {
        Self::from_unpooled(UnpooledDataSource::new(driver, settings), config)
    }

    pub fn from_unpooled(source: UnpooledDataSource, config: PoolConfig) -> BatisResult<Self> {
        config.validate()?;
        Ok(Self::assemble(source, config))
    }

    fn assemble(source: UnpooledDataSource, config: PoolConfig) -> Self {
        let mut shared = Shared {
            source,
            config,
            state: PoolState::default(),
            expected_type_code: 0,
            interrupt_epoch: 0,
            generation: 0,
        };
        shared.refresh_type_code();
        Self {
            inner: Arc::new(PoolInner {
                shared: Mutex::new(shared),
                available: Condvar::new(),
                next_wrapper_id: AtomicU64::new(0),
                next_physical_id: AtomicU64::new(0),
            }),
        }
    }

    /// Checks out a connection with explicit credentials.
    pub fn acquire(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> BatisResult<PooledConnection> {
        self.inner.pop_connection(username, password)
    }

    /// Checks out a connection with the configured credentials.
    pub fn connection(&self) -> BatisResult<PooledConnection> {
        let (username, password) = {
            let shared = self.inner.shared.lock();
            let settings = shared.source.settings();
            (settings.username.clone(), settings.password.clone())
        };
        self.acquire(username.as_deref(), password.as_deref())
    }

    pub fn status(&self) -> PoolStatus {
        let shared = self.inner.shared.lock();
        shared
            .state
            .snapshot(shared.config.max_active, shared.config.max_idle)
    }

    pub fn config(&self) -> PoolConfig {
        self.inner.shared.lock().config.clone()
    }

    pub fn settings(&self) -> DriverSettings {
        self.inner.shared.lock().source.settings().clone()
    }

    /// Invalidates and closes every active and idle connection. Counters
    /// are kept.
    pub fn force_close_all(&self) {
        let slots = {
            let mut shared = self.inner.shared.lock();
            self.inner.take_all_locked(&mut shared)
        };
        self.inner.available.notify_all();
        PoolInner::close_slots(slots);
    }

    /// Wakes every blocked `acquire`, which then fails with
    /// [`BatisError::Interrupted`].
    pub fn interrupt_waiters(&self) {
        let mut shared = self.inner.shared.lock();
        shared.interrupt_epoch = shared.interrupt_epoch.wrapping_add(1);
        drop(shared);
        self.inner.available.notify_all();
    }

    /// Applies a change to the limits and/or driver settings. On success the
    /// counters are reset and every pooled connection is closed.
    fn reconfigure(
        &self,
        apply: impl FnOnce(&mut PoolConfig, &mut DriverSettings),
    ) -> BatisResult<()> {
        let mut shared = self.inner.shared.lock();
        let mut config = shared.config.clone();
        let mut settings = shared.source.settings().clone();
        apply(&mut config, &mut settings);
        config.validate()?;

        shared.config = config;
        *shared.source.settings_mut() = settings;
        shared.state.reset_counters();
        let slots = self.inner.take_all_locked(&mut shared);
        drop(shared);
        self.inner.available.notify_all();
        PoolInner::close_slots(slots);
        Ok(())
    }

    pub fn set_config(&self, config: PoolConfig) -> BatisResult<()> {
        self.reconfigure(|c, _| *c = config)
    }

    pub fn set_max_active(&self, max_active: usize) -> BatisResult<()> {
        self.reconfigure(|c, _| c.max_active = max_active)
    }

    pub fn set_max_idle(&self, max_idle: usize) -> BatisResult<()> {
        self.reconfigure(|c, _| c.max_idle = max_idle)
    }

    pub fn set_max_checkout_time(&self, max_checkout_time: Duration) -> BatisResult<()> {
        self.reconfigure(|c, _| c.max_checkout_time = max_checkout_time)
    }

    pub fn set_time_to_wait(&self, time_to_wait: Duration) -> BatisResult<()> {
        self.reconfigure(|c, _| c.time_to_wait = time_to_wait)
    }

    pub fn set_bad_connection_tolerance(&self, tolerance: usize) -> BatisResult<()> {
        self.reconfigure(|c, _| c.bad_connection_tolerance = tolerance)
    }

    pub fn set_ping_enabled(&self, enabled: bool) -> BatisResult<()> {
        self.reconfigure(|c, _| c.ping_enabled = enabled)
    }

    pub fn set_ping_query(&self, query: impl Into<String>) -> BatisResult<()> {
        let query = query.into();
        self.reconfigure(|c, _| c.ping_query = query)
    }

    pub fn set_ping_not_used_for(&self, threshold: Duration) -> BatisResult<()> {
        self.reconfigure(|c, _| c.ping_not_used_for = threshold)
    }

    pub fn set_url(&self, url: impl Into<String>) -> BatisResult<()> {
        let url = url.into();
        self.reconfigure(|_, s| s.url = url)
    }

    pub fn set_username(&self, username: Option<String>) -> BatisResult<()> {
        self.reconfigure(|_, s| s.username = username)
    }

    pub fn set_password(&self, password: Option<String>) -> BatisResult<()> {
        self.reconfigure(|_, s| s.password = password)
    }

    pub fn set_driver_properties(&self, properties: HashMap<String, String>) -> BatisResult<()> {
        self.reconfigure(|_, s| s.driver_properties = properties)
    }

    pub fn set_default_auto_commit(&self, auto_commit: Option<bool>) -> BatisResult<()> {
        self.reconfigure(|_, s| s.auto_commit = auto_commit)
    }

    pub fn set_default_isolation(&self, level: Option<IsolationLevel>) -> BatisResult<()> {
        self.reconfigure(|_, s| s.default_isolation = level)
    }

    pub fn set_default_network_timeout(&self, timeout: Option<Duration>) -> BatisResult<()> {
        self.reconfigure(|_, s| s.default_network_timeout = timeout)
    }
}

impl DataSource for PooledDataSource {
    fn get_connection(&self) -> BatisResult<Box<dyn Connection>> {
        Ok(Box::new(self.connection()?))
    }

    fn get_connection_as(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> BatisResult<Box<dyn Connection>> {
        Ok(Box::new(self.acquire(username, password)?))
    }
}

impl Drop for PooledDataSource {
    fn drop(&mut self) {
        self.force_close_all();
    }
}

/// Applies one pool-level property; returns false for unknown keys.
fn apply_pool_property(config: &mut PoolConfig, key: &str, value: &str) -> BatisResult<bool> {
    let millis = |key: &str, value: &str| -> BatisResult<Duration> {
        Ok(Duration::from_millis(parse_property(key, value)?))
    };
    match key {
        "poolMaximumActiveConnections" => config.max_active = parse_property(key, value)?,
        "poolMaximumIdleConnections" => config.max_idle = parse_property(key, value)?,
        "poolMaximumCheckoutTime" => config.max_checkout_time = millis(key, value)?,
        "poolTimeToWait" => config.time_to_wait = millis(key, value)?,
        "poolMaximumLocalBadConnectionTolerance" => {
            config.bad_connection_tolerance = parse_property(key, value)?
        }
        "poolPingEnabled" => config.ping_enabled = parse_property(key, value)?,
        "poolPingQuery" => config.ping_query = value.to_string(),
        "poolPingConnectionsNotUsedFor" => config.ping_not_used_for = millis(key, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

/// Factory owning one [`PooledDataSource`]; properties reconfigure it.
pub struct PooledDataSourceFactory {
    pool: Arc<PooledDataSource>,
}

impl PooledDataSourceFactory {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            pool: Arc::new(PooledDataSource::new(driver, DriverSettings::default())),
        }
    }

    pub fn pool(&self) -> Arc<PooledDataSource> {
        self.pool.clone()
    }
}

impl DataSourceFactory for PooledDataSourceFactory {
    fn set_properties(&mut self, properties: &HashMap<String, String>) -> BatisResult<()> {
        let mut config = self.pool.config();
        let mut settings = self.pool.settings();
        for (key, value) in properties {
            if !apply_driver_property(&mut settings, key, value)?
                && !apply_pool_property(&mut config, key, value)?
            {
                return Err(BatisError::Config(format!(
                    "unknown data source property: {key}"
                )));
            }
        }
        self.pool.reconfigure(|c, s| {
            *c = config;
            *s = settings;
        })
    }

    fn data_source(&self) -> Arc<dyn DataSource> {
        self.pool.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MemoryDriver;
    use std::thread;

    fn pool_with(config: PoolConfig) -> (MemoryDriver, PooledDataSource) {
        let driver = MemoryDriver::new();
        let pool = PooledDataSource::with_config(
            Arc::new(driver.clone()),
            DriverSettings::new("mem://pool").credentials("app", "secret"),
            config,
        )
        .unwrap();
        (driver, pool)
    }

    fn small_config() -> PoolConfig {
        PoolConfig {
            max_active: 2,
            max_idle: 2,
            max_checkout_time: Duration::from_secs(60),
            time_to_wait: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[test]
    fn reuses_returned_connection() {
        let (driver, pool) = pool_with(small_config());
        let mut conn = pool.connection().unwrap();
        let physical = conn.physical_id();
        let first_wrapper = conn.id();
        conn.close().unwrap();

        let conn = pool.connection().unwrap();
        assert_eq!(conn.physical_id(), physical);
        assert_ne!(conn.id(), first_wrapper);
        assert_eq!(driver.opened(), 1);
        assert_eq!(pool.status().request_count, 2);
    }

    #[test]
    fn returned_wrapper_is_closed() {
        let (_, pool) = pool_with(small_config());
        let mut conn = pool.connection().unwrap();
        conn.close().unwrap();
        assert!(matches!(conn.execute("SELECT 1"), Err(BatisError::ConnectionClosed)));
        assert!(matches!(conn.is_closed(), Err(BatisError::ConnectionClosed)));
        // idempotent
        conn.close().unwrap();
        assert_eq!(pool.status().bad_connection_count, 0);
    }

    #[test]
    fn drop_returns_connection() {
        let (_, pool) = pool_with(small_config());
        {
            let _conn = pool.connection().unwrap();
            assert_eq!(pool.status().active_connections, 1);
        }
        let status = pool.status();
        assert_eq!(status.active_connections, 0);
        assert_eq!(status.idle_connections, 1);
    }

    // Idle connections are handed out oldest-returned first (FIFO). This
    // pins the current fairness policy rather than a required invariant.
    #[test]
    fn idle_list_is_fifo() {
        let (_, pool) = pool_with(small_config());
        let mut a = pool.connection().unwrap();
        let mut b = pool.connection().unwrap();
        let (pa, pb) = (a.physical_id(), b.physical_id());
        a.close().unwrap();
        b.close().unwrap();

        let first = pool.connection().unwrap();
        let second = pool.connection().unwrap();
        assert_eq!(first.physical_id(), pa);
        assert_eq!(second.physical_id(), pb);
    }

    #[test]
    fn idle_overflow_closes_connection() {
        let (driver, pool) = pool_with(PoolConfig {
            max_idle: 1,
            ..small_config()
        });
        let mut a = pool.connection().unwrap();
        let mut b = pool.connection().unwrap();
        a.close().unwrap();
        b.close().unwrap();

        let status = pool.status();
        assert_eq!(status.idle_connections, 1);
        assert_eq!(driver.closed(), 1);
    }

    #[test]
    fn times_out_when_saturated() {
        let (_, pool) = pool_with(PoolConfig {
            max_active: 1,
            ..small_config()
        });
        let _held = pool.connection().unwrap();

        let started = Instant::now();
        let err = pool.connection().unwrap_err();
        let blocked = started.elapsed();
        assert!(matches!(err, BatisError::PoolTimeout { .. }));
        assert!(blocked >= Duration::from_millis(100));

        let status = pool.status();
        assert_eq!(status.had_to_wait_count, 1);
        assert!(status.accumulated_wait_time >= Duration::from_millis(100));
        assert_eq!(status.active_connections, 1);
    }

    #[test]
    fn waiter_gets_returned_connection() {
        let (_, pool) = pool_with(PoolConfig {
            max_active: 1,
            time_to_wait: Duration::from_secs(5),
            ..small_config()
        });
        let pool = Arc::new(pool);
        let held = pool.connection().unwrap();
        let physical = held.physical_id();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.connection().map(|c| c.physical_id()))
        };
        thread::sleep(Duration::from_millis(30));
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), physical);
        assert_eq!(pool.status().had_to_wait_count, 1);
    }

    #[test]
    fn reclaims_overdue_connection() {
        let (driver, pool) = pool_with(PoolConfig {
            max_active: 1,
            max_checkout_time: Duration::from_millis(20),
            time_to_wait: Duration::from_secs(2),
            ..small_config()
        });
        let mut stale = pool.connection().unwrap();
        let created = stale.created_at();
        thread::sleep(Duration::from_millis(40));

        let fresh = pool.connection().unwrap();
        assert_eq!(fresh.physical_id(), stale.physical_id());
        assert_eq!(fresh.created_at(), created);
        assert!(!stale.is_valid());
        assert!(fresh.is_valid());
        assert!(matches!(stale.execute("SELECT 1"), Err(BatisError::ConnectionClosed)));

        let status = pool.status();
        assert_eq!(status.claimed_overdue_count, 1);
        assert!(status.accumulated_overdue_checkout_time >= Duration::from_millis(20));
        assert_eq!(driver.opened(), 1);

        // the stale holder giving it back only counts as a bad return
        stale.close().unwrap();
        assert_eq!(pool.status().bad_connection_count, 1);
        assert_eq!(pool.status().active_connections, 1);
    }

    /// Holder busy in an 800ms query while its connection goes overdue.
    fn busy_overdue_holder() -> (
        MemoryDriver,
        Arc<PooledDataSource>,
        thread::JoinHandle<PooledConnection>,
    ) {
        let (driver, pool) = pool_with(PoolConfig {
            max_active: 1,
            max_checkout_time: Duration::from_millis(20),
            time_to_wait: Duration::from_secs(5),
            ..small_config()
        });
        driver.on_query(|sql, _| {
            if sql.contains("pg_sleep") {
                thread::sleep(Duration::from_millis(800));
            }
            Ok(Vec::new())
        });
        let pool = Arc::new(pool);
        let mut stale = pool.connection().unwrap();
        let holder = thread::spawn(move || {
            let _ = stale.query("SELECT pg_sleep(0.8)", &[]);
            stale
        });
        thread::sleep(Duration::from_millis(50));
        (driver, pool, holder)
    }

    #[test]
    fn status_stays_responsive_while_overdue_holder_is_busy() {
        let (_, pool, holder) = busy_overdue_holder();
        let stale_physical = {
            let shared = pool.inner.shared.lock();
            shared.state.active.front().map(|s| s.physical.id)
        };
        let reclaimer = {
            let pool = pool.clone();
            thread::spawn(move || pool.connection().map(|c| c.physical_id()))
        };
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let status = pool.status();
        let config = pool.config();
        assert!(started.elapsed() < Duration::from_millis(200), "status() blocked on the busy holder");
        assert!(status.active_connections <= 1);
        assert_eq!(config.max_active, 1);

        assert_eq!(reclaimer.join().unwrap().ok(), stale_physical);
        drop(holder.join().unwrap());
        assert_eq!(pool.status().claimed_overdue_count, 1);
    }

    #[test]
    fn force_close_all_does_not_wait_for_busy_holder() {
        let (driver, pool, holder) = busy_overdue_holder();
        let reclaimer = {
            let pool = pool.clone();
            thread::spawn(move || pool.connection().map(|c| c.physical_id()))
        };
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        pool.force_close_all();
        assert!(started.elapsed() < Duration::from_millis(200));

        // the reclaimed connection was torn down meanwhile; a new one is opened
        let physical = reclaimer.join().unwrap().unwrap();
        assert_eq!(physical, 2);
        assert_eq!(driver.opened(), 2);
        assert_eq!(pool.status().bad_connection_count, 0);
        drop(holder.join().unwrap());
    }

    #[test]
    fn unbounded_checkout_time_never_reclaims() {
        let (_, pool) = pool_with(PoolConfig {
            max_active: 1,
            max_checkout_time: Duration::MAX,
            time_to_wait: Duration::from_millis(30),
            ..small_config()
        });
        let _held = pool.connection().unwrap();
        assert!(matches!(pool.connection(), Err(BatisError::PoolTimeout { .. })));
        assert_eq!(pool.status().claimed_overdue_count, 0);
    }

    #[test]
    fn unbounded_time_to_wait_waits_for_return() {
        let (_, pool) = pool_with(PoolConfig {
            max_active: 1,
            max_checkout_time: Duration::MAX,
            time_to_wait: Duration::MAX,
            ..small_config()
        });
        let pool = Arc::new(pool);
        let held = pool.connection().unwrap();
        let physical = held.physical_id();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.connection().map(|c| c.physical_id()))
        };
        thread::sleep(Duration::from_millis(30));
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), physical);
        assert_eq!(pool.status().had_to_wait_count, 1);
    }

    #[test]
    fn waiter_wakes_when_active_becomes_overdue() {
        let (_, pool) = pool_with(PoolConfig {
            max_active: 1,
            max_checkout_time: Duration::from_millis(30),
            time_to_wait: Duration::from_secs(5),
            ..small_config()
        });
        let _held = pool.connection().unwrap();
        let started = Instant::now();
        let claimed = pool.connection().unwrap();
        assert!(claimed.is_valid());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(pool.status().had_to_wait_count, 1);
    }

    #[test]
    fn reclaim_rolls_back_open_transaction() {
        let driver = MemoryDriver::new().with_auto_commit(false);
        let pool = PooledDataSource::with_config(
            Arc::new(driver.clone()),
            DriverSettings::new("mem://pool"),
            PoolConfig {
                max_active: 1,
                max_checkout_time: Duration::ZERO,
                ..small_config()
            },
        )
        .unwrap();
        let _stale = pool.connection().unwrap();
        let before = driver.rollbacks();
        thread::sleep(Duration::from_millis(2));
        let _fresh = pool.connection().unwrap();
        assert!(driver.rollbacks() > before);
    }

    #[test]
    fn dead_idle_connections_are_replaced() {
        let (driver, pool) = pool_with(small_config());
        drop(pool.connection().unwrap());
        driver.kill_all();

        let conn = pool.connection().unwrap();
        assert!(conn.is_valid());
        assert_eq!(driver.opened(), 2);
        assert_eq!(pool.status().bad_connection_count, 1);
    }

    #[test]
    fn ping_failure_discards_connection() {
        let (driver, pool) = pool_with(PoolConfig {
            ping_enabled: true,
            ping_query: "SELECT 1".to_string(),
            ping_not_used_for: Duration::ZERO,
            ..small_config()
        });
        drop(pool.connection().unwrap());
        thread::sleep(Duration::from_millis(2));
        driver.set_fail_execute(true);

        // every candidate fails its ping: 1 idle + new ones up to the limit
        let err = pool.connection().unwrap_err();
        assert!(matches!(err, BatisError::ConnectionAcquisition(_)));
        let status = pool.status();
        assert_eq!(status.bad_connection_count as usize, 2 + 3 + 1);
        assert_eq!(status.active_connections, 0);
    }

    #[test]
    fn failed_ping_closes_physical_connection() {
        let (driver, pool) = pool_with(PoolConfig {
            ping_enabled: true,
            ping_query: "SELECT 1".to_string(),
            ping_not_used_for: Duration::ZERO,
            ..small_config()
        });
        drop(pool.connection().unwrap());
        thread::sleep(Duration::from_millis(2));
        driver.set_fail_execute(true);

        assert!(pool.connection().is_err());
        assert_eq!(driver.opened(), driver.closed());
        assert_eq!(pool.status().idle_connections, 0);
    }

    #[test]
    fn ping_runs_configured_query() {
        let (driver, pool) = pool_with(PoolConfig {
            ping_enabled: true,
            ping_query: "SELECT 1 FROM DUAL".to_string(),
            ping_not_used_for: Duration::ZERO,
            ..small_config()
        });
        drop(pool.connection().unwrap());
        thread::sleep(Duration::from_millis(2));
        drop(pool.connection().unwrap());
        assert!(
            driver
                .statements()
                .iter()
                .any(|s| s.sql == "SELECT 1 FROM DUAL")
        );
    }

    #[test]
    fn foreign_credentials_are_not_pooled() {
        let (driver, pool) = pool_with(small_config());
        let mut conn = pool.acquire(Some("other"), Some("pw")).unwrap();
        conn.close().unwrap();
        assert_eq!(pool.status().idle_connections, 0);
        assert_eq!(driver.closed(), 1);
    }

    #[test]
    fn force_close_all_invalidates_everything() {
        let (driver, pool) = pool_with(small_config());
        let held = pool.connection().unwrap();
        drop(pool.connection().unwrap());

        pool.force_close_all();
        let status = pool.status();
        assert_eq!(status.active_connections, 0);
        assert_eq!(status.idle_connections, 0);
        assert!(!held.is_valid());
        assert_eq!(driver.closed(), 2);
        // counters survive
        assert_eq!(status.request_count, 2);
    }

    #[test]
    fn setters_close_connections_and_reset_counters() {
        let (driver, pool) = pool_with(small_config());
        let held = pool.connection().unwrap();
        pool.set_max_idle(1).unwrap();

        assert!(!held.is_valid());
        assert_eq!(driver.closed(), 1);
        let status = pool.status();
        assert_eq!(status.request_count, 0);
        assert_eq!(status.max_idle, 1);

        assert!(matches!(pool.set_max_active(0), Err(BatisError::Config(_))));
        assert_eq!(pool.config().max_active, 2);
    }

    #[test]
    fn changed_credentials_discard_old_connections() {
        let (driver, pool) = pool_with(small_config());
        let mut conn = pool.connection().unwrap();
        pool.set_password(Some("rotated".to_string())).unwrap();
        conn.close().unwrap();

        let conn = pool.connection().unwrap();
        assert_eq!(driver.opened(), 2);
        assert_eq!(driver.last_properties()["password"], "rotated");
        drop(conn);
        assert_eq!(pool.status().idle_connections, 1);
    }

    #[test]
    fn interrupt_aborts_waiters() {
        let (_, pool) = pool_with(PoolConfig {
            max_active: 1,
            time_to_wait: Duration::from_secs(10),
            ..small_config()
        });
        let pool = Arc::new(pool);
        let _held = pool.connection().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.connection())
        };
        thread::sleep(Duration::from_millis(30));
        pool.interrupt_waiters();

        assert!(matches!(
            waiter.join().unwrap(),
            Err(BatisError::Interrupted)
        ));
        assert_eq!(pool.status().active_connections, 1);
    }

    #[test]
    fn factory_maps_pool_properties() {
        let driver = MemoryDriver::new();
        let mut factory = PooledDataSourceFactory::new(Arc::new(driver.clone()));
        let props: HashMap<String, String> = [
            ("url", "mem://factory"),
            ("poolMaximumActiveConnections", "4"),
            ("poolTimeToWait", "150"),
            ("poolPingEnabled", "true"),
            ("poolPingQuery", "SELECT 1"),
            ("driver.ssl", "on"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        factory.set_properties(&props).unwrap();

        let config = factory.pool().config();
        assert_eq!(config.max_active, 4);
        assert_eq!(config.time_to_wait, Duration::from_millis(150));
        assert!(config.ping_enabled);

        let conn = factory.data_source().get_connection().unwrap();
        assert!(!conn.is_closed().unwrap());
        assert_eq!(driver.last_properties()["ssl"], "on");
    }

    #[test]
    fn factory_rejects_bad_properties() {
        let mut factory = PooledDataSourceFactory::new(Arc::new(MemoryDriver::new()));
        let unknown = HashMap::from([("poolSize".to_string(), "1".to_string())]);
        assert!(factory.set_properties(&unknown).is_err());
        let malformed = HashMap::from([(
            "poolMaximumActiveConnections".to_string(),
            "many".to_string(),
        )]);
        assert!(matches!(
            factory.set_properties(&malformed),
            Err(BatisError::Config(_))
        ));
    }

    #[test]
    fn connect_failure_surfaces() {
        let (driver, pool) = pool_with(small_config());
        driver.set_fail_connect(true);
        assert!(matches!(pool.connection(), Err(BatisError::Connection(_))));
        assert_eq!(pool.status().active_connections, 0);
    }
}
