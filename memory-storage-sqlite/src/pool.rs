//! Connection Pool (C1): a bounded LIFO pool of `libsql` handles per
//! database, with overflow, health-checked reuse and graceful close.
//!
//! Grounded on the teacher's `pool/caching_pool.rs` (LIFO `Vec` of idle
//! connections behind a `Mutex`, a guard that returns its connection on
//! drop) but deliberately without its `Drop` implementation's pointer-cast
//! back to `&CachingPool` — that trick works, but it's `unsafe` to
//! reconstruct a reference from an address, and the `libsql`-original
//! Python pool this was ported from decided the same question by scanning
//! `self._pool` for object identity (`any(c is conn for c in self._pool)`),
//! which is fragile in its own way (two structurally-equal connections
//! become indistinguishable). Here the guard holds a real
//! `Arc<ConnectionPool>` and tags its own provenance with [`HandleOrigin`]
//! at acquisition time, so release never needs to ask "whose connection is
//! this" at all.
//!
//! Checkouts beyond `pool_size` are served by opening an overflow handle
//! immediately rather than blocking a caller on a fixed-size gate; the
//! idle stack, not an admission semaphore, is what bounds how many
//! connections are ever reused. A handle popped off the idle stack is
//! probed with a trivial statement before being handed out; a handle that
//! fails the probe is discarded and a fresh one opened in its place, so
//! the pool recovers transparently from a connection lost underneath it.

use std::sync::Arc;
use std::time::Instant;

use libsql::{Connection, Database};
use parking_lot::Mutex;
use tracing::{debug, warn};

use memory_core::error::{Error, Result};

/// A pooled `libsql` connection, tagged with a monotonically increasing id
/// purely for log correlation (mirrors the teacher's stable connection-id
/// convention, used there for prepared-statement cache keys).
struct IdleConnection {
    id: u64,
    connection: Connection,
    last_used: Instant,
}

/// Whether a [`PooledHandle`] came from the idle pool or was opened as
/// overflow. Decided once, at acquisition, and never re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleOrigin {
    Pooled,
    Overflow,
}

#[derive(Debug, Default, Clone, Copy)]
struct PoolStats {
    total_created: u64,
    total_checkouts: u64,
    total_overflow: u64,
    total_closed_on_release: u64,
    total_discarded_unhealthy: u64,
}

struct PoolInner {
    idle: Vec<IdleConnection>,
    stats: PoolStats,
}

/// A bounded LIFO pool of relational-store handles, sized by
/// [`crate::config`]'s `pool_size` (mirroring [`memory_core::MemoryConfig`]'s
/// field of the same name).
pub struct ConnectionPool {
    db: Database,
    pool_size: usize,
    inner: Mutex<PoolInner>,
    next_id: std::sync::atomic::AtomicU64,
}

impl ConnectionPool {
    /// Open `db_path` and eagerly fill the pool with `pool_size` handles,
    /// each configured for write-ahead journaling, `NORMAL` durability and
    /// foreign-key enforcement.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error if the database cannot be opened or
    /// a pragma fails.
    pub async fn open(db_path: &std::path::Path, pool_size: usize) -> Result<Arc<Self>> {
        let db = libsql::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let pool = Arc::new(Self {
            db,
            pool_size,
            inner: Mutex::new(PoolInner {
                idle: Vec::with_capacity(pool_size),
                stats: PoolStats::default(),
            }),
            next_id: std::sync::atomic::AtomicU64::new(1),
        });

        for _ in 0..pool_size {
            let conn = pool.open_connection().await?;
            pool.inner.lock().idle.push(conn);
        }

        debug!(pool_size, "connection pool filled");
        Ok(pool)
    }

    async fn open_connection(&self) -> Result<IdleConnection> {
        let connection = self.db.connect().map_err(|e| Error::Storage(e.into()))?;
        apply_pragmas(&connection).await?;
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.inner.lock().stats.total_created += 1;
        Ok(IdleConnection {
            id,
            connection,
            last_used: Instant::now(),
        })
    }

    /// Acquire a handle in scoped-acquisition form: the returned
    /// [`PooledHandle`] releases itself (push-back or close) when dropped,
    /// on every exit path including panics unwinding through it.
    ///
    /// If the idle pool is empty, opens an overflow handle immediately
    /// rather than blocking; overflow handles are closed on release rather
    /// than returned. A handle popped off the idle stack is health-checked
    /// with a trivial statement first; one that fails the check is
    /// discarded and a fresh connection opened in its place, so a
    /// connection lost underneath the pool (network blip, killed process
    /// on the other end of a remote `libsql` database) never gets handed
    /// back out.
    ///
    /// # Errors
    ///
    /// Returns a storage-backend error if opening a replacement or
    /// overflow connection fails.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledHandle> {
        let popped = self.inner.lock().idle.pop();
        let (conn, origin) = match popped {
            Some(conn) if self.is_healthy(&conn.connection).await => (conn, HandleOrigin::Pooled),
            Some(stale) => {
                debug!(connection_id = stale.id, "discarding unhealthy pooled connection");
                self.inner.lock().stats.total_discarded_unhealthy += 1;
                (self.open_connection().await?, HandleOrigin::Pooled)
            }
            None => {
                self.inner.lock().stats.total_overflow += 1;
                (self.open_connection().await?, HandleOrigin::Overflow)
            }
        };

        self.inner.lock().stats.total_checkouts += 1;

        Ok(PooledHandle {
            pool: Arc::clone(self),
            connection: Some(conn),
            origin,
        })
    }

    /// Probe a connection with a trivial statement before handing it out.
    async fn is_healthy(&self, connection: &Connection) -> bool {
        connection.query("SELECT 1", ()).await.is_ok()
    }

    /// Push a returned pooled-origin connection back onto the idle stack,
    /// discarding it instead if the pool is already at capacity (can
    /// happen if `pool_size` was shrunk conceptually by a burst of
    /// overflow handles being returned — never actually possible here
    /// since overflow handles never reach this method, but checked
    /// defensively all the same).
    fn return_connection(&self, mut conn: IdleConnection) {
        conn.last_used = Instant::now();
        let mut inner = self.inner.lock();
        if inner.idle.len() < self.pool_size {
            inner.idle.push(conn);
        } else {
            inner.stats.total_closed_on_release += 1;
        }
    }

    fn discard_connection(&self, conn: IdleConnection) {
        debug!(connection_id = conn.id, "closing overflow connection");
        self.inner.lock().stats.total_closed_on_release += 1;
    }

    /// Close every pooled handle. Idempotent: calling this twice, or
    /// calling it when the pool is already empty, is not an error.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock();
        let closed = inner.idle.len();
        inner.idle.clear();
        if closed > 0 {
            debug!(closed, "closed all pooled connections");
        }
    }

    /// Number of connections currently idle in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }
}

async fn apply_pragmas(connection: &Connection) -> Result<()> {
    for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA foreign_keys=ON"] {
        if let Err(e) = connection.execute(pragma, ()).await {
            warn!(pragma, error = %e, "pragma failed, continuing without it");
        }
    }
    Ok(())
}

/// A checked-out connection. Returns itself to the pool (if pooled) or
/// closes itself (if overflow) when dropped — release never throws and
/// never requires the caller to do anything.
pub struct PooledHandle {
    pool: Arc<ConnectionPool>,
    connection: Option<IdleConnection>,
    origin: HandleOrigin,
}

impl PooledHandle {
    /// The underlying `libsql` connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection.as_ref().expect("connection present until drop").connection
    }
}

impl Drop for PooledHandle {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            match self.origin {
                HandleOrigin::Pooled => self.pool.return_connection(conn),
                HandleOrigin::Overflow => self.pool.discard_connection(conn),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_reuses_pooled_connections_lifo() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("test.db"), 2).await.unwrap();
        assert_eq!(pool.idle_count(), 2);

        {
            let _handle = pool.acquire().await.unwrap();
            assert_eq!(pool.idle_count(), 1);
        }
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn overflow_handle_is_closed_rather_than_returned() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("test.db"), 1).await.unwrap();

        let first = pool.acquire().await.unwrap();
        assert_eq!(pool.idle_count(), 0);

        let second = pool.acquire().await.unwrap();
        assert_eq!(pool.idle_count(), 0);

        drop(second);
        assert_eq!(pool.idle_count(), 0, "overflow handle must not be pooled on release");

        drop(first);
        assert_eq!(pool.idle_count(), 1, "pooled handle returns on release");
    }

    #[tokio::test]
    async fn close_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("test.db"), 3).await.unwrap();
        pool.close_all();
        pool.close_all();
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn acquired_connection_executes_queries() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("test.db"), 1).await.unwrap();
        let handle = pool.acquire().await.unwrap();
        handle.connection().query("SELECT 1", ()).await.unwrap();
    }
}
