//! The connection pool handing out rewriting connections.
//!
//! Conventional Redis-pool semantics: a dial callback, an optional
//! test-on-borrow predicate, a bounded idle list reused LIFO, an optional
//! active-connection ceiling that either queues or fails fast, and staleness
//! checks (idle timeout, maximum lifetime) applied at borrow time rather
//! than by a background reaper.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::conn::RewritingConn;
use crate::error::{Error, Result};
use crate::rewriter::Rewriter;
use crate::wire::WireConn;

pub type DialFn = Arc<dyn Fn() -> BoxFuture<'static, Result<WireConn>> + Send + Sync>;

/// Borrow-time health check; returns false to discard the idle connection.
/// The duration is the time the connection spent idle.
pub type TestOnBorrowFn = Arc<dyn Fn(&RewritingConn, Duration) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct PoolConfig {
    pub dial: Option<DialFn>,
    pub test_on_borrow: Option<TestOnBorrowFn>,
    /// Idle connections kept for reuse; 0 disables recycling.
    pub max_idle: usize,
    /// Maximum connections handed out at once; 0 means unbounded.
    pub max_active: usize,
    pub idle_timeout: Option<Duration>,
    /// When the pool is at `max_active`: queue (`true`) or fail fast.
    pub wait: bool,
    pub max_conn_lifetime: Option<Duration>,
}

impl PoolConfig {
    pub fn new(dial: DialFn) -> Self {
        PoolConfig {
            dial: Some(dial),
            ..PoolConfig::default()
        }
    }

    /// A config dialling `addr` over TCP.
    pub fn for_addr(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let dial: DialFn = Arc::new(move || {
            let addr = addr.clone();
            Box::pin(async move { WireConn::connect(&addr).await })
        });
        PoolConfig::new(dial)
    }

    pub fn copy_from(&mut self, other: &PoolConfig) {
        self.dial = other.dial.clone();
        self.test_on_borrow = other.test_on_borrow.clone();
        self.max_idle = other.max_idle;
        self.max_active = other.max_active;
        self.idle_timeout = other.idle_timeout;
        self.wait = other.wait;
        self.max_conn_lifetime = other.max_conn_lifetime;
    }

    /// Overlays every non-default field of `other` onto `self`.
    pub fn merge(&mut self, other: &PoolConfig) -> &mut Self {
        if other.dial.is_some() {
            self.dial = other.dial.clone();
        }
        if other.test_on_borrow.is_some() {
            self.test_on_borrow = other.test_on_borrow.clone();
        }
        if other.max_idle != 0 {
            self.max_idle = other.max_idle;
        }
        if other.max_active != 0 {
            self.max_active = other.max_active;
        }
        if other.idle_timeout.is_some() {
            self.idle_timeout = other.idle_timeout;
        }
        if other.wait {
            self.wait = other.wait;
        }
        if other.max_conn_lifetime.is_some() {
            self.max_conn_lifetime = other.max_conn_lifetime;
        }
        self
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max_idle", &self.max_idle)
            .field("max_active", &self.max_active)
            .field("idle_timeout", &self.idle_timeout)
            .field("wait", &self.wait)
            .field("max_conn_lifetime", &self.max_conn_lifetime)
            .finish_non_exhaustive()
    }
}

struct IdleEntry {
    conn: RewritingConn,
    created_at: Instant,
    returned_at: Instant,
}

struct PoolInner {
    rewriter: Rewriter,
    dial: DialFn,
    test_on_borrow: Option<TestOnBorrowFn>,
    max_idle: usize,
    idle_timeout: Option<Duration>,
    max_conn_lifetime: Option<Duration>,
    wait: bool,
    semaphore: Option<Arc<Semaphore>>,
    idle: Mutex<Vec<IdleEntry>>,
    closed: AtomicBool,
}

/// A pool of rewriting connections to one backend. Cheap to clone.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    pub(crate) fn new(rewriter: Rewriter, config: &PoolConfig) -> Result<Self> {
        let dial = config.dial.clone().ok_or(Error::NoDialFunction)?;
        let semaphore = if config.max_active > 0 {
            Some(Arc::new(Semaphore::new(config.max_active)))
        } else {
            None
        };
        Ok(Pool {
            inner: Arc::new(PoolInner {
                rewriter,
                dial,
                test_on_borrow: config.test_on_borrow.clone(),
                max_idle: config.max_idle,
                idle_timeout: config.idle_timeout,
                max_conn_lifetime: config.max_conn_lifetime,
                wait: config.wait,
                semaphore,
                idle: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Borrows a connection, reusing an idle one when possible and dialling
    /// otherwise. Respects `token` while queueing for a slot.
    pub async fn get(&self, token: &CancellationToken) -> Result<PooledConn> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }

        let permit = match &self.inner.semaphore {
            Some(semaphore) if self.inner.wait => {
                tokio::select! {
                    _ = token.cancelled() => return Err(Error::Cancelled),
                    permit = semaphore.clone().acquire_owned() => {
                        Some(permit.map_err(|_| Error::PoolClosed)?)
                    }
                }
            }
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .try_acquire_owned()
                    .map_err(|_| Error::PoolExhausted)?,
            ),
            None => None,
        };

        loop {
            let entry = self.inner.idle.lock().pop();
            let Some(entry) = entry else { break };
            if self.is_stale(&entry) {
                debug!("discarding stale idle connection");
                continue;
            }
            if let Some(test) = &self.inner.test_on_borrow {
                if !test(&entry.conn, entry.returned_at.elapsed()) {
                    continue;
                }
            }
            return Ok(PooledConn {
                conn: Some(entry.conn),
                created_at: entry.created_at,
                _permit: permit,
                pool: self.clone(),
            });
        }

        let wire = (self.inner.dial)().await?;
        let conn = RewritingConn::new(self.inner.rewriter.clone(), wire);
        Ok(PooledConn {
            conn: Some(conn),
            created_at: Instant::now(),
            _permit: permit,
            pool: self.clone(),
        })
    }

    fn is_stale(&self, entry: &IdleEntry) -> bool {
        if entry.conn.err().is_some() {
            return true;
        }
        if let Some(idle_timeout) = self.inner.idle_timeout {
            if entry.returned_at.elapsed() > idle_timeout {
                return true;
            }
        }
        if let Some(lifetime) = self.inner.max_conn_lifetime {
            if entry.created_at.elapsed() > lifetime {
                return true;
            }
        }
        false
    }

    /// Closes the pool: idle connections are dropped and later borrows fail.
    /// Connections already handed out are unaffected until returned.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.idle.lock().clear();
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle_count())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A borrowed connection. Dereferences to [`RewritingConn`]; call
/// [`PooledConn::close`] to hand it back (healthy connections are recycled,
/// broken ones dropped). Dropping without closing discards the connection.
pub struct PooledConn {
    conn: Option<RewritingConn>,
    created_at: Instant,
    _permit: Option<OwnedSemaphorePermit>,
    pool: Pool,
}

impl PooledConn {
    pub async fn close(mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let over_lifetime = self
            .pool
            .inner
            .max_conn_lifetime
            .is_some_and(|lifetime| self.created_at.elapsed() > lifetime);
        let recyclable = conn.err().is_none()
            && !over_lifetime
            && conn.pending() == 0
            && !self.pool.inner.closed.load(Ordering::Acquire);

        if recyclable {
            let mut idle = self.pool.inner.idle.lock();
            if idle.len() < self.pool.inner.max_idle {
                idle.push(IdleEntry {
                    conn,
                    created_at: self.created_at,
                    returned_at: Instant::now(),
                });
                return Ok(());
            }
        }

        conn.close().await
    }
}

impl Deref for PooledConn {
    type Target = RewritingConn;

    fn deref(&self) -> &RewritingConn {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut RewritingConn {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl std::fmt::Debug for PooledConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}
