//! A bounded view of the primary pool reserved for the shim's own traffic.
//!
//! The resolver and the script bootstrap borrow connections through this
//! sub-pool; the semaphore caps how many primary-pool connections internal
//! work may hold at once, so resolution bursts cannot starve application
//! callers of the shared pool (and vice versa the cap keeps internal work
//! schedulable). There is no second physical pool: a sub-pool connection is
//! a primary-pool connection plus a permit.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::args::Arg;
use crate::catalog;
use crate::conn::RewritingConn;
use crate::error::{Error, Result};
use crate::pool::{Pool, PooledConn};
use crate::transform::{simple, Reply};
use crate::wire::WireConn;

const STATE_UNINITIALISED: u8 = 0;
const STATE_INITIALISING: u8 = 1;
const STATE_INITIALISED: u8 = 2;

struct Backing {
    pool: Pool,
    max_active: usize,
}

#[derive(Default)]
pub struct SubPool {
    backing: OnceCell<Backing>,
    state: AtomicU8,
    semaphore: OnceCell<Arc<Semaphore>>,
}

impl SubPool {
    /// Binds the sub-pool to its backing pool. Only the first call takes
    /// effect; the rewriter invokes this when the primary pool is created.
    pub(crate) fn set_backing(&self, pool: Pool, max_active: usize) {
        let _ = self.backing.set(Backing { pool, max_active });
    }

    /// Initialises the semaphore exactly once. Concurrent first callers
    /// spin-wait with a millisecond back-off until the winner has published
    /// it.
    async fn lazy_init(&self, max_active: usize) {
        if self.state.load(Ordering::Acquire) == STATE_INITIALISED {
            return;
        }

        if self
            .state
            .compare_exchange(
                STATE_UNINITIALISED,
                STATE_INITIALISING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            let _ = self.semaphore.set(Arc::new(Semaphore::new(max_active)));
            self.state.store(STATE_INITIALISED, Ordering::Release);
        } else {
            while self.state.load(Ordering::Acquire) != STATE_INITIALISED {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }

    /// Borrows a connection, first acquiring an internal-use permit (unless
    /// `max_active` is 0, which disables the cap).
    pub async fn get(&self, token: &CancellationToken) -> Result<SubPoolConn> {
        let backing = self.backing.get().ok_or(Error::NoPrimaryPool)?;
        self.lazy_init(backing.max_active).await;

        let permit = if backing.max_active != 0 {
            let semaphore = self.semaphore.get().expect("initialised above").clone();
            let permit = tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                permit = semaphore.acquire_owned() => {
                    permit.map_err(|_| Error::PoolClosed)?
                }
            };
            Some(permit)
        } else {
            None
        };

        let conn = backing.pool.get(token).await?;
        Ok(SubPoolConn {
            conn: Some(conn),
            _permit: permit,
        })
    }

    /// Borrows a connection and unwraps it via `UNSAFE SELF`, yielding raw
    /// access to the wire. Closing the result returns the pooled wrapper to
    /// the pool, not the socket.
    pub async fn get_raw(&self, token: &CancellationToken) -> Result<RawConn> {
        let mut conn = self.get(token).await?;
        match unwrap_self(&mut conn).await {
            Ok(Reply::SelfConn) => Ok(RawConn { conn: Some(conn) }),
            Ok(_) => {
                let _ = conn.close().await;
                Err(Error::UnsupportedSubPoolConnection)
            }
            Err(err) => {
                let _ = conn.close().await;
                Err(err)
            }
        }
    }
}

/// Issues `UNSAFE SELF`, whose plan is built synchronously so internal
/// plumbing never re-enters the rewrite path.
async fn unwrap_self(conn: &mut SubPoolConn) -> Result<Reply> {
    let descriptor = catalog::from_name("UNSAFE")?;
    let plan = simple::unsafe_cmd(descriptor, &[Arg::from("SELF")])?;
    conn.send_plan(plan)?;
    conn.flush().await?;
    conn.receive().await
}

impl std::fmt::Debug for SubPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubPool")
            .field(
                "max_active",
                &self.backing.get().map(|backing| backing.max_active),
            )
            .finish_non_exhaustive()
    }
}

/// A primary-pool connection counted against the internal-use cap. The
/// permit is released when the value is closed or dropped.
pub struct SubPoolConn {
    conn: Option<PooledConn>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl SubPoolConn {
    pub async fn close(mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

impl Deref for SubPoolConn {
    type Target = RewritingConn;

    fn deref(&self) -> &RewritingConn {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl DerefMut for SubPoolConn {
    fn deref_mut(&mut self) -> &mut RewritingConn {
        self.conn.as_mut().expect("connection already returned")
    }
}

/// Raw wire access obtained through `UNSAFE SELF`. Reads and writes on the
/// wire bypass slot tracking; the holder must leave no replies in flight
/// before closing.
pub struct RawConn {
    conn: Option<SubPoolConn>,
}

impl RawConn {
    pub fn wire(&mut self) -> Result<&mut WireConn> {
        self.conn
            .as_mut()
            .ok_or(Error::ConnClosed)?
            .raw_conn()
    }

    /// Returns the pooled wrapper to the pool.
    pub async fn close(mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}
