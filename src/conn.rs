//! The rewriting connection.
//!
//! Wraps one wire connection and preserves the Redis send / flush / receive
//! pipelining discipline across one-to-many command expansions: every
//! accepted `send` pushes exactly one slot onto a FIFO, and every `receive`
//! pops the head slot, reads exactly the number of raw replies that slot's
//! plan emitted, and reduces them to one reply.
//!
//! A connection is driven by a single logical caller; it is not internally
//! synchronised. The first wire-level failure latches: the wire is torn
//! down and every later operation returns the stored error.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::args::Arg;
use crate::error::{Error, Result};
use crate::rewriter::Rewriter;
use crate::transform::{Reply, SendPlan, Slot};
use crate::wire::{RespValue, WireConn};

pub struct RewritingConn {
    wire: Option<WireConn>,
    slots: VecDeque<Slot>,
    err: Option<Error>,
    rewriter: Rewriter,
}

impl RewritingConn {
    pub fn new(rewriter: Rewriter, wire: WireConn) -> Self {
        RewritingConn {
            wire: Some(wire),
            slots: VecDeque::new(),
            err: None,
            rewriter,
        }
    }

    /// Rewrites the command and appends the resulting backend commands to
    /// the output buffer. Rewrite failures (unknown command, parse errors,
    /// unsupported semantics) leave the connection usable; wire failures are
    /// fatal.
    pub async fn send(&mut self, name: &str, args: &[Arg]) -> Result<()> {
        self.check_usable()?;

        let rewriter = self.rewriter.clone();
        let plan = rewriter.rewrite(name, args).await?;
        self.send_plan(plan)
    }

    /// Applies an already-built plan. This is the synchronous tail of
    /// [`RewritingConn::send`]; internal callers that construct their plans
    /// directly (the resolver's probes, the sub-pool's unwrap) use it to
    /// stay off the rewrite path.
    pub(crate) fn send_plan(&mut self, plan: SendPlan) -> Result<()> {
        self.check_usable()?;
        let wire = self.wire.as_mut().expect("checked usable");
        match plan.apply(wire) {
            Ok(slot) => {
                self.slots.push_back(slot);
                Ok(())
            }
            Err(err) => Err(self.fatal(err)),
        }
    }

    /// Flushes buffered commands to the backend.
    pub async fn flush(&mut self) -> Result<()> {
        self.check_usable()?;
        let wire = self.wire.as_mut().expect("checked usable");
        match wire.flush().await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fatal(err)),
        }
    }

    /// Pops the head slot, reads its raw replies and reduces them.
    pub async fn receive(&mut self) -> Result<Reply> {
        self.receive_inner(None).await
    }

    /// Like [`RewritingConn::receive`] with an overall deadline across the
    /// slot's raw replies.
    pub async fn receive_timeout(&mut self, timeout: Duration) -> Result<Reply> {
        self.receive_inner(Some(timeout)).await
    }

    async fn receive_inner(&mut self, timeout: Option<Duration>) -> Result<Reply> {
        self.check_usable()?;
        let slot = self
            .slots
            .pop_front()
            .ok_or_else(|| Error::protocol("receive called with no pending replies"))?;

        let replies = match self.read_raw_replies(slot.replies_count, timeout).await {
            Ok(replies) => replies,
            Err(err) => return Err(self.fatal(err)),
        };

        match slot.reduce.apply(replies) {
            Ok(reply) => Ok(reply),
            Err(err) => Err(self.fatal(err)),
        }
    }

    /// Sends a command, flushes, drains every previously pipelined reply and
    /// returns the just-issued command's reduced reply. With an empty name
    /// only the flush-and-drain happens.
    pub async fn do_cmd(&mut self, name: &str, args: &[Arg]) -> Result<Reply> {
        self.do_inner(None, name, args).await
    }

    pub async fn do_cmd_timeout(
        &mut self,
        timeout: Duration,
        name: &str,
        args: &[Arg],
    ) -> Result<Reply> {
        self.do_inner(Some(timeout), name, args).await
    }

    async fn do_inner(
        &mut self,
        timeout: Option<Duration>,
        name: &str,
        args: &[Arg],
    ) -> Result<Reply> {
        self.check_usable()?;

        let slot = if !name.is_empty() {
            let rewriter = self.rewriter.clone();
            let plan = rewriter.rewrite(name, args).await?;
            let wire = self.wire.as_mut().expect("checked usable");
            match plan.apply(wire) {
                Ok(slot) => Some(slot),
                Err(err) => return Err(self.fatal(err)),
            }
        } else {
            None
        };

        {
            let wire = self.wire.as_mut().expect("checked usable");
            if let Err(err) = wire.flush().await {
                return Err(self.fatal(err));
            }
        }

        // Discard replies of everything pipelined before this call so the
        // synchronous reply pairs with the command just issued.
        if let Err(err) = self.drain_pending(timeout).await {
            return Err(self.fatal(err));
        }

        let Some(slot) = slot else {
            return Ok(Reply::Resp(RespValue::NullBulk));
        };

        let replies = match self.read_raw_replies(slot.replies_count, timeout).await {
            Ok(replies) => replies,
            Err(err) => return Err(self.fatal(err)),
        };
        match slot.reduce.apply(replies) {
            Ok(reply) => Ok(reply),
            Err(err) => Err(self.fatal(err)),
        }
    }

    /// Closes the wire and clears pending slots. Further operations fail.
    pub async fn close(&mut self) -> Result<()> {
        match self.wire.take() {
            Some(mut wire) => {
                self.slots.clear();
                wire.close().await
            }
            None => Err(Error::ConnClosed),
        }
    }

    /// The underlying wire connection. Reads performed through it are
    /// invisible to slot tracking; only use this when no replies are
    /// pending.
    pub fn raw_conn(&mut self) -> Result<&mut WireConn> {
        self.wire.as_mut().ok_or(Error::ConnClosed)
    }

    /// The first fatal error, or `ConnClosed` after close. `None` means the
    /// connection is usable.
    pub fn err(&self) -> Option<Error> {
        if let Some(err) = &self.err {
            return Some(err.clone());
        }
        if self.wire.is_none() {
            return Some(Error::ConnClosed);
        }
        None
    }

    /// Number of commands whose replies have not been received yet.
    pub fn pending(&self) -> usize {
        self.slots.len()
    }

    fn check_usable(&self) -> Result<()> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if self.wire.is_none() {
            return Err(Error::ConnClosed);
        }
        Ok(())
    }

    fn fatal(&mut self, err: Error) -> Error {
        debug!(error = %err, "rewriting connection failed");
        if self.err.is_none() {
            self.err = Some(err.clone());
        }
        self.wire = None;
        self.slots.clear();
        err
    }

    async fn read_raw_replies(
        &mut self,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<RespValue>> {
        let wire = self.wire.as_mut().expect("checked usable");
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut replies = Vec::with_capacity(count);
        for _ in 0..count {
            let reply = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    wire.receive_timeout(remaining).await?
                }
                None => wire.receive().await?,
            };
            replies.push(reply);
        }
        Ok(replies)
    }

    async fn drain_pending(&mut self, timeout: Option<Duration>) -> Result<()> {
        while let Some(slot) = self.slots.pop_front() {
            self.read_raw_replies(slot.replies_count, timeout).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RewritingConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewritingConn")
            .field("pending", &self.slots.len())
            .field("closed", &self.wire.is_none())
            .field("err", &self.err)
            .finish_non_exhaustive()
    }
}
