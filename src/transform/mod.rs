//! Command rewriting: one inbound Redis command becomes an ordered batch of
//! backend commands plus a rule for folding the backend replies into one
//! Redis-shaped reply.
//!
//! A rewrite produces a [`SendPlan`]: the commands to append to a wire
//! connection's output buffer and a [`Slot`] recording how many raw replies
//! to consume and how to reduce them. Plans and slots are plain values; the
//! connection queues slots in FIFO order to keep the pipelined reply stream
//! aligned with the commands that produced it.

use bytes::Bytes;

use crate::args::Arg;
use crate::catalog::CommandDescriptor;
use crate::error::{Error, Result};
use crate::wire::{RespValue, WireConn};

pub(crate) mod bulk;
pub(crate) mod lrem;
pub(crate) mod restore;
pub(crate) mod set;
pub(crate) mod simple;
pub(crate) mod zadd;

pub use bulk::{Aggregation, BulkConfig, KeyTypeAggregation, TypeSpecificCommands};

/// The rewrite strategy a catalog entry selects.
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    /// Forward the command untouched; one reply, returned unchanged.
    Identity,
    /// Multiplex a type-agnostic command into per-namespace variants.
    TypeSpecificBulk(&'static BulkConfig),
    Set,
    Zadd,
    Restore,
    Ping,
    Script,
    Transaction,
    Unsafe,
    Lrem,
}

/// One backend command awaiting emission.
#[derive(Debug, Clone, PartialEq)]
pub struct WireCommand {
    pub name: String,
    pub args: Vec<Arg>,
}

impl WireCommand {
    pub fn new(name: impl Into<String>, args: Vec<Arg>) -> Self {
        WireCommand {
            name: name.into(),
            args,
        }
    }
}

/// How a slot folds its raw replies into the outbound reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduce {
    /// The first reply unchanged; nil when no reply was collected.
    First,
    /// Sum of integer replies.
    Sum,
    /// The number of replies collected.
    CountOne,
    /// SETNX emulation: integer 1 becomes `OK`, anything else nil. Only the
    /// first reply is inspected; a trailing EXPIRE reply is discarded.
    SetNx,
    /// A fixed reply, ignoring whatever the backend sent.
    Static(RespValue),
    /// Always nil (dropped transaction commands).
    Nil,
    /// Marker granting raw access to the underlying wire connection.
    SelfConn,
}

impl Reduce {
    pub fn apply(self, replies: Vec<RespValue>) -> Result<Reply> {
        match self {
            Reduce::First => Ok(Reply::Resp(
                replies.into_iter().next().unwrap_or(RespValue::NullBulk),
            )),
            Reduce::Sum => {
                let mut sum = 0i64;
                for reply in &replies {
                    sum += reply.expect_integer()?;
                }
                Ok(Reply::Resp(RespValue::Integer(sum)))
            }
            Reduce::CountOne => Ok(Reply::Resp(RespValue::Integer(replies.len() as i64))),
            Reduce::SetNx => {
                let was_set = replies
                    .first()
                    .ok_or_else(|| Error::protocol("SETNX emulation received no reply"))?
                    .expect_integer()?
                    != 0;
                if was_set {
                    Ok(Reply::Resp(RespValue::ok()))
                } else {
                    Ok(Reply::Resp(RespValue::NullBulk))
                }
            }
            Reduce::Static(value) => Ok(Reply::Resp(value)),
            Reduce::Nil => Ok(Reply::Resp(RespValue::NullBulk)),
            Reduce::SelfConn => Ok(Reply::SelfConn),
        }
    }
}

/// A reduced reply handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Resp(RespValue),
    /// Produced by `UNSAFE SELF` without any wire I/O; the sub-pool converts
    /// it into raw connection access.
    SelfConn,
}

impl Reply {
    pub fn into_resp(self) -> Result<RespValue> {
        match self {
            Reply::Resp(value) => Ok(value),
            Reply::SelfConn => Err(Error::UnsupportedSubPoolConnection),
        }
    }
}

/// Reply accounting for one inbound command: how many raw replies the backend
/// owes and how to fold them.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub replies_count: usize,
    pub reduce: Reduce,
}

/// The deferred write action a transform produces. Applying a plan appends
/// its commands to the wire connection's output buffer without flushing and
/// yields the slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SendPlan {
    commands: Vec<WireCommand>,
    slot: Slot,
}

impl SendPlan {
    pub fn new(commands: Vec<WireCommand>, slot: Slot) -> Self {
        SendPlan { commands, slot }
    }

    /// A plan emitting one command with one reply.
    pub fn single(command: WireCommand, reduce: Reduce) -> Self {
        SendPlan {
            commands: vec![command],
            slot: Slot {
                replies_count: 1,
                reduce,
            },
        }
    }

    /// A plan emitting nothing, synthesizing its reply locally.
    pub fn empty(reduce: Reduce) -> Self {
        SendPlan {
            commands: Vec::new(),
            slot: Slot {
                replies_count: 0,
                reduce,
            },
        }
    }

    pub fn commands(&self) -> &[WireCommand] {
        &self.commands
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn apply(self, wire: &mut WireConn) -> Result<Slot> {
        for command in &self.commands {
            wire.send(&command.name, &command.args)?;
        }
        Ok(self.slot)
    }
}

/// The identity transform: original name, original argv, one reply returned
/// bit for bit.
pub(crate) fn identity(descriptor: &CommandDescriptor, args: &[Arg]) -> SendPlan {
    SendPlan::single(
        WireCommand::new(descriptor.name, args.to_vec()),
        Reduce::First,
    )
}

pub(crate) fn arg_from_key(key: &Bytes) -> Arg {
    Arg::Bytes(key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn identity_plan_forwards_argv_unchanged() {
        let descriptor = catalog::from_name("get").unwrap();
        let args = vec![Arg::from("foo")];
        let plan = identity(descriptor, &args);
        assert_eq!(
            plan.commands(),
            &[WireCommand::new("GET", vec![Arg::from("foo")])]
        );
        assert_eq!(plan.slot().replies_count, 1);

        // Round-trip: the reduce returns the raw reply untouched.
        let raw = RespValue::bulk("payload");
        let reduced = plan.slot().reduce.clone().apply(vec![raw.clone()]).unwrap();
        assert_eq!(reduced, Reply::Resp(raw));
    }

    #[test]
    fn sum_reduce_folds_integer_replies() {
        let reply = Reduce::Sum
            .apply(vec![RespValue::Integer(1), RespValue::Integer(2)])
            .unwrap();
        assert_eq!(reply, Reply::Resp(RespValue::Integer(3)));
    }

    #[test]
    fn first_reduce_is_nil_on_empty() {
        assert_eq!(
            Reduce::First.apply(Vec::new()).unwrap(),
            Reply::Resp(RespValue::NullBulk)
        );
    }

    #[test]
    fn setnx_reduce_maps_integers_to_ok_or_nil() {
        assert_eq!(
            Reduce::SetNx.apply(vec![RespValue::Integer(1)]).unwrap(),
            Reply::Resp(RespValue::ok())
        );
        assert_eq!(
            Reduce::SetNx
                .apply(vec![RespValue::Integer(0), RespValue::Integer(1)])
                .unwrap(),
            Reply::Resp(RespValue::NullBulk)
        );
    }

    #[test]
    fn self_conn_reply_is_not_a_resp_value() {
        let reply = Reduce::SelfConn.apply(Vec::new()).unwrap();
        assert!(matches!(reply, Reply::SelfConn));
        assert!(matches!(
            reply.into_resp(),
            Err(Error::UnsupportedSubPoolConnection)
        ));
    }
}
