//! Small transforms: PING, SCRIPT sub-commands, dropped transaction
//! commands, and the shim-reserved UNSAFE escape hatch.

use crate::args::{Arg, ArgInfo};
use crate::catalog::CommandDescriptor;
use crate::error::{Error, Result};
use crate::wire::RespValue;

use super::{identity, Reduce, SendPlan, WireCommand};

/// PING without a message forwards as-is. The backend's PING does not echo,
/// so `PING msg` forwards a bare PING and synthesizes the echo locally.
pub(crate) fn ping(descriptor: &CommandDescriptor, args: &[Arg]) -> Result<SendPlan> {
    match args.len() {
        0 => Ok(identity(descriptor, args)),
        1 => {
            let message = ArgInfo::parse(&args[0]).to_redis_bytes()?;
            Ok(SendPlan::single(
                WireCommand::new(descriptor.name, Vec::new()),
                Reduce::Static(RespValue::BulkString(message)),
            ))
        }
        _ => Err(Error::InvalidSyntax),
    }
}

/// SCRIPT EXISTS / FLUSH / LOAD pass through; DEBUG and KILL do not exist on
/// the backend.
pub(crate) fn script(descriptor: &CommandDescriptor, args: &[Arg]) -> Result<SendPlan> {
    let sub = args.first().ok_or(Error::InvalidSyntax)?;
    let info = ArgInfo::parse(sub);
    if !info.is_string_like() {
        return Err(Error::InvalidArgumentType);
    }

    if info.equal_fold_either("EXISTS", b"EXISTS")
        || info.equal_fold_either("FLUSH", b"FLUSH")
        || info.equal_fold_either("LOAD", b"LOAD")
    {
        Ok(identity(descriptor, args))
    } else {
        Err(Error::SubCommandNotImplemented)
    }
}

/// Transaction commands are dropped: WATCH, UNWATCH, MULTI and EXEC produce
/// a zero-reply slot whose reply is nil, DISCARD fails. Dropping the guards
/// makes the "transaction" a plain pipeline and is inherently race-prone;
/// callers that need atomicity must not rely on these commands.
pub(crate) fn transaction(descriptor: &CommandDescriptor, _args: &[Arg]) -> Result<SendPlan> {
    match descriptor.name {
        "DISCARD" => Err(Error::NoEmulationPossible),
        "EXEC" | "MULTI" | "UNWATCH" | "WATCH" => Ok(SendPlan::empty(Reduce::Nil)),
        _ => Err(Error::UnknownSubCommand),
    }
}

/// `UNSAFE LEDIS <cmd> <args…>` forwards a raw backend command, bypassing
/// rewriting. `UNSAFE SELF` performs no wire I/O and reduces to the marker
/// reply granting raw access to the underlying connection.
pub(crate) fn unsafe_cmd(_descriptor: &CommandDescriptor, args: &[Arg]) -> Result<SendPlan> {
    let sub = args.first().ok_or(Error::InvalidSyntax)?;
    let info = ArgInfo::parse(sub);
    if !info.is_string_like() {
        return Err(Error::InvalidArgumentType);
    }

    if info.equal_fold_either("LEDIS", b"LEDIS") {
        let command = args.get(1).ok_or(Error::InvalidSyntax)?;
        let command_info = ArgInfo::parse(command);
        if !command_info.is_string_like() {
            return Err(Error::InvalidArgumentType);
        }
        let name = command_info.to_redis_string()?;
        Ok(SendPlan::single(
            WireCommand::new(name, args[2..].to_vec()),
            Reduce::First,
        ))
    } else if info.equal_fold_either("SELF", b"SELF") {
        if args.len() != 1 {
            return Err(Error::InvalidSyntax);
        }
        Ok(SendPlan::empty(Reduce::SelfConn))
    } else {
        Err(Error::UnknownSubCommand)
    }
}
