//! SET modifier emulation.
//!
//! LedisDB has no SET modifiers. `SET key value EX n` becomes `SETEX`,
//! `SET key value NX` becomes `SETNX` (plus an `EXPIRE` when an expiration is
//! also requested, with the reply mapped back to Redis's `OK`/nil shape).
//! `XX` cannot be emulated without a read-modify-write race and is rejected.

use crate::args::{Arg, ArgInfo};
use crate::catalog::CommandDescriptor;
use crate::error::{Error, Result};

use super::{Reduce, SendPlan, Slot, WireCommand};

#[derive(Debug, Default, PartialEq, Eq)]
struct SetInfo {
    ex: Option<i64>,
    px: Option<i64>,
    nx: bool,
    xx: bool,
}

pub(crate) fn apply(_descriptor: &CommandDescriptor, args: &[Arg]) -> Result<SendPlan> {
    let info = parse(args)?;

    if info.xx && info.nx {
        return Err(Error::InvalidArgumentCombination);
    }
    if info.ex.is_some() && info.px.is_some() {
        return Err(Error::InvalidArgumentCombination);
    }
    if info.xx {
        return Err(Error::NoEmulationPossible);
    }

    // Millisecond expirations are rounded up to whole seconds; overflow near
    // i64::MAX is ignored, matching the backend's second granularity.
    let expiration = match (info.ex, info.px) {
        (Some(seconds), None) => Some(seconds),
        (None, Some(millis)) => Some(millis.saturating_add(999) / 1000),
        (None, None) => None,
        (Some(_), Some(_)) => unreachable!("rejected above"),
    };

    let key = args[0].clone();
    let value = args[1].clone();

    if info.nx {
        let mut commands = vec![WireCommand::new("SETNX", vec![key.clone(), value])];
        if let Some(seconds) = expiration {
            commands.push(WireCommand::new("EXPIRE", vec![key, Arg::Int(seconds)]));
        }
        let replies_count = commands.len();
        return Ok(SendPlan::new(
            commands,
            Slot {
                replies_count,
                reduce: Reduce::SetNx,
            },
        ));
    }

    if let Some(seconds) = expiration {
        return Ok(SendPlan::single(
            WireCommand::new("SETEX", vec![key, Arg::Int(seconds), value]),
            Reduce::First,
        ));
    }

    Ok(SendPlan::single(
        WireCommand::new("SET", vec![key, value]),
        Reduce::First,
    ))
}

fn parse(args: &[Arg]) -> Result<SetInfo> {
    if args.len() < 2 {
        return Err(Error::InvalidSyntax);
    }

    let mut info = SetInfo::default();
    let mut index = 2;
    while index < args.len() {
        let flag = ArgInfo::parse(&args[index]);
        if !flag.is_string_like() {
            return Err(Error::InvalidArgumentType);
        }

        if flag.equal_fold_either("EX", b"EX") {
            index += 1;
            let value = args.get(index).ok_or(Error::InvalidSyntax)?;
            info.ex = Some(ArgInfo::parse(value).to_int()?);
        } else if flag.equal_fold_either("PX", b"PX") {
            index += 1;
            let value = args.get(index).ok_or(Error::InvalidSyntax)?;
            info.px = Some(ArgInfo::parse(value).to_int()?);
        } else if flag.equal_fold_either("NX", b"NX") {
            info.nx = true;
        } else if flag.equal_fold_either("XX", b"XX") {
            info.xx = true;
        } else {
            return Err(Error::InvalidSyntax);
        }
        index += 1;
    }

    Ok(info)
}
