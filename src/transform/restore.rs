//! RESTORE modifier handling.
//!
//! IDLETIME and FREQ are accepted and discarded (they only feed Redis's
//! eviction heuristics). ABSTTL has no backend equivalent: the value is
//! restored without a TTL and an EXPIREAT with the absolute timestamp is
//! pipelined behind it.

use crate::args::{Arg, ArgInfo};
use crate::catalog::CommandDescriptor;
use crate::error::{Error, Result};

use super::{Reduce, SendPlan, Slot, WireCommand};

#[derive(Debug, Default)]
struct RestoreInfo {
    absttl: bool,
}

pub(crate) fn apply(_descriptor: &CommandDescriptor, args: &[Arg]) -> Result<SendPlan> {
    let info = parse(args)?;

    let key = args[0].clone();
    let value = args[2].clone();

    if info.absttl {
        let expire_at = ArgInfo::parse(&args[1]).to_int()?;
        let commands = vec![
            WireCommand::new("RESTORE", vec![key.clone(), Arg::Int(0), value]),
            WireCommand::new("EXPIREAT", vec![key, Arg::Int(expire_at)]),
        ];
        return Ok(SendPlan::new(
            commands,
            Slot {
                replies_count: 2,
                reduce: Reduce::First,
            },
        ));
    }

    Ok(SendPlan::single(
        WireCommand::new("RESTORE", vec![key, args[1].clone(), value]),
        Reduce::First,
    ))
}

fn parse(args: &[Arg]) -> Result<RestoreInfo> {
    if args.len() < 3 {
        return Err(Error::InvalidSyntax);
    }

    let mut info = RestoreInfo::default();
    let mut index = 3;
    while index < args.len() {
        let flag = ArgInfo::parse(&args[index]);
        if !flag.is_string_like() {
            return Err(Error::InvalidArgumentType);
        }

        if flag.equal_fold_either("REPLACE", b"REPLACE") {
            // Accepted and dropped; the backend overwrites on RESTORE.
        } else if flag.equal_fold_either("ABSTTL", b"ABSTTL") {
            info.absttl = true;
        } else if flag.equal_fold_either("IDLETIME", b"IDLETIME")
            || flag.equal_fold_either("FREQ", b"FREQ")
        {
            // Eviction hints; validated and dropped.
            index += 1;
            let value = args.get(index).ok_or(Error::InvalidSyntax)?;
            ArgInfo::parse(value).to_int()?;
        } else {
            return Err(Error::InvalidSyntax);
        }
        index += 1;
    }

    Ok(info)
}
