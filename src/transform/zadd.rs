//! ZADD flag handling.
//!
//! LedisDB's ZADD takes plain score/member pairs. The NX, XX and CH flags
//! change reply or update semantics in ways the backend cannot express, so
//! they are rejected. INCR degenerates to ZINCRBY for a single pair.

use crate::args::{Arg, ArgInfo};
use crate::catalog::CommandDescriptor;
use crate::error::{Error, Result};

use super::{Reduce, SendPlan, WireCommand};

#[derive(Debug, Default)]
struct ZaddInfo {
    num_flags: usize,
    nx: bool,
    xx: bool,
    incr: bool,
    ch: bool,
}

pub(crate) fn apply(_descriptor: &CommandDescriptor, args: &[Arg]) -> Result<SendPlan> {
    let info = parse(args)?;

    if info.xx && info.nx {
        return Err(Error::InvalidArgumentCombination);
    }
    if info.xx || info.nx || info.ch {
        return Err(Error::NoEmulationPossible);
    }

    let tail = &args[info.num_flags + 1..];

    if info.incr {
        if tail.len() != 2 {
            return Err(Error::InvalidSyntax);
        }
        return Ok(SendPlan::single(
            WireCommand::new(
                "ZINCRBY",
                vec![args[0].clone(), tail[0].clone(), tail[1].clone()],
            ),
            Reduce::First,
        ));
    }

    let mut cmd_args = Vec::with_capacity(1 + tail.len());
    cmd_args.push(args[0].clone());
    cmd_args.extend_from_slice(tail);
    Ok(SendPlan::single(
        WireCommand::new("ZADD", cmd_args),
        Reduce::First,
    ))
}

fn parse(args: &[Arg]) -> Result<ZaddInfo> {
    if args.len() < 3 {
        return Err(Error::InvalidSyntax);
    }

    let mut info = ZaddInfo::default();
    for arg in &args[1..] {
        let flag = ArgInfo::parse(arg);
        if !flag.is_string_like() {
            break;
        }

        if flag.equal_fold_either("NX", b"NX") {
            info.nx = true;
        } else if flag.equal_fold_either("XX", b"XX") {
            info.xx = true;
        } else if flag.equal_fold_either("INCR", b"INCR") {
            info.incr = true;
        } else if flag.equal_fold_either("CH", b"CH") {
            info.ch = true;
        } else {
            break;
        }
        info.num_flags += 1;
    }

    if (args.len() - (info.num_flags + 1)) % 2 != 0 {
        return Err(Error::InvalidSyntax);
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn descriptor() -> &'static CommandDescriptor {
        catalog::from_name("ZADD").unwrap()
    }

    fn argv(parts: &[&str]) -> Vec<Arg> {
        parts.iter().map(|p| Arg::from(*p)).collect()
    }

    #[test]
    fn plain_pairs_forward_to_zadd() {
        let plan = apply(descriptor(), &argv(&["k", "1", "a", "2", "b"])).unwrap();
        assert_eq!(
            plan.commands(),
            &[WireCommand::new("ZADD", argv(&["k", "1", "a", "2", "b"]))]
        );
    }

    #[test]
    fn incr_becomes_zincrby() {
        let plan = apply(descriptor(), &argv(&["k", "INCR", "1", "a"])).unwrap();
        assert_eq!(
            plan.commands(),
            &[WireCommand::new("ZINCRBY", argv(&["k", "1", "a"]))]
        );
    }

    #[test]
    fn incr_requires_exactly_one_pair() {
        // Three tail arguments: unbalanced pairs are caught first.
        assert!(matches!(
            apply(descriptor(), &argv(&["k", "INCR", "1", "a", "b"])),
            Err(Error::InvalidSyntax)
        ));
        assert!(matches!(
            apply(descriptor(), &argv(&["k", "INCR", "1", "a", "2", "b"])),
            Err(Error::InvalidSyntax)
        ));
    }

    #[test]
    fn unsupported_flags_are_rejected() {
        assert!(matches!(
            apply(descriptor(), &argv(&["k", "XX", "1", "a"])),
            Err(Error::NoEmulationPossible)
        ));
        assert!(matches!(
            apply(descriptor(), &argv(&["k", "ch", "1", "a"])),
            Err(Error::NoEmulationPossible)
        ));
        assert!(matches!(
            apply(descriptor(), &argv(&["k", "NX", "XX", "1", "a"])),
            Err(Error::InvalidArgumentCombination)
        ));
    }

    #[test]
    fn unbalanced_pairs_are_invalid() {
        assert!(matches!(
            apply(descriptor(), &argv(&["k", "1", "a", "2"])),
            Err(Error::InvalidSyntax)
        ));
    }

    #[test]
    fn numeric_score_ends_flag_scan() {
        // A leading integer argument is not string-like, so flag scanning
        // stops and the pairs pass through.
        let args = vec![Arg::from("k"), Arg::Int(1), Arg::from("a")];
        let plan = apply(descriptor(), &args).unwrap();
        assert_eq!(plan.commands()[0].name, "ZADD");
        assert_eq!(plan.commands()[0].args.len(), 3);
    }
}
