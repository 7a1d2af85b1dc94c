//! The type-specific bulk transform behind DEL, EXISTS, EXPIRE and friends.
//!
//! A type-agnostic Redis command is multiplexed into the backend's
//! per-namespace variants: keys are resolved to their backend type, bucketed,
//! and each non-empty bucket with a configured command name produces either
//! one bulk command or one command per key (`debulk`).

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::args::{self, Arg};
use crate::catalog::CommandDescriptor;
use crate::error::Result;
use crate::extract::ArgsExtractor;
use crate::resolver::TypeInfo;
use crate::rewriter::Rewriter;
use crate::types::LedisType;

use super::{arg_from_key, Reduce, SendPlan, Slot, WireCommand};

/// Per-namespace backend command names; an empty name disables the bucket.
#[derive(Debug, Clone, Copy)]
pub struct TypeSpecificCommands {
    pub none: &'static str,
    pub kv: &'static str,
    pub list: &'static str,
    pub hash: &'static str,
    pub set: &'static str,
    pub zset: &'static str,
}

impl TypeSpecificCommands {
    fn for_type(&self, ledis_type: LedisType) -> &'static str {
        match ledis_type {
            LedisType::None => self.none,
            LedisType::KV => self.kv,
            LedisType::List => self.list,
            LedisType::Hash => self.hash,
            LedisType::Set => self.set,
            LedisType::ZSet => self.zset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    CountOne,
    First,
}

impl Aggregation {
    fn reduce(self) -> Reduce {
        match self {
            Aggregation::Sum => Reduce::Sum,
            Aggregation::CountOne => Reduce::CountOne,
            Aggregation::First => Reduce::First,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BulkConfig {
    pub commands: TypeSpecificCommands,
    /// Emit one command per key instead of one command with all keys.
    pub debulk: bool,
    pub aggregation: Aggregation,
    /// Auxiliary arguments repeated on every emitted command (e.g. the
    /// `seconds` argument of EXPIRE).
    pub append_args: Option<ArgsExtractor>,
}

/// Partition of a key batch by backend namespace, in the deterministic
/// emission order None, KV, List, Hash, Set, ZSet.
#[derive(Debug, Default, Clone)]
pub struct KeyTypeAggregation {
    pub none: Vec<Bytes>,
    pub kv: Vec<Bytes>,
    pub list: Vec<Bytes>,
    pub hash: Vec<Bytes>,
    pub set: Vec<Bytes>,
    pub zset: Vec<Bytes>,
}

impl KeyTypeAggregation {
    pub fn append_keys(&mut self, types_info: &[TypeInfo]) {
        for info in types_info {
            let bucket = match info.ledis_type {
                LedisType::None => &mut self.none,
                LedisType::KV => &mut self.kv,
                LedisType::List => &mut self.list,
                LedisType::Hash => &mut self.hash,
                LedisType::Set => &mut self.set,
                LedisType::ZSet => &mut self.zset,
            };
            bucket.push(info.key.clone());
        }
    }

    fn buckets(&self) -> [(&'static str, &[Bytes]); 6] {
        [
            ("none", &self.none),
            ("kv", &self.kv),
            ("list", &self.list),
            ("hash", &self.hash),
            ("set", &self.set),
            ("zset", &self.zset),
        ]
    }

    fn bucket_for(&self, ledis_type: LedisType) -> &[Bytes] {
        match ledis_type {
            LedisType::None => &self.none,
            LedisType::KV => &self.kv,
            LedisType::List => &self.list,
            LedisType::Hash => &self.hash,
            LedisType::Set => &self.set,
            LedisType::ZSet => &self.zset,
        }
    }
}

const EMISSION_ORDER: [LedisType; 6] = [
    LedisType::None,
    LedisType::KV,
    LedisType::List,
    LedisType::Hash,
    LedisType::Set,
    LedisType::ZSet,
];

pub(crate) async fn apply(
    rewriter: &Rewriter,
    config: &BulkConfig,
    descriptor: &CommandDescriptor,
    args: &[Arg],
) -> Result<SendPlan> {
    let key_args = descriptor.key_extractor.extract(args);
    let mut keys = Vec::new();
    args::append_as_simple_strings(&mut keys, &key_args);

    let token = CancellationToken::new();
    let mut types_info = Vec::with_capacity(keys.len());
    rewriter
        .resolver()
        .resolve_append(&token, &keys, &mut types_info)
        .await?;

    let append_args: Vec<Arg> = match config.append_args {
        Some(extractor) => extractor.extract(args).into_iter().cloned().collect(),
        None => Vec::new(),
    };

    let mut aggregation = KeyTypeAggregation::default();
    aggregation.append_keys(&types_info);
    debug!(command = descriptor.name, partition = %aggregation, "multiplexing by namespace");

    Ok(build_plan(config, &aggregation, &append_args))
}

/// Builds the send plan for an already-partitioned key batch. Split out so
/// the emission rules are testable without a backend.
pub(crate) fn build_plan(
    config: &BulkConfig,
    aggregation: &KeyTypeAggregation,
    append_args: &[Arg],
) -> SendPlan {
    let mut commands = Vec::new();

    for ledis_type in EMISSION_ORDER {
        let name = config.commands.for_type(ledis_type);
        let keys = aggregation.bucket_for(ledis_type);
        if name.is_empty() || keys.is_empty() {
            continue;
        }

        if config.debulk {
            for key in keys {
                let mut cmd_args = Vec::with_capacity(1 + append_args.len());
                cmd_args.push(arg_from_key(key));
                cmd_args.extend_from_slice(append_args);
                commands.push(WireCommand::new(name, cmd_args));
            }
        } else {
            let mut cmd_args = Vec::with_capacity(keys.len() + append_args.len());
            cmd_args.extend(keys.iter().map(arg_from_key));
            cmd_args.extend_from_slice(append_args);
            commands.push(WireCommand::new(name, cmd_args));
        }
    }

    let replies_count = commands.len();
    SendPlan::new(
        commands,
        Slot {
            replies_count,
            reduce: config.aggregation.reduce(),
        },
    )
}

impl std::fmt::Display for KeyTypeAggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (label, keys) in self.buckets() {
            if keys.is_empty() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{label}:{}", keys.len())?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LedisType;

    fn info(key: &str, ledis_type: LedisType) -> TypeInfo {
        TypeInfo {
            key: Bytes::copy_from_slice(key.as_bytes()),
            ledis_type,
        }
    }

    fn del_config() -> BulkConfig {
        BulkConfig {
            commands: TypeSpecificCommands {
                none: "",
                kv: "DEL",
                list: "LMCLEAR",
                hash: "HMCLEAR",
                set: "SMCLEAR",
                zset: "ZMCLEAR",
            },
            debulk: false,
            aggregation: Aggregation::Sum,
            append_args: None,
        }
    }

    #[test]
    fn bulk_emission_skips_empty_and_disabled_buckets() {
        let mut aggregation = KeyTypeAggregation::default();
        aggregation.append_keys(&[
            info("a", LedisType::KV),
            info("b", LedisType::List),
            info("c", LedisType::None),
        ]);

        let plan = build_plan(&del_config(), &aggregation, &[]);
        let names: Vec<&str> = plan.commands().iter().map(|c| c.name.as_str()).collect();
        // "c" resolved to no namespace and DEL has no command for that bucket.
        assert_eq!(names, vec!["DEL", "LMCLEAR"]);
        assert_eq!(plan.slot().replies_count, 2);
        assert_eq!(plan.slot().reduce, Reduce::Sum);
    }

    #[test]
    fn debulk_emits_one_command_per_key() {
        let config = BulkConfig {
            commands: TypeSpecificCommands {
                none: "",
                kv: "EXISTS",
                list: "LKEYEXISTS",
                hash: "HKEYEXISTS",
                set: "SKEYEXISTS",
                zset: "ZKEYEXISTS",
            },
            debulk: true,
            aggregation: Aggregation::Sum,
            append_args: None,
        };
        let mut aggregation = KeyTypeAggregation::default();
        aggregation.append_keys(&[info("x", LedisType::Hash), info("y", LedisType::Hash)]);

        let plan = build_plan(&config, &aggregation, &[]);
        assert_eq!(
            plan.commands(),
            &[
                WireCommand::new("HKEYEXISTS", vec![Arg::from(&b"x"[..])]),
                WireCommand::new("HKEYEXISTS", vec![Arg::from(&b"y"[..])]),
            ]
        );
        // One reply per key in emitted buckets.
        assert_eq!(plan.slot().replies_count, 2);
    }

    #[test]
    fn append_args_are_repeated_on_every_command() {
        let config = BulkConfig {
            commands: TypeSpecificCommands {
                none: "",
                kv: "EXPIRE",
                list: "LEXPIRE",
                hash: "HEXPIRE",
                set: "SEXPIRE",
                zset: "ZEXPIRE",
            },
            debulk: false,
            aggregation: Aggregation::Sum,
            append_args: None,
        };
        let mut aggregation = KeyTypeAggregation::default();
        aggregation.append_keys(&[info("k", LedisType::KV), info("l", LedisType::List)]);

        let plan = build_plan(&config, &aggregation, &[Arg::from(30i64)]);
        assert_eq!(
            plan.commands(),
            &[
                WireCommand::new("EXPIRE", vec![Arg::from(&b"k"[..]), Arg::from(30i64)]),
                WireCommand::new("LEXPIRE", vec![Arg::from(&b"l"[..]), Arg::from(30i64)]),
            ]
        );
    }

    #[test]
    fn replies_count_matches_emitted_buckets() {
        // Five keys across three buckets, bulk mode: one reply per non-empty
        // enabled bucket.
        let mut aggregation = KeyTypeAggregation::default();
        aggregation.append_keys(&[
            info("a", LedisType::KV),
            info("b", LedisType::KV),
            info("c", LedisType::Set),
            info("d", LedisType::ZSet),
            info("e", LedisType::None),
        ]);
        let plan = build_plan(&del_config(), &aggregation, &[]);
        assert_eq!(plan.slot().replies_count, 3);
    }
}
