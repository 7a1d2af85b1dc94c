//! The two type lattices the shim translates between.
//!
//! Redis attaches a value type to each key but keeps a single keyspace;
//! LedisDB partitions the keyspace by value type. `RedisType` classifies the
//! inbound command surface, `LedisType` the backend namespaces. Commands
//! marked `RedisType::Generic` have no fixed backend namespace and are
//! multiplexed at rewrite time.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedisType {
    None,
    String,
    List,
    Hash,
    Set,
    ZSet,
    /// Type-agnostic command; the concrete namespace is resolved per key.
    Generic,
}

impl fmt::Display for RedisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RedisType::None => "None",
            RedisType::String => "String",
            RedisType::List => "List",
            RedisType::Hash => "Hash",
            RedisType::Set => "Set",
            RedisType::ZSet => "ZSet",
            RedisType::Generic => "Generic",
        };
        f.write_str(name)
    }
}

impl RedisType {
    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "None" => Ok(RedisType::None),
            "String" => Ok(RedisType::String),
            "List" => Ok(RedisType::List),
            "Hash" => Ok(RedisType::Hash),
            "Set" => Ok(RedisType::Set),
            "ZSet" => Ok(RedisType::ZSet),
            "Generic" => Ok(RedisType::Generic),
            _ => Err(Error::UnknownRedisTypeString),
        }
    }

    /// Parses the lower-case spelling used by the Redis `TYPE` command.
    pub fn parse_from_redis(input: &str) -> Result<Self> {
        match input {
            "string" => Ok(RedisType::String),
            "list" => Ok(RedisType::List),
            "hash" => Ok(RedisType::Hash),
            "set" => Ok(RedisType::Set),
            "zset" => Ok(RedisType::ZSet),
            _ => Err(Error::UnknownRedisTypeString),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LedisType {
    #[default]
    None,
    KV,
    List,
    Hash,
    Set,
    ZSet,
}

impl fmt::Display for LedisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedisType::None => "None",
            LedisType::KV => "KV",
            LedisType::List => "List",
            LedisType::Hash => "Hash",
            LedisType::Set => "Set",
            LedisType::ZSet => "ZSet",
        };
        f.write_str(name)
    }
}

impl LedisType {
    /// The order in which the resolver walks the backend namespaces.
    pub const PROBE_ORDER: [LedisType; 5] = [
        LedisType::KV,
        LedisType::List,
        LedisType::Hash,
        LedisType::Set,
        LedisType::ZSet,
    ];

    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "None" => Ok(LedisType::None),
            "KV" => Ok(LedisType::KV),
            "List" => Ok(LedisType::List),
            "Hash" => Ok(LedisType::Hash),
            "Set" => Ok(LedisType::Set),
            "ZSet" => Ok(LedisType::ZSet),
            _ => Err(Error::UnknownLedisTypeString),
        }
    }

    /// Parses the upper-case spelling LedisDB itself reports.
    pub fn parse_from_ledis(input: &str) -> Result<Self> {
        match input {
            "KV" => Ok(LedisType::KV),
            "LIST" => Ok(LedisType::List),
            "HASH" => Ok(LedisType::Hash),
            "SET" => Ok(LedisType::Set),
            "ZSET" => Ok(LedisType::ZSet),
            _ => Err(Error::UnknownLedisTypeString),
        }
    }

    pub fn from_redis(redis_type: RedisType) -> Result<Self> {
        match redis_type {
            RedisType::None => Ok(LedisType::None),
            RedisType::String => Ok(LedisType::KV),
            RedisType::List => Ok(LedisType::List),
            RedisType::Hash => Ok(LedisType::Hash),
            RedisType::Set => Ok(LedisType::Set),
            RedisType::ZSet => Ok(LedisType::ZSet),
            RedisType::Generic => Err(Error::NoCorrespondingLedisType),
        }
    }

    /// The backend's existence-by-type probe for this namespace.
    pub fn key_exists_command(self) -> Result<&'static str> {
        match self {
            LedisType::KV => Ok("EXISTS"),
            LedisType::List => Ok("LKEYEXISTS"),
            LedisType::Hash => Ok("HKEYEXISTS"),
            LedisType::Set => Ok("SKEYEXISTS"),
            LedisType::ZSet => Ok("ZKEYEXISTS"),
            LedisType::None => Err(Error::InvalidLedisType),
        }
    }
}
