//! The static command catalog.
//!
//! One descriptor per supported Redis command, binding its name to the key
//! namespace it operates on, the positions of its key arguments, and the
//! rewrite strategy. Descriptors are plain process-wide values; lookup is by
//! ASCII-uppercased name.

use hashbrown::HashMap;
use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::extract::ArgsExtractor;
use crate::transform::{Aggregation, BulkConfig, Transform, TypeSpecificCommands};
use crate::types::RedisType;

#[derive(Debug)]
pub struct CommandDescriptor {
    /// Canonical upper-case command name; also what identity rewrites emit.
    pub name: &'static str,
    pub key_type: RedisType,
    pub key_extractor: ArgsExtractor,
    pub transform: Transform,
    /// Human-readable syntax, surfaced in diagnostics.
    pub syntax: &'static str,
}

const fn cmd(
    name: &'static str,
    key_type: RedisType,
    key_extractor: ArgsExtractor,
    transform: Transform,
    syntax: &'static str,
) -> CommandDescriptor {
    CommandDescriptor {
        name,
        key_type,
        key_extractor,
        transform,
        syntax,
    }
}

static DEL_CONFIG: BulkConfig = BulkConfig {
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
};

static DUMP_CONFIG: BulkConfig = BulkConfig {
    commands: TypeSpecificCommands {
        none: "",
        kv: "DUMP",
        list: "LDUMP",
        hash: "HDUMP",
        set: "SDUMP",
        zset: "ZDUMP",
    },
    debulk: false,
    aggregation: Aggregation::First,
    append_args: None,
};

static EXISTS_CONFIG: BulkConfig = BulkConfig {
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

static EXPIRE_CONFIG: BulkConfig = BulkConfig {
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
    append_args: Some(ArgsExtractor::at(&[1])),
};

static EXPIREAT_CONFIG: BulkConfig = BulkConfig {
    commands: TypeSpecificCommands {
        none: "",
        kv: "EXPIREAT",
        list: "LEXPIREAT",
        hash: "HEXPIREAT",
        set: "SEXPIREAT",
        zset: "ZEXPIREAT",
    },
    debulk: false,
    aggregation: Aggregation::Sum,
    append_args: Some(ArgsExtractor::at(&[1])),
};

static PERSIST_CONFIG: BulkConfig = BulkConfig {
    commands: TypeSpecificCommands {
        none: "",
        kv: "PERSIST",
        list: "LPERSIST",
        hash: "HPERSIST",
        set: "SPERSIST",
        zset: "ZPERSIST",
    },
    debulk: false,
    aggregation: Aggregation::Sum,
    append_args: None,
};

static SORT_CONFIG: BulkConfig = BulkConfig {
    commands: TypeSpecificCommands {
        none: "",
        kv: "",
        list: "XLSORT",
        hash: "",
        set: "XSSORT",
        zset: "XZSORT",
    },
    debulk: false,
    aggregation: Aggregation::First,
    append_args: None,
};

static TTL_CONFIG: BulkConfig = BulkConfig {
    commands: TypeSpecificCommands {
        none: "",
        kv: "TTL",
        list: "LTTL",
        hash: "HTTL",
        set: "STTL",
        zset: "ZTTL",
    },
    debulk: false,
    aggregation: Aggregation::Sum,
    append_args: None,
};

#[rustfmt::skip]
static COMMANDS: &[CommandDescriptor] = &[
    // Strings.
    cmd("APPEND", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "APPEND key value"),
    cmd("BITCOUNT", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "BITCOUNT key [start end]"),
    // BITOP keys start after the operation token; unset source keys read as
    // zero-filled strings.
    cmd("BITOP", RedisType::String, ArgsExtractor::from_index(1), Transform::Identity, "BITOP operation destkey key [key ...]"),
    cmd("BITPOS", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "BITPOS key bit [start] [end]"),
    cmd("DECR", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "DECR key"),
    cmd("DECRBY", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "DECRBY key decrement"),
    cmd("GET", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "GET key"),
    cmd("GETBIT", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "GETBIT key offset"),
    cmd("GETRANGE", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "GETRANGE key start end"),
    cmd("GETSET", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "GETSET key value"),
    cmd("INCR", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "INCR key"),
    cmd("INCRBY", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "INCRBY key increment"),
    cmd("MGET", RedisType::String, ArgsExtractor::from_index(0), Transform::Identity, "MGET key [key ...]"),
    cmd("MSET", RedisType::String, ArgsExtractor::from_index_skipping(0, 1), Transform::Identity, "MSET key value [key value ...]"),
    cmd("SET", RedisType::String, ArgsExtractor::at(&[0]), Transform::Set, "SET key value [expiration EX seconds|PX milliseconds] [NX|XX]"),
    cmd("SETBIT", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "SETBIT key offset value"),
    cmd("SETEX", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "SETEX key seconds value"),
    cmd("SETNX", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "SETNX key value"),
    cmd("SETRANGE", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "SETRANGE key offset value"),
    cmd("STRLEN", RedisType::String, ArgsExtractor::at(&[0]), Transform::Identity, "STRLEN key"),
    // Hashes.
    cmd("HDEL", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HDEL key field [field ...]"),
    cmd("HEXISTS", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HEXISTS key field"),
    cmd("HGET", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HGET key field"),
    cmd("HGETALL", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HGETALL key"),
    cmd("HINCRBY", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HINCRBY key field increment"),
    cmd("HKEYS", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HKEYS key"),
    cmd("HLEN", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HLEN key"),
    cmd("HMGET", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HMGET key field [field ...]"),
    cmd("HMSET", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HMSET key field value [field value ...]"),
    cmd("HSET", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HSET key field value"),
    cmd("HVALS", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HVALS key"),
    cmd("HSCAN", RedisType::Hash, ArgsExtractor::at(&[0]), Transform::Identity, "HSCAN key cursor [MATCH pattern] [COUNT count]"),
    // Lists. The trailing timeout of the blocking pops is not a key.
    cmd("BLPOP", RedisType::List, ArgsExtractor::from_until(0, -1), Transform::Identity, "BLPOP key [key ...] timeout"),
    cmd("BRPOP", RedisType::List, ArgsExtractor::from_until(0, -1), Transform::Identity, "BRPOP key [key ...] timeout"),
    cmd("BRPOPLPUSH", RedisType::List, ArgsExtractor::at(&[0, 1]), Transform::Identity, "BRPOPLPUSH source destination timeout"),
    cmd("LINDEX", RedisType::List, ArgsExtractor::at(&[0]), Transform::Identity, "LINDEX key index"),
    cmd("LLEN", RedisType::List, ArgsExtractor::at(&[0]), Transform::Identity, "LLEN key"),
    cmd("LPOP", RedisType::List, ArgsExtractor::at(&[0]), Transform::Identity, "LPOP key"),
    cmd("LPUSH", RedisType::List, ArgsExtractor::at(&[0]), Transform::Identity, "LPUSH key value [value ...]"),
    cmd("LRANGE", RedisType::List, ArgsExtractor::at(&[0]), Transform::Identity, "LRANGE key start stop"),
    cmd("LREM", RedisType::List, ArgsExtractor::at(&[0]), Transform::Lrem, "LREM key count value"),
    cmd("LTRIM", RedisType::List, ArgsExtractor::at(&[0]), Transform::Identity, "LTRIM key start stop"),
    cmd("RPOP", RedisType::List, ArgsExtractor::at(&[0]), Transform::Identity, "RPOP key"),
    cmd("RPOPLPUSH", RedisType::List, ArgsExtractor::at(&[0, 1]), Transform::Identity, "RPOPLPUSH source destination"),
    cmd("RPUSH", RedisType::List, ArgsExtractor::at(&[0]), Transform::Identity, "RPUSH key value [value ...]"),
    // Sets.
    cmd("SADD", RedisType::Set, ArgsExtractor::at(&[0]), Transform::Identity, "SADD key member [member ...]"),
    cmd("SCARD", RedisType::Set, ArgsExtractor::at(&[0]), Transform::Identity, "SCARD key"),
    cmd("SDIFF", RedisType::Set, ArgsExtractor::from_index(0), Transform::Identity, "SDIFF key [key ...]"),
    cmd("SDIFFSTORE", RedisType::Set, ArgsExtractor::from_index(0), Transform::Identity, "SDIFFSTORE destination key [key ...]"),
    cmd("SINTER", RedisType::Set, ArgsExtractor::from_index(0), Transform::Identity, "SINTER key [key ...]"),
    cmd("SINTERSTORE", RedisType::Set, ArgsExtractor::from_index(0), Transform::Identity, "SINTERSTORE destination key [key ...]"),
    cmd("SISMEMBER", RedisType::Set, ArgsExtractor::at(&[0]), Transform::Identity, "SISMEMBER key member"),
    cmd("SMEMBERS", RedisType::Set, ArgsExtractor::at(&[0]), Transform::Identity, "SMEMBERS key"),
    cmd("SREM", RedisType::Set, ArgsExtractor::at(&[0]), Transform::Identity, "SREM key member [member ...]"),
    cmd("SSCAN", RedisType::Set, ArgsExtractor::at(&[0]), Transform::Identity, "SSCAN key cursor [MATCH pattern] [COUNT count]"),
    cmd("SUNION", RedisType::Set, ArgsExtractor::from_index(0), Transform::Identity, "SUNION key [key ...]"),
    cmd("SUNIONSTORE", RedisType::Set, ArgsExtractor::from_index(0), Transform::Identity, "SUNIONSTORE destination key [key ...]"),
    // Sorted sets.
    cmd("ZADD", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Zadd, "ZADD key [NX|XX] [CH] [INCR] score member [score member ...]"),
    cmd("ZCARD", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZCARD key"),
    cmd("ZCOUNT", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZCOUNT key min max"),
    cmd("ZINCRBY", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZINCRBY key increment member"),
    // Only the destination key is extracted; Redis reads missing source keys
    // as empty sorted sets.
    cmd("ZINTERSTORE", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZINTERSTORE destination numkeys key [key ...] [WEIGHTS weight [weight ...]] [AGGREGATE SUM|MIN|MAX]"),
    cmd("ZLEXCOUNT", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZLEXCOUNT key min max"),
    cmd("ZRANGE", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZRANGE key start stop [WITHSCORES]"),
    cmd("ZRANGEBYLEX", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZRANGEBYLEX key min max [LIMIT offset count]"),
    cmd("ZRANGEBYSCORE", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]"),
    cmd("ZRANK", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZRANK key member"),
    cmd("ZREM", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZREM key member [member ...]"),
    cmd("ZREMRANGEBYLEX", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZREMRANGEBYLEX key min max"),
    cmd("ZREMRANGEBYRANK", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZREMRANGEBYRANK key start stop"),
    cmd("ZREMRANGEBYSCORE", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZREMRANGEBYSCORE key min max"),
    cmd("ZREVRANGE", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZREVRANGE key start stop [WITHSCORES]"),
    cmd("ZREVRANGEBYSCORE", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZREVRANGEBYSCORE key max min [WITHSCORES] [LIMIT offset count]"),
    cmd("ZREVRANK", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZREVRANK key member"),
    cmd("ZSCAN", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZSCAN key cursor [MATCH pattern] [COUNT count]"),
    cmd("ZSCORE", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZSCORE key member"),
    cmd("ZUNIONSTORE", RedisType::ZSet, ArgsExtractor::at(&[0]), Transform::Identity, "ZUNIONSTORE destination numkeys key [key ...] [WEIGHTS weight [weight ...]] [AGGREGATE SUM|MIN|MAX]"),
    // Generic key commands, multiplexed by resolved namespace.
    cmd("DEL", RedisType::Generic, ArgsExtractor::from_index(0), Transform::TypeSpecificBulk(&DEL_CONFIG), "DEL key [key ...]"),
    cmd("DUMP", RedisType::Generic, ArgsExtractor::at(&[0]), Transform::TypeSpecificBulk(&DUMP_CONFIG), "DUMP key"),
    cmd("EXISTS", RedisType::Generic, ArgsExtractor::from_index(0), Transform::TypeSpecificBulk(&EXISTS_CONFIG), "EXISTS key [key ...]"),
    cmd("EXPIRE", RedisType::Generic, ArgsExtractor::at(&[0]), Transform::TypeSpecificBulk(&EXPIRE_CONFIG), "EXPIRE key seconds"),
    cmd("EXPIREAT", RedisType::Generic, ArgsExtractor::at(&[0]), Transform::TypeSpecificBulk(&EXPIREAT_CONFIG), "EXPIREAT key timestamp"),
    cmd("PERSIST", RedisType::Generic, ArgsExtractor::at(&[0]), Transform::TypeSpecificBulk(&PERSIST_CONFIG), "PERSIST key"),
    cmd("RESTORE", RedisType::Generic, ArgsExtractor::at(&[0]), Transform::Restore, "RESTORE key ttl serialized-value [REPLACE] [ABSTTL] [IDLETIME seconds] [FREQ frequency]"),
    cmd("SORT", RedisType::Generic, ArgsExtractor::at(&[0]), Transform::TypeSpecificBulk(&SORT_CONFIG), "SORT key [BY pattern] [LIMIT offset count] [GET pattern [GET pattern ...]] [ASC|DESC] [ALPHA] [STORE destination]"),
    cmd("TTL", RedisType::Generic, ArgsExtractor::at(&[0]), Transform::TypeSpecificBulk(&TTL_CONFIG), "TTL key"),
    // Connection handling.
    cmd("AUTH", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Identity, "AUTH password"),
    cmd("ECHO", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Identity, "ECHO message"),
    cmd("PING", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Ping, "PING [message]"),
    cmd("SELECT", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Identity, "SELECT index"),
    // Scripting.
    cmd("EVAL", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Identity, "EVAL script numkeys key [key ...] arg [arg ...]"),
    cmd("EVALSHA", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Identity, "EVALSHA sha1 numkeys key [key ...] arg [arg ...]"),
    cmd("SCRIPT", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Script, "SCRIPT subcommand [arg ...]"),
    // Transactions are dropped (see the transaction transform).
    cmd("DISCARD", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Transaction, "DISCARD"),
    cmd("EXEC", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Transaction, "EXEC"),
    cmd("MULTI", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Transaction, "MULTI"),
    cmd("UNWATCH", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Transaction, "UNWATCH"),
    cmd("WATCH", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Transaction, "WATCH key [key ...]"),
    // Shim-reserved escape hatch.
    cmd("UNSAFE", RedisType::Generic, ArgsExtractor::at(&[]), Transform::Unsafe, "UNSAFE LEDIS|SELF [arg ...]"),
];

static BY_NAME: Lazy<HashMap<&'static str, &'static CommandDescriptor>> = Lazy::new(|| {
    let mut table = HashMap::with_capacity(COMMANDS.len());
    for descriptor in COMMANDS {
        table.insert(descriptor.name, descriptor);
    }
    table
});

/// Looks up the descriptor for `name`, case-insensitively.
pub fn from_name(name: &str) -> Result<&'static CommandDescriptor> {
    let upper = name.to_ascii_uppercase();
    BY_NAME
        .get(upper.as_str())
        .copied()
        .ok_or(Error::UnknownRedisCommand)
}
