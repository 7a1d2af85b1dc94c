use std::io;
use std::sync::Arc;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the shim can produce.
///
/// The enum is `Clone` so a connection can latch its first fatal error and
/// keep returning it from subsequent operations; `Io` wraps the source in an
/// `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("input string does not represent a known Redis command name")]
    UnknownRedisCommand,

    #[error("sub command unknown")]
    UnknownSubCommand,

    #[error("sub command not implemented")]
    SubCommandNotImplemented,

    #[error("invalid syntax")]
    InvalidSyntax,

    #[error("invalid argument type")]
    InvalidArgumentType,

    #[error("invalid argument combination")]
    InvalidArgumentCombination,

    #[error("no emulation possible for the issued command")]
    NoEmulationPossible,

    #[error("input RedisType value is unknown or otherwise invalid for this operation")]
    InvalidRedisType,

    #[error("input LedisType value is unknown or otherwise invalid for this operation")]
    InvalidLedisType,

    #[error("there is no LedisType value corresponding to the input RedisType value")]
    NoCorrespondingLedisType,

    #[error("input string does not represent a known RedisType value")]
    UnknownRedisTypeString,

    #[error("input string does not represent a known LedisType value")]
    UnknownLedisTypeString,

    #[error("encountered cache entry with unexpected state")]
    UnexpectedCacheEntryState,

    #[error("encountered cache entry with Error state")]
    ErrorCacheEntryState,

    /// Reserved for wire transports without deadline support. The bundled
    /// `WireConn` always supports deadlined reads via the runtime timer.
    #[error("connection does not support deadlined reads")]
    TimeoutNotSupported,

    #[error("connection closed")]
    ConnClosed,

    #[error("connection returned by sub-pool is unsupported by this operation")]
    UnsupportedSubPoolConnection,

    #[error("invalid aggregation value")]
    InvalidAggregation,

    #[error("invalid type for the operation")]
    InvalidTypeForOperation,

    #[error("operation cancelled")]
    Cancelled,

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("connection pool closed")]
    PoolClosed,

    #[error("rewriter has no primary pool")]
    NoPrimaryPool,

    #[error("pool configuration has no dial callback")]
    NoDialFunction,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}
