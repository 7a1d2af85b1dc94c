//! lediswrap lets client code written against Redis talk to a LedisDB
//! backend. LedisDB partitions its keyspace by value type and lacks several
//! Redis modifiers, so each inbound command is rewritten into zero or more
//! backend commands; the backend's replies are folded back into the single
//! reply the client expects.
//!
//! The moving parts:
//!
//! - a static [catalog](catalog) binding each Redis command to its key
//!   positions and rewrite strategy;
//! - [transforms](transform) producing send plans (backend commands plus a
//!   reply-reduction slot);
//! - a single-flight [cache](cache) and [resolver](resolver) mapping keys to
//!   the backend namespace they live in, probing over a bounded
//!   [sub-pool](subpool) of the primary pool;
//! - a [rewriting connection](conn) preserving Redis's pipelined
//!   send / flush / receive discipline across one-to-many expansions.
//!
//! ```no_run
//! use lediswrap::{new_pool, Arg, PoolConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> lediswrap::Result<()> {
//! let pool = new_pool(&PoolConfig::for_addr("127.0.0.1:6380"))?;
//! let mut conn = pool.get(&CancellationToken::new()).await?;
//! // Emitted to the backend as SETEX foo 10 bar.
//! conn.do_cmd(
//!     "SET",
//!     &[Arg::from("foo"), Arg::from("bar"), Arg::from("EX"), Arg::from(10i64)],
//! )
//! .await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod conn;
pub mod error;
pub mod extract;
pub mod pool;
pub mod resolver;
pub mod rewriter;
pub mod subpool;
pub mod transform;
pub mod types;
pub mod wire;

pub use args::{Arg, ArgInfo, ArgKind};
pub use cache::{Cache, CacheEntryState, EntryData, EntryRef, EntrySetter};
pub use catalog::CommandDescriptor;
pub use config::ShimConfig;
pub use conn::RewritingConn;
pub use error::{Error, Result};
pub use extract::ArgsExtractor;
pub use pool::{Pool, PoolConfig, PooledConn};
pub use resolver::{Resolver, TypeInfo};
pub use rewriter::{new_pool, Rewriter};
pub use subpool::{RawConn, SubPool, SubPoolConn};
pub use transform::{Reply, SendPlan, Slot, Transform};
pub use types::{LedisType, RedisType};
pub use wire::{RespValue, WireConn};
