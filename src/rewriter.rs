//! The rewriter facade.
//!
//! A `Rewriter` owns the type-resolution cache and the internal sub-pool and
//! turns inbound Redis commands into send plans. Pools constructed through
//! one rewriter share its cache; the first primary pool also becomes the
//! backing pool for internal resolver traffic.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::args::Arg;
use crate::cache::Cache;
use crate::catalog;
use crate::conn::RewritingConn;
use crate::error::Result;
use crate::pool::{Pool, PoolConfig};
use crate::resolver::Resolver;
use crate::subpool::SubPool;
use crate::transform::{self, SendPlan, Transform};
use crate::wire::WireConn;

#[derive(Default)]
struct RewriterCore {
    cache: Cache,
    primary: OnceCell<Pool>,
    sub_pool: SubPool,
}

/// Shared rewriting state. Cheap to clone; all clones see the same cache
/// and sub-pool.
#[derive(Clone, Default)]
pub struct Rewriter {
    core: Arc<RewriterCore>,
}

impl Rewriter {
    pub fn new() -> Self {
        Rewriter::default()
    }

    pub fn cache(&self) -> &Cache {
        &self.core.cache
    }

    pub(crate) fn sub_pool(&self) -> &SubPool {
        &self.core.sub_pool
    }

    /// A resolver borrowing this rewriter's cache and sub-pool.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.core.cache, &self.core.sub_pool)
    }

    /// Builds a pool of rewriting connections and, on the first call,
    /// installs it as the primary pool backing internal resolver traffic
    /// with at most `internal_max_active` concurrent connections (0 means no
    /// cap). Later calls leave the primary unchanged but still return a
    /// fresh pool sharing this rewriter.
    pub fn new_primary_pool(&self, config: &PoolConfig, internal_max_active: usize) -> Result<Pool> {
        let pool = Pool::new(self.clone(), config)?;
        if self.core.primary.set(pool.clone()).is_ok() {
            self.core
                .sub_pool
                .set_backing(pool.clone(), internal_max_active);
        }
        Ok(pool)
    }

    /// Builds an additional rewriting pool. Rewriting of type-agnostic
    /// commands needs the primary pool, so [`Rewriter::new_primary_pool`]
    /// must have been called for those to work.
    pub fn new_pool(&self, config: &PoolConfig) -> Result<Pool> {
        Pool::new(self.clone(), config)
    }

    pub fn primary_pool(&self) -> Option<&Pool> {
        self.core.primary.get()
    }

    /// Wraps an existing wire connection into a rewriting connection bound
    /// to this rewriter.
    pub fn wrap_conn(&self, wire: WireConn) -> RewritingConn {
        RewritingConn::new(self.clone(), wire)
    }

    /// Rewrites one command invocation into a send plan. Fails without side
    /// effects for unknown commands and unsupported or malformed argument
    /// forms; the bulk and LREM paths perform resolution I/O before the plan
    /// exists.
    pub async fn rewrite(&self, name: &str, args: &[Arg]) -> Result<SendPlan> {
        let descriptor = catalog::from_name(name)?;
        match descriptor.transform {
            Transform::Identity => Ok(transform::identity(descriptor, args)),
            Transform::TypeSpecificBulk(config) => {
                transform::bulk::apply(self, config, descriptor, args).await
            }
            Transform::Set => transform::set::apply(descriptor, args),
            Transform::Zadd => transform::zadd::apply(descriptor, args),
            Transform::Restore => transform::restore::apply(descriptor, args),
            Transform::Ping => transform::simple::ping(descriptor, args),
            Transform::Script => transform::simple::script(descriptor, args),
            Transform::Transaction => transform::simple::transaction(descriptor, args),
            Transform::Unsafe => transform::simple::unsafe_cmd(descriptor, args),
            Transform::Lrem => transform::lrem::apply(self, descriptor, args).await,
        }
    }
}

impl std::fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rewriter")
            .field("cached_keys", &self.core.cache.len())
            .field("primary_set", &self.core.primary.get().is_some())
            .finish_non_exhaustive()
    }
}

/// Builds a fresh rewriter and returns its primary pool, for callers that
/// do not need to hold the rewriter itself. Internal resolver traffic is
/// uncapped.
pub fn new_pool(config: &PoolConfig) -> Result<Pool> {
    let rewriter = Rewriter::new();
    rewriter.new_primary_pool(config, 0)
}
