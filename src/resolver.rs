//! Batch key-type resolution.
//!
//! For a batch of keys the resolver splits three ways: keys already typed in
//! the cache, keys some other task is currently probing (wait on their
//! completion signal), and keys this call now owns. Owned keys are probed
//! actively: for each backend namespace in a fixed order, the corresponding
//! existence probe is pipelined for every still-untyped key over a sub-pool
//! connection. Keys found in a namespace are published immediately; keys
//! left after the last round are published as deleted.
//!
//! Probes are wrapped as `UNSAFE LEDIS <probe> <key>` so they bypass the
//! catalog. The probe names are backend-specific commands the rewriting
//! layer must not re-interpret (the KV probe shares its name with a generic
//! catalog command, which would recurse into resolution).

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::args::Arg;
use crate::cache::{Cache, CacheEntryState, EntryData, EntryRef, EntrySetter};
use crate::catalog;
use crate::error::{Error, Result};
use crate::subpool::{SubPool, SubPoolConn};
use crate::transform::simple;
use crate::types::LedisType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub key: Bytes,
    pub ledis_type: LedisType,
}

/// Resolves key types against the cache, probing the backend through the
/// rewriter's internal sub-pool on misses.
pub struct Resolver<'a> {
    cache: &'a Cache,
    sub_pool: &'a SubPool,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(cache: &'a Cache, sub_pool: &'a SubPool) -> Self {
        Resolver { cache, sub_pool }
    }

    pub async fn resolve_one(&self, token: &CancellationToken, key: Bytes) -> Result<LedisType> {
        let mut out = Vec::with_capacity(1);
        self.resolve_append(token, std::slice::from_ref(&key), &mut out)
            .await?;
        Ok(out[0].ledis_type)
    }

    /// Appends one `TypeInfo` per input key to `out`: cache hits in input
    /// order, then owned probe results, then waited results. On error `out`
    /// is left untouched.
    pub async fn resolve_append(
        &self,
        token: &CancellationToken,
        keys: &[Bytes],
        out: &mut Vec<TypeInfo>,
    ) -> Result<()> {
        let initial_len = out.len();
        let mut waiting: Vec<EntryData> = Vec::new();
        let mut setters: Vec<EntrySetter> = Vec::new();

        for key in keys {
            match self.cache.load_or_create_entry(key.clone()) {
                EntryRef::Data(data) => match data.state {
                    CacheEntryState::Exists => out.push(TypeInfo {
                        key: key.clone(),
                        ledis_type: data.ledis_type,
                    }),
                    CacheEntryState::Loading => waiting.push(data),
                    CacheEntryState::Deleted | CacheEntryState::Error => {
                        // The cache hands terminal-failed entries back as
                        // setters; seeing one here is a protocol violation.
                        for setter in setters {
                            setter.set(CacheEntryState::Error, LedisType::None);
                        }
                        out.truncate(initial_len);
                        return Err(Error::UnexpectedCacheEntryState);
                    }
                },
                EntryRef::Setter(setter) => setters.push(setter),
            }
        }

        let owned_base = out.len();
        for setter in &setters {
            out.push(TypeInfo {
                key: setter.key.clone(),
                ledis_type: LedisType::None,
            });
        }
        if let Err(err) = self
            .active_resolve(token, setters, &mut out[owned_base..])
            .await
        {
            out.truncate(initial_len);
            return Err(err);
        }

        let wait_base = out.len();
        for data in &waiting {
            out.push(TypeInfo {
                key: data.key.clone(),
                ledis_type: LedisType::None,
            });
        }
        if let Err(err) = wait_resolve(token, &mut waiting, &mut out[wait_base..]).await {
            out.truncate(initial_len);
            return Err(err);
        }

        Ok(())
    }

    /// Probes the backend for every owned key, walking the namespaces in
    /// [`LedisType::PROBE_ORDER`]. Each round shrinks the working set to the
    /// keys still untyped; every owned setter is completed on every path.
    async fn active_resolve(
        &self,
        token: &CancellationToken,
        mut setters: Vec<EntrySetter>,
        infos: &mut [TypeInfo],
    ) -> Result<()> {
        debug_assert_eq!(setters.len(), infos.len());
        if setters.is_empty() {
            return Ok(());
        }
        debug!(keys = infos.len(), "probing backend namespaces for key types");

        let mut start = 0usize;
        for ledis_type in LedisType::PROBE_ORDER {
            if start == infos.len() {
                return Ok(());
            }

            if let Err(err) = self.check_type(token, ledis_type, &mut infos[start..]).await {
                // Publications from earlier rounds stand; everything still
                // owned is failed so no waiter is stranded.
                for setter in setters.drain(..) {
                    setter.set(CacheEntryState::Error, LedisType::None);
                }
                return Err(err);
            }

            let resolved = sort_apart(&mut infos[start..], &mut setters);
            for (offset, setter) in setters.drain(..resolved).enumerate() {
                setter.set(CacheEntryState::Exists, infos[start + offset].ledis_type);
            }
            start += resolved;
        }

        for setter in setters.drain(..) {
            setter.set(CacheEntryState::Deleted, LedisType::None);
        }
        Ok(())
    }

    /// One probe round: pipeline the namespace's existence probe for every
    /// key in `infos`, then mark the keys the backend reported present.
    async fn check_type(
        &self,
        token: &CancellationToken,
        ledis_type: LedisType,
        infos: &mut [TypeInfo],
    ) -> Result<()> {
        let probe = ledis_type.key_exists_command()?;
        let mut conn = self.sub_pool.get(token).await?;
        let result = probe_batch(&mut conn, probe, ledis_type, infos).await;
        let _ = conn.close().await;
        result
    }
}

async fn probe_batch(
    conn: &mut SubPoolConn,
    probe: &str,
    ledis_type: LedisType,
    infos: &mut [TypeInfo],
) -> Result<()> {
    let descriptor = catalog::from_name("UNSAFE")?;
    for info in infos.iter() {
        // Built synchronously through the escape-hatch transform; probe
        // traffic never re-enters the rewrite path.
        let plan = simple::unsafe_cmd(
            descriptor,
            &[
                Arg::from("LEDIS"),
                Arg::from(probe),
                Arg::Bytes(info.key.clone()),
            ],
        )?;
        conn.send_plan(plan)?;
    }
    conn.flush().await?;
    for info in infos.iter_mut() {
        let reply = conn.receive().await?.into_resp()?;
        if reply.expect_integer()? == 1 {
            info.ledis_type = ledis_type;
        }
    }
    Ok(())
}

/// Waits for each concurrently-loading entry to publish, racing the
/// completion signal against cancellation.
async fn wait_resolve(
    token: &CancellationToken,
    entries: &mut [EntryData],
    infos: &mut [TypeInfo],
) -> Result<()> {
    for (data, info) in entries.iter_mut().zip(infos.iter_mut()) {
        loop {
            match data.state {
                CacheEntryState::Exists => {
                    info.ledis_type = data.ledis_type;
                    break;
                }
                CacheEntryState::Deleted => {
                    info.ledis_type = LedisType::None;
                    break;
                }
                CacheEntryState::Error => return Err(Error::ErrorCacheEntryState),
                CacheEntryState::Loading => {
                    let mut rx = match data.done_loading.clone() {
                        Some(rx) => rx,
                        None => return Err(Error::UnexpectedCacheEntryState),
                    };
                    tokio::select! {
                        _ = token.cancelled() => return Err(Error::Cancelled),
                        // A closed channel means the setter is gone, in which
                        // case its drop already published a terminal state.
                        _ = rx.wait_for(|done| *done) => {}
                    }
                    data.refresh();
                }
            }
        }
    }
    Ok(())
}

/// Partitions `infos` so typed entries come first, applying the same swaps
/// to the parallel setter list. Returns the number of typed entries.
fn sort_apart(infos: &mut [TypeInfo], setters: &mut [EntrySetter]) -> usize {
    debug_assert_eq!(infos.len(), setters.len());
    let mut none_begin = infos.len();
    let mut index = 0;
    while index < none_begin {
        if infos[index].ledis_type == LedisType::None {
            none_begin -= 1;
            infos.swap(index, none_begin);
            setters.swap(index, none_begin);
        } else {
            index += 1;
        }
    }
    none_begin
}
