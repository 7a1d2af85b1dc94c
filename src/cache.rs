//! The type-resolution cache.
//!
//! A concurrent map from key to the backend namespace it lives in. Lookups
//! that miss create an entry in the `Loading` state and hand the caller a
//! one-shot [`EntrySetter`]; everyone else arriving while the entry loads
//! waits on the entry's completion signal. The map-level operation is an
//! atomic load-or-store, which is what guarantees at most one in-flight
//! probe per key.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::warn;

use crate::types::LedisType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntryState {
    Loading,
    Exists,
    Deleted,
    Error,
}

#[derive(Debug)]
struct EntryInner {
    state: CacheEntryState,
    ledis_type: LedisType,
    written_at: Instant,
    /// Present exactly while the entry is `Loading`.
    done_loading: Option<watch::Receiver<bool>>,
}

#[derive(Debug)]
struct CacheEntry {
    inner: RwLock<EntryInner>,
}

impl CacheEntry {
    fn loading(rx: watch::Receiver<bool>) -> Arc<Self> {
        Arc::new(CacheEntry {
            inner: RwLock::new(EntryInner {
                state: CacheEntryState::Loading,
                ledis_type: LedisType::None,
                written_at: Instant::now(),
                done_loading: Some(rx),
            }),
        })
    }

    fn terminal(state: CacheEntryState, ledis_type: LedisType) -> Arc<Self> {
        Arc::new(CacheEntry {
            inner: RwLock::new(EntryInner {
                state,
                ledis_type,
                written_at: Instant::now(),
                done_loading: None,
            }),
        })
    }
}

/// A detached snapshot of one entry. Fields reflect the entry at snapshot
/// time; call [`EntryData::refresh`] to observe later transitions.
#[derive(Debug, Clone)]
pub struct EntryData {
    entry: Arc<CacheEntry>,
    pub key: Bytes,
    pub state: CacheEntryState,
    pub ledis_type: LedisType,
    pub written_at: Instant,
    pub done_loading: Option<watch::Receiver<bool>>,
}

impl EntryData {
    fn snapshot(key: Bytes, entry: &Arc<CacheEntry>, inner: &EntryInner) -> Self {
        EntryData {
            entry: entry.clone(),
            key,
            state: inner.state,
            ledis_type: inner.ledis_type,
            written_at: inner.written_at,
            done_loading: inner.done_loading.clone(),
        }
    }

    pub fn refresh(&mut self) {
        let inner = self.entry.inner.read();
        self.state = inner.state;
        self.ledis_type = inner.ledis_type;
        self.written_at = inner.written_at;
        self.done_loading = inner.done_loading.clone();
    }
}

/// The write half of one `Loading` entry.
///
/// Holding a setter is an obligation: the owner must publish a terminal
/// state on every path, otherwise waiters would hang until this value is
/// dropped. Dropping an unset setter publishes `Error` as a safety net and
/// logs, since it means a resolution path leaked.
#[derive(Debug)]
pub struct EntrySetter {
    entry: Arc<CacheEntry>,
    pub key: Bytes,
    done: Option<watch::Sender<bool>>,
}

impl EntrySetter {
    /// Publishes the terminal state and fires the completion signal. `state`
    /// must be `Exists`, `Deleted` or `Error`; the type is ignored unless the
    /// state is `Exists`.
    pub fn set(mut self, state: CacheEntryState, ledis_type: LedisType) {
        self.complete(state, ledis_type);
    }

    fn complete(&mut self, state: CacheEntryState, ledis_type: LedisType) {
        let sender = self
            .done
            .take()
            .expect("EntrySetter completed a second time");

        let ledis_type = match state {
            CacheEntryState::Exists => ledis_type,
            CacheEntryState::Deleted | CacheEntryState::Error => LedisType::None,
            CacheEntryState::Loading => {
                panic!("EntrySetter::set called with the Loading state")
            }
        };

        {
            let mut inner = self.entry.inner.write();
            inner.state = state;
            inner.ledis_type = ledis_type;
            inner.written_at = Instant::now();
            inner.done_loading = None;
        }

        let _ = sender.send(true);
    }
}

impl Drop for EntrySetter {
    fn drop(&mut self) {
        if self.done.is_some() {
            warn!(key = %String::from_utf8_lossy(&self.key), "type-cache setter dropped without publishing; marking entry as Error");
            self.complete(CacheEntryState::Error, LedisType::None);
        }
    }
}

/// Result of [`Cache::load_or_create_entry`]: either a snapshot of an entry
/// that is already loaded or loading, or the setter for an entry this caller
/// now owns.
#[derive(Debug)]
pub enum EntryRef {
    Data(EntryData),
    Setter(EntrySetter),
}

#[derive(Debug, Default)]
pub struct Cache {
    entries: DashMap<Bytes, Arc<CacheEntry>>,
}

impl Cache {
    pub fn new() -> Self {
        Cache::default()
    }

    /// Fast path: the resolved type iff the entry exists and is `Exists`.
    pub fn load_type(&self, key: &[u8]) -> Option<LedisType> {
        let entry = Arc::clone(self.entries.get(key)?.value());
        let inner = entry.inner.read();
        if inner.state == CacheEntryState::Exists {
            Some(inner.ledis_type)
        } else {
            None
        }
    }

    /// The primary access method. Creates a `Loading` entry (returning its
    /// setter) when the key is absent or its entry is terminal-failed
    /// (`Deleted` / `Error`); returns a snapshot when the entry is `Exists`
    /// or `Loading`.
    pub fn load_or_create_entry(&self, key: Bytes) -> EntryRef {
        let entry = match self.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(false);
                let entry = CacheEntry::loading(rx);
                vacant.insert(entry.clone());
                return EntryRef::Setter(EntrySetter {
                    entry,
                    key,
                    done: Some(tx),
                });
            }
        };
        self.prepare_entry(key, entry)
    }

    fn prepare_entry(&self, key: Bytes, entry: Arc<CacheEntry>) -> EntryRef {
        {
            let inner = entry.inner.read();
            if matches!(
                inner.state,
                CacheEntryState::Exists | CacheEntryState::Loading
            ) {
                let data = EntryData::snapshot(key, &entry, &inner);
                return EntryRef::Data(data);
            }
        }

        // Deleted or Error: take the write lock and re-check before claiming
        // the entry for a fresh load, another task may have claimed it in
        // the window between the two locks.
        let mut inner = entry.inner.write();
        if matches!(
            inner.state,
            CacheEntryState::Exists | CacheEntryState::Loading
        ) {
            let data = EntryData::snapshot(key, &entry, &inner);
            return EntryRef::Data(data);
        }

        let (tx, rx) = watch::channel(false);
        inner.state = CacheEntryState::Loading;
        inner.ledis_type = LedisType::None;
        inner.done_loading = Some(rx);
        drop(inner);

        EntryRef::Setter(EntrySetter {
            entry,
            key,
            done: Some(tx),
        })
    }

    /// Unconditional publish that refuses to overwrite a `Loading` entry
    /// (doing so would strand its waiters). Returns whether the update was
    /// applied.
    pub fn try_set_entry(&self, key: Bytes, state: CacheEntryState, ledis_type: LedisType) -> bool {
        let ledis_type = match state {
            CacheEntryState::Exists => ledis_type,
            CacheEntryState::Deleted | CacheEntryState::Error => LedisType::None,
            CacheEntryState::Loading => {
                panic!("Cache::try_set_entry called with the Loading state")
            }
        };

        let entry = match self.entries.entry(key) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::terminal(state, ledis_type));
                return true;
            }
        };

        let mut inner = entry.inner.write();
        if inner.state == CacheEntryState::Loading {
            return false;
        }
        inner.state = state;
        inner.ledis_type = ledis_type;
        inner.written_at = Instant::now();
        inner.done_loading = None;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
