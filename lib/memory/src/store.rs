//! Context store for short-term conversation state.
//!
//! Contexts are kept whole: `put` replaces, never merges. Entries expire
//! `ttl` after their last `put`, and expiry is checked on every read, so a
//! stale entry is invisible even before the sweeper removes it.
//!
//! The in-process implementation splits keys over independently locked
//! shards. Writes to one conversation serialize on its shard while
//! conversations on other shards proceed untouched.

use crate::config::StoreConfig;
use crate::error::ContextStoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::debug;
use viki_core::{ConversationContext, ConversationId, Result};

/// Trait for short-term context storage.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Returns a snapshot of the live context for a conversation.
    ///
    /// Absent and expired entries both report `NotFound`.
    async fn get(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationContext, ContextStoreError>;

    /// Replaces the context for a conversation and restarts its TTL.
    async fn put(
        &self,
        conversation_id: &ConversationId,
        context: ConversationContext,
    ) -> Result<(), ContextStoreError>;

    /// Removes a context immediately. Returns whether an entry was removed;
    /// removing an absent key is not an error.
    async fn evict(&self, conversation_id: &ConversationId)
    -> Result<bool, ContextStoreError>;

    /// Removes every expired entry and returns how many were removed.
    async fn sweep(&self) -> Result<usize, ContextStoreError>;
}

#[derive(Debug)]
struct Entry {
    context: ConversationContext,
    stored_at: Instant,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type ShardMap = HashMap<ConversationId, Entry>;

/// Sharded, TTL-aware in-memory context store.
#[derive(Debug)]
pub struct ShardedContextStore {
    shards: Box<[RwLock<ShardMap>]>,
    hasher: RandomState,
    ttl: Duration,
    max_entries: Option<usize>,
    len: AtomicUsize,
}

impl ShardedContextStore {
    /// Creates a store from configuration.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self::with_ttl(config.ttl(), config.shard_count).with_max_entries(config.max_entries)
    }

    /// Creates an unbounded store with the given TTL and shard count.
    #[must_use]
    pub fn with_ttl(ttl: Duration, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| RwLock::new(ShardMap::new()))
            .collect();
        Self {
            shards,
            hasher: RandomState::new(),
            ttl,
            max_entries: None,
            len: AtomicUsize::new(0),
        }
    }

    /// Limits the number of stored entries.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Returns the configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the number of stored entries, including expired entries not
    /// yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force-evicts up to `count` entries, least recently stored first.
    ///
    /// This is the remedy for `CapacityExceeded`: callers pick which
    /// conversations to drop instead of the store discarding data silently.
    /// Entries re-stored while this runs are skipped.
    pub fn evict_oldest(
        &self,
        count: usize,
    ) -> Result<Vec<ConversationId>, ContextStoreError> {
        let mut candidates = Vec::new();
        for index in 0..self.shards.len() {
            let shard = self.read_shard(index)?;
            candidates.extend(
                shard
                    .iter()
                    .map(|(id, entry)| (entry.stored_at, index, id.clone())),
            );
        }
        candidates.sort_by_key(|(stored_at, _, _)| *stored_at);

        let mut evicted = Vec::new();
        for (stored_at, index, id) in candidates.into_iter().take(count) {
            let mut shard = self.write_shard(index)?;
            if shard.get(&id).is_some_and(|e| e.stored_at == stored_at) {
                shard.remove(&id);
                self.len.fetch_sub(1, Ordering::AcqRel);
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "force-evicted oldest contexts");
        }
        Ok(evicted)
    }

    fn shard_index(&self, conversation_id: &ConversationId) -> usize {
        (self.hasher.hash_one(conversation_id) % self.shards.len() as u64) as usize
    }

    fn read_shard(
        &self,
        index: usize,
    ) -> Result<RwLockReadGuard<'_, ShardMap>, ContextStoreError> {
        Ok(self.shards[index]
            .read()
            .map_err(|_| ContextStoreError::Poisoned { shard: index })?)
    }

    fn write_shard(
        &self,
        index: usize,
    ) -> Result<RwLockWriteGuard<'_, ShardMap>, ContextStoreError> {
        Ok(self.shards[index]
            .write()
            .map_err(|_| ContextStoreError::Poisoned { shard: index })?)
    }

    /// Claims room for one new entry. Returns false when the store is full.
    fn try_reserve_slot(&self) -> bool {
        let Some(max_entries) = self.max_entries else {
            self.len.fetch_add(1, Ordering::AcqRel);
            return true;
        };

        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max_entries).then_some(n + 1)
            })
            .is_ok()
    }

    /// Drops expired entries of one shard; the caller holds its write lock.
    fn purge_expired(&self, shard: &mut ShardMap, now: Instant) {
        let before = shard.len();
        shard.retain(|_, entry| !entry.is_expired(now));
        let purged = before - shard.len();
        if purged > 0 {
            self.len.fetch_sub(purged, Ordering::AcqRel);
        }
    }

    /// Removes expired entries from every shard, holding one write lock at a
    /// time.
    fn remove_expired(&self, now: Instant) -> Result<usize, ContextStoreError> {
        let mut removed = 0;

        for index in 0..self.shards.len() {
            let expired: Vec<ConversationId> = {
                let shard = self.read_shard(index)?;
                shard
                    .iter()
                    .filter(|(_, entry)| entry.is_expired(now))
                    .map(|(id, _)| id.clone())
                    .collect()
            };

            // Entries re-stored since the scan have a later expiry and are kept.
            for id in expired {
                let mut shard = self.write_shard(index)?;
                if shard.get(&id).is_some_and(|e| e.is_expired(now)) {
                    shard.remove(&id);
                    self.len.fetch_sub(1, Ordering::AcqRel);
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    /// Writes `context` into `shard`, handing it back when a new key finds
    /// the store full.
    fn write_entry(
        &self,
        shard: &mut ShardMap,
        conversation_id: &ConversationId,
        context: ConversationContext,
    ) -> std::result::Result<(), ConversationContext> {
        let now = Instant::now();
        let expires_at = now + self.ttl;

        if let Some(entry) = shard.get_mut(conversation_id) {
            entry.context = context;
            entry.stored_at = now;
            entry.expires_at = expires_at;
            return Ok(());
        }

        if self.max_entries.is_some() {
            self.purge_expired(shard, now);
        }
        if !self.try_reserve_slot() {
            return Err(context);
        }
        shard.insert(
            conversation_id.clone(),
            Entry {
                context,
                stored_at: now,
                expires_at,
            },
        );
        Ok(())
    }
}

impl Default for ShardedContextStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait]
impl ContextStore for ShardedContextStore {
    async fn get(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationContext, ContextStoreError> {
        let shard = self.read_shard(self.shard_index(conversation_id))?;
        match shard.get(conversation_id) {
            Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.context.clone()),
            _ => Err(ContextStoreError::NotFound {
                conversation_id: conversation_id.clone(),
            }
            .into()),
        }
    }

    async fn put(
        &self,
        conversation_id: &ConversationId,
        context: ConversationContext,
    ) -> Result<(), ContextStoreError> {
        if context.conversation_id != *conversation_id {
            return Err(ContextStoreError::KeyMismatch {
                key: conversation_id.clone(),
                context_id: context.conversation_id,
            }
            .into());
        }

        let index = self.shard_index(conversation_id);
        let context = {
            let mut shard = self.write_shard(index)?;
            match self.write_entry(&mut shard, conversation_id, context) {
                Ok(()) => return Ok(()),
                Err(context) => context,
            }
        };

        // Unswept entries in other shards still hold capacity.
        let reclaimed = self.remove_expired(Instant::now())?;
        debug!(reclaimed, "store full, reclaimed expired contexts");

        let mut shard = self.write_shard(index)?;
        self.write_entry(&mut shard, conversation_id, context)
            .map_err(|_| {
                ContextStoreError::CapacityExceeded {
                    max_entries: self.max_entries.unwrap_or_default(),
                }
                .into()
            })
    }

    async fn evict(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<bool, ContextStoreError> {
        let mut shard = self.write_shard(self.shard_index(conversation_id))?;
        let removed = shard.remove(conversation_id).is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::AcqRel);
            debug!(%conversation_id, "evicted context");
        }
        Ok(removed)
    }

    async fn sweep(&self) -> Result<usize, ContextStoreError> {
        let removed = self.remove_expired(Instant::now())?;
        if removed > 0 {
            debug!(removed, "swept expired contexts");
        }
        Ok(removed)
    }
}
