// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of resolved permission sets.
//!
//! Keyed by user id. Entries expire after a fixed TTL and are dropped by the
//! database on any user, role or menu mutation.
//!
//! Every invalidation bumps a generation counter. Callers read the generation
//! before loading the data they resolve from and hand it back to
//! [`PermissionCache::put`]; a put from before the latest invalidation is
//! discarded, so a stale snapshot can never repopulate the cache.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::auth::PermissionSet;
use crate::models::EntityId;

struct CacheEntry {
    permissions: PermissionSet,
    inserted_at: Instant,
}

struct Inner {
    entries: LruCache<EntityId, CacheEntry>,
    generation: u64,
}

/// In-process LRU cache for resolved permissions.
pub struct PermissionCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl PermissionCache {
    /// Create a cache holding at most `capacity` users for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                generation: 0,
            }),
            ttl,
        }
    }

    /// Current invalidation generation. Read it before loading a user graph.
    pub fn generation(&self) -> u64 {
        self.inner.lock().map(|inner| inner.generation).unwrap_or(u64::MAX)
    }

    /// Cached permissions for a user, or `None` when absent or expired.
    pub fn get(&self, user_id: EntityId) -> Option<PermissionSet> {
        let mut inner = self.inner.lock().ok()?;
        if let Some(entry) = inner.entries.get(&user_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.permissions.clone());
            }
            inner.entries.pop(&user_id);
        }
        None
    }

    /// Store permissions resolved from data read at `generation`.
    ///
    /// Ignored when an invalidation happened since. Returns whether the
    /// entry was stored.
    pub fn put(&self, user_id: EntityId, permissions: PermissionSet, generation: u64) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        if inner.generation != generation {
            return false;
        }
        inner.entries.put(
            user_id,
            CacheEntry {
                permissions,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    pub fn invalidate(&self, user_id: EntityId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.generation = inner.generation.wrapping_add(1);
            inner.entries.pop(&user_id);
        }
    }

    /// Drop every entry. Used when a role or menu changes.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.generation = inner.generation.wrapping_add(1);
            inner.entries.clear();
        }
    }
}
