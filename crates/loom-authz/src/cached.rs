// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Decision cache in front of a [`SyncedEnforcer`].
//!
//! Entries are keyed by enforce context and request values and tagged with the
//! enforcer revision they were computed at. Any edit, reload or function registration
//! moves the revision, so a stale entry is never served; it is dropped on the next
//! lookup. An optional time-to-live bounds how long an entry lives regardless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loom_authz_core::{EnforceContext, Enforcer};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::synced::SyncedEnforcer;

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Sizing for a [`CachedEnforcer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
	/// Most decisions held at once. Zero stores nothing.
	pub capacity: usize,
	/// How long a decision may be served. `None` keeps it until the policy changes.
	pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			capacity: DEFAULT_CACHE_CAPACITY,
			ttl: None,
		}
	}
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
	pub size: usize,
	pub capacity: usize,
	pub hits: u64,
	pub misses: u64,
}

struct Entry {
	allowed: bool,
	revision: u64,
	inserted: Instant,
}

struct DecisionCache {
	entries: RwLock<HashMap<String, Entry>>,
	config: CacheConfig,
	enabled: AtomicBool,
	hits: AtomicU64,
	misses: AtomicU64,
}

impl DecisionCache {
	fn new(config: CacheConfig) -> Self {
		Self {
			entries: RwLock::new(HashMap::with_capacity(config.capacity.min(1024))),
			config,
			enabled: AtomicBool::new(true),
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
		}
	}

	fn is_fresh(&self, entry: &Entry, revision: u64, now: Instant) -> bool {
		entry.revision == revision
			&& self
				.config
				.ttl
				.is_none_or(|ttl| now.duration_since(entry.inserted) < ttl)
	}

	fn get(&self, key: &str, revision: u64) -> Option<bool> {
		let now = Instant::now();
		let found = {
			let entries = self.entries.read();
			entries
				.get(key)
				.map(|entry| (self.is_fresh(entry, revision, now), entry.allowed))
		};

		match found {
			Some((true, allowed)) => {
				self.hits.fetch_add(1, Ordering::Relaxed);
				Some(allowed)
			}
			Some((false, _)) => {
				self.entries.write().remove(key);
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			}
			None => {
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			}
		}
	}

	fn insert(&self, key: String, allowed: bool, revision: u64) {
		if self.config.capacity == 0 {
			return;
		}
		let now = Instant::now();
		let mut entries = self.entries.write();

		if entries.len() >= self.config.capacity && !entries.contains_key(&key) {
			entries.retain(|_, entry| self.is_fresh(entry, revision, now));
			if entries.len() >= self.config.capacity {
				if let Some(victim) = entries.keys().next().cloned() {
					entries.remove(&victim);
				}
			}
		}

		entries.insert(
			key,
			Entry {
				allowed,
				revision,
				inserted: now,
			},
		);
	}

	fn clear(&self) {
		self.entries.write().clear();
	}

	fn stats(&self) -> CacheStats {
		CacheStats {
			size: self.entries.read().len(),
			capacity: self.config.capacity,
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
		}
	}
}

/// A [`SyncedEnforcer`] that remembers boolean decisions.
///
/// Only [`CachedEnforcer::enforce`] and its variants consult the cache. Policy edits go
/// through [`CachedEnforcer::enforcer`] and take effect for the next decision. Clones
/// share the cache and the enforcer.
#[derive(Clone)]
pub struct CachedEnforcer {
	enforcer: SyncedEnforcer,
	cache: Arc<DecisionCache>,
}

impl std::fmt::Debug for CachedEnforcer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CachedEnforcer")
			.field("enforcer", &self.enforcer)
			.field("config", &self.cache.config)
			.field("enabled", &self.is_cache_enabled())
			.finish()
	}
}

impl CachedEnforcer {
	pub fn new(enforcer: SyncedEnforcer, config: CacheConfig) -> Self {
		debug!(
			capacity = config.capacity,
			ttl = ?config.ttl,
			"decision cache initialized"
		);
		Self {
			enforcer,
			cache: Arc::new(DecisionCache::new(config)),
		}
	}

	/// The wrapped enforcer, for edits, storage and uncached queries.
	pub fn enforcer(&self) -> &SyncedEnforcer {
		&self.enforcer
	}

	pub fn enforce<V>(&self, request: &[V]) -> Result<bool>
	where
		V: Clone + Into<Value>,
	{
		self.decide(&EnforceContext::default(), request, |enforcer| {
			enforcer.enforce(request)
		})
	}

	pub fn enforce_with_context<V>(&self, context: &EnforceContext, request: &[V]) -> Result<bool>
	where
		V: Clone + Into<Value>,
	{
		self.decide(context, request, |enforcer| {
			Ok(enforcer.enforce_with_context(context, request)?.allowed)
		})
	}

	/// Fail-closed decision: any evaluation error is logged and denied.
	pub fn is_allowed<V>(&self, request: &[V]) -> bool
	where
		V: Clone + Into<Value>,
	{
		match self.enforce(request) {
			Ok(allowed) => allowed,
			Err(e) => {
				warn!(error = %e, "authorization check failed, denying");
				false
			}
		}
	}

	/// Turns lookups and inserts on or off. Disabling also drops every entry.
	pub fn enable_cache(&self, enabled: bool) {
		self.cache.enabled.store(enabled, Ordering::Release);
		if !enabled {
			self.cache.clear();
		}
		debug!(enabled, "decision cache toggled");
	}

	pub fn is_cache_enabled(&self) -> bool {
		self.cache.enabled.load(Ordering::Acquire)
	}

	/// Drops every cached decision.
	pub fn invalidate_cache(&self) {
		self.cache.clear();
		debug!("decision cache invalidated");
	}

	pub fn cache_stats(&self) -> CacheStats {
		self.cache.stats()
	}

	fn decide<V, F>(&self, context: &EnforceContext, request: &[V], compute: F) -> Result<bool>
	where
		V: Clone + Into<Value>,
		F: FnOnce(&Enforcer) -> loom_authz_core::Result<bool>,
	{
		if !self.is_cache_enabled() {
			return Ok(self.enforcer.read(compute)?);
		}

		let values: Vec<Value> = request.iter().cloned().map(Into::into).collect();
		let key = format!("{context}|{}", Value::Array(values));

		// Lookup, evaluation and insert see one revision of the policy.
		self.enforcer.read(|enforcer| {
			let revision = enforcer.revision();
			if let Some(allowed) = self.cache.get(&key, revision) {
				trace!(revision, "decision cache hit");
				return Ok(allowed);
			}
			let allowed = compute(enforcer)?;
			self.cache.insert(key, allowed, revision);
			Ok(allowed)
		})
	}
}
