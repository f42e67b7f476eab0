// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization runtime for Loom.
//!
//! Wraps the engine from `loom-authz-core` for use from many tasks at once, with policy
//! storage, change notifications and periodic hot reload.
//!
//! # Features
//!
//! - **Concurrent decisions**: reads never wait on storage I/O or on other readers
//! - **Atomic updates**: edits and reloads become visible to new decisions all at once
//! - **Storage**: [`MemoryAdapter`] and [`FileAdapter`], or any [`Adapter`]
//! - **Hot reload**: a background task that swaps in the adapter's policy on a timer
//! - **Decision cache**: [`CachedEnforcer`] remembers answers until the policy changes
//! - **Layered config**: defaults, TOML file, then `LOOM_AUTHZ_*` environment variables
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use loom_authz::{FileAdapter, Model, SyncedEnforcer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = Model::from_text(&std::fs::read_to_string("model.conf")?)?;
//!     let enforcer = SyncedEnforcer::builder(model)
//!         .adapter(Arc::new(FileAdapter::new("policy.csv")))
//!         .build()
//!         .await?;
//!
//!     enforcer.add_role_for_user("alice", "admin", None).await?;
//!     if enforcer.is_allowed(&["alice", "data1", "read"]) {
//!         println!("allowed");
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cached;
pub mod config;
pub mod error;
mod reload;
pub mod synced;
pub mod watcher;

pub use adapter::{Adapter, FileAdapter, MemoryAdapter};
pub use cached::{CacheConfig, CacheStats, CachedEnforcer};
pub use config::{
	load_config, AuthzConfig, AuthzConfigLayer, ConfigSource, DefaultsSource, EnvSource, Precedence,
	TomlSource,
};
pub use error::{AdapterError, ConfigError, Error, Result};
pub use synced::{SyncedEnforcer, SyncedEnforcerBuilder};
pub use watcher::{PolicyChange, Watcher};

pub use loom_authz_core::{
	DefaultDecision, Decision, EnforceContext, Enforcer, EnforcerConfig, Model, PolicyRow,
	PolicySet,
};
