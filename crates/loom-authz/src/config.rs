// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration: defaults, then a TOML file, then `LOOM_AUTHZ_*` variables.
//!
//! ```toml
//! max_hierarchy_level = 10
//! default_decision = "deny"
//! auto_build_role_links = true
//! auto_save = true
//! auto_reload_interval_secs = 30
//! cache_capacity = 10000
//! cache_ttl_secs = 60
//! ```

use std::path::PathBuf;
use std::time::Duration;

use loom_authz_core::{DefaultDecision, EnforcerConfig, DEFAULT_MAX_HIERARCHY_LEVEL};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cached::{CacheConfig, DEFAULT_CACHE_CAPACITY};
use crate::error::ConfigError;

/// Runtime configuration for a [`SyncedEnforcer`](crate::SyncedEnforcer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
	pub enforcer: EnforcerConfig,
	/// Persist each mutation through the adapter before applying it.
	pub auto_save: bool,
	/// Period of the background reload task. `None` disables it.
	pub auto_reload_interval: Option<Duration>,
	/// Decision cache used by [`SyncedEnforcerBuilder::build_cached`](crate::SyncedEnforcerBuilder::build_cached).
	pub cache: CacheConfig,
}

impl Default for AuthzConfig {
	fn default() -> Self {
		AuthzConfigLayer::default().finalize()
	}
}

/// One partially-specified configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfigLayer {
	pub max_hierarchy_level: Option<usize>,
	pub default_decision: Option<DefaultDecision>,
	pub auto_build_role_links: Option<bool>,
	pub auto_save: Option<bool>,
	pub auto_reload_interval_secs: Option<u64>,
	pub cache_capacity: Option<usize>,
	pub cache_ttl_secs: Option<u64>,
}

impl AuthzConfigLayer {
	/// Overlays `other` on `self`; set fields in `other` win.
	pub fn merge(&mut self, other: AuthzConfigLayer) {
		if other.max_hierarchy_level.is_some() {
			self.max_hierarchy_level = other.max_hierarchy_level;
		}
		if other.default_decision.is_some() {
			self.default_decision = other.default_decision;
		}
		if other.auto_build_role_links.is_some() {
			self.auto_build_role_links = other.auto_build_role_links;
		}
		if other.auto_save.is_some() {
			self.auto_save = other.auto_save;
		}
		if other.auto_reload_interval_secs.is_some() {
			self.auto_reload_interval_secs = other.auto_reload_interval_secs;
		}
		if other.cache_capacity.is_some() {
			self.cache_capacity = other.cache_capacity;
		}
		if other.cache_ttl_secs.is_some() {
			self.cache_ttl_secs = other.cache_ttl_secs;
		}
	}

	pub fn finalize(self) -> AuthzConfig {
		AuthzConfig {
			enforcer: EnforcerConfig {
				max_hierarchy_level: self
					.max_hierarchy_level
					.unwrap_or(DEFAULT_MAX_HIERARCHY_LEVEL),
				default_decision: self.default_decision.unwrap_or_default(),
				auto_build_role_links: self.auto_build_role_links.unwrap_or(true),
			},
			auto_save: self.auto_save.unwrap_or(true),
			auto_reload_interval: self
				.auto_reload_interval_secs
				.filter(|secs| *secs > 0)
				.map(Duration::from_secs),
			cache: CacheConfig {
				capacity: self.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
				ttl: self
					.cache_ttl_secs
					.filter(|secs| *secs > 0)
					.map(Duration::from_secs),
			},
		}
	}
}

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<AuthzConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<AuthzConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(AuthzConfigLayer::default())
	}
}

/// TOML file source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<AuthzConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(AuthzConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: AuthzConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Convention: LOOM_AUTHZ_<FIELD>
pub struct EnvSource {
	lookup: Lookup,
}

impl EnvSource {
	pub fn new() -> Self {
		Self::with_lookup(|name| std::env::var(name).ok())
	}

	/// Reads variables through `lookup` instead of the process environment.
	pub fn with_lookup<F>(lookup: F) -> Self
	where
		F: Fn(&str) -> Option<String> + Send + Sync + 'static,
	{
		Self {
			lookup: Box::new(lookup),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name)
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
		match self.var(name) {
			Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(true)),
			Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(false)),
			Some(v) => Err(ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid boolean value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn u64(&self, name: &str) -> Result<Option<u64>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid u64 value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn usize(&self, name: &str) -> Result<Option<usize>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid usize value '{v}'"),
			}),
			None => Ok(None),
		}
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<AuthzConfigLayer, ConfigError> {
		debug!("loading environment variables");
		let default_decision = match self.var("LOOM_AUTHZ_DEFAULT_DECISION") {
			Some(v) => Some(v.parse::<DefaultDecision>().map_err(|message| {
				ConfigError::InvalidValue {
					key: "LOOM_AUTHZ_DEFAULT_DECISION".to_string(),
					message,
				}
			})?),
			None => None,
		};

		Ok(AuthzConfigLayer {
			max_hierarchy_level: self.usize("LOOM_AUTHZ_MAX_HIERARCHY_LEVEL")?,
			default_decision,
			auto_build_role_links: self.bool("LOOM_AUTHZ_AUTO_BUILD_ROLE_LINKS")?,
			auto_save: self.bool("LOOM_AUTHZ_AUTO_SAVE")?,
			auto_reload_interval_secs: self.u64("LOOM_AUTHZ_AUTO_RELOAD_INTERVAL_SECS")?,
			cache_capacity: self.usize("LOOM_AUTHZ_CACHE_CAPACITY")?,
			cache_ttl_secs: self.u64("LOOM_AUTHZ_CACHE_TTL_SECS")?,
		})
	}
}

/// Merges `sources` in precedence order and finalizes the result.
pub fn load_config(sources: &[&dyn ConfigSource]) -> Result<AuthzConfig, ConfigError> {
	let mut ordered: Vec<&dyn ConfigSource> = sources.to_vec();
	ordered.sort_by_key(|source| source.precedence());

	let mut merged = AuthzConfigLayer::default();
	for source in ordered {
		trace!(source = source.name(), "merging config source");
		merged.merge(source.load()?);
	}
	Ok(merged.finalize())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use tempfile::TempDir;

	fn env(vars: &[(&str, &str)]) -> EnvSource {
		let map: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		EnvSource::with_lookup(move |name| map.get(name).cloned())
	}

	#[test]
	fn defaults() {
		let config = AuthzConfig::default();
		assert_eq!(config.enforcer, EnforcerConfig::default());
		assert!(config.auto_save);
		assert_eq!(config.auto_reload_interval, None);
		assert_eq!(config.cache, CacheConfig::default());
	}

	#[test]
	fn cache_settings_layer() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("authz.toml");
		std::fs::write(&path, "cache_capacity = 64\ncache_ttl_secs = 0\n").unwrap();

		let file = TomlSource::new(&path);
		let env = env(&[("LOOM_AUTHZ_CACHE_TTL_SECS", "15")]);
		let sources: [&dyn ConfigSource; 2] = [&file, &env];
		let config = load_config(&sources).unwrap();
		assert_eq!(config.cache.capacity, 64);
		assert_eq!(config.cache.ttl, Some(Duration::from_secs(15)));

		let only_file: [&dyn ConfigSource; 1] = [&file];
		let config = load_config(&only_file).unwrap();
		assert_eq!(config.cache.ttl, None);
	}

	#[test]
	fn merge_prefers_later_values() {
		let mut base = AuthzConfigLayer {
			max_hierarchy_level: Some(3),
			auto_save: Some(true),
			..Default::default()
		};
		base.merge(AuthzConfigLayer {
			auto_save: Some(false),
			..Default::default()
		});
		assert_eq!(base.max_hierarchy_level, Some(3));
		assert_eq!(base.auto_save, Some(false));
	}

	#[test]
	fn zero_interval_disables_reload() {
		let config = AuthzConfigLayer {
			auto_reload_interval_secs: Some(0),
			..Default::default()
		}
		.finalize();
		assert_eq!(config.auto_reload_interval, None);
	}

	#[test]
	fn env_overrides_file() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("authz.toml");
		std::fs::write(
			&path,
			"max_hierarchy_level = 4\ndefault_decision = \"allow\"\nauto_reload_interval_secs = 30\n",
		)
		.unwrap();

		let file = TomlSource::new(&path);
		let env = env(&[("LOOM_AUTHZ_DEFAULT_DECISION", "deny")]);
		let sources: [&dyn ConfigSource; 3] = [&env, &file, &DefaultsSource];
		let config = load_config(&sources).unwrap();

		assert_eq!(config.enforcer.max_hierarchy_level, 4);
		assert_eq!(config.enforcer.default_decision, DefaultDecision::Deny);
		assert_eq!(config.auto_reload_interval, Some(Duration::from_secs(30)));
	}

	#[test]
	fn missing_file_is_skipped() {
		let dir = TempDir::new().unwrap();
		let source = TomlSource::new(dir.path().join("absent.toml"));
		assert_eq!(source.load().unwrap(), AuthzConfigLayer::default());
	}

	#[test]
	fn malformed_file_reports_path() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("authz.toml");
		std::fs::write(&path, "max_hierarchy_level = \"many\"").unwrap();
		let err = TomlSource::new(&path).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn invalid_env_values_name_the_variable() {
		let err = env(&[("LOOM_AUTHZ_AUTO_SAVE", "sometimes")])
			.load()
			.unwrap_err();
		match err {
			ConfigError::InvalidValue { key, .. } => assert_eq!(key, "LOOM_AUTHZ_AUTO_SAVE"),
			other => panic!("unexpected error: {other:?}"),
		}

		let err = env(&[("LOOM_AUTHZ_DEFAULT_DECISION", "maybe")])
			.load()
			.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}

	#[test]
	fn empty_env_values_are_ignored() {
		let layer = env(&[("LOOM_AUTHZ_MAX_HIERARCHY_LEVEL", "  ")]).load().unwrap();
		assert_eq!(layer.max_hierarchy_level, None);
	}
}
