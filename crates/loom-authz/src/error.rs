// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use loom_authz_core::{AuthzError, PolicyError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Authz(#[from] AuthzError),

	#[error("adapter error: {0}")]
	Adapter(#[from] AdapterError),

	#[error("no adapter configured")]
	NoAdapter,

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

impl Error {
	/// True when the error came from policy storage rather than from the engine.
	pub fn is_adapter(&self) -> bool {
		matches!(self, Error::Adapter(_) | Error::NoAdapter)
	}
}

/// Failures reported by policy storage.
#[derive(Debug, Error)]
pub enum AdapterError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("line {line}: {message}")]
	Parse { line: usize, message: String },

	/// The policy cannot be written in the adapter's storage format.
	#[error("cannot encode policy: {0}")]
	Encode(PolicyError),

	/// The adapter does not implement this operation. Callers that persist
	/// incrementally treat this as "nothing to do".
	#[error("operation not supported by adapter: {0}")]
	Unsupported(&'static str),

	#[error("backend error: {0}")]
	Backend(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },
}
