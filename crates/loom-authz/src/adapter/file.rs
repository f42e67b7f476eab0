// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use loom_authz_core::{PolicyError, PolicySet};
use tracing::debug;

use super::Adapter;
use crate::error::AdapterError;

/// Stores rows in a text file, one `ptype, v0, v1, ...` line per row.
///
/// Saves write a sibling `.tmp` file and rename it over the target, so readers never
/// see a partially written policy. Incremental operations are unsupported; an enforcer
/// with auto-save applies edits in memory and relies on [`Adapter::save_policy`].
#[derive(Debug, Clone)]
pub struct FileAdapter {
	path: PathBuf,
}

impl FileAdapter {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn tmp_path(&self) -> PathBuf {
		let mut name = self
			.path
			.file_name()
			.map(OsString::from)
			.unwrap_or_else(|| OsString::from("policy"));
		name.push(".tmp");
		self.path.with_file_name(name)
	}
}

#[async_trait]
impl Adapter for FileAdapter {
	async fn load_policy(&self) -> Result<PolicySet, AdapterError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "policy file not found, loading empty policy");
			return Ok(PolicySet::new());
		}

		let contents = tokio::fs::read_to_string(&self.path).await?;
		let policy = PolicySet::from_lines(&contents).map_err(|e| match e {
			PolicyError::InvalidLine { line, message } => AdapterError::Parse { line, message },
			other => AdapterError::Parse {
				line: 0,
				message: other.to_string(),
			},
		})?;

		debug!(path = %self.path.display(), rows = policy.len(), "loaded policy file");
		Ok(policy)
	}

	async fn save_policy(&self, policy: &PolicySet) -> Result<(), AdapterError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await?;
		}

		let contents = policy.to_lines().map_err(AdapterError::Encode)?;
		let tmp_path = self.tmp_path();
		tokio::fs::write(&tmp_path, contents).await?;
		tokio::fs::rename(&tmp_path, &self.path).await?;

		debug!(path = %self.path.display(), rows = policy.len(), "saved policy file");
		Ok(())
	}
}
