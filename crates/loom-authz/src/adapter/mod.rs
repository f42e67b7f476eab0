// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy storage.
//!
//! An adapter is the source of truth on reload and the durability sink on save. The
//! enforcer never retries adapter calls; failures reach the caller unchanged.

mod file;
mod memory;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;

use async_trait::async_trait;
use loom_authz_core::{PolicyRow, PolicySet};

use crate::error::AdapterError;

#[async_trait]
pub trait Adapter: Send + Sync {
	/// Reads every stored row.
	async fn load_policy(&self) -> Result<PolicySet, AdapterError>;

	/// Replaces everything stored with `policy`.
	async fn save_policy(&self, policy: &PolicySet) -> Result<(), AdapterError>;

	async fn add_policy(&self, _ptype: &str, _row: &PolicyRow) -> Result<(), AdapterError> {
		Err(AdapterError::Unsupported("add_policy"))
	}

	async fn add_policies(&self, ptype: &str, rows: &[PolicyRow]) -> Result<(), AdapterError> {
		for row in rows {
			self.add_policy(ptype, row).await?;
		}
		Ok(())
	}

	async fn remove_policy(&self, _ptype: &str, _row: &PolicyRow) -> Result<(), AdapterError> {
		Err(AdapterError::Unsupported("remove_policy"))
	}

	async fn remove_policies(&self, ptype: &str, rows: &[PolicyRow]) -> Result<(), AdapterError> {
		for row in rows {
			self.remove_policy(ptype, row).await?;
		}
		Ok(())
	}

	/// Removes rows whose fields from `field_index` on equal `values`; empty values
	/// match anything.
	async fn remove_filtered_policy(
		&self,
		_ptype: &str,
		_field_index: usize,
		_values: &[String],
	) -> Result<(), AdapterError> {
		Err(AdapterError::Unsupported("remove_filtered_policy"))
	}
}
