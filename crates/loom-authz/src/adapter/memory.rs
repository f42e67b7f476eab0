// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use loom_authz_core::{PolicyRow, PolicySet};
use parking_lot::Mutex;
use tracing::trace;

use super::Adapter;
use crate::error::AdapterError;

/// In-process policy store. Supports every incremental operation.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
	policy: Mutex<PolicySet>,
}

impl MemoryAdapter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_policy(policy: PolicySet) -> Self {
		Self {
			policy: Mutex::new(policy),
		}
	}

	/// Copies the stored rows out.
	pub fn snapshot(&self) -> PolicySet {
		self.policy.lock().clone()
	}

	/// Replaces the stored rows without going through an enforcer.
	pub fn replace(&self, policy: PolicySet) {
		*self.policy.lock() = policy;
	}
}

#[async_trait]
impl Adapter for MemoryAdapter {
	async fn load_policy(&self) -> Result<PolicySet, AdapterError> {
		Ok(self.snapshot())
	}

	async fn save_policy(&self, policy: &PolicySet) -> Result<(), AdapterError> {
		trace!(rows = policy.len(), "saving policy to memory");
		self.replace(policy.clone());
		Ok(())
	}

	async fn add_policy(&self, ptype: &str, row: &PolicyRow) -> Result<(), AdapterError> {
		let mut policy = self.policy.lock();
		if !policy.rules(ptype).contains(row) {
			policy.push(ptype, row.clone());
		}
		Ok(())
	}

	async fn remove_policy(&self, ptype: &str, row: &PolicyRow) -> Result<(), AdapterError> {
		self.policy.lock().remove(ptype, row);
		Ok(())
	}

	async fn remove_filtered_policy(
		&self,
		ptype: &str,
		field_index: usize,
		values: &[String],
	) -> Result<(), AdapterError> {
		self.policy.lock().remove_filtered(ptype, field_index, values);
		Ok(())
	}
}
