// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Change notifications for other enforcer instances.

use loom_authz_core::PolicyRow;
use serde::Serialize;

/// A successful local mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyChange {
	AddedRules {
		ptype: String,
		rows: Vec<PolicyRow>,
	},
	RemovedRules {
		ptype: String,
		rows: Vec<PolicyRow>,
	},
	RemovedFiltered {
		ptype: String,
		field_index: usize,
		values: Vec<String>,
	},
	/// Every row was persisted through the adapter.
	Saved,
}

/// Receives one call per mutation, after it is visible to new decisions.
///
/// Called outside the enforcer's locks, so implementations may read back through the
/// enforcer. Notifications are neither batched nor retried.
pub trait Watcher: Send + Sync {
	fn update(&self, change: &PolicyChange);
}

impl<F> Watcher for F
where
	F: Fn(&PolicyChange) + Send + Sync,
{
	fn update(&self, change: &PolicyChange) {
		self(change)
	}
}
