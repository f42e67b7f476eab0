// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enforcer configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default maximum depth of role inheritance traversal.
pub const DEFAULT_MAX_HIERARCHY_LEVEL: usize = 10;

/// Decision returned when no policy row matched a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultDecision {
	#[default]
	Deny,
	Allow,
}

impl DefaultDecision {
	pub fn is_allow(self) -> bool {
		matches!(self, DefaultDecision::Allow)
	}
}

impl fmt::Display for DefaultDecision {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DefaultDecision::Deny => write!(f, "deny"),
			DefaultDecision::Allow => write!(f, "allow"),
		}
	}
}

impl FromStr for DefaultDecision {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"deny" => Ok(DefaultDecision::Deny),
			"allow" => Ok(DefaultDecision::Allow),
			other => Err(format!("unknown default decision: {other:?}")),
		}
	}
}

/// Tunables for a single [`Enforcer`](crate::Enforcer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcerConfig {
	/// Maximum number of inheritance hops followed by role queries.
	pub max_hierarchy_level: usize,
	/// Decision when no policy row matches.
	pub default_decision: DefaultDecision,
	/// Keep role graphs in sync with grouping rows on every edit.
	pub auto_build_role_links: bool,
}

impl Default for EnforcerConfig {
	fn default() -> Self {
		Self {
			max_hierarchy_level: DEFAULT_MAX_HIERARCHY_LEVEL,
			default_decision: DefaultDecision::Deny,
			auto_build_role_links: true,
		}
	}
}

impl EnforcerConfig {
	/// Builder: set the default decision.
	pub fn with_default_decision(mut self, decision: DefaultDecision) -> Self {
		self.default_decision = decision;
		self
	}

	/// Builder: set the role hierarchy depth ceiling.
	pub fn with_max_hierarchy_level(mut self, level: usize) -> Self {
		self.max_hierarchy_level = level;
		self
	}

	/// Builder: toggle automatic role graph maintenance.
	pub fn with_auto_build_role_links(mut self, enabled: bool) -> Self {
		self.auto_build_role_links = enabled;
		self
	}
}
