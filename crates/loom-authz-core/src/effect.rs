// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Folding per-row matcher outcomes into one decision.

use serde::{Deserialize, Serialize};

use crate::config::DefaultDecision;

/// Declared effect of a matched policy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
	Allow,
	Deny,
	Indeterminate,
}

impl Effect {
	/// Reads an `eft` column value. Anything but `allow`/`deny` is indeterminate.
	pub fn from_column(value: &str) -> Self {
		match value.trim() {
			"allow" => Effect::Allow,
			"deny" => Effect::Deny,
			_ => Effect::Indeterminate,
		}
	}
}

/// Supported `[policy_effect]` formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
	/// `some(where (p.eft == allow))`
	AllowOverride,
	/// `!some(where (p.eft == deny))`
	DenyOverride,
	/// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
	AllowAndDeny,
	/// `priority(p.eft) || deny`
	Priority,
}

impl EffectKind {
	/// Recognises a formula, ignoring whitespace. The effect column may be named after
	/// any policy type (`p2.eft`).
	pub fn parse(formula: &str) -> Option<Self> {
		let compact: String = formula.chars().filter(|c| !c.is_whitespace()).collect();
		if !compact.is_ascii() {
			return None;
		}
		match unnumbered_policy(&compact).as_str() {
			"some(where(p.eft==allow))" => Some(EffectKind::AllowOverride),
			"!some(where(p.eft==deny))" => Some(EffectKind::DenyOverride),
			"some(where(p.eft==allow))&&!some(where(p.eft==deny))" => Some(EffectKind::AllowAndDeny),
			"priority(p.eft)||deny" => Some(EffectKind::Priority),
			_ => None,
		}
	}
}

/// Rewrites `p2.eft` and the like to `p.eft`.
fn unnumbered_policy(compact: &str) -> String {
	let bytes = compact.as_bytes();
	let mut out = String::with_capacity(compact.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'p' {
			let digits = bytes[i + 1..]
				.iter()
				.take_while(|b| b.is_ascii_digit())
				.count();
			if digits > 0 && compact[i + 1 + digits..].starts_with(".eft") {
				out.push('p');
				i += 1 + digits;
				continue;
			}
		}
		out.push(char::from(bytes[i]));
		i += 1;
	}
	out
}

/// Outcome of folding a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
	pub allowed: bool,
	/// Index of the row that decided the outcome, if any.
	pub deciding_row: Option<usize>,
	/// True when no row matched and the configured default applied.
	pub defaulted: bool,
}

/// An effect formula paired with the decision used when nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effector {
	kind: EffectKind,
	default: DefaultDecision,
}

impl Effector {
	pub fn new(kind: EffectKind, default: DefaultDecision) -> Self {
		Self { kind, default }
	}

	pub fn kind(&self) -> EffectKind {
		self.kind
	}

	pub fn default_decision(&self) -> DefaultDecision {
		self.default
	}

	/// Starts folding one decision.
	pub fn stream(&self) -> EffectStream {
		EffectStream {
			effector: *self,
			matched: false,
			first_allow: None,
			result: None,
		}
	}

	/// Verdict for a request evaluated against no rows.
	pub fn empty(&self) -> Verdict {
		self.stream().finish()
	}
}

/// Accumulates matched rows in evaluation order.
#[derive(Debug)]
pub struct EffectStream {
	effector: Effector,
	matched: bool,
	first_allow: Option<usize>,
	result: Option<(bool, usize)>,
}

impl EffectStream {
	/// Records that row `index` matched with `effect`. Returns `true` once the decision
	/// can no longer change, so the caller may stop evaluating rows.
	pub fn push(&mut self, index: usize, effect: Effect) -> bool {
		if self.result.is_some() {
			return true;
		}
		self.matched = true;

		match (self.effector.kind, effect) {
			(EffectKind::AllowOverride, Effect::Allow) => self.result = Some((true, index)),
			(EffectKind::DenyOverride | EffectKind::AllowAndDeny, Effect::Deny) => {
				self.result = Some((false, index));
			}
			(EffectKind::DenyOverride | EffectKind::AllowAndDeny, Effect::Allow) => {
				self.first_allow.get_or_insert(index);
			}
			(EffectKind::Priority, Effect::Allow) => self.result = Some((true, index)),
			(EffectKind::Priority, Effect::Deny) => self.result = Some((false, index)),
			(_, Effect::Indeterminate) | (EffectKind::AllowOverride, Effect::Deny) => {}
		}

		self.result.is_some()
	}

	pub fn is_final(&self) -> bool {
		self.result.is_some()
	}

	pub fn finish(self) -> Verdict {
		if let Some((allowed, row)) = self.result {
			return Verdict {
				allowed,
				deciding_row: Some(row),
				defaulted: false,
			};
		}

		if !self.matched {
			return Verdict {
				allowed: self.effector.default.is_allow(),
				deciding_row: None,
				defaulted: true,
			};
		}

		match (self.effector.kind, self.first_allow) {
			(EffectKind::DenyOverride | EffectKind::AllowAndDeny, Some(row)) => Verdict {
				allowed: true,
				deciding_row: Some(row),
				defaulted: false,
			},
			_ => Verdict {
				allowed: false,
				deciding_row: None,
				defaulted: false,
			},
		}
	}
}
