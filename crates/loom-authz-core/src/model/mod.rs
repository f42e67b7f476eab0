// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The policy metamodel.
//!
//! A [`Model`] is a table of named [`Assertion`]s grouped by [`Section`]:
//!
//! | Section | Header | Keys | Content |
//! |---|---|---|---|
//! | request | `[request_definition]` | `r`, `r2`, ... | request token names |
//! | policy | `[policy_definition]` | `p`, `p2`, ... | policy token names + rows |
//! | role | `[role_definition]` | `g`, `g2`, ... | `_` placeholders + grouping rows |
//! | effect | `[policy_effect]` | `e`, ... | effect formula |
//! | matcher | `[matchers]` | `m`, ... | matcher formula |
//!
//! The definition is fixed once validated. Only policy and grouping rows change at runtime.

mod assertion;
mod policy_set;
mod text;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use assertion::{Assertion, PolicyRow, EFFECT_TOKEN, PRIORITY_TOKEN};
pub use policy_set::PolicySet;

use crate::effect::EffectKind;
use crate::error::{ModelError, PolicyError};
use crate::matcher::parser;

/// A model section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
	Request,
	Policy,
	Role,
	Effect,
	Matcher,
}

impl Section {
	pub const ALL: [Section; 5] = [
		Section::Request,
		Section::Policy,
		Section::Role,
		Section::Effect,
		Section::Matcher,
	];

	/// Leading letter of every key in this section.
	pub fn letter(self) -> char {
		match self {
			Section::Request => 'r',
			Section::Policy => 'p',
			Section::Role => 'g',
			Section::Effect => 'e',
			Section::Matcher => 'm',
		}
	}

	/// Header used in the text form.
	pub fn header(self) -> &'static str {
		match self {
			Section::Request => "request_definition",
			Section::Policy => "policy_definition",
			Section::Role => "role_definition",
			Section::Effect => "policy_effect",
			Section::Matcher => "matchers",
		}
	}

	pub fn from_header(header: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|s| s.header() == header)
	}

	pub fn from_letter(letter: char) -> Option<Self> {
		Self::ALL.into_iter().find(|s| s.letter() == letter)
	}

	/// Whether values in this section are token lists rather than formulas.
	pub fn has_tokens(self) -> bool {
		matches!(self, Section::Request | Section::Policy | Section::Role)
	}

	/// Whether this section carries rows.
	pub fn has_rows(self) -> bool {
		matches!(self, Section::Policy | Section::Role)
	}
}

impl fmt::Display for Section {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.header())
	}
}

/// A policy metamodel plus the rows currently stored against it.
#[derive(Debug, Clone, Default)]
pub struct Model {
	sections: BTreeMap<Section, BTreeMap<String, Assertion>>,
}

impl Model {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses and validates a model from its text form.
	pub fn from_text(text: &str) -> Result<Self, ModelError> {
		let mut model = Self::new();
		for (section, key, value) in text::parse(text)? {
			model.add_def(section, &key, &value)?;
		}
		model.validate()?;
		debug!(assertions = model.assertion_count(), "model loaded");
		Ok(model)
	}

	/// Adds or replaces a definition. Call [`Model::validate`] once all definitions are in.
	pub fn add_def(&mut self, section: Section, key: &str, value: &str) -> Result<(), ModelError> {
		let assertion = Assertion::new(section, key, value)?;
		self
			.sections
			.entry(section)
			.or_default()
			.insert(assertion.key().to_string(), assertion);
		Ok(())
	}

	/// Checks required definitions and cross references between formulas and assertions.
	pub fn validate(&self) -> Result<(), ModelError> {
		for (section, key) in [
			(Section::Request, "r"),
			(Section::Policy, "p"),
			(Section::Effect, "e"),
			(Section::Matcher, "m"),
		] {
			let Some(assertions) = self.sections.get(&section) else {
				return Err(ModelError::MissingSection(section.header().to_string()));
			};
			if !assertions.contains_key(key) {
				return Err(ModelError::MissingKey {
					section: section.header().to_string(),
					key: key.to_string(),
				});
			}
		}

		for assertion in self.assertions(Section::Matcher) {
			self.validate_matcher(assertion)?;
		}

		for assertion in self.assertions(Section::Effect) {
			if EffectKind::parse(assertion.value()).is_none() {
				return Err(ModelError::UnsupportedEffect {
					section: Section::Effect.header().to_string(),
					key: assertion.key().to_string(),
					formula: assertion.value().to_string(),
				});
			}
		}

		Ok(())
	}

	fn validate_matcher(&self, assertion: &Assertion) -> Result<(), ModelError> {
		let expr = parser::parse(assertion.value()).map_err(|err| ModelError::Syntax {
			section: Section::Matcher.header().to_string(),
			key: assertion.key().to_string(),
			message: err.to_string(),
		})?;

		let mut undefined = None;
		expr.visit_idents(&mut |path| {
			if undefined.is_some() {
				return;
			}
			let head = path[0].as_str();
			let defined = self.get(Section::Request, head).is_some()
				|| self.get(Section::Policy, head).is_some();
			if !defined {
				undefined = Some(head.to_string());
			}
		});

		match undefined {
			Some(reference) => Err(ModelError::UndefinedAssertion {
				section: Section::Matcher.header().to_string(),
				key: assertion.key().to_string(),
				reference,
			}),
			None => Ok(()),
		}
	}

	pub fn get(&self, section: Section, key: &str) -> Option<&Assertion> {
		self.sections.get(&section).and_then(|s| s.get(key))
	}

	/// Assertions of one section, ordered by key.
	pub fn assertions(&self, section: Section) -> impl Iterator<Item = &Assertion> {
		self.sections.get(&section).into_iter().flat_map(|s| s.values())
	}

	pub fn assertion_count(&self) -> usize {
		self.sections.values().map(BTreeMap::len).sum()
	}

	/// The section holding rows of `ptype` (`p*` or `g*`).
	pub fn section_of(&self, ptype: &str) -> Option<Section> {
		let section = Section::from_letter(ptype.chars().next()?)?;
		if section.has_rows() && self.get(section, ptype).is_some() {
			Some(section)
		} else {
			None
		}
	}

	fn rows_assertion(&self, ptype: &str) -> Result<&Assertion, PolicyError> {
		self
			.section_of(ptype)
			.and_then(|section| self.get(section, ptype))
			.ok_or_else(|| PolicyError::UnknownPolicyType(ptype.to_string()))
	}

	fn rows_assertion_mut(&mut self, ptype: &str) -> Result<&mut Assertion, PolicyError> {
		let section = self
			.section_of(ptype)
			.ok_or_else(|| PolicyError::UnknownPolicyType(ptype.to_string()))?;
		self
			.sections
			.get_mut(&section)
			.and_then(|s| s.get_mut(ptype))
			.ok_or_else(|| PolicyError::UnknownPolicyType(ptype.to_string()))
	}

	pub fn rows(&self, ptype: &str) -> Result<&[PolicyRow], PolicyError> {
		Ok(self.rows_assertion(ptype)?.rows())
	}

	/// Whether `row` is stored under `ptype`. Unknown types hold nothing.
	pub fn has_row(&self, ptype: &str, row: &[String]) -> bool {
		self
			.rows_assertion(ptype)
			.map(|a| a.contains(row))
			.unwrap_or(false)
	}

	/// Validates a row against `ptype` without storing it.
	pub fn check_row(&self, ptype: &str, row: &[String]) -> Result<(), PolicyError> {
		self.rows_assertion(ptype)?.check_row(row)
	}

	pub fn add_row(&mut self, ptype: &str, row: PolicyRow) -> Result<bool, PolicyError> {
		self.rows_assertion_mut(ptype)?.insert(row)
	}

	/// Adds rows as a unit: if any row is invalid nothing is stored.
	/// Returns the rows that were not already present.
	pub fn add_rows(
		&mut self,
		ptype: &str,
		rows: Vec<PolicyRow>,
	) -> Result<Vec<PolicyRow>, PolicyError> {
		let assertion = self.rows_assertion_mut(ptype)?;
		for row in &rows {
			assertion.check_row(row)?;
		}

		let mut added = Vec::new();
		for row in rows {
			if assertion.insert(row.clone())? {
				added.push(row);
			}
		}
		Ok(added)
	}

	pub fn remove_row(&mut self, ptype: &str, row: &[String]) -> Result<bool, PolicyError> {
		Ok(self.rows_assertion_mut(ptype)?.remove(row))
	}

	/// Removes rows, returning those that were present.
	pub fn remove_rows(
		&mut self,
		ptype: &str,
		rows: &[PolicyRow],
	) -> Result<Vec<PolicyRow>, PolicyError> {
		let assertion = self.rows_assertion_mut(ptype)?;
		Ok(rows.iter().filter(|row| assertion.remove(row)).cloned().collect())
	}

	pub fn filtered_rows(
		&self,
		ptype: &str,
		field_index: usize,
		values: &[String],
	) -> Result<Vec<PolicyRow>, PolicyError> {
		self.rows_assertion(ptype)?.filtered(field_index, values)
	}

	/// Removes every row matching the field filter and returns them.
	pub fn remove_filtered_rows(
		&mut self,
		ptype: &str,
		field_index: usize,
		values: &[String],
	) -> Result<Vec<PolicyRow>, PolicyError> {
		let matched = self.filtered_rows(ptype, field_index, values)?;
		let assertion = self.rows_assertion_mut(ptype)?;
		for row in &matched {
			assertion.remove(row);
		}
		Ok(matched)
	}

	/// Drops every policy and grouping row.
	pub fn clear_policy(&mut self) {
		for section in [Section::Policy, Section::Role] {
			if let Some(assertions) = self.sections.get_mut(&section) {
				for assertion in assertions.values_mut() {
					assertion.clear_rows();
				}
			}
		}
	}

	/// Copies the current rows out, grouped by type.
	pub fn policy_set(&self) -> PolicySet {
		let mut set = PolicySet::new();
		for section in [Section::Policy, Section::Role] {
			for assertion in self.assertions(section) {
				for row in assertion.rows() {
					set.push(assertion.key(), row.clone());
				}
			}
		}
		set
	}

	/// Replaces every stored row with the contents of `set`.
	///
	/// On error the model may hold a partial row set; callers load into a scratch copy
	/// (see [`Model::definition_only`]).
	pub fn load_policy_set(&mut self, set: &PolicySet) -> Result<(), PolicyError> {
		self.clear_policy();
		for (ptype, row) in set.iter() {
			self.add_row(ptype, row.clone())?;
		}
		Ok(())
	}

	/// A copy of the definition with no rows.
	pub fn definition_only(&self) -> Model {
		let mut model = self.clone();
		model.clear_policy();
		model
	}

	/// Text form of the definition, parseable by [`Model::from_text`].
	pub fn to_text(&self) -> String {
		let mut out = String::new();
		for section in Section::ALL {
			let mut assertions = self.assertions(section).peekable();
			if assertions.peek().is_none() {
				continue;
			}
			if !out.is_empty() {
				out.push('\n');
			}
			out.push_str(&format!("[{}]\n", section.header()));
			for assertion in assertions {
				out.push_str(&format!("{} = {}\n", assertion.key(), assertion.value()));
			}
		}
		out
	}
}
