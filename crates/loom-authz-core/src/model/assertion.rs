// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A single named assertion (`r`, `p`, `g2`, `e`, `m`, ...) and its policy rows.

use std::collections::HashSet;

use super::Section;
use crate::error::{ModelError, PolicyError};

/// One policy or grouping row: values in token order.
pub type PolicyRow = Vec<String>;

/// Token marking the per-row effect column.
pub const EFFECT_TOKEN: &str = "eft";

/// Token marking the per-row priority column.
pub const PRIORITY_TOKEN: &str = "priority";

/// A named assertion with its token list and, for policy and role sections, its rows.
#[derive(Debug, Clone)]
pub struct Assertion {
	section: Section,
	key: String,
	value: String,
	tokens: Vec<String>,
	rows: Vec<PolicyRow>,
	index: HashSet<PolicyRow>,
	priority_index: Option<usize>,
}

impl Assertion {
	pub(crate) fn new(section: Section, key: &str, value: &str) -> Result<Self, ModelError> {
		let key = key.trim();
		let value = value.trim();

		if !key.starts_with(section.letter()) {
			return Err(ModelError::InvalidKey {
				section: section.header().to_string(),
				key: key.to_string(),
				expected: section.letter(),
			});
		}

		let tokens = if section.has_tokens() {
			parse_tokens(section, key, value)?
		} else {
			if value.is_empty() {
				return Err(ModelError::Syntax {
					section: section.header().to_string(),
					key: key.to_string(),
					message: "empty formula".to_string(),
				});
			}
			Vec::new()
		};

		let priority_index = match section {
			Section::Policy => tokens.iter().position(|t| t == PRIORITY_TOKEN),
			_ => None,
		};

		Ok(Self {
			section,
			key: key.to_string(),
			value: value.to_string(),
			tokens,
			rows: Vec::new(),
			index: HashSet::new(),
			priority_index,
		})
	}

	pub fn section(&self) -> Section {
		self.section
	}

	pub fn key(&self) -> &str {
		&self.key
	}

	/// The raw definition text (token list or formula).
	pub fn value(&self) -> &str {
		&self.value
	}

	pub fn tokens(&self) -> &[String] {
		&self.tokens
	}

	pub fn token_index(&self, token: &str) -> Option<usize> {
		self.tokens.iter().position(|t| t == token)
	}

	/// Rows in stored (evaluation) order.
	pub fn rows(&self) -> &[PolicyRow] {
		&self.rows
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn contains(&self, row: &[String]) -> bool {
		self.index.contains(row)
	}

	/// Checks arity, that values are single-line and, when a priority column exists,
	/// that it is an integer.
	pub(crate) fn check_row(&self, row: &[String]) -> Result<(), PolicyError> {
		if row.len() != self.tokens.len() {
			return Err(PolicyError::Arity {
				ptype: self.key.clone(),
				expected: self.tokens.len(),
				actual: row.len(),
			});
		}
		if row.iter().any(|value| has_line_break(value)) {
			return Err(PolicyError::LineBreak {
				ptype: self.key.clone(),
			});
		}
		if let Some(idx) = self.priority_index {
			parse_priority(&self.key, &row[idx])?;
		}
		Ok(())
	}

	/// Inserts a row. Returns `Ok(false)` if an identical row already exists.
	pub(crate) fn insert(&mut self, row: PolicyRow) -> Result<bool, PolicyError> {
		self.check_row(&row)?;
		if self.index.contains(&row) {
			return Ok(false);
		}

		match self.priority_index {
			Some(idx) => {
				let priority = parse_priority(&self.key, &row[idx])?;
				let at = self
					.rows
					.partition_point(|existing| stored_priority(existing, idx) <= priority);
				self.rows.insert(at, row.clone());
			}
			None => self.rows.push(row.clone()),
		}
		self.index.insert(row);
		Ok(true)
	}

	/// Removes a row. Returns `false` if it was not present.
	pub(crate) fn remove(&mut self, row: &[String]) -> bool {
		if !self.index.remove(row) {
			return false;
		}
		if let Some(pos) = self.rows.iter().position(|r| r.as_slice() == row) {
			self.rows.remove(pos);
		}
		true
	}

	/// Rows whose fields starting at `field_index` equal `values`; empty values match anything.
	pub(crate) fn filtered(
		&self,
		field_index: usize,
		values: &[String],
	) -> Result<Vec<PolicyRow>, PolicyError> {
		if values.is_empty() || field_index + values.len() > self.tokens.len() {
			return Err(PolicyError::InvalidFilter {
				ptype: self.key.clone(),
				field_index,
				count: values.len(),
			});
		}

		Ok(
			self
				.rows
				.iter()
				.filter(|row| {
					values
						.iter()
						.enumerate()
						.all(|(i, v)| v.is_empty() || row[field_index + i] == *v)
				})
				.cloned()
				.collect(),
		)
	}

	pub(crate) fn clear_rows(&mut self) {
		self.rows.clear();
		self.index.clear();
	}
}

fn parse_tokens(section: Section, key: &str, value: &str) -> Result<Vec<String>, ModelError> {
	let tokens: Vec<String> = value
		.split(',')
		.map(|t| t.trim().to_string())
		.filter(|t| !t.is_empty())
		.collect();

	if tokens.is_empty() {
		return Err(ModelError::EmptyTokens {
			section: section.header().to_string(),
			key: key.to_string(),
		});
	}

	if section == Section::Role {
		if let Some(bad) = tokens.iter().find(|t| t.as_str() != "_") {
			return Err(ModelError::InvalidToken {
				section: section.header().to_string(),
				key: key.to_string(),
				token: bad.clone(),
			});
		}
		if !(2..=3).contains(&tokens.len()) {
			return Err(ModelError::Syntax {
				section: section.header().to_string(),
				key: key.to_string(),
				message: "role definition takes two placeholders, or three with a domain"
					.to_string(),
			});
		}
		return Ok(tokens);
	}

	let mut seen = HashSet::new();
	for token in &tokens {
		if !is_identifier(token) {
			return Err(ModelError::InvalidToken {
				section: section.header().to_string(),
				key: key.to_string(),
				token: token.clone(),
			});
		}
		if !seen.insert(token.as_str()) {
			return Err(ModelError::DuplicateToken {
				section: section.header().to_string(),
				key: key.to_string(),
				token: token.clone(),
			});
		}
	}
	Ok(tokens)
}

/// Rows are stored one per line, so a value may not span lines.
pub(crate) fn has_line_break(value: &str) -> bool {
	value.contains(['\n', '\r'])
}

fn is_identifier(token: &str) -> bool {
	let mut chars = token.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_priority(ptype: &str, value: &str) -> Result<i64, PolicyError> {
	value
		.trim()
		.parse::<i64>()
		.map_err(|_| PolicyError::InvalidPriority {
			ptype: ptype.to_string(),
			value: value.to_string(),
		})
}

// Stored rows were validated on insert.
fn stored_priority(row: &[String], idx: usize) -> i64 {
	row[idx].trim().parse::<i64>().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(values: &[&str]) -> PolicyRow {
		values.iter().map(|v| v.to_string()).collect()
	}

	#[test]
	fn parses_tokens_in_order() {
		let a = Assertion::new(Section::Policy, "p", "sub, obj, act").unwrap();
		assert_eq!(a.tokens(), &["sub", "obj", "act"]);
		assert_eq!(a.token_index("obj"), Some(1));
	}

	#[test]
	fn rejects_duplicate_tokens() {
		let err = Assertion::new(Section::Request, "r", "sub, sub").unwrap_err();
		assert!(matches!(err, ModelError::DuplicateToken { .. }));
	}

	#[test]
	fn role_definition_requires_placeholders() {
		assert!(Assertion::new(Section::Role, "g", "_, _, _").is_ok());
		assert!(matches!(
			Assertion::new(Section::Role, "g", "_"),
			Err(ModelError::Syntax { .. })
		));
		assert!(matches!(
			Assertion::new(Section::Role, "g", "_, _, _, _"),
			Err(ModelError::Syntax { .. })
		));
		assert!(matches!(
			Assertion::new(Section::Role, "g", "user, role"),
			Err(ModelError::InvalidToken { .. })
		));
	}

	#[test]
	fn key_must_match_section() {
		let err = Assertion::new(Section::Policy, "g", "sub").unwrap_err();
		assert!(matches!(err, ModelError::InvalidKey { expected: 'p', .. }));
	}

	#[test]
	fn insert_is_idempotent() {
		let mut a = Assertion::new(Section::Policy, "p", "sub, obj, act").unwrap();
		assert_eq!(a.insert(row(&["alice", "data1", "read"])), Ok(true));
		assert_eq!(a.insert(row(&["alice", "data1", "read"])), Ok(false));
		assert_eq!(a.len(), 1);
	}

	#[test]
	fn insert_rejects_wrong_arity() {
		let mut a = Assertion::new(Section::Policy, "p", "sub, obj, act").unwrap();
		let err = a.insert(row(&["alice", "data1"])).unwrap_err();
		assert_eq!(
			err,
			PolicyError::Arity {
				ptype: "p".to_string(),
				expected: 3,
				actual: 2
			}
		);
		assert!(a.is_empty());
	}

	#[test]
	fn insert_rejects_line_breaks() {
		let mut a = Assertion::new(Section::Policy, "p", "sub, obj, act").unwrap();
		for value in ["line1\nline2", "line1\r\nline2", "trailing\r"] {
			assert_eq!(
				a.insert(row(&["alice", value, "read"])),
				Err(PolicyError::LineBreak {
					ptype: "p".to_string()
				})
			);
		}
		assert!(a.is_empty());
	}

	#[test]
	fn priority_rows_stay_sorted() {
		let mut a = Assertion::new(Section::Policy, "p", "priority, sub, obj, act, eft").unwrap();
		a.insert(row(&["10", "alice", "data1", "read", "allow"])).unwrap();
		a.insert(row(&["1", "alice", "data1", "read", "deny"])).unwrap();
		a.insert(row(&["10", "bob", "data1", "read", "allow"])).unwrap();
		a.insert(row(&["5", "carol", "data1", "read", "allow"])).unwrap();

		let order: Vec<&str> = a.rows().iter().map(|r| r[1].as_str()).collect();
		assert_eq!(order, vec!["alice", "carol", "alice", "bob"]);
		assert_eq!(a.rows()[0][4], "deny");
	}

	#[test]
	fn priority_must_be_integer() {
		let mut a = Assertion::new(Section::Policy, "p", "priority, sub").unwrap();
		let err = a.insert(row(&["high", "alice"])).unwrap_err();
		assert!(matches!(err, PolicyError::InvalidPriority { .. }));
	}

	#[test]
	fn remove_keeps_order() {
		let mut a = Assertion::new(Section::Policy, "p", "sub, obj").unwrap();
		a.insert(row(&["a", "1"])).unwrap();
		a.insert(row(&["b", "2"])).unwrap();
		a.insert(row(&["c", "3"])).unwrap();
		assert!(a.remove(&row(&["b", "2"])));
		assert!(!a.remove(&row(&["b", "2"])));
		assert_eq!(a.rows(), &[row(&["a", "1"]), row(&["c", "3"])]);
	}

	#[test]
	fn filter_treats_empty_as_wildcard() {
		let mut a = Assertion::new(Section::Policy, "p", "sub, obj, act").unwrap();
		a.insert(row(&["alice", "data1", "read"])).unwrap();
		a.insert(row(&["alice", "data2", "write"])).unwrap();
		a.insert(row(&["bob", "data1", "read"])).unwrap();

		let rows = a.filtered(0, &row(&["alice"])).unwrap();
		assert_eq!(rows.len(), 2);

		let rows = a.filtered(1, &row(&["", "read"])).unwrap();
		assert_eq!(rows.len(), 2);

		assert!(a.filtered(2, &row(&["read", "extra"])).is_err());
	}
}
