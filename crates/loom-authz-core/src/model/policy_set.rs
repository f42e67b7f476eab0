// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::assertion::has_line_break;
use super::PolicyRow;
use crate::error::PolicyError;

/// Policy and grouping rows keyed by type (`p`, `g`, `g2`, ...).
///
/// This is the exchange format between an enforcer and its storage: adapters load and
/// save whole `PolicySet`s, and reloads build a new snapshot from one.
///
/// The line form is one row per line, type first:
///
/// ```text
/// p, admin, data1, read
/// g, alice, admin
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet {
	rules: BTreeMap<String, Vec<PolicyRow>>,
}

impl PolicySet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, ptype: impl Into<String>, row: PolicyRow) {
		self.rules.entry(ptype.into()).or_default().push(row);
	}

	/// Builder form of [`PolicySet::push`].
	pub fn with_rule<I, S>(mut self, ptype: &str, row: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.push(ptype, row.into_iter().map(Into::into).collect());
		self
	}

	pub fn rules(&self, ptype: &str) -> &[PolicyRow] {
		self.rules.get(ptype).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn ptypes(&self) -> impl Iterator<Item = &str> {
		self.rules.keys().map(String::as_str)
	}

	/// All rows as `(ptype, row)` pairs.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &PolicyRow)> {
		self
			.rules
			.iter()
			.flat_map(|(ptype, rows)| rows.iter().map(move |row| (ptype.as_str(), row)))
	}

	pub fn len(&self) -> usize {
		self.rules.values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Order-independent view for comparing sets.
	pub fn as_set(&self) -> BTreeSet<(String, PolicyRow)> {
		self
			.iter()
			.map(|(ptype, row)| (ptype.to_string(), row.clone()))
			.collect()
	}

	/// Removes rows of `ptype` matching the field filter; empty filter values match anything.
	pub fn remove_filtered(&mut self, ptype: &str, field_index: usize, values: &[String]) -> usize {
		let Some(rows) = self.rules.get_mut(ptype) else {
			return 0;
		};
		let before = rows.len();
		rows.retain(|row| {
			!values.iter().enumerate().all(|(i, v)| {
				v.is_empty() || row.get(field_index + i).map(|f| f == v).unwrap_or(false)
			})
		});
		before - rows.len()
	}

	/// Removes one row, returning whether it was present.
	pub fn remove(&mut self, ptype: &str, row: &[String]) -> bool {
		let Some(rows) = self.rules.get_mut(ptype) else {
			return false;
		};
		match rows.iter().position(|r| r.as_slice() == row) {
			Some(pos) => {
				rows.remove(pos);
				true
			}
			None => false,
		}
	}

	/// Parses the line form. Blank lines and `#` comments are skipped.
	pub fn from_lines(text: &str) -> Result<Self, PolicyError> {
		let mut set = Self::new();
		for (idx, raw) in text.lines().enumerate() {
			let line = raw.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			let mut fields = split_fields(line).map_err(|message| PolicyError::InvalidLine {
				line: idx + 1,
				message,
			})?;
			if fields.len() < 2 {
				return Err(PolicyError::InvalidLine {
					line: idx + 1,
					message: "expected a policy type and at least one value".to_string(),
				});
			}
			let ptype = fields.remove(0);
			if ptype.is_empty() {
				return Err(PolicyError::InvalidLine {
					line: idx + 1,
					message: "empty policy type".to_string(),
				});
			}
			set.push(ptype, fields);
		}
		Ok(set)
	}

	/// Renders the line form, quoting values that would not survive re-parsing.
	///
	/// A line break in a type or value would split its row in two, so it is rejected.
	pub fn to_lines(&self) -> Result<String, PolicyError> {
		let mut out = String::new();
		for (ptype, row) in self.iter() {
			if has_line_break(ptype) || row.iter().any(|value| has_line_break(value)) {
				return Err(PolicyError::LineBreak {
					ptype: ptype.to_string(),
				});
			}
			out.push_str(ptype);
			for value in row {
				out.push_str(", ");
				out.push_str(&quote(value));
			}
			out.push('\n');
		}
		Ok(out)
	}
}

fn split_fields(line: &str) -> Result<Vec<String>, String> {
	let mut fields = Vec::new();
	let mut chars = line.chars().peekable();

	loop {
		while chars.peek().is_some_and(|c| c.is_whitespace()) {
			chars.next();
		}

		let mut field = String::new();
		if chars.peek() == Some(&'"') {
			chars.next();
			loop {
				match chars.next() {
					Some('"') if chars.peek() == Some(&'"') => {
						chars.next();
						field.push('"');
					}
					Some('"') => break,
					Some(c) => field.push(c),
					None => return Err("unterminated quoted value".to_string()),
				}
			}
			while chars.peek().is_some_and(|c| c.is_whitespace()) {
				chars.next();
			}
			match chars.next() {
				None => {
					fields.push(field);
					return Ok(fields);
				}
				Some(',') => fields.push(field),
				Some(c) => return Err(format!("unexpected '{c}' after quoted value")),
			}
		} else {
			loop {
				match chars.next() {
					None => {
						fields.push(field.trim().to_string());
						return Ok(fields);
					}
					Some(',') => break,
					Some(c) => field.push(c),
				}
			}
			fields.push(field.trim().to_string());
		}
	}
}

fn quote(value: &str) -> String {
	let needs_quotes = value.contains(',')
		|| value.contains('"')
		|| value.trim() != value
		|| value.is_empty();
	if needs_quotes {
		format!("\"{}\"", value.replace('"', "\"\""))
	} else {
		value.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_lines_and_skips_comments() {
		let text = "# seed\np, admin, data1, read\n\ng, alice, admin\n";
		let set = PolicySet::from_lines(text).unwrap();
		assert_eq!(set.len(), 2);
		assert_eq!(set.rules("p"), &[vec!["admin", "data1", "read"]]);
		assert_eq!(set.rules("g"), &[vec!["alice", "admin"]]);
		assert!(set.rules("g2").is_empty());
	}

	#[test]
	fn quoted_values_keep_commas() {
		let set = PolicySet::from_lines(r#"p, alice, "r.sub.age > 18, ok", "say ""hi""""#).unwrap();
		assert_eq!(
			set.rules("p")[0],
			vec!["alice", "r.sub.age > 18, ok", "say \"hi\""]
		);
	}

	#[test]
	fn to_lines_reparses_to_same_rows() {
		let set = PolicySet::new()
			.with_rule("p", ["alice", "a,b", "read"])
			.with_rule("p", ["bob", " padded ", ""])
			.with_rule("g", ["alice", "admin"]);
		let reparsed = PolicySet::from_lines(&set.to_lines().unwrap()).unwrap();
		assert_eq!(reparsed.as_set(), set.as_set());
	}

	#[test]
	fn to_lines_refuses_values_spanning_lines() {
		let set = PolicySet::new()
			.with_rule("p", ["alice", "line1\nline2", "read"])
			.with_rule("g", ["alice", "admin"]);
		assert_eq!(
			set.to_lines().unwrap_err(),
			PolicyError::LineBreak {
				ptype: "p".to_string()
			}
		);

		let set = PolicySet::new().with_rule("p", ["alice", "data1\r", "read"]);
		assert!(set.to_lines().is_err());
	}

	#[test]
	fn rejects_type_only_line() {
		assert_eq!(
			PolicySet::from_lines("p, a, b\np\n").unwrap_err(),
			PolicyError::InvalidLine {
				line: 2,
				message: "expected a policy type and at least one value".to_string()
			}
		);
	}

	#[test]
	fn rejects_unterminated_quote() {
		assert!(matches!(
			PolicySet::from_lines("p, \"alice"),
			Err(PolicyError::InvalidLine { line: 1, .. })
		));
	}

	#[test]
	fn remove_filtered_uses_wildcards() {
		let mut set = PolicySet::new()
			.with_rule("p", ["alice", "data1", "read"])
			.with_rule("p", ["alice", "data2", "write"])
			.with_rule("p", ["bob", "data1", "read"]);
		let removed = set.remove_filtered("p", 1, &["data1".to_string(), String::new()]);
		assert_eq!(removed, 2);
		assert_eq!(set.rules("p"), &[vec!["alice", "data2", "write"]]);
		assert!(set.remove("p", &["alice".to_string(), "data2".to_string(), "write".to_string()]));
		assert!(set.is_empty());
	}
}
