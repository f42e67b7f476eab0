// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! INI-style model text: `[section]` headers and `key = value` lines.

use std::collections::HashSet;

use super::Section;
use crate::error::ModelError;

/// Splits model text into `(section, key, value)` definitions in file order.
pub(crate) fn parse(text: &str) -> Result<Vec<(Section, String, String)>, ModelError> {
	let mut defs = Vec::new();
	let mut seen = HashSet::new();
	let mut section: Option<Section> = None;
	let mut pending: Option<(usize, String)> = None;

	for (idx, raw) in text.lines().enumerate() {
		let line_no = idx + 1;
		let trimmed = raw.trim();

		let (start, line) = match pending.take() {
			Some((start, mut acc)) => {
				acc.push(' ');
				acc.push_str(trimmed);
				(start, acc)
			}
			None => {
				if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
					continue;
				}
				(line_no, trimmed.to_string())
			}
		};

		if let Some(head) = line.strip_suffix('\\') {
			pending = Some((start, head.trim_end().to_string()));
			continue;
		}

		if let Some(header) = line.strip_prefix('[') {
			let name = header
				.strip_suffix(']')
				.ok_or_else(|| ModelError::InvalidLine {
					line: start,
					message: "unterminated section header".to_string(),
				})?
				.trim();
			section = Some(
				Section::from_header(name).ok_or_else(|| ModelError::UnknownSection(name.to_string()))?,
			);
			continue;
		}

		let current = section.ok_or_else(|| ModelError::InvalidLine {
			line: start,
			message: "definition outside of a section".to_string(),
		})?;

		let (key, value) = line.split_once('=').ok_or_else(|| ModelError::InvalidLine {
			line: start,
			message: format!("expected 'key = value' in [{}]", current.header()),
		})?;
		let key = key.trim().to_string();
		if key.is_empty() {
			return Err(ModelError::InvalidLine {
				line: start,
				message: "empty key".to_string(),
			});
		}
		if !seen.insert((current, key.clone())) {
			return Err(ModelError::Syntax {
				section: current.header().to_string(),
				key,
				message: format!("duplicate definition at line {start}"),
			});
		}

		defs.push((current, key, value.trim().to_string()));
	}

	if let Some((start, _)) = pending {
		return Err(ModelError::InvalidLine {
			line: start,
			message: "line continuation at end of input".to_string(),
		});
	}

	Ok(defs)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_sections_and_comments() {
		let text = "# comment\n[request_definition]\n; another\nr = sub, obj\n\n[matchers]\nm = r.sub == p.sub\n";
		let defs = parse(text).unwrap();
		assert_eq!(
			defs,
			vec![
				(Section::Request, "r".to_string(), "sub, obj".to_string()),
				(Section::Matcher, "m".to_string(), "r.sub == p.sub".to_string()),
			]
		);
	}

	#[test]
	fn joins_continuation_lines() {
		let text = "[matchers]\nm = r.sub == p.sub \\\n  && r.obj == p.obj\n";
		let defs = parse(text).unwrap();
		assert_eq!(defs[0].2, "r.sub == p.sub && r.obj == p.obj");
	}

	#[test]
	fn value_may_contain_equals() {
		let defs = parse("[matchers]\nm = r.sub == p.sub\n").unwrap();
		assert_eq!(defs[0].1, "m");
		assert_eq!(defs[0].2, "r.sub == p.sub");
	}

	#[test]
	fn rejects_unknown_section() {
		assert_eq!(
			parse("[roles]\ng = _, _\n").unwrap_err(),
			ModelError::UnknownSection("roles".to_string())
		);
	}

	#[test]
	fn rejects_definition_before_section() {
		assert!(matches!(
			parse("r = sub\n"),
			Err(ModelError::InvalidLine { line: 1, .. })
		));
	}

	#[test]
	fn rejects_line_without_equals() {
		assert!(matches!(
			parse("[request_definition]\nr sub\n"),
			Err(ModelError::InvalidLine { line: 2, .. })
		));
	}

	#[test]
	fn rejects_duplicate_key() {
		let err = parse("[request_definition]\nr = sub\nr = obj\n").unwrap_err();
		assert!(matches!(err, ModelError::Syntax { ref key, .. } if key == "r"));
	}
}
