// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Named predicate registry for matcher calls.
//!
//! Built-ins:
//!
//! | Name | Arguments | Result |
//! |---|---|---|
//! | `keyMatch` | key, pattern | `*` in pattern matches any suffix |
//! | `keyMatch2` | key, pattern | `/*` wildcard and `:name` path segments |
//! | `keyMatch3` | key, pattern | `/*` wildcard and `{name}` path segments |
//! | `keyGet` | key, pattern | text matched by the `*` of `keyMatch` |
//! | `keyGet2` | key, pattern, name | text matched by `:name` |
//! | `regexMatch` | text, regex | regex search |
//! | `ipMatch` | address, address or CIDR | containment |
//! | `globMatch` | text, glob | shell glob |
//!
//! In `keyMatch2` and `keyMatch3` patterns every other character is literal, including
//! regex metacharacters such as `.`, and every `*` matches any run of characters, not only
//! a trailing `/*`.
//!
//! Patterns always come from policy data. Regexes use a linear-time engine with a
//! compiled-size limit so hostile patterns cannot stall evaluation.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::value::as_text;
use crate::error::EvalError;

const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// Implementation signature for matcher functions.
pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Accepted argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
	Exact(usize),
	/// Inclusive range.
	Range(usize, usize),
}

impl Arity {
	pub fn accepts(self, count: usize) -> bool {
		match self {
			Arity::Exact(n) => count == n,
			Arity::Range(min, max) => (min..=max).contains(&count),
		}
	}
}

impl fmt::Display for Arity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Arity::Exact(n) => write!(f, "{n}"),
			Arity::Range(min, max) => write!(f, "{min} to {max}"),
		}
	}
}

#[derive(Clone)]
pub struct Function {
	name: String,
	arity: Arity,
	func: FunctionImpl,
}

impl Function {
	pub fn new(name: impl Into<String>, arity: Arity, func: FunctionImpl) -> Self {
		Self {
			name: name.into(),
			arity,
			func,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn arity(&self) -> Arity {
		self.arity
	}

	pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
		(self.func)(args)
	}
}

impl fmt::Debug for Function {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Function")
			.field("name", &self.name)
			.field("arity", &self.arity)
			.finish_non_exhaustive()
	}
}

/// Name to implementation map consulted when a matcher is compiled.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
	functions: HashMap<String, Function>,
}

impl FunctionRegistry {
	/// An empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry holding every built-in predicate.
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();
		registry.register("keyMatch", Arity::Exact(2), |args| {
			let (key, pattern) = two_strings("keyMatch", args)?;
			Ok(Value::Bool(key_match(&key, &pattern)))
		});
		registry.register("keyMatch2", Arity::Exact(2), |args| {
			let (key, pattern) = two_strings("keyMatch2", args)?;
			path_match("keyMatch2", &key, &pattern, PathParams::Colon).map(Value::Bool)
		});
		registry.register("keyMatch3", Arity::Exact(2), |args| {
			let (key, pattern) = two_strings("keyMatch3", args)?;
			path_match("keyMatch3", &key, &pattern, PathParams::Braces).map(Value::Bool)
		});
		registry.register("keyGet", Arity::Exact(2), |args| {
			let (key, pattern) = two_strings("keyGet", args)?;
			Ok(Value::String(key_get(&key, &pattern)))
		});
		registry.register("keyGet2", Arity::Exact(3), |args| {
			let (key, pattern) = two_strings("keyGet2", args)?;
			let name = string_arg("keyGet2", args, 2)?;
			key_get2(&key, &pattern, &name).map(Value::String)
		});
		registry.register("regexMatch", Arity::Exact(2), |args| {
			let (text, pattern) = two_strings("regexMatch", args)?;
			Ok(Value::Bool(build_regex(&pattern)?.is_match(&text)))
		});
		registry.register("ipMatch", Arity::Exact(2), |args| {
			let (ip, network) = two_strings("ipMatch", args)?;
			ip_match(&ip, &network).map(Value::Bool)
		});
		registry.register("globMatch", Arity::Exact(2), |args| {
			let (text, pattern) = two_strings("globMatch", args)?;
			glob_match(&text, &pattern).map(Value::Bool)
		});
		registry
	}

	/// Registers or replaces a function.
	pub fn register<F>(&mut self, name: &str, arity: Arity, func: F)
	where
		F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
	{
		self
			.functions
			.insert(name.to_string(), Function::new(name, arity, Arc::new(func)));
	}

	pub fn get(&self, name: &str) -> Option<&Function> {
		self.functions.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.functions.contains_key(name)
	}

	/// Registered names, sorted.
	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
		names.sort_unstable();
		names
	}
}

fn string_arg(name: &str, args: &[Value], index: usize) -> Result<String, EvalError> {
	let value = args.get(index).ok_or_else(|| EvalError::Function {
		name: name.to_string(),
		message: format!("missing argument {}", index + 1),
	})?;
	as_text(value).ok_or_else(|| EvalError::Function {
		name: name.to_string(),
		message: format!("argument {} must be a string", index + 1),
	})
}

fn two_strings(name: &str, args: &[Value]) -> Result<(String, String), EvalError> {
	Ok((string_arg(name, args, 0)?, string_arg(name, args, 1)?))
}

fn build_regex(pattern: &str) -> Result<Regex, EvalError> {
	RegexBuilder::new(pattern)
		.size_limit(REGEX_SIZE_LIMIT)
		.build()
		.map_err(|err| EvalError::InvalidRegex {
			pattern: pattern.to_string(),
			message: err.to_string(),
		})
}

/// `*` in `pattern` matches everything from its position on.
pub fn key_match(key: &str, pattern: &str) -> bool {
	let Some(star) = pattern.find('*') else {
		return key == pattern;
	};
	let prefix = &pattern.as_bytes()[..star];
	match key.as_bytes().get(..star) {
		Some(head) if key.len() > star => head == prefix,
		_ => key.as_bytes() == prefix,
	}
}

/// The part of `key` covered by the `*` of `pattern`, or an empty string.
pub fn key_get(key: &str, pattern: &str) -> String {
	let Some(star) = pattern.find('*') else {
		return String::new();
	};
	if key.len() > star && key.as_bytes().get(..star) == Some(&pattern.as_bytes()[..star]) {
		return key.get(star..).unwrap_or_default().to_string();
	}
	String::new()
}

/// `keyMatch2` as a plain predicate, for use as a role matching function. A pattern that
/// does not compile matches nothing.
pub fn key_match2(key: &str, pattern: &str) -> bool {
	path_match("keyMatch2", key, pattern, PathParams::Colon).unwrap_or(false)
}

/// `keyMatch3` as a plain predicate. A pattern that does not compile matches nothing.
pub fn key_match3(key: &str, pattern: &str) -> bool {
	path_match("keyMatch3", key, pattern, PathParams::Braces).unwrap_or(false)
}

fn path_match(name: &str, key: &str, pattern: &str, style: PathParams) -> Result<bool, EvalError> {
	let (regex, _) = path_regex(name, pattern, style)?;
	Ok(regex.is_match(key))
}

#[derive(Clone, Copy)]
enum PathParams {
	Colon,
	Braces,
}

/// Compiles a path pattern to an anchored regex, returning it with its parameter names
/// in capture-group order.
fn path_regex(
	name: &str,
	pattern: &str,
	style: PathParams,
) -> Result<(Regex, Vec<String>), EvalError> {
	let chars: Vec<char> = pattern.chars().collect();
	let mut out = String::from("^");
	let mut params = Vec::new();
	let mut i = 0;

	while i < chars.len() {
		match (chars[i], style) {
			('*', _) => {
				out.push_str(".*");
				i += 1;
			}
			(':', PathParams::Colon) => {
				let start = i + 1;
				let mut end = start;
				while end < chars.len() && chars[end] != '/' {
					end += 1;
				}
				params.push(chars[start..end].iter().collect());
				out.push_str("([^/]+)");
				i = end;
			}
			('{', PathParams::Braces) => {
				let start = i + 1;
				let close = chars[start..]
					.iter()
					.position(|c| *c == '}')
					.map(|p| start + p)
					.ok_or_else(|| EvalError::Function {
						name: name.to_string(),
						message: format!("unclosed '{{' in pattern '{pattern}'"),
					})?;
				params.push(chars[start..close].iter().collect());
				out.push_str("([^/]+)");
				i = close + 1;
			}
			(c, _) => {
				out.push_str(&regex::escape(&c.to_string()));
				i += 1;
			}
		}
	}
	out.push('$');

	Ok((build_regex(&out)?, params))
}

fn key_get2(key: &str, pattern: &str, param: &str) -> Result<String, EvalError> {
	let (regex, params) = path_regex("keyGet2", pattern, PathParams::Colon)?;
	let Some(group) = params.iter().position(|p| p == param) else {
		return Ok(String::new());
	};
	Ok(regex
		.captures(key)
		.and_then(|caps| caps.get(group + 1))
		.map(|m| m.as_str().to_string())
		.unwrap_or_default())
}

fn ip_match(ip: &str, network: &str) -> Result<bool, EvalError> {
	let addr: IpAddr = ip
		.trim()
		.parse()
		.map_err(|_| EvalError::InvalidIp(ip.to_string()))?;
	let network = network.trim();
	if let Ok(net) = network.parse::<IpNet>() {
		return Ok(net.contains(&addr));
	}
	let other: IpAddr = network
		.parse()
		.map_err(|_| EvalError::InvalidIp(network.to_string()))?;
	Ok(addr == other)
}

fn glob_match(text: &str, pattern: &str) -> Result<bool, EvalError> {
	let compiled = glob::Pattern::new(pattern).map_err(|err| EvalError::InvalidGlob {
		pattern: pattern.to_string(),
		message: err.to_string(),
	})?;
	Ok(compiled.matches(text))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
		FunctionRegistry::with_builtins().get(name).unwrap().call(args)
	}

	#[test]
	fn key_match_prefix() {
		assert!(key_match("/foo/bar", "/foo/*"));
		assert!(key_match("/foo", "/foo*"));
		assert!(!key_match("/bar/foo", "/foo/*"));
		assert!(key_match("/foo", "/foo"));
		assert!(!key_match("/foo/", "/foo"));
	}

	#[test]
	fn key_get_returns_wildcard_tail() {
		assert_eq!(key_get("/foo/bar", "/foo/*"), "bar");
		assert_eq!(key_get("/bar", "/foo/*"), "");
		assert_eq!(key_get("/foo", "/foo"), "");
	}

	#[test]
	fn key_match2_params_and_wildcards() {
		assert_eq!(
			call("keyMatch2", &[json!("/resource/42"), json!("/resource/:id")]).unwrap(),
			json!(true)
		);
		assert_eq!(
			call("keyMatch2", &[json!("/resource/42/x"), json!("/resource/:id")]).unwrap(),
			json!(false)
		);
		assert_eq!(
			call("keyMatch2", &[json!("/alice/data/1"), json!("/alice/*")]).unwrap(),
			json!(true)
		);
		assert_eq!(
			call("keyMatch2", &[json!("/a.b"), json!("/a.b")]).unwrap(),
			json!(true)
		);
		assert_eq!(
			call("keyMatch2", &[json!("/axb"), json!("/a.b")]).unwrap(),
			json!(false)
		);
	}

	#[test]
	fn key_match2_literals_and_inner_wildcards() {
		let matches = |key: &str, pattern: &str| {
			call("keyMatch2", &[json!(key), json!(pattern)]).unwrap() == json!(true)
		};
		assert!(matches("/a.b/c", "/a.b/*"));
		assert!(!matches("/axb/c", "/a.b/*"));
		assert!(matches("/ab", "/a*"));
		assert!(matches("/a", "/a*"));
		assert!(matches("/files/report.pdf", "/files/*.pdf"));
		assert!(!matches("/files/report.txt", "/files/*.pdf"));
		assert!(!matches("/a+b", "/a+"));
		assert!(matches("/a+", "/a+"));
	}

	#[test]
	fn key_match3_literals_and_inner_wildcards() {
		let matches = |key: &str, pattern: &str| {
			call("keyMatch3", &[json!(key), json!(pattern)]).unwrap() == json!(true)
		};
		assert!(matches("/v1.0/users/7", "/v1.0/users/{id}"));
		assert!(!matches("/v1x0/users/7", "/v1.0/users/{id}"));
		assert!(!matches("/v1.0/users/7/x", "/v1.0/users/{id}"));
		assert!(matches("/ab/c", "/a*"));
	}

	#[test]
	fn oversized_regex_is_rejected() {
		let pattern = "((a{100}){100}){100}";
		assert!(matches!(
			call("regexMatch", &[json!("a"), json!(pattern)]),
			Err(EvalError::InvalidRegex { pattern: p, .. }) if p == pattern
		));
	}

	#[test]
	fn key_match3_braces() {
		assert_eq!(
			call("keyMatch3", &[json!("/proxy/myid/res"), json!("/proxy/{id}/*")]).unwrap(),
			json!(true)
		);
		assert!(matches!(
			call("keyMatch3", &[json!("/x"), json!("/{id")]),
			Err(EvalError::Function { .. })
		));
	}

	#[test]
	fn key_get2_extracts_named_segment() {
		assert_eq!(
			call(
				"keyGet2",
				&[json!("/org/acme/team/core"), json!("/org/:org/team/:team"), json!("team")]
			)
			.unwrap(),
			json!("core")
		);
		assert_eq!(
			call("keyGet2", &[json!("/org/acme"), json!("/org/:org"), json!("nope")]).unwrap(),
			json!("")
		);
	}

	#[test]
	fn regex_match_and_invalid_pattern() {
		assert_eq!(
			call("regexMatch", &[json!("GET"), json!("^(GET|POST)$")]).unwrap(),
			json!(true)
		);
		assert!(matches!(
			call("regexMatch", &[json!("GET"), json!("(")]),
			Err(EvalError::InvalidRegex { .. })
		));
	}

	#[test]
	fn ip_match_cidr_and_address() {
		assert_eq!(ip_match("192.168.2.123", "192.168.2.0/24"), Ok(true));
		assert_eq!(ip_match("192.168.3.1", "192.168.2.0/24"), Ok(false));
		assert_eq!(ip_match("10.0.0.1", "10.0.0.1"), Ok(true));
		assert_eq!(ip_match("::1", "::/0"), Ok(true));
		assert_eq!(
			ip_match("not-an-ip", "10.0.0.0/8"),
			Err(EvalError::InvalidIp("not-an-ip".to_string()))
		);
		assert_eq!(
			ip_match("10.0.0.1", "10.0.0.0/99"),
			Err(EvalError::InvalidIp("10.0.0.0/99".to_string()))
		);
	}

	#[test]
	fn glob_match_patterns() {
		assert_eq!(glob_match("/foo/bar", "/foo/*"), Ok(true));
		assert_eq!(glob_match("/foo/bar/baz", "/foo/*/baz"), Ok(true));
		assert!(matches!(
			glob_match("x", "[a-"),
			Err(EvalError::InvalidGlob { .. })
		));
	}

	#[test]
	fn non_string_arguments_are_rejected() {
		assert!(matches!(
			call("keyMatch", &[json!({"a": 1}), json!("/x")]),
			Err(EvalError::Function { .. })
		));
	}

	#[test]
	fn custom_functions_can_be_registered() {
		let mut registry = FunctionRegistry::new();
		registry.register("isOwner", Arity::Exact(2), |args| {
			Ok(Value::Bool(args[0] == args[1]))
		});
		assert!(registry.contains("isOwner"));
		assert!(!registry.contains("keyMatch"));
		assert!(Arity::Range(1, 3).accepts(2));
		assert!(!Arity::Exact(2).accepts(3));
		assert_eq!(registry.names(), vec!["isOwner"]);
	}
}
