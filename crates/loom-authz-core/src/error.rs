// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for model definition, matcher compilation, evaluation and policy edits.

use thiserror::Error;

/// Result type alias for authorization engine operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Top-level error type for the authorization engine.
#[derive(Debug, Error)]
pub enum AuthzError {
	#[error("model error: {0}")]
	Model(#[from] ModelError),

	#[error("compile error: {0}")]
	Compile(#[from] CompileError),

	#[error("evaluation error: {0}")]
	Eval(#[from] EvalError),

	#[error("policy error: {0}")]
	Policy(#[from] PolicyError),
}

/// Errors raised while loading or validating a model definition.
///
/// These are fatal: an enforcer is never constructed from an invalid model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
	#[error("line {line}: {message}")]
	InvalidLine { line: usize, message: String },

	#[error("unknown section [{0}]")]
	UnknownSection(String),

	#[error("missing required section [{0}]")]
	MissingSection(String),

	#[error("[{section}] missing required key '{key}'")]
	MissingKey { section: String, key: String },

	#[error("[{section}] {key}: key must start with '{expected}'")]
	InvalidKey {
		section: String,
		key: String,
		expected: char,
	},

	#[error("[{section}] {key}: no tokens defined")]
	EmptyTokens { section: String, key: String },

	#[error("[{section}] {key}: duplicate token '{token}'")]
	DuplicateToken {
		section: String,
		key: String,
		token: String,
	},

	#[error("[{section}] {key}: invalid token '{token}'")]
	InvalidToken {
		section: String,
		key: String,
		token: String,
	},

	#[error("[{section}] {key}: references undefined assertion '{reference}'")]
	UndefinedAssertion {
		section: String,
		key: String,
		reference: String,
	},

	#[error("[{section}] {key}: unsupported effect formula '{formula}'")]
	UnsupportedEffect {
		section: String,
		key: String,
		formula: String,
	},

	#[error("[{section}] {key}: {message}")]
	Syntax {
		section: String,
		key: String,
		message: String,
	},
}

/// Errors raised while compiling a matcher expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
	#[error("syntax error at offset {offset}: {message}")]
	Syntax { offset: usize, message: String },

	#[error("unknown identifier '{0}'")]
	UnknownIdentifier(String),

	#[error("'{assertion}' has no token '{token}'")]
	UnknownToken { assertion: String, token: String },

	#[error("unknown function '{0}'")]
	UnknownFunction(String),

	#[error("function '{name}' expects {expected} argument(s), got {actual}")]
	Arity {
		name: String,
		expected: String,
		actual: usize,
	},

	#[error("policy values have no attributes: '{0}'")]
	PolicyAttribute(String),
}

/// Errors raised while evaluating a compiled matcher against a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
	#[error("request has {actual} value(s), model expects {expected}")]
	RequestArity { expected: usize, actual: usize },

	#[error("type mismatch: cannot apply '{op}' to {lhs} and {rhs}")]
	TypeMismatch { op: String, lhs: String, rhs: String },

	#[error("matcher produced a non-boolean value: {0}")]
	NonBoolean(String),

	#[error("unknown attribute '{0}'")]
	UnknownAttribute(String),

	#[error("invalid regular expression '{pattern}': {message}")]
	InvalidRegex { pattern: String, message: String },

	#[error("invalid IP address or network '{0}'")]
	InvalidIp(String),

	#[error("invalid glob pattern '{pattern}': {message}")]
	InvalidGlob { pattern: String, message: String },

	#[error("division by zero")]
	DivisionByZero,

	#[error("{name}: {message}")]
	Function { name: String, message: String },

	#[error("eval() expression failed to compile: {0}")]
	Eval(String),
}

/// Errors raised by policy row edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
	#[error("unknown policy type '{0}'")]
	UnknownPolicyType(String),

	#[error("policy type '{ptype}' expects {expected} value(s), got {actual}")]
	Arity {
		ptype: String,
		expected: usize,
		actual: usize,
	},

	#[error("policy type '{ptype}': invalid priority '{value}'")]
	InvalidPriority { ptype: String, value: String },

	#[error("policy type '{ptype}': field filter out of range (index {field_index}, {count} value(s))")]
	InvalidFilter {
		ptype: String,
		field_index: usize,
		count: usize,
	},

	#[error("policy line {line}: {message}")]
	InvalidLine { line: usize, message: String },

	#[error("policy type '{ptype}': values must not contain line breaks")]
	LineBreak { ptype: String },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn model_errors_name_section_and_key() {
		let err = ModelError::DuplicateToken {
			section: "policy_definition".to_string(),
			key: "p".to_string(),
			token: "sub".to_string(),
		};
		let rendered = err.to_string();
		assert!(rendered.contains("policy_definition"));
		assert!(rendered.contains("p:"));
		assert!(rendered.contains("sub"));
	}

	#[test]
	fn wraps_family_errors() {
		let err: AuthzError = EvalError::DivisionByZero.into();
		assert!(matches!(err, AuthzError::Eval(EvalError::DivisionByZero)));

		let err: AuthzError = PolicyError::UnknownPolicyType("p9".to_string()).into();
		assert!(err.to_string().contains("p9"));
	}
}
