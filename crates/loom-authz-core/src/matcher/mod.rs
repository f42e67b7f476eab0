// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Matcher compilation and evaluation.
//!
//! A matcher formula is parsed once into an [`Expr`](parser::Expr) and then resolved
//! against the model into a tree of [`Node`]s: request and policy tokens become
//! positional lookups, function names become registry entries, and every `g*` name
//! becomes a role-graph query. Resolution failures are compile errors, so evaluation
//! only ever fails on data (type mismatches, malformed patterns, missing attributes).
//!
//! # Example
//!
//! ```
//! use loom_authz_core::matcher::{CompiledMatcher, EvaluationContext, FunctionRegistry};
//! use loom_authz_core::{Model, RoleManagers};
//! use serde_json::json;
//!
//! let model = Model::from_text(
//!     "[request_definition]\nr = sub, obj\n\
//!      [policy_definition]\np = sub, obj\n\
//!      [policy_effect]\ne = some(where (p.eft == allow))\n\
//!      [matchers]\nm = r.sub == p.sub && keyMatch(r.obj, p.obj)\n",
//! )
//! .unwrap();
//! let matcher = CompiledMatcher::compile(&model, &FunctionRegistry::with_builtins()).unwrap();
//!
//! let roles = RoleManagers::new();
//! let request = [json!("alice"), json!("/data/1")];
//! let policy = ["alice".to_string(), "/data/*".to_string()];
//! let ctx = EvaluationContext::new(&request, &policy, &roles);
//! assert!(matcher.evaluate(&ctx).unwrap());
//! ```

mod functions;
mod lexer;
pub mod parser;
mod value;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Number, Value};

pub use functions::{
	key_get, key_match, key_match2, key_match3, Arity, Function, FunctionImpl, FunctionRegistry,
};

use self::parser::{BinaryOp, Expr, Literal, UnaryOp};
use crate::error::{CompileError, EvalError};
use crate::model::{Model, Section};
use crate::rbac::RoleLookup;

/// Name of the built-in that evaluates an expression stored in policy data.
pub const EVAL_FUNCTION: &str = "eval";

/// Maximum nesting of `eval(...)` calls.
const MAX_EVAL_DEPTH: usize = 8;

/// Distinct `eval(...)` rules kept compiled per matcher. The cache is emptied when full.
const EVAL_CACHE_CAPACITY: usize = 1024;

type CompiledRule = Result<Arc<Node>, CompileError>;

/// Bindings for one (request, policy row) evaluation.
pub struct EvaluationContext<'a> {
	pub request: &'a [Value],
	pub policy: &'a [String],
	pub roles: &'a dyn RoleLookup,
}

impl<'a> EvaluationContext<'a> {
	pub fn new(request: &'a [Value], policy: &'a [String], roles: &'a dyn RoleLookup) -> Self {
		Self {
			request,
			policy,
			roles,
		}
	}
}

/// Names visible to a matcher.
#[derive(Debug)]
struct Scope {
	request_key: String,
	request: HashMap<String, usize>,
	policy_key: String,
	policy: HashMap<String, usize>,
	roles: HashMap<String, usize>,
	functions: FunctionRegistry,
	/// `eval(...)` rules by source text, including the ones that failed to compile.
	rules: Mutex<HashMap<String, CompiledRule>>,
}

impl Scope {
	fn from_model(
		model: &Model,
		functions: &FunctionRegistry,
		request_key: &str,
		policy_key: &str,
	) -> Result<Self, CompileError> {
		let tokens = |section: Section, key: &str| -> Result<HashMap<String, usize>, CompileError> {
			let assertion = model
				.get(section, key)
				.ok_or_else(|| CompileError::UnknownIdentifier(key.to_string()))?;
			Ok(assertion
				.tokens()
				.iter()
				.enumerate()
				.map(|(i, t)| (t.clone(), i))
				.collect())
		};

		Ok(Self {
			request_key: request_key.to_string(),
			request: tokens(Section::Request, request_key)?,
			policy_key: policy_key.to_string(),
			policy: tokens(Section::Policy, policy_key)?,
			roles: model
				.assertions(Section::Role)
				.map(|a| (a.key().to_string(), a.tokens().len()))
				.collect(),
			functions: functions.clone(),
			rules: Mutex::new(HashMap::new()),
		})
	}

	fn compile_rule(&self, source: &str) -> CompiledRule {
		if let Some(cached) = self.rules.lock().get(source) {
			return cached.clone();
		}

		let compiled = parser::parse(source)
			.and_then(|expr| resolve(&expr, self))
			.map(Arc::new);

		let mut rules = self.rules.lock();
		if rules.len() >= EVAL_CACHE_CAPACITY {
			rules.clear();
		}
		rules.insert(source.to_string(), compiled.clone());
		compiled
	}
}

#[derive(Debug)]
enum Node {
	Const(Value),
	Request { index: usize, path: Vec<String> },
	Policy { index: usize, name: String },
	Not(Box<Node>),
	Neg(Box<Node>),
	And(Box<Node>, Box<Node>),
	Or(Box<Node>, Box<Node>),
	Binary {
		op: BinaryOp,
		lhs: Box<Node>,
		rhs: Box<Node>,
	},
	Tuple(Vec<Node>),
	Call { function: Function, args: Vec<Node> },
	RoleLink { ptype: String, args: Vec<Node> },
	Eval(Box<Node>),
}

/// A matcher formula resolved against a model and function registry.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
	source: String,
	root: Arc<Node>,
	scope: Arc<Scope>,
}

impl CompiledMatcher {
	/// Compiles the model's `m` formula over `r` and `p`.
	pub fn compile(model: &Model, functions: &FunctionRegistry) -> Result<Self, CompileError> {
		Self::compile_named(model, functions, "m", "r", "p")
	}

	/// Compiles the model's `matcher_key` formula over the named request and policy
	/// assertions, such as `m2` over `r2` and `p2`.
	pub fn compile_named(
		model: &Model,
		functions: &FunctionRegistry,
		matcher_key: &str,
		request_key: &str,
		policy_key: &str,
	) -> Result<Self, CompileError> {
		let source = model
			.get(Section::Matcher, matcher_key)
			.ok_or_else(|| CompileError::UnknownIdentifier(matcher_key.to_string()))?
			.value()
			.to_string();
		let scope = Arc::new(Scope::from_model(
			model,
			functions,
			request_key,
			policy_key,
		)?);
		Self::compile_in(&source, scope)
	}

	/// Compiles an arbitrary formula over the model's `r` and `p` tokens.
	pub fn compile_source(
		source: &str,
		model: &Model,
		functions: &FunctionRegistry,
	) -> Result<Self, CompileError> {
		let scope = Arc::new(Scope::from_model(model, functions, "r", "p")?);
		Self::compile_in(source, scope)
	}

	fn compile_in(source: &str, scope: Arc<Scope>) -> Result<Self, CompileError> {
		let expr = parser::parse(source)?;
		let root = resolve(&expr, &scope)?;
		Ok(Self {
			source: source.to_string(),
			root: Arc::new(root),
			scope,
		})
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	/// Evaluates the formula. A non-boolean result is an error.
	pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<bool, EvalError> {
		self.evaluate_at(&self.root, ctx, 0)
	}

	fn evaluate_at(
		&self,
		root: &Node,
		ctx: &EvaluationContext<'_>,
		depth: usize,
	) -> Result<bool, EvalError> {
		match self.eval_node(root, ctx, depth)? {
			Value::Bool(b) => Ok(b),
			other => Err(EvalError::NonBoolean(other.to_string())),
		}
	}

	fn eval_node(
		&self,
		node: &Node,
		ctx: &EvaluationContext<'_>,
		depth: usize,
	) -> Result<Value, EvalError> {
		match node {
			Node::Const(value) => Ok(value.clone()),
			Node::Request { index, path } => lookup_request(ctx.request, *index, path),
			Node::Policy { index, name } => ctx
				.policy
				.get(*index)
				.map(|v| Value::String(v.clone()))
				.ok_or_else(|| EvalError::UnknownAttribute(name.clone())),
			Node::Not(inner) => {
				let value = self.eval_node(inner, ctx, depth)?;
				Ok(Value::Bool(!value::as_bool(&value, "!")?))
			}
			Node::Neg(inner) => value::negate(&self.eval_node(inner, ctx, depth)?),
			Node::And(lhs, rhs) => {
				let left = self.eval_node(lhs, ctx, depth)?;
				if !value::as_bool(&left, "&&")? {
					return Ok(Value::Bool(false));
				}
				let right = self.eval_node(rhs, ctx, depth)?;
				Ok(Value::Bool(value::as_bool(&right, "&&")?))
			}
			Node::Or(lhs, rhs) => {
				let left = self.eval_node(lhs, ctx, depth)?;
				if value::as_bool(&left, "||")? {
					return Ok(Value::Bool(true));
				}
				let right = self.eval_node(rhs, ctx, depth)?;
				Ok(Value::Bool(value::as_bool(&right, "||")?))
			}
			Node::Binary { op, lhs, rhs } => {
				let left = self.eval_node(lhs, ctx, depth)?;
				let right = self.eval_node(rhs, ctx, depth)?;
				value::apply(*op, &left, &right)
			}
			Node::Tuple(items) => Ok(Value::Array(
				items
					.iter()
					.map(|item| self.eval_node(item, ctx, depth))
					.collect::<Result<_, _>>()?,
			)),
			Node::Call { function, args } => {
				let values = args
					.iter()
					.map(|arg| self.eval_node(arg, ctx, depth))
					.collect::<Result<Vec<_>, _>>()?;
				function.call(&values)
			}
			Node::RoleLink { ptype, args } => {
				let mut names = Vec::with_capacity(args.len());
				for arg in args {
					let value = self.eval_node(arg, ctx, depth)?;
					let name = value::as_text(&value).ok_or_else(|| EvalError::TypeMismatch {
						op: ptype.clone(),
						lhs: value::type_name(&value).to_string(),
						rhs: "string".to_string(),
					})?;
					names.push(name);
				}
				let Some(manager) = ctx.roles.role_manager(ptype) else {
					return Ok(Value::Bool(false));
				};
				let linked = match names.as_slice() {
					[name1, name2] => manager.has_link(name1, name2, None),
					[name1, name2, domains @ ..] => {
						let domains: Vec<&str> = domains.iter().map(String::as_str).collect();
						manager.has_link_in_domains(name1, name2, &domains)
					}
					_ => false,
				};
				Ok(Value::Bool(linked))
			}
			Node::Eval(arg) => {
				let value = self.eval_node(arg, ctx, depth)?;
				let source = value::as_text(&value).ok_or_else(|| {
					EvalError::Eval(format!("expected an expression string, got {value}"))
				})?;
				if depth >= MAX_EVAL_DEPTH {
					return Err(EvalError::Eval(format!(
						"eval nesting exceeds {MAX_EVAL_DEPTH} levels"
					)));
				}
				let rule = self
					.scope
					.compile_rule(&source)
					.map_err(|err| EvalError::Eval(format!("'{source}': {err}")))?;
				Ok(Value::Bool(self.evaluate_at(&rule, ctx, depth + 1)?))
			}
		}
	}
}

fn lookup_request(request: &[Value], index: usize, path: &[String]) -> Result<Value, EvalError> {
	let missing = || EvalError::UnknownAttribute(path.join("."));
	let mut current = request.get(index).ok_or_else(missing)?;
	for field in &path[2..] {
		current = current
			.as_object()
			.and_then(|object| object.get(field))
			.ok_or_else(missing)?;
	}
	Ok(current.clone())
}

fn resolve(expr: &Expr, scope: &Scope) -> Result<Node, CompileError> {
	match expr {
		Expr::Literal(literal) => Ok(Node::Const(match literal {
			Literal::Bool(b) => Value::Bool(*b),
			Literal::Int(n) => Value::from(*n),
			Literal::Float(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
			Literal::Str(s) => Value::String(s.clone()),
		})),
		Expr::Ident(path) => resolve_ident(path, scope),
		Expr::Unary { op, expr } => {
			let inner = Box::new(resolve(expr, scope)?);
			Ok(match op {
				UnaryOp::Not => Node::Not(inner),
				UnaryOp::Neg => Node::Neg(inner),
			})
		}
		Expr::Binary { op, lhs, rhs } => {
			let lhs = Box::new(resolve(lhs, scope)?);
			let rhs = Box::new(resolve(rhs, scope)?);
			Ok(match op {
				BinaryOp::And => Node::And(lhs, rhs),
				BinaryOp::Or => Node::Or(lhs, rhs),
				op => Node::Binary { op: *op, lhs, rhs },
			})
		}
		Expr::Tuple(items) => Ok(Node::Tuple(
			items
				.iter()
				.map(|item| resolve(item, scope))
				.collect::<Result<_, _>>()?,
		)),
		Expr::Call { name, args } => resolve_call(name, args, scope),
	}
}

fn resolve_ident(path: &[String], scope: &Scope) -> Result<Node, CompileError> {
	let joined = path.join(".");
	let head = path[0].as_str();
	let Some(token) = path.get(1) else {
		return Err(CompileError::UnknownIdentifier(joined));
	};

	if head == scope.request_key {
		let index = *scope
			.request
			.get(token)
			.ok_or_else(|| CompileError::UnknownToken {
				assertion: head.to_string(),
				token: token.clone(),
			})?;
		return Ok(Node::Request {
			index,
			path: path.to_vec(),
		});
	}

	if head == scope.policy_key {
		let index = *scope
			.policy
			.get(token)
			.ok_or_else(|| CompileError::UnknownToken {
				assertion: head.to_string(),
				token: token.clone(),
			})?;
		if path.len() > 2 {
			return Err(CompileError::PolicyAttribute(joined));
		}
		return Ok(Node::Policy {
			index,
			name: joined,
		});
	}

	Err(CompileError::UnknownIdentifier(joined))
}

fn resolve_call(name: &str, args: &[Expr], scope: &Scope) -> Result<Node, CompileError> {
	let args = args
		.iter()
		.map(|arg| resolve(arg, scope))
		.collect::<Result<Vec<_>, _>>()?;

	if let Some(&arity) = scope.roles.get(name) {
		if args.len() != arity {
			return Err(CompileError::Arity {
				name: name.to_string(),
				expected: arity.to_string(),
				actual: args.len(),
			});
		}
		return Ok(Node::RoleLink {
			ptype: name.to_string(),
			args,
		});
	}

	if name == EVAL_FUNCTION {
		let mut args = args;
		return match (args.pop(), args.is_empty()) {
			(Some(arg), true) => Ok(Node::Eval(Box::new(arg))),
			(popped, _) => Err(CompileError::Arity {
				name: name.to_string(),
				expected: "1".to_string(),
				actual: args.len() + usize::from(popped.is_some()),
			}),
		};
	}

	let function = scope
		.functions
		.get(name)
		.ok_or_else(|| CompileError::UnknownFunction(name.to_string()))?;
	if !function.arity().accepts(args.len()) {
		return Err(CompileError::Arity {
			name: name.to_string(),
			expected: function.arity().to_string(),
			actual: args.len(),
		});
	}
	Ok(Node::Call {
		function: function.clone(),
		args,
	})
}
