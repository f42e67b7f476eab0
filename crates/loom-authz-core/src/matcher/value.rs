// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operator semantics over [`serde_json::Value`].
//!
//! Policy values are always strings while request values may be any JSON type, so
//! equality and ordering coerce numeric strings when the other side is a number.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::parser::BinaryOp;
use crate::error::EvalError;

/// Short type name used in error messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalError {
	EvalError::TypeMismatch {
		op: op.symbol().to_string(),
		lhs: type_name(lhs).to_string(),
		rhs: type_name(rhs).to_string(),
	}
}

pub(crate) fn as_bool(value: &Value, op: &str) -> Result<bool, EvalError> {
	match value {
		Value::Bool(b) => Ok(*b),
		other => Err(EvalError::TypeMismatch {
			op: op.to_string(),
			lhs: type_name(other).to_string(),
			rhs: "bool".to_string(),
		}),
	}
}

/// Renders a scalar as a string, for role and string predicates.
pub(crate) fn as_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

fn as_f64(value: &Value) -> Option<f64> {
	match value {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => s.trim().parse::<f64>().ok(),
		_ => None,
	}
}

pub(crate) fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
	match (lhs, rhs) {
		(Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
			match (as_f64(lhs), as_f64(rhs)) {
				(Some(a), Some(b)) => a == b,
				_ => false,
			}
		}
		(Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
			(Some(x), Some(y)) => x == y,
			_ => a == b,
		},
		(Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
			s == if *b { "true" } else { "false" }
		}
		_ => lhs == rhs,
	}
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Ordering, EvalError> {
	let ordering = match (lhs, rhs) {
		(Value::String(a), Value::String(b)) => Some(a.cmp(b)),
		(Value::Number(_), Value::Number(_))
		| (Value::Number(_), Value::String(_))
		| (Value::String(_), Value::Number(_)) => match (as_f64(lhs), as_f64(rhs)) {
			(Some(a), Some(b)) => a.partial_cmp(&b),
			_ => None,
		},
		_ => None,
	};
	ordering.ok_or_else(|| mismatch(op, lhs, rhs))
}

fn number(value: f64) -> Value {
	Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
	if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
		let result = match op {
			BinaryOp::Add => a.checked_add(b),
			BinaryOp::Sub => a.checked_sub(b),
			BinaryOp::Mul => a.checked_mul(b),
			BinaryOp::Div if b == 0 => return Err(EvalError::DivisionByZero),
			BinaryOp::Div => a.checked_div(b),
			BinaryOp::Rem if b == 0 => return Err(EvalError::DivisionByZero),
			BinaryOp::Rem => a.checked_rem(b),
			_ => None,
		};
		if let Some(n) = result {
			return Ok(Value::from(n));
		}
	}

	let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
		return Err(mismatch(op, lhs, rhs));
	};
	let result = match op {
		BinaryOp::Add => a + b,
		BinaryOp::Sub => a - b,
		BinaryOp::Mul => a * b,
		BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(EvalError::DivisionByZero),
		BinaryOp::Div => a / b,
		BinaryOp::Rem => a % b,
		_ => return Err(mismatch(op, lhs, rhs)),
	};
	Ok(number(result))
}

/// Applies a non-short-circuiting binary operator.
pub(crate) fn apply(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
	match op {
		BinaryOp::Eq => Ok(Value::Bool(loose_eq(lhs, rhs))),
		BinaryOp::Ne => Ok(Value::Bool(!loose_eq(lhs, rhs))),
		BinaryOp::Lt => Ok(Value::Bool(compare(op, lhs, rhs)? == Ordering::Less)),
		BinaryOp::Le => Ok(Value::Bool(compare(op, lhs, rhs)? != Ordering::Greater)),
		BinaryOp::Gt => Ok(Value::Bool(compare(op, lhs, rhs)? == Ordering::Greater)),
		BinaryOp::Ge => Ok(Value::Bool(compare(op, lhs, rhs)? != Ordering::Less)),
		BinaryOp::In => match rhs {
			Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| loose_eq(lhs, item)))),
			_ => Err(mismatch(op, lhs, rhs)),
		},
		BinaryOp::Add if lhs.is_string() || rhs.is_string() => {
			match (as_text(lhs), as_text(rhs)) {
				(Some(a), Some(b)) => Ok(Value::String(a + &b)),
				_ => Err(mismatch(op, lhs, rhs)),
			}
		}
		BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
			arithmetic(op, lhs, rhs)
		}
		BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(
			match op {
				BinaryOp::And => as_bool(lhs, op.symbol())? && as_bool(rhs, op.symbol())?,
				_ => as_bool(lhs, op.symbol())? || as_bool(rhs, op.symbol())?,
			},
		)),
	}
}

pub(crate) fn negate(value: &Value) -> Result<Value, EvalError> {
	if let Some(n) = value.as_i64() {
		if let Some(neg) = n.checked_neg() {
			return Ok(Value::from(neg));
		}
	}
	match value.as_f64() {
		Some(n) => Ok(number(-n)),
		None => Err(EvalError::TypeMismatch {
			op: "-".to_string(),
			lhs: type_name(value).to_string(),
			rhs: "number".to_string(),
		}),
	}
}
