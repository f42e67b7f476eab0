// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Recursive-descent parser for matcher expressions.
//!
//! Precedence, loosest first: `||`, `&&`, `== !=`, `< <= > >= in`, `+ -`, `* / %`,
//! unary `! -`, primaries.

use super::lexer::{tokenize, Spanned, Token};
use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
	Not,
	Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
	Or,
	And,
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	In,
	Add,
	Sub,
	Mul,
	Div,
	Rem,
}

impl BinaryOp {
	pub fn symbol(self) -> &'static str {
		match self {
			BinaryOp::Or => "||",
			BinaryOp::And => "&&",
			BinaryOp::Eq => "==",
			BinaryOp::Ne => "!=",
			BinaryOp::Lt => "<",
			BinaryOp::Le => "<=",
			BinaryOp::Gt => ">",
			BinaryOp::Ge => ">=",
			BinaryOp::In => "in",
			BinaryOp::Add => "+",
			BinaryOp::Sub => "-",
			BinaryOp::Mul => "*",
			BinaryOp::Div => "/",
			BinaryOp::Rem => "%",
		}
	}
}

/// Parsed, unresolved expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	Literal(Literal),
	/// Dotted path such as `r.sub.age`, split on `.`.
	Ident(Vec<String>),
	Unary {
		op: UnaryOp,
		expr: Box<Expr>,
	},
	Binary {
		op: BinaryOp,
		lhs: Box<Expr>,
		rhs: Box<Expr>,
	},
	Call {
		name: String,
		args: Vec<Expr>,
	},
	Tuple(Vec<Expr>),
}

impl Expr {
	/// Calls `f` with every identifier path in the tree.
	pub fn visit_idents(&self, f: &mut impl FnMut(&[String])) {
		match self {
			Expr::Literal(_) => {}
			Expr::Ident(path) => f(path),
			Expr::Unary { expr, .. } => expr.visit_idents(f),
			Expr::Binary { lhs, rhs, .. } => {
				lhs.visit_idents(f);
				rhs.visit_idents(f);
			}
			Expr::Call { args, .. } | Expr::Tuple(args) => {
				for arg in args {
					arg.visit_idents(f);
				}
			}
		}
	}
}

/// Deepest expression tree, and deepest parser recursion, accepted.
///
/// Formulas can come from policy rows through `eval(...)`, so both are bounded to keep
/// hostile input from exhausting the stack during parsing, evaluation or drop.
pub const MAX_NESTING: usize = 256;

/// Parses a complete expression.
pub fn parse(src: &str) -> Result<Expr, CompileError> {
	let tokens = tokenize(src)?;
	let mut parser = Parser {
		tokens,
		pos: 0,
		end: src.chars().count(),
		nesting: 0,
	};
	let parsed = parser.expr()?;
	if let Some(extra) = parser.tokens.get(parser.pos) {
		return Err(CompileError::Syntax {
			offset: extra.offset,
			message: format!("unexpected {:?}", extra.token),
		});
	}
	Ok(parsed.expr)
}

/// A subtree and its height.
struct Parsed {
	expr: Expr,
	height: usize,
}

impl Parsed {
	fn leaf(expr: Expr) -> Self {
		Self { expr, height: 1 }
	}
}

struct Parser {
	tokens: Vec<Spanned>,
	pos: usize,
	end: usize,
	nesting: usize,
}

impl Parser {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.pos).map(|s| &s.token)
	}

	fn offset(&self) -> usize {
		self.tokens.get(self.pos).map(|s| s.offset).unwrap_or(self.end)
	}

	fn bump(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.pos).map(|s| s.token.clone());
		if token.is_some() {
			self.pos += 1;
		}
		token
	}

	fn eat(&mut self, expected: &Token) -> bool {
		if self.peek() == Some(expected) {
			self.pos += 1;
			true
		} else {
			false
		}
	}

	fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
		if self.eat(&expected) {
			Ok(())
		} else {
			Err(self.error(format!("expected {expected:?}")))
		}
	}

	fn error(&self, message: String) -> CompileError {
		let found = match self.peek() {
			Some(token) => format!("{token:?}"),
			None => "end of input".to_string(),
		};
		CompileError::Syntax {
			offset: self.offset(),
			message: format!("{message}, found {found}"),
		}
	}

	fn too_deep(&self) -> CompileError {
		CompileError::Syntax {
			offset: self.offset(),
			message: "expression nested too deeply".to_string(),
		}
	}

	fn enter(&mut self) -> Result<(), CompileError> {
		self.nesting += 1;
		if self.nesting > MAX_NESTING {
			return Err(self.too_deep());
		}
		Ok(())
	}

	fn leave(&mut self) {
		self.nesting -= 1;
	}

	/// Wraps `children` under `expr`, rejecting trees taller than [`MAX_NESTING`].
	fn node<'a>(
		&self,
		expr: Expr,
		children: impl IntoIterator<Item = &'a usize>,
	) -> Result<Parsed, CompileError> {
		let height = 1 + children.into_iter().copied().max().unwrap_or(0);
		if height > MAX_NESTING {
			return Err(self.too_deep());
		}
		Ok(Parsed { expr, height })
	}

	fn binary(&self, op: BinaryOp, lhs: Parsed, rhs: Parsed) -> Result<Parsed, CompileError> {
		let heights = [lhs.height, rhs.height];
		self.node(binary(op, lhs.expr, rhs.expr), &heights)
	}

	fn expr(&mut self) -> Result<Parsed, CompileError> {
		self.or()
	}

	fn or(&mut self) -> Result<Parsed, CompileError> {
		let mut lhs = self.and()?;
		while self.eat(&Token::Or) {
			let rhs = self.and()?;
			lhs = self.binary(BinaryOp::Or, lhs, rhs)?;
		}
		Ok(lhs)
	}

	fn and(&mut self) -> Result<Parsed, CompileError> {
		let mut lhs = self.equality()?;
		while self.eat(&Token::And) {
			let rhs = self.equality()?;
			lhs = self.binary(BinaryOp::And, lhs, rhs)?;
		}
		Ok(lhs)
	}

	fn equality(&mut self) -> Result<Parsed, CompileError> {
		let mut lhs = self.comparison()?;
		loop {
			let op = match self.peek() {
				Some(Token::Eq) => BinaryOp::Eq,
				Some(Token::Ne) => BinaryOp::Ne,
				_ => return Ok(lhs),
			};
			self.pos += 1;
			let rhs = self.comparison()?;
			lhs = self.binary(op, lhs, rhs)?;
		}
	}

	fn comparison(&mut self) -> Result<Parsed, CompileError> {
		let mut lhs = self.additive()?;
		loop {
			let op = match self.peek() {
				Some(Token::Lt) => BinaryOp::Lt,
				Some(Token::Le) => BinaryOp::Le,
				Some(Token::Gt) => BinaryOp::Gt,
				Some(Token::Ge) => BinaryOp::Ge,
				Some(Token::In) => BinaryOp::In,
				_ => return Ok(lhs),
			};
			self.pos += 1;
			let rhs = self.additive()?;
			lhs = self.binary(op, lhs, rhs)?;
		}
	}

	fn additive(&mut self) -> Result<Parsed, CompileError> {
		let mut lhs = self.multiplicative()?;
		loop {
			let op = match self.peek() {
				Some(Token::Plus) => BinaryOp::Add,
				Some(Token::Minus) => BinaryOp::Sub,
				_ => return Ok(lhs),
			};
			self.pos += 1;
			let rhs = self.multiplicative()?;
			lhs = self.binary(op, lhs, rhs)?;
		}
	}

	fn multiplicative(&mut self) -> Result<Parsed, CompileError> {
		let mut lhs = self.unary()?;
		loop {
			let op = match self.peek() {
				Some(Token::Star) => BinaryOp::Mul,
				Some(Token::Slash) => BinaryOp::Div,
				Some(Token::Percent) => BinaryOp::Rem,
				_ => return Ok(lhs),
			};
			self.pos += 1;
			let rhs = self.unary()?;
			lhs = self.binary(op, lhs, rhs)?;
		}
	}

	fn unary(&mut self) -> Result<Parsed, CompileError> {
		let op = match self.peek() {
			Some(Token::Not) => UnaryOp::Not,
			Some(Token::Minus) => UnaryOp::Neg,
			_ => return self.primary(),
		};
		self.pos += 1;
		self.enter()?;
		let inner = self.unary()?;
		self.leave();
		self.node(
			Expr::Unary {
				op,
				expr: Box::new(inner.expr),
			},
			&[inner.height],
		)
	}

	fn primary(&mut self) -> Result<Parsed, CompileError> {
		let offset = self.offset();
		match self.bump() {
			Some(Token::True) => Ok(Parsed::leaf(Expr::Literal(Literal::Bool(true)))),
			Some(Token::False) => Ok(Parsed::leaf(Expr::Literal(Literal::Bool(false)))),
			Some(Token::Int(n)) => Ok(Parsed::leaf(Expr::Literal(Literal::Int(n)))),
			Some(Token::Float(n)) => Ok(Parsed::leaf(Expr::Literal(Literal::Float(n)))),
			Some(Token::Str(s)) => Ok(Parsed::leaf(Expr::Literal(Literal::Str(s)))),
			Some(Token::Ident(name)) => {
				if self.eat(&Token::LParen) {
					if name.contains('.') {
						return Err(CompileError::Syntax {
							offset,
							message: format!("'{name}' is not callable"),
						});
					}
					self.enter()?;
					let args = self.list()?;
					self.leave();
					let (args, heights) = split(args);
					self.node(Expr::Call { name, args }, &heights)
				} else {
					Ok(Parsed::leaf(Expr::Ident(
						name.split('.').map(str::to_string).collect(),
					)))
				}
			}
			Some(Token::LParen) => {
				self.enter()?;
				let first = self.expr()?;
				if self.eat(&Token::Comma) {
					let mut items = vec![first];
					items.extend(self.list()?);
					self.leave();
					let (items, heights) = split(items);
					return self.node(Expr::Tuple(items), &heights);
				}
				self.expect(Token::RParen)?;
				self.leave();
				Ok(first)
			}
			Some(_) => {
				self.pos -= 1;
				Err(self.error("expected an expression".to_string()))
			}
			None => Err(self.error("expected an expression".to_string())),
		}
	}

	/// Comma-separated expressions up to and including the closing paren.
	fn list(&mut self) -> Result<Vec<Parsed>, CompileError> {
		let mut items = Vec::new();
		if self.eat(&Token::RParen) {
			return Ok(items);
		}
		loop {
			items.push(self.expr()?);
			if self.eat(&Token::RParen) {
				return Ok(items);
			}
			self.expect(Token::Comma)?;
		}
	}
}

fn split(items: Vec<Parsed>) -> (Vec<Expr>, Vec<usize>) {
	items.into_iter().map(|p| (p.expr, p.height)).unzip()
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
	Expr::Binary {
		op,
		lhs: Box::new(lhs),
		rhs: Box::new(rhs),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ident(path: &str) -> Expr {
		Expr::Ident(path.split('.').map(str::to_string).collect())
	}

	fn s(value: &str) -> Expr {
		Expr::Literal(Literal::Str(value.to_string()))
	}

	#[test]
	fn and_binds_tighter_than_or() {
		let expr = parse("a || b && c").unwrap();
		assert_eq!(
			expr,
			binary(
				BinaryOp::Or,
				ident("a"),
				binary(BinaryOp::And, ident("b"), ident("c"))
			)
		);
	}

	#[test]
	fn comparison_binds_tighter_than_and() {
		let expr = parse("r.obj == p.obj && r.act == p.act").unwrap();
		assert_eq!(
			expr,
			binary(
				BinaryOp::And,
				binary(BinaryOp::Eq, ident("r.obj"), ident("p.obj")),
				binary(BinaryOp::Eq, ident("r.act"), ident("p.act"))
			)
		);
	}

	#[test]
	fn arithmetic_precedence() {
		let expr = parse("1 + 2 * 3 > 6").unwrap();
		assert_eq!(
			expr,
			binary(
				BinaryOp::Gt,
				binary(
					BinaryOp::Add,
					Expr::Literal(Literal::Int(1)),
					binary(
						BinaryOp::Mul,
						Expr::Literal(Literal::Int(2)),
						Expr::Literal(Literal::Int(3))
					)
				),
				Expr::Literal(Literal::Int(6))
			)
		);
	}

	#[test]
	fn calls_and_tuples() {
		let expr = parse("g(r.sub, p.sub, 'dom') && r.act in ('read', 'write')").unwrap();
		assert_eq!(
			expr,
			binary(
				BinaryOp::And,
				Expr::Call {
					name: "g".to_string(),
					args: vec![ident("r.sub"), ident("p.sub"), s("dom")],
				},
				binary(
					BinaryOp::In,
					ident("r.act"),
					Expr::Tuple(vec![s("read"), s("write")])
				)
			)
		);
	}

	#[test]
	fn unary_not_nests() {
		let expr = parse("!!true").unwrap();
		assert_eq!(
			expr,
			Expr::Unary {
				op: UnaryOp::Not,
				expr: Box::new(Expr::Unary {
					op: UnaryOp::Not,
					expr: Box::new(Expr::Literal(Literal::Bool(true))),
				}),
			}
		);
	}

	#[test]
	fn visits_all_identifiers() {
		let expr = parse("keyMatch(r.obj, p.obj) || r.sub.age > 18").unwrap();
		let mut seen = Vec::new();
		expr.visit_idents(&mut |path| seen.push(path.join(".")));
		assert_eq!(seen, vec!["r.obj", "p.obj", "r.sub.age"]);
	}

	#[test]
	fn reports_trailing_tokens() {
		let err = parse("a == b c").unwrap_err();
		assert!(matches!(err, CompileError::Syntax { offset: 7, .. }));
	}

	#[test]
	fn reports_missing_operand_at_end() {
		let err = parse("a ==").unwrap_err();
		assert!(matches!(err, CompileError::Syntax { offset: 4, .. }));
	}

	#[test]
	fn dotted_call_is_rejected() {
		assert!(parse("r.sub(1)").is_err());
	}

	fn too_deep(result: Result<Expr, CompileError>) -> bool {
		matches!(result, Err(CompileError::Syntax { message, .. }) if message.contains("nested too deeply"))
	}

	#[test]
	fn deep_parentheses_are_rejected() {
		let src = format!("{}true{}", "(".repeat(100_000), ")".repeat(100_000));
		assert!(too_deep(parse(&src)));
	}

	#[test]
	fn deep_unary_chains_are_rejected() {
		assert!(too_deep(parse(&format!("{}true", "!".repeat(100_000)))));
		assert!(too_deep(parse(&format!("{}1", "-".repeat(100_000)))));
	}

	#[test]
	fn long_operator_chains_are_rejected() {
		let src = vec!["true"; 100_000].join(" || ");
		assert!(too_deep(parse(&src)));
	}

	#[test]
	fn deep_call_arguments_are_rejected() {
		let src = format!("{}1{}", "f(".repeat(10_000), ")".repeat(10_000));
		assert!(too_deep(parse(&src)));
	}

	#[test]
	fn nesting_at_the_limit_parses() {
		let depth = MAX_NESTING - 1;
		let src = format!("{}true{}", "(".repeat(depth), ")".repeat(depth));
		assert_eq!(parse(&src).unwrap(), Expr::Literal(Literal::Bool(true)));

		let src = vec!["a"; 100].join(" && ");
		assert!(parse(&src).is_ok());
	}
}
