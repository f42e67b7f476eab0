// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
	Ident(String),
	Str(String),
	Int(i64),
	Float(f64),
	True,
	False,
	In,
	And,
	Or,
	Not,
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	Plus,
	Minus,
	Star,
	Slash,
	Percent,
	LParen,
	RParen,
	Comma,
}

/// A token with its character offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
	pub token: Token,
	pub offset: usize,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, CompileError> {
	let chars: Vec<char> = src.chars().collect();
	let mut tokens = Vec::new();
	let mut i = 0;

	while i < chars.len() {
		let c = chars[i];
		if c.is_whitespace() {
			i += 1;
			continue;
		}

		let start = i;
		let two = chars.get(i + 1).copied();
		let token = match (c, two) {
			('&', Some('&')) => {
				i += 2;
				Token::And
			}
			('|', Some('|')) => {
				i += 2;
				Token::Or
			}
			('=', Some('=')) => {
				i += 2;
				Token::Eq
			}
			('!', Some('=')) => {
				i += 2;
				Token::Ne
			}
			('<', Some('=')) => {
				i += 2;
				Token::Le
			}
			('>', Some('=')) => {
				i += 2;
				Token::Ge
			}
			('!', _) => {
				i += 1;
				Token::Not
			}
			('<', _) => {
				i += 1;
				Token::Lt
			}
			('>', _) => {
				i += 1;
				Token::Gt
			}
			('+', _) => {
				i += 1;
				Token::Plus
			}
			('-', _) => {
				i += 1;
				Token::Minus
			}
			('*', _) => {
				i += 1;
				Token::Star
			}
			('/', _) => {
				i += 1;
				Token::Slash
			}
			('%', _) => {
				i += 1;
				Token::Percent
			}
			('(', _) => {
				i += 1;
				Token::LParen
			}
			(')', _) => {
				i += 1;
				Token::RParen
			}
			(',', _) => {
				i += 1;
				Token::Comma
			}
			('\'', _) | ('"', _) => {
				let (value, next) = read_string(&chars, i)?;
				i = next;
				Token::Str(value)
			}
			(c, _) if c.is_ascii_digit() => {
				let (token, next) = read_number(&chars, i)?;
				i = next;
				token
			}
			(c, _) if c.is_alphabetic() || c == '_' => {
				let mut end = i;
				while end < chars.len()
					&& (chars[end].is_alphanumeric() || chars[end] == '_' || chars[end] == '.')
				{
					end += 1;
				}
				let word: String = chars[i..end].iter().collect();
				i = end;
				match word.as_str() {
					"true" => Token::True,
					"false" => Token::False,
					"in" => Token::In,
					_ => {
						if word.ends_with('.') || word.contains("..") {
							return Err(CompileError::Syntax {
								offset: start,
								message: format!("malformed identifier '{word}'"),
							});
						}
						Token::Ident(word)
					}
				}
			}
			(c, _) => {
				return Err(CompileError::Syntax {
					offset: start,
					message: format!("unexpected character '{c}'"),
				});
			}
		};

		tokens.push(Spanned {
			token,
			offset: start,
		});
	}

	Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), CompileError> {
	let quote = chars[start];
	let mut out = String::new();
	let mut i = start + 1;

	while i < chars.len() {
		match chars[i] {
			'\\' => {
				let escaped = chars.get(i + 1).ok_or_else(|| CompileError::Syntax {
					offset: i,
					message: "dangling escape".to_string(),
				})?;
				out.push(match escaped {
					'n' => '\n',
					't' => '\t',
					'r' => '\r',
					other => *other,
				});
				i += 2;
			}
			c if c == quote => return Ok((out, i + 1)),
			c => {
				out.push(c);
				i += 1;
			}
		}
	}

	Err(CompileError::Syntax {
		offset: start,
		message: "unterminated string literal".to_string(),
	})
}

fn read_number(chars: &[char], start: usize) -> Result<(Token, usize), CompileError> {
	let mut i = start;
	while i < chars.len() && chars[i].is_ascii_digit() {
		i += 1;
	}

	let is_float =
		i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
	if is_float {
		i += 1;
		while i < chars.len() && chars[i].is_ascii_digit() {
			i += 1;
		}
	}

	let text: String = chars[start..i].iter().collect();
	let invalid = |_| CompileError::Syntax {
		offset: start,
		message: format!("invalid number '{text}'"),
	};
	let token = if is_float {
		Token::Float(text.parse().map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?)
	} else {
		Token::Int(text.parse().map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?)
	};
	Ok((token, i))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kinds(src: &str) -> Vec<Token> {
		tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
	}

	#[test]
	fn dotted_identifiers_are_one_token() {
		assert_eq!(
			kinds("r.sub.age >= 18"),
			vec![
				Token::Ident("r.sub.age".to_string()),
				Token::Ge,
				Token::Int(18)
			]
		);
	}

	#[test]
	fn operators_and_keywords() {
		assert_eq!(
			kinds("!a && b || c != 'x' in (1, 2.5)"),
			vec![
				Token::Not,
				Token::Ident("a".to_string()),
				Token::And,
				Token::Ident("b".to_string()),
				Token::Or,
				Token::Ident("c".to_string()),
				Token::Ne,
				Token::Str("x".to_string()),
				Token::In,
				Token::LParen,
				Token::Int(1),
				Token::Comma,
				Token::Float(2.5),
				Token::RParen,
			]
		);
	}

	#[test]
	fn string_escapes() {
		assert_eq!(
			kinds(r#""a\"b" 'c\'d'"#),
			vec![Token::Str("a\"b".to_string()), Token::Str("c'd".to_string())]
		);
	}

	#[test]
	fn reports_offsets() {
		let err = tokenize("r.sub == #").unwrap_err();
		assert_eq!(
			err,
			CompileError::Syntax {
				offset: 9,
				message: "unexpected character '#'".to_string()
			}
		);
	}

	#[test]
	fn unterminated_string_is_an_error() {
		assert!(matches!(
			tokenize("r.sub == 'abc"),
			Err(CompileError::Syntax { offset: 9, .. })
		));
	}

	#[test]
	fn trailing_dot_is_rejected() {
		assert!(tokenize("r.").is_err());
	}
}
