//! The query expression subset used by `x-jmespath-filter` and
//! `x-derived-from` directives.
//!
//! Supported syntax: field access (`a.b`), flatten projection (`a[]`),
//! wildcard (`a[*]`), index (`a[0]`), recursive descent (`..name`), and
//! filter predicates (`a[?field == "x"]`).

use logos::Logos;
use serde_json::Value;
use snailquote::unescape;

use crate::ProcessingError;

#[derive(Logos, Debug, PartialEq, Clone, Copy)]
enum RawToken {
	#[token("[")]
	BracketOpen,
	#[token("]")]
	BracketClose,
	#[token("..")]
	DotDot,
	#[token(".")]
	Dot,
	#[token("*")]
	Star,
	#[token("?")]
	Question,
	#[token("==")]
	Eq,
	#[token("!=")]
	Ne,
	#[token("<=")]
	Le,
	#[token(">=")]
	Ge,
	#[token("<")]
	Lt,
	#[token(">")]
	Gt,
	#[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
	#[regex(r"[a-zA-Z_][a-zA-Z0-9_-]*")]
	Ident,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[ \t\r\n]")]
	Whitespace,
}

/// A comparison operator inside a `[?field op literal]` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CmpOp {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
}

/// One evaluation step of a parsed query.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum QueryStep {
	/// `.name` — object field access.
	Field(String),
	/// `[0]` — array index.
	Index(usize),
	/// `[]` — flatten one nesting level, then project.
	Flatten,
	/// `[*]` — project over array elements.
	Wildcard,
	/// `..name` — collect every value under any depth whose key matches.
	Recursive(String),
	/// `[?field op literal]` — keep array elements matching the predicate.
	Filter {
		field: String,
		op: CmpOp,
		literal: Value,
	},
}

impl QueryStep {
	/// Steps that only make sense against a container value.
	fn is_structural(&self) -> bool {
		matches!(
			self,
			QueryStep::Index(_) | QueryStep::Flatten | QueryStep::Wildcard | QueryStep::Filter { .. }
		)
	}
}

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
	steps: Vec<QueryStep>,
}

/// Cursor state while evaluating: either a single value or an active
/// projection over many.
enum Cursor {
	One(Value),
	Many(Vec<Value>),
}

impl Query {
	pub fn parse(expression: &str) -> Result<Self, ProcessingError> {
		let error = |reason: String| ProcessingError::TransformationFailed {
			path: expression.to_string(),
			reason,
		};

		let mut tokens: Vec<(RawToken, &str)> = Vec::new();
		for (result, span) in RawToken::lexer(expression).spanned() {
			let token = result
				.map_err(|()| error(format!("unexpected character at byte {}", span.start)))?;
			if token == RawToken::Whitespace {
				continue;
			}
			tokens.push((token, &expression[span]));
		}

		let mut steps = Vec::new();
		let mut index = 0;

		while index < tokens.len() {
			let (token, slice) = tokens[index];
			match token {
				RawToken::Ident if steps.is_empty() && index == 0 => {
					steps.push(QueryStep::Field(slice.to_string()));
					index += 1;
				}
				RawToken::Dot => {
					let Some((RawToken::Ident, name)) = tokens.get(index + 1).copied() else {
						return Err(error("expected a field name after `.`".to_string()));
					};
					steps.push(QueryStep::Field(name.to_string()));
					index += 2;
				}
				RawToken::DotDot => {
					let Some((RawToken::Ident, name)) = tokens.get(index + 1).copied() else {
						return Err(error("expected a field name after `..`".to_string()));
					};
					steps.push(QueryStep::Recursive(name.to_string()));
					index += 2;
				}
				RawToken::BracketOpen => {
					index += 1;
					let (step, consumed) = parse_bracket(&tokens[index..], &error)?;
					steps.push(step);
					index += consumed;
				}
				_ => return Err(error(format!("unexpected token `{slice}`"))),
			}
		}

		Ok(Self { steps })
	}

	pub fn steps(&self) -> &[QueryStep] {
		&self.steps
	}

	/// True when any step requires a container value to apply.
	pub fn has_structural_steps(&self) -> bool {
		self.steps.iter().any(QueryStep::is_structural)
	}

	/// Evaluate against a value. Evaluation is total: projections drop
	/// elements that fail to match, and a non-projected missing field
	/// yields `null`.
	pub fn evaluate(&self, input: &Value) -> Value {
		let mut cursor = Cursor::One(input.clone());
		for step in &self.steps {
			cursor = apply_step(cursor, step);
		}
		match cursor {
			Cursor::One(value) => value,
			Cursor::Many(values) => Value::Array(values),
		}
	}
}

/// Parse the contents of a bracketed step, returning the step and the number
/// of tokens consumed (including the closing bracket).
fn parse_bracket(
	tokens: &[(RawToken, &str)],
	error: &impl Fn(String) -> ProcessingError,
) -> Result<(QueryStep, usize), ProcessingError> {
	match tokens {
		[(RawToken::BracketClose, _), ..] => Ok((QueryStep::Flatten, 1)),
		[(RawToken::Star, _), (RawToken::BracketClose, _), ..] => Ok((QueryStep::Wildcard, 2)),
		[(RawToken::Number, slice), (RawToken::BracketClose, _), ..] => {
			let index = slice
				.parse::<usize>()
				.map_err(|_| error(format!("array index `{slice}` must be a non-negative integer")))?;
			Ok((QueryStep::Index(index), 2))
		}
		[
			(RawToken::Question, _),
			(RawToken::Ident, field),
			(op_token, op_slice),
			literal_pair,
			(RawToken::BracketClose, _),
			..,
		] => {
			let op = match op_token {
				RawToken::Eq => CmpOp::Eq,
				RawToken::Ne => CmpOp::Ne,
				RawToken::Lt => CmpOp::Lt,
				RawToken::Le => CmpOp::Le,
				RawToken::Gt => CmpOp::Gt,
				RawToken::Ge => CmpOp::Ge,
				_ => return Err(error(format!("unknown comparison operator `{op_slice}`"))),
			};
			let literal = parse_literal(*literal_pair, error)?;
			Ok((
				QueryStep::Filter {
					field: (*field).to_string(),
					op,
					literal,
				},
				5,
			))
		}
		_ => Err(error("malformed bracket expression".to_string())),
	}
}

fn parse_literal(
	(token, slice): (RawToken, &str),
	error: &impl Fn(String) -> ProcessingError,
) -> Result<Value, ProcessingError> {
	match token {
		RawToken::Number => {
			if let Ok(int) = slice.parse::<i64>() {
				Ok(Value::from(int))
			} else {
				let float = slice
					.parse::<f64>()
					.map_err(|_| error(format!("invalid number literal `{slice}`")))?;
				Ok(Value::from(float))
			}
		}
		RawToken::DoubleQuotedString | RawToken::SingleQuotedString => {
			let unescaped = unescape(slice)
				.map_err(|e| error(format!("invalid string literal `{slice}`: {e}")))?;
			Ok(Value::String(unescaped))
		}
		RawToken::Ident => {
			match slice {
				"true" => Ok(Value::Bool(true)),
				"false" => Ok(Value::Bool(false)),
				"null" => Ok(Value::Null),
				other => Err(error(format!("expected a literal, found `{other}`"))),
			}
		}
		_ => Err(error(format!("expected a literal, found `{slice}`"))),
	}
}

fn apply_step(cursor: Cursor, step: &QueryStep) -> Cursor {
	match step {
		QueryStep::Field(name) => {
			match cursor {
				Cursor::One(Value::Object(mut map)) => {
					Cursor::One(map.remove(name).unwrap_or(Value::Null))
				}
				Cursor::One(_) => Cursor::One(Value::Null),
				Cursor::Many(values) => {
					Cursor::Many(
						values
							.into_iter()
							.filter_map(|value| {
								match value {
									Value::Object(mut map) => map.remove(name),
									_ => None,
								}
							})
							.collect(),
					)
				}
			}
		}
		QueryStep::Index(index) => {
			match cursor {
				Cursor::One(Value::Array(mut items)) => {
					if *index < items.len() {
						Cursor::One(items.swap_remove(*index))
					} else {
						Cursor::One(Value::Null)
					}
				}
				Cursor::One(_) => Cursor::One(Value::Null),
				Cursor::Many(values) => {
					Cursor::Many(
						values
							.into_iter()
							.filter_map(|value| {
								match value {
									Value::Array(items) => items.into_iter().nth(*index),
									_ => None,
								}
							})
							.collect(),
					)
				}
			}
		}
		QueryStep::Flatten => {
			let mut flattened = Vec::new();
			for value in projected(cursor) {
				match value {
					Value::Array(inner) => flattened.extend(inner),
					other => flattened.push(other),
				}
			}
			Cursor::Many(flattened)
		}
		QueryStep::Wildcard => {
			match cursor {
				Cursor::One(Value::Array(items)) => Cursor::Many(items),
				Cursor::One(_) => Cursor::Many(Vec::new()),
				Cursor::Many(values) => {
					Cursor::Many(
						values
							.into_iter()
							.flat_map(|value| {
								match value {
									Value::Array(items) => items,
									_ => Vec::new(),
								}
							})
							.collect(),
					)
				}
			}
		}
		QueryStep::Recursive(name) => {
			let mut collected = Vec::new();
			let roots = match cursor {
				Cursor::One(value) => vec![value],
				Cursor::Many(values) => values,
			};
			for value in &roots {
				collect_recursive(value, name, &mut collected);
			}
			Cursor::Many(collected)
		}
		QueryStep::Filter { field, op, literal } => {
			let kept = projected(cursor)
				.into_iter()
				.filter(|element| {
					element
						.get(field)
						.is_some_and(|value| compare(value, *op, literal))
				})
				.collect();
			Cursor::Many(kept)
		}
	}
}

/// Collapse the cursor into the elements a projection-style step operates
/// on.
fn projected(cursor: Cursor) -> Vec<Value> {
	match cursor {
		Cursor::One(Value::Array(items)) => items,
		Cursor::One(_) => Vec::new(),
		Cursor::Many(values) => values,
	}
}

fn collect_recursive(value: &Value, name: &str, out: &mut Vec<Value>) {
	match value {
		Value::Object(map) => {
			for (key, child) in map {
				if key == name {
					out.push(child.clone());
				}
				collect_recursive(child, name, out);
			}
		}
		Value::Array(items) => {
			for item in items {
				collect_recursive(item, name, out);
			}
		}
		_ => {}
	}
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> bool {
	match op {
		CmpOp::Eq => values_equal(left, right),
		CmpOp::Ne => !values_equal(left, right),
		CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
			// Ordering comparisons are defined for numbers only.
			let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
				return false;
			};
			match op {
				CmpOp::Lt => a < b,
				CmpOp::Le => a <= b,
				CmpOp::Gt => a > b,
				CmpOp::Ge => a >= b,
				CmpOp::Eq | CmpOp::Ne => unreachable!(),
			}
		}
	}
}

/// Deep equality, with ULP-based comparison for floats.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
	match (left, right) {
		(Value::Number(a), Value::Number(b)) => {
			match (a.as_f64(), b.as_f64()) {
				(Some(a), Some(b)) => float_cmp::approx_eq!(f64, a, b, ulps = 2),
				_ => a == b,
			}
		}
		(Value::Array(a), Value::Array(b)) => {
			a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
		}
		(Value::Object(a), Value::Object(b)) => {
			a.len() == b.len()
				&& a.iter()
					.all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
		}
		_ => left == right,
	}
}
