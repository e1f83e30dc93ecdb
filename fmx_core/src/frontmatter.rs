//! Frontmatter extraction and parsing.
//!
//! [`extract`] returns the *unparsed* block plus its detected format; the
//! parser adapters turn a raw block into a `serde_json::Value`. Keeping the
//! two apart lets the pipeline report delimiter problems and parse problems
//! separately.

use serde_json::Value;

use crate::FrontmatterError;

/// The serialization format of a frontmatter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrontmatterFormat {
	Yaml,
	Toml,
	Json,
}

impl std::fmt::Display for FrontmatterFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Yaml => write!(f, "yaml"),
			Self::Toml => write!(f, "toml"),
			Self::Json => write!(f, "json"),
		}
	}
}

/// An extracted (but not yet parsed) frontmatter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFrontmatter {
	/// The raw text between the delimiters.
	pub raw: String,
	/// The format implied by the opening delimiter.
	pub format: FrontmatterFormat,
}

/// Extract the frontmatter block from the start of a document.
///
/// Recognized opening delimiters, each on the first non-blank line:
///
/// - `---` — YAML, closed by `---`
/// - `+++` — TOML, closed by `+++`
/// - `---yaml` / `---toml` / `---json` — explicit format, closed by `---`
///
/// Returns `Ok(None)` when the document has no frontmatter.
pub fn extract(text: &str) -> Result<Option<ExtractedFrontmatter>, FrontmatterError> {
	let content = text.trim_start_matches('\u{feff}').trim_start();

	let Some((first_line, rest)) = content.split_once('\n') else {
		return Ok(None);
	};

	let (format, closing) = match first_line.trim_end() {
		"---" | "---yaml" => (FrontmatterFormat::Yaml, "---"),
		"+++" => (FrontmatterFormat::Toml, "+++"),
		"---toml" => (FrontmatterFormat::Toml, "---"),
		"---json" => (FrontmatterFormat::Json, "---"),
		_ => return Ok(None),
	};

	let mut block_lines = Vec::new();
	for line in rest.lines() {
		if line.trim_end() == closing {
			return Ok(Some(ExtractedFrontmatter {
				raw: block_lines.join("\n"),
				format,
			}));
		}
		block_lines.push(line);
	}

	Err(FrontmatterError::Unterminated {
		delimiter: first_line.trim_end().to_string(),
	})
}

/// Parse a raw block according to its format.
pub fn parse(raw: &str, format: FrontmatterFormat) -> Result<Value, FrontmatterError> {
	match format {
		FrontmatterFormat::Yaml => parse_yaml(raw),
		FrontmatterFormat::Toml => parse_toml(raw),
		FrontmatterFormat::Json => parse_json(raw),
	}
}

pub fn parse_yaml(text: &str) -> Result<Value, FrontmatterError> {
	serde_yaml_ng::from_str(text).map_err(|e| {
		FrontmatterError::Parse {
			format: "yaml".to_string(),
			reason: e.to_string(),
		}
	})
}

pub fn parse_json(text: &str) -> Result<Value, FrontmatterError> {
	serde_json::from_str(text).map_err(|e| {
		FrontmatterError::Parse {
			format: "json".to_string(),
			reason: e.to_string(),
		}
	})
}

pub fn parse_toml(text: &str) -> Result<Value, FrontmatterError> {
	let value: toml::Value = toml::from_str(text).map_err(|e| {
		FrontmatterError::Parse {
			format: "toml".to_string(),
			reason: e.to_string(),
		}
	})?;
	serde_json::to_value(value).map_err(|e| {
		FrontmatterError::Parse {
			format: "toml".to_string(),
			reason: e.to_string(),
		}
	})
}
