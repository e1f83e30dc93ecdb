use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while loading or resolving a schema. The schema is shared
/// configuration for every document, so these are fatal to a run.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum SchemaError {
	#[error(transparent)]
	#[diagnostic(code(fmx::schema::io))]
	Io(#[from] std::io::Error),

	#[error("failed to parse schema `{path}`: {reason}")]
	#[diagnostic(
		code(fmx::schema::parse),
		help("schemas may be written in YAML, JSON, or TOML")
	)]
	Parse { path: String, reason: String },

	#[error("circular `$ref` chain re-enters `{reference}`")]
	#[diagnostic(
		code(fmx::schema::circular_ref),
		help("break the cycle; re-using an already-resolved reference is fine, re-entering one mid-resolution is not")
	)]
	CircularReference { reference: String },

	#[error("`$ref` recursion exceeded {limit} levels while resolving `{reference}`")]
	#[diagnostic(code(fmx::schema::max_depth))]
	MaxDepthExceeded { reference: String, limit: usize },

	#[error("failed to resolve `$ref` `{reference}`: {reason}")]
	#[diagnostic(
		code(fmx::schema::ref_resolution),
		help("`$ref` targets are `#/json/pointer` fragments or schema-relative file paths")
	)]
	RefResolutionFailed { reference: String, reason: String },

	#[error("invalid `{key}` directive: {reason}")]
	#[diagnostic(code(fmx::schema::invalid_directive))]
	InvalidDirective { key: String, reason: String },
}

/// Errors raised while applying processing directives to documents. These are
/// recovered at document granularity: the failing document is marked failed
/// and the run continues.
#[derive(Debug, Clone, Diagnostic, Error)]
#[non_exhaustive]
pub enum ProcessingError {
	#[error("invalid `{kind}` directive value: {reason}")]
	#[diagnostic(code(fmx::processing::invalid_directive))]
	InvalidDirective { kind: String, reason: String },

	#[error("no value at path `{path}`")]
	#[diagnostic(code(fmx::processing::path_not_found))]
	PathNotFound { path: String },

	#[error("transformation failed at `{path}`: {reason}")]
	#[diagnostic(code(fmx::processing::transformation))]
	TransformationFailed { path: String, reason: String },

	#[error("cannot {action} while {state}")]
	#[diagnostic(code(fmx::processing::invalid_transition))]
	InvalidStateTransition {
		state: &'static str,
		action: &'static str,
	},
}

/// Errors raised while serializing the final artifact. Fatal to artifact
/// production, but already-computed per-document results stay valid.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum SerializationError {
	#[error("unsupported artifact format: `{0}`")]
	#[diagnostic(
		code(fmx::serialize::unsupported_format),
		help("supported formats: json, yaml")
	)]
	UnsupportedFormat(String),

	#[error("artifact contains a reference cycle")]
	#[diagnostic(code(fmx::serialize::circular))]
	CircularReference,

	#[error("failed to serialize artifact: {reason}")]
	#[diagnostic(code(fmx::serialize::emit))]
	Emit { reason: String },
}

/// Errors raised while extracting or parsing a frontmatter block.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum FrontmatterError {
	#[error("frontmatter block opened with `{delimiter}` is never closed")]
	#[diagnostic(
		code(fmx::frontmatter::unterminated),
		help("close the block with `{delimiter}` on its own line")
	)]
	Unterminated { delimiter: String },

	#[error("failed to parse {format} frontmatter: {reason}")]
	#[diagnostic(code(fmx::frontmatter::parse))]
	Parse { format: String, reason: String },
}

/// A property path that could not be parsed.
#[derive(Debug, Clone, Diagnostic, Error)]
#[error("invalid path `{path}`: {reason}")]
#[diagnostic(
	code(fmx::path::parse),
	help("paths look like `commands[].name` or `meta.tags[0]`")
)]
pub struct PathParseError {
	pub path: String,
	pub reason: String,
}

/// Umbrella error for the whole crate.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum FmxError {
	#[error(transparent)]
	#[diagnostic(transparent)]
	Schema(#[from] SchemaError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Processing(#[from] ProcessingError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Serialization(#[from] SerializationError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Frontmatter(#[from] FrontmatterError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Path(#[from] PathParseError),

	#[error(transparent)]
	#[diagnostic(code(fmx::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(fmx::config_parse),
		help("check that fmx.toml is valid TOML")
	)]
	ConfigParse(String),
}

pub type FmxResult<T> = Result<T, FmxError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
