//! Schema loading, `$ref` resolution, and directive extraction.
//!
//! A schema describes the shape of the consolidated artifact and carries
//! `x-` directives controlling how frontmatter data flows into it. The
//! schema is loaded once per run; every `$ref` is resolved up front so the
//! rest of the pipeline never sees one.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;

use crate::PathAddress;
use crate::PathSegment;
use crate::SchemaError;

/// Recursion ceiling for `$ref` chains.
pub const MAX_REF_DEPTH: usize = 100;

/// A schema with every `$ref` resolved away.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
	root: Value,
}

impl ResolvedSchema {
	pub fn root(&self) -> &Value {
		&self.root
	}
}

/// Read a schema file (YAML, JSON, or TOML by extension) and resolve it.
pub fn load_schema(path: &Path) -> Result<ResolvedSchema, SchemaError> {
	let content = std::fs::read_to_string(path)?;
	let raw = parse_schema_text(&content, path)?;
	let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
	resolve_schema(&raw, &base_dir)
}

/// Resolve every `$ref` in a raw schema value. File references are read
/// relative to `base_dir`.
pub fn resolve_schema(raw: &Value, base_dir: &Path) -> Result<ResolvedSchema, SchemaError> {
	let mut resolver = RefResolver::new(raw.clone(), base_dir.to_path_buf());
	let root = resolver.resolve_value(raw, 0)?;
	Ok(ResolvedSchema { root })
}

fn parse_schema_text(content: &str, path: &Path) -> Result<Value, SchemaError> {
	let display = path.display().to_string();
	let extension = path
		.extension()
		.and_then(|e| e.to_str())
		.unwrap_or("")
		.to_ascii_lowercase();

	match extension.as_str() {
		"json" => {
			serde_json::from_str(content).map_err(|e| {
				SchemaError::Parse {
					path: display,
					reason: e.to_string(),
				}
			})
		}
		"toml" => {
			let value: toml::Value = toml::from_str(content).map_err(|e| {
				SchemaError::Parse {
					path: display.clone(),
					reason: e.to_string(),
				}
			})?;
			serde_json::to_value(value).map_err(|e| {
				SchemaError::Parse {
					path: display,
					reason: e.to_string(),
				}
			})
		}
		// YAML is the default schema dialect.
		_ => {
			serde_yaml_ng::from_str(content).map_err(|e| {
				SchemaError::Parse {
					path: display,
					reason: e.to_string(),
				}
			})
		}
	}
}

/// Run-scoped `$ref` resolver. The memo cache and the currently-resolving
/// set live here, never in module state, so concurrent runs on different
/// schemas cannot interfere.
struct RefResolver {
	document: Value,
	base_dir: PathBuf,
	/// Finished references, keyed by reference string. Diamond re-use is
	/// served from here.
	cache: HashMap<String, Value>,
	/// References currently being resolved; re-entering one is a cycle.
	resolving: HashSet<String>,
	/// Raw external documents, keyed by file path.
	file_cache: HashMap<String, Value>,
}

impl RefResolver {
	fn new(document: Value, base_dir: PathBuf) -> Self {
		Self {
			document,
			base_dir,
			cache: HashMap::new(),
			resolving: HashSet::new(),
			file_cache: HashMap::new(),
		}
	}

	fn resolve_value(&mut self, value: &Value, depth: usize) -> Result<Value, SchemaError> {
		match value {
			Value::Object(map) => {
				if let Some(Value::String(reference)) = map.get("$ref") {
					let reference = reference.clone();
					return self.resolve_reference(&reference, depth);
				}
				let mut resolved = serde_json::Map::new();
				for (key, child) in map {
					resolved.insert(key.clone(), self.resolve_value(child, depth)?);
				}
				Ok(Value::Object(resolved))
			}
			Value::Array(items) => {
				items
					.iter()
					.map(|item| self.resolve_value(item, depth))
					.collect::<Result<Vec<_>, _>>()
					.map(Value::Array)
			}
			other => Ok(other.clone()),
		}
	}

	fn resolve_reference(&mut self, reference: &str, depth: usize) -> Result<Value, SchemaError> {
		if depth >= MAX_REF_DEPTH {
			return Err(SchemaError::MaxDepthExceeded {
				reference: reference.to_string(),
				limit: MAX_REF_DEPTH,
			});
		}
		if let Some(finished) = self.cache.get(reference) {
			return Ok(finished.clone());
		}
		if !self.resolving.insert(reference.to_string()) {
			return Err(SchemaError::CircularReference {
				reference: reference.to_string(),
			});
		}
		tracing::trace!(reference, depth, "resolving schema reference");

		let target = self.lookup(reference);
		let resolved = target.and_then(|value| self.resolve_value(&value, depth + 1));
		self.resolving.remove(reference);

		let resolved = resolved?;
		self.cache.insert(reference.to_string(), resolved.clone());
		Ok(resolved)
	}

	/// Locate the raw target of a reference: `#/fragment` into the current
	/// document, or `file`/`file#/fragment` relative to the schema
	/// directory.
	fn lookup(&mut self, reference: &str) -> Result<Value, SchemaError> {
		let (file_part, fragment) = match reference.split_once('#') {
			Some((file, fragment)) => (file, fragment),
			None => (reference, ""),
		};

		let failed = |reason: String| SchemaError::RefResolutionFailed {
			reference: reference.to_string(),
			reason,
		};

		let document = if file_part.is_empty() {
			&self.document
		} else {
			if !self.file_cache.contains_key(file_part) {
				let file_path = self.base_dir.join(file_part);
				let content = std::fs::read_to_string(&file_path)
					.map_err(|e| failed(format!("cannot read `{}`: {e}", file_path.display())))?;
				let value = parse_schema_text(&content, &file_path)
					.map_err(|e| failed(e.to_string()))?;
				self.file_cache.insert(file_part.to_string(), value);
			}
			&self.file_cache[file_part]
		};

		if fragment.is_empty() {
			return Ok(document.clone());
		}
		document
			.pointer(fragment)
			.cloned()
			.ok_or_else(|| failed(format!("no value at pointer `{fragment}`")))
	}
}

/// The three non-overlapping directive intents. Classification is what
/// keeps downstream components decoupled: the frontmatter reader never sees
/// processing directives, and the processing engine never sees template
/// directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveIntent {
	/// Maps frontmatter data into the artifact shape.
	Extraction,
	/// Declares templates and the output format.
	Template,
	/// Transforms extracted data.
	Processing,
}

/// The two ordered application phases for processing directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveTiming {
	/// Applied once per document, before any cross-document directive.
	Individual,
	/// Applied once, after every document completes individual timing.
	Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DirectiveKind {
	FrontmatterPart,
	Template,
	TemplateItems,
	TemplateFormat,
	FlattenArrays,
	JmesPathFilter,
	DerivedFrom,
	DerivedUnique,
}

impl DirectiveKind {
	pub fn from_key(key: &str) -> Option<Self> {
		match key {
			"x-frontmatter-part" => Some(Self::FrontmatterPart),
			"x-template" => Some(Self::Template),
			"x-template-items" => Some(Self::TemplateItems),
			"x-template-format" => Some(Self::TemplateFormat),
			"x-flatten-arrays" => Some(Self::FlattenArrays),
			"x-jmespath-filter" => Some(Self::JmesPathFilter),
			"x-derived-from" => Some(Self::DerivedFrom),
			"x-derived-unique" => Some(Self::DerivedUnique),
			_ => None,
		}
	}

	pub fn intent(&self) -> DirectiveIntent {
		match self {
			Self::FrontmatterPart => DirectiveIntent::Extraction,
			Self::Template | Self::TemplateItems | Self::TemplateFormat => DirectiveIntent::Template,
			Self::FlattenArrays | Self::JmesPathFilter | Self::DerivedFrom | Self::DerivedUnique => {
				DirectiveIntent::Processing
			}
		}
	}

	/// The application phase for processing directives; `None` for the
	/// other intents.
	pub fn timing(&self) -> Option<DirectiveTiming> {
		match self {
			Self::FlattenArrays | Self::JmesPathFilter => Some(DirectiveTiming::Individual),
			Self::DerivedFrom | Self::DerivedUnique => Some(DirectiveTiming::Aggregate),
			_ => None,
		}
	}
}

impl std::fmt::Display for DirectiveKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let key = match self {
			Self::FrontmatterPart => "x-frontmatter-part",
			Self::Template => "x-template",
			Self::TemplateItems => "x-template-items",
			Self::TemplateFormat => "x-template-format",
			Self::FlattenArrays => "x-flatten-arrays",
			Self::JmesPathFilter => "x-jmespath-filter",
			Self::DerivedFrom => "x-derived-from",
			Self::DerivedUnique => "x-derived-unique",
		};
		write!(f, "{key}")
	}
}

/// A schema-attached instruction: kind, owning path, and raw value. The
/// kind fixes the expected value shape, but values are validated lazily at
/// application time — extraction never fails.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
	pub kind: DirectiveKind,
	pub path: PathAddress,
	pub value: Value,
}

/// Walk the resolved schema and collect every directive in declaration
/// order. The array hierarchy is normalized while walking: descending into
/// `properties.<name>` appends the property segment and descending into
/// `items` appends `[]`, so a directive on `commands.items.properties.c1`
/// is addressed `commands[].c1`. Unknown `x-` keys are ignored.
pub fn extract_directives(schema: &ResolvedSchema) -> Vec<Directive> {
	let mut directives = Vec::new();
	walk_schema(schema.root(), PathAddress::root(), &mut directives);
	directives
}

fn walk_schema(value: &Value, path: PathAddress, directives: &mut Vec<Directive>) {
	let Value::Object(map) = value else {
		return;
	};

	for (key, directive_value) in map {
		if let Some(kind) = DirectiveKind::from_key(key) {
			directives.push(Directive {
				kind,
				path: path.clone(),
				value: directive_value.clone(),
			});
		} else if key.starts_with("x-") {
			tracing::debug!(key = %key, path = %path, "ignoring unknown extension key");
		}
	}

	if let Some(Value::Object(properties)) = map.get("properties") {
		for (name, subschema) in properties {
			walk_schema(subschema, path.child(name), directives);
		}
	}
	if let Some(items) = map.get("items") {
		walk_schema(items, path.marker(), directives);
	}
}

/// Directives split by intent, declaration order preserved within each.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedDirectives {
	pub extraction: Vec<Directive>,
	pub template: Vec<Directive>,
	pub processing: Vec<Directive>,
}

pub fn classify(directives: Vec<Directive>) -> ClassifiedDirectives {
	let mut classified = ClassifiedDirectives::default();
	for directive in directives {
		match directive.kind.intent() {
			DirectiveIntent::Extraction => classified.extraction.push(directive),
			DirectiveIntent::Template => classified.template.push(directive),
			DirectiveIntent::Processing => classified.processing.push(directive),
		}
	}
	classified
}

/// The array property that holds one entry per source document: the prefix
/// of the first extraction directive's path up to its first `[]` marker.
/// Falls back to a root `documents` array when no extraction directive
/// addresses an array.
pub fn document_collection(extraction: &[Directive]) -> PathAddress {
	for directive in extraction {
		if let Some(position) = directive
			.path
			.iter()
			.position(|segment| matches!(segment, PathSegment::ArrayMarker))
		{
			return PathAddress::new(directive.path[..position].to_vec());
		}
	}
	PathAddress::root().child("documents")
}
