//! Run orchestration: discovery, extraction, the two directive phases, and
//! aggregation.
//!
//! The aggregate phase is a deliberate synchronization barrier — it starts
//! only once every document has completed individual-timing processing,
//! because `derived-from` reads across the whole set. Schema and template
//! load failures abort the run; everything per-document is recovered at
//! document granularity.

use std::path::Path;
use std::path::PathBuf;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use serde_json::Value;

use crate::AGGREGATE_DOC_ID;
use crate::Aggregator;
use crate::ArtifactFormat;
use crate::Directive;
use crate::DirectiveKind;
use crate::FailureRecord;
use crate::FinalResult;
use crate::FmxError;
use crate::FmxResult;
use crate::FmxConfig;
use crate::PathAddress;
use crate::PathSegment;
use crate::ProcessingEngine;
use crate::ProcessingError;
use crate::RenderOptions;
use crate::classify;
use crate::config::DEFAULT_SCHEMA_FILE;
use crate::document_collection;
use crate::extract_directives;
use crate::frontmatter;
use crate::ir;
use crate::load_schema;
use crate::load_templates;
use crate::render;
use crate::template::TemplateSet;

/// Options for one run, usually derived from an [`FmxConfig`].
#[derive(Debug, Clone)]
pub struct RunOptions {
	/// Project root; document discovery starts here.
	pub root: PathBuf,
	/// The schema file driving the run.
	pub schema_path: PathBuf,
	/// Glob patterns selecting documents, relative to the root.
	pub include_patterns: Vec<String>,
	/// Gitignore-style patterns to exclude.
	pub exclude_patterns: Vec<String>,
	/// Files larger than this are skipped.
	pub max_file_size: u64,
	/// Whether to ignore `.gitignore` files during discovery.
	pub disable_gitignore: bool,
	/// Sentinel for unresolved template variables.
	pub sentinel: String,
	/// Artifact format override. When absent the schema's
	/// `x-template-format` applies, then JSON.
	pub format: Option<ArtifactFormat>,
}

impl RunOptions {
	/// Build options from a loaded config (or defaults when none exists).
	pub fn from_config(root: &Path, config: Option<&FmxConfig>) -> FmxResult<Self> {
		let schema = config
			.and_then(|c| c.schema.clone())
			.unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_FILE));
		let format = match config.and_then(|c| c.format.as_deref()) {
			Some(name) => Some(ArtifactFormat::from_name(name)?),
			None => None,
		};

		Ok(Self {
			root: root.to_path_buf(),
			schema_path: root.join(schema),
			include_patterns: config
				.map(|c| c.input.patterns.clone())
				.unwrap_or_else(|| vec!["**/*.md".to_string()]),
			exclude_patterns: config.map(|c| c.exclude.patterns.clone()).unwrap_or_default(),
			max_file_size: config.map_or(crate::config::DEFAULT_MAX_FILE_SIZE, |c| c.max_file_size),
			disable_gitignore: config.is_some_and(|c| c.disable_gitignore),
			sentinel: config.map(|c| c.render.sentinel.clone()).unwrap_or_default(),
			format,
		})
	}
}

/// The products of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
	/// The final result folded by the aggregator.
	pub result: FinalResult,
	/// The serialized artifact, ready for the writer.
	pub artifact: String,
	/// The rendered template output, when templates were declared.
	pub rendered: Option<String>,
	/// The format the artifact was serialized in.
	pub format: ArtifactFormat,
}

/// Execute a full run.
pub fn run(options: &RunOptions) -> FmxResult<RunOutcome> {
	let schema = load_schema(&options.schema_path)?;
	let directives = classify(extract_directives(&schema));
	let collection = document_collection(&directives.extraction);
	tracing::debug!(
		extraction = directives.extraction.len(),
		template = directives.template.len(),
		processing = directives.processing.len(),
		collection = %collection,
		"classified schema directives"
	);

	let schema_dir = options
		.schema_path
		.parent()
		.unwrap_or_else(|| Path::new("."));
	let templates: TemplateSet = load_templates(&directives.template, schema_dir)?;
	let format = options
		.format
		.or(templates.output_format)
		.unwrap_or(ArtifactFormat::Json);

	let files = discover_documents(options)?;
	tracing::debug!(count = files.len(), "discovered documents");

	let mut aggregator = Aggregator::new();
	aggregator.initialize(files.len(), format)?;

	// Extraction: read each document, pull its frontmatter, and shape the
	// per-document item. Every failure here is recovered at document
	// granularity.
	let mut documents: Vec<(String, Value)> = Vec::new();
	for file in &files {
		let doc_id = file
			.strip_prefix(&options.root)
			.unwrap_or(file)
			.display()
			.to_string();

		let text = match std::fs::read_to_string(file) {
			Ok(text) => text,
			Err(error) => {
				aggregator.record_failure(FailureRecord {
					doc_id,
					directive: None,
					message: error.to_string(),
				})?;
				continue;
			}
		};

		let block = match frontmatter::extract(&text) {
			Ok(Some(block)) => block,
			Ok(None) => {
				aggregator.record_skipped(&doc_id)?;
				continue;
			}
			Err(error) => {
				aggregator.record_failure(FailureRecord {
					doc_id,
					directive: None,
					message: error.to_string(),
				})?;
				continue;
			}
		};

		let data = match frontmatter::parse(&block.raw, block.format) {
			Ok(data) => data,
			Err(error) => {
				aggregator.record_failure(FailureRecord {
					doc_id,
					directive: None,
					message: error.to_string(),
				})?;
				continue;
			}
		};

		match shape_document(&data, &directives.extraction, &collection) {
			Ok(item) => documents.push((doc_id, item)),
			Err(error) => {
				aggregator.record_failure(FailureRecord {
					doc_id,
					directive: Some(DirectiveKind::FrontmatterPart.to_string()),
					message: error.to_string(),
				})?;
			}
		}
	}

	// The two directive phases, with the barrier in between.
	let mut engine = ProcessingEngine::new(collection.clone());
	engine.set_directives(directives.processing);
	engine.initialize(documents)?;
	engine.run_individual();
	let aggregate_failures = engine.run_aggregate()?;

	for failure in aggregate_failures {
		aggregator.record_failure(FailureRecord {
			doc_id: AGGREGATE_DOC_ID.to_string(),
			directive: Some(failure.kind.to_string()),
			message: failure.error.to_string(),
		})?;
	}

	for document in engine.documents() {
		match document.state() {
			crate::DocumentState::Processed(node) => {
				aggregator.integrate(&document.id, &ir::to_value(node))?;
			}
			crate::DocumentState::Failed(error) => {
				aggregator.record_failure(FailureRecord {
					doc_id: document.id.clone(),
					directive: failing_directive(error),
					message: error.to_string(),
				})?;
			}
			_ => {}
		}
	}

	let final_ir = engine
		.final_ir()
		.ok_or(ProcessingError::InvalidStateTransition {
			state: "collecting",
			action: "read processed data",
		})?;
	let rendered = render(
		&templates,
		final_ir,
		&collection,
		&RenderOptions {
			sentinel: options.sentinel.clone(),
		},
	);

	let data = ir::to_value(final_ir);
	let result = aggregator.finalize(data, rendered.clone())?;
	let artifact = aggregator.serialize()?;

	tracing::info!(
		processed = result.stats.processed,
		failed = result.stats.failed,
		skipped = result.stats.skipped,
		"run complete"
	);

	Ok(RunOutcome {
		result,
		artifact,
		rendered,
		format,
	})
}

/// The directive kind to report for a document failure, when the error
/// names one.
fn failing_directive(error: &ProcessingError) -> Option<String> {
	match error {
		ProcessingError::InvalidDirective { kind, .. } => Some(kind.clone()),
		ProcessingError::TransformationFailed { .. } => {
			Some(DirectiveKind::JmesPathFilter.to_string())
		}
		_ => None,
	}
}

/// Shape one document's item from its parsed frontmatter.
///
/// With no extraction directives the whole frontmatter value is the item.
/// Otherwise each `x-frontmatter-part` under the collection contributes one
/// field: `true` pulls the frontmatter key named by the schema field, a
/// string value is a dotted path into the frontmatter. Missing source
/// values become `null` so the aggregator can count them.
fn shape_document(
	data: &Value,
	extraction: &[Directive],
	collection: &PathAddress,
) -> Result<Value, ProcessingError> {
	let item_directives: Vec<(&Directive, PathAddress)> = extraction
		.iter()
		.filter_map(|directive| {
			directive
				.path
				.item_relative(collection)
				.map(|relative| (directive, relative))
		})
		.collect();

	if item_directives.is_empty() {
		return Ok(data.clone());
	}

	let mut item = Value::Object(serde_json::Map::new());
	for (directive, relative) in item_directives {
		let source_path = match &directive.value {
			Value::Bool(true) => {
				let Some(PathSegment::Property(name)) = relative.last() else {
					return Err(ProcessingError::InvalidDirective {
						kind: directive.kind.to_string(),
						reason: format!("`{}` does not end in a property name", directive.path),
					});
				};
				PathAddress::root().child(name)
			}
			Value::Bool(false) => continue,
			Value::String(path) => {
				PathAddress::parse(path).map_err(|e| {
					ProcessingError::InvalidDirective {
						kind: directive.kind.to_string(),
						reason: e.to_string(),
					}
				})?
			}
			other => {
				return Err(ProcessingError::InvalidDirective {
					kind: directive.kind.to_string(),
					reason: format!("expected `true` or a frontmatter path, got `{other}`"),
				});
			}
		};

		let value = ir::value_at(data, &source_path)
			.cloned()
			.unwrap_or(Value::Null);
		insert_at(&mut item, &relative, value)?;
	}

	Ok(item)
}

/// Insert a value into a JSON object at a property-only path, creating
/// intermediate objects.
fn insert_at(
	target: &mut Value,
	path: &PathAddress,
	value: Value,
) -> Result<(), ProcessingError> {
	let mut current = target;
	let segments = path.segments();
	for (index, segment) in segments.iter().enumerate() {
		let PathSegment::Property(name) = segment else {
			return Err(ProcessingError::InvalidDirective {
				kind: DirectiveKind::FrontmatterPart.to_string(),
				reason: format!("`{path}` must address properties only"),
			});
		};
		let Value::Object(map) = current else {
			return Err(ProcessingError::InvalidDirective {
				kind: DirectiveKind::FrontmatterPart.to_string(),
				reason: format!("`{path}` collides with a non-object value"),
			});
		};
		if index == segments.len() - 1 {
			map.insert(name.clone(), value);
			return Ok(());
		}
		current = map
			.entry(name.clone())
			.or_insert_with(|| Value::Object(serde_json::Map::new()));
	}

	Err(ProcessingError::InvalidDirective {
		kind: DirectiveKind::FrontmatterPart.to_string(),
		reason: "empty extraction target path".to_string(),
	})
}

/// Discover candidate documents under the root: gitignore-aware walk,
/// filtered by the include globs, excluding oversized files.
fn discover_documents(options: &RunOptions) -> FmxResult<Vec<PathBuf>> {
	let include = build_glob_set(&options.include_patterns)?;

	let mut overrides = OverrideBuilder::new(&options.root);
	for pattern in &options.exclude_patterns {
		overrides
			.add(&format!("!{pattern}"))
			.map_err(|e| FmxError::ConfigParse(format!("invalid exclude pattern: {e}")))?;
	}
	let overrides = overrides
		.build()
		.map_err(|e| FmxError::ConfigParse(format!("invalid exclude patterns: {e}")))?;

	let mut builder = WalkBuilder::new(&options.root);
	builder
		.overrides(overrides)
		.git_ignore(!options.disable_gitignore)
		.git_global(false)
		.git_exclude(!options.disable_gitignore)
		.follow_links(false);

	let mut files = Vec::new();
	for entry in builder.build() {
		let entry = match entry {
			Ok(entry) => entry,
			Err(error) => {
				tracing::debug!(%error, "skipping unreadable entry");
				continue;
			}
		};
		if !entry.file_type().is_some_and(|kind| kind.is_file()) {
			continue;
		}
		let path = entry.path();
		let relative = path.strip_prefix(&options.root).unwrap_or(path);
		if !include.is_match(relative) {
			continue;
		}
		if let Ok(metadata) = entry.metadata() {
			if metadata.len() > options.max_file_size {
				tracing::debug!(path = %path.display(), "skipping oversized file");
				continue;
			}
		}
		files.push(path.to_path_buf());
	}

	files.sort();
	Ok(files)
}

fn build_glob_set(patterns: &[String]) -> FmxResult<GlobSet> {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = Glob::new(pattern)
			.map_err(|e| FmxError::ConfigParse(format!("invalid include pattern: {e}")))?;
		builder.add(glob);
	}
	builder
		.build()
		.map_err(|e| FmxError::ConfigParse(format!("invalid include patterns: {e}")))
}
