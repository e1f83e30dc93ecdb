//! The directive processing engine.
//!
//! Processing directives apply in two ordered phases. *Individual-timing*
//! directives (`x-flatten-arrays`, `x-jmespath-filter`) run once per
//! document, using only that document's data. *Aggregate-timing* directives
//! (`x-derived-from`, `x-derived-unique`) run once, after every document has
//! completed individual timing, because they read across the whole set.
//! Within each phase, declaration order from the schema is preserved.
//!
//! Processed data is reachable only through [`ProcessingEngine::get`]; the
//! originally extracted structures are never exposed past this module.

use std::rc::Rc;

use serde_json::Value;

use crate::Directive;
use crate::DirectiveKind;
use crate::DirectiveTiming;
use crate::PathAddress;
use crate::ProcessingError;
use crate::ir;
use crate::ir::IrBuilder;
use crate::ir::IrNode;
use crate::query::Query;
use crate::query::values_equal;

/// Lifecycle of a single document moving through the engine.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DocumentState {
	Uninitialized,
	/// Raw extracted data has arrived.
	Initialized(Value),
	/// Individual-timing directives have been applied; the partial IR is
	/// waiting on the aggregate phase.
	Processing(Rc<IrNode>),
	/// Final per-document node inside the run-level IR.
	Processed(Rc<IrNode>),
	Failed(ProcessingError),
}

impl DocumentState {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Uninitialized => "uninitialized",
			Self::Initialized(_) => "initialized",
			Self::Processing(_) => "processing",
			Self::Processed(_) => "processed",
			Self::Failed(_) => "failed",
		}
	}
}

/// A document and its processing state. Transitions are guarded; disallowed
/// ones return [`ProcessingError::InvalidStateTransition`].
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
	pub id: String,
	state: DocumentState,
}

impl ProcessedDocument {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			state: DocumentState::Uninitialized,
		}
	}

	pub fn state(&self) -> &DocumentState {
		&self.state
	}

	pub fn failure(&self) -> Option<&ProcessingError> {
		match &self.state {
			DocumentState::Failed(error) => Some(error),
			_ => None,
		}
	}

	/// Valid from `Uninitialized` or `Failed` only.
	pub fn initialize(&mut self, data: Value) -> Result<(), ProcessingError> {
		match self.state {
			DocumentState::Uninitialized | DocumentState::Failed(_) => {
				self.state = DocumentState::Initialized(data);
				Ok(())
			}
			_ => Err(self.invalid("initialize")),
		}
	}

	fn begin_processing(&mut self, partial: Rc<IrNode>) -> Result<(), ProcessingError> {
		match self.state {
			DocumentState::Initialized(_) => {
				self.state = DocumentState::Processing(partial);
				Ok(())
			}
			_ => Err(self.invalid("begin processing")),
		}
	}

	fn update_partial(&mut self, partial: Rc<IrNode>) -> Result<(), ProcessingError> {
		match self.state {
			DocumentState::Processing(_) => {
				self.state = DocumentState::Processing(partial);
				Ok(())
			}
			_ => Err(self.invalid("update partial data")),
		}
	}

	fn complete(&mut self, node: Rc<IrNode>) -> Result<(), ProcessingError> {
		match self.state {
			DocumentState::Processing(_) => {
				self.state = DocumentState::Processed(node);
				Ok(())
			}
			_ => Err(self.invalid("complete")),
		}
	}

	fn fail(&mut self, error: ProcessingError) {
		self.state = DocumentState::Failed(error);
	}

	fn invalid(&self, action: &'static str) -> ProcessingError {
		ProcessingError::InvalidStateTransition {
			state: self.state.name(),
			action,
		}
	}
}

/// A failed aggregate-timing directive. Aggregate directives cannot fail a
/// single document, so their failures are reported against the run.
#[derive(Debug)]
pub struct AggregateFailure {
	pub kind: DirectiveKind,
	pub error: ProcessingError,
}

/// Applies processing directives and exposes the result through a
/// path-keyed accessor.
#[derive(Debug, Default)]
pub struct ProcessingEngine {
	documents: Vec<ProcessedDocument>,
	directives: Vec<Directive>,
	collection: PathAddress,
	final_ir: Option<Rc<IrNode>>,
}

impl ProcessingEngine {
	/// `collection` is the array property that holds one entry per
	/// document (see [`crate::document_collection`]).
	pub fn new(collection: PathAddress) -> Self {
		Self {
			documents: Vec::new(),
			directives: Vec::new(),
			collection,
			final_ir: None,
		}
	}

	/// Install processing directives. Directives of any other intent are
	/// discarded — classification keeps this engine blind to extraction
	/// and template concerns.
	pub fn set_directives(&mut self, directives: Vec<Directive>) {
		self.directives = directives
			.into_iter()
			.filter(|directive| {
				let keep = directive.kind.timing().is_some();
				if !keep {
					tracing::warn!(kind = %directive.kind, "discarding non-processing directive");
				}
				keep
			})
			.collect();
	}

	/// Create every document in `Initialized` with its extracted data.
	/// Replaces any previous run state.
	pub fn initialize(
		&mut self,
		documents: Vec<(String, Value)>,
	) -> Result<(), ProcessingError> {
		self.documents = Vec::with_capacity(documents.len());
		self.final_ir = None;
		for (id, data) in documents {
			let mut document = ProcessedDocument::new(id);
			document.initialize(data)?;
			self.documents.push(document);
		}
		Ok(())
	}

	pub fn documents(&self) -> &[ProcessedDocument] {
		&self.documents
	}

	/// Apply individual-timing directives to every initialized document. A
	/// failing directive marks only that document failed; the run
	/// continues for the rest.
	pub fn run_individual(&mut self) {
		let individual: Vec<&Directive> = self
			.directives
			.iter()
			.filter(|d| d.kind.timing() == Some(DirectiveTiming::Individual))
			.collect();

		for document in &mut self.documents {
			let data = match &document.state {
				DocumentState::Initialized(data) => data.clone(),
				_ => continue,
			};

			let mut partial = IrBuilder::from_data(&data);
			if document.begin_processing(Rc::clone(&partial)).is_err() {
				continue;
			}

			for directive in &individual {
				let Some(relative) = directive.path.item_relative(&self.collection) else {
					tracing::debug!(
						kind = %directive.kind,
						path = %directive.path,
						"individual directive outside the document collection; skipping"
					);
					continue;
				};

				match apply_individual(&partial, directive, &relative) {
					Ok(updated) => partial = updated,
					Err(error) => {
						tracing::debug!(id = %document.id, %error, "document failed");
						document.fail(error);
						break;
					}
				}
			}

			if document.failure().is_none() {
				// Keep the latest partial; completion happens after the
				// aggregate barrier.
				let _ = document.update_partial(partial);
			}
		}
	}

	/// The synchronization barrier and aggregate phase. Every non-failed
	/// document must have completed individual timing before this runs.
	pub fn run_aggregate(&mut self) -> Result<Vec<AggregateFailure>, ProcessingError> {
		for document in &self.documents {
			if matches!(
				document.state,
				DocumentState::Uninitialized | DocumentState::Initialized(_)
			) {
				return Err(ProcessingError::InvalidStateTransition {
					state: document.state.name(),
					action: "run the aggregate phase",
				});
			}
		}

		// Assemble the run-level IR: the collection array holds every
		// surviving document's processed value, in input order.
		let values: Vec<Value> = self
			.documents
			.iter()
			.filter_map(|document| {
				match &document.state {
					DocumentState::Processing(partial) => Some(ir::to_value(partial)),
					_ => None,
				}
			})
			.collect();

		let empty = Rc::new(IrNode::Object {
			path: PathAddress::root(),
			entries: Vec::new(),
		});
		let mut run_ir = ir::set_at(&empty, &self.collection, &Value::Array(values))?;

		let mut failures = Vec::new();
		let aggregate: Vec<Directive> = self
			.directives
			.iter()
			.filter(|d| d.kind.timing() == Some(DirectiveTiming::Aggregate))
			.cloned()
			.collect();
		for directive in &aggregate {
			match apply_aggregate(&run_ir, directive) {
				Ok(updated) => run_ir = updated,
				Err(error) => {
					tracing::warn!(kind = %directive.kind, %error, "aggregate directive failed");
					failures.push(AggregateFailure {
						kind: directive.kind,
						error,
					});
				}
			}
		}

		// Mark surviving documents processed with their node inside the
		// final tree.
		let mut position = 0;
		for document in &mut self.documents {
			if matches!(document.state, DocumentState::Processing(_)) {
				let node = ir::resolve(&run_ir, &self.collection.indexed(position))?;
				document.complete(node)?;
				position += 1;
			}
		}

		self.final_ir = Some(run_ir);
		Ok(failures)
	}

	/// Path-keyed accessor into processed data. Valid only once the
	/// aggregate phase has run.
	pub fn get(&self, path: &PathAddress) -> Result<Rc<IrNode>, ProcessingError> {
		let Some(final_ir) = &self.final_ir else {
			return Err(ProcessingError::InvalidStateTransition {
				state: "collecting",
				action: "read processed data",
			});
		};
		ir::resolve(final_ir, path)
	}

	/// The run-level IR, available once the aggregate phase has run.
	pub fn final_ir(&self) -> Option<&Rc<IrNode>> {
		self.final_ir.as_ref()
	}
}

/// Expect a directive flag value: `true` applies, `false` is a no-op, and
/// anything else is invalid.
fn expect_flag(directive: &Directive) -> Result<bool, ProcessingError> {
	match &directive.value {
		Value::Bool(flag) => Ok(*flag),
		other => {
			Err(ProcessingError::InvalidDirective {
				kind: directive.kind.to_string(),
				reason: format!("expected a boolean, got `{other}`"),
			})
		}
	}
}

fn expect_expression(directive: &Directive) -> Result<&str, ProcessingError> {
	match &directive.value {
		Value::String(expression) => Ok(expression),
		other => {
			Err(ProcessingError::InvalidDirective {
				kind: directive.kind.to_string(),
				reason: format!("expected a string expression, got `{other}`"),
			})
		}
	}
}

fn apply_individual(
	partial: &Rc<IrNode>,
	directive: &Directive,
	target: &PathAddress,
) -> Result<Rc<IrNode>, ProcessingError> {
	match directive.kind {
		DirectiveKind::FlattenArrays => {
			if !expect_flag(directive)? {
				return Ok(Rc::clone(partial));
			}
			let Ok(node) = ir::resolve(partial, target) else {
				return Ok(Rc::clone(partial));
			};
			if !node.is_array() {
				return Ok(Rc::clone(partial));
			}
			let flattened = flatten_deep(ir::to_value(&node));
			ir::set_at(partial, target, &flattened)
		}
		DirectiveKind::JmesPathFilter => {
			let expression = expect_expression(directive)?;
			let query = Query::parse(expression)?;
			let Ok(node) = ir::resolve(partial, target) else {
				return Ok(Rc::clone(partial));
			};
			let value = ir::to_value(&node);
			if node.is_scalar() && query.has_structural_steps() {
				return Err(ProcessingError::TransformationFailed {
					path: target.to_string(),
					reason: format!("cannot apply `{expression}` to a scalar value"),
				});
			}
			let result = query.evaluate(&value);
			ir::set_at(partial, target, &result)
		}
		_ => Ok(Rc::clone(partial)),
	}
}

fn apply_aggregate(
	run_ir: &Rc<IrNode>,
	directive: &Directive,
) -> Result<Rc<IrNode>, ProcessingError> {
	match directive.kind {
		DirectiveKind::DerivedFrom => {
			let expression = expect_expression(directive)?;
			let query = Query::parse(expression)?;
			let matches = query.evaluate(&ir::to_value(run_ir));
			let collected = flatten_one_level(matches);
			ir::set_at(run_ir, &directive.path, &collected)
		}
		DirectiveKind::DerivedUnique => {
			if !expect_flag(directive)? {
				return Ok(Rc::clone(run_ir));
			}
			let Ok(node) = ir::resolve(run_ir, &directive.path) else {
				return Ok(Rc::clone(run_ir));
			};
			let Value::Array(items) = ir::to_value(&node) else {
				return Ok(Rc::clone(run_ir));
			};
			let mut unique: Vec<Value> = Vec::with_capacity(items.len());
			for item in items {
				if !unique.iter().any(|seen| values_equal(seen, &item)) {
					unique.push(item);
				}
			}
			ir::set_at(run_ir, &directive.path, &Value::Array(unique))
		}
		_ => Ok(Rc::clone(run_ir)),
	}
}

/// Recursively concatenate nested arrays into one flat array, to any depth.
fn flatten_deep(value: Value) -> Value {
	let Value::Array(items) = value else {
		return value;
	};
	let mut flat = Vec::with_capacity(items.len());
	flatten_deep_into(items, &mut flat);
	Value::Array(flat)
}

fn flatten_deep_into(items: Vec<Value>, out: &mut Vec<Value>) {
	for item in items {
		match item {
			Value::Array(inner) => flatten_deep_into(inner, out),
			other => out.push(other),
		}
	}
}

/// Splice nested arrays one level deep; `derived-from` results flatten one
/// nesting level by default.
fn flatten_one_level(value: Value) -> Value {
	let Value::Array(items) = value else {
		return value;
	};
	let mut spliced = Vec::with_capacity(items.len());
	for item in items {
		match item {
			Value::Array(inner) => spliced.extend(inner),
			other => spliced.push(other),
		}
	}
	Value::Array(spliced)
}
