//! Aggregation of per-document results into the final artifact.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::ProcessingError;
use crate::SerializationError;

/// Synthetic document id used for failures that belong to the run rather
/// than a single document (aggregate-timing directives).
pub const AGGREGATE_DOC_ID: &str = "<aggregate>";

/// The serialization format of the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ArtifactFormat {
	Json,
	Yaml,
}

impl ArtifactFormat {
	pub fn from_name(name: &str) -> Result<Self, SerializationError> {
		match name.trim().to_ascii_lowercase().as_str() {
			"json" => Ok(Self::Json),
			"yaml" | "yml" => Ok(Self::Yaml),
			other => Err(SerializationError::UnsupportedFormat(other.to_string())),
		}
	}
}

impl std::fmt::Display for ArtifactFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Json => write!(f, "json"),
			Self::Yaml => write!(f, "yaml"),
		}
	}
}

/// One recorded failure: the document, the directive kind when one was
/// involved, and the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
	pub doc_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub directive: Option<String>,
	pub message: String,
}

/// Statistics for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
	pub total: usize,
	pub processed: usize,
	pub failed: usize,
	pub skipped: usize,
	pub success_rate: f64,
	pub duration_ms: u64,
	pub unique_value_counts: BTreeMap<String, usize>,
	pub null_counts: BTreeMap<String, usize>,
	pub failures: Vec<FailureRecord>,
}

/// The consolidated artifact: run statistics, the aggregated data, and the
/// rendered template output when templates were declared.
#[derive(Debug, Clone, Serialize)]
pub struct FinalResult {
	pub stats: RunStats,
	pub data: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rendered: Option<String>,
}

#[derive(Debug)]
enum AggregatorState {
	Uninitialized,
	Collecting { started: Instant },
	Finalized,
}

impl AggregatorState {
	fn name(&self) -> &'static str {
		match self {
			Self::Uninitialized => "uninitialized",
			Self::Collecting { .. } => "collecting",
			Self::Finalized => "finalized",
		}
	}
}

/// Folds per-document results into one [`FinalResult`]. Lifecycle:
/// `Uninitialized → Collecting → Finalized`; `integrate` and
/// `record_failure` are valid only while collecting, `serialize` only once
/// finalized.
#[derive(Debug)]
pub struct Aggregator {
	state: AggregatorState,
	format: ArtifactFormat,
	total: usize,
	processed: usize,
	failed: usize,
	skipped: usize,
	unique_values: BTreeMap<String, BTreeSet<String>>,
	null_counts: BTreeMap<String, usize>,
	failures: Vec<FailureRecord>,
	result: Option<FinalResult>,
}

impl Default for Aggregator {
	fn default() -> Self {
		Self::new()
	}
}

impl Aggregator {
	pub fn new() -> Self {
		Self {
			state: AggregatorState::Uninitialized,
			format: ArtifactFormat::Json,
			total: 0,
			processed: 0,
			failed: 0,
			skipped: 0,
			unique_values: BTreeMap::new(),
			null_counts: BTreeMap::new(),
			failures: Vec::new(),
			result: None,
		}
	}

	pub fn format(&self) -> ArtifactFormat {
		self.format
	}

	/// Start collecting. Valid only from `Uninitialized`.
	pub fn initialize(
		&mut self,
		total: usize,
		format: ArtifactFormat,
	) -> Result<(), ProcessingError> {
		match self.state {
			AggregatorState::Uninitialized => {
				self.state = AggregatorState::Collecting {
					started: Instant::now(),
				};
				self.total = total;
				self.format = format;
				Ok(())
			}
			_ => Err(self.invalid("initialize")),
		}
	}

	/// Fold one processed document node into the accumulator.
	pub fn integrate(&mut self, doc_id: &str, value: &Value) -> Result<(), ProcessingError> {
		self.expect_collecting("integrate a document")?;
		self.processed += 1;

		if let Value::Object(fields) = value {
			for (field, field_value) in fields {
				if field_value.is_null() {
					*self.null_counts.entry(field.clone()).or_default() += 1;
				} else if let Ok(canonical) = serde_json::to_string(field_value) {
					self.unique_values
						.entry(field.clone())
						.or_default()
						.insert(canonical);
				}
			}
		}

		tracing::trace!(doc_id, "integrated document");
		Ok(())
	}

	pub fn record_failure(&mut self, record: FailureRecord) -> Result<(), ProcessingError> {
		self.expect_collecting("record a failure")?;
		self.failed += 1;
		self.failures.push(record);
		Ok(())
	}

	/// A document with no frontmatter block: neither processed nor
	/// failed.
	pub fn record_skipped(&mut self, doc_id: &str) -> Result<(), ProcessingError> {
		self.expect_collecting("record a skipped document")?;
		self.skipped += 1;
		tracing::debug!(doc_id, "skipped document without frontmatter");
		Ok(())
	}

	/// Close collection and produce the final result.
	pub fn finalize(
		&mut self,
		data: Value,
		rendered: Option<String>,
	) -> Result<FinalResult, ProcessingError> {
		let AggregatorState::Collecting { started } = &self.state else {
			return Err(self.invalid("finalize"));
		};
		let started = *started;

		let attempted = self.processed + self.failed;
		let success_rate = if attempted == 0 {
			1.0
		} else {
			self.processed as f64 / attempted as f64
		};

		let result = FinalResult {
			stats: RunStats {
				total: self.total,
				processed: self.processed,
				failed: self.failed,
				skipped: self.skipped,
				success_rate,
				duration_ms: started.elapsed().as_millis() as u64,
				unique_value_counts: self
					.unique_values
					.iter()
					.map(|(field, values)| (field.clone(), values.len()))
					.collect(),
				null_counts: self.null_counts.clone(),
				failures: self.failures.clone(),
			},
			data,
			rendered,
		};

		self.state = AggregatorState::Finalized;
		self.result = Some(result.clone());
		Ok(result)
	}

	/// Serialize the finalized result in the format chosen at
	/// `initialize`.
	pub fn serialize(&self) -> Result<String, crate::FmxError> {
		let Some(result) = &self.result else {
			return Err(self.invalid("serialize").into());
		};
		Ok(serialize_result(result, self.format)?)
	}

	fn expect_collecting(&self, action: &'static str) -> Result<(), ProcessingError> {
		match self.state {
			AggregatorState::Collecting { .. } => Ok(()),
			_ => Err(self.invalid(action)),
		}
	}

	fn invalid(&self, action: &'static str) -> ProcessingError {
		ProcessingError::InvalidStateTransition {
			state: self.state.name(),
			action,
		}
	}
}

/// Serialize a result to the requested format.
pub fn serialize_result(
	result: &FinalResult,
	format: ArtifactFormat,
) -> Result<String, SerializationError> {
	match format {
		ArtifactFormat::Json => serde_json::to_string_pretty(result).map_err(emit_error),
		ArtifactFormat::Yaml => serde_yaml_ng::to_string(result).map_err(emit_error),
	}
}

fn emit_error(error: impl std::fmt::Display) -> SerializationError {
	let reason = error.to_string();
	if reason.contains("recursion") {
		SerializationError::CircularReference
	} else {
		SerializationError::Emit { reason }
	}
}
