use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::FmxError;
use crate::FmxResult;

/// Default maximum file size in bytes (10 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default schema file name when the config does not name one.
pub const DEFAULT_SCHEMA_FILE: &str = "registry.schema.yaml";

/// Default artifact output path.
pub const DEFAULT_OUTPUT_FILE: &str = "registry.json";

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["fmx.toml", ".fmx.toml", ".config/fmx.toml"];

/// Configuration loaded from an `fmx.toml` file.
///
/// ```toml
/// schema = "registry.schema.yaml"
/// output = "registry.json"
/// format = "json"
///
/// [input]
/// patterns = ["docs/**/*.md"]
///
/// [exclude]
/// patterns = ["target/", "node_modules/"]
///
/// [render]
/// sentinel = ""
/// ```
#[derive(Debug, Deserialize)]
pub struct FmxConfig {
	/// Path to the schema file, relative to the project root.
	#[serde(default)]
	pub schema: Option<PathBuf>,
	/// Path the artifact is written to, relative to the project root.
	#[serde(default)]
	pub output: Option<PathBuf>,
	/// Artifact format override (`json` or `yaml`). The schema's
	/// `x-template-format` wins over this; a CLI flag wins over both.
	#[serde(default)]
	pub format: Option<String>,
	/// Maximum file size in bytes to scan. Larger files are skipped.
	#[serde(default = "default_max_file_size")]
	pub max_file_size: u64,
	/// When true, `.gitignore` files are not used for filtering.
	#[serde(default)]
	pub disable_gitignore: bool,
	#[serde(default)]
	pub input: InputConfig,
	#[serde(default)]
	pub exclude: ExcludeConfig,
	#[serde(default)]
	pub render: RenderConfig,
}

/// Glob patterns selecting the documents to scan.
#[derive(Debug, Deserialize)]
pub struct InputConfig {
	#[serde(default = "default_input_patterns")]
	pub patterns: Vec<String>,
}

impl Default for InputConfig {
	fn default() -> Self {
		Self {
			patterns: default_input_patterns(),
		}
	}
}

/// Gitignore-style patterns for files and directories to skip.
#[derive(Debug, Default, Deserialize)]
pub struct ExcludeConfig {
	#[serde(default)]
	pub patterns: Vec<String>,
}

/// Template rendering configuration.
#[derive(Debug, Default, Deserialize)]
pub struct RenderConfig {
	/// Replacement text for template variables that resolve nowhere.
	#[serde(default)]
	pub sentinel: String,
}

fn default_max_file_size() -> u64 {
	DEFAULT_MAX_FILE_SIZE
}

fn default_input_patterns() -> Vec<String> {
	vec!["**/*.md".to_string()]
}

impl FmxConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> FmxResult<Option<FmxConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: FmxConfig =
			toml::from_str(&content).map_err(|e| FmxError::ConfigParse(e.to_string()))?;

		Ok(Some(config))
	}
}
