use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use fmx_core::ArtifactFormat;

#[derive(Parser)]
#[command(
	version,
	about = "Build structured registries from document frontmatter.",
	long_about = "fmx extracts frontmatter metadata from many documents, reshapes it through a \
	              schema carrying x- processing directives, renders declared templates, and \
	              aggregates everything into one registry artifact with run \
	              statistics.\n\nQuick start:\n  fmx init     Create a sample config and schema\n  \
	              fmx build    Build the registry artifact\n  fmx inspect  List the schema's \
	              directives"
)]
pub struct FmxCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Initialize fmx in a project by creating a sample config and schema.
	///
	/// Creates `fmx.toml` and `registry.schema.yaml` in the project root.
	/// Existing files are left untouched.
	Init,
	/// Build the registry artifact from all matching documents.
	///
	/// Loads the schema, extracts frontmatter from every document matching
	/// the configured input patterns, applies the schema's processing
	/// directives, renders any declared templates, and writes the
	/// aggregated artifact. Documents that fail are reported and excluded;
	/// the artifact is still produced for the rest.
	Build {
		/// Print the artifact to stdout instead of writing it.
		#[arg(long, default_value_t = false)]
		dry_run: bool,

		/// Artifact format. Overrides both the config file and the
		/// schema's `x-template-format`.
		#[arg(long, value_enum)]
		format: Option<CliFormat>,

		/// Where to write the artifact. Defaults to the configured output
		/// path, then `registry.json`/`registry.yaml` by format.
		#[arg(long)]
		output: Option<PathBuf>,

		/// Schema file to use instead of the configured one.
		#[arg(long)]
		schema: Option<PathBuf>,
	},
	/// List every directive the schema declares.
	///
	/// Shows each directive's intent (extraction, template, or
	/// processing), its owning path, and its raw value. Useful for
	/// auditing what a schema will do before running a build.
	Inspect {
		/// Output format for the directive listing.
		#[arg(long, value_enum, default_value_t = InspectFormat::Text)]
		format: InspectFormat,

		/// Schema file to use instead of the configured one.
		#[arg(long)]
		schema: Option<PathBuf>,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliFormat {
	/// JSON artifact output.
	Json,
	/// YAML artifact output.
	Yaml,
}

impl From<CliFormat> for ArtifactFormat {
	fn from(format: CliFormat) -> Self {
		match format {
			CliFormat::Json => ArtifactFormat::Json,
			CliFormat::Yaml => ArtifactFormat::Yaml,
		}
	}
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InspectFormat {
	/// Human-readable text output.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}
