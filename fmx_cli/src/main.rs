use std::path::PathBuf;
use std::process;

use clap::Parser;
use fmx_core::AnyError;
use fmx_core::DirectiveIntent;
use fmx_core::FmxConfig;
use fmx_core::RunOptions;
use fmx_core::config::DEFAULT_SCHEMA_FILE;
use fmx_core::extract_directives;
use fmx_core::load_schema;
use fmx_core::run;
use fmx_cli::CliFormat;
use fmx_cli::Commands;
use fmx_cli::FmxCli;
use fmx_cli::InspectFormat;
use owo_colors::OwoColorize;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = FmxCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	if args.verbose {
		tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::new("fmx_core=debug,fmx_cli=debug"))
			.with_writer(std::io::stderr)
			.init();
	}

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match args.command {
		Some(Commands::Init) => run_init(&args),
		Some(Commands::Build {
			dry_run,
			format,
			ref output,
			ref schema,
		}) => run_build(&args, dry_run, format, output.clone(), schema.clone()),
		Some(Commands::Inspect { format, ref schema }) => {
			run_inspect(&args, format, schema.clone())
		}
		None => {
			eprintln!("No subcommand specified. Run `fmx --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Try to render through miette for rich diagnostics with help text
		// and error codes.
		match e.downcast::<fmx_core::FmxError>() {
			Ok(fmx_err) => {
				let report: miette::Report = (*fmx_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

fn resolve_root(args: &FmxCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn resolve_schema_path(
	args: &FmxCli,
	config: Option<&FmxConfig>,
	flag: Option<PathBuf>,
) -> PathBuf {
	let root = resolve_root(args);
	let schema = flag
		.or_else(|| config.and_then(|c| c.schema.clone()))
		.unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_FILE));
	root.join(schema)
}

fn print_section(title: &str) {
	println!();
	println!("{}", colored!(title, bold));
}

fn print_field(label: &str, value: impl std::fmt::Display) {
	println!("{label:<24} {value}");
}

fn run_build(
	args: &FmxCli,
	dry_run: bool,
	format: Option<CliFormat>,
	output: Option<PathBuf>,
	schema: Option<PathBuf>,
) -> Result<(), AnyError> {
	let root = resolve_root(args);
	let config = FmxConfig::load(&root)?;

	let mut options = RunOptions::from_config(&root, config.as_ref())?;
	if let Some(schema) = schema {
		options.schema_path = root.join(schema);
	}
	if let Some(format) = format {
		options.format = Some(format.into());
	}

	let outcome = run(&options)?;
	let stats = &outcome.result.stats;

	print_section("Run summary");
	print_field("Documents scanned", stats.total);
	print_field("Processed", colored!(stats.processed, green));
	if stats.failed > 0 {
		print_field("Failed", colored!(stats.failed, red));
	} else {
		print_field("Failed", stats.failed);
	}
	print_field("Skipped", stats.skipped);
	print_field("Duration", format!("{}ms", stats.duration_ms));

	if !stats.failures.is_empty() {
		print_section("Failures");
		for failure in &stats.failures {
			let directive = failure
				.directive
				.as_ref()
				.map(|kind| format!(" [{kind}]"))
				.unwrap_or_default();
			println!(
				"  {} {}{directive}: {}",
				colored!("✗", red),
				failure.doc_id,
				failure.message
			);
		}
	}

	if dry_run {
		println!();
		println!("{}", outcome.artifact);
		return Ok(());
	}

	let output_path = output
		.or_else(|| config.as_ref().and_then(|c| c.output.clone()))
		.unwrap_or_else(|| {
			PathBuf::from(match outcome.format {
				fmx_core::ArtifactFormat::Json => "registry.json",
				fmx_core::ArtifactFormat::Yaml => "registry.yaml",
				_ => unreachable!(),
			})
		});
	let output_path = root.join(output_path);
	std::fs::write(&output_path, &outcome.artifact)?;

	println!();
	println!(
		"{} wrote {}",
		colored!("✓", green),
		output_path.display()
	);

	Ok(())
}

fn run_inspect(
	args: &FmxCli,
	format: InspectFormat,
	schema: Option<PathBuf>,
) -> Result<(), AnyError> {
	let root = resolve_root(args);
	let config = FmxConfig::load(&root)?;
	let schema_path = resolve_schema_path(args, config.as_ref(), schema);

	let resolved = load_schema(&schema_path)?;
	let directives = extract_directives(&resolved);

	match format {
		InspectFormat::Text => {
			if directives.is_empty() {
				println!("No directives declared in {}", schema_path.display());
				return Ok(());
			}
			print_section(&format!("Directives in {}", schema_path.display()));
			for directive in &directives {
				let path = if directive.path.is_root() {
					"(root)".to_string()
				} else {
					directive.path.to_string()
				};
				println!(
					"  {:<12} {:<22} {:<28} {}",
					intent_name(directive.kind.intent()),
					directive.kind.to_string(),
					path,
					directive.value
				);
			}
		}
		InspectFormat::Json => {
			let rows: Vec<serde_json::Value> = directives
				.iter()
				.map(|directive| {
					serde_json::json!({
						"kind": directive.kind.to_string(),
						"intent": intent_name(directive.kind.intent()),
						"path": directive.path.to_string(),
						"value": directive.value,
					})
				})
				.collect();
			println!("{}", serde_json::to_string_pretty(&rows)?);
		}
	}

	Ok(())
}

fn intent_name(intent: DirectiveIntent) -> &'static str {
	match intent {
		DirectiveIntent::Extraction => "extraction",
		DirectiveIntent::Template => "template",
		DirectiveIntent::Processing => "processing",
	}
}

const SAMPLE_CONFIG: &str = r#"schema = "registry.schema.yaml"
output = "registry.json"

[input]
patterns = ["**/*.md"]

[exclude]
patterns = ["target/"]

[render]
sentinel = ""
"#;

const SAMPLE_SCHEMA: &str = r#"type: object
properties:
  documents:
    type: array
    items:
      type: object
      properties:
        title:
          type: string
          x-frontmatter-part: true
        tags:
          type: array
          x-frontmatter-part: true
  tags:
    type: array
    x-derived-from: "documents[].tags[]"
    x-derived-unique: true
"#;

fn run_init(args: &FmxCli) -> Result<(), AnyError> {
	let root = resolve_root(args);
	let config_path = root.join("fmx.toml");
	let schema_path = root.join("registry.schema.yaml");

	if config_path.exists() {
		println!("Config file already exists: {}", config_path.display());
	} else {
		std::fs::write(&config_path, SAMPLE_CONFIG)?;
		println!(
			"{} created {}",
			colored!("✓", green),
			config_path.display()
		);
	}

	if schema_path.exists() {
		println!("Schema file already exists: {}", schema_path.display());
	} else {
		std::fs::write(&schema_path, SAMPLE_SCHEMA)?;
		println!(
			"{} created {}",
			colored!("✓", green),
			schema_path.display()
		);
	}

	println!();
	println!("Next steps:");
	println!("  1. Point [input] patterns at your documents");
	println!("  2. Adjust the schema's x- directives");
	println!("  3. Run `fmx build`");

	Ok(())
}
