mod common;

use fmx_core::AnyEmptyResult;
use predicates::prelude::PredicateBooleanExt;

#[test]
fn build_writes_the_registry_artifact() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("registry.schema.yaml"), common::REGISTRY_SCHEMA)?;
	std::fs::write(
		tmp.path().join("a.md"),
		"---\ntitle: A\ntags: [a, b]\n---\n\n# A\n",
	)?;
	std::fs::write(
		tmp.path().join("b.md"),
		"---\ntitle: B\ntags: [b, c]\n---\n\n# B\n",
	)?;

	let mut cmd = common::fmx_cmd();
	cmd.arg("build")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("Processed").and(predicates::str::contains("2")));

	let artifact = std::fs::read_to_string(tmp.path().join("registry.json"))?;
	let value: serde_json::Value = serde_json::from_str(&artifact)?;
	assert_eq!(value["data"]["tags"], serde_json::json!(["a", "b", "c"]));
	assert_eq!(value["stats"]["processed"], serde_json::json!(2));

	Ok(())
}

#[test]
fn build_dry_run_prints_without_writing() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("registry.schema.yaml"), common::REGISTRY_SCHEMA)?;
	std::fs::write(tmp.path().join("a.md"), "---\ntitle: A\ntags: [a]\n---\n")?;

	let mut cmd = common::fmx_cmd();
	cmd.arg("build")
		.arg("--dry-run")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("\"tags\""));

	assert!(!tmp.path().join("registry.json").exists());

	Ok(())
}

#[test]
fn build_reports_failed_documents_but_still_writes() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("registry.schema.yaml"), common::REGISTRY_SCHEMA)?;
	std::fs::write(tmp.path().join("a.md"), "---\ntitle: A\ntags: [a]\n---\n")?;
	// Malformed frontmatter.
	std::fs::write(tmp.path().join("b.md"), "---\ntitle: [\n---\n")?;

	let mut cmd = common::fmx_cmd();
	cmd.arg("build")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("b.md"));

	let artifact = std::fs::read_to_string(tmp.path().join("registry.json"))?;
	let value: serde_json::Value = serde_json::from_str(&artifact)?;
	assert_eq!(value["stats"]["failed"], serde_json::json!(1));
	assert_eq!(value["data"]["tags"], serde_json::json!(["a"]));

	Ok(())
}

#[test]
fn build_honors_the_format_flag() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("registry.schema.yaml"), common::REGISTRY_SCHEMA)?;
	std::fs::write(tmp.path().join("a.md"), "---\ntitle: A\ntags: [a]\n---\n")?;

	let mut cmd = common::fmx_cmd();
	cmd.arg("build")
		.arg("--format")
		.arg("yaml")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	let artifact = std::fs::read_to_string(tmp.path().join("registry.yaml"))?;
	assert!(artifact.contains("processed: 1"));

	Ok(())
}

#[test]
fn build_without_schema_fails() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;

	let mut cmd = common::fmx_cmd();
	cmd.arg("build").arg("--path").arg(tmp.path()).assert().failure();

	Ok(())
}
