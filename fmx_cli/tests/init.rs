mod common;

use fmx_core::AnyEmptyResult;

#[test]
fn init_creates_config_and_schema() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;

	let mut cmd = common::fmx_cmd();
	cmd.arg("init").arg("--path").arg(tmp.path()).assert().success();

	assert!(tmp.path().join("fmx.toml").is_file());
	assert!(tmp.path().join("registry.schema.yaml").is_file());

	Ok(())
}

#[test]
fn init_leaves_existing_files_untouched() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("fmx.toml"), "# custom\n")?;

	let mut cmd = common::fmx_cmd();
	cmd.arg("init")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("already exists"));

	assert_eq!(std::fs::read_to_string(tmp.path().join("fmx.toml"))?, "# custom\n");

	Ok(())
}

#[test]
fn init_then_build_works_end_to_end() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;

	common::fmx_cmd()
		.arg("init")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	std::fs::write(
		tmp.path().join("guide.md"),
		"---\ntitle: Guide\ntags: [docs]\n---\n\n# Guide\n",
	)?;

	common::fmx_cmd()
		.arg("build")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	let artifact = std::fs::read_to_string(tmp.path().join("registry.json"))?;
	let value: serde_json::Value = serde_json::from_str(&artifact)?;
	assert_eq!(value["data"]["tags"], serde_json::json!(["docs"]));

	Ok(())
}
