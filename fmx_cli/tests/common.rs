use assert_cmd::Command;

pub fn fmx_cmd() -> Command {
	let mut cmd = Command::cargo_bin("fmx").expect("fmx binary should build");
	cmd.env("NO_COLOR", "1");
	cmd
}

pub const REGISTRY_SCHEMA: &str = r#"type: object
properties:
  posts:
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
    x-derived-from: "posts[].tags[]"
    x-derived-unique: true
"#;
