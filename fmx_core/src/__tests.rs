use rstest::rstest;
use serde_json::Value;
use serde_json::json;
use similar_asserts::assert_eq;

use super::__fixtures::*;
use super::*;
use crate::frontmatter;
use crate::frontmatter::FrontmatterFormat;
use crate::ir;
use crate::ir::IrBuilder;
use crate::ir::IrNode;

// --- Path tests ---

#[rstest]
#[case::single("a")]
#[case::nested("a.b")]
#[case::marker("a.b[].c")]
#[case::index("a[0].b")]
#[case::collection("commands[].c1")]
#[case::trailing_marker("tags[]")]
#[case::double_bracket("posts[].tags[]")]
#[case::leading_index("[0].x")]
fn path_round_trips(#[case] input: &str) -> AnyEmptyResult {
	let path = PathAddress::parse(input)?;
	assert_eq!(path.to_string(), input);
	let reparsed = PathAddress::parse(path.to_string())?;
	assert_eq!(reparsed, path);

	Ok(())
}

#[rstest]
#[case::double_dot("a..b")]
#[case::unclosed_bracket("a[")]
#[case::bad_index("a[x]")]
#[case::leading_dot(".a")]
#[case::stray_close("a]b")]
#[case::negative_index("a[-1]")]
fn path_parse_errors(#[case] input: &str) {
	assert!(PathAddress::parse(input).is_err());
}

#[test]
fn path_root_is_empty() -> AnyEmptyResult {
	let root = PathAddress::parse("")?;
	assert!(root.is_root());
	assert_eq!(root.to_string(), "");

	Ok(())
}

#[test]
fn path_prefix_operations() -> AnyEmptyResult {
	let path = PathAddress::parse("commands[].c1")?;
	let collection = PathAddress::parse("commands")?;

	assert!(path.starts_with(&collection));
	assert_eq!(
		path.strip_prefix(&collection),
		Some(PathAddress::parse("[].c1")?)
	);
	assert_eq!(
		path.item_relative(&collection),
		Some(PathAddress::parse("c1")?)
	);

	// Not addressed through the collection's items.
	assert_eq!(PathAddress::parse("other.c1")?.item_relative(&collection), None);
	assert_eq!(PathAddress::parse("commands.c1")?.item_relative(&collection), None);

	Ok(())
}

// --- IR tests ---

#[rstest]
#[case::null(json!(null))]
#[case::boolean(json!(true))]
#[case::integer(json!(42))]
#[case::float(json!(1.5))]
#[case::string(json!("hello"))]
#[case::array(json!([1, [2, 3], { "a": null }]))]
#[case::object(json!({ "a": { "b": [1, 2] }, "c": "x" }))]
#[case::empty_object(json!({}))]
#[case::empty_array(json!([]))]
fn ir_round_trips(#[case] value: Value) {
	let node = IrBuilder::from_data(&value);
	assert_eq!(ir::to_value(&node), value);
}

#[test]
fn ir_resolves_broadcast_paths() -> AnyEmptyResult {
	let node = IrBuilder::from_data(&commands_data());
	let resolved = ir::resolve(&node, &PathAddress::parse("commands[].c1")?)?;
	assert_eq!(ir::to_value(&resolved), json!(["a", "b"]));

	Ok(())
}

#[test]
fn ir_resolves_indexed_paths() -> AnyEmptyResult {
	let node = IrBuilder::from_data(&commands_data());
	let resolved = ir::resolve(&node, &PathAddress::parse("commands[1].c1")?)?;
	assert_eq!(ir::to_value(&resolved), json!("b"));

	Ok(())
}

#[test]
fn ir_resolve_missing_is_path_not_found() -> AnyEmptyResult {
	let node = IrBuilder::from_data(&commands_data());
	let result = ir::resolve(&node, &PathAddress::parse("commands[].missing.deeper")?);
	// Broadcast drops per-item misses, so query one item directly.
	let resolved = result?;
	assert_eq!(ir::to_value(&resolved), json!([]));

	let result = ir::resolve(&node, &PathAddress::parse("nope")?);
	assert!(matches!(result, Err(ProcessingError::PathNotFound { .. })));

	Ok(())
}

#[test]
fn ir_child_paths_extend_parent_paths() -> AnyEmptyResult {
	let node = IrBuilder::from_data(&commands_data());
	let resolved = ir::resolve(&node, &PathAddress::parse("commands[0].c1")?)?;
	assert_eq!(resolved.path().to_string(), "commands[0].c1");

	Ok(())
}

#[test]
fn ir_set_at_shares_untouched_siblings() -> AnyEmptyResult {
	let node = IrBuilder::from_data(&json!({ "a": { "x": 1 }, "b": { "y": 2 } }));
	let updated = ir::set_at(&node, &PathAddress::parse("a.x")?, &json!(9))?;

	let sibling = |root: &std::rc::Rc<IrNode>| {
		let IrNode::Object { entries, .. } = root.as_ref() else {
			panic!("expected object root");
		};
		entries
			.iter()
			.find(|(name, _)| name == "b")
			.map(|(_, child)| std::rc::Rc::clone(child))
			.expect("missing sibling")
	};

	assert!(std::rc::Rc::ptr_eq(&sibling(&node), &sibling(&updated)));
	assert_eq!(
		ir::to_value(&updated),
		json!({ "a": { "x": 9 }, "b": { "y": 2 } })
	);
	// The original is untouched.
	assert_eq!(
		ir::to_value(&node),
		json!({ "a": { "x": 1 }, "b": { "y": 2 } })
	);

	Ok(())
}

#[test]
fn ir_set_at_upserts_missing_entries() -> AnyEmptyResult {
	let node = IrBuilder::from_data(&json!({ "a": 1 }));
	let updated = ir::set_at(&node, &PathAddress::parse("meta.tags")?, &json!(["x"]))?;
	assert_eq!(
		ir::to_value(&updated),
		json!({ "a": 1, "meta": { "tags": ["x"] } })
	);

	Ok(())
}

#[test]
fn ir_value_at_walks_dotted_paths() -> AnyEmptyResult {
	let data = json!({ "meta": { "tags": ["a", "b"] } });
	let value = ir::value_at(&data, &PathAddress::parse("meta.tags[1]")?);
	assert_eq!(value, Some(&json!("b")));
	assert_eq!(ir::value_at(&data, &PathAddress::parse("meta.nope")?), None);

	Ok(())
}

// --- Schema tests ---

fn contains_ref(value: &Value) -> bool {
	match value {
		Value::Object(map) => {
			map.contains_key("$ref") || map.values().any(contains_ref)
		}
		Value::Array(items) => items.iter().any(contains_ref),
		_ => false,
	}
}

#[test]
fn schema_resolves_internal_refs() -> AnyEmptyResult {
	let raw = json!({
		"type": "object",
		"properties": {
			"commands": { "$ref": "#/definitions/commandList" }
		},
		"definitions": {
			"commandList": {
				"type": "array",
				"items": { "type": "object" }
			}
		}
	});
	let resolved = resolve_schema(&raw, std::path::Path::new("."))?;
	assert!(!contains_ref(resolved.root()));
	assert_eq!(
		resolved.root()["properties"]["commands"]["type"],
		json!("array")
	);

	Ok(())
}

#[test]
fn schema_allows_diamond_reuse() -> AnyEmptyResult {
	let raw = json!({
		"properties": {
			"a": { "$ref": "#/definitions/shared" },
			"b": { "$ref": "#/definitions/shared" }
		},
		"definitions": {
			"shared": { "type": "string" }
		}
	});
	let resolved = resolve_schema(&raw, std::path::Path::new("."))?;
	assert_eq!(resolved.root()["properties"]["a"], resolved.root()["properties"]["b"]);

	Ok(())
}

#[test]
fn schema_detects_circular_refs() {
	let raw = json!({
		"root": { "$ref": "#/definitions/a" },
		"definitions": {
			"a": { "$ref": "#/definitions/b" },
			"b": { "$ref": "#/definitions/a" }
		}
	});
	let result = resolve_schema(&raw, std::path::Path::new("."));
	assert!(matches!(result, Err(SchemaError::CircularReference { .. })));
}

#[test]
fn schema_bounds_ref_recursion() {
	let mut definitions = serde_json::Map::new();
	for index in 0..MAX_REF_DEPTH {
		definitions.insert(
			format!("d{index}"),
			json!({ "$ref": format!("#/definitions/d{}", index + 1) }),
		);
	}
	definitions.insert(format!("d{MAX_REF_DEPTH}"), json!({ "type": "string" }));
	let raw = json!({
		"root": { "$ref": "#/definitions/d0" },
		"definitions": definitions
	});

	let result = resolve_schema(&raw, std::path::Path::new("."));
	assert!(matches!(result, Err(SchemaError::MaxDepthExceeded { .. })));
}

#[test]
fn schema_short_ref_chains_resolve() -> AnyEmptyResult {
	let raw = json!({
		"root": { "$ref": "#/definitions/d0" },
		"definitions": {
			"d0": { "$ref": "#/definitions/d1" },
			"d1": { "$ref": "#/definitions/d2" },
			"d2": { "type": "number" }
		}
	});
	let resolved = resolve_schema(&raw, std::path::Path::new("."))?;
	assert_eq!(resolved.root()["root"]["type"], json!("number"));

	Ok(())
}

#[test]
fn schema_reports_unresolvable_refs() {
	let raw = json!({ "root": { "$ref": "#/definitions/missing" } });
	let result = resolve_schema(&raw, std::path::Path::new("."));
	assert!(matches!(result, Err(SchemaError::RefResolutionFailed { .. })));
}

#[test]
fn schema_resolves_file_refs() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(
		tmp.path().join("shared.yaml"),
		"definitions:\n  tag:\n    type: string\n",
	)?;
	let raw = json!({ "tag": { "$ref": "shared.yaml#/definitions/tag" } });
	let resolved = resolve_schema(&raw, tmp.path())?;
	assert_eq!(resolved.root()["tag"]["type"], json!("string"));

	Ok(())
}

#[test]
fn extract_directives_normalizes_array_paths() -> AnyEmptyResult {
	let schema = resolve_schema(&registry_schema(), std::path::Path::new("."))?;
	let directives = extract_directives(&schema);

	let flatten = directives
		.iter()
		.find(|d| d.kind == DirectiveKind::FlattenArrays)
		.expect("missing flatten directive");
	assert_eq!(flatten.path.to_string(), "posts[].tags");

	let derived = directives
		.iter()
		.find(|d| d.kind == DirectiveKind::DerivedFrom)
		.expect("missing derived directive");
	assert_eq!(derived.path.to_string(), "tags");

	Ok(())
}

#[test]
fn extract_directives_ignores_unknown_extension_keys() -> AnyEmptyResult {
	let raw = json!({
		"type": "object",
		"x-vendor-widget": { "anything": true },
		"properties": {
			"name": { "type": "string", "x-frontmatter-part": true }
		}
	});
	let schema = resolve_schema(&raw, std::path::Path::new("."))?;
	let directives = extract_directives(&schema);
	assert_eq!(directives.len(), 1);
	assert_eq!(directives[0].kind, DirectiveKind::FrontmatterPart);

	Ok(())
}

#[test]
fn classify_splits_directives_by_intent() -> AnyEmptyResult {
	let schema = resolve_schema(&registry_schema(), std::path::Path::new("."))?;
	let classified = classify(extract_directives(&schema));

	assert_eq!(classified.extraction.len(), 2);
	assert_eq!(classified.template.len(), 0);
	assert_eq!(classified.processing.len(), 3);
	// Declaration order within the intent is preserved.
	assert_eq!(classified.processing[0].kind, DirectiveKind::FlattenArrays);
	assert_eq!(classified.processing[1].kind, DirectiveKind::DerivedFrom);
	assert_eq!(classified.processing[2].kind, DirectiveKind::DerivedUnique);

	Ok(())
}

#[test]
fn document_collection_comes_from_extraction_paths() -> AnyEmptyResult {
	let schema = resolve_schema(&registry_schema(), std::path::Path::new("."))?;
	let classified = classify(extract_directives(&schema));
	assert_eq!(
		document_collection(&classified.extraction).to_string(),
		"posts"
	);

	// No array-addressed extraction hints: fall back to `documents`.
	assert_eq!(document_collection(&[]).to_string(), "documents");

	Ok(())
}

// --- Query tests ---

#[rstest]
#[case::field("c1", json!({ "c1": 5 }), json!(5))]
#[case::nested_field("a.b", json!({ "a": { "b": "x" } }), json!("x"))]
#[case::missing_field("nope", json!({ "c1": 5 }), json!(null))]
#[case::flatten("commands[].c1", commands_data(), json!(["a", "b"]))]
#[case::flatten_nested("[]", json!([[1, 2], [3]]), json!([1, 2, 3]))]
#[case::wildcard("[*]", json!([1, 2]), json!([1, 2]))]
#[case::index("items[1]", json!({ "items": [1, 2, 3] }), json!(2))]
#[case::index_out_of_bounds("items[9]", json!({ "items": [1] }), json!(null))]
#[case::recursive("..name", json!({ "a": { "name": "x" }, "b": [{ "name": "y" }] }), json!(["x", "y"]))]
#[case::filter_eq("[?active == true]", json!([{ "active": true, "n": 1 }, { "active": false, "n": 2 }]), json!([{ "active": true, "n": 1 }]))]
#[case::filter_ge("[?n >= 2]", json!([{ "n": 1 }, { "n": 2 }, { "n": 3 }]), json!([{ "n": 2 }, { "n": 3 }]))]
#[case::filter_string("[?kind == \"post\"]", json!([{ "kind": "post" }, { "kind": "page" }]), json!([{ "kind": "post" }]))]
#[case::filter_single_quotes("[?kind == 'post']", json!([{ "kind": "post" }]), json!([{ "kind": "post" }]))]
#[case::projection_drops_misses("posts[].title", json!({ "posts": [{ "title": "a" }, {}] }), json!(["a"]))]
fn query_evaluates(
	#[case] expression: &str,
	#[case] input: Value,
	#[case] expected: Value,
) -> AnyEmptyResult {
	let query = Query::parse(expression)?;
	assert_eq!(query.evaluate(&input), expected);

	Ok(())
}

#[rstest]
#[case::dangling_dot("a.")]
#[case::dangling_recursive("a..")]
#[case::unknown_operator("a[?x ~ 1]")]
#[case::unterminated_bracket("a[")]
#[case::bad_literal("a[?x == b]")]
fn query_parse_errors(#[case] expression: &str) {
	assert!(Query::parse(expression).is_err());
}

#[test]
fn query_structural_step_detection() -> AnyEmptyResult {
	assert!(Query::parse("tags[]")?.has_structural_steps());
	assert!(Query::parse("[?n >= 2]")?.has_structural_steps());
	assert!(!Query::parse("a.b")?.has_structural_steps());

	Ok(())
}

// --- Engine tests ---

fn tag_union_directives() -> Vec<Directive> {
	vec![
		directive(DirectiveKind::FlattenArrays, "posts[].tags", json!(true)),
		directive(DirectiveKind::DerivedFrom, "tags", json!("posts[].tags[]")),
		directive(DirectiveKind::DerivedUnique, "tags", json!(true)),
	]
}

#[test]
fn engine_aggregate_sees_post_individual_state() -> AnyEmptyResult {
	let mut engine = ProcessingEngine::new(PathAddress::parse("posts")?);
	engine.set_directives(tag_union_directives());
	engine.initialize(nested_tag_documents())?;
	engine.run_individual();
	let failures = engine.run_aggregate()?;
	assert!(failures.is_empty());

	// The nested tags were flattened per document *before* the derived
	// directive collected across the set; otherwise the union would
	// contain arrays, not strings.
	let tags = engine.get(&PathAddress::parse("tags")?)?;
	assert_eq!(ir::to_value(&tags), json!(["a", "b", "c"]));

	let first = engine.get(&PathAddress::parse("posts[0].tags")?)?;
	assert_eq!(ir::to_value(&first), json!(["a", "b"]));

	Ok(())
}

#[test]
fn engine_derived_unique_is_idempotent() -> AnyEmptyResult {
	let mut engine = ProcessingEngine::new(PathAddress::parse("posts")?);
	engine.set_directives(vec![
		directive(DirectiveKind::DerivedFrom, "tags", json!("posts[].tags[]")),
		directive(DirectiveKind::DerivedUnique, "tags", json!(true)),
		directive(DirectiveKind::DerivedUnique, "tags", json!(true)),
	]);
	engine.initialize(vec![
		("a.md".to_string(), json!({ "tags": ["a", "b"] })),
		("b.md".to_string(), json!({ "tags": ["b", "c"] })),
	])?;
	engine.run_individual();
	engine.run_aggregate()?;

	let tags = engine.get(&PathAddress::parse("tags")?)?;
	assert_eq!(ir::to_value(&tags), json!(["a", "b", "c"]));

	Ok(())
}

#[test]
fn engine_recovers_per_document_failures() -> AnyEmptyResult {
	let mut engine = ProcessingEngine::new(PathAddress::parse("posts")?);
	engine.set_directives(vec![directive(
		DirectiveKind::JmesPathFilter,
		"posts[].tags",
		json!("[]"),
	)]);

	let documents = (1..=5)
		.map(|index| {
			let data = if index == 3 {
				json!({ "tags": "oops" })
			} else {
				json!({ "tags": [index] })
			};
			(format!("doc{index}.md"), data)
		})
		.collect();
	engine.initialize(documents)?;
	engine.run_individual();
	engine.run_aggregate()?;

	let processed = engine
		.documents()
		.iter()
		.filter(|doc| matches!(doc.state(), DocumentState::Processed(_)))
		.count();
	let failed: Vec<&ProcessedDocument> = engine
		.documents()
		.iter()
		.filter(|doc| doc.failure().is_some())
		.collect();

	assert_eq!(processed, 4);
	assert_eq!(failed.len(), 1);
	assert_eq!(failed[0].id, "doc3.md");

	// The other four documents are present and correct.
	let posts = engine.get(&PathAddress::parse("posts")?)?;
	assert_eq!(
		ir::to_value(&posts),
		json!([
			{ "tags": [1] },
			{ "tags": [2] },
			{ "tags": [4] },
			{ "tags": [5] }
		])
	);

	Ok(())
}

#[test]
fn engine_invalid_directive_value_fails_documents() -> AnyEmptyResult {
	let mut engine = ProcessingEngine::new(PathAddress::parse("posts")?);
	engine.set_directives(vec![directive(
		DirectiveKind::FlattenArrays,
		"posts[].tags",
		json!("yes"),
	)]);
	engine.initialize(vec![("a.md".to_string(), json!({ "tags": [1] }))])?;
	engine.run_individual();

	let failure = engine.documents()[0].failure().expect("expected failure");
	assert!(matches!(failure, ProcessingError::InvalidDirective { .. }));

	Ok(())
}

#[test]
fn engine_invalid_aggregate_directive_fails_only_its_field() -> AnyEmptyResult {
	let mut engine = ProcessingEngine::new(PathAddress::parse("posts")?);
	engine.set_directives(vec![
		directive(DirectiveKind::DerivedFrom, "tags", json!(42)),
		directive(DirectiveKind::DerivedFrom, "titles", json!("posts[].title")),
	]);
	engine.initialize(vec![("a.md".to_string(), json!({ "title": "A" }))])?;
	engine.run_individual();
	let failures = engine.run_aggregate()?;

	assert_eq!(failures.len(), 1);
	assert_eq!(failures[0].kind, DirectiveKind::DerivedFrom);
	// The valid directive still applied, and no document failed.
	let titles = engine.get(&PathAddress::parse("titles")?)?;
	assert_eq!(ir::to_value(&titles), json!(["A"]));
	assert!(engine.documents().iter().all(|doc| doc.failure().is_none()));

	Ok(())
}

#[test]
fn engine_guards_state_transitions() -> AnyEmptyResult {
	let mut engine = ProcessingEngine::new(PathAddress::parse("posts")?);
	engine.initialize(vec![("a.md".to_string(), json!({}))])?;

	// The aggregate phase is a barrier: individual timing must finish
	// first.
	let result = engine.run_aggregate();
	assert!(matches!(
		result,
		Err(ProcessingError::InvalidStateTransition { .. })
	));

	// The accessor is only valid after the aggregate phase.
	let result = engine.get(&PathAddress::parse("posts")?);
	assert!(matches!(
		result,
		Err(ProcessingError::InvalidStateTransition { .. })
	));

	engine.run_individual();
	engine.run_aggregate()?;
	assert!(engine.get(&PathAddress::parse("posts")?).is_ok());

	Ok(())
}

#[test]
fn document_state_machine_guards_initialize() {
	let mut document = ProcessedDocument::new("a.md");
	assert!(document.initialize(json!({})).is_ok());
	// Already initialized; re-initialization is only allowed from
	// `Uninitialized` or `Failed`.
	assert!(matches!(
		document.initialize(json!({})),
		Err(ProcessingError::InvalidStateTransition { .. })
	));
}

// --- Template tests ---

#[test]
fn parse_template_token_stream() {
	let tokens = parse_template("# {{ title }}\n{@items}done");
	assert_eq!(
		tokens,
		vec![
			TemplateToken::Literal("# ".to_string()),
			TemplateToken::Variable(PathAddress::parse("title").unwrap()),
			TemplateToken::Literal("\n".to_string()),
			TemplateToken::ItemsMarker,
			TemplateToken::Literal("done".to_string()),
		]
	);
}

#[test]
fn parse_template_keeps_malformed_tags_literal() {
	let tokens = parse_template("open {{ never closes");
	assert_eq!(
		tokens,
		vec![
			TemplateToken::Literal("open ".to_string()),
			TemplateToken::Literal("{{ never closes".to_string()),
		]
	);

	let tokens = parse_template("{{ not a path! }}");
	assert_eq!(tokens.len(), 1);
	assert!(matches!(tokens[0], TemplateToken::Literal(_)));
}

#[test]
fn template_source_collects_variables() {
	let source = TemplateSource::new("{{ a }} {{ b.c }} {{ a }} {@items}");
	assert_eq!(source.variables, vec!["a".to_string(), "b.c".to_string()]);
	assert!(source.has_items_marker);
}

fn render_fixture_set(main: &str, items: Option<&str>) -> TemplateSet {
	TemplateSet {
		main: Some(TemplateSource::new(main)),
		items: items.map(TemplateSource::new),
		output_format: None,
	}
}

#[test]
fn template_items_scopes_shadow_and_widen() -> AnyEmptyResult {
	let root = IrBuilder::from_data(&json!({
		"title": "Registry",
		"commands": [
			{ "name": "alpha" },
			{ "name": "beta", "title": "Special" }
		]
	}));
	let set = render_fixture_set("# {{ title }}\n{@items}", Some("- {{ name }}: {{ title }}\n"));
	let rendered = render(
		&set,
		&root,
		&PathAddress::parse("commands")?,
		&RenderOptions::default(),
	)
	.expect("expected rendered output");

	// `alpha` has no title of its own, so resolution widens out to the
	// root; `beta` shadows it.
	assert_eq!(rendered, "# Registry\n- alpha: Registry\n- beta: Special\n");

	Ok(())
}

#[test]
fn template_unresolved_variables_render_sentinel() -> AnyEmptyResult {
	let root = IrBuilder::from_data(&json!({ "title": "x" }));
	let set = render_fixture_set("value: {{ missing.field }}!", None);
	let rendered = render(
		&set,
		&root,
		&PathAddress::parse("commands")?,
		&RenderOptions {
			sentinel: "n/a".to_string(),
		},
	)
	.expect("expected rendered output");
	assert_eq!(rendered, "value: n/a!");

	Ok(())
}

#[test]
fn template_non_scalars_render_as_json() -> AnyEmptyResult {
	let root = IrBuilder::from_data(&json!({ "tags": ["a", "b"] }));
	let set = render_fixture_set("{{ tags }}", None);
	let rendered = render(
		&set,
		&root,
		&PathAddress::parse("commands")?,
		&RenderOptions::default(),
	)
	.expect("expected rendered output");
	assert_eq!(rendered, r#"["a","b"]"#);

	Ok(())
}

#[test]
fn load_templates_reads_content_and_format() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("main.tmpl"), "# Registry\n{@items}")?;
	std::fs::write(tmp.path().join("items.tmpl"), "- {{ name }}\n")?;

	let directives = vec![
		directive(DirectiveKind::Template, "", json!("main.tmpl")),
		directive(DirectiveKind::TemplateItems, "", json!("items.tmpl")),
		directive(DirectiveKind::TemplateFormat, "", json!("yaml")),
	];
	let set = load_templates(&directives, tmp.path())?;

	let main = set.main.expect("missing main template");
	assert!(main.has_items_marker);
	let items = set.items.expect("missing items template");
	assert_eq!(items.variables, vec!["name".to_string()]);
	assert_eq!(set.output_format, Some(ArtifactFormat::Yaml));

	Ok(())
}

#[test]
fn load_templates_rejects_bad_values() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let result = load_templates(
		&[directive(DirectiveKind::TemplateFormat, "", json!("xml"))],
		tmp.path(),
	);
	assert!(matches!(result, Err(SchemaError::InvalidDirective { .. })));

	let result = load_templates(
		&[directive(DirectiveKind::Template, "", json!(7))],
		tmp.path(),
	);
	assert!(matches!(result, Err(SchemaError::InvalidDirective { .. })));

	Ok(())
}

// --- Frontmatter tests ---

#[test]
fn frontmatter_extracts_yaml_blocks() -> AnyEmptyResult {
	let text = "---\ntitle: A\ntags: [a, b]\n---\n\n# Body\n";
	let block = frontmatter::extract(text)?.expect("expected frontmatter");
	assert_eq!(block.format, FrontmatterFormat::Yaml);
	assert_eq!(block.raw, "title: A\ntags: [a, b]");

	let data = frontmatter::parse(&block.raw, block.format)?;
	assert_eq!(data, json!({ "title": "A", "tags": ["a", "b"] }));

	Ok(())
}

#[test]
fn frontmatter_extracts_toml_blocks() -> AnyEmptyResult {
	let text = "+++\ntitle = \"A\"\ncount = 3\n+++\nbody\n";
	let block = frontmatter::extract(text)?.expect("expected frontmatter");
	assert_eq!(block.format, FrontmatterFormat::Toml);

	let data = frontmatter::parse(&block.raw, block.format)?;
	// TOML integers stay integral.
	assert_eq!(data, json!({ "title": "A", "count": 3 }));

	Ok(())
}

#[rstest]
#[case::tagged_json("---json\n{ \"a\": 1 }\n---\nbody", FrontmatterFormat::Json)]
#[case::tagged_toml("---toml\na = 1\n---\nbody", FrontmatterFormat::Toml)]
#[case::tagged_yaml("---yaml\na: 1\n---\nbody", FrontmatterFormat::Yaml)]
fn frontmatter_honors_format_tags(
	#[case] text: &str,
	#[case] expected: FrontmatterFormat,
) -> AnyEmptyResult {
	let block = frontmatter::extract(text)?.expect("expected frontmatter");
	assert_eq!(block.format, expected);
	let data = frontmatter::parse(&block.raw, block.format)?;
	assert_eq!(data["a"], json!(1));

	Ok(())
}

#[test]
fn frontmatter_absent_returns_none() -> AnyEmptyResult {
	assert_eq!(frontmatter::extract("# Just a doc\n")?, None);
	assert_eq!(frontmatter::extract("")?, None);

	Ok(())
}

#[test]
fn frontmatter_unterminated_block_errors() {
	let result = frontmatter::extract("---\ntitle: A\nno closing\n");
	assert!(matches!(
		result,
		Err(FrontmatterError::Unterminated { .. })
	));
}

#[test]
fn frontmatter_parse_errors_carry_format() {
	let result = frontmatter::parse("{ not json", FrontmatterFormat::Json);
	let Err(FrontmatterError::Parse { format, .. }) = result else {
		panic!("expected parse error");
	};
	assert_eq!(format, "json");
}

// --- Aggregator tests ---

#[test]
fn aggregator_guards_lifecycle() -> AnyEmptyResult {
	let mut aggregator = Aggregator::new();
	assert!(matches!(
		aggregator.integrate("a.md", &json!({})),
		Err(ProcessingError::InvalidStateTransition { .. })
	));
	assert!(aggregator.serialize().is_err());

	aggregator.initialize(1, ArtifactFormat::Json)?;
	aggregator.integrate("a.md", &json!({ "name": "a" }))?;
	aggregator.finalize(json!({}), None)?;

	// Finalized: no further integration.
	assert!(matches!(
		aggregator.integrate("b.md", &json!({})),
		Err(ProcessingError::InvalidStateTransition { .. })
	));
	assert!(aggregator.serialize().is_ok());

	Ok(())
}

#[test]
fn aggregator_tracks_statistics() -> AnyEmptyResult {
	let mut aggregator = Aggregator::new();
	aggregator.initialize(4, ArtifactFormat::Json)?;
	aggregator.integrate("a.md", &json!({ "name": "a", "desc": null }))?;
	aggregator.integrate("b.md", &json!({ "name": "a", "desc": "text" }))?;
	aggregator.record_failure(FailureRecord {
		doc_id: "c.md".to_string(),
		directive: Some("x-jmespath-filter".to_string()),
		message: "boom".to_string(),
	})?;
	aggregator.record_skipped("d.md")?;

	let result = aggregator.finalize(json!({ "posts": [] }), None)?;
	assert_eq!(result.stats.total, 4);
	assert_eq!(result.stats.processed, 2);
	assert_eq!(result.stats.failed, 1);
	assert_eq!(result.stats.skipped, 1);
	assert_eq!(result.stats.unique_value_counts["name"], 1);
	assert_eq!(result.stats.unique_value_counts["desc"], 1);
	assert_eq!(result.stats.null_counts["desc"], 1);
	assert!((result.stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
	assert_eq!(result.stats.failures.len(), 1);
	assert_eq!(result.stats.failures[0].doc_id, "c.md");

	let artifact = aggregator.serialize()?;
	assert!(artifact.contains("\"processed\": 2"));

	Ok(())
}

#[test]
fn artifact_format_names() {
	assert_eq!(ArtifactFormat::from_name("json").unwrap(), ArtifactFormat::Json);
	assert_eq!(ArtifactFormat::from_name("YAML").unwrap(), ArtifactFormat::Yaml);
	assert_eq!(ArtifactFormat::from_name("yml").unwrap(), ArtifactFormat::Yaml);
	assert!(matches!(
		ArtifactFormat::from_name("xml"),
		Err(SerializationError::UnsupportedFormat(_))
	));
}

#[test]
fn serialize_result_emits_yaml() -> AnyEmptyResult {
	let mut aggregator = Aggregator::new();
	aggregator.initialize(1, ArtifactFormat::Yaml)?;
	aggregator.integrate("a.md", &json!({ "name": "a" }))?;
	let result = aggregator.finalize(json!({ "names": ["a"] }), None)?;

	let yaml = serialize_result(&result, ArtifactFormat::Yaml)?;
	assert!(yaml.contains("processed: 1"));
	assert!(yaml.contains("names:"));

	Ok(())
}

// --- Config tests ---

#[test]
fn config_loads_from_discovery_candidates() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(
		tmp.path().join("fmx.toml"),
		"schema = \"docs/registry.schema.yaml\"\n\n[input]\npatterns = [\"docs/**/*.md\"]\n",
	)?;

	let config = FmxConfig::load(tmp.path())?.expect("expected config");
	assert_eq!(
		config.schema.as_deref(),
		Some(std::path::Path::new("docs/registry.schema.yaml"))
	);
	assert_eq!(config.input.patterns, vec!["docs/**/*.md".to_string()]);
	assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);

	Ok(())
}

#[test]
fn config_missing_returns_none() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	assert!(FmxConfig::load(tmp.path())?.is_none());

	Ok(())
}

#[test]
fn config_parse_errors_are_typed() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("fmx.toml"), "not [ valid toml")?;
	let result = FmxConfig::load(tmp.path());
	assert!(matches!(result, Err(FmxError::ConfigParse(_))));

	Ok(())
}

// --- Pipeline tests ---

const REGISTRY_SCHEMA_YAML: &str = r#"type: object
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

fn pipeline_options(root: &std::path::Path) -> RunOptions {
	RunOptions {
		root: root.to_path_buf(),
		schema_path: root.join("registry.schema.yaml"),
		include_patterns: vec!["**/*.md".to_string()],
		exclude_patterns: Vec::new(),
		max_file_size: DEFAULT_MAX_FILE_SIZE,
		disable_gitignore: true,
		sentinel: String::new(),
		format: None,
	}
}

#[test]
fn pipeline_builds_a_registry_end_to_end() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("registry.schema.yaml"), REGISTRY_SCHEMA_YAML)?;
	std::fs::write(
		tmp.path().join("a.md"),
		"---\ntitle: A\ntags: [a, b]\n---\n\n# A\n",
	)?;
	std::fs::write(
		tmp.path().join("b.md"),
		"---\ntitle: B\ntags: [b, c]\n---\n\n# B\n",
	)?;

	let outcome = run(&pipeline_options(tmp.path()))?;

	// Cross-document union in first-seen order.
	assert_eq!(outcome.result.data["tags"], json!(["a", "b", "c"]));
	assert_eq!(
		outcome.result.data["posts"],
		json!([
			{ "title": "A", "tags": ["a", "b"] },
			{ "title": "B", "tags": ["b", "c"] }
		])
	);
	assert_eq!(outcome.result.stats.total, 2);
	assert_eq!(outcome.result.stats.processed, 2);
	assert_eq!(outcome.result.stats.failed, 0);
	assert_eq!(outcome.format, ArtifactFormat::Json);
	assert!(outcome.artifact.contains("\"tags\""));

	Ok(())
}

#[test]
fn pipeline_recovers_bad_documents_and_skips_plain_ones() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("registry.schema.yaml"), REGISTRY_SCHEMA_YAML)?;
	std::fs::write(
		tmp.path().join("a.md"),
		"---\ntitle: A\ntags: [a]\n---\nbody\n",
	)?;
	// Malformed YAML frontmatter.
	std::fs::write(tmp.path().join("b.md"), "---\ntitle: [\n---\nbody\n")?;
	// No frontmatter at all.
	std::fs::write(tmp.path().join("c.md"), "# Plain document\n")?;

	let outcome = run(&pipeline_options(tmp.path()))?;
	assert_eq!(outcome.result.stats.total, 3);
	assert_eq!(outcome.result.stats.processed, 1);
	assert_eq!(outcome.result.stats.failed, 1);
	assert_eq!(outcome.result.stats.skipped, 1);
	assert_eq!(outcome.result.stats.failures[0].doc_id, "b.md");
	assert_eq!(outcome.result.data["tags"], json!(["a"]));

	Ok(())
}

#[test]
fn pipeline_renders_declared_templates() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let schema = format!(
		"{REGISTRY_SCHEMA_YAML}x-template: \"main.tmpl\"\nx-template-items: \"items.tmpl\"\nx-template-format: \"yaml\"\n"
	);
	std::fs::write(tmp.path().join("registry.schema.yaml"), schema)?;
	std::fs::write(tmp.path().join("main.tmpl"), "# Posts\n{@items}")?;
	std::fs::write(tmp.path().join("items.tmpl"), "- {{ title }}\n")?;
	std::fs::write(
		tmp.path().join("a.md"),
		"---\ntitle: A\ntags: [a]\n---\nbody\n",
	)?;

	let outcome = run(&pipeline_options(tmp.path()))?;
	assert_eq!(outcome.rendered.as_deref(), Some("# Posts\n- A\n"));
	assert_eq!(outcome.format, ArtifactFormat::Yaml);
	assert!(outcome.artifact.contains("rendered:"));

	Ok(())
}

#[test]
fn pipeline_missing_schema_is_fatal() {
	let tmp = tempfile::tempdir().unwrap();
	let result = run(&pipeline_options(tmp.path()));
	assert!(result.is_err());
}

#[test]
fn run_options_respect_config_values() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(
		tmp.path().join("fmx.toml"),
		"schema = \"schema.yaml\"\nformat = \"yaml\"\n\n[render]\nsentinel = \"-\"\n",
	)?;
	let config = FmxConfig::load(tmp.path())?;
	let options = RunOptions::from_config(tmp.path(), config.as_ref())?;

	assert_eq!(options.schema_path, tmp.path().join("schema.yaml"));
	assert_eq!(options.format, Some(ArtifactFormat::Yaml));
	assert_eq!(options.sentinel, "-");

	Ok(())
}
