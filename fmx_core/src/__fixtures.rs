use serde_json::Value;
use serde_json::json;

use crate::Directive;
use crate::DirectiveKind;
use crate::PathAddress;

pub fn directive(kind: DirectiveKind, path: &str, value: Value) -> Directive {
	Directive {
		kind,
		path: PathAddress::parse(path).unwrap(),
		value,
	}
}

/// A registry schema covering every directive intent: extraction hints on
/// the `posts[]` items, processing directives per item and across the set.
pub fn registry_schema() -> Value {
	json!({
		"type": "object",
		"properties": {
			"posts": {
				"type": "array",
				"items": {
					"type": "object",
					"properties": {
						"title": { "type": "string", "x-frontmatter-part": true },
						"tags": {
							"type": "array",
							"x-frontmatter-part": true,
							"x-flatten-arrays": true
						}
					}
				}
			},
			"tags": {
				"type": "array",
				"x-derived-from": "posts[].tags[]",
				"x-derived-unique": true
			}
		}
	})
}

pub fn commands_data() -> Value {
	json!({
		"commands": [
			{ "c1": "a" },
			{ "c1": "b" }
		]
	})
}

/// Documents for engine-level tests: `posts[].tags` starts nested so the
/// individual flatten phase observably changes what the aggregate phase
/// sees.
pub fn nested_tag_documents() -> Vec<(String, Value)> {
	vec![
		(
			"a.md".to_string(),
			json!({ "title": "A", "tags": [["a"], ["b"]] }),
		),
		(
			"b.md".to_string(),
			json!({ "title": "B", "tags": [["b", "c"]] }),
		),
	]
}
