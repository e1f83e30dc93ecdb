//! Template parsing and variable resolution.
//!
//! Templates are plain text with `{{ path }}` variables and an optional
//! `{@items}` marker. A template containing the marker splits into a
//! wrapper and an items-template rendered once per element of the document
//! collection, spliced back at the marker's position.
//!
//! Variables resolve local-first with widening fallback: the current scope
//! cursor is tried before each ancestor out to the root, so `{@items}`
//! contexts shadow same-named outer variables while code outside an
//! iteration still reaches root variables by the same name. A variable with
//! no match at any scope renders as the configured sentinel — templates may
//! reference optional fields by design.

use std::path::Path;
use std::rc::Rc;

use crate::ArtifactFormat;
use crate::Directive;
use crate::DirectiveKind;
use crate::PathAddress;
use crate::SchemaError;
use crate::ir;
use crate::ir::IrNode;

/// The items marker literal.
pub const ITEMS_MARKER: &str = "{@items}";

/// One token of a parsed template.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TemplateToken {
	Literal(String),
	Variable(PathAddress),
	ItemsMarker,
}

/// Parse a template into its token stream. Parsing is total: malformed
/// variable tags stay literal text.
pub fn parse_template(content: &str) -> Vec<TemplateToken> {
	let mut tokens = Vec::new();
	let mut rest = content;

	while !rest.is_empty() {
		let variable_at = rest.find("{{");
		let marker_at = rest.find(ITEMS_MARKER);

		let (split_at, is_marker) = match (variable_at, marker_at) {
			(None, None) => {
				tokens.push(TemplateToken::Literal(rest.to_string()));
				break;
			}
			(Some(v), Some(m)) if m < v => (m, true),
			(None, Some(m)) => (m, true),
			(Some(v), _) => (v, false),
		};

		if split_at > 0 {
			tokens.push(TemplateToken::Literal(rest[..split_at].to_string()));
		}

		if is_marker {
			tokens.push(TemplateToken::ItemsMarker);
			rest = &rest[split_at + ITEMS_MARKER.len()..];
			continue;
		}

		let after_open = &rest[split_at + 2..];
		let Some(close_at) = after_open.find("}}") else {
			// No closing braces; the remainder is literal text.
			tokens.push(TemplateToken::Literal(rest[split_at..].to_string()));
			break;
		};
		let inner = after_open[..close_at].trim();
		match PathAddress::parse(inner) {
			Ok(path) if !path.is_root() => tokens.push(TemplateToken::Variable(path)),
			_ => {
				// Not a path; keep the raw tag as literal text.
				tokens.push(TemplateToken::Literal(
					rest[split_at..split_at + 2 + close_at + 2].to_string(),
				));
			}
		}
		rest = &after_open[close_at + 2..];
	}

	tokens
}

/// A loaded template: content plus its declared variables and whether it
/// contains the items marker. Raw file paths never leave the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSource {
	pub content: String,
	/// Canonical form of every variable referenced, deduplicated, in
	/// order of first appearance.
	pub variables: Vec<String>,
	pub has_items_marker: bool,
}

impl TemplateSource {
	pub fn new(content: impl Into<String>) -> Self {
		let content = content.into();
		let tokens = parse_template(&content);
		let mut variables = Vec::new();
		let mut has_items_marker = false;
		for token in &tokens {
			match token {
				TemplateToken::Variable(path) => {
					let name = path.to_string();
					if !variables.contains(&name) {
						variables.push(name);
					}
				}
				TemplateToken::ItemsMarker => has_items_marker = true,
				TemplateToken::Literal(_) => {}
			}
		}
		Self {
			content,
			variables,
			has_items_marker,
		}
	}
}

/// The templates declared by a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSet {
	pub main: Option<TemplateSource>,
	pub items: Option<TemplateSource>,
	pub output_format: Option<ArtifactFormat>,
}

/// Load the templates declared by template-intent directives. `x-template`
/// and `x-template-items` values are file paths relative to the schema
/// directory. Load failures are fatal — templates are shared
/// configuration.
pub fn load_templates(
	directives: &[Directive],
	base_dir: &Path,
) -> Result<TemplateSet, SchemaError> {
	let mut set = TemplateSet::default();

	for directive in directives {
		let invalid = |reason: String| SchemaError::InvalidDirective {
			key: directive.kind.to_string(),
			reason,
		};

		match directive.kind {
			DirectiveKind::Template | DirectiveKind::TemplateItems => {
				let serde_json::Value::String(relative) = &directive.value else {
					return Err(invalid(format!(
						"expected a template path string, got `{}`",
						directive.value
					)));
				};
				let path = base_dir.join(relative);
				let content = std::fs::read_to_string(&path).map_err(|e| {
					invalid(format!("cannot read template `{}`: {e}", path.display()))
				})?;
				let source = TemplateSource::new(content);
				if directive.kind == DirectiveKind::Template {
					set.main = Some(source);
				} else {
					set.items = Some(source);
				}
			}
			DirectiveKind::TemplateFormat => {
				let serde_json::Value::String(name) = &directive.value else {
					return Err(invalid(format!(
						"expected a format name string, got `{}`",
						directive.value
					)));
				};
				let format = ArtifactFormat::from_name(name)
					.map_err(|e| invalid(e.to_string()))?;
				set.output_format = Some(format);
			}
			_ => {
				tracing::warn!(kind = %directive.kind, "discarding non-template directive");
			}
		}
	}

	Ok(set)
}

/// The resolution context for one render: the current IR cursor plus its
/// ancestor breadcrumbs. Ephemeral — a fresh scope is created per render
/// call and per array-element descent.
#[derive(Debug, Clone)]
pub struct TemplateScope {
	cursor: Rc<IrNode>,
	breadcrumbs: Vec<Rc<IrNode>>,
}

impl TemplateScope {
	pub fn root(root: Rc<IrNode>) -> Self {
		Self {
			cursor: root,
			breadcrumbs: Vec::new(),
		}
	}

	/// Descend into a child node, recording the current cursor as an
	/// ancestor.
	pub fn child(&self, node: Rc<IrNode>) -> Self {
		let mut breadcrumbs = self.breadcrumbs.clone();
		breadcrumbs.push(Rc::clone(&self.cursor));
		Self {
			cursor: node,
			breadcrumbs,
		}
	}

	/// Local-first resolution with widening fallback: try the cursor,
	/// then each ancestor out to the root.
	pub fn resolve_relative(&self, path: &PathAddress) -> Option<Rc<IrNode>> {
		if let Ok(node) = ir::resolve(&self.cursor, path) {
			return Some(node);
		}
		for ancestor in self.breadcrumbs.iter().rev() {
			if let Ok(node) = ir::resolve(ancestor, path) {
				return Some(node);
			}
		}
		None
	}
}

/// Render configuration.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
	/// Replacement text for variables unresolved at every scope.
	pub sentinel: String,
}

/// Render the template set against a final IR. Returns `None` when no main
/// template is declared.
pub fn render(
	set: &TemplateSet,
	root: &Rc<IrNode>,
	collection: &PathAddress,
	options: &RenderOptions,
) -> Option<String> {
	let main = set.main.as_ref()?;
	let scope = TemplateScope::root(Rc::clone(root));
	let mut rendered = String::new();

	for token in parse_template(&main.content) {
		match token {
			TemplateToken::Literal(text) => rendered.push_str(&text),
			TemplateToken::Variable(path) => {
				rendered.push_str(&render_variable(&scope, &path, options));
			}
			TemplateToken::ItemsMarker => {
				rendered.push_str(&render_items(set, root, collection, &scope, options));
			}
		}
	}

	Some(rendered)
}

/// Render the items-template once per element of the collection array,
/// each inside its own child scope.
fn render_items(
	set: &TemplateSet,
	root: &Rc<IrNode>,
	collection: &PathAddress,
	parent: &TemplateScope,
	options: &RenderOptions,
) -> String {
	let Some(items_template) = set.items.as_ref() else {
		tracing::warn!("template has an items marker but no items template is declared");
		return String::new();
	};
	let Ok(array) = ir::resolve(root, collection) else {
		return String::new();
	};
	let IrNode::Array { items, .. } = array.as_ref() else {
		return String::new();
	};

	let tokens = parse_template(&items_template.content);
	let mut rendered = String::new();
	for item in items {
		let scope = parent.child(Rc::clone(item));
		for token in &tokens {
			match token {
				TemplateToken::Literal(text) => rendered.push_str(text),
				TemplateToken::Variable(path) => {
					rendered.push_str(&render_variable(&scope, path, options));
				}
				// Nested iteration is not supported; the marker renders
				// as nothing inside an items template.
				TemplateToken::ItemsMarker => {
					tracing::debug!("ignoring nested items marker");
				}
			}
		}
	}
	rendered
}

fn render_variable(
	scope: &TemplateScope,
	path: &PathAddress,
	options: &RenderOptions,
) -> String {
	match scope.resolve_relative(path) {
		None => options.sentinel.clone(),
		Some(node) => {
			match node.as_ref() {
				IrNode::Scalar { value, .. } => scalar_string(value),
				other => {
					// Non-scalar resolutions render as canonical JSON,
					// explicitly.
					serde_json::to_string(&ir::to_value(other)).unwrap_or_default()
				}
			}
		}
	}
}

fn scalar_string(value: &serde_json::Value) -> String {
	match value {
		serde_json::Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}
