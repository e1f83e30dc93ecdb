//! `fmx_core` is the core library for the fmx registry builder. It extracts
//! frontmatter metadata blocks from many text documents, reshapes the data
//! according to a declarative schema carrying `x-` processing directives,
//! renders externally supplied templates, and aggregates everything into one
//! consolidated artifact with run statistics.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Source documents
//!   → Frontmatter extraction (delimiter scan + YAML/TOML/JSON parsing)
//!   → Schema (loaded once, `$ref`s resolved, directives classified)
//!   → IR built per document (immutable, path-addressable tree)
//!   → Individual-timing directives (flatten-arrays, jmespath-filter)
//!   → Aggregate-timing directives (derived-from, derived-unique)
//!   → Template rendering against the final IR
//!   → Aggregator (statistics + JSON/YAML artifact)
//! ```
//!
//! ## Modules
//!
//! - [`config`] — Configuration loading from `fmx.toml`: schema location,
//!   input/exclude patterns, output format, render sentinel.
//! - [`frontmatter`] — Delimiter scanning and the parser adapters.
//! - [`ir`] — The immutable intermediate representation and its
//!   path-addressable operations.
//!
//! ## Key Types
//!
//! - [`PathAddress`] — A dotted/bracketed property path such as
//!   `commands[].name`.
//! - [`Directive`] — A schema-attached instruction (kind + owning path +
//!   value) controlling extraction, templating, or transformation.
//! - [`ProcessingEngine`] — Applies processing directives in two ordered
//!   phases and exposes results through a path-keyed accessor.
//! - [`TemplateScope`] — The IR cursor plus ancestor breadcrumbs used for
//!   contextual variable resolution.
//! - [`Aggregator`] — Folds per-document results into a [`FinalResult`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use fmx_core::FmxConfig;
//! use fmx_core::RunOptions;
//! use fmx_core::run;
//!
//! let root = Path::new(".");
//! let config = FmxConfig::load(root).unwrap();
//! let options = RunOptions::from_config(root, config.as_ref()).unwrap();
//! let outcome = run(&options).unwrap();
//! println!("{}", outcome.artifact);
//! ```

pub use aggregate::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use path::*;
pub use pipeline::*;
pub use query::*;
pub use schema::*;
pub use template::*;

mod aggregate;
pub mod config;
mod engine;
mod error;
pub mod frontmatter;
pub mod ir;
mod path;
mod pipeline;
mod query;
mod schema;
mod template;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
