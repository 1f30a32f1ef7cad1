//! The prompt template mini-language.
//!
//! Text with `{{ expression }}` output tags, `{% if %}` / `{% for %}` blocks,
//! `{# comments #}` and `{% raw %}` sections. The only callable functions are
//! `reference(file)`, `include(file)` and `template(file, key=literal, ...)`;
//! there is no other access to the host.

mod engine;
mod lexer;
mod parser;
mod value;

pub use engine::{DEFAULT_REFERENCE_MARKER, TemplateEngine};
