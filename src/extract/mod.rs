//! Entity extraction (spec.md §4.3), grounded in the teacher's extractor
//! architecture: `extractors/base.rs` for the general entity-model shape,
//! `extractors/python.rs` for indentation-aware tree-sitter traversal. Only
//! the Python-shaped extractor survives the transformation — the spec's
//! non-goal "cross-language support" drops the other language extractors
//! the teacher ships.

pub mod python;

pub use python::extract;
