//! Blockwise Filter List Compiler
//!
//! This crate compiles Adblock Plus filter lists into the FLX compiled index
//! format read by `bw-core`.
//!
//! Pipeline: [`converter::compile`] reads the header and metadata comments,
//! hands every remaining line to [`parser::parse_line`] and feeds the
//! resulting records to [`builder::IndexBuilder`].

pub mod builder;
pub mod converter;
pub mod metadata;
pub mod parser;
pub mod pattern;
pub mod snippet;

#[cfg(test)]
mod scenarios;

pub use builder::{build_index, BuildStats, IndexBuilder};
pub use converter::{compile, compile_reader, CompileConfig, CompileError, ConverterResult};
pub use metadata::Metadata;
pub use parser::{parse_line, Category, ContentFilter, ContentFilterKind, FilterRecord, SnippetFilter, UrlFilter};
