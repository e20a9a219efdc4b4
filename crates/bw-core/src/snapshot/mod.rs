//! FLX Compiled Index Format and Loader
//!
//! This module provides the binary format definitions and zero-copy loader
//! for compiled filter lists. The builder lives in `bw-compiler`.

mod format;
mod loader;

pub use format::*;
pub use loader::*;
