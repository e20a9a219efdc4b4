//! Blockwise Core Library
//!
//! This crate provides the matching engine for Blockwise filter
//! subscriptions. Filter lists are compiled ahead of time (see `bw-compiler`)
//! into an immutable binary index; this crate validates that index and
//! answers blocking, allowing and element-hiding queries against it.
//!
//! # Architecture
//!
//! A compiled index (FLX format) holds every filter of one subscription in
//! flat record tables plus one hash table per sub-index, keyed by URL
//! keyword or domain. The loader hands out zero-copy views into the buffer;
//! the only state mutated at query time is the per-subscription regex cache.
//!
//! # Modules
//!
//! - `hash`: Murmur3 key hashing and CRC32 for the index checksum
//! - `keyword`: URL and filter keyword extraction
//! - `domain`: Domain matching, third-party detection and the domain splitter
//! - `url`: Allocation-free scheme and host extraction
//! - `regex_cache`: Bounded cache of compiled filter patterns
//! - `snapshot`: FLX format constants and the zero-copy loader
//! - `matcher`: Per-subscription query engine
//! - `subscription`: Shared compiled index handle and installed subscriptions
//! - `collection`: Aggregated decisions across ordered subscriptions
//! - `types`: Shared type definitions

pub mod collection;
pub mod domain;
pub mod hash;
pub mod keyword;
pub mod matcher;
pub mod regex_cache;
pub mod snapshot;
pub mod subscription;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use collection::SubscriptionCollection;
pub use domain::{domain_matches, is_third_party, registrable_domain, DomainSplitter};
pub use keyword::UrlKeywordExtractor;
pub use matcher::{FindStrategy, Matcher};
pub use regex_cache::{RegexCache, MAX_PREBUILT_PATTERNS};
pub use snapshot::{Snapshot, SnapshotError};
pub use subscription::{CompiledIndex, IndexBuffer, InstalledSubscription, ReleaseHook};
pub use types::{
    ContentFiltersData, ContentType, FilterCategory, HeaderFilter, InstallationState, MatchDecision, MatchResult,
    RewriteResource, SnippetCall, SpecialFilterType, ThirdParty,
};
