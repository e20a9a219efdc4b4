//! Bounded cache of compiled URL-filter patterns
//!
//! The first [`MAX_PREBUILT_PATTERNS`] distinct `(pattern, match_case)` pairs
//! are compiled once and kept. Anything requested after the cache is full is
//! compiled for the call and dropped, so overflow costs time, never
//! correctness.
//!
//! Patterns compile with the linear-time `regex` engine first. Patterns it
//! rejects (lookaround, backreferences) are retried with `fancy-regex`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Default number of patterns kept compiled per cache.
pub const MAX_PREBUILT_PATTERNS: usize = 1000;

/// A compiled filter pattern.
#[derive(Debug)]
pub enum CompiledPattern {
    /// Empty pattern; matches every URL.
    MatchAll,
    Standard(regex::Regex),
    Backtracking(fancy_regex::Regex),
    /// Rejected by both engines; never matches.
    Invalid,
}

impl CompiledPattern {
    pub fn compile(source: &str, match_case: bool) -> Self {
        if source.is_empty() {
            return Self::MatchAll;
        }

        match regex::RegexBuilder::new(source)
            .case_insensitive(!match_case)
            .build()
        {
            Ok(re) => return Self::Standard(re),
            Err(regex::Error::CompiledTooBig(limit)) => {
                log::debug!("pattern exceeds {limit} bytes compiled: {source:.64}");
                return Self::Invalid;
            }
            Err(_) => {}
        }

        let flagged;
        let fancy_source = if match_case {
            source
        } else {
            flagged = format!("(?i){source}");
            &flagged
        };
        match fancy_regex::Regex::new(fancy_source) {
            Ok(re) => {
                log::debug!("pattern needs backtracking engine: {source:.64}");
                Self::Backtracking(re)
            }
            Err(e) => {
                log::debug!("pattern rejected ({e}): {source:.64}");
                Self::Invalid
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        // Hitting the backtrack limit counts as no match.
        self.try_match(haystack).unwrap_or(false)
    }

    /// Like [`is_match`](Self::is_match), but `None` when the backtracking
    /// engine gives up instead of answering.
    pub fn try_match(&self, haystack: &str) -> Option<bool> {
        match self {
            Self::MatchAll => Some(true),
            Self::Standard(re) => Some(re.is_match(haystack)),
            Self::Backtracking(re) => match re.is_match(haystack) {
                Ok(hit) => Some(hit),
                Err(e) => {
                    log::debug!("pattern gave up ({e}): {:.64}", re.as_str());
                    None
                }
            },
            Self::Invalid => Some(false),
        }
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MatchAll => write!(f, ".*"),
            Self::Standard(re) => write!(f, "{}", re.as_str()),
            Self::Backtracking(re) => write!(f, "{}", re.as_str()),
            Self::Invalid => write!(f, "ERROR"),
        }
    }
}

/// Whether either engine accepts `source`.
pub fn is_valid_pattern(source: &str) -> bool {
    CompiledPattern::compile(source, true).is_valid()
}

/// Whether `source` refers back to a capture group (`\1`..`\9`, `\k<name>`,
/// `(?P=name)`). Such patterns change meaning once their groups are
/// renumbered inside an alternation.
pub fn has_backreference(source: &str) -> bool {
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                if matches!(bytes.get(i + 1), Some(b'1'..=b'9' | b'k')) {
                    return true;
                }
                i += 2;
            }
            b'(' if bytes[i..].starts_with(b"(?P=") => return true,
            _ => i += 1,
        }
    }
    false
}

/// Bounded map from pattern source to compiled pattern, one map per case
/// mode so lookups borrow the source.
struct PatternStore {
    capacity: usize,
    maps: RwLock<[HashMap<String, Arc<CompiledPattern>>; 2]>,
}

impl PatternStore {
    fn new(capacity: usize) -> Self {
        let initial = capacity.min(MAX_PREBUILT_PATTERNS);
        Self {
            capacity,
            maps: RwLock::new([HashMap::with_capacity(initial), HashMap::with_capacity(initial)]),
        }
    }

    fn len(&self) -> usize {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps[0].len() + maps[1].len()
    }

    fn get(&self, source: &str, match_case: bool) -> Arc<CompiledPattern> {
        let slot = usize::from(match_case);
        {
            let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = maps[slot].get(source) {
                return Arc::clone(hit);
            }
            if maps[0].len() + maps[1].len() >= self.capacity {
                return Arc::new(CompiledPattern::compile(source, match_case));
            }
        }

        // Compile outside the lock so other readers are not held up.
        let compiled = Arc::new(CompiledPattern::compile(source, match_case));
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        if maps[0].len() + maps[1].len() >= self.capacity {
            return compiled;
        }
        Arc::clone(maps[slot].entry(source.to_owned()).or_insert(compiled))
    }
}

/// Fixed-capacity, append-only pattern cache shared by every query on a
/// subscription.
///
/// Filter patterns and the per-query alternations built from them are kept
/// apart, each bounded by `capacity`, so alternations never evict room meant
/// for filter patterns.
pub struct RegexCache {
    patterns: PatternStore,
    alternations: PatternStore,
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new(MAX_PREBUILT_PATTERNS)
    }
}

impl fmt::Debug for RegexCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexCache")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("alternations", &self.alternation_len())
            .finish()
    }
}

impl RegexCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            patterns: PatternStore::new(capacity),
            alternations: PatternStore::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.patterns.capacity
    }

    /// Number of cached filter patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cached alternations.
    pub fn alternation_len(&self) -> usize {
        self.alternations.len()
    }

    /// Fetch `source` from the cache, compiling it if needed. The result is
    /// only retained while the cache has room.
    pub fn get(&self, source: &str, match_case: bool) -> Arc<CompiledPattern> {
        self.patterns.get(source, match_case)
    }

    /// Same as [`get`](Self::get) for an alternation of several filter
    /// patterns.
    pub fn get_alternation(&self, source: &str, match_case: bool) -> Arc<CompiledPattern> {
        self.alternations.get(source, match_case)
    }

    pub fn is_match(&self, source: &str, match_case: bool, haystack: &str) -> bool {
        self.get(source, match_case).is_match(haystack)
    }

    #[cfg(test)]
    pub(crate) fn insert_alternation(&self, source: &str, match_case: bool, pattern: CompiledPattern) {
        let mut maps = self.alternations.maps.write().unwrap_or_else(PoisonError::into_inner);
        maps[usize::from(match_case)].insert(source.to_owned(), Arc::new(pattern));
    }

    /// Compile patterns ahead of the first query, up to capacity.
    pub fn prebuild<'a, I>(&self, patterns: I)
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        for (source, match_case) in patterns {
            if source.is_empty() {
                continue;
            }
            if self.len() >= self.capacity() {
                break;
            }
            self.get(source, match_case);
        }
    }
}
