//! Keyword extraction for the URL filter index.
//!
//! URL filters are bucketed under one keyword taken from their pattern, and a
//! request URL is tokenized the same way at query time, so only buckets whose
//! keyword occurs in the URL are ever scanned.

/// Tokens too common to be useful as index keys.
const STOPLIST: &[&str] = &["http", "https", "com", "js"];

#[inline]
fn is_keyword_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'%'
}

#[inline]
fn is_stopword(token: &str) -> bool {
    STOPLIST.iter().any(|s| s.eq_ignore_ascii_case(token))
}

// =============================================================================
// URL Keywords
// =============================================================================

/// Lazy left-to-right keyword iterator over a URL.
///
/// Expects the URL to be lowercased already; tokens are slices of the input.
/// Cloning the extractor (or calling [`reset`](Self::reset)) restarts it.
#[derive(Debug, Clone)]
pub struct UrlKeywordExtractor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> UrlKeywordExtractor<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Rewind to the first keyword.
    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

impl<'a> Iterator for UrlKeywordExtractor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() {
            let start = match bytes[self.pos..].iter().position(|&b| is_keyword_byte(b)) {
                Some(offset) => self.pos + offset,
                None => {
                    self.pos = bytes.len();
                    return None;
                }
            };
            let end = bytes[start..]
                .iter()
                .position(|&b| !is_keyword_byte(b))
                .map_or(bytes.len(), |offset| start + offset);
            self.pos = end;

            let token = &self.input[start..end];
            if token.len() > 1 && !is_stopword(token) {
                return Some(token);
            }
        }
        None
    }
}

// =============================================================================
// Filter Keywords
// =============================================================================

/// Keyword candidates of a filter pattern.
///
/// A candidate must be delimited on both sides by a separator that is
/// neither a keyword character nor `*`; the very start and end of the pattern
/// do not count, since the pattern may continue inside a longer URL token.
/// Candidates are lowercased to line up with [`UrlKeywordExtractor`].
#[derive(Debug, Clone)]
pub struct FilterKeywordExtractor<'a> {
    pattern: &'a str,
    pos: usize,
}

impl<'a> FilterKeywordExtractor<'a> {
    pub fn new(pattern: &'a str) -> Self {
        Self { pattern, pos: 0 }
    }
}

impl Iterator for FilterKeywordExtractor<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.pattern.as_bytes();
        while self.pos < bytes.len() {
            let start = match bytes[self.pos..].iter().position(|&b| is_keyword_byte(b)) {
                Some(offset) => self.pos + offset,
                None => {
                    self.pos = bytes.len();
                    return None;
                }
            };
            let end = bytes[start..]
                .iter()
                .position(|&b| !is_keyword_byte(b))
                .map_or(bytes.len(), |offset| start + offset);
            self.pos = end;

            if start == 0 || end == bytes.len() {
                continue;
            }
            if bytes[start - 1] == b'*' || bytes[end] == b'*' {
                continue;
            }

            let token = &self.pattern[start..end];
            if token.len() > 1 && !is_stopword(token) {
                return Some(token.to_ascii_lowercase());
            }
        }
        None
    }
}

/// The index bucket a URL filter pattern belongs to: its first keyword
/// candidate, or the empty string when it has none.
pub fn filter_keyword(pattern: &str) -> String {
    FilterKeywordExtractor::new(pattern).next().unwrap_or_default()
}
