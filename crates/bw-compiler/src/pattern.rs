//! Translation of filter patterns into regex sources.
//!
//! The matcher only ever sees regex text, so every wildcard, anchor and
//! separator of the filter syntax is resolved here, once, at build time.

/// Replacement for a leading `||`: any scheme, then any number of
/// subdomain labels.
pub const HOST_ANCHOR_REGEX: &str = r"^[\w\-]+:/+(?:[^/]+\.)?";

/// Replacement for `^`: one character that cannot appear in a URL token, or
/// the end of the URL.
pub const SEPARATOR_REGEX: &str = r"(?:[\x00-\x24\x26-\x2C\x2F\x3A-\x40\x5B-\x5E\x60\x7B-\x7F]|$)";

/// Whether `pattern` is a `/regex/` filter.
pub fn is_regex_filter(pattern: &str) -> bool {
    pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/')
}

fn collapse_wildcards(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut prev_star = false;
    for c in pattern.chars() {
        if c == '*' && prev_star {
            continue;
        }
        prev_star = c == '*';
        out.push(c);
    }
    out
}

fn flush_literal(regex: &mut String, literal: &mut String) {
    if !literal.is_empty() {
        regex.push_str(&regex::escape(literal));
        literal.clear();
    }
}

/// Regex source equivalent to a (sanitised) filter pattern. An empty result
/// matches every URL.
pub fn filter_to_regex(pattern: &str) -> String {
    if is_regex_filter(pattern) {
        return pattern[1..pattern.len() - 1].to_owned();
    }

    let collapsed = collapse_wildcards(pattern);
    let mut body = collapsed.as_str();
    body = body.strip_prefix('*').unwrap_or(body);
    body = body.strip_suffix('*').unwrap_or(body);

    let mut regex = String::with_capacity(body.len() * 2);
    if let Some(rest) = body.strip_prefix("||") {
        regex.push_str(HOST_ANCHOR_REGEX);
        body = rest;
    } else if let Some(rest) = body.strip_prefix('|') {
        regex.push('^');
        body = rest;
    }

    let mut end_anchor = false;
    if let Some(rest) = body.strip_suffix('|') {
        body = rest;
        // `^|` is the same as `^`, which already admits the end.
        end_anchor = !rest.ends_with('^');
    }

    let mut literal = String::new();
    for c in body.chars() {
        match c {
            '*' => {
                flush_literal(&mut regex, &mut literal);
                regex.push_str(".*");
            }
            '^' => {
                flush_literal(&mut regex, &mut literal);
                regex.push_str(SEPARATOR_REGEX);
            }
            _ => literal.push(c),
        }
    }
    flush_literal(&mut regex, &mut literal);

    if end_anchor {
        regex.push('$');
    }
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, url: &str) -> bool {
        let source = filter_to_regex(pattern);
        regex::RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .expect("translated pattern should compile")
            .is_match(url)
    }

    #[test]
    fn test_literal_is_escaped() {
        assert_eq!(filter_to_regex("/ads.js?x"), r"/ads\.js\?x");
        assert_eq!(filter_to_regex("a+b(c)"), r"a\+b\(c\)");
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(filter_to_regex("*"), "");
        assert_eq!(filter_to_regex("**ad***"), "ad");
        assert_eq!(filter_to_regex("ad*banner"), "ad.*banner");
        assert_eq!(filter_to_regex("ad**banner"), "ad.*banner");
    }

    #[test]
    fn test_anchors() {
        assert_eq!(filter_to_regex("|https://"), r"^https://");
        assert_eq!(filter_to_regex("swf|"), r"swf$");
        assert_eq!(filter_to_regex("||ads.org"), format!(r"{HOST_ANCHOR_REGEX}ads\.org"));
        assert_eq!(filter_to_regex("ads^|"), format!("ads{SEPARATOR_REGEX}"));
    }

    #[test]
    fn test_regex_filter_passes_through() {
        assert!(is_regex_filter("/banner\\d+/"));
        assert!(!is_regex_filter("//"));
        assert!(!is_regex_filter("/path"));
        assert_eq!(filter_to_regex("/banner\\d+/"), "banner\\d+");
    }

    #[test]
    fn test_host_anchor_semantics() {
        assert!(matches("||example.com^", "https://example.com/"));
        assert!(matches("||example.com^", "http://ads.example.com"));
        assert!(matches("||example.com^", "wss://example.com:8080/socket"));
        assert!(!matches("||example.com^", "https://example.community/"));
        assert!(!matches("||example.com^", "https://notexample.com/"));
        assert!(!matches("||example.com^", "https://other.org/?u=https://example.com.evil"));
    }

    #[test]
    fn test_separator_semantics() {
        assert!(matches("foo^bar", "http://x.org/foo/bar"));
        assert!(matches("foo^bar", "http://x.org/foo?bar"));
        assert!(!matches("foo^bar", "http://x.org/foo-bar"));
        assert!(!matches("foo^bar", "http://x.org/foo%bar"));
        assert!(matches("ads^", "http://x.org/ads"));
    }

    #[test]
    fn test_start_and_end_anchor_semantics() {
        assert!(matches("|http://ads.", "http://ads.example.com/"));
        assert!(!matches("|http://ads.", "https://x.org/?r=http://ads.example.com"));
        assert!(matches(".swf|", "http://x.org/movie.swf"));
        assert!(!matches(".swf|", "http://x.org/movie.swf?x=1"));
    }
}
