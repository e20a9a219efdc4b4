use std::sync::OnceLock;

use bw_core::keyword::filter_keyword;
use bw_core::regex_cache::is_valid_pattern;
use bw_core::types::{ContentType, RewriteResource, SnippetCall, SpecialFilterType, ThirdParty};
use regex::Regex;

use crate::pattern::{filter_to_regex, is_regex_filter};
use crate::snippet;

const MIN_GENERIC_PATTERN_LEN: usize = 4;
const MIN_GENERIC_SELECTOR_LEN: usize = 3;
const REWRITE_PREFIX: &str = "abp-resource:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Blocking,
    Allowing,
}

/// Include and exclude domains, lowercased, deduplicated and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSet {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl DomainSet {
    fn push(&mut self, raw: &str) {
        let (is_exclude, raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let domain = normalize_domain(raw);
        if domain.is_empty() {
            return;
        }
        if is_exclude {
            self.exclude.push(domain);
        } else {
            self.include.push(domain);
        }
    }

    fn finish(mut self) -> Self {
        for list in [&mut self.include, &mut self.exclude] {
            list.sort();
            list.dedup();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFilter {
    pub category: Category,
    /// Filter pattern after sanitising, lowercased unless `match_case`.
    pub pattern: String,
    pub match_case: bool,
    pub content_types: ContentType,
    pub third_party: ThirdParty,
    pub domains: DomainSet,
    pub sitekeys: Vec<String>,
    pub popup: bool,
    pub subresource: bool,
    pub csp: Option<String>,
    pub header: Option<String>,
    pub rewrite: Option<RewriteResource>,
    pub special_types: Vec<SpecialFilterType>,
}

impl UrlFilter {
    pub fn is_generic(&self) -> bool {
        self.sitekeys.is_empty() && self.domains.is_empty()
    }

    /// Regex source the matcher evaluates.
    pub fn regex(&self) -> String {
        filter_to_regex(&self.pattern)
    }

    /// Index bucket; regex filters always land in the empty bucket.
    pub fn keyword(&self) -> String {
        if is_regex_filter(&self.pattern) {
            String::new()
        } else {
            filter_keyword(&self.pattern)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFilterKind {
    ElemHide,
    ElemHideException,
    ElemHideEmulation,
    Remove,
    InlineCss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    pub kind: ContentFilterKind,
    pub selector: String,
    /// CSS declarations of an inline-css filter, empty otherwise.
    pub css: String,
    pub domains: DomainSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetFilter {
    pub domains: DomainSet,
    pub calls: Vec<SnippetCall>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRecord {
    Url(UrlFilter),
    Content(ContentFilter),
    Snippet(SnippetFilter),
}

impl FilterRecord {
    pub fn category(&self) -> Category {
        match self {
            Self::Url(filter) => filter.category,
            Self::Content(ContentFilter {
                kind: ContentFilterKind::ElemHideException,
                ..
            }) => Category::Allowing,
            Self::Content(_) | Self::Snippet(_) => Category::Blocking,
        }
    }
}

/// Parse one filter line. Comments, blank lines and anything malformed or
/// not permitted for the list yield `None`.
pub fn parse_line(line: &str, allow_privileged: bool) -> Option<FilterRecord> {
    let line = line.trim();
    if line.is_empty() || is_comment_line(line) {
        return None;
    }

    if let Some((pos, kind)) = find_content_separator(line) {
        return parse_content_filter(line, pos, kind, allow_privileged);
    }

    let filter = parse_url_filter(line, allow_privileged);
    if filter.is_none() {
        log::debug!("Dropped filter: {line}");
    }
    filter.map(FilterRecord::Url)
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}

// =============================================================================
// Content filters
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    ElemHide,
    ElemHideException,
    ElemHideEmulation,
    Snippet,
}

impl Separator {
    fn len(self) -> usize {
        match self {
            Self::ElemHide => 2,
            _ => 3,
        }
    }
}

/// Position and type of the content-filter separator, keyed off the first
/// `#` in the line.
fn find_content_separator(line: &str) -> Option<(usize, Separator)> {
    let pos = line.find('#')?;
    let rest = line.as_bytes().get(pos + 1..pos + 3)?;
    let kind = match rest {
        [b'#', _] => Separator::ElemHide,
        [b'@', b'#'] => Separator::ElemHideException,
        [b'?', b'#'] => Separator::ElemHideEmulation,
        [b'$', b'#'] => Separator::Snippet,
        _ => return None,
    };
    Some((pos, kind))
}

fn parse_content_filter(
    line: &str,
    pos: usize,
    separator: Separator,
    allow_privileged: bool,
) -> Option<FilterRecord> {
    let body = line[pos + separator.len()..].trim();
    if body.is_empty() {
        log::debug!("Dropped content filter without selector: {line}");
        return None;
    }

    let needs_subdomain = matches!(separator, Separator::ElemHideEmulation | Separator::Snippet);
    let mut domains = DomainSet::default();
    for raw in line[..pos].split(',').map(str::trim).filter(|d| !d.is_empty()) {
        domains.push(raw);
    }
    let mut domains = domains.finish();
    if needs_subdomain {
        for list in [&mut domains.include, &mut domains.exclude] {
            list.retain(|d| d == "localhost" || d.contains('.'));
        }
        if domains.include.is_empty() {
            log::debug!("Dropped filter without include domains: {line}");
            return None;
        }
    }

    match separator {
        Separator::ElemHide | Separator::ElemHideException => {
            if domains.include.is_empty() && body.chars().count() < MIN_GENERIC_SELECTOR_LEN {
                log::debug!("Dropped generic selector, too short: {line}");
                return None;
            }
            let kind = if separator == Separator::ElemHide {
                ContentFilterKind::ElemHide
            } else {
                ContentFilterKind::ElemHideException
            };
            Some(FilterRecord::Content(ContentFilter {
                kind,
                selector: escape_selector(body),
                css: String::new(),
                domains,
            }))
        }
        Separator::ElemHideEmulation => parse_emulation_filter(line, body, domains, allow_privileged),
        Separator::Snippet => {
            if !allow_privileged {
                log::warn!("Snippet filter not allowed for this list: {line}");
                return None;
            }
            let calls = snippet::tokenize(body);
            if calls.is_empty() {
                log::debug!("Dropped empty snippet: {line}");
                return None;
            }
            Some(FilterRecord::Snippet(SnippetFilter { domains, calls }))
        }
    }
}

/// `#?#` filters: plain emulation selectors, or `selector {...}` modifiers
/// that remove the element or apply inline CSS.
fn parse_emulation_filter(
    line: &str,
    body: &str,
    domains: DomainSet,
    allow_privileged: bool,
) -> Option<FilterRecord> {
    let Some(block) = body.strip_suffix('}') else {
        return Some(FilterRecord::Content(ContentFilter {
            kind: ContentFilterKind::ElemHideEmulation,
            selector: body.to_owned(),
            css: String::new(),
            domains,
        }));
    };

    let (selector, declarations) = block.rsplit_once('{')?;
    let selector = selector.trim();
    if selector.is_empty() {
        log::debug!("Dropped modifier filter without selector: {line}");
        return None;
    }
    if !allow_privileged {
        log::warn!("Modifier filter not allowed for this list: {line}");
        return None;
    }

    let declarations = declarations.trim();
    let compact: String = declarations.chars().filter(|c| !c.is_whitespace()).collect();
    let filter = if compact.eq_ignore_ascii_case("remove:true;") || compact.eq_ignore_ascii_case("remove:true") {
        ContentFilter {
            kind: ContentFilterKind::Remove,
            selector: selector.to_owned(),
            css: String::new(),
            domains,
        }
    } else {
        ContentFilter {
            kind: ContentFilterKind::InlineCss,
            selector: selector.to_owned(),
            css: declarations.to_owned(),
            domains,
        }
    };
    Some(FilterRecord::Content(filter))
}

/// CSS-escape braces so a selector cannot open a declaration block.
fn escape_selector(selector: &str) -> String {
    if !selector.contains(['{', '}']) {
        return selector.to_owned();
    }
    let mut out = String::with_capacity(selector.len() + 8);
    for c in selector.chars() {
        match c {
            '{' => out.push_str("\\7b "),
            '}' => out.push_str("\\7d "),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// URL filters
// =============================================================================

struct ParsedOptions {
    match_case: bool,
    popup: bool,
    subresource: bool,
    third_party: ThirdParty,
    content_types: ContentType,
    rewrite: Option<RewriteResource>,
    domains: DomainSet,
    sitekeys: Vec<String>,
    csp: Option<String>,
    header: Option<String>,
    special_types: Vec<SpecialFilterType>,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            match_case: false,
            popup: false,
            subresource: true,
            third_party: ThirdParty::Ignore,
            content_types: ContentType::DEFAULT,
            rewrite: None,
            domains: DomainSet::default(),
            sitekeys: Vec::new(),
            csp: None,
            header: None,
            special_types: Vec::new(),
        }
    }
}

fn parse_url_filter(line: &str, allow_privileged: bool) -> Option<UrlFilter> {
    let (category, text) = match line.strip_prefix("@@") {
        Some(rest) => (Category::Allowing, rest),
        None => (Category::Blocking, line),
    };

    let (pattern_part, options) = match text.rfind('$') {
        Some(pos) if !is_regex_filter(text) => {
            let options = parse_options(&text[pos + 1..])?;
            (&text[..pos], Some(options))
        }
        _ => (text, None),
    };
    let has_options = options.is_some();
    let options = options.unwrap_or_default();

    if category == Category::Blocking {
        if options.csp.as_deref() == Some("") {
            return None;
        }
        if options.header.as_deref() == Some("") {
            return None;
        }
        if !options.special_types.is_empty() {
            return None;
        }
    }
    if options.header.is_some() && !allow_privileged {
        log::warn!("Header filter not allowed for this list: {line}");
        return None;
    }

    let mut pattern: String = pattern_part.chars().filter(|c| !c.is_whitespace()).collect();
    if pattern.is_empty() && !has_options {
        return None;
    }

    if !is_regex_filter(&pattern) {
        pattern = sanitize_pipes(&pattern);
        if !options.match_case {
            pattern.make_ascii_lowercase();
        }
    }

    if options.rewrite.is_some() && !is_valid_rewrite(&pattern, &options) {
        return None;
    }
    if is_invalid_host_anchor(&pattern) {
        return None;
    }
    let is_generic = options.domains.is_empty() && options.sitekeys.is_empty();
    if is_generic && !is_specific_enough(&pattern) {
        return None;
    }

    let filter = UrlFilter {
        category,
        pattern,
        match_case: options.match_case,
        content_types: options.content_types,
        third_party: options.third_party,
        domains: options.domains,
        sitekeys: options.sitekeys,
        popup: options.popup,
        subresource: options.subresource,
        csp: options.csp,
        header: options.header,
        rewrite: options.rewrite,
        special_types: options.special_types,
    };
    if !is_valid_pattern(&filter.regex()) {
        return None;
    }
    Some(filter)
}

fn parse_options(text: &str) -> Option<ParsedOptions> {
    let mut options = ParsedOptions::default();
    let mut explicit_types = ContentType::empty();
    let mut has_types = false;

    for raw in text.split(',').filter(|o| !o.is_empty()) {
        let (inverse, raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
        let key: String = key
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "match-case" => options.match_case = !inverse,
            "popup" => options.popup = true,
            "third-party" => {
                options.third_party = if inverse {
                    ThirdParty::FirstPartyOnly
                } else {
                    ThirdParty::ThirdPartyOnly
                };
            }
            "rewrite" => {
                let name = value.strip_prefix(REWRITE_PREFIX)?;
                options.rewrite = Some(RewriteResource::from_name(name));
            }
            "domain" => {
                if value.is_empty() {
                    return None;
                }
                options.domains = parse_domain_option(value);
            }
            "sitekey" => {
                if value.is_empty() {
                    return None;
                }
                options.sitekeys = parse_sitekeys(value);
            }
            "csp" => {
                if !is_valid_csp(value) {
                    return None;
                }
                options.csp = Some(value.to_owned());
            }
            "header" => options.header = Some(unescape_header(value)),
            name => {
                if let Some(content_type) = ContentType::from_option(name) {
                    has_types = true;
                    if inverse {
                        if explicit_types.is_empty() {
                            explicit_types = ContentType::DEFAULT;
                        }
                        explicit_types.remove(content_type);
                    } else {
                        explicit_types.insert(content_type);
                    }
                    continue;
                }
                let special = special_type_from_option(name)?;
                if !options.special_types.contains(&special) {
                    options.special_types.push(special);
                }
            }
        }
    }

    options.subresource = has_types
        || (options.special_types.is_empty()
            && !options.popup
            && options.csp.is_none()
            && options.rewrite.is_none()
            && options.header.is_none());
    if !explicit_types.is_empty() {
        options.content_types = explicit_types;
    }
    Some(options)
}

fn special_type_from_option(name: &str) -> Option<SpecialFilterType> {
    match name {
        "document" => Some(SpecialFilterType::Document),
        "elemhide" => Some(SpecialFilterType::Elemhide),
        "genericblock" => Some(SpecialFilterType::Genericblock),
        "generichide" => Some(SpecialFilterType::Generichide),
        _ => None,
    }
}

fn parse_domain_option(value: &str) -> DomainSet {
    let mut domains = DomainSet::default();
    for raw in value.split('|') {
        domains.push(raw);
    }
    domains.finish()
}

fn parse_sitekeys(value: &str) -> Vec<String> {
    let mut sitekeys: Vec<String> = value
        .to_ascii_uppercase()
        .split('|')
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .collect();
    sitekeys.sort();
    sitekeys
}

/// Lowercase and strip the wildcard suffix: `example.*` becomes the
/// TLD-wildcard form `example.`, `example.org*.` becomes `example.org`.
fn normalize_domain(raw: &str) -> String {
    let domain = raw.trim().to_ascii_lowercase();
    if let Some(stripped) = domain.strip_suffix('*') {
        return stripped.to_owned();
    }
    domain.trim_end_matches('.').trim_end_matches('*').to_owned()
}

fn is_valid_csp(value: &str) -> bool {
    static FORBIDDEN: OnceLock<Option<Regex>> = OnceLock::new();
    let forbidden = FORBIDDEN.get_or_init(|| {
        Regex::new(r"(;|^) ?(base-uri|referrer|report-to|report-uri|upgrade-insecure-requests)\b").ok()
    });
    forbidden.as_ref().map_or(true, |re| !re.is_match(value))
}

/// Decode `\x2c` into `,`. A doubled backslash keeps the sequence literal.
fn unescape_header(value: &str) -> String {
    static ESCAPES: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    let escapes = ESCAPES.get_or_init(|| Some((Regex::new(r"([^\\])\\x2c").ok()?, Regex::new(r"\\x2c").ok()?)));
    match escapes {
        Some((comma, leftover)) => {
            let decoded = comma.replace_all(value, "${1},");
            leftover.replace_all(&decoded, "x2c").into_owned()
        }
        None => value.to_owned(),
    }
}

/// Escape `|` everywhere except in anchor position (two leading, one
/// trailing), the way URLs carry it.
fn sanitize_pipes(pattern: &str) -> String {
    let mut body = pattern;
    let mut left = 0;
    while left < 2 {
        match body.strip_prefix('|') {
            Some(rest) => {
                body = rest;
                left += 1;
            }
            None => break,
        }
    }
    let right = body.strip_suffix('|');
    let has_right = right.is_some();
    let body = right.unwrap_or(body);
    if !body.contains('|') {
        return pattern.to_owned();
    }

    let mut out = "|".repeat(left);
    out.push_str(&body.replace('|', "%7C"));
    if has_right {
        out.push('|');
    }
    out
}

fn is_valid_rewrite(pattern: &str, options: &ParsedOptions) -> bool {
    if options.third_party == ThirdParty::ThirdPartyOnly {
        return false;
    }
    if !pattern.is_empty() && pattern != "*" && !pattern.starts_with("||") {
        return false;
    }
    !options.domains.include.is_empty() || options.third_party == ThirdParty::FirstPartyOnly
}

/// `||http://host` style patterns: the scheme belongs before the anchor.
fn is_invalid_host_anchor(pattern: &str) -> bool {
    let Some(rest) = pattern.strip_prefix("||") else {
        return false;
    };
    let scheme_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    rest[scheme_len..].starts_with("://")
}

fn is_specific_enough(pattern: &str) -> bool {
    let trimmed = pattern.trim_start_matches('|');
    trimmed.len() >= MIN_GENERIC_PATTERN_LEN || trimmed.contains('*')
}
