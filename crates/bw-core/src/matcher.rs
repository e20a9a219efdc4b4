//! Per-subscription matching engine
//!
//! This is the hot path: every request, popup and frame goes through here.
//! URL filters are found by walking the request's keywords, consulting the
//! keyword's bucket in the selected sub-index and finally the empty-keyword
//! bucket. Candidates are screened for viability (content type, genericity,
//! third-party, domain and sitekey) before any regex runs.

use std::borrow::Cow;

use crate::domain::{domain_matches, is_third_party, DomainSplitter};
use crate::keyword::UrlKeywordExtractor;
use crate::regex_cache::{has_backreference, RegexCache};
use crate::snapshot::{DomainLists, IndexId, IndexKind, Snapshot, StrList, UrlFilterView};
use crate::types::{
    ContentFiltersData, ContentType, FilterCategory, RewriteResource, SnippetCall, SpecialFilterType,
    ThirdParty,
};
use crate::url::extract_host;

/// How [`Matcher`] evaluates the viable candidates of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindStrategy {
    /// Merge candidate patterns into one alternation per case mode and stop
    /// at the first hit. Used when only the existence of a match matters.
    MergeThenTest,
    /// Test every candidate on its own and collect all hits. Used when the
    /// payload of each match is needed.
    TestEach,
}

/// Normalised inputs of one URL-filter lookup.
struct UrlQuery<'q> {
    url: &'q str,
    lowercase_url: Cow<'q, str>,
    content_type: Option<ContentType>,
    document_domain: Cow<'q, str>,
    sitekey: Cow<'q, str>,
    category: FilterCategory,
    third_party: bool,
}

impl<'q> UrlQuery<'q> {
    fn new(
        url: &'q str,
        content_type: Option<ContentType>,
        document_domain: &'q str,
        sitekey: &'q str,
        category: FilterCategory,
    ) -> Self {
        Self {
            url,
            lowercase_url: lowercase(url),
            content_type,
            document_domain: lowercase(document_domain),
            sitekey: uppercase(sitekey),
            category,
            third_party: is_third_party(url, document_domain),
        }
    }
}

fn lowercase(value: &str) -> Cow<'_, str> {
    if value.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(value.to_ascii_lowercase())
    } else {
        Cow::Borrowed(value)
    }
}

fn uppercase(value: &str) -> Cow<'_, str> {
    if value.bytes().any(|b| b.is_ascii_lowercase()) {
        Cow::Owned(value.to_ascii_uppercase())
    } else {
        Cow::Borrowed(value)
    }
}

// =============================================================================
// Domain activation
// =============================================================================

fn on_list(document_domain: &str, list: StrList<'_>) -> bool {
    list.into_iter().any(|filter_domain| domain_matches(filter_domain, document_domain))
}

/// Whether a filter with these domain lists applies on `document_domain`.
///
/// Exclusions win over inclusions; a filter with no (non-blank) includes
/// applies everywhere it is not excluded.
pub fn is_active_on_domain(lists: &DomainLists<'_>, document_domain: &str) -> bool {
    if lists.is_generic() {
        return true;
    }
    if on_list(document_domain, lists.exclude_domains()) {
        return false;
    }
    let mut includes = lists.include_domains().filter(|d| !d.is_empty()).peekable();
    if includes.peek().is_none() {
        return true;
    }
    includes.any(|filter_domain| domain_matches(filter_domain, document_domain))
}

/// Sitekey gate followed by [`is_active_on_domain`]. `sitekey` must be
/// uppercase.
fn is_active_for(lists: &DomainLists<'_>, document_domain: &str, sitekey: &str) -> bool {
    let mut sitekeys = lists.sitekeys().peekable();
    if sitekeys.peek().is_some() && !sitekeys.any(|key| key == sitekey) {
        return false;
    }
    is_active_on_domain(lists, document_domain)
}

fn is_excluded_on(lists: &DomainLists<'_>, document_domain: &str) -> bool {
    on_list(document_domain, lists.exclude_domains())
}

// =============================================================================
// Matcher
// =============================================================================

/// Query engine over one compiled index.
pub struct Matcher<'a> {
    snapshot: Snapshot<'a>,
    regex_cache: &'a RegexCache,
}

impl<'a> Matcher<'a> {
    pub fn new(snapshot: Snapshot<'a>, regex_cache: &'a RegexCache) -> Self {
        Self {
            snapshot,
            regex_cache,
        }
    }

    pub fn snapshot(&self) -> &Snapshot<'a> {
        &self.snapshot
    }

    /// Compile the patterns of every empty-keyword URL bucket ahead of time.
    /// Those buckets are consulted on every query.
    pub fn prebuild_patterns(&self) {
        let filters: Vec<UrlFilterView<'a>> = IndexId::ALL
            .iter()
            .filter(|id| id.kind() == IndexKind::Url)
            .flat_map(|&id| self.snapshot.index(id).lookup(""))
            .filter_map(|filter_id| self.snapshot.url_filter(filter_id))
            .collect();
        self.regex_cache
            .prebuild(filters.iter().map(|filter| (filter.pattern(), filter.match_case())));
    }

    // -------------------------------------------------------------------------
    // URL filters
    // -------------------------------------------------------------------------

    fn block_or_allow(category: FilterCategory, block: IndexId, allow: IndexId) -> IndexId {
        match category {
            FilterCategory::Allowing => allow,
            FilterCategory::Blocking | FilterCategory::DomainSpecificBlocking => block,
        }
    }

    pub fn has_url_filter(
        &self,
        url: &str,
        document_domain: &str,
        content_type: ContentType,
        sitekey: &str,
        category: FilterCategory,
    ) -> bool {
        let index = Self::block_or_allow(category, IndexId::UrlSubresourceBlock, IndexId::UrlSubresourceAllow);
        let query = UrlQuery::new(url, Some(content_type), document_domain, sitekey, category);
        !self.find(index, &query, FindStrategy::MergeThenTest).is_empty()
    }

    pub fn has_popup_filter(
        &self,
        popup_url: &str,
        opener_domain: &str,
        sitekey: &str,
        category: FilterCategory,
    ) -> bool {
        let index = Self::block_or_allow(category, IndexId::UrlPopupBlock, IndexId::UrlPopupAllow);
        let query = UrlQuery::new(popup_url, None, opener_domain, sitekey, category);
        !self.find(index, &query, FindStrategy::MergeThenTest).is_empty()
    }

    pub fn has_special_filter(
        &self,
        filter_type: SpecialFilterType,
        url: &str,
        document_domain: &str,
        sitekey: &str,
    ) -> bool {
        let index = match filter_type {
            SpecialFilterType::Document => IndexId::UrlDocumentAllow,
            SpecialFilterType::Elemhide => IndexId::UrlElemhideAllow,
            SpecialFilterType::Genericblock => IndexId::UrlGenericblockAllow,
            SpecialFilterType::Generichide => IndexId::UrlGenerichideAllow,
        };
        let query = UrlQuery::new(url, None, document_domain, sitekey, FilterCategory::Allowing);
        !self.find(index, &query, FindStrategy::MergeThenTest).is_empty()
    }

    /// Payloads of every matching CSP filter, in match order, deduplicated.
    /// Allowing filters without a payload yield `""`.
    pub fn find_csp_filters(&self, url: &str, document_domain: &str, category: FilterCategory) -> Vec<&'a str> {
        let index = Self::block_or_allow(category, IndexId::UrlCspBlock, IndexId::UrlCspAllow);
        let query = UrlQuery::new(url, None, document_domain, "", category);
        let mut payloads: Vec<&'a str> = Vec::new();
        for filter in self.find(index, &query, FindStrategy::TestEach) {
            let payload = filter.payload();
            if !payloads.contains(&payload) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// `data:` URLs of every matching rewrite filter. Filters naming an
    /// unknown resource never match.
    pub fn find_rewrite_filters(
        &self,
        url: &str,
        document_domain: &str,
        category: FilterCategory,
    ) -> Vec<&'static str> {
        let index = Self::block_or_allow(category, IndexId::UrlRewriteBlock, IndexId::UrlRewriteAllow);
        let query = UrlQuery::new(url, None, document_domain, "", category);
        let mut targets: Vec<&'static str> = Vec::new();
        for filter in self.find(index, &query, FindStrategy::TestEach) {
            if let Some(target) = RewriteResource::data_url(filter.rewrite()) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }

    /// Header payloads of every matching header filter.
    pub fn find_header_filters(
        &self,
        url: &str,
        content_type: ContentType,
        document_domain: &str,
        category: FilterCategory,
    ) -> Vec<&'a str> {
        let index = Self::block_or_allow(category, IndexId::UrlHeaderBlock, IndexId::UrlHeaderAllow);
        let query = UrlQuery::new(url, Some(content_type), document_domain, "", category);
        let mut headers: Vec<&'a str> = Vec::new();
        for filter in self.find(index, &query, FindStrategy::TestEach) {
            let header = filter.payload();
            if !headers.contains(&header) {
                headers.push(header);
            }
        }
        headers
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    fn find(&self, index: IndexId, query: &UrlQuery<'_>, strategy: FindStrategy) -> Vec<UrlFilterView<'a>> {
        let mut results = Vec::new();
        let index = self.snapshot.index(index);
        if index.key_count() == 0 {
            return results;
        }

        let keywords = UrlKeywordExtractor::new(&query.lowercase_url);
        for keyword in keywords.chain(std::iter::once("")) {
            let candidates: Vec<UrlFilterView<'a>> = index
                .lookup(keyword)
                .filter_map(|id| self.snapshot.url_filter(id))
                .filter(|filter| self.is_viable(filter, query))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            match strategy {
                FindStrategy::MergeThenTest => {
                    if let Some(hit) = self.merge_then_test(candidates, query) {
                        results.push(hit);
                        return results;
                    }
                }
                FindStrategy::TestEach => {
                    results.extend(candidates.into_iter().filter(|filter| self.test(filter, query)));
                }
            }
        }
        results
    }

    fn is_viable(&self, filter: &UrlFilterView<'_>, query: &UrlQuery<'_>) -> bool {
        if let Some(content_type) = query.content_type {
            if !filter.content_types().intersects(content_type) {
                return false;
            }
        }
        if query.category == FilterCategory::DomainSpecificBlocking && filter.domains().is_generic() {
            return false;
        }
        let party_ok = match filter.third_party() {
            ThirdParty::Ignore => true,
            ThirdParty::FirstPartyOnly => !query.third_party,
            ThirdParty::ThirdPartyOnly => query.third_party,
        };
        party_ok && is_active_for(filter.domains(), &query.document_domain, &query.sitekey)
    }

    fn test(&self, filter: &UrlFilterView<'_>, query: &UrlQuery<'_>) -> bool {
        self.regex_cache
            .is_match(filter.pattern(), filter.match_case(), query.url)
    }

    /// First matching candidate, found by testing one alternation per case
    /// mode and only then pinpointing the filter that hit. Patterns with
    /// backreferences are tested on their own since merging renumbers their
    /// groups.
    fn merge_then_test(&self, candidates: Vec<UrlFilterView<'a>>, query: &UrlQuery<'_>) -> Option<UrlFilterView<'a>> {
        if let Some(pos) = candidates.iter().position(|filter| filter.pattern().is_empty()) {
            return candidates.into_iter().nth(pos);
        }

        let (standalone, mergeable): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|filter| has_backreference(filter.pattern()));
        let (case_sensitive, case_folded): (Vec<_>, Vec<_>) =
            mergeable.into_iter().partition(|filter| filter.match_case());

        for (group, match_case) in [(case_folded, false), (case_sensitive, true)] {
            if group.is_empty() {
                continue;
            }
            let merged_hit = match group.as_slice() {
                [single] => self.test(single, query),
                _ => {
                    let source = group
                        .iter()
                        .map(|filter| format!("(?:{})", filter.pattern()))
                        .collect::<Vec<_>>()
                        .join("|");
                    let merged = self.regex_cache.get_alternation(&source, match_case);
                    // Unusable alternations defer to the members.
                    match merged.try_match(query.url) {
                        _ if !merged.is_valid() => {
                            log::debug!("merged pattern of {} filters rejected; testing each", group.len());
                            true
                        }
                        Some(hit) => hit,
                        None => {
                            log::debug!("merged pattern of {} filters gave up; testing each", group.len());
                            true
                        }
                    }
                }
            };
            if merged_hit {
                if let Some(hit) = group.into_iter().find(|filter| self.test(filter, query)) {
                    return Some(hit);
                }
            }
        }

        standalone.into_iter().find(|filter| self.test(filter, query))
    }

    // -------------------------------------------------------------------------
    // Content filters
    // -------------------------------------------------------------------------

    fn collect_selectors(&self, index: IndexId, key: &str, domain: &str, out: &mut Vec<String>) {
        for id in self.snapshot.index(index).lookup(key) {
            if let Some(filter) = self.snapshot.content_filter(id) {
                if !is_excluded_on(filter.domains(), domain) {
                    out.push(filter.selector().to_owned());
                }
            }
        }
    }

    /// Element hiding selectors and exceptions for the frame at `url`.
    /// Generic selectors are skipped when `domain_specific` is set.
    pub fn elemhide_data(&self, url: &str, domain_specific: bool) -> ContentFiltersData {
        let mut data = ContentFiltersData::default();
        let domain = lowercase(extract_host(url).unwrap_or_default()).into_owned();

        if !domain_specific {
            self.collect_selectors(IndexId::ElemhideException, "", &domain, &mut data.elemhide_exceptions);
            self.collect_selectors(IndexId::Elemhide, "", &domain, &mut data.elemhide_selectors);
        }

        for key in DomainSplitter::new(&domain) {
            self.collect_selectors(IndexId::ElemhideException, key, &domain, &mut data.elemhide_exceptions);
            self.collect_selectors(IndexId::Elemhide, key, &domain, &mut data.elemhide_selectors);
        }
        data
    }

    /// Emulation, remove and inline-CSS selectors for the frame at `url`,
    /// plus the element hiding exceptions that apply there. Always
    /// domain-specific.
    pub fn elemhide_emulation_data(&self, url: &str) -> ContentFiltersData {
        let mut data = ContentFiltersData::default();
        let domain = lowercase(extract_host(url).unwrap_or_default()).into_owned();

        for key in DomainSplitter::new(&domain) {
            self.collect_selectors(IndexId::ElemhideException, key, &domain, &mut data.elemhide_exceptions);
            self.collect_selectors(IndexId::ElemhideEmulation, key, &domain, &mut data.elemhide_selectors);
            self.collect_selectors(IndexId::Remove, key, &domain, &mut data.remove_selectors);
            for id in self.snapshot.index(IndexId::InlineCss).lookup(key) {
                if let Some(filter) = self.snapshot.content_filter(id) {
                    if !is_excluded_on(filter.domains(), &domain) {
                        data.selectors_to_inline_css
                            .push((filter.selector().to_owned(), filter.css().to_owned()));
                    }
                }
            }
        }
        data
    }

    /// Snippet calls for `document_domain`, most specific domain first.
    pub fn match_snippets(&self, document_domain: &str) -> Vec<SnippetCall> {
        let domain = lowercase(document_domain);
        let index = self.snapshot.index(IndexId::Snippet);
        let mut calls = Vec::new();
        for key in DomainSplitter::new(&domain) {
            for id in index.lookup(key) {
                if let Some(filter) = self.snapshot.snippet_filter(id) {
                    if !is_excluded_on(filter.domains(), &domain) {
                        calls.extend(filter.calls());
                    }
                }
            }
        }
        calls
    }
}
