//! Multi-subscription aggregation
//!
//! A [`SubscriptionCollection`] is an ordered, read-only set of installed
//! subscriptions that answers one aggregated question at a time: should this
//! request be blocked, which CSP to inject, which selectors to hide. Every
//! method is a single pass over the subscriptions and never mutates them.
//!
//! The frame hierarchy is ordered from the frame issuing the request up to
//! the top-level document. The document domain of a request is the host of
//! the first frame, or the request host when the hierarchy is empty.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::subscription::InstalledSubscription;
use crate::types::{
    ContentFiltersData, ContentType, FilterCategory, HeaderFilter, MatchDecision, MatchResult, SnippetCall,
    SpecialFilterType,
};
use crate::url::extract_host;

fn host_of(url: &str) -> &str {
    extract_host(url).unwrap_or("")
}

fn document_domain<'a>(url: &'a str, frame_hierarchy: &[&'a str]) -> &'a str {
    host_of(frame_hierarchy.first().copied().unwrap_or(url))
}

/// Whether `filter_type` matches any frame of the chain. Each frame is
/// evaluated against the domain of its parent; the top frame against itself.
fn chain_has_special_filter(
    subscription: &InstalledSubscription,
    filter_type: SpecialFilterType,
    frame_hierarchy: &[&str],
    sitekey: &str,
) -> bool {
    frame_hierarchy.iter().enumerate().any(|(i, frame)| {
        let domain = host_of(frame_hierarchy.get(i + 1).copied().unwrap_or(*frame));
        subscription.has_special_filter(filter_type, frame, domain, sitekey)
    })
}

fn has_special_filter(
    subscription: &InstalledSubscription,
    filter_type: SpecialFilterType,
    url: &str,
    frame_hierarchy: &[&str],
    sitekey: &str,
) -> bool {
    subscription.has_special_filter(filter_type, url, document_domain(url, frame_hierarchy), sitekey)
        || chain_has_special_filter(subscription, filter_type, frame_hierarchy, sitekey)
}

fn has_allow_filter(
    subscription: &InstalledSubscription,
    url: &str,
    frame_hierarchy: &[&str],
    content_type: ContentType,
    sitekey: &str,
) -> bool {
    subscription.has_url_filter(
        url,
        document_domain(url, frame_hierarchy),
        content_type,
        sitekey,
        FilterCategory::Allowing,
    ) || chain_has_special_filter(subscription, SpecialFilterType::Document, frame_hierarchy, sitekey)
}

/// Drop every selector named by an exception.
fn reduce_selectors(mut combined: ContentFiltersData) -> ContentFiltersData {
    if combined.elemhide_exceptions.is_empty() {
        return combined;
    }
    let exceptions: BTreeSet<String> = std::mem::take(&mut combined.elemhide_exceptions)
        .into_iter()
        .collect();
    combined.elemhide_selectors.retain(|selector| !exceptions.contains(selector));
    combined.remove_selectors.retain(|selector| !exceptions.contains(selector));
    combined
        .selectors_to_inline_css
        .retain(|(selector, _)| !exceptions.contains(selector));
    combined
}

fn header_present(filter: &str, response_headers: &[(&str, &str)]) -> bool {
    match filter.split_once('=') {
        Some((name, value)) => response_headers
            .iter()
            .any(|(n, v)| n.eq_ignore_ascii_case(name) && v.trim().eq_ignore_ascii_case(value)),
        None => response_headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(filter)),
    }
}

/// An ordered set of subscriptions queried as one.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionCollection {
    subscriptions: Vec<Arc<InstalledSubscription>>,
    configuration_name: String,
}

impl SubscriptionCollection {
    pub fn new(subscriptions: Vec<Arc<InstalledSubscription>>, configuration_name: impl Into<String>) -> Self {
        Self {
            subscriptions,
            configuration_name: configuration_name.into(),
        }
    }

    pub fn configuration_name(&self) -> &str {
        &self.configuration_name
    }

    pub fn subscriptions(&self) -> &[Arc<InstalledSubscription>] {
        &self.subscriptions
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    // =========================================================================
    // First-match lookups
    // =========================================================================

    /// Source URL of the first subscription with a matching URL filter.
    pub fn find_by_subresource_filter(
        &self,
        url: &str,
        frame_hierarchy: &[&str],
        content_type: ContentType,
        sitekey: &str,
        category: FilterCategory,
    ) -> Option<&str> {
        let domain = document_domain(url, frame_hierarchy);
        self.subscriptions
            .iter()
            .find(|s| s.has_url_filter(url, domain, content_type, sitekey, category))
            .map(|s| s.source_url())
    }

    pub fn find_by_popup_filter(
        &self,
        popup_url: &str,
        opener_url: &str,
        sitekey: &str,
        category: FilterCategory,
    ) -> Option<&str> {
        let opener_domain = host_of(opener_url);
        self.subscriptions
            .iter()
            .find(|s| s.has_popup_filter(popup_url, opener_domain, sitekey, category))
            .map(|s| s.source_url())
    }

    /// Source URL of the first subscription that allows the request, either
    /// with an allowing URL filter or a `$document` exception on the chain.
    pub fn find_by_allow_filter(
        &self,
        url: &str,
        frame_hierarchy: &[&str],
        content_type: ContentType,
        sitekey: &str,
    ) -> Option<&str> {
        self.subscriptions
            .iter()
            .find(|s| has_allow_filter(s, url, frame_hierarchy, content_type, sitekey))
            .map(|s| s.source_url())
    }

    pub fn find_by_special_filter(
        &self,
        filter_type: SpecialFilterType,
        url: &str,
        frame_hierarchy: &[&str],
        sitekey: &str,
    ) -> Option<&str> {
        self.subscriptions
            .iter()
            .find(|s| has_special_filter(s, filter_type, url, frame_hierarchy, sitekey))
            .map(|s| s.source_url())
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    /// Aggregated blocking decision for a subresource request.
    pub fn classify_request(
        &self,
        url: &str,
        frame_hierarchy: &[&str],
        content_type: ContentType,
        sitekey: &str,
    ) -> MatchResult {
        let Some(blocking) =
            self.find_by_subresource_filter(url, frame_hierarchy, content_type, sitekey, FilterCategory::Blocking)
        else {
            return MatchResult::default();
        };

        if let Some(allowing) = self.find_by_allow_filter(url, frame_hierarchy, content_type, sitekey) {
            log::trace!("{url} allowed by {allowing}");
            return MatchResult::new(MatchDecision::Allowed, allowing);
        }

        if self
            .find_by_special_filter(SpecialFilterType::Genericblock, url, frame_hierarchy, sitekey)
            .is_some()
        {
            return match self.find_by_subresource_filter(
                url,
                frame_hierarchy,
                content_type,
                sitekey,
                FilterCategory::DomainSpecificBlocking,
            ) {
                Some(source) => MatchResult::new(MatchDecision::Blocked, source),
                None => MatchResult::default(),
            };
        }

        MatchResult::new(MatchDecision::Blocked, blocking)
    }

    pub fn classify_popup(&self, popup_url: &str, opener_url: &str, sitekey: &str) -> MatchResult {
        let Some(blocking) = self.find_by_popup_filter(popup_url, opener_url, sitekey, FilterCategory::Blocking) else {
            return MatchResult::default();
        };
        match self.find_by_popup_filter(popup_url, opener_url, sitekey, FilterCategory::Allowing) {
            Some(allowing) => MatchResult::new(MatchDecision::Allowed, allowing),
            None => MatchResult::new(MatchDecision::Blocked, blocking),
        }
    }

    /// Decide a response from its headers. A blocking `$header` filter
    /// applies when the named header is present (with the given value, if
    /// any) and no allowing filter with an empty or identical payload
    /// overrules it.
    pub fn classify_response(
        &self,
        url: &str,
        frame_hierarchy: &[&str],
        content_type: ContentType,
        response_headers: &[(&str, &str)],
    ) -> MatchResult {
        let mut blocking = self.get_header_filters(url, frame_hierarchy, content_type, FilterCategory::Blocking);
        if blocking.is_empty() {
            return MatchResult::default();
        }
        if let Some(source) = self.find_by_special_filter(SpecialFilterType::Document, url, frame_hierarchy, "") {
            return MatchResult::new(MatchDecision::Allowed, source);
        }

        let allowing = if self
            .find_by_special_filter(SpecialFilterType::Genericblock, url, frame_hierarchy, "")
            .is_some()
        {
            blocking = self.get_header_filters(
                url,
                frame_hierarchy,
                content_type,
                FilterCategory::DomainSpecificBlocking,
            );
            BTreeSet::new()
        } else {
            self.get_header_filters(url, frame_hierarchy, content_type, FilterCategory::Allowing)
        };

        let mut result = MatchResult::default();
        for filter in blocking
            .iter()
            .filter(|filter| header_present(&filter.header, response_headers))
        {
            let overruled = allowing
                .iter()
                .find(|allow| allow.header.is_empty() || allow.header.eq_ignore_ascii_case(&filter.header));
            match overruled {
                Some(allow) => result = MatchResult::new(MatchDecision::Allowed, &allow.source_url),
                None => return MatchResult::new(MatchDecision::Blocked, &filter.source_url),
            }
        }
        result
    }

    // =========================================================================
    // Payload filters
    // =========================================================================

    /// CSP directives to inject for `url`.
    ///
    /// Each subscription's blocking directives are checked on their own: a
    /// `$document` exception on the chain suppresses everything, an allowing
    /// `$csp` with an empty payload suppresses everything, and an allowing
    /// `$csp` with a payload only cancels the identical directive. Under a
    /// `$genericblock` exception the owning subscription is re-queried for
    /// domain-specific directives only.
    pub fn get_csp_injections(&self, url: &str, frame_hierarchy: &[&str]) -> BTreeSet<String> {
        let domain = document_domain(url, frame_hierarchy);
        let owners: Vec<(&InstalledSubscription, Vec<&str>)> = self
            .subscriptions
            .iter()
            .map(|s| (&**s, s.find_csp_filters(url, domain, FilterCategory::Blocking)))
            .filter(|(_, blocking)| !blocking.is_empty())
            .collect();
        if owners.is_empty() || self.any_has_special_filter(SpecialFilterType::Document, url, frame_hierarchy) {
            return BTreeSet::new();
        }

        let allowing: BTreeSet<&str> = self
            .subscriptions
            .iter()
            .flat_map(|s| s.find_csp_filters(url, domain, FilterCategory::Allowing))
            .collect();
        if allowing.contains("") {
            return BTreeSet::new();
        }

        let genericblock = self.any_has_special_filter(SpecialFilterType::Genericblock, url, frame_hierarchy);
        let mut result = BTreeSet::new();
        for (subscription, blocking) in owners {
            let candidates = if genericblock {
                subscription.find_csp_filters(url, domain, FilterCategory::DomainSpecificBlocking)
            } else {
                blocking
            };
            result.extend(
                candidates
                    .into_iter()
                    .filter(|directive| !directive.is_empty() && !allowing.contains(directive))
                    .map(str::to_owned),
            );
        }
        result
    }

    /// The `data:` URL a request should be redirected to, if any. The first
    /// subscription whose rewrite survives the allow and `$genericblock`
    /// checks wins.
    pub fn get_rewrite_url(&self, url: &str, frame_hierarchy: &[&str]) -> Option<&'static str> {
        let domain = document_domain(url, frame_hierarchy);
        let owners: Vec<(&InstalledSubscription, Vec<&'static str>)> = self
            .subscriptions
            .iter()
            .map(|s| (&**s, s.find_rewrite_filters(url, domain, FilterCategory::Blocking)))
            .filter(|(_, blocking)| !blocking.is_empty())
            .collect();
        if owners.is_empty() || self.any_has_special_filter(SpecialFilterType::Document, url, frame_hierarchy) {
            return None;
        }

        let allowing: BTreeSet<&'static str> = self
            .subscriptions
            .iter()
            .flat_map(|s| s.find_rewrite_filters(url, domain, FilterCategory::Allowing))
            .collect();
        let genericblock = self.any_has_special_filter(SpecialFilterType::Genericblock, url, frame_hierarchy);

        owners.into_iter().find_map(|(subscription, blocking)| {
            let candidates = if genericblock {
                subscription.find_rewrite_filters(url, domain, FilterCategory::DomainSpecificBlocking)
            } else {
                blocking
            };
            candidates.into_iter().find(|target| !allowing.contains(target))
        })
    }

    /// Deduplicated union of header filters across all subscriptions.
    pub fn get_header_filters(
        &self,
        url: &str,
        frame_hierarchy: &[&str],
        content_type: ContentType,
        category: FilterCategory,
    ) -> BTreeSet<HeaderFilter> {
        let domain = document_domain(url, frame_hierarchy);
        self.subscriptions
            .iter()
            .flat_map(|s| s.find_header_filters(url, content_type, domain, category))
            .collect()
    }

    fn any_has_special_filter(&self, filter_type: SpecialFilterType, url: &str, frame_hierarchy: &[&str]) -> bool {
        self.subscriptions
            .iter()
            .any(|s| has_special_filter(s, filter_type, url, frame_hierarchy, ""))
    }

    // =========================================================================
    // Content filters
    // =========================================================================

    pub fn get_element_hide_data(&self, frame_url: &str, frame_hierarchy: &[&str], sitekey: &str) -> ContentFiltersData {
        let domain_specific = self
            .find_by_special_filter(SpecialFilterType::Generichide, frame_url, frame_hierarchy, sitekey)
            .is_some();

        let mut combined = ContentFiltersData::default();
        for subscription in &self.subscriptions {
            let data = subscription.get_elemhide_data(frame_url, domain_specific);
            combined.elemhide_selectors.extend(data.elemhide_selectors);
            combined.elemhide_exceptions.extend(data.elemhide_exceptions);
        }
        reduce_selectors(combined)
    }

    pub fn get_element_hide_emulation_data(&self, frame_url: &str) -> ContentFiltersData {
        let mut combined = ContentFiltersData::default();
        for subscription in &self.subscriptions {
            let data = subscription.get_elemhide_emulation_data(frame_url);
            combined.elemhide_selectors.extend(data.elemhide_selectors);
            combined.elemhide_exceptions.extend(data.elemhide_exceptions);
            combined.remove_selectors.extend(data.remove_selectors);
            combined.selectors_to_inline_css.extend(data.selectors_to_inline_css);
        }
        reduce_selectors(combined)
    }

    /// Snippet calls of every subscription for the frame's document domain,
    /// in subscription order.
    pub fn generate_snippets(&self, frame_url: &str, frame_hierarchy: &[&str]) -> Vec<SnippetCall> {
        let domain = document_domain(frame_url, frame_hierarchy);
        self.subscriptions
            .iter()
            .flat_map(|s| s.match_snippets(domain))
            .collect()
    }
}
