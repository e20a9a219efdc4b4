//! Domain utilities backed by the Public Suffix List
//!
//! - [`DomainSplitter`] walks a host from most to least specific, then over
//!   its TLD-wildcard forms (`example.` for `example.com`).
//! - [`domain_matches`] is the suffix rule every domain-constrained filter
//!   uses.
//! - [`registrable_domain`] and [`is_third_party`] compare sites.
//!
//! # Examples
//!
//! ```
//! use bw_core::domain::DomainSplitter;
//!
//! let parts: Vec<_> = DomainSplitter::new("subdomain.example.com").collect();
//! assert_eq!(
//!     parts,
//!     ["subdomain.example.com", "example.com", "com", "subdomain.example.", "example."]
//! );
//! ```

use std::net::IpAddr;

use crate::url::extract_host;

// =============================================================================
// Registry lookup
// =============================================================================

/// The ICANN public suffix ("registry") of `host`, e.g. `co.uk`.
///
/// Private-section suffixes such as `blogspot.com` resolve to their ICANN
/// parent (`com`). Returns `None` for hosts under an unlisted suffix
/// (`localhost`, `example.evil`) and for IP addresses.
pub fn registry(host: &str) -> Option<&str> {
    let host = host.trim_end_matches('.');
    if host.is_empty() || is_ip_address(host) {
        return None;
    }

    let suffix = psl::suffix(host.as_bytes())?;
    if !suffix.is_known() {
        return None;
    }

    let mut candidate = &host[host.len() - suffix.as_bytes().len()..];
    if suffix.typ() == Some(psl::Type::Icann) {
        return Some(candidate);
    }

    // Private registry: climb until the remaining labels form an ICANN suffix.
    while let Some(dot) = candidate.find('.') {
        candidate = &candidate[dot + 1..];
        if let Some(parent) = psl::suffix(candidate.as_bytes()) {
            if parent.is_known()
                && parent.typ() == Some(psl::Type::Icann)
                && parent.as_bytes().len() == candidate.len()
            {
                return Some(candidate);
            }
        }
    }
    None
}

/// eTLD+1 of `host`, private registries included.
///
/// Hosts without a registrable part (IP addresses, bare suffixes,
/// `localhost`) are their own site. Expects a lowercase host.
pub fn registrable_domain(host: &str) -> &str {
    let host = host.trim_end_matches('.');
    if host.is_empty() || is_ip_address(host) {
        return host;
    }
    match psl::domain(host.as_bytes()) {
        Some(domain) => &host[host.len() - domain.as_bytes().len()..],
        None => host,
    }
}

fn is_ip_address(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}

// =============================================================================
// Domain matching
// =============================================================================

/// Whether `document_domain` is `filter_domain` or one of its subdomains.
///
/// A `filter_domain` with a trailing dot is a TLD wildcard: the document's
/// registry is removed before comparing, so `example.` matches
/// `www.example.co.uk` but never a host whose suffix is unlisted.
pub fn domain_matches(filter_domain: &str, document_domain: &str) -> bool {
    let document = if filter_domain.ends_with('.') {
        match registry(document_domain) {
            Some(reg) if reg.len() < document_domain.len() => {
                &document_domain[..document_domain.len() - reg.len()]
            }
            _ => return false,
        }
    } else {
        document_domain
    };

    if document.len() == filter_domain.len() {
        return document.eq_ignore_ascii_case(filter_domain);
    }
    if document.len() > filter_domain.len() {
        let split = document.len() - filter_domain.len();
        return document.as_bytes()[split - 1] == b'.'
            && document.is_char_boundary(split)
            && document[split..].eq_ignore_ascii_case(filter_domain);
    }
    false
}

/// Whether a request to `url` made from `document_domain` is third-party.
pub fn is_third_party(url: &str, document_domain: &str) -> bool {
    let request_host = match extract_host(url) {
        Some(host) => host,
        None => return true,
    };
    if document_domain.is_empty() {
        return true;
    }
    let request_host = request_host.to_ascii_lowercase();
    let document_domain = document_domain.to_ascii_lowercase();
    registrable_domain(&request_host) != registrable_domain(&document_domain)
}

// =============================================================================
// Domain Splitter
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Yielding `host[cursor..]`.
    Hosts,
    /// Yielding `host[cursor..=wildcard_end]`, which ends in a dot.
    Wildcards,
    Done,
}

/// Yields the lookup keys for a document host, most specific first.
///
/// For `subdomain.example.com` this is `subdomain.example.com`,
/// `example.com`, `com`, `subdomain.example.`, `example.`. Hosts whose
/// registry is unknown, or that are a bare registry, get no wildcard forms.
/// The host is expected in lowercase.
#[derive(Debug, Clone)]
pub struct DomainSplitter<'a> {
    host: &'a str,
    cursor: usize,
    /// Index of the dot in front of the registry, if wildcard forms exist.
    wildcard_end: Option<usize>,
    phase: Phase,
}

impl<'a> DomainSplitter<'a> {
    pub fn new(host: &'a str) -> Self {
        let host = host.trim_end_matches('.');
        let wildcard_end = registry(host)
            .filter(|reg| reg.len() < host.len())
            .map(|reg| host.len() - reg.len() - 1);
        let phase = if host.is_empty() { Phase::Done } else { Phase::Hosts };
        Self {
            host,
            cursor: 0,
            wildcard_end,
            phase,
        }
    }

    fn next_label(&self, limit: usize) -> Option<usize> {
        self.host[self.cursor..limit].find('.').map(|dot| self.cursor + dot + 1)
    }
}

impl<'a> Iterator for DomainSplitter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        match self.phase {
            Phase::Hosts => {
                let item = &self.host[self.cursor..];
                match self.next_label(self.host.len()) {
                    Some(next) if next < self.host.len() => self.cursor = next,
                    _ => {
                        self.cursor = 0;
                        self.phase = if self.wildcard_end.is_some() {
                            Phase::Wildcards
                        } else {
                            Phase::Done
                        };
                    }
                }
                Some(item)
            }
            Phase::Wildcards => {
                let end = self.wildcard_end?;
                let item = &self.host[self.cursor..=end];
                match self.next_label(end) {
                    Some(next) => self.cursor = next,
                    None => self.phase = Phase::Done,
                }
                Some(item)
            }
            Phase::Done => None,
        }
    }
}
