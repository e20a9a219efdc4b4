//! Installed subscriptions
//!
//! A [`CompiledIndex`] owns the immutable buffer produced by the compiler
//! and is shared as `Arc<CompiledIndex>` by every subscription and thread
//! reading it. When the last reference goes away the buffer is handed to an
//! optional [`ReleaseHook`] instead of being dropped in place, so storage
//! cleanup can happen elsewhere.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::matcher::Matcher;
use crate::regex_cache::RegexCache;
use crate::snapshot::{Metadata, Snapshot, SnapshotError, SnapshotLayout};
use crate::types::{
    ContentFiltersData, ContentType, FilterCategory, HeaderFilter, InstallationState, SnippetCall,
    SpecialFilterType,
};

// =============================================================================
// Compiled index handle
// =============================================================================

/// Backing storage of a compiled index (heap bytes, a memory map, ...).
pub trait IndexBuffer: Send + Sync {
    fn data(&self) -> &[u8];
}

impl IndexBuffer for Vec<u8> {
    fn data(&self) -> &[u8] {
        self
    }
}

impl IndexBuffer for Box<[u8]> {
    fn data(&self) -> &[u8] {
        self
    }
}

impl IndexBuffer for Arc<[u8]> {
    fn data(&self) -> &[u8] {
        self
    }
}

/// Receives the buffer once no subscription references it any more.
/// Implementations must not block.
pub trait ReleaseHook: Send + Sync {
    fn release(&self, buffer: Box<dyn IndexBuffer>, permanently_remove: bool);
}

/// Validated, immutable compiled index.
pub struct CompiledIndex {
    buffer: Option<Box<dyn IndexBuffer>>,
    layout: SnapshotLayout,
    release_hook: Option<Arc<dyn ReleaseHook>>,
    permanently_remove: AtomicBool,
}

impl CompiledIndex {
    /// Validate `buffer` and take ownership of it.
    pub fn new(buffer: Box<dyn IndexBuffer>) -> Result<Self, SnapshotError> {
        let layout = Snapshot::load(buffer.data())?.layout();
        Ok(Self {
            buffer: Some(buffer),
            layout,
            release_hook: None,
            permanently_remove: AtomicBool::new(false),
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SnapshotError> {
        Self::new(Box::new(bytes))
    }

    pub fn with_release_hook(mut self, hook: Arc<dyn ReleaseHook>) -> Self {
        self.release_hook = Some(hook);
        self
    }

    pub fn data(&self) -> &[u8] {
        self.buffer.as_deref().map(|buffer| buffer.data()).unwrap_or(&[])
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::with_layout(self.data(), self.layout)
    }

    /// Ask the release hook to delete the backing storage too.
    pub fn mark_for_permanent_removal(&self) {
        self.permanently_remove.store(true, Ordering::Release);
    }

    pub fn is_marked_for_permanent_removal(&self) -> bool {
        self.permanently_remove.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CompiledIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledIndex")
            .field("bytes", &self.data().len())
            .field("has_release_hook", &self.release_hook.is_some())
            .field("permanently_remove", &self.is_marked_for_permanent_removal())
            .finish()
    }
}

impl Drop for CompiledIndex {
    fn drop(&mut self) {
        if let (Some(buffer), Some(hook)) = (self.buffer.take(), self.release_hook.take()) {
            hook.release(buffer, *self.permanently_remove.get_mut());
        }
    }
}

// =============================================================================
// Installed subscription
// =============================================================================

/// A compiled index plus installation metadata. Immutable; every query is
/// answered from the shared index and the subscription's regex cache.
pub struct InstalledSubscription {
    index: Arc<CompiledIndex>,
    regex_cache: Arc<RegexCache>,
    installation_state: InstallationState,
    installation_time: SystemTime,
}

impl fmt::Debug for InstalledSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledSubscription")
            .field("source_url", &self.source_url())
            .field("installation_state", &self.installation_state)
            .finish()
    }
}

impl InstalledSubscription {
    pub fn new(
        index: Arc<CompiledIndex>,
        installation_state: InstallationState,
        installation_time: SystemTime,
    ) -> Self {
        Self::with_regex_cache(index, installation_state, installation_time, Arc::default())
    }

    /// Like [`new`](Self::new) with an explicit regex cache, e.g. one with a
    /// different capacity.
    pub fn with_regex_cache(
        index: Arc<CompiledIndex>,
        installation_state: InstallationState,
        installation_time: SystemTime,
        regex_cache: Arc<RegexCache>,
    ) -> Self {
        let subscription = Self {
            index,
            regex_cache,
            installation_state,
            installation_time,
        };
        subscription.matcher().prebuild_patterns();
        log::debug!(
            "Installed {} ({} url filters, {} cached patterns)",
            subscription.source_url(),
            subscription.index.snapshot().url_filter_count(),
            subscription.regex_cache.len()
        );
        subscription
    }

    fn matcher(&self) -> Matcher<'_> {
        Matcher::new(self.index.snapshot(), &self.regex_cache)
    }

    fn metadata(&self) -> Metadata<'_> {
        self.index.snapshot().metadata()
    }

    pub fn compiled_index(&self) -> &Arc<CompiledIndex> {
        &self.index
    }

    pub fn regex_cache(&self) -> &RegexCache {
        &self.regex_cache
    }

    pub fn source_url(&self) -> &str {
        self.metadata().source_url
    }

    pub fn title(&self) -> &str {
        self.metadata().title
    }

    pub fn current_version(&self) -> &str {
        self.metadata().version
    }

    pub fn homepage(&self) -> &str {
        self.metadata().homepage
    }

    pub fn expiration_interval(&self) -> Duration {
        self.metadata().expires
    }

    pub fn installation_state(&self) -> InstallationState {
        self.installation_state
    }

    pub fn installation_time(&self) -> SystemTime {
        self.installation_time
    }

    pub fn mark_for_permanent_removal(&self) {
        self.index.mark_for_permanent_removal();
    }

    pub fn has_url_filter(
        &self,
        url: &str,
        document_domain: &str,
        content_type: ContentType,
        sitekey: &str,
        category: FilterCategory,
    ) -> bool {
        self.matcher()
            .has_url_filter(url, document_domain, content_type, sitekey, category)
    }

    pub fn has_popup_filter(
        &self,
        popup_url: &str,
        opener_domain: &str,
        sitekey: &str,
        category: FilterCategory,
    ) -> bool {
        self.matcher()
            .has_popup_filter(popup_url, opener_domain, sitekey, category)
    }

    pub fn has_special_filter(
        &self,
        filter_type: SpecialFilterType,
        url: &str,
        document_domain: &str,
        sitekey: &str,
    ) -> bool {
        self.matcher()
            .has_special_filter(filter_type, url, document_domain, sitekey)
    }

    pub fn find_csp_filters(&self, url: &str, document_domain: &str, category: FilterCategory) -> Vec<&str> {
        self.matcher().find_csp_filters(url, document_domain, category)
    }

    pub fn find_rewrite_filters(
        &self,
        url: &str,
        document_domain: &str,
        category: FilterCategory,
    ) -> Vec<&'static str> {
        self.matcher().find_rewrite_filters(url, document_domain, category)
    }

    pub fn find_header_filters(
        &self,
        url: &str,
        content_type: ContentType,
        document_domain: &str,
        category: FilterCategory,
    ) -> Vec<HeaderFilter> {
        let source_url = self.source_url();
        self.matcher()
            .find_header_filters(url, content_type, document_domain, category)
            .into_iter()
            .map(|header| HeaderFilter {
                header: header.to_owned(),
                source_url: source_url.to_owned(),
            })
            .collect()
    }

    pub fn get_elemhide_data(&self, url: &str, domain_specific: bool) -> ContentFiltersData {
        self.matcher().elemhide_data(url, domain_specific)
    }

    pub fn get_elemhide_emulation_data(&self, url: &str) -> ContentFiltersData {
        self.matcher().elemhide_emulation_data(url)
    }

    pub fn match_snippets(&self, document_domain: &str) -> Vec<SnippetCall> {
        self.matcher().match_snippets(document_domain)
    }
}
