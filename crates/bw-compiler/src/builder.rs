use std::collections::{BTreeMap, HashMap};

use bw_core::hash::{crc32_update, hash_key, murmur3_32};
use bw_core::snapshot::{
    align_offset, content_filter, domain_lists, header, header_flags, index_dir_entry, index_slot, metadata,
    section_entry, snippet_call, snippet_filter, url_filter, url_filter_flags, IndexId, SectionId,
    CONTENT_FILTER_SIZE, FLX_MAGIC, FLX_VERSION, HEADER_SIZE, INDEX_DIR_ENTRY_SIZE, INDEX_SLOT_SIZE, NO_LISTS,
    SECTION_ENTRY_SIZE, SNIPPET_CALL_SIZE, SNIPPET_FILTER_SIZE, STR_REF_SIZE, URL_FILTER_SIZE,
};
use bw_core::types::{SnippetCall, SpecialFilterType};

use crate::metadata::Metadata;
use crate::parser::{Category, ContentFilter, ContentFilterKind, DomainSet, FilterRecord, SnippetFilter, UrlFilter};

const BUILD_ID_SEED: u32 = 0x464c_5831;

/// Per-kind record counts of a finished index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub url_filters: u32,
    pub content_filters: u32,
    pub snippet_filters: u32,
}

/// Accumulates filter records and serialises them into one FLX index.
///
/// Records are written in the order they are added; filter ids are their
/// position in the respective record table, so posting lists come out
/// ascending without sorting.
#[derive(Default)]
pub struct IndexBuilder {
    strings: StringPool,
    lists: DomainListPool,
    url_filters: Vec<u8>,
    content_filters: Vec<u8>,
    snippet_filters: Vec<u8>,
    snippet_calls: Vec<u8>,
    snippet_args: Vec<u8>,
    stats: BuildStats,
    call_count: u32,
    arg_count: u32,
    indexes: BTreeMap<IndexId, BTreeMap<String, Vec<u32>>>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn add(&mut self, record: &FilterRecord) {
        match record {
            FilterRecord::Url(filter) => self.add_url_filter(filter),
            FilterRecord::Content(filter) => self.add_content_filter(filter),
            FilterRecord::Snippet(filter) => self.add_snippet_filter(filter),
        }
    }

    fn post(&mut self, index: IndexId, key: &str, id: u32) {
        self.indexes
            .entry(index)
            .or_default()
            .entry(key.to_owned())
            .or_default()
            .push(id);
    }

    fn post_domains(&mut self, index: IndexId, domains: &DomainSet, id: u32) {
        if domains.include.is_empty() {
            self.post(index, "", id);
            return;
        }
        for domain in &domains.include {
            self.post(index, domain, id);
        }
    }

    fn add_url_filter(&mut self, filter: &UrlFilter) {
        let id = self.stats.url_filters;
        self.stats.url_filters += 1;

        let pattern = self.strings.intern(&filter.regex());
        let payload = self
            .strings
            .intern(filter.csp.as_deref().or(filter.header.as_deref()).unwrap_or(""));
        let lists = self.lists.intern(
            &mut self.strings,
            &filter.domains.include,
            &filter.domains.exclude,
            &filter.sitekeys,
        );

        let mut record = [0u8; URL_FILTER_SIZE];
        write_str_ref(&mut record, url_filter::PATTERN, pattern);
        write_u32_le(&mut record, url_filter::CONTENT_TYPES, filter.content_types.bits());
        record[url_filter::FLAGS] = if filter.match_case { url_filter_flags::MATCH_CASE } else { 0 };
        record[url_filter::THIRD_PARTY] = filter.third_party as u8;
        record[url_filter::REWRITE] = filter.rewrite.map_or(0, |resource| resource as u8);
        write_str_ref(&mut record, url_filter::PAYLOAD, payload);
        write_u32_le(&mut record, url_filter::LISTS, lists);
        self.url_filters.extend_from_slice(&record);

        let keyword = filter.keyword();
        let allowing = filter.category == Category::Allowing;
        let pick = |block: IndexId, allow: IndexId| if allowing { allow } else { block };

        if filter.header.is_some() {
            self.post(pick(IndexId::UrlHeaderBlock, IndexId::UrlHeaderAllow), &keyword, id);
            return;
        }
        if filter.popup {
            self.post(pick(IndexId::UrlPopupBlock, IndexId::UrlPopupAllow), &keyword, id);
        }
        if filter.csp.is_some() {
            self.post(pick(IndexId::UrlCspBlock, IndexId::UrlCspAllow), &keyword, id);
        }
        if filter.rewrite.is_some() {
            self.post(pick(IndexId::UrlRewriteBlock, IndexId::UrlRewriteAllow), &keyword, id);
        }
        if filter.subresource {
            self.post(pick(IndexId::UrlSubresourceBlock, IndexId::UrlSubresourceAllow), &keyword, id);
        }
        for special in &filter.special_types {
            let index = match special {
                SpecialFilterType::Document => IndexId::UrlDocumentAllow,
                SpecialFilterType::Elemhide => IndexId::UrlElemhideAllow,
                SpecialFilterType::Genericblock => IndexId::UrlGenericblockAllow,
                SpecialFilterType::Generichide => IndexId::UrlGenerichideAllow,
            };
            self.post(index, &keyword, id);
        }
    }

    fn add_content_filter(&mut self, filter: &ContentFilter) {
        let id = self.stats.content_filters;
        self.stats.content_filters += 1;

        let selector = self.strings.intern(&filter.selector);
        let css = self.strings.intern(&filter.css);
        let lists = self
            .lists
            .intern(&mut self.strings, &filter.domains.include, &filter.domains.exclude, &[]);

        let mut record = [0u8; CONTENT_FILTER_SIZE];
        write_str_ref(&mut record, content_filter::SELECTOR, selector);
        write_u32_le(&mut record, content_filter::LISTS, lists);
        write_str_ref(&mut record, content_filter::CSS, css);
        self.content_filters.extend_from_slice(&record);

        let index = match filter.kind {
            ContentFilterKind::ElemHide => IndexId::Elemhide,
            ContentFilterKind::ElemHideException => IndexId::ElemhideException,
            ContentFilterKind::ElemHideEmulation => IndexId::ElemhideEmulation,
            ContentFilterKind::Remove => IndexId::Remove,
            ContentFilterKind::InlineCss => IndexId::InlineCss,
        };
        self.post_domains(index, &filter.domains, id);
    }

    fn add_snippet_filter(&mut self, filter: &SnippetFilter) {
        let id = self.stats.snippet_filters;
        self.stats.snippet_filters += 1;

        let lists = self
            .lists
            .intern(&mut self.strings, &filter.domains.include, &filter.domains.exclude, &[]);
        let first_call = self.call_count;
        for call in &filter.calls {
            self.add_snippet_call(call);
        }

        let mut record = [0u8; SNIPPET_FILTER_SIZE];
        write_u32_le(&mut record, snippet_filter::LISTS, lists);
        write_u32_le(&mut record, snippet_filter::FIRST_CALL, first_call);
        write_u32_le(&mut record, snippet_filter::CALL_COUNT, filter.calls.len() as u32);
        self.snippet_filters.extend_from_slice(&record);

        self.post_domains(IndexId::Snippet, &filter.domains, id);
    }

    fn add_snippet_call(&mut self, call: &SnippetCall) {
        let command = self.strings.intern(&call.command);
        let first_arg = self.arg_count;
        for argument in &call.arguments {
            let arg = self.strings.intern(argument);
            let mut slot = [0u8; STR_REF_SIZE];
            write_str_ref(&mut slot, 0, arg);
            self.snippet_args.extend_from_slice(&slot);
            self.arg_count += 1;
        }

        let mut record = [0u8; SNIPPET_CALL_SIZE];
        write_str_ref(&mut record, snippet_call::COMMAND, command);
        write_u32_le(&mut record, snippet_call::FIRST_ARG, first_arg);
        write_u32_le(&mut record, snippet_call::ARG_COUNT, call.arguments.len() as u32);
        self.snippet_calls.extend_from_slice(&record);
        self.call_count += 1;
    }

    /// Serialise everything added so far.
    pub fn finish(mut self, metadata: &Metadata, source_url: &str) -> Vec<u8> {
        let (postings, indexes) = build_index_sections(&self.indexes, &mut self.strings);
        let metadata_section = build_metadata_section(metadata, source_url, &mut self.strings);

        let sections = vec![
            SectionData::new(SectionId::StrPool, self.strings.build()),
            SectionData::new(SectionId::Metadata, metadata_section),
            SectionData::new(SectionId::DomainLists, self.lists.data),
            SectionData::new(SectionId::UrlFilters, record_table(self.stats.url_filters, &self.url_filters)),
            SectionData::new(
                SectionId::ContentFilters,
                record_table(self.stats.content_filters, &self.content_filters),
            ),
            SectionData::new(
                SectionId::SnippetFilters,
                record_table(self.stats.snippet_filters, &self.snippet_filters),
            ),
            SectionData::new(SectionId::SnippetCalls, record_table(self.call_count, &self.snippet_calls)),
            SectionData::new(SectionId::SnippetArgs, self.snippet_args),
            SectionData::new(SectionId::Postings, postings),
            SectionData::new(SectionId::Indexes, indexes),
        ];
        assemble(sections)
    }
}

/// Compile a complete record list into an index.
pub fn build_index(records: &[FilterRecord], metadata: &Metadata, source_url: &str) -> Vec<u8> {
    let mut builder = IndexBuilder::new();
    for record in records {
        builder.add(record);
    }
    builder.finish(metadata, source_url)
}

// =============================================================================
// Sections
// =============================================================================

struct SectionData {
    id: SectionId,
    data: Vec<u8>,
    offset: usize,
}

impl SectionData {
    fn new(id: SectionId, data: Vec<u8>) -> Self {
        Self { id, data, offset: 0 }
    }
}

fn assemble(mut sections: Vec<SectionData>) -> Vec<u8> {
    let section_count = sections.len();
    let section_dir_offset = HEADER_SIZE;
    let section_dir_bytes = section_count * SECTION_ENTRY_SIZE;
    let mut data_offset = align_offset(section_dir_offset + section_dir_bytes, 4);

    for section in &mut sections {
        section.offset = data_offset;
        data_offset = align_offset(data_offset + section.data.len(), 4);
    }

    let total_size = data_offset;
    let mut buffer = vec![0u8; total_size];

    buffer[header::MAGIC..header::MAGIC + 4].copy_from_slice(&FLX_MAGIC);
    write_u16_le(&mut buffer, header::VERSION, FLX_VERSION);
    write_u16_le(&mut buffer, header::FLAGS, header_flags::HAS_CRC32);
    write_u32_le(&mut buffer, header::HEADER_BYTES, HEADER_SIZE as u32);
    write_u32_le(&mut buffer, header::SECTION_COUNT, section_count as u32);
    write_u32_le(&mut buffer, header::SECTION_DIR_OFFSET, section_dir_offset as u32);
    write_u32_le(&mut buffer, header::SECTION_DIR_BYTES, section_dir_bytes as u32);

    for (index, section) in sections.iter().enumerate() {
        let entry_offset = section_dir_offset + index * SECTION_ENTRY_SIZE;
        write_u16_le(&mut buffer, entry_offset + section_entry::ID, section.id as u16);
        write_u16_le(&mut buffer, entry_offset + section_entry::FLAGS, 0);
        write_u32_le(&mut buffer, entry_offset + section_entry::OFFSET, section.offset as u32);
        write_u32_le(&mut buffer, entry_offset + section_entry::LENGTH, section.data.len() as u32);

        let end = section.offset + section.data.len();
        buffer[section.offset..end].copy_from_slice(&section.data);
    }

    // The build id identifies the content; the CRC covers it too.
    let build_id = murmur3_32(&buffer[HEADER_SIZE..], BUILD_ID_SEED);
    write_u32_le(&mut buffer, header::BUILD_ID, build_id);
    let crc = crc32_update(0xffff_ffff, &buffer[..header::CRC32]);
    let crc = crc32_update(crc, &buffer[header::CRC32 + 4..]) ^ 0xffff_ffff;
    write_u32_le(&mut buffer, header::CRC32, crc);

    buffer
}

fn record_table(count: u32, records: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + records.len());
    buf.extend_from_slice(&count.to_le_bytes());
    buf.extend_from_slice(records);
    buf
}

fn build_metadata_section(metadata: &Metadata, source_url: &str, strings: &mut StringPool) -> Vec<u8> {
    let mut buf = vec![0u8; metadata::SIZE];
    write_str_ref(&mut buf, metadata::SOURCE_URL, strings.intern(source_url));
    write_str_ref(&mut buf, metadata::TITLE, strings.intern(&metadata.title));
    write_str_ref(&mut buf, metadata::VERSION, strings.intern(&metadata.version));
    write_str_ref(&mut buf, metadata::HOMEPAGE, strings.intern(&metadata.homepage));
    let expires = u32::try_from(metadata.expires.as_secs()).unwrap_or(u32::MAX);
    write_u32_le(&mut buf, metadata::EXPIRES_SECS, expires);
    buf
}

/// Postings and keyed tables for every non-empty sub-index.
fn build_index_sections(
    indexes: &BTreeMap<IndexId, BTreeMap<String, Vec<u32>>>,
    strings: &mut StringPool,
) -> (Vec<u8>, Vec<u8>) {
    let mut postings = Vec::new();
    let mut tables = Vec::with_capacity(indexes.len());

    for (&id, keys) in indexes {
        let mut entries = Vec::with_capacity(keys.len());
        for (key, ids) in keys {
            let offset = postings.len() as u32;
            postings.extend_from_slice(&(ids.len() as u32).to_le_bytes());
            encode_posting_list(&mut postings, ids);
            entries.push((hash_key(key), strings.intern(key), offset));
        }
        tables.push((id, entries.len(), build_hash_table(&entries)));
    }

    let dir_bytes = 4 + tables.len() * INDEX_DIR_ENTRY_SIZE;
    let mut section = vec![0u8; dir_bytes];
    write_u32_le(&mut section, 0, tables.len() as u32);
    for (i, (id, key_count, table)) in tables.into_iter().enumerate() {
        let entry = 4 + i * INDEX_DIR_ENTRY_SIZE;
        let capacity = table.len() / INDEX_SLOT_SIZE;
        write_u16_le(&mut section, entry + index_dir_entry::ID, id as u16);
        write_u32_le(&mut section, entry + index_dir_entry::CAPACITY, capacity as u32);
        write_u32_le(&mut section, entry + index_dir_entry::KEY_COUNT, key_count as u32);
        let table_off = section.len() as u32;
        write_u32_le(&mut section, entry + index_dir_entry::TABLE_OFF, table_off);
        section.extend_from_slice(&table);
    }
    (postings, section)
}

/// Open-addressing table with linear probing. Hash 0 marks an empty slot,
/// which [`hash_key`] never produces.
fn build_hash_table(entries: &[(u32, StrRef, u32)]) -> Vec<u8> {
    let capacity = compute_capacity(entries.len());
    let mut buf = vec![0u8; capacity * INDEX_SLOT_SIZE];
    let mask = capacity - 1;

    for &(hash, key, postings_off) in entries {
        let mut idx = (hash as usize) & mask;
        for _ in 0..capacity {
            let slot = idx * INDEX_SLOT_SIZE;
            if read_u32_le(&buf, slot + index_slot::HASH) == 0 {
                write_u32_le(&mut buf, slot + index_slot::HASH, hash);
                write_str_ref(&mut buf, slot + index_slot::KEY, key);
                write_u32_le(&mut buf, slot + index_slot::POSTINGS_OFF, postings_off);
                break;
            }
            idx = (idx + 1) & mask;
        }
    }

    buf
}

// =============================================================================
// Strings and domain lists
// =============================================================================

/// `(offset, length)` into the string pool payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrRef(u32, u32);

#[derive(Default)]
struct StringPool {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl StringPool {
    fn intern(&mut self, s: &str) -> StrRef {
        if s.is_empty() {
            return StrRef(0, 0);
        }
        if let Some(&offset) = self.index.get(s) {
            return StrRef(offset, s.len() as u32);
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.index.insert(s.to_string(), offset);
        StrRef(offset, s.len() as u32)
    }

    fn build(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }
}

type ListKey = (Vec<String>, Vec<String>, Vec<String>);

/// Shared include/exclude/sitekey blocks; identical lists are stored once.
#[derive(Default)]
struct DomainListPool {
    data: Vec<u8>,
    index: HashMap<ListKey, u32>,
}

impl DomainListPool {
    fn intern(&mut self, strings: &mut StringPool, include: &[String], exclude: &[String], sitekeys: &[String]) -> u32 {
        if include.is_empty() && exclude.is_empty() && sitekeys.is_empty() {
            return NO_LISTS;
        }
        let key = (include.to_vec(), exclude.to_vec(), sitekeys.to_vec());
        if let Some(&offset) = self.index.get(&key) {
            return offset;
        }

        let offset = self.data.len() as u32;
        let mut counts = [0u8; domain_lists::REFS];
        write_u32_le(&mut counts, domain_lists::INCLUDE_COUNT, include.len() as u32);
        write_u32_le(&mut counts, domain_lists::EXCLUDE_COUNT, exclude.len() as u32);
        write_u32_le(&mut counts, domain_lists::SITEKEY_COUNT, sitekeys.len() as u32);
        self.data.extend_from_slice(&counts);
        for value in include.iter().chain(exclude).chain(sitekeys) {
            let mut slot = [0u8; STR_REF_SIZE];
            write_str_ref(&mut slot, 0, strings.intern(value));
            self.data.extend_from_slice(&slot);
        }
        self.index.insert(key, offset);
        offset
    }
}

// =============================================================================
// Encoding helpers
// =============================================================================

fn encode_posting_list(buf: &mut Vec<u8>, ids: &[u32]) {
    let mut prev = 0u32;
    for &id in ids {
        let delta = id.wrapping_sub(prev);
        encode_varint(buf, delta);
        prev = id;
    }
}

fn encode_varint(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        } else {
            buf.push(byte | 0x80);
        }
    }
}

fn compute_capacity(count: usize) -> usize {
    let target = ((count as f64) / 0.7).ceil() as usize;
    let mut capacity = 1usize;
    while capacity < target {
        capacity <<= 1;
    }
    capacity.max(2)
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_u16_le(data: &mut [u8], offset: usize, value: u16) {
    let bytes = value.to_le_bytes();
    data[offset..offset + 2].copy_from_slice(&bytes);
}

fn write_u32_le(data: &mut [u8], offset: usize, value: u32) {
    let bytes = value.to_le_bytes();
    data[offset..offset + 4].copy_from_slice(&bytes);
}

fn write_str_ref(data: &mut [u8], offset: usize, value: StrRef) {
    write_u32_le(data, offset, value.0);
    write_u32_le(data, offset + 4, value.1);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bw_core::snapshot::{decode_varint, Snapshot, SnapshotError};
    use bw_core::types::{ContentType, RewriteResource, ThirdParty};

    use crate::parser::parse_line;

    use super::*;

    fn build(text: &str) -> Vec<u8> {
        let records: Vec<FilterRecord> = text.lines().filter_map(|line| parse_line(line, true)).collect();
        let metadata = Metadata {
            title: "Test list".to_owned(),
            version: "202401010000".to_owned(),
            homepage: "https://example.org/".to_owned(),
            expires: Duration::from_secs(86_400),
            redirect_url: None,
        };
        build_index(&records, &metadata, "https://example.org/list.txt")
    }

    fn ids(snapshot: &Snapshot<'_>, index: IndexId, key: &str) -> Vec<u32> {
        snapshot.index(index).lookup(key).collect()
    }

    #[test]
    fn test_varint_and_postings() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);
        assert_eq!(decode_varint(&buf, 0), (300, 2));

        let mut postings = Vec::new();
        encode_posting_list(&mut postings, &[3, 4, 200]);
        assert_eq!(postings, vec![3, 1, 0xC4, 0x01]);
    }

    #[test]
    fn test_capacity_is_power_of_two() {
        assert_eq!(compute_capacity(0), 2);
        assert_eq!(compute_capacity(1), 2);
        assert_eq!(compute_capacity(7), 16);
        assert!(compute_capacity(1000).is_power_of_two());
    }

    #[test]
    fn test_empty_index_loads() {
        let bytes = build("");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(snapshot.url_filter_count(), 0);
        assert_eq!(snapshot.content_filter_count(), 0);
        for id in IndexId::ALL {
            assert_eq!(snapshot.index(id).key_count(), 0);
        }
        assert_eq!(snapshot.metadata().title, "Test list");
    }

    #[test]
    fn test_metadata_round_trip() {
        let bytes = build("||ads.example.com^");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        let metadata = snapshot.metadata();
        assert_eq!(metadata.source_url, "https://example.org/list.txt");
        assert_eq!(metadata.title, "Test list");
        assert_eq!(metadata.version, "202401010000");
        assert_eq!(metadata.homepage, "https://example.org/");
        assert_eq!(metadata.expires, Duration::from_secs(86_400));
    }

    #[test]
    fn test_url_filter_record() {
        let bytes = build("||ads.example.com^$script,third-party,domain=site.com|~sub.site.com");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(ids(&snapshot, IndexId::UrlSubresourceBlock, "ads"), vec![0]);

        let filter = snapshot.url_filter(0).expect("filter 0");
        assert!(filter.pattern().starts_with('^'));
        assert_eq!(filter.content_types(), ContentType::SCRIPT);
        assert_eq!(filter.third_party(), ThirdParty::ThirdPartyOnly);
        assert!(!filter.match_case());
        assert_eq!(filter.domains().include_domains().collect::<Vec<_>>(), vec!["site.com"]);
        assert_eq!(filter.domains().exclude_domains().collect::<Vec<_>>(), vec!["sub.site.com"]);
        assert!(!filter.domains().is_generic());
    }

    #[test]
    fn test_routing_into_sub_indexes() {
        let bytes = build(
            "||popup.example.com^$popup\n\
             ||tracker.example.com^$csp=script-src 'none'\n\
             @@||example.com^$document,elemhide\n\
             ||cdn.example.com^$rewrite=abp-resource:blank-js,domain=example.com\n\
             ||api.example.com^$header=x-tracking=1\n\
             @@||cdn.example.com^$genericblock,script",
        );
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(ids(&snapshot, IndexId::UrlPopupBlock, "popup"), vec![0]);
        assert_eq!(ids(&snapshot, IndexId::UrlCspBlock, "tracker"), vec![1]);
        assert_eq!(ids(&snapshot, IndexId::UrlDocumentAllow, "example"), vec![2]);
        assert_eq!(ids(&snapshot, IndexId::UrlElemhideAllow, "example"), vec![2]);
        assert_eq!(ids(&snapshot, IndexId::UrlRewriteBlock, "cdn"), vec![3]);
        assert_eq!(ids(&snapshot, IndexId::UrlHeaderBlock, "api"), vec![4]);
        assert_eq!(ids(&snapshot, IndexId::UrlGenericblockAllow, "cdn"), vec![5]);
        assert_eq!(ids(&snapshot, IndexId::UrlSubresourceAllow, "cdn"), vec![5]);

        assert_eq!(snapshot.index(IndexId::UrlSubresourceBlock).key_count(), 0);
        assert_eq!(snapshot.url_filter(1).map(|f| f.payload()), Some("script-src 'none'"));
        assert_eq!(snapshot.url_filter(3).map(|f| f.rewrite()), Some(RewriteResource::BlankJs));
        assert_eq!(snapshot.url_filter(4).map(|f| f.payload()), Some("x-tracking=1"));
    }

    #[test]
    fn test_regex_and_keywordless_filters_use_empty_key() {
        let bytes = build("/banner\\d+/\nad*banner\n||ads.example.com^");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(ids(&snapshot, IndexId::UrlSubresourceBlock, ""), vec![0, 1]);
        assert_eq!(ids(&snapshot, IndexId::UrlSubresourceBlock, "ads"), vec![2]);
        assert_eq!(snapshot.url_filter(0).map(|f| f.pattern()), Some("banner\\d+"));
    }

    #[test]
    fn test_content_filters_keyed_by_include_domain() {
        let bytes = build(
            "##.generic-ad\n\
             example.com,example.*,~sub.example.com##.site-ad\n\
             example.com#@#.site-ad\n\
             example.com#?#div:-abp-has(.ad)\n\
             example.com#?#.x {remove: true;}\n\
             example.com#?#.y {color: red;}",
        );
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(ids(&snapshot, IndexId::Elemhide, ""), vec![0]);
        assert_eq!(ids(&snapshot, IndexId::Elemhide, "example.com"), vec![1]);
        assert_eq!(ids(&snapshot, IndexId::Elemhide, "example."), vec![1]);
        assert_eq!(ids(&snapshot, IndexId::ElemhideException, "example.com"), vec![2]);
        assert_eq!(ids(&snapshot, IndexId::ElemhideEmulation, "example.com"), vec![3]);
        assert_eq!(ids(&snapshot, IndexId::Remove, "example.com"), vec![4]);
        assert_eq!(ids(&snapshot, IndexId::InlineCss, "example.com"), vec![5]);

        let site = snapshot.content_filter(1).expect("filter 1");
        assert_eq!(site.selector(), ".site-ad");
        assert_eq!(site.domains().exclude_domains().collect::<Vec<_>>(), vec!["sub.example.com"]);
        let inline = snapshot.content_filter(5).expect("filter 5");
        assert_eq!((inline.selector(), inline.css()), (".y", "color: red;"));
    }

    #[test]
    fn test_snippet_calls() {
        let bytes = build("a.com,b.com#$#log one; hide 'x y' ''\nb.com#$#trace");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(ids(&snapshot, IndexId::Snippet, "a.com"), vec![0]);
        assert_eq!(ids(&snapshot, IndexId::Snippet, "b.com"), vec![0, 1]);

        let calls: Vec<_> = snapshot.snippet_filter(0).expect("filter 0").calls().collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].command, "log");
        assert_eq!(calls[0].arguments, vec!["one"]);
        assert_eq!(calls[1].arguments, vec!["x y", ""]);

        let second: Vec<_> = snapshot.snippet_filter(1).expect("filter 1").calls().collect();
        assert_eq!(second.len(), 1);
        assert!(second[0].arguments.is_empty());
    }

    #[test]
    fn test_domain_lists_are_shared() {
        let mut strings = StringPool::default();
        let mut pool = DomainListPool::default();
        let include = vec!["a.com".to_owned()];
        let first = pool.intern(&mut strings, &include, &[], &[]);
        let second = pool.intern(&mut strings, &include, &[], &[]);
        let other = pool.intern(&mut strings, &[], &include, &[]);
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(pool.intern(&mut strings, &[], &[], &[]), NO_LISTS);
    }

    #[test]
    fn test_output_is_deterministic() {
        let text = "||a.example.com^\n##.ad-banner\nexample.com###top\n@@||b.example.com^$document";
        assert_eq!(build(text), build(text));
    }

    #[test]
    fn test_corruption_is_detected() {
        let mut bytes = build("||ads.example.com^");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Snapshot::load(&bytes), Err(SnapshotError::Crc32Mismatch { .. })));
    }

    #[test]
    fn test_stats() {
        let mut builder = IndexBuilder::new();
        for line in ["||a.example.com^", "##.ad-banner", "a.com#$#log x"] {
            if let Some(record) = parse_line(line, true) {
                builder.add(&record);
            }
        }
        assert_eq!(
            builder.stats(),
            BuildStats {
                url_filters: 1,
                content_filters: 1,
                snippet_filters: 1,
            }
        );
    }
}
