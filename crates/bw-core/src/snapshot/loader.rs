//! Zero-copy FLX Compiled Index Loader

use std::time::Duration;

use super::format::*;
use crate::hash::{crc32_update, hash_key};
use crate::types::{ContentType, RewriteResource, SnippetCall, ThirdParty};

/// Error type for snapshot loading.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Invalid magic bytes")]
    InvalidMagic,
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),
    #[error("CRC32 mismatch: stored={stored:#010x}, computed={computed:#010x}")]
    Crc32Mismatch { stored: u32, computed: u32 },
    #[error("Invalid section: {0}")]
    InvalidSection(String),
    #[error("Data too short")]
    DataTooShort,
}

/// Section placement inside the buffer.
#[derive(Debug, Clone, Copy)]
struct SectionInfo {
    offset: usize,
    length: usize,
}

/// Placement of one keyed table inside the index section.
#[derive(Debug, Clone, Copy, Default)]
struct IndexTableInfo {
    table_offset: usize,
    capacity: usize,
    key_count: usize,
}

/// Offsets recovered by [`Snapshot::load`]. Holding on to a layout lets an
/// owner of the buffer re-create views without validating again.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotLayout {
    version: u16,
    flags: u16,
    build_id: u32,
    sections: [Option<SectionInfo>; SECTION_ID_COUNT],
    indexes: [IndexTableInfo; IndexId::COUNT],
}

/// Zero-copy view over a compiled index buffer.
///
/// Loading validates the header, the checksum and every section and table
/// bound. Record accessors still use checked reads and treat anything out of
/// range as absent.
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    data: &'a [u8],
    layout: SnapshotLayout,
}

impl std::fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("bytes", &self.data.len())
            .field("version", &self.layout.version)
            .field("build_id", &self.layout.build_id)
            .finish()
    }
}

impl<'a> Snapshot<'a> {
    /// Load a snapshot from bytes.
    pub fn load(data: &'a [u8]) -> Result<Self, SnapshotError> {
        if data.len() < HEADER_SIZE {
            return Err(SnapshotError::DataTooShort);
        }

        if !validate_magic(data) {
            return Err(SnapshotError::InvalidMagic);
        }

        let header_u16 = |offset| read_u16_le(data, offset).ok_or(SnapshotError::DataTooShort);
        let header_u32 = |offset| read_u32_le(data, offset).ok_or(SnapshotError::DataTooShort);

        let version = header_u16(header::VERSION)?;
        if version != FLX_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }

        let flags = header_u16(header::FLAGS)?;
        let section_count = header_u32(header::SECTION_COUNT)? as usize;
        let section_dir_offset = header_u32(header::SECTION_DIR_OFFSET)? as usize;
        let build_id = header_u32(header::BUILD_ID)?;

        if flags & header_flags::HAS_CRC32 != 0 {
            let stored = header_u32(header::CRC32)?;
            // Checksum everything except the CRC field itself.
            let crc = crc32_update(0xffff_ffff, &data[..header::CRC32]);
            let computed = crc32_update(crc, &data[header::CRC32 + 4..]) ^ 0xffff_ffff;
            if stored != computed {
                return Err(SnapshotError::Crc32Mismatch { stored, computed });
            }
        }

        let dir_end = section_count
            .checked_mul(SECTION_ENTRY_SIZE)
            .and_then(|bytes| bytes.checked_add(section_dir_offset))
            .filter(|&end| end <= data.len())
            .ok_or_else(|| SnapshotError::InvalidSection("section directory out of bounds".into()))?;

        let mut sections = [None; SECTION_ID_COUNT];
        for entry_offset in (section_dir_offset..dir_end).step_by(SECTION_ENTRY_SIZE) {
            let id_raw = header_u16(entry_offset + section_entry::ID)?;
            let id = match SectionId::try_from(id_raw) {
                Ok(id) => id,
                Err(_) => continue, // Skip unknown sections
            };

            let offset = header_u32(entry_offset + section_entry::OFFSET)? as usize;
            let length = header_u32(entry_offset + section_entry::LENGTH)? as usize;
            if offset.checked_add(length).map_or(true, |end| end > data.len()) {
                return Err(SnapshotError::InvalidSection(format!("{id:?} out of bounds")));
            }
            sections[id.slot()] = Some(SectionInfo { offset, length });
        }

        let mut snapshot = Self {
            data,
            layout: SnapshotLayout {
                version,
                flags,
                build_id,
                sections,
                indexes: [IndexTableInfo::default(); IndexId::COUNT],
            },
        };
        snapshot.layout.indexes = snapshot.parse_index_directory()?;
        Ok(snapshot)
    }

    /// Re-create a view over a buffer that was already loaded with `layout`.
    ///
    /// `data` must be the same bytes the layout came from.
    pub fn with_layout(data: &'a [u8], layout: SnapshotLayout) -> Self {
        Self { data, layout }
    }

    pub fn layout(&self) -> SnapshotLayout {
        self.layout
    }

    pub fn version(&self) -> u16 {
        self.layout.version
    }

    pub fn flags(&self) -> u16 {
        self.layout.flags
    }

    pub fn build_id(&self) -> u32 {
        self.layout.build_id
    }

    fn parse_index_directory(&self) -> Result<[IndexTableInfo; IndexId::COUNT], SnapshotError> {
        let mut tables = [IndexTableInfo::default(); IndexId::COUNT];
        let section = self.section(SectionId::Indexes);
        if section.is_empty() {
            return Ok(tables);
        }

        let invalid = |what: &str| SnapshotError::InvalidSection(format!("Indexes: {what}"));
        let count = read_u32_le(section, 0).ok_or_else(|| invalid("missing count"))? as usize;

        for i in 0..count {
            let entry = 4 + i * INDEX_DIR_ENTRY_SIZE;
            let read = |field| read_u32_le(section, entry + field).ok_or_else(|| invalid("truncated directory"));
            let id_raw = read_u16_le(section, entry + index_dir_entry::ID)
                .ok_or_else(|| invalid("truncated directory"))?;
            let capacity = read(index_dir_entry::CAPACITY)? as usize;
            let key_count = read(index_dir_entry::KEY_COUNT)? as usize;
            let table_offset = read(index_dir_entry::TABLE_OFF)? as usize;

            let Ok(id) = IndexId::try_from(id_raw) else {
                continue;
            };
            if capacity != 0 && !capacity.is_power_of_two() {
                return Err(invalid("capacity is not a power of two"));
            }
            let in_bounds = capacity
                .checked_mul(INDEX_SLOT_SIZE)
                .and_then(|bytes| bytes.checked_add(table_offset))
                .map_or(false, |end| end <= section.len());
            if !in_bounds || key_count > capacity {
                return Err(invalid(id.name()));
            }
            tables[id.slot()] = IndexTableInfo {
                table_offset,
                capacity,
                key_count,
            };
        }
        Ok(tables)
    }

    /// Total size of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn section_count(&self) -> usize {
        self.layout.sections.iter().flatten().count()
    }

    /// Bytes of a section; empty when the section is absent.
    pub fn section(&self, id: SectionId) -> &'a [u8] {
        self.layout.sections[id.slot()]
            .and_then(|info| self.data.get(info.offset..info.offset + info.length))
            .unwrap_or(&[])
    }

    fn str_pool(&self) -> StrPool<'a> {
        let section = self.section(SectionId::StrPool);
        let len = read_u32_le(section, 0).unwrap_or(0) as usize;
        StrPool(section.get(4..4 + len).unwrap_or(&[]))
    }

    fn record_table(&self, id: SectionId, record_size: usize) -> RecordTable<'a> {
        let section = self.section(id);
        let count = read_u32_le(section, 0).unwrap_or(0) as usize;
        let available = section.len().saturating_sub(RECORD_TABLE_HEADER_SIZE) / record_size;
        RecordTable {
            data: section.get(RECORD_TABLE_HEADER_SIZE..).unwrap_or(&[]),
            count: count.min(available),
            record_size,
        }
    }

    fn lists(&self, offset: u32) -> DomainLists<'a> {
        if offset == NO_LISTS {
            return DomainLists::empty();
        }
        DomainLists::new(self.str_pool(), self.section(SectionId::DomainLists), offset as usize)
    }

    /// List metadata.
    pub fn metadata(&self) -> Metadata<'a> {
        let section = self.section(SectionId::Metadata);
        let pool = self.str_pool();
        Metadata {
            source_url: pool.resolve(section, metadata::SOURCE_URL),
            title: pool.resolve(section, metadata::TITLE),
            version: pool.resolve(section, metadata::VERSION),
            homepage: pool.resolve(section, metadata::HOMEPAGE),
            expires: Duration::from_secs(
                read_u32_le(section, metadata::EXPIRES_SECS).unwrap_or(0) as u64,
            ),
        }
    }

    pub fn url_filter_count(&self) -> usize {
        self.record_table(SectionId::UrlFilters, URL_FILTER_SIZE).count
    }

    pub fn url_filter(&self, id: u32) -> Option<UrlFilterView<'a>> {
        let record = self.record_table(SectionId::UrlFilters, URL_FILTER_SIZE).get(id)?;
        let lists = read_u32_le(record, url_filter::LISTS)?;
        Some(UrlFilterView {
            record,
            pool: self.str_pool(),
            domains: self.lists(lists),
        })
    }

    pub fn content_filter_count(&self) -> usize {
        self.record_table(SectionId::ContentFilters, CONTENT_FILTER_SIZE).count
    }

    pub fn content_filter(&self, id: u32) -> Option<ContentFilterView<'a>> {
        let record = self.record_table(SectionId::ContentFilters, CONTENT_FILTER_SIZE).get(id)?;
        let lists = read_u32_le(record, content_filter::LISTS)?;
        Some(ContentFilterView {
            record,
            pool: self.str_pool(),
            domains: self.lists(lists),
        })
    }

    pub fn snippet_filter_count(&self) -> usize {
        self.record_table(SectionId::SnippetFilters, SNIPPET_FILTER_SIZE).count
    }

    pub fn snippet_filter(&self, id: u32) -> Option<SnippetFilterView<'a>> {
        let record = self.record_table(SectionId::SnippetFilters, SNIPPET_FILTER_SIZE).get(id)?;
        let lists = read_u32_le(record, snippet_filter::LISTS)?;
        let first = read_u32_le(record, snippet_filter::FIRST_CALL)?;
        let count = read_u32_le(record, snippet_filter::CALL_COUNT)?;
        Some(SnippetFilterView {
            domains: self.lists(lists),
            calls: self.record_table(SectionId::SnippetCalls, SNIPPET_CALL_SIZE),
            args: self.section(SectionId::SnippetArgs),
            pool: self.str_pool(),
            first,
            count,
        })
    }

    /// Keyed view of one sub-index. Absent sub-indexes are empty.
    pub fn index(&self, id: IndexId) -> IndexView<'a> {
        let info = self.layout.indexes[id.slot()];
        IndexView {
            id,
            section: self.section(SectionId::Indexes),
            postings: self.section(SectionId::Postings),
            pool: self.str_pool(),
            info,
        }
    }
}

// =============================================================================
// Strings and record tables
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct StrPool<'a>(&'a [u8]);

impl<'a> StrPool<'a> {
    fn get(&self, offset: u32, len: u32) -> Option<&'a str> {
        let start = offset as usize;
        let bytes = self.0.get(start..start.checked_add(len as usize)?)?;
        std::str::from_utf8(bytes).ok()
    }

    /// Resolve the string reference stored at `data[at..at + 8]`; invalid
    /// references read as the empty string.
    fn resolve(&self, data: &[u8], at: usize) -> &'a str {
        read_u32_le(data, at)
            .zip(read_u32_le(data, at + 4))
            .and_then(|(offset, len)| self.get(offset, len))
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy)]
struct RecordTable<'a> {
    data: &'a [u8],
    count: usize,
    record_size: usize,
}

impl<'a> RecordTable<'a> {
    fn get(&self, id: u32) -> Option<&'a [u8]> {
        let id = id as usize;
        if id >= self.count {
            return None;
        }
        let start = id * self.record_size;
        self.data.get(start..start + self.record_size)
    }
}

/// Iterator over a packed run of string references.
#[derive(Debug, Clone)]
pub struct StrList<'a> {
    pool: StrPool<'a>,
    refs: &'a [u8],
}

impl<'a> StrList<'a> {
    fn empty() -> Self {
        Self {
            pool: StrPool(&[]),
            refs: &[],
        }
    }

    /// Whether `value` is in the list (exact comparison).
    pub fn contains(&self, value: &str) -> bool {
        self.clone().any(|item| item == value)
    }
}

impl<'a> Iterator for StrList<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.refs.len() < STR_REF_SIZE {
            return None;
        }
        let item = self.pool.resolve(self.refs, 0);
        self.refs = &self.refs[STR_REF_SIZE..];
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.refs.len() / STR_REF_SIZE;
        (n, Some(n))
    }
}

impl ExactSizeIterator for StrList<'_> {}

/// Include/exclude domains and sitekeys of one filter record.
#[derive(Debug, Clone)]
pub struct DomainLists<'a> {
    include: StrList<'a>,
    exclude: StrList<'a>,
    sitekeys: StrList<'a>,
}

impl<'a> DomainLists<'a> {
    fn empty() -> Self {
        Self {
            include: StrList::empty(),
            exclude: StrList::empty(),
            sitekeys: StrList::empty(),
        }
    }

    fn new(pool: StrPool<'a>, section: &'a [u8], offset: usize) -> Self {
        let count = |field| read_u32_le(section, offset + field).unwrap_or(0) as usize;
        let (include, exclude, sitekeys) = (
            count(domain_lists::INCLUDE_COUNT),
            count(domain_lists::EXCLUDE_COUNT),
            count(domain_lists::SITEKEY_COUNT),
        );

        let mut cursor = offset + domain_lists::REFS;
        let mut take = |n: usize| {
            let start = cursor;
            cursor = cursor.saturating_add(n.saturating_mul(STR_REF_SIZE));
            StrList {
                pool,
                refs: section.get(start..cursor).unwrap_or(&[]),
            }
        };
        Self {
            include: take(include),
            exclude: take(exclude),
            sitekeys: take(sitekeys),
        }
    }

    pub fn include_domains(&self) -> StrList<'a> {
        self.include.clone()
    }

    pub fn exclude_domains(&self) -> StrList<'a> {
        self.exclude.clone()
    }

    pub fn sitekeys(&self) -> StrList<'a> {
        self.sitekeys.clone()
    }

    /// No sitekey and no non-blank domain constraint.
    pub fn is_generic(&self) -> bool {
        self.sitekeys.len() == 0
            && self.include_domains().all(str::is_empty)
            && self.exclude_domains().all(str::is_empty)
    }
}

// =============================================================================
// Record views
// =============================================================================

/// List metadata stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata<'a> {
    pub source_url: &'a str,
    pub title: &'a str,
    pub version: &'a str,
    pub homepage: &'a str,
    pub expires: Duration,
}

#[derive(Debug, Clone)]
pub struct UrlFilterView<'a> {
    record: &'a [u8],
    pool: StrPool<'a>,
    domains: DomainLists<'a>,
}

impl<'a> UrlFilterView<'a> {
    /// Regex source; empty matches every URL.
    pub fn pattern(&self) -> &'a str {
        self.pool.resolve(self.record, url_filter::PATTERN)
    }

    pub fn match_case(&self) -> bool {
        self.record[url_filter::FLAGS] & url_filter_flags::MATCH_CASE != 0
    }

    pub fn content_types(&self) -> ContentType {
        let bits = read_u32_le(self.record, url_filter::CONTENT_TYPES).unwrap_or(0);
        ContentType::from_bits_truncate(bits)
    }

    pub fn third_party(&self) -> ThirdParty {
        ThirdParty::try_from(self.record[url_filter::THIRD_PARTY]).unwrap_or_default()
    }

    pub fn rewrite(&self) -> RewriteResource {
        RewriteResource::try_from(self.record[url_filter::REWRITE]).unwrap_or(RewriteResource::Unknown)
    }

    /// CSP or header payload, empty when the filter carries none.
    pub fn payload(&self) -> &'a str {
        self.pool.resolve(self.record, url_filter::PAYLOAD)
    }

    pub fn domains(&self) -> &DomainLists<'a> {
        &self.domains
    }
}

#[derive(Debug, Clone)]
pub struct ContentFilterView<'a> {
    record: &'a [u8],
    pool: StrPool<'a>,
    domains: DomainLists<'a>,
}

impl<'a> ContentFilterView<'a> {
    pub fn selector(&self) -> &'a str {
        self.pool.resolve(self.record, content_filter::SELECTOR)
    }

    /// Inline CSS declarations; empty for everything but inline-css filters.
    pub fn css(&self) -> &'a str {
        self.pool.resolve(self.record, content_filter::CSS)
    }

    pub fn domains(&self) -> &DomainLists<'a> {
        &self.domains
    }
}

#[derive(Debug, Clone)]
pub struct SnippetFilterView<'a> {
    domains: DomainLists<'a>,
    calls: RecordTable<'a>,
    args: &'a [u8],
    pool: StrPool<'a>,
    first: u32,
    count: u32,
}

impl<'a> SnippetFilterView<'a> {
    pub fn domains(&self) -> &DomainLists<'a> {
        &self.domains
    }

    /// Calls in script order.
    pub fn calls(&self) -> impl Iterator<Item = SnippetCall> + 'a {
        let (calls, args, pool) = (self.calls, self.args, self.pool);
        (self.first..self.first.saturating_add(self.count)).filter_map(move |id| {
            let record = calls.get(id)?;
            let first_arg = read_u32_le(record, snippet_call::FIRST_ARG)? as usize;
            let arg_count = read_u32_le(record, snippet_call::ARG_COUNT)? as usize;
            let start = first_arg.checked_mul(STR_REF_SIZE)?;
            let end = start.checked_add(arg_count.checked_mul(STR_REF_SIZE)?)?;
            let arguments = StrList {
                pool,
                refs: args.get(start..end)?,
            };
            Some(SnippetCall {
                command: pool.resolve(record, snippet_call::COMMAND).to_owned(),
                arguments: arguments.map(str::to_owned).collect(),
            })
        })
    }
}

// =============================================================================
// Keyed index tables
// =============================================================================

/// Zero-copy view into one keyed sub-index.
#[derive(Debug, Clone)]
pub struct IndexView<'a> {
    id: IndexId,
    section: &'a [u8],
    postings: &'a [u8],
    pool: StrPool<'a>,
    info: IndexTableInfo,
}

impl<'a> IndexView<'a> {
    pub fn id(&self) -> IndexId {
        self.id
    }

    pub fn key_count(&self) -> usize {
        self.info.key_count
    }

    fn slot(&self, idx: usize) -> &'a [u8] {
        let start = self.info.table_offset + idx * INDEX_SLOT_SIZE;
        self.section.get(start..start + INDEX_SLOT_SIZE).unwrap_or(&[])
    }

    fn postings_at(&self, slot: &[u8]) -> Postings<'a> {
        read_u32_le(slot, index_slot::POSTINGS_OFF)
            .map(|offset| Postings::new(self.postings, offset as usize))
            .unwrap_or_default()
    }

    /// Filter ids stored under `key`, in build order.
    pub fn lookup(&self, key: &str) -> Postings<'a> {
        if self.info.capacity == 0 {
            return Postings::default();
        }

        let hash = hash_key(key);
        let mask = self.info.capacity - 1;
        let mut idx = (hash as usize) & mask;

        for _ in 0..self.info.capacity {
            let slot = self.slot(idx);
            let stored = read_u32_le(slot, index_slot::HASH).unwrap_or(0);

            // Empty slot
            if stored == 0 {
                break;
            }

            // Hash collisions are settled by the stored key.
            if stored == hash && self.pool.resolve(slot, index_slot::KEY) == key {
                return self.postings_at(slot);
            }

            idx = (idx + 1) & mask;
        }

        Postings::default()
    }

    /// Every `(key, postings)` pair, in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&'a str, Postings<'a>)> + '_ {
        (0..self.info.capacity).filter_map(move |idx| {
            let slot = self.slot(idx);
            if read_u32_le(slot, index_slot::HASH).unwrap_or(0) == 0 {
                return None;
            }
            Some((self.pool.resolve(slot, index_slot::KEY), self.postings_at(slot)))
        })
    }
}

// =============================================================================
// Varint Decoder
// =============================================================================

/// Decode a single unsigned LEB128 varint.
/// Returns (value, bytes_read).
pub fn decode_varint(data: &[u8], offset: usize) -> (u32, usize) {
    let mut result: u32 = 0;
    let mut shift = 0;
    let mut bytes_read = 0;

    while offset + bytes_read < data.len() {
        let byte = data[offset + bytes_read];
        bytes_read += 1;

        result |= ((byte & 0x7f) as u32) << shift;

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
        if shift > 28 {
            break; // Overflow protection
        }
    }

    (result, bytes_read)
}

/// Lazily decoded, delta-encoded posting list (`u32` count, then varints).
#[derive(Debug, Clone, Default)]
pub struct Postings<'a> {
    data: &'a [u8],
    pos: usize,
    remaining: usize,
    prev: u32,
}

impl<'a> Postings<'a> {
    fn new(data: &'a [u8], offset: usize) -> Self {
        match read_u32_le(data, offset) {
            Some(count) => Self {
                data,
                pos: offset + 4,
                remaining: count as usize,
                prev: 0,
            },
            None => Self::default(),
        }
    }
}

impl Iterator for Postings<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.remaining == 0 || self.pos >= self.data.len() {
            return None;
        }
        let (delta, bytes_read) = decode_varint(self.data, self.pos);
        self.pos += bytes_read;
        self.remaining -= 1;
        self.prev = self.prev.wrapping_add(delta);
        Some(self.prev)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_only(version: u16) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..4].copy_from_slice(&FLX_MAGIC);
        data[header::VERSION..header::VERSION + 2].copy_from_slice(&version.to_le_bytes());
        data[header::HEADER_BYTES..header::HEADER_BYTES + 4]
            .copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        data[header::SECTION_DIR_OFFSET..header::SECTION_DIR_OFFSET + 4]
            .copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        data
    }

    #[test]
    fn test_rejects_short_and_foreign_buffers() {
        assert!(matches!(Snapshot::load(&[0u8; 10]), Err(SnapshotError::DataTooShort)));
        let mut data = header_only(FLX_VERSION);
        data[0] = b'U';
        assert!(matches!(Snapshot::load(&data), Err(SnapshotError::InvalidMagic)));
        assert!(matches!(
            Snapshot::load(&header_only(7)),
            Err(SnapshotError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_empty_snapshot_answers_nothing() {
        let data = header_only(FLX_VERSION);
        let snapshot = Snapshot::load(&data).expect("snapshot should load");
        assert_eq!(snapshot.section_count(), 0);
        assert_eq!(snapshot.url_filter_count(), 0);
        assert!(snapshot.url_filter(0).is_none());
        assert_eq!(snapshot.index(IndexId::Elemhide).lookup("").count(), 0);
        assert_eq!(snapshot.metadata().title, "");
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut data = header_only(FLX_VERSION);
        data[header::FLAGS..header::FLAGS + 2].copy_from_slice(&header_flags::HAS_CRC32.to_le_bytes());
        data[header::CRC32..header::CRC32 + 4].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        assert!(matches!(
            Snapshot::load(&data),
            Err(SnapshotError::Crc32Mismatch { stored: 0xdead_beef, .. })
        ));
    }

    #[test]
    fn test_section_out_of_bounds() {
        let mut data = header_only(FLX_VERSION);
        data[header::SECTION_COUNT..header::SECTION_COUNT + 4].copy_from_slice(&1u32.to_le_bytes());
        let mut entry = [0u8; SECTION_ENTRY_SIZE];
        entry[..2].copy_from_slice(&(SectionId::StrPool as u16).to_le_bytes());
        entry[4..8].copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        entry[8..12].copy_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&entry);
        assert!(matches!(Snapshot::load(&data), Err(SnapshotError::InvalidSection(_))));
    }

    #[test]
    fn test_postings_decode() {
        // count = 3, deltas 1, 200, 2
        let data = [3u8, 0, 0, 0, 1, 0xc8, 0x01, 2];
        let ids: Vec<u32> = Postings::new(&data, 0).collect();
        assert_eq!(ids, vec![1, 201, 203]);
        assert_eq!(Postings::new(&data, 6).count(), 0);
    }

    #[test]
    fn test_decode_varint() {
        assert_eq!(decode_varint(&[0x00], 0), (0, 1));
        assert_eq!(decode_varint(&[0x7f], 0), (127, 1));
        assert_eq!(decode_varint(&[0x80, 0x01], 0), (128, 2));
        assert_eq!(decode_varint(&[0xff, 0xff, 0xff, 0xff, 0x0f], 0), (u32::MAX, 5));
    }
}
