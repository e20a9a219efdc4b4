//! FLX Compiled Index Format v1 Constants
//!
//! All values are little-endian. Sections start on 4-byte boundaries.
//! String references are `(offset, length)` pairs into the string pool
//! payload (the bytes after the pool's u32 length prefix).

/// Magic bytes: "FLX1"
pub const FLX_MAGIC: [u8; 4] = [0x46, 0x4C, 0x58, 0x31];

/// Current format version
pub const FLX_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Section directory entry size
pub const SECTION_ENTRY_SIZE: usize = 24;

// =============================================================================
// Header Field Offsets
// =============================================================================

/// Header field byte offsets.
pub mod header {
    /// u8[4] magic = "FLX1"
    pub const MAGIC: usize = 0;
    /// u16 version
    pub const VERSION: usize = 4;
    /// u16 flags
    pub const FLAGS: usize = 6;
    /// u32 headerBytes (always 64)
    pub const HEADER_BYTES: usize = 8;
    /// u32 sectionCount
    pub const SECTION_COUNT: usize = 12;
    /// u32 sectionDirOffset
    pub const SECTION_DIR_OFFSET: usize = 16;
    /// u32 sectionDirBytes
    pub const SECTION_DIR_BYTES: usize = 20;
    /// u32 buildId
    pub const BUILD_ID: usize = 24;
    /// u32 crc32 of the whole buffer with this field skipped
    pub const CRC32: usize = 28;
}

/// Header flags.
pub mod header_flags {
    /// Buffer carries a CRC32 checksum
    pub const HAS_CRC32: u16 = 1 << 0;
}

pub mod section_entry {
    /// u16 section id
    pub const ID: usize = 0;
    /// u16 flags (unused)
    pub const FLAGS: usize = 2;
    /// u32 file offset
    pub const OFFSET: usize = 4;
    /// u32 byte length
    pub const LENGTH: usize = 8;
}

// =============================================================================
// Section IDs
// =============================================================================

/// Section type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SectionId {
    /// String pool for all interned strings
    StrPool = 0x0001,
    /// List metadata (fixed layout)
    Metadata = 0x0002,
    /// Include/exclude/sitekey lists shared by filter records
    DomainLists = 0x0003,
    /// Fixed-size URL filter records
    UrlFilters = 0x0004,
    /// Element hiding / emulation / remove / inline-css records
    ContentFilters = 0x0005,
    /// Snippet filter records
    SnippetFilters = 0x0006,
    /// Snippet calls referenced by snippet filters
    SnippetCalls = 0x0007,
    /// Snippet call arguments (string refs)
    SnippetArgs = 0x0008,
    /// Delta-encoded filter id lists
    Postings = 0x0009,
    /// Keyed lookup tables, one per [`IndexId`]
    Indexes = 0x000A,
}

/// Number of known section ids.
pub const SECTION_ID_COUNT: usize = 10;

impl SectionId {
    /// Dense slot for per-section arrays.
    #[inline]
    pub const fn slot(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<u16> for SectionId {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(Self::StrPool),
            0x0002 => Ok(Self::Metadata),
            0x0003 => Ok(Self::DomainLists),
            0x0004 => Ok(Self::UrlFilters),
            0x0005 => Ok(Self::ContentFilters),
            0x0006 => Ok(Self::SnippetFilters),
            0x0007 => Ok(Self::SnippetCalls),
            0x0008 => Ok(Self::SnippetArgs),
            0x0009 => Ok(Self::Postings),
            0x000A => Ok(Self::Indexes),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Index IDs
// =============================================================================

/// What a sub-index's postings point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Keyword-keyed, postings are URL filter ids.
    Url,
    /// Domain-keyed, postings are content filter ids.
    Content,
    /// Domain-keyed, postings are snippet filter ids.
    Snippet,
}

/// Named sub-indexes of a compiled index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum IndexId {
    UrlSubresourceBlock = 1,
    UrlSubresourceAllow = 2,
    UrlPopupBlock = 3,
    UrlPopupAllow = 4,
    UrlDocumentAllow = 5,
    UrlElemhideAllow = 6,
    UrlGenericblockAllow = 7,
    UrlGenerichideAllow = 8,
    UrlCspBlock = 9,
    UrlCspAllow = 10,
    UrlRewriteBlock = 11,
    UrlRewriteAllow = 12,
    UrlHeaderBlock = 13,
    UrlHeaderAllow = 14,
    Elemhide = 15,
    ElemhideException = 16,
    ElemhideEmulation = 17,
    Remove = 18,
    InlineCss = 19,
    Snippet = 20,
}

impl IndexId {
    pub const COUNT: usize = 20;

    pub const ALL: [IndexId; Self::COUNT] = [
        Self::UrlSubresourceBlock,
        Self::UrlSubresourceAllow,
        Self::UrlPopupBlock,
        Self::UrlPopupAllow,
        Self::UrlDocumentAllow,
        Self::UrlElemhideAllow,
        Self::UrlGenericblockAllow,
        Self::UrlGenerichideAllow,
        Self::UrlCspBlock,
        Self::UrlCspAllow,
        Self::UrlRewriteBlock,
        Self::UrlRewriteAllow,
        Self::UrlHeaderBlock,
        Self::UrlHeaderAllow,
        Self::Elemhide,
        Self::ElemhideException,
        Self::ElemhideEmulation,
        Self::Remove,
        Self::InlineCss,
        Self::Snippet,
    ];

    #[inline]
    pub const fn slot(self) -> usize {
        self as usize - 1
    }

    pub const fn kind(self) -> IndexKind {
        match self {
            Self::Elemhide
            | Self::ElemhideException
            | Self::ElemhideEmulation
            | Self::Remove
            | Self::InlineCss => IndexKind::Content,
            Self::Snippet => IndexKind::Snippet,
            _ => IndexKind::Url,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::UrlSubresourceBlock => "url_subresource_block",
            Self::UrlSubresourceAllow => "url_subresource_allow",
            Self::UrlPopupBlock => "url_popup_block",
            Self::UrlPopupAllow => "url_popup_allow",
            Self::UrlDocumentAllow => "url_document_allow",
            Self::UrlElemhideAllow => "url_elemhide_allow",
            Self::UrlGenericblockAllow => "url_genericblock_allow",
            Self::UrlGenerichideAllow => "url_generichide_allow",
            Self::UrlCspBlock => "url_csp_block",
            Self::UrlCspAllow => "url_csp_allow",
            Self::UrlRewriteBlock => "url_rewrite_block",
            Self::UrlRewriteAllow => "url_rewrite_allow",
            Self::UrlHeaderBlock => "url_header_block",
            Self::UrlHeaderAllow => "url_header_allow",
            Self::Elemhide => "elemhide",
            Self::ElemhideException => "elemhide_exception",
            Self::ElemhideEmulation => "elemhide_emulation",
            Self::Remove => "remove",
            Self::InlineCss => "inline_css",
            Self::Snippet => "snippet",
        }
    }
}

impl TryFrom<u16> for IndexId {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1..=20 => Ok(Self::ALL[value as usize - 1]),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Record Layouts
// =============================================================================

/// Size of a string reference (u32 offset, u32 length).
pub const STR_REF_SIZE: usize = 8;

/// Metadata section: four string refs then the expiry.
pub mod metadata {
    pub const SOURCE_URL: usize = 0;
    pub const TITLE: usize = 8;
    pub const VERSION: usize = 16;
    pub const HOMEPAGE: usize = 24;
    /// u32 expiration interval in seconds
    pub const EXPIRES_SECS: usize = 32;
    pub const SIZE: usize = 36;
}

/// Domain list block: three counts followed by that many string refs.
pub mod domain_lists {
    pub const INCLUDE_COUNT: usize = 0;
    pub const EXCLUDE_COUNT: usize = 4;
    pub const SITEKEY_COUNT: usize = 8;
    pub const REFS: usize = 12;
}

/// Record sections start with a u32 record count.
pub const RECORD_TABLE_HEADER_SIZE: usize = 4;

pub const URL_FILTER_SIZE: usize = 32;

pub mod url_filter {
    /// str ref: regex source, empty for match-all
    pub const PATTERN: usize = 0;
    /// u32 [`ContentType`](crate::types::ContentType) bits
    pub const CONTENT_TYPES: usize = 8;
    /// u8 flags
    pub const FLAGS: usize = 12;
    /// u8 [`ThirdParty`](crate::types::ThirdParty)
    pub const THIRD_PARTY: usize = 13;
    /// u8 [`RewriteResource`](crate::types::RewriteResource)
    pub const REWRITE: usize = 14;
    /// str ref: CSP or header payload
    pub const PAYLOAD: usize = 16;
    /// u32 offset into the domain-list section, or [`NO_LISTS`](super::NO_LISTS)
    pub const LISTS: usize = 24;
}

pub mod url_filter_flags {
    pub const MATCH_CASE: u8 = 1 << 0;
}

pub const CONTENT_FILTER_SIZE: usize = 20;

pub mod content_filter {
    /// str ref
    pub const SELECTOR: usize = 0;
    /// u32 domain-list offset
    pub const LISTS: usize = 8;
    /// str ref: inline CSS declarations, empty otherwise
    pub const CSS: usize = 12;
}

pub const SNIPPET_FILTER_SIZE: usize = 12;

pub mod snippet_filter {
    /// u32 domain-list offset
    pub const LISTS: usize = 0;
    /// u32 index of the first call
    pub const FIRST_CALL: usize = 4;
    /// u32 number of calls
    pub const CALL_COUNT: usize = 8;
}

pub const SNIPPET_CALL_SIZE: usize = 16;

pub mod snippet_call {
    /// str ref
    pub const COMMAND: usize = 0;
    /// u32 index of the first argument ref
    pub const FIRST_ARG: usize = 8;
    /// u32 number of arguments
    pub const ARG_COUNT: usize = 12;
}

// =============================================================================
// Index Tables
// =============================================================================

/// Index directory entry: u16 id, u16 reserved, u32 capacity, u32 key count,
/// u32 table offset (relative to the section).
pub const INDEX_DIR_ENTRY_SIZE: usize = 16;

pub mod index_dir_entry {
    pub const ID: usize = 0;
    pub const CAPACITY: usize = 4;
    pub const KEY_COUNT: usize = 8;
    pub const TABLE_OFF: usize = 12;
}

/// Index table slot: u32 key hash (0 = empty), key str ref, u32 postings
/// offset.
pub const INDEX_SLOT_SIZE: usize = 16;

pub mod index_slot {
    pub const HASH: usize = 0;
    pub const KEY: usize = 4;
    pub const POSTINGS_OFF: usize = 12;
}

// =============================================================================
// Sentinels
// =============================================================================

/// Record has no domain or sitekey constraints
pub const NO_LISTS: u32 = 0xFFFF_FFFF;

// =============================================================================
// Helpers
// =============================================================================

/// Align offset to boundary.
#[inline]
pub const fn align_offset(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

/// Validate magic bytes.
#[inline]
pub fn validate_magic(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == FLX_MAGIC
}

/// Read u16 little-endian. Out-of-range reads yield `None`.
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read u32 little-endian. Out-of-range reads yield `None`.
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
