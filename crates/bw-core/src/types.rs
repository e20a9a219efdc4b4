//! Core type definitions for Blockwise
//!
//! These types map directly to the FLX snapshot binary format and
//! are used throughout the matching engine.

use serde::{Deserialize, Serialize};

// =============================================================================
// Content Types (bit mask stored per URL filter)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask.
    ///
    /// Bit values are stable: they are written into compiled indexes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContentType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;
        const WEBSOCKET = 1 << 7;
        const WEBRTC = 1 << 8;
        const PING = 1 << 10;
        const XMLHTTPREQUEST = 1 << 11;
        const MEDIA = 1 << 14;
        const FONT = 1 << 15;

        /// Every resource type a filter applies to when it names none.
        const DEFAULT = Self::OTHER.bits()
            | Self::SCRIPT.bits()
            | Self::IMAGE.bits()
            | Self::STYLESHEET.bits()
            | Self::OBJECT.bits()
            | Self::SUBDOCUMENT.bits()
            | Self::WEBSOCKET.bits()
            | Self::WEBRTC.bits()
            | Self::PING.bits()
            | Self::XMLHTTPREQUEST.bits()
            | Self::MEDIA.bits()
            | Self::FONT.bits();
    }
}

impl ContentType {
    /// Parse a filter option name (without `~`).
    pub fn from_option(name: &str) -> Option<Self> {
        match name {
            "other" | "xbl" | "dtd" => Some(Self::OTHER),
            "script" => Some(Self::SCRIPT),
            "image" | "background" => Some(Self::IMAGE),
            "stylesheet" => Some(Self::STYLESHEET),
            "object" => Some(Self::OBJECT),
            "subdocument" => Some(Self::SUBDOCUMENT),
            "websocket" => Some(Self::WEBSOCKET),
            "webrtc" => Some(Self::WEBRTC),
            "ping" => Some(Self::PING),
            "xmlhttprequest" => Some(Self::XMLHTTPREQUEST),
            "media" => Some(Self::MEDIA),
            "font" => Some(Self::FONT),
            _ => None,
        }
    }
}

// =============================================================================
// Filter Categories
// =============================================================================

/// Which sub-index a URL query consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterCategory {
    Blocking,
    Allowing,
    /// Blocking, restricted to filters with a domain or sitekey constraint.
    DomainSpecificBlocking,
}

/// Third-party constraint of a URL filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ThirdParty {
    #[default]
    Ignore = 0,
    FirstPartyOnly = 1,
    ThirdPartyOnly = 2,
}

impl TryFrom<u8> for ThirdParty {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ignore),
            1 => Ok(Self::FirstPartyOnly),
            2 => Ok(Self::ThirdPartyOnly),
            _ => Err(()),
        }
    }
}

/// Allow-only filter types that affect a whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialFilterType {
    Document,
    Elemhide,
    Genericblock,
    Generichide,
}

// =============================================================================
// Rewrite Resources
// =============================================================================

/// Named resources a `$rewrite=abp-resource:` filter may redirect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RewriteResource {
    /// Unlisted resource name; the filter never matches.
    Unknown = 0,
    BlankText = 1,
    BlankCss = 2,
    BlankJs = 3,
    BlankHtml = 4,
    BlankMp3 = 5,
    BlankMp4 = 6,
    TransparentGif1x1 = 7,
    TransparentPng2x2 = 8,
    TransparentPng3x2 = 9,
    TransparentPng32x32 = 10,
}

impl RewriteResource {
    pub fn from_name(name: &str) -> Self {
        match name {
            "blank-text" => Self::BlankText,
            "blank-css" => Self::BlankCss,
            "blank-js" => Self::BlankJs,
            "blank-html" => Self::BlankHtml,
            "blank-mp3" => Self::BlankMp3,
            "blank-mp4" => Self::BlankMp4,
            "1x1-transparent-gif" => Self::TransparentGif1x1,
            "2x2-transparent-png" => Self::TransparentPng2x2,
            "3x2-transparent-png" => Self::TransparentPng3x2,
            "32x32-transparent-png" => Self::TransparentPng32x32,
            _ => Self::Unknown,
        }
    }

    /// The `data:` URL substituted for the rewritten request.
    pub fn data_url(self) -> Option<&'static str> {
        match self {
            Self::Unknown => None,
            Self::BlankText => Some("data:text/plain,"),
            Self::BlankCss => Some("data:text/css,"),
            Self::BlankJs => Some("data:application/javascript,"),
            Self::BlankHtml => Some("data:text/html,<!DOCTYPE html><html><head></head><body></body></html>"),
            Self::BlankMp3 => Some("data:audio/mpeg;base64,"),
            Self::BlankMp4 => Some("data:video/mp4;base64,"),
            Self::TransparentGif1x1 => Some("data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7"),
            Self::TransparentPng2x2 => Some("data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAIAAAACCAYAAABytg0kAAAAC0lEQVR42mNgQAcAABIAAeRVjecAAAAASUVORK5CYII="),
            Self::TransparentPng3x2 => Some("data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAMAAAACCAYAAACddGYaAAAAC0lEQVR42mNgwAUAABoAAS+Yl6YAAAAASUVORK5CYII="),
            Self::TransparentPng32x32 => Some("data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAACAAAAAgCAYAAABzenr0AAAAGklEQVR42u3BAQEAAACCIP+vbkhAAQAAAO8GECAAAcm1w7EAAAAASUVORK5CYII="),
        }
    }
}

impl TryFrom<u8> for RewriteResource {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::BlankText),
            2 => Ok(Self::BlankCss),
            3 => Ok(Self::BlankJs),
            4 => Ok(Self::BlankHtml),
            5 => Ok(Self::BlankMp3),
            6 => Ok(Self::BlankMp4),
            7 => Ok(Self::TransparentGif1x1),
            8 => Ok(Self::TransparentPng2x2),
            9 => Ok(Self::TransparentPng3x2),
            10 => Ok(Self::TransparentPng32x32),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Query Results
// =============================================================================

/// A single content-script call: command followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnippetCall {
    pub command: String,
    pub arguments: Vec<String>,
}

/// A header filter that matched a request, with the list it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HeaderFilter {
    pub header: String,
    pub source_url: String,
}

/// Element hiding data for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentFiltersData {
    pub elemhide_selectors: Vec<String>,
    pub elemhide_exceptions: Vec<String>,
    pub remove_selectors: Vec<String>,
    /// (selector, css declarations)
    pub selectors_to_inline_css: Vec<(String, String)>,
}

/// Installation state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallationState {
    Installing,
    Installed,
    Preloaded,
}

/// Outcome of an aggregated blocking decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    /// No blocking filter applies.
    NoMatch,
    /// A blocking filter applies and nothing overrules it.
    Blocked,
    /// A blocking filter applies but an allowing filter overrules it.
    Allowed,
}

/// Result of classifying a request against a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub decision: MatchDecision,
    /// Source URL of the subscription that decided the outcome.
    pub source_url: Option<String>,
}

impl MatchResult {
    pub fn new(decision: MatchDecision, source_url: impl Into<String>) -> Self {
        Self {
            decision,
            source_url: Some(source_url.into()),
        }
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self {
            decision: MatchDecision::NoMatch,
            source_url: None,
        }
    }
}
