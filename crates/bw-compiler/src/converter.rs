//! Filter list to compiled index conversion.
//!
//! [`compile`] drives the whole pipeline: header check, metadata comments,
//! per-line parsing and serialisation. Lines that fail to parse are dropped;
//! only an unreadable stream or a missing header fails the conversion.

use std::io::BufRead;

use serde::Deserialize;

use crate::builder::IndexBuilder;
use crate::metadata::{is_header, Metadata};
use crate::parser::parse_line;

/// Per-list compile options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Recorded in the index; identifies the subscription.
    pub source_url: String,
    /// Allow snippets, `$header` and `#?#` modifiers.
    pub allow_privileged: bool,
    /// Reject input whose first line is not an `[Adblock Plus ...]` header.
    pub require_header: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            allow_privileged: false,
            require_header: true,
        }
    }
}

impl CompileConfig {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Failed to read filter list: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing [Adblock Plus] header")]
    MissingHeader,
}

/// Outcome of a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverterResult {
    /// Serialised compiled index.
    Index(Vec<u8>),
    /// The list moved; fetch this URL instead.
    Redirect(String),
    /// Human-readable reason the list could not be compiled.
    Error(String),
}

impl ConverterResult {
    pub fn index(self) -> Option<Vec<u8>> {
        match self {
            Self::Index(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<Result<ConverterResult, CompileError>> for ConverterResult {
    fn from(result: Result<ConverterResult, CompileError>) -> Self {
        result.unwrap_or_else(|err| {
            log::warn!("Filter list conversion failed: {err}");
            Self::Error(err.to_string())
        })
    }
}

/// Compile filter list text.
pub fn compile(text: &str, config: &CompileConfig) -> ConverterResult {
    compile_reader(text.as_bytes(), config)
}

/// Compile a filter list read line by line from `reader`.
pub fn compile_reader<R: BufRead>(reader: R, config: &CompileConfig) -> ConverterResult {
    try_compile(reader, config).into()
}

/// Read the next raw line into `buf`. Returns `false` at end of stream.
fn next_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    Ok(reader.read_until(b'\n', buf)? > 0)
}

fn try_compile<R: BufRead>(mut reader: R, config: &CompileConfig) -> Result<ConverterResult, CompileError> {
    let mut buf = Vec::new();
    let mut metadata = Metadata::default();
    let mut builder = IndexBuilder::new();
    let mut in_preamble = true;
    let mut saw_content = false;
    let mut total_lines = 0usize;
    let mut line_number = 0usize;

    if config.require_header {
        let has_header = next_line(&mut reader, &mut buf)?
            && std::str::from_utf8(&buf).map_or(false, |line| is_header(line.trim_start_matches('\u{feff}').trim()));
        if !has_header {
            return Err(CompileError::MissingHeader);
        }
        line_number += 1;
    }

    while next_line(&mut reader, &mut buf)? {
        line_number += 1;
        let Ok(line) = std::str::from_utf8(&buf) else {
            log::debug!("Dropping line {line_number}: not valid UTF-8");
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !saw_content && !config.require_header && is_header(line.trim_start_matches('\u{feff}')) {
            saw_content = true;
            continue;
        }
        saw_content = true;

        if line.starts_with('!') {
            if in_preamble {
                metadata.apply_comment(line);
                if let Some(url) = metadata.redirect_url.take() {
                    log::info!("{} redirects to {url}", config.source_url);
                    return Ok(ConverterResult::Redirect(url));
                }
            }
            continue;
        }

        in_preamble = false;
        total_lines += 1;
        if let Some(record) = parse_line(line, config.allow_privileged) {
            builder.add(&record);
        }
    }

    let stats = builder.stats();
    let accepted = (stats.url_filters + stats.content_filters + stats.snippet_filters) as usize;
    log::info!(
        "Compiled {}: {} url, {} content, {} snippet filters ({} of {} lines dropped)",
        config.source_url,
        stats.url_filters,
        stats.content_filters,
        stats.snippet_filters,
        total_lines.saturating_sub(accepted),
        total_lines
    );
    Ok(ConverterResult::Index(builder.finish(&metadata, &config.source_url)))
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read};
    use std::time::Duration;

    use bw_core::snapshot::{IndexId, Snapshot};

    use super::*;

    fn compile_ok(text: &str) -> Vec<u8> {
        compile(text, &CompileConfig::new("https://example.org/list.txt"))
            .index()
            .expect("list should compile")
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let result = compile("||ads.example.com^", &CompileConfig::default());
        assert_eq!(result, ConverterResult::Error("Missing [Adblock Plus] header".to_owned()));
        assert!(matches!(compile("", &CompileConfig::default()), ConverterResult::Error(_)));
    }

    #[test]
    fn test_header_not_required() {
        let config = CompileConfig {
            require_header: false,
            ..CompileConfig::default()
        };
        let bytes = compile("||ads.example.com^", &config).index().expect("list should compile");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(snapshot.url_filter_count(), 1);

        // A header is still tolerated.
        let bytes = compile("[Adblock Plus 2.0]\n||ads.example.com^", &config)
            .index()
            .expect("list should compile");
        assert_eq!(Snapshot::load(&bytes).expect("snapshot should load").url_filter_count(), 1);
    }

    #[test]
    fn test_byte_order_mark_before_header() {
        let bytes = compile_ok("\u{feff}[Adblock Plus 2.0]\n||ads.example.com^");
        assert_eq!(Snapshot::load(&bytes).expect("snapshot should load").url_filter_count(), 1);
    }

    #[test]
    fn test_metadata_is_recorded() {
        let bytes = compile_ok(
            "[Adblock Plus 2.0]\n\
             ! Version: 202108191113\n\
             ! Title: EasyList\n\
             ! Expires: 1 d\n\
             ! Homepage: https://easylist.to/\n\
             ||ads.example.com^\n\
             ! Title: ignored after the first filter",
        );
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        let metadata = snapshot.metadata();
        assert_eq!(metadata.source_url, "https://example.org/list.txt");
        assert_eq!(metadata.title, "EasyList");
        assert_eq!(metadata.version, "202108191113");
        assert_eq!(metadata.homepage, "https://easylist.to/");
        assert_eq!(metadata.expires, Duration::from_secs(86_400));
    }

    #[test]
    fn test_redirect_short_circuits() {
        let result = compile(
            "[Adblock Plus 2.0]\n! Title: Moved\n! Redirect: https://example.com/new.txt\n||ads.example.com^",
            &CompileConfig::default(),
        );
        assert_eq!(result, ConverterResult::Redirect("https://example.com/new.txt".to_owned()));
    }

    #[test]
    fn test_invalid_lines_are_dropped() {
        let bytes = compile_ok("[Adblock Plus 2.0]\n/[/\n||\n$bogus\n||ads.example.com^\n");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(snapshot.url_filter_count(), 1);
        assert_eq!(snapshot.index(IndexId::UrlSubresourceBlock).lookup("ads").count(), 1);
    }

    #[test]
    fn test_privileged_constructs_need_permission() {
        let text = "[Adblock Plus 2.0]\n\
                    example.com#$#log hello\n\
                    ||api.example.com^$header=x-tracking\n\
                    example.com#?#.ad {remove: true;}";

        let bytes = compile_ok(text);
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(snapshot.snippet_filter_count(), 0);
        assert_eq!(snapshot.url_filter_count(), 0);
        assert_eq!(snapshot.content_filter_count(), 0);

        let config = CompileConfig {
            allow_privileged: true,
            ..CompileConfig::new("https://example.org/list.txt")
        };
        let bytes = compile(text, &config).index().expect("list should compile");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(snapshot.snippet_filter_count(), 1);
        assert_eq!(snapshot.url_filter_count(), 1);
        assert_eq!(snapshot.content_filter_count(), 1);
    }

    #[test]
    fn test_invalid_utf8_line_is_dropped() {
        let text: &[u8] = b"[Adblock Plus 2.0]\n||ads.example.com^\n||caf\xe9.example^\n||more.example.com^\n";
        let bytes = compile_reader(text, &CompileConfig::new("https://example.org/list.txt"))
            .index()
            .expect("list should compile");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(snapshot.url_filter_count(), 2);
        assert_eq!(snapshot.index(IndexId::UrlSubresourceBlock).lookup("more").count(), 1);
    }

    #[test]
    fn test_invalid_utf8_header_is_missing_header() {
        let text: &[u8] = b"[Adblock Plus \xff]\n||ads.example.com^\n";
        let result = compile_reader(text, &CompileConfig::default());
        assert_eq!(result, ConverterResult::Error("Missing [Adblock Plus] header".to_owned()));
    }

    #[test]
    fn test_crlf_line_endings() {
        let bytes = compile_ok("[Adblock Plus 2.0]\r\n! Title: Windows\r\n||ads.example.com^\r\n");
        let snapshot = Snapshot::load(&bytes).expect("snapshot should load");
        assert_eq!(snapshot.metadata().title, "Windows");
        assert_eq!(snapshot.url_filter_count(), 1);
    }

    #[test]
    fn test_unreadable_stream() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
            }
        }

        let result = compile_reader(io::BufReader::new(Broken), &CompileConfig::default());
        match result {
            ConverterResult::Error(message) => assert!(message.contains("disk on fire")),
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn test_config_from_json() {
        let config: CompileConfig =
            serde_json::from_str(r#"{"source_url": "https://example.org/list.txt", "allow_privileged": true}"#)
                .expect("config should parse");
        assert_eq!(config.source_url, "https://example.org/list.txt");
        assert!(config.allow_privileged);
        assert!(config.require_header);
    }
}
