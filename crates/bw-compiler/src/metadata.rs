//! Filter list header and `!`-comment metadata.

use std::time::Duration;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Expiration used when a list does not declare one, or declares garbage.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(5 * DAY);

/// Longest expiration a list may request.
pub const MAX_EXPIRATION: Duration = Duration::from_secs(14 * DAY);

const HEADER_PREFIX: &str = "[adblock plus";

/// Metadata read from the head of a filter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub version: String,
    pub homepage: String,
    pub expires: Duration,
    pub redirect_url: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            version: String::new(),
            homepage: String::new(),
            expires: DEFAULT_EXPIRATION,
            redirect_url: None,
        }
    }
}

impl Metadata {
    /// Fold one `! Key: value` comment into the metadata. Unknown keys and
    /// plain comments are ignored.
    pub fn apply_comment(&mut self, line: &str) {
        let Some(body) = line.strip_prefix('!') else {
            return;
        };
        let Some((key, value)) = body.split_once(':') else {
            return;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "title" => self.title = value.to_owned(),
            "version" => self.version = value.to_owned(),
            "homepage" => self.homepage = value.to_owned(),
            "expires" => {
                if let Some(expires) = parse_expires(value) {
                    self.expires = expires;
                }
            }
            "redirect" if !value.is_empty() => self.redirect_url = Some(value.to_owned()),
            _ => {}
        }
    }
}

/// Whether `line` is an `[Adblock Plus x.y]` header.
pub fn is_header(line: &str) -> bool {
    let line = line.trim();
    line.len() >= HEADER_PREFIX.len()
        && line.is_char_boundary(HEADER_PREFIX.len())
        && line[..HEADER_PREFIX.len()].eq_ignore_ascii_case(HEADER_PREFIX)
}

/// Parse `<N> <unit>` where unit is `d`/`days` (default) or `h`/`hours`.
/// The result is clamped to [`MAX_EXPIRATION`]; zero or malformed values
/// yield `None`.
pub fn parse_expires(value: &str) -> Option<Duration> {
    let value = value.trim();
    let digits = value.bytes().take_while(u8::is_ascii_digit).count();
    let amount: u64 = value[..digits].parse().ok()?;
    if amount == 0 {
        return None;
    }

    let unit = value[digits..].trim_start();
    let unit = unit.split(|c: char| !c.is_ascii_alphabetic()).next().unwrap_or("");
    let seconds = match unit.to_ascii_lowercase().as_str() {
        "" | "d" | "day" | "days" => amount.saturating_mul(DAY),
        "h" | "hour" | "hours" => amount.saturating_mul(HOUR),
        _ => return None,
    };
    Some(Duration::from_secs(seconds).min(MAX_EXPIRATION))
}
