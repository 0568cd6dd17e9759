//! Payload encodings.
//!
//! An [`Encoding`] is a well-known MIME-like prefix identified by a small
//! integer on the wire, optionally followed by a free-form suffix
//! (`text/plain;charset=utf-8` is `TextPlain` + `;charset=utf-8`).

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Well-known encoding prefixes, serialized as their wire id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum KnownEncoding {
    #[default]
    Empty = 0,
    AppOctetStream = 1,
    AppCustom = 2,
    TextPlain = 3,
    AppProperties = 4,
    AppJson = 5,
    AppSql = 6,
    AppInteger = 7,
    AppFloat = 8,
    AppXml = 9,
    AppXhtmlXml = 10,
    AppXWwwFormUrlencoded = 11,
    TextJson = 12,
    TextHtml = 13,
    TextXml = 14,
    TextCss = 15,
    TextCsv = 16,
    TextJavascript = 17,
    ImageJpeg = 18,
    ImagePng = 19,
    ImageGif = 20,
}

const KNOWN: [KnownEncoding; 21] = [
    KnownEncoding::Empty,
    KnownEncoding::AppOctetStream,
    KnownEncoding::AppCustom,
    KnownEncoding::TextPlain,
    KnownEncoding::AppProperties,
    KnownEncoding::AppJson,
    KnownEncoding::AppSql,
    KnownEncoding::AppInteger,
    KnownEncoding::AppFloat,
    KnownEncoding::AppXml,
    KnownEncoding::AppXhtmlXml,
    KnownEncoding::AppXWwwFormUrlencoded,
    KnownEncoding::TextJson,
    KnownEncoding::TextHtml,
    KnownEncoding::TextXml,
    KnownEncoding::TextCss,
    KnownEncoding::TextCsv,
    KnownEncoding::TextJavascript,
    KnownEncoding::ImageJpeg,
    KnownEncoding::ImagePng,
    KnownEncoding::ImageGif,
];

impl KnownEncoding {
    /// MIME-like string for this prefix (empty for [`KnownEncoding::Empty`]).
    pub const fn as_str(self) -> &'static str {
        match self {
            KnownEncoding::Empty => "",
            KnownEncoding::AppOctetStream => "application/octet-stream",
            KnownEncoding::AppCustom => "application/custom",
            KnownEncoding::TextPlain => "text/plain",
            KnownEncoding::AppProperties => "application/properties",
            KnownEncoding::AppJson => "application/json",
            KnownEncoding::AppSql => "application/sql",
            KnownEncoding::AppInteger => "application/integer",
            KnownEncoding::AppFloat => "application/float",
            KnownEncoding::AppXml => "application/xml",
            KnownEncoding::AppXhtmlXml => "application/xhtml+xml",
            KnownEncoding::AppXWwwFormUrlencoded => "application/x-www-form-urlencoded",
            KnownEncoding::TextJson => "text/json",
            KnownEncoding::TextHtml => "text/html",
            KnownEncoding::TextXml => "text/xml",
            KnownEncoding::TextCss => "text/css",
            KnownEncoding::TextCsv => "text/csv",
            KnownEncoding::TextJavascript => "text/javascript",
            KnownEncoding::ImageJpeg => "image/jpeg",
            KnownEncoding::ImagePng => "image/png",
            KnownEncoding::ImageGif => "image/gif",
        }
    }

    /// Wire identifier.
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Look a prefix up by wire identifier.
    pub fn from_id(id: u8) -> Option<Self> {
        KNOWN.get(usize::from(id)).copied()
    }
}

/// Content type attached to a published payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Encoding {
    /// Well-known prefix.
    pub prefix: KnownEncoding,
    /// Optional free-form suffix appended to the prefix.
    pub suffix: Option<Arc<str>>,
}

impl Encoding {
    pub const EMPTY: Encoding = Encoding::exact(KnownEncoding::Empty);
    pub const APP_OCTET_STREAM: Encoding = Encoding::exact(KnownEncoding::AppOctetStream);
    pub const APP_CUSTOM: Encoding = Encoding::exact(KnownEncoding::AppCustom);
    pub const TEXT_PLAIN: Encoding = Encoding::exact(KnownEncoding::TextPlain);
    pub const APP_JSON: Encoding = Encoding::exact(KnownEncoding::AppJson);
    pub const APP_INTEGER: Encoding = Encoding::exact(KnownEncoding::AppInteger);
    pub const APP_FLOAT: Encoding = Encoding::exact(KnownEncoding::AppFloat);
    pub const TEXT_JSON: Encoding = Encoding::exact(KnownEncoding::TextJson);

    /// Encoding with a prefix and an optional suffix.
    pub fn new(prefix: KnownEncoding, suffix: Option<&str>) -> Self {
        Self {
            prefix,
            suffix: suffix.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }

    /// Encoding with a prefix and no suffix.
    pub const fn exact(prefix: KnownEncoding) -> Self {
        Self {
            prefix,
            suffix: None,
        }
    }

    /// Replace the suffix.
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix).filter(|s| !s.is_empty()).map(Arc::from);
        self
    }

    /// The suffix, or `""`.
    pub fn suffix(&self) -> &str {
        self.suffix.as_deref().unwrap_or("")
    }
}

impl From<KnownEncoding> for Encoding {
    fn from(prefix: KnownEncoding) -> Self {
        Self::exact(prefix)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix.as_str(), self.suffix())
    }
}

impl FromStr for Encoding {
    type Err = std::convert::Infallible;

    /// Split `s` into the longest matching well-known prefix and a suffix.
    ///
    /// Strings without a known prefix become [`KnownEncoding::Empty`] with
    /// the whole string as suffix, so parsing never fails.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = KNOWN[1..]
            .iter()
            .copied()
            .filter(|k| s.starts_with(k.as_str()))
            .max_by_key(|k| k.as_str().len())
            .unwrap_or(KnownEncoding::Empty);

        Ok(Self::new(prefix, Some(&s[prefix.as_str().len()..])))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_text_plain_display() {
        // ---
        assert_eq!(Encoding::TEXT_PLAIN.to_string(), "text/plain");
        assert_eq!(Encoding::TEXT_PLAIN.prefix.id(), 3);
    }

    #[test]
    fn test_suffix_appended() {
        // ---
        let enc = Encoding::new(KnownEncoding::TextPlain, Some(";charset=utf-8"));
        assert_eq!(enc.to_string(), "text/plain;charset=utf-8");
        assert_eq!(Encoding::new(KnownEncoding::AppJson, Some("")), Encoding::APP_JSON);
    }

    #[test]
    fn test_parse_longest_prefix() {
        // ---
        let enc: Encoding = "application/xhtml+xml".parse().unwrap();
        assert_eq!(enc.prefix, KnownEncoding::AppXhtmlXml);
        assert_eq!(enc.suffix, None);

        let enc: Encoding = "text/plain;charset=utf-8".parse().unwrap();
        assert_eq!(enc.prefix, KnownEncoding::TextPlain);
        assert_eq!(enc.suffix(), ";charset=utf-8");
    }

    #[test]
    fn test_parse_unknown_keeps_string() {
        // ---
        let enc: Encoding = "video/mp4".parse().unwrap();
        assert_eq!(enc.prefix, KnownEncoding::Empty);
        assert_eq!(enc.to_string(), "video/mp4");
    }

    #[test]
    fn test_id_lookup() {
        // ---
        for known in KNOWN {
            assert_eq!(KnownEncoding::from_id(known.id()), Some(known));
        }
        assert_eq!(KnownEncoding::from_id(21), None);
    }

    #[test]
    fn test_serialized_as_wire_id() {
        // ---
        let enc = Encoding::new(KnownEncoding::TextPlain, Some(";charset=utf-8"));
        let json = serde_json::to_string(&enc).unwrap();
        assert_eq!(json, r#"{"prefix":3,"suffix":";charset=utf-8"}"#);
        assert_eq!(serde_json::from_str::<Encoding>(&json).unwrap(), enc);

        assert_eq!(serde_json::to_string(&KnownEncoding::ImageGif).unwrap(), "20");
        assert!(serde_json::from_str::<KnownEncoding>("21").is_err());
    }
}
