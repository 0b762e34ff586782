//! String formats recognised on `string` type nodes
//!
//! Reference: <https://atproto.com/specs/lexicon#string-formats>

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic format of a `string` node
///
/// The format names a syntax checker supplied by a
/// [`FormatValidator`](super::validation::FormatValidator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    /// DID or handle
    AtIdentifier,
    /// `at://` URI
    AtUri,
    /// Content identifier
    Cid,
    /// RFC 3339 datetime with timezone
    Datetime,
    /// Decentralized identifier (`did:method:id`)
    Did,
    /// Domain-name handle
    Handle,
    /// Namespaced identifier
    Nsid,
    /// Timestamp identifier
    Tid,
    /// Repository record key
    RecordKey,
    /// Generic RFC 3986 URI
    Uri,
    /// BCP 47 language tag
    Language,
}

impl StringFormat {
    /// Every recognised format
    pub const ALL: [StringFormat; 11] = [
        StringFormat::AtIdentifier,
        StringFormat::AtUri,
        StringFormat::Cid,
        StringFormat::Datetime,
        StringFormat::Did,
        StringFormat::Handle,
        StringFormat::Nsid,
        StringFormat::Tid,
        StringFormat::RecordKey,
        StringFormat::Uri,
        StringFormat::Language,
    ];

    /// Wire name of the format
    pub fn as_str(&self) -> &'static str {
        match self {
            StringFormat::AtIdentifier => "at-identifier",
            StringFormat::AtUri => "at-uri",
            StringFormat::Cid => "cid",
            StringFormat::Datetime => "datetime",
            StringFormat::Did => "did",
            StringFormat::Handle => "handle",
            StringFormat::Nsid => "nsid",
            StringFormat::Tid => "tid",
            StringFormat::RecordKey => "record-key",
            StringFormat::Uri => "uri",
            StringFormat::Language => "language",
        }
    }
}

impl FromStr for StringFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StringFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| format!("unknown string format '{}'", s))
    }
}

impl fmt::Display for StringFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!("at-uri".parse::<StringFormat>(), Ok(StringFormat::AtUri));
        assert_eq!("record-key".parse::<StringFormat>(), Ok(StringFormat::RecordKey));
        assert!("bogus".parse::<StringFormat>().is_err());
    }

    #[test]
    fn test_wire_names_match_serde() {
        for format in StringFormat::ALL {
            let json = serde_json::to_string(&format).unwrap();
            assert_eq!(json, format!("\"{}\"", format));
            assert_eq!(format.as_str().parse::<StringFormat>(), Ok(format));
        }
    }
}
