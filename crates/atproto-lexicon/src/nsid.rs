//! Namespaced Identifiers (NSIDs)
//!
//! Every Lexicon document is named by an NSID such as `app.bsky.feed.post`,
//! and every definition inside a document by an NSID with a fragment such as
//! `app.bsky.feed.post#replyRef`.
//!
//! Reference: <https://atproto.com/specs/nsid>
//!
//! # Example
//!
//! ```rust
//! use atproto_lexicon::Nsid;
//!
//! let nsid: Nsid = "com.example.foo#bar".parse().unwrap();
//! assert_eq!(nsid.authority(), "example.com");
//! assert_eq!(nsid.name(), "foo");
//! assert_eq!(nsid.def_id(), "bar");
//! assert_eq!(nsid.to_string(), "com.example.foo#bar");
//! ```

use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Definition name implied when an identifier carries no `#fragment`
pub const DEFAULT_DEF_ID: &str = "main";

/// Maximum total NSID length, wildcard excluded
pub const MAX_NSID_LENGTH: usize = 382;

/// Maximum length of a single domain label
pub const MAX_DOMAIN_LABEL_LENGTH: usize = 63;

/// Maximum length of the final (name) label
pub const MAX_NAME_LENGTH: usize = 128;

const MAX_HOSTNAME_LENGTH: usize = 253;

/// Errors raised for malformed identifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NsidError {
    /// The authority part is not a valid hostname
    #[error("Invalid NSID authority '{value}': {reason}")]
    InvalidAuthority {
        /// The declared (reverse-DNS) authority string
        value: String,
        /// Which rule was violated
        reason: String,
    },

    /// The identifier as a whole is malformed
    #[error("Invalid NSID '{value}': {reason}")]
    InvalidSyntax {
        /// The raw identifier string
        value: String,
        /// Which rule was violated
        reason: String,
    },
}

impl NsidError {
    fn syntax(value: &str, reason: impl Into<String>) -> Self {
        NsidError::InvalidSyntax {
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn authority(value: &str, reason: impl Into<String>) -> Self {
        NsidError::InvalidAuthority {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for identifier operations
pub type Result<T> = std::result::Result<T, NsidError>;

/// A parsed Namespaced Identifier
///
/// The authority is held as a forward hostname (`example.com` for
/// `com.example.foo`); rendering reverses it back to the declared order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nsid {
    authority: String,
    name: String,
    def_id: String,
}

impl Nsid {
    /// Parse an identifier of the form `authority.name[#defId]`
    pub fn parse(value: &str) -> Result<Self> {
        let (body, fragment) = match value.split_once('#') {
            Some((body, fragment)) => (body, Some(fragment)),
            None => (value, None),
        };

        let (declared_authority, name) = body
            .rsplit_once('.')
            .ok_or_else(|| NsidError::syntax(value, "missing authority"))?;

        if name.is_empty() {
            return Err(NsidError::syntax(value, "name is empty"));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(NsidError::syntax(
                value,
                format!("name exceeds {} characters", MAX_NAME_LENGTH),
            ));
        }
        if !name.starts_with(|c: char| c.is_ascii_alphabetic())
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(NsidError::syntax(value, format!("invalid name '{}'", name)));
        }

        let authority = parse_authority(declared_authority)?;

        let def_id = match fragment {
            None => DEFAULT_DEF_ID.to_string(),
            Some(f) if is_valid_def_id(f) => f.to_string(),
            Some(f) => {
                return Err(NsidError::syntax(value, format!("invalid fragment '{}'", f)));
            }
        };

        Ok(Self {
            authority,
            name: name.to_string(),
            def_id,
        })
    }

    /// Forward hostname form of the authority (`example.com`)
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Final segment of the identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Definition name, `main` when no fragment was given
    pub fn def_id(&self) -> &str {
        &self.def_id
    }

    /// Whether this identifier points at the `main` definition
    pub fn is_main(&self) -> bool {
        self.def_id == DEFAULT_DEF_ID
    }

    /// Authority labels in declared (reverse-DNS) order
    pub fn authority_labels(&self) -> impl Iterator<Item = &str> {
        self.authority.rsplit('.')
    }

    /// The same identifier pointing at another definition
    pub fn with_def_id(&self, def_id: impl Into<String>) -> Self {
        Self {
            def_id: def_id.into(),
            ..self.clone()
        }
    }

    /// The identifier of the enclosing document (fragment reset to `main`)
    pub fn document_id(&self) -> Self {
        self.with_def_id(DEFAULT_DEF_ID)
    }

    /// Path of the schema file relative to a repository root
    ///
    /// `com.example.foo` maps to `com/example/foo.json`.
    pub fn relative_path(&self) -> PathBuf {
        let mut path: PathBuf = self.authority_labels().collect();
        path.push(format!("{}.json", self.name));
        path
    }
}

impl fmt::Display for Nsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in self.authority_labels() {
            write!(f, "{}.", label)?;
        }
        f.write_str(&self.name)?;
        if !self.is_main() {
            write!(f, "#{}", self.def_id)?;
        }
        Ok(())
    }
}

impl FromStr for Nsid {
    type Err = NsidError;

    fn from_str(s: &str) -> Result<Self> {
        Nsid::parse(s)
    }
}

impl TryFrom<&str> for Nsid {
    type Error = NsidError;

    fn try_from(value: &str) -> Result<Self> {
        Nsid::parse(value)
    }
}

impl Serialize for Nsid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a declared (reverse-DNS) authority into a forward hostname
///
/// ```
/// # use atproto_lexicon::nsid::parse_authority;
/// assert_eq!(parse_authority("com.example").unwrap(), "example.com");
/// ```
pub fn parse_authority(declared: &str) -> Result<String> {
    let hostname = declared.rsplit('.').collect::<Vec<_>>().join(".");
    validate_hostname(&hostname).map_err(|reason| NsidError::authority(declared, reason))?;
    Ok(hostname)
}

fn validate_hostname(hostname: &str) -> std::result::Result<(), String> {
    if hostname.is_empty() {
        return Err("authority is empty".to_string());
    }
    if hostname.len() > MAX_HOSTNAME_LENGTH {
        return Err(format!("hostname exceeds {} characters", MAX_HOSTNAME_LENGTH));
    }
    for label in hostname.split('.') {
        check_label(label, MAX_DOMAIN_LABEL_LENGTH)?;
    }
    Ok(())
}

fn check_label(label: &str, max_len: usize) -> std::result::Result<(), String> {
    if label.is_empty() {
        return Err("empty label".to_string());
    }
    if label.len() > max_len {
        return Err(format!("label '{}' exceeds {} characters", label, max_len));
    }
    if !label.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(format!("label '{}' must start with an ASCII letter", label));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("label '{}' contains invalid characters", label));
    }
    if label.ends_with('-') {
        return Err(format!("label '{}' ends with a hyphen", label));
    }
    Ok(())
}

fn is_valid_def_id(def_id: &str) -> bool {
    !def_id.is_empty()
        && def_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Structural NSID validation, usable on its own (e.g. by the `nsid` string format)
///
/// Accepts an optional trailing `.*` wildcard segment, which is stripped
/// before the remaining rules are applied.
pub fn validate_nsid(value: &str) -> Result<()> {
    let body = value.strip_suffix(".*").unwrap_or(value);

    if body.len() > MAX_NSID_LENGTH {
        return Err(NsidError::syntax(
            value,
            format!("exceeds {} characters", MAX_NSID_LENGTH),
        ));
    }

    let labels: Vec<&str> = body.split('.').collect();
    if labels.len() < 3 {
        return Err(NsidError::syntax(value, "needs at least 3 dot-separated parts"));
    }

    let last = labels.len() - 1;
    for (i, label) in labels.iter().enumerate() {
        let max_len = if i == last { MAX_NAME_LENGTH } else { MAX_DOMAIN_LABEL_LENGTH };
        check_label(label, max_len).map_err(|reason| NsidError::syntax(value, reason))?;
    }

    Ok(())
}

/// Boolean form of [`validate_nsid`]
pub fn is_valid_nsid(value: &str) -> bool {
    validate_nsid(value).is_ok()
}
