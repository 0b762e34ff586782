//! Lexicon type nodes
//!
//! This module defines the closed set of node kinds a Lexicon schema is built
//! from. Field-level nodes live here; the record, params, and xrpc nodes that
//! compose them live in [`schema`](super::schema).

use super::constraints::*;
use super::formats::StringFormat;
use super::resolution::RefResolver;
use super::schema::{LexParams, LexProcedure, LexQuery, LexRecord, LexSubscription};
use crate::nsid::Nsid;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Discriminator of a type node, i.e. the value of its `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LexKind {
    /// `array`
    Array,
    /// `audio`
    Audio,
    /// `blob`
    Blob,
    /// `boolean`
    Boolean,
    /// `bytes`
    Bytes,
    /// `cid-link`
    CidLink,
    /// `image`
    Image,
    /// `integer`
    Integer,
    /// `number`
    Number,
    /// `object`
    Object,
    /// `params`
    Params,
    /// `procedure`
    Procedure,
    /// `query`
    Query,
    /// `record`
    Record,
    /// `ref`
    Ref,
    /// `string`
    String,
    /// `subscription`
    Subscription,
    /// `token`
    Token,
    /// `union`
    Union,
    /// `unknown`
    Unknown,
    /// `video`
    Video,
}

impl LexKind {
    /// Every registered discriminator
    pub const ALL: [LexKind; 21] = [
        LexKind::Array,
        LexKind::Audio,
        LexKind::Blob,
        LexKind::Boolean,
        LexKind::Bytes,
        LexKind::CidLink,
        LexKind::Image,
        LexKind::Integer,
        LexKind::Number,
        LexKind::Object,
        LexKind::Params,
        LexKind::Procedure,
        LexKind::Query,
        LexKind::Record,
        LexKind::Ref,
        LexKind::String,
        LexKind::Subscription,
        LexKind::Token,
        LexKind::Union,
        LexKind::Unknown,
        LexKind::Video,
    ];

    /// Look up a discriminator string
    pub fn from_discriminator(s: &str) -> Option<Self> {
        LexKind::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Wire name of the discriminator
    pub fn as_str(&self) -> &'static str {
        match self {
            LexKind::Array => "array",
            LexKind::Audio => "audio",
            LexKind::Blob => "blob",
            LexKind::Boolean => "boolean",
            LexKind::Bytes => "bytes",
            LexKind::CidLink => "cid-link",
            LexKind::Image => "image",
            LexKind::Integer => "integer",
            LexKind::Number => "number",
            LexKind::Object => "object",
            LexKind::Params => "params",
            LexKind::Procedure => "procedure",
            LexKind::Query => "query",
            LexKind::Record => "record",
            LexKind::Ref => "ref",
            LexKind::String => "string",
            LexKind::Subscription => "subscription",
            LexKind::Token => "token",
            LexKind::Union => "union",
            LexKind::Unknown => "unknown",
            LexKind::Video => "video",
        }
    }

    /// Scalar kinds: boolean, integer, number, string
    pub fn is_primitive(&self) -> bool {
        matches!(self, LexKind::Boolean | LexKind::Integer | LexKind::Number | LexKind::String)
    }

    /// Blob and its media specialisations
    pub fn is_media(&self) -> bool {
        matches!(self, LexKind::Blob | LexKind::Image | LexKind::Video | LexKind::Audio)
    }

    /// XRPC method kinds
    pub fn is_xrpc(&self) -> bool {
        matches!(self, LexKind::Query | LexKind::Procedure | LexKind::Subscription)
    }
}

impl fmt::Display for LexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexBoolean {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: BooleanConstraints,
}

/// Integer type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexInteger {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: IntegerConstraints,
}

/// Floating point number type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexNumber {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: NumberConstraints,
}

/// String type with optional format and constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexString {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// String format (at-uri, did, handle, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<StringFormat>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: StringConstraints,
}

/// Bytes type (raw binary data)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexBytes {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: BytesConstraints,
}

/// CID link type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexCidLink {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Unknown type (any object value)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexUnknown {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Token type (named symbolic value with no data representation)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexToken {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Blob type (binary data with metadata)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexBlob {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: BlobConstraints,
}

/// Image blob descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexImage {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: ImageConstraints,
}

/// Video blob descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexVideo {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: VideoConstraints,
}

/// Audio blob descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexAudio {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: AudioConstraints,
}

/// Array type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexArray {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Schema for array items
    pub items: Box<LexType>,

    /// Constraints
    #[serde(flatten)]
    pub constraints: ArrayConstraints,
}

/// Object type with properties in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexObject {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Properties map
    pub properties: IndexMap<String, LexType>,

    /// Required property names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    /// Nullable property names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<Vec<String>>,
}

impl LexObject {
    /// Whether a property is listed as required
    pub fn is_required(&self, name: &str) -> bool {
        self.required.as_ref().is_some_and(|r| r.iter().any(|n| n == name))
    }
}

/// Reference to another definition
///
/// Can be local (`#defName`) or external (`nsid` / `nsid#defName`). A ref
/// produced by a repository-backed parser carries a [`RefResolver`] and can be
/// resolved with [`LexRef::resolve`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexRef {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Target identifier exactly as declared
    #[serde(rename = "ref")]
    pub target: String,

    /// Identifier of the document the ref was declared in
    #[serde(skip)]
    pub(crate) base: Option<Nsid>,

    #[serde(skip)]
    pub(crate) resolver: Option<RefResolver>,
}

impl LexRef {
    /// Create a detached reference
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Check if this is a local reference (starts with `#`)
    pub fn is_local(&self) -> bool {
        self.target.starts_with('#')
    }

    /// Identifier of the declaring document, when known
    pub fn base(&self) -> Option<&Nsid> {
        self.base.as_ref()
    }

    /// Whether the ref was built with resolution capability attached
    pub fn is_resolvable(&self) -> bool {
        self.resolver.is_some()
    }
}

impl PartialEq for LexRef {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description && self.target == other.target
    }
}

/// Union of references (open unless `closed` is set)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexRefUnion {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Member references in declaration order
    #[serde(serialize_with = "serialize_union_refs")]
    pub refs: Vec<LexRef>,

    /// Whether the union is closed (only listed refs allowed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,
}

impl LexRefUnion {
    /// Whether values outside the listed refs are rejected
    pub fn is_closed(&self) -> bool {
        self.closed.unwrap_or(false)
    }

    /// Member target strings in declaration order
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.refs.iter().map(|r| r.target.as_str())
    }
}

fn serialize_union_refs<S: Serializer>(refs: &[LexRef], serializer: S) -> Result<S::Ok, S::Error> {
    if refs.is_empty() {
        return serializer.serialize_map(Some(0))?.end();
    }
    let mut seq = serializer.serialize_seq(Some(refs.len()))?;
    for r in refs {
        seq.serialize_element(&r.target)?;
    }
    seq.end()
}

#[derive(Serialize)]
struct Tagged<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    node: &'a T,
}

/// Serialize a bare node struct with its `type` discriminator prepended
pub(crate) fn serialize_tagged<S, T>(
    kind: LexKind,
    node: &T,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    Tagged {
        kind: kind.as_str(),
        node,
    }
    .serialize(serializer)
}

/// All Lexicon type nodes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LexType {
    /// Boolean type
    Boolean(LexBoolean),

    /// Integer type
    Integer(LexInteger),

    /// Floating point number type
    Number(LexNumber),

    /// String type
    String(LexString),

    /// Bytes type
    Bytes(LexBytes),

    /// CID link type
    CidLink(LexCidLink),

    /// Unknown type
    Unknown(LexUnknown),

    /// Token type
    Token(LexToken),

    /// Array type
    Array(LexArray),

    /// Object type
    Object(LexObject),

    /// Params (query string parameters)
    Params(LexParams),

    /// Blob type
    Blob(LexBlob),

    /// Image descriptor
    Image(LexImage),

    /// Video descriptor
    Video(LexVideo),

    /// Audio descriptor
    Audio(LexAudio),

    /// Reference to another definition
    Ref(LexRef),

    /// Union of references
    Union(LexRefUnion),

    /// Record definition
    Record(LexRecord),

    /// Query definition (GET endpoint)
    Query(LexQuery),

    /// Procedure definition (POST endpoint)
    Procedure(LexProcedure),

    /// Subscription definition (event stream)
    Subscription(LexSubscription),
}

impl LexType {
    /// Discriminator of this node
    pub fn kind(&self) -> LexKind {
        match self {
            LexType::Boolean(_) => LexKind::Boolean,
            LexType::Integer(_) => LexKind::Integer,
            LexType::Number(_) => LexKind::Number,
            LexType::String(_) => LexKind::String,
            LexType::Bytes(_) => LexKind::Bytes,
            LexType::CidLink(_) => LexKind::CidLink,
            LexType::Unknown(_) => LexKind::Unknown,
            LexType::Token(_) => LexKind::Token,
            LexType::Array(_) => LexKind::Array,
            LexType::Object(_) => LexKind::Object,
            LexType::Params(_) => LexKind::Params,
            LexType::Blob(_) => LexKind::Blob,
            LexType::Image(_) => LexKind::Image,
            LexType::Video(_) => LexKind::Video,
            LexType::Audio(_) => LexKind::Audio,
            LexType::Ref(_) => LexKind::Ref,
            LexType::Union(_) => LexKind::Union,
            LexType::Record(_) => LexKind::Record,
            LexType::Query(_) => LexKind::Query,
            LexType::Procedure(_) => LexKind::Procedure,
            LexType::Subscription(_) => LexKind::Subscription,
        }
    }

    /// Description of the node, if any
    pub fn description(&self) -> Option<&str> {
        let description = match self {
            LexType::Boolean(n) => &n.description,
            LexType::Integer(n) => &n.description,
            LexType::Number(n) => &n.description,
            LexType::String(n) => &n.description,
            LexType::Bytes(n) => &n.description,
            LexType::CidLink(n) => &n.description,
            LexType::Unknown(n) => &n.description,
            LexType::Token(n) => &n.description,
            LexType::Array(n) => &n.description,
            LexType::Object(n) => &n.description,
            LexType::Params(n) => &n.description,
            LexType::Blob(n) => &n.description,
            LexType::Image(n) => &n.description,
            LexType::Video(n) => &n.description,
            LexType::Audio(n) => &n.description,
            LexType::Ref(n) => &n.description,
            LexType::Union(n) => &n.description,
            LexType::Record(n) => &n.description,
            LexType::Query(n) => &n.description,
            LexType::Procedure(n) => &n.description,
            LexType::Subscription(n) => &n.description,
        };
        description.as_deref()
    }

    /// Borrow as a string node
    pub fn as_string(&self) -> Option<&LexString> {
        match self {
            LexType::String(n) => Some(n),
            _ => None,
        }
    }

    /// Borrow as an object node
    pub fn as_object(&self) -> Option<&LexObject> {
        match self {
            LexType::Object(n) => Some(n),
            _ => None,
        }
    }

    /// Borrow as a ref node
    pub fn as_ref_node(&self) -> Option<&LexRef> {
        match self {
            LexType::Ref(n) => Some(n),
            _ => None,
        }
    }

    /// Borrow as a union node
    pub fn as_union(&self) -> Option<&LexRefUnion> {
        match self {
            LexType::Union(n) => Some(n),
            _ => None,
        }
    }

    /// Borrow as a record node
    pub fn as_record(&self) -> Option<&LexRecord> {
        match self {
            LexType::Record(n) => Some(n),
            _ => None,
        }
    }
}
