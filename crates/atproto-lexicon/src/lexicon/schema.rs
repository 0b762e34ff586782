//! Lexicon schema core structures
//!
//! This module defines the top-level Lexicon document and the definition
//! kinds that compose field-level nodes: records, params, and XRPC methods.

use super::types::{serialize_tagged, LexKind, LexObject, LexType};
use crate::nsid::Nsid;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Lexicon language version accepted by the parser
pub const LEXICON_VERSION: u32 = 1;

/// Top-level Lexicon document
///
/// Reference: <https://atproto.com/specs/lexicon>
///
/// Definitions are shared (`Rc`) so that a resolved reference hands back the
/// very node stored in the document.
///
/// # Example
///
/// ```json
/// {
///   "lexicon": 1,
///   "id": "com.example.getRecord",
///   "description": "Get a record by URI",
///   "defs": {
///     "main": {
///       "type": "query",
///       "parameters": { ... },
///       "output": { ... }
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexiconDoc {
    /// Lexicon language version (always 1)
    pub lexicon: u32,

    /// Identifier of this document
    pub id: Nsid,

    /// Revision number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Named definitions in declaration order
    pub defs: IndexMap<String, Rc<LexType>>,
}

impl LexiconDoc {
    /// Create an empty document
    pub fn new(id: Nsid) -> Self {
        Self {
            lexicon: LEXICON_VERSION,
            id,
            revision: None,
            description: None,
            defs: IndexMap::new(),
        }
    }

    /// Add a definition to the document
    pub fn with_def(mut self, name: impl Into<String>, def: LexType) -> Self {
        self.defs.insert(name.into(), Rc::new(def));
        self
    }

    /// Look up a definition by name
    pub fn def(&self, name: &str) -> Option<&Rc<LexType>> {
        self.defs.get(name)
    }

    /// Get the main definition (if it exists)
    pub fn main_def(&self) -> Option<&Rc<LexType>> {
        self.def(crate::nsid::DEFAULT_DEF_ID)
    }
}

/// Record key pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordKey {
    /// Timestamp identifier
    Tid,
    /// An NSID used as the key
    Nsid,
    /// Any valid record key
    Any,
    /// A single fixed key, e.g. `literal:self`
    Literal(String),
}

impl FromStr for RecordKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tid" => Ok(RecordKey::Tid),
            "nsid" => Ok(RecordKey::Nsid),
            "any" => Ok(RecordKey::Any),
            _ => match s.strip_prefix("literal:") {
                Some(value) if !value.is_empty() => Ok(RecordKey::Literal(value.to_string())),
                _ => Err(format!("unknown record key type '{}'", s)),
            },
        }
    }
}

impl TryFrom<String> for RecordKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Tid => f.write_str("tid"),
            RecordKey::Nsid => f.write_str("nsid"),
            RecordKey::Any => f.write_str("any"),
            RecordKey::Literal(value) => write!(f, "literal:{}", value),
        }
    }
}

fn serialize_object<S: Serializer>(object: &LexObject, serializer: S) -> Result<S::Ok, S::Error> {
    serialize_tagged(LexKind::Object, object, serializer)
}

fn serialize_params<S: Serializer>(
    params: &Option<LexParams>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match params {
        Some(params) => serialize_tagged(LexKind::Params, params, serializer),
        None => serializer.serialize_none(),
    }
}

/// Record definition (storable in a repository)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexRecord {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Record key pattern
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<RecordKey>,

    /// Record schema
    #[serde(serialize_with = "serialize_object")]
    pub record: LexObject,
}

/// Query parameters (HTTP query string params)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexParams {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Properties map (boolean, integer, number, string, unknown, array)
    pub properties: IndexMap<String, LexType>,

    /// Required property names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

/// XRPC input/output body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexXrpcBody {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Encoding (MIME type, e.g. "application/json")
    pub encoding: String,

    /// Schema for the body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Box<LexType>>,
}

/// XRPC subscription message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexXrpcMessage {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Message schema (a union of message types)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Box<LexType>>,
}

/// XRPC error definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexXrpcError {
    /// Error name
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Query definition (HTTP GET endpoint)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexQuery {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Query parameters
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_params")]
    pub parameters: Option<LexParams>,

    /// Output body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<LexXrpcBody>,

    /// Possible errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<LexXrpcError>>,
}

/// Procedure definition (HTTP POST endpoint)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexProcedure {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Query parameters
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_params")]
    pub parameters: Option<LexParams>,

    /// Input body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<LexXrpcBody>,

    /// Output body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<LexXrpcBody>,

    /// Possible errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<LexXrpcError>>,
}

/// Subscription definition (event stream)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LexSubscription {
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Query parameters
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_params")]
    pub parameters: Option<LexParams>,

    /// Message schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<LexXrpcMessage>,

    /// Possible errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<LexXrpcError>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::types::{LexString, LexToken};
    use serde_json::json;

    fn nsid(s: &str) -> Nsid {
        Nsid::parse(s).unwrap()
    }

    #[test]
    fn test_lexicon_doc_new() {
        let doc = LexiconDoc::new(nsid("com.example.test"));
        assert_eq!(doc.lexicon, 1);
        assert_eq!(doc.id.to_string(), "com.example.test");
        assert!(doc.defs.is_empty());
        assert!(doc.main_def().is_none());
    }

    #[test]
    fn test_lexicon_doc_with_def() {
        let doc = LexiconDoc::new(nsid("com.example.test"))
            .with_def("main", LexType::Token(LexToken::default()))
            .with_def("other", LexType::Token(LexToken::default()));

        assert!(matches!(doc.main_def().map(|d| d.as_ref()), Some(LexType::Token(_))));
        assert_eq!(doc.defs.keys().collect::<Vec<_>>(), vec!["main", "other"]);
    }

    #[test]
    fn test_empty_doc_serializes_defs_as_map() {
        let json = serde_json::to_value(LexiconDoc::new(nsid("com.example.test"))).unwrap();
        assert_eq!(json, json!({ "lexicon": 1, "id": "com.example.test", "defs": {} }));
    }

    #[test]
    fn test_record_key_parse() {
        assert_eq!("tid".parse::<RecordKey>(), Ok(RecordKey::Tid));
        assert_eq!("nsid".parse::<RecordKey>(), Ok(RecordKey::Nsid));
        assert_eq!("any".parse::<RecordKey>(), Ok(RecordKey::Any));
        assert_eq!(
            "literal:self".parse::<RecordKey>(),
            Ok(RecordKey::Literal("self".to_string()))
        );
        assert!("literal:".parse::<RecordKey>().is_err());
        assert!("uuid".parse::<RecordKey>().is_err());
        assert_eq!(RecordKey::Literal("self".to_string()).to_string(), "literal:self");
    }

    #[test]
    fn test_record_serializes_inner_object_with_type() {
        let mut properties = IndexMap::new();
        properties.insert("text".to_string(), LexType::String(LexString::default()));

        let record = LexType::Record(LexRecord {
            description: None,
            key: Some(RecordKey::Tid),
            record: LexObject {
                properties,
                required: Some(vec!["text".to_string()]),
                ..Default::default()
            },
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "record",
                "key": "tid",
                "record": {
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }
            })
        );
    }

    #[test]
    fn test_query_serde() {
        let query = LexType::Query(LexQuery {
            description: Some("Test query".to_string()),
            parameters: Some(LexParams::default()),
            output: Some(LexXrpcBody {
                description: None,
                encoding: "application/json".to_string(),
                schema: None,
            }),
            errors: Some(vec![LexXrpcError {
                name: "NotFound".to_string(),
                description: None,
            }]),
        });

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "query",
                "description": "Test query",
                "parameters": { "type": "params", "properties": {} },
                "output": { "encoding": "application/json" },
                "errors": [{ "name": "NotFound" }]
            })
        );
    }

    #[test]
    fn test_procedure_omits_absent_fields() {
        let json = serde_json::to_value(LexType::Procedure(LexProcedure::default())).unwrap();
        assert_eq!(json, json!({ "type": "procedure" }));
    }
}
