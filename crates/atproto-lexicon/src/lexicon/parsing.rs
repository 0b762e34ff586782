//! JSON parsing for Lexicon schemas
//!
//! Parsing is a single recursive descent over decoded JSON. An object that
//! carries both `lexicon` and `id` is a document; any other object is routed
//! on its `type` discriminator to the parser for that node kind. Composite
//! nodes re-enter the same dispatch for each child and then check that the
//! child's kind is permitted in that position.
//!
//! # Example
//!
//! ```rust
//! use atproto_lexicon::lexicon::{LexiconParser, LexType};
//!
//! let parser = LexiconParser::new();
//! let node = parser
//!     .parse_type(r#"{"type": "array", "items": {"type": "string"}, "maxLength": 4}"#)
//!     .unwrap();
//!
//! assert!(matches!(node, LexType::Array(_)));
//! ```

use super::constraints::ArrayConstraints;
use super::repository::SchemaRepository;
use super::resolution::RefResolver;
use super::schema::*;
use super::types::*;
use crate::nsid::{Nsid, NsidError};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

/// Longest JSON fragment quoted in an error message
const MAX_FRAGMENT_CHARS: usize = 240;

/// Errors that can occur during Lexicon parsing
#[derive(Debug, Error)]
pub enum LexiconParseError {
    /// Invalid JSON syntax
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// IO error reading file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value that must be a JSON object is not one
    #[error("Expected a JSON object at {path}, got {fragment}")]
    NotAnObject {
        /// Location of the value
        path: String,
        /// The offending JSON
        fragment: String,
    },

    /// No parser is registered for a discriminator
    #[error("No parser registered for type '{discriminator}' at {path}: {fragment}")]
    ParserNotFound {
        /// The unrecognised `type` value
        discriminator: String,
        /// Location of the node
        path: String,
        /// The offending JSON
        fragment: String,
    },

    /// A node failed its structural checks
    #[error("Invalid schema at {path}: {reason}: {fragment}")]
    Shape {
        /// Location of the node
        path: String,
        /// What was wrong
        reason: String,
        /// The offending JSON
        fragment: String,
    },

    /// Invalid lexicon version
    #[error("Invalid lexicon version: expected 1, got {0}")]
    InvalidVersion(String),

    /// Invalid document identifier
    #[error(transparent)]
    InvalidNsid(#[from] NsidError),
}

/// Result type for Lexicon parsing operations
pub type Result<T> = std::result::Result<T, LexiconParseError>;

/// Input accepted by the parser: raw JSON text or an already decoded value
#[derive(Debug, Clone, Copy)]
pub enum LexiconSource<'a> {
    /// JSON text, decoded before parsing
    Json(&'a str),
    /// Decoded JSON value
    Value(&'a Value),
}

impl<'a> From<&'a str> for LexiconSource<'a> {
    fn from(json: &'a str) -> Self {
        LexiconSource::Json(json)
    }
}

impl<'a> From<&'a String> for LexiconSource<'a> {
    fn from(json: &'a String) -> Self {
        LexiconSource::Json(json)
    }
}

impl<'a> From<&'a Value> for LexiconSource<'a> {
    fn from(value: &'a Value) -> Self {
        LexiconSource::Value(value)
    }
}

impl<'a> LexiconSource<'a> {
    fn decode(self) -> Result<Cow<'a, Value>> {
        match self {
            LexiconSource::Json(text) => Ok(Cow::Owned(serde_json::from_str(text)?)),
            LexiconSource::Value(value) => Ok(Cow::Borrowed(value)),
        }
    }
}

/// Result of parsing a top-level value
#[derive(Debug, Clone)]
pub enum Parsed {
    /// A whole Lexicon document
    Document(Rc<LexiconDoc>),
    /// A single type node
    Type(LexType),
}

impl Parsed {
    /// The document, if one was parsed
    pub fn into_document(self) -> Option<Rc<LexiconDoc>> {
        match self {
            Parsed::Document(doc) => Some(doc),
            Parsed::Type(_) => None,
        }
    }

    /// The type node, if one was parsed
    pub fn into_type(self) -> Option<LexType> {
        match self {
            Parsed::Type(node) => Some(node),
            Parsed::Document(_) => None,
        }
    }
}

/// Where a child node sits inside its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    ArrayItems,
    ObjectProperty,
    ParamsProperty,
    RecordObject,
    Parameters,
    BodySchema,
    MessageSchema,
    UnionMember,
    Def,
}

impl Position {
    fn describe(&self) -> &'static str {
        match self {
            Position::ArrayItems => "array items",
            Position::ObjectProperty => "object properties",
            Position::ParamsProperty => "params properties",
            Position::RecordObject => "a record body",
            Position::Parameters => "xrpc parameters",
            Position::BodySchema => "an xrpc body schema",
            Position::MessageSchema => "a subscription message schema",
            Position::UnionMember => "union refs",
            Position::Def => "document defs",
        }
    }

    fn allows(&self, kind: LexKind) -> bool {
        match self {
            Position::ArrayItems => {
                kind.is_primitive()
                    || kind.is_media()
                    || matches!(
                        kind,
                        LexKind::Bytes
                            | LexKind::CidLink
                            | LexKind::Ref
                            | LexKind::Union
                            | LexKind::Unknown
                    )
            }
            Position::ObjectProperty => {
                kind == LexKind::Array || Position::ArrayItems.allows(kind)
            }
            Position::ParamsProperty => {
                kind.is_primitive() || matches!(kind, LexKind::Unknown | LexKind::Array)
            }
            Position::RecordObject => kind == LexKind::Object,
            Position::Parameters => kind == LexKind::Params,
            Position::BodySchema => {
                matches!(kind, LexKind::Object | LexKind::Ref | LexKind::Union)
            }
            Position::MessageSchema => kind == LexKind::Union,
            Position::UnionMember => kind == LexKind::Ref,
            Position::Def => kind != LexKind::Params,
        }
    }
}

/// Diagnostic location threaded through the descent
#[derive(Debug, Clone)]
struct ParseContext {
    path: String,
    document: Option<Nsid>,
}

impl ParseContext {
    fn root() -> Self {
        Self {
            path: "$".to_string(),
            document: None,
        }
    }

    fn document(id: Nsid) -> Self {
        Self {
            path: "$".to_string(),
            document: Some(id),
        }
    }

    fn child(&self, segment: &str) -> Self {
        Self {
            path: format!("{}.{}", self.path, segment),
            document: self.document.clone(),
        }
    }
}

fn fragment(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= MAX_FRAGMENT_CHARS {
        return text;
    }
    let mut truncated: String = text.chars().take(MAX_FRAGMENT_CHARS).collect();
    truncated.push_str("...");
    truncated
}

fn shape_error(ctx: &ParseContext, reason: impl Into<String>, value: &Value) -> LexiconParseError {
    LexiconParseError::Shape {
        path: ctx.path.clone(),
        reason: reason.into(),
        fragment: fragment(value),
    }
}

fn is_document(map: &Map<String, Value>) -> bool {
    map.contains_key("lexicon") && map.contains_key("id")
}

/// Deserialize a leaf node (or a node's constraint block) from its JSON object
fn leaf<T: DeserializeOwned>(value: &Value, ctx: &ParseContext, kind: LexKind) -> Result<T> {
    T::deserialize(value).map_err(|e| shape_error(ctx, format!("invalid {}: {}", kind, e), value))
}

/// Typed field access over one node's JSON object
struct Fields<'v> {
    map: &'v Map<String, Value>,
    value: &'v Value,
    ctx: &'v ParseContext,
}

impl<'v> Fields<'v> {
    fn new(value: &'v Value, ctx: &'v ParseContext) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| LexiconParseError::NotAnObject {
            path: ctx.path.clone(),
            fragment: fragment(value),
        })?;
        Ok(Self { map, value, ctx })
    }

    fn shape(&self, reason: impl Into<String>) -> LexiconParseError {
        shape_error(self.ctx, reason, self.value)
    }

    /// Field value, treating `null` as absent
    fn get(&self, key: &str) -> Option<&'v Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn require(&self, key: &str) -> Result<&'v Value> {
        self.get(key).ok_or_else(|| self.shape(format!("missing '{}'", key)))
    }

    fn optional_str(&self, key: &str) -> Result<Option<&'v str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.shape(format!("'{}' must be a string", key))),
        }
    }

    fn required_str(&self, key: &str) -> Result<&'v str> {
        self.optional_str(key)?.ok_or_else(|| self.shape(format!("missing '{}'", key)))
    }

    fn optional_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.shape(format!("'{}' must be a boolean", key))),
        }
    }

    fn optional_string_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => Vec::<String>::deserialize(value)
                .map(Some)
                .map_err(|_| self.shape(format!("'{}' must be an array of strings", key))),
        }
    }

    /// A dictionary-valued field; an empty array is accepted as an empty map
    fn optional_map(&self, key: &str) -> Result<Option<&'v Map<String, Value>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(Value::Array(items)) if items.is_empty() => Ok(None),
            Some(_) => Err(self.shape(format!("'{}' must be an object", key))),
        }
    }

    fn description(&self) -> Result<Option<String>> {
        Ok(self.optional_str("description")?.map(str::to_string))
    }
}

/// Recursive-descent Lexicon parser
///
/// A parser built with [`LexiconParser::with_repository`] caches every
/// document it parses in that repository, returns the cached document when
/// the same id is parsed again, and attaches resolution capability to every
/// `ref` and `union` it produces. A plain parser does none of these.
#[derive(Debug, Clone, Default)]
pub struct LexiconParser {
    repository: Option<SchemaRepository>,
}

impl LexiconParser {
    /// Create a parser with no repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser backed by a repository
    pub fn with_repository(repository: SchemaRepository) -> Self {
        Self {
            repository: Some(repository),
        }
    }

    /// The backing repository, if any
    pub fn repository(&self) -> Option<&SchemaRepository> {
        self.repository.as_ref()
    }

    /// Parse a document or a single type node
    pub fn parse<'a>(&self, source: impl Into<LexiconSource<'a>>) -> Result<Parsed> {
        let value = source.into().decode()?;
        self.dispatch(&value, &ParseContext::root())
    }

    /// Parse a value that must be a Lexicon document
    pub fn parse_document<'a>(
        &self,
        source: impl Into<LexiconSource<'a>>,
    ) -> Result<Rc<LexiconDoc>> {
        let value = source.into().decode()?;
        let ctx = ParseContext::root();
        let fields = Fields::new(&value, &ctx)?;
        if !is_document(fields.map) {
            return Err(fields.shape("expected a lexicon document with 'lexicon' and 'id'"));
        }
        self.parse_document_object(&fields)
    }

    /// Parse a value that must be a single type node
    pub fn parse_type<'a>(&self, source: impl Into<LexiconSource<'a>>) -> Result<LexType> {
        let value = source.into().decode()?;
        let ctx = ParseContext::root();
        let fields = Fields::new(&value, &ctx)?;
        if is_document(fields.map) {
            return Err(fields.shape("expected a type node, found a lexicon document"));
        }
        self.parse_node(&fields)
    }

    fn dispatch(&self, value: &Value, ctx: &ParseContext) -> Result<Parsed> {
        let fields = Fields::new(value, ctx)?;
        if is_document(fields.map) {
            return self.parse_document_object(&fields).map(Parsed::Document);
        }
        self.parse_node(&fields).map(Parsed::Type)
    }

    fn parse_node(&self, f: &Fields<'_>) -> Result<LexType> {
        let discriminator = match f.map.get("type") {
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(f.shape("'type' must be a string")),
            None => return Err(f.shape("missing 'type' discriminator")),
        };
        let kind = LexKind::from_discriminator(discriminator).ok_or_else(|| {
            LexiconParseError::ParserNotFound {
                discriminator: discriminator.to_string(),
                path: f.ctx.path.clone(),
                fragment: fragment(f.value),
            }
        })?;

        tracing::trace!(kind = %kind, path = %f.ctx.path, "dispatching lexicon node");

        let (value, ctx) = (f.value, f.ctx);
        Ok(match kind {
            LexKind::Boolean => LexType::Boolean(leaf(value, ctx, kind)?),
            LexKind::Integer => LexType::Integer(leaf(value, ctx, kind)?),
            LexKind::Number => LexType::Number(leaf(value, ctx, kind)?),
            LexKind::String => LexType::String(leaf(value, ctx, kind)?),
            LexKind::Bytes => LexType::Bytes(leaf(value, ctx, kind)?),
            LexKind::CidLink => LexType::CidLink(leaf(value, ctx, kind)?),
            LexKind::Unknown => LexType::Unknown(leaf(value, ctx, kind)?),
            LexKind::Token => LexType::Token(leaf(value, ctx, kind)?),
            LexKind::Blob => LexType::Blob(leaf(value, ctx, kind)?),
            LexKind::Image => LexType::Image(leaf(value, ctx, kind)?),
            LexKind::Video => LexType::Video(leaf(value, ctx, kind)?),
            LexKind::Audio => LexType::Audio(leaf(value, ctx, kind)?),
            LexKind::Array => LexType::Array(self.parse_array(f)?),
            LexKind::Object => LexType::Object(self.parse_object(f)?),
            LexKind::Params => LexType::Params(self.parse_params(f)?),
            LexKind::Ref => LexType::Ref(self.parse_ref(f)?),
            LexKind::Union => LexType::Union(self.parse_union(f)?),
            LexKind::Record => LexType::Record(self.parse_record(f)?),
            LexKind::Query => LexType::Query(self.parse_query(f)?),
            LexKind::Procedure => LexType::Procedure(self.parse_procedure(f)?),
            LexKind::Subscription => LexType::Subscription(self.parse_subscription(f)?),
        })
    }

    /// Parse a nested node and check it is allowed where it sits
    fn parse_child(
        &self,
        value: &Value,
        ctx: &ParseContext,
        position: Position,
    ) -> Result<LexType> {
        let fields = Fields::new(value, ctx)?;
        if is_document(fields.map) {
            return Err(fields.shape(format!(
                "a lexicon document is not allowed in {}",
                position.describe()
            )));
        }
        let node = self.parse_node(&fields)?;
        if !position.allows(node.kind()) {
            return Err(fields.shape(format!(
                "'{}' is not allowed in {}",
                node.kind(),
                position.describe()
            )));
        }
        Ok(node)
    }

    fn parse_properties(
        &self,
        f: &Fields<'_>,
        position: Position,
    ) -> Result<IndexMap<String, LexType>> {
        let mut properties = IndexMap::new();
        if let Some(entries) = f.optional_map("properties")? {
            let ctx = f.ctx.child("properties");
            for (name, value) in entries {
                let node = self.parse_child(value, &ctx.child(name), position)?;
                properties.insert(name.clone(), node);
            }
        }
        Ok(properties)
    }

    fn parse_array(&self, f: &Fields<'_>) -> Result<LexArray> {
        let items =
            self.parse_child(f.require("items")?, &f.ctx.child("items"), Position::ArrayItems)?;
        let constraints: ArrayConstraints = leaf(f.value, f.ctx, LexKind::Array)?;
        Ok(LexArray {
            description: f.description()?,
            items: Box::new(items),
            constraints,
        })
    }

    fn parse_object(&self, f: &Fields<'_>) -> Result<LexObject> {
        Ok(LexObject {
            description: f.description()?,
            properties: self.parse_properties(f, Position::ObjectProperty)?,
            required: f.optional_string_list("required")?,
            nullable: f.optional_string_list("nullable")?,
        })
    }

    fn parse_params(&self, f: &Fields<'_>) -> Result<LexParams> {
        let properties = self.parse_properties(f, Position::ParamsProperty)?;
        for (name, node) in &properties {
            if let LexType::Array(array) = node {
                let items = array.items.kind();
                if !(items.is_primitive() || items == LexKind::Unknown) {
                    return Err(f.shape(format!(
                        "params property '{}' is an array of '{}'; \
                         only primitive items are allowed",
                        name, items
                    )));
                }
            }
        }
        Ok(LexParams {
            description: f.description()?,
            properties,
            required: f.optional_string_list("required")?,
        })
    }

    fn make_ref(&self, target: &str, description: Option<String>, ctx: &ParseContext) -> LexRef {
        LexRef {
            description,
            target: target.to_string(),
            base: ctx.document.clone(),
            resolver: self.repository.as_ref().map(RefResolver::attach),
        }
    }

    fn parse_ref(&self, f: &Fields<'_>) -> Result<LexRef> {
        let target = f.required_str("ref")?;
        Ok(self.make_ref(target, f.description()?, f.ctx))
    }

    fn parse_union(&self, f: &Fields<'_>) -> Result<LexRefUnion> {
        let targets: &[Value] = match f.require("refs")? {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) if map.is_empty() => &[],
            _ => return Err(f.shape("'refs' must be an array of strings")),
        };

        let ctx = f.ctx.child("refs");
        let mut refs = Vec::with_capacity(targets.len());
        for (i, target) in targets.iter().enumerate() {
            let target = target
                .as_str()
                .ok_or_else(|| f.shape("'refs' must be an array of strings"))?;
            let member = serde_json::json!({ "type": "ref", "ref": target });
            match self.parse_child(&member, &ctx.child(&i.to_string()), Position::UnionMember)? {
                LexType::Ref(r) => refs.push(r),
                other => {
                    return Err(f.shape(format!("union member parsed as '{}'", other.kind())));
                }
            }
        }

        Ok(LexRefUnion {
            description: f.description()?,
            refs,
            closed: f.optional_bool("closed")?,
        })
    }

    fn parse_record(&self, f: &Fields<'_>) -> Result<LexRecord> {
        let key = f
            .optional_str("key")?
            .map(|k| k.parse::<RecordKey>().map_err(|e| f.shape(e)))
            .transpose()?;

        let record = match self.parse_child(
            f.require("record")?,
            &f.ctx.child("record"),
            Position::RecordObject,
        )? {
            LexType::Object(object) => object,
            other => return Err(f.shape(format!("record body parsed as '{}'", other.kind()))),
        };

        Ok(LexRecord {
            description: f.description()?,
            key,
            record,
        })
    }

    fn parse_parameters(&self, f: &Fields<'_>) -> Result<Option<LexParams>> {
        let Some(value) = f.get("parameters") else {
            return Ok(None);
        };
        match self.parse_child(value, &f.ctx.child("parameters"), Position::Parameters)? {
            LexType::Params(params) => Ok(Some(params)),
            other => Err(f.shape(format!("parameters parsed as '{}'", other.kind()))),
        }
    }

    fn parse_schema_field(
        &self,
        body: &Fields<'_>,
        position: Position,
    ) -> Result<Option<Box<LexType>>> {
        match body.get("schema") {
            None => Ok(None),
            Some(value) => {
                let node = self.parse_child(value, &body.ctx.child("schema"), position)?;
                Ok(Some(Box::new(node)))
            }
        }
    }

    fn parse_body(&self, f: &Fields<'_>, key: &str) -> Result<Option<LexXrpcBody>> {
        let Some(value) = f.get(key) else {
            return Ok(None);
        };
        let ctx = f.ctx.child(key);
        let body = Fields::new(value, &ctx)?;
        Ok(Some(LexXrpcBody {
            description: body.description()?,
            encoding: body.required_str("encoding")?.to_string(),
            schema: self.parse_schema_field(&body, Position::BodySchema)?,
        }))
    }

    fn parse_message(&self, f: &Fields<'_>) -> Result<Option<LexXrpcMessage>> {
        let Some(value) = f.get("message") else {
            return Ok(None);
        };
        let ctx = f.ctx.child("message");
        let message = Fields::new(value, &ctx)?;
        Ok(Some(LexXrpcMessage {
            description: message.description()?,
            schema: self.parse_schema_field(&message, Position::MessageSchema)?,
        }))
    }

    fn parse_errors(&self, f: &Fields<'_>) -> Result<Option<Vec<LexXrpcError>>> {
        f.get("errors")
            .map(|value| {
                Vec::<LexXrpcError>::deserialize(value)
                    .map_err(|e| f.shape(format!("invalid 'errors': {}", e)))
            })
            .transpose()
    }

    fn parse_query(&self, f: &Fields<'_>) -> Result<LexQuery> {
        Ok(LexQuery {
            description: f.description()?,
            parameters: self.parse_parameters(f)?,
            output: self.parse_body(f, "output")?,
            errors: self.parse_errors(f)?,
        })
    }

    fn parse_procedure(&self, f: &Fields<'_>) -> Result<LexProcedure> {
        Ok(LexProcedure {
            description: f.description()?,
            parameters: self.parse_parameters(f)?,
            input: self.parse_body(f, "input")?,
            output: self.parse_body(f, "output")?,
            errors: self.parse_errors(f)?,
        })
    }

    fn parse_subscription(&self, f: &Fields<'_>) -> Result<LexSubscription> {
        Ok(LexSubscription {
            description: f.description()?,
            parameters: self.parse_parameters(f)?,
            message: self.parse_message(f)?,
            errors: self.parse_errors(f)?,
        })
    }

    fn parse_document_object(&self, f: &Fields<'_>) -> Result<Rc<LexiconDoc>> {
        let version = f.require("lexicon")?;
        if version.as_u64() != Some(u64::from(LEXICON_VERSION)) {
            return Err(LexiconParseError::InvalidVersion(fragment(version)));
        }

        let raw_id = f.required_str("id")?;
        if raw_id.contains('#') {
            return Err(f.shape("document id must not carry a '#fragment'"));
        }
        let id = Nsid::parse(raw_id)?;

        // Identity is settled before any def is parsed.
        if let Some(doc) = self.repository.as_ref().and_then(|r| r.get(&id)) {
            tracing::debug!(id = %id, "lexicon document already cached");
            return Ok(doc);
        }

        let revision = match f.get("revision") {
            None => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| f.shape("'revision' must be a non-negative integer"))?,
            ),
        };

        let mut defs = IndexMap::new();
        if let Some(entries) = f.optional_map("defs")? {
            let ctx = ParseContext::document(id.clone()).child("defs");
            for (name, value) in entries {
                let node = self.parse_child(value, &ctx.child(name), Position::Def)?;
                defs.insert(name.clone(), Rc::new(node));
            }
        }

        let doc = Rc::new(LexiconDoc {
            lexicon: LEXICON_VERSION,
            id,
            revision,
            description: f.description()?,
            defs,
        });

        tracing::debug!(id = %doc.id, defs = doc.defs.len(), "parsed lexicon document");

        if let Some(repository) = &self.repository {
            repository.store(Rc::clone(&doc));
        }
        Ok(doc)
    }
}

impl LexiconDoc {
    /// Parse a Lexicon document from a JSON string
    ///
    /// # Examples
    ///
    /// ```
    /// use atproto_lexicon::lexicon::LexiconDoc;
    ///
    /// let json = r#"{
    ///   "lexicon": 1,
    ///   "id": "com.example.test",
    ///   "defs": {
    ///     "main": {
    ///       "type": "token"
    ///     }
    ///   }
    /// }"#;
    ///
    /// let doc = LexiconDoc::from_json(json).unwrap();
    /// assert_eq!(doc.id.to_string(), "com.example.test");
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let doc = LexiconParser::new().parse_document(json)?;
        Ok(Rc::unwrap_or_clone(doc))
    }

    /// Parse a Lexicon document from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::formats::StringFormat;
    use serde_json::json;

    fn parse_type(value: Value) -> Result<LexType> {
        LexiconParser::new().parse_type(&value)
    }

    #[test]
    fn test_from_json_simple() {
        let json = r#"{
            "lexicon": 1,
            "id": "com.example.test",
            "defs": {
                "main": {
                    "type": "token"
                }
            }
        }"#;

        let doc = LexiconDoc::from_json(json).unwrap();
        assert_eq!(doc.lexicon, 1);
        assert_eq!(doc.id.to_string(), "com.example.test");
        assert_eq!(doc.defs.len(), 1);
    }

    #[test]
    fn test_from_json_invalid_version() {
        let result = LexiconDoc::from_json(r#"{"lexicon": 2, "id": "com.example.test"}"#);
        assert!(matches!(result, Err(LexiconParseError::InvalidVersion(v)) if v == "2"));
    }

    #[test]
    fn test_from_json_invalid_nsid() {
        let result = LexiconDoc::from_json(r#"{"lexicon": 1, "id": "invalid"}"#);
        assert!(matches!(result, Err(LexiconParseError::InvalidNsid(_))));
    }

    #[test]
    fn test_from_json_id_with_fragment() {
        let result = LexiconDoc::from_json(r#"{"lexicon": 1, "id": "com.example.foo#bar"}"#);
        assert!(matches!(result, Err(LexiconParseError::Shape { .. })));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.json");
        std::fs::write(
            &path,
            r#"{"lexicon": 1, "id": "com.example.test", "defs": {"main": {"type": "token"}}}"#,
        )
        .unwrap();

        let doc = LexiconDoc::from_file(&path).unwrap();
        assert_eq!(doc.id.to_string(), "com.example.test");
        assert_eq!(doc.main_def().unwrap().kind(), LexKind::Token);

        let missing = LexiconDoc::from_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(LexiconParseError::Io(_))));
    }

    #[test]
    fn test_from_json_malformed() {
        let result = LexiconDoc::from_json(r#"{ invalid json }"#);
        assert!(matches!(result, Err(LexiconParseError::InvalidJson(_))));
    }

    #[test]
    fn test_non_object_input() {
        let result = LexiconParser::new().parse("[1, 2, 3]");
        assert!(matches!(result, Err(LexiconParseError::NotAnObject { .. })));
    }

    #[test]
    fn test_dispatch_routes_documents_and_nodes() {
        let parser = LexiconParser::new();
        let doc = parser.parse(r#"{"lexicon": 1, "id": "com.example.foo"}"#).unwrap();
        assert!(doc.into_document().is_some());

        let node = parser.parse(r#"{"type": "boolean", "default": true}"#).unwrap();
        assert!(matches!(
            node.into_type(),
            Some(LexType::Boolean(b)) if b.constraints.default == Some(true)
        ));
    }

    #[test]
    fn test_accepts_decoded_value() {
        let value = json!({ "type": "integer", "minimum": 1, "maximum": 10 });
        match parse_type(value).unwrap() {
            LexType::Integer(n) => {
                assert_eq!(n.constraints.minimum, Some(1));
                assert_eq!(n.constraints.maximum, Some(10));
            }
            other => panic!("Expected integer, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_discriminator() {
        let err = parse_type(json!({ "type": "bogus" })).unwrap_err();
        match err {
            LexiconParseError::ParserNotFound {
                discriminator,
                fragment,
                ..
            } => {
                assert_eq!(discriminator, "bogus");
                assert!(fragment.contains("bogus"));
            }
            other => panic!("Expected ParserNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_discriminator() {
        let err = parse_type(json!({ "description": "no type" })).unwrap_err();
        assert!(matches!(err, LexiconParseError::Shape { .. }));
    }

    #[test]
    fn test_leaf_shape_errors_carry_fragment() {
        let err = parse_type(json!({ "type": "string", "maxLength": "long" })).unwrap_err();
        match err {
            LexiconParseError::Shape { path, fragment, .. } => {
                assert_eq!(path, "$");
                assert!(fragment.contains("maxLength"));
            }
            other => panic!("Expected Shape, got {:?}", other),
        }

        assert!(parse_type(json!({ "type": "string", "format": "bogus" })).is_err());
        assert!(parse_type(json!({ "type": "token", "description": 3 })).is_err());
    }

    #[test]
    fn test_string_with_format() {
        let node = parse_type(json!({
            "type": "string",
            "format": "did",
            "knownValues": ["a"],
            "maxGraphemes": 64
        }))
        .unwrap();
        let string = node.as_string().unwrap();
        assert_eq!(string.format, Some(StringFormat::Did));
        assert_eq!(string.constraints.max_graphemes, Some(64));
    }

    #[test]
    fn test_number_node_renders_bounds_as_written() {
        let body = json!({ "type": "number", "minimum": 0, "maximum": 2, "default": 1 });
        let node = parse_type(body.clone()).unwrap();
        assert_eq!(serde_json::to_value(&node).unwrap(), body);

        let fractional = json!({ "type": "number", "maximum": 2.5 });
        let node = parse_type(fractional.clone()).unwrap();
        assert_eq!(serde_json::to_value(&node).unwrap(), fractional);
    }

    #[test]
    fn test_media_nodes() {
        let node = parse_type(json!({
            "type": "image",
            "accept": ["image/png", "image/*"],
            "maxSize": 1000000,
            "maxWidth": 2000
        }))
        .unwrap();
        match node {
            LexType::Image(image) => {
                assert_eq!(image.constraints.max_width, Some(2000));
                assert_eq!(image.constraints.accept.unwrap().len(), 2);
            }
            other => panic!("Expected image, got {:?}", other),
        }

        let audio = parse_type(json!({ "type": "audio", "maxLength": 60 })).unwrap();
        assert_eq!(audio.kind(), LexKind::Audio);
        assert_eq!(parse_type(json!({ "type": "video" })).unwrap().kind(), LexKind::Video);
        let number = parse_type(json!({ "type": "number", "minimum": 0.5 })).unwrap();
        assert_eq!(number.kind(), LexKind::Number);
    }

    #[test]
    fn test_object_preserves_declaration_order() {
        let node = parse_type(json!({
            "type": "object",
            "required": ["zeta"],
            "properties": {
                "zeta": { "type": "string" },
                "alpha": { "type": "integer" },
                "mid": { "type": "array", "items": { "type": "cid-link" } }
            }
        }))
        .unwrap();

        let object = node.as_object().unwrap();
        assert_eq!(object.properties.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(object.required, Some(vec!["zeta".to_string()]));
    }

    #[test]
    fn test_token_rejected_in_object_and_array() {
        assert_eq!(parse_type(json!({ "type": "token" })).unwrap().kind(), LexKind::Token);

        let err = parse_type(json!({
            "type": "object",
            "properties": { "marker": { "type": "token" } }
        }))
        .unwrap_err();
        match err {
            LexiconParseError::Shape { path, reason, .. } => {
                assert_eq!(path, "$.properties.marker");
                assert!(reason.contains("token"));
            }
            other => panic!("Expected Shape, got {:?}", other),
        }

        let err = parse_type(json!({ "type": "array", "items": { "type": "token" } })).unwrap_err();
        assert!(matches!(err, LexiconParseError::Shape { path, .. } if path == "$.items"));
    }

    #[test]
    fn test_structural_kinds_rejected_in_fields() {
        for inner in [
            json!({ "type": "object" }),
            json!({ "type": "record", "record": { "type": "object" } }),
            json!({ "type": "query" }),
            json!({ "type": "array", "items": { "type": "string" } }),
        ] {
            let result = parse_type(json!({ "type": "array", "items": inner }));
            assert!(result.is_err(), "array items accepted {:?}", result);
        }

        let nested_doc = json!({
            "type": "object",
            "properties": { "doc": { "lexicon": 1, "id": "com.example.foo" } }
        });
        assert!(parse_type(nested_doc).is_err());
    }

    #[test]
    fn test_union_members() {
        let node = parse_type(json!({
            "type": "union",
            "refs": ["com.example.a#x", "#local", "com.example.a#x"],
            "closed": true
        }))
        .unwrap();
        let union = node.as_union().unwrap();
        assert!(union.is_closed());
        assert_eq!(
            union.targets().collect::<Vec<_>>(),
            vec!["com.example.a#x", "#local", "com.example.a#x"]
        );

        assert!(parse_type(json!({ "type": "union", "refs": [1] })).is_err());
        assert!(parse_type(json!({ "type": "union" })).is_err());
        let empty = parse_type(json!({ "type": "union", "refs": {} })).unwrap();
        assert!(empty.as_union().unwrap().refs.is_empty());
    }

    #[test]
    fn test_ref_requires_target_string() {
        assert!(parse_type(json!({ "type": "ref" })).is_err());
        assert!(parse_type(json!({ "type": "ref", "ref": 7 })).is_err());
        let node = parse_type(json!({ "type": "ref", "ref": "" })).unwrap();
        assert_eq!(node.as_ref_node().unwrap().target, "");
    }

    #[test]
    fn test_record() {
        let node = parse_type(json!({
            "type": "record",
            "key": "literal:self",
            "record": {
                "type": "object",
                "properties": { "text": { "type": "string", "maxGraphemes": 300 } }
            }
        }))
        .unwrap();
        let record = node.as_record().unwrap();
        assert_eq!(record.key, Some(RecordKey::Literal("self".to_string())));
        assert!(record.record.properties.contains_key("text"));

        assert!(parse_type(json!({ "type": "record", "record": { "type": "string" } })).is_err());
        assert!(parse_type(json!({
            "type": "record",
            "key": "uuid",
            "record": { "type": "object" }
        }))
        .is_err());
    }

    #[test]
    fn test_query_and_procedure() {
        let node = parse_type(json!({
            "type": "procedure",
            "parameters": {
                "type": "params",
                "properties": {
                    "limit": { "type": "integer" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                }
            },
            "input": {
                "encoding": "application/json",
                "schema": { "type": "ref", "ref": "#input" }
            },
            "output": { "encoding": "*/*" },
            "errors": [{ "name": "RecordNotFound", "description": "gone" }]
        }))
        .unwrap();

        match node {
            LexType::Procedure(procedure) => {
                let params = procedure.parameters.unwrap();
                assert_eq!(params.properties.len(), 2);
                let input = procedure.input.unwrap();
                assert_eq!(input.encoding, "application/json");
                assert_eq!(input.schema.unwrap().kind(), LexKind::Ref);
                assert!(procedure.output.unwrap().schema.is_none());
                assert_eq!(procedure.errors.unwrap()[0].name, "RecordNotFound");
            }
            other => panic!("Expected procedure, got {:?}", other),
        }
    }

    #[test]
    fn test_xrpc_body_requires_encoding() {
        let accepted = parse_type(json!({
            "type": "query",
            "output": { "encoding": "application/json", "schema": { "type": "object" } }
        }));
        assert!(accepted.is_ok());

        let err = parse_type(json!({
            "type": "query",
            "output": { "schema": { "type": "object" } }
        }))
        .unwrap_err();
        match err {
            LexiconParseError::Shape { path, reason, .. } => {
                assert_eq!(path, "$.output");
                assert!(reason.contains("encoding"));
            }
            other => panic!("Expected Shape, got {:?}", other),
        }
    }

    #[test]
    fn test_xrpc_composition_rules() {
        assert!(
            parse_type(json!({ "type": "query", "parameters": { "type": "object" } })).is_err()
        );
        assert!(parse_type(json!({
            "type": "query",
            "output": { "encoding": "application/json", "schema": { "type": "token" } }
        }))
        .is_err());
        assert!(parse_type(json!({
            "type": "query",
            "output": { "encoding": "application/json", "schema": { "type": "string" } }
        }))
        .is_err());
        assert!(parse_type(json!({
            "type": "query",
            "parameters": {
                "type": "params",
                "properties": { "blob": { "type": "blob" } }
            }
        }))
        .is_err());
        assert!(parse_type(json!({
            "type": "query",
            "parameters": {
                "type": "params",
                "properties": {
                    "refs": { "type": "array", "items": { "type": "ref", "ref": "#x" } }
                }
            }
        }))
        .is_err());
        let nameless = json!({ "type": "query", "errors": [{ "description": "nameless" }] });
        assert!(parse_type(nameless).is_err());
    }

    #[test]
    fn test_subscription_message_must_be_union() {
        let node = parse_type(json!({
            "type": "subscription",
            "message": { "schema": { "type": "union", "refs": ["#commit"] } }
        }))
        .unwrap();
        assert_eq!(node.kind(), LexKind::Subscription);

        assert!(parse_type(json!({
            "type": "subscription",
            "message": { "schema": { "type": "object" } }
        }))
        .is_err());
    }

    #[test]
    fn test_document_threads_id_into_refs() {
        let doc = LexiconParser::new()
            .parse_document(&json!({
                "lexicon": 1,
                "id": "com.example.post",
                "revision": 3,
                "defs": {
                    "main": {
                        "type": "object",
                        "properties": { "reply": { "type": "ref", "ref": "#replyRef" } }
                    },
                    "replyRef": { "type": "token" }
                }
            }))
            .unwrap();

        assert_eq!(doc.revision, Some(3));
        let main = doc.main_def().unwrap().as_object().unwrap();
        let reply = main.properties["reply"].as_ref_node().unwrap();
        assert_eq!(reply.base().map(|id| id.to_string()).as_deref(), Some("com.example.post"));
        assert!(!reply.is_resolvable());
    }

    #[test]
    fn test_document_rejects_params_def_and_bad_defs() {
        let params_def = json!({
            "lexicon": 1,
            "id": "com.example.foo",
            "defs": { "main": { "type": "params" } }
        });
        assert!(LexiconParser::new().parse_document(&params_def).is_err());

        let bad_defs = json!({ "lexicon": 1, "id": "com.example.foo", "defs": "nope" });
        assert!(LexiconParser::new().parse_document(&bad_defs).is_err());

        let empty_list = json!({ "lexicon": 1, "id": "com.example.foo", "defs": [] });
        assert!(LexiconParser::new().parse_document(&empty_list).unwrap().defs.is_empty());
    }

    #[test]
    fn test_parse_document_and_type_entry_points_disagree() {
        let parser = LexiconParser::new();
        assert!(parser.parse_document(r#"{"type": "token"}"#).is_err());
        assert!(parser.parse_type(r#"{"lexicon": 1, "id": "com.example.foo"}"#).is_err());
    }

    #[test]
    fn test_plain_parser_does_not_cache() {
        let parser = LexiconParser::new();
        let json = r#"{"lexicon": 1, "id": "com.example.foo"}"#;
        let first = parser.parse_document(json).unwrap();
        let second = parser.parse_document(json).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_repository_parser_returns_cached_instance() {
        let repository = SchemaRepository::in_memory();
        let parser = repository.parser();
        let json = r#"{"lexicon":1,"id":"com.example.foo"}"#;

        let first = parser.parse_document(json).unwrap();
        let second = parser.parse_document(json).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(repository.len(), 1);
    }

    #[test]
    fn test_fragment_truncation() {
        let long = Value::String("x".repeat(1000));
        let text = fragment(&long);
        assert!(text.ends_with("..."));
        assert_eq!(text.chars().count(), MAX_FRAGMENT_CHARS + 3);
    }
}
