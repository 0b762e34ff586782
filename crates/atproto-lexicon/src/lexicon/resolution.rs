//! Lexicon reference resolution
//!
//! References can be local (`#defName`), resolved against the document they
//! were declared in, or external (`nsid` / `nsid#defName`). Resolution is lazy:
//! nothing is loaded until a ref is asked for its target, at which point the
//! owning [`SchemaRepository`] loads the target document on demand.
//!
//! # Example
//!
//! ```rust
//! use atproto_lexicon::lexicon::{LexKind, SchemaRepository};
//!
//! let repository = SchemaRepository::in_memory();
//! let doc = repository
//!     .parser()
//!     .parse_document(r##"{
//!         "lexicon": 1,
//!         "id": "com.example.post",
//!         "defs": {
//!             "main": { "type": "ref", "ref": "#body" },
//!             "body": { "type": "string" }
//!         }
//!     }"##)
//!     .unwrap();
//!
//! let main = doc.main_def().unwrap().as_ref_node().unwrap();
//! assert_eq!(main.resolve().unwrap().kind(), LexKind::String);
//! ```

use super::repository::{RepositoryError, SchemaRepository, WeakSchemaRepository};
use super::types::{LexRef, LexRefUnion, LexType};
use crate::nsid::Nsid;
use std::rc::Rc;
use thiserror::Error;

/// Errors that can occur during reference resolution
#[derive(Debug, Error)]
pub enum RefResolutionError {
    /// The ref was not built by a repository-backed parser, or its repository is gone
    #[error("No repository available to resolve '{0}'")]
    NotConfigured(String),

    /// The ref target is the empty string
    #[error("No ref: target is empty")]
    EmptyRef,

    /// Invalid reference format
    #[error("Invalid reference '{target}': {reason}")]
    InvalidRef {
        /// The declared target
        target: String,
        /// Why it could not be parsed
        reason: String,
    },

    /// No schema file exists for the target document
    #[error("Schema file not found for '{0}'")]
    SchemaFileNotFound(String),

    /// The target document exists but could not be loaded
    #[error("Failed to load schema '{id}': {source}")]
    Load {
        /// Target document id
        id: String,
        /// Underlying repository failure
        #[source]
        source: RepositoryError,
    },

    /// Definition not found in schema
    #[error("Definition '{def}' not found in schema '{nsid}'")]
    DefNotFound {
        /// The NSID of the schema
        nsid: String,
        /// The definition name
        def: String,
    },

    /// Circular reference detected
    #[error("Circular reference detected: {0}")]
    CircularReference(String),

    /// Reference resolution depth exceeded
    #[error("Reference resolution depth exceeded (max: {max}, path: {path})")]
    DepthExceeded {
        /// Maximum allowed depth
        max: usize,
        /// Resolution path
        path: String,
    },
}

/// Result type for reference resolution operations
pub type Result<T> = std::result::Result<T, RefResolutionError>;

/// Resolution capability attached to refs by a repository-backed parser
///
/// Holds a weak handle so documents cached in a repository do not keep the
/// repository alive through their own refs.
#[derive(Debug, Clone)]
pub struct RefResolver {
    repository: WeakSchemaRepository,
}

impl RefResolver {
    pub(crate) fn attach(repository: &SchemaRepository) -> Self {
        Self {
            repository: repository.downgrade(),
        }
    }

    /// The repository, if it is still alive
    pub fn repository(&self) -> Option<SchemaRepository> {
        self.repository.upgrade()
    }
}

/// Parse a reference string into a fully qualified identifier
///
/// # Format
///
/// - Local reference: `#defName` uses `base`
/// - External reference: `nsid` or `nsid#defName`
///
/// # Examples
///
/// ```
/// # use atproto_lexicon::lexicon::resolution::parse_ref;
/// # use atproto_lexicon::Nsid;
/// let base = Nsid::parse("com.example.test").unwrap();
///
/// let local = parse_ref("#reply", Some(&base)).unwrap();
/// assert_eq!(local.to_string(), "com.example.test#reply");
///
/// let external = parse_ref("com.atproto.repo.strongRef", Some(&base)).unwrap();
/// assert_eq!(external.def_id(), "main");
/// ```
pub fn parse_ref(target: &str, base: Option<&Nsid>) -> Result<Nsid> {
    if target.is_empty() {
        return Err(RefResolutionError::EmptyRef);
    }

    let invalid = |reason: String| RefResolutionError::InvalidRef {
        target: target.to_string(),
        reason,
    };

    if let Some(def_id) = target.strip_prefix('#') {
        let base =
            base.ok_or_else(|| invalid("local reference outside of a document".to_string()))?;
        let qualified = format!("{}#{}", base.document_id(), def_id);
        return Nsid::parse(&qualified).map_err(|e| invalid(e.to_string()));
    }

    Nsid::parse(target).map_err(|e| invalid(e.to_string()))
}

impl LexRef {
    /// Fully qualified target identifier
    pub fn target_nsid(&self) -> Result<Nsid> {
        parse_ref(&self.target, self.base.as_ref())
    }

    fn repository(&self) -> Result<SchemaRepository> {
        self.resolver
            .as_ref()
            .and_then(RefResolver::repository)
            .ok_or_else(|| RefResolutionError::NotConfigured(self.target.clone()))
    }

    /// Resolve the target definition
    ///
    /// Loads the target document through the repository if it is not cached.
    /// The returned node is the instance held by the target document.
    pub fn resolve(&self) -> Result<Rc<LexType>> {
        let repository = self.repository()?;
        let target = self.target_nsid()?;
        repository.resolve(&target)
    }

    /// Follow a chain of refs until a non-ref definition is reached
    ///
    /// Fails with [`RefResolutionError::CircularReference`] when a target is
    /// revisited and [`RefResolutionError::DepthExceeded`] when the chain is
    /// longer than the repository's `max_resolution_depth`.
    pub fn resolve_target(&self) -> Result<Rc<LexType>> {
        let repository = self.repository()?;
        let max = repository.config().max_resolution_depth;

        let mut chain: Vec<String> = Vec::new();
        let mut next = self.target_nsid()?;
        loop {
            let key = next.to_string();
            if chain.contains(&key) {
                chain.push(key);
                return Err(RefResolutionError::CircularReference(chain.join(" -> ")));
            }
            if chain.len() >= max {
                return Err(RefResolutionError::DepthExceeded {
                    max,
                    path: chain.join(" -> "),
                });
            }
            chain.push(key);

            let node = repository.resolve(&next)?;
            let hop = match node.as_ref() {
                LexType::Ref(inner) => Some(inner.target_nsid()?),
                _ => None,
            };
            match hop {
                Some(target) => next = target,
                None => return Ok(node),
            }
        }
    }
}

impl LexRefUnion {
    /// Resolve every member in declaration order
    ///
    /// Duplicates are kept. The first failing member aborts the whole call.
    pub fn resolve(&self) -> Result<Box<[Rc<LexType>]>> {
        self.refs.iter().map(LexRef::resolve).collect()
    }
}

impl LexType {
    /// Every ref reachable from this node without crossing documents
    ///
    /// Union members are included. Order follows declaration order.
    pub fn refs(&self) -> Vec<&LexRef> {
        let mut out = Vec::new();
        collect_refs(self, &mut out);
        out
    }
}

fn collect_refs<'a>(node: &'a LexType, out: &mut Vec<&'a LexRef>) {
    use super::schema::{LexParams, LexXrpcBody};

    fn params<'a>(params: Option<&'a LexParams>, out: &mut Vec<&'a LexRef>) {
        for property in params.into_iter().flat_map(|p| p.properties.values()) {
            collect_refs(property, out);
        }
    }

    fn body<'a>(body: Option<&'a LexXrpcBody>, out: &mut Vec<&'a LexRef>) {
        if let Some(schema) = body.and_then(|b| b.schema.as_deref()) {
            collect_refs(schema, out);
        }
    }

    match node {
        LexType::Ref(r) => out.push(r),
        LexType::Union(u) => out.extend(u.refs.iter()),
        LexType::Array(a) => collect_refs(&a.items, out),
        LexType::Object(o) => o.properties.values().for_each(|p| collect_refs(p, out)),
        LexType::Params(p) => params(Some(p), out),
        LexType::Record(r) => r.record.properties.values().for_each(|p| collect_refs(p, out)),
        LexType::Query(q) => {
            params(q.parameters.as_ref(), out);
            body(q.output.as_ref(), out);
        }
        LexType::Procedure(p) => {
            params(p.parameters.as_ref(), out);
            body(p.input.as_ref(), out);
            body(p.output.as_ref(), out);
        }
        LexType::Subscription(s) => {
            params(s.parameters.as_ref(), out);
            if let Some(schema) = s.message.as_ref().and_then(|m| m.schema.as_deref()) {
                collect_refs(schema, out);
            }
        }
        _ => {}
    }
}

impl SchemaRepository {
    /// Resolve a fully qualified identifier to its definition
    pub fn resolve(&self, target: &Nsid) -> Result<Rc<LexType>> {
        let document_id = target.document_id();
        let doc = self
            .load(&document_id)
            .map_err(|source| RefResolutionError::Load {
                id: document_id.to_string(),
                source,
            })?
            .ok_or_else(|| RefResolutionError::SchemaFileNotFound(document_id.to_string()))?;

        let def = doc.def(target.def_id()).cloned().ok_or_else(|| {
            RefResolutionError::DefNotFound {
                nsid: doc.id.to_string(),
                def: target.def_id().to_string(),
            }
        })?;

        tracing::debug!(target = %target, kind = %def.kind(), "resolved lexicon ref");
        Ok(def)
    }

    /// Resolve a reference string declared in the context of `base`
    pub fn resolve_ref(&self, target: &str, base: Option<&Nsid>) -> Result<Rc<LexType>> {
        self.resolve(&parse_ref(target, base)?)
    }

    /// Try every ref declared in a document and collect the failures
    ///
    /// The document itself must load; failures of individual refs are
    /// returned rather than raised.
    pub fn check_references(&self, id: &Nsid) -> Result<Vec<RefResolutionError>> {
        let document_id = id.document_id();
        let doc = self
            .load(&document_id)
            .map_err(|source| RefResolutionError::Load {
                id: document_id.to_string(),
                source,
            })?
            .ok_or_else(|| RefResolutionError::SchemaFileNotFound(document_id.to_string()))?;

        let mut failures = Vec::new();
        for (name, def) in &doc.defs {
            for r in def.refs() {
                let base = r.base().unwrap_or(&doc.id);
                if let Err(e) = self.resolve_ref(&r.target, Some(base)) {
                    tracing::warn!(
                        document = %doc.id,
                        def = %name,
                        target = %r.target,
                        error = %e,
                        "unresolvable lexicon ref"
                    );
                    failures.push(e);
                }
            }
        }
        Ok(failures)
    }
}
