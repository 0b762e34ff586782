//! Schema repository
//!
//! The repository maps an identifier to a schema file under one or more root
//! directories and caches every parsed document by identifier, so a document
//! is parsed at most once per repository.
//!
//! `com.example.foo` is looked up as `<root>/com/example/foo.json` in each
//! configured root, in order; the first root containing the file wins.
//!
//! # Example
//!
//! ```rust
//! use atproto_lexicon::lexicon::SchemaRepository;
//!
//! let repository = SchemaRepository::in_memory();
//! let doc = repository
//!     .parser()
//!     .parse_document(r#"{"lexicon": 1, "id": "com.example.foo"}"#)
//!     .unwrap();
//!
//! assert!(repository.contains(&doc.id));
//! ```
//!
//! The repository is a single-threaded shared handle (`Rc`); hosts that drive
//! parsing from several threads need one repository per thread.

use super::parsing::{LexiconParseError, LexiconParser};
use super::schema::LexiconDoc;
use crate::nsid::Nsid;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use thiserror::Error;

/// Environment variable holding a platform path list of schema roots
pub const LEXICON_PATH_ENV: &str = "LEXICON_PATH";

/// Errors raised by the repository
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A configured root directory does not exist
    #[error("Schema root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// A schema file could not be read
    #[error("Failed to read schema file {}: {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A schema file did not parse as a Lexicon document
    #[error("Failed to parse schema file {}: {source}", path.display())]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: Box<LexiconParseError>,
    },

    /// A schema file declares a different identifier than its location implies
    #[error("Schema file {} declares id '{found}', expected '{expected}'", path.display())]
    IdMismatch {
        /// File being parsed
        path: PathBuf,
        /// Identifier the file was located by
        expected: String,
        /// Identifier declared inside the file
        found: String,
    },
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Configuration for a [`SchemaRepository`]
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Root directories searched in order
    pub roots: Vec<PathBuf>,
    /// Maximum number of hops when following a chain of refs
    pub max_resolution_depth: usize,
    /// Fail construction when a root does not exist
    pub require_existing_roots: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            max_resolution_depth: RepositoryConfig::DEFAULT_MAX_DEPTH,
            require_existing_roots: true,
        }
    }
}

impl RepositoryConfig {
    /// Default maximum resolution depth
    pub const DEFAULT_MAX_DEPTH: usize = 32;

    /// Create a config with a single root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ..Default::default()
        }
    }

    /// Read roots from the `LEXICON_PATH` environment variable
    pub fn from_env() -> Self {
        let roots = std::env::var_os(LEXICON_PATH_ENV)
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        Self {
            roots,
            ..Default::default()
        }
    }

    /// Append a root directory
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Set the maximum resolution depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// Allow roots that do not exist (they are skipped at lookup time)
    pub fn allow_missing_roots(mut self) -> Self {
        self.require_existing_roots = false;
        self
    }
}

struct RepositoryInner {
    config: RepositoryConfig,
    documents: RefCell<HashMap<Nsid, Rc<LexiconDoc>>>,
}

/// Shared handle to a schema cache backed by root directories
///
/// Cloning the handle shares the cache.
#[derive(Clone)]
pub struct SchemaRepository {
    inner: Rc<RepositoryInner>,
}

/// Non-owning handle to a [`SchemaRepository`]
///
/// Held by parsed ref nodes so that cached documents do not keep their
/// repository alive.
#[derive(Clone)]
pub struct WeakSchemaRepository(Weak<RepositoryInner>);

impl WeakSchemaRepository {
    /// Recover the repository if it is still alive
    pub fn upgrade(&self) -> Option<SchemaRepository> {
        self.0.upgrade().map(|inner| SchemaRepository { inner })
    }
}

impl SchemaRepository {
    /// Create a repository from a config
    ///
    /// Fails with [`RepositoryError::RootNotFound`] when a root is missing and
    /// the config requires existing roots.
    pub fn new(config: RepositoryConfig) -> Result<Self> {
        if config.require_existing_roots {
            if let Some(missing) = config.roots.iter().find(|root| !root.is_dir()) {
                return Err(RepositoryError::RootNotFound(missing.clone()));
            }
        }
        Ok(Self::from_config(config))
    }

    /// Create a repository with no roots
    ///
    /// Documents enter it only by being parsed through [`Self::parser`].
    pub fn in_memory() -> Self {
        Self::from_config(RepositoryConfig::default())
    }

    fn from_config(config: RepositoryConfig) -> Self {
        Self {
            inner: Rc::new(RepositoryInner {
                config,
                documents: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The repository configuration
    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    /// Configured root directories
    pub fn roots(&self) -> &[PathBuf] {
        &self.inner.config.roots
    }

    /// A parser that caches documents in this repository and produces
    /// resolvable refs
    pub fn parser(&self) -> LexiconParser {
        LexiconParser::with_repository(self.clone())
    }

    /// Non-owning handle to this repository
    pub fn downgrade(&self) -> WeakSchemaRepository {
        WeakSchemaRepository(Rc::downgrade(&self.inner))
    }

    /// Whether two handles share the same cache
    pub fn ptr_eq(&self, other: &SchemaRepository) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Cached document for an identifier (the fragment is ignored)
    pub fn get(&self, id: &Nsid) -> Option<Rc<LexiconDoc>> {
        self.inner.documents.borrow().get(&id.document_id()).cloned()
    }

    /// Whether a document is cached for an identifier
    pub fn contains(&self, id: &Nsid) -> bool {
        self.inner.documents.borrow().contains_key(&id.document_id())
    }

    /// Cache a document under its own id (last write wins)
    pub fn store(&self, doc: Rc<LexiconDoc>) {
        let key = doc.id.document_id();
        tracing::debug!(id = %key, "caching lexicon document");
        self.inner.documents.borrow_mut().insert(key, doc);
    }

    /// Number of cached documents
    pub fn len(&self) -> usize {
        self.inner.documents.borrow().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.documents.borrow().is_empty()
    }

    /// Identifiers of all cached documents
    pub fn ids(&self) -> Vec<Nsid> {
        let mut ids: Vec<Nsid> = self.inner.documents.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Locate the schema file for an identifier
    ///
    /// Returns `None` when no root contains the file.
    pub fn locate(&self, id: &Nsid) -> Option<PathBuf> {
        let relative = id.relative_path();
        for root in self.roots() {
            if !root.is_dir() {
                tracing::warn!(root = %root.display(), "skipping missing schema root");
                continue;
            }
            let candidate = root.join(&relative);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Load the document for an identifier, parsing its file on first use
    ///
    /// Returns `Ok(None)` when the document is neither cached nor present
    /// under any root.
    pub fn load(&self, id: &Nsid) -> Result<Option<Rc<LexiconDoc>>> {
        if let Some(doc) = self.get(id) {
            return Ok(Some(doc));
        }
        match self.locate(id) {
            Some(path) => self.load_file(id, &path).map(Some),
            None => Ok(None),
        }
    }

    fn load_file(&self, id: &Nsid, path: &Path) -> Result<Rc<LexiconDoc>> {
        tracing::debug!(id = %id.document_id(), path = %path.display(), "reading schema file");

        let text = std::fs::read_to_string(path)
            .map_err(|source| RepositoryError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let doc = self.parser().parse_document(text.as_str()).map_err(|source| {
            RepositoryError::Parse {
                path: path.to_path_buf(),
                source: Box::new(source),
            }
        })?;

        if doc.id.document_id() != id.document_id() {
            return Err(RepositoryError::IdMismatch {
                path: path.to_path_buf(),
                expected: id.document_id().to_string(),
                found: doc.id.to_string(),
            });
        }

        Ok(doc)
    }
}

impl fmt::Debug for SchemaRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRepository")
            .field("roots", &self.inner.config.roots)
            .field("documents", &self.len())
            .finish()
    }
}

impl fmt::Debug for WeakSchemaRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakSchemaRepository").field(&(self.0.strong_count() > 0)).finish()
    }
}
