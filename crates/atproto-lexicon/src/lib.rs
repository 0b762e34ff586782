//! AT Protocol Lexicon schemas
//!
//! This crate parses Lexicon schema documents into a typed in-memory model,
//! validates their identifiers, and resolves `ref` and `union` targets across
//! documents on demand through a [`SchemaRepository`](lexicon::SchemaRepository).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lexicon;
pub mod nsid;

pub use lexicon::{LexType, LexiconDoc, LexiconParser, SchemaRepository};
pub use nsid::Nsid;

/// Result type for Lexicon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Lexicon operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed identifier
    #[error(transparent)]
    Nsid(#[from] nsid::NsidError),

    /// Schema JSON could not be parsed
    #[error(transparent)]
    Parse(#[from] lexicon::LexiconParseError),

    /// Repository setup or file loading failed
    #[error(transparent)]
    Repository(#[from] lexicon::RepositoryError),

    /// A reference could not be resolved
    #[error(transparent)]
    Resolution(#[from] lexicon::RefResolutionError),

    /// A value did not satisfy its string schema
    #[error(transparent)]
    Validation(#[from] lexicon::ValidationError),
}
