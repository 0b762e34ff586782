//! Lexicon schema parsing and reference resolution
//!
//! This module implements the AT Protocol Lexicon schema system, which is used
//! to define the structure of records, XRPC endpoints, and event streams.
//!
//! Reference: <https://atproto.com/specs/lexicon>
//!
//! # Overview
//!
//! A Lexicon document is a JSON object naming itself with an NSID and holding
//! a map of named definitions. Each definition is a typed node:
//!
//! - **Records**: Objects stored in repositories
//! - **Queries**: HTTP GET endpoints (XRPC)
//! - **Procedures**: HTTP POST endpoints (XRPC)
//! - **Subscriptions**: WebSocket event streams
//! - **Field types**: primitives, blobs, arrays, objects, refs, and unions
//!
//! [`LexiconParser`] turns JSON into [`LexiconDoc`] and [`LexType`] values.
//! A [`SchemaRepository`] maps identifiers to files under its roots, caches
//! every parsed document by identity, and lets `ref` and `union` nodes resolve
//! their targets lazily.
//!
//! # Example
//!
//! ```rust
//! use atproto_lexicon::lexicon::{LexType, SchemaRepository, StringFormat};
//!
//! let json = r#"{
//!   "lexicon": 1,
//!   "id": "com.example.getRecord",
//!   "defs": {
//!     "main": {
//!       "type": "query",
//!       "parameters": {
//!         "type": "params",
//!         "properties": {
//!           "uri": {
//!             "type": "string",
//!             "format": "at-uri"
//!           }
//!         }
//!       }
//!     }
//!   }
//! }"#;
//!
//! let repository = SchemaRepository::in_memory();
//! let doc = repository.parser().parse_document(json).unwrap();
//!
//! let LexType::Query(query) = doc.main_def().unwrap().as_ref() else {
//!     panic!("expected a query");
//! };
//! let uri = &query.parameters.as_ref().unwrap().properties["uri"];
//! assert_eq!(uri.as_string().unwrap().format, Some(StringFormat::AtUri));
//! ```

pub mod constraints;
pub mod formats;
pub mod parsing;
pub mod repository;
pub mod resolution;
pub mod schema;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use constraints::*;
pub use formats::*;
pub use schema::*;
pub use types::*;

// Module Result aliases stay behind their module paths
pub use parsing::{LexiconParseError, LexiconParser, LexiconSource, Parsed};
pub use repository::{
    RepositoryConfig, RepositoryError, SchemaRepository, WeakSchemaRepository, LEXICON_PATH_ENV,
};
pub use resolution::{parse_ref, RefResolutionError, RefResolver};
pub use validation::{BasicFormatValidator, FormatValidator, ValidationError};
