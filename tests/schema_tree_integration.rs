//! Schema Tree Integration Tests
//!
//! End-to-end tests over a multi-root schema tree: configuration, lazy
//! loading, identity caching, and whole-document reference checks.

use atproto_lexicon::lexicon::{
    LexKind, RefResolutionError, RepositoryConfig, RepositoryError, SchemaRepository,
};
use atproto_lexicon::{Error, Nsid};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write_schema(root: &Path, id: &str, body: Value) {
    let path = root.join(Nsid::parse(id).unwrap().relative_path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body.to_string()).unwrap();
}

/// A small tree split across two roots: a shared root with common defs and an
/// app root with records and methods that point into it
fn build_tree() -> (TempDir, TempDir) {
    let shared = TempDir::new().unwrap();
    let app = TempDir::new().unwrap();

    write_schema(
        shared.path(),
        "com.example.repo.strongRef",
        json!({
            "lexicon": 1,
            "id": "com.example.repo.strongRef",
            "defs": {
                "main": {
                    "type": "object",
                    "required": ["uri", "cid"],
                    "properties": {
                        "uri": { "type": "string", "format": "at-uri" },
                        "cid": { "type": "string", "format": "cid" }
                    }
                }
            }
        }),
    );
    write_schema(
        shared.path(),
        "com.example.embed.images",
        json!({
            "lexicon": 1,
            "id": "com.example.embed.images",
            "defs": {
                "main": {
                    "type": "object",
                    "properties": {
                        "images": {
                            "type": "array",
                            "items": { "type": "ref", "ref": "#image" },
                            "maxLength": 4
                        }
                    }
                },
                "image": {
                    "type": "object",
                    "properties": {
                        "image": { "type": "image", "accept": ["image/*"], "maxSize": 1000000 },
                        "alt": { "type": "string" }
                    }
                }
            }
        }),
    );
    write_schema(
        app.path(),
        "com.example.feed.like",
        json!({
            "lexicon": 1,
            "id": "com.example.feed.like",
            "defs": {
                "main": {
                    "type": "record",
                    "key": "tid",
                    "record": {
                        "type": "object",
                        "required": ["subject", "createdAt"],
                        "properties": {
                            "subject": { "type": "ref", "ref": "com.example.repo.strongRef" },
                            "createdAt": { "type": "string", "format": "datetime" }
                        }
                    }
                }
            }
        }),
    );
    write_schema(
        app.path(),
        "com.example.feed.getPost",
        json!({
            "lexicon": 1,
            "id": "com.example.feed.getPost",
            "defs": {
                "main": {
                    "type": "query",
                    "parameters": {
                        "type": "params",
                        "required": ["uri"],
                        "properties": { "uri": { "type": "string", "format": "at-uri" } }
                    },
                    "output": {
                        "encoding": "application/json",
                        "schema": {
                            "type": "object",
                            "properties": {
                                "embed": {
                                    "type": "union",
                                    "refs": ["com.example.embed.images", "com.example.embed.video"]
                                },
                                "subject": { "type": "ref", "ref": "com.example.repo.strongRef" }
                            }
                        }
                    },
                    "errors": [{ "name": "NotFound" }]
                }
            }
        }),
    );

    (shared, app)
}

#[test]
fn test_tree_loads_lazily_across_roots() {
    init_tracing();
    let (shared, app) = build_tree();
    let repository = SchemaRepository::new(
        RepositoryConfig::new(app.path()).with_root(shared.path()),
    )
    .unwrap();
    assert!(repository.is_empty());

    let like = repository.load(&Nsid::parse("com.example.feed.like").unwrap()).unwrap().unwrap();
    // only the requested document has been read
    assert_eq!(repository.len(), 1);

    let record = like.main_def().unwrap().as_record().unwrap();
    let subject = record.record.properties["subject"].as_ref_node().unwrap();
    let strong_ref = subject.resolve().unwrap();
    assert_eq!(strong_ref.kind(), LexKind::Object);
    assert_eq!(repository.len(), 2);

    // a second resolution reuses the cached document
    assert!(Rc::ptr_eq(&strong_ref, &subject.resolve().unwrap()));
    assert_eq!(repository.len(), 2);
}

#[test]
fn test_check_references_reports_every_failure() {
    init_tracing();
    let (shared, app) = build_tree();
    let repository = SchemaRepository::new(
        RepositoryConfig::new(app.path()).with_root(shared.path()),
    )
    .unwrap();

    let like = Nsid::parse("com.example.feed.like").unwrap();
    assert!(repository.check_references(&like).unwrap().is_empty());

    let get_post = Nsid::parse("com.example.feed.getPost").unwrap();
    let failures = repository.check_references(&get_post).unwrap();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        RefResolutionError::SchemaFileNotFound(id) if id == "com.example.embed.video"
    ));

    let images = Nsid::parse("com.example.embed.images").unwrap();
    assert!(repository.check_references(&images).unwrap().is_empty());
}

#[test]
fn test_union_in_query_output() {
    let (shared, app) = build_tree();
    let repository = SchemaRepository::new(
        RepositoryConfig::new(app.path()).with_root(shared.path()),
    )
    .unwrap();

    let output = repository
        .resolve(&Nsid::parse("com.example.feed.getPost").unwrap())
        .unwrap();
    let atproto_lexicon::LexType::Query(query) = output.as_ref() else {
        panic!("expected a query");
    };
    let schema = query.output.as_ref().unwrap().schema.as_ref().unwrap();
    let embed = schema.as_object().unwrap().properties["embed"].as_union().unwrap();

    assert!(matches!(embed.resolve(), Err(RefResolutionError::SchemaFileNotFound(_))));
    let first = embed.refs[0].resolve().unwrap();
    assert_eq!(first.kind(), LexKind::Object);
}

#[test]
fn test_missing_roots() {
    let gone = TempDir::new().unwrap().path().join("missing");

    let err = SchemaRepository::new(RepositoryConfig::new(&gone)).unwrap_err();
    assert!(matches!(err, RepositoryError::RootNotFound(ref p) if *p == gone));
    assert!(Error::from(err).to_string().contains("missing"));

    let lenient =
        SchemaRepository::new(RepositoryConfig::new(&gone).allow_missing_roots()).unwrap();
    assert!(lenient.load(&Nsid::parse("com.example.foo").unwrap()).unwrap().is_none());
}

#[test]
fn test_errors_convert_into_crate_error() {
    let repository = SchemaRepository::in_memory();

    fn resolve(repository: &SchemaRepository, target: &str) -> atproto_lexicon::Result<LexKind> {
        let id = Nsid::parse(target)?;
        Ok(repository.resolve(&id)?.kind())
    }

    assert!(matches!(resolve(&repository, "bad"), Err(Error::Nsid(_))));
    assert!(matches!(resolve(&repository, "com.example.none"), Err(Error::Resolution(_))));
}
