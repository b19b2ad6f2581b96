//! Integration tests for the shared core types.
//!
//! These tests exercise the public surface the other Strand crates rely on:
//! error conversion through the root type and value accessors used by
//! action handlers.

use serde_json::json;
use strand_core::value::{self, Value};
use strand_core::{ConcurrencyError, Error, LogLevel, Result};

fn add_two(input: &Value) -> Result<Value> {
    let number = value::as_i64(input)?;
    Ok(json!(number + 2))
}

fn lookup(name: &str) -> Result<()> {
    Err(ConcurrencyError::ActorNotFound(name.to_string()).into())
}

#[test]
fn test_question_mark_propagates_type_errors() {
    assert_eq!(add_two(&json!(1)).unwrap(), json!(3));

    match add_two(&json!("bla")) {
        Err(Error::Type(message)) => assert!(message.contains("string")),
        other => panic!("Expected type error, got {:?}", other),
    }
}

#[test]
fn test_concurrency_errors_wrap_into_root() {
    let error = lookup("ghost").unwrap_err();
    assert_eq!(
        error,
        Error::Concurrency(ConcurrencyError::ActorNotFound("ghost".into()))
    );
    assert_eq!(error.to_string(), "Concurrency error: Actor not found: ghost");
}

#[test]
fn test_errors_are_cloneable_for_multiple_observers() {
    let error = Error::Runtime("boom".into());
    let copies: Vec<Error> = (0..3).map(|_| error.clone()).collect();
    assert!(copies.iter().all(|copy| *copy == error));
}

#[test]
fn test_log_level_round_trip_through_config_text() {
    let level: LogLevel = "debug".parse().unwrap();
    assert_eq!(level.as_directive(), "debug");
    assert_eq!(level.to_string(), "DEBUG");
}
