//! End-to-end tests of the runtime facade with the fan-out application.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use strand_concurrency::deferred::multi_async;
use strand_core::{Error, Value};
use strand_runtime::system::config::ApplicationConfig;
use strand_runtime::{Runtime, RuntimeConfig};
use tempfile::NamedTempFile;

fn fanout_config(workers: usize, cfg: Value) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.shutdown_timeout = 5;
    config.applications.insert(
        "fanout".to_string(),
        ApplicationConfig {
            workers: Some(workers),
            cfg,
        },
    );
    config
}

#[test]
fn test_fanout_reports_to_monitor() -> Result<()> {
    let runtime = Runtime::new(fanout_config(2, json!({"delay_ms": 1, "tag": "it"})))?;
    runtime.start()?;

    let handle = runtime.run_application("fanout")?;
    assert_eq!(handle["monitor"]["name"], json!("fanout"));
    assert_eq!(
        handle["workers"],
        json!(["fanout-worker-0", "fanout-worker-1"])
    );

    let replies = vec![
        runtime.send("fanout-worker-0", "run_task", vec![json!(3)])?,
        runtime.send("fanout-worker-1", "run_task", vec![json!(4)])?,
    ];
    let outcomes = multi_async(replies).wait(Duration::from_secs(5)).unwrap();
    let sums: Vec<Value> = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap()["sum"].clone())
        .collect();
    assert_eq!(sums, vec![json!(14), json!(30)]);

    let results = runtime.request("fanout", "results", vec![])?;
    assert_eq!(results.as_array().map(Vec::len), Some(2));
    assert_eq!(results[0]["tag"], json!("it"));

    let summary = runtime.request("fanout", "summary", vec![])?;
    assert_eq!(summary["tasks"], json!(2));
    assert_eq!(summary["sum"], json!(44));

    runtime.shutdown()?;
    assert!(runtime.list_actors()?.is_empty());
    Ok(())
}

#[test]
fn test_invalid_task_fails_without_report() -> Result<()> {
    let runtime = Runtime::new(fanout_config(1, Value::Null))?;
    runtime.start()?;
    runtime.run_application("fanout")?;

    let failure = runtime
        .send("fanout-worker-0", "run_task", vec![json!(-1)])?
        .wait(Duration::from_secs(5))
        .unwrap_err();
    assert!(matches!(failure.error(), Error::Value(_)));

    let failure = runtime
        .send("fanout-worker-0", "run_task", vec![json!("ten")])?
        .wait(Duration::from_secs(5))
        .unwrap_err();
    assert!(matches!(failure.error(), Error::Type(_)));

    assert_eq!(runtime.request("fanout", "results", vec![])?, json!([]));
    runtime.shutdown()
}

#[test]
fn test_configured_send_timeout() -> Result<()> {
    let mut config = fanout_config(1, json!({"delay_ms": 200}));
    config.send_timeout_ms = Some(20);

    let runtime = Runtime::new(config)?;
    runtime.start()?;
    runtime.run_application("fanout")?;

    let reply = runtime.send("fanout-worker-0", "run_task", vec![json!(2)])?;
    let failure = reply.wait(Duration::from_secs(5)).unwrap_err();
    assert!(failure.is_timeout());

    runtime.shutdown()
}

#[test]
fn test_runtime_from_config_file() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(
        br#"{
            "shutdown_timeout": 5,
            "applications": { "fanout": { "workers": 3 } }
        }"#,
    )?;

    let runtime = Runtime::from_path(Some(file.path()))?;
    runtime.start()?;

    let handle = runtime.run_application("fanout")?;
    assert_eq!(handle["workers"].as_array().map(Vec::len), Some(3));
    assert_eq!(runtime.list_actors()?.len(), 5);

    runtime.shutdown()
}

#[test]
fn test_unknown_application() -> Result<()> {
    let runtime = Runtime::new(RuntimeConfig::default())?;
    assert!(runtime.run_application("fanout").is_err());

    runtime.start()?;
    let error = runtime.run_application("missing").unwrap_err();
    assert!(error.to_string().contains("missing"));
    runtime.shutdown()
}
