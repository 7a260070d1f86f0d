//! Unit tests for harness configuration and wiring

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use connwatch_connection::DataSource;
use connwatch_connection::diagnostics::{DumpState, MemorySink};
use connwatch_connection::intercept::LogLevel;
use connwatch_core::ConnwatchError;
use indoc::indoc;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_defaults() {
    let config = HarnessConfig::default();
    assert_eq!(config.url, "file:connwatch_test?mode=memory&cache=shared");
    assert_eq!(config.username, "");
    assert_eq!(config.max_connections, 10);
    assert_eq!(config.min_connections, 0);
    assert_eq!(config.max_wait(), Duration::from_secs(30));
    assert_eq!(config.slow_query_threshold(), Duration::from_secs(10));
    assert_eq!(config.slow_query.level, LogLevel::Info);
    assert_eq!(config.delay(), None);
    assert_eq!(config.max_params, 1000);
    assert!(!config.mandatory_transaction.enabled);
    assert_eq!(config.mandatory_transaction.exempt_prefixes, vec!["PRAGMA"]);
    assert_eq!(config.capture_capacity, 1000);
}

#[test]
fn test_empty_toml_is_default() {
    let config = HarnessConfig::from_toml_str("").expect("parse");
    assert_eq!(config, HarnessConfig::default());
}

#[test]
fn test_parse_toml() {
    let config = HarnessConfig::from_toml_str(indoc! {r#"
        url = "file:orders?mode=memory&cache=shared"
        username = "sa"
        max_connections = 4
        max_wait_ms = 2000
        delay_ms = 50
        max_params = 10

        [slow_query]
        threshold_ms = 250
        level = "warn"

        [mandatory_transaction]
        enabled = true
        exempt_prefixes = ["PRAGMA", "SET"]
    "#})
    .expect("parse");

    assert_eq!(config.url, "file:orders?mode=memory&cache=shared");
    assert_eq!(config.username, "sa");
    assert_eq!(config.password, "");
    assert_eq!(config.max_connections, 4);
    assert_eq!(config.max_wait(), Duration::from_secs(2));
    assert_eq!(config.delay(), Some(Duration::from_millis(50)));
    assert_eq!(config.max_params, 10);
    assert_eq!(config.slow_query_threshold(), Duration::from_millis(250));
    assert_eq!(config.slow_query.level, LogLevel::Warn);
    assert!(config.mandatory_transaction.enabled);
    assert_eq!(config.mandatory_transaction.exempt_prefixes, vec!["PRAGMA", "SET"]);

    let pool = config.pool_config();
    assert_eq!(pool.max_size(), 4);
    assert_eq!(pool.acquire_timeout(), Duration::from_secs(2));
}

#[rstest]
#[case("max_connections = 0", "greater than 0")]
#[case("min_connections = 5\nmax_connections = 2", "cannot exceed")]
#[case("url = \"  \"", "must not be empty")]
#[case("max_connections = \"many\"", "Invalid harness config")]
#[case("[slow_query]\nlevel = \"loud\"", "Invalid harness config")]
fn test_invalid_toml(#[case] toml: &str, #[case] message: &str) {
    let err = HarnessConfig::from_toml_str(toml).unwrap_err();
    assert!(
        matches!(err, ConnwatchError::Configuration(ref m) if m.contains(message)),
        "unexpected error: {err}"
    );
}

#[test]
fn test_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("connwatch.toml");
    std::fs::write(&path, "max_connections = 3\n").expect("write");

    let config = HarnessConfig::from_file(&path).expect("load");
    assert_eq!(config.max_connections, 3);

    let missing = HarnessConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(missing, ConnwatchError::Io(_)));
}

#[test]
fn test_overrides() {
    let vars = env(&[
        ("CONNWATCH_URL", "file:override?mode=memory&cache=shared"),
        ("CONNWATCH_MAX_CONNECTIONS", "3"),
        ("CONNWATCH_MAX_WAIT_MS", " 1500 "),
        ("CONNWATCH_DELAY_MS", "20"),
    ]);
    let config = HarnessConfig::default()
        .with_overrides_from(|key| vars.get(key).cloned())
        .expect("overrides");

    assert_eq!(config.url, "file:override?mode=memory&cache=shared");
    assert_eq!(config.max_connections, 3);
    assert_eq!(config.max_wait_ms, 1500);
    assert_eq!(config.delay(), Some(Duration::from_millis(20)));
}

#[test]
fn test_zero_delay_override_disables_delay() {
    let config = HarnessConfig {
        delay_ms: Some(100),
        ..HarnessConfig::default()
    };
    let vars = env(&[("CONNWATCH_DELAY_MS", "0")]);
    let config = config
        .with_overrides_from(|key| vars.get(key).cloned())
        .expect("overrides");
    assert_eq!(config.delay(), None);
}

#[rstest]
#[case("CONNWATCH_MAX_CONNECTIONS", "ten")]
#[case("CONNWATCH_MAX_CONNECTIONS", "0")]
#[case("CONNWATCH_MAX_WAIT_MS", "-1")]
fn test_invalid_override(#[case] key: &str, #[case] value: &str) {
    let vars = env(&[(key, value)]);
    let err = HarnessConfig::default()
        .with_overrides_from(|k| vars.get(k).cloned())
        .unwrap_err();
    assert!(matches!(err, ConnwatchError::Configuration(_)));
}

#[tokio::test]
async fn test_build_wires_listeners_from_config() {
    init_test_logging();
    let config = HarnessConfig {
        url: "file:harness_unit_wiring?mode=memory&cache=shared".into(),
        max_connections: 3,
        delay_ms: Some(5),
        mandatory_transaction: MandatoryTransactionConfig {
            enabled: true,
            ..MandatoryTransactionConfig::default()
        },
        ..HarnessConfig::default()
    };
    let sink = Arc::new(MemorySink::new());
    let source = TestDataSource::builder(config)
        .sink(sink.clone())
        .dump_state(Arc::new(DumpState::new()))
        .build(connwatch_driver_sqlite::SqliteConnectionFactory::new(
            "file:harness_unit_wiring?mode=memory&cache=shared",
        ))
        .expect("build");

    assert_eq!(source.max_size(), 3);
    assert_eq!(source.recorder().capacity(), 3);
    assert_eq!(source.delay().delay(), Some(Duration::from_millis(5)));
    assert!(source.transaction_guard().is_enabled());
    assert_eq!(source.capture().capacity(), 1000);
    assert!(source.stats().is_some());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_with_factory_serves_statements() {
    let url = "file:harness_unit_factory?mode=memory&cache=shared";
    let config = HarnessConfig {
        url: url.into(),
        max_connections: 1,
        ..HarnessConfig::default()
    };
    let source = TestDataSource::with_factory(
        config,
        connwatch_driver_sqlite::SqliteConnectionFactory::new(url),
    )
    .expect("build");

    let conn = source.get_connection().await.expect("acquire");
    let result = conn.query("SELECT 1 + 1", &[]).await.expect("query");
    assert_eq!(result.rows[0].get(0).and_then(|v| v.as_i64()), Some(2));
    assert_eq!(source.recorder().captured_count(), 1);
    assert_eq!(source.counter().snapshot().select, 1);

    drop(conn);
    source.close().await;
    assert!(source.get_connection().await.is_err());
}

#[test]
fn test_build_rejects_invalid_config() {
    let config = HarnessConfig {
        max_connections: 0,
        ..HarnessConfig::default()
    };
    let err = TestDataSource::build(config).err().expect("invalid config");
    assert!(matches!(err, ConnwatchError::Configuration(_)));
}
