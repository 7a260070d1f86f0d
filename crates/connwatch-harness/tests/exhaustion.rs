//! Pool exhaustion against a real SQLite database

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use connwatch_connection::DataSource;
use connwatch_connection::diagnostics::{DiagnosticEvent, DumpState, MemorySink};
use connwatch_core::ConnwatchError;
use connwatch_harness::{HarnessConfig, TestDataSource, init_test_logging};
use pretty_assertions::assert_eq;

fn harness(
    name: &str,
    max_connections: usize,
    max_wait_ms: u64,
) -> Result<(TestDataSource, Arc<MemorySink>)> {
    init_test_logging();
    let config = HarnessConfig {
        url: format!("file:{name}?mode=memory&cache=shared"),
        max_connections,
        max_wait_ms,
        ..HarnessConfig::default()
    };
    let sink = Arc::new(MemorySink::new());
    let factory = connwatch_driver_sqlite::SqliteConnectionFactory::new(config.url.clone());
    let source = TestDataSource::builder(config)
        .sink(sink.clone())
        .dump_state(Arc::new(DumpState::new()))
        .build(factory)?;
    Ok((source, sink))
}

#[tokio::test]
async fn exhausted_pool_reports_holders_newest_first() -> Result<()> {
    let (source, sink) = harness("exhaustion_report", 2, 100)?;

    let first = source.get_connection().await.context("first acquisition")?;
    let second = source.get_connection().await.context("second acquisition")?;
    first.execute("CREATE TABLE jobs (id INTEGER)", &[]).await?;

    let err = source
        .get_connection()
        .await
        .err()
        .context("third acquisition should time out")?;
    assert!(
        matches!(err, ConnwatchError::AcquisitionTimeout { max_size: 2, .. }),
        "unexpected error: {err}"
    );

    assert_eq!(source.recorder().failure_count(), 1);
    assert_eq!(source.recorder().report_count(), 1);
    assert_eq!(sink.failures(), 1);
    assert_eq!(sink.thread_dumps(), 1);

    let reports = sink.trace_reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    let newest = report
        .find("Previous request stack trace 0 (acquisition #2")
        .context("newest trace missing")?;
    let oldest = report
        .find("Previous request stack trace 1 (acquisition #1")
        .context("oldest trace missing")?;
    assert!(newest < oldest);

    drop(first);
    drop(second);
    let again = source.get_connection().await.context("reacquire after release")?;
    let result = again.query("SELECT COUNT(*) FROM jobs", &[]).await?;
    assert_eq!(result.row_count(), 1);
    Ok(())
}

#[tokio::test]
async fn thread_dump_only_on_first_failure() -> Result<()> {
    let (source, sink) = harness("exhaustion_repeat", 1, 20)?;
    let _held = source.get_connection().await?;

    for _ in 0..5 {
        let err = source.get_connection().await.err().context("should time out")?;
        assert!(err.is_acquisition_timeout());
    }

    assert_eq!(source.recorder().failure_count(), 5);
    assert_eq!(sink.failures(), 5);
    assert_eq!(sink.trace_reports().len(), 5);
    assert_eq!(sink.thread_dumps(), 1);
    assert!(matches!(
        sink.events().first(),
        Some(DiagnosticEvent::AcquisitionFailed { max_size: 1, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn failure_carries_pool_snapshot() -> Result<()> {
    let (source, sink) = harness("exhaustion_snapshot", 1, 20)?;
    let _held = source.get_connection().await?;
    assert!(source.get_connection().await.is_err());

    let stats = match sink.events().first() {
        Some(DiagnosticEvent::AcquisitionFailed { stats, .. }) => *stats,
        other => panic!("unexpected first event: {other:?}"),
    };
    let stats = stats.context("pool reports stats")?;
    assert_eq!(stats.max_size(), 1);
    assert_eq!(stats.active(), 1);
    assert_eq!(stats.idle(), 0);
    Ok(())
}

#[tokio::test]
async fn delay_holds_connections_long_enough_to_exhaust_pool() -> Result<()> {
    let (source, sink) = harness("exhaustion_delay", 1, 100)?;
    source.delay().enable(Duration::from_millis(500));

    let conn = source.get_connection().await?;
    let busy = tokio::spawn(async move { conn.query("SELECT 1", &[]).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = source
        .get_connection()
        .await
        .err()
        .context("pool should be exhausted while the statement is delayed")?;
    assert!(err.is_acquisition_timeout());
    assert_eq!(sink.failures(), 1);

    busy.await??;
    source.delay().disable();
    let conn = source.get_connection().await.context("connection came back")?;
    conn.query("SELECT 1", &[]).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquisitions_stay_within_capacity() -> Result<()> {
    let (source, sink) = harness("exhaustion_concurrent", 10, 5_000)?;
    let source = Arc::new(source);

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                let conn = source.get_connection().await?;
                conn.query("SELECT ?", &[connwatch_core::Value::Int64(i)]).await?;
                Ok::<_, ConnwatchError>(())
            })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result??;
    }

    let traces = source.recorder().recent_traces();
    assert_eq!(traces.len(), 10);
    let sequences: Vec<u64> = traces.iter().map(|t| t.sequence).collect();
    assert_eq!(sequences, (41..=50).rev().collect::<Vec<u64>>());
    assert_eq!(source.counter().snapshot().select, 50);
    assert_eq!(sink.failures(), 0);
    Ok(())
}
