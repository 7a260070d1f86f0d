//! Statement listeners against a real SQLite database

use anyhow::{Context, Result};
use connwatch_connection::DataSource;
use connwatch_connection::intercept::{QueryKind, TransactionMethod};
use connwatch_core::{ConnwatchError, Value};
use connwatch_harness::{HarnessConfig, MandatoryTransactionConfig, TestDataSource, init_test_logging};
use pretty_assertions::assert_eq;

fn config(name: &str) -> HarnessConfig {
    init_test_logging();
    HarnessConfig {
        url: format!("file:{name}?mode=memory&cache=shared"),
        max_connections: 2,
        max_wait_ms: 1_000,
        ..HarnessConfig::default()
    }
}

#[tokio::test]
async fn counts_and_captures_statements() -> Result<()> {
    let source = TestDataSource::build(config("listeners_counts"))?;
    let conn = source.get_connection().await?;

    conn.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .await?;
    for (id, name) in [(1, "bolt"), (2, "nut")] {
        conn.execute(
            "INSERT INTO items (id, name) VALUES (?, ?)",
            &[Value::Int64(id), Value::from(name)],
        )
        .await?;
    }
    conn.execute("UPDATE items SET name = ? WHERE id = ?", &[Value::from("washer"), Value::Int64(2)])
        .await?;
    let rows = conn.query("SELECT name FROM items ORDER BY id", &[]).await?;
    assert_eq!(rows.row_count(), 2);
    conn.execute("DELETE FROM items WHERE id = 1", &[]).await?;
    let missing = conn.query("SELECT * FROM nowhere", &[]).await;
    assert!(missing.is_err());

    let count = source.counter().snapshot();
    assert_eq!(count.other, 1);
    assert_eq!(count.insert, 2);
    assert_eq!(count.update, 1);
    assert_eq!(count.select, 2);
    assert_eq!(count.delete, 1);
    assert_eq!(count.failure, 1);
    assert_eq!(count.total(), 7);

    let inserts = source.capture().queries_of_kind(QueryKind::Insert);
    assert_eq!(inserts.len(), 2);
    assert!(inserts.iter().all(|q| q.param_count == 2 && q.success));
    let failed: Vec<_> = source.capture().captured().into_iter().filter(|q| !q.success).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().is_some_and(|e| e.contains("no such table")));
    Ok(())
}

#[tokio::test]
async fn param_limit_rejects_large_in_lists() -> Result<()> {
    let source = TestDataSource::build(HarnessConfig {
        max_params: 3,
        ..config("listeners_params")
    })?;
    let conn = source.get_connection().await?;

    let ok = conn
        .query("SELECT ? + ? + ?", &[Value::Int64(1), Value::Int64(2), Value::Int64(3)])
        .await?;
    assert_eq!(ok.rows[0].get(0), Some(&Value::Int64(6)));

    let params: Vec<Value> = (0..4).map(Value::Int64).collect();
    let err = conn
        .query("SELECT ? + ? + ? + ?", &params)
        .await
        .err()
        .context("four parameters should be rejected")?;
    assert!(matches!(err, ConnwatchError::Query(_)));
    assert_eq!(source.counter().snapshot().total(), 1);
    Ok(())
}

#[tokio::test]
async fn mandatory_transaction_guard() -> Result<()> {
    let source = TestDataSource::build(HarnessConfig {
        mandatory_transaction: MandatoryTransactionConfig {
            enabled: true,
            ..MandatoryTransactionConfig::default()
        },
        ..config("listeners_guard")
    })?;
    let conn = source.get_connection().await?;

    conn.execute("PRAGMA foreign_keys = ON", &[]).await?;
    let err = conn
        .execute("CREATE TABLE t (v INTEGER)", &[])
        .await
        .err()
        .context("statement outside a transaction should be rejected")?;
    assert!(matches!(err, ConnwatchError::Query(ref m) if m.contains("outside of a transaction")));

    let tx = conn.begin_transaction().await?;
    tx.execute("CREATE TABLE t (v INTEGER)", &[]).await?;
    tx.execute("INSERT INTO t VALUES (1)", &[]).await?;
    tx.commit().await?;

    source.transaction_guard().set_enabled(false);
    let result = conn.query("SELECT v FROM t", &[]).await?;
    assert_eq!(result.rows[0].get(0), Some(&Value::Int64(1)));

    let in_tx: Vec<bool> = source
        .capture()
        .captured()
        .iter()
        .map(|q| q.in_transaction)
        .collect();
    assert_eq!(in_tx, vec![false, true, true, false]);
    Ok(())
}

#[tokio::test]
async fn task_capture_and_transaction_methods() -> Result<()> {
    let source = TestDataSource::build(config("listeners_task_capture"))?;
    let setup = source.get_connection().await?;
    setup.execute("CREATE TABLE notes (body TEXT)", &[]).await?;

    let (result, captured) = source
        .task_capture()
        .capture(async {
            let conn = source.get_connection().await?;
            let tx = conn.begin_transaction().await?;
            tx.execute("INSERT INTO notes VALUES (?)", &[Value::from("scoped")])
                .await?;
            tx.commit().await?;
            Ok::<_, ConnwatchError>(())
        })
        .await;
    result?;
    setup.query("SELECT body FROM notes", &[]).await?;

    let sql: Vec<&str> = captured.iter().map(|q| q.sql.as_str()).collect();
    assert_eq!(sql, vec!["INSERT INTO notes VALUES (?)"]);
    assert!(captured[0].in_transaction);

    let methods: Vec<TransactionMethod> = source
        .capture()
        .captured_methods()
        .iter()
        .map(|m| m.method)
        .collect();
    assert_eq!(methods, vec![TransactionMethod::Begin, TransactionMethod::Commit]);
    assert_eq!(source.capture().len(), 3);
    Ok(())
}
