#![cfg(feature = "sqlite")]

mod common;

use common::{FileCleanup, unique_path};
use sql_pool::prelude::*;

fn pool_with_table(path: &str) -> Result<ConnectionPool, SqlError> {
    let url: DbUrl = format!("sqlite://{path}").parse()?;
    let pool = ConnectionPool::new(url)?;
    pool.set_initial_connections(1);
    pool.set_max_connections(3);
    pool.set_reaper_enabled(false);
    pool.start()?;

    let mut conn = pool.get_connection()?;
    conn.execute("CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance REAL);")?;
    drop(conn);
    Ok(pool)
}

fn count_rows(conn: &mut Connection) -> Result<i64, SqlError> {
    let mut rows = conn.execute_query("SELECT COUNT(*) FROM accounts")?;
    rows.next()?;
    rows.get_llong(1)
}

#[test]
fn commit_makes_changes_visible() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("tx_commit");
    let _cleanup = FileCleanup(vec![path.clone()]);
    let pool = pool_with_table(&path)?;

    let mut conn = pool.get_connection()?;
    conn.begin_transaction()?;
    assert!(conn.in_transaction());
    conn.execute("INSERT INTO accounts (balance) VALUES (100.0);")?;
    conn.execute("INSERT INTO accounts (balance) VALUES (200.0);")?;
    conn.commit()?;
    assert!(!conn.in_transaction());
    drop(conn);

    let mut conn = pool.get_connection()?;
    assert_eq!(count_rows(&mut conn)?, 2);
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn releasing_mid_transaction_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("tx_autorollback");
    let _cleanup = FileCleanup(vec![path.clone()]);
    let pool = pool_with_table(&path)?;

    let mut conn = pool.get_connection()?;
    conn.begin_transaction()?;
    conn.execute("INSERT INTO accounts (balance) VALUES (1.0);")?;
    conn.execute("INSERT INTO accounts (balance) VALUES (2.0);")?;
    // Return without commit; the pool rolls the transaction back.
    conn.close();

    let mut conn = pool.get_connection()?;
    assert!(!conn.in_transaction());
    assert_eq!(count_rows(&mut conn)?, 0);
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn explicit_rollback_discards_changes() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("tx_rollback");
    let _cleanup = FileCleanup(vec![path.clone()]);
    let pool = pool_with_table(&path)?;

    let mut conn = pool.get_connection()?;
    conn.begin_transaction()?;
    conn.execute("INSERT INTO accounts (balance) VALUES (1.0);")?;
    conn.rollback()?;
    assert!(!conn.in_transaction());
    assert_eq!(count_rows(&mut conn)?, 0);
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn nested_begin_is_a_checked_error() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("tx_nested");
    let _cleanup = FileCleanup(vec![path.clone()]);
    let pool = pool_with_table(&path)?;

    let mut conn = pool.get_connection()?;
    conn.begin_transaction()?;
    let err = conn.begin_transaction().unwrap_err();
    assert!(err.to_string().contains("nested"));
    // The original transaction is still usable.
    assert!(conn.in_transaction());
    conn.rollback()?;
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn commit_without_begin_is_a_checked_error() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("tx_nobegin");
    let _cleanup = FileCleanup(vec![path.clone()]);
    let pool = pool_with_table(&path)?;

    let mut conn = pool.get_connection()?;
    assert!(conn.commit().is_err());
    assert!(conn.rollback().is_err());
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn sqlite_transaction_types() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("tx_types");
    let _cleanup = FileCleanup(vec![path.clone()]);
    let pool = pool_with_table(&path)?;

    let mut conn = pool.get_connection()?;
    for tx_type in [
        TransactionType::Default,
        TransactionType::Serializable,
        TransactionType::Immediate,
        TransactionType::Exclusive,
    ] {
        conn.begin_transaction_type(tx_type)?;
        conn.execute("INSERT INTO accounts (balance) VALUES (0.0);")?;
        conn.commit()?;
    }
    assert_eq!(count_rows(&mut conn)?, 4);
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn rows_changed_is_zero_after_commit_and_rollback() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("tx_rowschanged");
    let _cleanup = FileCleanup(vec![path.clone()]);
    let pool = pool_with_table(&path)?;

    let mut conn = pool.get_connection()?;
    conn.begin_transaction()?;
    conn.execute("INSERT INTO accounts (balance) VALUES (5.0);")?;
    assert_eq!(conn.rows_changed(), 1);
    conn.commit()?;
    assert_eq!(conn.rows_changed(), 0);

    conn.begin_transaction()?;
    conn.execute("INSERT INTO accounts (balance) VALUES (6.0);")?;
    assert_eq!(conn.rows_changed(), 1);
    conn.rollback()?;
    assert_eq!(conn.rows_changed(), 0);

    // A prepared statement's execute is reflected on the connection and
    // reset the same way.
    conn.begin_transaction()?;
    let mut stmt = conn.prepare("INSERT INTO accounts (balance) VALUES (?)")?;
    stmt.bind_values(&[SqlValue::Double(7.0)])?;
    stmt.execute()?;
    assert_eq!(stmt.rows_changed(), 1);
    drop(stmt);
    assert_eq!(conn.rows_changed(), 1);
    conn.commit()?;
    assert_eq!(conn.rows_changed(), 0);
    drop(conn);

    pool.stop()?;
    Ok(())
}
