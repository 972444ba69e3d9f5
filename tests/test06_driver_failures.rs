mod common;

use std::sync::atomic::Ordering;

use common::MockDriver;
use sql_pool::prelude::*;

fn mock_pool(protocol: &str, initial: usize, max: usize) -> ConnectionPool {
    let url: DbUrl = format!("{protocol}://localhost/db").parse().unwrap();
    let pool = ConnectionPool::new(url).unwrap();
    pool.set_initial_connections(initial);
    pool.set_max_connections(max);
    pool.set_reaper_enabled(false);
    pool
}

#[test]
fn every_handed_out_connection_was_pinged() -> Result<(), Box<dyn std::error::Error>> {
    let state = MockDriver::install("mockping");
    let pool = mock_pool("mockping", 2, 4);
    pool.start()?;
    assert_eq!(state.pings.load(Ordering::SeqCst), 0);

    let conn = pool.get_connection()?;
    assert_eq!(state.pings.load(Ordering::SeqCst), 1);
    drop(conn);

    let conn = pool.get_connection()?;
    assert_eq!(state.pings.load(Ordering::SeqCst), 2);
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn dead_database_is_detected_and_pool_recovers() -> Result<(), Box<dyn std::error::Error>> {
    let state = MockDriver::install("mockdead");
    let pool = mock_pool("mockdead", 2, 4);
    pool.start()?;
    assert_eq!(pool.size(), 2);

    // Use a connection, return it, then kill the database behind the pool.
    let conn = pool.get_connection()?;
    drop(conn);
    state.kill();

    // Acquisition pings the idle connections, evicts both, then tries to
    // open a fresh one and surfaces the driver's connect error.
    let err = pool.get_connection().unwrap_err();
    assert!(err.to_string().contains("connection refused"), "{err}");
    assert_eq!(pool.size(), 0);
    assert_eq!(state.live(), 0); // evicted connections were closed

    // Once the database is back the same pool serves connections again.
    state.revive();
    let mut conn = pool.get_connection()?;
    assert!(conn.ping());
    drop(conn);
    assert_eq!(pool.size(), 1);

    pool.stop()?;
    Ok(())
}

#[test]
fn first_open_failure_fails_start() {
    let state = MockDriver::install("mockfirst");
    state.kill();

    let pool = mock_pool("mockfirst", 2, 4);
    let err = pool.start().unwrap_err();
    assert!(err.to_string().contains("failed to start connection pool"));
    assert_eq!(pool.size(), 0);

    // start can be retried after the database comes back.
    state.revive();
    pool.start().unwrap();
    assert_eq!(pool.size(), 2);
    pool.stop().unwrap();
}

#[test]
fn partial_fill_counts_as_started() {
    let state = MockDriver::install("mockpartial");
    *state.open_limit.lock() = Some(2);

    let pool = mock_pool("mockpartial", 5, 8);
    // The third open fails; the two opened connections are kept and the
    // pool starts anyway.
    pool.start().unwrap();
    assert_eq!(pool.size(), 2);

    let conn = pool.get_connection().unwrap();
    drop(conn);
    pool.stop().unwrap();
}

#[test]
fn create_failure_is_not_retried() {
    let state = MockDriver::install("mockcreate");
    let pool = mock_pool("mockcreate", 0, 4);
    pool.start().unwrap();

    // No idle connections and opens refused: the error surfaces at once.
    state.kill();
    let before = state.opened.load(Ordering::SeqCst);
    let err = pool.get_connection().unwrap_err();
    assert!(err.to_string().contains("failed to create a connection"));
    assert_eq!(state.opened.load(Ordering::SeqCst), before);

    pool.stop().unwrap();
}

#[test]
fn evicted_connections_are_freed_and_replaced() -> Result<(), Box<dyn std::error::Error>> {
    let state = MockDriver::install("mockevict");
    let pool = mock_pool("mockevict", 3, 4);
    pool.start()?;
    assert_eq!(state.live(), 3);

    // Idle connections go dead but connects still work: acquisition must
    // chew through the dead ones and hand out a freshly opened session.
    state.ping_ok.store(false, Ordering::SeqCst);
    let conn = pool.get_connection()?;
    assert_eq!(pool.size(), 1);
    assert_eq!(pool.active(), 1);
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn reaper_sweep_evicts_dead_idle_connections() -> Result<(), Box<dyn std::error::Error>> {
    let state = MockDriver::install("mockreap");
    let pool = mock_pool("mockreap", 1, 5);
    pool.start()?;

    let held: Vec<_> = (0..4).map(|_| pool.get_connection().unwrap()).collect();
    drop(held);
    assert_eq!(pool.size(), 4);

    // All idle and freshly used, so nothing is stale; dead pings alone
    // drive the sweep, bounded by size - active - initial.
    state.ping_ok.store(false, Ordering::SeqCst);
    let reaped = pool.reap_connections();
    assert_eq!(reaped, 3);
    assert_eq!(pool.size(), 1);

    pool.stop()?;
    Ok(())
}
