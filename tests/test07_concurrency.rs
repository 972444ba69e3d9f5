#![cfg(feature = "sqlite")]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{FileCleanup, unique_path};
use sql_pool::prelude::*;

#[test]
fn concurrent_checkouts_respect_the_bound() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("conc_bound");
    let _cleanup = FileCleanup(vec![path.clone()]);

    let url: DbUrl = format!("sqlite://{path}?journal_mode=wal").parse()?;
    let pool = ConnectionPool::new(url)?;
    pool.set_initial_connections(2);
    pool.set_max_connections(4);
    pool.set_reaper_enabled(false);
    pool.start()?;

    {
        let mut conn = pool.get_connection()?;
        conn.execute("CREATE TABLE hits (id INTEGER PRIMARY KEY, worker INTEGER);")?;
    }

    let successes = AtomicUsize::new(0);
    let full_errors = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let pool = &pool;
            let successes = &successes;
            let full_errors = &full_errors;
            scope.spawn(move || {
                for _ in 0..25 {
                    match pool.get_connection() {
                        Ok(mut conn) => {
                            // Busy-wait instead of failing when another
                            // worker holds the write lock.
                            conn.set_query_timeout(5_000).unwrap();
                            conn.execute_params(
                                "INSERT INTO hits (worker) VALUES (?)",
                                &[SqlValue::Int(worker)],
                            )
                            .unwrap();
                            successes.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            // The only acceptable failure is a full pool,
                            // reported immediately rather than by blocking.
                            assert!(e.to_string().to_lowercase().contains("full"), "{e}");
                            full_errors.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    assert!(pool.size() <= 4);
    assert_eq!(pool.active(), 0);

    let mut conn = pool.get_connection()?;
    let mut rows = conn.execute_query("SELECT COUNT(*) FROM hits")?;
    rows.next()?;
    assert_eq!(rows.get_llong(1)? as usize, successes.load(Ordering::Relaxed));
    drop(rows);
    drop(conn);

    pool.stop()?;
    Ok(())
}

#[test]
fn one_over_the_brim_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_path("conc_brim");
    let _cleanup = FileCleanup(vec![path.clone()]);

    let url: DbUrl = format!("sqlite://{path}").parse()?;
    let pool = ConnectionPool::new(url)?;
    pool.set_initial_connections(2);
    pool.set_max_connections(3);
    pool.set_reaper_enabled(false);
    pool.start()?;

    // initial + 1 holders saturate the pool...
    let holders: Vec<_> = (0..3).map(|_| pool.get_connection().unwrap()).collect();
    assert!(pool.is_full());

    // ...so the next acquisition from another thread fails without
    // waiting for a return.
    let started = std::time::Instant::now();
    let result = std::thread::scope(|scope| {
        scope.spawn(|| pool.get_connection().map(|_| ())).join()
    })
    .unwrap();
    assert!(result.is_err());
    assert!(started.elapsed() < std::time::Duration::from_secs(5));

    drop(holders);
    pool.stop()?;
    Ok(())
}
