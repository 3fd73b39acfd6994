#![allow(missing_docs)]

mod support;

use std::thread;
use std::time::Duration;

use sqlstage::{run, QueryRequest, SchemaTarget, SqliteEngine, TabularDataset, Value};
use support::sqlite_tables;
use tempfile::TempDir;

const WORKERS: i64 = 8;
const ROUNDS: i64 = 5;

fn numbers(name: &str, base: i64) -> TabularDataset {
    TabularDataset::from_columns([("n", (0..100).map(|i| Value::Int(base + i)).collect())])
        .unwrap()
        .with_name(name)
}

fn expected_sum(base: i64) -> i64 {
    (0..100).map(|i| base + i).sum()
}

#[test]
fn session_temporary_relations_with_one_name_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    let engine = SqliteEngine::open(&path).with_busy_timeout(Duration::from_secs(10));

    thread::scope(|scope| {
        for worker in 0..WORKERS {
            let engine = &engine;
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    let base = worker * 1_000 + round * 100;
                    let t = numbers("t", base);
                    let mut request = QueryRequest::new("select sum(n) as s from t").dataset(&t);
                    request.options_mut().schema = Some(SchemaTarget::SessionTemporary);
                    let ds = run(engine, &request).unwrap().into_dataset().unwrap();
                    assert_eq!(ds.rows(), &[vec![Value::Int(expected_sum(base))]]);
                }
            });
        }
    });

    assert!(sqlite_tables(&path).is_empty());
}

#[test]
fn distinct_names_in_the_shared_namespace_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("named.db");
    let engine = SqliteEngine::open(&path).with_busy_timeout(Duration::from_secs(30));

    thread::scope(|scope| {
        for worker in 0..WORKERS {
            let engine = &engine;
            scope.spawn(move || {
                let name = format!("stage_{worker}");
                let t = numbers(&name, worker);
                let sql = format!("select sum(n) as s from {name}");
                let ds = run(engine, &QueryRequest::new(sql).dataset(&t))
                    .unwrap()
                    .into_dataset()
                    .unwrap();
                assert_eq!(ds.rows(), &[vec![Value::Int(expected_sum(worker))]]);
            });
        }
    });

    assert!(sqlite_tables(&path).is_empty());
}
