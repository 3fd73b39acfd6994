#![allow(missing_docs)]

mod support;

use std::error::Error;
use std::ops::ControlFlow;
use std::path::PathBuf;

use sqlstage::{
    insert, run, run_streaming, Argument, DataType, ExistencePolicy, QueryRequest, QueryResult,
    SchemaTarget, SqliteEngine, TabularDataset, Value,
};
use support::{sqlite_count, sqlite_tables};
use tempfile::TempDir;
use time::macros::datetime;

fn setup(name: &str) -> (TempDir, PathBuf, SqliteEngine) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.db"));
    let engine = SqliteEngine::open(&path);
    (dir, path, engine)
}

fn abc() -> TabularDataset {
    TabularDataset::from_columns([
        ("a", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ("b", vec!["x".into(), "y".into(), "z".into()]),
    ])
    .unwrap()
    .with_name("t")
}

fn seed(path: &PathBuf, sql: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(sql).unwrap();
}

#[test]
fn sum_over_staged_dataset() -> Result<(), Box<dyn Error>> {
    let (_dir, path, engine) = setup("sum");
    let t = abc();
    let result = run(&engine, &QueryRequest::new("select sum(a) as total from t").dataset(&t))?;
    let ds = result.into_dataset().expect("dataset result");
    assert_eq!(ds.column_names().collect::<Vec<_>>(), vec!["total"]);
    assert_eq!(ds.rows(), &[vec![Value::Int(6)]]);
    assert!(sqlite_tables(&path).is_empty());
    Ok(())
}

#[test]
fn select_star_preserves_columns_and_rows() -> Result<(), Box<dyn Error>> {
    let (_dir, _path, engine) = setup("roundtrip");
    let ds = TabularDataset::from_columns([
        ("z", vec![Value::Float(1.5), Value::Null, Value::Float(-2.0)]),
        ("a", vec![Value::Bool(true), Value::Bool(false), Value::Null]),
        (
            "m",
            vec![
                Value::Timestamp(datetime!(2024-01-02 03:04:05.25)),
                Value::Null,
                Value::Timestamp(datetime!(1999-12-31 23:59:59)),
            ],
        ),
        ("k", vec!["c".into(), "b".into(), "a".into()]),
    ])?
    .with_name("src");
    let result = run(&engine, &QueryRequest::new("select * from src").dataset(&ds))?;
    let back = result.into_dataset().unwrap();
    assert_eq!(back.fields(), ds.fields());
    assert_eq!(back.rows(), ds.rows());
    Ok(())
}

#[test]
fn staged_datasets_join_permanent_tables() -> Result<(), Box<dyn Error>> {
    let (_dir, path, engine) = setup("join");
    seed(
        &path,
        "CREATE TABLE labels (b TEXT, label TEXT);
         INSERT INTO labels VALUES ('x', 'ex'), ('z', 'zed');",
    );
    let t = abc();
    let request = QueryRequest::new(
        "select t.a, labels.label from t join labels on labels.b = t.b order by t.a",
    )
    .dataset(&t);
    let ds = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(
        ds.rows(),
        &[
            vec![Value::Int(1), Value::from("ex")],
            vec![Value::Int(3), Value::from("zed")]
        ]
    );
    assert_eq!(sqlite_tables(&path), vec!["labels"]);
    Ok(())
}

#[test]
fn parameters_are_bound_positionally() -> Result<(), Box<dyn Error>> {
    let (_dir, _path, engine) = setup("params");
    let t = abc();
    let request = QueryRequest::new("select b from t where a >= ?1 and b <> ?2 order by a")
        .arg(&t)
        .arg(vec![Value::Int(2), Value::from("z")]);
    let ds = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(ds.rows(), &[vec![Value::from("y")]]);
    Ok(())
}

#[test]
fn failing_statement_still_tears_down() {
    let (_dir, path, engine) = setup("failing");
    let t = abc();
    let u = abc().with_name("u");
    let request = QueryRequest::new("select no_such_column from t").dataset(&t).dataset(&u);
    let err = run(&engine, &request).unwrap_err();
    assert_eq!(err.code(), "QueryFailure");
    assert!(err.suppressed().is_empty());
    assert!(sqlite_tables(&path).is_empty());
}

#[test]
fn fail_policy_leaves_existing_relation_unchanged() {
    let (_dir, path, engine) = setup("exists");
    seed(&path, "CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (42);");
    let t = abc();
    let err = run(&engine, &QueryRequest::new("select * from t").dataset(&t)).unwrap_err();
    assert_eq!(err.code(), "RelationExists");
    assert_eq!(sqlite_count(&path, "t"), 1);
    assert_eq!(sqlite_tables(&path), vec!["t"]);
}

#[test]
fn later_policy_failure_leaves_no_rows_behind() {
    let (_dir, path, engine) = setup("two_phase");
    seed(&path, "CREATE TABLE u (a INTEGER);");
    let t = abc();
    let u = abc().with_name("u");
    let err = run(&engine, &QueryRequest::load_only().dataset(&t).dataset(&u)).unwrap_err();
    assert_eq!(err.code(), "RelationExists");
    assert_eq!(sqlite_tables(&path), vec!["u"]);
    assert_eq!(sqlite_count(&path, "u"), 0);
}

#[test]
fn replace_policy_swaps_the_relation() -> Result<(), Box<dyn Error>> {
    let (_dir, path, engine) = setup("replace");
    seed(&path, "CREATE TABLE t (old TEXT); INSERT INTO t VALUES ('gone');");
    let t = abc();
    let mut request = QueryRequest::new("select count(*) as n from t").dataset(&t);
    request.options_mut().existence_policy = ExistencePolicy::Replace;
    let ds = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(ds.rows(), &[vec![Value::Int(3)]]);
    // The replacement was created by the request, so it is dropped too.
    assert!(sqlite_tables(&path).is_empty());
    Ok(())
}

#[test]
fn keep_leaves_staged_relation_in_place() -> Result<(), Box<dyn Error>> {
    let (_dir, path, engine) = setup("keep");
    let t = abc();
    let mut request = QueryRequest::load_only().dataset(&t);
    request.options_mut().keep = true;
    assert!(run(&engine, &request)?.is_no_result());
    assert_eq!(sqlite_tables(&path), vec!["t"]);
    assert_eq!(sqlite_count(&path, "t"), 3);
    Ok(())
}

#[test]
fn insert_requires_existing_relation() {
    let (_dir, path, engine) = setup("insert_missing");
    let t = abc();
    let err = insert(&engine, [Argument::Dataset(&t)]).unwrap_err();
    assert_eq!(err.code(), "RelationMissing");
    assert!(sqlite_tables(&path).is_empty());
}

#[test]
fn insert_appends_and_keeps() -> Result<(), Box<dyn Error>> {
    let (_dir, path, engine) = setup("insert");
    seed(&path, "CREATE TABLE t (a INTEGER, b TEXT); INSERT INTO t VALUES (0, 'w');");
    let t = abc();
    let extra = TabularDataset::from_columns([("a", vec![Value::Int(9)])])?;
    insert(
        &engine,
        [
            Argument::Dataset(&t),
            Argument::Named(vec![("t".to_string(), &extra)]),
            Argument::Params(vec![Value::Int(1)]),
        ],
    )?;
    assert_eq!(sqlite_count(&path, "t"), 5);
    Ok(())
}

#[test]
fn session_temporary_schema_is_connection_private() -> Result<(), Box<dyn Error>> {
    let (_dir, path, engine) = setup("temp");
    let t = abc();
    let mut request = QueryRequest::new("select count(*) as n from temp.t").dataset(&t);
    request.options_mut().schema = Some(SchemaTarget::SessionTemporary);
    let ds = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(ds.rows(), &[vec![Value::Int(3)]]);
    assert!(sqlite_tables(&path).is_empty());
    Ok(())
}

#[test]
fn result_shaping_options_apply() -> Result<(), Box<dyn Error>> {
    let (_dir, _path, engine) = setup("shaping");
    let events = TabularDataset::from_columns([
        ("id", vec![Value::Int(10), Value::Int(20)]),
        ("at", vec!["2024-03-04 05:06:07".into(), "2024-03-05".into()]),
        ("amount", vec![Value::Int(1), Value::Int(2)]),
    ])?
    .with_name("events");
    let mut request =
        QueryRequest::new("select id, at, cast(amount as real) / 2 as half from events")
            .dataset(&events);
    request.options_mut().parse_dates = vec!["at".into()];
    request.options_mut().index_column = Some("id".into());
    let ds = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(ds.column_names().collect::<Vec<_>>(), vec!["at", "half"]);
    assert_eq!(ds.fields()[0].data_type, DataType::Timestamp);
    assert_eq!(ds.index_value(1), Value::Int(20));
    assert_eq!(
        ds.rows()[1],
        vec![Value::Timestamp(datetime!(2024-03-05 00:00:00)), Value::Float(1.0)]
    );
    Ok(())
}

#[test]
fn unknown_result_column_is_invalid_and_cleans_up() {
    let (_dir, path, engine) = setup("bad_index");
    let t = abc();
    let mut request = QueryRequest::new("select a from t").dataset(&t);
    request.options_mut().index_column = Some("b".into());
    let err = run(&engine, &request).unwrap_err();
    assert_eq!(err.code(), "InvalidArgument");
    assert!(sqlite_tables(&path).is_empty());
}

#[test]
fn chunked_results() -> Result<(), Box<dyn Error>> {
    let (_dir, _path, engine) = setup("chunks");
    let n = TabularDataset::from_columns([("n", (0..25).map(Value::Int).collect())])?
        .with_name("n");
    let mut request = QueryRequest::new("select n from n order by n").dataset(&n);
    request.options_mut().chunk_size = Some(10);
    let chunks = match run(&engine, &request)? {
        QueryResult::Chunks(chunks) => chunks,
        other => panic!("expected chunks, got {other:?}"),
    };
    let sizes: Vec<usize> = chunks.iter().map(TabularDataset::num_rows).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(chunks[2].rows()[4], vec![Value::Int(24)]);
    Ok(())
}

#[test]
fn streaming_can_stop_early() -> Result<(), Box<dyn Error>> {
    let (_dir, path, engine) = setup("stream");
    let n = TabularDataset::from_columns([("n", (0..100).map(Value::Int).collect())])?
        .with_name("n");
    let mut request = QueryRequest::new("select n from n").dataset(&n);
    request.options_mut().chunk_size = Some(30);
    let mut seen = Vec::new();
    run_streaming(&engine, &request, |chunk| {
        seen.push(chunk.num_rows());
        if seen.len() == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    assert_eq!(seen, vec![30, 30]);
    assert!(sqlite_tables(&path).is_empty());
    Ok(())
}

#[test]
fn empty_dataset_stages_an_empty_relation() -> Result<(), Box<dyn Error>> {
    let (_dir, _path, engine) = setup("empty");
    let empty = TabularDataset::new(vec![sqlstage::Field::new("a", DataType::Int)])?
        .with_name("empty");
    let ds = run(&engine, &QueryRequest::new("select a from empty").dataset(&empty))?
        .into_dataset()
        .unwrap();
    assert_eq!(ds.num_rows(), 0);
    assert_eq!(ds.fields()[0].data_type, DataType::Int);
    Ok(())
}

#[test]
fn streamed_chunks_arrive_before_a_later_row_fails() {
    let (_dir, _path, engine) = setup("late_error");
    let sql = "with recursive r(n) as (select 1 union all select n + 1 from r where n < 10) \
               select case when n = 6 then abs(-9223372036854775807 - 1) else n end as v from r";
    let mut request = QueryRequest::new(sql);
    request.options_mut().chunk_size = Some(2);

    let mut seen = 0;
    run_streaming(&engine, &request, |_| {
        seen += 1;
        ControlFlow::Break(())
    })
    .unwrap();
    assert_eq!(seen, 1);

    let mut seen = 0;
    let err = run_streaming(&engine, &request, |_| {
        seen += 1;
        ControlFlow::Continue(())
    })
    .unwrap_err();
    assert_eq!(err.code(), "QueryFailure");
    assert_eq!(seen, 2);
}

#[test]
fn decimals_keep_their_digits_and_unparseable_ones_fail() -> Result<(), Box<dyn Error>> {
    let (_dir, path, engine) = setup("decimal");
    let d = TabularDataset::from_columns([(
        "amount",
        vec![Value::Decimal("1.50".into()), Value::Decimal("abc".into())],
    )])?
    .with_name("d");
    let mut request = QueryRequest::new("select amount from d order by rowid").dataset(&d);
    request.options_mut().coerce_float = false;
    let out = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(out.fields()[0].data_type, DataType::Decimal);
    assert_eq!(out.rows(), d.rows());

    request.options_mut().coerce_float = true;
    let err = run(&engine, &request).unwrap_err();
    assert_eq!(err.code(), "QueryFailure");
    assert!(sqlite_tables(&path).is_empty());
    Ok(())
}
