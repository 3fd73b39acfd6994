#![allow(missing_docs)]

mod support;

use std::error::Error;

use sqlstage::{run, Index, QueryRequest, SqliteEngine, TabularDataset, Value};
use support::{sqlite_tables, CopyEngine};
use tempfile::TempDir;
use time::macros::{date, datetime};

fn mixed() -> TabularDataset {
    TabularDataset::from_columns([
        ("id", vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]),
        (
            "note",
            vec![
                "plain".into(),
                "comma, inside".into(),
                "quote \" and\nnewline".into(),
                Value::Null,
            ],
        ),
        (
            "score",
            vec![Value::Float(0.1), Value::Float(-1e300), Value::Null, Value::Float(2.5)],
        ),
        (
            "ok",
            vec![Value::Bool(true), Value::Null, Value::Bool(false), Value::Bool(true)],
        ),
        (
            "day",
            vec![
                Value::Date(date!(2024 - 02 - 29)),
                Value::Null,
                Value::Date(date!(1970 - 01 - 01)),
                Value::Date(date!(2000 - 12 - 31)),
            ],
        ),
        (
            "seen",
            vec![
                Value::Timestamp(datetime!(2024-02-29 12:00:00.000123)),
                Value::Timestamp(datetime!(2024-03-01 00:00:00)),
                Value::Null,
                Value::Null,
            ],
        ),
        (
            "blob",
            vec![
                Value::Bytes(vec![0, 1, 0xfe]),
                Value::Null,
                Value::Bytes(Vec::new()),
                Value::Bytes(b"abc".to_vec()),
            ],
        ),
    ])
    .unwrap()
    .with_name("mixed")
}

#[test]
fn sum_goes_through_copy_into_pg_temp() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("copy.db");
    let engine = CopyEngine::open(&path);
    let t = TabularDataset::from_columns([
        ("a", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ("b", vec!["x".into(), "y".into(), "z".into()]),
    ])?
    .with_name("t");

    let ds = run(&engine, &QueryRequest::new("select sum(a) as total from t").dataset(&t))?
        .into_dataset()
        .unwrap();
    assert_eq!(ds.rows(), &[vec![Value::Int(6)]]);

    let statements = engine.log.statements.lock().unwrap().clone();
    assert_eq!(
        statements,
        vec![
            "COPY \"pg_temp\".\"t\" (\"a\", \"b\") FROM STDIN WITH (FORMAT csv, DELIMITER ',', NULL '\\N')"
                .to_string()
        ]
    );
    assert_eq!(engine.log.executed_containing("INSERT"), 0);
    assert_eq!(engine.log.executed_containing("DROP TABLE \"temp\".\"t\""), 1);
    assert!(sqlite_tables(&path).is_empty());
    Ok(())
}

#[test]
fn ten_thousand_rows_stream_as_ten_chunks() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let engine = CopyEngine::open(&dir.path().join("chunks.db"));
    let big = TabularDataset::from_columns([
        ("n", (0..10_000).map(Value::Int).collect()),
        ("label", (0..10_000).map(|i| Value::Text(format!("row-{i}"))).collect()),
    ])?
    .with_name("big");
    let mut request = QueryRequest::new("select count(*) as c, sum(n) as s from big").dataset(&big);
    request.options_mut().copy_chunk_rows = 1_000;
    let ds = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(ds.rows(), &[vec![Value::Int(10_000), Value::Int(49_995_000)]]);
    assert_eq!(engine.log.chunk_counts(), vec![10]);
    Ok(())
}

#[test]
fn fast_path_and_fallback_load_identically() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let copy_engine = CopyEngine::open(&dir.path().join("fast.db"));
    let insert_engine = SqliteEngine::open(dir.path().join("slow.db"));
    let ds = mixed();
    let request = QueryRequest::new("select * from mixed").dataset(&ds);

    let fast = run(&copy_engine, &request)?.into_dataset().unwrap();
    let slow = run(&insert_engine, &request)?.into_dataset().unwrap();
    assert_eq!(copy_engine.log.chunk_counts(), vec![1]);
    assert_eq!(fast, slow);
    assert_eq!(fast.fields(), ds.fields());
    assert_eq!(fast.rows(), ds.rows());
    Ok(())
}

#[test]
fn disabling_the_fast_path_uses_inserts() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let engine = CopyEngine::open(&dir.path().join("nofast.db"));
    let ds = mixed();
    let mut request = QueryRequest::new("select count(*) as n from mixed").dataset(&ds);
    request.options_mut().fast_path = false;
    let out = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(out.rows(), &[vec![Value::Int(4)]]);
    assert!(engine.log.statements.lock().unwrap().is_empty());
    assert_eq!(engine.log.executed_containing("INSERT INTO \"temp\".\"mixed\""), 1);
    Ok(())
}

#[test]
fn empty_strings_and_marker_text_survive_the_fast_path() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let engine = CopyEngine::open(&dir.path().join("empty.db"));
    let ds = TabularDataset::from_columns([(
        "s",
        vec![Value::from(""), Value::from("x"), Value::Null, Value::from("\\N")],
    )])?
    .with_name("s");
    let out = run(&engine, &QueryRequest::new("select s from s order by rowid").dataset(&ds))?
        .into_dataset()
        .unwrap();
    assert_eq!(out.rows(), ds.rows());
    Ok(())
}

#[test]
fn index_is_copied_as_leading_column() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let engine = CopyEngine::open(&dir.path().join("index.db"));
    let ds = TabularDataset::from_columns([("v", vec![Value::Int(5), Value::Int(6)])])?
        .with_index(Index::new(Some("key".into()), vec!["a".into(), "b".into()]))?
        .with_name("ix");
    let mut request = QueryRequest::new("select * from ix").dataset(&ds);
    request.options_mut().index = true;
    request.options_mut().index_column = Some("key".into());
    let out = run(&engine, &request)?.into_dataset().unwrap();
    assert_eq!(out.index(), ds.index());
    assert_eq!(out.rows(), ds.rows());
    assert!(engine.log.statements.lock().unwrap()[0].contains("(\"key\", \"v\")"));
    Ok(())
}

#[test]
fn reset_temporaries_discards_before_staging() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let engine = CopyEngine::open(&dir.path().join("reset.db"));
    let ds = mixed();

    let mut request = QueryRequest::new("select count(*) as n from mixed").dataset(&ds);
    run(&engine, &request)?;
    assert_eq!(engine.log.executed_containing("DISCARD TEMP"), 0);

    request.options_mut().reset_temporaries = true;
    run(&engine, &request)?;
    let executed = engine.log.executed.lock().unwrap().clone();
    let discard = executed.iter().position(|s| s == "DISCARD TEMP").unwrap();
    let create = executed
        .iter()
        .rposition(|s| s.starts_with("CREATE TABLE"))
        .unwrap();
    assert!(discard < create);
    Ok(())
}
