#![allow(missing_docs)]

mod support;

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use support::{sqlite_count, sqlite_tables};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    db: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("cli.db");
        fs::write(
            dir.path().join("people.csv"),
            "id,name,score\n1,ada,3.5\n2,grace,\n3,linus,1.25\n",
        )
        .unwrap();
        Self { dir, db }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn table(&self, name: &str, file: &str) -> String {
        format!("{name}={}", self.path(file).display())
    }

    /// Command isolated from any user config.
    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("sqlstage");
        cmd.env_remove("SQLSTAGE_CONFIG")
            .env("XDG_CONFIG_HOME", self.path("xdg"))
            .env("HOME", self.dir.path());
        cmd
    }
}

fn seed(db: &Path, sql: &str) {
    let conn = rusqlite::Connection::open(db).unwrap();
    conn.execute_batch(sql).unwrap();
}

#[test]
fn query_prints_csv_and_cleans_up() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .arg("query")
        .arg("--db")
        .arg(&ws.db)
        .arg("--table")
        .arg(ws.table("people", "people.csv"))
        .arg("select name, score from people order by id")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "name,score\nada,3.5\ngrace,\nlinus,1.25\n"
    );
    assert!(sqlite_tables(&ws.db).is_empty());
}

#[test]
fn query_prints_json_with_parameters() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["--format", "json", "query", "--db"])
        .arg(&ws.db)
        .arg("--table")
        .arg(ws.table("people", "people.csv"))
        .args(["--param", "2"])
        .arg("select id, name from people where id >= ?1 order by id")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["columns"], serde_json::json!(["id", "name"]));
    assert_eq!(json["rows"], serde_json::json!([[2, "grace"], [3, "linus"]]));
}

#[test]
fn chunked_csv_output_has_one_header() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .arg("query")
        .arg("--db")
        .arg(&ws.db)
        .arg("--table")
        .arg(ws.table("people", "people.csv"))
        .args(["--chunk-size", "1"])
        .arg("select id from people order by id")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap(), "id\n1\n2\n3\n");
}

#[test]
fn existing_relation_fails_the_query() {
    let ws = Workspace::new();
    seed(&ws.db, "CREATE TABLE people (id INTEGER);");
    let output = ws
        .cmd()
        .arg("query")
        .arg("--db")
        .arg(&ws.db)
        .arg("--table")
        .arg(ws.table("people", "people.csv"))
        .arg("select count(*) from people")
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.starts_with("error: relation people already exists"), "{stderr}");
    assert_eq!(sqlite_tables(&ws.db), vec!["people"]);
}

#[test]
fn replace_policy_from_the_command_line() {
    let ws = Workspace::new();
    seed(&ws.db, "CREATE TABLE people (id INTEGER); INSERT INTO people VALUES (9);");
    let output = ws
        .cmd()
        .arg("query")
        .arg("--db")
        .arg(&ws.db)
        .arg("--table")
        .arg(ws.table("people", "people.csv"))
        .args(["--if-exists", "replace", "--keep"])
        .arg("select count(*) as n from people")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap(), "n\n3\n");
    assert_eq!(sqlite_count(&ws.db, "people"), 3);
}

#[test]
fn insert_appends_into_existing_relation() {
    let ws = Workspace::new();
    seed(
        &ws.db,
        "CREATE TABLE people (id INTEGER, name TEXT, score REAL);
         INSERT INTO people VALUES (0, 'root', NULL);",
    );
    let output = ws
        .cmd()
        .arg("insert")
        .arg("--db")
        .arg(&ws.db)
        .arg("--table")
        .arg(ws.table("people", "people.csv"))
        .assert()
        .success()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8(output)
        .unwrap()
        .contains("inserted 3 rows into 1 relations"));
    assert_eq!(sqlite_count(&ws.db, "people"), 4);
}

#[test]
fn insert_into_missing_relation_fails() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("insert")
        .arg("--db")
        .arg(&ws.db)
        .arg("--table")
        .arg(ws.table("people", "people.csv"))
        .assert()
        .failure()
        .code(1);
    assert!(sqlite_tables(&ws.db).is_empty());
}

#[test]
fn config_file_supplies_defaults() {
    let ws = Workspace::new();
    let config = ws.path("sqlstage.toml");
    fs::write(&config, "[defaults]\nkeep = true\n\n[logging]\nfilter = \"error\"\n").unwrap();
    ws.cmd()
        .arg("--config")
        .arg(&config)
        .arg("query")
        .arg("--db")
        .arg(&ws.db)
        .arg("--table")
        .arg(ws.table("people", "people.csv"))
        .arg("select 1")
        .assert()
        .success();
    assert_eq!(sqlite_tables(&ws.db), vec!["people"]);
}

#[test]
fn broken_config_file_is_reported() {
    let ws = Workspace::new();
    let config = ws.path("broken.toml");
    fs::write(&config, "[defaults\n").unwrap();
    let output = ws
        .cmd()
        .env("SQLSTAGE_CONFIG", &config)
        .arg("query")
        .arg("--db")
        .arg(&ws.db)
        .arg("select 1")
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8(output).unwrap().starts_with("error: "));
}

#[test]
fn malformed_table_argument_is_a_usage_error() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("query")
        .arg("--db")
        .arg(&ws.db)
        .args(["--table", "no-equals-sign"])
        .arg("select 1")
        .assert()
        .failure()
        .code(2);
}
