#![allow(missing_docs)]

mod support;

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    config: PathBuf,
    model: PathBuf,
    data: PathBuf,
    database: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let model = dir.path().join("model.toml");
        let data = dir.path().join("people.json");
        let config = dir.path().join("config.toml");
        let database = dir.path().join("index.db");
        fs::write(&model, support::MODEL).unwrap();
        fs::write(&data, support::ENTITIES).unwrap();
        fs::write(&config, "log_filter = \"warn\"\n").unwrap();
        Workspace {
            _dir: dir,
            config,
            model,
            data,
            database,
        }
    }

    fn query(&self, name: &str, json: &str) -> PathBuf {
        let path = self.config.with_file_name(format!("{name}.json"));
        fs::write(&path, json).unwrap();
        path
    }

    fn indexed(self) -> Self {
        cargo_bin_cmd!("entity-query")
            .arg("--config")
            .arg(&self.config)
            .arg("index")
            .args(paths("--model", &self.model))
            .args(paths("--database", &self.database))
            .args(paths("--data", &self.data))
            .assert()
            .success();
        self
    }
}

fn paths<'a>(flag: &'a str, path: &'a Path) -> [&'a std::ffi::OsStr; 2] {
    [flag.as_ref(), path.as_os_str()]
}

fn json_output(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("valid json")
}

const OLDER: &str = r#"{
  "resultType": "Person",
  "filter": {"kind": "ge", "path": "age", "value": {"type": "int", "value": 28}},
  "orderBy": [{"path": "age", "direction": "desc"}]
}"#;

#[test]
fn index_reports_written_entities() {
    let ws = Workspace::new();
    let mut cmd = cargo_bin_cmd!("entity-query");
    cmd.arg("--config")
        .arg(&ws.config)
        .args(["--format", "json", "index"])
        .args(paths("--model", &ws.model))
        .args(paths("--database", &ws.database))
        .args(paths("--data", &ws.data));
    let json = json_output(&mut cmd);
    assert_eq!(json["indexed"], 4);
}

#[test]
fn compile_prints_sql_and_binds() {
    let ws = Workspace::new();
    let query = ws.query("older", OLDER);
    let mut cmd = cargo_bin_cmd!("entity-query");
    cmd.arg("--config")
        .arg(&ws.config)
        .args(["--format", "json", "--dialect", "ansi", "compile"])
        .args(paths("--model", &ws.model))
        .args(paths("--query", &query));
    let json = json_output(&mut cmd);
    let sql = json["sql"].as_str().unwrap();
    assert!(sql.contains("main.person_age"), "{sql}");
    assert!(sql.contains(">= ?"), "{sql}");
    assert!(sql.ends_with("DESC"), "{sql}");
    assert_eq!(json["values"].as_array().unwrap().len(), 1);
    assert_eq!(json["shape"], "forwardOnly");
}

#[test]
fn find_and_count_run_against_the_index() {
    let ws = Workspace::new().indexed();
    let everyone = ws.query("everyone", r#"{"resultType": "Person", "orderBy": [{"path": "name"}]}"#);
    let older = ws.query("older", OLDER);

    let mut cmd = cargo_bin_cmd!("entity-query");
    cmd.arg("--config")
        .arg(&ws.config)
        .args(["--format", "json", "find"])
        .args(paths("--model", &ws.model))
        .args(paths("--database", &ws.database))
        .args(paths("--query", &everyone));
    let json = json_output(&mut cmd);
    assert_eq!(json["identities"], serde_json::json!(["alice", "bob", "carol"]));

    let output = cargo_bin_cmd!("entity-query")
        .arg("--config")
        .arg(&ws.config)
        .args(["--plain", "count"])
        .args(paths("--model", &ws.model))
        .args(paths("--database", &ws.database))
        .args(paths("--query", &older))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap().trim(), "1");
}

#[test]
fn unsupported_predicate_fails_with_code() {
    let ws = Workspace::new();
    let query = ws.query(
        "pattern",
        r#"{"resultType": "Person", "filter": {"kind": "matches", "path": "name", "pattern": "A.*"}}"#,
    );
    let output = cargo_bin_cmd!("entity-query")
        .arg("--config")
        .arg(&ws.config)
        .arg("compile")
        .args(paths("--model", &ws.model))
        .args(paths("--query", &query))
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("error[Unsupported]"), "{stderr}");
}

#[test]
fn missing_model_is_an_argument_error() {
    let ws = Workspace::new();
    let query = ws.query("older", OLDER);
    cargo_bin_cmd!("entity-query")
        .arg("--config")
        .arg(&ws.config)
        .arg("compile")
        .args(paths("--query", &query))
        .assert()
        .failure()
        .code(1);
}

#[test]
fn mistyped_literal_fails_before_compilation() {
    let ws = Workspace::new();
    let query = ws.query(
        "mistyped",
        r#"{"resultType": "Person", "filter": {"kind": "gt", "path": "name", "value": {"type": "int", "value": 5}}}"#,
    );
    let output = cargo_bin_cmd!("entity-query")
        .arg("--config")
        .arg(&ws.config)
        .arg("compile")
        .args(paths("--model", &ws.model))
        .args(paths("--query", &query))
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("error[TypeMismatch]"), "{stderr}");
}
