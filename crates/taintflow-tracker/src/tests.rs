use crate::tracker::{analyze_project, track_file};
use std::fs;
use taintflow_core::{UsageKind, UsageRecord, BUILT_IN_PACKAGE};

fn track(source: &str) -> Vec<UsageRecord> {
    track_file("app.py", source).unwrap()
}

fn calls(records: &[UsageRecord]) -> Vec<&UsageRecord> {
    records
        .iter()
        .filter(|r| r.node_type == UsageKind::Call)
        .collect()
}

fn chain_of(record: &UsageRecord) -> Vec<&str> {
    record.chain.iter().map(String::as_str).collect()
}

#[test]
fn imports_register_state_but_emit_nothing() {
    let records = track("import os\nfrom flask import Flask, request\nimport numpy as np\n");
    assert!(records.is_empty());
}

#[test]
fn from_import_direct_call_emits_two_element_chain() {
    let records = track("from flask import Flask\napp = Flask(__name__)\n");
    let call_records = calls(&records);
    assert_eq!(call_records.len(), 1);
    assert_eq!(chain_of(call_records[0]), ["flask", "Flask"]);
    assert_eq!(call_records[0].package, "flask");

    let arg = records
        .iter()
        .find(|r| r.node_type == UsageKind::Arg)
        .unwrap();
    assert_eq!(arg.arg_pos, Some(0));
    assert_eq!(arg.expr_chain.as_deref(), Some(&["__name__".to_string()][..]));
    assert_eq!(arg.call_id, call_records[0].call_id);
}

#[test]
fn module_attribute_call_emits_call_arg_and_kwarg_with_shared_id() {
    let records = track("import alpha\nalpha.b.c(x, y=1)\n");

    let call = records
        .iter()
        .find(|r| r.node_type == UsageKind::Call)
        .unwrap();
    assert_eq!(chain_of(call), ["alpha", "b", "c"]);

    let arg = records
        .iter()
        .find(|r| r.node_type == UsageKind::Arg)
        .unwrap();
    assert_eq!(arg.arg_pos, Some(0));
    assert_eq!(arg.expr_chain.as_deref(), Some(&["x".to_string()][..]));

    let kwarg = records
        .iter()
        .find(|r| r.node_type == UsageKind::Kwarg)
        .unwrap();
    assert_eq!(kwarg.kw_name.as_deref(), Some("y"));

    assert!(call.call_id.is_some());
    assert_eq!(arg.call_id, call.call_id);
    assert_eq!(kwarg.call_id, call.call_id);

    // The inner attribute read `alpha.b` is not the callee, so it is
    // recorded separately.
    let attr = records
        .iter()
        .find(|r| r.node_type == UsageKind::Attribute)
        .unwrap();
    assert_eq!(chain_of(attr), ["alpha", "b"]);
}

#[test]
fn aliased_import_resolves_to_real_package() {
    let records = track("import numpy as np\nnp.array([1])\n");
    let call = calls(&records)[0];
    assert_eq!(chain_of(call), ["numpy", "array"]);
    assert_eq!(call.package, "numpy");
}

#[test]
fn from_import_alias_keeps_original_name_in_chain() {
    let records = track("from flask import request as req\nvalue = req.form\n");
    let attr = records
        .iter()
        .find(|r| r.node_type == UsageKind::Attribute)
        .unwrap();
    assert_eq!(chain_of(attr), ["flask", "request", "form"]);
}

#[test]
fn wrapper_single_return_of_alias_is_transparent() {
    let source = "import os\n\
                  def handle():\n    return os\n\
                  handle().system(cmd)\n";
    let records = track(source);
    assert!(calls(&records)
        .iter()
        .any(|r| chain_of(r) == ["os", "system"]));
}

#[test]
fn wrapper_transparency_composes_across_call_results() {
    let source = "import sqlite3\n\
                  \n\
                  def get_db():\n    return sqlite3.connect('app.db')\n\
                  \n\
                  def run(sql):\n    c = get_db().cursor()\n    c.execute(sql)\n";
    let records = track(source);
    let execute = calls(&records)
        .into_iter()
        .find(|r| r.terminal_name() == "execute")
        .unwrap();
    assert_eq!(chain_of(execute), ["sqlite3", "connect", "cursor", "execute"]);

    let arg = records
        .iter()
        .find(|r| r.node_type == UsageKind::Arg && r.call_id == execute.call_id)
        .unwrap();
    assert_eq!(arg.expr_chain.as_deref(), Some(&["sql".to_string()][..]));
}

#[test]
fn wrapper_assign_then_return_is_detected() {
    let source = "import sqlite3\n\
                  def open_db():\n    conn = sqlite3.connect('db')\n    return conn\n\
                  open_db().execute(q)\n";
    let records = track(source);
    assert!(calls(&records)
        .iter()
        .any(|r| chain_of(r) == ["sqlite3", "connect", "execute"]));
}

#[test]
fn builtin_call_is_recorded_under_built_in_package() {
    let records = track("result = eval(expr)\n");
    let call = calls(&records)[0];
    assert_eq!(call.package, BUILT_IN_PACKAGE);
    assert_eq!(chain_of(call), ["built_in", "eval"]);
    assert!(call.tags.contains(&BUILT_IN_PACKAGE.to_string()));
}

#[test]
fn unknown_names_emit_nothing() {
    let records = track("mystery(x)\nwidget.spin()\n");
    assert!(records.is_empty());
}

#[test]
fn decorator_seeds_handler_parameters() {
    let source = "from flask import Flask\n\
                  app = Flask(__name__)\n\
                  \n\
                  @app.route('/run', methods=['POST'])\n\
                  def run_cmd(host):\n    return host\n";
    let records = track(source);
    let param = records
        .iter()
        .find(|r| r.node_type == UsageKind::Param)
        .unwrap();
    assert_eq!(param.name.as_deref(), Some("host"));
    assert_eq!(chain_of(param), ["flask", "Flask", "route"]);
    assert_eq!(param.package, "flask");
    assert!(param.tags.contains(&"flask".to_string()));
}

#[test]
fn request_attribute_and_fstring_argument_are_linked() {
    let source = "import sqlite3\n\
                  from flask import Flask, request\n\
                  \n\
                  app = Flask(__name__)\n\
                  \n\
                  @app.route('/login', methods=['POST'])\n\
                  def login():\n\
                  \x20\x20\x20\x20username = request.form['user']\n\
                  \x20\x20\x20\x20conn = sqlite3.connect('users.db')\n\
                  \x20\x20\x20\x20conn.execute(f\"SELECT * FROM users WHERE name = '{username}'\")\n\
                  \x20\x20\x20\x20return 'ok'\n";
    let records = track(source);

    let form = records
        .iter()
        .find(|r| r.node_type == UsageKind::Attribute && r.terminal_name() == "form")
        .unwrap();
    assert_eq!(chain_of(form), ["flask", "request", "form"]);

    let execute = calls(&records)
        .into_iter()
        .find(|r| r.terminal_name() == "execute")
        .unwrap();
    assert_eq!(chain_of(execute), ["sqlite3", "connect", "execute"]);

    let arg = records
        .iter()
        .find(|r| r.node_type == UsageKind::Arg && r.call_id == execute.call_id)
        .unwrap();
    assert_eq!(
        arg.expr_chain.as_deref(),
        Some(&["username".to_string()][..])
    );
}

#[test]
fn assignment_is_an_overwrite_not_a_union() {
    let source = "import os\nx = os.path\nx = 5\ny = x.join\n";
    let records = track(source);
    // The original binding is observed once, on line 2.
    let attrs: Vec<&UsageRecord> = records
        .iter()
        .filter(|r| r.node_type == UsageKind::Attribute)
        .collect();
    assert_eq!(attrs.len(), 1);
    assert_eq!(chain_of(attrs[0]), ["os", "path"]);
    assert_eq!(attrs[0].lineno, 2);
}

#[test]
fn boolean_operands_union_their_chains() {
    let source = "import sqlite3\nimport psycopg2\ndb = sqlite3 or psycopg2\ndb.connect()\n";
    let records = track(source);
    let connect_chains: Vec<Vec<&str>> = calls(&records)
        .into_iter()
        .filter(|r| r.terminal_name() == "connect")
        .map(|r| chain_of(r))
        .collect();
    assert!(connect_chains.contains(&vec!["sqlite3", "connect"]));
    assert!(connect_chains.contains(&vec!["psycopg2", "connect"]));
}

#[test]
fn starred_and_doublestar_arguments_are_distinguished() {
    let records = track("import subprocess\nsubprocess.run(*cmd, **opts)\n");
    let starred = records
        .iter()
        .find(|r| r.node_type == UsageKind::ArgStarred)
        .unwrap();
    assert_eq!(starred.arg_pos, Some(0));
    assert_eq!(starred.expr_chain.as_deref(), Some(&["cmd".to_string()][..]));

    let doublestar = records
        .iter()
        .find(|r| r.node_type == UsageKind::KwargDoublestar)
        .unwrap();
    assert_eq!(doublestar.kw_name, None);
    assert_eq!(
        doublestar.expr_chain.as_deref(),
        Some(&["opts".to_string()][..])
    );
}

#[test]
fn record_invariants_hold_on_a_mixed_fixture() {
    let source = "import sqlite3\n\
                  from flask import Flask, request\n\
                  \n\
                  app = Flask(__name__)\n\
                  \n\
                  @app.route('/q')\n\
                  def q(term):\n\
                  \x20\x20\x20\x20conn = sqlite3.connect('db')\n\
                  \x20\x20\x20\x20conn.execute(term, timeout=1)\n\
                  \x20\x20\x20\x20data = eval(term)\n\
                  \x20\x20\x20\x20return data\n";
    let records = track(source);
    assert!(!records.is_empty());

    for record in &records {
        // P1: the chain is rooted at the originating package.
        if record.package == BUILT_IN_PACKAGE {
            assert_eq!(record.chain[0], BUILT_IN_PACKAGE);
        } else {
            assert_eq!(record.chain[0], record.package);
        }
        // P2: the package is always among the tags.
        assert!(record.tags.contains(&record.package));
    }

    // P3: every argument and keyword record resolves to exactly one call
    // record with the same id in the same file.
    for record in &records {
        if matches!(
            record.node_type,
            UsageKind::Arg | UsageKind::ArgStarred | UsageKind::Kwarg | UsageKind::KwargDoublestar
        ) {
            let owners = records
                .iter()
                .filter(|r| {
                    r.node_type == UsageKind::Call
                        && r.call_id == record.call_id
                        && r.file == record.file
                })
                .count();
            assert_eq!(owners, 1);
        }
    }
}

#[test]
fn project_scan_is_deterministic_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("b.py"),
        "import sqlite3\nsqlite3.connect('db')\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("a.py"),
        "from flask import request\nvalue = request.form\n",
    )
    .unwrap();

    let first = analyze_project(dir.path()).unwrap();
    let second = analyze_project(dir.path()).unwrap();
    let first_json = serde_json::to_string(&first).unwrap();
    let second_json = serde_json::to_string(&second).unwrap();
    assert_eq!(first_json, second_json);

    let keys: Vec<(String, Vec<String>, usize)> = first
        .iter()
        .map(|r| (r.package.clone(), r.chain.clone(), r.lineno))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn scan_survives_files_that_do_not_parse_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.py"), b"def broken(:\n  \xff\xfe garbage").unwrap();
    fs::write(
        dir.path().join("good.py"),
        "import os\nos.system('ls')\n",
    )
    .unwrap();

    let records = analyze_project(dir.path()).unwrap();
    assert!(records
        .iter()
        .any(|r| r.node_type == UsageKind::Call && r.chain == ["os", "system"]));
}
