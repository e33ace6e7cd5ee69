//
// tests/dispatcher_scenarios.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// End-to-end scenarios (SPEC_FULL.md §8, §8.1): each test drives a
// `ServerState` purely through `dispatcher::process`, the way the teacher's
// own integration tests exercise the public handler surface rather than
// reaching into internals.
//

use std::sync::Arc;

use tempfile::TempDir;

use vesper_check::dispatcher;
use vesper_check::environment::fixture::FixtureEnvironment;
use vesper_check::environment::AstStore;
use vesper_check::file::{File, FileHandle};
use vesper_check::perf::PerfLog;
use vesper_check::request::{ClientKind, Request, TypeCheckRequest};
use vesper_check::scheduler::SequentialScheduler;
use vesper_check::state::ServerState;
use vesper_check::types::QueryResult;
use vesper_check::{Error, ServerConfig};

fn harness() -> (ServerState, ServerConfig, PerfLog, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = ServerState::new(Arc::new(FixtureEnvironment::new()), Arc::new(SequentialScheduler));
    let config = ServerConfig::new(dir.path(), dir.path().join("vesper.sock"));
    (state, config, PerfLog::new(), dir)
}

fn write(dir: &std::path::Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn drive(state: &mut ServerState, config: &ServerConfig, perf: &PerfLog, request: Request) -> Option<vesper_check::request::Response> {
    dispatcher::process(state, config, perf, 1, request).expect("request succeeds")
}

/// Scenario 1: hover on an open file.
#[test]
fn hover_on_open_file_reads_the_annotation_at_the_converted_position() {
    let (mut state, config, perf, dir) = harness();
    write(dir.path(), "a.py", "pass\npass\npass\nx: int = 1\n");

    let handle = FileHandle::new("a.py");
    state.environment.parse_and_store(&handle, "pass\npass\npass\nx: int = 1\n").expect("fixture source parses");

    let did_open = format!(r#"{{"method":"textDocument/didOpen","params":{{"textDocument":{{"uri":"file://{}/a.py"}}}}}}"#, dir.path().display());
    let response = drive(&mut state, &config, &perf, Request::LanguageServerProtocol(did_open));
    assert!(response.is_none());
    assert!(state.lookups.contains_key("a.py"));

    // Wire line 3 (0-based) is internal line 4 (1-based), matching the
    // binding's location (SPEC_FULL.md invariant 5).
    let hover = format!(
        r#"{{"method":"textDocument/hover","params":{{"textDocument":{{"uri":"file://{}/a.py"}},"position":{{"line":3,"character":0}}}}}}"#,
        dir.path().display()
    );
    let response = drive(&mut state, &config, &perf, Request::LanguageServerProtocol(hover));
    match response {
        Some(vesper_check::request::Response::LanguageServerProtocol(body)) => {
            let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(parsed["result"]["contents"]["value"], "int");
        },
        other => panic!("expected an LSP response, got {other:?}"),
    }
}

/// Scenario 2: an incremental recheck defers a dependent rather than
/// checking it immediately, and a flush drains it.
#[test]
fn incremental_recheck_defers_dependent_until_flush() {
    let (mut state, config, perf, dir) = harness();
    // Annotation-less bindings (`x: = 1`) parse to `Type::Unknown`, which the
    // fixture analyzer reports as an error — giving both files an entry in
    // the error store to observe after the flush.
    write(dir.path(), "a.py", "x: = 1");
    write(dir.path(), "b.py", "import a\ny: = 2");

    // Establish b's import edge first.
    drive(
        &mut state,
        &config,
        &perf,
        Request::TypeCheck(TypeCheckRequest { update_environment_with: vec![File::new(dir.path(), "b.py")], check: vec![] }),
    );

    drive(
        &mut state,
        &config,
        &perf,
        Request::TypeCheck(TypeCheckRequest {
            update_environment_with: vec![File::new(dir.path(), "a.py")],
            check: vec![File::new(dir.path(), "a.py")],
        }),
    );
    assert_eq!(state.deferred_requests.len(), 1);

    let response = drive(&mut state, &config, &perf, Request::FlushTypeErrors);
    match response {
        Some(vesper_check::request::Response::TypeCheck(map)) => {
            assert!(map.contains_key(&FileHandle::new("a.py")));
            assert!(map.contains_key(&FileHandle::new("b.py")));
        },
        other => panic!("expected a TypeCheckResponse, got {other:?}"),
    }
    assert!(state.deferred_requests.is_empty());
}

/// Scenario 3: a stub shadows a same-named source module.
#[test]
fn stub_shadows_source_module() {
    let (mut state, config, perf, dir) = harness();
    write(dir.path(), "m.py", "x: int = 1");
    write(dir.path(), "m.pyi", "x: int = 1");

    drive(
        &mut state,
        &config,
        &perf,
        Request::TypeCheck(TypeCheckRequest {
            update_environment_with: vec![File::new(dir.path(), "m.py"), File::new(dir.path(), "m.pyi")],
            check: vec![],
        }),
    );

    assert_eq!(state.environment.module_definition("m"), Some(FileHandle::new("m.pyi")));
}

/// Scenario 4: a query over an untracked type fails with the exact wording.
#[test]
fn query_over_untracked_type_reports_spec_wording() {
    let (mut state, config, perf, _dir) = harness();
    let response = drive(
        &mut state,
        &config,
        &perf,
        Request::TypeQuery(vesper_check::types::TypeQuery::LessOrEqual("Unknown".to_string(), "int".to_string())),
    );
    match response {
        Some(vesper_check::request::Response::TypeQuery(QueryResult::Error(msg))) => {
            assert_eq!(msg, "Type \"Unknown\" was not found in the type order.");
        },
        other => panic!("expected a TypeQuery error, got {other:?}"),
    }
}

/// Scenario 5: didSave with and without file notifiers attached.
#[test]
fn did_save_without_notifiers_checks_the_file_directly() {
    let (mut state, config, perf, dir) = harness();
    write(dir.path(), "a.py", "x: int = 1");

    let did_save = format!(r#"{{"method":"textDocument/didSave","params":{{"textDocument":{{"uri":"file://{}/a.py"}}}}}}"#, dir.path().display());
    let response = drive(&mut state, &config, &perf, Request::LanguageServerProtocol(did_save));
    assert!(matches!(response, Some(vesper_check::request::Response::TypeCheck(_))));
}

#[test]
fn did_save_with_notifiers_defers_to_the_external_notifier() {
    let (mut state, config, perf, dir) = harness();
    write(dir.path(), "a.py", "x: int = 1");
    state.connections.lock().unwrap().file_notifiers.insert(42);

    let did_save = format!(r#"{{"method":"textDocument/didSave","params":{{"textDocument":{{"uri":"file://{}/a.py"}}}}}}"#, dir.path().display());
    let response = drive(&mut state, &config, &perf, Request::LanguageServerProtocol(did_save));
    assert!(response.is_none());
    assert!(state.errors.all_errors().is_empty());
}

/// Scenario 6: an LSP `exit` produces `ClientExitResponse(Persistent)`.
#[test]
fn lsp_exit_produces_persistent_client_exit() {
    let (mut state, config, perf, _dir) = harness();
    let response = drive(&mut state, &config, &perf, Request::LanguageServerProtocol(r#"{"method":"exit"}"#.to_string()));
    assert!(matches!(response, Some(vesper_check::request::Response::ClientExit(ClientKind::Persistent))));
}

/// `ClientConnectionRequest` is never legal inside the dispatcher.
#[test]
fn client_connection_request_fails_fast() {
    let (mut state, config, perf, _dir) = harness();
    let result = dispatcher::process(&mut state, &config, &perf, 1, Request::ClientConnection);
    assert!(matches!(result, Err(Error::InvalidRequest)));
}
