//
// dispatcher.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// Request Dispatcher (C5, SPEC_FULL.md §4.5): the top-level state machine.
// Kept fully synchronous — all socket I/O lives in `transport.rs` — which
// is what lets `FlushTypeErrorsRequest`'s drain and
// `LanguageServerProtocolRequest`'s unwrap recurse through plain function
// calls instead of needing to box futures (SPEC_FULL.md §9 "recursive
// dispatch" design note: bound the recursion rather than grow the stack
// unboundedly; the flush loop below is iterative for exactly that reason).
//

use std::time::Instant;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::file::File;
use crate::lsp;
use crate::pipeline;
use crate::query;
use crate::perf::PerfLog;
use crate::request::{Request, Response};
use crate::state::{ConnectionId, ServerState};

/// Runs one request to completion, recording a performance event for it
/// regardless of outcome.
pub fn process(
    state: &mut ServerState,
    config: &ServerConfig,
    perf: &PerfLog,
    connection: ConnectionId,
    request: Request,
) -> Result<Option<Response>> {
    let start = Instant::now();
    let kind = request_kind(&request);
    let result = dispatch(state, config, perf, connection, request);
    perf.record(kind, start.elapsed());
    result
}

fn dispatch(
    state: &mut ServerState,
    config: &ServerConfig,
    perf: &PerfLog,
    connection: ConnectionId,
    request: Request,
) -> Result<Option<Response>> {
    match request {
        Request::TypeCheck(req) => {
            run_shared_memory_gc(state);
            Ok(Some(pipeline::process_type_check(state, config, req)))
        },

        Request::TypeQuery(query) => Ok(Some(query::process_type_query(state, config, query))),

        Request::DisplayTypeErrors(files) => Ok(Some(display_type_errors(state, &files))),

        Request::FlushTypeErrors => Ok(Some(flush(state, config))),

        Request::Stop => {
            {
                let mut connections = state.connections.lock().expect("connection registry poisoned");
                connections.primary = None;
            }
            let _ = state.shutdown.send("explicit request".to_string());
            Ok(Some(Response::Stop))
        },

        Request::LanguageServerProtocol(raw) => match lsp::parse(&config.local_root, &raw) {
            Some(inner) => process(state, config, perf, connection, inner),
            None => Ok(None),
        },

        Request::ClientShutdown { id } => Ok(Some(lsp::response::shutdown_response(id))),

        Request::ClientExit(kind) => {
            log::info!("client exit requested");
            Ok(Some(Response::ClientExit(kind)))
        },

        Request::Rage { id } => Ok(Some(lsp::response::rage_response(id, perf.render_lines()))),

        Request::GetDefinition { id, file, position } => {
            let found = crate::cache::find_definition(state, config, &file, position);
            Ok(Some(lsp::response::definition_response(id, &config.local_root, found)))
        },

        Request::Hover { id, file, position } => {
            let found = crate::cache::find_annotation(state, config, &file, position);
            Ok(Some(lsp::response::hover_response(id, found)))
        },

        Request::OpenDocument(file) => {
            crate::cache::evict(state, &file);
            crate::cache::get(state, config, &file);
            Ok(None)
        },

        Request::CloseDocument(file) => {
            crate::cache::evict(state, &file);
            Ok(None)
        },

        Request::SaveDocument(file) => {
            crate::cache::evict(state, &file);
            let has_notifiers = {
                let connections = state.connections.lock().expect("connection registry poisoned");
                !connections.file_notifiers.is_empty()
            };
            if has_notifiers {
                Ok(None)
            } else {
                let request = crate::request::TypeCheckRequest {
                    update_environment_with: vec![file.clone()],
                    check: vec![file],
                };
                Ok(Some(pipeline::process_type_check(state, config, request)))
            }
        },

        Request::ClientConnection => Err(Error::InvalidRequest),
    }
}

/// Runs all errors in the store regardless of check-list, or a filtered
/// view over resolvable handles from `files` (SPEC_FULL.md §4.5). Never
/// mutates state.
fn display_type_errors(state: &ServerState, files: &[File]) -> Response {
    if files.is_empty() {
        let all = state.errors.all_errors();
        return Response::TypeCheck(state.errors.build_file_to_error_map(None, &all));
    }
    let handles: Vec<_> = files.iter().filter_map(File::try_handle).collect();
    let errors = state.errors.errors_for(&handles);
    Response::TypeCheck(state.errors.build_file_to_error_map(Some(&handles), &errors))
}

/// Drains `deferred_requests` and re-checks each one, then reports every
/// error currently in the store. Iterative rather than recursive, per the
/// bounded-recursion design note — a flush may legitimately process
/// thousands of queued follow-up checks.
fn flush(state: &mut ServerState, config: &ServerConfig) -> Response {
    let pending = std::mem::take(&mut state.deferred_requests);
    for request in pending {
        match request {
            Request::TypeCheck(req) => {
                pipeline::process_type_check(state, config, req);
            },
            other => unreachable!("deferred_requests must only ever contain TypeCheck variants, got {other:?}"),
        }
    }
    let all = state.errors.all_errors();
    Response::TypeCheck(state.errors.build_file_to_error_map(None, &all))
}

/// Placeholder for the aggressive shared-memory GC the native `TypeCheck`
/// path runs before the pipeline proper; the fixture environment has no
/// generational storage to compact, so this currently just clears the
/// attribute memo a second time defensively.
fn run_shared_memory_gc(state: &ServerState) {
    state.environment.clear_attribute_memo();
}

fn request_kind(request: &Request) -> &'static str {
    match request {
        Request::TypeCheck(_) => "type_check",
        Request::TypeQuery(_) => "type_query",
        Request::DisplayTypeErrors(_) => "display_type_errors",
        Request::FlushTypeErrors => "flush_type_errors",
        Request::Stop => "stop",
        Request::LanguageServerProtocol(_) => "lsp",
        Request::ClientShutdown { .. } => "client_shutdown",
        Request::ClientExit(_) => "client_exit",
        Request::Rage { .. } => "rage",
        Request::GetDefinition { .. } => "get_definition",
        Request::Hover { .. } => "hover",
        Request::OpenDocument(_) => "open_document",
        Request::CloseDocument(_) => "close_document",
        Request::SaveDocument(_) => "save_document",
        Request::ClientConnection => "client_connection",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::environment::fixture::FixtureEnvironment;
    use crate::scheduler::SequentialScheduler;

    fn harness() -> (ServerState, ServerConfig, PerfLog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = ServerState::new(Arc::new(FixtureEnvironment::new()), Arc::new(SequentialScheduler));
        let config = ServerConfig::new(dir.path(), dir.path().join("vesper.sock"));
        (state, config, PerfLog::new(), dir)
    }

    #[test]
    fn client_connection_request_is_invalid() {
        let (mut state, config, perf, _dir) = harness();
        let result = process(&mut state, &config, &perf, 1, Request::ClientConnection);
        assert!(matches!(result, Err(Error::InvalidRequest)));
    }

    #[test]
    fn stop_request_broadcasts_shutdown_and_returns_stop_response() {
        let (mut state, config, perf, _dir) = harness();
        let mut receiver = state.shutdown.subscribe();
        let response = process(&mut state, &config, &perf, 1, Request::Stop).unwrap();
        assert!(matches!(response, Some(Response::Stop)));
        assert_eq!(receiver.try_recv().unwrap(), "explicit request");
    }

    #[test]
    fn exit_request_returns_client_exit_response() {
        let (mut state, config, perf, _dir) = harness();
        let response = process(&mut state, &config, &perf, 1, Request::ClientExit(crate::request::ClientKind::Persistent));
        assert!(matches!(response, Ok(Some(Response::ClientExit(crate::request::ClientKind::Persistent)))));
    }

    #[test]
    fn save_document_with_no_notifiers_runs_a_type_check() {
        let (mut state, config, perf, dir) = harness();
        std::fs::write(dir.path().join("a.py"), "x: int = 1").unwrap();
        let file = File::new(dir.path(), "a.py");
        let response = process(&mut state, &config, &perf, 1, Request::SaveDocument(file)).unwrap();
        assert!(matches!(response, Some(Response::TypeCheck(_))));
    }

    #[test]
    fn save_document_with_notifiers_returns_nothing_and_does_not_mutate_errors() {
        let (mut state, config, perf, dir) = harness();
        std::fs::write(dir.path().join("a.py"), "x: int = 1").unwrap();
        state.connections.lock().unwrap().file_notifiers.insert(99);

        let file = File::new(dir.path(), "a.py");
        let response = process(&mut state, &config, &perf, 1, Request::SaveDocument(file)).unwrap();
        assert!(response.is_none());
        assert!(state.errors.all_errors().is_empty());
    }

    #[test]
    fn flush_drains_deferred_requests_and_reports_all_errors() {
        let (mut state, config, perf, dir) = harness();
        std::fs::write(dir.path().join("a.py"), "x: int = 1").unwrap();
        state.defer(crate::request::TypeCheckRequest {
            update_environment_with: vec![File::new(dir.path(), "a.py")],
            check: vec![File::new(dir.path(), "a.py")],
        });
        assert_eq!(state.deferred_requests.len(), 1);

        let response = process(&mut state, &config, &perf, 1, Request::FlushTypeErrors).unwrap();
        assert!(state.deferred_requests.is_empty());
        assert!(matches!(response, Some(Response::TypeCheck(_))));
    }

    #[test]
    fn display_type_errors_with_empty_filter_returns_everything() {
        let (mut state, config, perf, _dir) = harness();
        let response = process(&mut state, &config, &perf, 1, Request::DisplayTypeErrors(vec![])).unwrap();
        assert!(matches!(response, Some(Response::TypeCheck(map)) if map.is_empty()));
    }
}
