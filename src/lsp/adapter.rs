//
// lsp/adapter.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// Decodes one JSON-RPC method call into a native `Request` (SPEC_FULL.md
// §4.1). The wire/internal position conversion lives here and nowhere else.
//

use std::path::Path;

use serde_json::Value;
use tower_lsp::lsp_types::Position as LspPosition;

use crate::file::File;
use crate::request::{ClientKind, Request};
use crate::types::Position;

/// Decodes one JSON-RPC object into an internal request, or `None` if the
/// method is unrecognized or the message is malformed. Never fatal —
/// malformed input is logged and swallowed (SPEC_FULL.md §4.1, §7 item 1).
pub fn parse(root: &Path, raw_json: &str) -> Option<Request> {
    let envelope: Value = match serde_json::from_str(raw_json) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("malformed LSP message: {err}");
            return None;
        },
    };

    let method = envelope.get("method").and_then(Value::as_str)?;
    let params = envelope.get("params").cloned().unwrap_or(Value::Null);
    let id = envelope.get("id").cloned().unwrap_or(Value::Null);

    let request = match method {
        "textDocument/definition" => {
            text_document_position(root, &params).map(|(file, position)| Request::GetDefinition { id, file, position })
        },
        "textDocument/hover" => {
            text_document_position(root, &params).map(|(file, position)| Request::Hover { id, file, position })
        },
        "textDocument/didOpen" => document_uri(root, &params).map(Request::OpenDocument),
        "textDocument/didClose" => document_uri(root, &params).map(Request::CloseDocument),
        "textDocument/didSave" => did_save(root, &params),
        "shutdown" => Some(Request::ClientShutdown { id }),
        "exit" => Some(Request::ClientExit(ClientKind::Persistent)),
        "telemetry/rage" => Some(Request::Rage { id }),
        other => {
            log::info!("Unhandled LSP method: {other}");
            None
        },
    };

    if request.is_none() && matches!(method, "textDocument/definition" | "textDocument/hover" | "textDocument/didOpen" | "textDocument/didClose" | "textDocument/didSave")
    {
        log::warn!("malformed params for LSP method {method}");
    }

    request
}

fn text_document_position(root: &Path, params: &Value) -> Option<(File, Position)> {
    let uri = params.get("textDocument")?.get("uri")?.as_str()?;
    let wire_position: LspPosition = serde_json::from_value(params.get("position")?.clone()).ok()?;
    // Wire lines are 0-based; internal lines are 1-based (SPEC_FULL.md
    // invariant 5). This is the only place that conversion happens.
    Some((File::from_uri(root, uri), Position::new(wire_position.line + 1, wire_position.character)))
}

fn document_uri(root: &Path, params: &Value) -> Option<File> {
    let uri = params.get("textDocument")?.get("uri")?.as_str()?;
    Some(File::from_uri(root, uri))
}

fn did_save(root: &Path, params: &Value) -> Option<Request> {
    let uri = params.get("textDocument")?.get("uri")?.as_str()?;
    let mut file = File::from_uri(root, uri);
    if let Some(text) = params.get("text").and_then(Value::as_str) {
        file = file.with_content(text);
    }
    Some(Request::SaveDocument(file))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn hover_request_converts_wire_line_to_one_based() {
        let raw = r#"{"method":"textDocument/hover","params":{"textDocument":{"uri":"file:///r/a.py"},"position":{"line":3,"character":5}}}"#;
        match parse(Path::new("/r"), raw) {
            Some(Request::Hover { file, position, .. }) => {
                assert_eq!(file.relative_path, "a.py");
                assert_eq!(position, Position::new(4, 5));
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn did_save_attaches_content_override_when_present() {
        let raw = r#"{"method":"textDocument/didSave","params":{"textDocument":{"uri":"file:///r/a.py"},"text":"x = 1"}}"#;
        match parse(Path::new("/r"), raw) {
            Some(Request::SaveDocument(file)) => assert_eq!(file.content_override.as_deref(), Some("x = 1")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn did_save_without_text_has_no_content_override() {
        let raw = r#"{"method":"textDocument/didSave","params":{"textDocument":{"uri":"file:///r/a.py"}}}"#;
        match parse(Path::new("/r"), raw) {
            Some(Request::SaveDocument(file)) => assert!(file.content_override.is_none()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn exit_produces_persistent_client_exit() {
        let raw = r#"{"method":"exit"}"#;
        match parse(Path::new("/r"), raw) {
            Some(Request::ClientExit(ClientKind::Persistent)) => {},
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unhandled_method_produces_nothing() {
        let raw = r#"{"method":"workspace/symbol","params":{}}"#;
        assert!(parse(Path::new("/r"), raw).is_none());
    }

    #[test]
    fn malformed_json_produces_nothing() {
        assert!(parse(Path::new("/r"), "not json").is_none());
    }

    #[test]
    fn hover_missing_position_produces_nothing() {
        let raw = r#"{"method":"textDocument/hover","params":{"textDocument":{"uri":"file:///r/a.py"}}}"#;
        assert!(parse(Path::new("/r"), raw).is_none());
    }
}
