//
// lsp/response.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// Builds the JSON-RPC response bodies the dispatcher sends back over the
// native socket for LSP-originated requests. Payload shapes are the real
// `tower_lsp::lsp_types` structs (`Hover`, `GotoDefinitionResponse`,
// `Location`) serialized with `serde_json` — the same wire shapes the
// teacher's `ark-lsp::handlers` returns from its `LanguageServer` trait
// methods — but wrapped in a hand-built `{jsonrpc, id, result}` envelope
// ourselves, since the adapter doesn't hand requests to tower-lsp's own
// `Server`/`LspService` machinery (SPEC_FULL.md §4.1: LSP is multiplexed
// over the native socket, not served over a separate stdio/TCP channel).
//

use std::path::Path;

use serde_json::{json, Value};
use tower_lsp::lsp_types::{GotoDefinitionResponse, Hover, HoverContents, MarkupContent, MarkupKind, Range};

use crate::file::File;
use crate::request::Response;
use crate::types::{Location, Type};

fn wrap(id: Value, result: Value) -> Response {
    let body = json!({ "jsonrpc": "2.0", "id": id, "result": result });
    Response::LanguageServerProtocol(body.to_string())
}

fn to_lsp_range(location: &Location) -> Range {
    Range {
        start: lsp_position(location.start),
        end: lsp_position(location.end),
    }
}

fn lsp_position(pos: crate::types::Position) -> tower_lsp::lsp_types::Position {
    tower_lsp::lsp_types::Position::new(pos.line, pos.column)
}

fn to_lsp_location(root: &Path, location: &Location) -> tower_lsp::lsp_types::Location {
    let uri = File::new(root.to_path_buf(), location.path.as_str()).to_uri();
    tower_lsp::lsp_types::Location { uri, range: to_lsp_range(location) }
}

/// Always produces a response, even when nothing resolved at the position
/// (SPEC_FULL.md §4.5): an empty result, not a missing one.
pub fn hover_response(id: Value, found: Option<(Location, Type)>) -> Response {
    let result = match found {
        Some((location, ty)) => {
            let hover = Hover {
                contents: HoverContents::Markup(MarkupContent { kind: MarkupKind::Markdown, value: ty.to_string() }),
                range: Some(to_lsp_range(&location)),
            };
            serde_json::to_value(hover).expect("Hover serializes")
        },
        None => Value::Null,
    };
    wrap(id, result)
}

pub fn definition_response(id: Value, root: &Path, found: Option<Location>) -> Response {
    let result = match found {
        Some(location) => {
            let response = GotoDefinitionResponse::Scalar(to_lsp_location(root, &location));
            serde_json::to_value(response).expect("GotoDefinitionResponse serializes")
        },
        None => Value::Null,
    };
    wrap(id, result)
}

pub fn shutdown_response(id: Value) -> Response {
    wrap(id, Value::Null)
}

pub fn rage_response(id: Value, items: Vec<String>) -> Response {
    wrap(id, json!({ "items": items }))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::file::FileHandle;
    use crate::types::Position;

    #[test]
    fn hover_response_with_no_annotation_is_null_result() {
        match hover_response(json!(1), None) {
            Response::LanguageServerProtocol(body) => {
                let parsed: Value = serde_json::from_str(&body).unwrap();
                assert!(parsed["result"].is_null());
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn hover_response_renders_type_as_markdown_contents() {
        let location = Location { path: FileHandle::new("a.py"), start: Position::new(4, 5), end: Position::new(4, 6) };
        match hover_response(json!(1), Some((location, Type::Int))) {
            Response::LanguageServerProtocol(body) => {
                let parsed: Value = serde_json::from_str(&body).unwrap();
                assert_eq!(parsed["result"]["contents"]["value"], "int");
                assert_eq!(parsed["result"]["range"]["start"]["line"], 4);
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn definition_response_echoes_location_unmodified() {
        let location = Location { path: FileHandle::new("a.py"), start: Position::new(4, 5), end: Position::new(4, 6) };
        match definition_response(json!(2), Path::new("/r"), Some(location)) {
            Response::LanguageServerProtocol(body) => {
                let parsed: Value = serde_json::from_str(&body).unwrap();
                assert_eq!(parsed["result"]["range"]["start"]["line"], 4);
                assert!(parsed["result"]["uri"].as_str().unwrap().ends_with("a.py"));
            },
            _ => unreachable!(),
        }
    }
}
