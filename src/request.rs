//
// request.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// The two tagged unions the dispatcher runs on (SPEC_FULL.md §3). Modeled
// as sum types with one variant per case, matching the teacher's own
// `ark::request::Request` enum; `#[serde(tag = "kind")]` keeps the wire
// encoding self-describing the same way that enum's callers expect.
//

use serde::{Deserialize, Serialize};

use crate::file::{File, FileHandle};
use crate::types::{ErrorRecord, Position, QueryResult, TypeQuery};

/// Distinguishes a long-lived editor connection from a one-shot CLI
/// invocation; only `Persistent` is constructed today (by the LSP `exit`
/// method), but the dispatcher's `ClientExitResponse` always carries one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientKind {
    Persistent,
    OneShot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCheckRequest {
    pub update_environment_with: Vec<File>,
    pub check: Vec<File>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Request {
    TypeCheck(TypeCheckRequest),
    TypeQuery(TypeQuery),
    DisplayTypeErrors(Vec<File>),
    FlushTypeErrors,
    Stop,
    LanguageServerProtocol(String),
    ClientShutdown { id: serde_json::Value },
    ClientExit(ClientKind),
    Rage { id: serde_json::Value },
    GetDefinition { id: serde_json::Value, file: File, position: Position },
    Hover { id: serde_json::Value, file: File, position: Position },
    OpenDocument(File),
    CloseDocument(File),
    SaveDocument(File),
    /// Only ever produced by the transport layer on accept, never legally
    /// handed to the dispatcher (SPEC_FULL.md §4.5, §7 item 5).
    ClientConnection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Response {
    TypeCheck(std::collections::BTreeMap<FileHandle, Vec<ErrorRecord>>),
    TypeQuery(QueryResult),
    LanguageServerProtocol(String),
    Stop,
    ClientExit(ClientKind),
}
