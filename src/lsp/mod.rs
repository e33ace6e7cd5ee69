//
// lsp/mod.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// LSP Adapter (C1, SPEC_FULL.md §4.1): decodes JSON LSP messages into the
// native `Request` union and builds the JSON responses the dispatcher
// hands back. LSP is carried as a raw JSON string inside
// `Request::LanguageServerProtocol` on the same native socket transport as
// every other request — there is no separate stdio server loop here.
//

pub mod adapter;
pub mod response;
pub mod stdio;

pub use adapter::parse;
