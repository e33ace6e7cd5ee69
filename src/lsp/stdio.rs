//
// lsp/stdio.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// `--stdio` mode: editors that embed this server directly (rather than
// connecting to the native Unix socket) speak LSP framed the usual way —
// `Content-Length: N\r\n\r\n` followed by N bytes of JSON — over stdin and
// stdout. Every message is funneled through the same
// `Request::LanguageServerProtocol` + `dispatcher::process` path the native
// socket transport uses; this module only owns the framing and the
// single-threaded read/dispatch/write loop.
//

use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::dispatcher;
use crate::error::Result;
use crate::perf::PerfLog;
use crate::request::{Request, Response};
use crate::state::ServerState;

pub async fn serve(state: Arc<RwLock<ServerState>>, config: Arc<ServerConfig>, perf: Arc<PerfLog>) -> Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let connection_id = {
        let guard = state.read().await;
        guard.next_connection_id()
    };

    loop {
        let Some(body) = read_message(&mut reader)? else { break };
        let request = Request::LanguageServerProtocol(body);

        let outcome = {
            let mut guard = state.write().await;
            dispatcher::process(&mut guard, &config, &perf, connection_id, request)
        };

        match outcome {
            Ok(Some(Response::LanguageServerProtocol(body))) => {
                write_message(&mut stdout.lock(), &body)?;
            },
            Ok(Some(Response::ClientExit(_))) => break,
            Ok(_) => {},
            Err(err) => {
                log::error!("stdio request failed: {err}");
                break;
            },
        }
    }
    Ok(())
}

fn read_message(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut content_length = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
    }
    let Some(length) = content_length else {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header"));
    };
    let mut buf = vec![0u8; length];
    reader.read_exact(&mut buf)?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn write_message(writer: &mut impl Write, body: &str) -> io::Result<()> {
    write!(writer, "Content-Length: {}\r\n\r\n{}", body.len(), body)?;
    writer.flush()
}
