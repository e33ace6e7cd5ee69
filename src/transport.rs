//
// transport.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// Transport (C7, SPEC_FULL.md §4.7): a Unix-domain-socket server. Each
// connection is its own task; one connection processes requests
// sequentially, each handed to the dispatcher in turn, with a
// `tokio::sync::RwLock<ServerState>` write guard serializing concurrent
// connections — matching §5's single-threaded-at-the-dispatcher-level
// guarantee. Framing is a 4-byte big-endian length preamble followed by a
// `serde_json`-encoded payload, in the style of length-delimited framing
// over a stream socket rather than delimiter-scanning.
//

use std::io::ErrorKind;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::dispatcher;
use crate::error::{Error, Result};
use crate::perf::PerfLog;
use crate::request::{Request, Response};
use crate::state::ServerState;

pub async fn serve(
    listener: UnixListener,
    state: Arc<RwLock<ServerState>>,
    config: Arc<ServerConfig>,
    perf: Arc<PerfLog>,
) -> Result<()> {
    let mut shutdown_rx = state.read().await.shutdown.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                let state = state.clone();
                let config = config.clone();
                let perf = perf.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, state, config, perf).await {
                        log::warn!("connection terminated: {err}");
                    }
                });
            }
            reason = shutdown_rx.recv() => {
                if let Ok(reason) = reason {
                    log::info!("transport shutting down: {reason}");
                }
                break;
            }
        }
    }
    Ok(())
}

async fn handle_connection(
    mut stream: UnixStream,
    state: Arc<RwLock<ServerState>>,
    config: Arc<ServerConfig>,
    perf: Arc<PerfLog>,
) -> Result<()> {
    let connection_id = {
        let guard = state.read().await;
        let id = guard.next_connection_id();
        let mut connections = guard.connections.lock().expect("connection registry poisoned");
        connections.primary.get_or_insert(id);
        id
    };
    log::debug!("connection {connection_id} accepted");

    loop {
        let request: Request = match read_framed(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(err) if is_broken_pipe(&err) => {
                log::info!("connection {connection_id} closed: {err}");
                break;
            },
            Err(err) => return Err(err.into()),
        };

        let outcome = {
            let mut guard = state.write().await;
            dispatcher::process(&mut guard, &config, &perf, connection_id, request)
        };

        match outcome {
            Ok(Some(response)) => {
                if let Err(err) = write_framed(&mut stream, &response).await {
                    if is_broken_pipe(&err) {
                        log::info!("connection {connection_id} broken pipe on write: {err}");
                        break;
                    }
                    return Err(err.into());
                }
                if matches!(response, Response::Stop) {
                    break;
                }
            },
            Ok(None) => {},
            Err(Error::InvalidRequest) => {
                log::warn!("connection {connection_id} sent an invalid request");
                break;
            },
            Err(err) => return Err(err),
        }
    }

    let guard = state.read().await;
    let mut connections = guard.connections.lock().expect("connection registry poisoned");
    if connections.primary == Some(connection_id) {
        connections.primary = None;
    }
    connections.file_notifiers.remove(&connection_id);
    Ok(())
}

fn is_broken_pipe(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof)
}

async fn read_framed<T: DeserializeOwned>(stream: &mut (impl AsyncRead + Unpin)) -> std::io::Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {},
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    let value = serde_json::from_slice(&payload).map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))?;
    Ok(Some(value))
}

async fn write_framed<T: Serialize>(stream: &mut (impl AsyncWrite + Unpin), value: &T) -> std::io::Result<()> {
    let payload = serde_json::to_vec(value).map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))?;
    let len = u32::try_from(payload.len()).map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&payload).await?;
    Ok(())
}
