//
// main.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::RwLock;

use vesper_check::config::ServerConfig;
use vesper_check::environment::fixture::FixtureEnvironment;
use vesper_check::lsp;
use vesper_check::perf::PerfLog;
use vesper_check::scheduler::RayonScheduler;
use vesper_check::state::ServerState;
use vesper_check::transport;

fn print_usage() {
    println!("vesper-check {}, an incremental type-checking server.", env!("CARGO_PKG_VERSION"));
    print!(
        r#"
Usage: vesper-check [OPTIONS]

Available options:

--socket <path>               Unix domain socket to bind the native protocol to
--root <path>                 Workspace root source files are resolved against
--stdio                       Speak LSP directly over stdin/stdout
--version                     Print the version
--help                        Print this help message

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut socket_path: Option<PathBuf> = None;
    let mut root: Option<PathBuf> = None;
    let mut use_stdio = false;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--socket" => {
                let value = argv.next().ok_or_else(|| anyhow::anyhow!("--socket requires a path"))?;
                socket_path = Some(PathBuf::from(value));
            },
            "--root" => {
                let value = argv.next().ok_or_else(|| anyhow::anyhow!("--root requires a path"))?;
                root = Some(PathBuf::from(value));
            },
            "--stdio" => use_stdio = true,
            "--version" => {
                println!("vesper-check {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            },
            "--help" => {
                print_usage();
                return Ok(());
            },
            other => {
                return Err(anyhow::anyhow!("Unknown argument: '{other}'"));
            },
        }
    }

    env_logger::init();

    let root = root.unwrap_or_else(|| env::current_dir().expect("current directory is accessible"));
    let socket_path = socket_path.unwrap_or_else(|| root.join(".vesper-check.sock"));
    let config = Arc::new(ServerConfig::new(root, socket_path.clone()));

    let environment = Arc::new(FixtureEnvironment::new());
    let scheduler = Arc::new(RayonScheduler);
    let state = Arc::new(RwLock::new(ServerState::new(environment, scheduler)));
    let perf = Arc::new(PerfLog::new());

    if use_stdio {
        log::info!("starting in --stdio mode");
        return lsp::stdio::serve(state, config, perf).await.map_err(Into::into);
    }

    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;
    log::info!("listening on {}", socket_path.display());
    transport::serve(listener, state, config, perf).await.map_err(Into::into)
}
