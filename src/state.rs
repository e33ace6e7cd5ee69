//
// state.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// `ServerState` (SPEC_FULL.md §3): the process-wide state mutated under the
// dispatcher's lock. Grounded on the teacher's `WorldState` — a single
// struct the handlers borrow by reference, constructed once at startup and
// threaded through every call rather than reached via a global.
//

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ropey::Rope;
use tokio::sync::broadcast;

use crate::environment::EnvironmentHandle;
use crate::error_store::ErrorStore;
use crate::file::FileHandle;
use crate::request::Request;
use crate::scheduler::Scheduler;
use crate::types::{Location, Position, Type};

pub type ConnectionId = u64;

/// Per-document lookup cache entry (SPEC_FULL.md §3). Built once per path
/// from the AST and source text, held until an explicit evict.
#[derive(Clone)]
pub struct LookupEntry {
    /// Position -> (annotation location, type), keyed by the position the
    /// binding itself starts at.
    pub annotations: Vec<(Position, Location, Type)>,
    /// Position -> definition location for the symbol starting there.
    pub definitions: Vec<(Position, Location)>,
    /// Raw text snapshot used to resolve positions; kept as a rope to match
    /// how the teacher represents open-document contents.
    pub source: Rope,
}

/// Registry of active client sockets and file-change notifier sockets,
/// guarded independently of the rest of `ServerState` so a `StopRequest` or
/// `SaveDocument`'s notifier check never has to wait on the outer lock that
/// serializes request processing (SPEC_FULL.md §5).
#[derive(Default)]
pub struct ConnectionRegistry {
    pub primary: Option<ConnectionId>,
    pub file_notifiers: BTreeSet<ConnectionId>,
}

pub struct ServerState {
    pub environment: Arc<dyn EnvironmentHandle>,
    pub errors: ErrorStore,
    pub handles: BTreeSet<FileHandle>,
    pub lookups: HashMap<String, LookupEntry>,
    pub scheduler: Arc<dyn Scheduler>,
    /// FIFO of queued follow-up checks; invariant: every element is a
    /// `Request::TypeCheck` (SPEC_FULL.md invariant 4).
    pub deferred_requests: Vec<Request>,
    pub connections: Arc<Mutex<ConnectionRegistry>>,
    /// Broadcast used by `StopRequest` to signal the transport's accept loop
    /// to shut down (SPEC_FULL.md §4.7).
    pub shutdown: broadcast::Sender<String>,
    next_connection_id: Arc<AtomicU64>,
}

impl ServerState {
    pub fn new(environment: Arc<dyn EnvironmentHandle>, scheduler: Arc<dyn Scheduler>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            environment,
            errors: ErrorStore::new(),
            handles: BTreeSet::new(),
            lookups: HashMap::new(),
            scheduler,
            deferred_requests: Vec::new(),
            connections: Arc::new(Mutex::new(ConnectionRegistry::default())),
            shutdown,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueue a deferred follow-up check, upholding invariant 4 at the
    /// single point that mutates `deferred_requests`.
    pub fn defer(&mut self, request: crate::request::TypeCheckRequest) {
        self.deferred_requests.push(Request::TypeCheck(request));
    }

    /// Pipeline stage 12: merge freshly resolved handles into the session's
    /// running set.
    pub fn merge_handles(&mut self, resolved: impl IntoIterator<Item = FileHandle>) {
        self.handles.extend(resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::fixture::FixtureEnvironment;
    use crate::scheduler::SequentialScheduler;

    fn fresh_state() -> ServerState {
        ServerState::new(Arc::new(FixtureEnvironment::new()), Arc::new(SequentialScheduler))
    }

    #[test]
    fn new_state_has_no_deferred_requests() {
        let state = fresh_state();
        assert!(state.deferred_requests.is_empty());
    }

    #[test]
    fn connection_ids_are_unique_and_increasing() {
        let state = fresh_state();
        let a = state.next_connection_id();
        let b = state.next_connection_id();
        assert!(b > a);
    }
}
