//
// perf.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// Lightweight performance event recording (SPEC_FULL.md §4.5: "every call
// records a performance event keyed by request kind and elapsed time").
// Kept as a bounded in-memory ring so a long-lived server doesn't grow this
// list unboundedly; `rage` reads the recent tail.
//

use std::sync::Mutex;
use std::time::Duration;

const MAX_EVENTS: usize = 256;

#[derive(Clone, Debug)]
pub struct PerfEvent {
    pub kind: String,
    pub elapsed: Duration,
}

#[derive(Default)]
pub struct PerfLog {
    events: Mutex<Vec<PerfEvent>>,
}

impl PerfLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: impl Into<String>, elapsed: Duration) {
        let mut events = self.events.lock().expect("perf log poisoned");
        events.push(PerfEvent { kind: kind.into(), elapsed });
        if events.len() > MAX_EVENTS {
            let overflow = events.len() - MAX_EVENTS;
            events.drain(0..overflow);
        }
    }

    pub fn recent(&self) -> Vec<PerfEvent> {
        self.events.lock().expect("perf log poisoned").clone()
    }

    /// Rendered lines for a `RageRequest` response.
    pub fn render_lines(&self) -> Vec<String> {
        self.recent().into_iter().map(|event| format!("{}: {:?}", event.kind, event.elapsed)).collect()
    }
}
