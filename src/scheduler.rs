//
// scheduler.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// The parallelism boundary (SPEC_FULL.md §4.8, §5): pipeline stages 5 and 9
// ask for a `ParallelToken` once they know the size of the batch they're
// about to process, then map over it through whichever token they got.
// Sequential by default; the caller opts into parallel per batch rather
// than the scheduler guessing from batch size itself, so the `len() > 5`
// threshold SPEC_FULL.md names lives at the call site, not here.
//
// Grounded on `rayon`, the data-parallel map primitive cross-pack enrichment
// pulled in from the sargunv-jvl example (see DESIGN.md) — the teacher's own
// concurrency is message-passing over tokio tasks, which has no batch-map
// analogue to generalize.

use rayon::prelude::*;

pub trait Scheduler: Send + Sync {
    fn with_parallel(&self, parallel: bool) -> ParallelToken;
}

/// A capability to map over a batch either sequentially or in parallel,
/// decided once at acquisition time so a stage's two passes (deciding
/// whether to go parallel, then mapping) can't disagree.
pub enum ParallelToken {
    Sequential,
    Parallel,
}

impl ParallelToken {
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        match self {
            ParallelToken::Sequential => items.into_iter().map(f).collect(),
            ParallelToken::Parallel => items.into_par_iter().map(f).collect(),
        }
    }
}

/// The scheduler this crate runs with outside of tests: honors whatever the
/// caller asks for, backed by rayon's global thread pool.
#[derive(Default)]
pub struct RayonScheduler;

impl Scheduler for RayonScheduler {
    fn with_parallel(&self, parallel: bool) -> ParallelToken {
        if parallel {
            ParallelToken::Parallel
        } else {
            ParallelToken::Sequential
        }
    }
}

/// Forces sequential execution regardless of what's asked for, so unit
/// tests get deterministic ordering without depending on rayon's pool.
#[derive(Default)]
pub struct SequentialScheduler;

impl Scheduler for SequentialScheduler {
    fn with_parallel(&self, _parallel: bool) -> ParallelToken {
        ParallelToken::Sequential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_token_preserves_order() {
        let token = ParallelToken::Sequential;
        let result = token.map(vec![1, 2, 3, 4], |x| x * 2);
        assert_eq!(result, vec![2, 4, 6, 8]);
    }

    #[test]
    fn parallel_token_produces_same_set_as_sequential() {
        let items: Vec<i32> = (0..50).collect();
        let sequential = ParallelToken::Sequential.map(items.clone(), |x| x * x);
        let mut parallel = ParallelToken::Parallel.map(items, |x| x * x);
        parallel.sort_unstable();
        let mut expected = sequential;
        expected.sort_unstable();
        assert_eq!(parallel, expected);
    }

    #[test]
    fn sequential_scheduler_ignores_parallel_request() {
        let scheduler = SequentialScheduler;
        matches!(scheduler.with_parallel(true), ParallelToken::Sequential);
    }

    #[test]
    fn rayon_scheduler_honors_parallel_request() {
        let scheduler = RayonScheduler;
        assert!(matches!(scheduler.with_parallel(true), ParallelToken::Parallel));
        assert!(matches!(scheduler.with_parallel(false), ParallelToken::Sequential));
    }
}
