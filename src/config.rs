//
// config.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// Construction-time configuration, threaded by reference into every
// handler — mirrors the teacher's `WorldState::new(library_paths)`
// construction-time wiring (SPEC_FULL.md §1.1).
//

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub local_root: PathBuf,
    pub socket_path: PathBuf,
    /// Pipeline stage 2 goes parallel when `check.len() > parallel_threshold`.
    pub parallel_threshold: usize,
}

impl ServerConfig {
    pub fn new(local_root: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
            socket_path: socket_path.into(),
            parallel_threshold: 5,
        }
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parallel_threshold_matches_pipeline_stage_two() {
        let config = ServerConfig::new("/r", "/tmp/vesper.sock");
        assert_eq!(config.parallel_threshold, 5);
    }
}
