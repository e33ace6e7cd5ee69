//
// cache.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// LookupCache (C2, SPEC_FULL.md §4.2): the only two legal mutators of
// `state.lookups` live here — `get` (insert on miss) and `evict` — so cache
// coherence is enforceable by code review at a single call site rather than
// scattered across every handler that touches a document.
//

use std::fs;

use ropey::Rope;

use crate::config::ServerConfig;
use crate::file::File;
use crate::state::{LookupEntry, ServerState};
use crate::types::{Location, Position, Type};

/// Returns the cached entry for `file`, building one on a cache miss.
///
/// Build order: read the AST from shared memory, then construct the
/// position index by asking the environment for the annotation and
/// definition at each binding's start position, then read the source text,
/// then populate the entry. If no AST is available for the handle, nothing
/// is inserted and nothing is returned.
pub fn get(state: &mut ServerState, config: &ServerConfig, file: &File) -> Option<LookupEntry> {
    if let Some(entry) = state.lookups.get(&file.relative_path) {
        return Some(entry.clone());
    }

    let handle = file.handle();
    let ast = state.environment.get(&handle)?;

    let mut annotations = Vec::new();
    let mut definitions = Vec::new();
    for binding in &ast.bindings {
        let pos = binding.location.start;
        if let Some((location, ty)) = state.environment.annotation_at(&handle, pos) {
            annotations.push((pos, location, ty));
        }
        if let Some(location) = state.environment.definition_at(&handle, pos) {
            definitions.push((pos, location));
        }
    }

    let source = read_source(config, file);
    let entry = LookupEntry { annotations, definitions, source };
    state.lookups.insert(file.relative_path.clone(), entry.clone());
    Some(entry)
}

/// Removes the entry keyed by `file`'s relative path, if any. Idempotent.
pub fn evict(state: &mut ServerState, file: &File) {
    state.lookups.remove(&file.relative_path);
}

pub fn find_annotation(
    state: &mut ServerState,
    config: &ServerConfig,
    file: &File,
    pos: Position,
) -> Option<(Location, Type)> {
    let entry = get(state, config, file)?;
    entry
        .annotations
        .iter()
        .find(|(at, _, _)| *at == pos)
        .map(|(_, location, ty)| (location.clone(), ty.clone()))
}

pub fn find_definition(state: &mut ServerState, config: &ServerConfig, file: &File, pos: Position) -> Option<Location> {
    let entry = get(state, config, file)?;
    entry.definitions.iter().find(|(at, _)| *at == pos).map(|(_, location)| location.clone())
}

fn read_source(config: &ServerConfig, file: &File) -> Rope {
    if let Some(content) = &file.content_override {
        return Rope::from_str(content);
    }
    let absolute = config.local_root.join(&file.relative_path);
    let content = fs::read_to_string(absolute).unwrap_or_default();
    Rope::from_str(&content)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::environment::fixture::FixtureEnvironment;
    use crate::environment::AstStore;
    use crate::scheduler::SequentialScheduler;

    fn empty_state() -> ServerState {
        ServerState::new(Arc::new(FixtureEnvironment::new()), Arc::new(SequentialScheduler))
    }

    #[test]
    fn get_returns_none_without_an_ast() {
        let mut state = empty_state();
        let config = ServerConfig::new(std::env::temp_dir(), "/tmp/vesper.sock");
        let file = File::new(std::env::temp_dir(), "missing.py");
        assert!(get(&mut state, &config, &file).is_none());
    }

    #[test]
    fn evict_is_idempotent() {
        let mut state = empty_state();
        let config = ServerConfig::new(std::env::temp_dir(), "/tmp/vesper.sock");
        let file = File::new(std::env::temp_dir(), "a.py");
        evict(&mut state, &file);
        evict(&mut state, &file);
        assert!(!state.lookups.contains_key("a.py"));
    }

    #[test]
    fn get_builds_entry_from_ast_and_caches_it() {
        let env = FixtureEnvironment::new();
        let handle = crate::file::FileHandle::new("a.py");
        env.parse_and_store(&handle, "x: int = 1").expect("fixture source parses");
        let state_env: Arc<dyn crate::environment::EnvironmentHandle> = Arc::new(env);
        let mut state = ServerState::new(state_env, Arc::new(SequentialScheduler));
        let config = ServerConfig::new(std::env::temp_dir(), "/tmp/vesper.sock");
        let file = File::new(std::env::temp_dir(), "a.py").with_content("x: int = 1");

        let entry = get(&mut state, &config, &file).expect("ast present, entry built");
        assert_eq!(entry.annotations.len(), 1);
        assert!(state.lookups.contains_key("a.py"));
    }
}
