//
// error_store.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// Error Store & Reporter (C6, SPEC_FULL.md §4.6): the file→errors multimap
// and the builder that turns a slice of fresh errors into the response
// payload both `process_type_check` and `DisplayTypeErrors` hand back.
//

use std::collections::BTreeMap;

use crate::file::FileHandle;
use crate::types::ErrorRecord;

#[derive(Default)]
pub struct ErrorStore {
    by_file: BTreeMap<FileHandle, Vec<ErrorRecord>>,
}

impl ErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Multimap append keyed by `handle(error.path)`.
    pub fn insert(&mut self, error: ErrorRecord) {
        self.by_file.entry(error.path.clone()).or_default().push(error);
    }

    /// Clears all errors for `handle`. Idempotent.
    pub fn remove(&mut self, handle: &FileHandle) {
        self.by_file.remove(handle);
    }

    pub fn keys(&self) -> impl Iterator<Item = &FileHandle> {
        self.by_file.keys()
    }

    pub fn all_errors(&self) -> Vec<ErrorRecord> {
        self.by_file.values().flatten().cloned().collect()
    }

    /// Errors for exactly the given handles, each file's errors in
    /// insertion order; handles with nothing recorded are simply absent.
    pub fn errors_for(&self, handles: &[FileHandle]) -> Vec<ErrorRecord> {
        handles
            .iter()
            .filter_map(|handle| self.by_file.get(handle))
            .flatten()
            .cloned()
            .collect()
    }

    /// Seed with `checked_files` if given, else every key currently in the
    /// store; overlay `errors` grouped by file. Seeding with empty vectors
    /// first is what lets a zero-error file still appear in the result, so
    /// clients can clear stale diagnostics for it.
    pub fn build_file_to_error_map(
        &self,
        checked_files: Option<&[FileHandle]>,
        errors: &[ErrorRecord],
    ) -> BTreeMap<FileHandle, Vec<ErrorRecord>> {
        let mut map: BTreeMap<FileHandle, Vec<ErrorRecord>> = BTreeMap::new();
        match checked_files {
            Some(files) => {
                for handle in files {
                    map.entry(handle.clone()).or_default();
                }
            },
            None => {
                for handle in self.by_file.keys() {
                    map.entry(handle.clone()).or_default();
                }
            },
        }
        for error in errors {
            map.entry(error.path.clone()).or_default().push(error.clone());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, Position};

    fn error(path: &str, message: &str) -> ErrorRecord {
        let handle = FileHandle::new(path);
        ErrorRecord {
            path: handle.clone(),
            kind: "test-error".to_string(),
            location: Location {
                path: handle,
                start: Position::new(1, 0),
                end: Position::new(1, 1),
            },
            message: message.to_string(),
        }
    }

    #[test]
    fn checked_files_with_zero_errors_still_appear() {
        let store = ErrorStore::new();
        let a = FileHandle::new("a.py");
        let b = FileHandle::new("b.py");
        let e_a = error("a.py", "bad");
        let map = store.build_file_to_error_map(Some(&[a.clone(), b.clone()]), &[e_a.clone()]);
        assert_eq!(map.get(&a).unwrap(), &vec![e_a]);
        assert_eq!(map.get(&b).unwrap(), &Vec::<ErrorRecord>::new());
    }

    #[test]
    fn seed_order_does_not_affect_result_contents() {
        let store = ErrorStore::new();
        let a = FileHandle::new("a.py");
        let b = FileHandle::new("b.py");
        let e_a = error("a.py", "bad");
        let forward = store.build_file_to_error_map(Some(&[a.clone(), b.clone()]), &[e_a.clone()]);
        let backward = store.build_file_to_error_map(Some(&[b.clone(), a.clone()]), &[e_a.clone()]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn remove_clears_all_errors_for_handle() {
        let mut store = ErrorStore::new();
        let a = FileHandle::new("a.py");
        store.insert(error("a.py", "one"));
        store.insert(error("a.py", "two"));
        store.remove(&a);
        assert!(store.all_errors().is_empty());
    }

    #[test]
    fn no_checked_files_seeds_from_existing_keys() {
        let mut store = ErrorStore::new();
        store.insert(error("a.py", "one"));
        let map = store.build_file_to_error_map(None, &[]);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![&FileHandle::new("a.py")]);
    }
}
