//
// file.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//
// `File` / `FileHandle` (SPEC_FULL.md §3).
//

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// A repo-relative, canonical identifier for a source file. Two handles are
/// equal iff they denote the same relative path — the invariant the rest of
/// the system (lookups, errors, handles) relies on as a map key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileHandle(String);

impl FileHandle {
    pub fn new(relative_path: impl Into<String>) -> Self {
        let mut path = relative_path.into();
        // Normalize to forward slashes so Windows-authored and URI-decoded
        // paths produce the same handle.
        if path.contains('\\') {
            path = path.replace('\\', "/");
        }
        FileHandle(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path suffix check used by the pipeline's stub/source partition
    /// (SPEC_FULL.md §4.4 stage 5).
    pub fn is_stub(&self) -> bool {
        self.0.ends_with(".pyi")
    }

    /// The module qualifier derived from this handle's relative path: strip
    /// a `.py`/`.pyi` extension and replace path separators with `.`.
    pub fn qualifier(&self) -> String {
        let mut stem = self.0.as_str();
        for ext in [".pyi", ".py"] {
            if let Some(rest) = stem.strip_suffix(ext) {
                stem = rest;
                break;
            }
        }
        stem.replace('/', ".")
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file is a root, a repo-relative path, and an optional in-memory content
/// override (the editor's unsaved buffer contents, when present).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct File {
    pub root: PathBuf,
    pub relative_path: String,
    pub content_override: Option<String>,
}

impl File {
    pub fn new(root: impl Into<PathBuf>, relative_path: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            relative_path: relative_path.into(),
            content_override: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content_override = Some(content.into());
        self
    }

    pub fn handle(&self) -> FileHandle {
        FileHandle::new(self.relative_path.clone())
    }

    /// Resolves this file to a handle, or `None` if it can't be — the only
    /// failure mode modeled is a relative path that escaped the workspace
    /// root (an absolute path reaching this far means URI rewriting passed
    /// it through unchanged because it fell outside `root`). Files that
    /// fail to resolve are silently dropped from the set being checked
    /// (SPEC_FULL.md §9 Open Question).
    pub fn try_handle(&self) -> Option<FileHandle> {
        if self.relative_path.starts_with('/') {
            None
        } else {
            Some(self.handle())
        }
    }

    pub fn absolute_path(&self) -> PathBuf {
        self.root.join(&self.relative_path)
    }

    /// Build a `File` from a `file://` URI and a workspace root, applying the
    /// same stripping rule as the LSP adapter (SPEC_FULL.md §4.1): strip the
    /// `file://` prefix, then strip `root + "/"` if the remainder starts with
    /// it, otherwise keep the remainder unchanged.
    pub fn from_uri(root: &Path, uri: &str) -> Self {
        let stripped = uri.strip_prefix("file://").unwrap_or(uri);
        let root_str = root.to_string_lossy();
        let prefix = format!("{root_str}/");
        let relative = stripped.strip_prefix(prefix.as_str()).unwrap_or(stripped);
        File::new(root.to_path_buf(), relative.to_string())
    }

    pub fn to_uri(&self) -> Url {
        let absolute = self.absolute_path();
        Url::from_file_path(&absolute)
            .unwrap_or_else(|_| Url::parse("file:///").expect("static URI parses"))
    }
}
