//
// error.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
//

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Server-wide error taxonomy (see SPEC_FULL.md §7).
///
/// User-visible query failures (`UntrackedType`, `NotFound`) are carried as
/// response payloads by the callers, not propagated through `?` into the
/// dispatcher; they live here so every component shares one vocabulary for
/// what "went wrong" means.
pub enum Error {
    /// A `ClientConnectionRequest` reached the dispatcher; this variant is
    /// only ever constructed by `dispatcher::process`.
    InvalidRequest,
    UntrackedType(String),
    NotFound(String),
    BrokenPipe,
    Io(io::Error),
    /// Scheduler or shared-memory (environment) failure. Fatal.
    Collaborator(anyhow::Error),
}

impl Error {
    pub fn untracked(type_name: impl Into<String>) -> Self {
        Error::UntrackedType(type_name.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Error::BrokenPipe)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(source) => Some(source),
            Error::Collaborator(source) => source.source(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRequest => write!(f, "Invalid request"),
            Error::UntrackedType(name) => {
                write!(f, "Type \"{name}\" was not found in the type order.")
            },
            Error::NotFound(message) => write!(f, "{message}"),
            Error::BrokenPipe => write!(f, "Broken pipe"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Collaborator(err) => write!(f, "{err:?}"),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => Error::BrokenPipe,
            _ => Error::Io(error),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Collaborator(error)
    }
}
