//! Error taxonomy for the yarn audit analyzer.
//!
//! Distinguishes recoverable per-dependency failures (malformed input, IO)
//! from failures that disable the analyzer for the rest of the run (backend
//! connectivity) and from backend search failures that are re-raised to the
//! caller after logging.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    /// The yarn version could not be determined; aborts this dependency's
    /// analysis since the version selects the audit protocol.
    #[error("unable to determine yarn version: {reason}")]
    InvalidState { reason: String },

    /// The capability probe could not be executed at all.
    #[error("unable to probe the yarn executable: {0}")]
    Initialization(String),

    /// Audit output or a manifest could not be parsed.
    #[error("{pipeline} audit produced unparseable output for {}: {message}", .path.display())]
    Parse {
        pipeline: &'static str,
        path: PathBuf,
        message: String,
    },

    /// The audit subprocess was interrupted while we waited for it to exit.
    #[error("yarn audit process was interrupted")]
    Interrupted,

    #[error(
        "yarn audit failure; this error can be ignored if you are not \
         analyzing projects with a yarn lockfile"
    )]
    Io(#[source] io::Error),

    /// Lost connectivity to the npm audit endpoint; the analyzer is disabled
    /// for the remainder of the run and may produce false negatives.
    #[error("failed to connect to the npm audit endpoint: {0}")]
    Backend(#[source] reqwest::Error),

    /// The npm audit endpoint answered but rejected or failed the search.
    #[error("npm audit search failed: {0}")]
    Search(String),
}

impl AuditError {
    /// Whether this failure turns the analyzer off for the rest of the run.
    pub fn disables_analyzer(&self) -> bool {
        matches!(self, AuditError::Backend(_))
    }

    /// Whether the run can continue with other dependencies after logging.
    /// Backend connectivity loss also continues, but with the analyzer off;
    /// only a search failure is re-raised to the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AuditError::Backend(_) | AuditError::Search(_))
    }
}
