//! Error types for editor operations.
//!
//! Decoding and encoding never fail; these cover the editing commands that
//! can refuse to act.

use thiserror::Error;

/// Errors that can occur while editing a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EditorError {
    /// Offset past the end of the document.
    #[error("offset {offset} is out of range for a document of {len} units")]
    OffsetOutOfRange { offset: usize, len: usize },

    /// No node occupies the given offset, or it is not the expected kind.
    #[error("no {expected} at offset {offset}")]
    NodeNotFound {
        offset: usize,
        expected: &'static str,
    },

    /// Resize requested while no image is selected.
    #[error("no image is selected")]
    NoImageSelected,

    /// Suggestion command with no popup open.
    #[error("no suggestion popup is open")]
    NoSuggestion,

    /// Commit requested from an empty candidate list.
    #[error("no candidate to commit")]
    EmptySuggestion,

    /// Candidate index past the end of the list.
    #[error("candidate {index} out of range ({len} candidates)")]
    CandidateOutOfRange { index: usize, len: usize },
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
