//! Error types for backend access and configuration.

use miette::Diagnostic;

/// Main error type for bookwiki backend operations.
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum BookwikiError {
    /// Transport failure talking to the backend.
    #[error("request to the story backend failed")]
    #[diagnostic(
        code(bookwiki::http),
        help("check that the backend is running and the endpoint is right")
    )]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("{method} {url} returned {status}")]
    #[diagnostic(code(bookwiki::status))]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// Emote name already used in this story.
    #[error("an emote named {name:?} already exists in this story")]
    #[diagnostic(code(bookwiki::conflict), help("pick a different name"))]
    Conflict { name: String },

    #[error("{what} not found")]
    #[diagnostic(code(bookwiki::not_found))]
    NotFound { what: String },

    #[error(transparent)]
    #[diagnostic(code(bookwiki::serde))]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(bookwiki::io))]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    #[diagnostic(code(bookwiki::config))]
    Config(String),

    /// Editing command refused by the session.
    #[error(transparent)]
    #[diagnostic(code(bookwiki::editor))]
    Editor(#[from] bookwiki_editor_core::EditorError),

    /// Upload payload is not an image the editor can embed.
    #[error("{file_name} is not a supported image ({detected})")]
    #[diagnostic(
        code(bookwiki::unsupported_upload),
        help("only PNG, JPEG, GIF and WebP images can be uploaded")
    )]
    UnsupportedUpload { file_name: String, detected: String },
}

pub type Result<T, E = BookwikiError> = std::result::Result<T, E>;
