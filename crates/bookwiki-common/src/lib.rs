//! bookwiki-common: story backend access, configuration and telemetry shared
//! by bookwiki binaries.

pub mod backend;
pub mod config;
pub mod editor_io;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::backend::{ChapterRecord, HttpBackend, StoryBackend, UploadResponse};
pub use crate::config::{Config, FileStore, Loader, Saver};
pub use crate::error::{BookwikiError, Result};
