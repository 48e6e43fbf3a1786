//! bookwiki-editor-core: chapter editor logic without framework dependencies.
//!
//! This crate provides:
//! - `EntityCatalog` / `CatalogAdapter` - story entities and emotes in one lookup
//! - `Document` - the in-editor node tree with unit offsets and atomic nodes
//! - `shortcode` - decode/encode between stored chapter text and `Document`
//! - `SuggestionPopup` - `#` mention and `:` emote autocomplete
//! - `ResizeController` - image resize gestures clamped to the page
//! - `PaginationObserver` - debounced page counting with a runaway guard
//! - `EditorSession` - all of the above behind one editing surface

pub mod catalog;
pub mod document;
pub mod entity;
pub mod error;
pub mod markup;
pub mod media;
pub mod pagination;
pub mod session;
pub mod shortcode;
pub mod suggest;
pub mod types;

pub use catalog::{CatalogAdapter, EntityCatalog, RawEmote, RawEntity};
pub use document::{
    Document, ElementNode, InlineImageNode, MentionNode, Node, ResizableImageNode, TextNode,
};
pub use entity::{EmoteRef, EntityKey, EntityRef, Namespace, StoryEntity};
pub use error::{EditorError, Result};
pub use media::{
    Dimension, PageGeometry, Point, PointerCapture, ResizeCommit, ResizeController, ResizeHandle,
    Size, compute_resize, toggle_fill,
};
pub use pagination::{FlowLayout, LayoutMeasurement, PageReport, PaginationObserver};
pub use session::{EditorSession, KeyEffect, Notification, NotificationLevel, UploadTicket};
pub use shortcode::{decode, encode, html_to_shortcodes, normalize, render_editor_html, resolve_names};
pub use smol_str::SmolStr;
pub use suggest::{Candidate, Key, KeyOutcome, SuggestionPopup, Trigger, filter_candidates};
pub use types::{EditInfo, Selection};
