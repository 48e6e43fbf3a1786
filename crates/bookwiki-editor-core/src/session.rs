//! Editor session: one mounted editing surface.
//!
//! Owns the document and everything the surface needs to edit it: the entity
//! catalog, the selection, the suggestion popup, the image drag, and the echo
//! latch that stops the session's own output from being decoded back into
//! it. Asynchronous completions (uploads, catalog refreshes) are applied
//! through `&mut EditorSession` rather than captured state.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use smol_str::SmolStr;
use web_time::Instant;

use crate::catalog::EntityCatalog;
use crate::document::{Document, MentionNode, Node, ResizableImageNode};
use crate::error::{EditorError, Result};
use crate::media::{
    DragStart, PageGeometry, Point, PointerCapture, ResizeCommit, ResizeController, ResizeHandle,
    Size, toggle_fill,
};
use crate::shortcode;
use crate::suggest::{Candidate, Key, KeyOutcome, SuggestionPopup, find_trigger};
use crate::types::{EditInfo, Selection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible message queued by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        };
        write!(f, "[{level}] {}", self.message)
    }
}

/// What a key press did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEffect {
    /// Not for the session; the host handles it.
    Ignored,
    Handled,
    Committed(Candidate),
    Dismissed,
    /// Save shortcut. Carries the stored form to persist.
    Save(String),
}

/// Handle for an upload in flight.
#[derive(Debug)]
pub struct UploadTicket {
    id: u64,
    file_name: SmolStr,
    started: Instant,
}

impl UploadTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[derive(Debug)]
pub struct EditorSession {
    doc: Document,
    catalog: Arc<EntityCatalog>,
    selection: Selection,
    /// Offset of the atom selected by a click.
    selected_node: Option<usize>,
    popup: Option<SuggestionPopup>,
    resize: ResizeController,
    /// Last stored value this session produced or accepted.
    last_sent: Option<String>,
    dirty: bool,
    last_edit: Option<EditInfo>,
    notifications: VecDeque<Notification>,
    next_upload: u64,
    uploads_in_flight: usize,
}

impl EditorSession {
    /// Decode `stored` into a fresh session. The cursor starts at the end.
    pub fn new(stored: &str, catalog: Arc<EntityCatalog>, geometry: PageGeometry) -> Self {
        let doc = shortcode::decode(stored, &catalog);
        let end = doc.len();
        tracing::debug!(units = end, "editor session opened");
        Self {
            doc,
            catalog,
            selection: Selection::collapsed(end),
            selected_node: None,
            popup: None,
            resize: ResizeController::new(geometry),
            last_sent: Some(stored.to_string()),
            dirty: false,
            last_edit: None,
            notifications: VecDeque::new(),
            next_upload: 0,
            uploads_in_flight: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn catalog(&self) -> &Arc<EntityCatalog> {
        &self.catalog
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn cursor(&self) -> usize {
        self.selection.head
    }

    pub fn popup(&self) -> Option<&SuggestionPopup> {
        self.popup.as_ref()
    }

    pub fn resize(&self) -> &ResizeController {
        &self.resize
    }

    pub fn selected_node(&self) -> Option<usize> {
        self.selected_node
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_edit(&self) -> Option<&EditInfo> {
        self.last_edit.as_ref()
    }

    pub fn uploads_in_flight(&self) -> usize {
        self.uploads_in_flight
    }

    /// Current stored form.
    pub fn stored(&self) -> String {
        shortcode::encode(&self.doc)
    }

    /// Markup for the editing surface.
    pub fn editor_html(&self) -> String {
        shortcode::render_editor_html(&self.doc)
    }

    /// Accept a stored value from outside. Ignored when it is the value this
    /// session last produced. Returns whether the document was replaced.
    pub fn apply_external(&mut self, stored: &str) -> bool {
        if self.last_sent.as_deref() == Some(stored) {
            tracing::trace!("external value is our own echo");
            return false;
        }
        let before = self.doc.len();
        self.doc = shortcode::decode(stored, &self.catalog);
        self.last_sent = Some(stored.to_string());
        self.popup = None;
        self.selected_node = None;
        self.selection = self.selection.clamp(self.doc.len());
        self.record(0, self.doc.len(), before, true);
        // Replacing from outside is not a local edit.
        self.dirty = false;
        tracing::debug!(units = self.doc.len(), "document replaced from outside");
        true
    }

    /// Stored form of local edits not yet handed out. Latches the value so a
    /// later `apply_external` with it is recognised as an echo.
    pub fn take_change(&mut self) -> Option<String> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        let stored = self.stored();
        if self.last_sent.as_deref() == Some(stored.as_str()) {
            return None;
        }
        self.last_sent = Some(stored.clone());
        Some(stored)
    }

    /// Record that `stored` reached the backend. The session stays dirty if
    /// it has moved on since `stored` was taken.
    pub fn mark_saved(&mut self, stored: &str) {
        self.dirty = self.stored() != stored;
        self.last_sent = Some(stored.to_string());
    }

    /// Swap in a rebuilt catalog. Mentions already in the document keep their
    /// labels until the next decode; an open popup is re-filtered.
    pub fn set_catalog(&mut self, catalog: Arc<EntityCatalog>) {
        if Arc::ptr_eq(&self.catalog, &catalog) {
            return;
        }
        self.catalog = catalog;
        if self.popup.is_some() {
            self.refresh_suggestion();
        }
    }

    pub fn set_cursor(&mut self, offset: usize) -> Result<()> {
        self.select(offset..offset)
    }

    pub fn select(&mut self, range: Range<usize>) -> Result<()> {
        let len = self.doc.len();
        if range.end > len || range.start > len {
            return Err(EditorError::OffsetOutOfRange {
                offset: range.end.max(range.start),
                len,
            });
        }
        self.selection = Selection::new(range.start, range.end);
        self.selected_node = None;
        self.resize.cancel();
        self.refresh_suggestion();
        Ok(())
    }

    pub fn type_text(&mut self, text: &str) -> Result<()> {
        let at = self.delete_selection()?;
        let end = self.doc.insert_text(at, text)?;
        self.selection = Selection::collapsed(end);
        self.record(at, end - at, 0, false);
        self.refresh_suggestion();
        Ok(())
    }

    pub fn backspace(&mut self) -> Result<()> {
        if self.selection.is_collapsed() {
            let cursor = self.cursor();
            if cursor == 0 {
                return Ok(());
            }
            self.selection = Selection::new(cursor, cursor - 1);
        }
        self.delete_selection()?;
        self.refresh_suggestion();
        Ok(())
    }

    pub fn delete_forward(&mut self) -> Result<()> {
        if self.selection.is_collapsed() {
            let cursor = self.cursor();
            if cursor >= self.doc.len() {
                return Ok(());
            }
            self.selection = Selection::new(cursor, cursor + 1);
        }
        self.delete_selection()?;
        self.refresh_suggestion();
        Ok(())
    }

    pub fn insert_page_break(&mut self) -> Result<()> {
        let at = self.delete_selection()?;
        let end = self.doc.insert_block(at, Node::PageBreak)?;
        self.selection = Selection::collapsed(end);
        self.popup = None;
        self.record(at, 1, 0, true);
        Ok(())
    }

    /// Route a key press: the popup gets first refusal, then the session.
    pub fn key(&mut self, key: Key) -> Result<KeyEffect> {
        if let Some(popup) = self.popup.as_mut() {
            match popup.on_key(key) {
                KeyOutcome::Commit(candidate) => {
                    self.commit(candidate.clone())?;
                    return Ok(KeyEffect::Committed(candidate));
                }
                KeyOutcome::Dismiss => {
                    self.popup = None;
                    return Ok(KeyEffect::Dismissed);
                }
                KeyOutcome::Handled => return Ok(KeyEffect::Handled),
                KeyOutcome::Ignored => {}
            }
        }
        match key {
            Key::Save => {
                let stored = self.stored();
                tracing::debug!(bytes = stored.len(), "save requested");
                Ok(KeyEffect::Save(stored))
            }
            Key::Escape if self.selected_node.is_some() => {
                self.selected_node = None;
                self.selection = Selection::collapsed(self.selection.end());
                Ok(KeyEffect::Handled)
            }
            _ => Ok(KeyEffect::Ignored),
        }
    }

    /// Commit the popup candidate at `index`.
    pub fn click_suggestion(&mut self, index: usize) -> Result<Candidate> {
        let popup = self.popup.as_ref().ok_or(EditorError::NoSuggestion)?;
        let candidate = popup.click(index)?;
        self.commit(candidate.clone())?;
        Ok(candidate)
    }

    /// Replace the trigger and query with the candidate's nodes.
    fn commit(&mut self, candidate: Candidate) -> Result<()> {
        let Some(popup) = self.popup.take() else {
            return Err(EditorError::NoSuggestion);
        };
        let range = popup.range();
        self.doc.delete(range.clone())?;
        let mut at = range.start;
        for node in candidate.to_nodes() {
            at = match node {
                Node::Text(t) => self.doc.insert_text(at, &t.text)?,
                other => self.doc.insert_inline(at, other)?,
            };
        }
        self.selection = Selection::collapsed(at);
        self.selected_node = None;
        self.record(range.start, at - range.start, range.len(), false);
        tracing::debug!(name = candidate.name(), "suggestion committed");
        Ok(())
    }

    /// Select the atom at `offset` as a node. Clicks on atoms never start a
    /// text selection.
    pub fn click_node(&mut self, offset: usize) -> Result<&Node> {
        if self.doc.atom_at(offset).is_none() {
            return Err(EditorError::NodeNotFound {
                offset,
                expected: "atom",
            });
        }
        self.popup = None;
        self.selected_node = Some(offset);
        self.selection = Selection::new(offset, offset + 1);
        self.doc.atom_at(offset).ok_or(EditorError::NodeNotFound {
            offset,
            expected: "atom",
        })
    }

    /// Handles to draw for the image at `offset`. Empty unless that image is
    /// the selected node.
    pub fn resize_handles(&self, offset: usize) -> &'static [ResizeHandle] {
        match (self.selected_node, self.doc.atom_at(offset)) {
            (Some(selected), Some(Node::ResizableImage(_))) if selected == offset => {
                &ResizeHandle::ALL
            }
            _ => &[],
        }
    }

    /// Mention under a ctrl-click, for navigating to its entity.
    pub fn mention_at(&self, offset: usize) -> Option<&MentionNode> {
        match self.doc.atom_at(offset)? {
            Node::Mention(mention) => Some(mention),
            _ => None,
        }
    }

    fn selected_image(&self) -> Result<usize> {
        match self.selected_node {
            Some(offset) if matches!(self.doc.atom_at(offset), Some(Node::ResizableImage(_))) => {
                Ok(offset)
            }
            _ => Err(EditorError::NoImageSelected),
        }
    }

    /// Start dragging `handle` on the selected image. `capture` holds the
    /// host's pointer listeners until the drag ends.
    pub fn begin_resize(
        &mut self,
        handle: ResizeHandle,
        origin: Point,
        rendered: Size,
        aspect: f64,
        container_height: f64,
        capture: PointerCapture,
    ) -> Result<()> {
        let image_offset = self.selected_image()?;
        self.resize.begin(
            DragStart {
                image_offset,
                handle,
                origin,
                rendered,
                aspect,
                container_height,
            },
            capture,
        );
        Ok(())
    }

    pub fn drag_resize(&mut self, pointer: Point, modifier: bool) -> Option<Size> {
        self.resize.drag(pointer, modifier)
    }

    /// Finish the drag and persist the size on the image.
    pub fn end_resize(&mut self) -> Result<Option<ResizeCommit>> {
        let Some(commit) = self.resize.end() else {
            return Ok(None);
        };
        let image = self.image_mut(commit.image_offset)?;
        image.set_size(commit.width, commit.height);
        self.record(commit.image_offset, 0, 0, true);
        Ok(Some(commit))
    }

    pub fn cancel_resize(&mut self) {
        self.resize.cancel();
    }

    /// Toggle the image at `offset` between natural size and full width.
    pub fn double_click_image(&mut self, offset: usize) -> Result<()> {
        let geometry = *self.resize.geometry();
        let image = self.image_mut(offset)?;
        let (width, height) = toggle_fill(image.width, &geometry);
        image.set_size(width, height);
        tracing::debug!(offset, %width, "image fill toggled");
        self.record(offset, 0, 0, true);
        Ok(())
    }

    fn image_mut(&mut self, offset: usize) -> Result<&mut ResizableImageNode> {
        match self.doc.atom_at_mut(offset) {
            Some(Node::ResizableImage(image)) => Ok(image),
            _ => Err(EditorError::NodeNotFound {
                offset,
                expected: "resizable image",
            }),
        }
    }

    pub fn begin_upload(&mut self, file_name: impl Into<SmolStr>) -> UploadTicket {
        let ticket = UploadTicket {
            id: self.next_upload,
            file_name: file_name.into(),
            started: Instant::now(),
        };
        self.next_upload += 1;
        self.uploads_in_flight += 1;
        tracing::debug!(id = ticket.id, file = %ticket.file_name, "image upload started");
        ticket
    }

    /// Apply an upload result. The image goes in at the cursor as it is now,
    /// not where it was when the upload started. A failed upload inserts
    /// nothing and queues a notification. Returns the image's offset.
    pub fn complete_upload<E: fmt::Display>(
        &mut self,
        ticket: UploadTicket,
        result: std::result::Result<String, E>,
    ) -> Result<Option<usize>> {
        self.uploads_in_flight = self.uploads_in_flight.saturating_sub(1);
        let elapsed = ticket.started.elapsed();
        let url = match result {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(id = ticket.id, file = %ticket.file_name, ?elapsed, %err, "image upload failed");
                self.notify(
                    NotificationLevel::Error,
                    format!("Failed to upload {}: {err}", ticket.file_name),
                );
                return Ok(None);
            }
        };
        let at = self.cursor().min(self.doc.len());
        let end = self
            .doc
            .insert_block(at, Node::ResizableImage(ResizableImageNode::new(url)))?;
        self.selection = Selection::collapsed(end);
        self.selected_node = None;
        self.popup = None;
        self.record(at, 1, 0, true);
        tracing::debug!(id = ticket.id, offset = at, ?elapsed, "uploaded image inserted");
        Ok(Some(at))
    }

    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(?level, %message, "notification queued");
        self.notifications.push_back(Notification { level, message });
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    /// Delete the selection, if any. Returns the collapsed cursor.
    fn delete_selection(&mut self) -> Result<usize> {
        let range = self.selection.to_range();
        if !range.is_empty() {
            self.doc.delete(range.clone())?;
            self.record(range.start, 0, range.len(), self.selected_node.is_some());
        }
        self.selection = Selection::collapsed(range.start);
        self.selected_node = None;
        Ok(range.start)
    }

    /// Open, refresh, or close the popup from the text before the cursor.
    fn refresh_suggestion(&mut self) {
        if !self.selection.is_collapsed() {
            self.popup = None;
            return;
        }
        let cursor = self.cursor();
        let found = find_trigger(self.doc.text_before(cursor), cursor);
        match (found, self.popup.as_mut()) {
            (Some(found), Some(popup)) => popup.update(found, &self.catalog),
            (Some(found), None) => self.popup = Some(SuggestionPopup::open(found, &self.catalog)),
            (None, Some(_)) => {
                tracing::trace!("suggestion popup closed");
                self.popup = None;
            }
            (None, None) => {}
        }
    }

    /// Mark the document edited. Any drag is dropped since its image offset
    /// may have moved.
    fn record(&mut self, offset: usize, inserted: usize, deleted: usize, structural: bool) {
        self.dirty = true;
        self.resize.cancel();
        self.last_edit = Some(EditInfo {
            offset,
            inserted,
            deleted,
            structural,
            doc_len_after: self.doc.len(),
            timestamp: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::catalog::{CatalogAdapter, RawEmote, RawEntity};
    use crate::entity::Namespace;
    use crate::media::Dimension;

    fn catalog() -> Arc<EntityCatalog> {
        let mut adapter = CatalogAdapter::new();
        adapter.set_collection(
            Namespace::Character,
            vec![
                RawEntity {
                    id: 5,
                    name: "Mara".into(),
                },
                RawEntity {
                    id: 6,
                    name: "Marcus".into(),
                },
            ],
        );
        adapter.set_collection(
            Namespace::Location,
            vec![RawEntity {
                id: 2,
                name: "Marsh".into(),
            }],
        );
        adapter.set_emotes(
            1,
            vec![RawEmote {
                id: 9,
                name: "smile".into(),
                image_url: "/u/smile.png".into(),
            }],
        );
        adapter.catalog()
    }

    fn session(stored: &str) -> EditorSession {
        EditorSession::new(stored, catalog(), PageGeometry::default())
    }

    #[test]
    fn test_echo_latch() {
        let mut s = session("<p>Hi</p>");
        assert!(!s.apply_external("<p>Hi</p>"));

        s.type_text("!").unwrap();
        let change = s.take_change().unwrap();
        assert_eq!(change, "<p>Hi!</p>");
        assert!(s.take_change().is_none());
        // Our own value coming back is not re-decoded.
        assert!(!s.apply_external(&change));

        assert!(s.apply_external("<p>Other</p>"));
        assert_eq!(s.document().plain_text().trim(), "Other");
        assert!(!s.is_dirty());
    }

    #[test]
    fn test_external_value_is_not_sent_back() {
        let mut s = session("<p>Hi</p>");
        // Normalises to a different stored form, but is still not a local edit.
        assert!(s.apply_external("<p>A&nbsp;b</p>"));
        assert!(!s.is_dirty());
        assert!(s.take_change().is_none());
        assert!(s.last_edit().is_some());
    }

    #[test]
    fn test_mark_saved() {
        let mut s = session("<p>Hi</p>");
        s.type_text("!").unwrap();
        let sent = s.stored();
        s.type_text("?").unwrap();
        s.mark_saved(&sent);
        assert!(s.is_dirty());
        assert!(!s.apply_external(&sent));

        let sent = s.stored();
        s.mark_saved(&sent);
        assert!(!s.is_dirty());
        assert!(s.take_change().is_none());
    }

    #[test]
    fn test_mention_flow() {
        let mut s = session("<p>Hello </p>");
        s.type_text("#mar").unwrap();
        let popup = s.popup().unwrap();
        assert_eq!(popup.query(), "mar");
        assert_eq!(popup.items().len(), 3);

        assert_eq!(s.key(Key::ArrowUp).unwrap(), KeyEffect::Handled);
        assert_eq!(s.popup().unwrap().selected(), 2);
        let KeyEffect::Committed(candidate) = s.key(Key::Enter).unwrap() else {
            panic!("expected a commit");
        };
        assert_eq!(candidate.name(), "Marsh");
        assert!(s.popup().is_none());
        assert_eq!(s.stored(), "<p>Hello #{location:2} </p>");
        // Cursor sits after the trailing space.
        assert_eq!(s.cursor(), 8);
    }

    #[test]
    fn test_query_narrows_and_resets_highlight() {
        let mut s = session("");
        s.type_text("#ma").unwrap();
        s.key(Key::ArrowDown).unwrap();
        assert_eq!(s.popup().unwrap().selected(), 1);
        s.type_text("rc").unwrap();
        let popup = s.popup().unwrap();
        assert_eq!(popup.items().len(), 1);
        assert_eq!(popup.selected(), 0);

        s.type_text(" ").unwrap();
        assert!(s.popup().is_none());
    }

    #[test]
    fn test_emote_click_and_escape() {
        let mut s = session("");
        s.type_text(":zzz").unwrap();
        assert!(s.popup().unwrap().is_empty());
        assert_eq!(s.click_suggestion(0), Err(EditorError::EmptySuggestion));
        assert_eq!(s.key(Key::Enter).unwrap(), KeyEffect::Handled);
        assert_eq!(s.key(Key::Escape).unwrap(), KeyEffect::Dismissed);
        assert!(s.popup().is_none());

        for _ in 0..3 {
            s.backspace().unwrap();
        }
        assert_eq!(s.popup().unwrap().items().len(), 1);
        s.click_suggestion(0).unwrap();
        assert_eq!(
            s.stored(),
            r#"<img src="/u/smile.png" data-emotename="smile" class="inline-image-emote"> "#
        );
    }

    #[test]
    fn test_click_suggestion_without_popup() {
        let mut s = session("");
        assert_eq!(s.click_suggestion(0), Err(EditorError::NoSuggestion));
    }

    #[test]
    fn test_backspace_removes_whole_mention() {
        let mut s = session("<p>a#{character:5}b</p>");
        s.set_cursor(2).unwrap();
        s.backspace().unwrap();
        assert_eq!(s.stored(), "<p>ab</p>");
        assert_eq!(s.cursor(), 1);
    }

    #[test]
    fn test_save_key() {
        let mut s = session("x #{pagebreak} y");
        assert_eq!(
            s.key(Key::Save).unwrap(),
            KeyEffect::Save("x #{pagebreak} y".to_string())
        );
    }

    #[test]
    fn test_page_break_insert() {
        let mut s = session("<p>onetwo</p>");
        s.set_cursor(3).unwrap();
        s.insert_page_break().unwrap();
        assert_eq!(s.stored(), "<p>one</p>#{pagebreak}<p>two</p>");
        assert_eq!(s.cursor(), 4);
        assert!(s.last_edit().unwrap().structural);
    }

    #[test]
    fn test_handles_only_on_selected_image() {
        let mut s = session(r#"<p>a</p><img src="/u/a.png" style="width: 200px; height: 100px">"#);
        assert!(s.resize_handles(1).is_empty());
        assert!(matches!(s.click_node(1).unwrap(), Node::ResizableImage(_)));
        assert_eq!(s.resize_handles(1).len(), 6);
        assert!(s.click_node(0).is_err());
    }

    #[test]
    fn test_resize_requires_selected_image() {
        let mut s = session("<p>#{character:5}</p>");
        s.click_node(0).unwrap();
        let err = s.begin_resize(
            ResizeHandle::BottomRight,
            Point::new(0.0, 0.0),
            Size::new(100.0, 100.0),
            1.0,
            100.0,
            PointerCapture::detached(),
        );
        assert_eq!(err, Err(EditorError::NoImageSelected));
    }

    #[test]
    fn test_resize_commits_and_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut s = session(r#"<img src="/u/a.png" style="width: 200px; height: 100px">"#);
        s.click_node(0).unwrap();

        let counter = released.clone();
        s.begin_resize(
            ResizeHandle::Right,
            Point::new(0.0, 0.0),
            Size::new(200.0, 100.0),
            2.0,
            120.0,
            PointerCapture::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        assert_eq!(s.resize().pinned_height(), Some(120.0));
        assert_eq!(
            s.drag_resize(Point::new(50.0, 0.0), false),
            Some(Size::new(300.0, 100.0))
        );
        let commit = s.end_resize().unwrap().unwrap();
        assert_eq!(commit.width, Dimension::Px(300.0));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(s.resize().pinned_height().is_none());
        assert_eq!(
            s.stored(),
            r#"<img src="/u/a.png" style="width: 300px; height: 100px">"#
        );
    }

    #[test]
    fn test_edits_drop_an_active_drag() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut s = session(r#"<p>ab</p><img src="/u/a.png" style="width: 200px; height: 100px">"#);
        let start_drag = |s: &mut EditorSession| {
            s.click_node(2).unwrap();
            let counter = released.clone();
            s.begin_resize(
                ResizeHandle::Right,
                Point::new(0.0, 0.0),
                Size::new(200.0, 100.0),
                2.0,
                100.0,
                PointerCapture::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
            s.drag_resize(Point::new(40.0, 0.0), false);
            assert!(s.resize().is_dragging());
        };

        start_drag(&mut s);
        s.set_cursor(0).unwrap();
        assert!(!s.resize().is_dragging());
        assert_eq!(released.load(Ordering::SeqCst), 1);

        start_drag(&mut s);
        let ticket = s.begin_upload("b.png");
        s.complete_upload::<String>(ticket, Ok("/u/b.png".into())).unwrap();
        assert!(!s.resize().is_dragging());
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_eq!(s.end_resize().unwrap(), None);
        assert!(s.stored().contains("width: 200px; height: 100px"));
    }

    #[test]
    fn test_double_click_toggles_fill() {
        let mut s = session(r#"<img src="/u/a.png">"#);
        s.double_click_image(0).unwrap();
        assert_eq!(
            s.stored(),
            r#"<img src="/u/a.png" style="width: 100%; height: auto">"#
        );
        s.double_click_image(0).unwrap();
        assert_eq!(
            s.stored(),
            r#"<img src="/u/a.png" style="width: auto; height: auto">"#
        );
    }

    #[test]
    fn test_upload_inserts_at_current_cursor() {
        let mut s = session("<p>abcdef</p>");
        s.set_cursor(2).unwrap();
        let ticket = s.begin_upload("cat.png");
        assert_eq!(s.uploads_in_flight(), 1);
        // The user keeps typing while the upload runs.
        s.set_cursor(6).unwrap();
        let at = s.complete_upload::<String>(ticket, Ok("/u/cat.png".into())).unwrap();
        assert_eq!(at, Some(6));
        assert_eq!(
            s.stored(),
            r#"<p>abcdef</p><img src="/u/cat.png" style="width: auto; height: auto">"#
        );
        assert_eq!(s.uploads_in_flight(), 0);
    }

    #[test]
    fn test_failed_upload_inserts_nothing() {
        let mut s = session("<p>abc</p>");
        let ticket = s.begin_upload("cat.png");
        let at = s.complete_upload(ticket, Err("413 Payload Too Large")).unwrap();
        assert_eq!(at, None);
        assert_eq!(s.stored(), "<p>abc</p>");
        assert!(!s.is_dirty());
        let notes = s.drain_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert!(s.drain_notifications().is_empty());
    }

    #[test]
    fn test_mention_at() {
        let s = session("x #{character:6}");
        assert_eq!(s.mention_at(2).map(|m| m.id), Some(6));
        assert!(s.mention_at(0).is_none());
    }

    #[test]
    fn test_set_catalog_refilters_popup() {
        let mut s = session("");
        s.type_text("#Mar").unwrap();
        assert_eq!(s.popup().unwrap().items().len(), 3);
        s.set_catalog(Arc::new(EntityCatalog::default()));
        assert!(s.popup().unwrap().is_empty());
    }
}
