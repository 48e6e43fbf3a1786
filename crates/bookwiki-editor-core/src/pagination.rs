//! Page counting.
//!
//! The count itself comes from a `LayoutMeasurement`, the host's view of how
//! the document is laid out. `PaginationObserver` debounces layout changes,
//! turns marker counts into page counts, and refuses to report when the
//! marker count runs away, which only happens when pagination is feeding back
//! into its own layout.

use std::time::Duration;

use web_time::Instant;

use crate::document::{Document, Node};
use crate::media::{Dimension, PageGeometry};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);
pub const DEFAULT_RUNAWAY_THRESHOLD: usize = 100;

/// Counts the page markers a rendering of `doc` materialises.
pub trait LayoutMeasurement {
    fn page_markers(&self, doc: &Document) -> usize;
}

impl<T: LayoutMeasurement + ?Sized> LayoutMeasurement for &T {
    fn page_markers(&self, doc: &Document) -> usize {
        (**self).page_markers(doc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageReport {
    Count(usize),
    /// Marker count exceeded the sanity threshold; no count this cycle.
    Runaway { markers: usize },
}

#[derive(Debug)]
pub struct PaginationObserver {
    debounce: Duration,
    runaway_threshold: usize,
    deadline: Option<Instant>,
    last_count: Option<usize>,
}

impl Default for PaginationObserver {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, DEFAULT_RUNAWAY_THRESHOLD)
    }
}

impl PaginationObserver {
    pub fn new(debounce: Duration, runaway_threshold: usize) -> Self {
        Self {
            debounce,
            runaway_threshold,
            deadline: None,
            last_count: None,
        }
    }

    /// Record a structural change. Re-arms the debounce window.
    pub fn notify_mutation(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Last page count reported.
    pub fn last_count(&self) -> Option<usize> {
        self.last_count
    }

    /// Run the measurement if the debounce window has elapsed. Fires at most
    /// once per window.
    pub fn poll(
        &mut self,
        now: Instant,
        doc: &Document,
        layout: &impl LayoutMeasurement,
    ) -> Option<PageReport> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.deadline = None,
            _ => return None,
        }
        Some(self.measure(doc, layout))
    }

    /// Measure immediately, ignoring the debounce.
    pub fn measure(&mut self, doc: &Document, layout: &impl LayoutMeasurement) -> PageReport {
        let markers = layout.page_markers(doc);
        if markers > self.runaway_threshold {
            tracing::error!(
                markers,
                threshold = self.runaway_threshold,
                "page marker count ran away, skipping this pagination cycle"
            );
            return PageReport::Runaway { markers };
        }
        let count = if markers > 0 || !doc.has_text_content() {
            markers
        } else {
            1
        };
        tracing::debug!(markers, count, "pagination measured");
        self.last_count = Some(count);
        PageReport::Count(count)
    }

    /// Drop any pending measurement.
    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            tracing::trace!("pending pagination measurement cancelled");
        }
    }
}

impl Drop for PaginationObserver {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Deterministic layout estimate: fixed line height and average glyph width
/// over the page content box. One marker per page that holds content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowLayout {
    pub geometry: PageGeometry,
    pub line_height: f64,
    pub char_width: f64,
    pub paragraph_spacing: f64,
    /// Vertical margin around block images.
    pub image_margin: f64,
    /// Height assumed for images whose height is not fixed in pixels.
    pub default_image_height: f64,
}

impl Default for FlowLayout {
    fn default() -> Self {
        Self::new(PageGeometry::default())
    }
}

impl FlowLayout {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            line_height: 24.0,
            char_width: 8.0,
            paragraph_spacing: 12.0,
            image_margin: 48.0,
            default_image_height: 300.0,
        }
    }

    fn chars_per_line(&self) -> usize {
        ((self.geometry.content_width() / self.char_width).floor() as usize).max(1)
    }
}

impl LayoutMeasurement for FlowLayout {
    fn page_markers(&self, doc: &Document) -> usize {
        if doc.len() == 0 {
            return 0;
        }
        let mut flow = Flow {
            layout: self,
            page_height: self.geometry.content_height(),
            pages: 1,
            used: 0.0,
            pending_chars: 0,
        };
        flow.nodes(doc.nodes());
        flow.flush();
        flow.pages
    }
}

struct Flow<'a> {
    layout: &'a FlowLayout,
    page_height: f64,
    pages: usize,
    used: f64,
    pending_chars: usize,
}

impl Flow<'_> {
    fn nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node {
                Node::Text(t) => self.pending_chars += t.len(),
                Node::Mention(m) => self.pending_chars += m.label.chars().count(),
                Node::InlineImage(_) => self.pending_chars += 2,
                Node::PageBreak => {
                    self.flush();
                    self.new_page();
                }
                Node::ResizableImage(img) => {
                    self.flush();
                    let height = img
                        .layout_height(&self.layout.geometry)
                        .or_else(|| match img.width {
                            Dimension::Px(w) => Some(w * 0.75),
                            _ => None,
                        })
                        .unwrap_or(self.layout.default_image_height);
                    self.block(height + self.layout.image_margin);
                }
                Node::Element(e) if e.name == "br" => {
                    self.pending_chars = self.pending_chars.max(1);
                    self.flush();
                }
                Node::Element(e) if e.is_block() => {
                    self.flush();
                    self.nodes(&e.children);
                    self.flush();
                }
                Node::Element(e) => self.nodes(&e.children),
                Node::Raw { .. } => {}
            }
        }
    }

    /// Lay out accumulated inline content as one paragraph.
    fn flush(&mut self) {
        if self.pending_chars == 0 {
            return;
        }
        let lines = self.pending_chars.div_ceil(self.layout.chars_per_line());
        self.pending_chars = 0;
        for _ in 0..lines {
            if self.used + self.layout.line_height > self.page_height && self.used > 0.0 {
                self.new_page();
            }
            self.used += self.layout.line_height;
        }
        self.used = (self.used + self.layout.paragraph_spacing).min(self.page_height);
    }

    fn block(&mut self, height: f64) {
        if self.used > 0.0 && self.used + height > self.page_height {
            self.new_page();
        }
        self.used = (self.used + height).min(self.page_height);
    }

    fn new_page(&mut self) {
        self.pages += 1;
        self.used = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ElementNode, ResizableImageNode};

    struct Markers(usize);

    impl LayoutMeasurement for Markers {
        fn page_markers(&self, _doc: &Document) -> usize {
            self.0
        }
    }

    fn paragraph(text: &str) -> Node {
        Node::Element(ElementNode {
            name: "p".into(),
            open: "<p>".into(),
            close: Some("</p>".into()),
            children: vec![Node::text(text)],
        })
    }

    #[test]
    fn test_debounce_fires_once() {
        let doc = Document::new(vec![paragraph("Hello")]);
        let mut observer = PaginationObserver::default();
        let t0 = Instant::now();

        assert!(observer.poll(t0, &doc, &Markers(0)).is_none());
        observer.notify_mutation(t0);
        observer.notify_mutation(t0 + Duration::from_millis(600));
        assert!(
            observer
                .poll(t0 + Duration::from_millis(1200), &doc, &Markers(0))
                .is_none()
        );
        assert_eq!(
            observer.poll(t0 + Duration::from_millis(1600), &doc, &Markers(0)),
            Some(PageReport::Count(1))
        );
        assert!(
            observer
                .poll(t0 + Duration::from_millis(5000), &doc, &Markers(0))
                .is_none()
        );
    }

    #[test]
    fn test_count_rules() {
        let mut observer = PaginationObserver::default();
        let text = Document::new(vec![paragraph("Hello")]);
        let empty = Document::new(vec![paragraph("   ")]);

        assert_eq!(observer.measure(&text, &Markers(0)), PageReport::Count(1));
        assert_eq!(observer.measure(&empty, &Markers(0)), PageReport::Count(0));
        assert_eq!(observer.measure(&text, &Markers(3)), PageReport::Count(3));
        assert_eq!(observer.last_count(), Some(3));
    }

    #[test]
    fn test_runaway_guard() {
        let mut observer = PaginationObserver::default();
        let doc = Document::new(vec![paragraph("Hello")]);
        observer.measure(&doc, &Markers(4));

        assert_eq!(
            observer.measure(&doc, &Markers(101)),
            PageReport::Runaway { markers: 101 }
        );
        // The abandoned cycle leaves the last good count in place.
        assert_eq!(observer.last_count(), Some(4));
        assert_eq!(observer.measure(&doc, &Markers(100)), PageReport::Count(100));
    }

    #[test]
    fn test_cancel() {
        let doc = Document::new(vec![paragraph("Hello")]);
        let mut observer = PaginationObserver::default();
        let t0 = Instant::now();
        observer.notify_mutation(t0);
        observer.cancel();
        assert!(!observer.is_pending());
        assert!(
            observer
                .poll(t0 + Duration::from_secs(10), &doc, &Markers(1))
                .is_none()
        );
    }

    #[test]
    fn test_flow_layout() {
        let layout = FlowLayout::default();
        assert_eq!(layout.page_markers(&Document::default()), 0);
        assert_eq!(layout.page_markers(&Document::new(vec![paragraph("Hi")])), 1);

        let broken = Document::new(vec![paragraph("One"), Node::PageBreak, paragraph("Two")]);
        assert_eq!(layout.page_markers(&broken), 2);

        // 84 glyphs per line, 40 lines per page: 100 lines is three pages.
        let long = Document::new(vec![paragraph(&"a".repeat(84 * 100))]);
        assert_eq!(layout.page_markers(&long), 3);
    }

    #[test]
    fn test_flow_layout_images_take_space() {
        let layout = FlowLayout::default();
        let mut tall = ResizableImageNode::new("/u/a.png");
        tall.height = Dimension::Px(900.0);
        let doc = Document::new(vec![
            paragraph("Caption"),
            Node::ResizableImage(tall),
            paragraph("After"),
        ]);
        // The image does not fit under the caption and fills its own page.
        assert_eq!(layout.page_markers(&doc), 3);
    }
}
