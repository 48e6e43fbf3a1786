//! Embedded image nodes: interactive resize of block images and the fixed-size
//! inline emote images.
//!
//! Resizing is a small state machine. `compute_resize` is the pure transition
//! from pointer delta to a new size; `ResizeController` tracks whether a drag
//! is active and owns the host's pointer listeners for exactly as long as it is.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::catalog::EntityCatalog;
use crate::document::{InlineImageNode, ResizableImageNode};

/// Smallest width or height a drag can produce, in layout units.
pub const MIN_IMAGE_SIZE: f64 = 50.0;

/// Rendered edge length of an inline emote, relative to the text size.
pub const INLINE_EMOTE_SIZE: &str = "1.5em";

/// Page box the editor lays content out in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub margin_x: f64,
    pub margin_y: f64,
    pub content_margin_y: f64,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 794.0,
            height: 1123.0,
            margin_x: 60.0,
            margin_y: 40.0,
            content_margin_y: 40.0,
        }
    }
}

impl PageGeometry {
    /// Usable content width: page width minus both side margins.
    pub fn content_width(&self) -> f64 {
        self.width - self.margin_x * 2.0
    }

    /// Usable content height: page height minus page and content margins.
    pub fn content_height(&self) -> f64 {
        self.height - self.margin_y * 2.0 - self.content_margin_y * 2.0
    }

    pub fn max_size(&self) -> Size {
        Size::new(self.content_width(), self.content_height())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A persisted width or height attribute.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "lowercase")]
pub enum Dimension {
    #[default]
    Auto,
    Px(f64),
    Percent(f64),
}

impl Dimension {
    /// Parse a CSS length as written in `style` or a bare `width`/`height`
    /// attribute. Bare numbers are pixels; anything unrecognised is `Auto`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Dimension::Auto;
        }
        if let Some(px) = s.strip_suffix("px") {
            if let Ok(v) = px.trim().parse::<f64>() {
                return Dimension::Px(v);
            }
        }
        if let Some(pct) = s.strip_suffix('%') {
            if let Ok(v) = pct.trim().parse::<f64>() {
                return Dimension::Percent(v);
            }
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Dimension::Px(v),
            _ => {
                tracing::trace!(value = s, "unrecognised image dimension, using auto");
                Dimension::Auto
            }
        }
    }

    pub fn px(&self) -> Option<f64> {
        match self {
            Dimension::Px(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Dimension::Auto)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Auto => f.write_str("auto"),
            Dimension::Px(v) => write!(f, "{v}px"),
            Dimension::Percent(v) => write!(f, "{v}%"),
        }
    }
}

/// Pull `width`/`height` out of an inline `style` attribute.
pub fn style_dimension(style: &str, property: &str) -> Option<Dimension> {
    style.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case(property)
            .then(|| Dimension::parse(value))
    })
}

/// The six drag handles shown around a selected image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeHandle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Right,
    Bottom,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 6] = [
        ResizeHandle::TopLeft,
        ResizeHandle::TopRight,
        ResizeHandle::BottomLeft,
        ResizeHandle::BottomRight,
        ResizeHandle::Right,
        ResizeHandle::Bottom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResizeHandle::TopLeft => "top-left",
            ResizeHandle::TopRight => "top-right",
            ResizeHandle::BottomLeft => "bottom-left",
            ResizeHandle::BottomRight => "bottom-right",
            ResizeHandle::Right => "right",
            ResizeHandle::Bottom => "bottom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.as_str() == s)
    }

    pub fn is_corner(self) -> bool {
        matches!(
            self,
            ResizeHandle::TopLeft
                | ResizeHandle::TopRight
                | ResizeHandle::BottomLeft
                | ResizeHandle::BottomRight
        )
    }

    /// Width change per unit of horizontal pointer travel. Doubled because the
    /// image stays centred, so one edge moving visually moves both.
    fn width_factor(self) -> f64 {
        match self {
            ResizeHandle::TopLeft | ResizeHandle::BottomLeft => -2.0,
            ResizeHandle::TopRight | ResizeHandle::BottomRight | ResizeHandle::Right => 2.0,
            ResizeHandle::Bottom => 0.0,
        }
    }

    fn height_factor(self) -> f64 {
        match self {
            ResizeHandle::TopLeft | ResizeHandle::TopRight => -1.0,
            ResizeHandle::BottomLeft | ResizeHandle::BottomRight | ResizeHandle::Bottom => 1.0,
            ResizeHandle::Right => 0.0,
        }
    }

    /// Corners lock the aspect ratio unless the modifier is held; edges are
    /// free unless it is.
    pub fn locks_aspect(self, modifier: bool) -> bool {
        self.is_corner() != modifier
    }
}

impl std::fmt::Display for ResizeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next displayed size for a drag of `delta` from `initial` on `handle`.
///
/// `aspect` is width over height of the image's natural size. `max` is the
/// page content box. When the aspect ratio is locked and a bound is hit, the
/// other dimension is recomputed from the ratio rather than clamped on its own.
pub fn compute_resize(
    handle: ResizeHandle,
    delta: Point,
    initial: Size,
    aspect: f64,
    modifier: bool,
    max: Size,
) -> Size {
    let aspect = if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else if initial.width > 0.0 && initial.height > 0.0 {
        initial.width / initial.height
    } else {
        1.0
    };

    let mut width = initial.width + delta.x * handle.width_factor();
    let mut height = initial.height + delta.y * handle.height_factor();

    if handle.locks_aspect(modifier) {
        let ratio = |new: f64, old: f64| if old > 0.0 { new / old } else { 1.0 };
        let ratio_x = ratio(width, initial.width);
        let ratio_y = ratio(height, initial.height);

        if (ratio_x - 1.0).abs() > (ratio_y - 1.0).abs() {
            height = width / aspect;
        } else {
            width = height * aspect;
        }

        if width > max.width {
            width = max.width;
            height = width / aspect;
        }
        if height > max.height {
            height = max.height;
            width = height * aspect;
        }
        if width < MIN_IMAGE_SIZE {
            width = MIN_IMAGE_SIZE;
            height = width / aspect;
        }
        if height < MIN_IMAGE_SIZE {
            height = MIN_IMAGE_SIZE;
            width = height * aspect;
        }
        // Extreme ratios cannot satisfy both bounds; the box wins.
        width = width.clamp(MIN_IMAGE_SIZE, max.width.max(MIN_IMAGE_SIZE));
        height = height.clamp(MIN_IMAGE_SIZE, max.height.max(MIN_IMAGE_SIZE));
    } else {
        width = width.min(max.width).max(MIN_IMAGE_SIZE);
        height = height.min(max.height).max(MIN_IMAGE_SIZE);
    }

    Size::new(width, height)
}

/// Double-click toggle between natural size and full content width. Height
/// is always left to follow the intrinsic aspect ratio.
pub fn toggle_fill(width: Dimension, geometry: &PageGeometry) -> (Dimension, Dimension) {
    let is_full = match width {
        Dimension::Percent(p) => p == 100.0,
        Dimension::Px(px) => px == geometry.content_width(),
        Dimension::Auto => false,
    };
    if is_full {
        (Dimension::Auto, Dimension::Auto)
    } else {
        (Dimension::Percent(100.0), Dimension::Auto)
    }
}

/// Holds the host's window-level pointer listeners for one drag. Dropping it
/// detaches them, so every way out of a drag releases the listeners.
pub struct PointerCapture {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl PointerCapture {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A capture with nothing to release, for hosts without global listeners.
    pub fn detached() -> Self {
        Self { release: None }
    }
}

impl Drop for PointerCapture {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::trace!("releasing pointer listeners");
            release();
        }
    }
}

impl std::fmt::Debug for PointerCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerCapture")
            .field("attached", &self.release.is_some())
            .finish()
    }
}

/// An in-progress drag on one image.
#[derive(Debug)]
pub struct DragSession {
    pub image_offset: usize,
    pub handle: ResizeHandle,
    pub origin: Point,
    pub initial: Size,
    pub aspect: f64,
    /// Container height pinned for the duration of the drag.
    pub pinned_height: f64,
    displayed: Option<Size>,
    _capture: PointerCapture,
}

impl DragSession {
    /// Size shown on screen right now, if the pointer has moved.
    pub fn displayed(&self) -> Option<Size> {
        self.displayed
    }
}

#[derive(Debug, Default)]
pub enum ResizeState {
    #[default]
    Idle,
    Dragging(DragSession),
}

/// Arguments captured when a drag starts.
#[derive(Debug, Clone, Copy)]
pub struct DragStart {
    pub image_offset: usize,
    pub handle: ResizeHandle,
    pub origin: Point,
    /// Rendered image size at drag start.
    pub rendered: Size,
    /// Natural width over height.
    pub aspect: f64,
    /// Rendered height of the surrounding container.
    pub container_height: f64,
}

/// Size the drag committed, as attribute values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeCommit {
    pub image_offset: usize,
    pub width: Dimension,
    pub height: Dimension,
}

#[derive(Debug, Default)]
pub struct ResizeController {
    state: ResizeState,
    geometry: PageGeometry,
}

impl ResizeController {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            state: ResizeState::Idle,
            geometry,
        }
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn state(&self) -> &ResizeState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, ResizeState::Dragging(_))
    }

    /// Height the image container must keep while a drag is active.
    pub fn pinned_height(&self) -> Option<f64> {
        match &self.state {
            ResizeState::Dragging(drag) => Some(drag.pinned_height),
            ResizeState::Idle => None,
        }
    }

    /// Enter the dragging state. A drag already in progress is abandoned and
    /// its listeners released.
    pub fn begin(&mut self, start: DragStart, capture: PointerCapture) {
        if self.is_dragging() {
            tracing::debug!("new drag replaces an unfinished one");
        }
        tracing::debug!(handle = %start.handle, offset = start.image_offset, "resize started");
        self.state = ResizeState::Dragging(DragSession {
            image_offset: start.image_offset,
            handle: start.handle,
            origin: start.origin,
            initial: start.rendered,
            aspect: start.aspect,
            pinned_height: start.container_height,
            displayed: None,
            _capture: capture,
        });
    }

    /// Apply a pointer move. Returns the new displayed size, or `None` when no
    /// drag is active.
    pub fn drag(&mut self, pointer: Point, modifier: bool) -> Option<Size> {
        let max = self.geometry.max_size();
        let ResizeState::Dragging(drag) = &mut self.state else {
            return None;
        };
        let delta = Point::new(pointer.x - drag.origin.x, pointer.y - drag.origin.y);
        let size = compute_resize(drag.handle, delta, drag.initial, drag.aspect, modifier, max);
        tracing::trace!(width = size.width, height = size.height, "resize move");
        drag.displayed = Some(size);
        Some(size)
    }

    /// Leave the dragging state and report the size to persist. A drag that
    /// never moved commits nothing.
    pub fn end(&mut self) -> Option<ResizeCommit> {
        let ResizeState::Dragging(drag) = std::mem::take(&mut self.state) else {
            return None;
        };
        let size = drag.displayed?;
        tracing::debug!(width = size.width, height = size.height, "resize committed");
        Some(ResizeCommit {
            image_offset: drag.image_offset,
            width: Dimension::Px(size.width),
            height: Dimension::Px(size.height),
        })
    }

    /// Abandon the drag without committing.
    pub fn cancel(&mut self) {
        if let ResizeState::Dragging(_) = std::mem::take(&mut self.state) {
            tracing::debug!("resize cancelled");
        }
    }
}

impl InlineImageNode {
    /// Alt and title text for the rendered emote.
    pub fn alt_text(&self) -> &str {
        self.emote_name.as_deref().unwrap_or("inline image")
    }

    /// Emote name, falling back to a lookup of the image URL in the catalog.
    pub fn resolved_name<'a>(&'a self, catalog: &'a EntityCatalog) -> Option<&'a str> {
        self.emote_name
            .as_deref()
            .or_else(|| catalog.emote_by_url(&self.src).map(|e| e.name.as_str()))
    }

    /// Fill in a missing emote name from the catalog. Returns whether anything
    /// changed.
    pub fn adopt_catalog_name(&mut self, catalog: &EntityCatalog) -> bool {
        if self.emote_name.is_some() {
            return false;
        }
        match catalog.emote_by_url(&self.src) {
            Some(emote) => {
                self.emote_name = Some(SmolStr::new(&emote.name));
                self.raw = None;
                true
            }
            None => false,
        }
    }
}

impl ResizableImageNode {
    /// Persist a committed size. Drops the preserved source tag.
    pub fn set_size(&mut self, width: Dimension, height: Dimension) {
        self.width = width;
        self.height = height;
        self.raw = None;
    }

    /// Height this image takes up in flow, if it can be known without the
    /// image's intrinsic size.
    pub fn layout_height(&self, geometry: &PageGeometry) -> Option<f64> {
        match self.height {
            Dimension::Px(h) => Some(h.min(geometry.content_height())),
            Dimension::Percent(_) | Dimension::Auto => None,
        }
    }
}
