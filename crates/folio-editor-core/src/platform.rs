//! Platform abstraction traits for editor operations.
//!
//! These traits define the interface between the editor logic and
//! platform-specific implementations (browser DOM, in-memory test surfaces).
//! The editor never touches live nodes directly: it queries and mutates the
//! render surface through [`RenderSurface`], measures layout through
//! [`OverlayHost`], and reaches external services through [`Notifier`] and
//! [`ImageUploader`].

use std::future::Future;

use smol_str::SmolStr;

use crate::error::Notice;
use crate::ingest::EncodedImage;
use crate::overlay::{PanelPlacement, TrackedMediaElement};
use crate::types::{BlockId, BlockKind, Insets, MediaKind, NodeKey, Rect, Size, VisualMeta};

/// Error type for platform operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError(pub String);

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PlatformError {}

impl From<&str> for PlatformError {
    fn from(s: &str) -> Self {
        PlatformError(s.to_string())
    }
}

impl From<String> for PlatformError {
    fn from(s: String) -> Self {
        PlatformError(s)
    }
}

/// What sits at a linear index of the surface.
///
/// The surface is addressed like a flat document: every top-level block
/// contributes its inline atoms followed by one line break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atom {
    Char(char),
    LineBreak,
    Embed(MediaKind),
}

impl Atom {
    pub fn is_line_boundary(self) -> bool {
        matches!(self, Atom::LineBreak)
    }
}

/// An embed ready to be placed on the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub kind: MediaKind,
    pub src: String,
    pub visual: VisualMeta,
}

/// A media element inside a top-level node.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub key: NodeKey,
    pub kind: MediaKind,
    pub src: String,
    pub visual: VisualMeta,
}

/// Snapshot of one top-level node of the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceNode {
    pub key: NodeKey,
    /// Block id previously tagged onto the node, if any.
    pub block_id: Option<BlockId>,
    /// Lowercase tag name (`p`, `iframe`, `h1`, ...).
    pub tag: SmolStr,
    /// Serialized markup of the node.
    pub html: String,
    /// Text content of the node.
    pub text: String,
    /// Media elements inside the node, in document order.
    pub media: Vec<MediaInfo>,
}

impl SurfaceNode {
    pub fn first_media(&self, kind: MediaKind) -> Option<&MediaInfo> {
        self.media.iter().find(|m| m.kind == kind)
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// The editable tree the block model reads from and writes to.
///
/// Implementations handle the actual node manipulation. The browser
/// implementation works on a contenteditable root, the in-memory
/// [`MemorySurface`](crate::surface::MemorySurface) backs tests and headless
/// use.
pub trait RenderSurface {
    /// Top-level children in document order.
    fn nodes(&self) -> Vec<SurfaceNode>;

    /// Record a block id on a top-level node so later extractions reuse it.
    fn tag_block(&mut self, node: NodeKey, id: &BlockId) -> Result<(), PlatformError>;

    /// Linear length of the surface, including one line break per block.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atom at a linear index, `None` past the end.
    fn atom_at(&self, index: usize) -> Option<Atom>;

    /// Current caret position, `None` when the surface has no selection.
    fn caret(&self) -> Option<usize>;

    fn set_caret(&mut self, index: usize) -> Result<(), PlatformError>;

    /// Split the line at `index`.
    fn insert_line_break(&mut self, index: usize) -> Result<(), PlatformError>;

    /// Insert an embed at `index`, returning the key of the new media element.
    fn insert_embed(&mut self, index: usize, embed: &Embed) -> Result<NodeKey, PlatformError>;

    /// Top-level node containing the given media element.
    fn container_of(&self, media: NodeKey) -> Option<NodeKey>;

    /// Point a media element at a new source.
    fn set_media_src(&mut self, media: NodeKey, src: &str) -> Result<(), PlatformError>;

    /// Write presentation metadata onto a media element.
    fn set_visual(&mut self, media: NodeKey, visual: &VisualMeta) -> Result<(), PlatformError>;

    /// Remove a top-level node or a media element.
    fn remove_node(&mut self, node: NodeKey) -> Result<(), PlatformError>;

    /// Append a top-level node rendered from a block's persisted content.
    ///
    /// Text payloads are markup; media payloads are sources. Returns the key
    /// of the new top-level node.
    fn append_block(
        &mut self,
        kind: BlockKind,
        payload: &str,
        visual: &VisualMeta,
    ) -> Result<NodeKey, PlatformError>;

    /// Replace the top-level children with exactly `order`, in that order.
    ///
    /// Nodes not listed are removed. Implementations must build the new
    /// sequence before touching the live tree so a failure leaves the
    /// previous children in place.
    fn replace_children(&mut self, order: &[NodeKey]) -> Result<(), PlatformError>;

    /// True when any block carries non-whitespace text.
    fn has_text(&self) -> bool {
        self.nodes().iter().any(|n| n.has_text())
    }
}

/// Layout measurement of a media element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaGeometry {
    pub key: NodeKey,
    pub kind: MediaKind,
    /// Full visual bounding box in viewport coordinates.
    pub bounds: Rect,
    pub padding: Insets,
    pub border: Insets,
    /// Natural content width: the decoded width for images, the rendered
    /// width for video frames.
    pub natural_width: f64,
}

/// Measures layout and hosts the floating control panel.
///
/// The frame loop and pointer listener are returned as owned handles.
/// Dropping a handle must cancel the frame callback or remove the listener,
/// so the overlay controller can release them simply by letting go.
pub trait OverlayHost {
    /// Handle for a running per-frame callback.
    type FrameLoop;
    /// Handle for a document-level pointer listener.
    type PointerListener;

    /// Every media element currently on the surface.
    fn media_elements(&self) -> Vec<MediaGeometry>;

    /// Re-measure one media element. `None` once it is no longer attached.
    fn measure(&self, media: NodeKey) -> Option<MediaGeometry>;

    /// Bounding box of the control panel while it is shown.
    fn panel_rect(&self) -> Option<Rect>;

    fn viewport(&self) -> Size;

    fn show_panel(&mut self, placement: PanelPlacement, target: &TrackedMediaElement);

    fn hide_panel(&mut self);

    fn start_frame_loop(&mut self) -> Self::FrameLoop;

    fn listen_pointer(&mut self) -> Self::PointerListener;
}

/// Fire-and-forget transient messages.
pub trait Notifier {
    fn notify(&self, notice: Notice);
}

/// Unit type implementation - notices are dropped.
impl Notifier for () {
    fn notify(&self, _notice: Notice) {}
}

impl<T: Notifier> Notifier for &T {
    fn notify(&self, notice: Notice) {
        (*self).notify(notice)
    }
}

/// Turns an encoded image into a durable URL.
pub trait ImageUploader {
    /// Upload the image.
    ///
    /// Returns `Ok(None)` when no upload service is available, in which case
    /// the encoded data is embedded directly.
    fn upload(
        &self,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<Option<String>, PlatformError>>;
}

/// Unit type implementation - no upload service.
impl ImageUploader for () {
    async fn upload(&self, _image: &EncodedImage) -> Result<Option<String>, PlatformError> {
        Ok(None)
    }
}

impl<T: ImageUploader> ImageUploader for &T {
    fn upload(
        &self,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<Option<String>, PlatformError>> {
        (*self).upload(image)
    }
}
