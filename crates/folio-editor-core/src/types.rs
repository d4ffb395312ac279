//! Core value types: blocks, visual metadata, and viewport geometry.
//!
//! These types are framework-agnostic. The render surface and the layout
//! host translate to and from them; all ordering, classification and
//! eligibility logic runs on these values rather than on live nodes.

use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use web_time::{SystemTime, UNIX_EPOCH};

/// Stable opaque identifier of a block, unique within a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(SmolStr);

impl BlockId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates fresh block ids.
///
/// Ids are `b{salt}-{n}` where the salt is taken from the wall clock once
/// per generator, so ids minted by different sessions do not collide when
/// their blocks end up in the same document.
#[derive(Debug, Clone)]
pub struct BlockIdGen {
    salt: u32,
    next: u64,
}

impl BlockIdGen {
    pub fn new() -> Self {
        let salt = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
            .unwrap_or(0);
        Self::with_salt(salt)
    }

    /// Deterministic generator, mostly for tests.
    pub fn with_salt(salt: u32) -> Self {
        Self { salt, next: 0 }
    }

    pub fn fresh(&mut self) -> BlockId {
        let id = BlockId(format_smolstr!("b{:x}-{}", self.salt, self.next));
        self.next += 1;
        id
    }
}

impl Default for BlockIdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// What a block holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockKind {
    Text,
    Image,
    Video,
}

impl BlockKind {
    pub fn is_media(self) -> bool {
        matches!(self, BlockKind::Image | BlockKind::Video)
    }

    /// Short human label used in the reorder list.
    pub fn label(self) -> &'static str {
        match self {
            BlockKind::Text => "Text",
            BlockKind::Image => "Image",
            BlockKind::Video => "Video",
        }
    }
}

/// Kind of a media element on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl From<MediaKind> for BlockKind {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => BlockKind::Image,
            MediaKind::Video => BlockKind::Video,
        }
    }
}

/// Optional per-block presentation metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisualMeta {
    pub padded: bool,
    pub padding_px: u32,
    pub full_width: bool,
}

impl VisualMeta {
    pub fn is_default(&self) -> bool {
        *self == VisualMeta::default()
    }

    /// Padding actually rendered: zero unless the block is padded.
    pub fn effective_padding(&self) -> u32 {
        if self.padded { self.padding_px } else { 0 }
    }
}

/// One logical unit of document content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentBlock {
    pub id: BlockId,
    pub kind: BlockKind,
    /// Dense position among siblings, re-derived on every extraction.
    pub order: usize,
    /// Serialized rich text, resolved image source, or canonical video URL.
    pub payload: String,
    /// Plain text content, used for previews. Empty for media blocks.
    pub text: String,
    pub visual: VisualMeta,
}

/// Opaque handle to a node on a render surface.
///
/// Handles are minted by the surface implementation and are only meaningful
/// to the surface that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub u64);

/// A point in viewport coordinates (CSS px).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Per-side distances, used for padding and border widths.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Insets {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Insets {
    pub fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn uniform(v: f64) -> Self {
        Self::new(v, v, v, v)
    }

    pub fn add(self, other: Insets) -> Insets {
        Insets::new(
            self.top + other.top,
            self.right + other.right,
            self.bottom + other.bottom,
            self.left + other.left,
        )
    }
}

/// Axis-aligned rectangle in viewport coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.top() && p.y <= self.bottom()
    }

    /// Shrink by the given insets. Collapses to zero size rather than going negative.
    pub fn inset(&self, by: Insets) -> Rect {
        let width = (self.width - by.left - by.right).max(0.0);
        let height = (self.height - by.top - by.bottom).max(0.0);
        Rect::new(self.x + by.left, self.y + by.top, width, height)
    }

    /// True when the rect has finite coordinates and a visible area.
    pub fn is_renderable(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 1.0
            && self.height > 1.0
    }
}
