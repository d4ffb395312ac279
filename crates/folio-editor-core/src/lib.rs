//! folio-editor-core: block editor logic for portfolio documents, without
//! framework dependencies.
//!
//! This crate provides:
//! - `video` - normalization of pasted YouTube/Vimeo links to embeddable URLs
//! - `ingest` - bounded image validation, scaling and re-encoding
//! - `blocks` - extraction and reassembly of the `ContentBlock` list
//! - `padding` - per-block padding state, coalesced into frame updates
//! - `overlay` - the control panel tracking state machine
//! - `reorder` - manual drag reordering
//! - `session` - `BlockEditor`, which ties them together over a `RenderSurface`

pub mod blocks;
pub mod config;
pub mod error;
pub mod html;
pub mod ingest;
pub mod overlay;
pub mod padding;
pub mod perf;
pub mod persist;
pub mod platform;
pub mod reorder;
pub mod session;
pub mod surface;
pub mod types;
pub mod video;

pub use blocks::{InsertedEmbed, extract, insert_embed, reassemble};
pub use config::{ConfigLoader, DocumentDefaults, EditorConfig, JsonFileLoader, OverlayConfig, PaddingConfig};
pub use error::{EditorError, Notice, Result};
pub use ingest::{
    EmbeddableImage, EncodedImage, ImageCodec, ImageFile, IngestPolicy, IngestSlots, IngestTicket,
    Ingestor, RasterCodec,
};
pub use overlay::{OverlayController, OverlayEvent, PanelPlacement, TrackedMediaElement};
pub use padding::PaddingStore;
pub use persist::{DocumentMeta, PersistedDocument, PersistedItem};
pub use platform::{
    Atom, Embed, ImageUploader, MediaGeometry, MediaInfo, Notifier, OverlayHost, PlatformError,
    RenderSurface, SurfaceNode,
};
pub use reorder::{ReorderController, ReorderEntry};
pub use session::{BlockEditor, ImageJob, ImageTarget};
pub use smol_str::SmolStr;
pub use surface::MemorySurface;
pub use types::{
    BlockId, BlockIdGen, BlockKind, ContentBlock, Insets, MediaKind, NodeKey, Point, Rect, Size,
    VisualMeta,
};
pub use video::{CanonicalUrl, VideoProvider};
