//! The editing session.
//!
//! [`BlockEditor`] owns one render surface, the padding store, the overlay
//! and reorder controllers, and the notification collaborator, and exposes
//! the operations the UI calls. Every user-facing failure is reported to the
//! notifier before it is returned, and leaves the surface as it was.

use web_time::Instant;

use crate::blocks::{self, InsertedEmbed};
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::perf::TimingGuard;
use crate::ingest::{EmbeddableImage, ImageCodec, ImageFile, IngestPolicy, IngestSlots, IngestTicket, Ingestor};
use crate::overlay::{OverlayController, OverlayEvent};
use crate::padding::PaddingStore;
use crate::persist::{DocumentMeta, PersistedDocument};
use crate::platform::{Embed, ImageUploader, Notifier, OverlayHost, RenderSurface};
use crate::reorder::{ReorderController, ReorderEntry};
use crate::types::{BlockId, BlockIdGen, ContentBlock, MediaKind, Point, VisualMeta};
use crate::video;

/// Where an ingested image goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTarget {
    /// A new block at the caret.
    Insert,
    /// The image of an existing block.
    Replace(BlockId),
}

/// An image ingestion that has passed validation and holds its block's slot.
#[derive(Debug, Clone)]
pub struct ImageJob {
    ticket: IngestTicket,
    target: ImageTarget,
    file: ImageFile,
    policy: IngestPolicy,
}

impl ImageJob {
    pub fn block(&self) -> &BlockId {
        self.ticket.block()
    }

    pub fn target(&self) -> &ImageTarget {
        &self.target
    }

    /// Decode, scale, encode and upload. Needs no access to the editor, so
    /// it can run while the editor keeps handling events.
    pub async fn run<C: ImageCodec, U: ImageUploader>(
        &self,
        ingestor: &Ingestor<C>,
        uploader: &U,
    ) -> Result<EmbeddableImage> {
        ingestor.ingest(&self.file, &self.policy, uploader).await
    }
}

pub struct BlockEditor<S, H, N = ()>
where
    S: RenderSurface,
    H: OverlayHost,
    N: Notifier,
{
    surface: S,
    overlay: OverlayController<H>,
    padding: PaddingStore,
    reorder: ReorderController,
    slots: IngestSlots,
    ids: BlockIdGen,
    notifier: N,
    config: EditorConfig,
    meta: DocumentMeta,
    hoist_due: Option<Instant>,
}

impl<S, H, N> BlockEditor<S, H, N>
where
    S: RenderSurface,
    H: OverlayHost,
    N: Notifier,
{
    pub fn new(surface: S, host: H, notifier: N, config: EditorConfig) -> Self {
        let overlay = OverlayController::new(host, config.overlay, config.padding.min_width_px);
        let mut padding = PaddingStore::new(config.padding);
        padding.sync_from_surface(&surface);
        Self {
            surface,
            overlay,
            padding,
            reorder: ReorderController::new(),
            slots: IngestSlots::new(),
            ids: BlockIdGen::new(),
            notifier,
            meta: DocumentMeta::from_defaults(&config.document),
            config,
            hoist_due: None,
        }
    }

    /// Use a specific id generator, mostly for deterministic tests.
    pub fn with_ids(mut self, ids: BlockIdGen) -> Self {
        self.ids = ids;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn overlay(&self) -> &OverlayController<H> {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayController<H> {
        &mut self.overlay
    }

    pub fn padding(&self) -> &PaddingStore {
        &self.padding
    }

    pub fn reorder(&self) -> &ReorderController {
        &self.reorder
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    /// Hand a surfaced error to the notifier, then pass the result through.
    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            match e.notice() {
                Some(notice) => {
                    tracing::debug!(error = %e, "operation refused");
                    self.notifier.notify(notice);
                }
                None => tracing::warn!(error = %e, "editor operation failed"),
            }
        }
        result
    }

    /// Current block list, with pending visual changes written first.
    pub fn blocks(&mut self) -> Result<Vec<ContentBlock>> {
        self.padding.flush(&mut self.surface)?;
        blocks::extract(&mut self.surface, &mut self.ids)
    }

    /// While tracking, the frame loop writes pending visuals. Otherwise they
    /// are written straight away.
    fn flush_unless_framed(&mut self) -> Result<()> {
        if !self.overlay.is_tracking() {
            self.padding.flush(&mut self.surface)?;
        }
        Ok(())
    }

    fn embed(&mut self, block: BlockId, kind: MediaKind, src: String, natural_width: Option<f64>) -> Result<InsertedEmbed> {
        let visual = self.padding.default_visual(kind, natural_width);
        let inserted = blocks::insert_embed(&mut self.surface, block, &Embed { kind, src, visual })?;
        self.padding
            .track(inserted.block.clone(), inserted.media, visual, natural_width);
        Ok(inserted)
    }

    /// Insert a video from a pasted link or embed snippet.
    pub fn insert_video(&mut self, raw: &str) -> Result<BlockId> {
        let result = match video::normalize(raw) {
            Some(url) => {
                let block = self.ids.fresh();
                self.embed(block, MediaKind::Video, url.as_url(), None)
                    .map(|inserted| inserted.block)
            }
            None => Err(EditorError::UnsupportedVideoFormat {
                input: raw.trim().to_owned(),
            }),
        };
        self.report(result)
    }

    /// Point an existing video block at a new link.
    pub fn change_video_url(&mut self, block: &BlockId, raw: &str) -> Result<()> {
        let result = self.try_change_video_url(block, raw);
        self.report(result)
    }

    fn try_change_video_url(&mut self, block: &BlockId, raw: &str) -> Result<()> {
        let url = video::normalize(raw).ok_or_else(|| EditorError::UnsupportedVideoFormat {
            input: raw.trim().to_owned(),
        })?;
        let media = blocks::node_of(&self.surface, block)
            .and_then(|n| n.first_media(MediaKind::Video).map(|m| m.key))
            .ok_or_else(|| EditorError::UnknownBlock(block.clone()))?;
        self.surface.set_media_src(media, &url.as_url())?;
        Ok(())
    }

    /// Refuse a picked file by its declared size, before the host reads it.
    pub fn check_image_size(&self, size: u64) -> Result<()> {
        let result = self.config.insert_images.check_size(size);
        self.report(result)
    }

    /// Validate a picked file and reserve its block's ingestion slot.
    pub fn prepare_image(&mut self, file: ImageFile, target: ImageTarget) -> Result<ImageJob> {
        let result = self.try_prepare_image(file, target);
        self.report(result)
    }

    fn try_prepare_image(&mut self, file: ImageFile, target: ImageTarget) -> Result<ImageJob> {
        let policy = self.config.insert_images.clone();
        policy.validate(&file)?;

        let block = match &target {
            ImageTarget::Insert => self.ids.fresh(),
            ImageTarget::Replace(block) => {
                let has_image = blocks::node_of(&self.surface, block)
                    .is_some_and(|n| n.first_media(MediaKind::Image).is_some());
                if !has_image {
                    return Err(EditorError::UnknownBlock(block.clone()));
                }
                block.clone()
            }
        };

        Ok(ImageJob {
            ticket: self.slots.begin(block),
            target,
            file,
            policy,
        })
    }

    /// Apply a finished ingestion. Returns `None` when a newer ingestion
    /// for the same block superseded this one.
    pub fn complete_image(
        &mut self,
        job: ImageJob,
        result: Result<EmbeddableImage>,
    ) -> Result<Option<BlockId>> {
        if !self.slots.finish(&job.ticket) {
            tracing::debug!(block = %job.block(), "discarding superseded ingestion");
            return Ok(None);
        }
        let result = result.and_then(|image| self.apply_image(&job, image));
        self.report(result).map(Some)
    }

    fn apply_image(&mut self, job: &ImageJob, image: EmbeddableImage) -> Result<BlockId> {
        let natural_width = image.original_width.map(f64::from);
        match &job.target {
            ImageTarget::Insert => {
                let inserted = self.embed(job.block().clone(), MediaKind::Image, image.src, natural_width)?;
                Ok(inserted.block)
            }
            ImageTarget::Replace(block) => {
                let media = blocks::node_of(&self.surface, block)
                    .and_then(|n| n.first_media(MediaKind::Image).map(|m| (m.key, m.visual)))
                    .ok_or_else(|| EditorError::UnknownBlock(block.clone()))?;
                self.surface.set_media_src(media.0, &image.src)?;
                self.padding
                    .track(block.clone(), media.0, media.1, natural_width);
                Ok(block.clone())
            }
        }
    }

    /// Prepare, ingest and apply in one go.
    ///
    /// Holds the editor for the whole ingestion. Hosts that must keep
    /// handling events meanwhile use [`prepare_image`](Self::prepare_image),
    /// [`ImageJob::run`] and [`complete_image`](Self::complete_image).
    pub async fn insert_image<C: ImageCodec, U: ImageUploader>(
        &mut self,
        file: ImageFile,
        target: ImageTarget,
        ingestor: &Ingestor<C>,
        uploader: &U,
    ) -> Result<Option<BlockId>> {
        let job = self.prepare_image(file, target)?;
        let result = job.run(ingestor, uploader).await;
        self.complete_image(job, result)
    }

    /// Ingest a project cover image. Covers are not blocks, so the result is
    /// returned rather than embedded.
    pub async fn ingest_cover<C: ImageCodec, U: ImageUploader>(
        &self,
        file: &ImageFile,
        ingestor: &Ingestor<C>,
        uploader: &U,
    ) -> Result<EmbeddableImage> {
        let result = ingestor
            .ingest(file, &self.config.cover_images, uploader)
            .await;
        self.report(result)
    }

    /// Remove a media block from the document.
    pub fn remove_media(&mut self, block: &BlockId) -> Result<()> {
        let result = self.try_remove_media(block);
        self.report(result)
    }

    fn try_remove_media(&mut self, block: &BlockId) -> Result<()> {
        let node = blocks::node_of(&self.surface, block)
            .filter(|n| !n.media.is_empty())
            .ok_or_else(|| EditorError::UnknownBlock(block.clone()))?;

        if let Some(tracked) = self.overlay.tracked() {
            if node.media.iter().any(|m| m.key == tracked.key) {
                self.overlay.reset();
            }
        }
        self.surface.remove_node(node.key)?;
        self.padding.forget(block);
        self.slots.cancel(block);
        tracing::debug!(%block, "media removed");
        Ok(())
    }

    pub fn is_padding_eligible(&self, block: &BlockId) -> bool {
        self.padding.is_eligible(block)
    }

    pub fn set_padding(&mut self, block: &BlockId, px: u32) -> Result<VisualMeta> {
        let result = self.padding.set_padding(block, px)
            .and_then(|visual| self.flush_unless_framed().map(|()| visual));
        self.report(result)
    }

    pub fn toggle_padding(&mut self, block: &BlockId) -> Result<VisualMeta> {
        let result = self.padding.toggle(block)
            .and_then(|visual| self.flush_unless_framed().map(|()| visual));
        self.report(result)
    }

    pub fn set_full_width(&mut self, block: &BlockId, full_width: bool) -> Result<VisualMeta> {
        let result = self.padding.set_full_width(block, full_width)
            .and_then(|visual| self.flush_unless_framed().map(|()| visual));
        self.report(result)
    }

    /// Block the overlay is attached to, if any.
    pub fn tracked_block(&self) -> Option<&BlockId> {
        self.overlay
            .tracked()
            .and_then(|t| self.padding.block_for_media(t.key))
    }

    /// Entering a media element: pick up its persisted visuals and width.
    fn on_tracking_started(&mut self) {
        self.padding.sync_from_surface(&self.surface);
        self.record_tracked_width();
    }

    /// Video frames are measured as rendered, so their width follows layout.
    fn record_tracked_width(&mut self) {
        if let Some(tracked) = self.overlay.tracked().copied() {
            if let Some(block) = self.padding.block_for_media(tracked.key).cloned() {
                self.padding.record_width(&block, tracked.natural_width);
            }
        }
    }

    fn after_overlay_event(&mut self, event: OverlayEvent) -> OverlayEvent {
        match event {
            OverlayEvent::Entered(_) | OverlayEvent::Switched { .. } => self.on_tracking_started(),
            // The frame loop is gone; write what it had not picked up yet.
            OverlayEvent::Exited(_) => {
                if let Err(e) = self.padding.flush(&mut self.surface) {
                    tracing::warn!(error = %e, "pending visuals not written");
                }
            }
            OverlayEvent::None => {}
        }
        event
    }

    pub fn pointer_moved(&mut self, point: Point, now: Instant) -> OverlayEvent {
        let event = self.overlay.on_pointer_move(point, now);
        self.after_overlay_event(event)
    }

    pub fn begin_interaction(&mut self) {
        self.overlay.begin_interaction();
    }

    pub fn end_interaction(&mut self, point: Point, now: Instant) -> OverlayEvent {
        let event = self.overlay.end_interaction(point, now);
        self.after_overlay_event(event)
    }

    /// Per display frame: follow layout and write pending visual changes.
    pub fn frame(&mut self) -> Result<OverlayEvent> {
        let event = self.overlay.on_frame();
        self.record_tracked_width();
        self.padding.flush(&mut self.surface)?;
        Ok(event)
    }

    /// The user typed.
    pub fn text_changed(&mut self, now: Instant) -> OverlayEvent {
        self.hoist_due = Some(now + self.overlay.quiet_period());
        let event = self.overlay.on_text_change(now);
        self.after_overlay_event(event)
    }

    /// Run deferred work whose time has come. Returns whether the surface
    /// changed.
    pub fn tick(&mut self, now: Instant) -> Result<bool> {
        match self.hoist_due {
            Some(due) if now >= due => {
                self.hoist_due = None;
                blocks::hoist_first_media(&mut self.surface)
            }
            _ => Ok(false),
        }
    }

    /// Open the reorder list on the current document.
    pub fn open_reorder(&mut self) -> Result<Vec<ReorderEntry>> {
        let result = self
            .blocks()
            .and_then(|blocks| self.reorder.open(blocks))
            .and_then(|()| self.reorder.entries());
        self.report(result)
    }

    pub fn reorder_drop(&mut self, dragged: &BlockId, target: &BlockId) -> Result<Vec<ReorderEntry>> {
        let result = self
            .reorder
            .drop_on(dragged, target)
            .and_then(|()| self.reorder.entries());
        self.report(result)
    }

    pub fn reorder_remove(&mut self, block: &BlockId) -> Result<Vec<ReorderEntry>> {
        let result = self
            .reorder
            .remove(block)
            .and_then(|()| self.reorder.entries());
        self.report(result)
    }

    /// Write the reordered list back. Refused while any listed block is
    /// still being ingested; the list stays open in that case.
    pub fn confirm_reorder(&mut self) -> Result<Vec<BlockId>> {
        let Self {
            reorder,
            slots,
            surface,
            ..
        } = self;
        let result = reorder.confirm(|order| {
            if let Some(busy) = slots.first_busy(order) {
                return Err(EditorError::ReorderBusy(busy.clone()));
            }
            blocks::reassemble(surface, order)
        });
        if result.is_ok() {
            self.overlay.reset();
            self.padding.sync_from_surface(&self.surface);
        }
        self.report(result)
    }

    pub fn cancel_reorder(&mut self) {
        self.reorder.cancel();
    }

    pub fn set_background_color(&mut self, color: impl Into<String>) {
        self.meta.background_color = color.into();
    }

    pub fn set_content_gap(&mut self, px: u32) -> u32 {
        self.meta.content_gap_px = px.min(self.config.document.max_content_gap_px);
        self.meta.content_gap_px
    }

    /// The document as it should be persisted.
    pub fn snapshot(&mut self) -> Result<PersistedDocument> {
        let blocks = self.blocks()?;
        PersistedDocument::from_blocks(&blocks, self.meta.clone())
    }

    /// Replace the surface contents with a persisted document.
    pub fn load(&mut self, document: &PersistedDocument) -> Result<()> {
        let mut timing = TimingGuard::new("document load");
        let blocks = document.to_blocks(&mut self.ids);
        timing.record(blocks.len());
        self.overlay.reset();
        self.reorder.cancel();
        self.surface.replace_children(&[])?;
        for block in &blocks {
            let node = self
                .surface
                .append_block(block.kind, &block.payload, &block.visual)?;
            self.surface.tag_block(node, &block.id)?;
        }
        self.meta = document.meta.clone().clamped(&self.config.document);
        let tracked = self.padding.sync_from_surface(&self.surface);
        tracing::debug!(blocks = blocks.len(), media = tracked, "document loaded");
        Ok(())
    }
}
