//! Per-block padding and full-width state.
//!
//! The store is the source of truth for visual metadata while a document is
//! being edited. Changes are recorded immediately but only written to the
//! surface by [`PaddingStore::flush`], which the frame loop calls once per
//! display frame, so a slider drag produces at most one surface write per
//! frame.

use std::collections::{BTreeSet, HashMap};

use crate::config::PaddingConfig;
use crate::error::{EditorError, Result};
use crate::perf::TimingGuard;
use crate::platform::RenderSurface;
use crate::types::{BlockId, MediaKind, NodeKey, VisualMeta};

#[derive(Debug, Clone)]
struct PaddingEntry {
    media: NodeKey,
    /// Original decoded width for images, rendered width for video frames.
    natural_width: Option<f64>,
    visual: VisualMeta,
    /// Last non-zero padding, restored by toggling back on.
    remembered_px: u32,
}

#[derive(Debug, Clone)]
pub struct PaddingStore {
    config: PaddingConfig,
    entries: HashMap<BlockId, PaddingEntry>,
    dirty: BTreeSet<BlockId>,
}

impl PaddingStore {
    pub fn new(config: PaddingConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &PaddingConfig {
        &self.config
    }

    /// Visuals for a freshly inserted embed.
    ///
    /// Video frames start full width. Anything wide enough starts padded with
    /// the default padding.
    pub fn default_visual(&self, kind: MediaKind, natural_width: Option<f64>) -> VisualMeta {
        let mut visual = VisualMeta {
            full_width: kind == MediaKind::Video,
            ..VisualMeta::default()
        };
        if natural_width.is_some_and(|w| self.meets_threshold(w)) {
            visual.padded = true;
            visual.padding_px = self.config.default_px;
        }
        visual
    }

    fn meets_threshold(&self, width: f64) -> bool {
        width >= f64::from(self.config.min_width_px)
    }

    /// Start tracking a block. Replaces any previous entry for it.
    pub fn track(
        &mut self,
        block: BlockId,
        media: NodeKey,
        visual: VisualMeta,
        natural_width: Option<f64>,
    ) {
        let remembered_px = if visual.padding_px > 0 {
            visual.padding_px.min(self.config.max_px)
        } else {
            self.config.default_px
        };
        self.entries.insert(
            block,
            PaddingEntry {
                media,
                natural_width,
                visual,
                remembered_px,
            },
        );
    }

    /// Record a measured natural width.
    pub fn record_width(&mut self, block: &BlockId, width: f64) {
        if let Some(entry) = self.entries.get_mut(block) {
            entry.natural_width = Some(width);
        }
    }

    /// Seed entries from the visuals already written on the surface.
    ///
    /// Known natural widths are kept. Blocks no longer on the surface are
    /// forgotten. Returns the number of tracked blocks.
    pub fn sync_from_surface<S: RenderSurface + ?Sized>(&mut self, surface: &S) -> usize {
        let mut next = HashMap::new();
        for node in surface.nodes() {
            let Some(block) = node.block_id.clone() else {
                continue;
            };
            let Some(media) = node
                .first_media(MediaKind::Video)
                .or_else(|| node.first_media(MediaKind::Image))
            else {
                continue;
            };

            let previous = self.entries.remove(&block);
            let natural_width = previous.as_ref().and_then(|e| e.natural_width);
            // Unflushed edits win over what the surface still shows.
            let visual = match &previous {
                Some(prev) if self.dirty.contains(&block) => prev.visual,
                _ => media.visual,
            };
            let remembered_px = match (visual.padding_px, previous) {
                (px, _) if px > 0 => px.min(self.config.max_px),
                (_, Some(prev)) => prev.remembered_px,
                (_, None) => self.config.default_px,
            };
            next.insert(
                block,
                PaddingEntry {
                    media: media.key,
                    natural_width,
                    visual,
                    remembered_px,
                },
            );
        }
        self.dirty.retain(|b| next.contains_key(b));
        self.entries = next;
        self.entries.len()
    }

    pub fn forget(&mut self, block: &BlockId) {
        self.entries.remove(block);
        self.dirty.remove(block);
    }

    pub fn visual(&self, block: &BlockId) -> Option<VisualMeta> {
        self.entries.get(block).map(|e| e.visual)
    }

    pub fn media_of(&self, block: &BlockId) -> Option<NodeKey> {
        self.entries.get(block).map(|e| e.media)
    }

    /// Block whose media element has this key.
    pub fn block_for_media(&self, media: NodeKey) -> Option<&BlockId> {
        self.entries
            .iter()
            .find(|(_, e)| e.media == media)
            .map(|(id, _)| id)
    }

    pub fn is_eligible(&self, block: &BlockId) -> bool {
        self.entries
            .get(block)
            .and_then(|e| e.natural_width)
            .is_some_and(|w| self.meets_threshold(w))
    }

    fn entry_mut(&mut self, block: &BlockId) -> Result<&mut PaddingEntry> {
        self.entries
            .get_mut(block)
            .ok_or_else(|| EditorError::UnknownBlock(block.clone()))
    }

    fn ensure_eligible(&self, block: &BlockId) -> Result<()> {
        let entry = self
            .entries
            .get(block)
            .ok_or_else(|| EditorError::UnknownBlock(block.clone()))?;
        let width = entry.natural_width.unwrap_or(0.0);
        if self.meets_threshold(width) {
            Ok(())
        } else {
            Err(EditorError::PaddingNotEligible {
                block: block.clone(),
                width: width.max(0.0).round() as u32,
                min: self.config.min_width_px,
            })
        }
    }

    /// Set the padding of a block. Values are clamped to the configured
    /// maximum; zero removes the padding but keeps the remembered value.
    pub fn set_padding(&mut self, block: &BlockId, px: u32) -> Result<VisualMeta> {
        self.ensure_eligible(block)?;
        let max = self.config.max_px;
        let entry = self.entry_mut(block)?;
        let px = px.min(max);
        if px == 0 {
            entry.visual.padded = false;
        } else {
            entry.visual.padded = true;
            entry.visual.padding_px = px;
            entry.remembered_px = px;
        }
        let visual = entry.visual;
        self.dirty.insert(block.clone());
        Ok(visual)
    }

    /// Turn padding off, or back on at the last non-zero value.
    ///
    /// Only turning padding on requires the block to be eligible; padding
    /// can always be removed.
    pub fn toggle(&mut self, block: &BlockId) -> Result<VisualMeta> {
        let padded = self
            .entries
            .get(block)
            .ok_or_else(|| EditorError::UnknownBlock(block.clone()))?
            .visual
            .padded;
        if !padded {
            self.ensure_eligible(block)?;
        }
        let default_px = self.config.default_px;
        let entry = self.entry_mut(block)?;
        if padded {
            entry.visual.padded = false;
        } else {
            entry.visual.padded = true;
            entry.visual.padding_px = if entry.remembered_px > 0 {
                entry.remembered_px
            } else {
                default_px
            };
        }
        let visual = entry.visual;
        self.dirty.insert(block.clone());
        Ok(visual)
    }

    pub fn set_full_width(&mut self, block: &BlockId, full_width: bool) -> Result<VisualMeta> {
        let entry = self.entry_mut(block)?;
        entry.visual.full_width = full_width;
        let visual = entry.visual;
        self.dirty.insert(block.clone());
        Ok(visual)
    }

    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Write every pending change to the surface. Returns the number of
    /// media elements updated.
    ///
    /// On failure the failed block and everything not yet written stay
    /// pending.
    pub fn flush<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) -> Result<usize> {
        if self.dirty.is_empty() {
            return Ok(0);
        }
        let mut timing = TimingGuard::per_frame("padding flush");
        let mut pending = std::mem::take(&mut self.dirty).into_iter();
        let mut written = 0;
        while let Some(block) = pending.next() {
            let Some(entry) = self.entries.get(&block) else {
                continue;
            };
            if let Err(e) = surface.set_visual(entry.media, &entry.visual) {
                self.dirty.insert(block);
                self.dirty.extend(pending);
                return Err(e.into());
            }
            written += 1;
        }
        timing.record(written);
        Ok(written)
    }
}

impl Default for PaddingStore {
    fn default() -> Self {
        Self::new(PaddingConfig::default())
    }
}
