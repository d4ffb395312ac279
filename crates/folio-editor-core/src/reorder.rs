//! Manual drag-reorder of blocks.
//!
//! The controller works on a private copy of the block list. Nothing touches
//! the surface until [`ReorderController::confirm`], which hands the final
//! order to the caller's apply step all at once.

use crate::error::{EditorError, Result};
use crate::types::{BlockId, BlockKind, ContentBlock};
use crate::video;

/// Characters of text shown in a list entry before truncation.
pub const PREVIEW_CHARS: usize = 30;

/// One row of the reorder list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderEntry {
    pub id: BlockId,
    pub kind: BlockKind,
    pub label: &'static str,
    /// Truncated text for text blocks.
    pub summary: Option<String>,
    /// Image source, or video preview frame.
    pub thumbnail: Option<String>,
}

/// List entry for a block.
pub fn preview(block: &ContentBlock) -> ReorderEntry {
    let (summary, thumbnail) = match block.kind {
        BlockKind::Text => (Some(truncate(&block.text, PREVIEW_CHARS)), None),
        BlockKind::Image => (None, Some(block.payload.clone())),
        BlockKind::Video => (None, video::thumbnail_url(&block.payload)),
    };
    ReorderEntry {
        id: block.id.clone(),
        kind: block.kind,
        label: block.kind.label(),
        summary,
        thumbnail,
    }
}

fn truncate(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Index to insert `dragged` at after dropping it on `target`, in the list
/// with `dragged` already removed.
fn drop_index(from: usize, to: usize, target_in_remaining: usize) -> usize {
    if from < to {
        target_in_remaining + 1
    } else {
        target_in_remaining
    }
}

#[derive(Debug, Default)]
pub struct ReorderController {
    working: Option<Vec<ContentBlock>>,
}

impl ReorderController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the reorder view on a snapshot of the document.
    pub fn open(&mut self, blocks: Vec<ContentBlock>) -> Result<()> {
        if blocks.is_empty() {
            return Err(EditorError::EmptyDocumentOnReorder);
        }
        tracing::debug!(blocks = blocks.len(), "reorder opened");
        self.working = Some(blocks);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.working.is_some()
    }

    /// Blocks in their current working order.
    pub fn blocks(&self) -> Result<&[ContentBlock]> {
        self.working.as_deref().ok_or(EditorError::ReorderNotOpen)
    }

    pub fn order(&self) -> Result<Vec<BlockId>> {
        Ok(self.blocks()?.iter().map(|b| b.id.clone()).collect())
    }

    pub fn entries(&self) -> Result<Vec<ReorderEntry>> {
        Ok(self.blocks()?.iter().map(preview).collect())
    }

    fn working_mut(&mut self) -> Result<&mut Vec<ContentBlock>> {
        self.working.as_mut().ok_or(EditorError::ReorderNotOpen)
    }

    /// Move `dragged` onto `target`'s position.
    pub fn drop_on(&mut self, dragged: &BlockId, target: &BlockId) -> Result<()> {
        let working = self.working_mut()?;
        let position = |list: &[ContentBlock], id: &BlockId| {
            list.iter()
                .position(|b| b.id == *id)
                .ok_or_else(|| EditorError::UnknownBlock(id.clone()))
        };
        let from = position(working.as_slice(), dragged)?;
        let to = position(working.as_slice(), target)?;
        if from == to {
            return Ok(());
        }

        let block = working.remove(from);
        let target_in_remaining = position(working.as_slice(), target)?;
        working.insert(drop_index(from, to, target_in_remaining), block);
        renumber(working);
        Ok(())
    }

    /// Drop a block from the working list. It is removed from the surface
    /// on confirm.
    pub fn remove(&mut self, id: &BlockId) -> Result<()> {
        let working = self.working_mut()?;
        let index = working
            .iter()
            .position(|b| b.id == *id)
            .ok_or_else(|| EditorError::UnknownBlock(id.clone()))?;
        working.remove(index);
        renumber(working);
        Ok(())
    }

    /// Hand the final order to `apply`. The view closes only when `apply`
    /// succeeds; on failure it stays open with the working order intact.
    pub fn confirm<F>(&mut self, apply: F) -> Result<Vec<BlockId>>
    where
        F: FnOnce(&[BlockId]) -> Result<()>,
    {
        let order = self.order()?;
        apply(&order)?;
        self.working = None;
        tracing::debug!(blocks = order.len(), "reorder confirmed");
        Ok(order)
    }

    /// Close without touching anything.
    pub fn cancel(&mut self) {
        if self.working.take().is_some() {
            tracing::debug!("reorder cancelled");
        }
    }
}

fn renumber(blocks: &mut [ContentBlock]) {
    for (i, block) in blocks.iter_mut().enumerate() {
        block.order = i;
    }
}
