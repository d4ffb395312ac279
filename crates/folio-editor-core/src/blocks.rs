//! Content block model.
//!
//! The only two places where the editor translates between the render
//! surface and [`ContentBlock`] values: [`extract`] reads the surface into
//! an ordered block list, [`reassemble`] writes an order back. Everything
//! else works on the values.

use std::collections::{HashMap, HashSet};

use crate::error::{EditorError, Result};
use crate::perf::TimingGuard;
use crate::platform::{Atom, Embed, RenderSurface, SurfaceNode};
use crate::types::{BlockId, BlockIdGen, BlockKind, ContentBlock, MediaKind, NodeKey, VisualMeta};

/// Read the surface into an ordered block list.
///
/// Nodes without a block id (or with one already seen earlier in the
/// document, as happens when content is duplicated) are tagged with a fresh
/// id. Empty nodes are skipped.
pub fn extract<S: RenderSurface + ?Sized>(
    surface: &mut S,
    ids: &mut BlockIdGen,
) -> Result<Vec<ContentBlock>> {
    let mut blocks = Vec::new();
    let mut seen = HashSet::new();

    for node in surface.nodes() {
        let Some((kind, payload, visual)) = classify(&node) else {
            continue;
        };

        let id = match node.block_id {
            Some(id) if !seen.contains(&id) => id,
            _ => {
                let id = ids.fresh();
                surface.tag_block(node.key, &id)?;
                id
            }
        };
        seen.insert(id.clone());

        let text = if kind == BlockKind::Text {
            node.text.trim().to_owned()
        } else {
            String::new()
        };

        blocks.push(ContentBlock {
            id,
            kind,
            order: blocks.len(),
            payload,
            text,
            visual,
        });
    }

    tracing::trace!(count = blocks.len(), "extracted blocks");
    Ok(blocks)
}

/// Video wins over image, image over text.
fn classify(node: &SurfaceNode) -> Option<(BlockKind, String, VisualMeta)> {
    if let Some(video) = node.first_media(MediaKind::Video) {
        return Some((BlockKind::Video, video.src.clone(), video.visual));
    }
    if let Some(image) = node.first_media(MediaKind::Image) {
        return Some((BlockKind::Image, image.src.clone(), image.visual));
    }
    if node.has_text() {
        return Some((BlockKind::Text, node.html.clone(), VisualMeta::default()));
    }
    None
}

/// Where an embed landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedEmbed {
    pub block: BlockId,
    /// The media element itself.
    pub media: NodeKey,
    /// The top-level node holding it.
    pub node: NodeKey,
}

/// Insert an embed at the caret (or at the end), on a line of its own, and
/// tag its line with `block`.
pub fn insert_embed<S: RenderSurface + ?Sized>(
    surface: &mut S,
    block: BlockId,
    embed: &Embed,
) -> Result<InsertedEmbed> {
    let mut index = surface
        .caret()
        .unwrap_or_else(|| surface.len().saturating_sub(1));

    if index > 0 && surface.atom_at(index - 1) != Some(Atom::LineBreak) {
        surface.insert_line_break(index)?;
        index += 1;
    }

    let media = surface.insert_embed(index, embed)?;

    if surface
        .atom_at(index + 1)
        .is_some_and(|atom| !atom.is_line_boundary())
    {
        surface.insert_line_break(index + 1)?;
    }
    surface.set_caret(index + 1)?;

    let node = surface
        .container_of(media)
        .ok_or_else(|| EditorError::Platform("inserted embed has no container".into()))?;
    surface.tag_block(node, &block)?;

    tracing::debug!(%block, kind = ?embed.kind, index, "embed inserted");
    Ok(InsertedEmbed { block, media, node })
}

/// Rewrite the surface to hold exactly `order`, in that order.
///
/// Unknown ids are rejected before the surface is touched. The new sequence
/// is applied with a single [`RenderSurface::replace_children`] call.
pub fn reassemble<S: RenderSurface + ?Sized>(surface: &mut S, order: &[BlockId]) -> Result<()> {
    let mut timing = TimingGuard::per_frame("reassemble");
    timing.record(order.len());
    let nodes = surface.nodes();
    let by_id: HashMap<&BlockId, NodeKey> = nodes
        .iter()
        .filter_map(|n| n.block_id.as_ref().map(|id| (id, n.key)))
        .collect();

    let keys = order
        .iter()
        .map(|id| {
            by_id
                .get(id)
                .copied()
                .ok_or_else(|| EditorError::UnknownBlock(id.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    surface.replace_children(&keys)?;
    tracing::debug!(blocks = keys.len(), "surface reassembled");
    Ok(())
}

/// Top-level node holding a block.
pub fn node_of<S: RenderSurface + ?Sized>(surface: &S, block: &BlockId) -> Option<SurfaceNode> {
    surface
        .nodes()
        .into_iter()
        .find(|n| n.block_id.as_ref() == Some(block))
}

/// Once the text is gone, move the first media block to the very start.
///
/// Returns whether anything moved.
pub fn hoist_first_media<S: RenderSurface + ?Sized>(surface: &mut S) -> Result<bool> {
    if surface.has_text() {
        return Ok(false);
    }
    let nodes = surface.nodes();
    let Some(first) = nodes.iter().position(|n| !n.media.is_empty()) else {
        return Ok(false);
    };
    if first == 0 {
        return Ok(false);
    }

    let mut keys: Vec<NodeKey> = nodes.iter().map(|n| n.key).collect();
    let key = keys.remove(first);
    keys.insert(0, key);
    surface.replace_children(&keys)?;
    tracing::debug!(from = first, "hoisted first media block");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;

    fn ids() -> BlockIdGen {
        BlockIdGen::with_salt(1)
    }

    fn image(src: &str) -> Embed {
        Embed {
            kind: MediaKind::Image,
            src: src.into(),
            visual: VisualMeta::default(),
        }
    }

    #[test]
    fn test_extract_classifies_and_orders() {
        let mut s = MemorySurface::new();
        s.push_text("Intro");
        s.push_text("   ");
        s.push_media(MediaKind::Image, "a.png", VisualMeta::default());
        s.push_media(MediaKind::Video, "https://player.vimeo.com/video/7", VisualMeta::default());
        let mut id_gen = ids();

        let blocks = extract(&mut s, &mut id_gen).unwrap();

        let kinds: Vec<_> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Text, BlockKind::Image, BlockKind::Video]);
        let orders: Vec<_> = blocks.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(blocks[0].payload, "<p>Intro</p>");
        assert_eq!(blocks[0].text, "Intro");
        assert_eq!(blocks[1].payload, "a.png");
        assert_eq!(blocks[2].payload, "https://player.vimeo.com/video/7");
    }

    #[test]
    fn test_extract_keeps_ids_across_calls() {
        let mut s = MemorySurface::new();
        s.push_text("one");
        s.push_text("two");
        let mut id_gen = ids();

        let first = extract(&mut s, &mut id_gen).unwrap();
        let second = extract(&mut s, &mut id_gen).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_ids_are_replaced() {
        let mut s = MemorySurface::new();
        let a = s.push_text("one");
        let b = s.push_text("two");
        let shared = BlockId::from("dup");
        s.tag_block(a, &shared).unwrap();
        s.tag_block(b, &shared).unwrap();

        let blocks = extract(&mut s, &mut ids()).unwrap();
        assert_eq!(blocks[0].id, shared);
        assert_ne!(blocks[1].id, shared);
    }

    #[test]
    fn test_reassemble_preserves_identity() {
        let mut s = MemorySurface::new();
        s.push_text("A");
        s.push_media(MediaKind::Image, "b.png", VisualMeta::default());
        s.push_text("C");
        let mut id_gen = ids();
        let before = extract(&mut s, &mut id_gen).unwrap();

        let order: Vec<_> = before.iter().map(|b| b.id.clone()).collect();
        reassemble(&mut s, &order).unwrap();

        let after = extract(&mut s, &mut id_gen).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_reassemble_drops_unlisted_and_rejects_unknown() {
        let mut s = MemorySurface::new();
        s.push_text("A");
        s.push_text("B");
        let mut id_gen = ids();
        let blocks = extract(&mut s, &mut id_gen).unwrap();

        let err = reassemble(&mut s, &[blocks[1].id.clone(), BlockId::from("nope")]).unwrap_err();
        assert!(matches!(err, EditorError::UnknownBlock(ref id) if id.as_str() == "nope"));
        assert_eq!(extract(&mut s, &mut id_gen).unwrap().len(), 2);

        reassemble(&mut s, &[blocks[1].id.clone()]).unwrap();
        let left = extract(&mut s, &mut id_gen).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].text, "B");
    }

    #[test]
    fn test_insert_embed_mid_line_gets_own_line() {
        let mut s = MemorySurface::new();
        s.push_text("abcd");
        s.set_caret(2).unwrap();
        let mut id_gen = ids();

        let inserted = insert_embed(&mut s, id_gen.fresh(), &image("x.png")).unwrap();

        let nodes = s.nodes();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].text, "ab");
        assert_eq!(nodes[1].key, inserted.node);
        assert_eq!(nodes[1].media.len(), 1);
        assert!(!nodes[1].has_text());
        assert_eq!(nodes[2].text, "cd");
        assert_eq!(s.caret(), Some(4));
        assert_eq!(nodes[1].block_id.as_ref(), Some(&inserted.block));
    }

    #[test]
    fn test_insert_embed_on_empty_surface() {
        let mut s = MemorySurface::new();
        let inserted = insert_embed(&mut s, ids().fresh(), &image("x.png")).unwrap();
        let nodes = s.nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].media[0].key, inserted.media);
    }

    #[test]
    fn test_insert_embed_at_line_start_keeps_text_separate() {
        let mut s = MemorySurface::new();
        s.push_text("ab");
        s.push_text("cd");
        s.set_caret(3).unwrap();

        insert_embed(&mut s, ids().fresh(), &image("x.png")).unwrap();

        let texts: Vec<_> = s.nodes().iter().map(|n| n.text.clone()).collect();
        assert_eq!(texts, vec!["ab", "", "cd"]);
    }

    #[test]
    fn test_hoist_first_media_when_text_is_gone() {
        let mut s = MemorySurface::new();
        let text = s.push_text("caption");
        let img = s.push_media(MediaKind::Image, "a.png", VisualMeta::default());

        assert!(!hoist_first_media(&mut s).unwrap());

        s.set_line_text(text, "").unwrap();
        assert!(hoist_first_media(&mut s).unwrap());
        assert_eq!(s.nodes()[0].media[0].key, img);
        assert!(!hoist_first_media(&mut s).unwrap());
    }
}
