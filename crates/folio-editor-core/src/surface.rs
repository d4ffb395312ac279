//! In-memory render surface.
//!
//! A flat, line-oriented document model: each top-level node is a line of
//! inline atoms (characters and media embeds) terminated by an implicit line
//! break. Linear indices count one per atom plus one per line break, the same
//! addressing a contenteditable rich-text host exposes.

use smol_str::SmolStr;

use crate::html;
use crate::platform::{Atom, Embed, MediaInfo, PlatformError, RenderSurface, SurfaceNode};
use crate::types::{BlockId, BlockKind, MediaKind, NodeKey, VisualMeta};

#[derive(Debug, Clone)]
struct MediaElement {
    key: NodeKey,
    kind: MediaKind,
    src: String,
    visual: VisualMeta,
}

#[derive(Debug, Clone)]
enum Inline {
    Char(char),
    Media(MediaElement),
}

#[derive(Debug, Clone)]
struct Line {
    key: NodeKey,
    tag: SmolStr,
    block_id: Option<BlockId>,
    atoms: Vec<Inline>,
}

impl Line {
    fn text(&self) -> String {
        self.atoms
            .iter()
            .filter_map(|a| match a {
                Inline::Char(c) => Some(*c),
                Inline::Media(_) => None,
            })
            .collect()
    }

    fn media(&self) -> impl Iterator<Item = &MediaElement> {
        self.atoms.iter().filter_map(|a| match a {
            Inline::Media(m) => Some(m),
            Inline::Char(_) => None,
        })
    }

    /// A line holding nothing but a video frame renders as the frame itself.
    fn rendered_tag(&self) -> SmolStr {
        match self.atoms.as_slice() {
            [Inline::Media(m)] if m.kind == MediaKind::Video => SmolStr::new_static("iframe"),
            _ => self.tag.clone(),
        }
    }

    fn html(&self) -> String {
        let tag = self.rendered_tag();
        if tag == "iframe" {
            return self.media().map(media_html).collect();
        }
        let mut inner = String::new();
        let mut run = String::new();
        for atom in &self.atoms {
            match atom {
                Inline::Char(c) => run.push(*c),
                Inline::Media(m) => {
                    html::escape_into(&mut inner, &run);
                    run.clear();
                    inner.push_str(&media_html(m));
                }
            }
        }
        html::escape_into(&mut inner, &run);
        if inner.is_empty() {
            inner.push_str("<br>");
        }
        format!("<{tag}>{inner}</{tag}>")
    }
}

fn media_html(m: &MediaElement) -> String {
    let mut classes = Vec::new();
    if m.visual.full_width {
        classes.push("pm-embed-full");
    }
    if m.visual.padded {
        classes.push("pm-embed-padded");
    }
    let class = if classes.is_empty() {
        String::new()
    } else {
        format!(" class=\"{}\"", classes.join(" "))
    };
    let src = html::escape(&m.src);
    match m.kind {
        MediaKind::Image => format!("<img src=\"{src}\"{class}>"),
        MediaKind::Video => format!("<iframe src=\"{src}\"{class} allowfullscreen></iframe>"),
    }
}

/// A [`RenderSurface`] that keeps the document in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    lines: Vec<Line>,
    caret: Option<usize>,
    next_key: u64,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self) -> NodeKey {
        self.next_key += 1;
        NodeKey(self.next_key)
    }

    fn new_line(&mut self, tag: &str) -> Line {
        Line {
            key: self.mint(),
            tag: SmolStr::new(tag),
            block_id: None,
            atoms: Vec::new(),
        }
    }

    /// Append a paragraph of text, returning its node key.
    pub fn push_text(&mut self, text: &str) -> NodeKey {
        self.push_line("p", text)
    }

    /// Append a line with an explicit tag (`h1`, `blockquote`, ...).
    pub fn push_line(&mut self, tag: &str, text: &str) -> NodeKey {
        let mut line = self.new_line(tag);
        line.atoms.extend(text.chars().map(Inline::Char));
        let key = line.key;
        self.lines.push(line);
        key
    }

    /// Append a line holding one media element, returning the media key.
    pub fn push_media(&mut self, kind: MediaKind, src: &str, visual: VisualMeta) -> NodeKey {
        let mut line = self.new_line("p");
        let key = self.mint();
        line.atoms.push(Inline::Media(MediaElement {
            key,
            kind,
            src: src.to_owned(),
            visual,
        }));
        self.lines.push(line);
        key
    }

    /// Replace the characters of a line, keeping its media.
    pub fn set_line_text(&mut self, node: NodeKey, text: &str) -> Result<(), PlatformError> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.key == node)
            .ok_or_else(|| PlatformError(format!("no line {}", node.0)))?;
        line.atoms.retain(|a| matches!(a, Inline::Media(_)));
        line.atoms.extend(text.chars().map(Inline::Char));
        Ok(())
    }

    /// Insert plain text at a linear index.
    pub fn insert_text(&mut self, index: usize, text: &str) -> Result<(), PlatformError> {
        let (line, offset) = self.locate_or_append(index)?;
        let atoms = &mut self.lines[line].atoms;
        for (i, c) in text.chars().enumerate() {
            atoms.insert(offset + i, Inline::Char(c));
        }
        Ok(())
    }

    /// Markup of the whole surface.
    pub fn html(&self) -> String {
        self.lines.iter().map(Line::html).collect::<Vec<_>>().join("")
    }

    pub fn visual_of(&self, media: NodeKey) -> Option<VisualMeta> {
        self.find_media(media).map(|m| m.visual)
    }

    pub fn src_of(&self, media: NodeKey) -> Option<&str> {
        self.find_media(media).map(|m| m.src.as_str())
    }

    fn find_media(&self, media: NodeKey) -> Option<&MediaElement> {
        self.lines.iter().flat_map(Line::media).find(|m| m.key == media)
    }

    fn find_media_mut(&mut self, media: NodeKey) -> Result<&mut MediaElement, PlatformError> {
        self.lines
            .iter_mut()
            .flat_map(|l| l.atoms.iter_mut())
            .find_map(|a| match a {
                Inline::Media(m) if m.key == media => Some(m),
                _ => None,
            })
            .ok_or_else(|| PlatformError(format!("no media element {}", media.0)))
    }

    /// Line index and offset within the line for a linear index.
    ///
    /// An offset equal to the line's atom count addresses its line break.
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut start = 0;
        for (i, line) in self.lines.iter().enumerate() {
            let end = start + line.atoms.len();
            if index <= end {
                return Some((i, index - start));
            }
            start = end + 1;
        }
        None
    }

    /// Like [`locate`](Self::locate), but the position just past the final
    /// line break opens a new empty line.
    fn locate_or_append(&mut self, index: usize) -> Result<(usize, usize), PlatformError> {
        if let Some(pos) = self.locate(index) {
            return Ok(pos);
        }
        if index == self.len() {
            let line = self.new_line("p");
            self.lines.push(line);
            return Ok((self.lines.len() - 1, 0));
        }
        Err(PlatformError(format!(
            "index {index} is past the end ({})",
            self.len()
        )))
    }
}

impl RenderSurface for MemorySurface {
    fn nodes(&self) -> Vec<SurfaceNode> {
        self.lines
            .iter()
            .map(|line| SurfaceNode {
                key: line.key,
                block_id: line.block_id.clone(),
                tag: line.rendered_tag(),
                html: line.html(),
                text: line.text(),
                media: line
                    .media()
                    .map(|m| MediaInfo {
                        key: m.key,
                        kind: m.kind,
                        src: m.src.clone(),
                        visual: m.visual,
                    })
                    .collect(),
            })
            .collect()
    }

    fn tag_block(&mut self, node: NodeKey, id: &BlockId) -> Result<(), PlatformError> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.key == node)
            .ok_or_else(|| PlatformError(format!("no line {}", node.0)))?;
        line.block_id = Some(id.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.lines.iter().map(|l| l.atoms.len() + 1).sum()
    }

    fn atom_at(&self, index: usize) -> Option<Atom> {
        let (line, offset) = self.locate(index)?;
        match self.lines[line].atoms.get(offset) {
            None => Some(Atom::LineBreak),
            Some(Inline::Char(c)) => Some(Atom::Char(*c)),
            Some(Inline::Media(m)) => Some(Atom::Embed(m.kind)),
        }
    }

    fn caret(&self) -> Option<usize> {
        self.caret
    }

    fn set_caret(&mut self, index: usize) -> Result<(), PlatformError> {
        if index > self.len() {
            return Err(PlatformError(format!("caret {index} is past the end")));
        }
        self.caret = Some(index);
        Ok(())
    }

    fn insert_line_break(&mut self, index: usize) -> Result<(), PlatformError> {
        let (line, offset) = self.locate_or_append(index)?;
        let tail = self.lines[line].atoms.split_off(offset);
        let mut next = self.new_line("p");
        next.atoms = tail;
        self.lines.insert(line + 1, next);
        Ok(())
    }

    fn insert_embed(&mut self, index: usize, embed: &Embed) -> Result<NodeKey, PlatformError> {
        let (line, offset) = self.locate_or_append(index)?;
        let key = self.mint();
        self.lines[line].atoms.insert(
            offset,
            Inline::Media(MediaElement {
                key,
                kind: embed.kind,
                src: embed.src.clone(),
                visual: embed.visual,
            }),
        );
        Ok(key)
    }

    fn container_of(&self, media: NodeKey) -> Option<NodeKey> {
        self.lines
            .iter()
            .find(|l| l.media().any(|m| m.key == media))
            .map(|l| l.key)
    }

    fn set_media_src(&mut self, media: NodeKey, src: &str) -> Result<(), PlatformError> {
        self.find_media_mut(media)?.src = src.to_owned();
        Ok(())
    }

    fn set_visual(&mut self, media: NodeKey, visual: &VisualMeta) -> Result<(), PlatformError> {
        self.find_media_mut(media)?.visual = *visual;
        Ok(())
    }

    fn remove_node(&mut self, node: NodeKey) -> Result<(), PlatformError> {
        if let Some(pos) = self.lines.iter().position(|l| l.key == node) {
            self.lines.remove(pos);
            return Ok(());
        }
        for line in &mut self.lines {
            let before = line.atoms.len();
            line.atoms
                .retain(|a| !matches!(a, Inline::Media(m) if m.key == node));
            if line.atoms.len() != before {
                return Ok(());
            }
        }
        Err(PlatformError(format!("no node {}", node.0)))
    }

    fn append_block(
        &mut self,
        kind: BlockKind,
        payload: &str,
        visual: &VisualMeta,
    ) -> Result<NodeKey, PlatformError> {
        let media_kind = match kind {
            BlockKind::Text => {
                return Ok(self.push_line(&html::leading_tag(payload), &html::text_content(payload)));
            }
            BlockKind::Image => MediaKind::Image,
            BlockKind::Video => MediaKind::Video,
        };
        let media = self.push_media(media_kind, payload, *visual);
        self.container_of(media)
            .ok_or_else(|| PlatformError::from("appended media has no line"))
    }

    fn replace_children(&mut self, order: &[NodeKey]) -> Result<(), PlatformError> {
        let mut next = Vec::with_capacity(order.len());
        for key in order {
            if next.iter().any(|l: &Line| l.key == *key) {
                return Err(PlatformError(format!("node {} listed twice", key.0)));
            }
            let line = self
                .lines
                .iter()
                .find(|l| l.key == *key)
                .ok_or_else(|| PlatformError(format!("no line {}", key.0)))?;
            next.push(line.clone());
        }
        self.lines = next;
        let len = self.len();
        if let Some(caret) = self.caret.as_mut() {
            *caret = (*caret).min(len.saturating_sub(1));
        }
        Ok(())
    }
}
