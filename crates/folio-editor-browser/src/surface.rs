//! Contenteditable render surface.
//!
//! Every element child of the editor root is one top-level node. Linear
//! indices count one atom per character and per media element, plus one line
//! break after each top-level node, the same addressing the in-memory surface
//! uses. `<br>` placeholders in empty lines are not atoms.

use folio_editor_core::{
    Atom, BlockId, BlockKind, Embed, MediaInfo, MediaKind, NodeKey, PlatformError, RenderSurface,
    SurfaceNode, VisualMeta,
};
use smol_str::SmolStr;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement, Node};

use crate::dom::{
    BLOCK_ATTR, KEY_ATTR, MEDIA_SELECTOR, NodeKeys, elements, find_keyed, js_err, media_kind,
    same_node,
};

const CLASS_FULL: &str = "pm-embed-full";
const CLASS_PADDED: &str = "pm-embed-padded";
const PADDING_ATTR: &str = "data-padding-px";

/// A DOM boundary point: a container and an offset into it (UTF-16 units
/// for text nodes, child index for elements).
#[derive(Debug, Clone)]
struct DomPosition {
    node: Node,
    offset: u32,
}

#[derive(Debug, Clone)]
struct LineAtom {
    atom: Atom,
    /// Position just before the atom.
    at: DomPosition,
}

fn child_index(node: &Node) -> u32 {
    let mut index = 0;
    let mut current = node.previous_sibling();
    while let Some(sibling) = current {
        index += 1;
        current = sibling.previous_sibling();
    }
    index
}

fn collect_atoms(container: &Node, out: &mut Vec<LineAtom>) {
    let children = container.child_nodes();
    for i in 0..children.length() {
        let Some(child) = children.item(i) else {
            continue;
        };
        match child.node_type() {
            Node::TEXT_NODE => {
                let text = child.text_content().unwrap_or_default();
                let mut offset = 0u32;
                for c in text.chars() {
                    out.push(LineAtom {
                        atom: Atom::Char(c),
                        at: DomPosition {
                            node: child.clone(),
                            offset,
                        },
                    });
                    offset += c.len_utf16() as u32;
                }
            }
            Node::ELEMENT_NODE => {
                let Some(el) = child.dyn_ref::<Element>() else {
                    continue;
                };
                if let Some(kind) = media_kind(el) {
                    out.push(LineAtom {
                        atom: Atom::Embed(kind),
                        at: DomPosition {
                            node: container.clone(),
                            offset: i,
                        },
                    });
                } else if el.local_name() != "br" {
                    collect_atoms(&child, out);
                }
            }
            _ => {}
        }
    }
}

fn line_atoms(line: &Element) -> Vec<LineAtom> {
    let mut atoms = Vec::new();
    match (media_kind(line), line.parent_node()) {
        // A frame sitting directly under the root is a line of its own.
        (Some(kind), Some(parent)) => atoms.push(LineAtom {
            atom: Atom::Embed(kind),
            at: DomPosition {
                node: parent,
                offset: child_index(line),
            },
        }),
        _ => collect_atoms(line, &mut atoms),
    }
    atoms
}

/// Position just before the line's terminating break.
fn line_end(line: &Element) -> Option<DomPosition> {
    if media_kind(line).is_some() {
        return Some(DomPosition {
            node: line.parent_node()?,
            offset: child_index(line) + 1,
        });
    }
    let count = line.child_nodes().length();
    let trailing_br = line
        .last_element_child()
        .is_some_and(|el| el.local_name() == "br" && line.last_child().is_some_and(|n| same_node(&n, &el)));
    Some(DomPosition {
        node: line.clone().into(),
        offset: if trailing_br { count - 1 } else { count },
    })
}

/// Give an empty line a `<br>` so it keeps its height.
fn ensure_placeholder(doc: &Document, line: &Element) -> Result<(), PlatformError> {
    if line_atoms(line).is_empty() && line.query_selector("br").map_err(js_err)?.is_none() {
        let br: Element = doc.create_element("br").map_err(js_err)?;
        line.append_child(&br).map_err(js_err)?;
    }
    Ok(())
}

fn drop_placeholders(line: &Element) -> Result<(), PlatformError> {
    if line_atoms(line).is_empty() {
        return Ok(());
    }
    for br in elements(&line.query_selector_all("br").map_err(js_err)?) {
        br.remove();
    }
    Ok(())
}

fn apply_visual(el: &Element, visual: &VisualMeta) -> Result<(), PlatformError> {
    let classes = el.class_list();
    classes
        .toggle_with_force(CLASS_FULL, visual.full_width)
        .map_err(js_err)?;
    classes
        .toggle_with_force(CLASS_PADDED, visual.padded)
        .map_err(js_err)?;
    el.set_attribute(PADDING_ATTR, &visual.padding_px.to_string())
        .map_err(js_err)?;
    if let Some(html) = el.dyn_ref::<HtmlElement>() {
        let style = html.style();
        if visual.padded {
            style
                .set_property("padding", &format!("{}px", visual.padding_px))
                .map_err(js_err)?;
            style
                .set_property("box-sizing", "border-box")
                .map_err(js_err)?;
        } else {
            style.remove_property("padding").map_err(js_err)?;
        }
    }
    Ok(())
}

fn read_visual(el: &Element) -> VisualMeta {
    let classes = el.class_list();
    VisualMeta {
        padded: classes.contains(CLASS_PADDED),
        padding_px: el
            .get_attribute(PADDING_ATTR)
            .and_then(|px| px.parse().ok())
            .unwrap_or(0),
        full_width: classes.contains(CLASS_FULL),
    }
}

fn create_media(doc: &Document, embed: &Embed) -> Result<Element, PlatformError> {
    let el = match embed.kind {
        MediaKind::Image => {
            let img = doc.create_element("img").map_err(js_err)?;
            img.set_attribute("alt", "").map_err(js_err)?;
            img
        }
        MediaKind::Video => {
            let frame = doc.create_element("iframe").map_err(js_err)?;
            frame.set_attribute("frameborder", "0").map_err(js_err)?;
            frame
                .set_attribute("allowfullscreen", "true")
                .map_err(js_err)?;
            frame
        }
    };
    el.set_attribute("src", &embed.src).map_err(js_err)?;
    apply_visual(&el, &embed.visual)?;
    Ok(el)
}

/// Markup of a line without the editor's bookkeeping attributes.
fn clean_html(line: &Element) -> String {
    let Some(copy) = line
        .clone_node_with_deep(true)
        .ok()
        .and_then(|n| n.dyn_into::<Element>().ok())
    else {
        return line.outer_html();
    };
    let selector = format!("[{KEY_ATTR}], [{BLOCK_ATTR}]");
    let mut marked = copy
        .query_selector_all(&selector)
        .map(|list| elements(&list))
        .unwrap_or_default();
    marked.push(copy.clone());
    for el in marked {
        let _ = el.remove_attribute(KEY_ATTR);
        let _ = el.remove_attribute(BLOCK_ATTR);
    }
    copy.outer_html()
}

/// A [`RenderSurface`] over a contenteditable root element.
#[derive(Debug, Clone)]
pub struct DomSurface {
    root: Element,
    keys: NodeKeys,
}

impl DomSurface {
    pub fn new(root: Element) -> Self {
        Self::with_keys(root, NodeKeys::new())
    }

    pub fn with_keys(root: Element, keys: NodeKeys) -> Self {
        Self { root, keys }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// The key allocator, to share with the overlay host.
    pub fn keys(&self) -> NodeKeys {
        self.keys.clone()
    }

    fn document(&self) -> Result<Document, PlatformError> {
        self.root
            .owner_document()
            .ok_or_else(|| PlatformError::from("editor root is not in a document"))
    }

    fn lines(&self) -> Vec<Element> {
        let children = self.root.children();
        (0..children.length())
            .filter_map(|i| children.item(i))
            .collect()
    }

    fn line_by_key(&self, key: NodeKey) -> Result<Element, PlatformError> {
        self.lines()
            .into_iter()
            .find(|line| self.keys.key_of(line) == key)
            .ok_or_else(|| PlatformError(format!("no top-level node {}", key.0)))
    }

    fn find(&self, key: NodeKey) -> Result<Element, PlatformError> {
        find_keyed(&self.root, key).ok_or_else(|| PlatformError(format!("no node {}", key.0)))
    }

    fn locate(&self, index: usize) -> Option<(Element, usize)> {
        let mut start = 0;
        for line in self.lines() {
            let end = start + line_atoms(&line).len();
            if index <= end {
                return Some((line, index - start));
            }
            start = end + 1;
        }
        None
    }

    fn locate_or_append(&self, index: usize) -> Result<(Element, usize), PlatformError> {
        if let Some(pos) = self.locate(index) {
            return Ok(pos);
        }
        if index == self.len() {
            let doc = self.document()?;
            let line = doc.create_element("p").map_err(js_err)?;
            ensure_placeholder(&doc, &line)?;
            self.root.append_child(&line).map_err(js_err)?;
            return Ok((line, 0));
        }
        Err(PlatformError(format!(
            "index {index} is past the end ({})",
            self.len()
        )))
    }

    fn position(&self, line: &Element, offset: usize) -> Result<DomPosition, PlatformError> {
        let atoms = line_atoms(line);
        match atoms.into_iter().nth(offset) {
            Some(atom) => Ok(atom.at),
            None => line_end(line).ok_or_else(|| PlatformError::from("detached line")),
        }
    }

    /// Atoms of `line` that come before the boundary point `(node, offset)`.
    fn atoms_before(&self, line: &Element, node: &Node, offset: u32) -> Option<usize> {
        let atoms = line_atoms(line);
        if media_kind(line).is_some() {
            return Some(usize::from(offset > 0).min(atoms.len()));
        }
        let range = self.document().ok()?.create_range().ok()?;
        range.set_start(line, 0).ok()?;
        range.set_end(node, offset).ok()?;
        Some(
            atoms
                .iter()
                .filter(|a| !(same_node(&a.at.node, node) && a.at.offset == offset))
                .filter(|a| range.compare_point(&a.at.node, a.at.offset).is_ok_and(|c| c == 0))
                .count(),
        )
    }
}

impl RenderSurface for DomSurface {
    fn nodes(&self) -> Vec<SurfaceNode> {
        self.lines()
            .iter()
            .map(|line| {
                let media_elements = if media_kind(line).is_some() {
                    vec![line.clone()]
                } else {
                    line.query_selector_all(MEDIA_SELECTOR)
                        .map(|list| elements(&list))
                        .unwrap_or_default()
                };
                let media = media_elements
                    .iter()
                    .filter_map(|el| {
                        Some(MediaInfo {
                            key: self.keys.key_of(el),
                            kind: media_kind(el)?,
                            src: el.get_attribute("src").unwrap_or_default(),
                            visual: read_visual(el),
                        })
                    })
                    .collect();
                SurfaceNode {
                    key: self.keys.key_of(line),
                    block_id: line.get_attribute(BLOCK_ATTR).map(BlockId::new),
                    tag: SmolStr::new(line.local_name()),
                    html: clean_html(line),
                    text: line.text_content().unwrap_or_default(),
                    media,
                }
            })
            .collect()
    }

    fn tag_block(&mut self, node: NodeKey, id: &BlockId) -> Result<(), PlatformError> {
        self.line_by_key(node)?
            .set_attribute(BLOCK_ATTR, id.as_str())
            .map_err(js_err)
    }

    fn len(&self) -> usize {
        self.lines().iter().map(|l| line_atoms(l).len() + 1).sum()
    }

    fn atom_at(&self, index: usize) -> Option<Atom> {
        let (line, offset) = self.locate(index)?;
        Some(
            line_atoms(&line)
                .get(offset)
                .map(|a| a.atom)
                .unwrap_or(Atom::LineBreak),
        )
    }

    fn caret(&self) -> Option<usize> {
        let selection = self.document().ok()?.get_selection().ok()??;
        let anchor = selection.anchor_node()?;
        let offset = selection.anchor_offset();
        if !self.root.contains(Some(&anchor)) {
            return None;
        }

        let lines = self.lines();
        if same_node(&anchor, &self.root) {
            return Some(
                lines
                    .iter()
                    .take(offset as usize)
                    .map(|l| line_atoms(l).len() + 1)
                    .sum(),
            );
        }

        let mut start = 0;
        for line in &lines {
            if line.contains(Some(&anchor)) {
                return Some(start + self.atoms_before(line, &anchor, offset)?);
            }
            start += line_atoms(line).len() + 1;
        }
        None
    }

    fn set_caret(&mut self, index: usize) -> Result<(), PlatformError> {
        let (line, offset) = match self.locate(index) {
            Some(pos) => pos,
            None if index == self.len() => match self.lines().pop() {
                Some(last) => {
                    let end = line_atoms(&last).len();
                    (last, end)
                }
                None => return Ok(()),
            },
            None => return Err(PlatformError(format!("caret {index} is past the end"))),
        };
        let at = self.position(&line, offset)?;
        let selection = self
            .document()?
            .get_selection()
            .map_err(js_err)?
            .ok_or_else(|| PlatformError::from("no selection available"))?;
        selection
            .collapse_with_offset(Some(&at.node), at.offset)
            .map_err(js_err)
    }

    fn insert_line_break(&mut self, index: usize) -> Result<(), PlatformError> {
        let (line, offset) = self.locate_or_append(index)?;
        let doc = self.document()?;
        let next = doc.create_element("p").map_err(js_err)?;

        if media_kind(&line).is_some() {
            let before: Option<Node> = if offset == 0 {
                Some(line.clone().into())
            } else {
                line.next_sibling()
            };
            self.root
                .insert_before(&next, before.as_ref())
                .map_err(js_err)?;
            return ensure_placeholder(&doc, &next);
        }

        let from = self.position(&line, offset)?;
        let range = doc.create_range().map_err(js_err)?;
        range.set_start(&from.node, from.offset).map_err(js_err)?;
        range
            .set_end(&line, line.child_nodes().length())
            .map_err(js_err)?;
        let tail = range.extract_contents().map_err(js_err)?;
        next.append_child(&tail).map_err(js_err)?;
        self.root
            .insert_before(&next, line.next_sibling().as_ref())
            .map_err(js_err)?;

        for el in elements(&next.query_selector_all(&format!("[{KEY_ATTR}]")).map_err(js_err)?) {
            // Split-off copies of inline wrappers must not share keys.
            if media_kind(&el).is_none() {
                let _ = el.remove_attribute(KEY_ATTR);
            }
        }
        ensure_placeholder(&doc, &line)?;
        ensure_placeholder(&doc, &next)
    }

    fn insert_embed(&mut self, index: usize, embed: &Embed) -> Result<NodeKey, PlatformError> {
        let (line, offset) = self.locate_or_append(index)?;
        let doc = self.document()?;
        let el = create_media(&doc, embed)?;
        let key = self.keys.key_of(&el);

        if media_kind(&line).is_some() {
            let holder = doc.create_element("p").map_err(js_err)?;
            holder.append_child(&el).map_err(js_err)?;
            let before: Option<Node> = if offset == 0 {
                Some(line.clone().into())
            } else {
                line.next_sibling()
            };
            self.root
                .insert_before(&holder, before.as_ref())
                .map_err(js_err)?;
            return Ok(key);
        }

        let at = self.position(&line, offset)?;
        let range = doc.create_range().map_err(js_err)?;
        range.set_start(&at.node, at.offset).map_err(js_err)?;
        range.insert_node(&el).map_err(js_err)?;
        drop_placeholders(&line)?;
        Ok(key)
    }

    fn container_of(&self, media: NodeKey) -> Option<NodeKey> {
        let mut current = find_keyed(&self.root, media)?;
        loop {
            let parent = current.parent_element()?;
            if same_node(&parent, &self.root) {
                return Some(self.keys.key_of(&current));
            }
            current = parent;
        }
    }

    fn set_media_src(&mut self, media: NodeKey, src: &str) -> Result<(), PlatformError> {
        self.find(media)?.set_attribute("src", src).map_err(js_err)
    }

    fn set_visual(&mut self, media: NodeKey, visual: &VisualMeta) -> Result<(), PlatformError> {
        apply_visual(&self.find(media)?, visual)
    }

    fn remove_node(&mut self, node: NodeKey) -> Result<(), PlatformError> {
        self.find(node)?.remove();
        Ok(())
    }

    fn append_block(
        &mut self,
        kind: BlockKind,
        payload: &str,
        visual: &VisualMeta,
    ) -> Result<NodeKey, PlatformError> {
        let doc = self.document()?;
        let line = match kind {
            BlockKind::Text if payload.trim_start().starts_with('<') => {
                // One block is one line: markup with several top-level
                // nodes stays together inside a wrapper.
                let holder = doc.create_element("div").map_err(js_err)?;
                holder.set_inner_html(payload.trim());
                let line = match holder.first_element_child() {
                    Some(only) if holder.child_nodes().length() == 1 => only,
                    _ => holder,
                };
                self.root.append_child(&line).map_err(js_err)?;
                line
            }
            BlockKind::Text => {
                let p = doc.create_element("p").map_err(js_err)?;
                p.set_text_content(Some(payload));
                self.root.append_child(&p).map_err(js_err)?;
                p
            }
            BlockKind::Image | BlockKind::Video => {
                let kind = if kind == BlockKind::Image {
                    MediaKind::Image
                } else {
                    MediaKind::Video
                };
                let embed = Embed {
                    kind,
                    src: payload.to_owned(),
                    visual: *visual,
                };
                let p = doc.create_element("p").map_err(js_err)?;
                let media: Element = create_media(&doc, &embed)?;
                p.append_child(&media).map_err(js_err)?;
                self.root.append_child(&p).map_err(js_err)?;
                p
            }
        };
        Ok(self.keys.key_of(&line))
    }

    fn replace_children(&mut self, order: &[NodeKey]) -> Result<(), PlatformError> {
        let doc = self.document()?;
        let lines = self.lines();
        let mut picked: Vec<&Element> = Vec::with_capacity(order.len());
        for key in order {
            let line = lines
                .iter()
                .find(|l| self.keys.key_of(l) == *key)
                .ok_or_else(|| PlatformError(format!("no top-level node {}", key.0)))?;
            if picked.iter().any(|p| same_node(p, line)) {
                return Err(PlatformError(format!("node {} listed twice", key.0)));
            }
            picked.push(line);
        }

        let fragment = doc.create_document_fragment();
        for line in picked {
            fragment.append_child(line).map_err(js_err)?;
        }
        while let Some(child) = self.root.first_child() {
            self.root.remove_child(&child).map_err(js_err)?;
        }
        self.root.append_child(&fragment).map_err(js_err)?;
        Ok(())
    }
}
