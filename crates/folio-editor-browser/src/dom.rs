//! Small DOM helpers shared by the surface and the overlay host.

use std::cell::Cell;
use std::rc::Rc;

use folio_editor_core::{MediaKind, NodeKey, PlatformError};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, Node, NodeList};

/// Attribute carrying the node key minted for an element.
pub const KEY_ATTR: &str = "data-folio-key";
/// Attribute carrying the block id of a top-level node.
pub const BLOCK_ATTR: &str = "data-block-id";
/// Selector matching every media element.
pub const MEDIA_SELECTOR: &str = "img, iframe";

pub(crate) fn js_err(e: JsValue) -> PlatformError {
    PlatformError(format!("{e:?}"))
}

/// Hands out node keys and stamps them onto elements.
///
/// The surface and the overlay host share one allocator so both see the same
/// key for the same element.
#[derive(Debug, Clone, Default)]
pub struct NodeKeys(Rc<Cell<u64>>);

impl NodeKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of `el`, stamping a fresh one if it has none yet.
    pub fn key_of(&self, el: &Element) -> NodeKey {
        if let Some(key) = el.get_attribute(KEY_ATTR).and_then(|k| k.parse::<u64>().ok()) {
            self.0.set(self.0.get().max(key));
            return NodeKey(key);
        }
        let key = self.0.get() + 1;
        self.0.set(key);
        if let Err(e) = el.set_attribute(KEY_ATTR, &key.to_string()) {
            tracing::warn!(error = ?e, "could not stamp node key");
        }
        NodeKey(key)
    }
}

/// Element under `root` carrying `key`.
pub fn find_keyed(root: &Element, key: NodeKey) -> Option<Element> {
    root.query_selector(&format!("[{KEY_ATTR}=\"{}\"]", key.0))
        .ok()
        .flatten()
}

pub fn media_kind(el: &Element) -> Option<MediaKind> {
    match el.local_name().as_str() {
        "img" => Some(MediaKind::Image),
        "iframe" => Some(MediaKind::Video),
        _ => None,
    }
}

pub fn elements(list: &NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|n| n.dyn_into::<Element>().ok())
        .collect()
}

pub fn same_node(a: &Node, b: &Node) -> bool {
    a.is_same_node(Some(b))
}

/// Parse a computed CSS length such as `12.5px`.
pub fn parse_px(value: &str) -> f64 {
    value
        .trim()
        .trim_end_matches("px")
        .parse()
        .unwrap_or(0.0)
}
