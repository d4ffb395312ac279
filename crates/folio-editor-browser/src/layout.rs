//! Layout measurement and the floating control panel.

use std::rc::Rc;

use folio_editor_core::{
    Insets, MediaGeometry, MediaKind, NodeKey, OverlayHost, PanelPlacement, Rect, Size,
    TrackedMediaElement,
};
use wasm_bindgen::JsCast;
use web_sys::{CssStyleDeclaration, Element, HtmlElement, HtmlImageElement};

use crate::dom::{MEDIA_SELECTOR, NodeKeys, elements, find_keyed, media_kind, parse_px};
use crate::frame::FrameLoop;
use crate::pointer::{PointerListener, PointerSignal};

fn insets(style: &CssStyleDeclaration, property: impl Fn(&str) -> String) -> Insets {
    let side = |name: &str| parse_px(&style.get_property_value(&property(name)).unwrap_or_default());
    Insets::new(side("top"), side("right"), side("bottom"), side("left"))
}

/// [`OverlayHost`] over the live DOM.
///
/// The frame and pointer callbacks are installed by the owner once the
/// editor exists; until then the loops it starts never fire.
pub struct DomOverlayHost {
    root: Element,
    panel: HtmlElement,
    keys: NodeKeys,
    on_frame: Option<Rc<dyn Fn()>>,
    on_pointer: Option<Rc<dyn Fn(PointerSignal)>>,
}

impl DomOverlayHost {
    pub fn new(root: Element, panel: HtmlElement, keys: NodeKeys) -> Self {
        let style = panel.style();
        let _ = style.set_property("position", "fixed");
        panel.set_hidden(true);
        Self {
            root,
            panel,
            keys,
            on_frame: None,
            on_pointer: None,
        }
    }

    pub fn set_callbacks(&mut self, on_frame: Rc<dyn Fn()>, on_pointer: Rc<dyn Fn(PointerSignal)>) {
        self.on_frame = Some(on_frame);
        self.on_pointer = Some(on_pointer);
    }

    pub fn panel(&self) -> &HtmlElement {
        &self.panel
    }

    fn geometry(&self, el: &Element) -> Option<MediaGeometry> {
        if !el.is_connected() {
            return None;
        }
        let kind = media_kind(el)?;
        let rect = el.get_bounding_client_rect();
        let bounds = Rect::new(rect.left(), rect.top(), rect.width(), rect.height());

        let style = web_sys::window()?.get_computed_style(el).ok().flatten();
        let (padding, border) = match &style {
            Some(style) => (
                insets(style, |side| format!("padding-{side}")),
                insets(style, |side| format!("border-{side}-width")),
            ),
            None => (Insets::default(), Insets::default()),
        };

        let natural_width = match kind {
            MediaKind::Image => el
                .dyn_ref::<HtmlImageElement>()
                .map(|img| f64::from(img.natural_width()))
                .filter(|w| *w > 0.0)
                .unwrap_or(bounds.width),
            MediaKind::Video => bounds.width,
        };

        Some(MediaGeometry {
            key: self.keys.key_of(el),
            kind,
            bounds,
            padding,
            border,
            natural_width,
        })
    }
}

impl OverlayHost for DomOverlayHost {
    type FrameLoop = FrameLoop;
    type PointerListener = PointerListener;

    fn media_elements(&self) -> Vec<MediaGeometry> {
        self.root
            .query_selector_all(MEDIA_SELECTOR)
            .map(|list| elements(&list))
            .unwrap_or_default()
            .iter()
            .filter_map(|el| self.geometry(el))
            .collect()
    }

    fn measure(&self, media: NodeKey) -> Option<MediaGeometry> {
        self.geometry(&find_keyed(&self.root, media)?)
    }

    fn panel_rect(&self) -> Option<Rect> {
        if self.panel.hidden() {
            return None;
        }
        let rect = self.panel.get_bounding_client_rect();
        Some(Rect::new(rect.left(), rect.top(), rect.width(), rect.height()))
    }

    fn viewport(&self) -> Size {
        let Some(window) = web_sys::window() else {
            return Size::default();
        };
        let dimension = |v: Result<wasm_bindgen::JsValue, wasm_bindgen::JsValue>| {
            v.ok().and_then(|v| v.as_f64()).unwrap_or(0.0)
        };
        Size::new(dimension(window.inner_width()), dimension(window.inner_height()))
    }

    fn show_panel(&mut self, placement: PanelPlacement, target: &TrackedMediaElement) {
        let style = self.panel.style();
        let _ = style.set_property("left", &format!("{}px", placement.left));
        let _ = style.set_property("top", &format!("{}px", placement.top));
        let kind = match target.kind {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        };
        let _ = self.panel.set_attribute("data-kind", kind);
        let _ = self
            .panel
            .class_list()
            .toggle_with_force("pm-panel-eligible", target.eligible_for_padding);
        self.panel.set_hidden(false);
    }

    fn hide_panel(&mut self) {
        self.panel.set_hidden(true);
    }

    fn start_frame_loop(&mut self) -> FrameLoop {
        match &self.on_frame {
            Some(on_frame) => FrameLoop::start(on_frame.clone()),
            None => FrameLoop::idle(),
        }
    }

    fn listen_pointer(&mut self) -> PointerListener {
        let document = self.root.owner_document();
        match (&self.on_pointer, document) {
            (Some(on_pointer), Some(document)) => PointerListener::listen(&document, on_pointer.clone()),
            _ => PointerListener::idle(),
        }
    }
}
