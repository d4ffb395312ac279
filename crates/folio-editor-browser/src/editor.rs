//! Mounting the editor on a page and routing DOM events into it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use folio_editor_core::{
    BlockEditor, BlockId, EditorConfig, EditorError, ImageFile, ImageTarget, Ingestor,
    PersistedDocument, RasterCodec,
};
use gloo_events::EventListener;
use gloo_timers::callback::Timeout;
use js_sys::Uint8Array;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Element, File, HtmlElement};
use web_time::Instant;

use crate::dom::NodeKeys;
use crate::layout::DomOverlayHost;
use crate::notify::ToastNotifier;
use crate::pointer::{PointerSignal, point_of};
use crate::surface::DomSurface;
use crate::upload::JsUploader;

pub type DomEditor = BlockEditor<DomSurface, DomOverlayHost, ToastNotifier>;

fn to_js(e: EditorError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn element_by_id(id: &str) -> Result<Element, JsValue> {
    gloo_utils::document()
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("no element with id {id:?}")))
}

fn html_element_by_id(id: &str) -> Result<HtmlElement, JsValue> {
    element_by_id(id)?
        .dyn_into::<HtmlElement>()
        .map_err(|_| JsValue::from_str(&format!("element {id:?} is not an HTML element")))
}

/// Runs `f` against the editor unless it is already borrowed.
///
/// DOM events can arrive while an editor call is still on the stack (focus
/// changes during a surface edit, for instance); those are dropped.
fn dispatch(editor: &Weak<RefCell<DomEditor>>, f: impl FnOnce(&mut DomEditor)) {
    let Some(editor) = editor.upgrade() else {
        return;
    };
    match editor.try_borrow_mut() {
        Ok(mut editor) => f(&mut editor),
        Err(_) => tracing::trace!("editor busy, event dropped"),
    };
}

/// A mounted editor and the listeners feeding it.
///
/// Dropping the handle removes every listener it installed.
pub struct EditorHandle {
    inner: Rc<RefCell<DomEditor>>,
    ingestor: Ingestor<RasterCodec>,
    uploader: Option<JsUploader>,
    _listeners: Vec<EventListener>,
    _quiet: Rc<RefCell<Option<Timeout>>>,
}

impl EditorHandle {
    /// Mount on the elements with the given ids: the contenteditable root,
    /// the media control panel and the toast.
    pub fn mount(
        root_id: &str,
        panel_id: &str,
        toast_id: &str,
        config: EditorConfig,
    ) -> Result<Self, JsValue> {
        let root = element_by_id(root_id)?;
        let panel = html_element_by_id(panel_id)?;
        let toast = html_element_by_id(toast_id)?;

        let keys = NodeKeys::new();
        let surface = DomSurface::with_keys(root.clone(), keys.clone());
        let host = DomOverlayHost::new(root.clone(), panel.clone(), keys);
        let quiet_ms = config.overlay.typing_quiet_ms;
        let editor = BlockEditor::new(surface, host, ToastNotifier::new(toast), config);
        let inner = Rc::new(RefCell::new(editor));

        let weak = Rc::downgrade(&inner);
        let on_frame: Rc<dyn Fn()> = {
            let weak = weak.clone();
            Rc::new(move || {
                dispatch(&weak, |editor| {
                    if let Err(e) = editor.frame() {
                        tracing::warn!(error = %e, "frame update failed");
                    }
                })
            })
        };
        let on_pointer: Rc<dyn Fn(PointerSignal)> = {
            let weak = weak.clone();
            Rc::new(move |signal: PointerSignal| {
                dispatch(&weak, |editor| match signal {
                    PointerSignal::Move(point) => {
                        editor.pointer_moved(point, Instant::now());
                    }
                    PointerSignal::Up(point) => {
                        if editor.overlay().is_locked() {
                            editor.end_interaction(point, Instant::now());
                        }
                    }
                })
            })
        };
        inner
            .borrow_mut()
            .overlay_mut()
            .host_mut()
            .set_callbacks(on_frame, on_pointer);

        // While tracking, the document listener installed by the overlay
        // sees every move; this one only has to notice the first entry.
        let entered = {
            let weak = weak.clone();
            EventListener::new(&root, "pointermove", move |event| {
                let Some(point) = point_of(event) else {
                    return;
                };
                dispatch(&weak, |editor| {
                    if !editor.overlay().is_tracking() {
                        editor.pointer_moved(point, Instant::now());
                    }
                });
            })
        };

        let grabbed = {
            let weak = weak.clone();
            EventListener::new(&panel, "pointerdown", move |_| {
                dispatch(&weak, |editor| editor.begin_interaction());
            })
        };

        let quiet: Rc<RefCell<Option<Timeout>>> = Rc::new(RefCell::new(None));
        let typed = {
            let weak = weak.clone();
            let quiet = quiet.clone();
            EventListener::new(&root, "input", move |_| {
                dispatch(&weak, |editor| {
                    editor.text_changed(Instant::now());
                });
                let weak = weak.clone();
                *quiet.borrow_mut() = Some(Timeout::new(quiet_ms.saturating_add(1) as u32, move || {
                    dispatch(&weak, |editor| match editor.tick(Instant::now()) {
                        Ok(true) => tracing::debug!("leading media hoisted"),
                        Ok(false) => {}
                        Err(e) => tracing::warn!(error = %e, "deferred update failed"),
                    });
                }));
            })
        };

        tracing::info!(root = root_id, "editor mounted");
        Ok(Self {
            inner,
            ingestor: Ingestor::new(),
            uploader: None,
            _listeners: vec![entered, grabbed, typed],
            _quiet: quiet,
        })
    }

    /// Route encoded images through `upload` instead of embedding them as
    /// data URLs.
    pub fn with_uploader(mut self, upload: js_sys::Function) -> Self {
        self.uploader = Some(JsUploader::new(upload));
        self
    }

    /// Borrow the editor for a synchronous operation.
    ///
    /// Fails instead of panicking when the editor is already borrowed, as
    /// happens when host JS calls back in from inside an editor event.
    pub fn with<R>(&self, f: impl FnOnce(&mut DomEditor) -> R) -> Result<R, JsValue> {
        let mut editor = self
            .inner
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("editor is busy"))?;
        Ok(f(&mut editor))
    }

    pub fn insert_video(&self, raw: &str) -> Result<BlockId, JsValue> {
        self.with(|editor| editor.insert_video(raw))?.map_err(to_js)
    }

    /// Ingest a picked file and embed it.
    ///
    /// Oversized files are refused from their declared size, before any
    /// bytes are read. The editor is only borrowed before and after the
    /// ingestion, so it keeps handling events while the image is encoded and
    /// uploaded.
    pub async fn insert_image(&self, file: File, replace: Option<BlockId>) -> Result<Option<BlockId>, JsValue> {
        self.with(|editor| editor.check_image_size(file.size() as u64))?
            .map_err(to_js)?;

        let buffer = JsFuture::from(file.array_buffer()).await?;
        let bytes = Uint8Array::new(&buffer).to_vec();
        let image = ImageFile::new(file.name(), bytes);
        let target = match replace {
            Some(block) => ImageTarget::Replace(block),
            None => ImageTarget::Insert,
        };

        let job = self
            .with(|editor| editor.prepare_image(image, target))?
            .map_err(to_js)?;
        let result = match &self.uploader {
            Some(uploader) => job.run(&self.ingestor, uploader).await,
            None => job.run(&self.ingestor, &()).await,
        };
        self.with(|editor| editor.complete_image(job, result))?
            .map_err(to_js)
    }

    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        self.with(|editor| editor.snapshot().and_then(|doc| doc.to_json()))?
            .map_err(to_js)
    }

    pub fn load_json(&self, json: &str) -> Result<(), JsValue> {
        self.with(|editor| {
            let document = PersistedDocument::from_json(json, &editor.config().document)?;
            editor.load(&document)
        })?
        .map_err(to_js)
    }
}
