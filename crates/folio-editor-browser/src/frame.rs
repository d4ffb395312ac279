//! `requestAnimationFrame` loop as an owned handle.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut()>>>>;

/// Calls a callback once per display frame until dropped.
#[derive(Default)]
pub struct FrameLoop {
    running: Option<Running>,
}

struct Running {
    request: Rc<Cell<Option<i32>>>,
    callback: FrameCallback,
}

fn request(closure: &Closure<dyn FnMut()>) -> Option<i32> {
    let window = web_sys::window()?;
    window
        .request_animation_frame(closure.as_ref().unchecked_ref())
        .map_err(|e| tracing::warn!(error = ?e, "requestAnimationFrame failed"))
        .ok()
}

impl FrameLoop {
    /// A loop that never fires, for hosts without a frame callback.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn start(on_frame: Rc<dyn Fn()>) -> Self {
        let request_id = Rc::new(Cell::new(None));
        let callback: FrameCallback = Rc::new(RefCell::new(None));

        let next = request_id.clone();
        let slot = callback.clone();
        *callback.borrow_mut() = Some(Closure::new(move || {
            next.set(None);
            on_frame();
            // Dropping the loop inside `on_frame` empties the slot.
            if let Some(closure) = slot.borrow().as_ref() {
                next.set(request(closure));
            }
        }));

        if let Some(closure) = callback.borrow().as_ref() {
            request_id.set(request(closure));
        }
        tracing::trace!("frame loop started");
        Self {
            running: Some(Running {
                request: request_id,
                callback,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        if let (Some(id), Some(window)) = (running.request.take(), web_sys::window()) {
            let _ = window.cancel_animation_frame(id);
        }
        // Breaks the closure's reference to its own slot.
        running.callback.borrow_mut().take();
        tracing::trace!("frame loop stopped");
    }
}
