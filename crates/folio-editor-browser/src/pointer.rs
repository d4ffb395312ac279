//! Document-level pointer listening.

use std::rc::Rc;

use folio_editor_core::Point;
use gloo_events::EventListener;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventTarget, MouseEvent};

/// What the pointer did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerSignal {
    Move(Point),
    Up(Point),
}

pub fn point_of(event: &Event) -> Option<Point> {
    let mouse = event.dyn_ref::<MouseEvent>()?;
    Some(Point::new(
        f64::from(mouse.client_x()),
        f64::from(mouse.client_y()),
    ))
}

/// Passive `pointermove`/`pointerup` listeners, removed on drop.
#[derive(Default)]
pub struct PointerListener {
    listeners: Vec<EventListener>,
}

impl PointerListener {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn listen(target: &EventTarget, on_signal: Rc<dyn Fn(PointerSignal)>) -> Self {
        let on_move = on_signal.clone();
        let moved = EventListener::new(target, "pointermove", move |event| {
            if let Some(point) = point_of(event) {
                on_move(PointerSignal::Move(point));
            }
        });
        let released = EventListener::new(target, "pointerup", move |event| {
            if let Some(point) = point_of(event) {
                on_signal(PointerSignal::Up(point));
            }
        });
        Self {
            listeners: vec![moved, released],
        }
    }

    pub fn is_listening(&self) -> bool {
        !self.listeners.is_empty()
    }
}
