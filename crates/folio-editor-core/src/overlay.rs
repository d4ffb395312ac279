//! Floating control panel tracking.
//!
//! The controller decides which media element (if any) the control panel is
//! attached to. It is `Idle` until a pointer move lands inside exactly one
//! media element's content rectangle, then `Tracking` that element: every
//! display frame it re-measures and repositions the panel, and it returns
//! to `Idle` when the pointer leaves both the element and the panel, when the
//! element detaches, or when the user starts typing.
//!
//! The per-frame callback and the document pointer listener are owned by the
//! `Tracking` state. Leaving it drops them, which releases them on the host.

use std::time::Duration;

use web_time::Instant;

use crate::config::OverlayConfig;
use crate::platform::{MediaGeometry, OverlayHost};
use crate::types::{MediaKind, NodeKey, Point, Rect, Size};

/// The media element the panel is attached to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedMediaElement {
    pub key: NodeKey,
    pub kind: MediaKind,
    /// Bounding box minus padding, and minus border for video frames.
    pub content_rect: Rect,
    pub natural_width: f64,
    pub eligible_for_padding: bool,
}

/// Top-left corner of the panel in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelPlacement {
    pub left: f64,
    pub top: f64,
}

/// Region of a media element that counts as "over" it.
pub fn content_rect(geometry: &MediaGeometry) -> Rect {
    match geometry.kind {
        MediaKind::Image => geometry.bounds.inset(geometry.padding),
        MediaKind::Video => geometry.bounds.inset(geometry.padding.add(geometry.border)),
    }
}

/// Panel position: `offset` above the content's top edge, horizontally
/// centred on it, then clamped into the viewport with `margin` to spare.
pub fn place_panel(content: Rect, panel: Size, viewport: Size, offset: f64, margin: f64) -> PanelPlacement {
    let left = clamp_axis(content.center_x() - panel.width / 2.0, panel.width, viewport.width, margin);
    let top = clamp_axis(content.top() - offset, panel.height, viewport.height, margin);
    PanelPlacement { left, top }
}

fn clamp_axis(start: f64, extent: f64, available: f64, margin: f64) -> f64 {
    let max = available - margin - extent;
    if max < margin {
        return margin;
    }
    start.clamp(margin, max)
}

struct Tracking<H: OverlayHost> {
    element: TrackedMediaElement,
    locked: bool,
    _frame_loop: H::FrameLoop,
    _pointer: H::PointerListener,
}

enum State<H: OverlayHost> {
    Idle,
    Tracking(Tracking<H>),
}

/// What a call changed, for callers that need to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEvent {
    None,
    Entered(NodeKey),
    Exited(NodeKey),
    /// Left one element and entered another in the same move.
    Switched { from: NodeKey, to: NodeKey },
}

pub struct OverlayController<H: OverlayHost> {
    host: H,
    config: OverlayConfig,
    min_width_px: f64,
    state: State<H>,
    suspended_until: Option<Instant>,
}

impl<H: OverlayHost> OverlayController<H> {
    pub fn new(host: H, config: OverlayConfig, min_width_px: u32) -> Self {
        Self {
            host,
            config,
            min_width_px: f64::from(min_width_px),
            state: State::Idle,
            suspended_until: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn tracked(&self) -> Option<&TrackedMediaElement> {
        match &self.state {
            State::Tracking(t) => Some(&t.element),
            State::Idle => None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, State::Tracking(_))
    }

    pub fn is_locked(&self) -> bool {
        matches!(&self.state, State::Tracking(t) if t.locked)
    }

    /// True while typing keeps tracking suspended.
    pub fn is_suspended(&self, now: Instant) -> bool {
        self.suspended_until.is_some_and(|until| now < until)
    }

    fn track(&self, geometry: &MediaGeometry) -> TrackedMediaElement {
        TrackedMediaElement {
            key: geometry.key,
            kind: geometry.kind,
            content_rect: content_rect(geometry),
            natural_width: geometry.natural_width,
            eligible_for_padding: geometry.natural_width >= self.min_width_px,
        }
    }

    fn placement(&self, element: &TrackedMediaElement) -> PanelPlacement {
        let panel = self
            .host
            .panel_rect()
            .filter(Rect::is_renderable)
            .map(|r| Size::new(r.width, r.height))
            .unwrap_or(Size::new(self.config.panel_width_px, self.config.panel_height_px));
        place_panel(
            element.content_rect,
            panel,
            self.host.viewport(),
            self.config.anchor_offset_px,
            self.config.viewport_margin_px,
        )
    }

    /// Handle a pointer move anywhere in the document.
    pub fn on_pointer_move(&mut self, point: Point, now: Instant) -> OverlayEvent {
        if self.is_suspended(now) {
            return OverlayEvent::None;
        }
        self.suspended_until = None;

        let exited = match &self.state {
            State::Tracking(t) if t.locked => return OverlayEvent::None,
            State::Tracking(t) => {
                let over_panel = self.host.panel_rect().is_some_and(|r| r.contains(point));
                if t.element.content_rect.contains(point) || over_panel {
                    return OverlayEvent::None;
                }
                let key = t.element.key;
                self.exit();
                Some(key)
            }
            State::Idle => None,
        };

        match (exited, self.try_enter(point)) {
            (Some(from), Some(to)) => OverlayEvent::Switched { from, to },
            (Some(from), None) => OverlayEvent::Exited(from),
            (None, Some(to)) => OverlayEvent::Entered(to),
            (None, None) => OverlayEvent::None,
        }
    }

    fn try_enter(&mut self, point: Point) -> Option<NodeKey> {
        let mut hits = self
            .host
            .media_elements()
            .into_iter()
            .filter(|g| content_rect(g).is_renderable() && content_rect(g).contains(point));
        let hit = hits.next()?;
        if hits.next().is_some() {
            tracing::trace!(?point, "pointer over overlapping media, not tracking");
            return None;
        }

        let element = self.track(&hit);
        let placement = self.placement(&element);
        self.host.show_panel(placement, &element);
        let frame_loop = self.host.start_frame_loop();
        let pointer = self.host.listen_pointer();
        self.state = State::Tracking(Tracking {
            element,
            locked: false,
            _frame_loop: frame_loop,
            _pointer: pointer,
        });
        tracing::debug!(media = element.key.0, kind = ?element.kind, "overlay tracking");
        Some(element.key)
    }

    fn exit(&mut self) {
        if let State::Tracking(t) = std::mem::replace(&mut self.state, State::Idle) {
            self.host.hide_panel();
            tracing::debug!(media = t.element.key.0, "overlay idle");
        }
    }

    /// Per-frame update while tracking: re-measure and reposition.
    pub fn on_frame(&mut self) -> OverlayEvent {
        let key = match &self.state {
            State::Tracking(t) => t.element.key,
            State::Idle => return OverlayEvent::None,
        };

        let Some(geometry) = self.host.measure(key) else {
            self.exit();
            return OverlayEvent::Exited(key);
        };
        let element = self.track(&geometry);
        let placement = self.placement(&element);
        if let State::Tracking(t) = &mut self.state {
            t.element = element;
        }
        self.host.show_panel(placement, &element);
        OverlayEvent::None
    }

    /// A control in the panel started a drag.
    pub fn begin_interaction(&mut self) {
        if let State::Tracking(t) = &mut self.state {
            t.locked = true;
        }
    }

    /// The drag ended at `point`: release the lock and re-check exit there.
    pub fn end_interaction(&mut self, point: Point, now: Instant) -> OverlayEvent {
        match &mut self.state {
            State::Tracking(t) if t.locked => t.locked = false,
            _ => return OverlayEvent::None,
        }
        self.on_pointer_move(point, now)
    }

    /// The user typed. Hide the panel and stay idle until the quiet period
    /// has passed.
    pub fn on_text_change(&mut self, now: Instant) -> OverlayEvent {
        self.suspended_until = Some(now + self.config.typing_quiet());
        match &self.state {
            State::Tracking(t) => {
                let key = t.element.key;
                self.exit();
                OverlayEvent::Exited(key)
            }
            State::Idle => OverlayEvent::None,
        }
    }

    /// Drop tracking unconditionally, e.g. when the element was removed.
    pub fn reset(&mut self) {
        self.exit();
    }

    pub fn quiet_period(&self) -> Duration {
        self.config.typing_quiet()
    }
}
