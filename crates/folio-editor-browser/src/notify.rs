//! Toast notifications.

use std::cell::RefCell;

use folio_editor_core::{Notice, Notifier};
use gloo_timers::callback::Timeout;
use web_sys::HtmlElement;

const VISIBLE_CLASS: &str = "visible";

/// Shows each notice in a toast element for a fixed time.
pub struct ToastNotifier {
    toast: HtmlElement,
    duration_ms: u32,
    hide: RefCell<Option<Timeout>>,
}

impl ToastNotifier {
    pub const DEFAULT_DURATION_MS: u32 = 2500;

    pub fn new(toast: HtmlElement) -> Self {
        Self::with_duration(toast, Self::DEFAULT_DURATION_MS)
    }

    pub fn with_duration(toast: HtmlElement, duration_ms: u32) -> Self {
        Self {
            toast,
            duration_ms,
            hide: RefCell::new(None),
        }
    }
}

impl Notifier for ToastNotifier {
    fn notify(&self, notice: Notice) {
        tracing::info!(%notice, "notice");
        self.toast.set_text_content(Some(&notice.to_string()));
        let _ = self.toast.class_list().add_1(VISIBLE_CLASS);

        let toast = self.toast.clone();
        // Replacing the timeout cancels the previous one.
        *self.hide.borrow_mut() = Some(Timeout::new(self.duration_ms, move || {
            let _ = toast.class_list().remove_1(VISIBLE_CLASS);
        }));
    }
}
