//! Browser DOM layer for the folio block editor.
//!
//! This crate implements the platform traits of `folio-editor-core` over a
//! contenteditable element and wires DOM events into a
//! [`BlockEditor`](folio_editor_core::BlockEditor). It assumes a
//! `wasm32-unknown-unknown` target environment.
//!
//! # Architecture
//!
//! - `surface`: [`RenderSurface`](folio_editor_core::RenderSurface) over the editable root
//! - `layout`: layout measurement and the floating media panel
//! - `frame`, `pointer`: owned animation-frame and pointer listener handles
//! - `notify`: toast notices
//! - `upload`: image upload through a host JavaScript function
//! - `editor`: mounting and event routing
//!
//! # Re-exports
//!
//! This crate re-exports `folio-editor-core` for convenience, so consumers
//! only need to depend on `folio-editor-browser`.

// Re-export core crate
pub use folio_editor_core;
pub use folio_editor_core::*;

pub mod dom;
pub mod editor;
pub mod frame;
pub mod layout;
pub mod notify;
pub mod pointer;
pub mod surface;
pub mod upload;

pub use editor::{DomEditor, EditorHandle};
pub use layout::DomOverlayHost;
pub use notify::ToastNotifier;
pub use surface::DomSurface;
pub use upload::JsUploader;

/// Install the panic hook and route `tracing` output to the browser console.
///
/// Call once, before mounting.
pub fn init_tracing() {
    use tracing::Level;
    use tracing::subscriber::set_global_default;
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::SubscriberExt;

    console_error_panic_hook::set_once();

    let console_level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let wasm_layer = tracing_wasm::WASMLayer::new(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(console_level)
            .build(),
    );

    let _ = set_global_default(Registry::default().with(wasm_layer));
}
