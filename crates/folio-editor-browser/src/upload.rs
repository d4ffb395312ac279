//! Upload through a host-provided JavaScript function.

use folio_editor_core::{EncodedImage, ImageUploader, PlatformError};
use js_sys::{Function, Promise, Uint8Array};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

/// Calls `upload(bytes: Uint8Array, mime: string)`, which may return a URL
/// string, `null`, or a promise of either. `null` means "embed the data
/// directly".
#[derive(Debug, Clone)]
pub struct JsUploader {
    upload: Function,
}

impl JsUploader {
    pub fn new(upload: Function) -> Self {
        Self { upload }
    }
}

impl ImageUploader for JsUploader {
    async fn upload(&self, image: &EncodedImage) -> Result<Option<String>, PlatformError> {
        let bytes = Uint8Array::from(image.bytes.as_ref());
        let returned = self
            .upload
            .call2(&JsValue::NULL, &bytes, &JsValue::from_str(&image.mime))
            .map_err(|e| PlatformError(format!("upload callback threw: {e:?}")))?;
        let url = JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(|e| PlatformError(format!("upload rejected: {e:?}")))?;
        Ok(url.as_string())
    }
}
