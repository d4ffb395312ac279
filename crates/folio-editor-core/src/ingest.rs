//! Image ingestion: validation, downscaling and re-encoding.
//!
//! Files are checked against an [`IngestPolicy`] before any decoding happens.
//! Accepted files are decoded, scaled so the longer edge fits the policy's
//! bound, and re-encoded. Failures past validation are never fatal: the
//! original bytes are embedded as-is.

use std::collections::HashMap;
use std::io::Cursor;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::{WebPDecoder, WebPEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use mime_sniffer::MimeTypeSniffer;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{EditorError, Result};
use crate::perf::TimingGuard;
use crate::platform::ImageUploader;
use crate::types::BlockId;

const MIB: u64 = 1024 * 1024;

/// Acceptance and re-encoding rules for one ingestion flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestPolicy {
    pub max_bytes: u64,
    /// Lowercase extensions, without the dot.
    pub allowed_extensions: Vec<SmolStr>,
    /// Reject GIFs and animated WebP regardless of extension.
    pub reject_animated: bool,
    /// Bound for the longer edge after scaling.
    pub max_edge_px: u32,
    /// Encoder quality, 1..=100.
    pub quality: u8,
}

impl IngestPolicy {
    /// Images added from the picker or replaced in place.
    pub fn insert() -> Self {
        Self {
            max_bytes: 10 * MIB,
            allowed_extensions: ["jpg", "jpeg", "png", "webp"]
                .into_iter()
                .map(SmolStr::new_static)
                .collect(),
            reject_animated: false,
            max_edge_px: 1600,
            quality: 85,
        }
    }

    /// The project cover image.
    pub fn cover() -> Self {
        Self {
            max_bytes: 5 * MIB,
            reject_animated: true,
            ..Self::insert()
        }
    }

    /// Check a declared file size before any bytes are read.
    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_bytes {
            return Err(EditorError::FileTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Check a file without decoding it.
    pub fn validate(&self, file: &ImageFile) -> Result<()> {
        self.check_size(file.bytes.len() as u64)?;

        let extension = file.extension();
        if !self.allowed_extensions.iter().any(|e| *e == extension) {
            return Err(EditorError::DisallowedFileType { extension });
        }

        if self.reject_animated && is_animated(&file.bytes) {
            return Err(EditorError::DisallowedFileType { extension });
        }
        Ok(())
    }
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self::insert()
    }
}

/// GIF by content, or WebP whose header declares an animation.
fn is_animated(bytes: &Bytes) -> bool {
    if bytes.sniff_mime_type() == Some("image/gif") {
        return true;
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::Gif) => true,
        Ok(ImageFormat::WebP) => WebPDecoder::new(Cursor::new(bytes.as_ref()))
            .map(|d| d.has_animation())
            .unwrap_or(false),
        _ => false,
    }
}

/// A file picked by the user.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: SmolStr,
    pub bytes: Bytes,
}

impl ImageFile {
    pub fn new(name: impl Into<SmolStr>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercased extension, empty when the name has none.
    pub fn extension(&self) -> SmolStr {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => SmolStr::new(ext.to_ascii_lowercase()),
            _ => SmolStr::default(),
        }
    }

    /// The original bytes as a `data:` URL.
    pub fn data_url(&self) -> String {
        let mime = self
            .bytes
            .sniff_mime_type()
            .unwrap_or("application/octet-stream");
        data_url(mime, &self.bytes)
    }
}

/// Output of a successful re-encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub mime: SmolStr,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        data_url(&self.mime, &self.bytes)
    }
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// What the block model embeds.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddableImage {
    /// Durable URL or self-contained `data:` URL.
    pub src: String,
    /// Decoded width before scaling. `None` when decoding failed.
    pub original_width: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Decodes, scales and re-encodes raster images.
pub trait ImageCodec {
    fn reencode(&self, bytes: &[u8], policy: &IngestPolicy) -> Result<EncodedImage>;
}

impl<T: ImageCodec> ImageCodec for &T {
    fn reencode(&self, bytes: &[u8], policy: &IngestPolicy) -> Result<EncodedImage> {
        (*self).reencode(bytes, policy)
    }
}

/// [`ImageCodec`] over the `image` crate.
///
/// Opaque images become JPEG at the policy quality, images with an alpha
/// channel become lossless WebP.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn reencode(&self, bytes: &[u8], policy: &IngestPolicy) -> Result<EncodedImage> {
        let decoded = image::load_from_memory(bytes).map_err(decode_failure)?;
        let (original_width, original_height) = (decoded.width(), decoded.height());
        let (width, height) = scaled_size(original_width, original_height, policy.max_edge_px);

        let scaled = if (width, height) == (original_width, original_height) {
            decoded
        } else {
            decoded.resize_exact(width, height, FilterType::Lanczos3)
        };

        let mut out = Vec::new();
        let mime = if scaled.has_alpha() {
            DynamicImage::ImageRgba8(scaled.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut out))
                .map_err(decode_failure)?;
            "image/webp"
        } else {
            DynamicImage::ImageRgb8(scaled.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut out, policy.quality))
                .map_err(decode_failure)?;
            "image/jpeg"
        };

        Ok(EncodedImage {
            bytes: Bytes::from(out),
            mime: SmolStr::new_static(mime),
            width,
            height,
            original_width,
            original_height,
        })
    }
}

fn decode_failure(e: image::ImageError) -> EditorError {
    EditorError::IngestionDecodeFailure(e.to_string())
}

/// Size after bounding the longer edge. Never upscales, never reaches zero.
pub fn scaled_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max_edge || longer == 0 {
        return (width, height);
    }
    let scale = f64::from(max_edge) / f64::from(longer);
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w.min(max_edge), h.min(max_edge))
}

/// Runs files through validation, the codec and the optional uploader.
#[derive(Debug, Clone, Default)]
pub struct Ingestor<C = RasterCodec> {
    codec: C,
}

impl Ingestor<RasterCodec> {
    pub fn new() -> Self {
        Self { codec: RasterCodec }
    }
}

impl<C: ImageCodec> Ingestor<C> {
    pub fn with_codec(codec: C) -> Self {
        Self { codec }
    }

    /// Turn a picked file into something the block model can embed.
    ///
    /// Only validation errors are returned. Codec and upload failures fall
    /// back to embedding data directly.
    pub async fn ingest<U: ImageUploader>(
        &self,
        file: &ImageFile,
        policy: &IngestPolicy,
        uploader: &U,
    ) -> Result<EmbeddableImage> {
        if let Err(e) = policy.validate(file) {
            tracing::debug!(name = %file.name, error = %e, "image rejected");
            return Err(e);
        }

        let encoded = {
            let mut timing = TimingGuard::new("image reencode");
            timing.record(file.bytes.len());
            self.codec.reencode(&file.bytes, policy)
        };
        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "embedding original image bytes");
                return Ok(EmbeddableImage {
                    src: file.data_url(),
                    original_width: None,
                    width: None,
                    height: None,
                });
            }
        };

        tracing::debug!(
            from = ?(encoded.original_width, encoded.original_height),
            to = ?(encoded.width, encoded.height),
            bytes = encoded.bytes.len(),
            mime = %encoded.mime,
            "image reencoded"
        );

        let src = match uploader.upload(&encoded).await {
            Ok(Some(url)) => url,
            Ok(None) => encoded.data_url(),
            Err(e) => {
                tracing::warn!(error = %e, "image upload failed, embedding data url");
                encoded.data_url()
            }
        };

        Ok(EmbeddableImage {
            src,
            original_width: Some(encoded.original_width),
            width: Some(encoded.width),
            height: Some(encoded.height),
        })
    }
}

/// Proof that an ingestion was started for a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestTicket {
    block: BlockId,
    seq: u64,
}

impl IngestTicket {
    pub fn block(&self) -> &BlockId {
        &self.block
    }
}

/// Tracks in-flight ingestions, one per block.
///
/// Starting a new ingestion for a block supersedes the previous one: the
/// older ticket no longer completes.
#[derive(Debug, Default)]
pub struct IngestSlots {
    next: u64,
    active: HashMap<BlockId, u64>,
}

impl IngestSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, block: BlockId) -> IngestTicket {
        self.next += 1;
        if self.active.insert(block.clone(), self.next).is_some() {
            tracing::debug!(%block, "superseding in-flight ingestion");
        }
        IngestTicket {
            block,
            seq: self.next,
        }
    }

    pub fn is_current(&self, ticket: &IngestTicket) -> bool {
        self.active.get(&ticket.block) == Some(&ticket.seq)
    }

    /// Release the slot. Returns `false` when the ticket was superseded and
    /// its result should be discarded.
    pub fn finish(&mut self, ticket: &IngestTicket) -> bool {
        if self.is_current(ticket) {
            self.active.remove(&ticket.block);
            true
        } else {
            false
        }
    }

    /// Drop any in-flight ingestion for a block.
    pub fn cancel(&mut self, block: &BlockId) {
        self.active.remove(block);
    }

    pub fn is_busy(&self, block: &BlockId) -> bool {
        self.active.contains_key(block)
    }

    /// First of `blocks` that still has an ingestion in flight.
    pub fn first_busy<'a>(&self, blocks: impl IntoIterator<Item = &'a BlockId>) -> Option<&'a BlockId> {
        blocks.into_iter().find(|b| self.is_busy(b))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use image::{ImageBuffer, Rgb, Rgba};

    use super::*;
    use crate::platform::PlatformError;

    struct CountingCodec<C> {
        inner: C,
        calls: Cell<usize>,
    }

    impl<C> CountingCodec<C> {
        fn new(inner: C) -> Self {
            Self {
                inner,
                calls: Cell::new(0),
            }
        }
    }

    impl<C: ImageCodec> ImageCodec for CountingCodec<C> {
        fn reencode(&self, bytes: &[u8], policy: &IngestPolicy) -> Result<EncodedImage> {
            self.calls.set(self.calls.get() + 1);
            self.inner.reencode(bytes, policy)
        }
    }

    struct FixedUploader(std::result::Result<Option<String>, PlatformError>);

    impl ImageUploader for FixedUploader {
        async fn upload(
            &self,
            _image: &EncodedImage,
        ) -> std::result::Result<Option<String>, PlatformError> {
            self.0.clone()
        }
    }

    fn png(width: u32, height: u32) -> Bytes {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    fn png_with_alpha(width: u32, height: u32) -> Bytes {
        let img = ImageBuffer::from_fn(width, height, |x, _| Rgba([200, 10, 10, (x % 256) as u8]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    #[test]
    fn test_scaled_size() {
        assert_eq!(scaled_size(3200, 1200, 1600), (1600, 600));
        assert_eq!(scaled_size(1200, 3200, 1600), (600, 1600));
        assert_eq!(scaled_size(800, 600, 1600), (800, 600));
        assert_eq!(scaled_size(1600, 1600, 1600), (1600, 1600));
        assert_eq!(scaled_size(10000, 1, 1600), (1600, 1));
    }

    #[test]
    fn test_extension() {
        assert_eq!(ImageFile::new("Photo.JPG", Bytes::new()).extension(), "jpg");
        assert_eq!(ImageFile::new("archive.tar.png", Bytes::new()).extension(), "png");
        assert_eq!(ImageFile::new("noext", Bytes::new()).extension(), "");
        assert_eq!(ImageFile::new(".hidden", Bytes::new()).extension(), "");
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected_before_decode() {
        let codec = CountingCodec::new(RasterCodec);
        let ingestor = Ingestor::with_codec(&codec);
        let file = ImageFile::new("huge.png", vec![0u8; 20 * 1024 * 1024]);

        let err = ingestor
            .ingest(&file, &IngestPolicy::insert(), &())
            .await
            .unwrap_err();

        assert!(matches!(err, EditorError::FileTooLarge { limit, .. } if limit == 10 * MIB));
        assert_eq!(codec.calls.get(), 0);
    }

    #[tokio::test]
    async fn test_disallowed_extension_is_rejected_before_decode() {
        let codec = CountingCodec::new(RasterCodec);
        let ingestor = Ingestor::with_codec(&codec);
        let file = ImageFile::new("anim.gif", png(4, 4));

        let err = ingestor
            .ingest(&file, &IngestPolicy::insert(), &())
            .await
            .unwrap_err();

        assert!(matches!(err, EditorError::DisallowedFileType { ref extension } if extension == "gif"));
        assert_eq!(codec.calls.get(), 0);
    }

    #[test]
    fn test_cover_rejects_gif_content_under_allowed_name() {
        let mut gif = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(2, 2, Rgba([1, 2, 3, 255])))
            .write_to(&mut gif, ImageFormat::Gif)
            .unwrap();
        let file = ImageFile::new("cover.png", gif.into_inner());

        assert!(IngestPolicy::insert().validate(&file).is_ok());
        assert!(matches!(
            IngestPolicy::cover().validate(&file),
            Err(EditorError::DisallowedFileType { .. })
        ));
    }

    #[test]
    fn test_cover_cap_is_independent() {
        let file = ImageFile::new("cover.jpg", vec![0u8; 6 * 1024 * 1024]);
        assert!(IngestPolicy::insert().validate(&file).is_ok());
        assert!(matches!(
            IngestPolicy::cover().validate(&file),
            Err(EditorError::FileTooLarge { limit, .. }) if limit == 5 * MIB
        ));
    }

    #[test]
    fn test_declared_size_is_checked_at_the_cap() {
        let policy = IngestPolicy::insert();
        assert!(policy.check_size(10 * MIB).is_ok());
        assert!(matches!(
            policy.check_size(10 * MIB + 1),
            Err(EditorError::FileTooLarge { size, limit }) if size == 10 * MIB + 1 && limit == 10 * MIB
        ));
    }

    #[tokio::test]
    async fn test_large_image_is_bounded() {
        let ingestor = Ingestor::new();
        let file = ImageFile::new("wide.png", png(2400, 900));

        let image = ingestor
            .ingest(&file, &IngestPolicy::insert(), &())
            .await
            .unwrap();

        assert_eq!(image.original_width, Some(2400));
        assert_eq!((image.width, image.height), (Some(1600), Some(600)));
        assert!(image.src.starts_with("data:image/jpeg;base64,"));

        let payload = image.src.split_once(',').unwrap().1;
        let decoded = image::load_from_memory(&STANDARD.decode(payload).unwrap()).unwrap();
        assert!(decoded.width().max(decoded.height()) <= 1600);
    }

    #[tokio::test]
    async fn test_small_image_is_not_upscaled() {
        let ingestor = Ingestor::new();
        let file = ImageFile::new("small.png", png(320, 200));

        let image = ingestor
            .ingest(&file, &IngestPolicy::insert(), &())
            .await
            .unwrap();

        assert_eq!((image.width, image.height), (Some(320), Some(200)));
    }

    #[test]
    fn test_alpha_becomes_webp() {
        let encoded = RasterCodec
            .reencode(&png_with_alpha(64, 32), &IngestPolicy::insert())
            .unwrap();
        assert_eq!(encoded.mime, "image/webp");
        assert_eq!((encoded.width, encoded.height), (64, 32));
    }

    #[tokio::test]
    async fn test_undecodable_bytes_fall_back_to_original() {
        let bytes = Bytes::from_static(b"\x89PNG\r\n\x1a\nthis is not really a png");
        let file = ImageFile::new("broken.png", bytes.clone());

        let image = Ingestor::new()
            .ingest(&file, &IngestPolicy::insert(), &())
            .await
            .unwrap();

        assert_eq!(image.original_width, None);
        let payload = image.src.split_once(',').unwrap().1;
        assert_eq!(STANDARD.decode(payload).unwrap(), bytes.as_ref());
    }

    #[tokio::test]
    async fn test_uploader_url_is_used() {
        let file = ImageFile::new("a.png", png(10, 10));
        let uploader = FixedUploader(Ok(Some("https://cdn.example/a.jpg".into())));

        let image = Ingestor::new()
            .ingest(&file, &IngestPolicy::insert(), &uploader)
            .await
            .unwrap();

        assert_eq!(image.src, "https://cdn.example/a.jpg");
    }

    #[tokio::test]
    async fn test_upload_failure_falls_back_to_data_url() {
        let file = ImageFile::new("a.png", png(10, 10));
        let uploader = FixedUploader(Err(PlatformError::from("503")));

        let image = Ingestor::new()
            .ingest(&file, &IngestPolicy::insert(), &uploader)
            .await
            .unwrap();

        assert!(image.src.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_newer_ingestion_supersedes_older() {
        let mut slots = IngestSlots::new();
        let block = BlockId::from("b-1");

        let first = slots.begin(block.clone());
        let second = slots.begin(block.clone());
        assert!(slots.is_busy(&block));

        assert!(!slots.finish(&first));
        assert!(slots.is_busy(&block));
        assert!(slots.finish(&second));
        assert!(!slots.is_busy(&block));
    }

    #[test]
    fn test_first_busy() {
        let mut slots = IngestSlots::new();
        let ids = [BlockId::from("a"), BlockId::from("b"), BlockId::from("c")];
        assert_eq!(slots.first_busy(&ids), None);
        let _t = slots.begin(ids[2].clone());
        assert_eq!(slots.first_busy(&ids), Some(&ids[2]));
        slots.cancel(&ids[2]);
        assert_eq!(slots.first_busy(&ids), None);
    }
}
