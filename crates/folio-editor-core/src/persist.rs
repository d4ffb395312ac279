//! Persisted document shape.
//!
//! Documents are stored as a flat list of `{type, data, order}` items.
//! Page-level settings ride along as a leading `TEXT` item whose data is an
//! HTML comment (`<!--PM_META{...}-->`), so viewers that only understand
//! items render it as nothing. Media items carry a small JSON object with
//! the source and visual metadata; plain-string sources are accepted on read.

use serde::{Deserialize, Serialize};

use crate::config::DocumentDefaults;
use crate::error::Result;
use crate::html;
use crate::types::{BlockIdGen, BlockKind, ContentBlock, VisualMeta};
use crate::video;

pub const META_PREFIX: &str = "<!--PM_META";
pub const META_SUFFIX: &str = "-->";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedItem {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub data: String,
    pub order: usize,
}

/// Page-level presentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMeta {
    #[serde(rename = "bg")]
    pub background_color: String,
    #[serde(rename = "gap")]
    pub content_gap_px: u32,
}

impl DocumentMeta {
    pub fn from_defaults(defaults: &DocumentDefaults) -> Self {
        Self {
            background_color: defaults.background_color.clone(),
            content_gap_px: defaults.content_gap_px,
        }
    }

    pub fn clamped(mut self, defaults: &DocumentDefaults) -> Self {
        self.content_gap_px = self.content_gap_px.min(defaults.max_content_gap_px);
        if self.background_color.trim().is_empty() {
            self.background_color = defaults.background_color.clone();
        }
        self
    }

    fn to_item_data(&self) -> Result<String> {
        Ok(format!(
            "{META_PREFIX}{}{META_SUFFIX}",
            serde_json::to_string(self)?
        ))
    }

    fn from_item_data(data: &str) -> Option<Result<Self>> {
        let json = data.strip_prefix(META_PREFIX)?;
        let json = json.strip_suffix(META_SUFFIX).unwrap_or(json);
        Some(serde_json::from_str(json).map_err(Into::into))
    }
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self::from_defaults(&DocumentDefaults::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MediaData {
    src: String,
    #[serde(default, skip_serializing_if = "VisualMeta::is_default")]
    visual: VisualMeta,
}

/// A document ready for the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistedDocument {
    pub items: Vec<PersistedItem>,
    pub meta: DocumentMeta,
}

impl PersistedDocument {
    pub fn from_blocks(blocks: &[ContentBlock], meta: DocumentMeta) -> Result<Self> {
        let mut sorted: Vec<&ContentBlock> = blocks.iter().collect();
        sorted.sort_by_key(|b| b.order);

        let items = sorted
            .into_iter()
            .enumerate()
            .map(|(order, block)| -> Result<PersistedItem> {
                let data = match block.kind {
                    BlockKind::Text => block.payload.clone(),
                    BlockKind::Image | BlockKind::Video => serde_json::to_string(&MediaData {
                        src: block.payload.clone(),
                        visual: block.visual,
                    })?,
                };
                Ok(PersistedItem {
                    kind: block.kind,
                    data,
                    order,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { items, meta })
    }

    /// Rebuild blocks with fresh ids, in persisted order.
    ///
    /// Empty text and media without a source are dropped. Video sources are
    /// normalized where possible.
    pub fn to_blocks(&self, ids: &mut BlockIdGen) -> Vec<ContentBlock> {
        let mut items: Vec<&PersistedItem> = self.items.iter().collect();
        items.sort_by_key(|i| i.order);

        let mut blocks = Vec::new();
        for item in items {
            let (payload, text, visual) = match item.kind {
                BlockKind::Text => {
                    let text = html::text_content(&item.data);
                    if text.is_empty() {
                        continue;
                    }
                    (item.data.clone(), text, VisualMeta::default())
                }
                BlockKind::Image | BlockKind::Video => {
                    let media = parse_media(&item.data);
                    if media.src.trim().is_empty() {
                        continue;
                    }
                    let src = if item.kind == BlockKind::Video {
                        match video::normalize(&media.src) {
                            Some(canonical) => canonical.as_url(),
                            None => {
                                tracing::warn!(src = %media.src, "persisted video is not canonical");
                                media.src
                            }
                        }
                    } else {
                        media.src
                    };
                    (src, String::new(), media.visual)
                }
            };
            blocks.push(ContentBlock {
                id: ids.fresh(),
                kind: item.kind,
                order: blocks.len(),
                payload,
                text,
                visual,
            });
        }
        blocks
    }

    /// The item list as stored, with the meta item leading.
    pub fn to_items(&self) -> Result<Vec<PersistedItem>> {
        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.push(PersistedItem {
            kind: BlockKind::Text,
            data: self.meta.to_item_data()?,
            order: 0,
        });
        items.extend(self.items.iter().map(|item| PersistedItem {
            order: item.order + 1,
            ..item.clone()
        }));
        Ok(items)
    }

    /// Split a stored item list into content and meta.
    pub fn from_items(mut items: Vec<PersistedItem>, defaults: &DocumentDefaults) -> Self {
        items.sort_by_key(|i| i.order);

        let mut meta = None;
        items.retain(|item| {
            if item.kind != BlockKind::Text {
                return true;
            }
            match DocumentMeta::from_item_data(&item.data) {
                None => true,
                Some(parsed) => {
                    if meta.is_none() {
                        meta = Some(parsed.unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "unreadable document meta, using defaults");
                            DocumentMeta::from_defaults(defaults)
                        }));
                    }
                    false
                }
            }
        });

        for (order, item) in items.iter_mut().enumerate() {
            item.order = order;
        }

        Self {
            items,
            meta: meta
                .unwrap_or_else(|| DocumentMeta::from_defaults(defaults))
                .clamped(defaults),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_items()?)?)
    }

    pub fn from_json(json: &str, defaults: &DocumentDefaults) -> Result<Self> {
        let items: Vec<PersistedItem> = serde_json::from_str(json)?;
        Ok(Self::from_items(items, defaults))
    }
}

/// `{"src": ...}` JSON, or the bare source.
fn parse_media(data: &str) -> MediaData {
    let trimmed = data.trim();
    if trimmed.starts_with('{') {
        if let Ok(media) = serde_json::from_str::<MediaData>(trimmed) {
            return media;
        }
    }
    MediaData {
        src: trimmed.to_owned(),
        visual: VisualMeta::default(),
    }
}
