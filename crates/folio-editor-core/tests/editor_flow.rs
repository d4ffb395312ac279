//! End-to-end editing flows over the in-memory surface.

use std::cell::{Cell, RefCell};
use std::io::Cursor;
use std::rc::Rc;
use std::time::Duration;

use folio_editor_core::{
    BlockEditor, BlockId, BlockIdGen, BlockKind, EditorConfig, EditorError, ImageFile,
    ImageTarget, Ingestor, Insets, MediaGeometry, MediaKind, MemorySurface, NodeKey, Notice,
    Notifier, OverlayEvent, OverlayHost, PanelPlacement, PersistedDocument, Point, Rect,
    RenderSurface, Size, TrackedMediaElement, VisualMeta,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use web_time::Instant;

/// Decrements the live counter when dropped.
struct Live(Rc<Cell<usize>>);

impl Live {
    fn new(count: &Rc<Cell<usize>>) -> Self {
        count.set(count.get() + 1);
        Self(count.clone())
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

#[derive(Default)]
struct RecordingHost {
    media: Vec<MediaGeometry>,
    panel: Option<PanelPlacement>,
    live_handles: Rc<Cell<usize>>,
}

impl OverlayHost for RecordingHost {
    type FrameLoop = Live;
    type PointerListener = Live;

    fn media_elements(&self) -> Vec<MediaGeometry> {
        self.media.clone()
    }

    fn measure(&self, media: NodeKey) -> Option<MediaGeometry> {
        self.media.iter().find(|g| g.key == media).copied()
    }

    fn panel_rect(&self) -> Option<Rect> {
        None
    }

    fn viewport(&self) -> Size {
        Size::new(1440.0, 900.0)
    }

    fn show_panel(&mut self, placement: PanelPlacement, _target: &TrackedMediaElement) {
        self.panel = Some(placement);
    }

    fn hide_panel(&mut self) {
        self.panel = None;
    }

    fn start_frame_loop(&mut self) -> Live {
        Live::new(&self.live_handles)
    }

    fn listen_pointer(&mut self) -> Live {
        Live::new(&self.live_handles)
    }
}

#[derive(Default)]
struct Notices(RefCell<Vec<Notice>>);

impl Notifier for Notices {
    fn notify(&self, notice: Notice) {
        self.0.borrow_mut().push(notice);
    }
}

impl Notices {
    fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

type Editor<'a> = BlockEditor<MemorySurface, RecordingHost, &'a Notices>;

fn editor(surface: MemorySurface, notices: &Notices) -> Editor<'_> {
    BlockEditor::new(surface, RecordingHost::default(), notices, EditorConfig::default())
        .with_ids(BlockIdGen::with_salt(7))
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 80, 40])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Geometry for a padded image: 40px padding on every side.
fn geometry(media: NodeKey, natural_width: f64) -> MediaGeometry {
    MediaGeometry {
        key: media,
        kind: MediaKind::Image,
        bounds: Rect::new(100.0, 200.0, 800.0, 400.0),
        padding: Insets::uniform(40.0),
        border: Insets::default(),
        natural_width,
    }
}

/// A surface holding one tagged image line, and its block and media keys.
fn image_document(notices: &Notices, natural_width: f64) -> (Editor<'_>, BlockId, NodeKey) {
    let mut surface = MemorySurface::new();
    surface.push_text("Project notes");
    let media = surface.push_media(MediaKind::Image, "https://cdn.example/a.png", VisualMeta::default());
    let mut ed = editor(surface, notices);
    let block = ed.blocks().unwrap()[1].id.clone();
    ed.overlay_mut().host_mut().media = vec![geometry(media, natural_width)];
    (ed, block, media)
}

#[test]
fn unsupported_video_is_reported_and_nothing_inserted() {
    let notices = Notices::default();
    let mut ed = editor(MemorySurface::new(), &notices);

    let err = ed.insert_video("https://example.com/clip.mp4").unwrap_err();

    assert!(matches!(err, EditorError::UnsupportedVideoFormat { .. }));
    assert_eq!(notices.take(), vec![Notice::UnsupportedVideo]);
    assert!(ed.blocks().unwrap().is_empty());
}

#[test]
fn pasted_snippet_becomes_full_width_video_block() {
    let notices = Notices::default();
    let mut surface = MemorySurface::new();
    surface.push_text("Intro");
    let mut ed = editor(surface, &notices);

    let block = ed
        .insert_video(r#"<iframe src="http://youtu.be/dQw4w9WgXcQ" allowfullscreen></iframe>"#)
        .unwrap();

    let blocks = ed.blocks().unwrap();
    let video = blocks.iter().find(|b| b.id == block).unwrap();
    assert_eq!(video.kind, BlockKind::Video);
    assert_eq!(video.payload, "https://www.youtube.com/embed/dQw4w9WgXcQ");
    assert!(video.visual.full_width);
    assert!(!video.visual.padded);
    assert!(notices.take().is_empty());
}

#[test]
fn change_video_url_rewrites_source_in_place() {
    let notices = Notices::default();
    let mut ed = editor(MemorySurface::new(), &notices);
    let block = ed.insert_video("https://vimeo.com/76979871").unwrap();

    ed.change_video_url(&block, "https://www.youtube.com/shorts/abc_DEF-123")
        .unwrap();
    assert!(ed.change_video_url(&block, "not a link").is_err());

    let blocks = ed.blocks().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].id, block);
    assert_eq!(blocks[0].payload, "https://www.youtube.com/embed/abc_DEF-123");
    assert_eq!(notices.take(), vec![Notice::UnsupportedVideo]);
}

#[tokio::test]
async fn wide_image_is_scaled_and_starts_padded() {
    let notices = Notices::default();
    let mut ed = editor(MemorySurface::new(), &notices);
    let file = ImageFile::new("wide.png", png(2400, 900));

    let block = ed
        .insert_image(file, ImageTarget::Insert, &Ingestor::new(), &())
        .await
        .unwrap()
        .unwrap();

    let blocks = ed.blocks().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].id, block);
    assert_eq!(blocks[0].kind, BlockKind::Image);
    assert!(blocks[0].payload.starts_with("data:image/jpeg;base64,"));
    assert_eq!(
        blocks[0].visual,
        VisualMeta {
            padded: true,
            padding_px: 40,
            full_width: false,
        }
    );
    assert!(ed.is_padding_eligible(&block));
}

#[tokio::test]
async fn oversized_file_is_refused_before_decoding() {
    let notices = Notices::default();
    let mut ed = editor(MemorySurface::new(), &notices);
    let file = ImageFile::new("huge.png", vec![0u8; 11 * 1024 * 1024]);

    let err = ed
        .insert_image(file, ImageTarget::Insert, &Ingestor::new(), &())
        .await
        .unwrap_err();

    assert!(matches!(err, EditorError::FileTooLarge { .. }));
    assert_eq!(
        notices.take(),
        vec![Notice::FileTooLarge {
            limit: 10 * 1024 * 1024
        }]
    );
    assert!(ed.blocks().unwrap().is_empty());
}

#[test]
fn oversized_file_is_refused_by_declared_size() {
    let notices = Notices::default();
    let ed = editor(MemorySurface::new(), &notices);

    assert!(ed.check_image_size(3 * 1024 * 1024).is_ok());
    assert!(notices.take().is_empty());

    let err = ed.check_image_size(40 * 1024 * 1024).unwrap_err();
    assert!(matches!(err, EditorError::FileTooLarge { .. }));
    assert_eq!(
        notices.take(),
        vec![Notice::FileTooLarge {
            limit: 10 * 1024 * 1024
        }]
    );
}

#[tokio::test]
async fn superseded_replacement_is_discarded() {
    let notices = Notices::default();
    let (mut ed, block, media) = image_document(&notices, 1400.0);
    let ingestor = Ingestor::new();

    let first = ed
        .prepare_image(ImageFile::new("a.png", png(10, 10)), ImageTarget::Replace(block.clone()))
        .unwrap();
    let second = ed
        .prepare_image(ImageFile::new("b.png", png(20, 20)), ImageTarget::Replace(block.clone()))
        .unwrap();

    let first_result = first.run(&ingestor, &()).await;
    let second_result = second.run(&ingestor, &()).await;
    let second_src = second_result.as_ref().unwrap().src.clone();

    assert_eq!(ed.complete_image(first, first_result).unwrap(), None);
    assert_eq!(
        ed.surface().src_of(media),
        Some("https://cdn.example/a.png")
    );
    assert_eq!(ed.complete_image(second, second_result).unwrap(), Some(block));
    assert_eq!(ed.surface().src_of(media), Some(second_src.as_str()));
}

#[tokio::test]
async fn reorder_waits_for_in_flight_ingestion() {
    let notices = Notices::default();
    let (mut ed, block, _) = image_document(&notices, 1400.0);
    let job = ed
        .prepare_image(ImageFile::new("c.png", png(16, 16)), ImageTarget::Replace(block.clone()))
        .unwrap();

    let entries = ed.open_reorder().unwrap();
    let text = entries[0].id.clone();
    ed.reorder_drop(&block, &text).unwrap();

    let err = ed.confirm_reorder().unwrap_err();
    assert!(matches!(err, EditorError::ReorderBusy(ref b) if *b == block));
    assert_eq!(notices.take(), vec![Notice::StillUploading]);
    assert!(ed.reorder().is_open());
    assert_eq!(ed.blocks().unwrap()[0].id, text);

    let result = job.run(&Ingestor::new(), &()).await;
    ed.complete_image(job, result).unwrap();

    assert_eq!(ed.confirm_reorder().unwrap(), vec![block.clone(), text]);
    assert!(!ed.reorder().is_open());
    assert_eq!(ed.blocks().unwrap()[0].id, block);
}

#[test]
fn reorder_drop_and_remove_are_applied_on_confirm() {
    let notices = Notices::default();
    let mut surface = MemorySurface::new();
    for text in ["A", "B", "C"] {
        surface.push_text(text);
    }
    let mut ed = editor(surface, &notices);

    let entries = ed.open_reorder().unwrap();
    let (a, b, c) = (entries[0].id.clone(), entries[1].id.clone(), entries[2].id.clone());
    let entries = ed.reorder_drop(&c, &a).unwrap();
    assert_eq!(entries.iter().map(|e| e.id.clone()).collect::<Vec<_>>(), [c.clone(), a.clone(), b.clone()]);

    ed.reorder_remove(&b).unwrap();
    ed.confirm_reorder().unwrap();

    let texts: Vec<_> = ed.blocks().unwrap().into_iter().map(|b| b.text).collect();
    assert_eq!(texts, ["C", "A"]);
}

#[test]
fn cancelled_reorder_leaves_document_alone() {
    let notices = Notices::default();
    let mut surface = MemorySurface::new();
    surface.push_text("A");
    surface.push_text("B");
    let mut ed = editor(surface, &notices);
    let before = ed.blocks().unwrap();

    let entries = ed.open_reorder().unwrap();
    ed.reorder_drop(&entries[0].id, &entries[1].id).unwrap();
    ed.cancel_reorder();

    assert_eq!(ed.blocks().unwrap(), before);
}

#[test]
fn empty_document_cannot_be_reordered() {
    let notices = Notices::default();
    let mut ed = editor(MemorySurface::new(), &notices);

    assert!(matches!(
        ed.open_reorder(),
        Err(EditorError::EmptyDocumentOnReorder)
    ));
    assert_eq!(notices.take(), vec![Notice::NothingToReorder]);
}

#[test]
fn padding_region_does_not_start_tracking() {
    let notices = Notices::default();
    let (mut ed, block, media) = image_document(&notices, 1400.0);
    let now = Instant::now();

    // Inside the bounds, inside the 40px padding band.
    assert_eq!(ed.pointer_moved(Point::new(120.0, 300.0), now), OverlayEvent::None);
    assert!(ed.overlay().host().panel.is_none());

    assert_eq!(ed.pointer_moved(Point::new(500.0, 400.0), now), OverlayEvent::Entered(media));
    assert_eq!(ed.tracked_block(), Some(&block));
    assert_eq!(ed.overlay().host().live_handles.get(), 2);

    // Content rect spans x 140..860 from y 240; the panel is centred on it.
    let panel = ed.overlay().host().panel.unwrap();
    assert_eq!(panel.left, 390.0);
    assert_eq!(panel.top, 228.0);

    assert_eq!(
        ed.pointer_moved(Point::new(1200.0, 400.0), now),
        OverlayEvent::Exited(media)
    );
    assert!(ed.overlay().host().panel.is_none());
    assert_eq!(ed.overlay().host().live_handles.get(), 0);
}

#[test]
fn narrow_media_refuses_padding_wide_media_accepts() {
    let notices = Notices::default();
    let now = Instant::now();

    let (mut narrow, block, _) = image_document(&notices, 800.0);
    narrow.pointer_moved(Point::new(500.0, 400.0), now);
    let err = narrow.set_padding(&block, 80).unwrap_err();
    assert!(matches!(err, EditorError::PaddingNotEligible { min: 1100, .. }));
    assert_eq!(notices.take(), vec![Notice::MinimumWidth { min: 1100 }]);

    let (mut wide, block, media) = image_document(&notices, 1400.0);
    wide.pointer_moved(Point::new(500.0, 400.0), now);
    wide.set_padding(&block, 80).unwrap();
    wide.set_padding(&block, 120).unwrap();
    assert_eq!(wide.surface().visual_of(media).map(|v| v.padding_px), Some(0));

    wide.frame().unwrap();
    assert_eq!(
        wide.surface().visual_of(media),
        Some(VisualMeta {
            padded: true,
            padding_px: 120,
            full_width: false,
        })
    );

    let off = wide.toggle_padding(&block).unwrap();
    assert!(!off.padded);
    let on = wide.toggle_padding(&block).unwrap();
    assert_eq!(on.padding_px, 120);
    assert!(notices.take().is_empty());
}

#[test]
fn slider_drag_holds_tracking_until_release() {
    let notices = Notices::default();
    let (mut ed, _, media) = image_document(&notices, 1400.0);
    let now = Instant::now();
    ed.pointer_moved(Point::new(500.0, 400.0), now);

    ed.begin_interaction();
    assert_eq!(ed.pointer_moved(Point::new(1300.0, 50.0), now), OverlayEvent::None);
    assert!(ed.overlay().is_tracking());

    assert_eq!(
        ed.end_interaction(Point::new(1300.0, 50.0), now),
        OverlayEvent::Exited(media)
    );
    assert!(!ed.overlay().is_tracking());
}

#[test]
fn typing_hides_panel_until_quiet() {
    let notices = Notices::default();
    let (mut ed, _, media) = image_document(&notices, 1400.0);
    let start = Instant::now();
    let inside = Point::new(500.0, 400.0);
    ed.pointer_moved(inside, start);

    assert_eq!(ed.text_changed(start), OverlayEvent::Exited(media));
    assert_eq!(ed.overlay().host().live_handles.get(), 0);
    assert_eq!(
        ed.pointer_moved(inside, start + Duration::from_millis(50)),
        OverlayEvent::None
    );
    assert_eq!(
        ed.pointer_moved(inside, start + Duration::from_millis(250)),
        OverlayEvent::Entered(media)
    );
}

#[test]
fn media_moves_to_front_once_text_is_cleared() {
    let notices = Notices::default();
    let mut surface = MemorySurface::new();
    let caption = surface.push_text("caption");
    let media = surface.push_media(MediaKind::Image, "a.png", VisualMeta::default());
    let mut ed = editor(surface, &notices);

    ed.surface_mut().set_line_text(caption, "").unwrap();
    let start = Instant::now();
    ed.text_changed(start);

    assert!(!ed.tick(start).unwrap());
    assert!(ed.tick(start + Duration::from_millis(200)).unwrap());
    assert_eq!(ed.surface().nodes()[0].media[0].key, media);
    assert!(!ed.tick(start + Duration::from_millis(400)).unwrap());
}

#[test]
fn remove_media_releases_tracking() {
    let notices = Notices::default();
    let (mut ed, block, _) = image_document(&notices, 1400.0);
    ed.pointer_moved(Point::new(500.0, 400.0), Instant::now());
    assert!(ed.overlay().is_tracking());

    ed.remove_media(&block).unwrap();

    assert!(!ed.overlay().is_tracking());
    assert_eq!(ed.overlay().host().live_handles.get(), 0);
    let blocks = ed.blocks().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].kind, BlockKind::Text);
    assert!(ed.padding().visual(&block).is_none());
}

#[test]
fn snapshot_survives_persistence() {
    let notices = Notices::default();
    let mut surface = MemorySurface::new();
    surface.push_line("h2", "Case study");
    surface.push_media(
        MediaKind::Image,
        "https://cdn.example/hero.jpg",
        VisualMeta {
            padded: true,
            padding_px: 64,
            full_width: false,
        },
    );
    let mut ed = editor(surface, &notices);
    ed.insert_video("https://vimeo.com/channels/staffpicks/22439234")
        .unwrap();
    ed.set_background_color("#101010");
    assert_eq!(ed.set_content_gap(250), 100);

    let json = ed.snapshot().unwrap().to_json().unwrap();
    let document = PersistedDocument::from_json(&json, &EditorConfig::default().document).unwrap();

    let mut restored = editor(MemorySurface::new(), &notices);
    restored.load(&document).unwrap();

    let project = |blocks: Vec<folio_editor_core::ContentBlock>| {
        blocks
            .into_iter()
            .map(|b| (b.kind, b.payload, b.visual))
            .collect::<Vec<_>>()
    };
    assert_eq!(project(restored.blocks().unwrap()), project(ed.blocks().unwrap()));
    assert_eq!(restored.meta().background_color, "#101010");
    assert_eq!(restored.meta().content_gap_px, 100);
    assert!(notices.take().is_empty());
}

/// Round-trips the editor through JSON and returns the restored blocks.
fn reload(ed: &mut Editor<'_>) -> Vec<folio_editor_core::ContentBlock> {
    let json = ed.snapshot().unwrap().to_json().unwrap();
    PersistedDocument::from_json(&json, &EditorConfig::default().document)
        .unwrap()
        .to_blocks(&mut BlockIdGen::with_salt(9))
}

#[test]
fn snapshot_includes_padding_not_yet_drawn() {
    let notices = Notices::default();
    let (mut ed, block, media) = image_document(&notices, 1400.0);
    ed.pointer_moved(Point::new(500.0, 400.0), Instant::now());

    ed.set_padding(&block, 250).unwrap();
    assert_eq!(ed.surface().visual_of(media).map(|v| v.padding_px), Some(0));

    let restored = reload(&mut ed);
    assert_eq!(
        restored[1].visual,
        VisualMeta {
            padded: true,
            padding_px: 250,
            full_width: false,
        }
    );
}

#[test]
fn padding_changes_are_drawn_when_tracking_ends() {
    let notices = Notices::default();
    let (mut ed, block, media) = image_document(&notices, 1400.0);
    let now = Instant::now();
    ed.pointer_moved(Point::new(500.0, 400.0), now);
    ed.set_padding(&block, 90).unwrap();

    ed.pointer_moved(Point::new(1300.0, 50.0), now);
    assert_eq!(ed.surface().visual_of(media).map(|v| v.padding_px), Some(90));

    // No frame loop while idle: edits land immediately.
    ed.set_full_width(&block, true).unwrap();
    assert_eq!(ed.surface().visual_of(media).map(|v| v.full_width), Some(true));
}

#[test]
fn toggled_padding_comes_back_at_the_chosen_value_after_saving() {
    let notices = Notices::default();
    let (mut ed, block, _) = image_document(&notices, 1400.0);
    ed.pointer_moved(Point::new(500.0, 400.0), Instant::now());

    ed.set_padding(&block, 250).unwrap();
    assert!(!ed.toggle_padding(&block).unwrap().padded);
    assert!(!reload(&mut ed)[1].visual.padded);

    let on = ed.toggle_padding(&block).unwrap();
    assert!(on.padded);
    assert_eq!(on.padding_px, 250);
    let restored = reload(&mut ed);
    assert!(restored[1].visual.padded);
    assert_eq!(restored[1].visual.padding_px, 250);
    assert!(notices.take().is_empty());
}

fn mixed_document(notices: &Notices) -> (Editor<'_>, BlockId, BlockId, BlockId) {
    let mut surface = MemorySurface::new();
    surface.push_text("A");
    surface.push_media(MediaKind::Image, "https://cdn.example/b.png", VisualMeta::default());
    surface.push_media(
        MediaKind::Video,
        "https://player.vimeo.com/video/3",
        VisualMeta {
            full_width: true,
            ..VisualMeta::default()
        },
    );
    let mut ed = editor(surface, notices);
    let entries = ed.open_reorder().unwrap();
    let ids = (entries[0].id.clone(), entries[1].id.clone(), entries[2].id.clone());
    (ed, ids.0, ids.1, ids.2)
}

#[test]
fn mixed_blocks_reorder_upward_and_downward() {
    let notices = Notices::default();

    let (mut ed, a, b, c) = mixed_document(&notices);
    ed.reorder_drop(&c, &a).unwrap();
    assert_eq!(ed.confirm_reorder().unwrap(), vec![c.clone(), a.clone(), b.clone()]);
    let kinds: Vec<_> = ed.blocks().unwrap().into_iter().map(|b| (b.id, b.kind)).collect();
    assert_eq!(
        kinds,
        [
            (c, BlockKind::Video),
            (a, BlockKind::Text),
            (b, BlockKind::Image)
        ]
    );

    let (mut ed, a, b, c) = mixed_document(&notices);
    ed.reorder_drop(&a, &c).unwrap();
    ed.confirm_reorder().unwrap();
    let blocks = ed.blocks().unwrap();
    let ids: Vec<_> = blocks.iter().map(|b| b.id.clone()).collect();
    assert_eq!(ids, [b, c, a]);
    assert!(blocks[1].visual.full_width);
    assert_eq!(blocks.iter().map(|b| b.order).collect::<Vec<_>>(), [0, 1, 2]);
}

#[test]
fn numeric_entities_in_loaded_text_are_decoded() {
    let notices = Notices::default();
    let json = r#"[{"type": "TEXT", "data": "<p>It&#8217;s caf&#233; &mdash; d&#xE9;j&agrave;</p>", "order": 0}]"#;
    let document = PersistedDocument::from_json(json, &EditorConfig::default().document).unwrap();
    let mut ed = editor(MemorySurface::new(), &notices);

    ed.load(&document).unwrap();

    let blocks = ed.blocks().unwrap();
    assert_eq!(blocks[0].text, "It\u{2019}s caf\u{e9} \u{2014} d\u{e9}j\u{e0}");
    assert_eq!(blocks[0].payload, "<p>It\u{2019}s caf\u{e9} \u{2014} d\u{e9}j\u{e0}</p>");
}
