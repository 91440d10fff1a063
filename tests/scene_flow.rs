//! End-to-end scene flows against a CPU-side renderer

use std::f32::consts::PI;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use book_mockup::error::{ExportError, RenderError};
use book_mockup::scene::LoadEvent;
use book_mockup::{
    Background, BookFormat, ImageSource, LoadPolicy, Renderer, SceneComposer, SceneFrame, Settings, SurfaceRole,
    TextureOutcome,
};
use image::{ImageFormat, Rgba, RgbaImage};

/// Remembers what it was asked to draw and fills the viewport with one color
#[derive(Default)]
struct RecordingRenderer {
    frames: usize,
    last_revision: Option<u64>,
    last_instances: usize,
    size: (u32, u32),
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, frame: &SceneFrame<'_>) -> Result<(), RenderError> {
        self.frames += 1;
        self.last_revision = Some(frame.revision);
        self.last_instances = frame.instances.len();
        self.size = frame.viewport;
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, RenderError> {
        if self.frames == 0 {
            return Err(RenderError::EmptySurface);
        }
        Ok(RgbaImage::from_pixel(self.size.0, self.size.1, Rgba([40, 60, 80, 255])))
    }
}

struct FailingRenderer;

impl Renderer for FailingRenderer {
    fn render(&mut self, _frame: &SceneFrame<'_>) -> Result<(), RenderError> {
        Err(RenderError::Readback("device lost".into()))
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, RenderError> {
        Err(RenderError::EmptySurface)
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("book-mockup-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn scene_exporting_to(dir: &PathBuf) -> SceneComposer {
    let settings = Settings {
        export_dir: dir.clone(),
        ..Settings::default()
    };
    SceneComposer::with_settings(settings).unwrap()
}

#[test]
fn capture_renders_before_reading_a_fresh_scene() {
    let mut scene = SceneComposer::new().unwrap();
    scene.on_resize(64, 48);
    let mut renderer = RecordingRenderer::default();

    let bytes = scene.capture_frame(&mut renderer).unwrap().wait().unwrap();

    assert_eq!(renderer.frames, 1);
    assert_eq!(renderer.last_revision, Some(scene.revision()));
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
}

#[test]
fn stacked_books_sit_on_top_of_each_other() {
    let mut scene = SceneComposer::new().unwrap();
    scene.seed_stack_jitter(42);
    let thickness = scene.book().attributes().thickness;

    assert_eq!(scene.add_to_stack(), 1);
    assert_eq!(scene.add_to_stack(), 2);
    assert_eq!(scene.add_to_stack(), 3);

    let stack = scene.stack().unwrap();
    let heights: Vec<f32> = stack.entries().iter().map(|e| e.transform.position.y).collect();
    assert_eq!(heights, vec![0.0, thickness, 2.0 * thickness]);
    for entry in stack.entries() {
        assert_eq!(entry.transform.rotation.x, -PI / 2.0);
    }

    let mut renderer = RecordingRenderer::default();
    scene.render(&mut renderer).unwrap();
    assert_eq!(renderer.last_instances, 4 * 4);
}

#[test]
fn clearing_the_stack_starts_over_at_the_bottom() {
    let mut scene = SceneComposer::new().unwrap();
    scene.add_to_stack();
    scene.add_to_stack();
    scene.clear_stack();
    assert!(scene.stack().is_none());

    scene.add_to_stack();
    let stack = scene.stack().unwrap();
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.entries()[0].transform.position.y, 0.0);
}

#[test]
fn wide_cover_widens_the_book_once() {
    let mut scene = SceneComposer::new().unwrap();
    let rebuilds = scene.book().rebuild_count();
    let height = scene.book().attributes().height;

    let cover = RgbaImage::from_pixel(200, 100, Rgba([200, 30, 30, 255]));
    scene.set_texture(SurfaceRole::Cover, ImageSource::from(cover));
    let events = scene.wait_for_loads(Duration::from_secs(10));

    assert_eq!(events.len(), 1);
    match &events[0] {
        LoadEvent::TextureApplied { role, outcome } => {
            assert_eq!(*role, SurfaceRole::Cover);
            assert!(matches!(outcome, TextureOutcome::Resized { .. }));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!((scene.book().attributes().width - height * 2.0).abs() < 1e-4);
    assert_eq!(scene.book().rebuild_count(), rebuilds + 1);

    // Same proportions again: material swap only
    let cover = RgbaImage::from_pixel(400, 200, Rgba([30, 200, 30, 255]));
    scene.set_texture(SurfaceRole::Cover, ImageSource::from(cover));
    scene.wait_for_loads(Duration::from_secs(10));
    assert_eq!(scene.book().rebuild_count(), rebuilds + 1);
}

#[test]
fn spine_artwork_does_not_touch_geometry() {
    let mut scene = SceneComposer::new().unwrap();
    let rebuilds = scene.book().rebuild_count();
    let width = scene.book().attributes().width;

    let spine = RgbaImage::from_pixel(10, 300, Rgba([0, 0, 0, 255]));
    scene.set_texture(SurfaceRole::Spine, ImageSource::from(spine));
    let events = scene.wait_for_loads(Duration::from_secs(10));

    assert!(matches!(
        events.as_slice(),
        [LoadEvent::TextureApplied {
            outcome: TextureOutcome::MaterialOnly,
            ..
        }]
    ));
    assert_eq!(scene.book().attributes().width, width);
    assert_eq!(scene.book().rebuild_count(), rebuilds);
    assert!(scene.book().materials().get(SurfaceRole::Spine).texture.is_some());
}

#[test]
fn undecodable_artwork_leaves_the_book_alone() {
    let mut scene = SceneComposer::new().unwrap();
    let before = scene.revision();

    scene.set_texture(SurfaceRole::Cover, ImageSource::Bytes(b"not an image".to_vec().into()));
    let events = scene.wait_for_loads(Duration::from_secs(10));

    assert!(matches!(events.as_slice(), [LoadEvent::Failed { .. }]));
    assert_eq!(scene.revision(), before);
    assert!(scene.book().materials().get(SurfaceRole::Cover).texture.is_none());
}

#[test]
fn format_round_trip_restores_the_hardcover() {
    let mut scene = SceneComposer::new().unwrap();
    let hardcover = scene.book().parts();

    assert!(scene.set_format(BookFormat::Softcover).unwrap());
    assert_ne!(scene.book().parts(), hardcover);
    assert!(scene.set_format(BookFormat::Hardcover).unwrap());
    assert_eq!(scene.book().parts(), hardcover);
    assert!(!scene.set_format(BookFormat::Hardcover).unwrap());
}

#[test]
fn export_writes_the_configured_file() {
    let dir = scratch_dir("export");
    let mut scene = scene_exporting_to(&dir);
    scene.on_resize(32, 32);
    let mut renderer = RecordingRenderer::default();

    let path = scene.export_image(&mut renderer).unwrap();

    assert_eq!(path, dir.join("book-mockup-3d.png"));
    let written = image::open(&path).unwrap();
    assert_eq!((written.width(), written.height()), (32, 32));
    let leftovers: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn failed_render_aborts_the_export() {
    let dir = scratch_dir("failed-export");
    let scene = scene_exporting_to(&dir);

    let result = scene.export_image(&mut FailingRenderer);

    assert!(matches!(result, Err(ExportError::Render(_))));
    assert!(!dir.join("book-mockup-3d.png").exists());
}

#[test]
fn latest_request_policy_drops_superseded_loads() {
    let settings = Settings {
        load_policy: LoadPolicy::LatestRequestWins,
        ..Settings::default()
    };
    let mut scene = SceneComposer::with_settings(settings).unwrap();
    let height = scene.book().attributes().height;

    let square = RgbaImage::from_pixel(100, 100, Rgba([1, 2, 3, 255]));
    let tall = RgbaImage::from_pixel(100, 200, Rgba([4, 5, 6, 255]));
    scene.set_texture(SurfaceRole::Cover, ImageSource::from(square));
    scene.set_texture(SurfaceRole::Cover, ImageSource::from(tall));
    let events = scene.wait_for_loads(Duration::from_secs(10));

    assert_eq!(events.len(), 1);
    assert!((scene.book().attributes().width - height * 0.5).abs() < 1e-4);
}

#[test]
fn named_background_loads_from_the_assets_dir() {
    let dir = scratch_dir("assets");
    fs::create_dir_all(&dir).unwrap();
    // Decoding sniffs the content, so PNG bytes behind the .jpg name are fine
    RgbaImage::from_pixel(4, 4, Rgba([120, 80, 40, 255]))
        .save_with_format(dir.join("wood_thumb.jpg"), ImageFormat::Png)
        .unwrap();
    let settings = Settings {
        assets_dir: dir.clone(),
        ..Settings::default()
    };
    let mut scene = SceneComposer::with_settings(settings).unwrap();
    let before = scene.revision();

    scene.set_background("wood").unwrap();
    assert_eq!(scene.pending_loads(), 1);
    let events = scene.wait_for_loads(Duration::from_secs(10));

    assert!(matches!(events.as_slice(), [LoadEvent::BackgroundApplied]));
    match scene.background() {
        Background::Image(texture) => assert_eq!(texture.image.dimensions(), (4, 4)),
        other => panic!("unexpected background {other:?}"),
    }
    assert!(scene.revision() > before);
    assert_eq!(scene.pending_loads(), 0);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn default_policy_applies_every_completed_load() {
    let mut scene = SceneComposer::new().unwrap();
    let height = scene.book().attributes().height;

    let wide = RgbaImage::from_pixel(200, 100, Rgba([1, 2, 3, 255]));
    let square = RgbaImage::from_pixel(100, 100, Rgba([4, 5, 6, 255]));
    scene.set_texture(SurfaceRole::Cover, ImageSource::from(wide));
    scene.set_texture(SurfaceRole::Cover, ImageSource::from(square));
    let events = scene.wait_for_loads(Duration::from_secs(10));

    assert_eq!(events.len(), 2);
    for event in &events {
        assert!(matches!(
            event,
            LoadEvent::TextureApplied {
                role: SurfaceRole::Cover,
                ..
            }
        ));
    }
    // Whichever finished last owns the cover
    let width = scene.book().attributes().width;
    assert!((width - height * 2.0).abs() < 1e-4 || (width - height).abs() < 1e-4);
}
