//! Scene composition
//!
//! `SceneComposer` owns everything that ends up on screen: the orbit camera,
//! the studio lights, the shadow receiver, the live book, the optional stack
//! of frozen copies and the backdrop. It is the only thing the UI talks to.
//! Rendering is delegated to whatever `Renderer` the caller passes in.

use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use glam::{Mat4, Vec3};
use image::{ImageFormat, RgbaImage};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::book::{BookModel, BookSnapshot, TextureOutcome};
use crate::camera::OrbitCamera;
use crate::config::{parse_hex_color, CONFIG};
use crate::error::{AttributeError, ExportError, LoadError, RenderError};
use crate::geometry::{BookAttributes, BookFormat};
use crate::lighting::{LightingRig, ShadowPlane};
use crate::loader::{ImageSource, LoadCompletion, LoadSlot, TextureLoader};
use crate::material::{SurfaceRole, Texture};
use crate::pose::{Pose, Transform};
use crate::render::{DrawInstance, Renderer, SceneFrame};
use crate::settings::Settings;

/// Output size used until the first resize arrives
pub const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);

/// Backgrounds that resolve to an image in the assets directory
pub const NAMED_BACKGROUNDS: &[&str] = &["wood"];

/// The active backdrop
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Background {
    #[default]
    Transparent,
    /// Flat 0xRRGGBB color
    Solid(u32),
    Image(Texture),
}

/// A backdrop choice as it arrives from the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundRequest {
    Transparent,
    Solid(u32),
    /// One of `NAMED_BACKGROUNDS`, loaded asynchronously
    Named(String),
}

impl FromStr for BackgroundRequest {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("transparent") {
            return Ok(BackgroundRequest::Transparent);
        }
        if value.starts_with('#') {
            return parse_hex_color(value)
                .map(BackgroundRequest::Solid)
                .ok_or_else(|| AttributeError::UnknownBackground(s.to_string()));
        }
        let name = value.to_ascii_lowercase();
        if NAMED_BACKGROUNDS.contains(&name.as_str()) {
            Ok(BackgroundRequest::Named(name))
        } else {
            Err(AttributeError::UnknownBackground(s.to_string()))
        }
    }
}

impl fmt::Display for BackgroundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundRequest::Transparent => f.write_str("transparent"),
            BackgroundRequest::Solid(color) => write!(f, "#{color:06x}"),
            BackgroundRequest::Named(name) => f.write_str(name),
        }
    }
}

/// One frozen copy of the book inside the stack
#[derive(Debug, Clone)]
pub struct StackEntry {
    pub snapshot: BookSnapshot,
    /// Placement relative to the stack container
    pub transform: Transform,
}

/// Container for stacked copies, placed beside the live book
#[derive(Debug, Clone)]
pub struct StackGroup {
    pub transform: Transform,
    entries: Vec<StackEntry>,
}

impl StackGroup {
    fn new() -> Self {
        Self {
            transform: Transform::new(Vec3::new(CONFIG.stack.offset_x, 0.0, 0.0), Vec3::ZERO),
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Something that happened while applying finished loads
#[derive(Debug)]
pub enum LoadEvent {
    TextureApplied {
        role: SurfaceRole,
        outcome: TextureOutcome,
    },
    BackgroundApplied,
    /// The target kept its previous state
    Failed { slot: LoadSlot, error: LoadError },
}

/// A frame capture whose PNG encoding is still running
pub struct PendingExport {
    receiver: Receiver<Result<Vec<u8>, ExportError>>,
}

impl PendingExport {
    fn encode(pixels: RgbaImage) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let job = move || {
            let _ = sender.send(encode_png(&pixels));
        };
        if let Err(e) = thread::Builder::new().name("png-encode".into()).spawn(job) {
            // Sender is dropped with the job; `wait` reports Disconnected
            warn!("Could not spawn PNG encoder: {}", e);
        }
        Self { receiver }
    }

    /// Non-blocking check. `None` while encoding is still running.
    pub fn try_take(&self) -> Option<Result<Vec<u8>, ExportError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ExportError::Disconnected)),
        }
    }

    /// Block until the encoded PNG is available
    pub fn wait(self) -> Result<Vec<u8>, ExportError> {
        self.receiver.recv().map_err(|_| ExportError::Disconnected)?
    }
}

fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    pixels.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Write `bytes` to `path` through a temporary sibling so a failed write
/// never leaves a partial file under the final name
pub fn write_export(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let partial = path.with_extension("png.part");

    let written = fs::File::create(&partial).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&partial, path)) {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}

/// Owner of the whole mockup scene
pub struct SceneComposer {
    settings: Settings,
    camera: OrbitCamera,
    lighting: LightingRig,
    shadow_plane: ShadowPlane,
    book: BookModel,
    pose: Option<Pose>,
    stack: Option<StackGroup>,
    background: Background,
    loader: TextureLoader,
    viewport: (u32, u32),
    rng: StdRng,
    revision: u64,
}

impl SceneComposer {
    pub fn new() -> Result<Self, AttributeError> {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Result<Self, AttributeError> {
        let (width, height) = DEFAULT_VIEWPORT;
        let book = BookModel::new(BookAttributes::default())?;
        info!(
            "Scene ready: {} book, load policy {:?}",
            book.attributes().format,
            settings.load_policy
        );

        Ok(Self {
            camera: OrbitCamera::new(width as f32 / height as f32),
            lighting: LightingRig::studio(),
            shadow_plane: ShadowPlane::default(),
            book,
            pose: None,
            stack: None,
            background: Background::default(),
            loader: TextureLoader::new(settings.load_policy),
            viewport: DEFAULT_VIEWPORT,
            rng: StdRng::from_os_rng(),
            revision: 0,
            settings,
        })
    }

    /// Make stack jitter reproducible
    pub fn seed_stack_jitter(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn lighting(&self) -> &LightingRig {
        &self.lighting
    }

    pub fn shadow_plane(&self) -> &ShadowPlane {
        &self.shadow_plane
    }

    pub fn book(&self) -> &BookModel {
        &self.book
    }

    pub fn pose(&self) -> Option<Pose> {
        self.pose
    }

    pub fn stack(&self) -> Option<&StackGroup> {
        self.stack.as_ref()
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Changes whenever anything the renderer caches changes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Image loads not yet applied
    pub fn pending_loads(&self) -> usize {
        self.loader.pending()
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn set_thickness(&mut self, thickness: f32) -> Result<(), AttributeError> {
        self.book.set_thickness(thickness)?;
        self.touch();
        Ok(())
    }

    /// Returns whether the geometry was rebuilt
    pub fn set_format(&mut self, format: BookFormat) -> Result<bool, AttributeError> {
        let rebuilt = self.book.set_format(format)?;
        if rebuilt {
            self.touch();
        }
        Ok(rebuilt)
    }

    /// Start loading artwork for a role. Applied by a later `update`.
    pub fn set_texture(&mut self, role: SurfaceRole, source: ImageSource) -> u64 {
        self.loader.request(LoadSlot::Material(role), source)
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.book.transform.apply_pose(pose);
        self.pose = Some(pose);
        self.touch();
        debug!("Pose set to {}", pose);
    }

    /// Freeze a copy of the live book on top of the stack
    pub fn add_to_stack(&mut self) -> usize {
        let thickness = self.book.attributes().thickness;
        let jitter = CONFIG.stack.jitter;
        let twist = self.rng.random_range(-jitter..=jitter);
        let snapshot = self.book.snapshot();

        let stack = self.stack.get_or_insert_with(|| {
            debug!("Creating stack container");
            StackGroup::new()
        });
        let index = stack.entries.len();
        stack.entries.push(StackEntry {
            snapshot,
            transform: Transform::new(
                Vec3::new(0.0, index as f32 * thickness, 0.0),
                Vec3::new(-FRAC_PI_2, 0.0, twist),
            ),
        });
        let len = stack.entries.len();

        self.touch();
        info!("Added book to stack ({} total)", len);
        len
    }

    /// Drop the stack container and every entry in it
    pub fn clear_stack(&mut self) {
        if let Some(stack) = self.stack.take() {
            info!("Cleared stack of {} book(s)", stack.len());
            self.touch();
        }
    }

    /// Accepts `"transparent"`, `"#rrggbb"` or a named background
    pub fn set_background(&mut self, value: &str) -> Result<(), AttributeError> {
        let request: BackgroundRequest = value.parse()?;
        self.apply_background(request);
        Ok(())
    }

    pub fn apply_background(&mut self, request: BackgroundRequest) {
        match request {
            BackgroundRequest::Transparent => {
                self.background = Background::Transparent;
                self.touch();
            }
            BackgroundRequest::Solid(color) => {
                self.background = Background::Solid(color);
                self.touch();
            }
            BackgroundRequest::Named(name) => {
                let path = self.settings.background_asset(&name);
                self.loader.request(LoadSlot::Background, ImageSource::Path(path));
            }
        }
    }

    /// Track the output surface size. Zero sizes (before layout) count as 1.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        if size == self.viewport {
            return;
        }
        self.viewport = size;
        self.camera.set_aspect(size.0 as f32 / size.1 as f32);
        debug!("Viewport resized to {}x{}", size.0, size.1);
    }

    /// Queue an orbit from a pointer drag in pixels
    pub fn orbit(&mut self, delta_x: f32, delta_y: f32) {
        self.camera.rotate(delta_x, delta_y);
    }

    pub fn zoom(&mut self, steps: f32) {
        self.camera.zoom(steps);
    }

    pub fn reset_camera(&mut self) {
        self.camera.reset();
    }

    /// Per-frame tick: advance camera damping and apply finished loads
    pub fn update(&mut self) -> Vec<LoadEvent> {
        self.camera.update();
        let completions = self.loader.poll();
        self.apply_completions(completions)
    }

    /// Block until outstanding loads finished (or `timeout`), then apply them
    pub fn wait_for_loads(&mut self, timeout: Duration) -> Vec<LoadEvent> {
        let completions = self.loader.wait(timeout);
        self.apply_completions(completions)
    }

    fn apply_completions(&mut self, completions: Vec<LoadCompletion>) -> Vec<LoadEvent> {
        completions
            .into_iter()
            .map(|completion| self.apply_completion(completion))
            .collect()
    }

    fn apply_completion(&mut self, completion: LoadCompletion) -> LoadEvent {
        let LoadCompletion { slot, result, .. } = completion;
        let texture = match result {
            Ok(texture) => texture,
            Err(error) => {
                warn!("Image load for {:?} failed: {}", slot, error);
                return LoadEvent::Failed { slot, error };
            }
        };

        self.touch();
        match slot {
            LoadSlot::Material(role) => {
                let outcome = self.book.apply_texture(role, texture);
                info!("Applied {} texture ({:?})", role, outcome);
                LoadEvent::TextureApplied { role, outcome }
            }
            LoadSlot::Background => {
                info!("Applied background image {}x{}", texture.width(), texture.height());
                self.background = Background::Image(texture);
                LoadEvent::BackgroundApplied
            }
        }
    }

    /// Flatten the scene into a draw description
    pub fn frame(&self) -> SceneFrame<'_> {
        let book_matrix = self.book.transform.matrix();
        let mut instances: Vec<DrawInstance<'_>> = self
            .book
            .primitives()
            .iter()
            .map(|primitive| DrawInstance {
                mesh: &primitive.mesh,
                materials: self.book.materials(),
                model: book_matrix * Mat4::from_translation(primitive.part.position),
                casts_shadow: primitive.part.casts_shadow,
            })
            .collect();

        if let Some(stack) = &self.stack {
            let container = stack.transform.matrix();
            for entry in &stack.entries {
                let entry_matrix = container * entry.transform.matrix();
                instances.extend(entry.snapshot.primitives.iter().map(|primitive| DrawInstance {
                    mesh: &primitive.mesh,
                    materials: &entry.snapshot.materials,
                    model: entry_matrix * Mat4::from_translation(primitive.part.position),
                    casts_shadow: primitive.part.casts_shadow,
                }));
            }
        }

        SceneFrame {
            revision: self.revision,
            viewport: self.viewport,
            view_proj: self.camera.view_projection_matrix(),
            camera_position: self.camera.position(),
            lighting: &self.lighting,
            shadow_plane: &self.shadow_plane,
            background: &self.background,
            instances,
        }
    }

    pub fn render(&self, renderer: &mut dyn Renderer) -> Result<(), RenderError> {
        renderer.render(&self.frame())
    }

    /// Render once, read the drawing surface back and start PNG encoding.
    ///
    /// The render happens first because the drawing surface may have been
    /// cleared since the last displayed frame.
    pub fn capture_frame(&self, renderer: &mut dyn Renderer) -> Result<PendingExport, ExportError> {
        self.render(renderer)?;
        let pixels = renderer.read_pixels()?;
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(RenderError::EmptySurface.into());
        }
        debug!("Captured {}x{} frame", pixels.width(), pixels.height());
        Ok(PendingExport::encode(pixels))
    }

    /// Capture, encode and write the export file. Returns where it was written.
    pub fn export_image(&self, renderer: &mut dyn Renderer) -> Result<PathBuf, ExportError> {
        let bytes = self.capture_frame(renderer)?.wait()?;
        let path = self.settings.export_path();
        write_export(&path, &bytes)?;
        info!("Exported {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Release the book's primitives and the stack. The scene renders only
    /// its backdrop afterwards.
    pub fn dispose(&mut self) {
        self.book.dispose();
        self.stack = None;
        self.background = Background::Transparent;
        self.touch();
        info!(
            "Scene disposed ({} primitive(s) released over its lifetime)",
            self.book.disposed_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn scene() -> SceneComposer {
        let mut scene = SceneComposer::new().unwrap();
        scene.seed_stack_jitter(7);
        scene
    }

    #[test]
    fn background_requests_parse() {
        assert_eq!(
            "transparent".parse::<BackgroundRequest>(),
            Ok(BackgroundRequest::Transparent)
        );
        assert_eq!(
            "#1e293b".parse::<BackgroundRequest>(),
            Ok(BackgroundRequest::Solid(0x1e293b))
        );
        assert_eq!(
            "Wood".parse::<BackgroundRequest>(),
            Ok(BackgroundRequest::Named("wood".into()))
        );
        assert!(matches!(
            "marble".parse::<BackgroundRequest>(),
            Err(AttributeError::UnknownBackground(_))
        ));
        assert!("#12".parse::<BackgroundRequest>().is_err());
        assert!("#+12345".parse::<BackgroundRequest>().is_err());
    }

    #[test]
    fn fresh_scene_draws_one_hardcover_book() {
        let scene = scene();
        let frame = scene.frame();
        assert_eq!(frame.instances.len(), 4);
        assert_eq!(frame.viewport, DEFAULT_VIEWPORT);
        assert_eq!(*frame.background, Background::Transparent);
    }

    #[test]
    fn stack_entries_are_offset_by_thickness_and_lie_flat() {
        let mut scene = scene();
        for _ in 0..3 {
            scene.add_to_stack();
        }
        let stack = scene.stack().unwrap();
        assert_eq!(stack.transform.position.x, 3.5);
        for (i, entry) in stack.entries().iter().enumerate() {
            assert_eq!(entry.transform.position.y, i as f32 * 0.8);
            assert_eq!(entry.transform.rotation.x, -PI / 2.0);
            assert!(entry.transform.rotation.z.abs() <= 0.1);
        }
        assert_eq!(scene.frame().instances.len(), 4 + 3 * 4);
    }

    #[test]
    fn clear_stack_restarts_indexing() {
        let mut scene = scene();
        scene.add_to_stack();
        scene.add_to_stack();
        scene.clear_stack();
        assert!(scene.stack().is_none());
        assert_eq!(scene.add_to_stack(), 1);
        assert_eq!(scene.stack().unwrap().entries()[0].transform.position.y, 0.0);
    }

    #[test]
    fn stack_snapshot_ignores_later_edits() {
        let mut scene = scene();
        scene.add_to_stack();
        scene.set_format(BookFormat::Softcover).unwrap();
        scene.set_thickness(2.0).unwrap();
        let entry = &scene.stack().unwrap().entries()[0];
        assert_eq!(entry.snapshot.primitives.len(), 4);
        assert_eq!(entry.snapshot.attributes.thickness, 0.8);
    }

    #[test]
    fn pose_survives_rebuilds() {
        let mut scene = scene();
        scene.set_pose(Pose::Angled);
        scene.set_thickness(1.2).unwrap();
        assert_eq!(scene.book().transform.rotation, Pose::Angled.rotation());
        assert_eq!(scene.pose(), Some(Pose::Angled));
    }

    #[test]
    fn invalid_thickness_leaves_scene_untouched() {
        let mut scene = scene();
        let revision = scene.revision();
        assert!(scene.set_thickness(0.1).is_err());
        assert!(scene.set_thickness(f32::NAN).is_err());
        assert_eq!(scene.revision(), revision);
        assert_eq!(scene.book().attributes().thickness, 0.8);
    }

    #[test]
    fn resize_clamps_zero_and_is_idempotent() {
        let mut scene = scene();
        scene.on_resize(0, 0);
        assert_eq!(scene.viewport(), (1, 1));
        assert_eq!(scene.camera().aspect, 1.0);
        scene.on_resize(800, 400);
        scene.on_resize(800, 400);
        assert_eq!(scene.viewport(), (800, 400));
        assert_eq!(scene.camera().aspect, 2.0);
    }

    #[test]
    fn solid_background_applies_immediately() {
        let mut scene = scene();
        scene.set_background("#ffffff").unwrap();
        assert_eq!(*scene.background(), Background::Solid(0xffffff));
        scene.set_background("transparent").unwrap();
        assert_eq!(*scene.background(), Background::Transparent);
        assert!(scene.set_background("plaid").is_err());
        assert_eq!(*scene.background(), Background::Transparent);
    }

    #[test]
    fn failed_background_load_keeps_previous_backdrop() {
        let mut settings = Settings::default();
        settings.assets_dir = PathBuf::from("/no/such/assets");
        let mut scene = SceneComposer::with_settings(settings).unwrap();
        scene.set_background("#000000").unwrap();
        scene.set_background("wood").unwrap();

        let events = scene.wait_for_loads(Duration::from_secs(10));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            LoadEvent::Failed {
                slot: LoadSlot::Background,
                ..
            }
        ));
        assert_eq!(*scene.background(), Background::Solid(0x000000));
    }

    #[test]
    fn dispose_releases_everything() {
        let mut scene = scene();
        scene.add_to_stack();
        scene.dispose();
        assert!(scene.frame().instances.is_empty());
        assert!(scene.stack().is_none());
        assert_eq!(scene.book().disposed_count(), 4);
    }

    #[test]
    fn export_write_leaves_no_partial_file() {
        let dir = std::env::temp_dir().join(format!("book-mockup-write-{}", std::process::id()));
        let path = dir.join("out.png");
        write_export(&path, b"png bytes").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"png bytes");
        assert!(!path.with_extension("png.part").exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
