//! Book Mockup - interactive 3D book mockups
//!
//! Builds parametric hardcover and softcover book models, dresses them with
//! artwork, poses and stacks them under a fixed studio light rig and exports
//! still PNG images. Rendering goes through wgpu; any other rasterizer can be
//! plugged in behind the `Renderer` trait.

pub mod book;
pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod lighting;
pub mod loader;
pub mod material;
pub mod mesh;
pub mod pose;
pub mod render;
pub mod scene;
pub mod settings;

pub use book::{BookModel, BookSnapshot, TextureOutcome};
pub use error::{AttributeError, ExportError, LoadError, RenderError};
pub use geometry::{BookAttributes, BookFormat, MeshPart};
pub use gpu::GpuRenderer;
pub use loader::{ImageSource, LoadPolicy};
pub use material::{MaterialBindings, MaterialDescriptor, SurfaceRole, Texture};
pub use pose::Pose;
pub use render::{Renderer, SceneFrame};
pub use scene::{Background, LoadEvent, PendingExport, SceneComposer};
pub use settings::Settings;
