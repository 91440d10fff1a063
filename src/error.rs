//! Error types
//!
//! Every failure is local to the operation that caused it. None of these
//! leave the book model or the scene in a state that cannot be rendered.

use std::path::PathBuf;

use thiserror::Error;

/// A book attribute or a named choice was rejected before touching the model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributeError {
    #[error("{name} must be a positive finite number, got {value}")]
    NonPositive { name: &'static str, value: f32 },
    #[error("thickness {thickness} leaves no room for the page block (must exceed {minimum})")]
    ThicknessTooThin { thickness: f32, minimum: f32 },
    #[error("{name} {value} is too small for the page block overhang (must exceed {minimum})")]
    TooSmallForPages {
        name: &'static str,
        value: f32,
        minimum: f32,
    },
    #[error("unknown book format '{0}' (expected 'hardcover' or 'softcover')")]
    UnknownFormat(String),
    #[error("unknown pose '{0}' (expected 'standing', 'lying' or 'angled')")]
    UnknownPose(String),
    #[error("unknown surface role '{0}'")]
    UnknownRole(String),
    #[error("unknown background '{0}' (expected 'transparent', '#rrggbb' or 'wood')")]
    UnknownBackground(String),
}

/// A texture or background image could not be loaded.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("loader worker went away before delivering a result")]
    Disconnected,
}

/// The renderer could not produce or read back a frame.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to acquire GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("failed to read back frame: {0}")]
    Readback(String),
    #[error("drawing surface has no pixels")]
    EmptySurface,
}

/// Capturing or writing an exported image failed. No partial file is left behind.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("render before capture failed: {0}")]
    Render(#[from] RenderError),
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoder worker went away before delivering a result")]
    Disconnected,
}
