//! Compile-time configuration
//!
//! Default book attributes, per-role materials, camera, lighting rig and
//! stacking constants. Everything the user cannot change lives here.

use glam::Vec3;

/// Default attributes of a freshly created book
pub struct BookConfig {
    pub width: f32,
    pub height: f32,
    pub thickness: f32,
}

/// Default material values for a surface role
pub struct MaterialConfig {
    pub color: u32,
    pub roughness: f32,
    pub metalness: f32,
}

pub struct MaterialsConfig {
    pub cover: MaterialConfig,
    pub spine: MaterialConfig,
    pub back: MaterialConfig,
    pub pages: MaterialConfig,
}

/// Orbit camera defaults
pub struct CameraConfig {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

pub struct LightConfig {
    pub color: u32,
    pub intensity: f32,
    pub position: Vec3,
}

pub struct ShadowConfig {
    /// Caster height over the receiver at which the shadow has faded out
    pub radius: f32,
}

pub struct LightingConfig {
    pub ambient_color: u32,
    pub ambient_intensity: f32,
    pub key: LightConfig,
    pub key_shadow: ShadowConfig,
    pub fill: LightConfig,
    pub rim: LightConfig,
}

pub struct ShadowPlaneConfig {
    pub size: f32,
    pub y: f32,
    pub opacity: f32,
}

pub struct StackConfig {
    /// X offset of the stack container relative to the main book
    pub offset_x: f32,
    /// Maximum in-plane jitter in radians (applied as +/-)
    pub jitter: f32,
}

pub struct ExportConfig {
    pub file_name: &'static str,
}

pub struct UiConfig {
    pub min_thickness: f32,
    pub max_thickness: f32,
    pub solid_backgrounds: &'static [(u32, &'static str)],
}

pub struct Config {
    pub book: BookConfig,
    pub materials: MaterialsConfig,
    pub camera: CameraConfig,
    pub lighting: LightingConfig,
    pub shadow_plane: ShadowPlaneConfig,
    pub stack: StackConfig,
    pub export: ExportConfig,
    pub ui: UiConfig,
}

pub const CONFIG: Config = Config {
    book: BookConfig {
        width: 3.0,
        height: 4.5,
        thickness: 0.8,
    },
    materials: MaterialsConfig {
        cover: MaterialConfig {
            color: 0xeeeeee,
            roughness: 0.4,
            metalness: 0.1,
        },
        spine: MaterialConfig {
            color: 0xcccccc,
            roughness: 0.5,
            metalness: 0.05,
        },
        back: MaterialConfig {
            color: 0xeeeeee,
            roughness: 0.4,
            metalness: 0.1,
        },
        pages: MaterialConfig {
            color: 0xfdfdfd,
            roughness: 0.9,
            metalness: 0.0,
        },
    },
    camera: CameraConfig {
        position: Vec3::new(0.0, 0.0, 5.0),
        target: Vec3::ZERO,
        fov: 45.0,
        near: 0.1,
        far: 100.0,
        damping_factor: 0.05,
        rotate_speed: 0.005,
        zoom_speed: 0.95,
        min_distance: 1.5,
        max_distance: 40.0,
    },
    lighting: LightingConfig {
        ambient_color: 0xffffff,
        ambient_intensity: 0.7,
        key: LightConfig {
            color: 0xffffff,
            intensity: 0.8,
            position: Vec3::new(2.0, 10.0, 4.0),
        },
        key_shadow: ShadowConfig { radius: 4.0 },
        fill: LightConfig {
            color: 0xffffff,
            intensity: 0.3,
            position: Vec3::new(0.0, 2.0, 8.0),
        },
        rim: LightConfig {
            color: 0xffe4c4,
            intensity: 0.4,
            position: Vec3::new(-5.0, 4.0, -2.0),
        },
    },
    shadow_plane: ShadowPlaneConfig {
        size: 25.0,
        y: -2.26,
        opacity: 0.5,
    },
    stack: StackConfig {
        offset_x: 3.5,
        jitter: 0.1,
    },
    export: ExportConfig {
        file_name: "book-mockup-3d.png",
    },
    ui: UiConfig {
        min_thickness: 0.2,
        max_thickness: 3.0,
        solid_backgrounds: &[
            (0xffffff, "White"),
            (0xf1f5f9, "Paper"),
            (0x1e293b, "Slate"),
            (0x000000, "Black"),
        ],
    },
};

/// Convert a hex color (0xRRGGBB) to linear-ish RGB floats in [0, 1]
pub fn hex_to_rgb(hex: u32) -> (f32, f32, f32) {
    let r = ((hex >> 16) & 0xff) as f32 / 255.0;
    let g = ((hex >> 8) & 0xff) as f32 / 255.0;
    let b = (hex & 0xff) as f32 / 255.0;
    (r, g, b)
}

/// Convert a hex color (0xRRGGBB) to RGBA floats with full opacity
pub fn hex_to_rgba(hex: u32) -> [f32; 4] {
    let (r, g, b) = hex_to_rgb(hex);
    [r, g, b, 1.0]
}

/// Parse a CSS-style `#rrggbb` (or `#rgb`) string into 0xRRGGBB
pub fn parse_hex_color(value: &str) -> Option<u32> {
    let digits = value.strip_prefix('#')?;
    // from_str_radix alone would accept a sign
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => u32::from_str_radix(digits, 16).ok(),
        3 => {
            let short = u32::from_str_radix(digits, 16).ok()?;
            let r = (short >> 8) & 0xf;
            let g = (short >> 4) & 0xf;
            let b = short & 0xf;
            Some((r * 0x11) << 16 | (g * 0x11) << 8 | b * 0x11)
        }
        _ => None,
    }
}
