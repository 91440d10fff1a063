//! Studio lighting rig and shadow receiver
//!
//! A fixed product-shot setup: ambient fill, a shadow-casting key light from
//! above-front, a faint front fill and a warm rim light from back-left.

use glam::Vec3;

use crate::config::{hex_to_rgb, LightConfig, CONFIG};

/// Contact shadow of a shadow-casting light.
///
/// Casters are projected onto the receiver plane; the shadow softens and
/// fades as the casting surface rises, reaching zero at `radius`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    pub radius: f32,
}

/// Directional light shining from `position` toward the origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: u32,
    pub intensity: f32,
    pub position: Vec3,
    pub shadow: Option<ShadowSettings>,
}

impl DirectionalLight {
    fn from_config(config: &LightConfig) -> Self {
        Self {
            color: config.color,
            intensity: config.intensity,
            position: config.position,
            shadow: None,
        }
    }

    /// Unit vector from the lit surface toward the light
    pub fn direction(&self) -> Vec3 {
        self.position.try_normalize().unwrap_or(Vec3::Y)
    }

    /// Color premultiplied by intensity
    pub fn radiance(&self) -> Vec3 {
        let (r, g, b) = hex_to_rgb(self.color);
        Vec3::new(r, g, b) * self.intensity
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: u32,
    pub intensity: f32,
}

impl AmbientLight {
    pub fn radiance(&self) -> Vec3 {
        let (r, g, b) = hex_to_rgb(self.color);
        Vec3::new(r, g, b) * self.intensity
    }
}

/// The complete, fixed light setup
#[derive(Debug, Clone, PartialEq)]
pub struct LightingRig {
    pub ambient: AmbientLight,
    pub key: DirectionalLight,
    pub fill: DirectionalLight,
    pub rim: DirectionalLight,
}

impl Default for LightingRig {
    fn default() -> Self {
        Self::studio()
    }
}

impl LightingRig {
    pub fn studio() -> Self {
        let config = &CONFIG.lighting;
        let shadow = &config.key_shadow;

        let mut key = DirectionalLight::from_config(&config.key);
        key.shadow = Some(ShadowSettings {
            radius: shadow.radius,
        });

        Self {
            ambient: AmbientLight {
                color: config.ambient_color,
                intensity: config.ambient_intensity,
            },
            key,
            fill: DirectionalLight::from_config(&config.fill),
            rim: DirectionalLight::from_config(&config.rim),
        }
    }

    /// Directional lights in a fixed order: key, fill, rim
    pub fn directional(&self) -> [&DirectionalLight; 3] {
        [&self.key, &self.fill, &self.rim]
    }

    /// The light whose shadow lands on the receiver plane
    pub fn shadow_caster(&self) -> Option<&DirectionalLight> {
        self.directional().into_iter().find(|l| l.shadow.is_some())
    }
}

/// Invisible ground plane that only shows shadows
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowPlane {
    pub size: f32,
    pub y: f32,
    pub opacity: f32,
}

impl Default for ShadowPlane {
    fn default() -> Self {
        let config = &CONFIG.shadow_plane;
        Self {
            size: config.size,
            y: config.y,
            opacity: config.opacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_key_light_casts_shadows() {
        let rig = LightingRig::studio();
        let caster = rig.shadow_caster().unwrap();
        assert_eq!(caster.position, Vec3::new(2.0, 10.0, 4.0));
        let shadow = caster.shadow.unwrap();
        assert_eq!(shadow.radius, 4.0);
        assert!(rig.fill.shadow.is_none());
        assert!(rig.rim.shadow.is_none());
    }

    #[test]
    fn rim_light_is_warm_and_behind() {
        let rig = LightingRig::studio();
        let radiance = rig.rim.radiance();
        assert!(radiance.x > radiance.z);
        assert!(rig.rim.direction().z < 0.0);
        assert!(rig.rim.direction().x < 0.0);
    }

    #[test]
    fn shadow_plane_sits_below_the_default_book() {
        let plane = ShadowPlane::default();
        assert!(plane.y < -CONFIG.book.height / 2.0);
        assert_eq!(plane.opacity, 0.5);
    }
}
