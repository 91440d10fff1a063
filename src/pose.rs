//! Named book orientations and the object transform they drive

use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::error::AttributeError;

/// Fixed orientation presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pose {
    Standing,
    Lying,
    Angled,
}

impl Pose {
    /// Euler angles (XYZ order) of the pose
    pub fn rotation(&self) -> Vec3 {
        match self {
            Pose::Standing => Vec3::new(0.0, -PI / 6.0, 0.0),
            Pose::Lying => Vec3::new(-PI / 2.0, 0.0, -PI / 6.0),
            Pose::Angled => Vec3::new(0.0, -PI / 4.0, PI / 8.0),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Pose::Standing => "Standing",
            Pose::Lying => "Lying",
            Pose::Angled => "Angled",
        }
    }

    pub fn all() -> &'static [Pose] {
        &[Pose::Standing, Pose::Lying, Pose::Angled]
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pose::Standing => "standing",
            Pose::Lying => "lying",
            Pose::Angled => "angled",
        })
    }
}

impl FromStr for Pose {
    type Err = AttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standing" => Ok(Pose::Standing),
            "lying" => Ok(Pose::Lying),
            "angled" => Ok(Pose::Angled),
            _ => Err(AttributeError::UnknownPose(s.to_string())),
        }
    }
}

/// Position plus Euler rotation (XYZ order, radians)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
    };

    pub fn new(position: Vec3, rotation: Vec3) -> Self {
        Self { position, rotation }
    }

    pub fn reset(&mut self) {
        *self = Self::IDENTITY;
    }

    /// Reset, then apply the pose's rotation. Poses never accumulate.
    pub fn apply_pose(&mut self, pose: Pose) {
        self.reset();
        self.rotation = pose.rotation();
    }

    pub fn quat(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.quat(), self.position)
    }
}
