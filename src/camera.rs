//! Camera module for 3D rendering
//!
//! Implements an orbit camera around a target point with damped yaw/pitch
//! and zoom, driven by pointer input from the window layer.

use glam::{Mat4, Vec3};
use crate::config::CONFIG;

/// Keeps the camera from flipping over the poles
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Pending deltas below this are dropped so damping settles
const SETTLE_EPSILON: f32 = 1e-5;

/// Orbit camera state and controls
pub struct OrbitCamera {
    /// Point the camera orbits and looks at
    pub target: Vec3,
    /// Horizontal angle around the target in radians
    pub yaw: f32,
    /// Vertical angle above the target's horizon in radians
    pub pitch: f32,
    /// Distance from the target
    pub distance: f32,
    /// Field of view in radians
    pub fov: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Fraction of the pending motion applied per update
    pub damping_factor: f32,
    /// Radians per pixel of pointer movement
    pub rotate_speed: f32,
    /// Orbit motion not yet applied (yaw, pitch)
    pending_rotation: (f32, f32),
    /// Zoom factor not yet applied
    pending_zoom: f32,
}

impl OrbitCamera {
    /// Create a new camera with default settings
    pub fn new(aspect: f32) -> Self {
        let config = &CONFIG.camera;
        let (yaw, pitch, distance) = Self::calculate_orbit(config.position, config.target);

        Self {
            target: config.target,
            yaw,
            pitch,
            distance,
            fov: config.fov.to_radians(),
            aspect: sanitize_aspect(aspect),
            near: config.near,
            far: config.far,
            damping_factor: config.damping_factor,
            rotate_speed: config.rotate_speed,
            pending_rotation: (0.0, 0.0),
            pending_zoom: 1.0,
        }
    }

    /// Calculate yaw, pitch and distance of a position relative to a target
    fn calculate_orbit(position: Vec3, target: Vec3) -> (f32, f32, f32) {
        let offset = position - target;
        let distance = offset.length().max(f32::EPSILON);

        // Yaw: horizontal angle from positive Z axis
        let yaw = offset.x.atan2(offset.z);
        let pitch = (offset.y / distance).clamp(-1.0, 1.0).asin();

        (yaw, pitch, distance)
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        self.target
            + self.distance
                * Vec3::new(
                    self.yaw.sin() * self.pitch.cos(),
                    self.pitch.sin(),
                    self.yaw.cos() * self.pitch.cos(),
                )
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    /// Get the combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Update aspect ratio (on window resize)
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = sanitize_aspect(aspect);
    }

    /// Queue an orbit from a pointer drag of (delta_x, delta_y) pixels
    pub fn rotate(&mut self, delta_x: f32, delta_y: f32) {
        // Dragging right swings the camera left around the target
        self.pending_rotation.0 -= delta_x * self.rotate_speed;
        self.pending_rotation.1 += delta_y * self.rotate_speed;
    }

    /// Queue a zoom step; positive steps move closer
    pub fn zoom(&mut self, steps: f32) {
        self.pending_zoom *= CONFIG.camera.zoom_speed.powf(steps);
    }

    /// Apply a damped share of the queued motion. Call once per frame.
    pub fn update(&mut self) -> bool {
        let (dyaw, dpitch) = self.pending_rotation;
        let moving = dyaw.abs() > SETTLE_EPSILON
            || dpitch.abs() > SETTLE_EPSILON
            || (self.pending_zoom - 1.0).abs() > SETTLE_EPSILON;
        if !moving {
            self.pending_rotation = (0.0, 0.0);
            self.pending_zoom = 1.0;
            return false;
        }

        let k = self.damping_factor;
        self.yaw += dyaw * k;
        self.pitch = (self.pitch + dpitch * k).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.pending_rotation = (dyaw * (1.0 - k), dpitch * (1.0 - k));

        let step = self.pending_zoom.powf(k);
        let config = &CONFIG.camera;
        self.distance = (self.distance * step).clamp(config.min_distance, config.max_distance);
        self.pending_zoom /= step;

        true
    }

    /// Reset camera to default position and orientation
    pub fn reset(&mut self) {
        let aspect = self.aspect;
        *self = Self::new(aspect);
    }
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}
