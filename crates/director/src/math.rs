use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn distance_squared(self, other: Vec3) -> f32 {
        (self - other).length_squared()
    }

    pub fn scale(self, factor: f32) -> Vec3 {
        Vec3 {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    pub fn with_z(self, z: f32) -> Vec3 {
        Vec3 { z, ..self }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Per-axis comparison on the XY plane; height is ignored.
    pub fn horizontally_near(self, other: Vec3, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    pub fn nearly_equals(self, other: Vec3, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }

    /// Moves toward `target` by at most `speed * dt`, never overshooting.
    pub fn move_towards_constant(self, target: Vec3, dt: f32, speed: f32) -> Vec3 {
        let delta = target - self;
        let distance = delta.length();
        let max_step = speed * dt;
        if distance > max_step {
            if max_step > 0.0 {
                return self + delta.scale(max_step / distance);
            }
            return self;
        }
        target
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

/// Euler rotation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const ZERO: Rotator = Rotator {
        pitch: 0.0,
        yaw: 0.0,
        roll: 0.0,
    };

    pub fn look_at(from: Vec3, to: Vec3) -> Rotator {
        let dir = to - from;
        let planar = (dir.x * dir.x + dir.y * dir.y).sqrt();
        Rotator {
            pitch: dir.z.atan2(planar).to_degrees(),
            yaw: dir.y.atan2(dir.x).to_degrees(),
            roll: 0.0,
        }
    }

    pub fn is_finite(self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }
}

impl Add for Rotator {
    type Output = Rotator;

    fn add(self, rhs: Rotator) -> Rotator {
        Rotator {
            pitch: self.pitch + rhs.pitch,
            yaw: self.yaw + rhs.yaw,
            roll: self.roll + rhs.roll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Vec3,
    pub rotation: Rotator,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            rotation: Rotator::ZERO,
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}
