//! Local transforms as scene documents describe them.
//!
//! Nodes store a plain 4×4 matrix; [`Transform`] is the decomposed form used
//! while building them (translation, rotation, scale) and converts with
//! [`Transform::to_matrix`].

use cgmath::{Deg, Euler, One};

/// Translation, rotation (as quaternion) and non-uniform scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Transform {
    /// Identity transform (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Builds a transform from a translation, XYZ Euler angles in degrees and a scale.
    pub fn from_euler_degrees(translation: [f32; 3], rotation: [f32; 3], scale: [f32; 3]) -> Self {
        let euler = Euler::new(Deg(rotation[0]), Deg(rotation[1]), Deg(rotation[2]));
        Self {
            position: translation.into(),
            rotation: euler.into(),
            scale: scale.into(),
        }
    }

    /// `T * R * S`
    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl From<cgmath::Vector3<f32>> for Transform {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Transform {
            position,
            ..Default::default()
        }
    }
}

impl From<Transform> for cgmath::Matrix4<f32> {
    fn from(transform: Transform) -> Self {
        transform.to_matrix()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
