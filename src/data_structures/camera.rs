//! Camera payload of a scene node.
//!
//! The camera's placement is the node's transform; this type only adds the
//! projection and whether the camera currently reacts to input.

use cgmath::{Matrix4, Rad};

// wgpu clips depth to 0..1 while cgmath produces GL-style -1..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub fovy: Rad<f32>,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
    projection: Matrix4<f32>,
    enabled: bool,
}

impl Camera {
    pub const DEFAULT_FOVY: f32 = 1.5;
    pub const DEFAULT_ZNEAR: f32 = 1.0;
    pub const DEFAULT_ZFAR: f32 = 100.0;

    pub fn new<F: Into<Rad<f32>>>(fovy: F, aspect: f32, znear: f32, zfar: f32) -> Self {
        let mut camera = Self {
            fovy: fovy.into(),
            aspect,
            znear,
            zfar,
            projection: Matrix4::from_scale(1.0),
            enabled: false,
        };
        camera.update_projection();
        camera
    }

    pub fn projection(&self) -> &Matrix4<f32> {
        &self.projection
    }

    pub fn update_projection(&mut self) {
        self.projection = OPENGL_TO_WGPU_MATRIX
            * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar);
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.update_projection();
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Only an enabled camera responds to movement and look input.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(
            Rad(Self::DEFAULT_FOVY),
            1.0,
            Self::DEFAULT_ZNEAR,
            Self::DEFAULT_ZFAR,
        )
    }
}
