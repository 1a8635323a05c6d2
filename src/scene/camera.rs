//! Viewpoint the main pass renders from

use glam::{Mat4, Vec3};

/// Lens of a camera; depth maps `near..far` to `0..1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    /// Box of `2 * half_width` by `2 * half_height` around the view axis
    Orthographic {
        half_width: f32,
        half_height: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: 45f32.to_radians(),
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Eye, look-at target and lens
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO)
    }
}

impl Camera {
    pub fn new(eye: Vec3, target: Vec3) -> Self {
        Self {
            eye,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// World to view space
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// World to clip space
    pub fn view_projection(&self) -> Mat4 {
        let projection = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                half_width,
                half_height,
                near,
                far,
            } => Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far),
        };
        projection * self.view_matrix()
    }

    /// `(near, far)` planes
    pub fn clip_range(&self) -> (f32, f32) {
        match self.projection {
            Projection::Perspective { near, far, .. } | Projection::Orthographic { near, far, .. } => (near, far),
        }
    }

    /// Match a perspective lens to a surface; orthographic lenses keep their box
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if let Projection::Perspective { aspect, .. } = &mut self.projection {
            *aspect = width / height.max(f32::EPSILON);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_projects_to_screen_center() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let clip = camera.view_projection() * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_set_aspect_only_touches_perspective() {
        let ortho = Projection::Orthographic {
            half_width: 2.0,
            half_height: 1.0,
            near: 0.1,
            far: 10.0,
        };
        let mut camera = Camera::default().with_projection(ortho);
        camera.set_aspect(800.0, 600.0);
        assert_eq!(camera.projection, ortho);
        assert_eq!(camera.clip_range(), (0.1, 10.0));

        let mut camera = Camera::default();
        camera.set_aspect(800.0, 400.0);
        assert!(matches!(camera.projection, Projection::Perspective { aspect, .. } if aspect == 2.0));
    }
}
