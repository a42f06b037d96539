use glam::Vec3;
use winit::keyboard::KeyCode;
use wormhole_shared::raycast::Ray;
use wormhole_shared::view::{CameraPose, Projection};

use crate::input::InputState;

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.7, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            fov: 70.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.05,
            far: 200.0,
        }
    }
}

impl Camera {
    pub fn update_look(&mut self, input: &InputState, look_sensitivity: f32) {
        const MAX_PITCH: f32 = 89.0_f32.to_radians();

        self.yaw += input.mouse_delta.x * look_sensitivity;
        self.pitch -= input.mouse_delta.y * look_sensitivity;
        self.pitch = self.pitch.clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Facing projected onto the ground plane.
    pub fn horizontal_forward(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), 0.0, self.yaw.sin()).normalize_or_zero()
    }

    pub fn movement_dir(&self, input: &InputState) -> Vec3 {
        let forward = self.horizontal_forward();
        let right = Vec3::new(-forward.z, 0.0, forward.x);

        let mut dir = Vec3::ZERO;
        if input.is_pressed(KeyCode::KeyW) {
            dir += forward;
        }
        if input.is_pressed(KeyCode::KeyS) {
            dir -= forward;
        }
        if input.is_pressed(KeyCode::KeyD) {
            dir += right;
        }
        if input.is_pressed(KeyCode::KeyA) {
            dir -= right;
        }
        if input.is_pressed(KeyCode::Space) {
            dir += Vec3::Y;
        }
        if input.is_pressed(KeyCode::ShiftLeft) {
            dir -= Vec3::Y;
        }

        dir.normalize_or_zero()
    }

    pub fn fly(&mut self, input: &InputState, speed: f32, dt: f32) {
        self.position += self.movement_dir(input) * speed * dt;
    }

    pub fn forward_direction(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize_or_zero()
    }

    pub fn projection(&self) -> Projection {
        Projection {
            fov_y_radians: self.fov,
            aspect: self.aspect.max(0.0001),
            near: self.near.max(0.0001),
            far: self.far.max(self.near + 0.0001),
        }
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.position,
            forward: self.forward_direction(),
            projection: self.projection(),
        }
    }

    pub fn ray(&self) -> Ray {
        Ray::new(self.position, self.forward_direction())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use winit::keyboard::KeyCode;

    use super::Camera;
    use crate::input::InputState;

    #[test]
    fn zero_yaw_looks_along_positive_x() {
        let camera = Camera::default();
        assert!(camera.forward_direction().distance(Vec3::X) < 1e-6);
        assert!(camera.pose().forward.distance(Vec3::X) < 1e-6);
    }

    #[test]
    fn horizontal_forward_ignores_pitch() {
        let camera = Camera {
            yaw: std::f32::consts::FRAC_PI_2,
            pitch: -1.2,
            ..Camera::default()
        };
        let facing = camera.horizontal_forward();
        assert_eq!(facing.y, 0.0);
        assert!(facing.distance(Vec3::Z) < 1e-6);
        assert!(camera.ray().direction.y < 0.0);
    }

    #[test]
    fn fly_moves_along_held_keys() {
        let mut camera = Camera::default();
        let mut input = InputState::default();
        input.press_key(KeyCode::KeyW);
        input.press_key(KeyCode::Space);
        camera.fly(&input, 2.0, 0.5);

        let expected = Vec3::new(0.0, 1.7, 0.0) + Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!(camera.position.distance(expected) < 1e-5);
    }

    #[test]
    fn look_pitch_is_clamped() {
        let mut camera = Camera::default();
        let mut input = InputState::default();
        input.add_mouse_delta(glam::Vec2::new(0.0, -10_000.0));
        camera.update_look(&input, 0.01);
        assert!(camera.pitch <= 89.0_f32.to_radians());
        assert!(camera.forward_direction().is_finite());
    }
}
