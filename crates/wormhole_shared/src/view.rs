use glam::{Mat3, Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::portal::Portal;

pub const WORLD_UP: Vec3 = Vec3::Y;

/// Only a forward this close to the up reference leaves `look_to` without a basis.
const UP_PARALLEL_THRESHOLD: f32 = 1.0 - 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_y_radians: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y_radians: 70.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.05,
            far: 200.0,
        }
    }
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, self.aspect.max(1.0e-3), self.near, self.far)
    }
}

/// What the camera collaborator hands over each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub forward: Vec3,
    pub projection: Projection,
}

impl CameraPose {
    pub fn view_pose(&self) -> ViewPose {
        let forward = self.forward.normalize_or(Vec3::NEG_Z);
        ViewPose::look_to(
            self.position,
            forward,
            up_reference(forward, Vec3::Z),
            self.projection.matrix(),
        )
    }
}

/// A fully resolved view: where the eye is and the matrices to draw with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewPose {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub view: Mat4,
    pub proj: Mat4,
}

impl ViewPose {
    pub fn look_to(position: Vec3, forward: Vec3, up: Vec3, proj: Mat4) -> Self {
        Self {
            position,
            forward,
            up,
            view: Mat4::look_to_rh(position, forward, up),
            proj,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    pub fn with_projection(self, proj: Mat4) -> Self {
        Self { proj, ..self }
    }
}

/// Maps entry-portal space onto exit-portal space: the local right and normal components flip,
/// the up component is kept. Looking into one portal is looking out of the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalTransform {
    rotation: Mat3,
    entry_center: Vec3,
    exit_center: Vec3,
}

impl PortalTransform {
    pub fn between(entry: &Portal, exit: &Portal) -> Self {
        let flip = Mat3::from_diagonal(Vec3::new(-1.0, 1.0, -1.0));
        Self {
            rotation: exit.basis() * flip * entry.basis().transpose(),
            entry_center: entry.center,
            exit_center: exit.center,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.exit_center + self.rotation * (point - self.entry_center)
    }

    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    pub fn rotation(&self) -> Mat3 {
        self.rotation
    }
}

/// Pose of the observer seen through `entry`, placed behind `exit`. One level only.
pub fn virtual_camera(camera: &CameraPose, entry: &Portal, exit: &Portal) -> ViewPose {
    let transform = PortalTransform::between(entry, exit);
    let position = transform.transform_point(camera.position);
    let forward = transform
        .transform_direction(camera.forward)
        .normalize_or(-exit.normal);

    let fallback = if forward.dot(exit.up).abs() > UP_PARALLEL_THRESHOLD {
        exit.normal
    } else {
        exit.up
    };
    ViewPose::look_to(
        position,
        forward,
        up_reference(forward, fallback),
        camera.projection.matrix(),
    )
}

pub type FrustumPlanes = [Vec4; 6];

/// Normalized planes of a `[0, 1]` depth view-projection, pointing inward.
pub fn extract_frustum_planes(view_proj: Mat4) -> FrustumPlanes {
    let row0 = view_proj.row(0);
    let row1 = view_proj.row(1);
    let row2 = view_proj.row(2);
    let row3 = view_proj.row(3);

    let planes = [
        row3 + row0,
        row3 - row0,
        row3 + row1,
        row3 - row1,
        row2,
        row3 - row2,
    ];
    planes.map(|plane| {
        let len = plane.xyz().length();
        if len > 0.0001 {
            plane / len
        } else {
            Vec4::ZERO
        }
    })
}

pub fn sphere_in_frustum(planes: &FrustumPlanes, center: Vec3, radius: f32) -> bool {
    planes
        .iter()
        .all(|plane| plane.dot(center.extend(1.0)) >= -radius)
}

fn up_reference(forward: Vec3, fallback: Vec3) -> Vec3 {
    if forward.dot(WORLD_UP).abs() > UP_PARALLEL_THRESHOLD {
        fallback
    } else {
        WORLD_UP
    }
}
