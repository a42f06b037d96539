use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::portal::Portal;
use crate::view::ViewPose;

const CLIP_EPSILON: f32 = 1.0e-6;
const EYE_ON_PLANE_EPSILON: f32 = 1.0e-4;

/// World-space plane through the exit portal, oriented so `eye` is on its negative side.
pub fn exit_clip_plane(exit: &Portal, eye: Vec3) -> Vec4 {
    let normal = if exit.signed_distance(eye) < 0.0 {
        exit.normal
    } else {
        -exit.normal
    };
    normal.extend(-normal.dot(exit.center))
}

/// Replaces the depth row of a `[0, 1]` depth perspective projection so the near plane becomes
/// `world_plane`. Returns `None` when the result would be singular.
pub fn oblique_projection(proj: Mat4, view: Mat4, world_plane: Vec4) -> Option<Mat4> {
    let plane = view.inverse().transpose() * world_plane;
    if plane.w.abs() < EYE_ON_PLANE_EPSILON || plane.xyz().length_squared() < CLIP_EPSILON {
        return None;
    }

    let corner = Vec4::new(plane.x.signum(), plane.y.signum(), 1.0, 1.0);
    let q = proj.inverse() * corner;
    let d = plane.dot(q);
    if !d.is_finite() || d <= CLIP_EPSILON {
        return None;
    }

    let scaled = plane / d;
    let mut cols = proj.to_cols_array_2d();
    for (col, value) in cols.iter_mut().zip(scaled.to_array()) {
        col[2] = value;
    }
    let clipped = Mat4::from_cols_array_2d(&cols);
    clipped.is_finite().then_some(clipped)
}

pub fn clip_projection_for_exit(pose: &ViewPose, exit: &Portal) -> Option<Mat4> {
    oblique_projection(pose.proj, pose.view, exit_clip_plane(exit, pose.position))
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec2, Vec3, Vec4};

    use super::{clip_projection_for_exit, exit_clip_plane, oblique_projection};
    use crate::portal::{Portal, PortalSlot};
    use crate::view::{Projection, ViewPose};

    fn exit_facing_away() -> Portal {
        Portal {
            slot: PortalSlot::Blue,
            center: Vec3::new(0.0, 1.0, -5.0),
            normal: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            half_extents: Vec2::new(0.6, 1.0),
            face_index: 0,
            room: 0,
        }
    }

    fn pose_at(position: Vec3) -> ViewPose {
        ViewPose::look_to(
            position,
            Vec3::NEG_Z,
            Vec3::Y,
            Projection::default().matrix(),
        )
    }

    fn ndc_depth(matrix: Mat4, point: Vec3) -> f32 {
        let clip = matrix * point.extend(1.0);
        clip.z / clip.w
    }

    #[test]
    fn plane_orientation_puts_eye_on_negative_side() {
        let exit = exit_facing_away();
        let eye = Vec3::new(0.0, 1.0, 0.0);
        let plane = exit_clip_plane(&exit, eye);
        assert!(plane.dot(eye.extend(1.0)) < 0.0);
        assert!(plane.dot(Vec3::new(0.0, 1.0, -9.0).extend(1.0)) > 0.0);

        let flipped = exit_clip_plane(&exit, Vec3::new(0.0, 1.0, -9.0));
        assert_eq!(flipped, -plane);
    }

    #[test]
    fn exit_plane_becomes_near_plane() {
        let exit = exit_facing_away();
        let pose = pose_at(Vec3::new(0.0, 1.0, 0.0));
        let clipped = clip_projection_for_exit(&pose, &exit).expect("oblique projection");
        let view_proj = clipped * pose.view;

        for point in [
            Vec3::new(0.0, 1.0, -5.0),
            Vec3::new(0.5, 1.4, -5.0),
            Vec3::new(-0.4, 0.3, -5.0),
        ] {
            assert!(ndc_depth(view_proj, point).abs() < 1e-4, "{point}");
        }
        assert!(ndc_depth(view_proj, Vec3::new(0.0, 1.0, -3.0)) < 0.0);
        let beyond = ndc_depth(view_proj, Vec3::new(0.0, 1.0, -50.0));
        assert!(beyond > 0.0 && beyond <= 1.0);
        let far = ndc_depth(view_proj, Vec3::new(0.0, 1.0, -200.0));
        assert!((far - 1.0).abs() < 1e-3);
    }

    #[test]
    fn falls_back_when_eye_lies_on_the_plane() {
        let exit = exit_facing_away();
        let pose = pose_at(Vec3::new(0.0, 1.0, -5.0));
        assert!(clip_projection_for_exit(&pose, &exit).is_none());
    }

    #[test]
    fn falls_back_when_visible_side_is_behind_the_eye() {
        let pose = pose_at(Vec3::ZERO);
        let behind = Vec4::new(0.0, 0.0, 1.0, -5.0);
        assert!(oblique_projection(pose.proj, pose.view, behind).is_none());
        assert!(oblique_projection(pose.proj, pose.view, Vec4::ZERO).is_none());
    }
}
