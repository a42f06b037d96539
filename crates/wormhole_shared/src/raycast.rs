use glam::Vec3;

use crate::level::{EligibleFace, RoomId};

const PARALLEL_EPSILON: f32 = 1.0e-6;

#[derive(Debug, Copy, Clone)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RaycastHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub face_index: usize,
    pub room: RoomId,
    pub t: f32,
}

/// Plane parameter of `ray` against `face`, ignoring eligibility. Both sides of the plane are
/// hit; rays parallel to it are not.
pub fn intersect_face(ray: &Ray, face: &EligibleFace, max_distance: f32) -> Option<f32> {
    let axis = face.axis.index();
    let denom = ray.direction[axis];
    if denom.abs() <= PARALLEL_EPSILON {
        return None;
    }

    let t = (face.offset - ray.origin[axis]) / denom;
    if t <= 0.0 || t > max_distance {
        return None;
    }

    let uv = face.to_local(ray.at(t));
    face.bounds.contains(uv).then_some(t)
}

/// Nearest eligible face along `ray`. Ineligible faces never occlude eligible ones. On exactly
/// equal `t` the lowest face index wins.
pub fn raycast_faces(ray: &Ray, faces: &[EligibleFace], max_distance: f32) -> Option<RaycastHit> {
    let mut best: Option<RaycastHit> = None;
    for (face_index, face) in faces.iter().enumerate() {
        if !face.is_eligible() {
            continue;
        }
        let Some(t) = intersect_face(ray, face, max_distance) else {
            continue;
        };
        if best.is_some_and(|hit| hit.t <= t) {
            continue;
        }
        let mut point = ray.at(t);
        point[face.axis.index()] = face.offset;
        best = Some(RaycastHit {
            point,
            normal: face.normal(),
            face_index,
            room: face.room,
            t,
        });
    }
    best
}
