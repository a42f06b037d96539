use std::fmt;

use glam::{Mat3, Vec2, Vec3};
use tracing::{debug, info};

use crate::level::{EligibleFace, Level, RoomId};
use crate::raycast::{raycast_faces, Ray, RaycastHit};
use crate::settings::PortalSettings;
use crate::view::WORLD_UP;

const WALL_NORMAL_MAX_Y: f32 = 0.5;
const FOOTPRINT_EPSILON: f32 = 1.0e-4;
const PLANE_EPSILON: f32 = 0.001;
const OVERLAP_EPSILON: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalSlot {
    Orange,
    Blue,
}

impl PortalSlot {
    pub const ALL: [PortalSlot; 2] = [PortalSlot::Orange, PortalSlot::Blue];

    pub fn index(self) -> usize {
        match self {
            Self::Orange => 0,
            Self::Blue => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Orange => Self::Blue,
            Self::Blue => Self::Orange,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Orange => "Orange",
            Self::Blue => "Blue",
        }
    }
}

/// Orthonormal on-surface frame. `right x up == normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalFrame {
    pub center: Vec3,
    pub normal: Vec3,
    pub up: Vec3,
    pub right: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Portal {
    pub slot: PortalSlot,
    pub center: Vec3,
    pub normal: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    pub half_extents: Vec2,
    pub face_index: usize,
    pub room: RoomId,
}

impl Portal {
    pub fn frame(&self) -> PortalFrame {
        PortalFrame {
            center: self.center,
            normal: self.normal,
            up: self.up,
            right: self.right,
        }
    }

    /// Columns are `right`, `up`, `normal`.
    pub fn basis(&self) -> Mat3 {
        Mat3::from_cols(self.right, self.up, self.normal)
    }

    /// Signed distance of `point` in front of the portal surface.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.center).dot(self.normal)
    }

    pub fn corners(&self) -> [Vec3; 4] {
        let r = self.right * self.half_extents.x;
        let u = self.up * self.half_extents.y;
        [
            self.center - r - u,
            self.center + r - u,
            self.center + r + u,
            self.center - r + u,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementError {
    NoHit,
    UnknownFace { face_index: usize },
    DegenerateNormal,
    DegenerateBasis,
    FaceTooSmall { face_size: Vec2, footprint: Vec2 },
    OverlapsOtherPortal { other: PortalSlot },
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHit => write!(f, "no eligible surface within range"),
            Self::UnknownFace { face_index } => {
                write!(f, "hit refers to unknown face {face_index}")
            }
            Self::DegenerateNormal => write!(f, "surface normal is degenerate"),
            Self::DegenerateBasis => write!(f, "portal basis cannot be orthonormalized"),
            Self::FaceTooSmall {
                face_size,
                footprint,
            } => write!(
                f,
                "surface {:.2}x{:.2} is smaller than portal footprint {:.2}x{:.2}",
                face_size.x, face_size.y, footprint.x, footprint.y
            ),
            Self::OverlapsOtherPortal { other } => {
                write!(f, "placement overlaps the {} portal", other.label())
            }
        }
    }
}

impl std::error::Error for PlacementError {}

#[derive(Debug, Clone, Copy)]
pub struct PlacementRequest {
    pub slot: PortalSlot,
    pub ray: Ray,
    /// Requester's horizontal facing, used to orient portals on floors.
    pub facing: Vec3,
}

/// Builds the on-surface frame for a hit: orient, clamp inside the face, then lift off it.
pub fn build_frame(
    hit: &RaycastHit,
    face: &EligibleFace,
    facing: Vec3,
    half_extents: Vec2,
    surface_offset: f32,
) -> Result<PortalFrame, PlacementError> {
    let normal = hit
        .normal
        .try_normalize()
        .ok_or(PlacementError::DegenerateNormal)?;

    let (right, up) = if normal.y.abs() < WALL_NORMAL_MAX_Y {
        let right = WORLD_UP
            .cross(normal)
            .try_normalize()
            .ok_or(PlacementError::DegenerateBasis)?;
        (right, normal.cross(right))
    } else {
        let up = (facing - normal * facing.dot(normal))
            .try_normalize()
            .ok_or(PlacementError::DegenerateBasis)?;
        let right = up
            .cross(normal)
            .try_normalize()
            .ok_or(PlacementError::DegenerateBasis)?;
        (right, normal.cross(right))
    };

    let footprint = footprint_extents(face, right, up, half_extents) * 2.0;
    let face_size = face.bounds.size();
    if face_size.x + FOOTPRINT_EPSILON < footprint.x || face_size.y + FOOTPRINT_EPSILON < footprint.y
    {
        return Err(PlacementError::FaceTooSmall {
            face_size,
            footprint,
        });
    }

    let half_footprint = (footprint * 0.5).min(face_size * 0.5);
    let uv = face
        .to_local(hit.point)
        .clamp(face.bounds.min + half_footprint, face.bounds.max - half_footprint);
    let center = face.to_world(uv) + normal * surface_offset;

    Ok(PortalFrame {
        center,
        normal,
        up,
        right,
    })
}

/// Half size of the portal rectangle's axis-aligned bounds in face-local coordinates.
fn footprint_extents(face: &EligibleFace, right: Vec3, up: Vec3, half_extents: Vec2) -> Vec2 {
    let right = face.to_local_direction(right).abs();
    let up = face.to_local_direction(up).abs();
    right * half_extents.x + up * half_extents.y
}

fn frame_overlaps_portal(
    face: &EligibleFace,
    frame: &PortalFrame,
    half_extents: Vec2,
    other: &Portal,
) -> bool {
    if frame.normal.dot(other.normal) < 1.0 - PLANE_EPSILON {
        return false;
    }
    let delta = other.center - frame.center;
    if delta.dot(frame.normal).abs() > PLANE_EPSILON {
        return false;
    }

    let ours = footprint_extents(face, frame.right, frame.up, half_extents);
    let theirs = footprint_extents(face, other.right, other.up, other.half_extents);
    let separation = face.to_local_direction(delta).abs();
    separation.x + OVERLAP_EPSILON < ours.x + theirs.x
        && separation.y + OVERLAP_EPSILON < ours.y + theirs.y
}

/// The two portal slots. Links are resolved by slot identity, so replacing one slot can never
/// leave the other pointing at a stale portal.
#[derive(Debug, Default, Clone)]
pub struct PortalPair {
    slots: [Option<Portal>; 2],
}

impl PortalPair {
    pub fn get(&self, slot: PortalSlot) -> Option<&Portal> {
        self.slots[slot.index()].as_ref()
    }

    pub fn is_active(&self, slot: PortalSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    /// The partner of `slot` when both slots are active.
    pub fn linked_partner(&self, slot: PortalSlot) -> Option<&Portal> {
        self.get(slot)?;
        self.get(slot.other())
    }

    pub fn is_linked(&self, slot: PortalSlot) -> bool {
        self.linked_partner(slot).is_some()
    }

    /// `(orange, blue)` when both are active.
    pub fn linked_pair(&self) -> Option<(&Portal, &Portal)> {
        let orange = self.get(PortalSlot::Orange)?;
        let blue = self.get(PortalSlot::Blue)?;
        Some((orange, blue))
    }

    /// Active portals in slot order.
    pub fn active_portals(&self) -> impl Iterator<Item = &Portal> {
        self.slots.iter().flatten()
    }

    /// Stores `portal` in its slot and returns the previous occupant.
    pub fn replace(&mut self, portal: Portal) -> Option<Portal> {
        self.slots[portal.slot.index()].replace(portal)
    }

    /// Raycasts `request` against the level and, on success, overwrites the requested slot.
    /// Returns the displaced portal, if any. On error no slot is touched.
    pub fn place(
        &mut self,
        level: &Level,
        request: &PlacementRequest,
        settings: &PortalSettings,
    ) -> Result<Option<Portal>, PlacementError> {
        let hit = raycast_faces(&request.ray, level.faces(), settings.placement_range)
            .ok_or(PlacementError::NoHit)?;
        let face = level.face(hit.face_index).ok_or(PlacementError::UnknownFace {
            face_index: hit.face_index,
        })?;

        let half_extents = settings.half_extents();
        let frame = build_frame(
            &hit,
            face,
            request.facing,
            half_extents,
            settings.surface_offset,
        )?;

        let other = request.slot.other();
        if let Some(other_portal) = self.get(other) {
            if frame_overlaps_portal(face, &frame, half_extents, other_portal) {
                return Err(PlacementError::OverlapsOtherPortal { other });
            }
        }

        Ok(self.replace(Portal {
            slot: request.slot,
            center: frame.center,
            normal: frame.normal,
            up: frame.up,
            right: frame.right,
            half_extents,
            face_index: hit.face_index,
            room: hit.room,
        }))
    }

    /// Applies queued requests in order. Called between frames only. Returns how many succeeded.
    pub fn apply<'a>(
        &mut self,
        level: &Level,
        requests: impl IntoIterator<Item = &'a PlacementRequest>,
        settings: &PortalSettings,
    ) -> usize {
        let mut placed = 0;
        for request in requests {
            match self.place(level, request, settings) {
                Ok(_) => {
                    placed += 1;
                    if let Some(portal) = self.get(request.slot) {
                        info!(
                            "Placed {} portal at {} facing {} (face {})",
                            request.slot.label(),
                            portal.center,
                            portal.normal,
                            portal.face_index
                        );
                    }
                }
                Err(err) => {
                    debug!("Rejected {} portal placement: {err}", request.slot.label());
                }
            }
        }
        placed
    }
}
