use bitflags::bitflags;
use glam::{Vec2, Vec3};

pub type RoomId = u32;

bitflags! {
    /// Surface tags decoded by the level loader. Any of these bits makes a face unable to host a
    /// portal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FaceFlags: u8 {
        const CEILING = 1 << 0;
        const DOORWAY = 1 << 1;
        const NO_PORTAL = 1 << 2;
    }
}

impl FaceFlags {
    pub const PORTAL_BLOCKING: Self = Self::CEILING.union(Self::DOORWAY).union(Self::NO_PORTAL);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    pub fn unit(self) -> Vec3 {
        match self {
            Self::X => Vec3::X,
            Self::Y => Vec3::Y,
            Self::Z => Vec3::Z,
        }
    }

    /// The two in-plane axes of a plane perpendicular to `self`, in ascending order. These are
    /// the `u` and `v` axes of face-local coordinates.
    pub fn plane_axes(self) -> (Axis, Axis) {
        match self {
            Self::X => (Self::Y, Self::Z),
            Self::Y => (Self::X, Self::Z),
            Self::Z => (Self::X, Self::Y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl FaceRect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn contains(&self, uv: Vec2) -> bool {
        uv.x >= self.min.x && uv.x <= self.max.x && uv.y >= self.min.y && uv.y <= self.max.y
    }

    pub fn overlaps(&self, other: &FaceRect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }
}

/// An axis-aligned planar room surface. Normals point into the room that owns the face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EligibleFace {
    pub axis: Axis,
    pub offset: f32,
    pub facing_positive: bool,
    pub bounds: FaceRect,
    pub room: RoomId,
    pub flags: FaceFlags,
}

impl EligibleFace {
    pub fn normal(&self) -> Vec3 {
        if self.facing_positive {
            self.axis.unit()
        } else {
            -self.axis.unit()
        }
    }

    pub fn is_eligible(&self) -> bool {
        !self.flags.intersects(FaceFlags::PORTAL_BLOCKING)
    }

    pub fn is_drawn(&self) -> bool {
        !self.flags.contains(FaceFlags::DOORWAY)
    }

    pub fn to_local(&self, point: Vec3) -> Vec2 {
        let (u, v) = self.axis.plane_axes();
        Vec2::new(point[u.index()], point[v.index()])
    }

    pub fn to_local_direction(&self, direction: Vec3) -> Vec2 {
        self.to_local(direction)
    }

    pub fn to_world(&self, uv: Vec2) -> Vec3 {
        let (u, v) = self.axis.plane_axes();
        let mut point = Vec3::ZERO;
        point[self.axis.index()] = self.offset;
        point[u.index()] = uv.x;
        point[v.index()] = uv.y;
        point
    }

    /// Corners wound counter-clockwise when viewed from the side the normal points to.
    pub fn corners(&self) -> [Vec3; 4] {
        let (u, v) = self.axis.plane_axes();
        let b = self.bounds;
        let corners = [
            self.to_world(Vec2::new(b.min.x, b.min.y)),
            self.to_world(Vec2::new(b.max.x, b.min.y)),
            self.to_world(Vec2::new(b.max.x, b.max.y)),
            self.to_world(Vec2::new(b.min.x, b.max.y)),
        ];
        if u.unit().cross(v.unit()).dot(self.normal()) > 0.0 {
            corners
        } else {
            [corners[0], corners[3], corners[2], corners[1]]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallSide {
    MinX,
    MaxX,
    MinZ,
    MaxZ,
}

#[derive(Debug, Clone, Default)]
pub struct Level {
    faces: Vec<EligibleFace>,
    spawn_point: Vec3,
}

impl Level {
    pub fn faces(&self) -> &[EligibleFace] {
        &self.faces
    }

    pub fn face(&self, index: usize) -> Option<&EligibleFace> {
        self.faces.get(index)
    }

    pub fn eligible_faces(&self) -> impl Iterator<Item = (usize, &EligibleFace)> {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, face)| face.is_eligible())
    }

    pub fn spawn_point(&self) -> Vec3 {
        self.spawn_point
    }

    /// Two 10x4x10 rooms sharing the wall at x = 0, joined by a doorway in its middle.
    pub fn demo() -> Self {
        let mut builder = LevelBuilder::default();
        let west = builder.add_room(Vec3::new(-10.0, 0.0, -5.0), Vec3::new(0.0, 4.0, 5.0));
        let east = builder.add_room(Vec3::new(0.0, 0.0, -5.0), Vec3::new(10.0, 4.0, 5.0));
        // Doorway rect is in (y, z) for an X wall.
        let doorway = FaceRect::new(Vec2::new(0.0, -1.0), Vec2::new(2.5, 1.0));
        builder.cut_doorway(west, WallSide::MaxX, doorway);
        builder.cut_doorway(east, WallSide::MinX, doorway);
        builder.build(Vec3::new(-5.0, 1.7, 0.0))
    }
}

#[derive(Debug, Default)]
pub struct LevelBuilder {
    faces: Vec<EligibleFace>,
    next_room: RoomId,
}

impl LevelBuilder {
    /// Adds the six inward-facing faces of an axis-aligned box room.
    pub fn add_room(&mut self, min: Vec3, max: Vec3) -> RoomId {
        let room = self.next_room;
        self.next_room += 1;
        let (lo, hi) = (min.min(max), min.max(max));

        let x_bounds = FaceRect::new(Vec2::new(lo.y, lo.z), Vec2::new(hi.y, hi.z));
        let y_bounds = FaceRect::new(Vec2::new(lo.x, lo.z), Vec2::new(hi.x, hi.z));
        let z_bounds = FaceRect::new(Vec2::new(lo.x, lo.y), Vec2::new(hi.x, hi.y));

        let mut push = |axis, offset, facing_positive, bounds, flags| {
            self.faces.push(EligibleFace {
                axis,
                offset,
                facing_positive,
                bounds,
                room,
                flags,
            });
        };
        push(Axis::X, lo.x, true, x_bounds, FaceFlags::empty());
        push(Axis::X, hi.x, false, x_bounds, FaceFlags::empty());
        push(Axis::Y, lo.y, true, y_bounds, FaceFlags::empty());
        push(Axis::Y, hi.y, false, y_bounds, FaceFlags::CEILING);
        push(Axis::Z, lo.z, true, z_bounds, FaceFlags::empty());
        push(Axis::Z, hi.z, false, z_bounds, FaceFlags::empty());
        room
    }

    /// Splits one wall of `room` into solid panels around `opening` (face-local coordinates)
    /// plus a doorway face that is neither drawn nor portal-eligible.
    pub fn cut_doorway(&mut self, room: RoomId, side: WallSide, opening: FaceRect) -> bool {
        let (axis, facing_positive) = match side {
            WallSide::MinX => (Axis::X, true),
            WallSide::MaxX => (Axis::X, false),
            WallSide::MinZ => (Axis::Z, true),
            WallSide::MaxZ => (Axis::Z, false),
        };
        let Some(index) = self.faces.iter().position(|face| {
            face.room == room
                && face.axis == axis
                && face.facing_positive == facing_positive
                && face.flags.is_empty()
                && face.bounds.overlaps(&opening)
        }) else {
            return false;
        };

        let wall = self.faces.remove(index);
        let b = wall.bounds;
        let o = FaceRect::new(opening.min.max(b.min), opening.max.min(b.max));
        let panels = [
            FaceRect::new(b.min, Vec2::new(o.min.x, b.max.y)),
            FaceRect::new(Vec2::new(o.max.x, b.min.y), b.max),
            FaceRect::new(Vec2::new(o.min.x, b.min.y), Vec2::new(o.max.x, o.min.y)),
            FaceRect::new(Vec2::new(o.min.x, o.max.y), Vec2::new(o.max.x, b.max.y)),
        ];
        for bounds in panels {
            let size = bounds.size();
            if size.x > f32::EPSILON && size.y > f32::EPSILON {
                self.faces.push(EligibleFace { bounds, ..wall });
            }
        }
        self.faces.push(EligibleFace {
            bounds: o,
            flags: FaceFlags::DOORWAY,
            ..wall
        });
        true
    }

    pub fn build(self, spawn_point: Vec3) -> Level {
        Level {
            faces: self.faces,
            spawn_point,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::{Axis, FaceFlags, FaceRect, Level, LevelBuilder, WallSide};

    #[test]
    fn room_faces_point_inward_and_ceiling_is_ineligible() {
        let mut builder = LevelBuilder::default();
        builder.add_room(Vec3::ZERO, Vec3::new(4.0, 3.0, 6.0));
        let level = builder.build(Vec3::ONE);
        let center = Vec3::new(2.0, 1.5, 3.0);

        assert_eq!(level.faces().len(), 6);
        for face in level.faces() {
            let on_plane = face.to_world(face.bounds.min);
            assert!((center - on_plane).dot(face.normal()) > 0.0);
        }

        let ceilings: Vec<_> = level
            .faces()
            .iter()
            .filter(|face| face.flags.contains(FaceFlags::CEILING))
            .collect();
        assert_eq!(ceilings.len(), 1);
        assert_eq!(ceilings[0].axis, Axis::Y);
        assert!(!ceilings[0].is_eligible());
        assert_eq!(level.eligible_faces().count(), 5);
    }

    #[test]
    fn corners_wind_counter_clockwise_from_front() {
        let level = Level::demo();
        for face in level.faces() {
            let [a, b, c, _] = face.corners();
            let winding = (b - a).cross(c - a);
            assert!(winding.dot(face.normal()) > 0.0, "face {face:?}");
        }
    }

    #[test]
    fn doorway_cut_keeps_wall_area() {
        let mut builder = LevelBuilder::default();
        let room = builder.add_room(Vec3::new(-4.0, 0.0, -4.0), Vec3::new(0.0, 4.0, 4.0));
        let opening = FaceRect::new(Vec2::new(0.0, -1.0), Vec2::new(2.0, 1.0));
        assert!(builder.cut_doorway(room, WallSide::MaxX, opening));
        let level = builder.build(Vec3::ZERO);

        let wall_faces: Vec<_> = level
            .faces()
            .iter()
            .filter(|face| face.axis == Axis::X && !face.facing_positive)
            .collect();
        let total: f32 = wall_faces
            .iter()
            .map(|face| face.bounds.size().x * face.bounds.size().y)
            .sum();
        assert!((total - 32.0).abs() < 1e-4);

        let doorways: Vec<_> = wall_faces
            .iter()
            .filter(|face| face.flags.contains(FaceFlags::DOORWAY))
            .collect();
        assert_eq!(doorways.len(), 1);
        assert!(!doorways[0].is_eligible());
        assert!(!doorways[0].is_drawn());
    }

    #[test]
    fn local_coordinates_round_trip_on_plane() {
        let level = Level::demo();
        let face = level.faces()[0];
        let uv = Vec2::new(1.25, -0.5);
        let world = face.to_world(uv);
        assert_eq!(world[face.axis.index()], face.offset);
        assert_eq!(face.to_local(world), uv);
    }
}
