//! Stencil-masked portal compositing.
//!
//! A frame is an explicit stage list. Each active, linked and visible portal runs
//! `Mark -> PrimeDepth -> DrawVirtual` with its own stencil reference, strictly one portal after
//! the other, farthest entry first so a nearer portal overlapping it on screen composites last.
//! The main scene then fills every pixel still at the background reference, and the
//! overlay draws rims and inert markers. Raster state per stage is plain data so a GPU backend
//! can build pipelines from it and tests can check it without a device.

use std::num::NonZeroU8;

use tracing::trace;

use crate::clip::clip_projection_for_exit;
use crate::portal::{Portal, PortalPair, PortalSlot};
use crate::settings::PortalSettings;
use crate::view::{extract_frustum_planes, sphere_in_frustum, virtual_camera, CameraPose, ViewPose};

pub const BACKGROUND_STENCIL: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Mark,
    PrimeDepth,
    DrawVirtual,
    MainScene,
    Overlay,
}

impl Stage {
    pub const PER_PORTAL: [Stage; 3] = [Stage::Mark, Stage::PrimeDepth, Stage::DrawVirtual];

    pub fn label(self) -> &'static str {
        match self {
            Self::Mark => "Mark",
            Self::PrimeDepth => "Prime Depth",
            Self::DrawVirtual => "Draw Virtual",
            Self::MainScene => "Main Scene",
            Self::Overlay => "Overlay",
        }
    }

    pub fn raster_state(self, reference: u8) -> RasterState {
        match self {
            Self::Mark => RasterState {
                color_write: false,
                depth_write: false,
                depth_compare: CompareOp::Always,
                stencil: Some(StencilTest {
                    compare: CompareOp::Always,
                    pass_op: StencilWrite::Replace,
                    reference,
                }),
            },
            Self::PrimeDepth => RasterState {
                color_write: false,
                depth_write: true,
                depth_compare: CompareOp::Always,
                stencil: Some(StencilTest::equal(reference)),
            },
            Self::DrawVirtual => RasterState {
                color_write: true,
                depth_write: true,
                depth_compare: CompareOp::Less,
                stencil: Some(StencilTest::equal(reference)),
            },
            Self::MainScene => RasterState {
                color_write: true,
                depth_write: true,
                depth_compare: CompareOp::Less,
                stencil: Some(StencilTest::equal(BACKGROUND_STENCIL)),
            },
            Self::Overlay => RasterState {
                color_write: true,
                depth_write: true,
                depth_compare: CompareOp::LessEqual,
                stencil: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Always,
    Equal,
    Less,
    LessEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilWrite {
    Keep,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilTest {
    pub compare: CompareOp,
    pub pass_op: StencilWrite,
    pub reference: u8,
}

impl StencilTest {
    pub fn equal(reference: u8) -> Self {
        Self {
            compare: CompareOp::Equal,
            pass_op: StencilWrite::Keep,
            reference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub color_write: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    /// `None` disables the stencil test.
    pub stencil: Option<StencilTest>,
}

impl RasterState {
    pub fn stencil_reference(&self) -> u32 {
        self.stencil
            .map_or(u32::from(BACKGROUND_STENCIL), |test| u32::from(test.reference))
    }
}

/// Per-frame stencil tags, handed out in slot order to active portals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StencilAssignment {
    references: [Option<NonZeroU8>; 2],
}

impl StencilAssignment {
    pub fn for_pair(portals: &PortalPair) -> Self {
        let mut references = [None; 2];
        let mut next = 1u8;
        for slot in PortalSlot::ALL {
            if portals.is_active(slot) {
                references[slot.index()] = NonZeroU8::new(next);
                next += 1;
            }
        }
        Self { references }
    }

    pub fn reference(&self, slot: PortalSlot) -> Option<NonZeroU8> {
        self.references[slot.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewId {
    Main,
    Portal(PortalSlot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalGeometry {
    /// Filled silhouette used to write the mask and prime depth.
    Opening,
    /// Outline ring around a linked portal.
    Rim,
    /// Filled, depth-tested surface for an unlinked portal.
    Marker,
}

/// Scene-draw collaborator. Calls arrive in stage order and must be issued in that order.
pub trait PortalDrawBackend {
    fn draw_scene(&mut self, view: ViewId, pose: &ViewPose, stage: Stage, state: &RasterState);

    fn draw_portal(
        &mut self,
        portal: &Portal,
        geometry: PortalGeometry,
        pose: &ViewPose,
        stage: Stage,
        state: &RasterState,
    );
}

/// Everything a frame reads. Nothing is pulled from globals.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub camera: &'a CameraPose,
    pub portals: &'a PortalPair,
    pub settings: &'a PortalSettings,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalPass {
    pub slot: PortalSlot,
    pub reference: NonZeroU8,
    pub virtual_pose: ViewPose,
    pub oblique_clip: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub main: ViewPose,
    pub assignment: StencilAssignment,
    pub passes: Vec<PortalPass>,
    pub overlays: Vec<(PortalSlot, PortalGeometry)>,
    pub clip_fallbacks: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorStats {
    pub portal_passes: u32,
    pub virtual_draws: u32,
    pub clip_fallbacks: u32,
    pub markers: u32,
    pub stages_issued: u32,
}

/// Camera in front of the entry and its bounding sphere inside the main frustum.
fn entry_is_visible(entry: &Portal, main: &ViewPose) -> bool {
    if entry.signed_distance(main.position) <= 0.0 {
        return false;
    }
    let planes = extract_frustum_planes(main.view_proj());
    let radius = entry.half_extents.length().max(0.5);
    sphere_in_frustum(&planes, entry.center, radius)
}

pub fn plan_frame(ctx: &FrameContext<'_>) -> FramePlan {
    let main = ctx.camera.view_pose();
    let assignment = StencilAssignment::for_pair(ctx.portals);
    let mut passes = Vec::with_capacity(2);
    let mut overlays = Vec::with_capacity(2);
    let mut clip_fallbacks = 0;

    for entry in ctx.portals.active_portals() {
        let Some(exit) = ctx.portals.linked_partner(entry.slot) else {
            overlays.push((entry.slot, PortalGeometry::Marker));
            continue;
        };
        overlays.push((entry.slot, PortalGeometry::Rim));

        let Some(reference) = assignment.reference(entry.slot) else {
            continue;
        };
        if !entry_is_visible(entry, &main) {
            continue;
        }

        let mut virtual_pose = virtual_camera(ctx.camera, entry, exit);
        let mut oblique_clip = false;
        if ctx.settings.oblique_clip {
            match clip_projection_for_exit(&virtual_pose, exit) {
                Some(proj) => {
                    virtual_pose = virtual_pose.with_projection(proj);
                    oblique_clip = true;
                }
                None => {
                    clip_fallbacks += 1;
                    trace!(
                        "Oblique clip singular for {} portal, using unclipped projection",
                        entry.slot.label()
                    );
                }
            }
        }

        passes.push(PortalPass {
            slot: entry.slot,
            reference,
            virtual_pose,
            oblique_clip,
        });
    }

    // Mark ignores depth, so a later pass overwrites an earlier one wherever they overlap.
    // Stable sort: equally distant portals keep slot order.
    passes.sort_by(|a, b| {
        let distance = |pass: &PortalPass| {
            ctx.portals
                .get(pass.slot)
                .map_or(0.0, |portal| portal.center.distance_squared(main.position))
        };
        distance(b).total_cmp(&distance(a))
    });

    FramePlan {
        main,
        assignment,
        passes,
        overlays,
        clip_fallbacks,
    }
}

/// Issues `plan` to `backend` stage by stage.
pub fn execute<B: PortalDrawBackend>(
    plan: &FramePlan,
    portals: &PortalPair,
    backend: &mut B,
) -> CompositorStats {
    let mut stats = CompositorStats {
        clip_fallbacks: plan.clip_fallbacks,
        ..CompositorStats::default()
    };

    for pass in &plan.passes {
        let Some(entry) = portals.get(pass.slot) else {
            continue;
        };
        stats.portal_passes += 1;
        for stage in Stage::PER_PORTAL {
            let state = stage.raster_state(pass.reference.get());
            match stage {
                Stage::DrawVirtual => {
                    let view = ViewId::Portal(pass.slot);
                    backend.draw_scene(view, &pass.virtual_pose, stage, &state);
                    stats.virtual_draws += 1;
                }
                _ => {
                    backend.draw_portal(entry, PortalGeometry::Opening, &plan.main, stage, &state);
                }
            }
            stats.stages_issued += 1;
        }
    }

    let main_state = Stage::MainScene.raster_state(BACKGROUND_STENCIL);
    backend.draw_scene(ViewId::Main, &plan.main, Stage::MainScene, &main_state);
    stats.stages_issued += 1;

    let overlay_state = Stage::Overlay.raster_state(BACKGROUND_STENCIL);
    for &(slot, geometry) in &plan.overlays {
        let Some(portal) = portals.get(slot) else {
            continue;
        };
        if geometry == PortalGeometry::Marker {
            stats.markers += 1;
        }
        backend.draw_portal(portal, geometry, &plan.main, Stage::Overlay, &overlay_state);
    }
    stats.stages_issued += 1;

    stats
}

pub fn compose_frame<B: PortalDrawBackend>(
    ctx: &FrameContext<'_>,
    backend: &mut B,
) -> CompositorStats {
    let plan = plan_frame(ctx);
    execute(&plan, ctx.portals, backend)
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::{
        compose_frame, plan_frame, CompareOp, FrameContext, PortalDrawBackend, PortalGeometry,
        RasterState, Stage, StencilAssignment, StencilWrite, ViewId, BACKGROUND_STENCIL,
    };
    use crate::portal::{Portal, PortalPair, PortalSlot};
    use crate::settings::PortalSettings;
    use crate::view::{CameraPose, Projection, ViewPose, WORLD_UP};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Scene {
            view: ViewId,
            stage: Stage,
            state: RasterState,
        },
        Portal {
            slot: PortalSlot,
            geometry: PortalGeometry,
            stage: Stage,
            state: RasterState,
            main_pose: bool,
        },
    }

    #[derive(Default)]
    struct RecordingBackend {
        main: Option<ViewPose>,
        calls: Vec<Call>,
    }

    impl PortalDrawBackend for RecordingBackend {
        fn draw_scene(&mut self, view: ViewId, pose: &ViewPose, stage: Stage, state: &RasterState) {
            if view == ViewId::Main {
                self.main = Some(*pose);
            }
            self.calls.push(Call::Scene {
                view,
                stage,
                state: *state,
            });
        }

        fn draw_portal(
            &mut self,
            portal: &Portal,
            geometry: PortalGeometry,
            pose: &ViewPose,
            stage: Stage,
            state: &RasterState,
        ) {
            let main_pose = self.main.map_or(true, |main| main == *pose);
            self.calls.push(Call::Portal {
                slot: portal.slot,
                geometry,
                stage,
                state: *state,
                main_pose,
            });
        }
    }

    fn wall_portal(slot: PortalSlot, center: Vec3, normal: Vec3) -> Portal {
        let right = WORLD_UP.cross(normal).normalize();
        Portal {
            slot,
            center,
            normal,
            up: normal.cross(right),
            right,
            half_extents: Vec2::new(0.6, 1.0),
            face_index: 0,
            room: 0,
        }
    }

    /// Both portals on the far wall of a corridor, in view of a camera at the origin.
    fn linked_pair() -> PortalPair {
        let mut pair = PortalPair::default();
        pair.replace(wall_portal(PortalSlot::Orange, Vec3::new(-2.0, 0.0, -6.0), Vec3::Z));
        pair.replace(wall_portal(PortalSlot::Blue, Vec3::new(2.0, 0.0, -6.0), Vec3::Z));
        pair
    }

    fn camera() -> CameraPose {
        CameraPose {
            position: Vec3::new(0.0, 0.0, 0.0),
            forward: Vec3::NEG_Z,
            projection: Projection::default(),
        }
    }

    fn stages(calls: &[Call]) -> Vec<Stage> {
        calls
            .iter()
            .map(|call| match call {
                Call::Scene { stage, .. } | Call::Portal { stage, .. } => *stage,
            })
            .collect()
    }

    #[test]
    fn stage_state_table() {
        let mark = Stage::Mark.raster_state(1);
        assert!(!mark.color_write && !mark.depth_write);
        assert_eq!(mark.depth_compare, CompareOp::Always);
        let mark_stencil = mark.stencil.expect("mark uses stencil");
        assert_eq!(mark_stencil.compare, CompareOp::Always);
        assert_eq!(mark_stencil.pass_op, StencilWrite::Replace);
        assert_eq!(mark_stencil.reference, 1);

        let prime = Stage::PrimeDepth.raster_state(2);
        assert!(!prime.color_write && prime.depth_write);
        assert_eq!(prime.depth_compare, CompareOp::Always);
        let prime_stencil = prime.stencil.expect("prime uses stencil");
        assert_eq!(prime_stencil.compare, CompareOp::Equal);
        assert_eq!(prime_stencil.pass_op, StencilWrite::Keep);
        assert_eq!(prime_stencil.reference, 2);

        let virtual_draw = Stage::DrawVirtual.raster_state(2);
        assert!(virtual_draw.color_write && virtual_draw.depth_write);
        assert_eq!(virtual_draw.depth_compare, CompareOp::Less);
        assert_eq!(virtual_draw.stencil_reference(), 2);

        let main = Stage::MainScene.raster_state(7);
        assert_eq!(main.depth_compare, CompareOp::Less);
        assert_eq!(main.stencil_reference(), u32::from(BACKGROUND_STENCIL));

        let overlay = Stage::Overlay.raster_state(1);
        assert!(overlay.stencil.is_none());
        assert_ne!(overlay.depth_compare, CompareOp::Always);
    }

    #[test]
    fn linked_portals_get_distinct_nonzero_references() {
        let pair = linked_pair();
        let assignment = StencilAssignment::for_pair(&pair);
        let orange = assignment.reference(PortalSlot::Orange).expect("orange").get();
        let blue = assignment.reference(PortalSlot::Blue).expect("blue").get();
        assert_ne!(orange, blue);
        assert_ne!(orange, BACKGROUND_STENCIL);
        assert_ne!(blue, BACKGROUND_STENCIL);

        assert_eq!(
            StencilAssignment::for_pair(&PortalPair::default()),
            StencilAssignment::default()
        );
    }

    #[test]
    fn two_linked_portals_run_in_strict_stage_order() {
        let pair = linked_pair();
        let settings = PortalSettings::default();
        let camera = camera();
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let mut backend = RecordingBackend::default();
        let stats = compose_frame(&ctx, &mut backend);

        assert_eq!(
            stages(&backend.calls),
            vec![
                Stage::Mark,
                Stage::PrimeDepth,
                Stage::DrawVirtual,
                Stage::Mark,
                Stage::PrimeDepth,
                Stage::DrawVirtual,
                Stage::MainScene,
                Stage::Overlay,
                Stage::Overlay,
            ]
        );
        assert_eq!(stats.portal_passes, 2);
        assert_eq!(stats.virtual_draws, 2);
        assert_eq!(stats.markers, 0);

        for call in &backend.calls {
            if let Call::Portal {
                geometry, stage, ..
            } = call
            {
                let expected = if *stage == Stage::Overlay {
                    PortalGeometry::Rim
                } else {
                    PortalGeometry::Opening
                };
                assert_eq!(*geometry, expected);
            }
        }
        assert!(matches!(
            backend.calls[2],
            Call::Scene {
                view: ViewId::Portal(PortalSlot::Orange),
                ..
            }
        ));
        assert!(matches!(
            backend.calls[5],
            Call::Scene {
                view: ViewId::Portal(PortalSlot::Blue),
                ..
            }
        ));
    }

    #[test]
    fn virtual_views_never_trigger_nested_marks() {
        let pair = linked_pair();
        let settings = PortalSettings::default();
        let camera = camera();
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let plan = plan_frame(&ctx);
        let mut backend = RecordingBackend {
            main: Some(plan.main),
            calls: Vec::new(),
        };
        super::execute(&plan, &pair, &mut backend);

        let marks: Vec<_> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Portal {
                    slot,
                    stage: Stage::Mark,
                    main_pose,
                    ..
                } => Some((*slot, *main_pose)),
                _ => None,
            })
            .collect();
        assert_eq!(
            marks,
            vec![(PortalSlot::Orange, true), (PortalSlot::Blue, true)]
        );

        // Between a DrawVirtual and the next Mark nothing else is issued.
        for window in backend.calls.windows(2) {
            if let Call::Scene {
                stage: Stage::DrawVirtual,
                ..
            } = window[0]
            {
                assert!(matches!(
                    window[1],
                    Call::Portal {
                        stage: Stage::Mark,
                        ..
                    } | Call::Scene {
                        stage: Stage::MainScene,
                        ..
                    }
                ));
            }
        }
    }

    #[test]
    fn mark_and_virtual_draw_share_the_portal_reference() {
        let pair = linked_pair();
        let settings = PortalSettings::default();
        let camera = camera();
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let mut backend = RecordingBackend::default();
        compose_frame(&ctx, &mut backend);

        let references: Vec<u32> = backend
            .calls
            .iter()
            .take(6)
            .map(|call| match call {
                Call::Scene { state, .. } | Call::Portal { state, .. } => state.stencil_reference(),
            })
            .collect();
        assert_eq!(references, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn unlinked_portal_is_drawn_as_inert_marker() {
        let mut pair = PortalPair::default();
        pair.replace(wall_portal(PortalSlot::Blue, Vec3::new(0.0, 0.0, -6.0), Vec3::Z));
        let settings = PortalSettings::default();
        let camera = camera();
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let mut backend = RecordingBackend::default();
        let stats = compose_frame(&ctx, &mut backend);

        assert_eq!(stages(&backend.calls), vec![Stage::MainScene, Stage::Overlay]);
        assert!(matches!(
            backend.calls[1],
            Call::Portal {
                slot: PortalSlot::Blue,
                geometry: PortalGeometry::Marker,
                ..
            }
        ));
        assert_eq!(stats.virtual_draws, 0);
        assert_eq!(stats.markers, 1);
    }

    #[test]
    fn portal_behind_the_camera_skips_its_pass() {
        let mut pair = linked_pair();
        pair.replace(wall_portal(PortalSlot::Blue, Vec3::new(0.0, 0.0, 6.0), Vec3::Z));
        let settings = PortalSettings::default();
        let camera = camera();
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let plan = plan_frame(&ctx);

        assert_eq!(plan.passes.len(), 1);
        assert_eq!(plan.passes[0].slot, PortalSlot::Orange);
        assert_eq!(plan.overlays.len(), 2);
    }

    #[test]
    fn nearer_overlapping_portal_composites_last() {
        let mut pair = PortalPair::default();
        pair.replace(wall_portal(PortalSlot::Orange, Vec3::new(0.0, 0.0, -3.0), Vec3::Z));
        pair.replace(wall_portal(PortalSlot::Blue, Vec3::new(0.0, 0.0, -9.0), Vec3::Z));
        let settings = PortalSettings::default();
        let camera = camera();
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let plan = plan_frame(&ctx);

        let order: Vec<_> = plan.passes.iter().map(|pass| pass.slot).collect();
        assert_eq!(order, vec![PortalSlot::Blue, PortalSlot::Orange]);
        assert_ne!(plan.passes[0].reference, plan.passes[1].reference);

        let mut backend = RecordingBackend::default();
        super::execute(&plan, &pair, &mut backend);
        let last_virtual = backend.calls.iter().rev().find_map(|call| match call {
            Call::Scene {
                view: ViewId::Portal(slot),
                ..
            } => Some(*slot),
            _ => None,
        });
        assert_eq!(last_virtual, Some(PortalSlot::Orange));
    }

    #[test]
    fn virtual_eye_on_the_exit_plane_keeps_the_plain_projection() {
        let pair = linked_pair();
        let settings = PortalSettings::default();
        // Just in front of Orange, so the virtual eye sits on Blue's plane.
        let camera = CameraPose {
            position: Vec3::new(-2.0, 0.0, -6.0 + 2.0e-5),
            forward: Vec3::NEG_Z,
            projection: Projection::default(),
        };
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let plan = plan_frame(&ctx);

        assert_eq!(plan.passes.len(), 1);
        let pass = &plan.passes[0];
        assert_eq!(pass.slot, PortalSlot::Orange);
        assert!(!pass.oblique_clip);
        assert_eq!(pass.virtual_pose.proj, camera.projection.matrix());
        assert_eq!(plan.clip_fallbacks, 1);

        let mut backend = RecordingBackend::default();
        let stats = compose_frame(&ctx, &mut backend);
        assert_eq!(stats.clip_fallbacks, 1);
        assert_eq!(stats.virtual_draws, 1);
    }

    #[test]
    fn oblique_clip_follows_settings() {
        let pair = linked_pair();
        let camera = camera();
        let mut settings = PortalSettings::default();
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let clipped = plan_frame(&ctx);
        assert!(clipped.passes.iter().all(|pass| pass.oblique_clip));
        assert_eq!(clipped.clip_fallbacks, 0);

        settings.oblique_clip = false;
        let ctx = FrameContext {
            camera: &camera,
            portals: &pair,
            settings: &settings,
        };
        let plain = plan_frame(&ctx);
        assert!(plain.passes.iter().all(|pass| !pass.oblique_clip));
        assert_eq!(plain.passes[0].virtual_pose.proj, camera.projection.matrix());
    }
}
