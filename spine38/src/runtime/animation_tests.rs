use super::skeleton_tests::{assert_approx, bone, data_with, ik, region, slot, transform};
use crate::{
    Animation, Attachment, AttachmentFrame, AttachmentTimeline, BezierCurve, ColorFrame,
    ColorTimeline, Curve, DeformFrame, DeformTimeline, DrawOrderFrame, DrawOrderTimeline, Event,
    EventTimeline, FloatFrame, IkConstraintTimeline, IkFrame, MeshAttachment, MeshGeometry,
    MeshVertices, MixBlend, MixDirection, PathConstraintData, PathFloatTimeline, PathMixFrame,
    PathMixTimeline, PositionMode, RotateFrame, RotateMode, RotateTimeline, Skeleton,
    SkeletonData, SpacingMode, Timeline, TransformConstraintTimeline, TransformFrame,
    TwoColorFrame, TwoColorTimeline, Vec2Frame, Vec2Timeline, VertexWeight,
};
use std::sync::Arc;

fn skeleton_with(data: SkeletonData) -> Skeleton {
    Skeleton::new(Arc::new(data))
}

fn one_bone() -> Skeleton {
    skeleton_with(data_with(
        vec![bone(0, "root", None, 10.0, 20.0)],
        vec![slot(0, "body", 0, Some("a"))],
        vec![
            (0, "a", region("a", 10.0, 10.0)),
            (0, "b", region("b", 10.0, 10.0)),
        ],
    ))
}

fn translate(keys: &[(f32, f32, f32)], curve: Curve) -> Timeline {
    Timeline::Translate(Vec2Timeline {
        bone: 0,
        frames: keys
            .iter()
            .map(|&(time, x, y)| Vec2Frame { time, x, y, curve })
            .collect(),
    })
}

fn rotate(keys: &[(f32, f32)]) -> Timeline {
    Timeline::Rotate(RotateTimeline {
        bone: 0,
        frames: keys
            .iter()
            .map(|&(time, angle)| RotateFrame {
                time,
                angle,
                curve: Curve::Linear,
            })
            .collect(),
    })
}

fn event(name: &str, time: f32) -> Event {
    Event {
        data: 0,
        name: name.to_string(),
        time,
        int_value: 0,
        float_value: 0.0,
        string: None,
        volume: 1.0,
        balance: 0.0,
    }
}

fn apply(timeline: &Timeline, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    timeline.apply(skeleton, -1.0, time, None, alpha, blend, MixDirection::In);
}

#[test]
fn translate_interpolates_linearly_from_setup() {
    let mut skeleton = one_bone();
    let timeline = translate(&[(0.0, 0.0, 0.0), (1.0, 100.0, 0.0)], Curve::Linear);

    apply(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 60.0);
    assert_approx(skeleton.bones[0].y, 20.0);

    apply(&timeline, &mut skeleton, 2.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 110.0);
}

#[test]
fn stepped_keys_hold_until_the_next_key() {
    let mut skeleton = one_bone();
    let timeline = translate(&[(0.0, 0.0, 0.0), (1.0, 100.0, 0.0)], Curve::Stepped);
    apply(&timeline, &mut skeleton, 0.99, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 10.0);
    apply(&timeline, &mut skeleton, 1.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 110.0);
}

#[test]
fn bezier_keys_ease_in() {
    let mut skeleton = one_bone();
    let ease_in = Curve::Bezier(BezierCurve::new(0.5, 0.0, 1.0, 1.0));
    let timeline = translate(&[(0.0, 0.0, 0.0), (1.0, 100.0, 0.0)], ease_in);
    apply(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    let x = skeleton.bones[0].x - 10.0;
    assert!(x > 0.0 && x < 50.0, "eased offset {x}");
}

#[test]
fn before_the_first_key_depends_on_blend() {
    let mut skeleton = one_bone();
    let timeline = translate(&[(0.5, 100.0, 0.0)], Curve::Linear);
    skeleton.bones[0].x = 0.0;

    apply(&timeline, &mut skeleton, 0.1, 1.0, MixBlend::Replace);
    assert_approx(skeleton.bones[0].x, 0.0);

    apply(&timeline, &mut skeleton, 0.1, 0.5, MixBlend::First);
    assert_approx(skeleton.bones[0].x, 5.0);

    apply(&timeline, &mut skeleton, 0.1, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 10.0);

    // A single key holds its value afterwards.
    apply(&timeline, &mut skeleton, 3.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 110.0);
}

#[test]
fn add_blend_accumulates_on_the_current_pose() {
    let mut skeleton = one_bone();
    let timeline = translate(&[(0.0, 4.0, 2.0)], Curve::Linear);
    apply(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Add);
    apply(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Add);
    assert_approx(skeleton.bones[0].x, 14.0);
    assert_approx(skeleton.bones[0].y, 22.0);
}

#[test]
fn rotation_takes_the_short_way_across_180() {
    let mut skeleton = one_bone();
    let timeline = rotate(&[(0.0, 170.0), (1.0, -170.0)]);

    apply(&timeline, &mut skeleton, 0.25, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].rotation, 175.0);

    apply(&timeline, &mut skeleton, 0.75, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].rotation, -175.0);

    for step in 0..=20 {
        apply(&timeline, &mut skeleton, step as f32 / 20.0, 1.0, MixBlend::Setup);
        assert!(skeleton.bones[0].rotation.abs() <= 180.0);
        assert!(skeleton.bones[0].rotation.abs() >= 170.0 - 1.0e-3);
    }
}

#[test]
fn rotation_mixes_toward_the_key_along_the_short_arc() {
    let mut skeleton = one_bone();
    skeleton.bones[0].rotation = 170.0;
    let timeline = rotate(&[(0.0, -170.0)]);
    apply(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Replace);
    assert_approx(skeleton.bones[0].rotation, 180.0);
}

#[test]
fn scale_keys_multiply_setup_scale() {
    let mut data = data_with(vec![bone(0, "root", None, 0.0, 0.0)], Vec::new(), Vec::new());
    data.bones[0].scale_x = 2.0;
    let mut skeleton = skeleton_with(data);
    let timeline = Timeline::Scale(Vec2Timeline {
        bone: 0,
        frames: vec![Vec2Frame {
            time: 0.0,
            x: 1.5,
            y: -1.0,
            curve: Curve::Linear,
        }],
    });
    apply(&timeline, &mut skeleton, 0.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].scale_x, 3.0);
    assert_approx(skeleton.bones[0].scale_y, -1.0);
}

fn mix(
    timeline: &Timeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    timeline.apply(skeleton, -1.0, time, None, alpha, blend, direction);
}

fn scale_key(x: f32, y: f32) -> Timeline {
    Timeline::Scale(Vec2Timeline {
        bone: 0,
        frames: vec![Vec2Frame {
            time: 0.0,
            x,
            y,
            curve: Curve::Linear,
        }],
    })
}

#[test]
fn partial_add_scale_flips_sign_by_direction() {
    let timeline = scale_key(-1.0, 1.0);
    for (direction, expected) in [(MixDirection::In, -1.0), (MixDirection::Out, 1.0)] {
        let mut skeleton = one_bone();
        mix(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Add, direction);
        assert_approx(skeleton.bones[0].scale_x, expected);
        assert_approx(skeleton.bones[0].scale_y, 1.0);
    }
}

#[test]
fn partial_scale_mixes_take_the_key_sign_in_and_keep_the_pose_sign_out() {
    // Setup scale 1, current pose 3, key (-1, 2), alpha 0.5.
    let timeline = scale_key(-1.0, 2.0);
    let cases = [
        (MixDirection::In, MixBlend::Setup, -1.0, 1.5),
        (MixDirection::In, MixBlend::First, -2.0, 2.5),
        (MixDirection::In, MixBlend::Replace, -2.0, 2.5),
        (MixDirection::In, MixBlend::Add, -3.0, 3.5),
        (MixDirection::Out, MixBlend::Setup, 1.0, 1.5),
        (MixDirection::Out, MixBlend::First, 2.0, 2.5),
        (MixDirection::Out, MixBlend::Replace, 2.0, 2.5),
        (MixDirection::Out, MixBlend::Add, 3.0, 3.5),
    ];
    for (direction, blend, x, y) in cases {
        let mut skeleton = one_bone();
        skeleton.bones[0].scale_x = 3.0;
        skeleton.bones[0].scale_y = 3.0;
        mix(&timeline, &mut skeleton, 0.0, 0.5, blend, direction);
        let bone = &skeleton.bones[0];
        assert!(
            (bone.scale_x - x).abs() < 1e-4 && (bone.scale_y - y).abs() < 1e-4,
            "{direction:?} {blend:?}: got ({}, {}), expected ({x}, {y})",
            bone.scale_x,
            bone.scale_y
        );
    }
}

#[test]
fn two_color_blends_light_and_dark_channels() {
    let mut tinted = slot(0, "body", 0, None);
    tinted.dark_color = Some([0.0; 3]);
    let mut skeleton = skeleton_with(data_with(
        vec![bone(0, "root", None, 0.0, 0.0)],
        vec![tinted],
        Vec::new(),
    ));
    let timeline = Timeline::TwoColor(TwoColorTimeline {
        slot: 0,
        frames: vec![
            TwoColorFrame {
                time: 0.0,
                light: [1.0; 4],
                dark: [0.0; 3],
                curve: Curve::Linear,
            },
            TwoColorFrame {
                time: 1.0,
                light: [0.0, 0.0, 0.0, 0.5],
                dark: [1.0, 0.5, 0.0],
                curve: Curve::Linear,
            },
        ],
    });

    apply(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    let light = skeleton.slots[0].color;
    let dark = skeleton.slots[0].dark_color.unwrap();
    for (actual, expected) in light.iter().zip([0.5, 0.5, 0.5, 0.75]) {
        assert_approx(*actual, expected);
    }
    for (actual, expected) in dark.iter().zip([0.5, 0.25, 0.0]) {
        assert_approx(*actual, expected);
    }

    apply(&timeline, &mut skeleton, 1.0, 0.5, MixBlend::Replace);
    let light = skeleton.slots[0].color;
    let dark = skeleton.slots[0].dark_color.unwrap();
    for (actual, expected) in light.iter().zip([0.25, 0.25, 0.25, 0.625]) {
        assert_approx(*actual, expected);
    }
    for (actual, expected) in dark.iter().zip([0.75, 0.375, 0.0]) {
        assert_approx(*actual, expected);
    }
}

fn constrained_skeleton() -> Skeleton {
    let mut data = data_with(
        vec![
            bone(0, "root", None, 0.0, 0.0),
            bone(1, "child", Some(0), 10.0, 0.0),
            bone(2, "target", Some(0), 0.0, 10.0),
        ],
        vec![slot(0, "path", 0, None)],
        Vec::new(),
    );
    data.ik_constraints.push(ik(vec![1], 2));
    data.transform_constraints.push(transform(vec![1], 2));
    data.path_constraints.push(PathConstraintData {
        name: "path".to_string(),
        order: 2,
        skin_required: false,
        bones: vec![1],
        target: 0,
        position_mode: PositionMode::Fixed,
        spacing_mode: SpacingMode::Length,
        rotate_mode: RotateMode::Tangent,
        offset_rotation: 0.0,
        position: 10.0,
        spacing: 0.0,
        rotate_mix: 1.0,
        translate_mix: 1.0,
    });
    skeleton_with(data)
}

#[test]
fn ik_keys_blend_mix_and_softness_and_switch_discrete_fields_by_direction() {
    let mut skeleton = constrained_skeleton();
    let key = |time, mix, softness, bend_direction, flags| IkFrame {
        time,
        mix,
        softness,
        bend_direction,
        compress: flags,
        stretch: flags,
        curve: Curve::Linear,
    };
    let timeline = Timeline::IkConstraint(IkConstraintTimeline {
        constraint: 0,
        frames: vec![key(0.0, 0.0, 0.0, -1, true), key(1.0, 1.0, 10.0, 1, false)],
    });

    mix(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Setup, MixDirection::In);
    let constraint = &skeleton.ik_constraints[0];
    assert_approx(constraint.mix, 0.5);
    assert_approx(constraint.softness, 5.0);
    assert_eq!(constraint.bend_direction, -1);
    assert!(constraint.compress && constraint.stretch);

    mix(&timeline, &mut skeleton, 0.5, 0.5, MixBlend::Setup, MixDirection::Out);
    let constraint = &skeleton.ik_constraints[0];
    assert_approx(constraint.mix, 0.75);
    assert_approx(constraint.softness, 2.5);
    assert_eq!(constraint.bend_direction, 1);
    assert!(!constraint.compress && !constraint.stretch);
}

#[test]
fn transform_constraint_keys_blend_every_mix_channel() {
    let mut skeleton = constrained_skeleton();
    let key = |time, rotate_mix, translate_mix, scale_mix, shear_mix| TransformFrame {
        time,
        rotate_mix,
        translate_mix,
        scale_mix,
        shear_mix,
        curve: Curve::Linear,
    };
    let timeline = Timeline::TransformConstraint(TransformConstraintTimeline {
        constraint: 0,
        frames: vec![key(0.0, 0.0, 0.0, 1.0, 1.0), key(1.0, 1.0, 0.5, 0.0, 0.0)],
    });

    apply(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    let constraint = &skeleton.transform_constraints[0];
    assert_approx(constraint.mix_rotate, 0.5);
    assert_approx(constraint.mix_x, 0.25);
    assert_approx(constraint.mix_y, 0.25);
    assert_approx(constraint.mix_scale_x, 0.5);
    assert_approx(constraint.mix_scale_y, 0.5);
    assert_approx(constraint.mix_shear_y, 0.5);

    apply(&timeline, &mut skeleton, 1.0, 0.5, MixBlend::Replace);
    let constraint = &skeleton.transform_constraints[0];
    assert_approx(constraint.mix_rotate, 0.75);
    assert_approx(constraint.mix_x, 0.375);
    assert_approx(constraint.mix_scale_x, 0.25);
}

#[test]
fn path_keys_blend_position_spacing_and_mixes() {
    let mut skeleton = constrained_skeleton();
    let float_key = |time, value| FloatFrame {
        time,
        value,
        curve: Curve::Linear,
    };
    let position = Timeline::PathPosition(PathFloatTimeline {
        constraint: 0,
        frames: vec![float_key(0.5, 0.0), float_key(1.5, 100.0)],
    });
    apply(&position, &mut skeleton, 1.0, 0.5, MixBlend::Setup);
    assert_approx(skeleton.path_constraints[0].position, 30.0);

    let spacing = Timeline::PathSpacing(PathFloatTimeline {
        constraint: 0,
        frames: vec![float_key(0.5, 8.0)],
    });
    skeleton.path_constraints[0].spacing = 20.0;
    apply(&spacing, &mut skeleton, 0.0, 0.5, MixBlend::First);
    assert_approx(skeleton.path_constraints[0].spacing, 10.0);
    apply(&spacing, &mut skeleton, 1.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.path_constraints[0].spacing, 8.0);

    let mixes = Timeline::PathMix(PathMixTimeline {
        constraint: 0,
        frames: vec![
            PathMixFrame {
                time: 0.0,
                rotate_mix: 0.0,
                translate_mix: 0.0,
                curve: Curve::Linear,
            },
            PathMixFrame {
                time: 1.0,
                rotate_mix: 1.0,
                translate_mix: 0.5,
                curve: Curve::Linear,
            },
        ],
    });
    apply(&mixes, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    let constraint = &skeleton.path_constraints[0];
    assert_approx(constraint.mix_rotate, 0.5);
    assert_approx(constraint.mix_x, 0.25);
    assert_approx(constraint.mix_y, 0.25);
}

#[test]
fn color_interpolates_per_channel() {
    let mut skeleton = one_bone();
    let timeline = Timeline::Color(ColorTimeline {
        slot: 0,
        frames: vec![
            ColorFrame {
                time: 0.0,
                color: [1.0; 4],
                curve: Curve::Linear,
            },
            ColorFrame {
                time: 1.0,
                color: [0.0, 0.0, 0.0, 1.0],
                curve: Curve::Linear,
            },
        ],
    });
    apply(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    let color = skeleton.slots[0].color;
    assert_approx(color[0], 0.5);
    assert_approx(color[2], 0.5);
    assert_approx(color[3], 1.0);
}

#[test]
fn attachment_keys_switch_and_mixing_out_restores_setup() {
    let mut skeleton = one_bone();
    let timeline = Timeline::Attachment(AttachmentTimeline {
        slot: 0,
        frames: vec![
            AttachmentFrame {
                time: 0.5,
                name: Some("b".to_string()),
            },
            AttachmentFrame {
                time: 1.0,
                name: None,
            },
        ],
    });
    let shown = |skeleton: &Skeleton| skeleton.slots[0].attachment().map(|a| a.name().to_string());

    apply(&timeline, &mut skeleton, 0.6, 1.0, MixBlend::Setup);
    assert_eq!(shown(&skeleton).as_deref(), Some("b"));
    apply(&timeline, &mut skeleton, 1.0, 1.0, MixBlend::Setup);
    assert_eq!(shown(&skeleton), None);
    apply(&timeline, &mut skeleton, 0.1, 1.0, MixBlend::Setup);
    assert_eq!(shown(&skeleton).as_deref(), Some("a"));

    apply(&timeline, &mut skeleton, 0.6, 1.0, MixBlend::Setup);
    timeline.apply(&mut skeleton, -1.0, 0.6, None, 1.0, MixBlend::Setup, MixDirection::Out);
    assert_eq!(shown(&skeleton).as_deref(), Some("a"));
}

#[test]
fn draw_order_keys_reorder_slots() {
    let mut skeleton = skeleton_with(data_with(
        vec![bone(0, "root", None, 0.0, 0.0)],
        vec![slot(0, "back", 0, None), slot(1, "front", 0, None)],
        Vec::new(),
    ));
    let timeline = Timeline::DrawOrder(DrawOrderTimeline {
        frames: vec![
            DrawOrderFrame {
                time: 0.0,
                draw_order: Some(vec![1, 0]),
            },
            DrawOrderFrame {
                time: 1.0,
                draw_order: None,
            },
        ],
    });
    apply(&timeline, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    assert_eq!(skeleton.draw_order, vec![1, 0]);
    apply(&timeline, &mut skeleton, 1.0, 1.0, MixBlend::Setup);
    assert_eq!(skeleton.draw_order, vec![0, 1]);
}

#[test]
fn events_fire_in_the_half_open_interval_and_across_loops() {
    let mut skeleton = one_bone();
    let animation = Animation::new(
        "loop",
        vec![Timeline::Event(EventTimeline {
            events: vec![event("early", 0.2), event("late", 0.8)],
        })],
        1.0,
    );
    let mut fired = Vec::new();
    let mut run = |last: f32, time: f32, looped: bool, fired: &mut Vec<Event>| {
        fired.clear();
        animation.apply(
            &mut skeleton,
            last,
            time,
            looped,
            Some(&mut *fired),
            1.0,
            MixBlend::Setup,
            MixDirection::In,
        );
        fired.iter().map(|e| e.name.clone()).collect::<Vec<_>>()
    };

    assert_eq!(run(-1.0, 0.2, false, &mut fired), vec!["early"]);
    assert!(run(0.2, 0.5, false, &mut fired).is_empty());
    assert_eq!(run(0.7, 1.3, true, &mut fired), vec!["late", "early"]);
    assert_eq!(run(0.1, 2.1, false, &mut fired), vec!["early", "late"]);
}

fn weighted_mesh() -> Arc<Attachment> {
    let weight = |bone, x, y| VertexWeight {
        bone,
        x,
        y,
        weight: 1.0,
    };
    Arc::new(Attachment::Mesh(MeshAttachment {
        name: "mesh".to_string(),
        path: "mesh".to_string(),
        color: [1.0; 4],
        id: 7,
        timeline_id: 7,
        geometry: Arc::new(MeshGeometry {
            vertices: MeshVertices::Weighted(vec![
                vec![weight(0, 0.0, 0.0)],
                vec![weight(0, 10.0, 0.0)],
            ]),
            ..MeshGeometry::default()
        }),
        renderer_object: None,
    }))
}

fn deform(weighted: bool, setup: Vec<f32>, key: Vec<f32>) -> Timeline {
    Timeline::Deform(DeformTimeline {
        slot: 0,
        timeline_id: 7,
        weighted,
        setup_vertices: setup,
        frames: vec![DeformFrame {
            time: 0.0,
            vertices: key,
            curve: Curve::Linear,
        }],
    })
}

#[test]
fn weighted_deform_add_is_independent_of_the_base_pose() {
    let make = || {
        skeleton_with(data_with(
            vec![bone(0, "root", None, 0.0, 0.0)],
            vec![slot(0, "body", 0, Some("mesh"))],
            vec![(0, "mesh", weighted_mesh())],
        ))
    };
    let timeline = deform(true, Vec::new(), vec![2.0, 4.0, 6.0, 8.0]);

    let mut deltas = Vec::new();
    for base in [[0.5f32, 0.5, 0.5, 0.5], [-3.0, 1.0, 7.0, 2.0]] {
        let mut skeleton = make();
        skeleton.slots[0].deform = base.to_vec();
        apply(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Add);
        let delta: Vec<f32> = skeleton.slots[0]
            .deform
            .iter()
            .zip(base)
            .map(|(d, b)| d - b)
            .collect();
        deltas.push(delta);
    }
    for (a, b) in deltas[0].iter().zip(&deltas[1]) {
        assert_approx(*a, *b);
    }
    assert_approx(deltas[0][0], 1.0);
    assert_approx(deltas[0][3], 4.0);
}

#[test]
fn unweighted_deform_keys_are_absolute_positions() {
    let mesh = Arc::new(Attachment::Mesh(MeshAttachment {
        name: "mesh".to_string(),
        path: "mesh".to_string(),
        color: [1.0; 4],
        id: 7,
        timeline_id: 7,
        geometry: Arc::new(MeshGeometry {
            vertices: MeshVertices::Unweighted(vec![[0.0, 0.0], [10.0, 0.0]]),
            ..MeshGeometry::default()
        }),
        renderer_object: None,
    }));
    let mut skeleton = skeleton_with(data_with(
        vec![bone(0, "root", None, 100.0, 0.0)],
        vec![slot(0, "body", 0, Some("mesh"))],
        vec![(0, "mesh", mesh)],
    ));
    let setup = vec![0.0, 0.0, 10.0, 0.0];
    let timeline = deform(false, setup.clone(), vec![0.0, 5.0, 10.0, 5.0]);

    apply(&timeline, &mut skeleton, 0.0, 0.5, MixBlend::Setup);
    assert_eq!(skeleton.slots[0].deform, vec![0.0, 2.5, 10.0, 2.5]);

    apply(&timeline, &mut skeleton, 0.0, 1.0, MixBlend::Add);
    assert_eq!(skeleton.slots[0].deform, vec![0.0, 7.5, 10.0, 7.5]);

    skeleton.update_world_transform();
    let world = skeleton.slot_world_vertices(0).unwrap();
    assert_approx(world[0], 100.0);
    assert_approx(world[1], 7.5);
    assert_approx(world[2], 110.0);
}

#[test]
fn deform_ignores_slots_showing_other_attachments() {
    let mut skeleton = one_bone();
    let timeline = deform(true, Vec::new(), vec![1.0, 1.0]);
    apply(&timeline, &mut skeleton, 0.0, 1.0, MixBlend::Setup);
    assert!(skeleton.slots[0].deform.is_empty());
}
