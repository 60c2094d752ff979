//! Timeline evaluation: writes keyed values into a [`Skeleton`] pose with a blend mode and alpha.

use crate::curve::{frame_percent, search, search1};
use crate::runtime::skeleton::wrap_degrees_f64;
use crate::{
    Animation, AttachmentTimeline, ColorTimeline, DeformTimeline, DrawOrderTimeline, Event,
    EventTimeline, IkConstraintTimeline, PathFloatTimeline, PathMixTimeline, RotateTimeline,
    Skeleton, Timeline, TransformConstraintTimeline, TwoColorTimeline, Vec2Frame, Vec2Timeline,
};

/// How a timeline's value is combined with the current pose.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixBlend {
    /// Blend from the setup pose. Before the first key the setup value is written.
    Setup,
    /// Blend from the current pose. Before the first key the pose eases toward setup.
    First,
    /// Blend from the current pose. Before the first key nothing is written.
    Replace,
    /// Add the keyed offset from setup to the current pose.
    Add,
}

/// Whether the animation is mixing in or out. Discrete values (attachments, draw order, IK bend)
/// only change while mixing in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixDirection {
    In,
    Out,
}

/// Attachment state marker: the slot was reset to its setup attachment this frame.
pub(crate) const ATTACHMENT_SETUP: u32 = 1;
/// Attachment state marker: an attachment timeline keyed the slot this frame.
pub(crate) const ATTACHMENT_CURRENT: u32 = 2;

impl Animation {
    /// Applies every timeline at `time`. Events keyed in `(last_time, time]` are pushed to
    /// `events` when given.
    ///
    /// With `looped`, both times wrap into `[0, duration)`.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        mut last_time: f32,
        mut time: f32,
        looped: bool,
        mut events: Option<&mut Vec<Event>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        if looped && self.duration != 0.0 {
            time %= self.duration;
            if last_time > 0.0 {
                last_time %= self.duration;
            }
        }
        for timeline in &self.timelines {
            timeline.apply(
                skeleton,
                last_time,
                time,
                events.as_deref_mut(),
                alpha,
                blend,
                direction,
            );
        }
    }
}

impl Timeline {
    /// Writes this timeline's value at `time` into `skeleton`. Never fails: timelines whose
    /// target is missing or inactive do nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        events: Option<&mut Vec<Event>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        match self {
            Self::Rotate(t) => apply_rotate(t, skeleton, time, alpha, blend),
            Self::Translate(t) => apply_translate(t, skeleton, time, alpha, blend),
            Self::Scale(t) => apply_scale(t, skeleton, time, alpha, blend, direction),
            Self::Shear(t) => apply_shear(t, skeleton, time, alpha, blend),
            Self::Color(t) => apply_color(t, skeleton, time, alpha, blend),
            Self::TwoColor(t) => apply_two_color(t, skeleton, time, alpha, blend),
            Self::Attachment(t) => apply_attachment(t, skeleton, time, blend, direction),
            Self::Deform(t) => apply_deform(t, skeleton, time, alpha, blend),
            Self::DrawOrder(t) => apply_draw_order(t, skeleton, time, blend, direction),
            Self::Event(t) => {
                if let Some(events) = events {
                    fire_events(t, last_time, time, events);
                }
            }
            Self::IkConstraint(t) => apply_ik_constraint(t, skeleton, time, alpha, blend, direction),
            Self::TransformConstraint(t) => {
                apply_transform_constraint(t, skeleton, time, alpha, blend)
            }
            Self::PathPosition(t) => apply_path_float(t, skeleton, time, alpha, blend, true),
            Self::PathSpacing(t) => apply_path_float(t, skeleton, time, alpha, blend, false),
            Self::PathMix(t) => apply_path_mix(t, skeleton, time, alpha, blend),
        }
    }
}

fn bone_active(skeleton: &Skeleton, bone: usize) -> bool {
    skeleton.bones.get(bone).is_some_and(|b| b.active)
}

fn slot_active(skeleton: &Skeleton, slot: usize) -> bool {
    skeleton
        .slots
        .get(slot)
        .is_some_and(|s| bone_active(skeleton, s.bone))
}

pub(crate) fn apply_rotate(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(setup) = skeleton.data.bones.get(timeline.bone).map(|b| b.rotation) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(timeline.bone) else {
        return;
    };
    if !bone.active {
        return;
    }
    let frames = &timeline.frames;
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return;
    };

    if time < first.time {
        match blend {
            MixBlend::Setup => bone.rotation = setup,
            MixBlend::First => {
                let r = setup - bone.rotation;
                bone.rotation += wrap_degrees_f64(r) * alpha;
            }
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }

    if time >= last.time {
        let mut r = last.angle;
        match blend {
            MixBlend::Setup => bone.rotation = setup + r * alpha,
            MixBlend::First | MixBlend::Replace => {
                r += setup - bone.rotation;
                bone.rotation += wrap_degrees_f64(r) * alpha;
            }
            MixBlend::Add => bone.rotation += r * alpha,
        }
        return;
    }

    let next = search(frames, time, |f| f.time);
    let prev = &frames[next - 1];
    let next = &frames[next];
    let percent = frame_percent(&prev.curve, time, prev.time, next.time);
    let mut r = prev.angle + wrap_degrees_f64(next.angle - prev.angle) * percent;
    match blend {
        MixBlend::Setup => bone.rotation = setup + wrap_degrees_f64(r) * alpha,
        MixBlend::First | MixBlend::Replace => {
            r += setup - bone.rotation;
            bone.rotation += wrap_degrees_f64(r) * alpha;
        }
        MixBlend::Add => bone.rotation += wrap_degrees_f64(r) * alpha,
    }
}

/// Value of an x/y timeline at `time`, which must not be before the first key.
fn sample_vec2(frames: &[Vec2Frame], time: f32) -> (f32, f32) {
    let Some(last) = frames.last() else {
        return (0.0, 0.0);
    };
    if time >= last.time || frames.len() == 1 {
        return (last.x, last.y);
    }
    let next = search(frames, time, |f| f.time);
    let prev = &frames[next - 1];
    let next = &frames[next];
    let percent = frame_percent(&prev.curve, time, prev.time, next.time);
    (
        prev.x + (next.x - prev.x) * percent,
        prev.y + (next.y - prev.y) * percent,
    )
}

/// Shared by translate and shear: the keyed value is an offset from setup.
fn apply_offset_pair(
    current: (&mut f32, &mut f32),
    setup: (f32, f32),
    frames: &[Vec2Frame],
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let (cx, cy) = current;
    let Some(first) = frames.first() else {
        return;
    };
    if time < first.time {
        match blend {
            MixBlend::Setup => {
                *cx = setup.0;
                *cy = setup.1;
            }
            MixBlend::First => {
                *cx += (setup.0 - *cx) * alpha;
                *cy += (setup.1 - *cy) * alpha;
            }
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }
    let (x, y) = sample_vec2(frames, time);
    match blend {
        MixBlend::Setup => {
            *cx = setup.0 + x * alpha;
            *cy = setup.1 + y * alpha;
        }
        MixBlend::First | MixBlend::Replace => {
            *cx += (setup.0 + x - *cx) * alpha;
            *cy += (setup.1 + y - *cy) * alpha;
        }
        MixBlend::Add => {
            *cx += x * alpha;
            *cy += y * alpha;
        }
    }
}

pub(crate) fn apply_translate(
    timeline: &Vec2Timeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(setup) = skeleton.data.bones.get(timeline.bone).map(|b| (b.x, b.y)) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(timeline.bone) else {
        return;
    };
    if !bone.active {
        return;
    }
    apply_offset_pair(
        (&mut bone.x, &mut bone.y),
        setup,
        &timeline.frames,
        time,
        alpha,
        blend,
    );
}

pub(crate) fn apply_shear(
    timeline: &Vec2Timeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(setup) = skeleton
        .data
        .bones
        .get(timeline.bone)
        .map(|b| (b.shear_x, b.shear_y))
    else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(timeline.bone) else {
        return;
    };
    if !bone.active {
        return;
    }
    apply_offset_pair(
        (&mut bone.shear_x, &mut bone.shear_y),
        setup,
        &timeline.frames,
        time,
        alpha,
        blend,
    );
}

pub(crate) fn signum(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Keys are multipliers of the setup scale. While mixing, the sign of the result comes from the
/// pose being mixed toward so a flip never passes through zero.
pub(crate) fn apply_scale(
    timeline: &Vec2Timeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let Some(setup) = skeleton
        .data
        .bones
        .get(timeline.bone)
        .map(|b| (b.scale_x, b.scale_y))
    else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(timeline.bone) else {
        return;
    };
    if !bone.active {
        return;
    }
    let Some(first) = timeline.frames.first() else {
        return;
    };

    if time < first.time {
        match blend {
            MixBlend::Setup => {
                bone.scale_x = setup.0;
                bone.scale_y = setup.1;
            }
            MixBlend::First => {
                bone.scale_x += (setup.0 - bone.scale_x) * alpha;
                bone.scale_y += (setup.1 - bone.scale_y) * alpha;
            }
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }

    let (mx, my) = sample_vec2(&timeline.frames, time);
    let x = mx * setup.0;
    let y = my * setup.1;

    if alpha == 1.0 {
        if blend == MixBlend::Add {
            bone.scale_x += x - setup.0;
            bone.scale_y += y - setup.1;
        } else {
            bone.scale_x = x;
            bone.scale_y = y;
        }
        return;
    }

    match (direction, blend) {
        (MixDirection::Out, MixBlend::Add) => {
            let (bx, by) = (bone.scale_x, bone.scale_y);
            bone.scale_x = bx + (x.abs() * signum(bx) - setup.0) * alpha;
            bone.scale_y = by + (y.abs() * signum(by) - setup.1) * alpha;
        }
        (MixDirection::In, MixBlend::Add) => {
            let (bx, by) = (signum(x), signum(y));
            bone.scale_x = bone.scale_x.abs() * bx + (x - setup.0.abs() * bx) * alpha;
            bone.scale_y = bone.scale_y.abs() * by + (y - setup.1.abs() * by) * alpha;
        }
        (MixDirection::Out, MixBlend::Setup) => {
            let (bx, by) = setup;
            bone.scale_x = bx + (x.abs() * signum(bx) - bx) * alpha;
            bone.scale_y = by + (y.abs() * signum(by) - by) * alpha;
        }
        (MixDirection::Out, MixBlend::First | MixBlend::Replace) => {
            let (bx, by) = (bone.scale_x, bone.scale_y);
            bone.scale_x = bx + (x.abs() * signum(bx) - bx) * alpha;
            bone.scale_y = by + (y.abs() * signum(by) - by) * alpha;
        }
        (MixDirection::In, MixBlend::Setup) => {
            let bx = setup.0.abs() * signum(x);
            let by = setup.1.abs() * signum(y);
            bone.scale_x = bx + (x - bx) * alpha;
            bone.scale_y = by + (y - by) * alpha;
        }
        (MixDirection::In, MixBlend::First | MixBlend::Replace) => {
            let bx = bone.scale_x.abs() * signum(x);
            let by = bone.scale_y.abs() * signum(y);
            bone.scale_x = bx + (x - bx) * alpha;
            bone.scale_y = by + (y - by) * alpha;
        }
    }
}

fn lerp4(from: [f32; 4], to: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| from[i] + (to[i] - from[i]) * t)
}

fn lerp3(from: [f32; 3], to: [f32; 3], t: f32) -> [f32; 3] {
    std::array::from_fn(|i| from[i] + (to[i] - from[i]) * t)
}

pub(crate) fn apply_color(
    timeline: &ColorTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_active(skeleton, timeline.slot) {
        return;
    }
    let Some(setup) = skeleton.data.slots.get(timeline.slot).map(|s| s.color) else {
        return;
    };
    let Some(slot) = skeleton.slots.get_mut(timeline.slot) else {
        return;
    };
    let frames = &timeline.frames;
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return;
    };

    if time < first.time {
        match blend {
            MixBlend::Setup => slot.color = setup,
            MixBlend::First => slot.color = lerp4(slot.color, setup, alpha),
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }

    let color = if time >= last.time {
        last.color
    } else {
        let next = search(frames, time, |f| f.time);
        let prev = &frames[next - 1];
        let next = &frames[next];
        let percent = frame_percent(&prev.curve, time, prev.time, next.time);
        lerp4(prev.color, next.color, percent)
    };

    if alpha == 1.0 {
        slot.color = color;
    } else {
        if blend == MixBlend::Setup {
            slot.color = setup;
        }
        slot.color = lerp4(slot.color, color, alpha);
    }
}

pub(crate) fn apply_two_color(
    timeline: &TwoColorTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_active(skeleton, timeline.slot) {
        return;
    }
    let Some((setup_light, setup_dark)) = skeleton
        .data
        .slots
        .get(timeline.slot)
        .map(|s| (s.color, s.dark_color.unwrap_or([0.0; 3])))
    else {
        return;
    };
    let Some(slot) = skeleton.slots.get_mut(timeline.slot) else {
        return;
    };
    let frames = &timeline.frames;
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return;
    };
    let mut dark = slot.dark_color.unwrap_or(setup_dark);

    if time < first.time {
        match blend {
            MixBlend::Setup => {
                slot.color = setup_light;
                dark = setup_dark;
            }
            MixBlend::First => {
                slot.color = lerp4(slot.color, setup_light, alpha);
                dark = lerp3(dark, setup_dark, alpha);
            }
            MixBlend::Replace | MixBlend::Add => return,
        }
        slot.dark_color = Some(dark);
        return;
    }

    let (light, target_dark) = if time >= last.time {
        (last.light, last.dark)
    } else {
        let next = search(frames, time, |f| f.time);
        let prev = &frames[next - 1];
        let next = &frames[next];
        let percent = frame_percent(&prev.curve, time, prev.time, next.time);
        (
            lerp4(prev.light, next.light, percent),
            lerp3(prev.dark, next.dark, percent),
        )
    };

    if alpha == 1.0 {
        slot.color = light;
        dark = target_dark;
    } else {
        if blend == MixBlend::Setup {
            slot.color = setup_light;
            dark = setup_dark;
        }
        slot.color = lerp4(slot.color, light, alpha);
        dark = lerp3(dark, target_dark, alpha);
    }
    slot.dark_color = Some(dark);
}

/// Points `slot` at the named attachment of the current or default skin, or clears it.
pub(crate) fn set_slot_attachment(skeleton: &mut Skeleton, slot: usize, name: Option<&str>) {
    let attachment = name.and_then(|name| skeleton.get_attachment(slot, name));
    if let Some(slot) = skeleton.slots.get_mut(slot) {
        slot.set_attachment(attachment);
    }
}

/// Setup attachment name of `slot`, owned so the skeleton can be mutated afterwards.
pub(crate) fn setup_attachment_name(skeleton: &Skeleton, slot: usize) -> Option<String> {
    skeleton.data.slots.get(slot).and_then(|s| s.attachment.clone())
}

pub(crate) fn apply_attachment(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    if !slot_active(skeleton, timeline.slot) {
        return;
    }
    let Some(first) = timeline.frames.first() else {
        return;
    };
    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            let setup = setup_attachment_name(skeleton, timeline.slot);
            set_slot_attachment(skeleton, timeline.slot, setup.as_deref());
        }
        return;
    }
    if time < first.time {
        if matches!(blend, MixBlend::Setup | MixBlend::First) {
            let setup = setup_attachment_name(skeleton, timeline.slot);
            set_slot_attachment(skeleton, timeline.slot, setup.as_deref());
        }
        return;
    }
    let frame = &timeline.frames[search1(&timeline.frames, time, |f| f.time)];
    set_slot_attachment(skeleton, timeline.slot, frame.name.as_deref());
}

pub(crate) fn apply_draw_order(
    timeline: &DrawOrderTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let setup = |skeleton: &mut Skeleton| {
        skeleton.draw_order.clear();
        skeleton.draw_order.extend(0..skeleton.slots.len());
    };
    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            setup(skeleton);
        }
        return;
    }
    let Some(first) = timeline.frames.first() else {
        return;
    };
    if time < first.time {
        if matches!(blend, MixBlend::Setup | MixBlend::First) {
            setup(skeleton);
        }
        return;
    }
    let frame = &timeline.frames[search1(&timeline.frames, time, |f| f.time)];
    match frame.draw_order.as_ref() {
        Some(order) if order.len() == skeleton.slots.len() => {
            skeleton.draw_order.clone_from(order);
        }
        Some(_) => {}
        None => setup(skeleton),
    }
}

/// Pushes events keyed in `(last_time, time]`. When `last_time > time` the animation looped, so
/// events after `last_time` fire first.
pub(crate) fn fire_events(
    timeline: &EventTimeline,
    mut last_time: f32,
    time: f32,
    out: &mut Vec<Event>,
) {
    let events = &timeline.events;
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return;
    };
    if last_time > time {
        fire_events(timeline, last_time, f32::MAX, out);
        last_time = -1.0;
    } else if last_time >= last.time {
        return;
    }
    if time < first.time {
        return;
    }

    let mut i = if last_time < first.time {
        0
    } else {
        let mut i = search1(events, last_time, |e| e.time) + 1;
        if let Some(frame_time) = events.get(i).map(|e| e.time) {
            // Several events keyed at the same time fire together.
            while i > 0 && events[i - 1].time == frame_time {
                i -= 1;
            }
        }
        i
    };
    while i < events.len() && time >= events[i].time {
        out.push(events[i].clone());
        i += 1;
    }
}

/// Combines `target` into `deform`. Unweighted targets are absolute positions, so additive blends
/// subtract `setup`; weighted targets are already offsets.
fn blend_deform(
    deform: &mut [f32],
    setup: &[f32],
    weighted: bool,
    target: &[f32],
    alpha: f32,
    blend: MixBlend,
) {
    let setup_at = |i: usize| setup.get(i).copied().unwrap_or(0.0);
    if alpha == 1.0 {
        if blend == MixBlend::Add {
            for (i, (d, &v)) in deform.iter_mut().zip(target).enumerate() {
                *d += if weighted { v } else { v - setup_at(i) };
            }
        } else {
            for (d, &v) in deform.iter_mut().zip(target) {
                *d = v;
            }
        }
        return;
    }
    for (i, (d, &v)) in deform.iter_mut().zip(target).enumerate() {
        match blend {
            MixBlend::Setup => {
                *d = if weighted {
                    v * alpha
                } else {
                    let s = setup_at(i);
                    s + (v - s) * alpha
                };
            }
            MixBlend::First | MixBlend::Replace => *d += (v - *d) * alpha,
            MixBlend::Add => {
                *d += if weighted {
                    v * alpha
                } else {
                    (v - setup_at(i)) * alpha
                };
            }
        }
    }
}

pub(crate) fn apply_deform(
    timeline: &DeformTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    mut blend: MixBlend,
) {
    if !slot_active(skeleton, timeline.slot) {
        return;
    }
    let Some(slot) = skeleton.slots.get_mut(timeline.slot) else {
        return;
    };
    let keyed = slot
        .attachment()
        .and_then(|a| a.timeline_id())
        .is_some_and(|id| id == timeline.timeline_id);
    if !keyed {
        return;
    }
    let frames = &timeline.frames;
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return;
    };
    let vertex_count = timeline.vertex_count();
    let setup = timeline.setup_vertices.as_slice();
    let weighted = timeline.weighted;

    if slot.deform.is_empty() {
        blend = MixBlend::Setup;
    }

    if time < first.time {
        match blend {
            MixBlend::Setup => slot.deform.clear(),
            MixBlend::First => {
                if alpha == 1.0 {
                    slot.deform.clear();
                    return;
                }
                slot.deform.resize(vertex_count, 0.0);
                if weighted {
                    let m = 1.0 - alpha;
                    slot.deform.iter_mut().for_each(|d| *d *= m);
                } else {
                    for (d, &s) in slot.deform.iter_mut().zip(setup) {
                        *d += (s - *d) * alpha;
                    }
                }
            }
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }

    slot.deform.resize(vertex_count, 0.0);

    if time >= last.time {
        blend_deform(&mut slot.deform, setup, weighted, &last.vertices, alpha, blend);
        return;
    }

    let next = search(frames, time, |f| f.time);
    let prev = &frames[next - 1];
    let next = &frames[next];
    let percent = frame_percent(&prev.curve, time, prev.time, next.time);
    let mixed: Vec<f32> = prev
        .vertices
        .iter()
        .zip(&next.vertices)
        .map(|(&p, &n)| p + (n - p) * percent)
        .collect();
    blend_deform(&mut slot.deform, setup, weighted, &mixed, alpha, blend);
}

pub(crate) fn apply_ik_constraint(
    timeline: &IkConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let Some(constraint) = skeleton.ik_constraints.get_mut(timeline.constraint) else {
        return;
    };
    if !constraint.active {
        return;
    }
    let Some(data) = skeleton.data.ik_constraints.get(constraint.data_index()) else {
        return;
    };
    let frames = &timeline.frames;
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return;
    };

    if time < first.time {
        match blend {
            MixBlend::Setup => {
                constraint.mix = data.mix;
                constraint.softness = data.softness;
                constraint.bend_direction = data.bend_direction;
                constraint.compress = data.compress;
                constraint.stretch = data.stretch;
            }
            MixBlend::First => {
                constraint.mix += (data.mix - constraint.mix) * alpha;
                constraint.softness += (data.softness - constraint.softness) * alpha;
                constraint.bend_direction = data.bend_direction;
                constraint.compress = data.compress;
                constraint.stretch = data.stretch;
            }
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }

    let (mix, softness, key) = if time >= last.time {
        (last.mix, last.softness, last)
    } else {
        let next = search(frames, time, |f| f.time);
        let prev = &frames[next - 1];
        let next = &frames[next];
        let percent = frame_percent(&prev.curve, time, prev.time, next.time);
        (
            prev.mix + (next.mix - prev.mix) * percent,
            prev.softness + (next.softness - prev.softness) * percent,
            prev,
        )
    };

    if blend == MixBlend::Setup {
        constraint.mix = data.mix + (mix - data.mix) * alpha;
        constraint.softness = data.softness + (softness - data.softness) * alpha;
        if direction == MixDirection::Out {
            constraint.bend_direction = data.bend_direction;
            constraint.compress = data.compress;
            constraint.stretch = data.stretch;
            return;
        }
    } else {
        constraint.mix += (mix - constraint.mix) * alpha;
        constraint.softness += (softness - constraint.softness) * alpha;
        if direction == MixDirection::Out {
            return;
        }
    }
    constraint.bend_direction = key.bend_direction;
    constraint.compress = key.compress;
    constraint.stretch = key.stretch;
}

pub(crate) fn apply_transform_constraint(
    timeline: &TransformConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(constraint) = skeleton.transform_constraints.get_mut(timeline.constraint) else {
        return;
    };
    if !constraint.active {
        return;
    }
    let Some(data) = skeleton
        .data
        .transform_constraints
        .get(constraint.data_index())
    else {
        return;
    };
    let frames = &timeline.frames;
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return;
    };
    let setup = [
        data.rotate_mix,
        data.translate_mix,
        data.translate_mix,
        data.scale_mix,
        data.scale_mix,
        data.shear_mix,
    ];
    let mut current = [
        constraint.mix_rotate,
        constraint.mix_x,
        constraint.mix_y,
        constraint.mix_scale_x,
        constraint.mix_scale_y,
        constraint.mix_shear_y,
    ];

    if time < first.time {
        match blend {
            MixBlend::Setup => current = setup,
            MixBlend::First => {
                for (c, s) in current.iter_mut().zip(setup) {
                    *c += (s - *c) * alpha;
                }
            }
            MixBlend::Replace | MixBlend::Add => return,
        }
    } else {
        let [rotate, translate, scale, shear] = if time >= last.time {
            [last.rotate_mix, last.translate_mix, last.scale_mix, last.shear_mix]
        } else {
            let next = search(frames, time, |f| f.time);
            let prev = &frames[next - 1];
            let next = &frames[next];
            let p = frame_percent(&prev.curve, time, prev.time, next.time);
            [
                prev.rotate_mix + (next.rotate_mix - prev.rotate_mix) * p,
                prev.translate_mix + (next.translate_mix - prev.translate_mix) * p,
                prev.scale_mix + (next.scale_mix - prev.scale_mix) * p,
                prev.shear_mix + (next.shear_mix - prev.shear_mix) * p,
            ]
        };
        let keyed = [rotate, translate, translate, scale, scale, shear];
        for ((c, s), v) in current.iter_mut().zip(setup).zip(keyed) {
            *c = if blend == MixBlend::Setup {
                s + (v - s) * alpha
            } else {
                *c + (v - *c) * alpha
            };
        }
    }

    [
        constraint.mix_rotate,
        constraint.mix_x,
        constraint.mix_y,
        constraint.mix_scale_x,
        constraint.mix_scale_y,
        constraint.mix_shear_y,
    ] = current;
}

/// Position (`position == true`) or spacing of a path constraint.
pub(crate) fn apply_path_float(
    timeline: &PathFloatTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    position: bool,
) {
    let Some(constraint) = skeleton.path_constraints.get_mut(timeline.constraint) else {
        return;
    };
    if !constraint.active {
        return;
    }
    let Some(data) = skeleton.data.path_constraints.get(constraint.data_index()) else {
        return;
    };
    let (value, setup) = if position {
        (&mut constraint.position, data.position)
    } else {
        (&mut constraint.spacing, data.spacing)
    };
    let frames = &timeline.frames;
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return;
    };

    if time < first.time {
        match blend {
            MixBlend::Setup => *value = setup,
            MixBlend::First => *value += (setup - *value) * alpha,
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }

    let v = if time >= last.time {
        last.value
    } else {
        let next = search(frames, time, |f| f.time);
        let prev = &frames[next - 1];
        let next = &frames[next];
        let p = frame_percent(&prev.curve, time, prev.time, next.time);
        prev.value + (next.value - prev.value) * p
    };
    if blend == MixBlend::Setup {
        *value = setup + (v - setup) * alpha;
    } else {
        *value += (v - *value) * alpha;
    }
}

pub(crate) fn apply_path_mix(
    timeline: &PathMixTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let Some(constraint) = skeleton.path_constraints.get_mut(timeline.constraint) else {
        return;
    };
    if !constraint.active {
        return;
    }
    let Some(data) = skeleton.data.path_constraints.get(constraint.data_index()) else {
        return;
    };
    let frames = &timeline.frames;
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return;
    };
    let (setup_rotate, setup_translate) = (data.rotate_mix, data.translate_mix);

    if time < first.time {
        match blend {
            MixBlend::Setup => {
                constraint.mix_rotate = setup_rotate;
                constraint.mix_x = setup_translate;
                constraint.mix_y = setup_translate;
            }
            MixBlend::First => {
                constraint.mix_rotate += (setup_rotate - constraint.mix_rotate) * alpha;
                constraint.mix_x += (setup_translate - constraint.mix_x) * alpha;
                constraint.mix_y += (setup_translate - constraint.mix_y) * alpha;
            }
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }

    let (rotate, translate) = if time >= last.time {
        (last.rotate_mix, last.translate_mix)
    } else {
        let next = search(frames, time, |f| f.time);
        let prev = &frames[next - 1];
        let next = &frames[next];
        let p = frame_percent(&prev.curve, time, prev.time, next.time);
        (
            prev.rotate_mix + (next.rotate_mix - prev.rotate_mix) * p,
            prev.translate_mix + (next.translate_mix - prev.translate_mix) * p,
        )
    };
    if blend == MixBlend::Setup {
        constraint.mix_rotate = setup_rotate + (rotate - setup_rotate) * alpha;
        constraint.mix_x = setup_translate + (translate - setup_translate) * alpha;
        constraint.mix_y = setup_translate + (translate - setup_translate) * alpha;
    } else {
        constraint.mix_rotate += (rotate - constraint.mix_rotate) * alpha;
        constraint.mix_x += (translate - constraint.mix_x) * alpha;
        constraint.mix_y += (translate - constraint.mix_y) * alpha;
    }
}
