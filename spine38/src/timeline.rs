//! Keyframe timelines and the animation container.
//!
//! Every frame stores the curve used to ease from that frame to the next one. Evaluation lives in
//! `runtime::animation`.

use std::collections::HashSet;

use crate::{Curve, Event};

#[derive(Clone, Debug)]
pub struct RotateFrame {
    pub time: f32,
    pub angle: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct RotateTimeline {
    pub bone: usize,
    pub frames: Vec<RotateFrame>,
}

/// Paired x/y key used by translate, scale and shear timelines.
#[derive(Clone, Debug)]
pub struct Vec2Frame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct Vec2Timeline {
    pub bone: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct ColorTimeline {
    pub slot: usize,
    pub frames: Vec<ColorFrame>,
}

#[derive(Clone, Debug)]
pub struct TwoColorFrame {
    pub time: f32,
    pub light: [f32; 4],
    pub dark: [f32; 3],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct TwoColorTimeline {
    pub slot: usize,
    pub frames: Vec<TwoColorFrame>,
}

#[derive(Clone, Debug)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
pub struct DeformFrame {
    pub time: f32,
    /// Absolute positions for unweighted attachments, offsets for weighted ones.
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct DeformTimeline {
    pub slot: usize,
    /// Matches [`crate::Attachment::timeline_id`] of the attachments this timeline deforms.
    pub timeline_id: u32,
    pub weighted: bool,
    /// Flat setup positions; empty when `weighted`.
    pub setup_vertices: Vec<f32>,
    pub frames: Vec<DeformFrame>,
}

impl DeformTimeline {
    pub fn vertex_count(&self) -> usize {
        self.frames.first().map(|f| f.vertices.len()).unwrap_or(0)
    }
}

#[derive(Clone, Debug)]
pub struct DrawOrderFrame {
    pub time: f32,
    /// `draw_order[i]` is the slot drawn at position `i`. `None` restores setup order.
    pub draw_order: Option<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Clone, Debug)]
pub struct EventTimeline {
    pub events: Vec<Event>,
}

#[derive(Clone, Debug)]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct IkConstraintTimeline {
    pub constraint: usize,
    pub frames: Vec<IkFrame>,
}

#[derive(Clone, Debug)]
pub struct TransformFrame {
    pub time: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintTimeline {
    pub constraint: usize,
    pub frames: Vec<TransformFrame>,
}

#[derive(Clone, Debug)]
pub struct FloatFrame {
    pub time: f32,
    pub value: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct PathFloatTimeline {
    pub constraint: usize,
    pub frames: Vec<FloatFrame>,
}

#[derive(Clone, Debug)]
pub struct PathMixFrame {
    pub time: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct PathMixTimeline {
    pub constraint: usize,
    pub frames: Vec<PathMixFrame>,
}

#[derive(Clone, Debug)]
pub enum Timeline {
    Rotate(RotateTimeline),
    Translate(Vec2Timeline),
    Scale(Vec2Timeline),
    Shear(Vec2Timeline),
    Color(ColorTimeline),
    TwoColor(TwoColorTimeline),
    Attachment(AttachmentTimeline),
    Deform(DeformTimeline),
    DrawOrder(DrawOrderTimeline),
    Event(EventTimeline),
    IkConstraint(IkConstraintTimeline),
    TransformConstraint(TransformConstraintTimeline),
    PathPosition(PathFloatTimeline),
    PathSpacing(PathFloatTimeline),
    PathMix(PathMixTimeline),
}

/// The animatable property a timeline writes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PropertyId {
    Rotate(usize),
    Translate(usize),
    Scale(usize),
    Shear(usize),
    Color(usize),
    TwoColor(usize),
    Attachment(usize),
    Deform { slot: usize, timeline_id: u32 },
    DrawOrder,
    Event,
    IkConstraint(usize),
    TransformConstraint(usize),
    PathPosition(usize),
    PathSpacing(usize),
    PathMix(usize),
}

impl Timeline {
    pub fn property_id(&self) -> PropertyId {
        match self {
            Self::Rotate(t) => PropertyId::Rotate(t.bone),
            Self::Translate(t) => PropertyId::Translate(t.bone),
            Self::Scale(t) => PropertyId::Scale(t.bone),
            Self::Shear(t) => PropertyId::Shear(t.bone),
            Self::Color(t) => PropertyId::Color(t.slot),
            Self::TwoColor(t) => PropertyId::TwoColor(t.slot),
            Self::Attachment(t) => PropertyId::Attachment(t.slot),
            Self::Deform(t) => PropertyId::Deform {
                slot: t.slot,
                timeline_id: t.timeline_id,
            },
            Self::DrawOrder(_) => PropertyId::DrawOrder,
            Self::Event(_) => PropertyId::Event,
            Self::IkConstraint(t) => PropertyId::IkConstraint(t.constraint),
            Self::TransformConstraint(t) => PropertyId::TransformConstraint(t.constraint),
            Self::PathPosition(t) => PropertyId::PathPosition(t.constraint),
            Self::PathSpacing(t) => PropertyId::PathSpacing(t.constraint),
            Self::PathMix(t) => PropertyId::PathMix(t.constraint),
        }
    }

    /// Time of the last key, or 0 for an empty timeline.
    pub fn last_frame_time(&self) -> f32 {
        fn last<T>(frames: &[T], time: impl Fn(&T) -> f32) -> f32 {
            frames.last().map(time).unwrap_or(0.0)
        }
        match self {
            Self::Rotate(t) => last(&t.frames, |f| f.time),
            Self::Translate(t) | Self::Scale(t) | Self::Shear(t) => last(&t.frames, |f| f.time),
            Self::Color(t) => last(&t.frames, |f| f.time),
            Self::TwoColor(t) => last(&t.frames, |f| f.time),
            Self::Attachment(t) => last(&t.frames, |f| f.time),
            Self::Deform(t) => last(&t.frames, |f| f.time),
            Self::DrawOrder(t) => last(&t.frames, |f| f.time),
            Self::Event(t) => last(&t.events, |e| e.time),
            Self::IkConstraint(t) => last(&t.frames, |f| f.time),
            Self::TransformConstraint(t) => last(&t.frames, |f| f.time),
            Self::PathPosition(t) | Self::PathSpacing(t) => last(&t.frames, |f| f.time),
            Self::PathMix(t) => last(&t.frames, |f| f.time),
        }
    }

    /// Attachment, draw order and event timelines switch discretely and are never eased.
    pub(crate) fn is_discrete(&self) -> bool {
        matches!(self, Self::Attachment(_) | Self::DrawOrder(_) | Self::Event(_))
    }
}

/// A named clip: timelines applied together over `duration` seconds.
#[derive(Clone, Debug)]
pub struct Animation {
    pub name: String,
    pub timelines: Vec<Timeline>,
    pub duration: f32,
    property_ids: HashSet<PropertyId>,
}

impl Animation {
    pub fn new(name: impl Into<String>, timelines: Vec<Timeline>, duration: f32) -> Self {
        let property_ids = timelines.iter().map(Timeline::property_id).collect();
        Self {
            name: name.into(),
            timelines,
            duration,
            property_ids,
        }
    }

    pub fn has_timeline(&self, id: PropertyId) -> bool {
        self.property_ids.contains(&id)
    }
}
