use std::collections::HashMap;
use std::sync::Arc;

use crate::{Animation, Attachment};

#[derive(Clone, Debug)]
pub struct BoneData {
    pub index: usize,
    pub name: String,
    /// Always lower than `index`.
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub inherit: Inherit,
    pub skin_required: bool,
    /// Editor color, only present in nonessential exports.
    pub color: [f32; 4],
}

/// How a bone inherits its parent's world transform.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Inherit {
    #[default]
    Normal,
    OnlyTranslation,
    NoRotationOrReflection,
    NoScale,
    NoScaleOrReflection,
}

impl Inherit {
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Normal),
            1 => Some(Self::OnlyTranslation),
            2 => Some(Self::NoRotationOrReflection),
            3 => Some(Self::NoScale),
            4 => Some(Self::NoScaleOrReflection),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub index: usize,
    pub name: String,
    pub bone: usize,
    pub color: [f32; 4],
    /// Present when the slot uses two color tinting.
    pub dark_color: Option<[f32; 3]>,
    /// Setup pose attachment name.
    pub attachment: Option<String>,
    pub blend: BlendMode,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

impl BlendMode {
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Normal),
            1 => Some(Self::Additive),
            2 => Some(Self::Multiply),
            3 => Some(Self::Screen),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraintData {
    pub name: String,
    pub order: usize,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub uniform: bool,
}

#[derive(Clone, Debug)]
pub struct TransformConstraintData {
    pub name: String,
    pub order: usize,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    pub target: usize,
    pub local: bool,
    pub relative: bool,
    pub offset_rotation: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub offset_scale_x: f32,
    pub offset_scale_y: f32,
    pub offset_shear_y: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
    pub scale_mix: f32,
    pub shear_mix: f32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PositionMode {
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpacingMode {
    Length,
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RotateMode {
    Tangent,
    Chain,
    ChainScale,
}

#[derive(Clone, Debug)]
pub struct PathConstraintData {
    pub name: String,
    pub order: usize,
    pub skin_required: bool,
    pub bones: Vec<usize>,
    /// Slot holding the path attachment.
    pub target: usize,
    pub position_mode: PositionMode,
    pub spacing_mode: SpacingMode,
    pub rotate_mode: RotateMode,
    pub offset_rotation: f32,
    pub position: f32,
    pub spacing: f32,
    pub rotate_mix: f32,
    pub translate_mix: f32,
}

#[derive(Clone, Debug)]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: Option<String>,
    pub audio_path: Option<String>,
    pub volume: f32,
    pub balance: f32,
}

/// A keyed occurrence of an [`EventData`] inside an animation.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Index into [`SkeletonData::events`].
    pub data: usize,
    pub name: String,
    pub time: f32,
    pub int_value: i32,
    pub float_value: f32,
    pub string: Option<String>,
    pub volume: f32,
    pub balance: f32,
}

/// Attachments keyed by slot index and attachment name, plus the bones and constraints that are
/// only active while this skin is set.
#[derive(Clone, Debug, Default)]
pub struct Skin {
    pub name: String,
    pub attachments: Vec<HashMap<String, Arc<Attachment>>>,
    pub bones: Vec<usize>,
    pub ik_constraints: Vec<usize>,
    pub transform_constraints: Vec<usize>,
    pub path_constraints: Vec<usize>,
}

impl Skin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attachment(&self, slot_index: usize, name: &str) -> Option<&Arc<Attachment>> {
        self.attachments
            .get(slot_index)
            .and_then(|slot_map| slot_map.get(name))
    }

    pub fn set_attachment(
        &mut self,
        slot_index: usize,
        name: impl Into<String>,
        attachment: Arc<Attachment>,
    ) {
        if self.attachments.len() <= slot_index {
            self.attachments.resize_with(slot_index + 1, HashMap::new);
        }
        self.attachments[slot_index].insert(name.into(), attachment);
    }

    /// All `(slot, name, attachment)` entries.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str, &Arc<Attachment>)> + '_ {
        self.attachments
            .iter()
            .enumerate()
            .flat_map(|(slot, map)| map.iter().map(move |(k, v)| (slot, k.as_str(), v)))
    }

    /// Copies bones, constraints and attachments from `other`. Later attachments replace earlier
    /// ones under the same key.
    pub fn add_skin(&mut self, other: &Skin) {
        fn merge_unique(into: &mut Vec<usize>, from: &[usize]) {
            for &v in from {
                if !into.contains(&v) {
                    into.push(v);
                }
            }
        }
        merge_unique(&mut self.bones, &other.bones);
        merge_unique(&mut self.ik_constraints, &other.ik_constraints);
        merge_unique(&mut self.transform_constraints, &other.transform_constraints);
        merge_unique(&mut self.path_constraints, &other.path_constraints);
        for (slot, name, attachment) in other.entries() {
            self.set_attachment(slot, name, attachment.clone());
        }
    }
}

/// Merges the named skins, in order, into a fresh skin called `"combined"`.
///
/// Unknown names are skipped with a warning.
pub fn combine_skins(data: &SkeletonData, names: &[&str]) -> Skin {
    let mut combined = Skin::new("combined");
    for name in names {
        match data.skin(name) {
            Some(skin) => combined.add_skin(skin),
            None => log::warn!("combine_skins: no skin named '{name}'"),
        }
    }
    combined
}

/// Immutable rig description produced by the binary reader.
#[derive(Clone, Debug, Default)]
pub struct SkeletonData {
    pub name: Option<String>,
    pub hash: Option<String>,
    pub version: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fps: f32,
    pub images_path: Option<String>,
    pub audio_path: Option<String>,

    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub skins: Vec<Skin>,
    /// Index into `skins` of the skin named "default", if the file has one.
    pub default_skin: Option<usize>,
    pub events: Vec<EventData>,
    pub animations: Vec<Animation>,
    pub animation_index: HashMap<String, usize>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub transform_constraints: Vec<TransformConstraintData>,
    pub path_constraints: Vec<PathConstraintData>,
}

impl SkeletonData {
    pub fn animation(&self, name: &str) -> Option<(usize, &Animation)> {
        let index = *self.animation_index.get(name)?;
        Some((index, self.animations.get(index)?))
    }

    pub fn skin(&self, name: &str) -> Option<&Skin> {
        self.skins.iter().find(|s| s.name == name)
    }

    pub fn default_skin(&self) -> Option<&Skin> {
        self.default_skin.and_then(|i| self.skins.get(i))
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }
}
