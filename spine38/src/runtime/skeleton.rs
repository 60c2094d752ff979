use std::sync::Arc;

use crate::{Attachment, Error, Inherit, MeshVertices, SkeletonData, Skin};

#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,

    pub inherit: Inherit,
    pub active: bool,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    pub ax: f32,
    pub ay: f32,
    pub arotation: f32,
    pub ascale_x: f32,
    pub ascale_y: f32,
    pub ashear_x: f32,
    pub ashear_y: f32,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

impl Bone {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    /// `[a, b, c, d, world_x, world_y]`.
    pub fn world_transform(&self) -> [f32; 6] {
        [self.a, self.b, self.c, self.d, self.world_x, self.world_y]
    }

    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a).to_degrees()
    }

    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    pub fn world_scale_y(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }

    pub fn local_to_world(&self, local: [f32; 2]) -> [f32; 2] {
        let [x, y] = local;
        [
            self.a * x + self.b * y + self.world_x,
            self.c * x + self.d * y + self.world_y,
        ]
    }

    #[cfg(feature = "glam")]
    pub fn world_matrix(&self) -> glam::Affine2 {
        glam::Affine2::from_cols_array(&[self.a, self.c, self.b, self.d, self.world_x, self.world_y])
    }

    #[allow(clippy::too_many_arguments)]
    fn set_applied(
        &mut self,
        x: f32,
        y: f32,
        rotation: f32,
        scale_x: f32,
        scale_y: f32,
        shear_x: f32,
        shear_y: f32,
    ) {
        self.ax = x;
        self.ay = y;
        self.arotation = rotation;
        self.ascale_x = scale_x;
        self.ascale_y = scale_y;
        self.ashear_x = shear_x;
        self.ashear_y = shear_y;
    }

    fn reset_applied(&mut self) {
        self.set_applied(
            self.x,
            self.y,
            self.rotation,
            self.scale_x,
            self.scale_y,
            self.shear_x,
            self.shear_y,
        );
    }
}

#[derive(Clone, Debug)]
pub struct IkConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub active: bool,
}

impl IkConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

/// Runtime state of a transform constraint. The single translate and scale mixes of the file are
/// split into x and y channels.
#[derive(Clone, Debug)]
pub struct TransformConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    pub target: usize,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub active: bool,
}

impl TransformConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct PathConstraint {
    data_index: usize,
    pub bones: Vec<usize>,
    /// Slot holding the path attachment.
    pub target: usize,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub active: bool,
}

impl PathConstraint {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    attachment: Option<Arc<Attachment>>,
    /// Vertex offsets written by deform timelines. Empty when the attachment is undeformed.
    pub deform: Vec<f32>,
    pub color: [f32; 4],
    pub dark_color: Option<[f32; 3]>,
    pub blend: crate::BlendMode,
    pub(crate) attachment_state: u32,
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn attachment(&self) -> Option<&Arc<Attachment>> {
        self.attachment.as_ref()
    }

    /// Swaps the displayed attachment. Deform offsets survive only when both attachments are
    /// driven by the same deform keys.
    pub fn set_attachment(&mut self, attachment: Option<Arc<Attachment>>) {
        let same = match (&self.attachment, &attachment) {
            (Some(current), Some(next)) => Arc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }
        let current_id = self.attachment.as_deref().and_then(Attachment::timeline_id);
        let next_id = attachment.as_deref().and_then(Attachment::timeline_id);
        if current_id.is_none() || current_id != next_id {
            self.deform.clear();
        }
        self.attachment = attachment;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum UpdateCacheItem {
    Bone(usize),
    Ik(usize),
    Transform(usize),
    Path(usize),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct PathConstraintScratch {
    pub(crate) spaces: Vec<f32>,
    pub(crate) lengths: Vec<f32>,
    pub(crate) positions: Vec<f32>,
    pub(crate) world: Vec<f32>,
    pub(crate) curves: Vec<f32>,
}

/// A posable instance of a [`SkeletonData`].
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    bone_children: Vec<Vec<usize>>,
    pub slots: Vec<Slot>,
    /// `draw_order[i]` is the slot drawn at position `i`.
    pub draw_order: Vec<usize>,
    skin: Option<Arc<Skin>>,
    pub color: [f32; 4],
    pub ik_constraints: Vec<IkConstraint>,
    pub transform_constraints: Vec<TransformConstraint>,
    pub path_constraints: Vec<PathConstraint>,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    update_cache: Vec<UpdateCacheItem>,
    pub(crate) path_scratch: Vec<PathConstraintScratch>,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(data_index, bone)| Bone {
                data_index,
                parent: bone.parent,
                inherit: bone.inherit,
                active: !bone.skin_required,
                x: bone.x,
                y: bone.y,
                rotation: bone.rotation,
                scale_x: bone.scale_x,
                scale_y: bone.scale_y,
                shear_x: bone.shear_x,
                shear_y: bone.shear_y,
                ax: bone.x,
                ay: bone.y,
                arotation: bone.rotation,
                ascale_x: bone.scale_x,
                ascale_y: bone.scale_y,
                ashear_x: bone.shear_x,
                ashear_y: bone.shear_y,
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 1.0,
                world_x: 0.0,
                world_y: 0.0,
            })
            .collect::<Vec<_>>();

        let mut bone_children = vec![Vec::new(); bones.len()];
        for (index, bone) in bones.iter().enumerate() {
            if let Some(children) = bone.parent.and_then(|p| bone_children.get_mut(p)) {
                children.push(index);
            }
        }

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(data_index, slot)| Slot {
                data_index,
                bone: slot.bone,
                attachment: None,
                deform: Vec::new(),
                color: slot.color,
                dark_color: slot.dark_color,
                blend: slot.blend,
                attachment_state: 0,
            })
            .collect::<Vec<_>>();

        let ik_constraints = data
            .ik_constraints
            .iter()
            .enumerate()
            .map(|(data_index, ik)| IkConstraint {
                data_index,
                bones: ik.bones.clone(),
                target: ik.target,
                mix: ik.mix,
                softness: ik.softness,
                bend_direction: ik.bend_direction,
                compress: ik.compress,
                stretch: ik.stretch,
                active: true,
            })
            .collect();

        let transform_constraints = data
            .transform_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| TransformConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                mix_rotate: c.rotate_mix,
                mix_x: c.translate_mix,
                mix_y: c.translate_mix,
                mix_scale_x: c.scale_mix,
                mix_scale_y: c.scale_mix,
                mix_shear_y: c.shear_mix,
                active: true,
            })
            .collect();

        let path_constraints = data
            .path_constraints
            .iter()
            .enumerate()
            .map(|(data_index, c)| PathConstraint {
                data_index,
                bones: c.bones.clone(),
                target: c.target,
                position: c.position,
                spacing: c.spacing,
                mix_rotate: c.rotate_mix,
                mix_x: c.translate_mix,
                mix_y: c.translate_mix,
                active: true,
            })
            .collect::<Vec<_>>();

        let path_scratch = vec![PathConstraintScratch::default(); path_constraints.len()];
        let draw_order = (0..slots.len()).collect();

        let mut skeleton = Self {
            data,
            bones,
            bone_children,
            slots,
            draw_order,
            skin: None,
            color: [1.0; 4],
            ik_constraints,
            transform_constraints,
            path_constraints,
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            update_cache: Vec::new(),
            path_scratch,
        };
        skeleton.set_slots_to_setup_pose();
        skeleton.update_cache();
        skeleton
    }

    pub fn skin(&self) -> Option<&Skin> {
        self.skin.as_deref()
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.data.find_bone(name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.data.find_slot(name)
    }

    /// Sets a skin from the skeleton data by name, or clears it with `None`.
    pub fn set_skin(&mut self, name: Option<&str>) -> Result<(), Error> {
        let skin = match name {
            None => None,
            Some(name) => {
                let skin = self.data.skin(name).ok_or_else(|| Error::UnknownSkin {
                    name: name.to_string(),
                })?;
                Some(Arc::new(skin.clone()))
            }
        };
        self.set_skin_value(skin);
        Ok(())
    }

    /// Sets a skin that is not part of the skeleton data, for example one built by
    /// [`crate::combine_skins`].
    ///
    /// With a previous skin, every slot showing one of the old skin's attachments switches to
    /// the new skin's attachment under the same key, when it has one. Without a previous skin,
    /// slots show the new skin's setup attachments.
    pub fn set_skin_value(&mut self, skin: Option<Arc<Skin>>) {
        let unchanged = match (&self.skin, &skin) {
            (Some(current), Some(next)) => Arc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(new_skin) = skin.as_deref() {
            match self.skin.as_deref() {
                Some(old_skin) => {
                    for (slot_index, key, old_attachment) in old_skin.entries() {
                        let Some(slot) = self.slots.get_mut(slot_index) else {
                            continue;
                        };
                        let showing_old = slot
                            .attachment
                            .as_ref()
                            .is_some_and(|a| Arc::ptr_eq(a, old_attachment));
                        if !showing_old {
                            continue;
                        }
                        if let Some(next) = new_skin.attachment(slot_index, key) {
                            slot.set_attachment(Some(next.clone()));
                        }
                    }
                }
                None => {
                    for (slot_index, slot) in self.slots.iter_mut().enumerate() {
                        let Some(name) = self
                            .data
                            .slots
                            .get(slot_index)
                            .and_then(|s| s.attachment.as_deref())
                        else {
                            continue;
                        };
                        if let Some(attachment) = new_skin.attachment(slot_index, name) {
                            slot.set_attachment(Some(attachment.clone()));
                        }
                    }
                }
            }
        }

        self.skin = skin;
        self.update_cache();
    }

    /// Looks an attachment up in the current skin, then in the default skin.
    pub fn get_attachment(&self, slot_index: usize, name: &str) -> Option<Arc<Attachment>> {
        if let Some(found) = self
            .skin
            .as_deref()
            .and_then(|skin| skin.attachment(slot_index, name))
        {
            return Some(found.clone());
        }
        self.data
            .default_skin()
            .and_then(|skin| skin.attachment(slot_index, name))
            .cloned()
    }

    /// Shows the named attachment on the named slot, or clears the slot with `None`.
    pub fn set_attachment(&mut self, slot_name: &str, attachment_name: Option<&str>) -> Result<(), Error> {
        let slot_index = self.find_slot(slot_name).ok_or_else(|| Error::InvalidValue {
            message: format!("no slot named '{slot_name}'"),
        })?;
        let attachment = match attachment_name {
            None => None,
            Some(name) => Some(self.get_attachment(slot_index, name).ok_or_else(|| {
                Error::InvalidValue {
                    message: format!("no attachment '{name}' for slot '{slot_name}'"),
                }
            })?),
        };
        if let Some(slot) = self.slots.get_mut(slot_index) {
            slot.set_attachment(attachment);
        }
        Ok(())
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    /// Resets bones and constraints to the setup pose.
    pub fn set_bones_to_setup_pose(&mut self) {
        for bone in &mut self.bones {
            let Some(data) = self.data.bones.get(bone.data_index) else {
                continue;
            };
            bone.inherit = data.inherit;
            bone.x = data.x;
            bone.y = data.y;
            bone.rotation = data.rotation;
            bone.scale_x = data.scale_x;
            bone.scale_y = data.scale_y;
            bone.shear_x = data.shear_x;
            bone.shear_y = data.shear_y;
        }

        for c in &mut self.ik_constraints {
            let Some(data) = self.data.ik_constraints.get(c.data_index) else {
                continue;
            };
            c.mix = data.mix;
            c.softness = data.softness;
            c.bend_direction = data.bend_direction;
            c.compress = data.compress;
            c.stretch = data.stretch;
        }

        for c in &mut self.transform_constraints {
            let Some(data) = self.data.transform_constraints.get(c.data_index) else {
                continue;
            };
            c.mix_rotate = data.rotate_mix;
            c.mix_x = data.translate_mix;
            c.mix_y = data.translate_mix;
            c.mix_scale_x = data.scale_mix;
            c.mix_scale_y = data.scale_mix;
            c.mix_shear_y = data.shear_mix;
        }

        for c in &mut self.path_constraints {
            let Some(data) = self.data.path_constraints.get(c.data_index) else {
                continue;
            };
            c.position = data.position;
            c.spacing = data.spacing;
            c.mix_rotate = data.rotate_mix;
            c.mix_x = data.translate_mix;
            c.mix_y = data.translate_mix;
        }
    }

    /// Resets slot colors, attachments and the draw order to the setup pose.
    pub fn set_slots_to_setup_pose(&mut self) {
        self.draw_order.clear();
        self.draw_order.extend(0..self.slots.len());
        for index in 0..self.slots.len() {
            let Some(data) = self.data.slots.get(index) else {
                continue;
            };
            let attachment = data
                .attachment
                .as_deref()
                .and_then(|name| self.get_attachment(index, name));
            let slot = &mut self.slots[index];
            slot.color = data.color;
            slot.dark_color = data.dark_color;
            slot.blend = data.blend;
            slot.set_attachment(attachment);
        }
    }

    /// Rebuilds the bone and constraint update order. Called whenever the skin changes.
    pub fn update_cache(&mut self) {
        let skin = self.skin.clone();

        for bone in &mut self.bones {
            bone.active = !self
                .data
                .bones
                .get(bone.data_index)
                .is_some_and(|d| d.skin_required);
        }
        if let Some(skin) = skin.as_deref() {
            for &bone_index in &skin.bones {
                let mut cur = Some(bone_index);
                while let Some(i) = cur {
                    let Some(bone) = self.bones.get_mut(i) else {
                        break;
                    };
                    bone.active = true;
                    cur = bone.parent;
                }
            }
        }

        let skin_ik = skin.as_deref().map_or(&[][..], |s| s.ik_constraints.as_slice());
        let skin_transform = skin
            .as_deref()
            .map_or(&[][..], |s| s.transform_constraints.as_slice());
        let skin_path = skin.as_deref().map_or(&[][..], |s| s.path_constraints.as_slice());
        for c in &mut self.ik_constraints {
            let required = self
                .data
                .ik_constraints
                .get(c.data_index)
                .is_some_and(|d| d.skin_required);
            let target_active = self.bones.get(c.target).is_some_and(|b| b.active);
            c.active = target_active && (!required || skin_ik.contains(&c.data_index));
        }
        for c in &mut self.transform_constraints {
            let required = self
                .data
                .transform_constraints
                .get(c.data_index)
                .is_some_and(|d| d.skin_required);
            let target_active = self.bones.get(c.target).is_some_and(|b| b.active);
            c.active = target_active && (!required || skin_transform.contains(&c.data_index));
        }
        for c in &mut self.path_constraints {
            let required = self
                .data
                .path_constraints
                .get(c.data_index)
                .is_some_and(|d| d.skin_required);
            let target_active = self
                .slots
                .get(c.target)
                .and_then(|s| self.bones.get(s.bone))
                .is_some_and(|b| b.active);
            c.active = target_active && (!required || skin_path.contains(&c.data_index));
        }

        self.update_cache = self.build_update_cache();
    }

    fn build_update_cache(&self) -> Vec<UpdateCacheItem> {
        let mut sorter = CacheSorter {
            skeleton: self,
            sorted: self.bones.iter().map(|b| !b.active).collect(),
            out: Vec::new(),
        };

        #[derive(Copy, Clone)]
        enum Kind {
            Ik,
            Transform,
            Path,
        }
        let mut ordered = Vec::new();
        for (index, c) in self.ik_constraints.iter().enumerate() {
            if let (true, Some(data)) = (c.active, self.data.ik_constraints.get(c.data_index)) {
                ordered.push((data.order, Kind::Ik, index));
            }
        }
        for (index, c) in self.transform_constraints.iter().enumerate() {
            if let (true, Some(data)) = (c.active, self.data.transform_constraints.get(c.data_index)) {
                ordered.push((data.order, Kind::Transform, index));
            }
        }
        for (index, c) in self.path_constraints.iter().enumerate() {
            if let (true, Some(data)) = (c.active, self.data.path_constraints.get(c.data_index)) {
                ordered.push((data.order, Kind::Path, index));
            }
        }
        // Stable: equal orders keep IK, transform, path precedence.
        ordered.sort_by_key(|(order, _, _)| *order);

        for (_, kind, index) in ordered {
            match kind {
                Kind::Ik => sorter.sort_ik(index),
                Kind::Transform => sorter.sort_transform(index),
                Kind::Path => sorter.sort_path(index),
            }
        }
        for bone_index in 0..self.bones.len() {
            sorter.sort_bone(bone_index);
        }
        sorter.out
    }

    /// Computes world transforms for every active bone, applying constraints in update order.
    pub fn update_world_transform(&mut self) {
        for bone in &mut self.bones {
            bone.reset_applied();
        }

        let cache = std::mem::take(&mut self.update_cache);
        for item in cache.iter().copied() {
            match item {
                UpdateCacheItem::Bone(index) => self.update_bone_world_transform(index),
                UpdateCacheItem::Ik(index) => self.apply_ik_constraint(index),
                UpdateCacheItem::Transform(index) => self.apply_transform_constraint(index),
                UpdateCacheItem::Path(index) => self.apply_path_constraint(index),
            }
        }
        self.update_cache = cache;
    }

    fn update_bone_world_transform(&mut self, bone_index: usize) {
        let Some(bone) = self.bones.get(bone_index) else {
            return;
        };
        let parent = bone
            .parent
            .and_then(|p| self.bones.get(p))
            .map(ParentTransform::of);
        let (x, y, scale_x, scale_y) = (self.x, self.y, self.scale_x, self.scale_y);
        let bone = &mut self.bones[bone_index];
        match parent {
            Some(parent) => update_world_transform_child(bone, scale_x, scale_y, &parent),
            None => update_world_transform_root(bone, x, y, scale_x, scale_y),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update_bone_world_transform_with(
        &mut self,
        bone_index: usize,
        x: f32,
        y: f32,
        rotation: f32,
        scale_x: f32,
        scale_y: f32,
        shear_x: f32,
        shear_y: f32,
    ) {
        let Some(bone) = self.bones.get_mut(bone_index) else {
            return;
        };
        bone.set_applied(x, y, rotation, scale_x, scale_y, shear_x, shear_y);
        self.update_bone_world_transform(bone_index);
    }

    /// Recomputes the applied local transform from the world transform after a constraint edited
    /// the world transform directly.
    pub(crate) fn update_applied_transform(&mut self, bone_index: usize) {
        let Some(bone) = self.bones.get(bone_index) else {
            return;
        };
        let (a, b, c, d, wx, wy) = (bone.a, bone.b, bone.c, bone.d, bone.world_x, bone.world_y);
        let parent = bone.parent.and_then(|p| self.bones.get(p)).map(ParentTransform::of);

        let Some(parent) = parent else {
            let (x, y) = (self.x, self.y);
            let bone = &mut self.bones[bone_index];
            bone.set_applied(
                wx - x,
                wy - y,
                c.atan2(a).to_degrees(),
                (a * a + c * c).sqrt(),
                (b * b + d * d).sqrt(),
                0.0,
                (a * b + c * d).atan2(a * d - b * c).to_degrees(),
            );
            return;
        };

        let (pa, mut pb, mut pc, mut pd) = (parent.a, parent.b, parent.c, parent.d);
        let det = pa * pd - pb * pc;
        let mut pid = 1.0 / det;
        let mut ia = pd * pid;
        let mut ib = pb * pid;
        let mut ic = pc * pid;
        let mut id = pa * pid;
        let dx = wx - parent.world_x;
        let dy = wy - parent.world_y;
        let ax = dx * ia - dy * ib;
        let ay = dy * id - dx * ic;

        let inherit = bone.inherit;
        let (ra, rb, rc, rd) = if inherit == Inherit::OnlyTranslation {
            (a, b, c, d)
        } else {
            match inherit {
                Inherit::NoRotationOrReflection => {
                    let s = det.abs() / (pa * pa + pc * pc);
                    pb = -pc * self.scale_x * s / self.scale_y;
                    pd = pa * self.scale_y * s / self.scale_x;
                    pid = 1.0 / (pa * pd - pb * pc);
                    ia = pd * pid;
                    ib = pb * pid;
                }
                Inherit::NoScale | Inherit::NoScaleOrReflection => {
                    let (sin, cos) = bone.arotation.to_radians().sin_cos();
                    let mut za = (pa * cos + pb * sin) / self.scale_x;
                    pc = (pc * cos + pd * sin) / self.scale_y;
                    let mut s = (za * za + pc * pc).sqrt();
                    if s > 1.0e-5 {
                        s = 1.0 / s;
                    }
                    za *= s;
                    pc *= s;
                    s = (za * za + pc * pc).sqrt();
                    if inherit == Inherit::NoScale
                        && (det < 0.0) != ((self.scale_x < 0.0) != (self.scale_y < 0.0))
                    {
                        s = -s;
                    }
                    let r = std::f32::consts::FRAC_PI_2 + pc.atan2(za);
                    pb = r.cos() * s;
                    pd = r.sin() * s;
                    pid = 1.0 / (za * pd - pb * pc);
                    ia = pd * pid;
                    ib = pb * pid;
                    ic = pc * pid;
                    id = za * pid;
                }
                Inherit::Normal | Inherit::OnlyTranslation => {}
            }
            (ia * a - ib * c, ia * b - ib * d, id * c - ic * a, id * d - ic * b)
        };

        let scale_x = (ra * ra + rc * rc).sqrt();
        let (rotation, scale_x, scale_y, shear_y) = if scale_x > 1.0e-4 {
            let det = ra * rd - rb * rc;
            (
                rc.atan2(ra).to_degrees(),
                scale_x,
                det / scale_x,
                -(ra * rb + rc * rd).atan2(det).to_degrees(),
            )
        } else {
            (
                90.0 - rd.atan2(rb).to_degrees(),
                0.0,
                (rb * rb + rd * rd).sqrt(),
                0.0,
            )
        };
        let bone = &mut self.bones[bone_index];
        bone.set_applied(ax, ay, rotation, scale_x, scale_y, 0.0, shear_y);
    }

    fn apply_ik_constraint(&mut self, index: usize) {
        let Some(ik) = self.ik_constraints.get(index) else {
            return;
        };
        if ik.mix == 0.0 {
            return;
        }
        let uniform = self
            .data
            .ik_constraints
            .get(ik.data_index)
            .is_some_and(|d| d.uniform);
        let Some(target) = self.bones.get(ik.target) else {
            return;
        };
        let (target_x, target_y) = (target.world_x, target.world_y);
        let (mix, softness, bend, compress, stretch) =
            (ik.mix, ik.softness, ik.bend_direction, ik.compress, ik.stretch);
        let bones = ik.bones.clone();

        match *bones.as_slice() {
            [bone] => self.apply_ik_one(bone, target_x, target_y, compress, stretch, uniform, mix),
            [parent, child] => self.apply_ik_two(
                parent, child, target_x, target_y, bend, softness, stretch, uniform, mix,
            ),
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_ik_one(
        &mut self,
        bone_index: usize,
        target_x: f32,
        target_y: f32,
        compress: bool,
        stretch: bool,
        uniform: bool,
        alpha: f32,
    ) {
        let Some(bone) = self.bones.get(bone_index) else {
            return;
        };
        let Some(parent) = bone.parent.and_then(|p| self.bones.get(p)) else {
            return;
        };
        let (pa, mut pb, pc, mut pd) = (parent.a, parent.b, parent.c, parent.d);
        let (pwx, pwy) = (parent.world_x, parent.world_y);

        let mut rotation_ik = -bone.ashear_x - bone.arotation;
        let (mut tx, mut ty) = match bone.inherit {
            Inherit::OnlyTranslation => (target_x - bone.world_x, target_y - bone.world_y),
            inherit => {
                if inherit == Inherit::NoRotationOrReflection {
                    let s = (pa * pd - pb * pc).abs() / (pa * pa + pc * pc).max(1.0e-4);
                    let sa = pa / self.scale_x;
                    let sc = pc / self.scale_y;
                    pb = -sc * s * self.scale_x;
                    pd = sa * s * self.scale_y;
                    rotation_ik += sc.atan2(sa).to_degrees();
                }
                let x = target_x - pwx;
                let y = target_y - pwy;
                let det = pa * pd - pb * pc;
                if det.abs() <= 1.0e-4 {
                    (0.0, 0.0)
                } else {
                    ((x * pd - y * pb) / det - bone.ax, (y * pa - x * pc) / det - bone.ay)
                }
            }
        };

        rotation_ik += ty.atan2(tx).to_degrees();
        if bone.ascale_x < 0.0 {
            rotation_ik += 180.0;
        }
        if rotation_ik > 180.0 {
            rotation_ik -= 360.0;
        } else if rotation_ik < -180.0 {
            rotation_ik += 360.0;
        }

        let mut sx = bone.ascale_x;
        let mut sy = bone.ascale_y;
        if compress || stretch {
            if matches!(bone.inherit, Inherit::NoScale | Inherit::NoScaleOrReflection) {
                tx = target_x - bone.world_x;
                ty = target_y - bone.world_y;
            }
            let length = self.data.bones.get(bone_index).map_or(0.0, |d| d.length);
            let b = length * sx;
            let dd = (tx * tx + ty * ty).sqrt();
            if b > 1.0e-4 && ((compress && dd < b) || (stretch && dd > b)) {
                let s = (dd / b - 1.0) * alpha + 1.0;
                sx *= s;
                if uniform {
                    sy *= s;
                }
            }
        }

        let (ax, ay, rotation, shear_x, shear_y) =
            (bone.ax, bone.ay, bone.arotation, bone.ashear_x, bone.ashear_y);
        self.update_bone_world_transform_with(
            bone_index,
            ax,
            ay,
            rotation + rotation_ik * alpha,
            sx,
            sy,
            shear_x,
            shear_y,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_ik_two(
        &mut self,
        parent_index: usize,
        child_index: usize,
        target_x: f32,
        target_y: f32,
        bend_direction: i32,
        softness: f32,
        stretch: bool,
        uniform: bool,
        alpha: f32,
    ) {
        const EPSILON: f32 = 1.0e-4;
        const PI: f32 = std::f32::consts::PI;

        let (Some(parent), Some(child)) = (self.bones.get(parent_index), self.bones.get(child_index))
        else {
            return;
        };
        let Some(pp) = parent.parent.and_then(|p| self.bones.get(p)) else {
            return;
        };
        let (a, b, c, d, pp_x, pp_y) = (pp.a, pp.b, pp.c, pp.d, pp.world_x, pp.world_y);

        let (px, py, parent_rotation) = (parent.ax, parent.ay, parent.arotation);
        let mut psx = parent.ascale_x;
        let mut psy = parent.ascale_y;
        let mut sx = psx;
        let mut sy = psy;
        let mut csx = child.ascale_x;
        let (os1, mut s2) = if psx < 0.0 {
            psx = -psx;
            (180.0, -1.0f32)
        } else {
            (0.0, 1.0f32)
        };
        if psy < 0.0 {
            psy = -psy;
            s2 = -s2;
        }
        let os2 = if csx < 0.0 {
            csx = -csx;
            180.0
        } else {
            0.0
        };

        let cx = child.ax;
        let (pa, pb, pc, pd) = (parent.a, parent.b, parent.c, parent.d);
        let u = (psx - psy).abs() <= EPSILON;
        let (cy, cwx, cwy) = if !u || stretch {
            (0.0, pa * cx + parent.world_x, pc * cx + parent.world_y)
        } else {
            let cy = child.ay;
            (
                cy,
                pa * cx + pb * cy + parent.world_x,
                pc * cx + pd * cy + parent.world_y,
            )
        };

        let det = a * d - b * c;
        let id = if det.abs() <= EPSILON { 0.0 } else { 1.0 / det };
        let x = cwx - pp_x;
        let y = cwy - pp_y;
        let dx = (x * d - y * b) * id - px;
        let dy = (y * a - x * c) * id - py;
        let l1 = (dx * dx + dy * dy).sqrt();
        let child_length = self.data.bones.get(child_index).map_or(0.0, |d| d.length);
        let mut l2 = child_length * csx;

        let (child_rotation, child_sx, child_sy, child_shear_x, child_shear_y) = (
            child.arotation,
            child.ascale_x,
            child.ascale_y,
            child.ashear_x,
            child.ashear_y,
        );

        if l1 < EPSILON {
            self.apply_ik_one(parent_index, target_x, target_y, false, stretch, false, alpha);
            self.update_bone_world_transform_with(
                child_index,
                cx,
                cy,
                0.0,
                child_sx,
                child_sy,
                child_shear_x,
                child_shear_y,
            );
            return;
        }

        let x = target_x - pp_x;
        let y = target_y - pp_y;
        let mut tx = (x * d - y * b) * id - px;
        let mut ty = (y * a - x * c) * id - py;
        let mut dd = tx * tx + ty * ty;

        if softness != 0.0 {
            let softness = softness * psx * (csx + 1.0) * 0.5;
            let td = dd.sqrt();
            let sd = td - l1 - l2 * psx + softness;
            if sd > 0.0 {
                let mut p = (sd / (softness * 2.0)).min(1.0) - 1.0;
                p = (sd - softness * (1.0 - p * p)) / td;
                tx -= p * tx;
                ty -= p * ty;
                dd = tx * tx + ty * ty;
            }
        }

        let bend_dir = if bend_direction >= 0 { 1.0 } else { -1.0 };
        let (mut a1, mut a2);
        if u {
            l2 *= psx;
            let mut cos = (dd - l1 * l1 - l2 * l2) / (2.0 * l1 * l2);
            if cos < -1.0 {
                cos = -1.0;
                a2 = PI * bend_dir;
            } else if cos > 1.0 {
                cos = 1.0;
                a2 = 0.0;
                if stretch {
                    let s = (dd.sqrt() / (l1 + l2) - 1.0) * alpha + 1.0;
                    sx *= s;
                    if uniform {
                        sy *= s;
                    }
                }
            } else {
                a2 = cos.acos() * bend_dir;
            }
            let aa = l1 + l2 * cos;
            let bb = l2 * a2.sin();
            a1 = (ty * aa - tx * bb).atan2(tx * aa + ty * bb);
        } else {
            let a = psx * l2;
            let b = psy * l2;
            let aa = a * a;
            let bb = b * b;
            let ta = ty.atan2(tx);
            let c0 = bb * l1 * l1 + aa * dd - aa * bb;
            let c1 = -2.0 * bb * l1;
            let c2 = bb - aa;
            let disc = c1 * c1 - 4.0 * c2 * c0;
            let mut solved = false;
            a1 = 0.0;
            a2 = 0.0;
            if disc >= 0.0 {
                let mut q = disc.sqrt();
                if c1 < 0.0 {
                    q = -q;
                }
                q = -(c1 + q) * 0.5;
                let r0 = q / c2;
                let r1 = c0 / q;
                let r = if r0.abs() < r1.abs() { r0 } else { r1 };
                let r0 = dd - r * r;
                if r0 >= 0.0 {
                    let y = r0.sqrt() * bend_dir;
                    a1 = ta - y.atan2(r);
                    a2 = (y / psy).atan2((r - l1) / psx);
                    solved = true;
                }
            }
            if !solved {
                let mut min_angle = PI;
                let mut min_x = l1 - a;
                let mut min_dist = min_x * min_x;
                let mut min_y = 0.0f32;
                let mut max_angle = 0.0f32;
                let mut max_x = l1 + a;
                let mut max_dist = max_x * max_x;
                let mut max_y = 0.0f32;
                let c = -a * l1 / (aa - bb);
                if (-1.0..=1.0).contains(&c) {
                    let c = c.acos();
                    let x = a * c.cos() + l1;
                    let y = b * c.sin();
                    let d = x * x + y * y;
                    if d < min_dist {
                        min_angle = c;
                        min_dist = d;
                        min_x = x;
                        min_y = y;
                    }
                    if d > max_dist {
                        max_angle = c;
                        max_dist = d;
                        max_x = x;
                        max_y = y;
                    }
                }
                if dd <= (min_dist + max_dist) * 0.5 {
                    a1 = ta - (min_y * bend_dir).atan2(min_x);
                    a2 = min_angle * bend_dir;
                } else {
                    a1 = ta - (max_y * bend_dir).atan2(max_x);
                    a2 = max_angle * bend_dir;
                }
            }
        }

        let os = cy.atan2(cx) * s2;
        a1 = wrap_degrees((a1 - os).to_degrees() + os1 - parent_rotation);
        self.update_bone_world_transform_with(
            parent_index,
            px,
            py,
            parent_rotation + a1 * alpha,
            sx,
            sy,
            0.0,
            0.0,
        );

        a2 = wrap_degrees((((a2 + os).to_degrees()) - child_shear_x) * s2 + os2 - child_rotation);
        self.update_bone_world_transform_with(
            child_index,
            cx,
            cy,
            child_rotation + a2 * alpha,
            child_sx,
            child_sy,
            child_shear_x,
            child_shear_y,
        );
    }

    fn apply_transform_constraint(&mut self, index: usize) {
        let Some(c) = self.transform_constraints.get(index) else {
            return;
        };
        if c.mix_rotate == 0.0
            && c.mix_x == 0.0
            && c.mix_y == 0.0
            && c.mix_scale_x == 0.0
            && c.mix_scale_y == 0.0
            && c.mix_shear_y == 0.0
        {
            return;
        }
        let Some(data) = self.data.transform_constraints.get(c.data_index) else {
            return;
        };
        let Some(target) = self.bones.get(c.target).cloned() else {
            return;
        };
        let data = data.clone();
        let c = c.clone();
        match (data.local, data.relative) {
            (false, false) => self.transform_absolute_world(&c, &data, &target),
            (false, true) => self.transform_relative_world(&c, &data, &target),
            (true, false) => self.transform_absolute_local(&c, &data, &target),
            (true, true) => self.transform_relative_local(&c, &data, &target),
        }
    }

    fn transform_absolute_world(
        &mut self,
        c: &TransformConstraint,
        data: &crate::TransformConstraintData,
        target: &Bone,
    ) {
        let (ta, tb, tc, td) = (target.a, target.b, target.c, target.d);
        let reflect = if ta * td - tb * tc > 0.0 { 1.0 } else { -1.0 };
        let offset_rotation = data.offset_rotation.to_radians() * reflect;
        let offset_shear_y = data.offset_shear_y.to_radians() * reflect;
        let translate = c.mix_x != 0.0 || c.mix_y != 0.0;
        let [tx, ty] = target.local_to_world([data.offset_x, data.offset_y]);

        for &bone_index in &c.bones {
            let Some(bone) = self.bones.get_mut(bone_index) else {
                continue;
            };
            if c.mix_rotate != 0.0 {
                let r = tc.atan2(ta) - bone.c.atan2(bone.a) + offset_rotation;
                rotate_world(bone, wrap_pi(r) * c.mix_rotate);
            }
            if translate {
                bone.world_x += (tx - bone.world_x) * c.mix_x;
                bone.world_y += (ty - bone.world_y) * c.mix_y;
            }
            if c.mix_scale_x != 0.0 {
                let mut s = (bone.a * bone.a + bone.c * bone.c).sqrt();
                if s != 0.0 {
                    let ts = (ta * ta + tc * tc).sqrt();
                    s = (s + (ts - s + data.offset_scale_x) * c.mix_scale_x) / s;
                }
                bone.a *= s;
                bone.c *= s;
            }
            if c.mix_scale_y != 0.0 {
                let mut s = (bone.b * bone.b + bone.d * bone.d).sqrt();
                if s != 0.0 {
                    let ts = (tb * tb + td * td).sqrt();
                    s = (s + (ts - s + data.offset_scale_y) * c.mix_scale_y) / s;
                }
                bone.b *= s;
                bone.d *= s;
            }
            if c.mix_shear_y > 0.0 {
                let by = bone.d.atan2(bone.b);
                let r = td.atan2(tb) - tc.atan2(ta) - (by - bone.c.atan2(bone.a));
                let r = by + (wrap_pi(r) + offset_shear_y) * c.mix_shear_y;
                let s = (bone.b * bone.b + bone.d * bone.d).sqrt();
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
            }
            self.update_applied_transform(bone_index);
        }
    }

    fn transform_relative_world(
        &mut self,
        c: &TransformConstraint,
        data: &crate::TransformConstraintData,
        target: &Bone,
    ) {
        let (ta, tb, tc, td) = (target.a, target.b, target.c, target.d);
        let reflect = if ta * td - tb * tc > 0.0 { 1.0 } else { -1.0 };
        let offset_rotation = data.offset_rotation.to_radians() * reflect;
        let offset_shear_y = data.offset_shear_y.to_radians() * reflect;
        let translate = c.mix_x != 0.0 || c.mix_y != 0.0;
        let [tx, ty] = target.local_to_world([data.offset_x, data.offset_y]);

        for &bone_index in &c.bones {
            let Some(bone) = self.bones.get_mut(bone_index) else {
                continue;
            };
            if c.mix_rotate != 0.0 {
                let r = tc.atan2(ta) + offset_rotation;
                rotate_world(bone, wrap_pi(r) * c.mix_rotate);
            }
            if translate {
                bone.world_x += tx * c.mix_x;
                bone.world_y += ty * c.mix_y;
            }
            if c.mix_scale_x != 0.0 {
                let s = ((ta * ta + tc * tc).sqrt() - 1.0 + data.offset_scale_x) * c.mix_scale_x
                    + 1.0;
                bone.a *= s;
                bone.c *= s;
            }
            if c.mix_scale_y != 0.0 {
                let s = ((tb * tb + td * td).sqrt() - 1.0 + data.offset_scale_y) * c.mix_scale_y
                    + 1.0;
                bone.b *= s;
                bone.d *= s;
            }
            if c.mix_shear_y > 0.0 {
                let r = wrap_pi(td.atan2(tb) - tc.atan2(ta));
                let r = bone.d.atan2(bone.b)
                    + (r - std::f32::consts::FRAC_PI_2 + offset_shear_y) * c.mix_shear_y;
                let s = (bone.b * bone.b + bone.d * bone.d).sqrt();
                bone.b = r.cos() * s;
                bone.d = r.sin() * s;
            }
            self.update_applied_transform(bone_index);
        }
    }

    fn transform_absolute_local(
        &mut self,
        c: &TransformConstraint,
        data: &crate::TransformConstraintData,
        target: &Bone,
    ) {
        for &bone_index in &c.bones {
            let Some(bone) = self.bones.get(bone_index) else {
                continue;
            };
            let mut rotation = bone.arotation;
            if c.mix_rotate != 0.0 {
                let r = target.arotation - rotation + data.offset_rotation;
                rotation += wrap_degrees_f64(r) * c.mix_rotate;
            }
            let x = bone.ax + (target.ax - bone.ax + data.offset_x) * c.mix_x;
            let y = bone.ay + (target.ay - bone.ay + data.offset_y) * c.mix_y;
            let mut scale_x = bone.ascale_x;
            let mut scale_y = bone.ascale_y;
            if c.mix_scale_x != 0.0 && scale_x != 0.0 {
                scale_x = (scale_x + (target.ascale_x - scale_x + data.offset_scale_x) * c.mix_scale_x)
                    / scale_x;
            }
            if c.mix_scale_y != 0.0 && scale_y != 0.0 {
                scale_y = (scale_y + (target.ascale_y - scale_y + data.offset_scale_y) * c.mix_scale_y)
                    / scale_y;
            }
            let mut shear_y = bone.ashear_y;
            if c.mix_shear_y != 0.0 {
                let r = target.ashear_y - shear_y + data.offset_shear_y;
                shear_y += wrap_degrees_f64(r) * c.mix_shear_y;
            }
            let shear_x = bone.ashear_x;
            self.update_bone_world_transform_with(
                bone_index, x, y, rotation, scale_x, scale_y, shear_x, shear_y,
            );
        }
    }

    fn transform_relative_local(
        &mut self,
        c: &TransformConstraint,
        data: &crate::TransformConstraintData,
        target: &Bone,
    ) {
        for &bone_index in &c.bones {
            let Some(bone) = self.bones.get(bone_index) else {
                continue;
            };
            let rotation = bone.arotation + (target.arotation + data.offset_rotation) * c.mix_rotate;
            let x = bone.ax + (target.ax + data.offset_x) * c.mix_x;
            let y = bone.ay + (target.ay + data.offset_y) * c.mix_y;
            let scale_x =
                bone.ascale_x * ((target.ascale_x - 1.0 + data.offset_scale_x) * c.mix_scale_x + 1.0);
            let scale_y =
                bone.ascale_y * ((target.ascale_y - 1.0 + data.offset_scale_y) * c.mix_scale_y + 1.0);
            let shear_y = bone.ashear_y + (target.ashear_y + data.offset_shear_y) * c.mix_shear_y;
            let shear_x = bone.ashear_x;
            self.update_bone_world_transform_with(
                bone_index, x, y, rotation, scale_x, scale_y, shear_x, shear_y,
            );
        }
    }

    /// World vertices of the attachment shown by `slot_index`, including deform offsets.
    ///
    /// Regions yield their four corners; other vertex attachments one `x, y` pair per vertex.
    pub fn slot_world_vertices(&self, slot_index: usize) -> Option<Vec<f32>> {
        let slot = self.slots.get(slot_index)?;
        let attachment = slot.attachment.as_deref()?;
        if let Attachment::Region(region) = attachment {
            let bone = self.bones.get(slot.bone)?;
            return Some(region.compute_world_vertices(bone.world_transform()).to_vec());
        }
        let vertices = attachment.vertices()?;
        let length = vertices.world_vertices_length();
        let mut out = vec![0.0f32; length];
        compute_world_vertices(&self.bones, slot, vertices, 0, length, &mut out, 0, 2);
        Some(out)
    }

    /// Axis-aligned bounds of every visible region and mesh, as `(offset, size)`.
    ///
    /// Call after [`Skeleton::update_world_transform`]. A skeleton showing nothing has a zero box.
    pub fn bounds(&self) -> ([f32; 2], [f32; 2]) {
        let mut min = [f32::INFINITY; 2];
        let mut max = [f32::NEG_INFINITY; 2];
        for &slot_index in &self.draw_order {
            let Some(slot) = self.slots.get(slot_index) else {
                continue;
            };
            if !self.bones.get(slot.bone).is_some_and(|b| b.active) {
                continue;
            }
            let drawable = matches!(
                slot.attachment.as_deref(),
                Some(Attachment::Region(_) | Attachment::Mesh(_) | Attachment::LinkedMesh(_))
            );
            if !drawable {
                continue;
            }
            let Some(vertices) = self.slot_world_vertices(slot_index) else {
                continue;
            };
            for point in vertices.chunks_exact(2) {
                min[0] = min[0].min(point[0]);
                min[1] = min[1].min(point[1]);
                max[0] = max[0].max(point[0]);
                max[1] = max[1].max(point[1]);
            }
        }
        if min[0] > max[0] || min[1] > max[1] {
            return ([0.0; 2], [0.0; 2]);
        }
        (min, [max[0] - min[0], max[1] - min[1]])
    }

    #[cfg(feature = "glam")]
    pub fn bounds_vec2(&self) -> (glam::Vec2, glam::Vec2) {
        let (offset, size) = self.bounds();
        (glam::Vec2::from(offset), glam::Vec2::from(size))
    }
}

struct CacheSorter<'a> {
    skeleton: &'a Skeleton,
    sorted: Vec<bool>,
    out: Vec<UpdateCacheItem>,
}

impl CacheSorter<'_> {
    fn sort_bone(&mut self, bone_index: usize) {
        if self.sorted.get(bone_index).copied().unwrap_or(true) {
            return;
        }
        if let Some(parent) = self.skeleton.bones[bone_index].parent {
            self.sort_bone(parent);
        }
        self.sorted[bone_index] = true;
        self.out.push(UpdateCacheItem::Bone(bone_index));
    }

    fn sort_reset_children(&mut self, bone_index: usize) {
        let skeleton = self.skeleton;
        let Some(children) = skeleton.bone_children.get(bone_index) else {
            return;
        };
        for &child in children {
            if !skeleton.bones.get(child).is_some_and(|b| b.active) {
                continue;
            }
            if self.sorted[child] {
                self.sort_reset_children(child);
            }
            self.sorted[child] = false;
        }
    }

    fn mark_sorted(&mut self, bone_index: usize) {
        if let Some(sorted) = self.sorted.get_mut(bone_index) {
            *sorted = true;
        }
    }

    fn sort_ik(&mut self, index: usize) {
        let Some(ik) = self.skeleton.ik_constraints.get(index) else {
            return;
        };
        self.sort_bone(ik.target);
        let Some(&parent) = ik.bones.first() else {
            return;
        };
        self.sort_bone(parent);
        if ik.bones.len() == 1 {
            self.out.push(UpdateCacheItem::Ik(index));
            self.sort_reset_children(parent);
        } else if let Some(&child) = ik.bones.last() {
            self.sort_bone(child);
            self.out.push(UpdateCacheItem::Ik(index));
            self.sort_reset_children(parent);
            self.mark_sorted(child);
        }
    }

    fn sort_transform(&mut self, index: usize) {
        let skeleton = self.skeleton;
        let Some(c) = skeleton.transform_constraints.get(index) else {
            return;
        };
        let local = skeleton
            .data
            .transform_constraints
            .get(c.data_index)
            .is_some_and(|d| d.local);
        self.sort_bone(c.target);
        for &bone_index in &c.bones {
            if local {
                if let Some(parent) = skeleton.bones.get(bone_index).and_then(|b| b.parent) {
                    self.sort_bone(parent);
                }
            }
            self.sort_bone(bone_index);
        }
        self.out.push(UpdateCacheItem::Transform(index));
        for &bone_index in &c.bones {
            self.sort_reset_children(bone_index);
        }
        for &bone_index in &c.bones {
            self.mark_sorted(bone_index);
        }
    }

    fn sort_path_attachment(&mut self, attachment: &Attachment, slot_bone: usize) {
        let Attachment::Path(path) = attachment else {
            return;
        };
        match &path.vertices.vertices {
            MeshVertices::Unweighted(_) => self.sort_bone(slot_bone),
            MeshVertices::Weighted(vertices) => {
                for weight in vertices.iter().flatten() {
                    self.sort_bone(weight.bone);
                }
            }
        }
    }

    fn sort_path_skin(&mut self, skin: &Skin, slot_index: usize, slot_bone: usize) {
        let Some(attachments) = skin.attachments.get(slot_index) else {
            return;
        };
        for attachment in attachments.values() {
            self.sort_path_attachment(attachment, slot_bone);
        }
    }

    fn sort_path(&mut self, index: usize) {
        let skeleton = self.skeleton;
        let Some(c) = skeleton.path_constraints.get(index) else {
            return;
        };
        let Some(slot) = skeleton.slots.get(c.target) else {
            return;
        };
        let slot_bone = slot.bone;
        let skin = skeleton.skin.as_deref();
        if let Some(skin) = skin {
            self.sort_path_skin(skin, c.target, slot_bone);
        }
        if let Some(default_skin) = skeleton.data.default_skin() {
            if skin.is_none_or(|s| s.name != default_skin.name) {
                self.sort_path_skin(default_skin, c.target, slot_bone);
            }
        }
        if let Some(attachment) = slot.attachment.as_deref() {
            self.sort_path_attachment(attachment, slot_bone);
        }

        for &bone_index in &c.bones {
            self.sort_bone(bone_index);
        }
        self.out.push(UpdateCacheItem::Path(index));
        for &bone_index in &c.bones {
            self.sort_reset_children(bone_index);
        }
        for &bone_index in &c.bones {
            self.mark_sorted(bone_index);
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct ParentTransform {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    world_x: f32,
    world_y: f32,
}

impl ParentTransform {
    fn of(bone: &Bone) -> Self {
        Self {
            a: bone.a,
            b: bone.b,
            c: bone.c,
            d: bone.d,
            world_x: bone.world_x,
            world_y: bone.world_y,
        }
    }
}

fn update_world_transform_root(bone: &mut Bone, x: f32, y: f32, scale_x: f32, scale_y: f32) {
    let rotation_x = (bone.arotation + bone.ashear_x).to_radians();
    let rotation_y = (bone.arotation + 90.0 + bone.ashear_y).to_radians();
    bone.a = rotation_x.cos() * bone.ascale_x * scale_x;
    bone.b = rotation_y.cos() * bone.ascale_y * scale_x;
    bone.c = rotation_x.sin() * bone.ascale_x * scale_y;
    bone.d = rotation_y.sin() * bone.ascale_y * scale_y;
    bone.world_x = bone.ax * scale_x + x;
    bone.world_y = bone.ay * scale_y + y;
}

fn update_world_transform_child(
    bone: &mut Bone,
    skeleton_scale_x: f32,
    skeleton_scale_y: f32,
    parent: &ParentTransform,
) {
    let mut pa = parent.a;
    let mut pb = parent.b;
    let mut pc = parent.c;
    let mut pd = parent.d;

    bone.world_x = pa * bone.ax + pb * bone.ay + parent.world_x;
    bone.world_y = pc * bone.ax + pd * bone.ay + parent.world_y;

    match bone.inherit {
        Inherit::Normal => {
            let rotation_x = (bone.arotation + bone.ashear_x).to_radians();
            let rotation_y = (bone.arotation + 90.0 + bone.ashear_y).to_radians();
            let la = rotation_x.cos() * bone.ascale_x;
            let lb = rotation_y.cos() * bone.ascale_y;
            let lc = rotation_x.sin() * bone.ascale_x;
            let ld = rotation_y.sin() * bone.ascale_y;
            bone.a = pa * la + pb * lc;
            bone.b = pa * lb + pb * ld;
            bone.c = pc * la + pd * lc;
            bone.d = pc * lb + pd * ld;
        }
        Inherit::OnlyTranslation => {
            let rotation_x = (bone.arotation + bone.ashear_x).to_radians();
            let rotation_y = (bone.arotation + 90.0 + bone.ashear_y).to_radians();
            bone.a = rotation_x.cos() * bone.ascale_x * skeleton_scale_x;
            bone.b = rotation_y.cos() * bone.ascale_y * skeleton_scale_x;
            bone.c = rotation_x.sin() * bone.ascale_x * skeleton_scale_y;
            bone.d = rotation_y.sin() * bone.ascale_y * skeleton_scale_y;
        }
        Inherit::NoRotationOrReflection => {
            let sx = if skeleton_scale_x.abs() > 1.0e-12 {
                1.0 / skeleton_scale_x
            } else {
                0.0
            };
            let sy = if skeleton_scale_y.abs() > 1.0e-12 {
                1.0 / skeleton_scale_y
            } else {
                0.0
            };
            pa *= sx;
            pc *= sy;
            let mut s = pa * pa + pc * pc;
            let prx;
            if s > 1.0e-4 {
                s = (pa * pd * sy - pb * sx * pc).abs() / s;
                pb = pc * s;
                pd = pa * s;
                prx = pc.atan2(pa).to_degrees();
            } else {
                pa = 0.0;
                pc = 0.0;
                prx = 90.0 - pd.atan2(pb).to_degrees();
            }
            let rotation_x = (bone.arotation + bone.ashear_x - prx).to_radians();
            let rotation_y = (bone.arotation + bone.ashear_y - prx + 90.0).to_radians();
            let la = rotation_x.cos() * bone.ascale_x;
            let lb = rotation_y.cos() * bone.ascale_y;
            let lc = rotation_x.sin() * bone.ascale_x;
            let ld = rotation_y.sin() * bone.ascale_y;
            bone.a = (pa * la - pb * lc) * skeleton_scale_x;
            bone.b = (pa * lb - pb * ld) * skeleton_scale_x;
            bone.c = (pc * la + pd * lc) * skeleton_scale_y;
            bone.d = (pc * lb + pd * ld) * skeleton_scale_y;
        }
        Inherit::NoScale | Inherit::NoScaleOrReflection => {
            let (sin, cos) = bone.arotation.to_radians().sin_cos();
            let za = (pa * cos + pb * sin) / skeleton_scale_x;
            let zc = (pc * cos + pd * sin) / skeleton_scale_y;
            let mut s = (za * za + zc * zc).sqrt();
            if s > 1.0e-5 {
                s = 1.0 / s;
            }
            let za = za * s;
            let zc = zc * s;
            let mut s = (za * za + zc * zc).sqrt();
            if bone.inherit == Inherit::NoScale {
                let det = pa * pd - pb * pc;
                if (det < 0.0) != ((skeleton_scale_x < 0.0) != (skeleton_scale_y < 0.0)) {
                    s = -s;
                }
            }
            let r = std::f32::consts::FRAC_PI_2 + zc.atan2(za);
            let zb = r.cos() * s;
            let zd = r.sin() * s;

            let shear_x = bone.ashear_x.to_radians();
            let shear_y = (90.0 + bone.ashear_y).to_radians();
            let la = shear_x.cos() * bone.ascale_x;
            let lb = shear_y.cos() * bone.ascale_y;
            let lc = shear_x.sin() * bone.ascale_x;
            let ld = shear_y.sin() * bone.ascale_y;
            bone.a = (za * la + zb * lc) * skeleton_scale_x;
            bone.b = (za * lb + zb * ld) * skeleton_scale_x;
            bone.c = (zc * la + zd * lc) * skeleton_scale_y;
            bone.d = (zc * lb + zd * ld) * skeleton_scale_y;
        }
    }
}

pub(crate) fn rotate_world(bone: &mut Bone, radians: f32) {
    let (sin, cos) = radians.sin_cos();
    let (a, b, c, d) = (bone.a, bone.b, bone.c, bone.d);
    bone.a = cos * a - sin * c;
    bone.b = cos * b - sin * d;
    bone.c = sin * a + cos * c;
    bone.d = sin * b + cos * d;
}

pub(crate) fn wrap_pi(radians: f32) -> f32 {
    const PI: f32 = std::f32::consts::PI;
    if radians > PI {
        radians - 2.0 * PI
    } else if radians < -PI {
        radians + 2.0 * PI
    } else {
        radians
    }
}

fn wrap_degrees(degrees: f32) -> f32 {
    if degrees > 180.0 {
        degrees - 360.0
    } else if degrees < -180.0 {
        degrees + 360.0
    } else {
        degrees
    }
}

/// Wraps any angle in degrees into `(-180, 180]`. Evaluated in `f64` so large inputs stay exact.
pub(crate) fn wrap_degrees_f64(degrees: f32) -> f32 {
    let r = degrees as f64;
    (r - (16384 - (16384.499999999996 - r / 360.0) as i32) as f64 * 360.0) as f32
}

/// Writes world positions of `count` floats of `vertices`, starting at float `start`, into `out`
/// at `offset` with `stride` floats between vertices. Deform offsets of `slot` are applied.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_world_vertices(
    bones: &[Bone],
    slot: &Slot,
    vertices: &MeshVertices,
    start: usize,
    count: usize,
    out: &mut Vec<f32>,
    offset: usize,
    stride: usize,
) {
    let start_vertex = start / 2;
    let vertex_count = count / 2;
    let end = offset + vertex_count * stride;
    if out.len() < end {
        out.resize(end, 0.0);
    }
    let deform = slot.deform.as_slice();

    match vertices {
        MeshVertices::Unweighted(v) => {
            let Some(bone) = bones.get(slot.bone) else {
                return;
            };
            let use_deform = deform.len() >= v.len() * 2;
            for (i, vi) in (start_vertex..v.len()).take(vertex_count).enumerate() {
                let (vx, vy) = if use_deform {
                    (deform[vi * 2], deform[vi * 2 + 1])
                } else {
                    (v[vi][0], v[vi][1])
                };
                let w = offset + i * stride;
                out[w] = vx * bone.a + vy * bone.b + bone.world_x;
                out[w + 1] = vx * bone.c + vy * bone.d + bone.world_y;
            }
        }
        MeshVertices::Weighted(v) => {
            let mut f = v.iter().take(start_vertex).map(|w| w.len() * 2).sum::<usize>();
            for (i, weights) in v.iter().skip(start_vertex).take(vertex_count).enumerate() {
                let mut wx = 0.0f32;
                let mut wy = 0.0f32;
                for weight in weights {
                    let dx = deform.get(f).copied().unwrap_or(0.0);
                    let dy = deform.get(f + 1).copied().unwrap_or(0.0);
                    f += 2;
                    let Some(b) = bones.get(weight.bone) else {
                        continue;
                    };
                    let vx = weight.x + dx;
                    let vy = weight.y + dy;
                    wx += (b.a * vx + b.b * vy + b.world_x) * weight.weight;
                    wy += (b.c * vx + b.d * vy + b.world_y) * weight.weight;
                }
                let w = offset + i * stride;
                out[w] = wx;
                out[w + 1] = wy;
            }
        }
    }
}
