//! Spine `.skel` (binary) loader for Spine 3.8 exports.
//!
//! The loader is IO-free: it operates on an in-memory byte slice. Renderer resources are bound
//! through the injected [`AttachmentLoader`].

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::{
    Animation, Attachment, AttachmentFrame, AttachmentKind, AttachmentLoader, AttachmentRequest,
    AttachmentTimeline, Binding, BinaryInput, BlendMode, BoneData, BoundingBoxAttachment,
    ClippingAttachment, ColorFrame, ColorTimeline, Curve, DeformFrame, DeformTimeline,
    DrawOrderFrame, DrawOrderTimeline, Error, Event, EventData, EventTimeline, FloatFrame,
    IkConstraintData, IkConstraintTimeline, IkFrame, Inherit, LinkedMeshAttachment,
    LoaderOptions, MeshAttachment, MeshGeometry, MeshVertices, PathAttachment,
    PathConstraintData, PathFloatTimeline, PathMixFrame, PathMixTimeline, PointAttachment,
    PositionMode, RegionAttachment, RendererObject, RotateFrame, RotateMode, RotateTimeline,
    SkeletonData, Skin, SlotData, SpacingMode, Timeline, TransformConstraintData,
    TransformConstraintTimeline, TransformFrame, TwoColorFrame, TwoColorTimeline, Vec2Frame,
    Vec2Timeline, VertexData, VertexWeight,
};

const CURVE_LINEAR: u8 = 0;
const CURVE_STEPPED: u8 = 1;
const CURVE_BEZIER: u8 = 2;

const SLOT_ATTACHMENT: u8 = 0;
const SLOT_COLOR: u8 = 1;
const SLOT_TWO_COLOR: u8 = 2;

const BONE_ROTATE: u8 = 0;
const BONE_TRANSLATE: u8 = 1;
const BONE_SCALE: u8 = 2;
const BONE_SHEAR: u8 = 3;

const PATH_POSITION: u8 = 0;
const PATH_SPACING: u8 = 1;
const PATH_MIX: u8 = 2;

const DEFAULT_SKIN_NAME: &str = "default";

/// Reads Spine 3.8 binary skeletons.
pub struct SkeletonBinary<'l> {
    options: LoaderOptions,
    loader: &'l mut dyn AttachmentLoader,
}

impl<'l> SkeletonBinary<'l> {
    pub fn new(loader: &'l mut dyn AttachmentLoader) -> Self {
        Self::with_options(loader, LoaderOptions::default())
    }

    pub fn with_options(loader: &'l mut dyn AttachmentLoader, options: LoaderOptions) -> Self {
        Self { options, loader }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Parses a whole skeleton. Any structural error aborts the load; no partial data is
    /// returned.
    pub fn read_skeleton_data(&mut self, bytes: &[u8]) -> Result<SkeletonData, Error> {
        let mut reader = Reader {
            input: BinaryInput::new(bytes),
            strings: Vec::new(),
            scale: self.options.effective_scale(),
            strict_version: self.options.strict_version,
            nonessential: false,
            loader: &mut *self.loader,
            next_vertex_id: 0,
            linked_meshes: Vec::new(),
        };
        reader.read_skeleton()
    }
}

/// Loads a skeleton with the given attachment loader and uniform scale.
pub fn load_skeleton(
    bytes: &[u8],
    loader: &mut dyn AttachmentLoader,
    scale: f32,
) -> Result<Arc<SkeletonData>, Error> {
    let mut binary = SkeletonBinary::with_options(loader, LoaderOptions::with_scale(scale));
    binary.read_skeleton_data(bytes).map(Arc::new)
}

impl SkeletonData {
    /// Loads a skeleton at scale 1 without binding renderer objects.
    pub fn from_skel_bytes(bytes: &[u8]) -> Result<Arc<Self>, Error> {
        load_skeleton(bytes, &mut crate::NullAttachmentLoader, 1.0)
    }
}

// Linked meshes are read before their parent may exist; they are resolved once every skin is in.
struct PendingLinkedMesh {
    skin: usize,
    slot: usize,
    key: String,
    mesh: MeshAttachment,
    parent_skin: Option<String>,
    parent: String,
    inherit_timeline: bool,
}

struct Reader<'a, 'l> {
    input: BinaryInput<'a>,
    strings: Vec<String>,
    scale: f32,
    strict_version: bool,
    nonessential: bool,
    loader: &'l mut dyn AttachmentLoader,
    next_vertex_id: u32,
    linked_meshes: Vec<PendingLinkedMesh>,
}

fn map_position_mode(v: usize) -> Option<PositionMode> {
    match v {
        0 => Some(PositionMode::Fixed),
        1 => Some(PositionMode::Percent),
        _ => None,
    }
}

fn map_spacing_mode(v: usize) -> Option<SpacingMode> {
    match v {
        0 => Some(SpacingMode::Length),
        1 => Some(SpacingMode::Fixed),
        2 => Some(SpacingMode::Percent),
        _ => None,
    }
}

fn map_rotate_mode(v: usize) -> Option<RotateMode> {
    match v {
        0 => Some(RotateMode::Tangent),
        1 => Some(RotateMode::Chain),
        2 => Some(RotateMode::ChainScale),
        _ => None,
    }
}

fn rgb888(value: i32) -> [f32; 3] {
    [
        ((value >> 16) & 0xff) as f32 / 255.0,
        ((value >> 8) & 0xff) as f32 / 255.0,
        (value & 0xff) as f32 / 255.0,
    ]
}

fn read_curve(input: &mut BinaryInput<'_>) -> Result<Curve, Error> {
    let offset = input.position();
    match input.read_u8()? {
        CURVE_LINEAR => Ok(Curve::Linear),
        CURVE_STEPPED => Ok(Curve::Stepped),
        CURVE_BEZIER => {
            let cx1 = input.read_f32()?;
            let cy1 = input.read_f32()?;
            let cx2 = input.read_f32()?;
            let cy2 = input.read_f32()?;
            Ok(Curve::bezier(cx1, cy1, cx2, cy2))
        }
        other => Err(Error::malformed(format!(
            "unknown curve type {other} at offset {offset}"
        ))),
    }
}

/// Reads `frame_count` keys; every key but the last is followed by the curve to the next key.
fn read_keys<'a, T>(
    input: &mut BinaryInput<'a>,
    frame_count: usize,
    mut read_key: impl FnMut(&mut BinaryInput<'a>) -> Result<T, Error>,
    curve_of: impl Fn(&mut T) -> &mut Curve,
) -> Result<Vec<T>, Error> {
    let mut frames = Vec::with_capacity(frame_count.min(input.remaining()));
    for frame in 0..frame_count {
        let mut key = read_key(input)?;
        if frame + 1 < frame_count {
            *curve_of(&mut key) = read_curve(input)?;
        }
        frames.push(key);
    }
    Ok(frames)
}

fn read_unit_color(input: &mut BinaryInput<'_>) -> Result<[f32; 4], Error> {
    Ok([
        input.read_u8()? as f32 / 255.0,
        input.read_u8()? as f32 / 255.0,
        input.read_u8()? as f32 / 255.0,
        input.read_u8()? as f32 / 255.0,
    ])
}

impl<'a, 'l> Reader<'a, 'l> {
    fn capacity(&self, count: usize) -> usize {
        count.min(self.input.remaining())
    }

    /// Reads an index that must be below `len`.
    fn read_index(&mut self, len: usize, what: &str) -> Result<usize, Error> {
        let offset = self.input.position();
        let index = self.input.read_count()?;
        if index >= len {
            return Err(Error::malformed(format!(
                "{what} index {index} out of range ({len}) at offset {offset}"
            )));
        }
        Ok(index)
    }

    fn read_name(&mut self, what: &str) -> Result<String, Error> {
        let offset = self.input.position();
        self.input
            .read_string()?
            .ok_or_else(|| Error::malformed(format!("{what} name is null at offset {offset}")))
    }

    fn read_ref(&mut self) -> Result<Option<String>, Error> {
        Ok(self.input.read_string_ref(&self.strings)?.map(str::to_string))
    }

    fn read_name_ref(&mut self, what: &str) -> Result<String, Error> {
        let offset = self.input.position();
        self.read_ref()?
            .ok_or_else(|| Error::malformed(format!("{what} name is null at offset {offset}")))
    }

    fn read_nonessential_color(&mut self, default: [f32; 4]) -> Result<[f32; 4], Error> {
        if self.nonessential {
            self.input.read_color()
        } else {
            Ok(default)
        }
    }

    fn read_bone_list(&mut self, bone_count: usize) -> Result<Vec<usize>, Error> {
        let n = self.input.read_count()?;
        let mut bones = Vec::with_capacity(self.capacity(n));
        for _ in 0..n {
            bones.push(self.read_index(bone_count, "bone")?);
        }
        Ok(bones)
    }

    fn read_skeleton(&mut self) -> Result<SkeletonData, Error> {
        let mut data = SkeletonData {
            hash: self.input.read_string()?,
            version: self.input.read_string()?,
            ..SkeletonData::default()
        };
        self.check_version(data.version.as_deref())?;
        data.x = self.input.read_f32()?;
        data.y = self.input.read_f32()?;
        data.width = self.input.read_f32()?;
        data.height = self.input.read_f32()?;

        self.nonessential = self.input.read_bool()?;
        if self.nonessential {
            data.fps = self.input.read_f32()?;
            data.images_path = self.input.read_string()?;
            data.audio_path = self.input.read_string()?;
        }

        let n = self.input.read_count()?;
        self.strings.reserve(self.capacity(n));
        for _ in 0..n {
            let s = self.read_name("string table entry")?;
            self.strings.push(s);
        }

        self.read_bones(&mut data)?;
        self.read_slots(&mut data)?;
        self.read_ik_constraints(&mut data)?;
        self.read_transform_constraints(&mut data)?;
        self.read_path_constraints(&mut data)?;

        if let Some(skin) = self.read_skin(&data, 0, true)? {
            data.default_skin = Some(0);
            data.skins.push(skin);
        }
        let n = self.input.read_count()?;
        for _ in 0..n {
            let index = data.skins.len();
            if let Some(skin) = self.read_skin(&data, index, false)? {
                data.skins.push(skin);
            }
        }
        self.resolve_linked_meshes(&mut data)?;

        self.read_events(&mut data)?;

        let n = self.input.read_count()?;
        let mut animations = Vec::with_capacity(self.capacity(n));
        for _ in 0..n {
            let name = self.read_name("animation")?;
            animations.push(self.read_animation(name, &data)?);
        }
        for (index, animation) in animations.iter().enumerate() {
            if data
                .animation_index
                .insert(animation.name.clone(), index)
                .is_some()
            {
                warn!("duplicate animation name '{}'; the last one wins", animation.name);
            }
        }
        data.animations = animations;

        debug!(
            "loaded skeleton version={:?} bones={} slots={} skins={} events={} animations={}",
            data.version,
            data.bones.len(),
            data.slots.len(),
            data.skins.len(),
            data.events.len(),
            data.animations.len()
        );
        Ok(data)
    }

    fn check_version(&self, version: Option<&str>) -> Result<(), Error> {
        if version.is_some_and(|v| v.starts_with("3.8")) {
            return Ok(());
        }
        if self.strict_version {
            return Err(Error::malformed(format!(
                "unsupported skeleton version {version:?}, expected 3.8.x"
            )));
        }
        warn!("skeleton version {version:?} is not 3.8.x; reading it as 3.8");
        Ok(())
    }

    fn read_bones(&mut self, data: &mut SkeletonData) -> Result<(), Error> {
        let n = self.input.read_count()?;
        data.bones.reserve(self.capacity(n));
        for index in 0..n {
            let name = self.read_name("bone")?;
            let parent = if index == 0 {
                None
            } else {
                Some(self.read_index(index, "parent bone")?)
            };
            let rotation = self.input.read_f32()?;
            let x = self.input.read_f32()? * self.scale;
            let y = self.input.read_f32()? * self.scale;
            let scale_x = self.input.read_f32()?;
            let scale_y = self.input.read_f32()?;
            let shear_x = self.input.read_f32()?;
            let shear_y = self.input.read_f32()?;
            let length = self.input.read_f32()? * self.scale;
            let mode = self.input.read_count()?;
            let inherit = Inherit::from_index(mode).ok_or_else(|| {
                Error::malformed(format!("bone '{name}' has unknown transform mode {mode}"))
            })?;
            let skin_required = self.input.read_bool()?;
            let color = self.read_nonessential_color([0.61, 0.61, 0.61, 1.0])?;
            data.bones.push(BoneData {
                index,
                name,
                parent,
                length,
                x,
                y,
                rotation,
                scale_x,
                scale_y,
                shear_x,
                shear_y,
                inherit,
                skin_required,
                color,
            });
        }
        Ok(())
    }

    fn read_slots(&mut self, data: &mut SkeletonData) -> Result<(), Error> {
        let n = self.input.read_count()?;
        data.slots.reserve(self.capacity(n));
        for index in 0..n {
            let name = self.read_name("slot")?;
            let bone = self.read_index(data.bones.len(), "slot bone")?;
            let color = self.input.read_color()?;
            let dark = self.input.read_i32()?;
            let dark_color = (dark != -1).then(|| rgb888(dark));
            let attachment = self.read_ref()?;
            let mode = self.input.read_count()?;
            let blend = BlendMode::from_index(mode).ok_or_else(|| {
                Error::malformed(format!("slot '{name}' has unknown blend mode {mode}"))
            })?;
            data.slots.push(SlotData {
                index,
                name,
                bone,
                color,
                dark_color,
                attachment,
                blend,
            });
        }
        Ok(())
    }

    fn read_ik_constraints(&mut self, data: &mut SkeletonData) -> Result<(), Error> {
        let n = self.input.read_count()?;
        for _ in 0..n {
            let name = self.read_name("IK constraint")?;
            let order = self.input.read_count()?;
            let skin_required = self.input.read_bool()?;
            let bones = self.read_bone_list(data.bones.len())?;
            if bones.is_empty() || bones.len() > 2 {
                return Err(Error::malformed(format!(
                    "IK constraint '{name}' constrains {} bones, expected 1 or 2",
                    bones.len()
                )));
            }
            let target = self.read_index(data.bones.len(), "IK target bone")?;
            data.ik_constraints.push(IkConstraintData {
                name,
                order,
                skin_required,
                bones,
                target,
                mix: self.input.read_f32()?,
                softness: self.input.read_f32()? * self.scale,
                bend_direction: self.input.read_i8()? as i32,
                compress: self.input.read_bool()?,
                stretch: self.input.read_bool()?,
                uniform: self.input.read_bool()?,
            });
        }
        Ok(())
    }

    fn read_transform_constraints(&mut self, data: &mut SkeletonData) -> Result<(), Error> {
        let n = self.input.read_count()?;
        for _ in 0..n {
            let name = self.read_name("transform constraint")?;
            let order = self.input.read_count()?;
            let skin_required = self.input.read_bool()?;
            let bones = self.read_bone_list(data.bones.len())?;
            let target = self.read_index(data.bones.len(), "transform target bone")?;
            data.transform_constraints.push(TransformConstraintData {
                name,
                order,
                skin_required,
                bones,
                target,
                local: self.input.read_bool()?,
                relative: self.input.read_bool()?,
                offset_rotation: self.input.read_f32()?,
                offset_x: self.input.read_f32()? * self.scale,
                offset_y: self.input.read_f32()? * self.scale,
                offset_scale_x: self.input.read_f32()?,
                offset_scale_y: self.input.read_f32()?,
                offset_shear_y: self.input.read_f32()?,
                rotate_mix: self.input.read_f32()?,
                translate_mix: self.input.read_f32()?,
                scale_mix: self.input.read_f32()?,
                shear_mix: self.input.read_f32()?,
            });
        }
        Ok(())
    }

    fn read_path_constraints(&mut self, data: &mut SkeletonData) -> Result<(), Error> {
        let n = self.input.read_count()?;
        for _ in 0..n {
            let name = self.read_name("path constraint")?;
            let order = self.input.read_count()?;
            let skin_required = self.input.read_bool()?;
            let bones = self.read_bone_list(data.bones.len())?;
            let target = self.read_index(data.slots.len(), "path target slot")?;
            let position_mode = map_position_mode(self.input.read_count()?);
            let spacing_mode = map_spacing_mode(self.input.read_count()?);
            let rotate_mode = map_rotate_mode(self.input.read_count()?);
            let (Some(position_mode), Some(spacing_mode), Some(rotate_mode)) =
                (position_mode, spacing_mode, rotate_mode)
            else {
                return Err(Error::malformed(format!(
                    "path constraint '{name}' has an unknown position, spacing or rotate mode"
                )));
            };
            let offset_rotation = self.input.read_f32()?;
            let mut position = self.input.read_f32()?;
            if position_mode == PositionMode::Fixed {
                position *= self.scale;
            }
            let mut spacing = self.input.read_f32()?;
            if matches!(spacing_mode, SpacingMode::Length | SpacingMode::Fixed) {
                spacing *= self.scale;
            }
            data.path_constraints.push(PathConstraintData {
                name,
                order,
                skin_required,
                bones,
                target,
                position_mode,
                spacing_mode,
                rotate_mode,
                offset_rotation,
                position,
                spacing,
                rotate_mix: self.input.read_f32()?,
                translate_mix: self.input.read_f32()?,
            });
        }
        Ok(())
    }

    /// Reads the default skin (`None` when it has no slots) or a named skin.
    fn read_skin(
        &mut self,
        data: &SkeletonData,
        skin_index: usize,
        default_skin: bool,
    ) -> Result<Option<Skin>, Error> {
        let (mut skin, slot_count) = if default_skin {
            let slot_count = self.input.read_count()?;
            if slot_count == 0 {
                return Ok(None);
            }
            (Skin::new(DEFAULT_SKIN_NAME), slot_count)
        } else {
            let mut skin = Skin::new(self.read_name_ref("skin")?);
            skin.bones = self.read_bone_list(data.bones.len())?;
            let n = self.input.read_count()?;
            for _ in 0..n {
                let i = self.read_index(data.ik_constraints.len(), "skin IK constraint")?;
                skin.ik_constraints.push(i);
            }
            let n = self.input.read_count()?;
            for _ in 0..n {
                let i = self.read_index(
                    data.transform_constraints.len(),
                    "skin transform constraint",
                )?;
                skin.transform_constraints.push(i);
            }
            let n = self.input.read_count()?;
            for _ in 0..n {
                let i = self.read_index(data.path_constraints.len(), "skin path constraint")?;
                skin.path_constraints.push(i);
            }
            let slot_count = self.input.read_count()?;
            (skin, slot_count)
        };

        for _ in 0..slot_count {
            let slot = self.read_index(data.slots.len(), "skin slot")?;
            let n = self.input.read_count()?;
            for _ in 0..n {
                let key = self.read_name_ref("attachment")?;
                if let Some(attachment) =
                    self.read_attachment(data, &skin.name, skin_index, slot, &key)?
                {
                    skin.set_attachment(slot, key, Arc::new(attachment));
                }
            }
        }
        Ok(Some(skin))
    }

    /// Asks the loader to bind an attachment. `None` when the loader skips it.
    fn bind(
        &mut self,
        skin: &str,
        name: &str,
        path: &str,
        kind: AttachmentKind,
    ) -> Result<Option<Option<RendererObject>>, Error> {
        let request = AttachmentRequest {
            skin,
            name,
            path,
            kind,
        };
        Ok(match self.loader.new_attachment(&request)? {
            Binding::Skip => None,
            Binding::Unbound => Some(None),
            Binding::Bound(object) => Some(Some(object)),
        })
    }

    fn vertex_data(&mut self, vertices: MeshVertices) -> VertexData {
        let id = self.next_vertex_id();
        VertexData {
            id,
            timeline_id: id,
            vertices,
        }
    }

    fn next_vertex_id(&mut self) -> u32 {
        let id = self.next_vertex_id;
        self.next_vertex_id += 1;
        id
    }

    /// Returns `None` for skipped attachments, unknown kinds and linked meshes, which are
    /// inserted once their parent is resolved.
    fn read_attachment(
        &mut self,
        data: &SkeletonData,
        skin_name: &str,
        skin_index: usize,
        slot: usize,
        key: &str,
    ) -> Result<Option<Attachment>, Error> {
        let scale = self.scale;
        let name = self.read_ref()?.unwrap_or_else(|| key.to_string());
        let offset = self.input.position();
        let kind = match AttachmentKind::from_tag(self.input.read_u8()?) {
            Ok(kind) => kind,
            Err(Error::UnsupportedAttachmentType { tag }) => {
                warn!(
                    "dropping attachment '{name}' in skin '{skin_name}': unsupported type {tag} at offset {offset}"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let attachment = match kind {
            AttachmentKind::Region => {
                let path = self.read_ref()?.unwrap_or_else(|| name.clone());
                let rotation = self.input.read_f32()?;
                let x = self.input.read_f32()? * scale;
                let y = self.input.read_f32()? * scale;
                let scale_x = self.input.read_f32()?;
                let scale_y = self.input.read_f32()?;
                let width = self.input.read_f32()? * scale;
                let height = self.input.read_f32()? * scale;
                let color = self.input.read_color()?;
                let Some(renderer_object) = self.bind(skin_name, &name, &path, kind)? else {
                    return Ok(None);
                };
                let mut region = RegionAttachment {
                    name,
                    path,
                    x,
                    y,
                    rotation,
                    scale_x,
                    scale_y,
                    width,
                    height,
                    color,
                    offsets: [0.0; 8],
                    renderer_object,
                };
                region.update_offsets();
                Attachment::Region(region)
            }
            AttachmentKind::BoundingBox => {
                let vertex_count = self.input.read_count()?;
                let vertices = self.read_vertices(vertex_count, data.bones.len())?;
                let color = self.read_nonessential_color([0.38, 0.94, 0.0, 1.0])?;
                if self.bind(skin_name, &name, &name, kind)?.is_none() {
                    return Ok(None);
                }
                Attachment::BoundingBox(BoundingBoxAttachment {
                    name,
                    vertices: self.vertex_data(vertices),
                    color,
                })
            }
            AttachmentKind::Mesh => {
                let path = self.read_ref()?.unwrap_or_else(|| name.clone());
                let color = self.input.read_color()?;
                let vertex_count = self.input.read_count()?;
                let mut region_uvs = Vec::with_capacity(self.capacity(vertex_count));
                for _ in 0..vertex_count {
                    let u = self.input.read_f32()?;
                    let v = self.input.read_f32()?;
                    region_uvs.push([u, v]);
                }
                let triangles = self.read_short_array()?;
                let vertices = self.read_vertices(vertex_count, data.bones.len())?;
                let hull_length = self.input.read_count()? << 1;
                let (edges, width, height) = if self.nonessential {
                    let edges = self.read_short_array()?;
                    let width = self.input.read_f32()? * scale;
                    let height = self.input.read_f32()? * scale;
                    (edges, width, height)
                } else {
                    (Vec::new(), 0.0, 0.0)
                };
                let Some(renderer_object) = self.bind(skin_name, &name, &path, kind)? else {
                    return Ok(None);
                };
                let id = self.next_vertex_id();
                Attachment::Mesh(MeshAttachment {
                    name,
                    path,
                    color,
                    id,
                    timeline_id: id,
                    geometry: Arc::new(MeshGeometry {
                        vertices,
                        region_uvs,
                        triangles,
                        hull_length,
                        edges,
                        width,
                        height,
                    }),
                    renderer_object,
                })
            }
            AttachmentKind::LinkedMesh => {
                let path = self.read_ref()?.unwrap_or_else(|| name.clone());
                let color = self.input.read_color()?;
                let parent_skin = self.read_ref()?;
                let parent = self.read_name_ref("linked mesh parent")?;
                let inherit_timeline = self.input.read_bool()?;
                if self.nonessential {
                    // Size comes from the parent once linked.
                    self.input.read_f32()?;
                    self.input.read_f32()?;
                }
                let Some(renderer_object) = self.bind(skin_name, &name, &path, kind)? else {
                    return Ok(None);
                };
                let id = self.next_vertex_id();
                self.linked_meshes.push(PendingLinkedMesh {
                    skin: skin_index,
                    slot,
                    key: key.to_string(),
                    mesh: MeshAttachment {
                        name,
                        path,
                        color,
                        id,
                        timeline_id: id,
                        geometry: Arc::default(),
                        renderer_object,
                    },
                    parent_skin,
                    parent,
                    inherit_timeline,
                });
                return Ok(None);
            }
            AttachmentKind::Path => {
                let closed = self.input.read_bool()?;
                let constant_speed = self.input.read_bool()?;
                let vertex_count = self.input.read_count()?;
                let vertices = self.read_vertices(vertex_count, data.bones.len())?;
                let n = vertex_count / 3;
                let mut lengths = Vec::with_capacity(self.capacity(n));
                for _ in 0..n {
                    lengths.push(self.input.read_f32()? * scale);
                }
                let color = self.read_nonessential_color([1.0, 0.5, 0.0, 1.0])?;
                if self.bind(skin_name, &name, &name, kind)?.is_none() {
                    return Ok(None);
                }
                Attachment::Path(PathAttachment {
                    name,
                    vertices: self.vertex_data(vertices),
                    closed,
                    constant_speed,
                    lengths,
                    color,
                })
            }
            AttachmentKind::Point => {
                let rotation = self.input.read_f32()?;
                let x = self.input.read_f32()? * scale;
                let y = self.input.read_f32()? * scale;
                let color = self.read_nonessential_color([0.38, 0.94, 0.0, 1.0])?;
                if self.bind(skin_name, &name, &name, kind)?.is_none() {
                    return Ok(None);
                }
                Attachment::Point(PointAttachment {
                    name,
                    x,
                    y,
                    rotation,
                    color,
                })
            }
            AttachmentKind::Clipping => {
                let end_slot = self.read_index(data.slots.len(), "clipping end slot")?;
                let vertex_count = self.input.read_count()?;
                let vertices = self.read_vertices(vertex_count, data.bones.len())?;
                let color = self.read_nonessential_color([0.2275, 0.2275, 0.8078, 1.0])?;
                if self.bind(skin_name, &name, &name, kind)?.is_none() {
                    return Ok(None);
                }
                Attachment::Clipping(ClippingAttachment {
                    name,
                    vertices: self.vertex_data(vertices),
                    end_slot,
                    color,
                })
            }
        };
        Ok(Some(attachment))
    }

    fn read_vertices(&mut self, vertex_count: usize, bone_count: usize) -> Result<MeshVertices, Error> {
        let scale = self.scale;
        if !self.input.read_bool()? {
            let mut out = Vec::with_capacity(self.capacity(vertex_count));
            for _ in 0..vertex_count {
                let x = self.input.read_f32()? * scale;
                let y = self.input.read_f32()? * scale;
                out.push([x, y]);
            }
            return Ok(MeshVertices::Unweighted(out));
        }

        let mut weights_per_vertex = Vec::with_capacity(self.capacity(vertex_count));
        for _ in 0..vertex_count {
            let bone_count = self.input.read_count()?;
            let mut weights = Vec::with_capacity(self.capacity(bone_count));
            for _ in 0..bone_count {
                let bone = self.read_index(bone_count, "vertex weight bone")?;
                let x = self.input.read_f32()? * scale;
                let y = self.input.read_f32()? * scale;
                let weight = self.input.read_f32()?;
                weights.push(VertexWeight { bone, x, y, weight });
            }
            weights_per_vertex.push(weights);
        }
        Ok(MeshVertices::Weighted(weights_per_vertex))
    }

    fn read_short_array(&mut self) -> Result<Vec<u16>, Error> {
        let n = self.input.read_count()?;
        let mut out = Vec::with_capacity(self.capacity(n));
        for _ in 0..n {
            out.push(self.input.read_i16()? as u16);
        }
        Ok(out)
    }

    fn resolve_linked_meshes(&mut self, data: &mut SkeletonData) -> Result<(), Error> {
        for pending in std::mem::take(&mut self.linked_meshes) {
            let skin_index = match pending.parent_skin.as_deref() {
                None => data.default_skin,
                Some(name) => data.skins.iter().position(|s| s.name == name),
            }
            .ok_or_else(|| {
                Error::malformed(format!(
                    "linked mesh '{}' refers to missing skin {:?}",
                    pending.key,
                    pending.parent_skin.as_deref().unwrap_or(DEFAULT_SKIN_NAME)
                ))
            })?;
            let parent = data.skins[skin_index]
                .attachment(pending.slot, &pending.parent)
                .and_then(|a| a.as_mesh())
                .ok_or_else(|| {
                    Error::malformed(format!(
                        "linked mesh '{}' parent mesh '{}' not found in skin '{}'",
                        pending.key, pending.parent, data.skins[skin_index].name
                    ))
                })?;
            let mut mesh = pending.mesh;
            mesh.geometry = Arc::clone(&parent.geometry);
            if pending.inherit_timeline {
                mesh.timeline_id = parent.id;
            }
            let linked = LinkedMeshAttachment {
                mesh,
                skin: pending.parent_skin,
                parent: pending.parent,
                inherit_timeline: pending.inherit_timeline,
            };
            data.skins[pending.skin].set_attachment(
                pending.slot,
                pending.key,
                Arc::new(Attachment::LinkedMesh(linked)),
            );
        }
        Ok(())
    }

    fn read_events(&mut self, data: &mut SkeletonData) -> Result<(), Error> {
        let n = self.input.read_count()?;
        for _ in 0..n {
            let name = self.read_name_ref("event")?;
            let int_value = self.input.read_varint(false)?;
            let float_value = self.input.read_f32()?;
            let string = self.input.read_string()?;
            let audio_path = self.input.read_string()?;
            let (volume, balance) = if audio_path.as_deref().is_some_and(|p| !p.is_empty()) {
                (self.input.read_f32()?, self.input.read_f32()?)
            } else {
                (1.0, 0.0)
            };
            data.events.push(EventData {
                name,
                int_value,
                float_value,
                string,
                audio_path,
                volume,
                balance,
            });
        }
        Ok(())
    }

    fn read_frame_count(&mut self, what: &str) -> Result<usize, Error> {
        let offset = self.input.position();
        let n = self.input.read_count()?;
        if n == 0 {
            return Err(Error::malformed(format!(
                "{what} timeline has no keys at offset {offset}"
            )));
        }
        Ok(n)
    }

    fn read_animation(&mut self, name: String, data: &SkeletonData) -> Result<Animation, Error> {
        let scale = self.scale;
        let mut timelines = Vec::new();

        let n = self.input.read_count()?;
        for _ in 0..n {
            let slot = self.read_index(data.slots.len(), "timeline slot")?;
            let nn = self.input.read_count()?;
            for _ in 0..nn {
                let offset = self.input.position();
                let kind = self.input.read_u8()?;
                let frame_count = self.read_frame_count("slot")?;
                let input = &mut self.input;
                let timeline = match kind {
                    SLOT_ATTACHMENT => {
                        let mut frames = Vec::with_capacity(frame_count.min(input.remaining()));
                        for _ in 0..frame_count {
                            let time = input.read_f32()?;
                            let attachment =
                                input.read_string_ref(&self.strings)?.map(str::to_string);
                            frames.push(AttachmentFrame {
                                time,
                                name: attachment,
                            });
                        }
                        Timeline::Attachment(AttachmentTimeline { slot, frames })
                    }
                    SLOT_COLOR => Timeline::Color(ColorTimeline {
                        slot,
                        frames: read_keys(
                            input,
                            frame_count,
                            |input| {
                                Ok(ColorFrame {
                                    time: input.read_f32()?,
                                    color: read_unit_color(input)?,
                                    curve: Curve::Linear,
                                })
                            },
                            |f| &mut f.curve,
                        )?,
                    }),
                    SLOT_TWO_COLOR => Timeline::TwoColor(TwoColorTimeline {
                        slot,
                        frames: read_keys(
                            input,
                            frame_count,
                            |input| {
                                let time = input.read_f32()?;
                                let light = read_unit_color(input)?;
                                let dark = [
                                    input.read_u8()? as f32 / 255.0,
                                    input.read_u8()? as f32 / 255.0,
                                    input.read_u8()? as f32 / 255.0,
                                ];
                                Ok(TwoColorFrame {
                                    time,
                                    light,
                                    dark,
                                    curve: Curve::Linear,
                                })
                            },
                            |f| &mut f.curve,
                        )?,
                    }),
                    other => {
                        return Err(Error::malformed(format!(
                            "animation '{name}': unknown slot timeline type {other} at offset {offset}"
                        )));
                    }
                };
                timelines.push(timeline);
            }
        }

        let n = self.input.read_count()?;
        for _ in 0..n {
            let bone = self.read_index(data.bones.len(), "timeline bone")?;
            let nn = self.input.read_count()?;
            for _ in 0..nn {
                let offset = self.input.position();
                let kind = self.input.read_u8()?;
                let frame_count = self.read_frame_count("bone")?;
                let input = &mut self.input;
                let timeline = match kind {
                    BONE_ROTATE => Timeline::Rotate(RotateTimeline {
                        bone,
                        frames: read_keys(
                            input,
                            frame_count,
                            |input| {
                                Ok(RotateFrame {
                                    time: input.read_f32()?,
                                    angle: input.read_f32()?,
                                    curve: Curve::Linear,
                                })
                            },
                            |f| &mut f.curve,
                        )?,
                    }),
                    BONE_TRANSLATE | BONE_SCALE | BONE_SHEAR => {
                        let value_scale = if kind == BONE_TRANSLATE { scale } else { 1.0 };
                        let timeline = Vec2Timeline {
                            bone,
                            frames: read_keys(
                                input,
                                frame_count,
                                |input| {
                                    Ok(Vec2Frame {
                                        time: input.read_f32()?,
                                        x: input.read_f32()? * value_scale,
                                        y: input.read_f32()? * value_scale,
                                        curve: Curve::Linear,
                                    })
                                },
                                |f| &mut f.curve,
                            )?,
                        };
                        match kind {
                            BONE_TRANSLATE => Timeline::Translate(timeline),
                            BONE_SCALE => Timeline::Scale(timeline),
                            _ => Timeline::Shear(timeline),
                        }
                    }
                    other => {
                        return Err(Error::malformed(format!(
                            "animation '{name}': unknown bone timeline type {other} at offset {offset}"
                        )));
                    }
                };
                timelines.push(timeline);
            }
        }

        let n = self.input.read_count()?;
        for _ in 0..n {
            let constraint = self.read_index(data.ik_constraints.len(), "timeline IK constraint")?;
            let frame_count = self.read_frame_count("IK constraint")?;
            let frames = read_keys(
                &mut self.input,
                frame_count,
                |input| {
                    Ok(IkFrame {
                        time: input.read_f32()?,
                        mix: input.read_f32()?,
                        softness: input.read_f32()? * scale,
                        bend_direction: input.read_i8()? as i32,
                        compress: input.read_bool()?,
                        stretch: input.read_bool()?,
                        curve: Curve::Linear,
                    })
                },
                |f| &mut f.curve,
            )?;
            timelines.push(Timeline::IkConstraint(IkConstraintTimeline { constraint, frames }));
        }

        let n = self.input.read_count()?;
        for _ in 0..n {
            let constraint = self.read_index(
                data.transform_constraints.len(),
                "timeline transform constraint",
            )?;
            let frame_count = self.read_frame_count("transform constraint")?;
            let frames = read_keys(
                &mut self.input,
                frame_count,
                |input| {
                    Ok(TransformFrame {
                        time: input.read_f32()?,
                        rotate_mix: input.read_f32()?,
                        translate_mix: input.read_f32()?,
                        scale_mix: input.read_f32()?,
                        shear_mix: input.read_f32()?,
                        curve: Curve::Linear,
                    })
                },
                |f| &mut f.curve,
            )?;
            timelines.push(Timeline::TransformConstraint(TransformConstraintTimeline {
                constraint,
                frames,
            }));
        }

        let n = self.input.read_count()?;
        for _ in 0..n {
            let constraint =
                self.read_index(data.path_constraints.len(), "timeline path constraint")?;
            let constraint_data = &data.path_constraints[constraint];
            let nn = self.input.read_count()?;
            for _ in 0..nn {
                let offset = self.input.position();
                let kind = self.input.read_u8()?;
                let frame_count = self.read_frame_count("path constraint")?;
                let input = &mut self.input;
                let timeline = match kind {
                    PATH_POSITION | PATH_SPACING => {
                        let value_scale = match kind {
                            PATH_POSITION
                                if constraint_data.position_mode == PositionMode::Fixed =>
                            {
                                scale
                            }
                            PATH_SPACING
                                if matches!(
                                    constraint_data.spacing_mode,
                                    SpacingMode::Length | SpacingMode::Fixed
                                ) =>
                            {
                                scale
                            }
                            _ => 1.0,
                        };
                        let timeline = PathFloatTimeline {
                            constraint,
                            frames: read_keys(
                                input,
                                frame_count,
                                |input| {
                                    Ok(FloatFrame {
                                        time: input.read_f32()?,
                                        value: input.read_f32()? * value_scale,
                                        curve: Curve::Linear,
                                    })
                                },
                                |f| &mut f.curve,
                            )?,
                        };
                        if kind == PATH_POSITION {
                            Timeline::PathPosition(timeline)
                        } else {
                            Timeline::PathSpacing(timeline)
                        }
                    }
                    PATH_MIX => Timeline::PathMix(PathMixTimeline {
                        constraint,
                        frames: read_keys(
                            input,
                            frame_count,
                            |input| {
                                Ok(PathMixFrame {
                                    time: input.read_f32()?,
                                    rotate_mix: input.read_f32()?,
                                    translate_mix: input.read_f32()?,
                                    curve: Curve::Linear,
                                })
                            },
                            |f| &mut f.curve,
                        )?,
                    }),
                    other => {
                        return Err(Error::malformed(format!(
                            "animation '{name}': unknown path timeline type {other} at offset {offset}"
                        )));
                    }
                };
                timelines.push(timeline);
            }
        }

        let n = self.input.read_count()?;
        for _ in 0..n {
            let skin = self.read_index(data.skins.len(), "deform skin")?;
            let nn = self.input.read_count()?;
            for _ in 0..nn {
                let slot = self.read_index(data.slots.len(), "deform slot")?;
                let nnn = self.input.read_count()?;
                for _ in 0..nnn {
                    let key = self.read_name_ref("deform attachment")?;
                    let frame_count = self.read_frame_count("deform")?;
                    let attachment = data.skins[skin].attachment(slot, &key);
                    match attachment {
                        Some(attachment) => {
                            let timeline =
                                self.read_deform(&name, slot, &key, attachment, frame_count)?;
                            timelines.push(Timeline::Deform(timeline));
                        }
                        None => {
                            warn!(
                                "animation '{name}': deform keys for missing attachment '{key}' in skin '{}' dropped",
                                data.skins[skin].name
                            );
                            self.skip_deform(frame_count)?;
                        }
                    }
                }
            }
        }

        let n = self.input.read_count()?;
        if n > 0 {
            let slot_count = data.slots.len();
            let mut frames = Vec::with_capacity(self.capacity(n));
            for _ in 0..n {
                let time = self.input.read_f32()?;
                let draw_order = self.read_draw_order(slot_count)?;
                frames.push(DrawOrderFrame {
                    time,
                    draw_order: Some(draw_order),
                });
            }
            timelines.push(Timeline::DrawOrder(DrawOrderTimeline { frames }));
        }

        let n = self.input.read_count()?;
        if n > 0 {
            let mut events = Vec::with_capacity(self.capacity(n));
            for _ in 0..n {
                let time = self.input.read_f32()?;
                let index = self.read_index(data.events.len(), "event")?;
                let event_data = &data.events[index];
                let int_value = self.input.read_varint(false)?;
                let float_value = self.input.read_f32()?;
                let string = if self.input.read_bool()? {
                    self.input.read_string()?
                } else {
                    event_data.string.clone()
                };
                let (volume, balance) = if event_data
                    .audio_path
                    .as_deref()
                    .is_some_and(|p| !p.is_empty())
                {
                    (self.input.read_f32()?, self.input.read_f32()?)
                } else {
                    (event_data.volume, event_data.balance)
                };
                events.push(Event {
                    data: index,
                    name: event_data.name.clone(),
                    time,
                    int_value,
                    float_value,
                    string,
                    volume,
                    balance,
                });
            }
            timelines.push(Timeline::Event(EventTimeline { events }));
        }

        let duration = timelines
            .iter()
            .map(Timeline::last_frame_time)
            .fold(0.0f32, f32::max);
        trace!(
            "read animation '{name}': {} timelines, duration {duration}",
            timelines.len()
        );
        Ok(Animation::new(name, timelines, duration))
    }

    fn read_deform(
        &mut self,
        animation: &str,
        slot: usize,
        key: &str,
        attachment: &Attachment,
        frame_count: usize,
    ) -> Result<DeformTimeline, Error> {
        let (Some(vertices), Some(timeline_id)) = (attachment.vertices(), attachment.vertex_id())
        else {
            return Err(Error::malformed(format!(
                "animation '{animation}': deform keys target '{key}', which has no vertices"
            )));
        };
        let weighted = vertices.is_weighted();
        let deform_length = vertices.deform_length();
        let setup_vertices = vertices.setup_flat();
        let scale = self.scale;

        let mut frames = Vec::with_capacity(self.capacity(frame_count));
        for frame in 0..frame_count {
            let time = self.input.read_f32()?;
            let end = self.input.read_count()?;
            let vertices = if end == 0 {
                if weighted {
                    vec![0.0; deform_length]
                } else {
                    setup_vertices.clone()
                }
            } else {
                let start = self.input.read_count()?;
                let stop = start.checked_add(end).filter(|&e| e <= deform_length);
                let Some(stop) = stop else {
                    return Err(Error::malformed(format!(
                        "animation '{animation}': deform range {start}+{end} exceeds {deform_length} for '{key}'"
                    )));
                };
                let mut deform = vec![0.0; deform_length];
                for v in &mut deform[start..stop] {
                    *v = self.input.read_f32()? * scale;
                }
                if !weighted {
                    for (v, setup) in deform.iter_mut().zip(&setup_vertices) {
                        *v += *setup;
                    }
                }
                deform
            };
            let curve = if frame + 1 < frame_count {
                read_curve(&mut self.input)?
            } else {
                Curve::Linear
            };
            frames.push(DeformFrame {
                time,
                vertices,
                curve,
            });
        }
        Ok(DeformTimeline {
            slot,
            timeline_id,
            weighted,
            setup_vertices,
            frames,
        })
    }

    fn skip_deform(&mut self, frame_count: usize) -> Result<(), Error> {
        for frame in 0..frame_count {
            self.input.read_f32()?;
            let end = self.input.read_count()?;
            if end != 0 {
                self.input.read_count()?;
                for _ in 0..end {
                    self.input.read_f32()?;
                }
            }
            if frame + 1 < frame_count {
                read_curve(&mut self.input)?;
            }
        }
        Ok(())
    }

    /// Expands a sparse list of `(slot, offset)` moves into a full permutation.
    fn read_draw_order(&mut self, slot_count: usize) -> Result<Vec<usize>, Error> {
        let offset_count = self.input.read_count()?;
        if offset_count > slot_count {
            return Err(Error::malformed(format!(
                "draw order key moves {offset_count} slots but the skeleton has {slot_count}"
            )));
        }
        let mut draw_order: Vec<Option<usize>> = vec![None; slot_count];
        let mut unchanged = Vec::with_capacity(slot_count - offset_count);
        let mut original = 0usize;
        for _ in 0..offset_count {
            let slot = self.read_index(slot_count, "draw order slot")?;
            if slot < original {
                return Err(Error::malformed("draw order slots are not increasing"));
            }
            while original != slot {
                unchanged.push(original);
                original += 1;
            }
            let shift = self.input.read_varint(true)? as i64;
            let target = usize::try_from(original as i64 + shift)
                .ok()
                .filter(|&t| t < slot_count && draw_order[t].is_none())
                .ok_or_else(|| {
                    Error::malformed(format!("draw order offset {shift} for slot {slot} is invalid"))
                })?;
            draw_order[target] = Some(original);
            original += 1;
        }
        unchanged.extend(original..slot_count);
        let mut draw_order_out = vec![0usize; slot_count];
        for (i, entry) in draw_order.iter().enumerate().rev() {
            draw_order_out[i] = match entry {
                Some(slot) => *slot,
                None => unchanged
                    .pop()
                    .ok_or_else(|| Error::malformed("draw order key is not a permutation"))?,
            };
        }
        Ok(draw_order_out)
    }
}

#[cfg(test)]
mod tests {
    use super::read_curve;
    use crate::{BinaryInput, Curve, Error};

    #[test]
    fn curve_bytes_map_to_curve_kinds() {
        let mut bytes = vec![0u8, 1, 2];
        for v in [0.25f32, 0.0, 0.75, 1.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.push(9);
        let mut input = BinaryInput::new(&bytes);
        assert_eq!(read_curve(&mut input).unwrap(), Curve::Linear);
        assert_eq!(read_curve(&mut input).unwrap(), Curve::Stepped);
        assert_eq!(
            read_curve(&mut input).unwrap(),
            Curve::bezier(0.25, 0.0, 0.75, 1.0)
        );
        assert!(matches!(
            read_curve(&mut input),
            Err(Error::MalformedSkeletonData { .. })
        ));
    }
}
