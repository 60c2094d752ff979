//! The closed set of attachment kinds a slot can display.

use std::sync::Arc;

use crate::RendererObject;

#[derive(Clone, Debug)]
pub enum Attachment {
    Region(RegionAttachment),
    Mesh(MeshAttachment),
    /// A mesh sharing geometry with a parent mesh, possibly from another skin.
    LinkedMesh(LinkedMeshAttachment),
    BoundingBox(BoundingBoxAttachment),
    Path(PathAttachment),
    Point(PointAttachment),
    Clipping(ClippingAttachment),
}

impl Attachment {
    pub fn name(&self) -> &str {
        match self {
            Self::Region(a) => &a.name,
            Self::Mesh(a) => &a.name,
            Self::LinkedMesh(a) => &a.mesh.name,
            Self::BoundingBox(a) => &a.name,
            Self::Path(a) => &a.name,
            Self::Point(a) => &a.name,
            Self::Clipping(a) => &a.name,
        }
    }

    /// Mesh view of a mesh or linked mesh.
    pub fn as_mesh(&self) -> Option<&MeshAttachment> {
        match self {
            Self::Mesh(m) => Some(m),
            Self::LinkedMesh(l) => Some(&l.mesh),
            _ => None,
        }
    }

    /// Bone-bound vertices of a vertex attachment.
    pub fn vertices(&self) -> Option<&MeshVertices> {
        match self {
            Self::Mesh(m) => Some(&m.geometry.vertices),
            Self::LinkedMesh(l) => Some(&l.mesh.geometry.vertices),
            Self::BoundingBox(a) => Some(&a.vertices.vertices),
            Self::Path(a) => Some(&a.vertices.vertices),
            Self::Clipping(a) => Some(&a.vertices.vertices),
            Self::Region(_) | Self::Point(_) => None,
        }
    }

    /// Load-scoped identity of a vertex attachment.
    pub fn vertex_id(&self) -> Option<u32> {
        match self {
            Self::Mesh(m) => Some(m.id),
            Self::LinkedMesh(l) => Some(l.mesh.id),
            Self::BoundingBox(a) => Some(a.vertices.id),
            Self::Path(a) => Some(a.vertices.id),
            Self::Clipping(a) => Some(a.vertices.id),
            Self::Region(_) | Self::Point(_) => None,
        }
    }

    /// Identity deform timelines are keyed on. `None` for non-vertex attachments.
    pub fn timeline_id(&self) -> Option<u32> {
        match self {
            Self::Mesh(m) => Some(m.timeline_id),
            Self::LinkedMesh(l) => Some(l.mesh.timeline_id),
            Self::BoundingBox(a) => Some(a.vertices.timeline_id),
            Self::Path(a) => Some(a.vertices.timeline_id),
            Self::Clipping(a) => Some(a.vertices.timeline_id),
            Self::Region(_) | Self::Point(_) => None,
        }
    }

    pub fn renderer_object(&self) -> Option<&RendererObject> {
        match self {
            Self::Region(a) => a.renderer_object.as_ref(),
            Self::Mesh(m) => m.renderer_object.as_ref(),
            Self::LinkedMesh(l) => l.mesh.renderer_object.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

/// Vertex positions bound either to the slot's bone or to a weighted set of bones.
#[derive(Clone, Debug)]
pub enum MeshVertices {
    Unweighted(Vec<[f32; 2]>),
    Weighted(Vec<Vec<VertexWeight>>),
}

impl Default for MeshVertices {
    fn default() -> Self {
        Self::Unweighted(Vec::new())
    }
}

impl MeshVertices {
    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Unweighted(v) => v.len(),
            Self::Weighted(v) => v.len(),
        }
    }

    /// Length of the flat `x, y` world vertex array.
    pub fn world_vertices_length(&self) -> usize {
        self.vertex_count() * 2
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self, Self::Weighted(_))
    }

    /// Number of floats a deform key holds: one `x, y` pair per vertex, or per bone influence
    /// when weighted.
    pub fn deform_length(&self) -> usize {
        match self {
            Self::Unweighted(v) => v.len() * 2,
            Self::Weighted(v) => v.iter().map(|w| w.len() * 2).sum(),
        }
    }

    /// Setup positions as a flat array. Empty for weighted vertices.
    pub fn setup_flat(&self) -> Vec<f32> {
        match self {
            Self::Unweighted(v) => v.iter().flat_map(|p| [p[0], p[1]]).collect(),
            Self::Weighted(_) => Vec::new(),
        }
    }
}

/// Vertices plus the identity used by deform timelines.
#[derive(Clone, Debug, Default)]
pub struct VertexData {
    /// Unique per loaded vertex attachment.
    pub id: u32,
    /// Equal to `id` except for linked meshes that inherit their parent's deform keys.
    pub timeline_id: u32,
    pub vertices: MeshVertices,
}

#[derive(Clone, Debug)]
pub struct RegionAttachment {
    pub name: String,
    pub path: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
    pub color: [f32; 4],
    /// Local corner positions relative to the bone: BL, UL, UR, BR.
    pub offsets: [f32; 8],
    pub renderer_object: Option<RendererObject>,
}

impl RegionAttachment {
    pub fn update_offsets(&mut self) {
        let local_x = -self.width / 2.0 * self.scale_x;
        let local_y = -self.height / 2.0 * self.scale_y;
        let local_x2 = local_x + self.width * self.scale_x;
        let local_y2 = local_y + self.height * self.scale_y;
        let (sin, cos) = self.rotation.to_radians().sin_cos();

        let x_cos = local_x * cos + self.x;
        let x_sin = local_x * sin;
        let y_cos = local_y * cos + self.y;
        let y_sin = local_y * sin;
        let x2_cos = local_x2 * cos + self.x;
        let x2_sin = local_x2 * sin;
        let y2_cos = local_y2 * cos + self.y;
        let y2_sin = local_y2 * sin;

        self.offsets = [
            x_cos - y_sin,
            y_cos + x_sin,
            x_cos - y2_sin,
            y2_cos + x_sin,
            x2_cos - y2_sin,
            y2_cos + x2_sin,
            x2_cos - y_sin,
            y_cos + x2_sin,
        ];
    }

    /// World corners for a bone world transform `[a, b, c, d, world_x, world_y]`, in the order
    /// BR, BL, UL, UR.
    pub fn compute_world_vertices(&self, transform: [f32; 6]) -> [f32; 8] {
        let [a, b, c, d, x, y] = transform;
        let mut out = [0.0f32; 8];
        for (i, corner) in [3usize, 0, 1, 2].into_iter().enumerate() {
            let ox = self.offsets[corner * 2];
            let oy = self.offsets[corner * 2 + 1];
            out[i * 2] = ox * a + oy * b + x;
            out[i * 2 + 1] = ox * c + oy * d + y;
        }
        out
    }
}

/// Geometry that linked meshes share with their parent.
#[derive(Clone, Debug, Default)]
pub struct MeshGeometry {
    pub vertices: MeshVertices,
    pub region_uvs: Vec<[f32; 2]>,
    pub triangles: Vec<u16>,
    pub hull_length: usize,
    pub edges: Vec<u16>,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug)]
pub struct MeshAttachment {
    pub name: String,
    pub path: String,
    pub color: [f32; 4],
    pub id: u32,
    pub timeline_id: u32,
    pub geometry: Arc<MeshGeometry>,
    pub renderer_object: Option<RendererObject>,
}

#[derive(Clone, Debug)]
pub struct LinkedMeshAttachment {
    /// Carries the parent's geometry once resolved.
    pub mesh: MeshAttachment,
    /// Skin holding the parent, `None` for the default skin.
    pub skin: Option<String>,
    pub parent: String,
    /// When set, deform keys of the parent apply to this mesh too.
    pub inherit_timeline: bool,
}

#[derive(Clone, Debug)]
pub struct BoundingBoxAttachment {
    pub name: String,
    pub vertices: VertexData,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct PathAttachment {
    pub name: String,
    pub vertices: VertexData,
    pub closed: bool,
    pub constant_speed: bool,
    /// Cumulative length at the end of each curve.
    pub lengths: Vec<f32>,
    pub color: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct PointAttachment {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub color: [f32; 4],
}

impl PointAttachment {
    pub fn compute_world_position(&self, transform: [f32; 6]) -> [f32; 2] {
        let [a, b, c, d, x, y] = transform;
        [a * self.x + b * self.y + x, c * self.x + d * self.y + y]
    }

    pub fn compute_world_rotation(&self, transform: [f32; 6]) -> f32 {
        let [a, b, c, d, _, _] = transform;
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let x = cos * a + sin * b;
        let y = cos * c + sin * d;
        y.atan2(x).to_degrees()
    }
}

#[derive(Clone, Debug)]
pub struct ClippingAttachment {
    pub name: String,
    pub vertices: VertexData,
    pub end_slot: usize,
    pub color: [f32; 4],
}
