//! Path constraint solving: bones are placed and rotated along a cubic Bezier path attachment.

use super::skeleton::{
    compute_world_vertices, rotate_world, wrap_pi, Bone, PathConstraintScratch, Slot,
};
use crate::{Attachment, PathAttachment, PositionMode, RotateMode, Skeleton, SpacingMode};

const EPSILON: f32 = 1.0e-5;

impl Skeleton {
    pub(crate) fn apply_path_constraint(&mut self, index: usize) {
        let Some(c) = self.path_constraints.get(index) else {
            return;
        };
        let (mix_rotate, mix_x, mix_y) = (c.mix_rotate, c.mix_x, c.mix_y);
        if mix_rotate == 0.0 && mix_x == 0.0 && mix_y == 0.0 {
            return;
        }
        let Some(data) = self.data.path_constraints.get(c.data_index()) else {
            return;
        };
        let (position_mode, spacing_mode, rotate_mode) =
            (data.position_mode, data.spacing_mode, data.rotate_mode);
        let mut offset_rotation = data.offset_rotation;
        let (position, spacing, target) = (c.position, c.spacing, c.target);
        let bones = c.bones.clone();
        let bone_count = bones.len();
        if bone_count == 0 {
            return;
        }
        let Some(attachment) = self.slots.get(target).and_then(Slot::attachment).cloned() else {
            return;
        };
        let Attachment::Path(path) = attachment.as_ref() else {
            return;
        };

        let tangents = rotate_mode == RotateMode::Tangent;
        let scale = rotate_mode == RotateMode::ChainScale;
        let spaces_count = if tangents { bone_count } else { bone_count + 1 };
        let setup_lengths: Vec<f32> = bones
            .iter()
            .map(|&b| self.data.bones.get(b).map_or(0.0, |d| d.length))
            .collect();

        let mut scratch = self
            .path_scratch
            .get_mut(index)
            .map(std::mem::take)
            .unwrap_or_default();
        scratch.spaces.clear();
        scratch.spaces.resize(spaces_count, 0.0);
        scratch.lengths.clear();
        if scale {
            scratch.lengths.resize(bone_count, 0.0);
        }

        if spacing_mode == SpacingMode::Percent {
            if scale {
                for i in 0..spaces_count - 1 {
                    let setup_length = setup_lengths[i];
                    let Some(bone) = self.bones.get(bones[i]) else {
                        continue;
                    };
                    if setup_length >= EPSILON {
                        let x = setup_length * bone.a;
                        let y = setup_length * bone.c;
                        scratch.lengths[i] = (x * x + y * y).sqrt();
                    }
                }
            }
            scratch.spaces[1..].fill(spacing);
        } else {
            let length_spacing = spacing_mode == SpacingMode::Length;
            for i in 0..spaces_count - 1 {
                let setup_length = setup_lengths[i];
                if setup_length < EPSILON {
                    scratch.spaces[i + 1] = spacing;
                    continue;
                }
                let Some(bone) = self.bones.get(bones[i]) else {
                    continue;
                };
                let x = setup_length * bone.a;
                let y = setup_length * bone.c;
                let length = (x * x + y * y).sqrt();
                if scale {
                    scratch.lengths[i] = length;
                }
                let space = if length_spacing {
                    setup_length + spacing
                } else {
                    spacing
                };
                scratch.spaces[i + 1] = space * length / setup_length;
            }
        }

        let Some(slot) = self.slots.get(target) else {
            self.restore_path_scratch(index, scratch);
            return;
        };
        let solver = PathSolver {
            bones: &self.bones,
            slot,
            path,
            position_mode,
            spacing_mode,
            tangents,
        };
        solver.compute_world_positions(
            &scratch.spaces,
            position,
            &mut scratch.positions,
            &mut scratch.world,
            &mut scratch.curves,
        );

        let tip = if offset_rotation == 0.0 {
            rotate_mode == RotateMode::Chain
        } else {
            let reflect = self
                .bones
                .get(slot.bone)
                .map_or(1.0, |p| if p.a * p.d - p.b * p.c > 0.0 { 1.0 } else { -1.0 });
            offset_rotation = offset_rotation.to_radians() * reflect;
            false
        };

        if scratch.positions.len() < spaces_count * 3 + 2 {
            self.restore_path_scratch(index, scratch);
            return;
        }
        let positions = scratch.positions.as_slice();
        let mut bone_x = positions[0];
        let mut bone_y = positions[1];
        for (i, &bone_index) in bones.iter().enumerate() {
            let p = 3 + i * 3;
            let Some(bone) = self.bones.get_mut(bone_index) else {
                continue;
            };
            bone.world_x += (bone_x - bone.world_x) * mix_x;
            bone.world_y += (bone_y - bone.world_y) * mix_y;
            let x = positions[p];
            let y = positions[p + 1];
            let dx = x - bone_x;
            let dy = y - bone_y;
            if scale {
                let setup = scratch.lengths[i];
                if setup >= EPSILON {
                    let s = ((dx * dx + dy * dy).sqrt() / setup - 1.0) * mix_rotate + 1.0;
                    bone.a *= s;
                    bone.c *= s;
                }
            }
            bone_x = x;
            bone_y = y;
            if mix_rotate > 0.0 {
                let (a, c) = (bone.a, bone.c);
                let mut r = if tangents {
                    positions[p - 1]
                } else if scratch.spaces[i + 1] < EPSILON {
                    positions[p + 2]
                } else {
                    dy.atan2(dx)
                };
                r -= c.atan2(a);
                if tip {
                    let (sin, cos) = r.sin_cos();
                    let length = setup_lengths[i];
                    bone_x += (length * (cos * a - sin * c) - dx) * mix_rotate;
                    bone_y += (length * (sin * a + cos * c) - dy) * mix_rotate;
                } else {
                    r += offset_rotation;
                }
                rotate_world(bone, wrap_pi(r) * mix_rotate);
            }
            self.update_applied_transform(bone_index);
        }

        self.restore_path_scratch(index, scratch);
    }

    fn restore_path_scratch(&mut self, index: usize, scratch: PathConstraintScratch) {
        if let Some(slot) = self.path_scratch.get_mut(index) {
            *slot = scratch;
        }
    }
}

/// Samples positions along a path attachment in world space.
struct PathSolver<'a> {
    bones: &'a [Bone],
    slot: &'a Slot,
    path: &'a PathAttachment,
    position_mode: PositionMode,
    spacing_mode: SpacingMode,
    tangents: bool,
}

impl PathSolver<'_> {
    fn world(&self, start: usize, count: usize, out: &mut Vec<f32>, offset: usize) {
        compute_world_vertices(
            self.bones,
            self.slot,
            &self.path.vertices.vertices,
            start,
            count,
            out,
            offset,
            2,
        );
    }

    /// Fills `out` with `x, y, rotation` triples, one per space, preceded by the start point.
    fn compute_world_positions(
        &self,
        spaces: &[f32],
        mut position: f32,
        out: &mut Vec<f32>,
        world: &mut Vec<f32>,
        curves: &mut Vec<f32>,
    ) {
        let spaces_count = spaces.len();
        let closed = self.path.closed;
        let mut vertices_length = self.path.vertices.vertices.world_vertices_length();
        out.clear();
        if vertices_length < 6 || spaces_count == 0 {
            return;
        }
        out.resize(spaces_count * 3 + 2, 0.0);
        let mut curve_count = vertices_length / 6;

        if !self.path.constant_speed {
            let lengths = self.path.lengths.as_slice();
            let Some(last) = curve_count.checked_sub(if closed { 1 } else { 2 }) else {
                return;
            };
            let Some(&path_length) = lengths.get(last) else {
                return;
            };
            if self.position_mode == PositionMode::Percent {
                position *= path_length;
            }
            let multiplier = if self.spacing_mode == SpacingMode::Percent {
                path_length
            } else {
                1.0
            };

            world.clear();
            world.resize(8, 0.0);
            let mut prev_curve = CurveCursor::None;
            let mut curve = 0usize;
            for (i, &space) in spaces.iter().enumerate() {
                let space = space * multiplier;
                position += space;
                let mut p = position;
                let o = i * 3;

                if closed {
                    p = p.rem_euclid(path_length);
                    curve = 0;
                } else if p < 0.0 {
                    if prev_curve != CurveCursor::Before {
                        prev_curve = CurveCursor::Before;
                        self.world(2, 4, world, 0);
                    }
                    add_before_position(p, world, 0, out, o);
                    continue;
                } else if p > path_length {
                    if prev_curve != CurveCursor::After {
                        prev_curve = CurveCursor::After;
                        self.world(vertices_length - 6, 4, world, 0);
                    }
                    add_after_position(p - path_length, world, 0, out, o);
                    continue;
                }

                while curve < lengths.len() {
                    let length = lengths[curve];
                    if p > length {
                        curve += 1;
                        continue;
                    }
                    if curve == 0 {
                        p /= length.max(EPSILON);
                    } else {
                        let prev = lengths[curve - 1];
                        p = (p - prev) / (length - prev).max(EPSILON);
                    }
                    break;
                }

                if prev_curve != CurveCursor::Curve(curve) {
                    prev_curve = CurveCursor::Curve(curve);
                    if closed && curve == last {
                        self.world(vertices_length - 4, 4, world, 0);
                        self.world(0, 4, world, 4);
                    } else {
                        self.world(curve * 6 + 2, 8, world, 0);
                    }
                }
                let w = &world[..8];
                add_curve_position(
                    p,
                    [w[0], w[1], w[2], w[3], w[4], w[5], w[6], w[7]],
                    out,
                    o,
                    self.tangents || (i > 0 && space.abs() < EPSILON),
                );
            }
            return;
        }

        world.clear();
        if closed {
            vertices_length += 2;
            world.resize(vertices_length, 0.0);
            self.world(2, vertices_length - 4, world, 0);
            self.world(0, 2, world, vertices_length - 4);
            world[vertices_length - 2] = world[0];
            world[vertices_length - 1] = world[1];
        } else {
            curve_count -= 1;
            vertices_length -= 4;
            world.resize(vertices_length, 0.0);
            self.world(2, vertices_length, world, 0);
        }

        curves.clear();
        curves.resize(curve_count, 0.0);
        let mut path_length = 0.0f32;
        let mut x1 = world[0];
        let mut y1 = world[1];
        for (curve, w) in curves.iter_mut().zip((2..).step_by(6)) {
            let (cx1, cy1, cx2, cy2, x2, y2) =
                (world[w], world[w + 1], world[w + 2], world[w + 3], world[w + 4], world[w + 5]);
            let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.1875;
            let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.1875;
            let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.09375;
            let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.09375;
            let mut ddfx = tmpx * 2.0 + dddfx;
            let mut ddfy = tmpy * 2.0 + dddfy;
            let mut dfx = (cx1 - x1) * 0.75 + tmpx + dddfx * 0.16666667;
            let mut dfy = (cy1 - y1) * 0.75 + tmpy + dddfy * 0.16666667;
            path_length += (dfx * dfx + dfy * dfy).sqrt();
            dfx += ddfx;
            dfy += ddfy;
            ddfx += dddfx;
            ddfy += dddfy;
            path_length += (dfx * dfx + dfy * dfy).sqrt();
            dfx += ddfx;
            dfy += ddfy;
            path_length += (dfx * dfx + dfy * dfy).sqrt();
            dfx += ddfx + dddfx;
            dfy += ddfy + dddfy;
            path_length += (dfx * dfx + dfy * dfy).sqrt();
            *curve = path_length;
            x1 = x2;
            y1 = y2;
        }

        if self.position_mode == PositionMode::Percent {
            position *= path_length;
        }
        let multiplier = if self.spacing_mode == SpacingMode::Percent {
            path_length
        } else {
            1.0
        };

        let mut segments = [0.0f32; 10];
        let mut curve_length = 0.0f32;
        let mut points = [0.0f32; 8];
        let mut prev_curve = CurveCursor::None;
        let mut curve = 0usize;
        let mut segment = 0usize;
        for (i, &space) in spaces.iter().enumerate() {
            let space = space * multiplier;
            position += space;
            let mut p = position;
            let o = i * 3;

            if closed {
                p = p.rem_euclid(path_length);
                curve = 0;
            } else if p < 0.0 {
                add_before_position(p, world, 0, out, o);
                continue;
            } else if p > path_length {
                add_after_position(p - path_length, world, vertices_length - 4, out, o);
                continue;
            }

            while curve < curves.len() {
                let length = curves[curve];
                if p > length {
                    curve += 1;
                    continue;
                }
                if curve == 0 {
                    p /= length.max(EPSILON);
                } else {
                    let prev = curves[curve - 1];
                    p = (p - prev) / (length - prev).max(EPSILON);
                }
                break;
            }

            if prev_curve != CurveCursor::Curve(curve) {
                prev_curve = CurveCursor::Curve(curve);
                let ii = curve * 6;
                for (k, point) in points.iter_mut().enumerate() {
                    *point = world.get(ii + k).copied().unwrap_or(0.0);
                }
                let [x1, y1, cx1, cy1, cx2, cy2, x2, y2] = points;
                let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.03;
                let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.03;
                let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.006;
                let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.006;
                let mut ddfx = tmpx * 2.0 + dddfx;
                let mut ddfy = tmpy * 2.0 + dddfy;
                let mut dfx = (cx1 - x1) * 0.3 + tmpx + dddfx * 0.16666667;
                let mut dfy = (cy1 - y1) * 0.3 + tmpy + dddfy * 0.16666667;
                curve_length = (dfx * dfx + dfy * dfy).sqrt();
                segments[0] = curve_length;
                for seg in segments.iter_mut().take(8).skip(1) {
                    dfx += ddfx;
                    dfy += ddfy;
                    ddfx += dddfx;
                    ddfy += dddfy;
                    curve_length += (dfx * dfx + dfy * dfy).sqrt();
                    *seg = curve_length;
                }
                dfx += ddfx;
                dfy += ddfy;
                curve_length += (dfx * dfx + dfy * dfy).sqrt();
                segments[8] = curve_length;
                dfx += ddfx + dddfx;
                dfy += ddfy + dddfy;
                curve_length += (dfx * dfx + dfy * dfy).sqrt();
                segments[9] = curve_length;
                segment = 0;
            }

            p *= curve_length;
            loop {
                let length = segments[segment];
                if p > length && segment < 9 {
                    segment += 1;
                    continue;
                }
                if segment == 0 {
                    p /= length.max(EPSILON);
                } else {
                    let prev = segments[segment - 1];
                    p = segment as f32 + (p - prev) / (length - prev).max(EPSILON);
                }
                break;
            }
            add_curve_position(
                p * 0.1,
                points,
                out,
                o,
                self.tangents || (i > 0 && space.abs() < EPSILON),
            );
        }
    }
}

/// Which part of the path the world scratch buffer currently holds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum CurveCursor {
    None,
    Before,
    After,
    Curve(usize),
}

fn add_before_position(p: f32, temp: &[f32], i: usize, out: &mut [f32], o: usize) {
    let x1 = temp[i];
    let y1 = temp[i + 1];
    let r = (temp[i + 3] - y1).atan2(temp[i + 2] - x1);
    out[o] = x1 + p * r.cos();
    out[o + 1] = y1 + p * r.sin();
    out[o + 2] = r;
}

fn add_after_position(p: f32, temp: &[f32], i: usize, out: &mut [f32], o: usize) {
    let x1 = temp[i + 2];
    let y1 = temp[i + 3];
    let r = (y1 - temp[i + 1]).atan2(x1 - temp[i]);
    out[o] = x1 + p * r.cos();
    out[o + 1] = y1 + p * r.sin();
    out[o + 2] = r;
}

/// `points` is `x1, y1, cx1, cy1, cx2, cy2, x2, y2`.
fn add_curve_position(p: f32, points: [f32; 8], out: &mut [f32], o: usize, tangents: bool) {
    let [x1, y1, cx1, cy1, cx2, cy2, x2, y2] = points;
    if p < EPSILON || p.is_nan() {
        out[o] = x1;
        out[o + 1] = y1;
        out[o + 2] = (cy1 - y1).atan2(cx1 - x1);
        return;
    }
    let tt = p * p;
    let ttt = tt * p;
    let u = 1.0 - p;
    let uu = u * u;
    let uuu = uu * u;
    let ut = u * p;
    let ut3 = ut * 3.0;
    let uut3 = u * ut3;
    let utt3 = ut3 * p;
    let x = x1 * uuu + cx1 * uut3 + cx2 * utt3 + x2 * ttt;
    let y = y1 * uuu + cy1 * uut3 + cy2 * utt3 + y2 * ttt;
    out[o] = x;
    out[o + 1] = y;
    if tangents {
        out[o + 2] = if p < 0.001 {
            (cy1 - y1).atan2(cx1 - x1)
        } else {
            (y - (y1 * uu + cy1 * ut * 2.0 + cy2 * tt)).atan2(x - (x1 * uu + cx1 * ut * 2.0 + cx2 * tt))
        };
    }
}
