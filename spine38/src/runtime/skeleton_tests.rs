use crate::{
    Attachment, BlendMode, BoneData, Error, IkConstraintData, Inherit, RegionAttachment, Skeleton,
    SkeletonData, Skin, SlotData, TransformConstraintData,
};
use std::sync::Arc;

pub(super) fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

pub(super) fn bone(index: usize, name: &str, parent: Option<usize>, x: f32, y: f32) -> BoneData {
    BoneData {
        index,
        name: name.to_string(),
        parent,
        length: 0.0,
        x,
        y,
        rotation: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        shear_x: 0.0,
        shear_y: 0.0,
        inherit: Inherit::Normal,
        skin_required: false,
        color: [1.0; 4],
    }
}

pub(super) fn slot(index: usize, name: &str, bone: usize, attachment: Option<&str>) -> SlotData {
    SlotData {
        index,
        name: name.to_string(),
        bone,
        color: [1.0; 4],
        dark_color: None,
        attachment: attachment.map(str::to_string),
        blend: BlendMode::Normal,
    }
}

pub(super) fn region(name: &str, width: f32, height: f32) -> Arc<Attachment> {
    let mut region = RegionAttachment {
        name: name.to_string(),
        path: name.to_string(),
        x: 0.0,
        y: 0.0,
        rotation: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        width,
        height,
        color: [1.0; 4],
        offsets: [0.0; 8],
        renderer_object: None,
    };
    region.update_offsets();
    Arc::new(Attachment::Region(region))
}

/// Skeleton data with a "default" skin holding `attachments` as `(slot, name, attachment)`.
pub(super) fn data_with(
    bones: Vec<BoneData>,
    slots: Vec<SlotData>,
    attachments: Vec<(usize, &str, Arc<Attachment>)>,
) -> SkeletonData {
    let mut skin = Skin::new("default");
    for (slot, name, attachment) in attachments {
        skin.set_attachment(slot, name, attachment);
    }
    SkeletonData {
        bones,
        slots,
        skins: vec![skin],
        default_skin: Some(0),
        ..SkeletonData::default()
    }
}

pub(super) fn ik(bones: Vec<usize>, target: usize) -> IkConstraintData {
    IkConstraintData {
        name: "ik".to_string(),
        order: 0,
        skin_required: false,
        bones,
        target,
        mix: 1.0,
        softness: 0.0,
        bend_direction: 1,
        compress: false,
        stretch: false,
        uniform: false,
    }
}

pub(super) fn transform(bones: Vec<usize>, target: usize) -> TransformConstraintData {
    TransformConstraintData {
        name: "transform".to_string(),
        order: 0,
        skin_required: false,
        bones,
        target,
        local: false,
        relative: false,
        offset_rotation: 0.0,
        offset_x: 0.0,
        offset_y: 0.0,
        offset_scale_x: 0.0,
        offset_scale_y: 0.0,
        offset_shear_y: 0.0,
        rotate_mix: 1.0,
        translate_mix: 1.0,
        scale_mix: 0.0,
        shear_mix: 0.0,
    }
}

#[test]
fn update_world_transform_root_and_child() {
    let mut child = bone(1, "child", Some(0), 5.0, 0.0);
    child.rotation = 90.0;
    let data = Arc::new(data_with(
        vec![bone(0, "root", None, 10.0, 20.0), child],
        Vec::new(),
        Vec::new(),
    ));

    let mut skeleton = Skeleton::new(data);
    skeleton.update_world_transform();

    let root = &skeleton.bones[0];
    assert_approx(root.world_x, 10.0);
    assert_approx(root.world_y, 20.0);
    for (actual, expected) in root.world_transform()[..4].iter().zip([1.0, 0.0, 0.0, 1.0]) {
        assert_approx(*actual, expected);
    }

    let child = &skeleton.bones[1];
    assert_approx(child.world_x, 15.0);
    assert_approx(child.world_y, 20.0);
    assert_approx(child.a, 0.0);
    assert_approx(child.b, -1.0);
    assert_approx(child.c, 1.0);
    assert_approx(child.d, 0.0);
    assert_approx(child.world_rotation_x(), 90.0);
}

#[test]
fn skeleton_position_and_flip_apply_to_the_root() {
    let data = Arc::new(data_with(
        vec![bone(0, "root", None, 10.0, 20.0), bone(1, "child", Some(0), 5.0, 0.0)],
        Vec::new(),
        Vec::new(),
    ));
    let mut skeleton = Skeleton::new(data);
    skeleton.x = 100.0;
    skeleton.scale_x = -1.0;
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[0].world_x, 90.0);
    assert_approx(skeleton.bones[0].world_y, 20.0);
    assert_approx(skeleton.bones[1].world_x, 85.0);
}

#[test]
fn only_translation_ignores_parent_rotation() {
    let mut root = bone(0, "root", None, 0.0, 0.0);
    root.rotation = 90.0;
    let mut child = bone(1, "child", Some(0), 10.0, 0.0);
    child.inherit = Inherit::OnlyTranslation;
    let data = Arc::new(data_with(vec![root, child], Vec::new(), Vec::new()));
    let mut skeleton = Skeleton::new(data);
    skeleton.update_world_transform();

    let child = &skeleton.bones[1];
    assert_approx(child.world_x, 0.0);
    assert_approx(child.world_y, 10.0);
    assert_approx(child.world_rotation_x(), 0.0);
}

#[test]
fn setup_attachments_come_from_the_default_skin() {
    let data = Arc::new(data_with(
        vec![bone(0, "root", None, 0.0, 0.0)],
        vec![slot(0, "body", 0, Some("img")), slot(1, "empty", 0, None)],
        vec![(0, "img", region("img", 20.0, 10.0))],
    ));
    let skeleton = Skeleton::new(data);
    assert_eq!(skeleton.slots[0].attachment().map(|a| a.name()), Some("img"));
    assert!(skeleton.slots[1].attachment().is_none());
    assert_eq!(skeleton.draw_order, vec![0, 1]);
}

#[test]
fn set_skin_swaps_attachments_under_the_same_key() {
    let mut data = data_with(
        vec![bone(0, "root", None, 0.0, 0.0)],
        vec![slot(0, "body", 0, Some("img"))],
        Vec::new(),
    );
    let mut red = Skin::new("red");
    red.set_attachment(0, "img", region("red", 10.0, 10.0));
    let mut blue = Skin::new("blue");
    blue.set_attachment(0, "img", region("blue", 10.0, 10.0));
    data.skins.push(red);
    data.skins.push(blue);
    let mut skeleton = Skeleton::new(Arc::new(data));
    assert!(skeleton.slots[0].attachment().is_none());

    skeleton.set_skin(Some("red")).unwrap();
    assert_eq!(skeleton.slots[0].attachment().map(|a| a.name()), Some("red"));
    skeleton.set_skin(Some("blue")).unwrap();
    assert_eq!(skeleton.slots[0].attachment().map(|a| a.name()), Some("blue"));
    assert_eq!(skeleton.skin().map(|s| s.name.as_str()), Some("blue"));

    assert!(matches!(
        skeleton.set_skin(Some("green")),
        Err(Error::UnknownSkin { .. })
    ));
}

#[test]
fn set_attachment_by_name_checks_slot_and_key() {
    let data = Arc::new(data_with(
        vec![bone(0, "root", None, 0.0, 0.0)],
        vec![slot(0, "body", 0, None)],
        vec![(0, "img", region("img", 20.0, 10.0))],
    ));
    let mut skeleton = Skeleton::new(data);
    skeleton.set_attachment("body", Some("img")).unwrap();
    assert!(skeleton.slots[0].attachment().is_some());
    skeleton.set_attachment("body", None).unwrap();
    assert!(skeleton.slots[0].attachment().is_none());

    assert!(skeleton.set_attachment("nope", Some("img")).is_err());
    assert!(skeleton.set_attachment("body", Some("nope")).is_err());
}

#[test]
fn skin_required_bones_are_active_only_with_their_skin() {
    let mut extra = bone(1, "extra", Some(0), 0.0, 0.0);
    extra.skin_required = true;
    let mut data = data_with(
        vec![bone(0, "root", None, 0.0, 0.0), extra],
        Vec::new(),
        Vec::new(),
    );
    let mut skin = Skin::new("armored");
    skin.bones.push(1);
    data.skins.push(skin);
    let mut skeleton = Skeleton::new(Arc::new(data));
    assert!(!skeleton.bones[1].active);

    skeleton.set_skin(Some("armored")).unwrap();
    assert!(skeleton.bones[1].active);
    skeleton.set_skin(None).unwrap();
    assert!(!skeleton.bones[1].active);
}

#[test]
fn one_bone_ik_points_at_the_target() {
    let mut data = data_with(
        vec![
            bone(0, "root", None, 0.0, 0.0),
            bone(1, "arm", Some(0), 0.0, 0.0),
            bone(2, "target", Some(0), 0.0, 10.0),
        ],
        Vec::new(),
        Vec::new(),
    );
    data.ik_constraints.push(ik(vec![1], 2));
    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();
    assert_approx(skeleton.bones[1].world_rotation_x(), 90.0);

    skeleton.ik_constraints[0].mix = 0.5;
    skeleton.update_world_transform();
    assert_approx(skeleton.bones[1].world_rotation_x(), 45.0);
}

#[test]
fn two_bone_ik_reaches_a_target_within_range() {
    let mut upper = bone(1, "upper", Some(0), 0.0, 0.0);
    upper.length = 10.0;
    let mut lower = bone(2, "lower", Some(1), 10.0, 0.0);
    lower.length = 10.0;
    let mut data = data_with(
        vec![
            bone(0, "root", None, 0.0, 0.0),
            upper,
            lower,
            bone(3, "target", Some(0), 10.0, 10.0),
        ],
        Vec::new(),
        Vec::new(),
    );
    data.ik_constraints.push(ik(vec![1, 2], 3));
    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    let lower = &skeleton.bones[2];
    let tip = lower.local_to_world([10.0, 0.0]);
    assert!((tip[0] - 10.0).abs() < 1.0e-3, "tip x {}", tip[0]);
    assert!((tip[1] - 10.0).abs() < 1.0e-3, "tip y {}", tip[1]);
}

#[test]
fn absolute_transform_constraint_copies_target_world_transform() {
    let mut target = bone(1, "target", Some(0), 50.0, 0.0);
    target.rotation = 30.0;
    let mut data = data_with(
        vec![
            bone(0, "root", None, 0.0, 0.0),
            target,
            bone(2, "follower", Some(0), 0.0, 0.0),
        ],
        Vec::new(),
        Vec::new(),
    );
    data.transform_constraints.push(transform(vec![2], 1));
    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.update_world_transform();

    let follower = &skeleton.bones[2];
    assert_approx(follower.world_x, 50.0);
    assert_approx(follower.world_y, 0.0);
    assert_approx(follower.world_rotation_x(), 30.0);
}

#[test]
fn transform_constraint_mixes_are_per_channel() {
    let mut data = data_with(
        vec![
            bone(0, "root", None, 0.0, 0.0),
            bone(1, "target", Some(0), 50.0, 40.0),
            bone(2, "follower", Some(0), 0.0, 0.0),
        ],
        Vec::new(),
        Vec::new(),
    );
    data.transform_constraints.push(transform(vec![2], 1));
    let mut skeleton = Skeleton::new(Arc::new(data));
    skeleton.transform_constraints[0].mix_x = 0.5;
    skeleton.transform_constraints[0].mix_y = 0.0;
    skeleton.update_world_transform();

    assert_approx(skeleton.bones[2].world_x, 25.0);
    assert_approx(skeleton.bones[2].world_y, 0.0);

    skeleton.set_to_setup_pose();
    assert_eq!(skeleton.transform_constraints[0].mix_x, 1.0);
    assert_eq!(skeleton.transform_constraints[0].mix_y, 1.0);
}

#[test]
fn bounds_cover_visible_regions() {
    let data = Arc::new(data_with(
        vec![bone(0, "root", None, 10.0, 20.0)],
        vec![slot(0, "body", 0, Some("img"))],
        vec![(0, "img", region("img", 20.0, 10.0))],
    ));
    let mut skeleton = Skeleton::new(data);
    skeleton.update_world_transform();

    let (offset, size) = skeleton.bounds();
    assert_approx(offset[0], 0.0);
    assert_approx(offset[1], 15.0);
    assert_approx(size[0], 20.0);
    assert_approx(size[1], 10.0);

    skeleton.set_attachment("body", None).unwrap();
    assert_eq!(skeleton.bounds(), ([0.0; 2], [0.0; 2]));
}
