use super::skeleton_tests::{assert_approx, bone, data_with, region, slot};
use crate::binary_tests::idle_skeleton_bytes;
use crate::{
    Animation, AnimationState, AnimationStateData, AnimationStateEvent, AnimationStateListener,
    Curve, Error, Event, EventData, EventTimeline, MixBlend, NullAttachmentLoader, ReturnToIdle,
    RotateFrame, RotateTimeline, Skeleton, SkeletonData, Timeline, TrackEntrySnapshot, Vec2Frame,
    Vec2Timeline, load_skeleton,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

type Log = Rc<RefCell<Vec<String>>>;

fn label(entry: &TrackEntrySnapshot, event: &AnimationStateEvent) -> String {
    let kind = match event {
        AnimationStateEvent::Start => "start".to_string(),
        AnimationStateEvent::Interrupt => "interrupt".to_string(),
        AnimationStateEvent::End => "end".to_string(),
        AnimationStateEvent::Dispose => "dispose".to_string(),
        AnimationStateEvent::Complete => "complete".to_string(),
        AnimationStateEvent::Event(e) => format!("event {}", e.name),
    };
    format!("{} {kind}", entry.animation_name)
}

fn recorder(log: &Log) -> impl AnimationStateListener + 'static {
    let log = log.clone();
    move |_: &mut AnimationState, entry: &TrackEntrySnapshot, event: &AnimationStateEvent| {
        log.borrow_mut().push(label(entry, event));
    }
}

fn translate_x(keys: &[(f32, f32)]) -> Timeline {
    Timeline::Translate(Vec2Timeline {
        bone: 0,
        frames: keys
            .iter()
            .map(|&(time, x)| Vec2Frame {
                time,
                x,
                y: 0.0,
                curve: Curve::Linear,
            })
            .collect(),
    })
}

fn rotate(angle: f32) -> Timeline {
    Timeline::Rotate(RotateTimeline {
        bone: 0,
        frames: vec![RotateFrame {
            time: 0.0,
            angle,
            curve: Curve::Linear,
        }],
    })
}

fn hit(time: f32) -> Event {
    Event {
        data: 0,
        name: "hit".to_string(),
        time,
        int_value: 0,
        float_value: 0.0,
        string: None,
        volume: 1.0,
        balance: 0.0,
    }
}

fn test_data() -> Arc<SkeletonData> {
    let mut data = data_with(
        vec![bone(0, "root", None, 0.0, 0.0)],
        vec![slot(0, "body", 0, Some("a"))],
        vec![(0, "a", region("a", 10.0, 10.0))],
    );
    data.events.push(EventData {
        name: "hit".to_string(),
        int_value: 0,
        float_value: 0.0,
        string: None,
        audio_path: None,
        volume: 1.0,
        balance: 0.0,
    });
    data.animations = vec![
        Animation::new("move", vec![translate_x(&[(0.0, 0.0), (1.0, 100.0)])], 1.0),
        Animation::new("hold", vec![translate_x(&[(0.0, 100.0)])], 1.0),
        Animation::new(
            "ping",
            vec![Timeline::Event(EventTimeline {
                events: vec![hit(0.5)],
            })],
            1.0,
        ),
        Animation::new("left", vec![rotate(170.0)], 1.0),
        Animation::new("right", vec![rotate(-170.0)], 1.0),
    ];
    for (index, animation) in data.animations.iter().enumerate() {
        data.animation_index.insert(animation.name.clone(), index);
    }
    Arc::new(data)
}

fn setup() -> (AnimationState, Skeleton) {
    let data = test_data();
    let skeleton = Skeleton::new(data.clone());
    (AnimationState::new(AnimationStateData::new(data)), skeleton)
}

fn step(state: &mut AnimationState, skeleton: &mut Skeleton, delta: f32) {
    state.update(delta).unwrap();
    state.apply(skeleton);
}

#[test]
fn mix_table_validates_names_and_durations() {
    let mut data = AnimationStateData::new(test_data());
    data.default_mix = 0.1;
    data.set_mix("move", "hold", 0.4).unwrap();
    assert_eq!(data.mix("move", "hold"), 0.4);
    assert_eq!(data.mix("hold", "move"), 0.1);
    assert_eq!(data.mix("nope", "move"), 0.1);

    assert!(matches!(
        data.set_mix("move", "nope", 0.2),
        Err(Error::UnknownAnimation { .. })
    ));
    assert!(matches!(
        data.set_mix("move", "hold", -1.0),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        data.set_mix("move", "hold", f32::NAN),
        Err(Error::InvalidValue { .. })
    ));
}

#[cfg(feature = "serde")]
#[test]
fn mix_config_applies_by_name() {
    let mut data = AnimationStateData::new(test_data());
    let config = crate::MixConfig::from_json(
        r#"{ "defaultMix": 0.2, "mixes": [{ "from": "move", "to": "hold", "duration": 0.5 }] }"#,
    )
    .unwrap();
    config.apply_to(&mut data).unwrap();
    assert_eq!(data.mix("move", "hold"), 0.5);
    assert_eq!(data.mix("hold", "move"), 0.2);

    let unknown = crate::MixConfig::from_json(
        r#"{ "mixes": [{ "from": "move", "to": "fly", "duration": 0.5 }] }"#,
    )
    .unwrap();
    assert!(matches!(
        unknown.apply_to(&mut data),
        Err(Error::UnknownAnimation { .. })
    ));
}

#[test]
fn unknown_animations_and_bad_input_are_errors() {
    let (mut state, _) = setup();
    assert!(matches!(
        state.set_animation(0, "nope", true),
        Err(Error::UnknownAnimation { .. })
    ));
    assert!(matches!(
        state.add_animation(0, "nope", true, 0.0),
        Err(Error::UnknownAnimation { .. })
    ));
    assert!(matches!(
        state.set_empty_animation(0, -0.5),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(state.update(f32::NAN), Err(Error::InvalidValue { .. })));
    assert!(matches!(
        state.update(f32::INFINITY),
        Err(Error::InvalidValue { .. })
    ));
    assert_eq!(state.tracks_len(), 0);
}

#[test]
fn single_track_plays_and_holds_the_last_pose() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "move", false).unwrap();

    step(&mut state, &mut skeleton, 0.5);
    assert_approx(skeleton.bones[0].x, 50.0);

    step(&mut state, &mut skeleton, 1.5);
    assert_approx(skeleton.bones[0].x, 100.0);
    assert!(state.get_current(0).unwrap().is_complete());
}

#[test]
fn looped_entries_wrap_animation_time() {
    let (mut state, mut skeleton) = setup();
    let handle = state.set_animation(0, "move", true).unwrap();
    step(&mut state, &mut skeleton, 1.25);
    assert_approx(skeleton.bones[0].x, 25.0);
    let entry = state.track_entry(handle).unwrap();
    assert_approx(entry.animation_time(), 0.25);
    assert_approx(entry.track_complete(), 2.0);
}

#[test]
fn time_scales_multiply() {
    let (mut state, mut skeleton) = setup();
    state.time_scale = 2.0;
    let handle = state.set_animation(0, "move", false).unwrap();
    state.track_entry_mut(handle).unwrap().time_scale = 0.5;
    step(&mut state, &mut skeleton, 0.3);
    assert_approx(skeleton.bones[0].x, 30.0);
}

#[test]
fn lifecycle_events_arrive_in_order() {
    let (mut state, mut skeleton) = setup();
    let log = Log::default();
    state.add_listener(recorder(&log));

    let first = state.set_animation(0, "move", false).unwrap();
    step(&mut state, &mut skeleton, 0.5);
    step(&mut state, &mut skeleton, 0.6);
    state.set_animation(0, "hold", false).unwrap();
    step(&mut state, &mut skeleton, 0.1);
    step(&mut state, &mut skeleton, 0.1);

    assert_eq!(
        *log.borrow(),
        vec![
            "move start",
            "move complete",
            "move interrupt",
            "hold start",
            "move end",
            "move dispose",
        ]
    );
    assert!(state.track_entry(first).is_none());
    assert!(!state.get_current(0).unwrap().is_mixing());
    assert_approx(skeleton.bones[0].x, 100.0);
}

#[test]
fn replacing_an_entry_that_never_applied_skips_the_mix() {
    let (mut state, _) = setup();
    let log = Log::default();
    state.add_listener(recorder(&log));
    state.data_mut().default_mix = 0.5;

    state.set_animation(0, "move", false).unwrap();
    state.set_animation(0, "hold", false).unwrap();

    let current = state.get_current(0).unwrap();
    assert_eq!(current.animation().name, "hold");
    assert!(!current.is_mixing());
    assert_eq!(current.mix_duration, 0.0);
    assert_eq!(
        *log.borrow(),
        vec![
            "move start",
            "move interrupt",
            "move end",
            "move dispose",
            "hold start"
        ]
    );
}

#[test]
fn crossfade_blends_from_the_previous_pose() {
    let (mut state, mut skeleton) = setup();
    state.data_mut().set_mix("hold", "move", 1.0).unwrap();
    let log = Log::default();
    state.add_listener(recorder(&log));

    state.set_animation(0, "hold", false).unwrap();
    step(&mut state, &mut skeleton, 0.0);
    assert_approx(skeleton.bones[0].x, 100.0);

    state.set_animation(0, "move", false).unwrap();
    step(&mut state, &mut skeleton, 0.5);
    // hold stays fully applied underneath, move mixes in at 0.5 with its value of 50.
    assert_approx(skeleton.bones[0].x, 75.0);
    assert!(state.get_current(0).unwrap().is_mixing());

    step(&mut state, &mut skeleton, 0.25);
    assert_approx(skeleton.bones[0].x, 81.25);

    step(&mut state, &mut skeleton, 0.35);
    step(&mut state, &mut skeleton, 0.1);
    assert!(!state.get_current(0).unwrap().is_mixing());
    assert!(log.borrow().iter().any(|l| l == "hold end"));
}

#[test]
fn queued_entries_start_when_the_previous_completes() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "move", false).unwrap();
    let queued = state.add_animation(0, "hold", false, 0.0).unwrap();
    assert_approx(state.track_entry(queued).unwrap().delay, 1.0);

    step(&mut state, &mut skeleton, 0.5);
    step(&mut state, &mut skeleton, 0.6);
    assert_eq!(state.get_current(0).unwrap().animation().name, "move");

    step(&mut state, &mut skeleton, 0.1);
    let current = state.get_current(0).unwrap();
    assert_eq!(current.animation().name, "hold");
    assert_approx(current.track_time, 0.2);
    assert_approx(skeleton.bones[0].x, 100.0);
}

#[test]
fn queued_delay_subtracts_the_mix_duration() {
    let (mut state, _) = setup();
    state.data_mut().set_mix("move", "hold", 0.25).unwrap();
    state.set_animation(0, "move", true).unwrap();
    let queued = state.add_animation(0, "hold", false, 0.0).unwrap();
    assert_approx(state.track_entry(queued).unwrap().delay, 0.75);

    let explicit = state.add_animation(0, "move", false, 2.0).unwrap();
    assert_approx(state.track_entry(explicit).unwrap().delay, 2.0);
}

#[test]
fn empty_animation_mixes_back_to_setup_and_ends() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "move", false).unwrap();
    step(&mut state, &mut skeleton, 0.5);
    assert_approx(skeleton.bones[0].x, 50.0);

    let empty = state.set_empty_animation(0, 0.5).unwrap();
    assert!(state.track_entry(empty).unwrap().is_empty_animation());
    assert_eq!(state.track_entry(empty).unwrap().animation_index(), None);
    step(&mut state, &mut skeleton, 0.25);
    assert_approx(skeleton.bones[0].x, 37.5);

    for _ in 0..20 {
        step(&mut state, &mut skeleton, 0.1);
    }
    assert!(state.get_current(0).is_none());
    assert_approx(skeleton.bones[0].x, 0.0);
}

#[test]
fn add_empty_animation_queues_a_mix_out() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "move", false).unwrap();
    let empty = state.add_empty_animation(0, 0.25, 0.0).unwrap();
    let entry = state.track_entry(empty).unwrap();
    assert_approx(entry.delay, 0.75);
    assert_approx(entry.track_end, 0.25);

    for _ in 0..30 {
        step(&mut state, &mut skeleton, 0.1);
    }
    assert!(state.get_current(0).is_none());
    assert_approx(skeleton.bones[0].x, 0.0);
}

#[test]
fn keyed_events_and_complete_are_delivered() {
    let (mut state, mut skeleton) = setup();
    let log = Log::default();
    state.add_listener(recorder(&log));
    state.set_animation(0, "ping", true).unwrap();

    step(&mut state, &mut skeleton, 0.6);
    step(&mut state, &mut skeleton, 0.5);
    step(&mut state, &mut skeleton, 0.5);

    assert_eq!(
        *log.borrow(),
        vec!["ping start", "ping event hit", "ping complete", "ping event hit"]
    );
}

#[test]
fn entry_listeners_see_their_own_events() {
    let (mut state, mut skeleton) = setup();
    let log = Log::default();
    let handle = state.set_animation(0, "move", false).unwrap();
    state.set_animation(1, "ping", false).unwrap();
    state.track_entry_mut(handle).unwrap().set_listener(recorder(&log));

    step(&mut state, &mut skeleton, 1.0);
    state.clear_track(0);

    assert_eq!(*log.borrow(), vec!["move complete", "move end", "move dispose"]);
    assert!(state.get_current(0).is_none());
    assert!(state.get_current(1).is_some());

    state.clear_tracks();
    assert_eq!(state.tracks_len(), 0);
}

#[test]
fn higher_tracks_replace_lower_ones_by_alpha() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "move", false).unwrap();
    let upper = state.set_animation(1, "hold", false).unwrap();
    {
        let entry = state.track_entry_mut(upper).unwrap();
        entry.alpha = 0.5;
        entry.mix_blend = MixBlend::Replace;
    }
    step(&mut state, &mut skeleton, 0.5);
    assert_approx(skeleton.bones[0].x, 75.0);
}

#[test]
fn rotation_crossfade_keeps_the_short_direction() {
    let (mut state, mut skeleton) = setup();
    state.data_mut().set_mix("left", "right", 1.0).unwrap();
    state.set_animation(0, "left", true).unwrap();
    step(&mut state, &mut skeleton, 0.0);
    assert_approx(skeleton.bones[0].rotation, 170.0);

    state.set_animation(0, "right", true).unwrap();
    step(&mut state, &mut skeleton, 0.5);
    assert_approx(skeleton.bones[0].rotation, 180.0);
    step(&mut state, &mut skeleton, 0.25);
    assert_approx(skeleton.bones[0].rotation, 185.0);
}

#[test]
fn set_empty_animations_mixes_out_every_track() {
    let (mut state, mut skeleton) = setup();
    state.set_animation(0, "move", false).unwrap();
    state.set_animation(2, "hold", false).unwrap();
    step(&mut state, &mut skeleton, 0.1);

    state.set_empty_animations(0.0).unwrap();
    assert!(state.get_current(0).unwrap().is_empty_animation());
    assert!(state.get_current(1).is_none());
    assert!(state.get_current(2).unwrap().is_empty_animation());
}

#[test]
fn return_to_idle_restarts_idle_after_a_one_shot() {
    let data = load_skeleton(&idle_skeleton_bytes(), &mut NullAttachmentLoader, 1.0).unwrap();
    let mut skeleton = Skeleton::new(data.clone());
    let mut state = AnimationState::new(AnimationStateData::new(data));
    state.add_listener(ReturnToIdle::new("Idle", 0));

    state.set_animation(0, "walk", false).unwrap();
    step(&mut state, &mut skeleton, 0.5);
    assert_approx(skeleton.bones[0].x, 60.0);

    step(&mut state, &mut skeleton, 0.6);
    assert_eq!(state.get_current(0).unwrap().animation().name, "Idle");
    assert!(state.get_current(0).unwrap().looped);

    step(&mut state, &mut skeleton, 0.1);
    step(&mut state, &mut skeleton, 0.1);
    assert_approx(skeleton.bones[0].rotation, 45.0);
    assert_eq!(state.get_current(0).unwrap().animation().name, "Idle");
}

#[test]
fn idle_applied_at_time_zero_poses_the_world_transform() {
    let data = load_skeleton(&idle_skeleton_bytes(), &mut NullAttachmentLoader, 1.0).unwrap();
    let mut skeleton = Skeleton::new(data.clone());
    let mut state = AnimationState::new(AnimationStateData::new(data));

    state.set_animation(0, "Idle", true).unwrap();
    state.update(0.0).unwrap();
    assert!(state.apply(&mut skeleton));
    skeleton.update_world_transform();

    let root = &skeleton.bones[0];
    assert_approx(root.world_rotation_x(), 45.0);
    assert_approx(root.world_x, 10.0);
    assert_approx(root.world_y, 20.0);
}
