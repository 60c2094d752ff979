//! Track based playback: queued entries, cross-fades and listener events on top of
//! [`Animation::apply`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::animation::{
    apply_rotate, set_slot_attachment, setup_attachment_name, signum, ATTACHMENT_CURRENT,
    ATTACHMENT_SETUP,
};
use crate::curve::{frame_percent, search, search1};
use crate::runtime::skeleton::wrap_degrees_f64;
use crate::{
    Animation, AttachmentTimeline, Error, Event, MixBlend, MixDirection, PropertyId,
    RotateTimeline, Skeleton, SkeletonData, Timeline,
};

const EMPTY_ANIMATION_INDEX: usize = usize::MAX;
const EMPTY_ANIMATION_NAME: &str = "<empty>";

/// How a timeline of a track entry blends, derived from which entries key the same property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimelineMode {
    /// Lowest entry keying the property: blends from setup.
    First,
    /// A lower entry already keys the property: blends from the current pose.
    Subsequent,
    /// Like `First`, held at full alpha because the entry mixing in keys the same property.
    HoldFirst,
    HoldSubsequent,
    /// Held until a later entry that does not key the property has mixed in.
    HoldMix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct EntryId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct EntrySlot {
    generation: u32,
    entry: Option<TrackEntry>,
}

/// Mix durations between animations of one skeleton.
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    skeleton_data: Arc<SkeletonData>,
    animations: Vec<Arc<Animation>>,
    /// Used for every pair without an explicit entry.
    pub default_mix: f32,
    mixes: HashMap<(usize, usize), f32>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        let animations = skeleton_data
            .animations
            .iter()
            .cloned()
            .map(Arc::new)
            .collect();
        Self {
            skeleton_data,
            animations,
            default_mix: 0.0,
            mixes: HashMap::new(),
        }
    }

    pub fn skeleton_data(&self) -> &Arc<SkeletonData> {
        &self.skeleton_data
    }

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::InvalidValue {
                message: format!("mix duration must be finite and >= 0, got {duration}"),
            });
        }
        let (from_index, _) = self.find_animation(from)?;
        let (to_index, _) = self.find_animation(to)?;
        self.mixes.insert((from_index, to_index), duration);
        Ok(())
    }

    /// Cross-fade duration from `from` to `to`. Unknown names get the default.
    pub fn mix(&self, from: &str, to: &str) -> f32 {
        match (
            self.skeleton_data.animation(from),
            self.skeleton_data.animation(to),
        ) {
            (Some((from, _)), Some((to, _))) => self.mix_duration(from, to),
            _ => self.default_mix,
        }
    }

    fn mix_duration(&self, from: usize, to: usize) -> f32 {
        self.mixes
            .get(&(from, to))
            .copied()
            .unwrap_or(self.default_mix)
    }

    fn find_animation(&self, name: &str) -> Result<(usize, Arc<Animation>), Error> {
        self.skeleton_data
            .animation(name)
            .and_then(|(index, _)| Some((index, self.animations.get(index)?.clone())))
            .ok_or_else(|| Error::UnknownAnimation {
                name: name.to_string(),
            })
    }
}

/// One queued or playing animation on a track.
pub struct TrackEntry {
    pub track_index: usize,
    animation_index: usize,
    animation: Arc<Animation>,
    pub looped: bool,
    /// Keeps the previous entry at full alpha for properties this entry also keys, instead of
    /// mixing it out.
    pub hold_previous: bool,
    /// Blend used for tracks above 0. Track 0 always blends `First`.
    pub mix_blend: MixBlend,

    /// Events are fired while the mix percentage is below this.
    pub event_threshold: f32,
    /// Attachment timelines of a mixing out entry apply while the mix percentage is below this.
    pub attachment_threshold: f32,
    /// Draw order timelines of a mixing out entry apply while the mix percentage is below this.
    pub draw_order_threshold: f32,

    pub animation_start: f32,
    pub animation_end: f32,
    animation_last: f32,
    next_animation_last: f32,

    /// Seconds before this entry starts. For queued entries, measured from the start of the
    /// previous entry.
    pub delay: f32,
    pub track_time: f32,
    track_last: f32,
    next_track_last: f32,
    /// Track time at which the entry ends. Infinite unless set.
    pub track_end: f32,
    pub time_scale: f32,
    pub alpha: f32,

    pub mix_time: f32,
    pub mix_duration: f32,
    interrupt_alpha: f32,
    total_alpha: f32,
    mixing_from: Option<EntryId>,
    mixing_to: Option<EntryId>,

    listener: Option<Box<dyn AnimationStateListener>>,
    timeline_mode: Vec<TimelineMode>,
    timeline_hold_mix: Vec<Option<EntryId>>,
    timelines_rotation: Vec<f32>,
}

impl std::fmt::Debug for TrackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackEntry")
            .field("track_index", &self.track_index)
            .field("animation", &self.animation.name)
            .field("looped", &self.looped)
            .field("delay", &self.delay)
            .field("track_time", &self.track_time)
            .field("track_end", &self.track_end)
            .field("mix_time", &self.mix_time)
            .field("mix_duration", &self.mix_duration)
            .field("mixing_from", &self.mixing_from)
            .field("alpha", &self.alpha)
            .finish()
    }
}

impl TrackEntry {
    fn new(
        track_index: usize,
        animation_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        mix_duration: f32,
    ) -> Self {
        let animation_end = animation.duration;
        Self {
            track_index,
            animation_index,
            animation,
            looped,
            hold_previous: false,
            mix_blend: MixBlend::Replace,
            event_threshold: 0.0,
            attachment_threshold: 0.0,
            draw_order_threshold: 0.0,
            animation_start: 0.0,
            animation_end,
            animation_last: -1.0,
            next_animation_last: -1.0,
            delay: 0.0,
            track_time: 0.0,
            track_last: -1.0,
            next_track_last: -1.0,
            track_end: f32::MAX,
            time_scale: 1.0,
            alpha: 1.0,
            mix_time: 0.0,
            mix_duration,
            interrupt_alpha: 1.0,
            total_alpha: 0.0,
            mixing_from: None,
            mixing_to: None,
            listener: None,
            timeline_mode: Vec::new(),
            timeline_hold_mix: Vec::new(),
            timelines_rotation: Vec::new(),
        }
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    /// Index into [`SkeletonData::animations`], or `None` for an empty animation.
    pub fn animation_index(&self) -> Option<usize> {
        (self.animation_index != EMPTY_ANIMATION_INDEX).then_some(self.animation_index)
    }

    pub fn is_empty_animation(&self) -> bool {
        self.animation_index == EMPTY_ANIMATION_INDEX
    }

    /// Animation time last applied, or -1 before the first apply.
    pub fn animation_last(&self) -> f32 {
        self.animation_last
    }

    /// Events between this time and the next applied time fire on the next apply.
    pub fn set_animation_last(&mut self, time: f32) {
        self.animation_last = time;
        self.next_animation_last = time;
    }

    pub fn track_last(&self) -> f32 {
        self.track_last
    }

    /// Alpha of the mix this entry interrupted, applied to entries it mixes out.
    pub fn interrupt_alpha(&self) -> f32 {
        self.interrupt_alpha
    }

    pub fn is_mixing(&self) -> bool {
        self.mixing_from.is_some()
    }

    /// `track_time` mapped into `[animation_start, animation_end]`, wrapped when looping.
    pub fn animation_time(&self) -> f32 {
        if self.looped {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            return self.track_time % duration + self.animation_start;
        }
        (self.track_time + self.animation_start).min(self.animation_end)
    }

    /// Track time at which the current loop, or the whole animation, completes.
    pub fn track_complete(&self) -> f32 {
        let duration = self.animation_end - self.animation_start;
        if duration != 0.0 {
            if self.looped {
                return duration * (1.0 + (self.track_time / duration).trunc());
            }
            if self.track_time < duration {
                return duration;
            }
        }
        self.track_time
    }

    pub fn is_complete(&self) -> bool {
        self.track_time >= self.animation_end - self.animation_start
    }

    pub fn set_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }
}

/// Opaque reference to a [`TrackEntry`]. Stale after the entry is disposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackEntryHandle {
    id: EntryId,
}

/// What listeners see of the entry an event belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackEntrySnapshot {
    pub handle: TrackEntryHandle,
    pub track_index: usize,
    pub animation_index: Option<usize>,
    pub animation_name: String,
    pub looped: bool,
    pub track_time: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnimationStateEvent {
    Start,
    Interrupt,
    End,
    /// The entry is about to be freed. Its handle is stale once listeners return.
    Dispose,
    Complete,
    Event(Event),
}

/// Receives entry lifecycle and keyed events. Listeners may change `state`; events caused by
/// those changes are delivered after the current one.
pub trait AnimationStateListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

impl<F> AnimationStateListener for F
where
    F: FnMut(&mut AnimationState, &TrackEntrySnapshot, &AnimationStateEvent),
{
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    ) {
        self(state, entry, event)
    }
}

/// Plays `idle` looped on `track` whenever any other animation on that track completes.
#[derive(Clone, Debug)]
pub struct ReturnToIdle {
    pub idle: String,
    pub track: usize,
}

impl ReturnToIdle {
    pub fn new(idle: impl Into<String>, track: usize) -> Self {
        Self {
            idle: idle.into(),
            track,
        }
    }
}

impl AnimationStateListener for ReturnToIdle {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    ) {
        if *event != AnimationStateEvent::Complete
            || entry.track_index != self.track
            || entry.animation_name == self.idle
        {
            return;
        }
        if let Err(err) = state.set_animation(self.track, &self.idle, true) {
            log::warn!("return to idle on track {}: {err}", self.track);
        }
    }
}

#[derive(Clone, Debug)]
struct QueuedEvent {
    entry: EntryId,
    event: AnimationStateEvent,
}

#[derive(Debug, Default)]
struct Track {
    current: Option<EntryId>,
    queue: VecDeque<EntryId>,
}

/// Applies animations over time, queues animations for later playback and mixes between them.
pub struct AnimationState {
    data: AnimationStateData,
    empty: Arc<Animation>,
    tracks: Vec<Track>,
    entries: Vec<EntrySlot>,
    free_list: Vec<usize>,
    event_queue: VecDeque<QueuedEvent>,
    listeners: Vec<Box<dyn AnimationStateListener>>,
    fired: Vec<Event>,
    draining: bool,
    drain_disabled: bool,
    animations_changed: bool,
    property_ids: HashSet<PropertyId>,
    unkeyed_state: u32,
    /// Multiplier for every delta passed to [`AnimationState::update`].
    pub time_scale: f32,
}

impl AnimationState {
    pub fn new(data: AnimationStateData) -> Self {
        Self {
            data,
            empty: Arc::new(Animation::new(EMPTY_ANIMATION_NAME, Vec::new(), 0.0)),
            tracks: Vec::new(),
            entries: Vec::new(),
            free_list: Vec::new(),
            event_queue: VecDeque::new(),
            listeners: Vec::new(),
            fired: Vec::new(),
            draining: false,
            drain_disabled: false,
            animations_changed: false,
            property_ids: HashSet::new(),
            unkeyed_state: 0,
            time_scale: 1.0,
        }
    }

    pub fn data(&self) -> &AnimationStateData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AnimationStateData {
        &mut self.data
    }

    pub fn add_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    pub fn tracks_len(&self) -> usize {
        self.tracks.len()
    }

    /// Handle of the entry currently playing on `track_index`.
    pub fn current(&self, track_index: usize) -> Option<TrackEntryHandle> {
        let id = self.tracks.get(track_index)?.current?;
        self.entry(id).map(|_| TrackEntryHandle { id })
    }

    pub fn get_current(&self, track_index: usize) -> Option<&TrackEntry> {
        self.entry(self.tracks.get(track_index)?.current?)
    }

    pub fn track_entry(&self, handle: TrackEntryHandle) -> Option<&TrackEntry> {
        self.entry(handle.id)
    }

    pub fn track_entry_mut(&mut self, handle: TrackEntryHandle) -> Option<&mut TrackEntry> {
        self.entry_mut(handle.id)
    }

    /// Replaces everything on the track with `name`. The current entry is mixed out unless it was
    /// never applied.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        name: &str,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        let (index, animation) = self.data.find_animation(name).inspect_err(|_| {
            log::warn!("set_animation: no animation named '{name}' (track {track_index})");
        })?;
        Ok(self.set_animation_with(track_index, index, animation, looped))
    }

    /// Queues `name` after the last entry on the track. A `delay <= 0` is relative to the end of
    /// the previous entry, minus the mix duration.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let (index, animation) = self.data.find_animation(name).inspect_err(|_| {
            log::warn!("add_animation: no animation named '{name}' (track {track_index})");
        })?;
        Ok(self.add_animation_with(track_index, index, animation, looped, delay))
    }

    /// Mixes the track out to the setup pose over `mix_duration`.
    pub fn set_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
    ) -> Result<TrackEntryHandle, Error> {
        check_mix_duration(mix_duration)?;
        let empty = self.empty.clone();
        let handle = self.set_animation_with(track_index, EMPTY_ANIMATION_INDEX, empty, false);
        if let Some(entry) = self.entry_mut(handle.id) {
            entry.mix_duration = mix_duration;
            entry.track_end = mix_duration;
        }
        Ok(handle)
    }

    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        check_mix_duration(mix_duration)?;
        let empty = self.empty.clone();
        let handle =
            self.add_animation_with(track_index, EMPTY_ANIMATION_INDEX, empty, false, delay);
        if let Some(entry) = self.entry_mut(handle.id) {
            if delay <= 0.0 {
                entry.delay += entry.mix_duration - mix_duration;
            }
            entry.mix_duration = mix_duration;
            entry.track_end = mix_duration;
        }
        Ok(handle)
    }

    /// Mixes every track out to the setup pose.
    pub fn set_empty_animations(&mut self, mix_duration: f32) -> Result<(), Error> {
        check_mix_duration(mix_duration)?;
        let old_drain_disabled = self.drain_disabled;
        self.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            if self.tracks[track_index].current.is_some() {
                self.set_empty_animation(track_index, mix_duration)?;
            }
        }
        self.drain_disabled = old_drain_disabled;
        self.drain();
        Ok(())
    }

    /// Removes every entry on the track. The pose is left as last applied.
    pub fn clear_track(&mut self, track_index: usize) {
        self.clear_track_internal(track_index);
        self.drain();
    }

    pub fn clear_tracks(&mut self) {
        let old_drain_disabled = self.drain_disabled;
        self.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            self.clear_track_internal(track_index);
        }
        self.tracks.clear();
        self.drain_disabled = old_drain_disabled;
        self.drain();
    }

    /// Advances every track by `delta` seconds, starting queued entries whose delay has passed and
    /// finishing mixes.
    pub fn update(&mut self, delta: f32) -> Result<(), Error> {
        if !delta.is_finite() {
            return Err(Error::InvalidValue {
                message: format!("update delta must be finite, got {delta}"),
            });
        }
        let delta = delta * self.time_scale;

        for track_index in 0..self.tracks.len() {
            let Some(current_id) = self.tracks[track_index].current else {
                continue;
            };
            let Some(current) = self.entry_mut(current_id) else {
                self.tracks[track_index].current = None;
                continue;
            };
            current.animation_last = current.next_animation_last;
            current.track_last = current.next_track_last;

            let mut current_delta = delta * current.time_scale;
            if current.delay > 0.0 {
                current.delay -= current_delta;
                if current.delay > 0.0 {
                    continue;
                }
                current_delta = -current.delay;
                current.delay = 0.0;
            }
            let track_last = current.track_last;
            let time_scale = current.time_scale;
            let track_end = current.track_end;
            let mixing = current.mixing_from.is_some();

            if let Some(next_id) = self.tracks[track_index].queue.front().copied() {
                let next_delay = self.entry(next_id).map_or(0.0, |e| e.delay);
                let next_time = track_last - next_delay;
                if next_time >= 0.0 {
                    self.tracks[track_index].queue.pop_front();
                    if let Some(next) = self.entry_mut(next_id) {
                        next.delay = 0.0;
                        if time_scale != 0.0 {
                            next.track_time += (next_time / time_scale + delta) * next.time_scale;
                        }
                    }
                    if let Some(current) = self.entry_mut(current_id) {
                        current.track_time += current_delta;
                    }
                    self.set_current(track_index, next_id, true);
                    let mut id = next_id;
                    while let Some(from) = self.entry(id).and_then(|e| e.mixing_from) {
                        if let Some(entry) = self.entry_mut(id) {
                            entry.mix_time += delta;
                        }
                        id = from;
                    }
                    continue;
                }
            } else if track_last >= track_end && !mixing {
                self.tracks[track_index].current = None;
                self.queue_end(current_id);
                continue;
            }

            if mixing && self.update_mixing_from(current_id, delta) {
                // Every entry mixing out has finished.
                let mut from = self.entry_mut(current_id).and_then(|e| e.mixing_from.take());
                if let Some(entry) = from.and_then(|id| self.entry_mut(id)) {
                    entry.mixing_to = None;
                }
                while let Some(id) = from {
                    self.queue_end(id);
                    from = self.entry(id).and_then(|e| e.mixing_from);
                }
            }
            if let Some(current) = self.entry_mut(current_id) {
                current.track_time += current_delta;
            }
        }

        self.drain();
        Ok(())
    }

    /// Poses `skeleton` with every track. Returns whether any entry was applied.
    pub fn apply(&mut self, skeleton: &mut Skeleton) -> bool {
        if self.animations_changed {
            self.compute_timeline_modes();
        }

        let mut applied = false;
        for track_index in 0..self.tracks.len() {
            let Some(current_id) = self.tracks[track_index].current else {
                continue;
            };
            let Some(current) = self.entry(current_id) else {
                continue;
            };
            if current.delay > 0.0 {
                continue;
            }
            applied = true;

            let blend = if track_index == 0 {
                MixBlend::First
            } else {
                current.mix_blend
            };
            let mut mix = current.alpha;
            if current.mixing_from.is_some() {
                mix *= self.apply_mixing_from(current_id, skeleton, blend);
            } else if current.track_time >= current.track_end
                && self.tracks[track_index].queue.is_empty()
            {
                mix = 0.0;
            }

            let Some(current) = self.entry_mut(current_id) else {
                continue;
            };
            let animation = current.animation.clone();
            let animation_last = current.animation_last;
            let animation_time = current.animation_time();
            let timeline_count = animation.timelines.len();
            let first_frame = current.timelines_rotation.len() != timeline_count * 2;
            if first_frame {
                current.timelines_rotation.resize(timeline_count * 2, 0.0);
            }
            let mut rotation = std::mem::take(&mut current.timelines_rotation);
            let modes = current.timeline_mode.clone();

            let mut fired = std::mem::take(&mut self.fired);
            fired.clear();
            if (track_index == 0 && mix == 1.0) || blend == MixBlend::Add {
                for timeline in &animation.timelines {
                    match timeline {
                        Timeline::Attachment(t) => {
                            self.apply_attachment_timeline(t, skeleton, animation_time, blend, true)
                        }
                        _ => timeline.apply(
                            skeleton,
                            animation_last,
                            animation_time,
                            Some(&mut fired),
                            mix,
                            blend,
                            MixDirection::In,
                        ),
                    }
                }
            } else {
                for (i, timeline) in animation.timelines.iter().enumerate() {
                    let timeline_blend = if modes.get(i) == Some(&TimelineMode::Subsequent) {
                        blend
                    } else {
                        MixBlend::Setup
                    };
                    match timeline {
                        Timeline::Rotate(t) => apply_rotate_mixed(
                            t,
                            skeleton,
                            animation_time,
                            mix,
                            timeline_blend,
                            &mut rotation,
                            i * 2,
                            first_frame,
                        ),
                        Timeline::Attachment(t) => {
                            self.apply_attachment_timeline(t, skeleton, animation_time, blend, true)
                        }
                        _ => timeline.apply(
                            skeleton,
                            animation_last,
                            animation_time,
                            Some(&mut fired),
                            mix,
                            timeline_blend,
                            MixDirection::In,
                        ),
                    }
                }
            }
            self.queue_events(current_id, animation_time, &fired);
            fired.clear();
            self.fired = fired;

            if let Some(current) = self.entry_mut(current_id) {
                current.timelines_rotation = rotation;
                current.next_animation_last = animation_time;
                current.next_track_last = current.track_time;
            }
        }

        // Slots no timeline keyed this frame go back to their setup attachment.
        let setup_state = self.unkeyed_state + ATTACHMENT_SETUP;
        for slot in 0..skeleton.slots.len() {
            if skeleton.slots[slot].attachment_state == setup_state {
                let name = setup_attachment_name(skeleton, slot);
                set_slot_attachment(skeleton, slot, name.as_deref());
            }
        }
        self.unkeyed_state = self.unkeyed_state.wrapping_add(2);

        self.drain();
        applied
    }

    fn apply_mixing_from(&mut self, to: EntryId, skeleton: &mut Skeleton, blend: MixBlend) -> f32 {
        let Some(from) = self.entry(to).and_then(|e| e.mixing_from) else {
            return 1.0;
        };
        if self.entry(from).is_some_and(|e| e.mixing_from.is_some()) {
            self.apply_mixing_from(from, skeleton, blend);
        }
        let Some((mix_time, mix_duration, interrupt_alpha)) = self
            .entry(to)
            .map(|e| (e.mix_time, e.mix_duration, e.interrupt_alpha))
        else {
            return 1.0;
        };
        let Some(from_entry) = self.entry_mut(from) else {
            return 1.0;
        };

        let mut blend = blend;
        let mix = if mix_duration == 0.0 {
            if blend == MixBlend::First {
                blend = MixBlend::Setup;
            }
            1.0
        } else {
            if blend != MixBlend::First {
                blend = from_entry.mix_blend;
            }
            (mix_time / mix_duration).min(1.0)
        };

        let attachments = mix < from_entry.attachment_threshold;
        let draw_order = mix < from_entry.draw_order_threshold;
        let fire = mix < from_entry.event_threshold;
        let alpha_hold = from_entry.alpha * interrupt_alpha;
        let alpha_mix = alpha_hold * (1.0 - mix);
        let animation = from_entry.animation.clone();
        let animation_last = from_entry.animation_last;
        let animation_time = from_entry.animation_time();
        let timeline_count = animation.timelines.len();
        let first_frame = from_entry.timelines_rotation.len() != timeline_count * 2;
        if first_frame {
            from_entry.timelines_rotation.resize(timeline_count * 2, 0.0);
        }
        let mut rotation = std::mem::take(&mut from_entry.timelines_rotation);
        let modes = from_entry.timeline_mode.clone();
        let hold_mix = from_entry.timeline_hold_mix.clone();

        let mut fired = std::mem::take(&mut self.fired);
        fired.clear();
        if blend == MixBlend::Add {
            for timeline in &animation.timelines {
                timeline.apply(
                    skeleton,
                    animation_last,
                    animation_time,
                    fire.then_some(&mut fired),
                    alpha_mix,
                    blend,
                    MixDirection::Out,
                );
            }
        } else {
            let mut total_alpha = 0.0;
            for (i, timeline) in animation.timelines.iter().enumerate() {
                let mode = modes.get(i).copied().unwrap_or(TimelineMode::First);
                let (timeline_blend, alpha) = match mode {
                    TimelineMode::Subsequent => {
                        if !draw_order && matches!(timeline, Timeline::DrawOrder(_)) {
                            continue;
                        }
                        (blend, alpha_mix)
                    }
                    TimelineMode::First => (MixBlend::Setup, alpha_mix),
                    TimelineMode::HoldSubsequent => (blend, alpha_hold),
                    TimelineMode::HoldFirst => (MixBlend::Setup, alpha_hold),
                    TimelineMode::HoldMix => {
                        let factor = hold_mix
                            .get(i)
                            .copied()
                            .flatten()
                            .and_then(|id| self.entry(id))
                            .map_or(0.0, |h| {
                                if h.mix_duration > 0.0 {
                                    (1.0 - h.mix_time / h.mix_duration).max(0.0)
                                } else {
                                    0.0
                                }
                            });
                        (MixBlend::Setup, alpha_hold * factor)
                    }
                };
                total_alpha += alpha;
                match timeline {
                    Timeline::Rotate(t) => apply_rotate_mixed(
                        t,
                        skeleton,
                        animation_time,
                        alpha,
                        timeline_blend,
                        &mut rotation,
                        i * 2,
                        first_frame,
                    ),
                    Timeline::Attachment(t) => self.apply_attachment_timeline(
                        t,
                        skeleton,
                        animation_time,
                        timeline_blend,
                        attachments,
                    ),
                    _ => {
                        let direction = if draw_order
                            && matches!(timeline, Timeline::DrawOrder(_))
                            && timeline_blend == MixBlend::Setup
                        {
                            MixDirection::In
                        } else {
                            MixDirection::Out
                        };
                        timeline.apply(
                            skeleton,
                            animation_last,
                            animation_time,
                            fire.then_some(&mut fired),
                            alpha,
                            timeline_blend,
                            direction,
                        );
                    }
                }
            }
            if let Some(from_entry) = self.entry_mut(from) {
                from_entry.total_alpha = total_alpha;
            }
        }

        if mix_duration > 0.0 {
            self.queue_events(from, animation_time, &fired);
        }
        fired.clear();
        self.fired = fired;

        if let Some(from_entry) = self.entry_mut(from) {
            from_entry.timelines_rotation = rotation;
            from_entry.next_animation_last = animation_time;
            from_entry.next_track_last = from_entry.track_time;
        }
        mix
    }

    fn apply_attachment_timeline(
        &self,
        timeline: &AttachmentTimeline,
        skeleton: &mut Skeleton,
        time: f32,
        blend: MixBlend,
        attachments: bool,
    ) {
        let Some(slot) = skeleton.slots.get(timeline.slot) else {
            return;
        };
        if !skeleton.bones.get(slot.bone).is_some_and(|b| b.active) {
            return;
        }
        let Some(first) = timeline.frames.first() else {
            return;
        };
        if time < first.time {
            if matches!(blend, MixBlend::Setup | MixBlend::First) {
                let name = setup_attachment_name(skeleton, timeline.slot);
                self.set_attachment(skeleton, timeline.slot, name.as_deref(), attachments);
            }
        } else {
            let frame = &timeline.frames[search1(&timeline.frames, time, |f| f.time)];
            self.set_attachment(skeleton, timeline.slot, frame.name.as_deref(), attachments);
        }
        if let Some(slot) = skeleton.slots.get_mut(timeline.slot) {
            if slot.attachment_state <= self.unkeyed_state {
                slot.attachment_state = self.unkeyed_state + ATTACHMENT_SETUP;
            }
        }
    }

    fn set_attachment(
        &self,
        skeleton: &mut Skeleton,
        slot: usize,
        name: Option<&str>,
        attachments: bool,
    ) {
        set_slot_attachment(skeleton, slot, name);
        if attachments {
            if let Some(slot) = skeleton.slots.get_mut(slot) {
                slot.attachment_state = self.unkeyed_state + ATTACHMENT_CURRENT;
            }
        }
    }

    /// Queues the fired events and the complete event of an entry, in timeline order.
    fn queue_events(&mut self, id: EntryId, animation_time: f32, fired: &[Event]) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let animation_start = entry.animation_start;
        let animation_end = entry.animation_end;
        let duration = animation_end - animation_start;
        let track_last_wrapped = entry.track_last % duration;

        // Events before the loop boundary come before complete.
        let split = fired
            .iter()
            .position(|e| e.time < track_last_wrapped)
            .unwrap_or(fired.len());
        let complete = if entry.looped {
            duration == 0.0
                || ((entry.track_time / duration).floor() > 0.0
                    && (entry.track_time / duration).floor() > (entry.track_last / duration).floor())
        } else {
            animation_time >= animation_end && entry.animation_last < animation_end
        };

        for event in fired[..split].iter().filter(|e| e.time <= animation_end) {
            self.queue(id, AnimationStateEvent::Event(event.clone()));
        }
        if complete {
            self.queue(id, AnimationStateEvent::Complete);
        }
        for event in fired[split..].iter().filter(|e| e.time >= animation_start) {
            self.queue(id, AnimationStateEvent::Event(event.clone()));
        }
    }

    /// Returns true once this entry and every entry it mixes from are done mixing.
    fn update_mixing_from(&mut self, to: EntryId, delta: f32) -> bool {
        let Some(from) = self.entry(to).and_then(|e| e.mixing_from) else {
            return true;
        };
        let finished = self.update_mixing_from(from, delta);

        let Some(from_entry) = self.entry_mut(from) else {
            return finished;
        };
        from_entry.animation_last = from_entry.next_animation_last;
        from_entry.track_last = from_entry.next_track_last;
        let total_alpha = from_entry.total_alpha;
        let from_mixing_from = from_entry.mixing_from;
        let from_interrupt_alpha = from_entry.interrupt_alpha;

        let Some((mix_time, mix_duration)) = self.entry(to).map(|e| (e.mix_time, e.mix_duration))
        else {
            return finished;
        };
        // A positive mix time means the entry mixing in was applied at least once.
        if mix_time > 0.0 && mix_time >= mix_duration {
            if total_alpha == 0.0 || mix_duration == 0.0 {
                if let Some(to_entry) = self.entry_mut(to) {
                    to_entry.mixing_from = from_mixing_from;
                    to_entry.interrupt_alpha = from_interrupt_alpha;
                }
                if let Some(entry) = from_mixing_from.and_then(|id| self.entry_mut(id)) {
                    entry.mixing_to = Some(to);
                }
                self.queue_end(from);
            }
            return finished;
        }

        if let Some(from_entry) = self.entry_mut(from) {
            from_entry.track_time += delta * from_entry.time_scale;
        }
        if let Some(to_entry) = self.entry_mut(to) {
            to_entry.mix_time += delta;
        }
        false
    }

    fn set_animation_with(
        &mut self,
        track_index: usize,
        animation_index: usize,
        animation: Arc<Animation>,
        looped: bool,
    ) -> TrackEntryHandle {
        self.ensure_track(track_index);
        let mut interrupt = true;
        let mut last = self.tracks[track_index].current;
        if let Some(current) = last {
            self.dispose_queued(track_index);
            let never_applied = self
                .entry(current)
                .is_some_and(|e| e.next_track_last == -1.0);
            if never_applied {
                // Mixing from an entry that was never applied would pop; drop it instead.
                let from = self.entry(current).and_then(|e| e.mixing_from);
                self.tracks[track_index].current = from;
                if let Some(entry) = from.and_then(|id| self.entry_mut(id)) {
                    entry.mixing_to = None;
                }
                self.queue(current, AnimationStateEvent::Interrupt);
                self.queue_end(current);
                last = from;
                interrupt = false;
            }
        }

        let entry = self.new_entry(track_index, animation_index, animation, looped, last);
        let id = self.alloc_entry(entry);
        self.set_current(track_index, id, interrupt);
        self.drain();
        TrackEntryHandle { id }
    }

    fn add_animation_with(
        &mut self,
        track_index: usize,
        animation_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        mut delay: f32,
    ) -> TrackEntryHandle {
        self.ensure_track(track_index);
        let last = {
            let track = &self.tracks[track_index];
            track.queue.back().copied().or(track.current)
        };
        let entry = self.new_entry(track_index, animation_index, animation, looped, last);
        let mix_duration = entry.mix_duration;
        let id = self.alloc_entry(entry);

        match last {
            None => {
                self.set_current(track_index, id, true);
                self.drain();
            }
            Some(last) => {
                self.tracks[track_index].queue.push_back(id);
                if delay <= 0.0 {
                    let complete = self.entry(last).map_or(0.0, TrackEntry::track_complete);
                    delay += complete - mix_duration;
                }
            }
        }
        if let Some(entry) = self.entry_mut(id) {
            entry.delay = delay;
        }
        TrackEntryHandle { id }
    }

    fn new_entry(
        &self,
        track_index: usize,
        animation_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        last: Option<EntryId>,
    ) -> TrackEntry {
        let mix_duration = last
            .and_then(|id| self.entry(id))
            .map_or(0.0, |last| {
                self.data
                    .mix_duration(last.animation_index, animation_index)
            });
        TrackEntry::new(track_index, animation_index, animation, looped, mix_duration)
    }

    fn set_current(&mut self, track_index: usize, id: EntryId, interrupt: bool) {
        self.ensure_track(track_index);
        let from = self.tracks[track_index].current.replace(id);
        if let Some(from) = from {
            if interrupt {
                self.queue(from, AnimationStateEvent::Interrupt);
            }
            // Keep the alpha of an interrupted mix so the pose does not jump.
            let interrupted = self.entry(from).map_or(1.0, |f| {
                if f.mixing_from.is_some() && f.mix_duration > 0.0 {
                    (f.mix_time / f.mix_duration).min(1.0)
                } else {
                    1.0
                }
            });
            if let Some(current) = self.entry_mut(id) {
                current.mixing_from = Some(from);
                current.mix_time = 0.0;
                current.interrupt_alpha *= interrupted;
            }
            if let Some(from_entry) = self.entry_mut(from) {
                from_entry.mixing_to = Some(id);
                from_entry.timelines_rotation.clear();
            }
        }
        self.queue(id, AnimationStateEvent::Start);
    }

    fn clear_track_internal(&mut self, track_index: usize) {
        let Some(current) = self
            .tracks
            .get_mut(track_index)
            .and_then(|t| t.current.take())
        else {
            return;
        };
        self.queue_end(current);
        self.dispose_queued(track_index);
        let mut entry = current;
        loop {
            let from = self.entry_mut(entry).and_then(|e| {
                e.mixing_to = None;
                e.mixing_from.take()
            });
            let Some(from) = from else {
                break;
            };
            self.queue_end(from);
            entry = from;
        }
    }

    fn dispose_queued(&mut self, track_index: usize) {
        let Some(track) = self.tracks.get_mut(track_index) else {
            return;
        };
        let queued: Vec<EntryId> = track.queue.drain(..).collect();
        for id in queued {
            self.queue(id, AnimationStateEvent::Dispose);
        }
    }

    fn compute_timeline_modes(&mut self) {
        self.animations_changed = false;
        self.property_ids.clear();
        for track_index in 0..self.tracks.len() {
            let Some(mut id) = self.tracks[track_index].current else {
                continue;
            };
            while let Some(from) = self.entry(id).and_then(|e| e.mixing_from) {
                id = from;
            }
            let mut next = Some(id);
            while let Some(id) = next {
                let Some((to, blend)) = self.entry(id).map(|e| (e.mixing_to, e.mix_blend)) else {
                    break;
                };
                if to.is_none() || blend != MixBlend::Add {
                    self.compute_hold(id);
                }
                next = to;
            }
        }
    }

    fn compute_hold(&mut self, id: EntryId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let animation = entry.animation.clone();
        let to = entry.mixing_to;
        let count = animation.timelines.len();
        let mut modes = vec![TimelineMode::First; count];
        let mut hold_mix = vec![None; count];

        let hold_previous = to.and_then(|t| self.entry(t)).is_some_and(|t| t.hold_previous);
        if hold_previous {
            for (mode, timeline) in modes.iter_mut().zip(&animation.timelines) {
                *mode = if self.property_ids.insert(timeline.property_id()) {
                    TimelineMode::HoldFirst
                } else {
                    TimelineMode::HoldSubsequent
                };
            }
        } else {
            'timelines: for (i, timeline) in animation.timelines.iter().enumerate() {
                let property = timeline.property_id();
                if !self.property_ids.insert(property) {
                    modes[i] = TimelineMode::Subsequent;
                    continue;
                }
                let Some(to_entry) = to.and_then(|t| self.entry(t)) else {
                    continue;
                };
                if timeline.is_discrete() || !to_entry.animation.has_timeline(property) {
                    continue;
                }
                let mut next = to_entry.mixing_to;
                while let Some(next_id) = next {
                    let Some(next_entry) = self.entry(next_id) else {
                        break;
                    };
                    if next_entry.animation.has_timeline(property) {
                        next = next_entry.mixing_to;
                        continue;
                    }
                    if next_entry.mix_duration > 0.0 {
                        modes[i] = TimelineMode::HoldMix;
                        hold_mix[i] = Some(next_id);
                        continue 'timelines;
                    }
                    break;
                }
                modes[i] = TimelineMode::HoldFirst;
            }
        }

        if let Some(entry) = self.entry_mut(id) {
            entry.timeline_mode = modes;
            entry.timeline_hold_mix = hold_mix;
        }
    }

    fn ensure_track(&mut self, track_index: usize) {
        if track_index >= self.tracks.len() {
            self.tracks.resize_with(track_index + 1, Track::default);
        }
    }

    fn alloc_entry(&mut self, entry: TrackEntry) -> EntryId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.entries[index];
            slot.entry = Some(entry);
            EntryId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len();
            self.entries.push(EntrySlot {
                generation: 0,
                entry: Some(entry),
            });
            EntryId {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, id: EntryId) -> Option<&TrackEntry> {
        let slot = self.entries.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn free_entry(&mut self, id: EntryId) {
        let Some(slot) = self.entries.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation || slot.entry.is_none() {
            return;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
    }

    fn snapshot(&self, id: EntryId) -> Option<TrackEntrySnapshot> {
        let entry = self.entry(id)?;
        Some(TrackEntrySnapshot {
            handle: TrackEntryHandle { id },
            track_index: entry.track_index,
            animation_index: entry.animation_index(),
            animation_name: entry.animation.name.clone(),
            looped: entry.looped,
            track_time: entry.track_time,
        })
    }

    fn queue(&mut self, entry: EntryId, event: AnimationStateEvent) {
        if matches!(event, AnimationStateEvent::Start | AnimationStateEvent::End) {
            self.animations_changed = true;
        }
        self.event_queue.push_back(QueuedEvent { entry, event });
    }

    /// An ended entry is always disposed right after.
    fn queue_end(&mut self, entry: EntryId) {
        self.queue(entry, AnimationStateEvent::End);
        self.queue(entry, AnimationStateEvent::Dispose);
    }

    fn drain(&mut self) {
        if self.draining || self.drain_disabled {
            return;
        }
        self.draining = true;
        while let Some(QueuedEvent { entry, event }) = self.event_queue.pop_front() {
            let Some(snapshot) = self.snapshot(entry) else {
                continue;
            };

            let mut entry_listener = self.entry_mut(entry).and_then(|e| e.listener.take());
            if let Some(listener) = entry_listener.as_mut() {
                listener.on_event(self, &snapshot, &event);
            }

            let mut listeners = std::mem::take(&mut self.listeners);
            for listener in &mut listeners {
                listener.on_event(self, &snapshot, &event);
            }
            let added = std::mem::replace(&mut self.listeners, listeners);
            self.listeners.extend(added);

            if event == AnimationStateEvent::Dispose {
                self.free_entry(entry);
            } else if let Some(listener) = entry_listener {
                if let Some(e) = self.entry_mut(entry) {
                    if e.listener.is_none() {
                        e.listener = Some(listener);
                    }
                }
            }
        }
        self.draining = false;
    }
}

fn check_mix_duration(mix_duration: f32) -> Result<(), Error> {
    if mix_duration.is_finite() && mix_duration >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidValue {
            message: format!("mix duration must be finite and >= 0, got {mix_duration}"),
        })
    }
}

/// Rotation while mixing: the direction of the shortest route is chosen on the first frame and
/// kept afterwards, so a mix never spins the long way around when the difference crosses 180.
///
/// `rotation[i]` holds the accumulated total, `rotation[i + 1]` the last difference.
#[allow(clippy::too_many_arguments)]
fn apply_rotate_mixed(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    rotation: &mut [f32],
    i: usize,
    first_frame: bool,
) {
    if rotation.len() < i + 2 {
        return;
    }
    if first_frame {
        rotation[i] = 0.0;
    }
    if alpha == 1.0 {
        apply_rotate(timeline, skeleton, time, 1.0, blend);
        return;
    }
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

    let (r1, r2) = if time < first.time {
        match blend {
            MixBlend::Setup => {
                bone.rotation = setup;
                return;
            }
            MixBlend::First => (bone.rotation, setup),
            MixBlend::Replace | MixBlend::Add => return,
        }
    } else {
        let r1 = if blend == MixBlend::Setup {
            setup
        } else {
            bone.rotation
        };
        let r2 = if time >= last.time {
            setup + last.angle
        } else {
            let next = search(frames, time, |f| f.time);
            let prev = &frames[next - 1];
            let next = &frames[next];
            let percent = frame_percent(&prev.curve, time, prev.time, next.time);
            let r = prev.angle + wrap_degrees_f64(next.angle - prev.angle) * percent;
            setup + wrap_degrees_f64(r)
        };
        (r1, r2)
    };

    let diff = wrap_degrees_f64(r2 - r1);
    let total = if diff == 0.0 {
        rotation[i]
    } else {
        let (last_total, last_diff) = if first_frame {
            (0.0, diff)
        } else {
            (rotation[i], rotation[i + 1])
        };
        let loops = last_total - last_total % 360.0;
        let mut total = diff + loops;
        let current = diff >= 0.0;
        let mut dir = last_total >= 0.0;
        // A sign change near zero is a cross, not a wrap at 180.
        if last_diff.abs() <= 90.0 && signum(last_diff) != signum(diff) {
            if (last_total - loops).abs() > 180.0 {
                total += 360.0 * signum(last_total);
                dir = current;
            } else if loops != 0.0 {
                total -= 360.0 * signum(last_total);
            } else {
                dir = current;
            }
        }
        if dir != current {
            total += 360.0 * signum(last_total);
        }
        rotation[i] = total;
        total
    };
    rotation[i + 1] = diff;
    bone.rotation = r1 + total * alpha;
}
