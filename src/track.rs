//! `Track`: one track's events plus its realtime playback/record state
//! (spec section 4.6). Grounded on the same cooperating-threads model the
//! teacher uses for its I/O loops, generalized from byte parsing to event
//! scheduling.

use std::thread;
use std::time::Duration;

use log::trace;

use crate::event::EventBody;
use crate::event_list::EventList;
use crate::track_info::TrackInfo;
use crate::types::{Channel, Pulse};

/// How a track responds to incoming input while armed (spec section 3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordingType {
    Normal,
    Quantized,
    Tightened,
    /// Stub only; exact semantics are an open design question upstream.
    Overwrite,
    /// Stub only; exact semantics are an open design question upstream.
    Oneshot,
}

impl Default for RecordingType {
    fn default() -> Self {
        RecordingType::Normal
    }
}

/// Whether a playback pass should wrap at the track's own length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlaybackMode {
    Normal,
    Loop,
}

/// Destination for events a `Track` emits while playing; implemented by
/// whatever owns the `MasterBus` (normally `Player`) so `Track` never needs
/// to know about bus/backend plumbing.
pub trait PlaybackSink {
    fn send_channel_event(&mut self, bus: u32, channel: Channel, event: &EventBody);
    fn publish_tempo(&mut self, us_per_quarter_note: u32);
}

/// One track: its events, its parsed metadata, and realtime playback/record
/// state. Owned uniquely by a `TrackList`; a back-pointer to the owning
/// `Player` is an index, never shared ownership (spec section 9).
pub struct Track {
    track_number: Option<u16>,
    events: EventList,
    info: TrackInfo,
    armed: bool,
    recording: bool,
    recording_type: RecordingType,
    thru: bool,
    dirty: bool,
    modified: bool,
    last_tick: Pulse,
    playing_notes: [u16; 128],
    player_index: Option<usize>,
}

impl Track {
    pub fn new(track_number: Option<u16>, events: EventList, info: TrackInfo) -> Self {
        Self {
            track_number,
            events,
            info,
            armed: false,
            recording: false,
            recording_type: RecordingType::default(),
            thru: false,
            dirty: false,
            modified: false,
            last_tick: 0,
            playing_notes: [0; 128],
            player_index: None,
        }
    }

    pub fn track_number(&self) -> Option<u16> {
        self.track_number
    }

    pub fn set_player_index(&mut self, index: usize) {
        self.player_index = Some(index);
    }

    pub fn player_index(&self) -> Option<usize> {
        self.player_index
    }

    pub fn events(&self) -> &EventList {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventList {
        &mut self.events
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut TrackInfo {
        &mut self.info
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn recording(&self) -> bool {
        self.recording
    }

    pub fn set_recording(&mut self, recording: bool, recording_type: RecordingType) {
        self.recording = recording;
        self.recording_type = recording_type;
        self.modified = true;
    }

    pub fn thru(&self) -> bool {
        self.thru
    }

    pub fn set_thru(&mut self, thru: bool) {
        self.thru = thru;
    }

    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn unmodify(&mut self) {
        self.modified = false;
        self.dirty = false;
    }

    pub fn last_tick(&self) -> Pulse {
        self.last_tick
    }

    /// Reseat the playback cursor, e.g. when the transport resumes after a
    /// stop/pause and every track needs to start from the same tick.
    pub fn set_last_tick(&mut self, tick: Pulse) {
        self.last_tick = tick;
    }

    /// Length used as the wrap point for playback: the track's own length,
    /// or the project PPQN if the track has never had an event added.
    fn wrap_length(&self, ppqn: Pulse) -> Pulse {
        if self.info.length > 0 {
            self.info.length
        } else {
            ppqn
        }
    }

    /// Emit every event whose timestamp (after accounting for wraps) falls
    /// in `(last_tick, now_tick]`, forwarding channel events to `sink` and
    /// publishing tempo changes. Advances `last_tick` to `now_tick + 1`.
    pub fn play(
        &mut self,
        now_tick: Pulse,
        mode: PlaybackMode,
        resume_note_ons: bool,
        ppqn: Pulse,
        sink: &mut dyn PlaybackSink,
    ) {
        let length = self.wrap_length(ppqn);
        let start = self.last_tick;
        let mut times_played = if length > 0 { start / length } else { 0 };
        let mut offset_base = times_played * length;
        let mut window_start = start;
        let window_end = now_tick;

        loop {
            let mut emitted_any = false;
            for index in 0..self.events.len() {
                let event = self.events.get(index).expect("index in bounds").clone();
                let stamp = event.timestamp + offset_base;
                if stamp < window_start {
                    continue;
                }
                if stamp > window_end {
                    break;
                }
                emitted_any = true;
                if !resume_note_ons && event.is_note_on() {
                    continue;
                }
                if event.is_tempo() {
                    if let EventBody::Meta(crate::event::MetaEvent::SetTempo(us)) = &event.body {
                        sink.publish_tempo(*us);
                    }
                } else if event.has_channel() {
                    if let Some(channel) = event.channel_number() {
                        self.track_note_count(&event);
                        sink.send_channel_event(self.info.bus, channel, &event.body);
                    }
                }
            }
            if mode != PlaybackMode::Loop || window_end < offset_base + length {
                break;
            }
            if !emitted_any {
                // Avoid spinning on an empty track while still looping.
                thread::sleep(Duration::from_micros(1));
            }
            times_played += 1;
            offset_base = times_played * length;
            window_start = offset_base;
        }

        self.last_tick = now_tick + 1;
        trace!(
            "track {:?} played to tick {}",
            self.track_number,
            self.last_tick
        );
    }

    fn track_note_count(&mut self, event: &crate::event::Event) {
        if let Some(note) = event.note_number() {
            let idx = note as usize;
            if event.is_note_on() {
                self.playing_notes[idx] = self.playing_notes[idx].saturating_add(1);
            } else if event.is_note_off() {
                self.playing_notes[idx] = self.playing_notes[idx].saturating_sub(1);
            }
        }
    }

    /// Emit a note-off for every note whose `playing_notes` counter is
    /// non-zero, then clear all counters.
    pub fn off_playing_notes(&mut self, sink: &mut dyn PlaybackSink) {
        use crate::event::{ChannelEvent, EventBody};
        use crate::types::{StatusType, U7};

        let channel = Channel::new(self.info.channel.min(15));
        for (note, count) in self.playing_notes.iter_mut().enumerate() {
            if *count > 0 {
                let off = ChannelEvent {
                    status: StatusType::NoteOff,
                    channel,
                    data1: U7::new(note as u8),
                    data2: U7::new(0),
                };
                sink.send_channel_event(self.info.bus, channel, &EventBody::Channel(off));
                *count = 0;
            }
        }
    }

    /// Stop playback: silence playing notes, zero the tick marker, and
    /// clear `armed` when stopping out of song mode.
    pub fn stop(&mut self, song_mode: bool, sink: &mut dyn PlaybackSink) {
        self.off_playing_notes(sink);
        self.last_tick = 0;
        if song_mode {
            self.armed = false;
        }
    }

    /// Like `stop`, but never touches `armed`.
    pub fn pause(&mut self, sink: &mut dyn PlaybackSink) {
        self.off_playing_notes(sink);
        self.last_tick = 0;
    }

    /// Toggle playback arming. Turning it off silences any currently
    /// sounding notes.
    pub fn set_armed(&mut self, armed: bool, sink: &mut dyn PlaybackSink) {
        if self.armed && !armed {
            self.off_playing_notes(sink);
        }
        self.armed = armed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChannelEvent, Event};
    use crate::types::{StatusType, U7};

    struct RecordingSink {
        sent: Vec<(u32, Channel, EventBody)>,
        tempos: Vec<u32>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                tempos: Vec::new(),
            }
        }
    }

    impl PlaybackSink for RecordingSink {
        fn send_channel_event(&mut self, bus: u32, channel: Channel, event: &EventBody) {
            self.sent.push((bus, channel, event.clone()));
        }

        fn publish_tempo(&mut self, us_per_quarter_note: u32) {
            self.tempos.push(us_per_quarter_note);
        }
    }

    fn note(ts: Pulse, status: StatusType, note: u8, vel: u8) -> Event {
        Event::channel(
            ts,
            ChannelEvent {
                status,
                channel: Channel::new(0),
                data1: U7::new(note),
                data2: U7::new(vel),
            },
        )
    }

    #[test]
    fn play_emits_events_in_window_and_advances_last_tick() {
        let mut events = EventList::new();
        events.append(note(0, StatusType::NoteOn, 60, 64));
        events.append(note(10, StatusType::NoteOff, 60, 0));
        let mut info = TrackInfo::default();
        info.length = 10;
        let mut track = Track::new(Some(0), events, info);
        let mut sink = RecordingSink::new();

        track.play(5, PlaybackMode::Normal, true, 192, &mut sink);
        assert_eq!(1, sink.sent.len());
        assert_eq!(6, track.last_tick());

        track.play(10, PlaybackMode::Normal, true, 192, &mut sink);
        assert_eq!(2, sink.sent.len());
    }

    #[test]
    fn set_armed_off_silences_playing_notes() {
        let mut events = EventList::new();
        events.append(note(0, StatusType::NoteOn, 60, 64));
        let info = TrackInfo::default();
        let mut track = Track::new(None, events, info);
        let mut sink = RecordingSink::new();

        track.set_armed(true, &mut sink);
        track.play(0, PlaybackMode::Normal, true, 192, &mut sink);
        assert_eq!(1, track.playing_notes[60]);

        track.set_armed(false, &mut sink);
        assert_eq!(0, track.playing_notes[60]);
        assert_eq!(2, sink.sent.len());
    }
}
