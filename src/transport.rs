//! `TransportInfo` and `ClockInfo`: timing and synchronization state shared
//! between the output thread, input thread, and (optionally) JACK
//! transport (spec section 3).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::{Ppqn, Pulse, UNASSIGNED_TICK};

/// Which source is authoritative for the current tick (spec section 5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClockMode {
    None,
    Internal,
    JackMaster,
    JackSlave,
    MidiClock,
}

impl Default for ClockMode {
    fn default() -> Self {
        ClockMode::Internal
    }
}

/// Tempo, meter, and loop-region state, plus the resolution-change flag the
/// output thread consults to know a recompute is due.
pub struct TransportInfo {
    pub timebase: ClockMode,
    pub bpm: f64,
    pub beats_per_bar: u8,
    pub beat_width: u8,
    pub ppqn: Ppqn,
    pub left_tick: Pulse,
    pub right_tick: Pulse,
    pub looping: bool,
    pub current_tick: Pulse,
    pub start_tick: Pulse,
    /// When set, a resume keeps the output thread's current tick instead of
    /// reseating it at `left_tick`/`start_tick` (spec section 4.9 step 2).
    pub dont_reset_ticks: bool,
    resolution_change: AtomicBool,
}

impl Default for TransportInfo {
    fn default() -> Self {
        Self {
            timebase: ClockMode::default(),
            bpm: 120.0,
            beats_per_bar: 4,
            beat_width: 4,
            ppqn: Ppqn::default(),
            left_tick: 0,
            right_tick: 0,
            looping: false,
            current_tick: 0,
            start_tick: 0,
            dont_reset_ticks: false,
            resolution_change: AtomicBool::new(false),
        }
    }
}

impl TransportInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pulses spanned by one measure at the current meter/PPQN.
    pub fn one_measure(&self) -> Pulse {
        let quarters_per_bar = self.beats_per_bar as f64 * 4.0 / self.beat_width as f64;
        (quarters_per_bar * self.ppqn.get() as f64).round() as Pulse
    }

    pub fn microseconds_per_quarter_note(&self) -> u32 {
        (60_000_000.0 / self.bpm).round() as u32
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
        self.mark_resolution_changed();
    }

    pub fn set_ppqn(&mut self, ppqn: Ppqn) {
        self.ppqn = ppqn;
        self.mark_resolution_changed();
    }

    pub fn mark_resolution_changed(&self) {
        self.resolution_change.store(true, Ordering::Release);
    }

    /// Returns true and clears the flag if a tempo/PPQN change is pending
    /// (an acquire/release handoff to the output thread, spec section 5).
    pub fn take_resolution_change(&self) -> bool {
        self.resolution_change.swap(false, Ordering::AcqRel)
    }
}

/// MIDI Beat Clock bookkeeping (spec section 3).
pub struct ClockInfo {
    pub use_midi_clock: bool,
    pub midi_clock_running: bool,
    pub midi_clock_tick: Pulse,
    pub midi_clock_increment: Pulse,
    /// Seek target derived from a Song Position Pointer; `-1` means none.
    pub midi_clock_pos: Pulse,
}

impl ClockInfo {
    pub fn new(ppqn: Ppqn) -> Self {
        Self {
            use_midi_clock: false,
            midi_clock_running: false,
            midi_clock_tick: 0,
            midi_clock_increment: ppqn.get() as Pulse / 24,
            midi_clock_pos: UNASSIGNED_TICK,
        }
    }

    /// Advance the clock by one `F8` Timing Clock pulse.
    pub fn advance(&mut self) {
        if self.midi_clock_running {
            self.midi_clock_tick += self.midi_clock_increment;
        }
    }

    /// Translate a Song Position Pointer's 14-bit value (in MIDI beats,
    /// each 6 MIDI-clock pulses) into a seek target.
    pub fn set_song_position(&mut self, data1: u8, data2: u8) {
        let beats = (data1 as Pulse) | ((data2 as Pulse) << 7);
        self.midi_clock_pos = beats * 6;
    }

    pub fn has_pending_seek(&self) -> bool {
        self.midi_clock_pos != UNASSIGNED_TICK
    }

    pub fn take_seek(&mut self) -> Option<Pulse> {
        if self.has_pending_seek() {
            let pos = self.midi_clock_pos;
            self.midi_clock_pos = UNASSIGNED_TICK;
            Some(pos)
        } else {
            None
        }
    }
}
