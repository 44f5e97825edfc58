//! `Player`: the conductor owning the `MasterBus`, `TrackList`, two
//! `IoThread`s, and the transport state (spec section 4.9).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::backend::MidiApi;
use crate::event::EventBody;
use crate::io_thread::IoThread;
use crate::master_bus::{ClockAction, MasterBus};
use crate::track::{PlaybackMode, PlaybackSink, Track};
use crate::track_list::TrackList;
use crate::transport::{ClockInfo, ClockMode, TransportInfo};
use crate::types::{Channel, Pulse};

/// Forwards a `Track`'s emitted events to the shared `MasterBus`, and
/// publishes tempo changes back to the shared `TransportInfo`. A fresh one
/// is built per `play()` call so `Track` never has to hold a lock itself.
struct BusSink {
    bus: Arc<MasterBus>,
    transport: Arc<Mutex<TransportInfo>>,
}

impl PlaybackSink for BusSink {
    fn send_channel_event(&mut self, bus: u32, channel: Channel, event: &EventBody) {
        if let Err(e) = self.bus.play(bus, channel, event) {
            warn!("failed to send event on bus {}: {}", bus, e);
        }
    }

    fn publish_tempo(&mut self, us_per_quarter_note: u32) {
        let bpm = 60_000_000.0 / us_per_quarter_note as f64;
        self.transport.lock().unwrap().set_bpm(bpm);
    }
}

/// Shared run/stop predicate: `is_running || done`, satisfying the spec's
/// condition-variable predicate design so a destructor can unblock the
/// output thread without a sentinel message.
#[derive(Default)]
struct RunState {
    is_running: AtomicBool,
    done: AtomicBool,
}

impl RunState {
    fn should_wake(&self) -> bool {
        self.is_running.load(Ordering::Acquire) || self.done.load(Ordering::Acquire)
    }
}

pub struct Player {
    tracks: Arc<Mutex<TrackList>>,
    master_bus: Mutex<Option<Arc<MasterBus>>>,
    output_thread: IoThread,
    input_thread: IoThread,
    transport: Arc<Mutex<TransportInfo>>,
    clock: Arc<Mutex<ClockInfo>>,
    run_state: Arc<RunState>,
    run_cv: Arc<Condvar>,
    run_mutex: Arc<Mutex<()>>,
    recording_track: Arc<Mutex<Option<usize>>>,
    error_messages: Mutex<Vec<String>>,
    modified: AtomicBool,
    current_tick: Arc<AtomicI64>,
}

impl Player {
    pub fn new() -> Self {
        let transport = Arc::new(Mutex::new(TransportInfo::new()));
        let ppqn = transport.lock().unwrap().ppqn;
        Self {
            tracks: Arc::new(Mutex::new(TrackList::new())),
            master_bus: Mutex::new(None),
            output_thread: IoThread::new(),
            input_thread: IoThread::new(),
            transport,
            clock: Arc::new(Mutex::new(ClockInfo::new(ppqn))),
            run_state: Arc::new(RunState::default()),
            run_cv: Arc::new(Condvar::new()),
            run_mutex: Arc::new(Mutex::new(())),
            recording_track: Arc::new(Mutex::new(None)),
            error_messages: Mutex::new(Vec::new()),
            modified: AtomicBool::new(false),
            current_tick: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn tracks(&self) -> Arc<Mutex<TrackList>> {
        Arc::clone(&self.tracks)
    }

    pub fn add_track(&self, track: Track) -> usize {
        self.tracks.lock().unwrap().append(track)
    }

    pub fn transport(&self) -> Arc<Mutex<TransportInfo>> {
        Arc::clone(&self.transport)
    }

    pub fn record_error(&self, message: String) {
        let mut errors = self.error_messages.lock().unwrap();
        if !errors.contains(&message) {
            errors.push(message);
        }
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.error_messages.lock().unwrap().clone()
    }

    /// Create the `MasterBus` if absent and propagate PPQN/BPM to it.
    pub fn setup(&self) -> Arc<MasterBus> {
        let mut guard = self.master_bus.lock().unwrap();
        if guard.is_none() {
            *guard = Some(Arc::new(MasterBus::new()));
        }
        let bus = Arc::clone(guard.as_ref().unwrap());
        let transport = self.transport.lock().unwrap();
        bus.set_ppqn(transport.ppqn.get());
        bus.set_bpm(transport.bpm);
        bus
    }

    /// Open `output_port`/`input_port` (if given) against the supplied
    /// backend factories, then spawn the corresponding worker thread.
    pub fn launch(
        &mut self,
        make_output: Option<Box<dyn FnOnce() -> LibResultBackend + Send>>,
        make_input: Option<Box<dyn FnOnce() -> LibResultBackend + Send>>,
    ) {
        let bus = self.setup();

        if let Some(factory) = make_output {
            if let Ok(api) = factory() {
                bus.add_output(api);
            }
        }
        if let Some(factory) = make_input {
            if let Ok(api) = factory() {
                bus.add_input(api);
            }
        }

        self.launch_output_thread(Arc::clone(&bus));
        self.launch_input_thread(Arc::clone(&bus));
    }

    fn launch_output_thread(&mut self, bus: Arc<MasterBus>) {
        let tracks = Arc::clone(&self.tracks);
        let transport = Arc::clone(&self.transport);
        let run_state = Arc::clone(&self.run_state);
        let run_cv = Arc::clone(&self.run_cv);
        let run_mutex = Arc::clone(&self.run_mutex);
        let current_tick = Arc::clone(&self.current_tick);

        self.output_thread.launch(move |flags| {
            let mut last_instant = Instant::now();
            let mut frac_remainder: f64 = 0.0;
            let mut pulses_since_clock: f64 = 0.0;
            let mut emitted_pulse_count: i64 = 0;
            let mut first_iteration = true;
            let mut was_running = false;

            while flags.is_active() {
                {
                    let guard = run_mutex.lock().unwrap();
                    let _guard = run_cv
                        .wait_timeout_while(guard, Duration::from_millis(50), |_| {
                            !run_state.should_wake() && flags.is_active()
                        })
                        .unwrap();
                }
                if run_state.done.load(Ordering::Acquire) {
                    break;
                }
                if !run_state.is_running.load(Ordering::Acquire) {
                    was_running = false;
                    continue;
                }

                let (bpm, ppqn_val, looping, left, right, start_tick, dont_reset_ticks) = {
                    let t = transport.lock().unwrap();
                    (
                        t.bpm,
                        t.ppqn.get() as f64,
                        t.looping,
                        t.left_tick,
                        t.right_tick,
                        t.start_tick,
                        t.dont_reset_ticks,
                    )
                };

                if !was_running {
                    // Wake transition: reset the scratchpad and reseat every
                    // track's playback cursor before resuming the
                    // elapsed-time accumulation, so a paused interval never
                    // shows up as one huge tick jump on the next iteration.
                    let start = if dont_reset_ticks {
                        current_tick.load(Ordering::Acquire)
                    } else if looping {
                        left
                    } else {
                        start_tick
                    };
                    current_tick.store(start, Ordering::Release);
                    for shared_track in tracks.lock().unwrap().iter() {
                        shared_track.lock().unwrap().set_last_tick(start);
                    }
                    frac_remainder = 0.0;
                    pulses_since_clock = 0.0;
                    emitted_pulse_count = 0;
                    last_instant = Instant::now();
                    was_running = true;
                }

                let now = Instant::now();
                let elapsed_us = now.duration_since(last_instant).as_micros() as f64;
                last_instant = now;

                let delta_pulses_f = (bpm * ppqn_val * elapsed_us + frac_remainder) / 60_000_000.0;
                let delta_pulses = delta_pulses_f.floor();
                frac_remainder = delta_pulses_f - delta_pulses;
                let mut tick = current_tick.load(Ordering::Acquire) + delta_pulses as i64;

                if first_iteration {
                    let _ = bus.handle_clock(ClockAction::Init, ppqn_val as u32);
                    first_iteration = false;
                }

                if looping && right > left && tick >= right {
                    tick = left + (tick - right);
                }
                current_tick.store(tick, Ordering::Release);

                let mut sink = BusSink {
                    bus: Arc::clone(&bus),
                    transport: Arc::clone(&transport),
                };
                for shared_track in tracks.lock().unwrap().iter() {
                    let mut track = shared_track.lock().unwrap();
                    if track.armed() {
                        track.play(tick, PlaybackMode::Loop, true, ppqn_val as Pulse, &mut sink);
                    }
                }

                // Forward the MIDI Beat Clock at its own cadence (24 pulses
                // per quarter note) instead of once per output-thread wake;
                // catch up with more than one `Emit` if a long poll interval
                // crossed several pulse boundaries at once.
                let pulses_per_clock_i = ((ppqn_val as i64) / 24).max(1);
                pulses_since_clock += delta_pulses;
                while pulses_since_clock >= pulses_per_clock_i as f64 {
                    pulses_since_clock -= pulses_per_clock_i as f64;
                    emitted_pulse_count += 1;
                    let boundary_tick = emitted_pulse_count * pulses_per_clock_i;
                    let _ = bus.handle_clock(ClockAction::Emit(boundary_tick), ppqn_val as u32);
                }
            }
        });
    }

    fn launch_input_thread(&mut self, bus: Arc<MasterBus>) {
        let tracks = Arc::clone(&self.tracks);
        let recording_track = Arc::clone(&self.recording_track);
        let clock = Arc::clone(&self.clock);
        let transport = Arc::clone(&self.transport);
        let current_tick = Arc::clone(&self.current_tick);

        self.input_thread.launch(move |flags| {
            while flags.is_active() {
                let mut saw_any = false;
                for port in 0..bus.input_count() {
                    while bus.poll_input(port) > 0 {
                        if let Some(message) = bus.next_input_event(port) {
                            saw_any = true;
                            dispatch_input_message(
                                &message.bytes,
                                &tracks,
                                &recording_track,
                                &clock,
                                &transport,
                                &current_tick,
                            );
                        } else {
                            break;
                        }
                    }
                }
                if !saw_any {
                    std::thread::sleep(Duration::from_millis(2));
                }
            }
        });
    }

    pub fn start(&self) {
        self.run_state.is_running.store(true, Ordering::Release);
        self.run_cv.notify_all();
    }

    pub fn stop_playback(&self) {
        self.run_state.is_running.store(false, Ordering::Release);
        self.run_cv.notify_all();
    }

    pub fn set_tick(&self, tick: Pulse) {
        self.current_tick.store(tick, Ordering::Release);
        self.transport.lock().unwrap().mark_resolution_changed();
    }

    pub fn current_tick(&self) -> Pulse {
        self.current_tick.load(Ordering::Acquire)
    }

    /// Stop playback, join both worker threads, idempotently.
    pub fn finish(&mut self) {
        self.run_state.is_running.store(false, Ordering::Release);
        self.run_state.done.store(true, Ordering::Release);
        self.run_cv.notify_all();
        self.output_thread.finish();
        self.input_thread.finish();
        self.run_state.done.store(false, Ordering::Release);
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Return type for the backend factories `launch` accepts; kept as a
/// type alias because trait objects can't name `LibResult<Box<dyn MidiApi>>`
/// inline in a fn-pointer bound without repetition.
pub type LibResultBackend = crate::error::LibResult<Box<dyn MidiApi>>;

/// Dispatch one already-popped raw input message per spec section 4.9's
/// classification table.
fn dispatch_input_message(
    bytes: &[u8],
    tracks: &Arc<Mutex<TrackList>>,
    recording_track: &Arc<Mutex<Option<usize>>>,
    clock: &Arc<Mutex<ClockInfo>>,
    transport: &Arc<Mutex<TransportInfo>>,
    current_tick: &Arc<AtomicI64>,
) {
    match classify_message(bytes) {
        InputClass::Channel => {
            let recording_idx = *recording_track.lock().unwrap();
            if let Some(idx) = recording_idx {
                if let Some(shared) = tracks.lock().unwrap().get(idx) {
                    let event = crate::event::Event::channel(
                        current_tick.load(Ordering::Acquire),
                        decode_channel_event(bytes),
                    );
                    shared.lock().unwrap().events_mut().add(event);
                }
            }
        }
        InputClass::Start => current_tick.store(0, Ordering::Release),
        InputClass::Continue => {}
        InputClass::Stop => {}
        InputClass::Clock => clock.lock().unwrap().advance(),
        InputClass::SongPosition { data1, data2 } => {
            clock.lock().unwrap().set_song_position(data1, data2);
        }
        InputClass::MetaSetTempo => {
            let timebase = transport.lock().unwrap().timebase;
            if matches!(timebase, ClockMode::Internal | ClockMode::JackMaster) {
                if bytes.len() >= 5 {
                    let us = ((bytes[2] as u32) << 16) | ((bytes[3] as u32) << 8) | bytes[4] as u32;
                    transport.lock().unwrap().set_bpm(60_000_000.0 / us as f64);
                }
            }
        }
        InputClass::Sysex => {}
        InputClass::Unknown => {}
    }
}

fn decode_channel_event(bytes: &[u8]) -> crate::event::ChannelEvent {
    use crate::types::{StatusType, U7};
    let status_byte = bytes.first().copied().unwrap_or(0);
    let status = StatusType::from_high_nibble(status_byte >> 4).unwrap_or(StatusType::NoteOff);
    crate::event::ChannelEvent {
        status,
        channel: Channel::new(status_byte & 0x0F),
        data1: U7::new(*bytes.get(1).unwrap_or(&0)),
        data2: U7::new(*bytes.get(2).unwrap_or(&0)),
    }
}

/// Classify one raw MIDI input message per spec section 4.9's table.
pub fn classify_message(bytes: &[u8]) -> InputClass {
    match bytes.first().copied() {
        Some(status) if status < 0xF0 => InputClass::Channel,
        Some(0xFA) => InputClass::Start,
        Some(0xFB) => InputClass::Continue,
        Some(0xFC) => InputClass::Stop,
        Some(0xF8) => InputClass::Clock,
        Some(0xF2) => InputClass::SongPosition {
            data1: *bytes.get(1).unwrap_or(&0),
            data2: *bytes.get(2).unwrap_or(&0),
        },
        Some(0xFF) => InputClass::MetaSetTempo,
        Some(s) if (0xF0..=0xF7).contains(&s) => InputClass::Sysex,
        _ => InputClass::Unknown,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputClass {
    Channel,
    Start,
    Continue,
    Stop,
    Clock,
    SongPosition { data1: u8, data2: u8 },
    MetaSetTempo,
    Sysex,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_message_recognizes_realtime_bytes() {
        assert_eq!(InputClass::Start, classify_message(&[0xFA]));
        assert_eq!(InputClass::Stop, classify_message(&[0xFC]));
        assert_eq!(InputClass::Clock, classify_message(&[0xF8]));
        assert_eq!(InputClass::Channel, classify_message(&[0x90, 60, 64]));
    }

    #[test]
    fn classify_message_decodes_song_position_pointer() {
        let class = classify_message(&[0xF2, 0x00, 0x01]);
        assert_eq!(InputClass::SongPosition { data1: 0, data2: 1 }, class);
    }

    #[test]
    fn start_stop_toggle_run_state() {
        let player = Player::new();
        player.start();
        assert!(player.run_state.is_running.load(Ordering::Acquire));
        player.stop_playback();
        assert!(!player.run_state.is_running.load(Ordering::Acquire));
    }

    #[test]
    fn set_tick_updates_current_tick_and_marks_resolution_change() {
        let player = Player::new();
        player.set_tick(123);
        assert_eq!(123, player.current_tick());
        assert!(player.transport.lock().unwrap().take_resolution_change());
    }
}
