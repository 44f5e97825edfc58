//! `TrackData`: the event-to-bytes codec for one MTrk chunk (spec section
//! 4.2/4.3). This is the densest subsystem in the spec (~20% of the core)
//! and is grounded on the running-status state machine described there and
//! on `trackdata.cpp::parse_track`/`put_track` in `examples/original_source`
//! for the ordering of synthesized meta events on `put_track`.

use log::{debug, trace, warn};

use crate::error::{self, LibResult};
use crate::event::{ChannelEvent, Event, EventBody, MetaEvent, SysexEvent};
use crate::event_list::EventList;
use crate::track_info::{KeySigInfo, TimeSigInfo, TrackInfo};
use crate::types::{Channel, Pulse, StatusType, U7};

/// Policy consulted when a data byte arrives with no prior status byte
/// (spec section 7/9: a tagged enum of policies, never an exception).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunningStatusPolicy {
    /// Reuse the last-known running status, if any.
    Recover,
    /// Drop the rest of the track.
    Skip,
    /// Let the fault propagate as a best-effort guess (treat the stray byte
    /// as if status `0x90` were in effect), continuing the parse.
    Proceed,
    /// Abort the whole file.
    Abort,
}

impl Default for RunningStatusPolicy {
    fn default() -> Self {
        RunningStatusPolicy::Recover
    }
}

/// Outcome of [`parse_track`].
pub struct ParsedTrack {
    pub events: EventList,
    pub info: TrackInfo,
    /// Set only if a `00 FF 00 02` sequence-number meta was present.
    pub track_number: Option<u16>,
}

const META_SEQUENCE_NUMBER: u8 = 0x00;
const META_TEXT_FIRST: u8 = 0x01;
const META_TEXT_LAST: u8 = 0x09;
const META_CHANNEL_PREFIX: u8 = 0x20;
const META_PORT_PREFIX: u8 = 0x21;
const META_SMPTE_OFFSET: u8 = 0x54;
const META_END_OF_TRACK: u8 = 0x2F;
const META_SET_TEMPO: u8 = 0x51;
const META_TIME_SIGNATURE: u8 = 0x58;
const META_KEY_SIGNATURE: u8 = 0x59;
const META_SEQUENCER_SPECIFIC: u8 = 0x7F;

const SYSEX_RESERVED_LENGTHS: [u32; 3] = [0x7D, 0x7E, 0x7F];

/// Parse one MTrk chunk's body (the bytes strictly between the 4-byte length
/// field and the chunk's end). `track_index` is the zero-based position of
/// this track in the file, used as the default track number when no
/// sequence-number meta is present.
pub fn parse_track(
    cursor: &mut crate::byte_cursor::ByteCursor,
    chunk_len: usize,
    track_index: u16,
    policy: RunningStatusPolicy,
    is_track_zero: bool,
) -> LibResult<ParsedTrack> {
    let chunk_end = cursor.position() + chunk_len;
    let mut events = EventList::new();
    let mut info = TrackInfo::default();
    let mut track_number = None;
    let mut running_time: Pulse = 0;
    let mut running_status: u8 = 0;
    let mut end_of_track_found = false;
    let mut tempo_published = false;

    while cursor.position() < chunk_end && !end_of_track_found {
        if cursor.fatal() {
            bad_format!("fatal error while parsing track: {}", cursor.error_message());
        }
        let delta = cursor.get_varinum();
        if cursor.fatal() {
            bad_format!("bad delta-time varinum: {}", cursor.error_message());
        }
        running_time += delta as Pulse;
        let timestamp = running_time;

        let peeked = match cursor.peek_byte() {
            Some(b) => b,
            None => truncated!("end of track bytes reached before EndOfTrack event"),
        };

        let status: u8;
        if peeked >= 0x80 {
            let consumed = cursor.get_byte();
            // Channel voice bytes become the new running status. System
            // Common bytes (0xF1-0xF7) explicitly clear it. SysEx (0xF0) and
            // Meta/Realtime (0xF8-0xFF) leave it untouched: a file never
            // expects a naked data byte to follow either, so there is no
            // ambiguity to resolve either way.
            if (0xF1..=0xF7).contains(&consumed) {
                running_status = 0;
            } else if (0x80..=0xEF).contains(&consumed) {
                running_status = consumed;
            }
            status = consumed;
        } else if running_status != 0 {
            // Data byte with running status in effect: reuse it without
            // consuming the byte here; the channel-event parser below reads
            // it as the first data byte.
            status = running_status;
        } else {
            // Data byte with no status and none to recover: policy applies.
            match policy {
                RunningStatusPolicy::Abort => {
                    return error::RunningStatusFault {
                        site: site!(),
                        description: "data byte with no prior status and no running status",
                    }
                    .fail()
                }
                RunningStatusPolicy::Skip => {
                    warn!("dropping remainder of track: running status fault");
                    break;
                }
                RunningStatusPolicy::Proceed | RunningStatusPolicy::Recover => {
                    warn!("running status fault with nothing to recover; assuming Note On");
                    running_status = 0x90;
                    status = 0x90;
                }
            }
        }

        if status == 0xFF {
            let meta = parse_meta(cursor, &mut info, is_track_zero, &mut tempo_published)?;
            if let MetaEvent::SequenceNumber(n) = &meta {
                track_number = Some(*n);
            }
            end_of_track_found = matches!(meta, MetaEvent::EndOfTrack);
            events.append(Event::meta(timestamp, meta));
        } else if status == 0xF0 || status == 0xF7 {
            let sysex = parse_sysex(cursor, status, &mut events)?;
            if let Some(sysex) = sysex {
                events.append(Event::sysex(timestamp, sysex));
            }
        } else {
            let high_nibble = status >> 4;
            if (0x8..=0xE).contains(&high_nibble) {
                let mut event = parse_channel_event(cursor, status)?;
                event.timestamp = timestamp;
                events.append(event);
            } else {
                bad_format!("unrecognized status byte {:#04x}", status);
            }
        }
    }

    if !end_of_track_found {
        truncated!("track ended without an end-of-track meta event");
    }

    info.length = events.length();
    debug!(
        "parsed track {} with {} events, length {}",
        track_index,
        events.len(),
        info.length
    );
    Ok(ParsedTrack {
        events,
        info,
        track_number,
    })
}

fn parse_channel_event(cursor: &mut crate::byte_cursor::ByteCursor, status: u8) -> LibResult<Event> {
    let high_nibble = status >> 4;
    let channel = Channel::new(status & 0x0F);
    let status_type = StatusType::from_high_nibble(high_nibble)?;
    let data1 = U7::new(cursor.get_byte());
    let data2 = if status_type.data_len() == 2 {
        U7::new(cursor.get_byte())
    } else {
        U7::new(0)
    };
    if cursor.fatal() {
        truncated!("channel event data bytes past end of track");
    }
    // A Note On with velocity 0 is normalized to a Note Off (spec 4.2.d).
    let status_type = if status_type == StatusType::NoteOn && data2.get() == 0 {
        StatusType::NoteOff
    } else {
        status_type
    };
    trace!(
        "channel event status={:#04x} ch={} d1={} d2={}",
        status,
        channel.get(),
        data1.get(),
        data2.get()
    );
    Ok(Event::channel(
        0,
        ChannelEvent {
            status: status_type,
            channel,
            data1,
            data2,
        },
    ))
}

fn parse_meta(
    cursor: &mut crate::byte_cursor::ByteCursor,
    info: &mut TrackInfo,
    is_track_zero: bool,
    tempo_published: &mut bool,
) -> LibResult<MetaEvent> {
    let meta_type = cursor.get_byte();
    let len = cursor.get_varinum();
    if cursor.fatal() {
        truncated!("meta event header truncated");
    }
    if len > crate::varinum::MAX_VARINUM {
        bad_format!("meta event length {:#x} exceeds maximum; file is corrupt", len);
    }
    let data = cursor.get_bytes(len as usize);
    if cursor.fatal() {
        truncated!("meta event payload truncated");
    }

    match meta_type {
        META_SEQUENCE_NUMBER => {
            if data.len() == 2 {
                Ok(MetaEvent::SequenceNumber(((data[0] as u16) << 8) | data[1] as u16))
            } else {
                Ok(MetaEvent::SequenceNumber(0))
            }
        }
        META_TEXT_FIRST..=META_TEXT_LAST => {
            let text = String::from_utf8_lossy(&data).to_string();
            if meta_type == 0x03 {
                info.name = text.clone();
            }
            Ok(MetaEvent::Text {
                kind: meta_type,
                text,
            })
        }
        META_CHANNEL_PREFIX => Ok(MetaEvent::ChannelPrefix(*data.first().unwrap_or(&0))),
        META_PORT_PREFIX => Ok(MetaEvent::PortPrefix(*data.first().unwrap_or(&0))),
        META_END_OF_TRACK => {
            if !data.is_empty() {
                bad_format!("end-of-track meta had non-zero length {}", data.len());
            }
            Ok(MetaEvent::EndOfTrack)
        }
        META_SET_TEMPO => {
            if data.len() != 3 {
                bad_format!("set-tempo meta had length {} (expected 3)", data.len());
            }
            let us = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | data[2] as u32;
            if is_track_zero && !*tempo_published {
                info.tempo.us_per_quarter_note = us;
                *tempo_published = true;
            }
            Ok(MetaEvent::SetTempo(us))
        }
        META_TIME_SIGNATURE => {
            if data.len() != 4 {
                bad_format!("time-signature meta had length {} (expected 4)", data.len());
            }
            let ts = TimeSigInfo {
                numerator: data[0],
                denominator_pow2: data[1],
                clocks_per_metronome: data[2],
                notated_32nds_per_quarter: data[3],
            };
            if is_track_zero {
                info.time_sig = ts;
            }
            Ok(MetaEvent::TimeSignature {
                numerator: ts.numerator,
                denominator_pow2: ts.denominator_pow2,
                clocks_per_metronome: ts.clocks_per_metronome,
                notated_32nds_per_quarter: ts.notated_32nds_per_quarter,
            })
        }
        META_KEY_SIGNATURE => {
            if data.len() != 2 {
                bad_format!("key-signature meta had length {} (expected 2)", data.len());
            }
            let sharps_flats = data[0] as i8;
            let minor = data[1] != 0;
            info.key_sig = KeySigInfo { sharps_flats, minor };
            Ok(MetaEvent::KeySignature { sharps_flats, minor })
        }
        META_SMPTE_OFFSET => {
            let mut buf = [0u8; 5];
            for (i, b) in data.iter().take(5).enumerate() {
                buf[i] = *b;
            }
            Ok(MetaEvent::SmpteOffset(buf))
        }
        META_SEQUENCER_SPECIFIC => Ok(MetaEvent::SequencerSpecific(data)),
        other => Ok(MetaEvent::Other { kind: other, data }),
    }
}

fn parse_sysex(
    cursor: &mut crate::byte_cursor::ByteCursor,
    status: u8,
    events: &mut EventList,
) -> LibResult<Option<SysexEvent>> {
    let len = cursor.get_varinum();
    if cursor.fatal() {
        truncated!("sysex length varinum truncated");
    }
    if SYSEX_RESERVED_LENGTHS.contains(&len) {
        // Vendor-specific reserved-length framing: skip gracefully rather
        // than misparse (spec section 4.2).
        cursor.skip(len as usize);
        return Ok(None);
    }
    let data = cursor.get_bytes(len as usize);
    if cursor.fatal() {
        truncated!("sysex payload truncated");
    }
    let terminated = data.last() == Some(&0xF7);
    let payload = if terminated {
        data[..data.len() - 1].to_vec()
    } else {
        data
    };

    if status == 0xF0 {
        Ok(Some(SysexEvent {
            data: payload,
            continuation: false,
            pending: !terminated,
        }))
    } else {
        // 0xF7: continuation or escape segment.
        if let Some(pending) = events.find_pending_sysex_mut() {
            if let EventBody::Sysex(s) = &mut pending.body {
                s.data.extend_from_slice(&payload);
                s.pending = !terminated;
            }
            Ok(None)
        } else {
            Ok(Some(SysexEvent {
                data: payload,
                continuation: true,
                pending: !terminated,
            }))
        }
    }
}

/// Serialize one track's events to an MTrk chunk body (spec section 4.3).
///
/// Order: optional sequence-number meta, track-name meta, then (only when
/// `is_tempo_track` and the event list doesn't already carry them)
/// synthesized time-signature and set-tempo metas, then every event with a
/// recomputed delta-time, then the mandatory end-of-track meta.
pub fn put_track(
    cursor: &mut crate::byte_cursor::ByteCursor,
    events: &EventList,
    info: &TrackInfo,
    track_number: Option<u16>,
    is_tempo_track: bool,
) -> LibResult<()> {
    let mut sorted = events.clone();
    sorted.sort();

    if let Some(n) = track_number {
        put_meta(cursor, META_SEQUENCE_NUMBER, &[(n >> 8) as u8, n as u8]);
    }
    put_text_meta(cursor, 0x03, &info.name);

    if is_tempo_track {
        if !sorted.has_time_signature() {
            put_time_signature(cursor, &info.time_sig);
        }
        if !sorted.has_tempo() {
            put_tempo(cursor, info.tempo.us_per_quarter_note);
        }
    }

    let mut prev_timestamp: Pulse = 0;
    for event in sorted.iter() {
        let delta = event.timestamp - prev_timestamp;
        if delta < 0 {
            bad_format!(
                "negative delta-time while writing track (events out of order after sort)"
            );
        }
        prev_timestamp = event.timestamp;
        match &event.body {
            EventBody::Channel(c) => {
                let mut c = *c;
                if !info.is_free_channel() {
                    c.channel = Channel::new(info.channel);
                }
                cursor.put_varinum(delta as u32);
                cursor.put_byte(c.status_byte());
                cursor.put_byte(c.data1.get());
                if c.status.data_len() == 2 {
                    cursor.put_byte(c.data2.get());
                }
            }
            EventBody::Meta(m) => {
                cursor.put_varinum(delta as u32);
                put_meta_event(cursor, m);
            }
            EventBody::Sysex(s) => {
                cursor.put_varinum(delta as u32);
                cursor.put_byte(if s.continuation { 0xF7 } else { 0xF0 });
                let mut payload = s.data.clone();
                if !s.pending {
                    payload.push(0xF7);
                }
                cursor.put_varinum(payload.len() as u32);
                cursor.put_bytes(&payload);
            }
        }
    }

    let len = info.length.max(prev_timestamp);
    let final_delta = if len < prev_timestamp { 0 } else { len - prev_timestamp };
    cursor.put_varinum(final_delta as u32);
    cursor.put_byte(0xFF);
    cursor.put_byte(META_END_OF_TRACK);
    cursor.put_byte(0x00);
    Ok(())
}

fn put_meta(cursor: &mut crate::byte_cursor::ByteCursor, kind: u8, data: &[u8]) {
    cursor.put_varinum(0);
    cursor.put_byte(0xFF);
    cursor.put_byte(kind);
    cursor.put_varinum(data.len() as u32);
    cursor.put_bytes(data);
}

fn put_text_meta(cursor: &mut crate::byte_cursor::ByteCursor, kind: u8, text: &str) {
    put_meta(cursor, kind, text.as_bytes());
}

fn put_tempo(cursor: &mut crate::byte_cursor::ByteCursor, us_per_quarter: u32) {
    cursor.put_varinum(0);
    cursor.put_byte(0xFF);
    cursor.put_byte(META_SET_TEMPO);
    cursor.put_varinum(3);
    cursor.put_triple(us_per_quarter);
}

fn put_time_signature(cursor: &mut crate::byte_cursor::ByteCursor, ts: &TimeSigInfo) {
    cursor.put_varinum(0);
    cursor.put_byte(0xFF);
    cursor.put_byte(META_TIME_SIGNATURE);
    cursor.put_varinum(4);
    cursor.put_byte(ts.numerator);
    cursor.put_byte(ts.denominator_pow2);
    cursor.put_byte(ts.clocks_per_metronome);
    cursor.put_byte(ts.notated_32nds_per_quarter);
}

fn put_meta_event(cursor: &mut crate::byte_cursor::ByteCursor, m: &MetaEvent) {
    cursor.put_byte(0xFF);
    cursor.put_byte(m.kind_byte());
    match m {
        MetaEvent::SequenceNumber(n) => {
            cursor.put_varinum(2);
            cursor.put_byte((*n >> 8) as u8);
            cursor.put_byte(*n as u8);
        }
        MetaEvent::Text { text, .. } => {
            cursor.put_varinum(text.len() as u32);
            cursor.put_bytes(text.as_bytes());
        }
        MetaEvent::ChannelPrefix(c) | MetaEvent::PortPrefix(c) => {
            cursor.put_varinum(1);
            cursor.put_byte(*c);
        }
        MetaEvent::EndOfTrack => {
            cursor.put_varinum(0);
        }
        MetaEvent::SetTempo(us) => {
            cursor.put_varinum(3);
            cursor.put_triple(*us);
        }
        MetaEvent::SmpteOffset(bytes) => {
            cursor.put_varinum(5);
            cursor.put_bytes(bytes);
        }
        MetaEvent::TimeSignature {
            numerator,
            denominator_pow2,
            clocks_per_metronome,
            notated_32nds_per_quarter,
        } => {
            cursor.put_varinum(4);
            cursor.put_byte(*numerator);
            cursor.put_byte(*denominator_pow2);
            cursor.put_byte(*clocks_per_metronome);
            cursor.put_byte(*notated_32nds_per_quarter);
        }
        MetaEvent::KeySignature { sharps_flats, minor } => {
            cursor.put_varinum(2);
            cursor.put_byte(*sharps_flats as u8);
            cursor.put_byte(if *minor { 1 } else { 0 });
        }
        MetaEvent::SequencerSpecific(data) | MetaEvent::Other { data, .. } => {
            cursor.put_varinum(data.len() as u32);
            cursor.put_bytes(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_cursor::ByteCursor;

    fn track_bytes(body: &[u8]) -> ByteCursor {
        ByteCursor::from_bytes(body.to_vec())
    }

    #[test]
    fn running_status_scenario_from_spec() {
        // PPQN 96; two note pairs with running status omitted after the first 0x90.
        let body: &[u8] = &[
            0x00, 0x90, 0x3C, 0x40, // NoteOn 60,64 @0
            0x40, 0x3C, 0x00, // NoteOff (running status) 60,0 @64
            0x40, 0x3E, 0x40, // NoteOn (running status) 62,64 @128
            0x40, 0x3E, 0x00, // NoteOff (running status) 62,0 @192
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut cursor = track_bytes(body);
        let parsed = parse_track(&mut cursor, body.len(), 0, RunningStatusPolicy::Recover, false)
            .unwrap();
        let events: Vec<_> = parsed.events.iter().collect();
        assert_eq!(5, events.len());
        assert_eq!(0, events[0].timestamp);
        assert!(events[0].is_note_on());
        assert_eq!(64, events[1].timestamp);
        assert!(events[1].is_note_off());
        assert_eq!(128, events[2].timestamp);
        assert!(events[2].is_note_on());
        assert_eq!(192, events[3].timestamp);
        assert!(events[3].is_note_off());
        assert!(events[4].is_end_of_track());
    }

    #[test]
    fn tempo_meta_parses_to_120_bpm() {
        let body: &[u8] = &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, 0x00, 0xFF, 0x2F, 0x00];
        let mut cursor = track_bytes(body);
        let parsed = parse_track(&mut cursor, body.len(), 0, RunningStatusPolicy::Recover, true)
            .unwrap();
        assert!((parsed.info.tempo.bpm() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn time_signature_meta_parses_per_spec_scenario() {
        let body: &[u8] = &[
            0x00, 0xFF, 0x58, 0x04, 0x06, 0x03, 0x18, 0x08, 0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut cursor = track_bytes(body);
        let parsed = parse_track(&mut cursor, body.len(), 0, RunningStatusPolicy::Recover, true)
            .unwrap();
        assert_eq!(6, parsed.info.time_sig.numerator);
        assert_eq!(8, parsed.info.time_sig.denominator());
        assert_eq!(24, parsed.info.time_sig.clocks_per_metronome);
        assert_eq!(8, parsed.info.time_sig.notated_32nds_per_quarter);
    }

    #[test]
    fn note_on_velocity_zero_normalizes_to_note_off() {
        let body: &[u8] = &[0x00, 0x90, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00];
        let mut cursor = track_bytes(body);
        let parsed = parse_track(&mut cursor, body.len(), 0, RunningStatusPolicy::Recover, false)
            .unwrap();
        assert!(parsed.events.get(0).unwrap().is_note_off());
    }

    #[test]
    fn sequence_number_meta_is_captured_as_track_number() {
        let body: &[u8] = &[
            0x00, 0xFF, 0x00, 0x02, 0x00, 0x05, 0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut cursor = track_bytes(body);
        let parsed = parse_track(&mut cursor, body.len(), 0, RunningStatusPolicy::Recover, false)
            .unwrap();
        assert_eq!(Some(5), parsed.track_number);
    }

    #[test]
    fn missing_end_of_track_is_truncated_error() {
        let body: &[u8] = &[0x00, 0x90, 0x3C, 0x40];
        let mut cursor = track_bytes(body);
        assert!(parse_track(&mut cursor, body.len(), 0, RunningStatusPolicy::Recover, false)
            .is_err());
    }

    #[test]
    fn put_track_then_parse_track_preserves_semantics() {
        let mut events = EventList::new();
        events.append(Event::channel(
            0,
            ChannelEvent {
                status: StatusType::NoteOn,
                channel: Channel::new(0),
                data1: U7::new(60),
                data2: U7::new(64),
            },
        ));
        events.append(Event::channel(
            64,
            ChannelEvent {
                status: StatusType::NoteOff,
                channel: Channel::new(0),
                data1: U7::new(60),
                data2: U7::new(64),
            },
        ));
        let mut info = TrackInfo::default();
        info.length = 64;
        info.channel = 0;

        let mut cursor = ByteCursor::new();
        put_track(&mut cursor, &events, &info, None, false).unwrap();
        let bytes = cursor.into_bytes();

        let mut reread = ByteCursor::from_bytes(bytes.clone());
        let parsed =
            parse_track(&mut reread, bytes.len(), 0, RunningStatusPolicy::Recover, false).unwrap();
        assert_eq!(3, parsed.events.len()); // name meta + 2 channel events... name is empty but still emitted
        let channel_events: Vec<_> = parsed
            .events
            .iter()
            .filter(|e| e.has_channel())
            .collect();
        assert_eq!(2, channel_events.len());
        assert_eq!(0, channel_events[0].timestamp);
        assert_eq!(64, channel_events[1].timestamp);
    }
}
