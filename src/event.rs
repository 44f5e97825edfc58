//! `Event`: a tagged union of channel, meta, and SysEx events with a pulse
//! timestamp (spec section 3).

use crate::types::{Channel, Pulse, StatusType, U7};

/// Meta event payloads the parser preserves verbatim or interprets, per
/// spec section 4.2's meta-type dispatch table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetaEvent {
    /// `00`: sequence number, if a length-2 form was present.
    SequenceNumber(u16),
    /// `01`..`09`: text-family metas (text, copyright, name, instrument,
    /// lyric, marker, cue, program name, device/port name). `kind` is the
    /// raw meta-type byte so round-tripping preserves which text variant it was.
    Text { kind: u8, text: String },
    /// `20`: MIDI channel prefix, preserved verbatim (deprecated).
    ChannelPrefix(u8),
    /// `21`: MIDI port, preserved verbatim (deprecated).
    PortPrefix(u8),
    /// `2F`: end of track.
    EndOfTrack,
    /// `51`: set tempo, microseconds per quarter note.
    SetTempo(u32),
    /// `54`: SMPTE offset, preserved verbatim.
    SmpteOffset([u8; 5]),
    /// `58`: time signature (numerator, denominator log2, clocks/metronome, 32nds/quarter).
    TimeSignature {
        numerator: u8,
        denominator_pow2: u8,
        clocks_per_metronome: u8,
        notated_32nds_per_quarter: u8,
    },
    /// `59`: key signature (sharps positive / flats negative, minor flag).
    KeySignature { sharps_flats: i8, minor: bool },
    /// `7F`: sequencer-specific data, preserved verbatim.
    SequencerSpecific(Vec<u8>),
    /// Any other meta type: opaque payload preserved verbatim.
    Other { kind: u8, data: Vec<u8> },
}

impl MetaEvent {
    pub fn kind_byte(&self) -> u8 {
        match self {
            MetaEvent::SequenceNumber(_) => 0x00,
            MetaEvent::Text { kind, .. } => *kind,
            MetaEvent::ChannelPrefix(_) => 0x20,
            MetaEvent::PortPrefix(_) => 0x21,
            MetaEvent::EndOfTrack => 0x2F,
            MetaEvent::SetTempo(_) => 0x51,
            MetaEvent::SmpteOffset(_) => 0x54,
            MetaEvent::TimeSignature { .. } => 0x58,
            MetaEvent::KeySignature { .. } => 0x59,
            MetaEvent::SequencerSpecific(_) => 0x7F,
            MetaEvent::Other { kind, .. } => *kind,
        }
    }
}

/// A SysEx event, possibly assembled from `F0`/`F7` continuation segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SysexEvent {
    /// The payload, not including the leading `F0`/`F7` or trailing `F7`.
    pub data: Vec<u8>,
    /// True if this event was a continuation segment when parsed (an `F7`
    /// event that is not a standalone escape message).
    pub continuation: bool,
    /// True until a terminating `F7` byte has been seen; an in-progress
    /// multi-segment SysEx event.
    pub pending: bool,
}

/// A channel-voice message: a 4-bit status type, channel, and 1-2 data bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelEvent {
    pub status: StatusType,
    pub channel: Channel,
    pub data1: U7,
    /// Unused (left at 0) for `ProgramChange`/`ChannelPressure`, which carry
    /// only one data byte.
    pub data2: U7,
}

impl ChannelEvent {
    pub fn status_byte(&self) -> u8 {
        (self.status as u8) << 4 | self.channel.get()
    }
}

/// One event in a track: a channel message, a meta event, or a SysEx event,
/// each stamped with its absolute pulse position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub timestamp: Pulse,
    pub body: EventBody,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventBody {
    Channel(ChannelEvent),
    Meta(MetaEvent),
    Sysex(SysexEvent),
}

impl Event {
    pub fn channel(timestamp: Pulse, event: ChannelEvent) -> Self {
        Self {
            timestamp,
            body: EventBody::Channel(event),
        }
    }

    pub fn meta(timestamp: Pulse, event: MetaEvent) -> Self {
        Self {
            timestamp,
            body: EventBody::Meta(event),
        }
    }

    pub fn sysex(timestamp: Pulse, event: SysexEvent) -> Self {
        Self {
            timestamp,
            body: EventBody::Sysex(event),
        }
    }

    pub fn has_channel(&self) -> bool {
        matches!(self.body, EventBody::Channel(_))
    }

    pub fn is_note_on(&self) -> bool {
        matches!(
            &self.body,
            EventBody::Channel(c) if c.status == StatusType::NoteOn && c.data2.get() > 0
        )
    }

    pub fn is_note_off(&self) -> bool {
        match &self.body {
            EventBody::Channel(c) if c.status == StatusType::NoteOff => true,
            EventBody::Channel(c) if c.status == StatusType::NoteOn && c.data2.get() == 0 => true,
            _ => false,
        }
    }

    pub fn note_number(&self) -> Option<u8> {
        match &self.body {
            EventBody::Channel(c)
                if c.status == StatusType::NoteOn || c.status == StatusType::NoteOff =>
            {
                Some(c.data1.get())
            }
            _ => None,
        }
    }

    pub fn channel_number(&self) -> Option<Channel> {
        match &self.body {
            EventBody::Channel(c) => Some(c.channel),
            _ => None,
        }
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(&self.body, EventBody::Meta(MetaEvent::EndOfTrack))
    }

    pub fn is_tempo(&self) -> bool {
        matches!(&self.body, EventBody::Meta(MetaEvent::SetTempo(_)))
    }

    pub fn is_time_signature(&self) -> bool {
        matches!(&self.body, EventBody::Meta(MetaEvent::TimeSignature { .. }))
    }

    pub fn is_track_name(&self) -> bool {
        matches!(&self.body, EventBody::Meta(MetaEvent::Text { kind: 0x03, .. }))
    }

    /// Sort "rank" used to tiebreak events with equal timestamps: note-offs
    /// before note-ons before everything else (spec section 3).
    pub(crate) fn rank(&self) -> u8 {
        if self.is_note_off() {
            0
        } else if self.is_note_on() {
            2
        } else {
            1
        }
    }

    /// Set the channel nibble of a channel event's status byte in place,
    /// used by `TrackData::put_track` when a track is not in free-channel mode.
    pub(crate) fn overwrite_channel(&mut self, channel: Channel) {
        if let EventBody::Channel(c) = &mut self.body {
            c.channel = channel;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(ts: Pulse, note: u8, vel: u8) -> Event {
        Event::channel(
            ts,
            ChannelEvent {
                status: StatusType::NoteOn,
                channel: Channel::new(0),
                data1: U7::new(note),
                data2: U7::new(vel),
            },
        )
    }

    #[test]
    fn note_on_velocity_zero_is_a_note_off() {
        let e = note_on(0, 60, 0);
        assert!(e.is_note_off());
        assert!(!e.is_note_on());
    }

    #[test]
    fn rank_orders_offs_before_ons_at_same_time() {
        let off = note_on(0, 60, 0);
        let on = note_on(0, 60, 64);
        assert!(off.rank() < on.rank());
    }

    #[test]
    fn meta_kind_byte_round_trips_through_variant() {
        let m = MetaEvent::SetTempo(500_000);
        assert_eq!(0x51, m.kind_byte());
    }
}
