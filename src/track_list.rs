//! `TrackList`: the ordered collection of `Track`s owned by a `Player`
//! (spec section 3). Each track is independently owned but accessible by
//! shared reference so transient views (editors, exporters) can read a
//! track while the player mutates another.

use std::sync::{Arc, Mutex};

use crate::track::Track;

pub type SharedTrack = Arc<Mutex<Track>>;

#[derive(Default)]
pub struct TrackList {
    tracks: Vec<SharedTrack>,
}

impl TrackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Append a track, assigning it the next player index and returning
    /// that index.
    pub fn append(&mut self, mut track: Track) -> usize {
        let index = self.tracks.len();
        track.set_player_index(index);
        self.tracks.push(Arc::new(Mutex::new(track)));
        index
    }

    pub fn get(&self, index: usize) -> Option<SharedTrack> {
        self.tracks.get(index).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedTrack> {
        self.tracks.iter()
    }

    /// Clear the `modified` flag on every track.
    pub fn unmodify_all(&self) {
        for track in &self.tracks {
            track.lock().unwrap().unmodify();
        }
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_list::EventList;
    use crate::track_info::TrackInfo;

    #[test]
    fn append_assigns_ascending_player_indices() {
        let mut list = TrackList::new();
        let a = list.append(Track::new(None, EventList::new(), TrackInfo::default()));
        let b = list.append(Track::new(None, EventList::new(), TrackInfo::default()));
        assert_eq!(0, a);
        assert_eq!(1, b);
        assert_eq!(1, list.get(1).unwrap().lock().unwrap().player_index().unwrap());
    }

    #[test]
    fn unmodify_all_clears_every_track() {
        let mut list = TrackList::new();
        list.append(Track::new(None, EventList::new(), TrackInfo::default()));
        list.get(0).unwrap().lock().unwrap().set_recording(
            true,
            crate::track::RecordingType::Normal,
        );
        assert!(list.get(0).unwrap().lock().unwrap().modified());
        list.unmodify_all();
        assert!(!list.get(0).unwrap().lock().unwrap().modified());
    }
}
