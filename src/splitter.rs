//! SMF 0 → SMF 1 channel splitting (spec section 4.4).

use crate::event::EventBody;
use crate::event_list::EventList;
use crate::track::Track;
use crate::track_info::TrackInfo;
use crate::types::FREE_CHANNEL;

/// Split a single multi-channel track into one track per channel that
/// carries events, followed by the original track with its channel set to
/// the free-channel sentinel. Meta/SysEx events are duplicated only into
/// the channel-0 track (spec section 9's open-question resolution: metas
/// stay with track 0, never migrate to the channel they happen to prefix).
pub fn split(original: &Track) -> Vec<Track> {
    let events = original.events();
    let mut channels_present: Vec<u8> = Vec::new();
    for event in events.iter() {
        if let Some(channel) = event.channel_number() {
            let c = channel.get();
            if !channels_present.contains(&c) {
                channels_present.push(c);
            }
        }
    }
    channels_present.sort_unstable();

    let mut result = Vec::with_capacity(channels_present.len() + 1);
    for &channel in &channels_present {
        let mut list = EventList::new();
        for event in events.iter() {
            let belongs = match &event.body {
                EventBody::Channel(c) => c.channel.get() == channel,
                EventBody::Meta(_) | EventBody::Sysex(_) => channel == 0,
            };
            if belongs {
                list.append(event.clone());
            }
        }
        list.sort();
        let length = list.length();
        let mut info = TrackInfo::default();
        info.channel = channel;
        info.length = length;
        result.push(Track::new(None, list, info));
    }

    let mut preserved_info = original.info().clone();
    preserved_info.channel = FREE_CHANNEL;
    result.push(Track::new(
        original.track_number(),
        original.events().clone(),
        preserved_info,
    ));
    result
}

/// When splitting is disabled, the caller keeps the original track as-is
/// but still switches it to free-channel mode.
pub fn keep_unsplit(original: &Track) -> Track {
    let mut info = original.info().clone();
    info.channel = FREE_CHANNEL;
    Track::new(original.track_number(), original.events().clone(), info)
}
