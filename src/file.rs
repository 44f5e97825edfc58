//! `File`: reads and writes the MThd header and delegates each MTrk chunk
//! to `track_data` (spec section 4.5).

use log::debug;

use crate::byte_cursor::ByteCursor;
use crate::error::{self, LibResult, Result};
use crate::splitter;
use crate::track::Track;
use crate::track_data::{self, RunningStatusPolicy};
use crate::track_info::TrackInfo;
use crate::types::Ppqn;

/// SMF format word. Format 2 is rejected (spec section 4.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum Format {
    Single = 0,
    Multi = 1,
}

impl Format {
    fn from_u16(value: u16) -> LibResult<Self> {
        match value {
            0 => Ok(Format::Single),
            1 => Ok(Format::Multi),
            2 => bad_format!("SMF format 2 is not supported"),
            other => bad_format!("unrecognized SMF format word {}", other),
        }
    }

    fn to_u16(self) -> u16 {
        self as u16
    }
}

const DIVISION_SMPTE_BIT: u16 = 0x8000;

/// A parsed Standard MIDI File: format, PPQN, and the resulting tracks.
pub struct File {
    pub format: Format,
    pub ppqn: Ppqn,
    pub tracks: Vec<Track>,
}

impl File {
    /// Parse a complete SMF byte buffer, splitting format-0 files into
    /// per-channel tracks plus the preserved original.
    pub fn parse(bytes: Vec<u8>, policy: RunningStatusPolicy, split: bool) -> Result<Self> {
        Ok(Self::parse_inner(bytes, policy, split)?)
    }

    fn parse_inner(bytes: Vec<u8>, policy: RunningStatusPolicy, split: bool) -> LibResult<Self> {
        let mut cursor = ByteCursor::from_bytes(bytes);
        if !cursor.expect_tag("MThd") {
            bad_format!("missing MThd header chunk");
        }
        let header_len = cursor.get_long();
        if header_len != 6 {
            bad_format!("MThd chunk length {} (expected 6)", header_len);
        }
        let format_word = cursor.get_short();
        let num_tracks = cursor.get_short();
        let division = cursor.get_short();
        if cursor.fatal() {
            truncated!("header chunk truncated: {}", cursor.error_message());
        }
        let format = Format::from_u16(format_word)?;
        if division & DIVISION_SMPTE_BIT != 0 {
            bad_format!("SMPTE time division is not supported");
        }
        let ppqn = Ppqn::new(division as u32);

        let mut tracks = Vec::new();
        let mut track_index: u16 = 0;
        loop {
            if track_index >= num_tracks {
                // Tolerate a trailing chunk header (e.g. sequencer-specific
                // MTrk some encoders append) by continuing one more time.
                if cursor.remaining() >= 8 && cursor.peek_at(0) == Some(b'M') {
                    debug!("trailing chunk found after advertised track count; reading it too");
                } else {
                    break;
                }
            }
            if cursor.remaining() < 8 {
                break;
            }
            if !cursor.expect_tag("MTrk") {
                bad_format!("expected MTrk chunk at track {}", track_index);
            }
            let chunk_len = cursor.get_long() as usize;
            if cursor.fatal() {
                truncated!("MTrk length field truncated");
            }
            let is_track_zero = track_index == 0;
            let parsed = track_data::parse_track(
                &mut cursor,
                chunk_len,
                track_index,
                policy,
                is_track_zero,
            )?;
            let track_number = parsed.track_number.unwrap_or(track_index);
            tracks.push(Track::new(Some(track_number), parsed.events, parsed.info));
            track_index += 1;
        }

        let tracks = if format == Format::Single {
            tracks
                .into_iter()
                .flat_map(|t| {
                    if split {
                        splitter::split(&t)
                    } else {
                        vec![splitter::keep_unsplit(&t)]
                    }
                })
                .collect()
        } else {
            tracks
        };

        debug!("parsed {:?} file with {} tracks, PPQN {}", format, tracks.len(), ppqn.get());
        Ok(Self {
            format,
            ppqn,
            tracks,
        })
    }

    /// Serialize this file back into MThd + MTrk bytes.
    pub fn write(&self) -> Result<Vec<u8>> {
        Ok(self.write_inner()?)
    }

    fn write_inner(&self) -> LibResult<Vec<u8>> {
        let mut cursor = ByteCursor::new();
        cursor.put_bytes(b"MThd");
        cursor.put_long(6);
        cursor.put_short(self.format.to_u16());
        cursor.put_short(self.tracks.len() as u16);
        cursor.put_short(self.ppqn.get() as u16);

        for (i, track) in self.tracks.iter().enumerate() {
            let mut body = ByteCursor::new();
            let is_tempo_track = i == 0;
            track_data::put_track(
                &mut body,
                track.events(),
                track.info(),
                track.track_number(),
                is_tempo_track,
            )?;
            let bytes = body.into_bytes();
            cursor.put_bytes(b"MTrk");
            cursor.put_long(bytes.len() as u32);
            cursor.put_bytes(&bytes);
        }
        Ok(cursor.into_bytes())
    }
}

/// Default `TrackInfo` used when a caller creates a track outside of parse.
pub fn new_track_info() -> TrackInfo {
    TrackInfo::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_smf1(ppqn: u16) -> Vec<u8> {
        let mut bytes = vec![0x4D, 0x54, 0x68, 0x64, 0, 0, 0, 6, 0, 1, 0, 1];
        bytes.extend_from_slice(&ppqn.to_be_bytes());
        let track_body: &[u8] = &[0x00, 0xFF, 0x2F, 0x00];
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track_body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(track_body);
        bytes
    }

    #[test]
    fn parses_header_scenario_from_spec() {
        let bytes = minimal_smf1(192);
        let file = File::parse(bytes, RunningStatusPolicy::Recover, true).unwrap();
        assert_eq!(Format::Multi, file.format);
        assert_eq!(192, file.ppqn.get());
        assert_eq!(1, file.tracks.len());
    }

    #[test]
    fn format_2_is_rejected() {
        let mut bytes = minimal_smf1(192);
        bytes[9] = 2;
        assert!(File::parse(bytes, RunningStatusPolicy::Recover, true).is_err());
    }

    #[test]
    fn smpte_division_is_rejected() {
        let mut bytes = minimal_smf1(0);
        let idx = bytes.len() - 2;
        bytes[idx] = 0xE2;
        bytes[idx + 1] = 0x28;
        assert!(File::parse(bytes, RunningStatusPolicy::Recover, true).is_err());
    }

    #[test]
    fn write_then_parse_round_trips_track_count_and_ppqn() {
        let bytes = minimal_smf1(96);
        let file = File::parse(bytes, RunningStatusPolicy::Recover, true).unwrap();
        let written = file.write().unwrap();
        let reparsed = File::parse(written, RunningStatusPolicy::Recover, true).unwrap();
        assert_eq!(96, reparsed.ppqn.get());
        assert_eq!(file.tracks.len(), reparsed.tracks.len());
    }
}
