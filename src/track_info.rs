//! `TrackInfo`: metadata extracted from a track during parse (spec section 3).

use crate::types::{Pulse, FREE_CHANNEL};

#[derive(Clone, Debug)]
pub struct TempoInfo {
    pub us_per_quarter_note: u32,
}

impl Default for TempoInfo {
    fn default() -> Self {
        Self {
            us_per_quarter_note: 500_000,
        }
    }
}

impl TempoInfo {
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.us_per_quarter_note as f64
    }

    pub fn from_bpm(bpm: f64) -> Self {
        Self {
            us_per_quarter_note: (60_000_000.0 / bpm).round() as u32,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TimeSigInfo {
    pub numerator: u8,
    pub denominator_pow2: u8,
    pub clocks_per_metronome: u8,
    pub notated_32nds_per_quarter: u8,
}

impl Default for TimeSigInfo {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator_pow2: 2,
            clocks_per_metronome: 24,
            notated_32nds_per_quarter: 8,
        }
    }
}

impl TimeSigInfo {
    pub fn denominator(&self) -> u32 {
        1u32 << self.denominator_pow2
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct KeySigInfo {
    pub sharps_flats: i8,
    pub minor: bool,
}

/// Metadata extracted while parsing a single MTrk chunk.
#[derive(Clone, Debug)]
pub struct TrackInfo {
    pub name: String,
    /// Nominal channel for this track, or [`FREE_CHANNEL`] to mean "each
    /// event keeps its own channel" (spec section 3).
    pub channel: u8,
    /// Nominal output bus index.
    pub bus: u32,
    pub tempo: TempoInfo,
    pub time_sig: TimeSigInfo,
    pub key_sig: KeySigInfo,
    /// Track length in pulses, normally the timestamp of the last event.
    pub length: Pulse,
}

impl Default for TrackInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            channel: FREE_CHANNEL,
            bus: 0,
            tempo: TempoInfo::default(),
            time_sig: TimeSigInfo::default(),
            key_sig: KeySigInfo::default(),
            length: 0,
        }
    }
}

impl TrackInfo {
    pub fn is_free_channel(&self) -> bool {
        self.channel == FREE_CHANNEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_conversion_matches_spec_scenario() {
        let t = TempoInfo {
            us_per_quarter_note: 500_000,
        };
        assert!((t.bpm() - 120.0).abs() < 1e-9);
        let back = TempoInfo::from_bpm(60.0);
        assert_eq!(1_000_000, back.us_per_quarter_note);
    }

    #[test]
    fn time_signature_scenario_from_spec() {
        // FF 58 04 06 03 18 08 => 6/8, 24 clocks/metronome, 8 32nds/quarter
        let ts = TimeSigInfo {
            numerator: 6,
            denominator_pow2: 3,
            clocks_per_metronome: 0x18,
            notated_32nds_per_quarter: 8,
        };
        assert_eq!(8, ts.denominator());
        assert_eq!(24, ts.clocks_per_metronome);
    }
}
