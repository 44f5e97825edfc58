mod utils;

use pulseq::track_data::RunningStatusPolicy;
use pulseq::File;
use utils::{enable_logging, truncated_smf, two_track_smf};

/// After the first write a file gains synthesized metas (name, tempo,
/// time signature) that a hand-built fixture may have omitted or ordered
/// differently. From that point on, writing is a fixed point: re-parsing
/// and re-writing must reproduce the exact same bytes.
#[test]
fn write_reaches_a_byte_stable_fixed_point() {
    enable_logging();
    let bytes = two_track_smf(240);
    let file = File::parse(bytes, RunningStatusPolicy::Recover, true).unwrap();
    let once = file.write().unwrap();

    let reparsed = File::parse(once.clone(), RunningStatusPolicy::Recover, true).unwrap();
    let twice = reparsed.write().unwrap();

    assert_eq!(once.len(), twice.len());
    for (index, expected) in once.iter().enumerate() {
        assert_eq!(
            *expected,
            twice[index],
            "byte {} differs between first and second write",
            index
        );
    }
}

#[test]
fn tempo_and_meter_survive_a_round_trip() {
    enable_logging();
    let bytes = two_track_smf(144);
    let file = File::parse(bytes, RunningStatusPolicy::Recover, true).unwrap();
    let written = file.write().unwrap();
    let reparsed = File::parse(written, RunningStatusPolicy::Recover, true).unwrap();

    assert!((reparsed.tracks[0].info().tempo.bpm() - 120.0).abs() < 1e-6);
    assert_eq!(4, reparsed.tracks[0].info().time_sig.numerator);
    assert_eq!(4, reparsed.tracks[0].info().time_sig.denominator());
    assert_eq!(144, reparsed.ppqn.get());
}

#[test]
fn note_events_keep_their_timestamps_and_channels_across_a_round_trip() {
    enable_logging();
    let bytes = two_track_smf(192);
    let file = File::parse(bytes, RunningStatusPolicy::Recover, true).unwrap();
    let written = file.write().unwrap();
    let reparsed = File::parse(written, RunningStatusPolicy::Recover, true).unwrap();

    let melody: Vec<_> = reparsed.tracks[1]
        .events()
        .iter()
        .filter(|e| e.has_channel())
        .collect();
    assert_eq!(2, melody.len());
    assert_eq!(0, melody[0].timestamp);
    assert!(melody[0].is_note_on());
    assert_eq!(Some(1), melody[0].channel_number().map(|c| c.get()));
    assert_eq!(48, melody[1].timestamp);
    assert!(melody[1].is_note_off());
}

/// A track missing its end-of-track meta, with no recognizable status for
/// the trailing data byte, must be rejected rather than silently truncated.
#[test]
fn truncated_track_is_rejected() {
    enable_logging();
    let bytes = truncated_smf();
    assert!(File::parse(bytes, RunningStatusPolicy::Recover, true).is_err());
}

/// With `RunningStatusPolicy::Abort`, a data byte with no status in effect
/// fails the parse outright rather than guessing.
#[test]
fn abort_policy_rejects_data_byte_with_no_running_status() {
    enable_logging();
    let mut bytes = vec![0x4D, 0x54, 0x68, 0x64, 0, 0, 0, 6, 0, 0, 0, 1, 0, 0x60];
    let track: &[u8] = &[0x00, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00];
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(track);

    assert!(File::parse(bytes, RunningStatusPolicy::Abort, true).is_err());
}
