#![allow(dead_code)]

use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static LOGGER: Once = Once::new();

pub fn enable_logging() {
    LOGGER.call_once(logger_init)
}

fn logger_init() {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} {} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Warn)
        .init();
}

/// Builds a minimal-but-representative SMF byte buffer: one tempo track
/// (set-tempo + time-signature + a couple of channel 0 events) plus one
/// melody track on channel 1 using running status, at the given PPQN.
pub fn two_track_smf(ppqn: u16) -> Vec<u8> {
    let mut bytes = vec![0x4D, 0x54, 0x68, 0x64, 0, 0, 0, 6, 0, 1, 0, 2];
    bytes.extend_from_slice(&ppqn.to_be_bytes());

    let tempo_track: &[u8] = &[
        0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 120 bpm
        0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08, // 4/4
        0x00, 0x90, 0x3C, 0x40, // NoteOn ch0 60,64
        0x60, 0x3C, 0x00, // NoteOff (running status) ch0 60,0
        0x00, 0xFF, 0x2F, 0x00,
    ];
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(tempo_track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(tempo_track);

    let melody_track: &[u8] = &[
        0x00, 0x91, 0x40, 0x60, // NoteOn ch1 64,96
        0x30, 0x40, 0x00, // NoteOff (running status) ch1 64,0
        0x00, 0xFF, 0x2F, 0x00,
    ];
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(melody_track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(melody_track);

    bytes
}

/// A format-0 buffer with events interleaved across channels 0 and 2,
/// for exercising the splitter end to end.
pub fn format0_smf(ppqn: u16) -> Vec<u8> {
    let mut bytes = vec![0x4D, 0x54, 0x68, 0x64, 0, 0, 0, 6, 0, 0, 0, 1];
    bytes.extend_from_slice(&ppqn.to_be_bytes());

    let track: &[u8] = &[
        0x00, 0x90, 0x3C, 0x40, // NoteOn ch0 60,64
        0x00, 0x92, 0x43, 0x50, // NoteOn ch2 67,80
        0x10, 0x80, 0x3C, 0x00, // NoteOff ch0 60,0
        0x00, 0x82, 0x43, 0x00, // NoteOff ch2 67,0
        0x00, 0xFF, 0x2F, 0x00,
    ];
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(track);

    bytes
}

/// A track body with a truncated running-status data byte and no
/// end-of-track: the header is well-formed but the body is not.
pub fn truncated_smf() -> Vec<u8> {
    let mut bytes = vec![0x4D, 0x54, 0x68, 0x64, 0, 0, 0, 6, 0, 0, 0, 1, 0, 0x60];
    let track: &[u8] = &[0x00, 0x90, 0x3C];
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(track);
    bytes
}
