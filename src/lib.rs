#![allow(dead_code)]

//! A realtime MIDI engine and Standard MIDI File library.
//!
//! The public surface splits between the file codec (parse/write Standard
//! MIDI Files: `file`, `track_data`, `splitter`) and the realtime engine
//! (`player`, `master_bus`, `backend`). Errors are `snafu`-structured and
//! tagged with call-site locations (`error::Error`/`error::Result`); the rest
//! of the crate logs at the density each layer calls for via the `log` crate.

#[macro_use]
mod error;
#[macro_use]
mod clamp;

pub mod byte_cursor;
pub mod event;
pub mod event_list;
pub mod file;
pub mod splitter;
pub mod track;
pub mod track_data;
pub mod track_info;
pub mod track_list;
pub mod types;
pub mod varinum;

pub mod backend;
pub mod io_thread;
pub mod jack_transport;
pub mod master_bus;
pub mod player;
pub mod transport;

pub use error::{Error, Result};

pub use event::{ChannelEvent, Event, EventBody, MetaEvent, SysexEvent};
pub use event_list::EventList;
pub use file::{File, Format};
pub use master_bus::MasterBus;
pub use player::Player;
pub use splitter::split;
pub use track::{RecordingType, Track};
pub use track_data::RunningStatusPolicy;
pub use track_info::{KeySigInfo, TempoInfo, TimeSigInfo, TrackInfo};
pub use track_list::TrackList;
pub use transport::{ClockInfo, ClockMode, TransportInfo};
pub use types::{Channel, KeyAccidentals, Ppqn, Pulse, StatusType, U7};
