//! JACK transport synchronization (spec section 4.8/5), behind the
//! `jack-transport` feature. When the feature is off, `NullTransport`
//! stands in so `Player` never needs a second code path.

use crate::types::Pulse;

/// The slice of JACK transport state the output thread consults each
/// iteration: the transport-supplied tick, and whether JACK itself
/// reports "stopped" (which the output thread must notice and react to).
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportSample {
    pub current_tick: Pulse,
    pub stopped: bool,
}

/// A transport time source external to this engine. `Player` consults one
/// of these instead of its own microsecond clock when `TransportInfo`'s
/// timebase is `JackMaster`/`JackSlave`.
pub trait TransportSource: Send {
    fn sample(&mut self) -> TransportSample;
    fn set_ppqn_bpm(&mut self, ppqn: u32, bpm: f64);
}

/// Used whenever the `jack-transport` feature is not compiled in, or no
/// JACK client could be created; always reports "not running".
#[derive(Default)]
pub struct NullTransport;

impl TransportSource for NullTransport {
    fn sample(&mut self) -> TransportSample {
        TransportSample {
            current_tick: 0,
            stopped: true,
        }
    }

    fn set_ppqn_bpm(&mut self, _ppqn: u32, _bpm: f64) {}
}

#[cfg(feature = "jack-transport")]
pub use jack_backed::JackTransport;

#[cfg(feature = "jack-transport")]
mod jack_backed {
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
    use std::sync::Arc;

    use jack::{Client, ClientOptions};

    use super::{TransportSample, TransportSource};
    use crate::error::{self, LibResult};

    struct Shared {
        tick: AtomicI64,
        stopped: AtomicBool,
        ppqn: AtomicU32,
    }

    /// A JACK-transport-driven time source: `Client::transport_query` is
    /// polled from `sample`, converting JACK frame/BBT position into
    /// pulses using the PPQN last set via `set_ppqn_bpm`.
    pub struct JackTransport {
        client: Client,
        shared: Arc<Shared>,
    }

    impl JackTransport {
        pub fn connect(client_name: &str) -> LibResult<Self> {
            let (client, _status) = Client::new(client_name, ClientOptions::NO_START_SERVER)
                .map_err(|e| error::LibError::BackendError {
                    site: site!(),
                    backend: "jack".into(),
                    description: e.to_string(),
                })?;
            Ok(Self {
                client,
                shared: Arc::new(Shared {
                    tick: AtomicI64::new(0),
                    stopped: AtomicBool::new(true),
                    ppqn: AtomicU32::new(192),
                }),
            })
        }
    }

    impl TransportSource for JackTransport {
        fn sample(&mut self) -> TransportSample {
            let (state, pos) = self.client.transport_query();
            let running = state == jack::TransportState::Rolling;
            self.shared.stopped.store(!running, Ordering::Release);
            let ppqn = self.shared.ppqn.load(Ordering::Acquire) as f64;
            let tick = if let Some(bbt) = pos.bbt() {
                let beats = (bbt.bar.saturating_sub(1)) as f64 * bbt.sig_num as f64
                    + (bbt.beat.saturating_sub(1)) as f64;
                (beats * ppqn) as i64 + bbt.tick as i64
            } else {
                0
            };
            self.shared.tick.store(tick, Ordering::Release);
            TransportSample {
                current_tick: tick,
                stopped: !running,
            }
        }

        fn set_ppqn_bpm(&mut self, ppqn: u32, _bpm: f64) {
            self.shared.ppqn.store(ppqn, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_transport_always_reports_stopped() {
        let mut t = NullTransport;
        let sample = t.sample();
        assert!(sample.stopped);
        assert_eq!(0, sample.current_tick);
    }
}
