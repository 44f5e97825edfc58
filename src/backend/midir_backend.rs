//! Cross-platform `MidiApi` backed by the `midir` crate (spec section 4.7),
//! grounded on `AlexCharlton-midi-msg`'s `MidiConnection` impl for
//! `midir::MidiOutputConnection` -- generalized from a one-shot `write` into
//! full port lifecycle management plus callback-driven input.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::warn;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::backend::{MidiApi, MidiMessage, DEFAULT_CLIENT_NAME};
use crate::error::{self, LibResult};

type InputQueue = Arc<Mutex<VecDeque<MidiMessage>>>;

/// A `midir`-backed output port. Input is handled by `MidirInput`; the two
/// are kept separate because `midir` models them as distinct connection
/// types, matching the read/write split the spec's `MidiApi` contract
/// allows a backend to implement however it likes internally.
pub struct MidirOutput {
    client_name: String,
    connection: Option<MidiOutputConnection>,
    port_count: usize,
}

impl MidirOutput {
    pub fn new() -> LibResult<Self> {
        let port = MidiOutput::new(DEFAULT_CLIENT_NAME).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
        })?;
        let port_count = port.ports().len();
        Ok(Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            connection: None,
            port_count,
        })
    }
}

impl MidiApi for MidirOutput {
    fn open_port(&mut self, index: usize, name: &str) -> LibResult<()> {
        let midi_out = MidiOutput::new(&self.client_name).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
        })?;
        let ports = midi_out.ports();
        let port = ports.get(index).ok_or_else(|| error::LibError::InvalidParameter {
            site: site!(),
            description: format!("no output port at index {}", index),
        })?;
        let connection = midi_out.connect(port, name).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
        })?;
        self.connection = Some(connection);
        Ok(())
    }

    fn open_virtual_port(&mut self, name: &str) -> LibResult<()> {
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let midi_out = MidiOutput::new(&self.client_name).map_err(|e| {
                error::LibError::BackendError {
                    site: site!(),
                    backend: "midir".into(),
                    description: e.to_string(),
                }
            })?;
            let connection = midi_out.create_virtual(name).map_err(|e| {
                error::LibError::BackendError {
                    site: site!(),
                    backend: "midir".into(),
                    description: e.to_string(),
                }
            })?;
            self.connection = Some(connection);
            Ok(())
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        {
            let _ = name;
            error::Unimplemented {
                site: site!(),
                description: "virtual ports are not supported on this platform".to_string(),
            }
            .fail()
        }
    }

    fn close_port(&mut self) -> LibResult<()> {
        self.connection = None;
        Ok(())
    }

    fn set_client_name(&mut self, name: &str) -> LibResult<()> {
        self.client_name = name.to_string();
        Ok(())
    }

    fn set_port_name(&mut self, _name: &str) -> LibResult<()> {
        // midir has no post-connect rename; renaming requires reopening.
        error::Unimplemented {
            site: site!(),
            description: "renaming an open midir port requires reopening it".to_string(),
        }
        .fail()
    }

    fn get_port_count(&self) -> usize {
        self.port_count
    }

    fn get_port_name(&self, index: usize) -> LibResult<String> {
        let midi_out = MidiOutput::new(&self.client_name).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
        })?;
        let ports = midi_out.ports();
        let port = ports.get(index).ok_or_else(|| error::LibError::InvalidParameter {
            site: site!(),
            description: format!("no output port at index {}", index),
        })?;
        midi_out.port_name(port).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
            .into()
        })
    }

    fn send_message(&mut self, bytes: &[u8]) -> LibResult<()> {
        match &mut self.connection {
            Some(conn) => conn.send(bytes).map_err(|e| {
                error::LibError::BackendError {
                    site: site!(),
                    backend: "midir".into(),
                    description: e.to_string(),
                }
                .into()
            }),
            None => error::InvalidParameter {
                site: site!(),
                description: "send_message called with no open port".to_string(),
            }
            .fail(),
        }
    }

    fn poll_for_midi(&mut self) -> usize {
        0
    }

    fn get_midi_event(&mut self) -> Option<MidiMessage> {
        None
    }
}

/// A `midir`-backed input port. The callback midir drives on its own
/// thread timestamps each message against its first arrival and pushes it
/// into a bounded FIFO the engine's input thread drains via `poll_for_midi`
/// / `get_midi_event` (spec section 4.7's input-callback contract).
pub struct MidirInput {
    client_name: String,
    connection: Option<MidiInputConnection<()>>,
    queue: InputQueue,
    epoch: Arc<Mutex<Option<Instant>>>,
    port_count: usize,
    max_queue_len: usize,
}

impl MidirInput {
    pub fn new() -> LibResult<Self> {
        let port = MidiInput::new(DEFAULT_CLIENT_NAME).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
        })?;
        let port_count = port.ports().len();
        Ok(Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            connection: None,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            epoch: Arc::new(Mutex::new(None)),
            port_count,
            max_queue_len: 4096,
        })
    }

    fn connect(&mut self, midi_in: MidiInput, port: &midir::MidiInputPort, name: &str) -> LibResult<()> {
        let queue = Arc::clone(&self.queue);
        let epoch = Arc::clone(&self.epoch);
        let max_len = self.max_queue_len;
        let connection = midi_in
            .connect(
                port,
                name,
                move |_stamp_us, bytes, _| {
                    let now = Instant::now();
                    let mut epoch_guard = epoch.lock().unwrap();
                    let since = match *epoch_guard {
                        Some(start) => now.duration_since(start).as_secs_f64(),
                        None => {
                            *epoch_guard = Some(now);
                            0.0
                        }
                    };
                    drop(epoch_guard);
                    let mut q = queue.lock().unwrap();
                    if q.len() >= max_len {
                        warn!("midir input queue overflow; dropping oldest message");
                        q.pop_front();
                    }
                    q.push_back(MidiMessage {
                        bytes: bytes.to_vec(),
                        timestamp: since,
                    });
                },
                (),
            )
            .map_err(|e| error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            })?;
        self.connection = Some(connection);
        Ok(())
    }
}

impl MidiApi for MidirInput {
    fn open_port(&mut self, index: usize, name: &str) -> LibResult<()> {
        let midi_in = MidiInput::new(&self.client_name).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
        })?;
        let port = midi_in
            .ports()
            .get(index)
            .cloned()
            .ok_or_else(|| error::LibError::InvalidParameter {
                site: site!(),
                description: format!("no input port at index {}", index),
            })?;
        self.connect(midi_in, &port, name)
    }

    fn open_virtual_port(&mut self, name: &str) -> LibResult<()> {
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let midi_in = MidiInput::new(&self.client_name).map_err(|e| {
                error::LibError::BackendError {
                    site: site!(),
                    backend: "midir".into(),
                    description: e.to_string(),
                }
            })?;
            let queue = Arc::clone(&self.queue);
            let epoch = Arc::clone(&self.epoch);
            let max_len = self.max_queue_len;
            let connection = midi_in
                .create_virtual(
                    name,
                    move |_stamp_us, bytes, _| {
                        let now = Instant::now();
                        let mut epoch_guard = epoch.lock().unwrap();
                        let since = match *epoch_guard {
                            Some(start) => now.duration_since(start).as_secs_f64(),
                            None => {
                                *epoch_guard = Some(now);
                                0.0
                            }
                        };
                        drop(epoch_guard);
                        let mut q = queue.lock().unwrap();
                        if q.len() >= max_len {
                            q.pop_front();
                        }
                        q.push_back(MidiMessage {
                            bytes: bytes.to_vec(),
                            timestamp: since,
                        });
                    },
                    (),
                )
                .map_err(|e| error::LibError::BackendError {
                    site: site!(),
                    backend: "midir".into(),
                    description: e.to_string(),
                })?;
            self.connection = Some(connection);
            Ok(())
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        {
            let _ = name;
            error::Unimplemented {
                site: site!(),
                description: "virtual ports are not supported on this platform".to_string(),
            }
            .fail()
        }
    }

    fn close_port(&mut self) -> LibResult<()> {
        self.connection = None;
        self.queue.lock().unwrap().clear();
        *self.epoch.lock().unwrap() = None;
        Ok(())
    }

    fn set_client_name(&mut self, name: &str) -> LibResult<()> {
        self.client_name = name.to_string();
        Ok(())
    }

    fn set_port_name(&mut self, _name: &str) -> LibResult<()> {
        error::Unimplemented {
            site: site!(),
            description: "renaming an open midir port requires reopening it".to_string(),
        }
        .fail()
    }

    fn get_port_count(&self) -> usize {
        self.port_count
    }

    fn get_port_name(&self, index: usize) -> LibResult<String> {
        let midi_in = MidiInput::new(&self.client_name).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
        })?;
        let ports = midi_in.ports();
        let port = ports.get(index).ok_or_else(|| error::LibError::InvalidParameter {
            site: site!(),
            description: format!("no input port at index {}", index),
        })?;
        midi_in.port_name(port).map_err(|e| {
            error::LibError::BackendError {
                site: site!(),
                backend: "midir".into(),
                description: e.to_string(),
            }
            .into()
        })
    }

    fn send_message(&mut self, _bytes: &[u8]) -> LibResult<()> {
        error::Unimplemented {
            site: site!(),
            description: "an input port cannot send messages".to_string(),
        }
        .fail()
    }

    fn poll_for_midi(&mut self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn get_midi_event(&mut self) -> Option<MidiMessage> {
        self.queue.lock().unwrap().pop_front()
    }
}
