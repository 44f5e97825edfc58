//! The `Dummy` backend: a no-op `MidiApi` that always succeeds, used when a
//! platform backend is compiled out (spec section 9, "unreachable backends
//! are replaced by the Dummy backend").

use std::collections::VecDeque;

use crate::backend::{MidiApi, MidiMessage};
use crate::error::{self, LibResult};

#[derive(Default)]
pub struct Dummy {
    client_name: String,
    port_name: String,
    open: bool,
    queue: VecDeque<MidiMessage>,
}

impl Dummy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MidiApi for Dummy {
    fn open_port(&mut self, _index: usize, name: &str) -> LibResult<()> {
        self.port_name = name.to_string();
        self.open = true;
        Ok(())
    }

    fn open_virtual_port(&mut self, name: &str) -> LibResult<()> {
        self.port_name = name.to_string();
        self.open = true;
        Ok(())
    }

    fn close_port(&mut self) -> LibResult<()> {
        self.open = false;
        Ok(())
    }

    fn set_client_name(&mut self, name: &str) -> LibResult<()> {
        self.client_name = name.to_string();
        Ok(())
    }

    fn set_port_name(&mut self, name: &str) -> LibResult<()> {
        self.port_name = name.to_string();
        Ok(())
    }

    fn get_port_count(&self) -> usize {
        0
    }

    fn get_port_name(&self, index: usize) -> LibResult<String> {
        error::InvalidParameter {
            site: site!(),
            description: format!("dummy backend has no port {}", index),
        }
        .fail()
    }

    fn send_message(&mut self, _bytes: &[u8]) -> LibResult<()> {
        Ok(())
    }

    fn poll_for_midi(&mut self) -> usize {
        self.queue.len()
    }

    fn get_midi_event(&mut self) -> Option<MidiMessage> {
        self.queue.pop_front()
    }
}
