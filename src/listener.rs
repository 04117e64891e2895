use crate::error::CaptureError;
use crate::parser;
use crate::reporter::EventSink;
use crate::socket::DatagramSource;

use log::{debug, info};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Running,
    Stopped,
}

/// Counters for one capture run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub datagrams: u64,
    pub malformed: u64,
    pub icmp: u64,
}

pub struct PacketListener<S, R> {
    source: S,
    sink: R,
    buffer: Vec<u8>,
    state: CaptureState,
    stats: CaptureStats,
}

impl<S: DatagramSource, R: EventSink> PacketListener<S, R> {

    pub fn new(source: S, sink: R, buffer_size: usize) -> PacketListener<S, R> {
        PacketListener {
            source,
            sink,
            buffer: vec![0u8; buffer_size],
            state: CaptureState::Idle,
            stats: CaptureStats::default(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// Receives and reports datagrams one at a time until the capture ends.
    ///
    /// There is no normal completion, so the reason the capture ended is
    /// returned: `CaptureError::Interrupted` for an operator stop,
    /// `CaptureError::Receive` for any other receive failure. Malformed
    /// datagrams are skipped.
    pub fn run(&mut self) -> CaptureError {
        self.state = CaptureState::Running;
        debug!("Listening for IP datagrams...");

        let reason = loop {
            match self.source.recv(&mut self.buffer) {
                Ok(len) => self.handle_datagram(len),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => break CaptureError::Interrupted,
                Err(e) => break CaptureError::Receive(e),
            }
        };

        self.state = CaptureState::Stopped;
        info!(
            "Capture stopped after {} datagrams ({} ICMP, {} malformed)",
            self.stats.datagrams, self.stats.icmp, self.stats.malformed
        );
        reason
    }

    fn handle_datagram(&mut self, len: usize) {
        self.stats.datagrams += 1;

        let len = len.min(self.buffer.len());
        let packet = match parser::parse(&self.buffer[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed += 1;
                debug!("Skipping datagram: {}", e);
                return;
            }
        };

        if packet.icmp.is_some() {
            self.stats.icmp += 1;
        }
        for event in packet.into_events() {
            self.sink.emit(event);
        }
    }
}
