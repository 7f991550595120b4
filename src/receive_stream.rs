use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::events::{EventObserver, ProtocolEvent};
use crate::frame::{FrameNumber, FrameRef, MAX_SUBFRAMES};
use crate::packet_header::{PacketHeader, PACKET_MAX_PAYLOAD};
use crate::safe_converter::{PrecheckedCast, SafeCast};

/// Tail slack behind every reassembled subframe: downstream parsers (e.g. bitstream decoders)
///  may overread the end of a payload by a bounded amount without triggering a copy into a
///  larger buffer first.
pub const BUFFER_PADDING: usize = 32;

/// What happened to a packet offered to a [SubframeBuffer].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Deposit {
    Accepted,
    Duplicate,
    OutOfBounds,
}

/// Reassembly slot for one subframe: a payload buffer addressed in packet-sized strides plus
///  per-packet received flags. Storage only ever grows - a frame needing less than a
///  predecessor reuses the existing allocations in place.
pub struct SubframeBuffer {
    payload: Vec<u8>,
    received: Vec<bool>,
    packet_count: u16,
    collected_packets: u16,
    actual_size: usize,
}

impl SubframeBuffer {
    fn new() -> SubframeBuffer {
        SubframeBuffer {
            payload: Vec::new(),
            received: Vec::new(),
            packet_count: 0,
            collected_packets: 0,
            actual_size: 0,
        }
    }

    /// the deposit-addressable prefix of the payload buffer
    fn reserved(&self) -> usize {
        self.packet_count.safe_cast() * PACKET_MAX_PAYLOAD
    }

    /// Sizes the slot for a subframe of `packet_count` packets, growing storage if the current
    ///  allocation is too small and releasing the old one in that case. Flags and progress
    ///  counters start over either way.
    pub fn prepare(&mut self, packet_count: u16) {
        let needed = packet_count.safe_cast() * PACKET_MAX_PAYLOAD + BUFFER_PADDING;
        if self.payload.len() < needed {
            self.payload = vec![0; needed];
        }
        if self.received.len() < packet_count.safe_cast() {
            self.received = vec![false; packet_count.safe_cast()];
        }
        else {
            self.received.fill(false);
        }

        self.packet_count = packet_count;
        self.collected_packets = 0;
        self.actual_size = 0;
    }

    /// forgets all progress while keeping the allocations for reuse
    pub fn clear(&mut self) {
        self.packet_count = 0;
        self.collected_packets = 0;
        self.actual_size = 0;
        self.received.fill(false);
    }

    pub fn deposit(&mut self, packet_index: u16, payload: &[u8]) -> Deposit {
        if packet_index >= self.packet_count {
            return Deposit::OutOfBounds;
        }
        let offset = packet_index.safe_cast() * PACKET_MAX_PAYLOAD;
        if offset + payload.len() > self.reserved() {
            return Deposit::OutOfBounds;
        }
        if self.received[packet_index.safe_cast()] {
            return Deposit::Duplicate;
        }

        self.payload[offset..offset + payload.len()].copy_from_slice(payload);
        self.received[packet_index.safe_cast()] = true;
        self.collected_packets += 1;
        self.actual_size += payload.len();

        Deposit::Accepted
    }

    pub fn is_prepared(&self) -> bool {
        self.packet_count > 0
    }

    pub fn is_complete(&self) -> bool {
        self.packet_count > 0 && self.collected_packets == self.packet_count
    }

    pub fn packet_count(&self) -> u16 {
        self.packet_count
    }

    pub fn collected_packets(&self) -> u16 {
        self.collected_packets
    }

    /// the reassembled bytes collected so far, in packet order
    pub fn assembled_payload(&self) -> &[u8] {
        &self.payload[..self.actual_size]
    }
}


/// The receiver-side state machine: collects the packets of the single frame currently under
///  assembly, detects the transition to a newer frame (unconditionally discarding partial
///  progress), rejects stale and duplicate packets, and reports when all advertised subframes
///  are complete.
pub struct FrameAssembly {
    current_frame: FrameNumber,
    subframes: [SubframeBuffer; MAX_SUBFRAMES],
    completed_subframes: [bool; MAX_SUBFRAMES],
    observer: Option<Arc<dyn EventObserver>>,
}

impl FrameAssembly {
    pub fn new() -> FrameAssembly {
        FrameAssembly {
            current_frame: FrameNumber::ZERO,
            subframes: std::array::from_fn(|_| SubframeBuffer::new()),
            completed_subframes: [false; MAX_SUBFRAMES],
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Arc<dyn EventObserver>) {
        self.observer = Some(observer);
    }

    pub fn emit(&self, event: ProtocolEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }

    pub fn current_frame(&self) -> FrameNumber {
        self.current_frame
    }

    /// Feeds one decoded packet into the assembly. Returns `true` when this packet completes
    ///  the frame under assembly, i.e. every subframe the header advertises is fully collected;
    ///  the caller then materializes the result via [Self::completed_frame]. Packets that are
    ///  stale, duplicated or inconsistent with the advertised packet count are dropped here and
    ///  never complete anything.
    pub fn on_packet(&mut self, header: &PacketHeader, payload: &[u8]) -> bool {
        if header.frame_number < self.current_frame {
            debug!("received packet for old frame {} while assembling frame {} - ignoring", header.frame_number, self.current_frame);
            self.emit(ProtocolEvent::StalePacket {
                frame_number: header.frame_number,
                current: self.current_frame,
            });
            return false;
        }

        if header.frame_number > self.current_frame {
            self.switch_to(header.frame_number);
        }

        let subframe_index = header.subframe_index.safe_cast();
        if self.subframes[subframe_index].packet_count() != header.packet_count {
            self.subframes[subframe_index].prepare(header.packet_count);
        }

        match self.subframes[subframe_index].deposit(header.packet_index, payload) {
            Deposit::Duplicate => {
                debug!("duplicate of packet {}/{} for subframe {} of frame {} - ignoring",
                    header.packet_index, header.packet_count, header.subframe_index, header.frame_number);
                self.emit(ProtocolEvent::DuplicatePacket {
                    frame_number: header.frame_number,
                    subframe_index: header.subframe_index,
                    packet_index: header.packet_index,
                });
                return false;
            }
            Deposit::OutOfBounds => {
                warn!("packet {} of subframe {} of frame {} does not fit a buffer of {} packets - ignoring",
                    header.packet_index, header.subframe_index, header.frame_number, header.packet_count);
                self.emit(ProtocolEvent::PayloadOutOfBounds {
                    frame_number: header.frame_number,
                    subframe_index: header.subframe_index,
                    packet_index: header.packet_index,
                });
                return false;
            }
            Deposit::Accepted => {}
        }

        if self.subframes[subframe_index].is_complete() && !self.completed_subframes[subframe_index] {
            trace!("subframe {} of frame {} complete: {} packets, {} bytes",
                header.subframe_index, header.frame_number,
                header.packet_count, self.subframes[subframe_index].actual_size);
            self.completed_subframes[subframe_index] = true;
        }

        let num_completed = self.completed_subframes.iter().filter(|&&c| c).count();
        num_completed == header.subframe_count.safe_cast()
    }

    /// The just-completed frame as a borrowed view into the reassembly buffers. Only meaningful
    ///  directly after [Self::on_packet] returned `true` for a header with this subframe count.
    pub fn completed_frame(&self, subframe_count: u8) -> FrameRef<'_> {
        let mut parts: [&[u8]; MAX_SUBFRAMES] = [&[]; MAX_SUBFRAMES];
        for (index, part) in parts.iter_mut().enumerate().take(subframe_count.safe_cast()) {
            *part = self.subframes[index].assembled_payload();
        }

        FrameRef::new(self.current_frame, parts, subframe_count.safe_cast())
    }

    /// Returns to the pre-first-packet state: the next packet is accepted as the start of a new
    ///  stream regardless of its frame number. Buffer allocations are retained.
    pub fn reset(&mut self) {
        debug!("resetting reassembly state");
        self.current_frame = FrameNumber::ZERO;
        self.completed_subframes = [false; MAX_SUBFRAMES];
        for slot in &mut self.subframes {
            slot.clear();
        }
    }

    /// Only one frame is ever under assembly: advancing to a newer frame drops whatever the
    ///  previous frame had collected.
    fn switch_to(&mut self, new_frame: FrameNumber) {
        let mut discarded_progress = false;
        for index in 0..MAX_SUBFRAMES {
            let slot = &self.subframes[index];
            if slot.is_prepared() && !self.completed_subframes[index] {
                warn!("frame {} superseded by frame {} with subframe {} incomplete ({} of {} packets) - discarding",
                    self.current_frame, new_frame, index, slot.collected_packets(), slot.packet_count());
                self.emit(ProtocolEvent::SubframeIncomplete {
                    frame_number: self.current_frame,
                    subframe_index: index.prechecked_cast(),
                    collected_packets: slot.collected_packets(),
                    packet_count: slot.packet_count(),
                });
                discarded_progress = true;
            }
        }
        if discarded_progress {
            self.emit(ProtocolEvent::FrameDiscarded {
                frame_number: self.current_frame,
                superseded_by: new_frame,
            });
        }

        self.completed_subframes = [false; MAX_SUBFRAMES];
        for slot in &mut self.subframes {
            slot.clear();
        }
        self.current_frame = new_frame;
    }
}
