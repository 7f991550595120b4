//! A minimal-latency streaming protocol for frame-structured payloads over UDP. Logical
//!  *frames* - each composed of up to three positional *subframes* - are fragmented by the
//!  sender into MTU-sized datagrams and reassembled by the receiver with no acknowledgements,
//!  no retransmission, and no buffering beyond a single frame.
//!
//! ## Design goals
//!
//! * Latency over reliability: a frame that cannot be completed is worthless once its successor
//!   exists, so the receiver never waits for retransmission - it drops partial frames the
//!   moment a newer frame begins and hands complete frames to the application immediately.
//!   * This fits payloads where the source keeps producing fresh frames (e.g. live video or
//!     sensor capture) and a stale frame has no value.
//! * Tolerate mild reordering: packets of the *current* frame may arrive in any order; packets
//!   of older frames are discarded.
//! * One frame in flight on the receive side: reassembly state is a single frame's worth of
//!   buffers, grown on demand and reused across frames - a long-running receiver stops
//!   allocating once it has seen its largest frame.
//! * Zero-copy discipline: the sender copies each payload byte exactly once (caller's buffer
//!   into the scratch datagram); the receiver hands out completed frames as borrowed views into
//!   its reassembly buffers, with the borrow checker enforcing the single-consumer window.
//! * Strictly sequential endpoints: no background tasks, no shared state, no locks. Two
//!   endpoints on two tasks never interfere.
//!
//! Explicitly *not* goals: acknowledgements or retransmission, forward error correction,
//!  cross-frame ordering beyond monotonic advance, congestion control, encryption or
//!  authentication, and compatibility with RTP-family protocols.
//!
//! ## Wire format
//!
//! Every datagram is one *packet*: an 8-byte header followed by up to 1400 payload bytes, so a
//!  full packet stays inside a typical IPv4 MTU without IP-level fragmentation. All multi-byte
//!  header fields are little-endian:
//!
//! ```ascii
//! 0: frame number (u16) - id of the enclosing frame; senders increment it per frame
//! 2: subframes (u8) - how many subframes the enclosing frame carries (1..=3)
//! 3: subframe (u8) - 0-based index of the subframe this packet belongs to
//! 4: packets (u16) - how many packets the (frame, subframe) group carries
//! 6: packet (u16) - 0-based index of this packet within its group
//! ```
//!
//! The payload length is implicit in the datagram length. Within a group, every packet except
//!  the last carries exactly 1400 bytes; the last carries the remainder. A zero-length subframe
//!  is transmitted as one empty packet so that its existence registers at the receiver.
//!
//! ## Receiver behavior
//!
//! The receiver tracks exactly one frame number at a time. For each arriving packet, in order:
//!  malformed headers are dropped; packets of older frames are dropped; a packet of a *newer*
//!  frame advances the receiver to it, unconditionally discarding the current frame's partial
//!  progress; duplicates (by per-packet received flags) are dropped; everything else is copied
//!  into the subframe's reassembly buffer at its packet offset. When every advertised subframe
//!  is complete, the frame is emitted - exactly once.
//!
//! A receive timeout, if configured, surfaces as a regular event rather than an error; the
//!  intended reaction is [end_point::ReceiveEndPoint::receive_reset], which re-arms the
//!  receiver to accept any frame number as the start of a fresh stream (e.g. after a sender
//!  restart).
//!
//! ## Related
//!
//! * RTP: also favors freshness over reliability, but carries timestamps, SSRCs and codec
//!   payload typing - this protocol deliberately leaves payload semantics to the application
//!   and does not interoperate.
//! * QUIC / reliable-UDP designs: retransmission and ordering machinery is exactly what this
//!   protocol trades away for minimal latency on the freshest frame.

pub mod config;
pub mod end_point;
pub mod events;
pub mod frame;
mod packet_header;
mod receive_stream;
pub mod safe_converter;
mod send_pipeline;
