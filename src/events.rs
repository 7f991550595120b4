use crate::frame::FrameNumber;

#[cfg(test)] use mockall::automock;

/// Diagnostic events emitted by a receiving endpoint for packets and frames it silently
///  discards. These mirror the `tracing` output and carry no protocol state - observing them
///  (or not) never changes what the endpoint does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// a datagram that was undersized, oversized or carried an inconsistent header
    MalformedPacket { datagram_len: usize },
    /// a packet of a frame older than the one under assembly
    StalePacket { frame_number: FrameNumber, current: FrameNumber },
    /// a packet whose (subframe, packet) slot was already filled
    DuplicatePacket { frame_number: FrameNumber, subframe_index: u8, packet_index: u16 },
    /// a packet whose payload does not fit the buffer sized by its advertised packet count
    PayloadOutOfBounds { frame_number: FrameNumber, subframe_index: u8, packet_index: u16 },
    /// a subframe that was still missing packets when its frame was superseded
    SubframeIncomplete { frame_number: FrameNumber, subframe_index: u8, collected_packets: u16, packet_count: u16 },
    /// a partially assembled frame discarded because a newer frame began
    FrameDiscarded { frame_number: FrameNumber, superseded_by: FrameNumber },
}

/// Optional observer for [ProtocolEvent]s, installed via `ReceiveEndPoint::with_observer`.
///  Implementations must be cheap - they run inline in the receive path.
#[cfg_attr(test, automock)]
pub trait EventObserver: Send + Sync + 'static {
    fn on_event(&self, event: ProtocolEvent);
}
