use std::fmt::{Display, Formatter};

use anyhow::bail;

/// The maximum number of subframes a single frame can carry. The wire format reserves a full
///  byte for the subframe count, but the protocol deliberately keeps the limit small: subframes
///  are positional slots with application-defined meaning (e.g. video, audio, auxiliary data),
///  not a general container.
pub const MAX_SUBFRAMES: usize = 3;

/// The 16-bit id of a frame. Senders are expected to increment it once per frame; the receiver
///  uses it to separate packets of adjacent frames and to discard late stragglers.
///
/// Comparison is plain integer order, i.e. a stream wrapping past 65535 loses one frame until
///  the receiver is reset. See `receive_reset` for the recovery path.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FrameNumber(u16);

impl Display for FrameNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FrameNumber {
    pub const ZERO: FrameNumber = FrameNumber(0);

    pub fn from_raw(value: u16) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }

    pub fn next(&self) -> FrameNumber {
        FrameNumber(self.0.wrapping_add(1))
    }
}


/// A frame handed to a sending endpoint: a frame number plus one buffer per subframe. The
///  buffers are borrowed from the caller - the sender copies each of them exactly once, into
///  its scratch packet buffer, so the caller does not need to assemble subframes into a
///  contiguous region.
pub struct OutboundFrame<'a> {
    frame_number: FrameNumber,
    subframes: &'a [&'a [u8]],
}

impl<'a> OutboundFrame<'a> {
    pub fn new(frame_number: FrameNumber, subframes: &'a [&'a [u8]]) -> anyhow::Result<OutboundFrame<'a>> {
        if subframes.is_empty() {
            bail!("a frame must carry at least one subframe");
        }
        if subframes.len() > MAX_SUBFRAMES {
            bail!("a frame can carry at most {} subframes, got {}", MAX_SUBFRAMES, subframes.len());
        }
        for (index, subframe) in subframes.iter().enumerate() {
            if subframe.len() > u32::MAX as usize {
                bail!("subframe {} of {} bytes exceeds the wire limit", index, subframe.len());
            }
        }

        Ok(OutboundFrame {
            frame_number,
            subframes,
        })
    }

    pub fn frame_number(&self) -> FrameNumber {
        self.frame_number
    }

    pub fn subframes(&self) -> &'a [&'a [u8]] {
        self.subframes
    }
}


/// A completed frame as emitted by a receiving endpoint. This is a *view* into the endpoint's
///  reassembly buffers: it is valid until the next mutating call on the endpoint (notably the
///  next `receive`), which the borrow checker enforces. Callers that need to retain payload
///  bytes copy them out before receiving again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef<'a> {
    frame_number: FrameNumber,
    subframes: [&'a [u8]; MAX_SUBFRAMES],
    subframe_count: usize,
}

impl<'a> FrameRef<'a> {
    pub(crate) fn new(frame_number: FrameNumber, subframes: [&'a [u8]; MAX_SUBFRAMES], subframe_count: usize) -> FrameRef<'a> {
        FrameRef {
            frame_number,
            subframes,
            subframe_count,
        }
    }

    pub fn frame_number(&self) -> FrameNumber {
        self.frame_number
    }

    pub fn subframe_count(&self) -> usize {
        self.subframe_count
    }

    /// the payload of the subframe at `index`, or `None` at and above the frame's subframe count
    pub fn subframe(&self, index: usize) -> Option<&'a [u8]> {
        if index < self.subframe_count {
            Some(self.subframes[index])
        }
        else {
            None
        }
    }

    pub fn subframes(&self) -> &[&'a [u8]] {
        &self.subframes[..self.subframe_count]
    }
}


/// The outcome of a `receive` call that did not fail: either a completed frame or the
///  information that the configured receive timeout elapsed without a datagram. A timeout is
///  not an error - it is the regular signal that the remote is quiet, and the intended cue
///  for the caller to consider a `receive_reset`.
#[derive(Debug)]
pub enum ReceiveEvent<'a> {
    Frame(FrameRef<'a>),
    Timeout,
}
