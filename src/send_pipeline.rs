use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use bytes::BufMut;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::frame::{FrameNumber, OutboundFrame};
use crate::packet_header::{packet_count_for_payload, payload_range, PacketHeader, MAX_DATAGRAM_SIZE};
use crate::safe_converter::PrecheckedCast;

/// This is an abstraction for sending one datagram on a UDP socket, introduced to facilitate
///  mocking the I/O part away for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SendSocket: Send + Sync + 'static {
    async fn send_packet(&self, to: SocketAddr, packet_buf: &[u8]) -> anyhow::Result<()>;
}

#[async_trait]
impl SendSocket for UdpSocket {
    async fn send_packet(&self, to: SocketAddr, packet_buf: &[u8]) -> anyhow::Result<()> {
        trace!("UDP socket: sending {} bytes to {:?}", packet_buf.len(), to);

        // A datagram socket should never accept a partial write, but if the kernel reports one
        //  anyway, keep pushing the remainder instead of silently truncating the packet.
        let mut written = 0;
        while written < packet_buf.len() {
            written += self.send_to(&packet_buf[written..], to).await?;
        }
        Ok(())
    }
}


/// Turns one frame into its on-the-wire datagram sequence: subframe by subframe, packet by
///  packet, reusing a single scratch buffer into which the header is rewritten and the next
///  payload slice is copied. Payload bytes are copied exactly once, from the caller's subframe
///  buffer into the scratch datagram.
pub struct SendPipeline {
    socket: Arc<dyn SendSocket>,
    packet_buf: Vec<u8>,
}

impl SendPipeline {
    pub fn new(socket: Arc<dyn SendSocket>) -> SendPipeline {
        SendPipeline {
            socket,
            packet_buf: Vec::with_capacity(MAX_DATAGRAM_SIZE),
        }
    }

    /// Sends all packets of all subframes in order. The first socket failure aborts the call;
    ///  packets already handed to the kernel are not recalled - the receiver discards the
    ///  resulting partial frame as soon as a newer frame begins.
    pub async fn send_frame(&mut self, to: SocketAddr, frame: &OutboundFrame<'_>) -> anyhow::Result<()> {
        let subframe_count = frame.subframes().len().prechecked_cast();

        for (subframe_index, subframe) in frame.subframes().iter().enumerate() {
            self.send_subframe(to, frame.frame_number(), subframe_count, subframe_index.prechecked_cast(), subframe).await?;
        }
        Ok(())
    }

    async fn send_subframe(
        &mut self,
        to: SocketAddr,
        frame_number: FrameNumber,
        subframe_count: u8,
        subframe_index: u8,
        payload: &[u8],
    ) -> anyhow::Result<()> {
        let packet_count = packet_count_for_payload(payload.len())?;

        for packet_index in 0..packet_count {
            self.packet_buf.clear();
            PacketHeader {
                frame_number,
                subframe_count,
                subframe_index,
                packet_count,
                packet_index,
            }.ser(&mut self.packet_buf);
            self.packet_buf.put_slice(&payload[payload_range(packet_index, payload.len())]);

            self.socket.send_packet(to, &self.packet_buf).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use bytes::BytesMut;
    use mockall::Sequence;
    use tokio::runtime::Builder;

    use crate::packet_header::PACKET_MAX_PAYLOAD;
    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 9))
    }

    fn expected_datagram(frame: u16, subframe_count: u8, subframe_index: u8, packet_count: u16, packet_index: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        PacketHeader {
            frame_number: FrameNumber::from_raw(frame),
            subframe_count,
            subframe_index,
            packet_count,
            packet_index,
        }.ser(&mut buf);
        buf.extend_from_slice(payload);
        buf.to_vec()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i & 0xff) as u8).collect()
    }

    fn expect_datagrams(socket: &mut MockSendSocket, datagrams: Vec<Vec<u8>>) {
        let mut sequence = Sequence::new();
        for datagram in datagrams {
            socket.expect_send_packet()
                .once()
                .in_sequence(&mut sequence)
                .withf(move |to, buf| to == &peer() && buf == datagram.as_slice())
                .returning(|_, _| Ok(()));
        }
    }

    #[test]
    fn test_send_single_small_frame() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let mut socket = MockSendSocket::new();
            expect_datagrams(&mut socket, vec![
                expected_datagram(7, 1, 0, 1, 0, b"HELLO"),
            ]);

            let mut pipeline = SendPipeline::new(Arc::new(socket));
            let subframes: &[&[u8]] = &[b"HELLO"];
            let frame = OutboundFrame::new(FrameNumber::from_raw(7), subframes).unwrap();

            pipeline.send_frame(peer(), &frame).await.unwrap();
        });
    }

    #[test]
    fn test_send_multi_packet_subframe() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let data = pattern(3500);
            let mut socket = MockSendSocket::new();
            expect_datagrams(&mut socket, vec![
                expected_datagram(1, 1, 0, 3, 0, &data[..1400]),
                expected_datagram(1, 1, 0, 3, 1, &data[1400..2800]),
                expected_datagram(1, 1, 0, 3, 2, &data[2800..]),
            ]);

            let mut pipeline = SendPipeline::new(Arc::new(socket));
            let subframes: &[&[u8]] = &[&data];
            let frame = OutboundFrame::new(FrameNumber::from_raw(1), subframes).unwrap();

            pipeline.send_frame(peer(), &frame).await.unwrap();
        });
    }

    #[test]
    fn test_send_exact_multiple_has_full_terminal_packet() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let data = pattern(2 * PACKET_MAX_PAYLOAD);
            let mut socket = MockSendSocket::new();
            expect_datagrams(&mut socket, vec![
                expected_datagram(4, 1, 0, 2, 0, &data[..PACKET_MAX_PAYLOAD]),
                expected_datagram(4, 1, 0, 2, 1, &data[PACKET_MAX_PAYLOAD..]),
            ]);

            let mut pipeline = SendPipeline::new(Arc::new(socket));
            let subframes: &[&[u8]] = &[&data];
            let frame = OutboundFrame::new(FrameNumber::from_raw(4), subframes).unwrap();

            pipeline.send_frame(peer(), &frame).await.unwrap();
        });
    }

    #[test]
    fn test_send_empty_subframe_as_single_empty_packet() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let mut socket = MockSendSocket::new();
            expect_datagrams(&mut socket, vec![
                expected_datagram(2, 2, 0, 1, 0, b"payload"),
                expected_datagram(2, 2, 1, 1, 0, b""),
            ]);

            let mut pipeline = SendPipeline::new(Arc::new(socket));
            let subframes: &[&[u8]] = &[b"payload", b""];
            let frame = OutboundFrame::new(FrameNumber::from_raw(2), subframes).unwrap();

            pipeline.send_frame(peer(), &frame).await.unwrap();
        });
    }

    #[test]
    fn test_send_multi_subframe_order() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let middle = pattern(3000);
            let mut socket = MockSendSocket::new();
            expect_datagrams(&mut socket, vec![
                expected_datagram(5, 3, 0, 1, 0, b"first"),
                expected_datagram(5, 3, 1, 3, 0, &middle[..1400]),
                expected_datagram(5, 3, 1, 3, 1, &middle[1400..2800]),
                expected_datagram(5, 3, 1, 3, 2, &middle[2800..]),
                expected_datagram(5, 3, 2, 1, 0, b"third"),
            ]);

            let mut pipeline = SendPipeline::new(Arc::new(socket));
            let subframes: &[&[u8]] = &[b"first", &middle, b"third"];
            let frame = OutboundFrame::new(FrameNumber::from_raw(5), subframes).unwrap();

            pipeline.send_frame(peer(), &frame).await.unwrap();
        });
    }

    #[test]
    fn test_send_aborts_on_socket_failure() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let data = pattern(2000);
            let mut socket = MockSendSocket::new();
            let mut sequence = Sequence::new();
            socket.expect_send_packet()
                .once()
                .in_sequence(&mut sequence)
                .returning(|_, _| Ok(()));
            socket.expect_send_packet()
                .once()
                .in_sequence(&mut sequence)
                .returning(|_, _| Err(anyhow!("network is down")));

            let mut pipeline = SendPipeline::new(Arc::new(socket));
            let subframes: &[&[u8]] = &[&data];
            let frame = OutboundFrame::new(FrameNumber::from_raw(8), subframes).unwrap();

            assert!(pipeline.send_frame(peer(), &frame).await.is_err());
        });
    }
}
