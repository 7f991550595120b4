use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, info, span, trace, Level};
use uuid::Uuid;

use crate::config::EndPointConfig;
use crate::events::{EventObserver, ProtocolEvent};
use crate::frame::{OutboundFrame, ReceiveEvent};
use crate::packet_header::{PacketHeader, MAX_DATAGRAM_SIZE};
use crate::receive_stream::FrameAssembly;
use crate::send_pipeline::SendPipeline;

/// The sending side of the protocol: owns an ephemeral UDP socket and the destination address,
///  and fragments each offered frame into its datagram sequence. Dropping the endpoint closes
///  the socket.
pub struct SendEndPoint {
    destination: SocketAddr,
    pipeline: SendPipeline,
}

impl SendEndPoint {
    pub async fn new(config: &EndPointConfig) -> anyhow::Result<SendEndPoint> {
        config.validate()?;
        let destination_ip = config.ip
            .ok_or_else(|| anyhow!("a sending endpoint requires a destination address"))?;
        let destination = SocketAddr::V4(SocketAddrV4::new(destination_ip, config.port));

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        info!("sending endpoint for {:?} bound to {:?}", destination, socket.local_addr()?);

        Ok(SendEndPoint {
            destination,
            pipeline: SendPipeline::new(Arc::new(socket)),
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Transmits all packets of all subframes of `frame`, in order. The call succeeds only if
    ///  the socket accepted every packet; on failure it aborts immediately, leaving the
    ///  receiver to discard the partial frame when a newer one begins.
    pub async fn send(&mut self, frame: &OutboundFrame<'_>) -> anyhow::Result<()> {
        debug!(frame_number = %frame.frame_number(), to = ?self.destination, "sending frame");
        self.pipeline.send_frame(self.destination, frame).await
    }
}


/// The receiving side of the protocol: owns the bound UDP socket, a scratch buffer for one
///  datagram and the reassembly state. `receive` blocks (asynchronously) until a frame
///  completes, the configured timeout elapses, or the socket fails. Dropping the endpoint
///  closes the socket.
pub struct ReceiveEndPoint {
    socket: UdpSocket,
    receive_timeout: Option<Duration>,
    expected_subframes: u8,
    // one byte larger than the biggest valid datagram, so oversized datagrams are detectable
    //  instead of being silently truncated by recv_from
    receive_buf: Vec<u8>,
    assembly: FrameAssembly,
    observer: Option<Arc<dyn EventObserver>>,
}

impl ReceiveEndPoint {
    pub async fn new(config: &EndPointConfig) -> anyhow::Result<ReceiveEndPoint> {
        config.validate()?;

        let bind_ip = config.ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let socket = UdpSocket::bind(SocketAddrV4::new(bind_ip, config.port)).await?;
        info!("receiving endpoint bound to {:?}", socket.local_addr()?);

        Ok(ReceiveEndPoint {
            socket,
            receive_timeout: config.receive_timeout,
            expected_subframes: config.effective_expected_subframes(),
            receive_buf: vec![0; MAX_DATAGRAM_SIZE + 1],
            assembly: FrameAssembly::new(),
            observer: None,
        })
    }

    /// installs a diagnostics observer that is notified of every dropped packet and discarded
    ///  frame; purely observational, the protocol behaves identically with or without it
    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> ReceiveEndPoint {
        self.assembly.set_observer(observer.clone());
        self.observer = Some(observer);
        self
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Waits for the frame under assembly to complete and returns it as a borrowed view; the
    ///  view is valid until the next call on this endpoint. Per-packet faults (malformed,
    ///  duplicate, stale, out of bounds) are logged and dropped without surfacing here; the
    ///  configured receive timeout surfaces as [ReceiveEvent::Timeout], and only socket
    ///  failures surface as `Err`.
    pub async fn receive(&mut self) -> anyhow::Result<ReceiveEvent<'_>> {
        let subframe_count = loop {
            let num_read = match self.read_datagram().await? {
                Some(num_read) => num_read,
                None => return Ok(ReceiveEvent::Timeout),
            };

            let correlation_id = Uuid::new_v4();
            let span = span!(Level::TRACE, "datagram_received", ?correlation_id);
            let _entered = span.enter();

            if num_read > MAX_DATAGRAM_SIZE {
                debug!("received datagram exceeding the maximum packet size - dropping");
                self.emit(ProtocolEvent::MalformedPacket { datagram_len: num_read });
                continue;
            }

            let mut parse_buf = &self.receive_buf[..num_read];
            let header = match PacketHeader::deser(&mut parse_buf) {
                Ok(header) => header,
                Err(e) => {
                    debug!("received malformed packet ({}) - dropping", e);
                    self.emit(ProtocolEvent::MalformedPacket { datagram_len: num_read });
                    continue;
                }
            };
            trace!("received packet {:?} with {} byte payload", header, parse_buf.len());

            if self.assembly.on_packet(&header, parse_buf) {
                if header.subframe_count != self.expected_subframes {
                    debug!("completed frame {} advertises {} subframes, endpoint is configured for {}",
                        header.frame_number, header.subframe_count, self.expected_subframes);
                }
                break header.subframe_count;
            }
        };

        Ok(ReceiveEvent::Frame(self.assembly.completed_frame(subframe_count)))
    }

    /// Forgets the frame under assembly and the current frame number, so that any subsequent
    ///  packet - whatever its frame number - starts a new stream. Buffers are retained. This is
    ///  the intended reaction to a [ReceiveEvent::Timeout] when the sender may have restarted.
    pub fn receive_reset(&mut self) {
        self.assembly.reset();
    }

    /// reads one datagram into the scratch buffer; `None` means the receive timeout elapsed
    async fn read_datagram(&mut self) -> anyhow::Result<Option<usize>> {
        match self.receive_timeout {
            Some(receive_timeout) => {
                match time::timeout(receive_timeout, self.socket.recv_from(&mut self.receive_buf)).await {
                    Ok(Ok((num_read, _))) => Ok(Some(num_read)),
                    Ok(Err(e)) => Err(e.into()),
                    Err(_) => {
                        trace!("no datagram within {:?}", receive_timeout);
                        Ok(None)
                    }
                }
            }
            None => {
                let (num_read, _) = self.socket.recv_from(&mut self.receive_buf).await?;
                Ok(Some(num_read))
            }
        }
    }

    fn emit(&self, event: ProtocolEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }
}
