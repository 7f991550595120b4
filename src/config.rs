use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::bail;

use crate::frame::MAX_SUBFRAMES;
use crate::safe_converter::SafeCast;

/// Configuration for an endpoint, shared between the sending and the receiving role. Each role
///  reads the fields that concern it and validates them at construction.
#[derive(Debug, Clone)]
pub struct EndPointConfig {
    /// For a sending endpoint this is the destination address and is required. For a receiving
    ///  endpoint it is the local address to bind to; `None` binds to all local interfaces.
    pub ip: Option<Ipv4Addr>,

    /// The UDP port: destination port for a sender, local port for a receiver. A receiver may
    ///  pass 0 to bind an ephemeral port (useful for tests), in which case `local_addr` reports
    ///  the actual port.
    pub port: u16,

    /// How long a `receive` call waits for a datagram before reporting a timeout. `None` blocks
    ///  indefinitely. Only receiving endpoints use this.
    pub receive_timeout: Option<Duration>,

    /// The number of subframes the application expects per frame, 1..=3. The wire format is
    ///  self-describing, so this does not gate reassembly - but completed frames that deviate
    ///  from it are flagged in the log. 0 is treated as 1.
    pub expected_subframes: u8,
}

impl EndPointConfig {
    pub fn new(port: u16) -> EndPointConfig {
        EndPointConfig {
            ip: None,
            port,
            receive_timeout: None,
            expected_subframes: 1,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.expected_subframes.safe_cast() > MAX_SUBFRAMES {
            bail!("expected_subframes is {} but a frame can carry at most {} subframes", self.expected_subframes, MAX_SUBFRAMES);
        }
        Ok(())
    }

    /// the configured subframe expectation with the 'unset' value 0 normalized to 1
    pub fn effective_expected_subframes(&self) -> u8 {
        self.expected_subframes.max(1)
    }
}
