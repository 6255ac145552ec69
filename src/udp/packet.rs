//! UDP datagram encapsulation codec.

use crate::error::{Error, Result};
use crate::types::TargetAddr;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// One encapsulated datagram on the client↔relay leg.
///
/// # Datagram Format
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
///
/// Client→relay the address names the destination; relay→client it names
/// the remote the payload came from. The relay drops any datagram with a
/// non-zero FRAG field; fragmentation is not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpPacket {
    /// Fragment number (0 for standalone datagrams)
    pub frag: u8,
    /// Destination (or source, relay→client) address
    pub addr: TargetAddr,
    /// Payload
    pub data: Bytes,
}

impl UdpPacket {
    /// Standalone (unfragmented) datagram.
    pub fn new(addr: TargetAddr, data: Bytes) -> Self {
        UdpPacket {
            frag: 0,
            addr,
            data,
        }
    }

    /// Whether this datagram is part of a fragment train.
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }
}

/// Parse an encapsulated datagram.
pub fn parse_udp_packet(data: &[u8]) -> Result<UdpPacket> {
    if data.len() < 4 {
        return Err(Error::MalformedFrame("UDP datagram too short"));
    }

    let mut buf = data;

    let rsv = buf.get_u16();
    if rsv != 0 {
        return Err(Error::MalformedFrame("non-zero RSV in UDP datagram"));
    }

    let frag = buf.get_u8();

    let (addr, consumed) = TargetAddr::from_bytes(buf)?;
    let payload = Bytes::copy_from_slice(&buf[consumed..]);

    Ok(UdpPacket {
        frag,
        addr,
        data: payload,
    })
}

/// Encode an encapsulated datagram.
pub fn encode_udp_packet(packet: &UdpPacket) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + packet.data.len() + 19);

    buf.put_u16(0);
    buf.put_u8(packet.frag);
    buf.extend_from_slice(&packet.addr.to_bytes());
    buf.extend_from_slice(&packet.data);

    buf.to_vec()
}
