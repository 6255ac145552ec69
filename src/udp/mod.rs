//! UDP ASSOCIATE support
//!
//! The encapsulation codec for client↔relay datagrams and the relay loop
//! whose lifetime is tied to the control TCP connection.

mod packet;
mod relay;

pub use packet::{encode_udp_packet, parse_udp_packet, UdpPacket};
pub(crate) use relay::handle_udp_associate;
