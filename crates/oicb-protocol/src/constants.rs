//! Protocol-fixed sizes. These bound the fragmenter's headroom arithmetic in
//! [`crate::codec`] and the pre-connect validation in [`crate::bootstrap`].

/// Longest nickname an ICB server will register, including the NUL.
pub const NICKNAME_MAX: usize = 29;
/// Longest group (room) name an ICB server will register, including the NUL.
pub const GROUPNAME_MAX: usize = 29;

/// Default TCP port for the ICB protocol.
pub const DEFAULT_PORT: u16 = 7326;

/// A single wire packet never carries more than this many bytes total
/// (`length` byte included).
pub const MAX_PACKET_SIZE: usize = 255;
/// Payload bytes per packet in extended (continuation) mode: 1 length byte
/// (always 0 for non-final fragments) + 255 data bytes = 256 total per
/// fragment header+body unit, walking the stream in fixed 256-byte units.
pub const EXTENDED_FRAGMENT_BYTES: usize = 254;

/// Ceiling for a single reassembled logical message.
pub const MAX_LOGICAL_PAYLOAD: usize = 1 << 20;
/// Starting size of the inbound reassembly buffer; doubles up to
/// `MAX_LOGICAL_PAYLOAD` on demand.
pub const INITIAL_RX_BUFFER: usize = 1024;

/// Outstanding unanswered pings before the keep-alive controller gives up.
pub const MAX_PINGS: u8 = 3;
/// Default `net_timeout`, in seconds; `0` disables keep-alives entirely.
pub const DEFAULT_NET_TIMEOUT_SECS: u64 = 30;

pub const PROTOCOL_VERSION: &str = "1";

/// Field separator inside an ICB message payload.
pub const FIELD_SEP: u8 = 0x01;
