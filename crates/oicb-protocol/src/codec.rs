//! Component B: Packet Codec.
//!
//! Encodes one logical `(type, payload)` message into one or more wire
//! packets (legacy whitespace-split chunking, or the extended continuation
//! scheme), and decodes an inbound byte stream back into complete logical
//! messages, defragmenting continuation packets as it goes.
//!
//! The reassembly buffer is a growable `Vec<u8>` with explicit `start`/`end`
//! offsets rather than a `VecDeque`: a realloc-on-demand buffer with bounds
//! checks instead of raw pointer arithmetic over a manually-managed heap
//! allocation.

use crate::constants::{EXTENDED_FRAGMENT_BYTES, INITIAL_RX_BUFFER, MAX_LOGICAL_PAYLOAD, NICKNAME_MAX};
use crate::error::Fatal;

/// A reassembled logical ICB message. `payload` never includes the trailing
/// NUL field terminator — that's a wire-framing detail, not part of the
/// logical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self { kind, payload: payload.into() }
    }

    /// Split `payload` on the ICB field separator (`0x01`).
    pub fn fields(&self) -> impl Iterator<Item = &[u8]> {
        self.payload.split(|&b| b == crate::constants::FIELD_SEP)
    }
}

fn is_boundary_byte(b: u8) -> bool {
    b == b' ' || b.is_ascii_punctuation()
}

/// Everything the legacy fragmenter needs to know about one message: the
/// bytes that are replayed verbatim at the start of every fragment (empty
/// for anything but a `/m` personal message), and the bytes that actually
/// get chunked.
///
/// The addressee field is bounded by the first field separator rather than
/// a literal space: `/m bob hi` encodes on the wire as `"m\x01bob\x01hi"`,
/// i.e. the nick is itself one `0x01`-delimited field, not space-delimited.
fn split_common_prefix(kind: u8, payload: &[u8]) -> (&[u8], &[u8]) {
    const PM_PREFIX: &[u8] = b"m\x01";
    if kind != b'h' || !payload.starts_with(PM_PREFIX) {
        return (&[], payload);
    }
    let after = &payload[PM_PREFIX.len()..];
    let bound = (NICKNAME_MAX + 3).min(after.len());
    let addressee_len = after[..bound]
        .iter()
        .position(|&b| b == crate::constants::FIELD_SEP)
        .map_or(bound, |p| p + 1);
    let prefix_len = PM_PREFIX.len() + addressee_len;
    (&payload[..prefix_len], &payload[prefix_len..])
}

/// Chunk `body` into pieces no longer than `limit`, preferring to break on
/// whitespace/punctuation within the last `limit` bytes of a chunk when
/// `prefer_boundary` is set (chat text and private-message bodies).
fn chunk_body(body: &[u8], limit: usize, prefer_boundary: bool) -> Vec<&[u8]> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        if rest.len() <= limit {
            chunks.push(rest);
            break;
        }
        let mut cut = limit;
        if prefer_boundary {
            if let Some(pos) = (0..limit).rev().find(|&i| is_boundary_byte(rest[i])) {
                cut = pos + 1;
            }
        }
        let (chunk, remainder) = rest.split_at(cut);
        chunks.push(chunk);
        rest = remainder;
    }
    chunks
}

/// Legacy fragmentation. `nick` is the locally-known nick;
/// headroom is reserved so a server that prepends the sender's nick to a
/// relayed chat line never overflows a 255-byte packet.
pub fn encode_legacy(kind: u8, payload: &[u8], nick: &str) -> Vec<Vec<u8>> {
    let (common, body) = split_common_prefix(kind, payload);
    let limit = 253usize.saturating_sub(nick.len()).saturating_sub(common.len());
    let prefer_boundary = kind == b'b' || !common.is_empty();
    let chunks = chunk_body(body, limit, prefer_boundary);

    // A zero-length body (e.g. an empty command) still needs exactly one
    // packet carrying the common prefix and the terminating NUL.
    let chunks: Vec<&[u8]> = if chunks.is_empty() { vec![&[][..]] } else { chunks };

    chunks
        .into_iter()
        .map(|chunk| {
            let length = (common.len() + chunk.len() + 2) as u8;
            let mut packet = Vec::with_capacity(2 + common.len() + chunk.len() + 1);
            packet.push(length);
            packet.push(kind);
            packet.extend_from_slice(common);
            packet.extend_from_slice(chunk);
            packet.push(0);
            packet
        })
        .collect()
}

/// Extended (multi-packet continuation) fragmentation. Every fragment, continuation or terminator, carries its own `[length]
/// [type]` header; continuations always force `length = 0`.
///
/// Full 254-byte groups are always emitted as continuations, even the
/// group that exactly exhausts `stream`; the terminal fragment then carries
/// only the true remainder (0 to 253 bytes). When `stream`'s length is an
/// exact multiple of `EXTENDED_FRAGMENT_BYTES` that remainder is empty, so
/// the terminal fragment degenerates to `[1][type]` with no data bytes —
/// one fragment beyond `ceil(total / EXTENDED_FRAGMENT_BYTES)`. See
/// DESIGN.md.
pub fn encode_extended(kind: u8, payload: &[u8]) -> Vec<Vec<u8>> {
    let mut stream = payload.to_vec();
    if stream.last() != Some(&0) {
        stream.push(0);
    }
    let total = stream.len();

    let mut packets = Vec::new();
    let mut offset = 0;
    while total - offset >= EXTENDED_FRAGMENT_BYTES {
        let chunk = &stream[offset..offset + EXTENDED_FRAGMENT_BYTES];
        let mut packet = Vec::with_capacity(2 + chunk.len());
        packet.push(0);
        packet.push(kind);
        packet.extend_from_slice(chunk);
        packets.push(packet);
        offset += EXTENDED_FRAGMENT_BYTES;
    }

    let remainder = &stream[offset..];
    let mut packet = Vec::with_capacity(2 + remainder.len());
    packet.push((remainder.len() + 1) as u8);
    packet.push(kind);
    packet.extend_from_slice(remainder);
    packets.push(packet);
    packets
}

/// Growable inbound reassembly buffer with defragmentation.
pub struct Decoder {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self { buf: vec![0; INITIAL_RX_BUFFER], start: 0, end: 0 }
    }

    /// Room available for a fresh `read()` into the tail of the buffer,
    /// compacting consumed bytes and doubling capacity (up to
    /// `MAX_LOGICAL_PAYLOAD`) as needed. Returns `None` if even a maximally
    /// grown buffer can't make room (the in-flight message is fatally
    /// oversized).
    pub fn spare_capacity(&mut self) -> Option<&mut [u8]> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.buf.len() - self.end == 0 {
            if self.buf.len() >= MAX_LOGICAL_PAYLOAD {
                return None;
            }
            let new_len = (self.buf.len() * 2).min(MAX_LOGICAL_PAYLOAD);
            self.buf.resize(new_len, 0);
        }
        Some(&mut self.buf[self.end..])
    }

    pub fn commit(&mut self, n: usize) {
        self.end += n;
    }

    /// Attempt to decode one complete logical message from the buffered
    /// bytes. Returns `Ok(None)` when more bytes are needed.
    pub fn try_decode(&mut self) -> Result<Option<Message>, Fatal> {
        let mut pos = self.start;
        let mut stream: Vec<u8> = Vec::new();
        let mut msg_kind: Option<u8> = None;

        loop {
            if self.end - pos < 1 {
                return Ok(None);
            }
            if pos - self.start > MAX_LOGICAL_PAYLOAD {
                return Err(Fatal::MessageTooLarge { limit: MAX_LOGICAL_PAYLOAD });
            }

            let length = self.buf[pos];
            if length == 0 {
                // Continuation fragment: fixed 256-byte unit (1 length + 1
                // type + 254 data).
                const FRAG_LEN: usize = 2 + EXTENDED_FRAGMENT_BYTES;
                if self.end - pos < FRAG_LEN {
                    return Ok(None);
                }
                let frag_kind = self.buf[pos + 1];
                check_kind(&mut msg_kind, frag_kind)?;
                append_dedup(&mut stream, &self.buf[pos + 2..pos + FRAG_LEN]);
                pos += FRAG_LEN;
            } else {
                let need = 1 + length as usize;
                if self.end - pos < need {
                    return Ok(None);
                }
                let frag_kind = self.buf[pos + 1];
                check_kind(&mut msg_kind, frag_kind)?;
                let data = &self.buf[pos + 2..pos + need];
                append_dedup(&mut stream, data);
                pos += need;
                self.start = pos;

                if stream.last() != Some(&0) {
                    stream.push(0);
                }
                stream.pop(); // drop the trailing NUL; payload excludes it
                return Ok(Some(Message::new(
                    msg_kind.expect("terminator fragment always sets kind"),
                    stream,
                )));
            }
        }
    }
}

/// Append `data`, first dropping a spurious extra NUL some senders leave
/// between fragments (a "[NUL][length][type]" dedup rule).
fn append_dedup(stream: &mut Vec<u8>, data: &[u8]) {
    if !stream.is_empty() && stream.last() == Some(&0) {
        stream.pop();
    }
    stream.extend_from_slice(data);
}

fn check_kind(msg_kind: &mut Option<u8>, frag_kind: u8) -> Result<(), Fatal> {
    match *msg_kind {
        None => {
            *msg_kind = Some(frag_kind);
            Ok(())
        }
        Some(k) if k == frag_kind => Ok(()),
        Some(_) => Err(Fatal::MismatchedFragmentTypes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut Decoder, bytes: &[u8]) {
        let mut offset = 0;
        while offset < bytes.len() {
            let spare = decoder.spare_capacity().expect("buffer has room");
            let n = spare.len().min(bytes.len() - offset);
            spare[..n].copy_from_slice(&bytes[offset..offset + n]);
            decoder.commit(n);
            offset += n;
        }
    }

    fn decode_all(decoder: &mut Decoder) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(msg) = decoder.try_decode().unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn legacy_round_trip_short_message() {
        let packets = encode_legacy(b'b', b"hello", "alice");
        assert_eq!(packets.len(), 1);
        // length = common.len() + chunk.len() + 2 = 0 + 5 + 2 = 7.
        assert_eq!(packets[0], vec![7, b'b', b'h', b'e', b'l', b'l', b'o', 0]);

        let mut d = Decoder::new();
        feed_all(&mut d, &packets[0]);
        let msgs = decode_all(&mut d);
        assert_eq!(msgs, vec![Message::new(b'b', b"hello".to_vec())]);
    }

    #[test]
    fn legacy_round_trip_property_small_payloads() {
        for n in [0usize, 1, 50, 200, 253, 400, 1000, 5000] {
            for nick_len in [1usize, 8, 32] {
                let payload: Vec<u8> = (0..n).map(|i| b'a' + (i % 26) as u8).collect();
                let nick = "n".repeat(nick_len);
                let packets = encode_legacy(b'b', &payload, &nick);

                let mut d = Decoder::new();
                for p in &packets {
                    feed_all(&mut d, p);
                }
                let msgs = decode_all(&mut d);
                assert_eq!(msgs.len(), 1, "n={n} nick_len={nick_len}");
                assert_eq!(msgs[0].kind, b'b');
                assert_eq!(msgs[0].payload, payload, "n={n} nick_len={nick_len}");
            }
        }
    }

    #[test]
    fn extended_round_trip_emits_expected_packet_count() {
        for n in [0usize, 1, 100, 253, 254, 255, 507, 508, 10_000] {
            let payload: Vec<u8> = (0..n).map(|i| b'a' + (i % 26) as u8).collect();
            let packets = encode_extended(b'b', &payload);
            let total = n + 1; // + trailing NUL
            // One extra terminal fragment beyond ceil(total/254) when total
            // is an exact multiple: the last full 254-byte group is sent as
            // a continuation rather than doubling as the terminator.
            let extra = usize::from(total % EXTENDED_FRAGMENT_BYTES == 0);
            let expected = total.div_ceil(EXTENDED_FRAGMENT_BYTES).max(1) + extra;
            assert_eq!(packets.len(), expected, "n={n}");
            for p in &packets[..packets.len() - 1] {
                assert_eq!(p[0], 0, "non-final packet must have length byte 0");
            }

            let mut d = Decoder::new();
            for p in &packets {
                feed_all(&mut d, p);
            }
            let msgs = decode_all(&mut d);
            assert_eq!(msgs.len(), 1, "n={n}");
            assert_eq!(msgs[0].payload, payload, "n={n}");
        }
    }

    #[test]
    fn extended_mode_degenerate_final_fragment_on_exact_multiple() {
        let payload = vec![b'x'; 253]; // + NUL = 254, exact multiple
        let packets = encode_extended(b'b', &payload);
        // One continuation fragment carrying the full 254 bytes, plus a
        // degenerate empty terminator.
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0][0], 0, "full 254-byte group is sent as a continuation");
        let last = packets.last().unwrap();
        assert_eq!(last[0], 1, "degenerate final fragment carries length byte 1 (just the type)");
        assert_eq!(last.len(), 2, "degenerate final fragment has no data bytes");

        let payload2 = vec![b'x'; 254 * 2 - 1]; // +NUL = 508 = 2*254 exactly
        let packets2 = encode_extended(b'b', &payload2);
        assert_eq!(packets2.len(), 3);
        for p in &packets2[..2] {
            assert_eq!(p[0], 0, "full 254-byte groups are sent as continuations");
        }
        let last2 = packets2.last().unwrap();
        assert_eq!(last2[0], 1, "degenerate final fragment carries length byte 1 (just the type)");
        assert_eq!(last2.len(), 2, "degenerate final fragment has no data bytes");
    }

    #[test]
    fn chunk_boundary_prefers_whitespace() {
        let body = b"0123456789 abcdefghij";
        let chunks = chunk_body(body, 15, true);
        assert_eq!(chunks[0], b"0123456789");
        let last_of_first = *chunks[0].last().unwrap();
        assert!(is_boundary_byte(b' ') && last_of_first != b' ');
    }

    #[test]
    fn incremental_decoding_matches_bulk_decoding() {
        let payload = vec![b'z'; 2000];
        let packets = encode_extended(b'c', &payload);
        let mut bulk = Vec::new();
        for p in &packets {
            bulk.extend_from_slice(p);
        }

        let mut whole = Decoder::new();
        feed_all(&mut whole, &bulk);
        let whole_msgs = decode_all(&mut whole);

        let mut byte_at_a_time = Decoder::new();
        let mut out = Vec::new();
        for &b in &bulk {
            feed_all(&mut byte_at_a_time, &[b]);
            while let Some(m) = byte_at_a_time.try_decode().unwrap() {
                out.push(m);
            }
        }

        assert_eq!(whole_msgs, out);
    }

    #[test]
    fn mismatched_fragment_types_are_fatal() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_extended(b'b', &vec![b'x'; 300])[0]);
        // Corrupt the terminator's type byte to simulate a buggy sender.
        let mut terminator = encode_extended(b'b', &vec![b'x'; 300])[1].clone();
        terminator[1] = b'c';
        bytes.extend_from_slice(&terminator);

        let mut d = Decoder::new();
        feed_all(&mut d, &bytes);
        assert!(matches!(d.try_decode(), Err(Fatal::MismatchedFragmentTypes)));
    }

    #[test]
    fn private_message_common_prefix_is_replayed_per_fragment() {
        let payload = [b"m\x01bob\x01".as_slice(), &vec![b'x'; 600]].concat();
        let packets = encode_legacy(b'h', &payload, "alice");
        assert!(packets.len() > 1);
        for p in &packets {
            assert!(p.windows(6).any(|w| w == b"m\x01bob\x01"));
        }

        let mut d = Decoder::new();
        for p in &packets {
            feed_all(&mut d, p);
        }
        let msgs = decode_all(&mut d);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].payload, payload);
    }

    #[test]
    fn scenario_one_alice_hello_is_a_single_eight_byte_packet() {
        let packets = encode_legacy(b'b', b"hello", "alice");
        // Packet is 8 bytes on the wire ([length][type]['h','e','l','l','o'][NUL]);
        // the length *field* itself is 7 (type+data+NUL, excluding the length byte).
        assert_eq!(packets, vec![vec![7, b'b', b'h', b'e', b'l', b'l', b'o', 0]]);
    }
}
