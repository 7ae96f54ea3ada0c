//! The frame codec: the two-byte length+counter header and trailing
//! terminator carried on every packet, plus the per-connection outbound
//! counter nibble.
//!
//! Grounded on `valence_protocol`'s `PacketDecoder`/`PacketEncoder`
//! (`decode.rs`/`encode.rs`): a decoder that owns a `BytesMut` accumulator
//! and exposes `try_next_*` / `queue_bytes` / `take_capacity`, and an
//! encoder that appends into its own buffer and is drained with `take`.
//! This format has no varint and no compression, so the implementation is
//! considerably smaller than `valence_protocol`'s.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::RelayError;
use crate::protocol::opcode::MAX_PAYLOAD_LEN;

const HEADER_LEN: usize = 2;
const TERMINATOR_LEN: usize = 1;

/// Encodes outbound frames for one connection. Holds the connection's
/// rolling counter nibble: it advances by one, wrapping 15 -> 0, after
/// every frame appended.
#[derive(Default)]
pub struct FrameEncoder {
    buf: BytesMut,
    counter: u8,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter nibble that will be stamped on the *next* frame.
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Appends one framed packet for `payload` to the internal buffer.
    ///
    /// `length` covers the two header bytes, the payload, and the
    /// terminator byte, so the maximum payload is [`MAX_PAYLOAD_LEN`].
    pub fn append_frame(&mut self, payload: &[u8]) -> Result<(), RelayError> {
        let length = HEADER_LEN + payload.len() + TERMINATOR_LEN;

        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RelayError::OverlongPacket { len: payload.len() });
        }

        let l_low = (length & 0xff) as u8;
        let l_high = ((length >> 8) & 0x0f) as u8;

        self.buf.put_u8(l_low);
        self.buf.put_u8((self.counter << 4) | l_high);
        self.buf.extend_from_slice(payload);
        self.buf.put_u8(0x00);

        self.counter = (self.counter + 1) % 16;

        Ok(())
    }

    /// Takes all bytes appended so far, leaving the encoder empty.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Decodes inbound frames from one connection's byte stream.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_bytes(&mut self, bytes: BytesMut) {
        self.buf.unsplit(bytes);
    }

    pub fn queue_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    pub fn take_capacity(&mut self) -> BytesMut {
        self.buf.split_off(self.buf.len())
    }

    /// Attempts to pull one complete frame's body out of the accumulator.
    ///
    /// Returns `Ok(None)` when fewer than `length` bytes have arrived yet
    /// (the decoder yields without consuming). The returned body
    /// is the command-parser input: bytes `[2, length-1)`, with the header
    /// and trailing `0x00` already stripped. The inbound counter nibble is
    /// read but not validated; clients are trusted not to desync it.
    pub fn try_next_frame(&mut self) -> Result<Option<(u8, BytesMut)>, RelayError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let header0 = self.buf[0];
        let header1 = self.buf[1];
        let length = (header0 as usize) | (((header1 & 0x0f) as usize) << 8);
        let counter = header1 >> 4;

        if length < HEADER_LEN + TERMINATOR_LEN {
            return Err(RelayError::Framing(format!(
                "frame length {length} is shorter than the header+terminator"
            )));
        }

        if self.buf.len() < length {
            // Not enough data arrived yet; yield without consuming.
            return Ok(None);
        }

        let mut frame = self.buf.split_to(length);
        frame.advance(HEADER_LEN);
        frame.truncate(frame.len() - TERMINATOR_LEN);

        Ok(Some((counter, frame)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_frame() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(&[0x71]).unwrap();
        let bytes = enc.take();

        let mut dec = FrameDecoder::new();
        dec.queue_slice(&bytes);
        let (counter, body) = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(counter, 0);
        assert_eq!(&body[..], &[0x71]);
        assert!(dec.try_next_frame().unwrap().is_none());
    }

    #[test]
    fn header_bytes_encode_length_and_counter() {
        // for |P| <= 4092, header bytes are (|P|+3)&0xff and
        // (c<<4)|((|P|+3)>>8), and the last byte is 0x00.
        let payload = vec![0xabu8; 50];
        let mut enc = FrameEncoder::new();
        enc.append_frame(&payload).unwrap();
        let bytes = enc.take();

        let expected_len = payload.len() + 3;
        assert_eq!(bytes[0], (expected_len & 0xff) as u8);
        assert_eq!(bytes[1], (0 << 4) | ((expected_len >> 8) as u8));
        assert_eq!(*bytes.last().unwrap(), 0x00);
    }

    #[test]
    fn counter_advances_and_wraps() {
        // N packets produce counters 0, 1, ..., (N-1) mod 16.
        let mut enc = FrameEncoder::new();
        let mut dec = FrameDecoder::new();
        for i in 0..20 {
            enc.append_frame(&[0x71]).unwrap();
            dec.queue_bytes(enc.take());
            let (counter, _) = dec.try_next_frame().unwrap().unwrap();
            assert_eq!(counter, (i % 16) as u8);
        }
    }

    #[test]
    fn overlong_payload_is_rejected() {
        let mut enc = FrameEncoder::new();
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let err = enc.append_frame(&payload).unwrap_err();
        assert!(matches!(err, RelayError::OverlongPacket { .. }));
    }

    #[test]
    fn drains_multiple_frames_from_one_chunk() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(&[0x01]).unwrap();
        enc.append_frame(&[0x02, 0x03]).unwrap();
        let bytes = enc.take();

        let mut dec = FrameDecoder::new();
        dec.queue_bytes(bytes);

        let (c0, b0) = dec.try_next_frame().unwrap().unwrap();
        let (c1, b1) = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(c0, 0);
        assert_eq!(c1, 1);
        assert_eq!(&b0[..], &[0x01]);
        assert_eq!(&b1[..], &[0x02, 0x03]);
        assert!(dec.try_next_frame().unwrap().is_none());
    }

    #[test]
    fn yields_without_consuming_on_partial_frame() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(&[0xaa; 10]).unwrap();
        let bytes = enc.take();

        let mut dec = FrameDecoder::new();
        // Deliver everything except the final byte: an incomplete chunk.
        dec.queue_slice(&bytes[..bytes.len() - 1]);
        assert!(dec.try_next_frame().unwrap().is_none());

        dec.queue_slice(&bytes[bytes.len() - 1..]);
        let (_, body) = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(&body[..], &[0xaa; 10]);
    }

    #[test]
    fn fragmented_delivery_across_two_chunks_yields_one_frame() {
        // A 14-byte frame delivered as 5 then 9 bytes is dispatched once.
        let mut enc = FrameEncoder::new();
        let payload = vec![0x67u8; 11];
        enc.append_frame(&payload).unwrap();
        let bytes = enc.take();
        assert_eq!(bytes.len(), 14);

        let mut dec = FrameDecoder::new();
        dec.queue_slice(&bytes[..5]);
        assert!(dec.try_next_frame().unwrap().is_none());
        dec.queue_slice(&bytes[5..]);
        let (_, body) = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(body.len(), 11);
    }
}
