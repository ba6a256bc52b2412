//! Record framing for stream and datagram transports.
//!
//! Wire formats, all integers little-endian:
//!
//! ```text
//! stream:   [len:u16][type:u8][payload:len]              (plaintext)
//!           [len:u16][ciphertext of type‖payload][tag:16] (encrypted)
//! datagram: [seqno:u32][type:u8][payload:n]              (plaintext)
//!           [seqno:u32][ciphertext of type‖payload][tag:16] (encrypted)
//! ```
//!
//! The stream length prefix stays in the clear (it is needed for
//! reassembly) and is not directly authenticated: a flipped length makes
//! the next record fail AEAD verification instead. This must be preserved
//! for wire compatibility.

use sptps_crypto::aead::RecordCipher;

use crate::Result;

pub use sptps_crypto::aead::TAG_LEN;

/// Record type of handshake records; types below it are application data.
pub const RECORD_HANDSHAKE: u8 = 128;

/// Stream header: 2-byte length prefix plus record type.
pub const STREAM_HEADER_LEN: usize = 3;
/// Stream header plus AEAD tag.
pub const STREAM_OVERHEAD: usize = STREAM_HEADER_LEN + TAG_LEN;
/// Datagram header: 4-byte sequence number plus record type.
pub const DATAGRAM_HEADER_LEN: usize = 5;
/// Datagram header plus AEAD tag.
pub const DATAGRAM_OVERHEAD: usize = DATAGRAM_HEADER_LEN + TAG_LEN;

/// Frame a record for a stream transport.
///
/// With a cipher, the region covering `type ‖ payload` is encrypted and
/// the tag appended; the length prefix always counts only the payload.
pub fn encode_stream(
    record_type: u8,
    payload: &[u8],
    seqno: u32,
    cipher: Option<&RecordCipher>,
) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(payload.len() + STREAM_OVERHEAD);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());

    match cipher {
        Some(cipher) => {
            let mut body = Vec::with_capacity(1 + payload.len());
            body.push(record_type);
            body.extend_from_slice(payload);
            frame.extend_from_slice(&cipher.encrypt(seqno, &body)?);
        }
        None => {
            frame.push(record_type);
            frame.extend_from_slice(payload);
        }
    }

    Ok(frame)
}

/// Frame a record for a datagram transport.
pub fn encode_datagram(
    record_type: u8,
    payload: &[u8],
    seqno: u32,
    cipher: Option<&RecordCipher>,
) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(payload.len() + DATAGRAM_OVERHEAD);
    frame.extend_from_slice(&seqno.to_le_bytes());

    match cipher {
        Some(cipher) => {
            let mut body = Vec::with_capacity(1 + payload.len());
            body.push(record_type);
            body.extend_from_slice(payload);
            frame.extend_from_slice(&cipher.encrypt(seqno, &body)?);
        }
        None => {
            frame.push(record_type);
            frame.extend_from_slice(payload);
        }
    }

    Ok(frame)
}

/// Two-phase reassembly buffer for the stream transport.
///
/// Accumulates the 2-byte length prefix first, then grows to the full
/// record. The on-wire size of a record depends on whether the inbound
/// direction is encrypted yet, so the caller passes that flag on every
/// call; it only ever changes at a record boundary.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    buf: Vec<u8>,
}

impl ReassemblyBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared payload length, once the prefix is complete.
    pub fn record_len(&self) -> Option<u16> {
        if self.buf.len() < 2 {
            return None;
        }
        Some(u16::from_le_bytes([self.buf[0], self.buf[1]]))
    }

    fn wire_len(&self, encrypted: bool) -> Option<usize> {
        let overhead = if encrypted {
            STREAM_OVERHEAD
        } else {
            STREAM_HEADER_LEN
        };
        self.record_len().map(|len| len as usize + overhead)
    }

    /// Feed bytes into the buffer, consuming at most one record's worth.
    ///
    /// Returns the number of bytes taken from `data`.
    pub fn feed(&mut self, data: &[u8], encrypted: bool) -> usize {
        let mut consumed = 0;

        if self.buf.len() < 2 {
            let take = (2 - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            consumed = take;
        }

        if let Some(total) = self.wire_len(encrypted) {
            let take = (total - self.buf.len()).min(data.len() - consumed);
            self.buf.extend_from_slice(&data[consumed..consumed + take]);
            consumed += take;
        }

        consumed
    }

    /// Whether a complete record is buffered.
    pub fn is_complete(&self, encrypted: bool) -> bool {
        self.wire_len(encrypted)
            .map_or(false, |total| self.buf.len() >= total)
    }

    /// Take the buffered record (`len ‖ body`) and reset for the next one.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sptps_crypto::aead::KEY_MATERIAL_LEN;
    use sptps_crypto::CipherSuite;

    fn cipher() -> RecordCipher {
        let key = [0x55u8; KEY_MATERIAL_LEN];
        RecordCipher::new(CipherSuite::ChaCha20Poly1305, &key, false).unwrap()
    }

    #[test]
    fn test_encode_stream_plaintext_layout() {
        let frame = encode_stream(3, b"hello", 0, None).unwrap();
        assert_eq!(frame.len(), 5 + STREAM_HEADER_LEN);
        assert_eq!(&frame[..2], &5u16.to_le_bytes());
        assert_eq!(frame[2], 3);
        assert_eq!(&frame[3..], b"hello");
    }

    #[test]
    fn test_encode_stream_encrypted_size() {
        let cipher = cipher();
        let frame = encode_stream(0, b"hello", 1, Some(&cipher)).unwrap();
        assert_eq!(frame.len(), 5 + STREAM_OVERHEAD);
        // Length prefix stays in the clear.
        assert_eq!(&frame[..2], &5u16.to_le_bytes());
        // The body decrypts back to type ‖ payload.
        let plaintext = cipher.decrypt(1, &frame[2..]).unwrap();
        assert_eq!(&*plaintext, b"\0hello");
    }

    #[test]
    fn test_encode_datagram_layouts() {
        let frame = encode_datagram(7, b"dg", 0x01020304, None).unwrap();
        assert_eq!(frame.len(), 2 + DATAGRAM_HEADER_LEN);
        assert_eq!(&frame[..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(frame[4], 7);
        assert_eq!(&frame[5..], b"dg");

        let cipher = cipher();
        let frame = encode_datagram(7, b"dg", 9, Some(&cipher)).unwrap();
        assert_eq!(frame.len(), 2 + DATAGRAM_OVERHEAD);
        assert_eq!(&frame[..4], &9u32.to_le_bytes());
        let plaintext = cipher.decrypt(9, &frame[4..]).unwrap();
        assert_eq!(&*plaintext, b"\x07dg");
    }

    #[test]
    fn test_reassembly_single_pass() {
        let mut buf = ReassemblyBuffer::new();
        let frame = encode_stream(1, b"abc", 0, None).unwrap();

        assert_eq!(buf.feed(&frame, false), frame.len());
        assert!(buf.is_complete(false));
        assert_eq!(buf.record_len(), Some(3));
        assert_eq!(buf.take(), frame);
        assert!(!buf.is_complete(false));
    }

    #[test]
    fn test_reassembly_byte_by_byte() {
        let mut buf = ReassemblyBuffer::new();
        let frame = encode_stream(1, b"abcdef", 0, None).unwrap();

        for (i, byte) in frame.iter().enumerate() {
            assert!(!buf.is_complete(false), "complete after {i} bytes");
            assert_eq!(buf.feed(std::slice::from_ref(byte), false), 1);
        }
        assert!(buf.is_complete(false));
    }

    #[test]
    fn test_reassembly_stops_at_record_boundary() {
        let mut buf = ReassemblyBuffer::new();
        let mut bytes = encode_stream(1, b"one", 0, None).unwrap();
        bytes.extend_from_slice(&encode_stream(2, b"two", 1, None).unwrap());

        let consumed = buf.feed(&bytes, false);
        assert_eq!(consumed, 3 + STREAM_HEADER_LEN);
        assert!(buf.is_complete(false));

        let record = buf.take();
        assert_eq!(record[2], 1);

        let consumed2 = buf.feed(&bytes[consumed..], false);
        assert_eq!(consumed2, 3 + STREAM_HEADER_LEN);
        assert!(buf.is_complete(false));
        assert_eq!(buf.take()[2], 2);
    }

    #[test]
    fn test_reassembly_zero_length_record() {
        let mut buf = ReassemblyBuffer::new();
        let frame = encode_stream(5, b"", 0, None).unwrap();
        assert_eq!(frame.len(), STREAM_HEADER_LEN);

        buf.feed(&frame, false);
        assert!(buf.is_complete(false));
        assert_eq!(buf.record_len(), Some(0));
    }

    #[test]
    fn test_reassembly_encrypted_needs_tag() {
        let mut buf = ReassemblyBuffer::new();
        let cipher = cipher();
        let frame = encode_stream(0, b"xyz", 0, Some(&cipher)).unwrap();

        // Everything but the tag's last byte: not complete yet.
        buf.feed(&frame[..frame.len() - 1], true);
        assert!(!buf.is_complete(true));
        buf.feed(&frame[frame.len() - 1..], true);
        assert!(buf.is_complete(true));
    }
}
