//! Message-mode framing over byte-stream sockets.
//!
//! Windows named pipes preserve message boundaries natively. Unix stream
//! sockets do not, so every write is wrapped in a record:
//!
//! ```text
//! ┌──────────────┬──────────────────┐
//! │ Length (4B)  │ Message          │
//! │ LE           │ (Length bytes)   │
//! └──────────────┴──────────────────┘
//! ```
//!
//! The record prefix never leaves the transport.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PipeError, Result};

/// Record prefix: length (4) = 4 bytes.
pub const RECORD_PREFIX_SIZE: usize = 4;

/// Append one record carrying `message` to `dst`.
pub fn encode_record(message: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(message.len()).map_err(|_| PipeError::OutboundTooLarge {
        size: message.len(),
    })?;
    dst.reserve(RECORD_PREFIX_SIZE + message.len());
    dst.put_u32_le(len);
    dst.put_slice(message);
    Ok(())
}

/// Split the next complete record off the front of `src`.
///
/// Returns `Ok(None)` if `src` doesn't hold a complete record yet.
pub fn decode_record(src: &mut BytesMut, max_message: usize) -> Result<Option<Bytes>> {
    if src.len() < RECORD_PREFIX_SIZE {
        return Ok(None);
    }

    let mut prefix = [0u8; RECORD_PREFIX_SIZE];
    prefix.copy_from_slice(&src[..RECORD_PREFIX_SIZE]);
    let len = u32::from_le_bytes(prefix) as usize;

    if len > max_message {
        return Err(PipeError::MessageTooLarge {
            size: len,
            max: max_message,
        });
    }

    if src.len() < RECORD_PREFIX_SIZE + len {
        return Ok(None);
    }

    src.advance(RECORD_PREFIX_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_message_unchanged() {
        let mut buf = BytesMut::new();
        encode_record(b"sensor snapshot", &mut buf).unwrap();
        assert_eq!(buf.len(), RECORD_PREFIX_SIZE + 15);

        let message = decode_record(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(message.as_ref(), b"sensor snapshot");
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_prefix_waits() {
        let mut buf = BytesMut::from(&[0x05, 0x00][..]);
        assert!(decode_record(&mut buf, 1024).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn incomplete_message_waits() {
        let mut buf = BytesMut::new();
        encode_record(b"hello", &mut buf).unwrap();
        buf.truncate(RECORD_PREFIX_SIZE + 2);

        assert!(decode_record(&mut buf, 1024).unwrap().is_none());
        assert_eq!(buf.len(), RECORD_PREFIX_SIZE + 2);
    }

    #[test]
    fn back_to_back_records_keep_boundaries() {
        let mut buf = BytesMut::new();
        encode_record(b"first", &mut buf).unwrap();
        encode_record(b"", &mut buf).unwrap();
        encode_record(b"third", &mut buf).unwrap();

        let first = decode_record(&mut buf, 1024).unwrap().unwrap();
        let empty = decode_record(&mut buf, 1024).unwrap().unwrap();
        let third = decode_record(&mut buf, 1024).unwrap().unwrap();

        assert_eq!(first.as_ref(), b"first");
        assert!(empty.is_empty());
        assert_eq!(third.as_ref(), b"third");
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_record_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(4096);

        let err = decode_record(&mut buf, 16).unwrap_err();
        assert!(matches!(
            err,
            PipeError::MessageTooLarge { size: 4096, max: 16 }
        ));
    }
}
