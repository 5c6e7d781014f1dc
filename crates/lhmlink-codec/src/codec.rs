use bytes::Bytes;
use tracing::{error, trace};

use crate::error::{CodecError, Result};
use crate::stream::{MeasureStream, ReadStream, WriteStream};
use crate::wire::Wire;

/// Message header: id (4) + size (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// The fixed header at the start of every message.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬──────────────────────────────┐
/// │ Id       │ Size     │ Body                         │
/// │ (4B LE)  │ (4B LE)  │ (Size - 8 bytes)             │
/// └──────────┴──────────┴──────────────────────────────┘
/// ```
///
/// `size` counts the whole message, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u32,
    pub size: u32,
}

impl Header {
    /// Parse the header from the front of `bytes`.
    ///
    /// Returns `None` if fewer than [`HEADER_SIZE`] bytes are present.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let id = bytes.get(0..4)?;
        let size = bytes.get(4..8)?;
        Some(Self {
            id: u32::from_le_bytes([id[0], id[1], id[2], id[3]]),
            size: u32::from_le_bytes([size[0], size[1], size[2], size[3]]),
        })
    }
}

/// Total encoded size of `value` as a message, header included.
///
/// Measuring the same value twice always gives the same result.
pub fn measure<T: Wire>(value: &T) -> usize {
    let mut stream = MeasureStream::new();
    stream.add(HEADER_SIZE);
    value.measure(&mut stream);
    stream.cursor()
}

/// Encode `value` as a message with the given id.
///
/// The buffer is sized by a measure pass, allocated once, then filled. If
/// the write pass doesn't end exactly where the measure pass did, the
/// encoder is broken and a fatal [`CodecError::CursorMismatch`] comes back.
pub fn encode<T: Wire>(id: u32, value: &T) -> Result<Bytes> {
    let size = measure(value);
    let size_field = u32::try_from(size).map_err(|_| CodecError::TooLarge { size })?;

    let fixed_end = HEADER_SIZE + T::FIXED_SIZE;
    let mut stream = WriteStream::allocate(size, fixed_end)?;
    stream.put_fixed(&id.to_le_bytes())?;
    stream.put_fixed(&size_field.to_le_bytes())?;
    value.write(&mut stream)?;

    let bytes = stream.finish(fixed_end).inspect_err(|e| {
        error!(id, size, error = %e, "encoder cursor drifted from measured size");
    })?;
    trace!(id, size, "encoded message");
    Ok(bytes)
}

/// Decode the body of a message whose header was already validated.
///
/// The returned view borrows from `bytes`. Every field access is
/// bounds-checked, and trailing bytes past the body are an error.
pub fn decode<T: Wire>(bytes: &[u8]) -> Result<T::View<'_>> {
    let fixed_end = HEADER_SIZE + T::FIXED_SIZE;
    let mut stream = ReadStream::new(bytes, HEADER_SIZE, fixed_end)?;
    let view = T::read(&mut stream)?;
    stream.finish(fixed_end)?;
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamMode;

    crate::wire_struct! {
        #[derive(Debug, Clone, PartialEq)]
        struct Greeting => GreetingView {
            version: u32,
            names: Vec<String>,
        }
    }

    fn greeting() -> Greeting {
        Greeting {
            version: 3,
            names: vec![String::from("alpha"), String::from("beta")],
        }
    }

    #[test]
    fn header_parse_needs_eight_bytes() {
        assert!(Header::parse(&[1, 0, 0, 0, 8, 0, 0]).is_none());
        assert_eq!(
            Header::parse(&[1, 0, 0, 0, 8, 0, 0, 0, 0xAA]),
            Some(Header { id: 1, size: 8 })
        );
    }

    #[test]
    fn measure_is_idempotent() {
        let value = greeting();
        let first = measure(&value);
        assert_eq!(first, measure(&value));
        // header + version + count + two records + text
        assert_eq!(first, 8 + 4 + 4 + 8 + 9);
    }

    #[test]
    fn encode_writes_header_with_total_size() {
        let bytes = encode(7, &greeting()).unwrap();
        let header = Header::parse(&bytes).unwrap();
        assert_eq!(header.id, 7);
        assert_eq!(header.size as usize, bytes.len());
    }

    #[test]
    fn decode_borrows_from_buffer() {
        let bytes = encode(7, &greeting()).unwrap();
        let view = decode::<Greeting>(&bytes).unwrap();
        assert_eq!(view.version, 3);
        assert_eq!(view.names.get(1), Some("beta"));
        assert_eq!(Greeting::to_owned_value(&view), greeting());
    }

    #[test]
    fn decode_rejects_truncated_body() {
        let bytes = encode(7, &greeting()).unwrap();
        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            decode::<Greeting>(short).unwrap_err(),
            CodecError::Truncated {
                mode: StreamMode::Read,
                ..
            }
        ));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = encode(7, &greeting()).unwrap().to_vec();
        bytes.push(0);
        assert!(matches!(
            decode::<Greeting>(&bytes).unwrap_err(),
            CodecError::CursorMismatch {
                mode: StreamMode::Read,
                ..
            }
        ));
    }

    #[test]
    fn decode_rejects_corrupt_count() {
        let mut bytes = encode(7, &greeting()).unwrap().to_vec();
        bytes[12..16].copy_from_slice(&1000u32.to_le_bytes());
        assert!(decode::<Greeting>(&bytes).is_err());
    }

    #[test]
    fn floats_survive_bit_exact() {
        crate::wire_struct! {
            #[derive(Debug, Clone, Copy, PartialEq)]
            struct Reading {
                value: f32,
            }
        }

        for value in [0.1f32, -0.0, f32::MIN_POSITIVE, f32::MAX, f32::NAN] {
            let bytes = encode(1, &Reading { value }).unwrap();
            let view = decode::<Reading>(&bytes).unwrap();
            assert_eq!(view.value.to_bits(), value.to_bits());
        }
    }
}
