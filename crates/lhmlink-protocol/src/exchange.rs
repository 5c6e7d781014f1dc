//! Sending and receiving one message per tick.

use bytes::BytesMut;
use lhmlink_codec::{decode, Header};
use lhmlink_pipe::{Pipe, PipeStatus};
use tracing::{debug, warn};

use crate::error::{Rejection, Result};
use crate::messages::{Connect, DecodedMessage, Message, MessageId, Plugins, Sensors};
use crate::sequencer::Sequencer;

/// Encode `message` and write it to `pipe`.
///
/// The sequencer advances only when the write succeeds. A transient result
/// or an error leaves it where it was, so the same message goes out again
/// next tick.
///
/// # Panics
///
/// If `M` isn't the message `sequencer` expects, or is the `Null` sentinel.
pub fn send_message<M: Message>(
    pipe: &mut Pipe,
    message: &M,
    sequencer: &mut Sequencer,
) -> Result<PipeStatus> {
    assert_ne!(M::ID, MessageId::Null, "the Null sentinel is never sent");
    assert_eq!(
        M::ID,
        sequencer.expected(),
        "sent {} out of order (expected {})",
        M::ID,
        sequencer.expected()
    );

    let bytes = lhmlink_codec::encode(M::ID.as_u32(), message)?;
    let status = pipe.write(&bytes)?;
    if status.is_success() {
        let next = sequencer.advance();
        debug!(pipe = %pipe.name(), id = %M::ID, size = bytes.len(), %next, "sent message");
    }
    Ok(status)
}

/// Read one message from `pipe` and decode it in place.
///
/// Returns `Ok(None)` when nothing arrived this tick or the message was
/// rejected. The decoded message borrows from `buffer`, which must stay
/// untouched until the caller is done with it.
pub fn receive_message<'a>(
    pipe: &mut Pipe,
    sequencer: &mut Sequencer,
    buffer: &'a mut BytesMut,
) -> Result<Option<DecodedMessage<'a>>> {
    if pipe.read(buffer)? == PipeStatus::Transient {
        return Ok(None);
    }

    let buffer: &'a BytesMut = buffer;
    match decode_message(buffer, sequencer.expected()) {
        Ok(message) => {
            let next = sequencer.advance();
            debug!(pipe = %pipe.name(), id = %message.id(), size = buffer.len(), %next, "received message");
            Ok(Some(message))
        }
        Err(rejection) => {
            warn!(pipe = %pipe.name(), size = buffer.len(), %rejection, "discarding message");
            Ok(None)
        }
    }
}

/// Validate and decode one complete message.
///
/// Checks the header length, the declared size against `bytes.len()`, and
/// the identifier against `expected` before decoding the body. Never reads
/// past `bytes`.
pub fn decode_message(
    bytes: &[u8],
    expected: MessageId,
) -> std::result::Result<DecodedMessage<'_>, Rejection> {
    let header = Header::parse(bytes).ok_or(Rejection::TooShort { len: bytes.len() })?;

    if header.size as usize != bytes.len() {
        return Err(Rejection::SizeMismatch {
            declared: header.size,
            actual: bytes.len(),
        });
    }

    let id = MessageId::from_u32(header.id).ok_or(Rejection::UnknownId { id: header.id })?;
    if id != expected || id == MessageId::Null {
        return Err(Rejection::UnexpectedId {
            expected,
            actual: id,
        });
    }

    let malformed = |source| Rejection::Malformed { id, source };
    let message = match id {
        MessageId::Connect => DecodedMessage::Connect(decode::<Connect>(bytes).map_err(malformed)?),
        MessageId::Plugins => DecodedMessage::Plugins(decode::<Plugins>(bytes).map_err(malformed)?),
        MessageId::Sensors => DecodedMessage::Sensors(decode::<Sensors>(bytes).map_err(malformed)?),
        MessageId::Null => unreachable!("Null rejected above"),
    };
    Ok(message)
}
