//! Named-pipe link between a sensor render host and its GUI.
//!
//! The host pushes a short, strictly ordered conversation over one pipe:
//! a `Connect` handshake, the plugin directory, then a sensor snapshot.
//! Messages are encoded into a single buffer and decoded in place.
//!
//! # Crate Structure
//!
//! - [`pipe`] - Non-blocking named pipe transport (named pipes, Unix sockets)
//! - [`codec`] - Measure/write/read message codec with borrowing views
//! - [`protocol`] - Message catalog, sequencer and per-tick send/receive

/// Re-export pipe types.
pub mod pipe {
    pub use lhmlink_pipe::*;
}

/// Re-export codec types.
pub mod codec {
    pub use lhmlink_codec::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use lhmlink_protocol::*;
}

#[cfg(test)]
mod tests {
    use super::codec::{decode, encode};
    use super::protocol::{Connect, Message, Size, SurfaceHandle};

    #[test]
    fn layers_compose_through_facade() {
        let message = Connect {
            version: 1,
            render_surface: SurfaceHandle(9),
            render_size: Size {
                width: 64,
                height: 32,
            },
        };
        let bytes = encode(Connect::ID.as_u32(), &message).unwrap();
        assert_eq!(decode::<Connect>(&bytes).unwrap(), message);
    }
}
