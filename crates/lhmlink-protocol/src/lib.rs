//! Message catalog, sequencing and per-tick send/receive for the GUI link.
//!
//! The render host sends `Connect`, `Plugins` and `Sensors` in that order;
//! the GUI accepts them in the same order. Each side tracks its position
//! with its own [`Sequencer`]. There are no acknowledgements: the sender
//! repeats a message every tick until its write succeeds, and the receiver
//! drops anything it didn't expect.

pub mod error;
pub mod exchange;
pub mod link;
pub mod messages;
pub mod sequencer;

pub use error::{ProtocolError, Rejection, Result};
pub use exchange::{decode_message, receive_message, send_message};
pub use link::{Link, LinkConfig, LinkEvent, DEFAULT_PIPE_NAME, PROTOCOL_VERSION};
pub use messages::{
    Connect, DecodedMessage, Message, MessageId, Null, OwnedMessage, PluginInfo, PluginInfoView,
    Plugins, PluginsView, Sensor, SensorPluginRef, SensorView, Sensors, SensorsView, Size,
    SurfaceHandle, WidgetPluginRef,
};
pub use sequencer::Sequencer;
