//! The message catalog.
//!
//! Both peers share the numeric identifiers below and the fixed order
//! `Connect → Plugins → Sensors → Null`. Identifiers are explicit; they are
//! never derived from type names.

use std::fmt;

use lhmlink_codec::{wire_struct, MeasureStream, ReadStream, Wire, WriteStream};
use serde::{Deserialize, Serialize};

/// Stable wire identifier of each message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageId {
    /// Sentinel marking the end of the conversation. Never sent.
    Null = 0,
    Connect = 1,
    Plugins = 2,
    Sensors = 3,
}

impl MessageId {
    /// The conversation order.
    pub const ORDER: [MessageId; 4] = [
        MessageId::Connect,
        MessageId::Plugins,
        MessageId::Sensors,
        MessageId::Null,
    ];

    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Null),
            1 => Some(Self::Connect),
            2 => Some(Self::Plugins),
            3 => Some(Self::Sensors),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// The identifier that follows this one. `Null` is terminal.
    pub fn next(self) -> Self {
        match self {
            Self::Connect => Self::Plugins,
            Self::Plugins => Self::Sensors,
            Self::Sensors | Self::Null => Self::Null,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "Null",
            Self::Connect => "Connect",
            Self::Plugins => "Plugins",
            Self::Sensors => "Sensors",
        })
    }
}

/// A catalog entry: a [`Wire`] type with a fixed identifier.
pub trait Message: Wire {
    const ID: MessageId;
}

macro_rules! wire_newtype {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl Wire for $name {
            const FIXED_SIZE: usize = <$inner as Wire>::FIXED_SIZE;
            const FIXED_ONLY: bool = <$inner as Wire>::FIXED_ONLY;
            type View<'a> = Self;

            fn measure(&self, stream: &mut MeasureStream) {
                self.0.measure(stream);
            }

            fn write(&self, stream: &mut WriteStream) -> lhmlink_codec::Result<()> {
                self.0.write(stream)
            }

            fn read<'a>(stream: &mut ReadStream<'a>) -> lhmlink_codec::Result<Self> {
                <$inner as Wire>::read(stream).map(Self)
            }

            fn to_owned_value(view: &Self) -> Self {
                *view
            }
        }
    };
}

wire_newtype! {
    /// Opaque handle of the shared render surface. Always 64 bits on the
    /// wire, whatever the platform's pointer width.
    SurfaceHandle(u64)
}

wire_newtype! {
    /// Host-assigned reference to a sensor plugin.
    SensorPluginRef(u32)
}

wire_newtype! {
    /// Host-assigned reference to a widget plugin.
    WidgetPluginRef(u32)
}

wire_struct! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Size {
        pub width: u32,
        pub height: u32,
    }
}

wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PluginInfo => PluginInfoView {
        pub name: String,
        pub author: String,
        pub version: u32,
    }
}

wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Sensor => SensorView {
        pub name: String,
        pub identifier: String,
        pub value_string: String,
        pub value: f32,
        pub min_value: f32,
        pub max_value: f32,
    }
}

wire_struct! {
    /// Handshake: the host announces itself and its render surface.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Connect {
        pub version: u32,
        pub render_surface: SurfaceHandle,
        pub render_size: Size,
    }
}

wire_struct! {
    /// Directory of loaded plugins. Refs and infos are parallel lists.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Plugins => PluginsView {
        pub sensor_plugin_refs: Vec<SensorPluginRef>,
        pub sensor_plugin_infos: Vec<PluginInfo>,
        pub widget_plugin_refs: Vec<WidgetPluginRef>,
        pub widget_plugin_infos: Vec<PluginInfo>,
    }
}

wire_struct! {
    /// Sensor snapshot, one sensor list per plugin ref.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Sensors => SensorsView {
        pub sensor_plugin_refs: Vec<SensorPluginRef>,
        pub sensors: Vec<Vec<Sensor>>,
    }
}

wire_struct! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Null {}
}

impl Message for Connect {
    const ID: MessageId = MessageId::Connect;
}

impl Message for Plugins {
    const ID: MessageId = MessageId::Plugins;
}

impl Message for Sensors {
    const ID: MessageId = MessageId::Sensors;
}

impl Message for Null {
    const ID: MessageId = MessageId::Null;
}

/// A message decoded in place, borrowing from the receive buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage<'a> {
    Connect(Connect),
    Plugins(PluginsView<'a>),
    Sensors(SensorsView<'a>),
}

impl DecodedMessage<'_> {
    pub fn id(&self) -> MessageId {
        match self {
            Self::Connect(_) => MessageId::Connect,
            Self::Plugins(_) => MessageId::Plugins,
            Self::Sensors(_) => MessageId::Sensors,
        }
    }

    /// Copy out of the receive buffer so the message can outlive it.
    pub fn to_owned_message(&self) -> OwnedMessage {
        match self {
            Self::Connect(m) => OwnedMessage::Connect(*m),
            Self::Plugins(view) => OwnedMessage::Plugins(Plugins::to_owned_value(view)),
            Self::Sensors(view) => OwnedMessage::Sensors(Sensors::to_owned_value(view)),
        }
    }
}

/// A decoded message that owns its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum OwnedMessage {
    Connect(Connect),
    Plugins(Plugins),
    Sensors(Sensors),
}

impl OwnedMessage {
    pub fn id(&self) -> MessageId {
        match self {
            Self::Connect(_) => MessageId::Connect,
            Self::Plugins(_) => MessageId::Plugins,
            Self::Sensors(_) => MessageId::Sensors,
        }
    }
}
