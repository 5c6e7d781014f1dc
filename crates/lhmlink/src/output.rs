use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use lhmlink_protocol::{Connect, OwnedMessage, PluginInfo, Plugins, Sensors};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_message(message: &OwnedMessage, format: OutputFormat) {
    println!("{}", render_message(message, format));
}

pub fn render_message(message: &OwnedMessage, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(message).unwrap_or(serde_json::Value::Null);
            if let serde_json::Value::Object(fields) = &mut value {
                fields.insert("id".to_string(), message.id().as_u32().into());
            }
            value.to_string()
        }
        OutputFormat::Table => match message {
            OwnedMessage::Connect(m) => connect_table(m).to_string(),
            OwnedMessage::Plugins(m) => plugins_table(m).to_string(),
            OwnedMessage::Sensors(m) => sensors_table(m).to_string(),
        },
        OutputFormat::Pretty => match message {
            OwnedMessage::Connect(m) => format!(
                "Connect version={} surface={:#x} size={}x{}",
                m.version, m.render_surface.0, m.render_size.width, m.render_size.height
            ),
            OwnedMessage::Plugins(m) => format!(
                "Plugins sensor=[{}] widget=[{}]",
                plugin_names(&m.sensor_plugin_infos),
                plugin_names(&m.widget_plugin_infos)
            ),
            OwnedMessage::Sensors(m) => {
                let mut line = String::from("Sensors");
                for (plugin, sensors) in m.sensor_plugin_refs.iter().zip(&m.sensors) {
                    line.push_str(&format!(" plugin={}:", plugin.0));
                    for sensor in sensors {
                        line.push_str(&format!(" {}={}", sensor.name, sensor.value_string));
                    }
                }
                line
            }
        },
    }
}

/// Print a value as JSON, or as a two-column table of its top-level fields.
pub fn print_summary<T: Serialize>(summary: &T, format: OutputFormat) {
    let value = serde_json::to_value(summary).unwrap_or(serde_json::Value::Null);
    match format {
        OutputFormat::Json => println!("{value}"),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            if let serde_json::Value::Object(fields) = &value {
                for (key, field) in fields {
                    table.add_row(vec![key.clone(), plain(field)]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if let serde_json::Value::Object(fields) = &value {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(key, field)| format!("{key}={}", plain(field)))
                    .collect();
                println!("{}", parts.join(" "));
            }
        }
    }
}

fn connect_table(m: &Connect) -> Table {
    let mut table = new_table(vec!["MESSAGE", "VERSION", "SURFACE", "SIZE"]);
    table.add_row(vec![
        "Connect".to_string(),
        m.version.to_string(),
        format!("{:#x}", m.render_surface.0),
        format!("{}x{}", m.render_size.width, m.render_size.height),
    ]);
    table
}

fn plugins_table(m: &Plugins) -> Table {
    let mut table = new_table(vec!["KIND", "REF", "NAME", "AUTHOR", "VERSION"]);
    let sensor = m
        .sensor_plugin_refs
        .iter()
        .map(|r| r.0)
        .zip(&m.sensor_plugin_infos)
        .map(|(r, info)| ("sensor", r, info));
    let widget = m
        .widget_plugin_refs
        .iter()
        .map(|r| r.0)
        .zip(&m.widget_plugin_infos)
        .map(|(r, info)| ("widget", r, info));
    for (kind, plugin_ref, info) in sensor.chain(widget) {
        table.add_row(vec![
            kind.to_string(),
            plugin_ref.to_string(),
            info.name.clone(),
            info.author.clone(),
            info.version.to_string(),
        ]);
    }
    table
}

fn sensors_table(m: &Sensors) -> Table {
    let mut table = new_table(vec!["PLUGIN", "NAME", "IDENTIFIER", "VALUE", "MIN", "MAX"]);
    for (plugin, sensors) in m.sensor_plugin_refs.iter().zip(&m.sensors) {
        for sensor in sensors {
            table.add_row(vec![
                plugin.0.to_string(),
                sensor.name.clone(),
                sensor.identifier.clone(),
                sensor.value_string.clone(),
                sensor.min_value.to_string(),
                sensor.max_value.to_string(),
            ]);
        }
    }
    table
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn plugin_names(infos: &[PluginInfo]) -> String {
    infos
        .iter()
        .map(|info| format!("{} v{}", info.name, info.version))
        .collect::<Vec<_>>()
        .join(", ")
}

fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lhmlink_protocol::{Sensor, SensorPluginRef, Size, SurfaceHandle};

    fn connect() -> OwnedMessage {
        OwnedMessage::Connect(Connect {
            version: 1,
            render_surface: SurfaceHandle(0xDEAD_BEEF),
            render_size: Size {
                width: 320,
                height: 240,
            },
        })
    }

    #[test]
    fn json_carries_id_and_type() {
        let json: serde_json::Value =
            serde_json::from_str(&render_message(&connect(), OutputFormat::Json)).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["type"], "Connect");
        assert_eq!(json["body"]["render_surface"], 0xDEAD_BEEFu64);
    }

    #[test]
    fn pretty_is_one_line() {
        let line = render_message(&connect(), OutputFormat::Pretty);
        assert_eq!(line, "Connect version=1 surface=0xdeadbeef size=320x240");
    }

    #[test]
    fn sensor_table_lists_every_sensor() {
        let message = OwnedMessage::Sensors(Sensors {
            sensor_plugin_refs: vec![SensorPluginRef(4)],
            sensors: vec![vec![
                Sensor {
                    name: "CPU".into(),
                    value_string: "40.0 °C".into(),
                    ..Sensor::default()
                },
                Sensor {
                    name: "GPU".into(),
                    value_string: "55.5 °C".into(),
                    ..Sensor::default()
                },
            ]],
        });
        let table = render_message(&message, OutputFormat::Table);
        assert!(table.contains("CPU"));
        assert!(table.contains("55.5 °C"));
    }
}
