use std::sync::atomic::Ordering;
use std::thread;

use bytes::BytesMut;
use lhmlink_protocol::{
    Connect, Link, LinkEvent, MessageId, PluginInfo, Plugins, Sensor, SensorPluginRef, Sensors,
    Size, SurfaceHandle, WidgetPluginRef,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, HostArgs};
use crate::exit::{protocol_error, CliResult, SUCCESS};
use crate::output::{print_summary, OutputFormat};

#[derive(Serialize)]
struct HostSummary {
    pipe: String,
    ticks: u64,
    connections: u64,
    messages_sent: u64,
    conversations_completed: u64,
}

pub fn run(args: HostArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.link_config();
    let interval = args.link.tick_interval()?;
    let mut link =
        Link::server(&config).map_err(|err| protocol_error("create server pipe failed", err))?;
    info!(pipe = %config.pipe_name, address = %link.pipe().address(), "hosting");

    let demo = DemoHost {
        connect: Connect {
            version: config.version,
            render_surface: SurfaceHandle(args.surface),
            render_size: Size {
                width: args.width,
                height: args.height,
            },
        },
    };

    let running = install_ctrlc_handler()?;
    let mut summary = HostSummary {
        pipe: config.pipe_name.clone(),
        ticks: 0,
        connections: 0,
        messages_sent: 0,
        conversations_completed: 0,
    };
    let mut scratch = BytesMut::new();

    while running.load(Ordering::SeqCst) && args.link.within_budget(summary.ticks + 1) {
        summary.ticks += 1;
        if let Err(err) = host_tick(&mut link, &demo, &mut summary, &mut scratch) {
            if err.is_fatal() {
                return Err(protocol_error("link failed", err));
            }
            warn!(error = %err, "link error, dropping view");
            link.disconnect()
                .map_err(|err| protocol_error("disconnect failed", err))?;
        }
        thread::sleep(interval);
    }

    print_summary(&summary, format);
    Ok(SUCCESS)
}

fn host_tick(
    link: &mut Link,
    demo: &DemoHost,
    summary: &mut HostSummary,
    scratch: &mut BytesMut,
) -> lhmlink_protocol::Result<()> {
    if link.update()? == LinkEvent::Connected {
        summary.connections += 1;
    }

    // Nothing flows back from the view, but reading notices when it leaves.
    let _ = link.receive(scratch)?;

    let tick = summary.ticks;
    let sent = match link.send_expected() {
        MessageId::Connect => link.send(&demo.connect)?,
        MessageId::Plugins => link.send(&demo.plugins())?,
        MessageId::Sensors => link.send(&demo.sensors(tick))?,
        MessageId::Null => return Ok(()),
    };

    if sent.is_success() {
        summary.messages_sent += 1;
        if link.send_expected() == MessageId::Null {
            summary.conversations_completed += 1;
            info!("conversation complete, idling until the view reconnects");
        }
    }
    Ok(())
}

/// Canned plugin and sensor data standing in for a real collector.
struct DemoHost {
    connect: Connect,
}

const DEMO_SENSOR_PLUGIN: SensorPluginRef = SensorPluginRef(1);
const DEMO_NETWORK_PLUGIN: SensorPluginRef = SensorPluginRef(2);
const DEMO_WIDGET_PLUGIN: WidgetPluginRef = WidgetPluginRef(1);

impl DemoHost {
    fn plugins(&self) -> Plugins {
        Plugins {
            sensor_plugin_refs: vec![DEMO_SENSOR_PLUGIN, DEMO_NETWORK_PLUGIN],
            sensor_plugin_infos: vec![
                plugin_info("OHM Sensors", "akbyrd", 1),
                plugin_info("Network Stats", "lhmlink", 1),
            ],
            widget_plugin_refs: vec![DEMO_WIDGET_PLUGIN],
            widget_plugin_infos: vec![plugin_info("Filled Bar", "akbyrd", 1)],
        }
    }

    /// Values drift with `tick` so successive conversations differ.
    fn sensors(&self, tick: u64) -> Sensors {
        let phase = (tick % 20) as f32;
        Sensors {
            sensor_plugin_refs: vec![DEMO_SENSOR_PLUGIN, DEMO_NETWORK_PLUGIN],
            sensors: vec![
                vec![
                    sensor("CPU Package", "/intelcpu/0/temperature/0", 42.0 + phase * 0.5, 30.0, 95.0, "°C"),
                    sensor("CPU Total", "/intelcpu/0/load/0", 12.0 + phase, 0.0, 100.0, "%"),
                    sensor("GPU Core", "/nvidiagpu/0/temperature/0", 51.0 + phase * 0.25, 30.0, 90.0, "°C"),
                ],
                vec![sensor("Download", "/nic/0/throughput/1", 120.0 + phase * 8.0, 0.0, 1000.0, "KB/s")],
            ],
        }
    }
}

fn plugin_info(name: &str, author: &str, version: u32) -> PluginInfo {
    PluginInfo {
        name: name.to_string(),
        author: author.to_string(),
        version,
    }
}

fn sensor(name: &str, identifier: &str, value: f32, min_value: f32, max_value: f32, unit: &str) -> Sensor {
    Sensor {
        name: name.to_string(),
        identifier: identifier.to_string(),
        value_string: format!("{value:.1} {unit}"),
        value,
        min_value,
        max_value,
    }
}
