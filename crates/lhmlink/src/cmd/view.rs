use std::sync::atomic::Ordering;
use std::thread;

use bytes::BytesMut;
use lhmlink_protocol::{Link, LinkEvent, MessageId};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, ViewArgs};
use crate::exit::{protocol_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ViewArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.link_config();
    let interval = args.link.tick_interval()?;
    let mut link =
        Link::client(&config).map_err(|err| protocol_error("create client pipe failed", err))?;
    info!(pipe = %config.pipe_name, address = %link.pipe().address(), "viewing");

    let running = install_ctrlc_handler()?;
    let mut buffer = BytesMut::new();
    let mut tick = 0u64;
    let mut completed = 0u64;

    while running.load(Ordering::SeqCst) && args.link.within_budget(tick + 1) {
        tick += 1;
        match view_tick(&mut link, &mut buffer, format) {
            Ok(true) => {
                completed += 1;
                if !args.follow {
                    return Ok(SUCCESS);
                }
            }
            Ok(false) => {}
            Err(err) if err.is_fatal() => return Err(protocol_error("link failed", err)),
            Err(err) => {
                warn!(error = %err, "link error, reconnecting");
                link.disconnect()
                    .map_err(|err| protocol_error("disconnect failed", err))?;
            }
        }
        thread::sleep(interval);
    }

    if !running.load(Ordering::SeqCst) || (args.follow && completed > 0) {
        return Ok(SUCCESS);
    }
    Err(CliError::new(
        TIMEOUT,
        format!(
            "conversation incomplete after {tick} ticks (waiting for {})",
            link.recv_expected()
        ),
    ))
}

/// Returns true when this tick completed a conversation.
fn view_tick(
    link: &mut Link,
    buffer: &mut BytesMut,
    format: OutputFormat,
) -> lhmlink_protocol::Result<bool> {
    match link.update()? {
        LinkEvent::Connected => info!("attached to host"),
        LinkEvent::Disconnected => info!("host went away"),
        LinkEvent::Unchanged => {}
    }

    let Some(message) = link.receive(buffer)? else {
        return Ok(false);
    };
    print_message(&message.to_owned_message(), format);
    Ok(link.recv_expected() == MessageId::Null)
}
