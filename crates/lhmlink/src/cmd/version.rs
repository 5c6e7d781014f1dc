use lhmlink_codec::HEADER_SIZE;
use lhmlink_protocol::{MessageId, DEFAULT_PIPE_NAME, PROTOCOL_VERSION};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("lhmlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let order: Vec<String> = MessageId::ORDER
        .iter()
        .map(|id| format!("{id}={}", id.as_u32()))
        .collect();

    println!("name: lhmlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("LHMLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("protocol_version: {PROTOCOL_VERSION}");
    println!("header_size: {HEADER_SIZE}");
    println!("message_order: {}", order.join(" -> "));
    println!("default_pipe: {DEFAULT_PIPE_NAME}");

    Ok(SUCCESS)
}
