use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use lhmlink_pipe::PipeConfig;
use lhmlink_protocol::{LinkConfig, DEFAULT_PIPE_NAME};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod host;
pub mod version;
pub mod view;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play the render host: serve the pipe and push the conversation.
    Host(HostArgs),
    /// Play the GUI: connect to the pipe and print received messages.
    View(ViewArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Host(args) => host::run(args, format),
        Command::View(args) => view::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Options shared by both ends of the link.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Pipe name.
    #[arg(long, default_value = DEFAULT_PIPE_NAME)]
    pub pipe: String,
    /// Directory for the socket file (Unix only). Default: temp dir.
    #[arg(long, value_name = "DIR")]
    pub socket_dir: Option<PathBuf>,
    /// Time between ticks (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub tick: String,
    /// Stop after N ticks.
    #[arg(long)]
    pub ticks: Option<u64>,
}

impl LinkArgs {
    pub fn link_config(&self) -> LinkConfig {
        let mut pipe = PipeConfig::default();
        if let Some(dir) = &self.socket_dir {
            pipe = pipe.with_socket_dir(dir);
        }
        LinkConfig::default()
            .with_pipe_name(&self.pipe)
            .with_pipe_config(pipe)
    }

    pub fn tick_interval(&self) -> CliResult<Duration> {
        parse_duration(&self.tick)
    }

    /// Whether tick number `tick` (1-based) is still within `--ticks`.
    pub fn within_budget(&self, tick: u64) -> bool {
        self.ticks.is_none_or(|max| tick <= max)
    }
}

#[derive(Args, Debug)]
pub struct HostArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Render surface handle announced in Connect.
    #[arg(long, default_value_t = 0)]
    pub surface: u64,
    /// Render width announced in Connect.
    #[arg(long, default_value_t = 320)]
    pub width: u32,
    /// Render height announced in Connect.
    #[arg(long, default_value_t = 240)]
    pub height: u32,
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Keep running after the conversation completes and print each new
    /// conversation after a reconnect.
    #[arg(long)]
    pub follow: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Flag cleared on Ctrl-C so tick loops can exit cleanly.
pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, std::sync::atomic::Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}
