//! `vkvm-cli`: a terminal smoke-test tool for the host driver, trading the
//! GUI shell's toolbars and SVG icons (out of scope for the core) for a
//! handful of subcommands that each make one driver call and print the
//! typed result. Never touches the frame codec or serial port directly —
//! everything goes through `vkvm_host::VkvmDriver`.

mod ascii;
mod error;
mod events;

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use vkvm_host::{DriverConfig, VkvmDriver};
use vkvm_protocol::catalog::{mouse_button, DisconnectReason, PeripheryResult, PROTOCOL_VERSION};
use vkvm_protocol::hidkeys::write_modifier;

use error::CliError;
use events::{CliCallbacks, CliEvent};

#[derive(Parser)]
#[command(name = "vkvm-cli", about = "Manual smoke-test tool for the VKVM host driver")]
struct Cli {
    /// Serial device path, e.g. /dev/ttyUSB0 or COM3. Required unless --list-ports is given.
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = vkvm_protocol::catalog::BAUD_RATE)]
    baud: u32,

    #[arg(long = "timeout-ms", default_value_t = vkvm_host::config::DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    #[arg(long = "tick-ms", default_value_t = vkvm_host::config::DEFAULT_TICK_MS)]
    tick_ms: u64,

    /// List available serial ports and exit; ignores every other argument.
    #[arg(long = "list-ports")]
    list_ports: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Confirm the protocol handshake and print the negotiated version.
    Version,
    /// Print the periphery's current keyboard LED mask.
    Leds,
    /// Type a string through `SET_KEYBOARD_WRITE`, one character at a time.
    Type { text: String },
    /// Move the mouse by a relative (dx, dy) in the range -127..=127.
    MoveRel { dx: i8, dy: i8 },
    /// Push (press then release) one mouse button: left, right, or middle.
    Click { button: String },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if cli.list_ports {
        return list_ports();
    }

    let Some(port) = cli.port.clone() else {
        eprintln!("error: --port is required (or pass --list-ports)");
        std::process::exit(2);
    };
    let Some(command) = cli.command else {
        eprintln!("error: a subcommand is required (version, leds, type, move-rel, click)");
        std::process::exit(2);
    };

    let (tx, rx) = std::sync::mpsc::channel();
    let callbacks = Arc::new(CliCallbacks::new(tx));
    let driver = VkvmDriver::new(callbacks);

    let config = DriverConfig::new(port.clone()).with_baud(cli.baud).with_timeout_ms(cli.timeout_ms).with_tick_ms(cli.tick_ms);
    let timeout = Duration::from_millis(cli.timeout_ms);

    if !driver.open(config) {
        let reason = drain_disconnect_reason(&rx).unwrap_or(DisconnectReason::SendError);
        return Err(CliError::OpenFailed { path: port, reason });
    }

    wait_connected(&rx, timeout * 3)?;
    let outcome = run_command(&driver, &rx, command, timeout);
    driver.close();
    outcome
}

fn list_ports() -> Result<(), CliError> {
    for port in serialport::available_ports()? {
        println!("{}", port.port_name);
    }
    Ok(())
}

/// A disconnect callback fired synchronously from `open()`'s failure path
/// lands in the channel before `open()` returns, so a non-blocking drain is
/// enough to recover the reason.
fn drain_disconnect_reason(rx: &Receiver<CliEvent>) -> Option<DisconnectReason> {
    while let Ok(event) = rx.try_recv() {
        if let CliEvent::Disconnected(reason) = event {
            return Some(reason);
        }
    }
    None
}

fn wait_connected(rx: &Receiver<CliEvent>, budget: Duration) -> Result<(), CliError> {
    wait_for(rx, budget, |event| match event {
        CliEvent::Connected => Some(()),
        _ => None,
    })
}

/// Blocks until `matcher` recognizes an event, a disconnect arrives, or
/// `budget` elapses. Events the matcher doesn't care about (e.g. the
/// automatic `GET_USB_STATE`/`GET_KEYBOARD_LEDS` sync after a fresh
/// handshake) are silently skipped.
fn wait_for<T>(rx: &Receiver<CliEvent>, budget: Duration, matcher: impl Fn(&CliEvent) -> Option<T>) -> Result<T, CliError> {
    let deadline = Instant::now() + budget;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::Timeout);
        }
        match rx.recv_timeout(remaining) {
            Ok(CliEvent::Disconnected(reason)) => return Err(CliError::Disconnected(reason)),
            Ok(event) => {
                if let Some(value) = matcher(&event) {
                    return Ok(value);
                }
            }
            Err(RecvTimeoutError::Timeout) => return Err(CliError::Timeout),
            Err(RecvTimeoutError::Disconnected) => return Err(CliError::Timeout),
        }
    }
}

fn describe(result: PeripheryResult) -> &'static str {
    match result {
        PeripheryResult::Ok => "ok",
        PeripheryResult::BrokenFrame => "broken frame",
        PeripheryResult::UnsupportedReqType => "unsupported request",
        PeripheryResult::InvalidReqType => "invalid request",
        PeripheryResult::InvalidFieldValue => "invalid field value",
        PeripheryResult::HostWriteError => "periphery USB not ready",
    }
}

fn run_command(driver: &VkvmDriver, rx: &Receiver<CliEvent>, command: Command, timeout: Duration) -> Result<(), CliError> {
    match command {
        Command::Version => {
            println!("connected, protocol version {:#06x}", PROTOCOL_VERSION);
            Ok(())
        }
        Command::Leds => {
            driver.refresh_keyboard_leds()?;
            let (result, leds) = wait_for(rx, timeout * 2, |event| match event {
                CliEvent::KeyboardLeds(result, leds) => Some((*result, *leds)),
                _ => None,
            })?;
            println!("keyboard leds: {:#04x} ({})", leds, describe(result));
            Ok(())
        }
        Command::Type { text } => type_text(driver, rx, &text, timeout),
        Command::MoveRel { dx, dy } => {
            driver.mouse_move_rel(dx, dy)?;
            let (result, echo_dx, echo_dy) = wait_for(rx, timeout * 2, |event| match event {
                CliEvent::MouseMoveRel(result, dx, dy) => Some((*result, *dx, *dy)),
                _ => None,
            })?;
            println!("moved ({echo_dx}, {echo_dy}): {}", describe(result));
            Ok(())
        }
        Command::Click { button } => {
            let code = parse_button(&button)?;
            driver.mouse_button_push(&[code])?;
            let (result, count) = wait_for(rx, timeout * 2, |event| match event {
                CliEvent::MouseButtonPush(result, count) => Some((*result, *count)),
                _ => None,
            })?;
            println!("clicked {button}: {} ({})", if count > 0 { "accepted" } else { "rejected" }, describe(result));
            Ok(())
        }
    }
}

fn parse_button(name: &str) -> Result<u8, CliError> {
    match name.to_ascii_lowercase().as_str() {
        "left" => Ok(mouse_button::LEFT),
        "right" => Ok(mouse_button::RIGHT),
        "middle" => Ok(mouse_button::MIDDLE),
        other => Err(CliError::UnknownButton(other.to_string())),
    }
}

fn type_text(driver: &VkvmDriver, rx: &Receiver<CliEvent>, text: &str, timeout: Duration) -> Result<(), CliError> {
    let mut typed = 0u32;
    let mut skipped = 0u32;
    for byte in text.bytes() {
        let Some((key, shift)) = ascii::ascii_to_hid(byte) else {
            skipped += 1;
            continue;
        };
        let modifier = if shift { write_modifier::LEFT_SHIFT } else { write_modifier::NONE };
        driver.keyboard_write(modifier, &[key])?;
        let (result, count) = wait_for(rx, timeout * 2, |event| match event {
            CliEvent::KeyboardWrite(result, count) => Some((*result, *count)),
            _ => None,
        })?;
        if result == PeripheryResult::Ok && count > 0 {
            typed += 1;
        } else {
            skipped += 1;
        }
    }
    println!("typed {typed} character(s), skipped {skipped}");
    Ok(())
}
