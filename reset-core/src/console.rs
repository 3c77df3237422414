//! Operator console shared between the firmware and emulator front-ends.
//!
//! Lines are parsed with `winnow` into [`ConsoleCommand`] values and executed
//! against an attached [`ResetDevice`], rendering responses into any
//! [`core::fmt::Write`] sink so the same text appears on USB and in the host
//! terminal.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, terminated};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{rest, take_while};

use crate::config::ResetPolarity;
use crate::contract::{RESET_ID, ResetControl, ResetId};
use crate::device::ResetDevice;
use crate::line::DigitalLine;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "write",
        "write <endpoint> [value]       - write to a control endpoint (reset, isp)",
    ),
    (
        "read",
        "read <endpoint>                - read a control endpoint (isp)",
    ),
    (
        "rc",
        "rc <assert|deassert|status|reset> [id] - invoke the reset contract",
    ),
    (
        "config",
        "config                         - show the resolved device configuration",
    ),
    (
        "trace",
        "trace                          - show recent line transitions",
    ),
    ("help", "help                           - show this list"),
];

/// Reset contract operation requested from the console.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ContractOp {
    Assert,
    Deassert,
    Status,
    Reset,
}

impl fmt::Display for ContractOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContractOp::Assert => "assert",
            ContractOp::Deassert => "deassert",
            ContractOp::Status => "status",
            ContractOp::Reset => "reset",
        })
    }
}

/// Parsed console line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand<'a> {
    Write { endpoint: &'a str, value: &'a str },
    Read { endpoint: &'a str },
    Contract { op: ContractOp, id: ResetId },
    Config,
    Trace,
    Help,
}

/// Console line that does not match the grammar.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConsoleParseError {
    /// Byte offset into the trimmed line where parsing stopped.
    pub offset: usize,
}

impl fmt::Display for ConsoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected input at column {}", self.offset + 1)
    }
}

/// Parses one console line.
///
/// # Errors
///
/// Returns the offset of the first byte the grammar could not consume.
pub fn parse(line: &str) -> Result<ConsoleCommand<'_>, ConsoleParseError> {
    terminated(command, (space0, eof))
        .parse(line.trim())
        .map_err(|error| ConsoleParseError {
            offset: error.offset(),
        })
}

fn command<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    alt((
        write_command,
        read_command,
        contract_command,
        "config".value(ConsoleCommand::Config),
        "trace".value(ConsoleCommand::Trace),
        "help".value(ConsoleCommand::Help),
    ))
    .parse_next(input)
}

fn write_command<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    let (endpoint, value) = preceded(
        ("write", space1),
        (endpoint_name, opt(preceded(space1, rest))),
    )
    .parse_next(input)?;

    Ok(ConsoleCommand::Write {
        endpoint,
        value: value.unwrap_or_default().trim_end(),
    })
}

fn read_command<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    let endpoint = preceded(("read", space1), endpoint_name).parse_next(input)?;
    Ok(ConsoleCommand::Read { endpoint })
}

fn contract_command<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    let (op, id) = preceded(
        ("rc", space1),
        (contract_op, opt(preceded(space1, reset_id))),
    )
    .parse_next(input)?;

    Ok(ConsoleCommand::Contract {
        op,
        id: id.unwrap_or(RESET_ID),
    })
}

fn contract_op(input: &mut &str) -> ModalResult<ContractOp> {
    alt((
        "assert".value(ContractOp::Assert),
        "deassert".value(ContractOp::Deassert),
        "status".value(ContractOp::Status),
        "reset".value(ContractOp::Reset),
    ))
    .parse_next(input)
}

fn reset_id(input: &mut &str) -> ModalResult<ResetId> {
    dec_uint.parse_next(input)
}

fn endpoint_name<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || c == '-' || c == '_'
    })
    .parse_next(input)
}

/// Executes `command` against `device`, writing the response to `out`.
///
/// Device failures are rendered as `ERR` lines rather than returned; the only
/// error surfaced is a failure of the output sink itself.
///
/// # Errors
///
/// Propagates [`fmt::Error`] from `out`.
pub fn execute<M, L, D, W>(
    device: &ResetDevice<M, L, D>,
    command: &ConsoleCommand<'_>,
    out: &mut W,
) -> fmt::Result
where
    M: RawMutex,
    L: DigitalLine,
    D: DelayNs,
    W: fmt::Write,
{
    match *command {
        ConsoleCommand::Write { endpoint, value } => {
            match device.endpoints().write(endpoint, value.as_bytes()) {
                Ok(written) => writeln!(out, "OK {endpoint} ({written} bytes)"),
                Err(error) => writeln!(out, "ERR {endpoint}: {error}"),
            }
        }
        ConsoleCommand::Read { endpoint } => match device.endpoints().read(endpoint) {
            Ok(text) => writeln!(out, "{text}"),
            Err(error) => writeln!(out, "ERR {endpoint}: {error}"),
        },
        ConsoleCommand::Contract { op, id } => {
            let control = device.sequencer();
            let result = match op {
                ContractOp::Assert => control.assert(id).map(|()| true),
                ContractOp::Deassert => control.deassert(id).map(|()| false),
                ContractOp::Status => control.status(id),
                ContractOp::Reset => control.reset(id).map(|()| false),
            };
            match result {
                Ok(held) => writeln!(
                    out,
                    "reset {id}: {}",
                    if held { "asserted" } else { "released" }
                ),
                Err(error) => writeln!(out, "ERR rc {op}: {error}"),
            }
        }
        ConsoleCommand::Config => {
            let config = device.config();
            writeln!(
                out,
                "duration-ms={} asserted-state={} auto={}",
                config.duration_ms,
                match config.asserted_polarity {
                    ResetPolarity::ActiveHigh => "high",
                    ResetPolarity::ActiveLow => "low",
                },
                config.auto_reset_on_attach
            )
        }
        ConsoleCommand::Trace => device.sequencer().with_telemetry(|telemetry| {
            if telemetry.is_empty() {
                return writeln!(out, "no transitions recorded");
            }
            for record in telemetry.oldest_first() {
                writeln!(out, "#{} {}", record.id, record.event)?;
            }
            Ok(())
        }),
        ConsoleCommand::Help => {
            for (_, line) in HELP_TOPICS {
                writeln!(out, "{line}")?;
            }
            Ok(())
        }
    }
}
