//! Operator console carried over the USB CDC interface.
//!
//! Bytes from the host are assembled into lines here, handed to the shared
//! `reset_core::console` grammar, and the rendered response is queued back to
//! the USB task in packet-sized frames.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::{self, Write as _};
use core::str;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_sync::signal::Signal;
use embedded_hal::delay::DelayNs;
use heapless::{String, Vec};
use reset_core::console;
use reset_core::{DigitalLine, ResetDevice};

/// Maximum number of bytes accepted on a single console line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Largest payload moved between the USB task and the console task.
pub const FRAME_SIZE: usize = 64;

/// Depth of each bounded console channel.
pub const CONSOLE_QUEUE_DEPTH: usize = 4;

/// Room for the longest response, a full `trace` dump.
pub const RESPONSE_CAPACITY: usize = 2048;

pub const PROMPT: &str = "> ";

#[cfg(target_os = "none")]
type ConsoleMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type ConsoleMutex = NoopRawMutex;

pub type ConsoleFrame = Vec<u8, FRAME_SIZE>;

pub type ConsoleChannel = Channel<ConsoleMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;

pub type ConsoleSender<'a> = Sender<'a, ConsoleMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;

pub type ConsoleResponse = String<RESPONSE_CAPACITY>;

/// Host connection changes reported by the USB task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkEvent {
    /// DTR asserted on an enumerated interface.
    Connected,
    /// DTR dropped or the interface was disabled.
    Disconnected,
}

/// Latest link state; a burst of changes collapses to the final one.
pub type ConsoleLink = Signal<ConsoleMutex, LinkEvent>;

/// Errors raised while assembling a line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineError {
    InvalidUtf8,
    LineOverflow,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::InvalidUtf8 => f.write_str("input is not UTF-8"),
            LineError::LineOverflow => write!(f, "line longer than {MAX_LINE_LEN} bytes"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SessionState {
    Disconnected,
    Connected,
}

/// Line editor state for one console connection.
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    state: SessionState,
    complete: bool,
    overflowed: bool,
}

impl LineAssembler {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: SessionState::Disconnected,
            complete: false,
            overflowed: false,
        }
    }

    /// Marks the transport as connected (host asserted DTR).
    pub fn on_connect(&mut self) {
        self.state = SessionState::Connected;
        self.reset();
    }

    /// Marks the transport as disconnected; any partial line is discarded.
    pub fn on_disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.reset();
    }

    /// Applies a link change from the USB task.
    pub fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => self.on_connect(),
            LinkEvent::Disconnected => self.on_disconnect(),
        }
    }

    /// Feeds one byte, returning a line once a terminator arrives.
    ///
    /// Backspace and delete edit the pending line. Bytes past
    /// [`MAX_LINE_LEN`] are dropped and the whole line is reported as
    /// [`LineError::LineOverflow`].
    pub fn ingest(&mut self, byte: u8) -> Option<Result<&str, LineError>> {
        if self.state != SessionState::Connected {
            return None;
        }
        if self.complete {
            self.reset();
        }

        match byte {
            b'\r' | b'\n' => {
                if self.buffer.is_empty() && !self.overflowed {
                    return None;
                }
                self.complete = true;
                if self.overflowed {
                    return Some(Err(LineError::LineOverflow));
                }
                Some(str::from_utf8(&self.buffer).map_err(|_| LineError::InvalidUtf8))
            }
            0x08 | 0x7f => {
                self.buffer.pop();
                None
            }
            value => {
                if self.buffer.push(value).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.complete = false;
        self.overflowed = false;
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one console line against `device`, leaving the reply and a fresh
/// prompt in `out`.
pub fn respond<M, L, D>(
    device: &ResetDevice<M, L, D>,
    line: Result<&str, LineError>,
    out: &mut ConsoleResponse,
) where
    M: RawMutex,
    L: DigitalLine,
    D: DelayNs,
{
    out.clear();
    let rendered = match line {
        Ok(text) => match console::parse(text) {
            Ok(command) => console::execute(device, &command, out),
            Err(error) => writeln!(out, "ERR syntax {error}"),
        },
        Err(error) => writeln!(out, "ERR {error}"),
    };

    if rendered.is_err() {
        out.clear();
        let _ = out.push_str("ERR response truncated\n");
    }
    let _ = out.push_str(PROMPT);
}

/// Queues `text` to the USB task, expanding `\n` to `\r\n` for terminals.
pub async fn send_text(sender: &ConsoleSender<'_>, text: &str) {
    let mut frame = ConsoleFrame::new();
    for &byte in text.as_bytes() {
        if frame.len() + 2 > FRAME_SIZE {
            sender.send(core::mem::take(&mut frame)).await;
        }
        if byte == b'\n' {
            let _ = frame.push(b'\r');
        }
        let _ = frame.push(byte);
    }
    if !frame.is_empty() {
        sender.send(frame).await;
    }
}
