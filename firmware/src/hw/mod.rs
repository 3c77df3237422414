//! Board wiring: the two open-drain outputs, the compile-time device
//! description, and the in-memory registrar the console routes through.

use core::cell::RefCell;
use core::convert::Infallible;

use embassy_stm32::gpio::{Level, OutputOpenDrain};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_time::Delay;
use heapless::Vec;
use reset_core::config::{ASSERTED_STATE_PROPERTY, DURATION_MS_PROPERTY};
use reset_core::contract::ResetControllerHandle;
use reset_core::endpoints::{ControlEndpoint, Registrar};
use reset_core::{DigitalLine, LineId, LineProvider, PropertyValue, ResetDevice};

pub type BoardDevice = ResetDevice<ThreadModeRawMutex, BoardLine, Delay>;

/// Device description for this board: nRESET is active-low and the target
/// needs 100 ms to discharge its reset capacitor.
pub const BOARD_PROPERTIES: [(&str, PropertyValue<'static>); 2] = [
    (ASSERTED_STATE_PROPERTY, PropertyValue::U32(0)),
    (DURATION_MS_PROPERTY, PropertyValue::U32(100)),
];

pub struct BoardLine {
    name: &'static str,
    pin: RefCell<OutputOpenDrain<'static>>,
}

impl DigitalLine for BoardLine {
    type Error = Infallible;

    fn set_output(&self, high: bool) -> Result<(), Self::Error> {
        self.set_level(high)
    }

    fn set_level(&self, high: bool) -> Result<(), Self::Error> {
        self.pin.borrow_mut().set_level(Level::from(high));
        Ok(())
    }

    fn level(&self) -> Result<bool, Self::Error> {
        Ok(self.pin.borrow().is_set_high())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub enum BoardLineError {
    Unknown(&'static str),
    InUse(&'static str),
}

/// Pins wired to the target, handed out once each.
pub struct BoardLines {
    reset: Option<BoardLine>,
    isp: Option<BoardLine>,
}

impl BoardLines {
    pub fn new(reset: OutputOpenDrain<'static>, isp: OutputOpenDrain<'static>) -> Self {
        Self {
            reset: Some(BoardLine {
                name: LineId::Reset.name(),
                pin: RefCell::new(reset),
            }),
            isp: Some(BoardLine {
                name: LineId::ModeSelect.name(),
                pin: RefCell::new(isp),
            }),
        }
    }

    fn slot(&mut self, name: &str) -> Option<&mut Option<BoardLine>> {
        if name == LineId::Reset.name() {
            Some(&mut self.reset)
        } else if name == LineId::ModeSelect.name() {
            Some(&mut self.isp)
        } else {
            None
        }
    }
}

impl LineProvider for BoardLines {
    type Line = BoardLine;
    type Error = BoardLineError;

    fn acquire(&mut self, name: &'static str, initial_high: bool) -> Result<BoardLine, Self::Error> {
        let slot = self.slot(name).ok_or(BoardLineError::Unknown(name))?;
        let line = slot.take().ok_or(BoardLineError::InUse(name))?;
        let Ok(()) = line.set_level(initial_high);
        Ok(line)
    }

    fn release(&mut self, line: BoardLine) {
        if let Some(slot) = self.slot(line.name) {
            *slot = Some(line);
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub struct RegistryFull;

/// Names the console is allowed to route to.
#[derive(Default)]
pub struct ConsoleRegistrar {
    published: Vec<&'static str, 4>,
}

impl ConsoleRegistrar {
    pub fn publish(&mut self, name: &'static str) -> Result<(), RegistryFull> {
        self.published.push(name).map_err(|_| RegistryFull)
    }

    pub fn withdraw(&mut self, name: &str) {
        self.published.retain(|published| *published != name);
    }

    pub fn published(&self) -> &[&'static str] {
        &self.published
    }
}

impl Registrar for ConsoleRegistrar {
    type Error = RegistryFull;

    fn register_reset_controller(
        &mut self,
        handle: &ResetControllerHandle,
    ) -> Result<(), Self::Error> {
        self.publish(handle.name)
    }

    fn unregister_reset_controller(&mut self, handle: &ResetControllerHandle) {
        self.withdraw(handle.name);
    }

    fn register_endpoint(&mut self, endpoint: &ControlEndpoint) -> Result<(), Self::Error> {
        self.publish(endpoint.name)
    }

    fn unregister_endpoint(&mut self, endpoint: &ControlEndpoint) {
        self.withdraw(endpoint.name);
    }
}
