//! Operator-facing control endpoints and the registrar they are published to.
//!
//! Two endpoints are exposed:
//! - `reset` (write-only): any write pulses reset and clears the ISP flag.
//! - `isp` (read/write): writing `1` runs the ISP-entry sequence; reading
//!   reports `isp mode` or `normal mode`.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;

use crate::contract::ResetControllerHandle;
use crate::error::EndpointError;
use crate::line::DigitalLine;
use crate::sequencer::ResetSequencer;

pub const RESET_ENDPOINT: &str = "reset";
pub const ISP_ENDPOINT: &str = "isp";

/// Text reported by the `isp` endpoint after a completed ISP entry.
pub const ISP_MODE_TEXT: &str = "isp mode";
/// Text reported by the `isp` endpoint otherwise.
pub const NORMAL_MODE_TEXT: &str = "normal mode";

/// Payload that triggers the ISP-entry sequence.
const ISP_TRIGGER: &[u8] = b"1";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointAccess {
    WriteOnly,
    ReadWrite,
}

impl EndpointAccess {
    #[must_use]
    pub const fn readable(self) -> bool {
        matches!(self, EndpointAccess::ReadWrite)
    }
}

/// Descriptor handed to the registrar for each endpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlEndpoint {
    pub name: &'static str,
    pub access: EndpointAccess,
}

/// Endpoints registered at attach time, in registration order.
pub static CONTROL_ENDPOINTS: [ControlEndpoint; 2] = [
    ControlEndpoint {
        name: RESET_ENDPOINT,
        access: EndpointAccess::WriteOnly,
    },
    ControlEndpoint {
        name: ISP_ENDPOINT,
        access: EndpointAccess::ReadWrite,
    },
];

/// External registry that publishes the reset contract and control endpoints.
///
/// Implementations route later endpoint traffic to [`ControlSurface`] and
/// contract calls to [`crate::contract::ResetControl`].
pub trait Registrar {
    type Error: fmt::Debug;

    /// Publishes the reset contract under `handle.name`.
    ///
    /// # Errors
    ///
    /// Returns the registry's error when the name cannot be published; attach
    /// then unwinds.
    fn register_reset_controller(
        &mut self,
        handle: &ResetControllerHandle,
    ) -> Result<(), Self::Error>;

    fn unregister_reset_controller(&mut self, handle: &ResetControllerHandle);

    /// Publishes one control endpoint.
    ///
    /// # Errors
    ///
    /// Returns the registry's error when the endpoint cannot be published.
    fn register_endpoint(&mut self, endpoint: &ControlEndpoint) -> Result<(), Self::Error>;

    fn unregister_endpoint(&mut self, endpoint: &ControlEndpoint);
}

/// Handler for endpoint reads and writes.
pub struct ControlSurface<'a, M: RawMutex, L, D> {
    sequencer: &'a ResetSequencer<M, L, D>,
}

impl<'a, M, L, D> ControlSurface<'a, M, L, D>
where
    M: RawMutex,
    L: DigitalLine,
    D: DelayNs,
{
    #[must_use]
    pub fn new(sequencer: &'a ResetSequencer<M, L, D>) -> Self {
        Self { sequencer }
    }

    /// Handles a write to `endpoint`, returning the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Unknown endpoints and unrecognised `isp` payloads are rejected before
    /// any line is touched; sequence failures are passed through.
    pub fn write(&self, endpoint: &str, input: &[u8]) -> Result<usize, EndpointError<L::Error>> {
        match endpoint_by_name(endpoint).map(|endpoint| endpoint.name) {
            Some(RESET_ENDPOINT) => {
                self.sequencer.plain_reset()?;
                Ok(input.len())
            }
            Some(ISP_ENDPOINT) => {
                let payload = input.strip_suffix(b"\n").unwrap_or(input);
                if payload != ISP_TRIGGER {
                    return Err(EndpointError::InvalidInput);
                }
                self.sequencer.enter_isp()?;
                Ok(input.len())
            }
            _ => Err(EndpointError::UnknownEndpoint),
        }
    }

    /// Handles a read of `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::NotReadable`] for `reset` and
    /// [`EndpointError::UnknownEndpoint`] for names this device does not own.
    pub fn read(&self, endpoint: &str) -> Result<&'static str, EndpointError<L::Error>> {
        let endpoint = endpoint_by_name(endpoint).ok_or(EndpointError::UnknownEndpoint)?;
        if !endpoint.access.readable() {
            return Err(EndpointError::NotReadable);
        }
        Ok(mode_text(self.sequencer.in_isp_mode()))
    }
}

/// Text reported for the given ISP flag.
#[must_use]
pub const fn mode_text(in_isp_mode: bool) -> &'static str {
    if in_isp_mode {
        ISP_MODE_TEXT
    } else {
        NORMAL_MODE_TEXT
    }
}

/// Looks up an endpoint descriptor by name.
#[must_use]
pub fn endpoint_by_name(name: &str) -> Option<&'static ControlEndpoint> {
    CONTROL_ENDPOINTS.iter().find(|endpoint| endpoint.name == name)
}
